// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Inbound payment-gateway callback endpoint.
//!
//! The response contract is fixed: every request, whether well-formed,
//! malformed, untrusted, already resolved, or failed internally, is answered with
//! `200 {"status": true}` so the gateway never retries a case this service
//! intentionally does not act on.

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::HeaderMap,
    Json,
};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::callback::normalizer::SIGNATURE_HEADER;
use crate::callback::CallbackRequest;
use crate::state::AppState;

/// The fixed acknowledgment body.
#[derive(Debug, Serialize, ToSchema)]
pub struct CallbackAck {
    /// Always `true`.
    pub status: bool,
}

/// Resolve the client address: first entry of `x-forwarded-for`, else the
/// transport peer.
pub fn resolve_client_address(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| peer.ip().to_string())
}

/// Decode a form- or JSON-encoded body into a flat string map.
///
/// Undecodable bodies yield an empty map; normalization then reports the
/// payload as incomplete, which is an ignore outcome, not an error.
pub fn decode_fields(headers: &HeaderMap, body: &[u8]) -> HashMap<String, String> {
    let content_type = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    if content_type.starts_with("application/json") {
        match serde_json::from_slice::<serde_json::Map<String, Value>>(body) {
            Ok(map) => map
                .into_iter()
                .map(|(key, value)| {
                    let rendered = match value {
                        Value::String(s) => s,
                        other => other.to_string(),
                    };
                    (key, rendered)
                })
                .collect(),
            Err(_) => HashMap::new(),
        }
    } else {
        url::form_urlencoded::parse(body).into_owned().collect()
    }
}

/// Receive a payment-gateway notification.
#[utoipa::path(
    post,
    path = "/v1/payments/callback",
    tag = "Payments",
    request_body(content = String, description = "Form- or JSON-encoded notification map"),
    responses(
        (status = 200, description = "Always acknowledged", body = CallbackAck)
    )
)]
pub async fn payment_callback(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<CallbackAck> {
    let source_address = resolve_client_address(&headers, peer);
    let fields = decode_fields(&headers, &body);
    let header_signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let request = CallbackRequest {
        fields,
        raw_body: body.to_vec(),
        header_signature,
    };

    let _ = state.orchestrator.handle(&source_address, &request).await;

    Json(CallbackAck { status: true })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::CONTENT_TYPE;

    fn peer() -> SocketAddr {
        "203.0.113.10:4433".parse().unwrap()
    }

    #[test]
    fn forwarded_for_first_entry_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            "202.155.132.37, 10.0.0.2".parse().unwrap(),
        );
        assert_eq!(resolve_client_address(&headers, peer()), "202.155.132.37");
    }

    #[test]
    fn falls_back_to_peer_address() {
        assert_eq!(resolve_client_address(&HeaderMap::new(), peer()), "203.0.113.10");

        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "  ".parse().unwrap());
        assert_eq!(resolve_client_address(&headers, peer()), "203.0.113.10");
    }

    #[test]
    fn decodes_form_bodies() {
        let fields = decode_fields(&HeaderMap::new(), b"ref=TOPUP-1&status=success");
        assert_eq!(fields.get("ref").map(String::as_str), Some("TOPUP-1"));
        assert_eq!(fields.get("status").map(String::as_str), Some("success"));
    }

    #[test]
    fn decodes_json_bodies_including_non_strings() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, "application/json".parse().unwrap());
        let fields = decode_fields(
            &headers,
            br#"{"ref": "PROD-7", "status": "success", "amount": 15000}"#,
        );
        assert_eq!(fields.get("ref").map(String::as_str), Some("PROD-7"));
        assert_eq!(fields.get("amount").map(String::as_str), Some("15000"));
    }

    #[test]
    fn garbage_json_decodes_to_empty_map() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, "application/json".parse().unwrap());
        assert!(decode_fields(&headers, b"{not json").is_empty());
    }

    #[tokio::test]
    async fn acknowledges_even_malformed_requests() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::for_tests(dir.path());

        let ack = payment_callback(
            State(state),
            ConnectInfo(peer()),
            HeaderMap::new(),
            Bytes::from_static(b"\xff\xfe not a payload"),
        )
        .await;

        assert!(ack.0.status);
    }
}
