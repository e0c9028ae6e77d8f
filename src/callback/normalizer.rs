// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Callback payload normalization.
//!
//! The gateway's notification format has drifted across versions: the
//! reference id and signature appear under several field names, and the
//! status value casing is not stable. This module folds all of that into a
//! canonical `{refId, status}` pair, or a terminal "ignore" outcome when the
//! payload is unusable.

use std::collections::HashMap;

/// Accepted reference-id field names, first non-empty wins.
pub const REF_ID_FIELDS: [&str; 3] = ["ref", "ref_id", "ref_kode"];

/// Accepted signature field names, first non-empty wins.
pub const SIGNATURE_FIELDS: [&str; 3] = ["signature", "sig", "sign"];

/// Header carrying the signature when it is not in the payload.
pub const SIGNATURE_HEADER: &str = "x-callback-signature";

const PRODUCT_PREFIX: &str = "PROD-";
const TOPUP_PREFIX: &str = "TOPUP-";

/// Transaction kind encoded in the reference-id prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    /// `PROD-`: digital product purchase.
    Product,
    /// `TOPUP-`: balance top-up.
    Topup,
}

impl RefKind {
    /// Recognize the kind prefix of a reference id.
    pub fn of(ref_id: &str) -> Option<Self> {
        if ref_id.starts_with(PRODUCT_PREFIX) {
            Some(RefKind::Product)
        } else if ref_id.starts_with(TOPUP_PREFIX) {
            Some(RefKind::Topup)
        } else {
            None
        }
    }
}

/// Status values this service acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackStatus {
    Success,
    Failed,
    Expired,
}

impl CallbackStatus {
    /// Parse an already case-folded status value. Anything unrecognized is
    /// `None`; the orchestrator ignores it rather than erroring.
    pub fn parse(folded: &str) -> Option<Self> {
        match folded {
            "success" => Some(CallbackStatus::Success),
            "failed" => Some(CallbackStatus::Failed),
            "expired" => Some(CallbackStatus::Expired),
            _ => None,
        }
    }
}

/// A canonicalized callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedCallback {
    /// Canonical reference id, prefix intact.
    pub ref_id: String,
    /// Kind recognized from the prefix.
    pub kind: RefKind,
    /// Case-folded status value (not yet matched against recognized values).
    pub status: String,
}

/// Outcome of normalization. The non-`Normalized` variants are terminal
/// "ignore" outcomes, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizeOutcome {
    Normalized(NormalizedCallback),
    /// Reference id or status absent/empty.
    Incomplete,
    /// Reference id present but carries no recognized kind prefix.
    UnrecognizedFormat { ref_id: String },
}

/// Extract the first non-empty value among `names`.
fn first_non_empty<'a>(fields: &'a HashMap<String, String>, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .filter_map(|name| fields.get(*name))
        .map(|value| value.trim())
        .find(|value| !value.is_empty())
}

/// Canonicalize an inbound payload.
pub fn normalize(fields: &HashMap<String, String>) -> NormalizeOutcome {
    let Some(ref_id) = first_non_empty(fields, &REF_ID_FIELDS) else {
        return NormalizeOutcome::Incomplete;
    };
    let Some(status) = first_non_empty(fields, &["status"]) else {
        return NormalizeOutcome::Incomplete;
    };

    let Some(kind) = RefKind::of(ref_id) else {
        return NormalizeOutcome::UnrecognizedFormat {
            ref_id: ref_id.to_string(),
        };
    };

    NormalizeOutcome::Normalized(NormalizedCallback {
        ref_id: ref_id.to_string(),
        kind,
        status: status.to_ascii_lowercase(),
    })
}

/// Extract the declared signature from the payload fields, falling back to
/// the value of the [`SIGNATURE_HEADER`] header when no field carries one.
pub fn extract_signature(
    fields: &HashMap<String, String>,
    header_value: Option<&str>,
) -> Option<String> {
    first_non_empty(fields, &SIGNATURE_FIELDS)
        .or(header_value.map(str::trim).filter(|v| !v.is_empty()))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn ref_id_alias_precedence() {
        let payload = fields(&[("ref", "TOPUP-1"), ("ref_id", "TOPUP-2"), ("status", "success")]);
        let NormalizeOutcome::Normalized(normalized) = normalize(&payload) else {
            panic!("expected Normalized");
        };
        assert_eq!(normalized.ref_id, "TOPUP-1");
    }

    #[test]
    fn empty_alias_falls_through_to_next() {
        let payload = fields(&[("ref", "  "), ("ref_kode", "PROD-7"), ("status", "success")]);
        let NormalizeOutcome::Normalized(normalized) = normalize(&payload) else {
            panic!("expected Normalized");
        };
        assert_eq!(normalized.ref_id, "PROD-7");
        assert_eq!(normalized.kind, RefKind::Product);
    }

    #[test]
    fn status_is_case_folded() {
        let payload = fields(&[("ref_id", "TOPUP-1"), ("status", "SuCCeSS")]);
        let NormalizeOutcome::Normalized(normalized) = normalize(&payload) else {
            panic!("expected Normalized");
        };
        assert_eq!(normalized.status, "success");
        assert_eq!(CallbackStatus::parse(&normalized.status), Some(CallbackStatus::Success));
    }

    #[test]
    fn missing_ref_or_status_is_incomplete() {
        assert_eq!(
            normalize(&fields(&[("status", "success")])),
            NormalizeOutcome::Incomplete
        );
        assert_eq!(
            normalize(&fields(&[("ref", "TOPUP-1")])),
            NormalizeOutcome::Incomplete
        );
        assert_eq!(
            normalize(&fields(&[("ref", "TOPUP-1"), ("status", "")])),
            NormalizeOutcome::Incomplete
        );
    }

    #[test]
    fn unknown_prefix_is_unrecognized_format() {
        let outcome = normalize(&fields(&[("ref", "ORDER-9"), ("status", "success")]));
        assert_eq!(
            outcome,
            NormalizeOutcome::UnrecognizedFormat {
                ref_id: "ORDER-9".to_string()
            }
        );
    }

    #[test]
    fn unrecognized_status_values_pass_through() {
        let payload = fields(&[("ref", "PROD-7"), ("status", "Refunded")]);
        let NormalizeOutcome::Normalized(normalized) = normalize(&payload) else {
            panic!("expected Normalized");
        };
        assert_eq!(normalized.status, "refunded");
        assert_eq!(CallbackStatus::parse(&normalized.status), None);
    }

    #[test]
    fn signature_from_fields_beats_header() {
        let payload = fields(&[("sig", "abc123")]);
        assert_eq!(
            extract_signature(&payload, Some("header-sig")).as_deref(),
            Some("abc123")
        );
        assert_eq!(
            extract_signature(&fields(&[]), Some("header-sig")).as_deref(),
            Some("header-sig")
        );
        assert!(extract_signature(&fields(&[]), None).is_none());
    }
}
