// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Inbound callback trust decisions.
//!
//! The baseline policy is an allow-list of gateway source addresses. When a
//! signature secret is configured, a valid HMAC-SHA256 over the raw request
//! body is additionally required; without one the service runs in
//! perimeter-trust mode and the signature fields the gateway sends are
//! recorded but not verified.

use std::collections::HashSet;

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Why a callback was rejected. Rejection is an "ignore" outcome for the
/// caller, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Source address is not on the allow-list.
    UntrustedAddress,
    /// Signature verification is enabled but no signature was declared.
    MissingSignature,
    /// The declared signature does not match the payload.
    InvalidSignature,
}

/// Trust decision for one inbound callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    /// Trusted; `provenance` is the opaque marker recorded on the
    /// transaction when it settles.
    Allowed { provenance: String },
    Rejected(RejectReason),
}

/// Origin-based authenticator with optional message authentication.
#[derive(Debug, Clone)]
pub struct OriginAuthenticator {
    allowed_origins: HashSet<String>,
    signature_secret: Option<String>,
}

impl OriginAuthenticator {
    pub fn new(allowed_origins: HashSet<String>, signature_secret: Option<String>) -> Self {
        Self {
            allowed_origins,
            signature_secret,
        }
    }

    /// Whether the authenticator relies on the network perimeter alone.
    pub fn perimeter_trust_only(&self) -> bool {
        self.signature_secret.is_none()
    }

    /// Decide whether an inbound callback may be trusted.
    ///
    /// Pure decision with no side effects; callers log the outcome.
    pub fn authenticate(
        &self,
        source_address: &str,
        raw_payload: &[u8],
        declared_signature: Option<&str>,
    ) -> AuthDecision {
        if !self.allowed_origins.contains(source_address) {
            return AuthDecision::Rejected(RejectReason::UntrustedAddress);
        }

        let Some(secret) = &self.signature_secret else {
            return AuthDecision::Allowed {
                provenance: format!("origin:{source_address}"),
            };
        };

        let Some(declared) = declared_signature else {
            return AuthDecision::Rejected(RejectReason::MissingSignature);
        };

        if verify_signature(secret, raw_payload, declared) {
            AuthDecision::Allowed {
                provenance: format!("hmac:{declared}"),
            }
        } else {
            AuthDecision::Rejected(RejectReason::InvalidSignature)
        }
    }
}

/// Constant-time HMAC-SHA256 check of a hex-encoded signature.
fn verify_signature(secret: &str, payload: &[u8], declared: &str) -> bool {
    let Ok(declared_bytes) = hex::decode(declared.trim()) else {
        return false;
    };
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload);
    mac.verify_slice(&declared_bytes).is_ok()
}

/// Compute the hex signature for a payload. Exposed for integrations and
/// tests producing signed callbacks.
pub fn sign_payload(secret: &str, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}
