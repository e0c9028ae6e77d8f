// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Callback Reconciliation
//!
//! Everything between "bytes arrived from the gateway" and "the ledger and
//! inventory reflect the payment":
//!
//! - `normalizer` - canonical `{refId, status}` out of drifting field names
//! - `authenticator` - origin allow-list plus optional payload HMAC
//! - `orchestrator` - the per-callback state machine tying normalizer,
//!   authenticator, ledger, fulfillment, and notifier together

pub mod authenticator;
pub mod normalizer;
pub mod orchestrator;

pub use authenticator::{AuthDecision, OriginAuthenticator, RejectReason};
pub use normalizer::{CallbackStatus, NormalizeOutcome, NormalizedCallback, RefKind};
pub use orchestrator::{CallbackOrchestrator, CallbackOutcome, CallbackRequest, IgnoreReason};
