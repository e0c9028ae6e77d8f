// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The per-callback reconciliation state machine.
//!
//! Each inbound notification walks normalize → authenticate → ledger lookup
//! → conditional transition → fulfillment → notification. Every path ends in
//! the same acknowledgment to the gateway; the outcome type exists for
//! logging and tests, not for the wire.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::callback::authenticator::{AuthDecision, OriginAuthenticator};
use crate::callback::normalizer::{
    extract_signature, normalize, CallbackStatus, NormalizeOutcome, NormalizedCallback,
};
use crate::fulfillment::{FulfillmentEngine, FulfillmentOutcome};
use crate::notifier::{self, Notifier};
use crate::storage::{
    StoreDatabase, StoreDbError, StoredTransaction, TransactionStatus, SUCCESS_STICKER_KEY,
};

/// Why a callback produced no state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Reference id or status absent from the payload.
    IncompletePayload,
    /// Reference id carries no recognized kind prefix.
    UnrecognizedFormat,
    /// Authentication rejected the source.
    UntrustedOrigin,
    /// No transaction with this reference id.
    UnknownTransaction,
    /// The transaction already left `PENDING`.
    AlreadyResolved,
    /// Status value this service does not act on.
    UnrecognizedStatus,
    /// Store or other internal failure; logged, still acknowledged.
    InternalError,
}

/// Result of processing one inbound callback.
#[derive(Debug)]
pub enum CallbackOutcome {
    /// A success callback applied the transition and ran fulfillment.
    Fulfilled(FulfillmentOutcome),
    /// A failed/expired callback applied the corresponding terminal status.
    Cancelled(TransactionStatus),
    /// No state change.
    Ignored(IgnoreReason),
}

/// One inbound callback as seen by the orchestrator: decoded fields plus
/// the raw body the signature covers.
#[derive(Debug, Clone, Default)]
pub struct CallbackRequest {
    pub fields: HashMap<String, String>,
    pub raw_body: Vec<u8>,
    pub header_signature: Option<String>,
}

impl CallbackRequest {
    /// Declared signature, from payload fields or the signature header.
    pub fn signature(&self) -> Option<String> {
        extract_signature(&self.fields, self.header_signature.as_deref())
    }
}

/// Ties authenticator, normalizer, ledger, fulfillment, and notifier
/// together for one callback at a time.
pub struct CallbackOrchestrator {
    db: Arc<StoreDatabase>,
    authenticator: OriginAuthenticator,
    engine: FulfillmentEngine,
    notifier: Arc<dyn Notifier>,
}

impl CallbackOrchestrator {
    pub fn new(
        db: Arc<StoreDatabase>,
        authenticator: OriginAuthenticator,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let engine = FulfillmentEngine::new(Arc::clone(&db));
        Self {
            db,
            authenticator,
            engine,
            notifier,
        }
    }

    /// Process one inbound callback. Never fails: internal errors are logged
    /// and collapsed into an ignore outcome so the caller can return the
    /// fixed acknowledgment.
    pub async fn handle(&self, source_address: &str, request: &CallbackRequest) -> CallbackOutcome {
        match self.process(source_address, request).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(source = source_address, error = %err, "callback processing failed");
                CallbackOutcome::Ignored(IgnoreReason::InternalError)
            }
        }
    }

    async fn process(
        &self,
        source_address: &str,
        request: &CallbackRequest,
    ) -> Result<CallbackOutcome, StoreDbError> {
        let normalized = match normalize(&request.fields) {
            NormalizeOutcome::Normalized(normalized) => normalized,
            NormalizeOutcome::Incomplete => {
                info!(source = source_address, "callback missing ref id or status, skipping");
                return Ok(CallbackOutcome::Ignored(IgnoreReason::IncompletePayload));
            }
            NormalizeOutcome::UnrecognizedFormat { ref_id } => {
                warn!(ref_id = %ref_id, "unrecognized reference format, skipping");
                return Ok(CallbackOutcome::Ignored(IgnoreReason::UnrecognizedFormat));
            }
        };

        info!(
            source = source_address,
            ref_id = %normalized.ref_id,
            status = %normalized.status,
            "callback received"
        );

        let declared_signature = request.signature();
        let provenance = match self.authenticator.authenticate(
            source_address,
            &request.raw_body,
            declared_signature.as_deref(),
        ) {
            AuthDecision::Allowed { provenance } => provenance,
            AuthDecision::Rejected(reason) => {
                warn!(
                    source = source_address,
                    ref_id = %normalized.ref_id,
                    reason = ?reason,
                    "callback rejected"
                );
                return Ok(CallbackOutcome::Ignored(IgnoreReason::UntrustedOrigin));
            }
        };

        let Some(trx) = self.db.get_transaction(&normalized.ref_id)? else {
            warn!(ref_id = %normalized.ref_id, "no transaction for callback, skipping");
            return Ok(CallbackOutcome::Ignored(IgnoreReason::UnknownTransaction));
        };

        if trx.status.is_terminal() {
            info!(ref_id = %normalized.ref_id, status = ?trx.status, "already resolved, skipping");
            return Ok(CallbackOutcome::Ignored(IgnoreReason::AlreadyResolved));
        }

        match CallbackStatus::parse(&normalized.status) {
            Some(CallbackStatus::Success) => {
                self.resolve_success(&normalized, provenance).await
            }
            Some(CallbackStatus::Failed) => {
                self.resolve_cancellation(&normalized, TransactionStatus::Failed)
                    .await
            }
            Some(CallbackStatus::Expired) => {
                self.resolve_cancellation(&normalized, TransactionStatus::Expired)
                    .await
            }
            None => {
                info!(
                    ref_id = %normalized.ref_id,
                    status = %normalized.status,
                    "unrecognized status value, skipping"
                );
                Ok(CallbackOutcome::Ignored(IgnoreReason::UnrecognizedStatus))
            }
        }
    }

    async fn resolve_success(
        &self,
        normalized: &NormalizedCallback,
        provenance: String,
    ) -> Result<CallbackOutcome, StoreDbError> {
        let Some(transition) = self.db.transition_if_pending(
            &normalized.ref_id,
            TransactionStatus::Success,
            Some(provenance),
        )?
        else {
            return Ok(CallbackOutcome::Ignored(IgnoreReason::UnknownTransaction));
        };

        if !transition.applied {
            // A concurrent delivery won the transition; its fulfillment is
            // the one that counts.
            info!(ref_id = %normalized.ref_id, "transition already applied, skipping");
            return Ok(CallbackOutcome::Ignored(IgnoreReason::AlreadyResolved));
        }

        let outcome = self.engine.fulfill(&transition.transaction)?;
        info!(ref_id = %normalized.ref_id, outcome = ?outcome, "transaction settled");

        self.notify_success(&transition.transaction, &outcome).await;
        Ok(CallbackOutcome::Fulfilled(outcome))
    }

    async fn resolve_cancellation(
        &self,
        normalized: &NormalizedCallback,
        status: TransactionStatus,
    ) -> Result<CallbackOutcome, StoreDbError> {
        let Some(transition) =
            self.db
                .transition_if_pending(&normalized.ref_id, status, None)?
        else {
            return Ok(CallbackOutcome::Ignored(IgnoreReason::UnknownTransaction));
        };

        if !transition.applied {
            info!(ref_id = %normalized.ref_id, "transition already applied, skipping");
            return Ok(CallbackOutcome::Ignored(IgnoreReason::AlreadyResolved));
        }

        info!(ref_id = %normalized.ref_id, status = ?status, "transaction cancelled");

        let trx = &transition.transaction;
        self.notifier
            .notify_user(
                trx.user_id,
                &notifier::cancellation_notice(trx.produk_info.display_name(), &trx.ref_id),
            )
            .await;

        Ok(CallbackOutcome::Cancelled(status))
    }

    /// Dispatch notices for a settled transaction. Runs strictly after the
    /// ledger and fulfillment mutations committed; everything here is
    /// advisory and infallible.
    async fn notify_success(&self, trx: &StoredTransaction, outcome: &FulfillmentOutcome) {
        let sticker_id = self
            .db
            .get_setting(SUCCESS_STICKER_KEY)
            .unwrap_or_else(|err| {
                warn!(error = %err, "could not read sticker setting");
                None
            });

        match outcome {
            FulfillmentOutcome::BalanceCredited { user } => {
                self.notifier
                    .notify_channel(&notifier::topup_channel_notice(
                        &user.username,
                        user.user_id,
                        trx.total_bayar,
                        &trx.ref_id,
                    ))
                    .await;
                if let Some(sticker) = &sticker_id {
                    self.notifier.notify_user_sticker(trx.user_id, sticker).await;
                }
                self.notifier
                    .notify_user(trx.user_id, &notifier::topup_user_notice(user.saldo))
                    .await;
            }
            FulfillmentOutcome::ContentDelivered { product, content } => {
                self.notifier
                    .notify_channel(&notifier::sale_channel_notice(
                        trx.user_id,
                        &product.nama_produk,
                        trx.total_bayar,
                        product.stok,
                        &trx.ref_id,
                    ))
                    .await;
                if let Some(sticker) = &sticker_id {
                    self.notifier.notify_user_sticker(trx.user_id, sticker).await;
                }
                self.notifier
                    .notify_user(
                        trx.user_id,
                        &notifier::purchase_receipt(
                            trx.total_bayar,
                            Utc::now(),
                            &trx.ref_id,
                            &product.nama_produk,
                            content,
                        ),
                    )
                    .await;
            }
            FulfillmentOutcome::OutOfStock { product } => {
                self.notifier
                    .notify_channel(&notifier::stock_exhausted_alert(
                        &trx.ref_id,
                        &product.nama_produk,
                    ))
                    .await;
                self.notifier
                    .notify_user(trx.user_id, &notifier::out_of_stock_notice(&trx.ref_id))
                    .await;
            }
            FulfillmentOutcome::ProductMissing { nama_produk } => {
                self.notifier
                    .notify_channel(&notifier::product_missing_alert(&trx.ref_id, nama_produk))
                    .await;
                self.notifier
                    .notify_user(
                        trx.user_id,
                        &notifier::product_missing_notice(&trx.ref_id, nama_produk),
                    )
                    .await;
            }
            FulfillmentOutcome::UserMissing { user_id } => {
                self.notifier
                    .notify_channel(&notifier::user_missing_alert(&trx.ref_id, *user_id))
                    .await;
            }
        }
    }
}
