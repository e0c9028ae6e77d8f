// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Persisted record types shared with the storefront bot.
//!
//! The bot creates transactions, users, and products; this service only
//! mutates them on callback. Field names keep the bot's document contract
//! (camelCase), so both sides read the same JSON.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Setting key holding the optional success sticker media id.
pub const SUCCESS_STICKER_KEY: &str = "success_sticker_id";

/// Transaction lifecycle status.
///
/// `Pending` is the only non-terminal state. Once a transaction leaves
/// `Pending` it is never overwritten (enforced by
/// [`StoreDatabase::transition_if_pending`](super::StoreDatabase::transition_if_pending)).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    /// Awaiting a provider callback.
    Pending,
    /// Payment settled and fulfillment ran.
    Success,
    /// Provider reported the payment failed.
    Failed,
    /// Payment window elapsed without settlement.
    Expired,
}

impl TransactionStatus {
    /// Whether the status is terminal (anything but `Pending`).
    pub fn is_terminal(self) -> bool {
        self != TransactionStatus::Pending
    }
}

/// What a transaction pays for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProdukInfo {
    /// Balance top-up; `totalBayar` is credited to the user's `saldo`.
    #[serde(rename = "TOPUP")]
    Topup,
    /// Digital product purchase, identified by catalog natural key.
    #[serde(rename = "PRODUCT", rename_all = "camelCase")]
    Product { nama_produk: String, kategori: String },
}

impl ProdukInfo {
    /// Human-readable item name for user-facing messages.
    pub fn display_name(&self) -> &str {
        match self {
            ProdukInfo::Topup => "Balance Top-Up",
            ProdukInfo::Product { nama_produk, .. } => nama_produk,
        }
    }
}

/// A storefront transaction awaiting (or past) reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredTransaction {
    /// Canonical reference id, prefixed `PROD-` or `TOPUP-`. Immutable.
    pub ref_id: String,
    /// Owning user (Telegram chat id).
    pub user_id: i64,
    /// Current lifecycle status.
    pub status: TransactionStatus,
    /// Amount paid, integer minor units (rupiah).
    pub total_bayar: i64,
    /// What was bought.
    pub produk_info: ProdukInfo,
    /// Provenance marker recorded when the transaction settled, for audit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vmp_signature: Option<String>,
    /// When the bot created the transaction.
    pub created_at: DateTime<Utc>,
    /// When the status last changed.
    pub updated_at: DateTime<Utc>,
}

impl StoredTransaction {
    /// Create a new pending transaction (the bot-side contract; tests use
    /// this too).
    pub fn new_pending(ref_id: String, user_id: i64, total_bayar: i64, produk_info: ProdukInfo) -> Self {
        let now = Utc::now();
        Self {
            ref_id,
            user_id,
            status: TransactionStatus::Pending,
            total_bayar,
            produk_info,
            vmp_signature: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a terminal status and provenance marker.
    pub fn resolve(&mut self, status: TransactionStatus, provenance: Option<String>) {
        self.status = status;
        self.vmp_signature = provenance;
        self.updated_at = Utc::now();
    }
}

/// A storefront user account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredUser {
    /// Telegram chat id.
    pub user_id: i64,
    /// Display name captured by the bot.
    pub username: String,
    /// Balance in integer minor units; only successful top-ups increase it.
    pub saldo: i64,
    /// Lifetime settled transaction count.
    pub total_transaksi: i64,
}

impl StoredUser {
    /// Credit a settled top-up.
    pub fn credit(&mut self, amount: i64) {
        self.saldo += amount;
        self.total_transaksi += 1;
    }
}

/// A catalog product with dispensable content.
///
/// `stok` mirrors the remaining content count at all times: the only
/// mutation path is [`StoredProduct::dispense`], which pops and recounts in
/// one step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredProduct {
    /// Stable storage key.
    pub product_id: String,
    /// Catalog name (half of the natural key).
    pub nama_produk: String,
    /// Catalog category (other half of the natural key).
    pub kategori: String,
    /// Deliverable content, consumed front-to-back.
    pub konten_produk: VecDeque<String>,
    /// Remaining content count.
    pub stok: u32,
    /// Lifetime units sold.
    pub total_terjual: u64,
}

impl StoredProduct {
    /// Create a product; `stok` is derived from the content length.
    pub fn new(
        product_id: String,
        nama_produk: String,
        kategori: String,
        konten_produk: Vec<String>,
    ) -> Self {
        let konten_produk: VecDeque<String> = konten_produk.into();
        let stok = konten_produk.len() as u32;
        Self {
            product_id,
            nama_produk,
            kategori,
            konten_produk,
            stok,
            total_terjual: 0,
        }
    }

    /// Pop the next deliverable content item.
    ///
    /// Adjusts `stok` to the remaining queue length and counts the sale in
    /// the same step, so the `stok == konten_produk.len()` invariant cannot
    /// be observed broken. Returns `None` without touching any counter when
    /// the queue is empty.
    pub fn dispense(&mut self) -> Option<String> {
        let content = self.konten_produk.pop_front()?;
        self.stok = self.konten_produk.len() as u32;
        self.total_terjual += 1;
        Some(content)
    }

    /// Whether this product matches a catalog natural key.
    pub fn matches(&self, nama_produk: &str, kategori: &str) -> bool {
        self.nama_produk == nama_produk && self.kategori == kategori
    }
}
