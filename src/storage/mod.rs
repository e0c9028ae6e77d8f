// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storefront Storage Module
//!
//! Persistent storage over an embedded **redb** database shared with the
//! storefront bot. The bot creates pending transactions, user accounts, and
//! product stock; this service mutates them during callback reconciliation.
//!
//! ## Storage Layout
//!
//! ```text
//! {DATA_DIR}/store.redb
//!   transactions  refId     → StoredTransaction (JSON)
//!   users         userId    → StoredUser (JSON)
//!   products      productId → StoredProduct (JSON)
//!   settings      key       → value
//! ```
//!
//! ## Ownership
//!
//! - The ledger (`transactions`) is mutated only through
//!   [`StoreDatabase::transition_if_pending`]; records are never deleted.
//! - The `stok == kontenProduk.len()` invariant is owned by
//!   [`StoreDatabase::dispense_content`], the single writer of that pair.

pub mod database;
pub mod records;

pub use database::{DispenseOutcome, StoreDatabase, StoreDbError, StoreDbResult, TransitionOutcome};
pub use records::{
    ProdukInfo, StoredProduct, StoredTransaction, StoredUser, TransactionStatus,
    SUCCESS_STICKER_KEY,
};
