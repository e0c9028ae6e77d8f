// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded storefront database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `transactions`: refId → serialized StoredTransaction
//! - `users`: userId → serialized StoredUser
//! - `products`: productId → serialized StoredProduct
//! - `settings`: key → value string
//!
//! ## Atomicity
//!
//! redb write transactions are single-writer and serializable, which makes
//! them the store-native atomic update primitive the reconciliation flow
//! relies on: the conditional status transition and the content-pop +
//! stock-decrement each run inside one write transaction, so concurrent
//! callbacks (including from other process instances sharing the database
//! file) serialize at the store rather than through an in-process lock.

use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use super::records::{StoredProduct, StoredTransaction, StoredUser, TransactionStatus};

// =============================================================================
// Table Definitions
// =============================================================================

/// Primary ledger table: refId → serialized StoredTransaction (JSON bytes).
const TRANSACTIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("transactions");

/// User accounts: userId → serialized StoredUser (JSON bytes).
const USERS: TableDefinition<i64, &[u8]> = TableDefinition::new("users");

/// Product catalog: productId → serialized StoredProduct (JSON bytes).
const PRODUCTS: TableDefinition<&str, &[u8]> = TableDefinition::new("products");

/// Operational settings: key → value.
const SETTINGS: TableDefinition<&str, &str> = TableDefinition::new("settings");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreDbError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type StoreDbResult<T> = Result<T, StoreDbError>;

// =============================================================================
// Operation Results
// =============================================================================

/// Result of a conditional status transition.
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    /// Whether this call applied the transition. `false` means the
    /// transaction was already terminal and the caller must skip side effects.
    pub applied: bool,
    /// The transaction after the call (post-transition when applied).
    pub transaction: StoredTransaction,
}

/// Result of an atomic content dispense.
#[derive(Debug, Clone)]
pub enum DispenseOutcome {
    /// One content item was popped; counters already reflect the sale.
    Delivered { product: StoredProduct, content: String },
    /// The product exists but its content queue was empty; nothing mutated.
    OutOfStock { product: StoredProduct },
    /// No product matches the natural key.
    Missing,
}

// =============================================================================
// StoreDatabase
// =============================================================================

/// Embedded ACID storefront database.
pub struct StoreDatabase {
    db: Database,
}

impl StoreDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreDbResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(TRANSACTIONS)?;
            let _ = write_txn.open_table(USERS)?;
            let _ = write_txn.open_table(PRODUCTS)?;
            let _ = write_txn.open_table(SETTINGS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Cheap read used by the readiness probe.
    pub fn check(&self) -> StoreDbResult<()> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SETTINGS)?;
        let _ = table.get("__ready__")?;
        Ok(())
    }

    // =========================================================================
    // Transaction Ledger
    // =========================================================================

    /// Insert a pending transaction (bot-side contract; used by tests).
    pub fn insert_transaction(&self, trx: &StoredTransaction) -> StoreDbResult<()> {
        let json = serde_json::to_vec(trx)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(TRANSACTIONS)?;
            table.insert(trx.ref_id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Look up a transaction by reference id.
    pub fn get_transaction(&self, ref_id: &str) -> StoreDbResult<Option<StoredTransaction>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TRANSACTIONS)?;
        match table.get(ref_id)? {
            Some(value) => {
                let trx: StoredTransaction = serde_json::from_slice(value.value())?;
                Ok(Some(trx))
            }
            None => Ok(None),
        }
    }

    /// Atomically set a terminal status if the transaction is still pending.
    ///
    /// This is the single enforcement point of the idempotency guarantee:
    /// exactly one caller observes `applied == true` for a given refId, no
    /// matter how many callbacks race or redeliver. Returns `None` when the
    /// refId is unknown.
    pub fn transition_if_pending(
        &self,
        ref_id: &str,
        status: TransactionStatus,
        provenance: Option<String>,
    ) -> StoreDbResult<Option<TransitionOutcome>> {
        let write_txn = self.db.begin_write()?;
        let outcome = {
            let mut table = write_txn.open_table(TRANSACTIONS)?;

            let existing = match table.get(ref_id)? {
                Some(value) => Some(serde_json::from_slice::<StoredTransaction>(value.value())?),
                None => None,
            };

            match existing {
                None => None,
                Some(trx) if trx.status.is_terminal() => Some(TransitionOutcome {
                    applied: false,
                    transaction: trx,
                }),
                Some(mut trx) => {
                    trx.resolve(status, provenance);
                    let json = serde_json::to_vec(&trx)?;
                    table.insert(ref_id, json.as_slice())?;
                    Some(TransitionOutcome {
                        applied: true,
                        transaction: trx,
                    })
                }
            }
        };
        write_txn.commit()?;
        Ok(outcome)
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Insert or replace a user record (bot-side contract; used by tests).
    pub fn upsert_user(&self, user: &StoredUser) -> StoreDbResult<()> {
        let json = serde_json::to_vec(user)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(USERS)?;
            table.insert(user.user_id, json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Look up a user by id.
    pub fn get_user(&self, user_id: i64) -> StoreDbResult<Option<StoredUser>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USERS)?;
        match table.get(user_id)? {
            Some(value) => {
                let user: StoredUser = serde_json::from_slice(value.value())?;
                Ok(Some(user))
            }
            None => Ok(None),
        }
    }

    /// Atomically credit a settled top-up to a user's balance.
    ///
    /// Increments `saldo` by `amount` and `totalTransaksi` by 1 in one write
    /// transaction. Returns the updated record, or `None` when the user is
    /// missing (a reconciliation gap the caller surfaces to operators).
    pub fn credit_balance(&self, user_id: i64, amount: i64) -> StoreDbResult<Option<StoredUser>> {
        let write_txn = self.db.begin_write()?;
        let updated = {
            let mut table = write_txn.open_table(USERS)?;

            let existing = match table.get(user_id)? {
                Some(value) => Some(serde_json::from_slice::<StoredUser>(value.value())?),
                None => None,
            };

            match existing {
                None => None,
                Some(mut user) => {
                    user.credit(amount);
                    let json = serde_json::to_vec(&user)?;
                    table.insert(user_id, json.as_slice())?;
                    Some(user)
                }
            }
        };
        write_txn.commit()?;
        Ok(updated)
    }

    // =========================================================================
    // Product Inventory
    // =========================================================================

    /// Insert or replace a product record (bot-side contract; used by tests).
    pub fn upsert_product(&self, product: &StoredProduct) -> StoreDbResult<()> {
        let json = serde_json::to_vec(product)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(PRODUCTS)?;
            table.insert(product.product_id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Look up a product by its stable id.
    pub fn get_product(&self, product_id: &str) -> StoreDbResult<Option<StoredProduct>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PRODUCTS)?;
        match table.get(product_id)? {
            Some(value) => {
                let product: StoredProduct = serde_json::from_slice(value.value())?;
                Ok(Some(product))
            }
            None => Ok(None),
        }
    }

    /// Resolve a product by catalog natural key (name + category).
    ///
    /// Fulfillment resolves by natural key rather than by the order-time id:
    /// catalog entries can be deleted and re-created between order and
    /// callback. A rename in that window makes the product unresolvable and
    /// surfaces as a `Missing` dispense.
    pub fn find_product(
        &self,
        nama_produk: &str,
        kategori: &str,
    ) -> StoreDbResult<Option<StoredProduct>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PRODUCTS)?;
        for entry in table.iter()? {
            let (_, value) = entry?;
            let product: StoredProduct = serde_json::from_slice(value.value())?;
            if product.matches(nama_produk, kategori) {
                return Ok(Some(product));
            }
        }
        Ok(None)
    }

    /// Atomically dispense one content item from the product matching the
    /// natural key.
    ///
    /// Natural-key resolution, the queue pop, the stock decrement, and the
    /// sold counter all happen inside a single write transaction, so two
    /// concurrent fulfillments can never both read the same head element.
    pub fn dispense_content(
        &self,
        nama_produk: &str,
        kategori: &str,
    ) -> StoreDbResult<DispenseOutcome> {
        let write_txn = self.db.begin_write()?;
        let outcome = {
            let mut table = write_txn.open_table(PRODUCTS)?;

            let mut found: Option<StoredProduct> = None;
            for entry in table.iter()? {
                let (_, value) = entry?;
                let product: StoredProduct = serde_json::from_slice(value.value())?;
                if product.matches(nama_produk, kategori) {
                    found = Some(product);
                    break;
                }
            }

            match found {
                None => DispenseOutcome::Missing,
                Some(mut product) => match product.dispense() {
                    Some(content) => {
                        let json = serde_json::to_vec(&product)?;
                        table.insert(product.product_id.as_str(), json.as_slice())?;
                        DispenseOutcome::Delivered { product, content }
                    }
                    None => DispenseOutcome::OutOfStock { product },
                },
            }
        };
        write_txn.commit()?;
        Ok(outcome)
    }

    // =========================================================================
    // Settings
    // =========================================================================

    /// Read an operational setting.
    pub fn get_setting(&self, key: &str) -> StoreDbResult<Option<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SETTINGS)?;
        match table.get(key)? {
            Some(value) => Ok(Some(value.value().to_string())),
            None => Ok(None),
        }
    }

    /// Write an operational setting (bot-side contract; used by tests).
    pub fn put_setting(&self, key: &str, value: &str) -> StoreDbResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SETTINGS)?;
            table.insert(key, value)?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::records::ProdukInfo;

    fn temp_db() -> (StoreDatabase, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = StoreDatabase::open(&dir.path().join("store.redb")).unwrap();
        (db, dir)
    }

    fn pending_topup(ref_id: &str, user_id: i64, amount: i64) -> StoredTransaction {
        StoredTransaction::new_pending(ref_id.to_string(), user_id, amount, ProdukInfo::Topup)
    }

    fn sample_product(content: &[&str]) -> StoredProduct {
        StoredProduct::new(
            "prod-1".to_string(),
            "Spotify Premium".to_string(),
            "Streaming".to_string(),
            content.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn insert_and_get_transaction() {
        let (db, _dir) = temp_db();
        db.insert_transaction(&pending_topup("TOPUP-1", 42, 50000)).unwrap();

        let trx = db.get_transaction("TOPUP-1").unwrap().unwrap();
        assert_eq!(trx.user_id, 42);
        assert_eq!(trx.status, TransactionStatus::Pending);
        assert!(db.get_transaction("TOPUP-2").unwrap().is_none());
    }

    #[test]
    fn transition_applies_exactly_once() {
        let (db, _dir) = temp_db();
        db.insert_transaction(&pending_topup("TOPUP-1", 42, 50000)).unwrap();

        let first = db
            .transition_if_pending("TOPUP-1", TransactionStatus::Success, Some("origin:ip".into()))
            .unwrap()
            .unwrap();
        assert!(first.applied);
        assert_eq!(first.transaction.status, TransactionStatus::Success);
        assert_eq!(first.transaction.vmp_signature.as_deref(), Some("origin:ip"));

        // Redelivery of the same status is a no-op
        let second = db
            .transition_if_pending("TOPUP-1", TransactionStatus::Success, None)
            .unwrap()
            .unwrap();
        assert!(!second.applied);
        assert_eq!(second.transaction.status, TransactionStatus::Success);
        // The original provenance survives the no-op
        assert_eq!(second.transaction.vmp_signature.as_deref(), Some("origin:ip"));
    }

    #[test]
    fn terminal_status_is_never_overwritten() {
        let (db, _dir) = temp_db();
        db.insert_transaction(&pending_topup("TOPUP-1", 42, 50000)).unwrap();

        db.transition_if_pending("TOPUP-1", TransactionStatus::Failed, None)
            .unwrap()
            .unwrap();

        // A later "success" for the same refId must not resurrect it
        let late = db
            .transition_if_pending("TOPUP-1", TransactionStatus::Success, None)
            .unwrap()
            .unwrap();
        assert!(!late.applied);
        assert_eq!(late.transaction.status, TransactionStatus::Failed);
    }

    #[test]
    fn transition_unknown_ref_returns_none() {
        let (db, _dir) = temp_db();
        let outcome = db
            .transition_if_pending("PROD-404", TransactionStatus::Success, None)
            .unwrap();
        assert!(outcome.is_none());
    }

    #[test]
    fn credit_balance_updates_user() {
        let (db, _dir) = temp_db();
        db.upsert_user(&StoredUser {
            user_id: 42,
            username: "alice".to_string(),
            saldo: 1000,
            total_transaksi: 0,
        })
        .unwrap();

        let updated = db.credit_balance(42, 50000).unwrap().unwrap();
        assert_eq!(updated.saldo, 51000);
        assert_eq!(updated.total_transaksi, 1);

        let stored = db.get_user(42).unwrap().unwrap();
        assert_eq!(stored.saldo, 51000);
    }

    #[test]
    fn credit_balance_missing_user_returns_none() {
        let (db, _dir) = temp_db();
        assert!(db.credit_balance(999, 1000).unwrap().is_none());
    }

    #[test]
    fn dispense_pops_head_and_persists_counters() {
        let (db, _dir) = temp_db();
        db.upsert_product(&sample_product(&["KEY1", "KEY2"])).unwrap();

        let outcome = db.dispense_content("Spotify Premium", "Streaming").unwrap();
        let DispenseOutcome::Delivered { product, content } = outcome else {
            panic!("expected Delivered");
        };
        assert_eq!(content, "KEY1");
        assert_eq!(product.stok, 1);
        assert_eq!(product.total_terjual, 1);

        let stored = db.get_product("prod-1").unwrap().unwrap();
        assert_eq!(stored.stok as usize, stored.konten_produk.len());
        assert_eq!(stored.konten_produk.front().map(String::as_str), Some("KEY2"));
    }

    #[test]
    fn dispense_empty_queue_reports_out_of_stock_without_mutation() {
        let (db, _dir) = temp_db();
        db.upsert_product(&sample_product(&[])).unwrap();

        let outcome = db.dispense_content("Spotify Premium", "Streaming").unwrap();
        assert!(matches!(outcome, DispenseOutcome::OutOfStock { .. }));

        let stored = db.get_product("prod-1").unwrap().unwrap();
        assert_eq!(stored.stok, 0);
        assert_eq!(stored.total_terjual, 0);
    }

    #[test]
    fn dispense_unknown_natural_key_reports_missing() {
        let (db, _dir) = temp_db();
        db.upsert_product(&sample_product(&["KEY1"])).unwrap();

        // Same name, different category: natural key must match both halves
        let outcome = db.dispense_content("Spotify Premium", "Music").unwrap();
        assert!(matches!(outcome, DispenseOutcome::Missing));
    }

    #[test]
    fn find_product_by_natural_key() {
        let (db, _dir) = temp_db();
        db.upsert_product(&sample_product(&["KEY1"])).unwrap();

        let found = db.find_product("Spotify Premium", "Streaming").unwrap();
        assert_eq!(found.unwrap().product_id, "prod-1");
        assert!(db.find_product("Netflix", "Streaming").unwrap().is_none());
    }

    #[test]
    fn settings_roundtrip() {
        let (db, _dir) = temp_db();
        assert!(db.get_setting("success_sticker_id").unwrap().is_none());

        db.put_setting("success_sticker_id", "CAACAgI123").unwrap();
        assert_eq!(
            db.get_setting("success_sticker_id").unwrap().as_deref(),
            Some("CAACAgI123")
        );
    }

    #[test]
    fn check_succeeds_on_open_database() {
        let (db, _dir) = temp_db();
        db.check().unwrap();
    }
}
