// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Type-specific side effects for settled transactions.
//!
//! The engine is invoked at most once per transaction (the ledger's
//! conditional transition guarantees that), and each branch delegates its
//! mutation to a single atomic store operation.

use std::sync::Arc;

use crate::storage::{
    DispenseOutcome, ProdukInfo, StoreDatabase, StoreDbResult, StoredProduct, StoredTransaction,
    StoredUser,
};

/// What fulfillment achieved for a settled transaction.
///
/// `ProductMissing` and `UserMissing` are operator-alert outcomes, not
/// errors: the payment was real and the transaction stays settled; the gap
/// between "paid" and "delivered" is surfaced for manual resolution.
#[derive(Debug, Clone)]
pub enum FulfillmentOutcome {
    /// Top-up credited; `user` carries the updated balance for messaging.
    BalanceCredited { user: StoredUser },
    /// One content item dispensed; counters already reflect the sale.
    ContentDelivered { product: StoredProduct, content: String },
    /// Product exists but its content queue was empty; nothing mutated.
    OutOfStock { product: StoredProduct },
    /// No catalog entry matches the order-time natural key.
    ProductMissing { nama_produk: String },
    /// No account record for the transaction's user.
    UserMissing { user_id: i64 },
}

/// Fulfillment engine over the storefront store.
pub struct FulfillmentEngine {
    db: Arc<StoreDatabase>,
}

impl FulfillmentEngine {
    pub fn new(db: Arc<StoreDatabase>) -> Self {
        Self { db }
    }

    /// Perform the type-specific side effect for a settled transaction.
    ///
    /// No network calls happen here; notification is the orchestrator's job.
    pub fn fulfill(&self, trx: &StoredTransaction) -> StoreDbResult<FulfillmentOutcome> {
        match &trx.produk_info {
            ProdukInfo::Topup => {
                let outcome = match self.db.credit_balance(trx.user_id, trx.total_bayar)? {
                    Some(user) => FulfillmentOutcome::BalanceCredited { user },
                    None => FulfillmentOutcome::UserMissing {
                        user_id: trx.user_id,
                    },
                };
                Ok(outcome)
            }
            ProdukInfo::Product {
                nama_produk,
                kategori,
            } => {
                // Resolve by natural key, not the order-time id: the catalog
                // entry may have been re-created since the order was placed.
                let outcome = match self.db.dispense_content(nama_produk, kategori)? {
                    DispenseOutcome::Delivered { product, content } => {
                        FulfillmentOutcome::ContentDelivered { product, content }
                    }
                    DispenseOutcome::OutOfStock { product } => {
                        FulfillmentOutcome::OutOfStock { product }
                    }
                    DispenseOutcome::Missing => FulfillmentOutcome::ProductMissing {
                        nama_produk: nama_produk.clone(),
                    },
                };
                Ok(outcome)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::records::ProdukInfo;

    fn setup() -> (FulfillmentEngine, Arc<StoreDatabase>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(StoreDatabase::open(&dir.path().join("store.redb")).unwrap());
        (FulfillmentEngine::new(Arc::clone(&db)), db, dir)
    }

    fn topup_trx(amount: i64) -> StoredTransaction {
        StoredTransaction::new_pending("TOPUP-1".to_string(), 42, amount, ProdukInfo::Topup)
    }

    fn product_trx(nama: &str, kategori: &str) -> StoredTransaction {
        StoredTransaction::new_pending(
            "PROD-7".to_string(),
            42,
            15000,
            ProdukInfo::Product {
                nama_produk: nama.to_string(),
                kategori: kategori.to_string(),
            },
        )
    }

    #[test]
    fn topup_credits_balance() {
        let (engine, db, _dir) = setup();
        db.upsert_user(&StoredUser {
            user_id: 42,
            username: "alice".to_string(),
            saldo: 0,
            total_transaksi: 0,
        })
        .unwrap();

        let outcome = engine.fulfill(&topup_trx(50000)).unwrap();
        let FulfillmentOutcome::BalanceCredited { user } = outcome else {
            panic!("expected BalanceCredited");
        };
        assert_eq!(user.saldo, 50000);
        assert_eq!(user.total_transaksi, 1);
    }

    #[test]
    fn topup_for_unknown_user_reports_gap() {
        let (engine, _db, _dir) = setup();
        let outcome = engine.fulfill(&topup_trx(50000)).unwrap();
        assert!(matches!(
            outcome,
            FulfillmentOutcome::UserMissing { user_id: 42 }
        ));
    }

    #[test]
    fn product_purchase_dispenses_head_content() {
        let (engine, db, _dir) = setup();
        db.upsert_product(&StoredProduct::new(
            "prod-1".to_string(),
            "Spotify Premium".to_string(),
            "Streaming".to_string(),
            vec!["KEY1".to_string()],
        ))
        .unwrap();

        let outcome = engine
            .fulfill(&product_trx("Spotify Premium", "Streaming"))
            .unwrap();
        let FulfillmentOutcome::ContentDelivered { product, content } = outcome else {
            panic!("expected ContentDelivered");
        };
        assert_eq!(content, "KEY1");
        assert_eq!(product.stok, 0);
        assert_eq!(product.total_terjual, 1);
    }

    #[test]
    fn empty_queue_is_out_of_stock() {
        let (engine, db, _dir) = setup();
        db.upsert_product(&StoredProduct::new(
            "prod-1".to_string(),
            "Spotify Premium".to_string(),
            "Streaming".to_string(),
            vec![],
        ))
        .unwrap();

        let outcome = engine
            .fulfill(&product_trx("Spotify Premium", "Streaming"))
            .unwrap();
        assert!(matches!(outcome, FulfillmentOutcome::OutOfStock { .. }));
    }

    #[test]
    fn renamed_catalog_entry_is_product_missing() {
        let (engine, db, _dir) = setup();
        db.upsert_product(&StoredProduct::new(
            "prod-1".to_string(),
            "Spotify Family".to_string(),
            "Streaming".to_string(),
            vec!["KEY1".to_string()],
        ))
        .unwrap();

        let outcome = engine
            .fulfill(&product_trx("Spotify Premium", "Streaming"))
            .unwrap();
        let FulfillmentOutcome::ProductMissing { nama_produk } = outcome else {
            panic!("expected ProductMissing");
        };
        assert_eq!(nama_produk, "Spotify Premium");
    }
}
