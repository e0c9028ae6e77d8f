// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Best-effort notification dispatch.
//!
//! Everything in this module is advisory: fulfillment has already committed
//! by the time a notice is sent, and a delivery failure must never unwind
//! it. Methods therefore return nothing; failures are logged, and a failed
//! channel notice is escalated once to the first configured operator.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Timelike, Utc};
use tracing::{debug, warn};

use crate::providers::telegram::{TelegramClient, PARSE_MODE_MARKDOWN};

/// Advisory notification sink.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send a text message to a buyer.
    async fn notify_user(&self, user_id: i64, text: &str);

    /// Send a sticker to a buyer.
    async fn notify_user_sticker(&self, user_id: i64, file_id: &str);

    /// Send a notice to the operations channel.
    async fn notify_channel(&self, text: &str);
}

/// Telegram-backed notifier.
pub struct TelegramNotifier {
    client: Option<TelegramClient>,
    channel_id: Option<String>,
    admin_ids: Vec<i64>,
}

impl TelegramNotifier {
    /// Build a notifier. A `None` client (no bot token configured) turns
    /// every dispatch into a logged no-op.
    pub fn new(
        client: Option<TelegramClient>,
        channel_id: Option<String>,
        admin_ids: Vec<i64>,
    ) -> Self {
        Self {
            client,
            channel_id,
            admin_ids,
        }
    }

    async fn send_text(&self, chat_id: &str, text: &str) -> bool {
        let Some(client) = &self.client else {
            debug!(chat_id, "notification skipped: no bot token configured");
            return false;
        };
        match client
            .send_message(chat_id, text, Some(PARSE_MODE_MARKDOWN))
            .await
        {
            Ok(()) => true,
            Err(error) => {
                warn!(chat_id, %error, "failed to deliver message");
                false
            }
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify_user(&self, user_id: i64, text: &str) {
        self.send_text(&user_id.to_string(), text).await;
    }

    async fn notify_user_sticker(&self, user_id: i64, file_id: &str) {
        let Some(client) = &self.client else {
            debug!(user_id, "sticker skipped: no bot token configured");
            return;
        };
        if let Err(error) = client.send_sticker(&user_id.to_string(), file_id).await {
            warn!(user_id, %error, "failed to deliver sticker");
        }
    }

    async fn notify_channel(&self, text: &str) {
        let Some(channel_id) = self.channel_id.clone() else {
            debug!("channel notice skipped: no channel configured");
            return;
        };
        if self.send_text(&channel_id, text).await {
            return;
        }

        // Single escalation attempt to the first operator; if that also
        // fails it has already been logged by send_text.
        if let Some(admin_id) = self.admin_ids.first() {
            let alert = format!(
                "⚠️ Failed to deliver a notice to channel `{channel_id}`. \
                 Check that the bot is an admin of the channel and the id is correct."
            );
            self.send_text(&admin_id.to_string(), &alert).await;
        }
    }
}

// =============================================================================
// Message builders
// =============================================================================

/// Render an amount of integer minor units as rupiah with dot grouping,
/// e.g. `Rp 50.000`.
pub fn format_rupiah(amount: i64) -> String {
    let digits = amount.abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }
    if amount < 0 {
        format!("-Rp {grouped}")
    } else {
        format!("Rp {grouped}")
    }
}

/// Receipt timestamp, `d/m/yyyy, hh.mm.ss`.
pub fn format_receipt_date(at: DateTime<Utc>) -> String {
    format!(
        "{}/{}/{}, {:02}.{:02}.{:02}",
        at.day(),
        at.month(),
        at.year(),
        at.hour(),
        at.minute(),
        at.second()
    )
}

/// Channel notice for a settled top-up.
pub fn topup_channel_notice(username: &str, user_id: i64, total: i64, ref_id: &str) -> String {
    format!(
        "💰 **TOP-UP SETTLED (QRIS)** 💰\n\n\
         👤 **User:** [{username}](tg://user?id={user_id})\n\
         💰 **Total:** `{}`\n\
         🆔 **Ref ID:** `{ref_id}`",
        format_rupiah(total)
    )
}

/// Buyer notice for a settled top-up, showing the new balance.
pub fn topup_user_notice(saldo: i64) -> String {
    format!(
        "🎉 Top-up successful!\nYour balance is now {}.",
        format_rupiah(saldo)
    )
}

/// Channel notice for a product sale, including remaining stock.
pub fn sale_channel_notice(
    user_id: i64,
    nama_produk: &str,
    total: i64,
    stock_after: u32,
    ref_id: &str,
) -> String {
    let stock_before = stock_after + 1;
    format!(
        "🎉 **NEW SALE (QRIS)** 🎉\n\n\
         👤 **Buyer:** [User](tg://user?id={user_id})\n\
         🛍️ **Product:** `{nama_produk}`\n\
         💰 **Total:** `{}`\n\n\
         📦 **Remaining stock:** `{stock_after}` pcs (was {stock_before})\n\
         🆔 **Ref ID:** `{ref_id}`",
        format_rupiah(total)
    )
}

/// Buyer receipt with the delivered content.
pub fn purchase_receipt(
    total: i64,
    at: DateTime<Utc>,
    ref_id: &str,
    nama_produk: &str,
    content: &str,
) -> String {
    format!(
        "📜 *Purchase successful*\n\
         Thank you for buying from our store.\n\n\
         *Order details:*\n\
         — *Total paid:* {}\n\
         — *Date:* {}\n\
         — *Payment method:* QRIS\n\
         — *Items:* 1x\n\
         — *Transaction id:* {ref_id}\n\n\
         *{nama_produk}*\n\
         ```txt\n1. {content}\n```",
        format_rupiah(total),
        format_receipt_date(at)
    )
}

/// Buyer notice when payment settled but the content queue was empty.
pub fn out_of_stock_notice(ref_id: &str) -> String {
    format!(
        "⚠️ Your payment (`{ref_id}`) succeeded, but the product is out of stock. \
         Please contact the operator!"
    )
}

/// Buyer notice when payment settled but the catalog entry is gone.
pub fn product_missing_notice(ref_id: &str, nama_produk: &str) -> String {
    format!(
        "⚠️ Your payment (`{ref_id}`) succeeded, but the product `{nama_produk}` \
         could not be found. Please contact the operator!"
    )
}

/// Buyer notice for a failed or expired transaction.
pub fn cancellation_notice(item_name: &str, ref_id: &str) -> String {
    format!(
        "❌ *Transaction failed or expired!*\n\n\
         Your transaction for `{item_name}` (`{ref_id}`) has been cancelled."
    )
}

/// Operations alert: payment settled but the content queue was empty.
pub fn stock_exhausted_alert(ref_id: &str, nama_produk: &str) -> String {
    format!(
        "⚠️ **MANUAL RESOLUTION NEEDED**\n\n\
         Payment `{ref_id}` settled but `{nama_produk}` has no stock left. \
         The buyer has been told to contact an operator."
    )
}

/// Operations alert: payment settled but the catalog entry is gone.
pub fn product_missing_alert(ref_id: &str, nama_produk: &str) -> String {
    format!(
        "⚠️ **MANUAL RESOLUTION NEEDED**\n\n\
         Payment `{ref_id}` settled but product `{nama_produk}` no longer \
         exists in the catalog. The buyer has been told to contact an operator."
    )
}

/// Operations alert: top-up settled but the user record is missing.
pub fn user_missing_alert(ref_id: &str, user_id: i64) -> String {
    format!(
        "⚠️ **MANUAL RESOLUTION NEEDED**\n\n\
         Top-up `{ref_id}` settled but user `{user_id}` has no account record. \
         The balance credit was not applied."
    )
}

// =============================================================================
// Test support
// =============================================================================

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use super::*;

    /// What a [`RecordingNotifier`] captured.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum SentNotice {
        User(i64, String),
        Sticker(i64, String),
        Channel(String),
    }

    /// In-memory notifier recording every dispatch for assertions.
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub sent: Mutex<Vec<SentNotice>>,
    }

    impl RecordingNotifier {
        pub fn take(&self) -> Vec<SentNotice> {
            std::mem::take(&mut self.sent.lock().unwrap())
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify_user(&self, user_id: i64, text: &str) {
            self.sent
                .lock()
                .unwrap()
                .push(SentNotice::User(user_id, text.to_string()));
        }

        async fn notify_user_sticker(&self, user_id: i64, file_id: &str) {
            self.sent
                .lock()
                .unwrap()
                .push(SentNotice::Sticker(user_id, file_id.to_string()));
        }

        async fn notify_channel(&self, text: &str) {
            self.sent
                .lock()
                .unwrap()
                .push(SentNotice::Channel(text.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn rupiah_grouping() {
        assert_eq!(format_rupiah(0), "Rp 0");
        assert_eq!(format_rupiah(500), "Rp 500");
        assert_eq!(format_rupiah(50000), "Rp 50.000");
        assert_eq!(format_rupiah(1250000), "Rp 1.250.000");
    }

    #[test]
    fn receipt_date_format() {
        let at = Utc.with_ymd_and_hms(2026, 8, 5, 14, 30, 5).unwrap();
        assert_eq!(format_receipt_date(at), "5/8/2026, 14.30.05");
    }

    #[test]
    fn sale_notice_shows_stock_before_and_after() {
        let notice = sale_channel_notice(42, "Spotify Premium", 15000, 4, "PROD-7");
        assert!(notice.contains("`4` pcs (was 5)"));
        assert!(notice.contains("Rp 15.000"));
        assert!(notice.contains("PROD-7"));
    }

    #[test]
    fn receipt_contains_content_in_code_block() {
        let at = Utc.with_ymd_and_hms(2026, 8, 5, 14, 30, 5).unwrap();
        let receipt = purchase_receipt(15000, at, "PROD-7", "Spotify Premium", "KEY1");
        assert!(receipt.contains("```txt\n1. KEY1\n```"));
        assert!(receipt.contains("*Spotify Premium*"));
    }

    #[tokio::test]
    async fn disabled_notifier_is_a_quiet_no_op() {
        let notifier = TelegramNotifier::new(None, Some("-100123".to_string()), vec![1]);
        // Must not panic or attempt network I/O
        notifier.notify_user(42, "hi").await;
        notifier.notify_user_sticker(42, "sticker").await;
        notifier.notify_channel("notice").await;
    }
}
