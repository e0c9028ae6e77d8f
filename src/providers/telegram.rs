// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Telegram Bot API client for buyer and operations notifications.

use std::time::Duration;

use reqwest::Client;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Markdown parse mode used for all formatted notices.
pub const PARSE_MODE_MARKDOWN: &str = "Markdown";

#[derive(Debug, thiserror::Error)]
pub enum TelegramError {
    #[error("Telegram request failed: {0}")]
    Request(String),

    #[error("Telegram API returned an error: {0}")]
    Api(String),
}

/// Thin client over the Telegram Bot API.
///
/// Only the two methods the callback flow needs are wrapped: `sendMessage`
/// and `sendSticker`. Both are plain form posts.
#[derive(Debug, Clone)]
pub struct TelegramClient {
    api_base_url: String,
    bot_token: String,
    http: Client,
}

impl TelegramClient {
    /// Build a client for the given API base URL and bot token.
    pub fn new(api_base_url: &str, bot_token: &str) -> Result<Self, TelegramError> {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| TelegramError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            bot_token: bot_token.to_string(),
            http,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base_url, self.bot_token, method)
    }

    /// Send a text message to a chat.
    pub async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        parse_mode: Option<&str>,
    ) -> Result<(), TelegramError> {
        let mut form = vec![("chat_id", chat_id), ("text", text)];
        if let Some(mode) = parse_mode {
            form.push(("parse_mode", mode));
        }
        self.post_form("sendMessage", &form).await
    }

    /// Send a sticker to a chat.
    pub async fn send_sticker(&self, chat_id: &str, file_id: &str) -> Result<(), TelegramError> {
        let form = [("chat_id", chat_id), ("sticker", file_id)];
        self.post_form("sendSticker", &form).await
    }

    async fn post_form(&self, method: &str, form: &[(&str, &str)]) -> Result<(), TelegramError> {
        let response = self
            .http
            .post(self.method_url(method))
            .form(form)
            .send()
            .await
            .map_err(|e| TelegramError::Request(format!("POST {method} failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TelegramError::Api(format!(
                "{method} returned {status}: {body}"
            )));
        }

        Ok(())
    }
}
