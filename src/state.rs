// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use tracing::warn;

use crate::callback::{CallbackOrchestrator, OriginAuthenticator};
use crate::config::AppConfig;
use crate::notifier::{Notifier, TelegramNotifier};
use crate::providers::telegram::TelegramClient;
use crate::storage::StoreDatabase;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<StoreDatabase>,
    pub orchestrator: Arc<CallbackOrchestrator>,
}

impl AppState {
    /// Wire the orchestrator and its collaborators from configuration.
    pub fn new(config: &AppConfig, db: Arc<StoreDatabase>) -> Self {
        let client = config.bot_token.as_deref().and_then(|token| {
            match TelegramClient::new(&config.telegram_api_base_url, token) {
                Ok(client) => Some(client),
                Err(error) => {
                    warn!(%error, "could not build Telegram client; notifications disabled");
                    None
                }
            }
        });

        let notifier: Arc<dyn Notifier> = Arc::new(TelegramNotifier::new(
            client,
            config.channel_id.clone(),
            config.admin_ids.clone(),
        ));

        let authenticator = OriginAuthenticator::new(
            config.allowed_origins.clone(),
            config.signature_secret.clone(),
        );

        let orchestrator = Arc::new(CallbackOrchestrator::new(
            Arc::clone(&db),
            authenticator,
            notifier,
        ));

        Self { db, orchestrator }
    }

    /// State over a fresh store in `dir`, with notifications disabled and an
    /// empty allow-list.
    #[cfg(test)]
    pub fn for_tests(dir: &std::path::Path) -> Self {
        let db = Arc::new(StoreDatabase::open(&dir.join("store.redb")).unwrap());
        let config = AppConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            data_dir: dir.to_path_buf(),
            bot_token: None,
            telegram_api_base_url: "https://api.telegram.org".to_string(),
            channel_id: None,
            admin_ids: Vec::new(),
            allowed_origins: std::collections::HashSet::new(),
            signature_secret: None,
        };
        Self::new(&config, db)
    }
}
