// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment exactly once, in `main`, and
//! passed down as an explicit [`AppConfig`] value. Handlers and the
//! orchestrator never consult the environment themselves, so tests can
//! construct a config directly.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `DATA_DIR` | Directory holding the embedded store | `/data` |
//! | `BOT_TOKEN` | Telegram bot token for notifications | Unset disables dispatch |
//! | `TELEGRAM_API_BASE_URL` | Telegram Bot API base URL | `https://api.telegram.org` |
//! | `CHANNEL_ID` | Operations channel chat id | Unset disables channel notices |
//! | `ADMIN_IDS` | Comma-separated operator chat ids | Empty |
//! | `CALLBACK_ALLOWED_IPS` | Comma-separated trusted gateway addresses | Gateway's published addresses |
//! | `CALLBACK_SIGNATURE_SECRET` | HMAC secret for payload verification | Unset = perimeter-trust mode |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::collections::HashSet;
use std::path::PathBuf;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DATA_DIR: &str = "/data";
const DEFAULT_TELEGRAM_API_BASE_URL: &str = "https://api.telegram.org";

/// The payment gateway's published callback source addresses. Overridable
/// via `CALLBACK_ALLOWED_IPS`.
const DEFAULT_ALLOWED_IPS: [&str; 2] = ["202.155.132.37", "2001:df7:5300:9::122"];

/// Resolved runtime configuration, constructed once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server bind address.
    pub host: String,
    /// Server bind port.
    pub port: u16,
    /// Directory holding the embedded store database file.
    pub data_dir: PathBuf,
    /// Telegram bot token; `None` disables all outbound notifications.
    pub bot_token: Option<String>,
    /// Telegram Bot API base URL (overridable for tests).
    pub telegram_api_base_url: String,
    /// Operations channel chat id for sale/top-up notices.
    pub channel_id: Option<String>,
    /// Operator chat ids; the first one receives escalations when a channel
    /// notice cannot be delivered.
    pub admin_ids: Vec<i64>,
    /// Trusted callback source addresses (exact match).
    pub allowed_origins: HashSet<String>,
    /// HMAC-SHA256 secret for callback payload verification; `None` leaves
    /// the service in perimeter-trust mode (allow-list only).
    pub signature_secret: Option<String>,
}

impl AppConfig {
    /// Load configuration from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let port = env_optional("PORT")
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let admin_ids = env_optional("ADMIN_IDS")
            .map(|raw| parse_id_list(&raw))
            .unwrap_or_default();

        let allowed_origins = env_optional("CALLBACK_ALLOWED_IPS")
            .map(|raw| parse_address_list(&raw))
            .unwrap_or_else(|| {
                DEFAULT_ALLOWED_IPS
                    .iter()
                    .map(|addr| addr.to_string())
                    .collect()
            });

        Self {
            host: env_or_default("HOST", DEFAULT_HOST),
            port,
            data_dir: PathBuf::from(env_or_default("DATA_DIR", DEFAULT_DATA_DIR)),
            bot_token: env_optional("BOT_TOKEN"),
            telegram_api_base_url: env_or_default(
                "TELEGRAM_API_BASE_URL",
                DEFAULT_TELEGRAM_API_BASE_URL,
            ),
            channel_id: env_optional("CHANNEL_ID"),
            admin_ids,
            allowed_origins,
            signature_secret: env_optional("CALLBACK_SIGNATURE_SECRET"),
        }
    }

    /// Path of the embedded store database file.
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("store.redb")
    }
}

fn parse_id_list(raw: &str) -> Vec<i64> {
    raw.split(',')
        .filter_map(|part| {
            let trimmed = part.trim();
            if trimmed.is_empty() {
                return None;
            }
            match trimmed.parse() {
                Ok(id) => Some(id),
                Err(_) => {
                    tracing::warn!(value = %trimmed, "ignoring unparseable operator id");
                    None
                }
            }
        })
        .collect()
}

fn parse_address_list(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_optional(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) => {
            let trimmed = value.trim().to_string();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed)
            }
        }
        Err(_) => None,
    }
}

fn env_or_default(name: &str, default: &str) -> String {
    env_optional(name).unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_id_list_skips_garbage() {
        let ids = parse_id_list("123, 456,,abc, 789 ");
        assert_eq!(ids, vec![123, 456, 789]);
    }

    #[test]
    fn parse_address_list_trims_entries() {
        let addrs = parse_address_list("10.0.0.1, 10.0.0.2 ,");
        assert_eq!(addrs.len(), 2);
        assert!(addrs.contains("10.0.0.1"));
        assert!(addrs.contains("10.0.0.2"));
    }
}
