//! Runtime-tunable settings (subscription prices and duration) behind an
//! injected provider, so handlers never read the settings table directly.

use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use tracing::warn;

use crate::db;

#[async_trait]
pub trait SettingsProvider: Send + Sync {
    /// Value stored under `key`, or `default` when it is absent or unreadable
    async fn get(&self, key: &str, default: &str) -> String;
}

/// Read an integer setting, falling back on missing or malformed values
pub async fn get_i64(provider: &dyn SettingsProvider, key: &str, default: i64) -> i64 {
    let raw = provider.get(key, &default.to_string()).await;
    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            warn!(key = %key, value = %raw, "Ignoring malformed numeric setting");
            default
        }
    }
}

/// Settings backed by the `settings` table
pub struct DbSettings {
    pool: PgPool,
}

impl DbSettings {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsProvider for DbSettings {
    async fn get(&self, key: &str, default: &str) -> String {
        match db::get_setting(&self.pool, key).await {
            Ok(Some(value)) => value,
            Ok(None) => default.to_string(),
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read setting, using default");
                default.to_string()
            }
        }
    }
}

/// Fixed in-memory settings
#[derive(Debug, Clone, Default)]
pub struct StaticSettings {
    values: HashMap<String, String>,
}

impl StaticSettings {
    pub fn new<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[async_trait]
impl SettingsProvider for StaticSettings {
    async fn get(&self, key: &str, default: &str) -> String {
        self.values
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }
}
