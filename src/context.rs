use sqlx::PgPool;
use std::sync::Arc;

use crate::config::OrdersConfig;
use crate::db;
use crate::gateway::MessagingGateway;
use crate::localization::{LocalizationManager, Translator};
use crate::payments::PaymentProvider;
use crate::settings::SettingsProvider;

/// Services shared by the bot dispatcher, the lifecycle engine and the HTTP routes
#[derive(Clone)]
pub struct AppContext {
    pub pool: PgPool,
    pub gateway: Arc<dyn MessagingGateway>,
    /// Absent when payment credentials are not configured
    pub payments: Option<Arc<dyn PaymentProvider>>,
    pub settings: Arc<dyn SettingsProvider>,
    pub localization: Arc<LocalizationManager>,
    pub orders: OrdersConfig,
    pub support_url: String,
}

impl AppContext {
    /// Translator for a Telegram language code
    pub fn translator(&self, language_code: Option<&str>) -> Translator<'_> {
        Translator::new(&self.localization, self.localization.detect_language(language_code))
    }

    /// Translator for a user who did not trigger the current update
    pub async fn translator_for_user(&self, telegram_id: i64) -> Translator<'_> {
        let language = match db::get_user_language(&self.pool, telegram_id).await {
            Ok(language) => language,
            Err(e) => {
                tracing::warn!(telegram_id = %telegram_id, error = %e, "Falling back to default language");
                None
            }
        };
        self.translator(language.as_deref())
    }
}
