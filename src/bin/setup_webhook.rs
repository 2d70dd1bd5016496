//! Register the bot webhook with Telegram and print what Telegram reports back.
//!
//! Usage: `setup_webhook [URL]`; without an argument `WEBHOOK_URL` is used.

use anyhow::{anyhow, Context, Result};
use garbage_courier::config::validate_bot_token;
use std::env;
use teloxide::payloads::SetWebhookSetters;
use teloxide::prelude::*;
use teloxide::types::AllowedUpdate;

const WEBHOOK_PATH: &str = "/telegram/webhook";

/// Append the webhook route unless the URL already points at it
fn webhook_endpoint(base: &str) -> String {
    let base = base.trim().trim_end_matches('/');
    if base.ends_with(WEBHOOK_PATH) {
        base.to_string()
    } else {
        format!("{}{}", base, WEBHOOK_PATH)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let token = env::var("TELEGRAM_BOT_TOKEN").context("TELEGRAM_BOT_TOKEN is required")?;
    validate_bot_token(&token).map_err(|e| anyhow!("{}", e))?;

    let base = env::args()
        .nth(1)
        .or_else(|| env::var("WEBHOOK_URL").ok())
        .ok_or_else(|| anyhow!("Pass the public URL as an argument or set WEBHOOK_URL"))?;
    let endpoint = webhook_endpoint(&base);
    let url = reqwest::Url::parse(&endpoint).with_context(|| format!("Invalid webhook URL: {}", endpoint))?;

    let bot = Bot::new(token);
    bot.set_webhook(url)
        .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::CallbackQuery])
        .await
        .context("setWebhook failed")?;
    println!("Webhook set to {}", endpoint);

    let info = bot.get_webhook_info().await.context("getWebhookInfo failed")?;
    println!("Pending updates: {}", info.pending_update_count);
    if let Some(message) = info.last_error_message {
        println!("Last delivery error: {}", message);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_endpoint_appends_route_once() {
        assert_eq!(
            webhook_endpoint("https://bot.example.com/"),
            "https://bot.example.com/telegram/webhook"
        );
        assert_eq!(
            webhook_endpoint("https://bot.example.com/telegram/webhook"),
            "https://bot.example.com/telegram/webhook"
        );
    }
}
