//! # Messaging Gateway
//!
//! The single outbound path to Telegram. Every call is best effort: failures
//! are logged and counted, never returned, so a dead chat or an expired
//! callback query cannot abort the handler that triggered it.

use async_trait::async_trait;
use std::time::Duration;
use teloxide::payloads::{
    AnswerCallbackQuerySetters, EditMessageTextSetters, SendMessageSetters,
};
use teloxide::prelude::*;
use teloxide::types::{
    CallbackQueryId, InlineKeyboardButton, InlineKeyboardMarkup, MessageId, ParseMode,
};
use tracing::{debug, warn};

use crate::errors::error_logging;
use crate::observability;

/// What pressing a button does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonAction {
    /// Sends the callback data back to the bot
    Callback(String),
    /// Opens an external link
    Url(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub action: ButtonAction,
}

impl Button {
    pub fn callback(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: ButtonAction::Callback(data.into()),
        }
    }

    pub fn url(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: ButtonAction::Url(url.into()),
        }
    }
}

/// Inline keyboard as rows of buttons
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row holding a single button
    pub fn button(mut self, button: Button) -> Self {
        self.rows.push(vec![button]);
        self
    }

    pub fn row(mut self, row: Vec<Button>) -> Self {
        self.rows.push(row);
        self
    }

    /// All callback data strings, in layout order
    pub fn callback_data(&self) -> Vec<&str> {
        self.rows
            .iter()
            .flatten()
            .filter_map(|button| match &button.action {
                ButtonAction::Callback(data) => Some(data.as_str()),
                ButtonAction::Url(_) => None,
            })
            .collect()
    }
}

/// Convert a keyboard into Telegram's inline markup, dropping unparsable links
pub fn to_inline_markup(keyboard: &Keyboard) -> InlineKeyboardMarkup {
    let rows: Vec<Vec<InlineKeyboardButton>> = keyboard
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .filter_map(|button| match &button.action {
                    ButtonAction::Callback(data) => Some(InlineKeyboardButton::callback(
                        button.label.clone(),
                        data.clone(),
                    )),
                    ButtonAction::Url(url) => match reqwest::Url::parse(url) {
                        Ok(url) => Some(InlineKeyboardButton::url(button.label.clone(), url)),
                        Err(e) => {
                            warn!(url = %url, error = %e, "Dropping button with invalid URL");
                            None
                        }
                    },
                })
                .collect::<Vec<_>>()
        })
        .filter(|row| !row.is_empty())
        .collect();

    InlineKeyboardMarkup::new(rows)
}

/// Outbound chat operations used by every component that talks to users
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    async fn send(&self, chat_id: i64, text: &str, keyboard: Option<&Keyboard>);

    async fn edit(&self, chat_id: i64, message_id: i32, text: &str, keyboard: Option<&Keyboard>);

    async fn delete(&self, chat_id: i64, message_id: i32);

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>);
}

/// Gateway backed by the Telegram Bot API
#[derive(Clone)]
pub struct TelegramGateway {
    bot: Bot,
}

impl TelegramGateway {
    /// Build a bot whose HTTP client enforces `timeout` on every call
    pub fn new(token: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            bot: Bot::with_client(token, client),
        })
    }

    fn report_failure(error: &teloxide::RequestError, method: &'static str, chat_id: Option<i64>) {
        error_logging::log_network_error(error, method, chat_id, Some("api.telegram.org"));
        observability::record_gateway_failure(method);
    }
}

#[async_trait]
impl MessagingGateway for TelegramGateway {
    async fn send(&self, chat_id: i64, text: &str, keyboard: Option<&Keyboard>) {
        let mut request = self
            .bot
            .send_message(ChatId(chat_id), text.to_owned())
            .parse_mode(ParseMode::Html);
        if let Some(keyboard) = keyboard {
            request = request.reply_markup(to_inline_markup(keyboard));
        }

        match request.await {
            Ok(_) => debug!(chat_id = %chat_id, "Message sent"),
            Err(e) => Self::report_failure(&e, "sendMessage", Some(chat_id)),
        }
    }

    async fn edit(&self, chat_id: i64, message_id: i32, text: &str, keyboard: Option<&Keyboard>) {
        let mut request = self
            .bot
            .edit_message_text(ChatId(chat_id), MessageId(message_id), text.to_owned())
            .parse_mode(ParseMode::Html);
        if let Some(keyboard) = keyboard {
            request = request.reply_markup(to_inline_markup(keyboard));
        }

        match request.await {
            Ok(_) => debug!(chat_id = %chat_id, message_id = %message_id, "Message edited"),
            Err(e) => Self::report_failure(&e, "editMessageText", Some(chat_id)),
        }
    }

    async fn delete(&self, chat_id: i64, message_id: i32) {
        match self
            .bot
            .delete_message(ChatId(chat_id), MessageId(message_id))
            .await
        {
            Ok(_) => debug!(chat_id = %chat_id, message_id = %message_id, "Message deleted"),
            Err(e) => Self::report_failure(&e, "deleteMessage", Some(chat_id)),
        }
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) {
        let mut request = self
            .bot
            .answer_callback_query(CallbackQueryId(callback_id.to_owned()));
        if let Some(text) = text {
            request = request.text(text.to_owned());
        }

        if let Err(e) = request.await {
            Self::report_failure(&e, "answerCallbackQuery", None);
        }
    }
}
