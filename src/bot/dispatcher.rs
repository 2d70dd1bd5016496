//! # Update Dispatcher
//!
//! Every Telegram update goes through the same steps: register the sender,
//! refuse frozen accounts, resolve the role, then hand off to the text or
//! callback handlers. Callback queries are always answered so the client
//! stops showing its progress indicator.

use anyhow::Result;
use teloxide::types::{CallbackQuery, Message, Update, UpdateKind, User};
use tracing::{debug, Instrument};

use super::callbacks::{self, CallbackAction};
use super::message_handler;
use super::HandlerContext;
use crate::context::AppContext;
use crate::db;
use crate::errors::error_logging;
use crate::localization::Translator;
use crate::models::Role;
use crate::observability::{self, db_span};
use crate::roles;

/// The Telegram user behind an update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub language_code: Option<String>,
}

impl From<&User> for Sender {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.0 as i64,
            username: user.username.clone(),
            first_name: Some(user.first_name.clone()).filter(|name| !name.is_empty()),
            language_code: user.language_code.clone(),
        }
    }
}

/// The parts of an update the bot reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Text {
        chat_id: i64,
        sender: Sender,
        text: String,
    },
    Callback {
        callback_id: String,
        chat_id: i64,
        /// Message carrying the pressed button, when Telegram still has it
        message_id: Option<i32>,
        sender: Sender,
        data: String,
    },
}

impl Incoming {
    /// Extract a text message or callback query; anything else is `None`
    pub fn from_update(update: &Update) -> Option<Self> {
        match &update.kind {
            UpdateKind::Message(msg) => Self::from_message(msg),
            UpdateKind::CallbackQuery(query) => Self::from_callback(query),
            _ => None,
        }
    }

    fn from_message(msg: &Message) -> Option<Self> {
        let sender = Sender::from(msg.from.as_ref()?);
        Some(Incoming::Text {
            chat_id: msg.chat.id.0,
            sender,
            text: msg.text()?.to_string(),
        })
    }

    fn from_callback(query: &CallbackQuery) -> Option<Self> {
        let sender = Sender::from(&query.from);
        let (chat_id, message_id) = match &query.message {
            Some(message) => (message.chat().id.0, Some(message.id().0)),
            None => (sender.id, None),
        };
        Some(Incoming::Callback {
            callback_id: query.id.0.clone(),
            chat_id,
            message_id,
            sender,
            data: query.data.clone().unwrap_or_default(),
        })
    }

    pub fn sender(&self) -> &Sender {
        match self {
            Incoming::Text { sender, .. } | Incoming::Callback { sender, .. } => sender,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Incoming::Text { .. } => "message",
            Incoming::Callback { .. } => "callback_query",
        }
    }

    fn chat_id(&self) -> i64 {
        match self {
            Incoming::Text { chat_id, .. } | Incoming::Callback { chat_id, .. } => *chat_id,
        }
    }
}

/// Handle a raw Telegram update; unsupported kinds are counted and dropped
pub async fn dispatch_update(app: &AppContext, update: &Update) -> Result<()> {
    match Incoming::from_update(update) {
        Some(incoming) => dispatch(app, incoming).await,
        None => {
            debug!(update_id = %update.id.0, "Ignoring unsupported update");
            observability::record_telegram_update("unsupported");
            Ok(())
        }
    }
}

/// Handle one incoming message or callback query
pub async fn dispatch(app: &AppContext, incoming: Incoming) -> Result<()> {
    let span = observability::telegram_span(incoming.kind(), Some(incoming.sender().id));
    observability::record_telegram_update(incoming.kind());

    async {
        if let Incoming::Callback { callback_id, .. } = &incoming {
            app.gateway.answer_callback(callback_id, None).await;
        }

        let sender = incoming.sender();
        let user = db::upsert_user(
            &app.pool,
            sender.id,
            sender.username.as_deref(),
            sender.first_name.as_deref(),
            sender.language_code.as_deref(),
        )
        .instrument(db_span("upsert_user"))
        .await?;

        let tr = app.translator(user.language_code.as_deref());
        if user.is_frozen {
            debug!(user_id = %user.telegram_id, "Refusing frozen user");
            app.gateway
                .send(incoming.chat_id(), &tr.t("account-frozen"), None)
                .await;
            return Ok(());
        }

        let role = roles::resolve(&app.pool, user.telegram_id)
            .instrument(db_span("resolve_role"))
            .await?;

        let result = match &incoming {
            Incoming::Text { text, .. } => {
                let ctx = handler_context(app, &incoming, role, tr, None);
                message_handler::handle_text_message(&ctx, text).await
            }
            Incoming::Callback { data, message_id, .. } => match CallbackAction::parse(data) {
                Some(action) => {
                    let ctx = handler_context(app, &incoming, role, tr, *message_id);
                    callbacks::handle_callback(&ctx, action).await
                }
                None => {
                    debug!(data = %data, "Ignoring unknown callback data");
                    return Ok(());
                }
            },
        };

        if let Err(e) = &result {
            error_logging::log_internal_error(e, "dispatcher", incoming.kind(), Some(user.telegram_id));
            let tr = app.translator(user.language_code.as_deref());
            app.gateway
                .send(incoming.chat_id(), &tr.t("error-generic"), None)
                .await;
        }
        result
    }
    .instrument(span)
    .await
}

fn handler_context<'a>(
    app: &'a AppContext,
    incoming: &Incoming,
    role: Role,
    tr: Translator<'a>,
    message_id: Option<i32>,
) -> HandlerContext<'a> {
    HandlerContext {
        app,
        chat_id: incoming.chat_id(),
        user_id: incoming.sender().id,
        role,
        tr,
        message_id,
    }
}
