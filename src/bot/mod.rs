//! Bot module for handling Telegram interactions
//!
//! This module is split into several submodules:
//! - `dispatcher`: turns a Telegram update into a handler call, enforcing roles
//! - `callbacks`: callback data parsing and per-role button handlers
//! - `message_handler`: free text (commands and three-line orders)
//! - `command_handlers`: `/start` and admin text commands
//! - `menus`: static per-role menu layouts
//! - `ui_builder`: order cards and keyboards

pub mod callbacks;
pub mod command_handlers;
pub mod dispatcher;
pub mod menus;
pub mod message_handler;
pub mod ui_builder;

use crate::context::AppContext;
use crate::gateway::Keyboard;
use crate::localization::Translator;
use crate::models::Role;

/// Common context for bot handlers: who is talking, in which chat and language
pub struct HandlerContext<'a> {
    pub app: &'a AppContext,
    pub chat_id: i64,
    pub user_id: i64,
    /// Role resolved for this update
    pub role: Role,
    pub tr: Translator<'a>,
    /// Message holding the pressed button; replies replace it
    pub message_id: Option<i32>,
}

impl<'a> HandlerContext<'a> {
    /// Answer the user: edit the message with the pressed button, or send a new one
    pub async fn reply(&self, text: &str, keyboard: Option<&Keyboard>) {
        match self.message_id {
            Some(message_id) => {
                self.app
                    .gateway
                    .edit(self.chat_id, message_id, text, keyboard)
                    .await
            }
            None => self.app.gateway.send(self.chat_id, text, keyboard).await,
        }
    }

    /// Always send a new message
    pub async fn send(&self, text: &str, keyboard: Option<&Keyboard>) {
        self.app.gateway.send(self.chat_id, text, keyboard).await
    }

    pub fn t(&self, key: &str) -> String {
        self.tr.t(key)
    }

    pub fn t_args(&self, key: &str, args: &[(&str, &str)]) -> String {
        self.tr.t_args(key, args)
    }
}

pub use dispatcher::{dispatch, dispatch_update, Incoming, Sender};
