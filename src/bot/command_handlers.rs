//! Command Handlers module for `/start` and the admin text commands

use anyhow::Result;
use tracing::{debug, info, Instrument};

use super::menus::{self, Screen};
use super::HandlerContext;
use crate::db;
use crate::lifecycle::NewOrder;
use crate::models::Role;
use crate::observability::db_span;
use crate::roles::{self, Promotion};

/// A recognized free-text message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextCommand {
    Start,
    /// `operator_add <id>`; `None` when the id is missing or malformed
    AddOperator(Option<i64>),
    /// `user_freeze <id>`
    Freeze(Option<i64>),
    /// `user_unfreeze <id>`
    Unfreeze(Option<i64>),
    CreateOrder(NewOrder),
    Unknown,
}

impl TextCommand {
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        let mut words = trimmed.split_whitespace();
        let first = words.next().unwrap_or_default();

        // "/start" may carry a deep-link payload or a bot mention
        if first == "/start" || first.starts_with("/start@") {
            return TextCommand::Start;
        }

        let argument = || -> Option<i64> {
            let mut rest = trimmed.split_whitespace().skip(1);
            let id = rest.next()?.parse().ok()?;
            rest.next().is_none().then_some(id)
        };
        match first {
            "operator_add" => return TextCommand::AddOperator(argument()),
            "user_freeze" => return TextCommand::Freeze(argument()),
            "user_unfreeze" => return TextCommand::Unfreeze(argument()),
            _ => {}
        }

        match NewOrder::parse(trimmed) {
            Some(order) => TextCommand::CreateOrder(order),
            None => TextCommand::Unknown,
        }
    }

    /// Commands only admins may run
    pub fn is_admin_command(&self) -> bool {
        matches!(
            self,
            TextCommand::AddOperator(_) | TextCommand::Freeze(_) | TextCommand::Unfreeze(_)
        )
    }
}

/// Role-specific main menu
pub async fn show_main_menu(ctx: &HandlerContext<'_>) -> Result<()> {
    let text = menus::main_menu_text(&ctx.tr, ctx.role);
    let keyboard = menus::keyboard(&ctx.tr, ctx.role, Screen::Main, &ctx.app.support_url);
    ctx.reply(&text, Some(&keyboard)).await;
    Ok(())
}

/// Run an admin text command. Callers have already checked the role.
pub async fn handle_admin_command(ctx: &HandlerContext<'_>, command: TextCommand) -> Result<()> {
    match command {
        TextCommand::AddOperator(Some(target)) => add_operator(ctx, target).await,
        TextCommand::AddOperator(None) => {
            ctx.reply(&ctx.t("invalid-format-operator-add"), None).await;
            Ok(())
        }
        TextCommand::Freeze(Some(target)) => set_frozen(ctx, target, true).await,
        TextCommand::Unfreeze(Some(target)) => set_frozen(ctx, target, false).await,
        TextCommand::Freeze(None) | TextCommand::Unfreeze(None) => {
            ctx.reply(&ctx.t("invalid-format-freeze"), None).await;
            Ok(())
        }
        other => {
            debug!(command = ?other, "Not an admin command");
            Ok(())
        }
    }
}

async fn add_operator(ctx: &HandlerContext<'_>, target: i64) -> Result<()> {
    let id = target.to_string();
    match roles::promote_to_operator(&ctx.app.pool, target)
        .instrument(db_span("promote_to_operator"))
        .await?
    {
        Promotion::Promoted => {
            info!(admin_id = %ctx.user_id, operator_id = %target, "Operator added");
            let target_tr = ctx.app.translator_for_user(target).await;
            ctx.app
                .gateway
                .send(target, &target_tr.t("operator-assigned"), None)
                .await;
            ctx.reply(&ctx.t_args("operator-added", &[("id", &id)]), None)
                .await;
        }
        Promotion::UnknownUser => {
            ctx.reply(&ctx.t("user-not-found-start"), None).await;
        }
        Promotion::AlreadyAdmin => {
            ctx.reply(&ctx.t_args("user-is-admin", &[("id", &id)]), None)
                .await;
        }
    }
    Ok(())
}

async fn set_frozen(ctx: &HandlerContext<'_>, target: i64, frozen: bool) -> Result<()> {
    let id = target.to_string();
    let changed = db::set_user_frozen(&ctx.app.pool, target, frozen)
        .instrument(db_span("set_user_frozen"))
        .await?;

    let key = match (changed, frozen) {
        (true, true) => "user-frozen",
        (true, false) => "user-unfrozen",
        (false, _) => "user-freeze-failed",
    };
    if changed {
        info!(admin_id = %ctx.user_id, target = %target, frozen = %frozen, "User freeze state changed");
    }
    ctx.reply(&ctx.t_args(key, &[("id", &id)]), None).await;
    Ok(())
}

/// Whether a role may run a parsed command
pub fn permitted(role: Role, command: &TextCommand) -> bool {
    match command {
        c if c.is_admin_command() => role == Role::Admin,
        TextCommand::CreateOrder(_) => role == Role::Client,
        _ => true,
    }
}
