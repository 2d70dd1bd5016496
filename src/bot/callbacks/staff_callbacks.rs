//! Operator and admin callbacks

use anyhow::Result;
use chrono::Utc;
use tracing::{info, Instrument};

use super::callback_types::CallbackAction;
use crate::bot::menus::{self, Screen};
use crate::bot::ui_builder::{
    back_button, back_keyboard, callback_button, display_name, operator_order_line, screen,
    status_editor_keyboard, status_label,
};
use crate::bot::HandlerContext;
use crate::db::{self, OverrideOutcome};
use crate::gateway::{Button, Keyboard};
use crate::lifecycle;
use crate::models::DetailedStatus;
use crate::observability::db_span;

const ACTIVE_ORDERS_LIMIT: i64 = 20;
const APPLICATIONS_LIMIT: i64 = 10;

/// Every pending or accepted order with chat and status buttons
pub async fn show_active_orders(ctx: &HandlerContext<'_>) -> Result<()> {
    let orders = db::list_active_orders(&ctx.app.pool, ACTIVE_ORDERS_LIMIT)
        .instrument(db_span("list_active_orders"))
        .await?;

    let body = if orders.is_empty() {
        ctx.t("no-active-orders")
    } else {
        orders
            .iter()
            .map(|order| operator_order_line(&ctx.tr, order))
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    let keyboard = orders
        .iter()
        .fold(Keyboard::new(), |keyboard, order| {
            let id = order.id.to_string();
            keyboard.row(vec![
                Button::callback(
                    ctx.t_args("btn-chat", &[("id", &id)]),
                    CallbackAction::OperatorChat(order.id).to_string(),
                ),
                Button::callback(
                    ctx.t_args("btn-status", &[("id", &id)]),
                    CallbackAction::OperatorStatus(order.id).to_string(),
                ),
            ])
        })
        .button(back_button(&ctx.tr, CallbackAction::Start));

    ctx.reply(&screen(&ctx.t("operator-active-title"), &body), Some(&keyboard))
        .await;
    Ok(())
}

pub async fn show_chat_placeholder(ctx: &HandlerContext<'_>) -> Result<()> {
    ctx.send(&ctx.t("chat-in-development"), None).await;
    Ok(())
}

pub async fn show_operator_stats(ctx: &HandlerContext<'_>) -> Result<()> {
    let counts = db::order_counts(&ctx.app.pool)
        .instrument(db_span("order_counts"))
        .await?;

    let body = [
        ctx.t_args("stats-waiting", &[("count", &counts.pending.to_string())]),
        ctx.t_args("stats-in-progress", &[("count", &counts.accepted.to_string())]),
        ctx.t_args("stats-completed-today", &[("count", &counts.completed_today.to_string())]),
    ]
    .join("\n");
    ctx.reply(
        &screen(&ctx.t("operator-stats-title"), &body),
        Some(&back_keyboard(&ctx.tr, CallbackAction::Start)),
    )
    .await;
    Ok(())
}

pub async fn show_status_editor(ctx: &HandlerContext<'_>, order_id: i64) -> Result<()> {
    let order = db::get_order(&ctx.app.pool, order_id)
        .instrument(db_span("get_order"))
        .await?;

    let Some(order) = order else {
        return reply_order_not_found(ctx).await;
    };

    let status = status_label(&ctx.tr, order.detailed_status);
    let text = format!(
        "{}\n{}",
        ctx.t_args("status-editor-title", &[("id", &order.id.to_string())]),
        ctx.t_args("card-status", &[("status", &status)]),
    );
    ctx.reply(&text, Some(&status_editor_keyboard(&ctx.tr, order.id)))
        .await;
    Ok(())
}

pub async fn set_status(ctx: &HandlerContext<'_>, order_id: i64, target: DetailedStatus) -> Result<()> {
    match lifecycle::override_status(ctx.app, order_id, target).await? {
        OverrideOutcome::Updated(order) => {
            info!(operator_id = %ctx.user_id, order_id = %order.id, target = %target, "Operator changed order status");
            let status = status_label(&ctx.tr, target);
            let text = ctx.t_args(
                "status-changed",
                &[("id", &order.id.to_string()), ("status", &status)],
            );
            let keyboard = Keyboard::new()
                .button(callback_button(&ctx.tr, "btn-active-orders", CallbackAction::OperatorActiveOrders))
                .button(back_button(&ctx.tr, CallbackAction::Start));
            ctx.reply(&text, Some(&keyboard)).await;
        }
        OverrideOutcome::NotFound => return reply_order_not_found(ctx).await,
        OverrideOutcome::NeedsCourier => {
            ctx.reply(
                &ctx.t("status-needs-courier"),
                Some(&back_keyboard(&ctx.tr, CallbackAction::OperatorStatus(order_id))),
            )
            .await;
        }
    }
    Ok(())
}

async fn reply_order_not_found(ctx: &HandlerContext<'_>) -> Result<()> {
    ctx.reply(
        &ctx.t("order-not-found"),
        Some(&back_keyboard(&ctx.tr, CallbackAction::OperatorActiveOrders)),
    )
    .await;
    Ok(())
}

pub async fn show_admin_panel(ctx: &HandlerContext<'_>) -> Result<()> {
    let text = screen(&ctx.t("admin-panel-title"), &ctx.t("choose-action"));
    let keyboard = menus::keyboard(&ctx.tr, ctx.role, Screen::AdminPanel, &ctx.app.support_url);
    ctx.reply(&text, Some(&keyboard)).await;
    Ok(())
}

pub async fn show_service_stats(ctx: &HandlerContext<'_>) -> Result<()> {
    let stats = db::service_stats(&ctx.app.pool)
        .instrument(db_span("service_stats"))
        .await?;

    let body = format!(
        "<b>{}</b>\n{}\n{}\n{}\n\n<b>{}</b>\n{}\n{}\n\n<b>{}</b>\n{}\n{}",
        ctx.t("stats-users-section"),
        ctx.t_args("stats-clients", &[("count", &stats.clients.to_string())]),
        ctx.t_args("stats-couriers", &[("count", &stats.couriers.to_string())]),
        ctx.t_args("stats-operators", &[("count", &stats.operators.to_string())]),
        ctx.t("stats-orders-section"),
        ctx.t_args("stats-orders-total", &[("count", &stats.total_orders.to_string())]),
        ctx.t_args("stats-orders-completed", &[("count", &stats.completed_orders.to_string())]),
        ctx.t("stats-finance-section"),
        ctx.t_args("stats-revenue", &[("amount", &stats.revenue.to_string())]),
        ctx.t_args("stats-average-check", &[("amount", &stats.average_check.to_string())]),
    );
    ctx.reply(
        &screen(&ctx.t("service-stats-title"), &body),
        Some(&back_keyboard(&ctx.tr, CallbackAction::AdminPanel)),
    )
    .await;
    Ok(())
}

/// Pending courier applications with approve/reject buttons
pub async fn show_applications(ctx: &HandlerContext<'_>) -> Result<()> {
    let applications = db::list_pending_applications(&ctx.app.pool, APPLICATIONS_LIMIT)
        .instrument(db_span("list_pending_applications"))
        .await?;

    let mut lines = Vec::with_capacity(applications.len());
    let mut keyboard = Keyboard::new();
    for application in &applications {
        let name = display_name(
            application.first_name.as_deref(),
            application.username.as_deref(),
            application.telegram_id,
        );
        let id = application.telegram_id.to_string();
        lines.push(ctx.t_args("application-line", &[("name", &name), ("id", &id)]));
        keyboard = keyboard.row(vec![
            Button::callback(
                ctx.t_args("btn-approve", &[("name", &name)]),
                CallbackAction::ApproveCourier(application.telegram_id).to_string(),
            ),
            Button::callback(
                ctx.t("btn-reject"),
                CallbackAction::RejectCourier(application.telegram_id).to_string(),
            ),
        ]);
    }
    let keyboard = keyboard.button(back_button(&ctx.tr, CallbackAction::AdminPanel));

    let body = if lines.is_empty() {
        ctx.t("no-applications")
    } else {
        lines.join("\n")
    };
    ctx.reply(&screen(&ctx.t("applications-title"), &body), Some(&keyboard))
        .await;
    Ok(())
}

/// Approve or reject a pending application and tell the applicant
pub async fn review_application(ctx: &HandlerContext<'_>, applicant_id: i64, approve: bool) -> Result<()> {
    let reviewed = db::review_courier_application(&ctx.app.pool, applicant_id, ctx.user_id, approve, Utc::now())
        .instrument(db_span("review_courier_application"))
        .await?;

    let keyboard = back_keyboard(&ctx.tr, CallbackAction::AdminApplications);
    if !reviewed {
        ctx.reply(&ctx.t("application-not-found"), Some(&keyboard))
            .await;
        return Ok(());
    }

    info!(admin_id = %ctx.user_id, applicant_id = %applicant_id, approve = %approve, "Courier application reviewed");

    let applicant_tr = ctx.app.translator_for_user(applicant_id).await;
    let notice = if approve {
        format!(
            "{}\n\n{}",
            applicant_tr.t("application-approved"),
            applicant_tr.t("application-approved-hint")
        )
    } else {
        applicant_tr.t("application-rejected")
    };
    ctx.app.gateway.send(applicant_id, &notice, None).await;

    let key = if approve { "courier-approved" } else { "courier-rejected" };
    ctx.reply(&ctx.t(key), Some(&keyboard)).await;
    Ok(())
}

pub async fn show_all_orders(ctx: &HandlerContext<'_>) -> Result<()> {
    let counts = db::order_counts(&ctx.app.pool)
        .instrument(db_span("order_counts"))
        .await?;

    let body = format!(
        "{}\n{}\n{}\n\n{}",
        ctx.t_args("stats-waiting", &[("count", &counts.pending.to_string())]),
        ctx.t_args("stats-in-progress", &[("count", &counts.accepted.to_string())]),
        ctx.t_args("stats-completed", &[("count", &counts.completed.to_string())]),
        ctx.t_args("stats-revenue", &[("amount", &counts.revenue.to_string())]),
    );
    ctx.reply(
        &screen(&ctx.t("all-orders-title"), &body),
        Some(&back_keyboard(&ctx.tr, CallbackAction::AdminPanel)),
    )
    .await;
    Ok(())
}

pub async fn show_add_operator_prompt(ctx: &HandlerContext<'_>) -> Result<()> {
    let body = format!(
        "{}\n\n<code>operator_add 123456789</code>",
        ctx.t("add-operator-instructions")
    );
    ctx.reply(
        &screen(&ctx.t("add-operator-title"), &body),
        Some(&back_keyboard(&ctx.tr, CallbackAction::AdminPanel)),
    )
    .await;
    Ok(())
}

pub async fn show_freeze_prompt(ctx: &HandlerContext<'_>) -> Result<()> {
    let body = format!(
        "{}\n\n<code>user_freeze 123456789</code>\n<code>user_unfreeze 123456789</code>",
        ctx.t("freeze-user-instructions")
    );
    ctx.reply(
        &screen(&ctx.t("freeze-user-title"), &body),
        Some(&back_keyboard(&ctx.tr, CallbackAction::AdminPanel)),
    )
    .await;
    Ok(())
}
