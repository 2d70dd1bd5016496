//! Courier callbacks: the order board, own orders, transitions and earnings

use anyhow::Result;
use tracing::Instrument;

use super::callback_types::CallbackAction;
use crate::bot::ui_builder::{back_button, back_keyboard, callback_button, order_cards, screen, status_label};
use crate::bot::HandlerContext;
use crate::db::{self, OrderCard};
use crate::gateway::{Button, Keyboard};
use crate::lifecycle;
use crate::models::{DetailedStatus, OrderStatus};
use crate::observability::db_span;

const AVAILABLE_LIMIT: i64 = 10;
const CURRENT_LIMIT: i64 = 20;
const HISTORY_LIMIT: i64 = 10;

fn list_body(ctx: &HandlerContext<'_>, orders: &[OrderCard], with_status: bool, empty_key: &str) -> String {
    if orders.is_empty() {
        ctx.t(empty_key)
    } else {
        order_cards(&ctx.tr, orders, with_status)
    }
}

/// Orders searching for a courier, one accept button each
pub async fn show_available_orders(ctx: &HandlerContext<'_>) -> Result<()> {
    let orders = db::list_available_orders(&ctx.app.pool, AVAILABLE_LIMIT)
        .instrument(db_span("list_available_orders"))
        .await?;

    let keyboard = orders
        .iter()
        .fold(Keyboard::new(), |keyboard, order| {
            keyboard.button(Button::callback(
                ctx.t_args("btn-accept-order", &[("id", &order.id.to_string())]),
                CallbackAction::AcceptOrder(order.id).to_string(),
            ))
        })
        .button(back_button(&ctx.tr, CallbackAction::Start));

    let body = list_body(ctx, &orders, false, "no-available-orders");
    ctx.reply(&screen(&ctx.t("available-orders-title"), &body), Some(&keyboard))
        .await;
    Ok(())
}

/// Accepted orders with the next transition for each
pub async fn show_current_orders(ctx: &HandlerContext<'_>) -> Result<()> {
    let orders = db::list_courier_orders(&ctx.app.pool, ctx.user_id, OrderStatus::Accepted, CURRENT_LIMIT)
        .instrument(db_span("list_courier_orders"))
        .await?;

    let mut keyboard = Keyboard::new();
    for order in &orders {
        let id = order.id.to_string();
        let button = match order.detailed_status {
            DetailedStatus::CourierOnWay => Button::callback(
                ctx.t_args("btn-start-work", &[("id", &id)]),
                CallbackAction::StartWork(order.id).to_string(),
            ),
            DetailedStatus::CourierWorking => Button::callback(
                ctx.t_args("btn-complete-order", &[("id", &id)]),
                CallbackAction::CompleteOrder(order.id).to_string(),
            ),
            _ => continue,
        };
        keyboard = keyboard.button(button);
    }
    let keyboard = keyboard.button(back_button(&ctx.tr, CallbackAction::Start));

    let body = list_body(ctx, &orders, true, "no-current-orders");
    ctx.reply(&screen(&ctx.t("current-orders-title"), &body), Some(&keyboard))
        .await;
    Ok(())
}

pub async fn show_order_history(ctx: &HandlerContext<'_>) -> Result<()> {
    let orders = db::list_courier_orders(&ctx.app.pool, ctx.user_id, OrderStatus::Completed, HISTORY_LIMIT)
        .instrument(db_span("list_courier_orders"))
        .await?;

    let body = list_body(ctx, &orders, false, "no-order-history");
    ctx.reply(
        &screen(&ctx.t("order-history-title"), &body),
        Some(&back_keyboard(&ctx.tr, CallbackAction::Start)),
    )
    .await;
    Ok(())
}

pub async fn show_stats(ctx: &HandlerContext<'_>) -> Result<()> {
    let stats = db::get_courier_stats(&ctx.app.pool, ctx.user_id)
        .instrument(db_span("get_courier_stats"))
        .await?;
    let rating = db::average_courier_rating(&ctx.app.pool, ctx.user_id)
        .instrument(db_span("average_courier_rating"))
        .await?;

    let mut lines = vec![
        ctx.t_args("stats-total-orders", &[("count", &stats.total_orders.to_string())]),
        ctx.t_args("stats-earned", &[("amount", &stats.total_earnings.to_string())]),
        ctx.t_args("stats-average-check", &[("amount", &stats.average_check().to_string())]),
    ];
    if let Some(rating) = rating {
        lines.push(ctx.t_args("stats-average-rating", &[("rating", &format!("{:.1}", rating))]));
    }

    let keyboard = Keyboard::new()
        .button(callback_button(&ctx.tr, "btn-courier-withdraw", CallbackAction::CourierWithdraw))
        .button(back_button(&ctx.tr, CallbackAction::Start));
    ctx.reply(&screen(&ctx.t("courier-stats-title"), &lines.join("\n")), Some(&keyboard))
        .await;
    Ok(())
}

/// Withdrawals go through the admin; this only shows the balance
pub async fn show_withdraw(ctx: &HandlerContext<'_>) -> Result<()> {
    let stats = db::get_courier_stats(&ctx.app.pool, ctx.user_id)
        .instrument(db_span("get_courier_stats"))
        .await?;

    let body = format!(
        "{}\n\n{}",
        ctx.t_args("withdraw-available", &[("amount", &stats.total_earnings.to_string())]),
        ctx.t("withdraw-instructions"),
    );
    let keyboard = Keyboard::new()
        .button(Button::url(ctx.t("btn-contact-admin"), ctx.app.support_url.as_str()))
        .button(back_button(&ctx.tr, CallbackAction::Start));
    ctx.reply(&screen(&ctx.t("withdraw-title"), &body), Some(&keyboard))
        .await;
    Ok(())
}

pub async fn accept_order(ctx: &HandlerContext<'_>, order_id: i64) -> Result<()> {
    let Some(order) = lifecycle::accept_order(ctx.app, ctx.user_id, order_id).await? else {
        ctx.reply(
            &ctx.t("order-unavailable"),
            Some(&back_keyboard(&ctx.tr, CallbackAction::CourierAvailable)),
        )
        .await;
        return Ok(());
    };

    let status = status_label(&ctx.tr, order.detailed_status);
    let text = format!(
        "{}\n\n{}",
        ctx.t_args("order-accepted-courier", &[("id", &order.id.to_string())]),
        ctx.t_args("card-status", &[("status", &status)]),
    );
    let keyboard = Keyboard::new()
        .button(callback_button(&ctx.tr, "btn-courier-current", CallbackAction::CourierCurrent))
        .button(back_button(&ctx.tr, CallbackAction::Start));
    ctx.reply(&text, Some(&keyboard)).await;
    Ok(())
}

pub async fn start_work(ctx: &HandlerContext<'_>, order_id: i64) -> Result<()> {
    let Some(order) = lifecycle::start_work(ctx.app, ctx.user_id, order_id).await? else {
        return reply_not_found(ctx).await;
    };

    let id = order.id.to_string();
    let keyboard = Keyboard::new()
        .button(Button::callback(
            ctx.t_args("btn-complete-order", &[("id", &id)]),
            CallbackAction::CompleteOrder(order.id).to_string(),
        ))
        .button(back_button(&ctx.tr, CallbackAction::CourierCurrent));
    ctx.reply(&ctx.t_args("work-started", &[("id", &id)]), Some(&keyboard))
        .await;
    Ok(())
}

pub async fn complete_order(ctx: &HandlerContext<'_>, order_id: i64) -> Result<()> {
    let Some(order) = lifecycle::complete_order(ctx.app, ctx.user_id, order_id).await? else {
        return reply_not_found(ctx).await;
    };

    let text = format!(
        "{}\n\n{}",
        ctx.t_args("order-completed-courier", &[("id", &order.id.to_string())]),
        ctx.t_args("order-earned", &[("amount", &order.price.to_string())]),
    );
    let keyboard = Keyboard::new()
        .button(callback_button(&ctx.tr, "btn-courier-stats", CallbackAction::CourierStats))
        .button(back_button(&ctx.tr, CallbackAction::Start));
    ctx.reply(&text, Some(&keyboard)).await;
    Ok(())
}

async fn reply_not_found(ctx: &HandlerContext<'_>) -> Result<()> {
    ctx.reply(
        &ctx.t("order-not-found"),
        Some(&back_keyboard(&ctx.tr, CallbackAction::CourierCurrent)),
    )
    .await;
    Ok(())
}
