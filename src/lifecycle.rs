//! # Order Lifecycle
//!
//! Transitions of an order's `detailed_status` (and its coarse `status`
//! projection) together with the notifications each transition sends.
//!
//! ```text
//! waiting_payment -> searching_courier -> courier_on_way -> courier_working -> completed
//!        \________________ cancelled (automatic or operator) _______________/
//! ```
//!
//! Guards are enforced by conditional updates in [`crate::db`]; a guard that
//! does not match is reported as `None`/an outcome variant, never as an error.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn, Instrument};

use crate::bot::callbacks::CallbackAction;
use crate::bot::ui_builder;
use crate::context::AppContext;
use crate::db::{self, Order, OverrideOutcome, RecordedPayment, Subscription};
use crate::gateway::Keyboard;
use crate::models::{DetailedStatus, Role};
use crate::observability::{self, db_span};

/// Order details parsed from a client's three-line message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub address: String,
    pub description: String,
    pub price: i64,
}

impl NewOrder {
    /// Parse `address\ndescription\nprice`; anything else is not an order
    pub fn parse(text: &str) -> Option<Self> {
        let lines: Vec<&str> = text.trim().lines().map(str::trim).collect();
        let [address, description, price] = lines.as_slice() else {
            return None;
        };

        let price: i64 = price.parse().ok()?;
        if price <= 0 || address.is_empty() {
            return None;
        }

        Some(Self {
            address: address.to_string(),
            description: description.to_string(),
            price,
        })
    }
}

/// State a new order starts in for the configured flow
pub fn initial_status(require_payment: bool) -> DetailedStatus {
    if require_payment {
        DetailedStatus::WaitingPayment
    } else {
        DetailedStatus::SearchingCourier
    }
}

/// Store a new order for `client_id`
pub async fn create_order(ctx: &AppContext, client_id: i64, new_order: &NewOrder) -> Result<Order> {
    let initial = initial_status(ctx.orders.require_payment);
    let order = db::create_order(
        &ctx.pool,
        client_id,
        &new_order.address,
        &new_order.description,
        new_order.price,
        initial,
    )
    .instrument(db_span("create_order"))
    .await?;

    observability::record_order_transition("create", true);
    info!(order_id = %order.id, client_id = %client_id, status = %order.detailed_status, "Order created");
    Ok(order)
}

/// Courier takes a searching order. `None` when someone else was faster.
pub async fn accept_order(ctx: &AppContext, courier_id: i64, order_id: i64) -> Result<Option<Order>> {
    let order = db::accept_order(&ctx.pool, order_id, courier_id, Utc::now())
        .instrument(db_span("accept_order"))
        .await?;
    observability::record_order_transition("accept", order.is_some());

    if let Some(order) = &order {
        info!(order_id = %order.id, courier_id = %courier_id, "Order accepted");
        notify_client(ctx, order, "notify-courier-on-way", None).await;
    }
    Ok(order)
}

pub async fn start_work(ctx: &AppContext, courier_id: i64, order_id: i64) -> Result<Option<Order>> {
    let order = db::start_order_work(&ctx.pool, order_id, courier_id)
        .instrument(db_span("start_order_work"))
        .await?;
    observability::record_order_transition("start_work", order.is_some());

    if let Some(order) = &order {
        notify_client(ctx, order, "notify-courier-working", None).await;
    }
    Ok(order)
}

/// Complete the courier's own order and ask the client for a rating
pub async fn complete_order(ctx: &AppContext, courier_id: i64, order_id: i64) -> Result<Option<Order>> {
    let order = db::complete_order(&ctx.pool, order_id, courier_id, Utc::now())
        .instrument(db_span("complete_order"))
        .await?;
    observability::record_order_transition("complete", order.is_some());

    if let Some(order) = &order {
        notify_client(ctx, order, "notify-order-completed", Some(ui_builder::rating_keyboard(order.id)))
            .await;
    }
    Ok(order)
}

/// Operator override to any editor state
pub async fn override_status(
    ctx: &AppContext,
    order_id: i64,
    target: DetailedStatus,
) -> Result<OverrideOutcome> {
    let outcome = db::override_order_status(&ctx.pool, order_id, target, Utc::now())
        .instrument(db_span("override_order_status"))
        .await?;
    observability::record_order_transition("override", matches!(outcome, OverrideOutcome::Updated(_)));

    if let OverrideOutcome::Updated(order) = &outcome {
        info!(order_id = %order.id, target = %target, "Order status overridden");
        let tr = ctx.translator_for_user(order.client_id).await;
        let id = order.id.to_string();
        let status = ui_builder::status_label(&tr, target);
        let text = tr.t_args("notify-status-changed", &[("id", &id), ("status", &status)]);
        ctx.gateway.send(order.client_id, &text, None).await;
    }
    Ok(outcome)
}

/// Payment confirmed: record it, and open the order to couriers when it was
/// waiting for payment. Duplicate deliveries update nothing and notify nobody.
pub async fn mark_order_paid(
    ctx: &AppContext,
    order_id: i64,
    payment_id: &str,
    payment_status: &str,
) -> Result<Option<RecordedPayment>> {
    let recorded = db::mark_order_paid(&ctx.pool, order_id, payment_id, payment_status, Utc::now())
        .instrument(db_span("mark_order_paid"))
        .await?;
    observability::record_order_transition("paid", recorded.is_some());

    let Some(recorded) = recorded else {
        info!(order_id = %order_id, payment_id = %payment_id, "Payment matched no unpaid order");
        return Ok(None);
    };

    if recorded.previous == DetailedStatus::Cancelled {
        warn!(order_id = %order_id, payment_id = %payment_id, "Payment received for a cancelled order");
        return Ok(Some(recorded));
    }

    let order = &recorded.order;
    let tr = ctx.translator_for_user(order.client_id).await;
    let id = order.id.to_string();
    let text = format!(
        "{}\n{}\n{}\n\n{}",
        ui_builder::screen(&tr.t("payment-succeeded-title"), &tr.t_args("payment-order", &[("id", &id)])),
        tr.t_args(
            "card-address",
            &[("address", &teloxide::utils::html::escape(&order.address))]
        ),
        tr.t_args("card-price", &[("price", &order.price.to_string())]),
        tr.t("payment-succeeded-body"),
    );
    let keyboard = Keyboard::new()
        .button(ui_builder::callback_button(&tr, "btn-my-orders", CallbackAction::ClientActive))
        .button(ui_builder::callback_button(&tr, "btn-main-menu", CallbackAction::ClientMenu));
    ctx.gateway.send(order.client_id, &text, Some(&keyboard)).await;

    // The payment is already recorded; a retry would not reach this point again
    if recorded.opened_order() {
        if let Err(e) = broadcast_to_couriers(ctx, order).await {
            crate::errors::error_logging::log_order_error(&e, "broadcast_to_couriers", order.id, None);
        }
    }
    Ok(Some(recorded))
}

/// Offer an order to every active courier in their own language
pub async fn broadcast_to_couriers(ctx: &AppContext, order: &Order) -> Result<usize> {
    let couriers = db::list_recipients_by_role(&ctx.pool, Role::Courier)
        .instrument(db_span("list_recipients_by_role"))
        .await?;

    for courier in &couriers {
        let tr = ctx.translator(courier.language_code.as_deref());
        let text = ui_builder::courier_offer_text(&tr, order);
        let keyboard = ui_builder::courier_offer_keyboard(&tr, order.id);
        ctx.gateway.send(courier.telegram_id, &text, Some(&keyboard)).await;
    }

    info!(order_id = %order.id, couriers = couriers.len(), "New order broadcast to couriers");
    Ok(couriers.len())
}

/// Activate a paid subscription. `None` when it is unknown or already paid.
pub async fn mark_subscription_paid(
    ctx: &AppContext,
    subscription_id: i64,
    payment_id: &str,
    payment_status: &str,
) -> Result<Option<Subscription>> {
    let subscription = db::mark_subscription_paid(
        &ctx.pool,
        subscription_id,
        payment_id,
        payment_status,
        Utc::now(),
    )
    .instrument(db_span("mark_subscription_paid"))
    .await?;

    let Some(subscription) = subscription else {
        info!(subscription_id = %subscription_id, "Payment matched no unpaid subscription");
        return Ok(None);
    };

    let tr = ctx.translator_for_user(subscription.client_id).await;
    let plan = tr.t(subscription.kind.label_key());
    let until = subscription
        .end_date
        .map(|date| date.format("%d.%m.%Y").to_string())
        .unwrap_or_default();
    let text = format!(
        "{}\n{}\n\n{}",
        ui_builder::screen(
            &tr.t("subscription-activated-title"),
            &tr.t_args("subscription-plan", &[("plan", &plan)])
        ),
        tr.t_args("subscription-valid-until", &[("date", &until)]),
        tr.t("subscription-activated-body"),
    );
    let keyboard = Keyboard::new()
        .button(ui_builder::callback_button(&tr, "btn-new-order", CallbackAction::ClientNewOrder))
        .button(ui_builder::callback_button(&tr, "btn-main-menu", CallbackAction::ClientMenu));
    ctx.gateway
        .send(subscription.client_id, &text, Some(&keyboard))
        .await;

    info!(subscription_id = %subscription.id, client_id = %subscription.client_id, "Subscription activated");
    Ok(Some(subscription))
}

/// Cancel orders still unpaid after the configured timeout, as of `now`.
/// Running it again is a no-op for orders it already cancelled.
pub async fn cancel_unpaid_orders(ctx: &AppContext, now: DateTime<Utc>) -> Result<Vec<Order>> {
    let timeout = ctx.orders.unpaid_timeout_mins;
    let cutoff = now - Duration::minutes(timeout);
    let cancelled = db::cancel_unpaid_orders(&ctx.pool, cutoff)
        .instrument(db_span("cancel_unpaid_orders"))
        .await?;

    observability::record_unpaid_cancelled(cancelled.len());
    let minutes = timeout.to_string();
    for order in &cancelled {
        let tr = ctx.translator_for_user(order.client_id).await;
        let id = order.id.to_string();
        let text = format!(
            "{}\n\n{}\n{}\n\n{}\n\n{}",
            tr.t_args("unpaid-cancelled-title", &[("id", &id)]),
            tr.t_args(
                "card-address",
                &[("address", &teloxide::utils::html::escape(&order.address))]
            ),
            tr.t_args("card-price", &[("price", &order.price.to_string())]),
            tr.t_args("unpaid-cancelled-reason", &[("minutes", &minutes)]),
            tr.t("unpaid-cancelled-body"),
        );
        ctx.gateway.send(order.client_id, &text, None).await;
    }

    if !cancelled.is_empty() {
        info!(count = cancelled.len(), cutoff = %cutoff, "Cancelled unpaid orders");
    }
    Ok(cancelled)
}

/// Send a one-line `{ $id }` notification to the order's client
async fn notify_client(ctx: &AppContext, order: &Order, key: &str, keyboard: Option<Keyboard>) {
    let tr = ctx.translator_for_user(order.client_id).await;
    let text = tr.t_args(key, &[("id", &order.id.to_string())]);
    ctx.gateway.send(order.client_id, &text, keyboard.as_ref()).await;
}
