//! Client callbacks: menu screens, order lists, payments, subscriptions and ratings

use anyhow::Result;
use chrono::Utc;
use tracing::{info, Instrument};

use super::callback_types::CallbackAction;
use crate::bot::menus::{self, Screen};
use crate::bot::ui_builder::{back_button, back_keyboard, callback_button, order_cards, screen};
use crate::bot::HandlerContext;
use crate::db;
use crate::errors::error_logging;
use crate::gateway::{Button, Keyboard};
use crate::models::{DetailedStatus, OrderStatus, SubscriptionType, SUBSCRIPTION_DURATION_SETTING};
use crate::observability::{self, db_span};
use crate::payments::{new_request_id, PaymentRequest, PaymentTarget};
use crate::settings;

const ACTIVE_ORDERS_LIMIT: i64 = 20;
const HISTORY_LIMIT: i64 = 10;

pub async fn apply_courier(ctx: &HandlerContext<'_>) -> Result<()> {
    let created = db::create_courier_application(&ctx.app.pool, ctx.user_id)
        .instrument(db_span("create_courier_application"))
        .await?;

    let text = match created {
        Some(application_id) => {
            info!(user_id = %ctx.user_id, application_id = %application_id, "Courier application submitted");
            format!("{}\n\n{}", ctx.t("application-sent"), ctx.t("application-sent-body"))
        }
        None => ctx.t("application-pending"),
    };
    ctx.reply(&text, Some(&back_keyboard(&ctx.tr, CallbackAction::Start)))
        .await;
    Ok(())
}

pub async fn show_client_menu(ctx: &HandlerContext<'_>) -> Result<()> {
    let text = screen(&ctx.t("client-menu-title"), &ctx.t("choose-action"));
    let keyboard = menus::keyboard(&ctx.tr, ctx.role, Screen::ClientMenu, &ctx.app.support_url);
    ctx.reply(&text, Some(&keyboard)).await;
    Ok(())
}

/// Explain the three-line order format
pub async fn show_new_order_form(ctx: &HandlerContext<'_>) -> Result<()> {
    let text = format!(
        "{}\n\n<code>{}\n{}\n{}</code>\n\n<b>{}</b>\n{}\n{}\n{}",
        screen(&ctx.t("new-order-title"), &ctx.t("new-order-instructions")),
        ctx.t("field-address"),
        ctx.t("field-description"),
        ctx.t("field-price"),
        ctx.t("new-order-example-title"),
        ctx.t("new-order-example-address"),
        ctx.t("new-order-example-description"),
        ctx.t("new-order-example-price"),
    );
    ctx.reply(&text, Some(&back_keyboard(&ctx.tr, CallbackAction::ClientMenu)))
        .await;
    Ok(())
}

/// Pending and accepted orders, with a pay button for each unpaid one
pub async fn show_active_orders(ctx: &HandlerContext<'_>) -> Result<()> {
    let orders = db::list_client_orders(
        &ctx.app.pool,
        ctx.user_id,
        &[OrderStatus::Pending, OrderStatus::Accepted],
        ACTIVE_ORDERS_LIMIT,
    )
    .instrument(db_span("list_client_orders"))
    .await?;

    let body = if orders.is_empty() {
        ctx.t("no-client-active-orders")
    } else {
        order_cards(&ctx.tr, &orders, true)
    };

    let mut keyboard = Keyboard::new();
    if ctx.app.payments.is_some() {
        for order in orders
            .iter()
            .filter(|o| o.detailed_status == DetailedStatus::WaitingPayment)
        {
            let label = ctx.t_args("btn-pay-order", &[("id", &order.id.to_string())]);
            keyboard = keyboard.button(Button::callback(
                label,
                CallbackAction::PayOrder(order.id).to_string(),
            ));
        }
    }
    let keyboard = keyboard.button(back_button(&ctx.tr, CallbackAction::ClientMenu));

    ctx.reply(&screen(&ctx.t("client-active-title"), &body), Some(&keyboard))
        .await;
    Ok(())
}

pub async fn show_order_history(ctx: &HandlerContext<'_>) -> Result<()> {
    let orders = db::list_client_orders(
        &ctx.app.pool,
        ctx.user_id,
        &[OrderStatus::Completed],
        HISTORY_LIMIT,
    )
    .instrument(db_span("list_client_orders"))
    .await?;

    let body = if orders.is_empty() {
        ctx.t("no-order-history")
    } else {
        order_cards(&ctx.tr, &orders, false)
    };
    ctx.reply(
        &screen(&ctx.t("order-history-title"), &body),
        Some(&back_keyboard(&ctx.tr, CallbackAction::ClientMenu)),
    )
    .await;
    Ok(())
}

pub async fn show_payment_methods(ctx: &HandlerContext<'_>) -> Result<()> {
    let body = [
        ctx.t("payment-methods-intro"),
        String::new(),
        ctx.t("payment-method-card"),
        ctx.t("payment-method-cash"),
        ctx.t("payment-method-sbp"),
        String::new(),
        ctx.t("payment-methods-note"),
    ]
    .join("\n");
    ctx.reply(
        &screen(&ctx.t("payment-methods-title"), &body),
        Some(&back_keyboard(&ctx.tr, CallbackAction::ClientMenu)),
    )
    .await;
    Ok(())
}

/// Current price of a plan and the subscription length in days
async fn plan_terms(ctx: &HandlerContext<'_>, kind: SubscriptionType) -> (i64, i64) {
    let (price_key, price_default) = kind.price_setting();
    let (duration_key, duration_default) = SUBSCRIPTION_DURATION_SETTING;
    let settings = ctx.app.settings.as_ref();
    (
        settings::get_i64(settings, price_key, price_default).await,
        settings::get_i64(settings, duration_key, duration_default).await,
    )
}

pub async fn show_subscriptions(ctx: &HandlerContext<'_>) -> Result<()> {
    let mut lines = vec![ctx.t("subscription-intro"), String::new()];
    let mut keyboard = Keyboard::new();
    let mut duration_days = SUBSCRIPTION_DURATION_SETTING.1;

    for kind in SubscriptionType::ALL {
        let (price, days) = plan_terms(ctx, kind).await;
        duration_days = days;
        let plan = ctx.t(kind.label_key());
        let price = price.to_string();
        let args = [("plan", plan.as_str()), ("price", price.as_str())];
        lines.push(ctx.t_args("subscription-plan-line", &args));
        keyboard = keyboard.button(Button::callback(
            ctx.t_args("btn-subscribe", &args),
            CallbackAction::Subscribe(kind).to_string(),
        ));
    }
    lines.push(String::new());
    lines.push(ctx.t_args(
        "subscription-duration",
        &[("days", &duration_days.to_string())],
    ));

    let keyboard = keyboard.button(back_button(&ctx.tr, CallbackAction::ClientMenu));
    ctx.reply(
        &screen(&ctx.t("subscription-title"), &lines.join("\n")),
        Some(&keyboard),
    )
    .await;
    Ok(())
}

/// Create an unpaid subscription and hand out its payment link
pub async fn subscribe(ctx: &HandlerContext<'_>, kind: SubscriptionType) -> Result<()> {
    if ctx.app.payments.is_none() {
        return reply_payments_unavailable(ctx).await;
    }

    let (price, duration_days) = plan_terms(ctx, kind).await;
    let subscription = db::create_subscription(
        &ctx.app.pool,
        ctx.user_id,
        kind,
        price,
        i32::try_from(duration_days).unwrap_or(SUBSCRIPTION_DURATION_SETTING.1 as i32),
    )
    .instrument(db_span("create_subscription"))
    .await?;

    info!(user_id = %ctx.user_id, subscription_id = %subscription.id, kind = %kind, "Subscription created");
    let plan = ctx.t(kind.label_key());
    let description = ctx.t_args("payment-description-subscription", &[("plan", &plan)]);
    send_payment_link(
        ctx,
        PaymentTarget::Subscription(subscription.id),
        price,
        description,
    )
    .await
}

/// Payment link for one of the caller's unpaid orders
pub async fn pay_order(ctx: &HandlerContext<'_>, order_id: i64) -> Result<()> {
    let order = db::get_order(&ctx.app.pool, order_id)
        .instrument(db_span("get_order"))
        .await?
        .filter(|o| o.client_id == ctx.user_id && o.detailed_status == DetailedStatus::WaitingPayment);

    let Some(order) = order else {
        ctx.reply(
            &ctx.t("order-not-found"),
            Some(&back_keyboard(&ctx.tr, CallbackAction::ClientActive)),
        )
        .await;
        return Ok(());
    };

    let description = ctx.t_args("payment-description-order", &[("id", &order.id.to_string())]);
    send_payment_link(ctx, PaymentTarget::Order(order.id), order.price, description).await
}

async fn reply_payments_unavailable(ctx: &HandlerContext<'_>) -> Result<()> {
    ctx.reply(
        &ctx.t("payment-unavailable"),
        Some(&back_keyboard(&ctx.tr, CallbackAction::ClientMenu)),
    )
    .await;
    Ok(())
}

/// Create a provider payment for `target`, remember its id and show the link.
/// Provider failures are reported to the user, not returned.
pub async fn send_payment_link(
    ctx: &HandlerContext<'_>,
    target: PaymentTarget,
    amount: i64,
    description: String,
) -> Result<()> {
    let Some(provider) = ctx.app.payments.as_ref() else {
        return reply_payments_unavailable(ctx).await;
    };

    let order_ref = target.to_string();
    let request = PaymentRequest::new(order_ref.as_str(), amount as f64, description, &new_request_id());
    let created = match provider
        .create_payment(&request)
        .instrument(observability::payment_span("create", Some(&order_ref)))
        .await
    {
        Ok(created) => created,
        Err(e) => {
            error_logging::log_payment_error(&e, "create_payment", Some(&order_ref), Some(e.status_code().as_u16()));
            ctx.reply(
                &ctx.t("payment-failed"),
                Some(&back_keyboard(&ctx.tr, CallbackAction::ClientMenu)),
            )
            .await;
            return Ok(());
        }
    };

    match target {
        PaymentTarget::Order(order_id) => {
            db::set_order_payment_id(&ctx.app.pool, order_id, &created.payment_id)
                .instrument(db_span("set_order_payment_id"))
                .await?;
        }
        PaymentTarget::Subscription(subscription_id) => {
            db::set_subscription_payment_id(&ctx.app.pool, subscription_id, &created.payment_id)
                .instrument(db_span("set_subscription_payment_id"))
                .await?;
        }
    }

    let amount = amount.to_string();
    let text = screen(
        &ctx.t("payment-link-title"),
        &ctx.t_args("payment-link-body", &[("amount", &amount)]),
    );
    let keyboard = Keyboard::new()
        .button(Button::url(ctx.t("btn-pay"), created.payment_url.as_str()))
        .button(back_button(&ctx.tr, CallbackAction::ClientMenu));
    ctx.reply(&text, Some(&keyboard)).await;
    Ok(())
}

/// Store a 1-5 star rating for a completed order, once
pub async fn rate_order(ctx: &HandlerContext<'_>, order_id: i64, rating: i32) -> Result<()> {
    let created = db::create_rating(&ctx.app.pool, order_id, ctx.user_id, rating, Utc::now())
        .instrument(db_span("create_rating"))
        .await?;

    let text = match created {
        Some(_) => {
            info!(order_id = %order_id, rating = %rating, "Order rated");
            let stars = "⭐".repeat(rating.clamp(1, 5) as usize);
            ctx.t_args("rating-thanks", &[("stars", &stars)])
        }
        None => ctx.t("rating-unavailable"),
    };
    let keyboard = Keyboard::new().button(callback_button(&ctx.tr, "btn-main-menu", CallbackAction::ClientMenu));
    ctx.reply(&text, Some(&keyboard)).await;
    Ok(())
}
