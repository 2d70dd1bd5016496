//! Callback handler module: routes parsed inline button presses to the
//! per-role handlers

use anyhow::Result;
use teloxide::utils::html;
use tracing::{debug, Instrument};

use super::callback_types::CallbackAction;
use super::{client_callbacks, courier_callbacks, staff_callbacks};
use crate::bot::ui_builder::{back_keyboard, screen};
use crate::bot::{command_handlers, HandlerContext};
use crate::db;
use crate::observability::db_span;

/// How many reviews the public reviews screen shows
const REVIEWS_LIMIT: i64 = 10;

/// Handle a callback action the caller's role is allowed to perform.
/// Actions outside the role are dropped without a reply.
pub async fn handle_callback(ctx: &HandlerContext<'_>, action: CallbackAction) -> Result<()> {
    if !action.allowed_for(ctx.role) {
        debug!(
            user_id = %ctx.user_id,
            role = %ctx.role,
            action = %action.name(),
            "Ignoring callback outside the caller's role"
        );
        return Ok(());
    }

    use CallbackAction::*;
    match action {
        Start => command_handlers::show_main_menu(ctx).await,
        Reviews => show_reviews(ctx).await,

        ApplyCourier => client_callbacks::apply_courier(ctx).await,
        ClientMenu => client_callbacks::show_client_menu(ctx).await,
        ClientNewOrder => client_callbacks::show_new_order_form(ctx).await,
        ClientActive => client_callbacks::show_active_orders(ctx).await,
        ClientHistory => client_callbacks::show_order_history(ctx).await,
        ClientPayment => client_callbacks::show_payment_methods(ctx).await,
        ClientSubscription => client_callbacks::show_subscriptions(ctx).await,
        Subscribe(kind) => client_callbacks::subscribe(ctx, kind).await,
        PayOrder(order_id) => client_callbacks::pay_order(ctx, order_id).await,
        RateOrder { order_id, rating } => client_callbacks::rate_order(ctx, order_id, rating).await,

        CourierAvailable => courier_callbacks::show_available_orders(ctx).await,
        CourierCurrent => courier_callbacks::show_current_orders(ctx).await,
        CourierHistory => courier_callbacks::show_order_history(ctx).await,
        CourierStats => courier_callbacks::show_stats(ctx).await,
        CourierWithdraw => courier_callbacks::show_withdraw(ctx).await,
        AcceptOrder(order_id) => courier_callbacks::accept_order(ctx, order_id).await,
        StartWork(order_id) => courier_callbacks::start_work(ctx, order_id).await,
        CompleteOrder(order_id) => courier_callbacks::complete_order(ctx, order_id).await,

        OperatorActiveOrders => staff_callbacks::show_active_orders(ctx).await,
        OperatorChats | OperatorChat(_) => staff_callbacks::show_chat_placeholder(ctx).await,
        OperatorStats => staff_callbacks::show_operator_stats(ctx).await,
        OperatorStatus(order_id) => staff_callbacks::show_status_editor(ctx, order_id).await,
        SetStatus { order_id, status } => staff_callbacks::set_status(ctx, order_id, status).await,

        AdminPanel => staff_callbacks::show_admin_panel(ctx).await,
        AdminStats => staff_callbacks::show_service_stats(ctx).await,
        AdminApplications => staff_callbacks::show_applications(ctx).await,
        AdminAllOrders => staff_callbacks::show_all_orders(ctx).await,
        AdminAddOperator => staff_callbacks::show_add_operator_prompt(ctx).await,
        AdminFreezeUser => staff_callbacks::show_freeze_prompt(ctx).await,
        ApproveCourier(applicant) => staff_callbacks::review_application(ctx, applicant, true).await,
        RejectCourier(applicant) => staff_callbacks::review_application(ctx, applicant, false).await,
    }
}

/// Recent client reviews, visible to every role
async fn show_reviews(ctx: &HandlerContext<'_>) -> Result<()> {
    let reviews = db::list_recent_reviews(&ctx.app.pool, REVIEWS_LIMIT)
        .instrument(db_span("list_recent_reviews"))
        .await?;

    let body = if reviews.is_empty() {
        ctx.t("no-reviews")
    } else {
        reviews
            .iter()
            .map(|review| {
                let stars = "⭐".repeat(review.rating.clamp(0, 5) as usize);
                let courier = review
                    .courier_name
                    .as_deref()
                    .map(html::escape)
                    .unwrap_or_else(|| ctx.t("unknown-name"));
                let mut line = ctx.t_args("review-line", &[("stars", &stars), ("courier", &courier)]);
                if let Some(text) = review.review.as_deref().filter(|t| !t.trim().is_empty()) {
                    line.push('\n');
                    line.push_str(&html::escape(text));
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    let text = screen(&ctx.t("reviews-title"), &body);
    ctx.reply(&text, Some(&back_keyboard(&ctx.tr, CallbackAction::Start)))
        .await;
    Ok(())
}
