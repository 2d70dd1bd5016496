//! Message Handler module for free-text messages

use anyhow::Result;
use tracing::debug;

use super::callbacks::client_callbacks;
use super::callbacks::CallbackAction;
use super::command_handlers::{self, TextCommand};
use super::ui_builder::{back_button, callback_button, order_created_text};
use super::HandlerContext;
use crate::gateway::Keyboard;
use crate::lifecycle::{self, NewOrder};
use crate::models::DetailedStatus;
use crate::payments::PaymentTarget;

/// Route a text message from a non-frozen user
pub async fn handle_text_message(ctx: &HandlerContext<'_>, text: &str) -> Result<()> {
    let command = TextCommand::parse(text);

    if !command_handlers::permitted(ctx.role, &command) {
        // Admin commands from anyone else get no reply at all
        if command.is_admin_command() {
            debug!(user_id = %ctx.user_id, role = %ctx.role, "Ignoring admin command");
            return Ok(());
        }
        return send_usage_hint(ctx).await;
    }

    match command {
        TextCommand::Start => command_handlers::show_main_menu(ctx).await,
        TextCommand::CreateOrder(new_order) => create_order(ctx, &new_order).await,
        TextCommand::Unknown => send_usage_hint(ctx).await,
        admin => command_handlers::handle_admin_command(ctx, admin).await,
    }
}

async fn send_usage_hint(ctx: &HandlerContext<'_>) -> Result<()> {
    ctx.send(&ctx.t("usage-hint"), None).await;
    Ok(())
}

/// Store a client's order, confirm it, and in payment-first mode follow up with a payment link
async fn create_order(ctx: &HandlerContext<'_>, new_order: &NewOrder) -> Result<()> {
    let order = lifecycle::create_order(ctx.app, ctx.user_id, new_order).await?;

    let keyboard = Keyboard::new()
        .button(callback_button(&ctx.tr, "btn-my-orders", CallbackAction::ClientActive))
        .button(back_button(&ctx.tr, CallbackAction::ClientMenu));
    ctx.send(&order_created_text(&ctx.tr, &order), Some(&keyboard))
        .await;

    if order.detailed_status == DetailedStatus::WaitingPayment {
        let description = ctx.t_args("payment-description-order", &[("id", &order.id.to_string())]);
        client_callbacks::send_payment_link(ctx, PaymentTarget::Order(order.id), order.price, description)
            .await?;
    }
    Ok(())
}
