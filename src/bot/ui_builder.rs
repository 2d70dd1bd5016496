//! UI Builder module for formatting order cards and per-screen keyboards

use teloxide::utils::html;

use super::callbacks::CallbackAction;
use crate::db::{Order, OrderCard};
use crate::gateway::{Button, Keyboard};
use crate::localization::Translator;
use crate::models::DetailedStatus;

/// Bold title, blank line, body
pub fn screen(title: &str, body: &str) -> String {
    format!("<b>{}</b>\n\n{}", title, body)
}

pub fn callback_button(tr: &Translator, label_key: &str, action: CallbackAction) -> Button {
    Button::callback(tr.t(label_key), action.to_string())
}

pub fn back_button(tr: &Translator, target: CallbackAction) -> Button {
    callback_button(tr, "btn-back", target)
}

/// Keyboard holding only a back button
pub fn back_keyboard(tr: &Translator, target: CallbackAction) -> Keyboard {
    Keyboard::new().button(back_button(tr, target))
}

pub fn status_label(tr: &Translator, status: DetailedStatus) -> String {
    tr.t(status.label_key())
}

/// Multi-line description of one order, user-supplied text escaped
pub fn order_card(tr: &Translator, card: &OrderCard, with_status: bool) -> String {
    let id = card.id.to_string();
    let price = card.price.to_string();
    let mut lines = vec![
        tr.t_args("card-order-id", &[("id", &id)]),
        tr.t_args("card-address", &[("address", &html::escape(&card.address))]),
        tr.t_args("card-description", &[("description", &html::escape(&card.description))]),
        tr.t_args("card-price", &[("price", &price)]),
    ];
    if with_status {
        let status = status_label(tr, card.detailed_status);
        lines.push(tr.t_args("card-status", &[("status", &status)]));
    }
    if let Some(name) = &card.courier_name {
        lines.push(tr.t_args("card-courier", &[("name", &html::escape(name))]));
    }
    lines.join("\n")
}

/// Cards separated by blank lines
pub fn order_cards(tr: &Translator, cards: &[OrderCard], with_status: bool) -> String {
    cards
        .iter()
        .map(|card| order_card(tr, card, with_status))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Compact operator view: id, status, client, courier, price
pub fn operator_order_line(tr: &Translator, card: &OrderCard) -> String {
    let id = card.id.to_string();
    let price = card.price.to_string();
    let status = status_label(tr, card.detailed_status);
    let client = card
        .client_name
        .as_deref()
        .map(html::escape)
        .unwrap_or_else(|| tr.t("unknown-name"));

    let mut lines = vec![
        tr.t_args("operator-order-header", &[("id", &id), ("status", &status)]),
        tr.t_args("card-client", &[("name", &client)]),
    ];
    if let Some(name) = &card.courier_name {
        lines.push(tr.t_args("card-courier", &[("name", &html::escape(name))]));
    }
    lines.push(tr.t_args("card-price", &[("price", &price)]));
    lines.join("\n")
}

/// Confirmation sent to a client right after their order is stored
pub fn order_created_text(tr: &Translator, order: &Order) -> String {
    let id = order.id.to_string();
    let price = order.price.to_string();
    let status = status_label(tr, order.detailed_status);
    format!(
        "{}\n\n{}\n{}\n{}\n\n{}",
        tr.t_args("order-created", &[("id", &id)]),
        tr.t_args("card-address", &[("address", &html::escape(&order.address))]),
        tr.t_args("card-description", &[("description", &html::escape(&order.description))]),
        tr.t_args("card-price", &[("price", &price)]),
        tr.t_args("card-status", &[("status", &status)]),
    )
}

/// Broadcast to couriers when an order becomes available
pub fn courier_offer_text(tr: &Translator, order: &Order) -> String {
    let id = order.id.to_string();
    let price = order.price.to_string();
    [
        tr.t_args("courier-new-order", &[("id", &id)]),
        tr.t_args("card-address", &[("address", &html::escape(&order.address))]),
        tr.t_args("card-description", &[("description", &html::escape(&order.description))]),
        tr.t_args("card-price", &[("price", &price)]),
    ]
    .join("\n")
}

pub fn courier_offer_keyboard(tr: &Translator, order_id: i64) -> Keyboard {
    Keyboard::new().button(callback_button(tr, "btn-accept", CallbackAction::AcceptOrder(order_id)))
}

/// One row of 1 to 5 star buttons
pub fn rating_keyboard(order_id: i64) -> Keyboard {
    let row = (1..=5)
        .map(|rating| {
            Button::callback(
                format!("{}⭐", rating),
                CallbackAction::RateOrder { order_id, rating }.to_string(),
            )
        })
        .collect();
    Keyboard::new().row(row)
}

/// Operator status editor: one button per target state
pub fn status_editor_keyboard(tr: &Translator, order_id: i64) -> Keyboard {
    DetailedStatus::OPERATOR_TARGETS
        .iter()
        .fold(Keyboard::new(), |keyboard, status| {
            keyboard.button(Button::callback(
                status_label(tr, *status),
                CallbackAction::SetStatus {
                    order_id,
                    status: *status,
                }
                .to_string(),
            ))
        })
        .button(back_button(tr, CallbackAction::OperatorActiveOrders))
}

/// Display name for a user row: first name, then @username, then the id
pub fn display_name(first_name: Option<&str>, username: Option<&str>, telegram_id: i64) -> String {
    match (first_name, username) {
        (Some(name), _) if !name.is_empty() => html::escape(name),
        (_, Some(username)) if !username.is_empty() => format!("@{}", html::escape(username)),
        _ => telegram_id.to_string(),
    }
}
