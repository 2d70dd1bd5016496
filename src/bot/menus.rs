//! Static menu layouts keyed by (role, screen)

use super::callbacks::CallbackAction;
use crate::gateway::{Button, Keyboard};
use crate::localization::Translator;
use crate::models::Role;

/// Screens that have a role-dependent menu
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Main,
    ClientMenu,
    AdminPanel,
}

/// One button of a menu layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuEntry {
    Action(&'static str, CallbackAction),
    /// Link to the configured support chat
    Support(&'static str),
}

use CallbackAction as A;
use MenuEntry::{Action, Support};

const CLIENT_MAIN: &[MenuEntry] = &[
    Action("btn-apply-courier", A::ApplyCourier),
    Action("btn-client-menu", A::ClientMenu),
    Action("btn-reviews", A::Reviews),
    Support("btn-support"),
];

const COURIER_MAIN: &[MenuEntry] = &[
    Action("btn-courier-available", A::CourierAvailable),
    Action("btn-courier-current", A::CourierCurrent),
    Action("btn-order-history", A::CourierHistory),
    Action("btn-courier-stats", A::CourierStats),
    Support("btn-contact-support"),
    Action("btn-courier-withdraw", A::CourierWithdraw),
    Action("btn-back", A::Start),
];

const OPERATOR_MAIN: &[MenuEntry] = &[
    Action("btn-active-orders", A::OperatorActiveOrders),
    Action("btn-operator-chats", A::OperatorChats),
    Action("btn-operator-stats", A::OperatorStats),
];

const ADMIN_MAIN: &[MenuEntry] = &[
    Action("btn-admin-panel", A::AdminPanel),
    Action("btn-service-stats", A::AdminStats),
    Action("btn-courier-applications", A::AdminApplications),
    Action("btn-add-operator", A::AdminAddOperator),
    Action("btn-active-orders", A::OperatorActiveOrders),
    Action("btn-all-orders", A::AdminAllOrders),
];

const CLIENT_MENU: &[MenuEntry] = &[
    Action("btn-new-order", A::ClientNewOrder),
    Action("btn-active-orders", A::ClientActive),
    Action("btn-order-history", A::ClientHistory),
    Action("btn-payment-method", A::ClientPayment),
    Support("btn-contact-support"),
    Action("btn-subscription", A::ClientSubscription),
    Action("btn-back", A::Start),
];

const ADMIN_PANEL: &[MenuEntry] = &[
    Action("btn-courier-applications", A::AdminApplications),
    Action("btn-add-operator", A::AdminAddOperator),
    Action("btn-freeze-user", A::AdminFreezeUser),
    Action("btn-service-stats", A::AdminStats),
    Action("btn-all-orders", A::AdminAllOrders),
    Action("btn-back", A::Start),
];

/// Layout for a role on a screen; empty when the role has no such screen
pub fn layout(role: Role, screen: Screen) -> &'static [MenuEntry] {
    match (screen, role) {
        (Screen::Main, Role::Client) => CLIENT_MAIN,
        (Screen::Main, Role::Courier) => COURIER_MAIN,
        (Screen::Main, Role::Operator) => OPERATOR_MAIN,
        (Screen::Main, Role::Admin) => ADMIN_MAIN,
        (Screen::ClientMenu, Role::Client) => CLIENT_MENU,
        (Screen::AdminPanel, Role::Admin) => ADMIN_PANEL,
        _ => &[],
    }
}

/// Render a layout, one button per row
pub fn keyboard(tr: &Translator, role: Role, screen: Screen, support_url: &str) -> Keyboard {
    layout(role, screen)
        .iter()
        .fold(Keyboard::new(), |keyboard, entry| {
            let button = match entry {
                Action(label_key, action) => Button::callback(tr.t(label_key), action.to_string()),
                Support(label_key) => Button::url(tr.t(label_key), support_url),
            };
            keyboard.button(button)
        })
}

/// Greeting shown above the main menu
pub fn main_menu_text(tr: &Translator, role: Role) -> String {
    match role {
        Role::Admin => super::ui_builder::screen(&tr.t("admin-title"), &tr.t("admin-welcome")),
        Role::Operator => {
            super::ui_builder::screen(&tr.t("operator-title"), &tr.t("operator-welcome"))
        }
        Role::Courier => super::ui_builder::screen(&tr.t("courier-title"), &tr.t("choose-action")),
        Role::Client => format!(
            "{}\n\n{}",
            super::ui_builder::screen(&tr.t("welcome-title"), &tr.t("welcome-body")),
            tr.t("choose-action")
        ),
    }
}
