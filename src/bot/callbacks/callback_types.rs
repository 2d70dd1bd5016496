//! Callback data carried by inline buttons
//!
//! Every button the bot renders is built from a [`CallbackAction`], and every
//! incoming callback query is parsed back into one, so the string format
//! lives in exactly one place.

use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;

use crate::models::{DetailedStatus, Role, SubscriptionType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    Start,
    Reviews,

    // Client
    ApplyCourier,
    ClientMenu,
    ClientNewOrder,
    ClientActive,
    ClientHistory,
    ClientPayment,
    ClientSubscription,
    Subscribe(SubscriptionType),
    PayOrder(i64),
    RateOrder { order_id: i64, rating: i32 },

    // Courier
    CourierAvailable,
    CourierCurrent,
    CourierHistory,
    CourierStats,
    CourierWithdraw,
    AcceptOrder(i64),
    StartWork(i64),
    CompleteOrder(i64),

    // Operator and admin
    OperatorActiveOrders,
    OperatorChats,
    OperatorChat(i64),
    OperatorStats,
    OperatorStatus(i64),
    SetStatus { order_id: i64, status: DetailedStatus },

    // Admin
    AdminPanel,
    AdminStats,
    AdminApplications,
    AdminAllOrders,
    AdminAddOperator,
    AdminFreezeUser,
    ApproveCourier(i64),
    RejectCourier(i64),
}

lazy_static! {
    static ref RATE_ORDER_PATTERN: Regex =
        Regex::new(r"^rate_order_(\d+)_([1-5])$").expect("Invalid rating callback pattern");
    static ref SET_STATUS_PATTERN: Regex =
        Regex::new(r"^set_status_(\d+)_([a-z_]+)$").expect("Invalid status callback pattern");
}

/// Parse the numeric tail of `prefix<id>`
fn id_after(data: &str, prefix: &str) -> Option<i64> {
    data.strip_prefix(prefix)?.parse().ok()
}

impl CallbackAction {
    /// Parse callback data; unknown or malformed data yields `None`
    pub fn parse(data: &str) -> Option<Self> {
        use CallbackAction::*;

        let exact = match data {
            "start" => Some(Start),
            "reviews" => Some(Reviews),
            "apply_courier" => Some(ApplyCourier),
            "client_menu" => Some(ClientMenu),
            "client_new_order" => Some(ClientNewOrder),
            "client_active" | "client_active_orders" => Some(ClientActive),
            "client_history" => Some(ClientHistory),
            "client_payment" => Some(ClientPayment),
            "client_subscription" => Some(ClientSubscription),
            "courier_available" => Some(CourierAvailable),
            "courier_current" => Some(CourierCurrent),
            "courier_history" => Some(CourierHistory),
            "courier_stats" => Some(CourierStats),
            "courier_withdraw" => Some(CourierWithdraw),
            "operator_active_orders" => Some(OperatorActiveOrders),
            "operator_chats" => Some(OperatorChats),
            "operator_stats" => Some(OperatorStats),
            "admin_panel" => Some(AdminPanel),
            "admin_stats" => Some(AdminStats),
            "admin_courier_applications" => Some(AdminApplications),
            "admin_all_orders" => Some(AdminAllOrders),
            "admin_add_operator" => Some(AdminAddOperator),
            "admin_freeze_user" => Some(AdminFreezeUser),
            _ => None,
        };
        if exact.is_some() {
            return exact;
        }

        if let Some(kind) = data.strip_prefix("subscribe_") {
            return kind.parse().ok().map(Subscribe);
        }
        if let Some(caps) = RATE_ORDER_PATTERN.captures(data) {
            return Some(RateOrder {
                order_id: caps[1].parse().ok()?,
                rating: caps[2].parse().ok()?,
            });
        }
        if let Some(caps) = SET_STATUS_PATTERN.captures(data) {
            let status: DetailedStatus = caps[2].parse().ok()?;
            if !DetailedStatus::OPERATOR_TARGETS.contains(&status) {
                return None;
            }
            return Some(SetStatus {
                order_id: caps[1].parse().ok()?,
                status,
            });
        }

        let prefixed: [(&str, fn(i64) -> CallbackAction); 8] = [
            ("pay_order_", PayOrder),
            ("accept_order_", AcceptOrder),
            ("start_work_", StartWork),
            ("complete_order_", CompleteOrder),
            ("operator_status_", OperatorStatus),
            ("operator_chat_", OperatorChat),
            ("approve_courier_", ApproveCourier),
            ("reject_courier_", RejectCourier),
        ];
        prefixed
            .iter()
            .find_map(|(prefix, build)| id_after(data, prefix).map(build))
    }

    /// Whether `role` may trigger this action; anything else is ignored silently
    pub fn allowed_for(&self, role: Role) -> bool {
        use CallbackAction::*;

        match self {
            Start | Reviews => true,

            ApplyCourier | ClientMenu | ClientNewOrder | ClientActive | ClientHistory
            | ClientPayment | ClientSubscription | Subscribe(_) | PayOrder(_)
            | RateOrder { .. } => role == Role::Client,

            CourierAvailable | CourierCurrent | CourierHistory | CourierStats
            | CourierWithdraw | AcceptOrder(_) | StartWork(_) | CompleteOrder(_) => {
                role == Role::Courier
            }

            OperatorActiveOrders | OperatorChats | OperatorChat(_) | OperatorStats
            | OperatorStatus(_) | SetStatus { .. } => role.is_staff(),

            AdminPanel | AdminStats | AdminApplications | AdminAllOrders | AdminAddOperator
            | AdminFreezeUser | ApproveCourier(_) | RejectCourier(_) => role == Role::Admin,
        }
    }

    /// Short name for logs and metrics
    pub fn name(&self) -> &'static str {
        use CallbackAction::*;

        match self {
            Start => "start",
            Reviews => "reviews",
            ApplyCourier => "apply_courier",
            ClientMenu => "client_menu",
            ClientNewOrder => "client_new_order",
            ClientActive => "client_active",
            ClientHistory => "client_history",
            ClientPayment => "client_payment",
            ClientSubscription => "client_subscription",
            Subscribe(_) => "subscribe",
            PayOrder(_) => "pay_order",
            RateOrder { .. } => "rate_order",
            CourierAvailable => "courier_available",
            CourierCurrent => "courier_current",
            CourierHistory => "courier_history",
            CourierStats => "courier_stats",
            CourierWithdraw => "courier_withdraw",
            AcceptOrder(_) => "accept_order",
            StartWork(_) => "start_work",
            CompleteOrder(_) => "complete_order",
            OperatorActiveOrders => "operator_active_orders",
            OperatorChats => "operator_chats",
            OperatorChat(_) => "operator_chat",
            OperatorStats => "operator_stats",
            OperatorStatus(_) => "operator_status",
            SetStatus { .. } => "set_status",
            AdminPanel => "admin_panel",
            AdminStats => "admin_stats",
            AdminApplications => "admin_courier_applications",
            AdminAllOrders => "admin_all_orders",
            AdminAddOperator => "admin_add_operator",
            AdminFreezeUser => "admin_freeze_user",
            ApproveCourier(_) => "approve_courier",
            RejectCourier(_) => "reject_courier",
        }
    }
}

impl fmt::Display for CallbackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use CallbackAction::*;

        match self {
            Subscribe(kind) => write!(f, "subscribe_{}", kind),
            PayOrder(id) => write!(f, "pay_order_{}", id),
            RateOrder { order_id, rating } => write!(f, "rate_order_{}_{}", order_id, rating),
            AcceptOrder(id) => write!(f, "accept_order_{}", id),
            StartWork(id) => write!(f, "start_work_{}", id),
            CompleteOrder(id) => write!(f, "complete_order_{}", id),
            OperatorChat(id) => write!(f, "operator_chat_{}", id),
            OperatorStatus(id) => write!(f, "operator_status_{}", id),
            SetStatus { order_id, status } => write!(f, "set_status_{}_{}", order_id, status),
            ApproveCourier(id) => write!(f, "approve_courier_{}", id),
            RejectCourier(id) => write!(f, "reject_courier_{}", id),
            other => f.write_str(other.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_exact_actions() {
        assert_eq!(CallbackAction::parse("start"), Some(CallbackAction::Start));
        assert_eq!(
            CallbackAction::parse("operator_stats"),
            Some(CallbackAction::OperatorStats)
        );
        assert_eq!(
            CallbackAction::parse("client_active_orders"),
            Some(CallbackAction::ClientActive)
        );
        assert_eq!(CallbackAction::parse("unknown"), None);
        assert_eq!(CallbackAction::parse(""), None);
    }

    #[test]
    fn test_parse_prefixed_actions() {
        assert_eq!(
            CallbackAction::parse("accept_order_42"),
            Some(CallbackAction::AcceptOrder(42))
        );
        assert_eq!(
            CallbackAction::parse("operator_status_7"),
            Some(CallbackAction::OperatorStatus(7))
        );
        assert_eq!(
            CallbackAction::parse("set_status_42_completed"),
            Some(CallbackAction::SetStatus {
                order_id: 42,
                status: DetailedStatus::Completed
            })
        );
        assert_eq!(
            CallbackAction::parse("set_status_42_courier_on_way"),
            Some(CallbackAction::SetStatus {
                order_id: 42,
                status: DetailedStatus::CourierOnWay
            })
        );
        assert_eq!(
            CallbackAction::parse("rate_order_5_4"),
            Some(CallbackAction::RateOrder {
                order_id: 5,
                rating: 4
            })
        );
        assert_eq!(
            CallbackAction::parse("subscribe_alternate"),
            Some(CallbackAction::Subscribe(SubscriptionType::Alternate))
        );
    }

    #[test]
    fn test_parse_rejects_malformed_payloads() {
        assert_eq!(CallbackAction::parse("accept_order_abc"), None);
        assert_eq!(CallbackAction::parse("accept_order_"), None);
        assert_eq!(CallbackAction::parse("set_status_42_waiting_payment"), None);
        assert_eq!(CallbackAction::parse("set_status_42_flying"), None);
        assert_eq!(CallbackAction::parse("rate_order_5_6"), None);
        assert_eq!(CallbackAction::parse("subscribe_weekly"), None);
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        let actions = [
            CallbackAction::Start,
            CallbackAction::AdminApplications,
            CallbackAction::CompleteOrder(9),
            CallbackAction::SetStatus {
                order_id: 3,
                status: DetailedStatus::SearchingCourier,
            },
            CallbackAction::RateOrder {
                order_id: 11,
                rating: 5,
            },
            CallbackAction::Subscribe(SubscriptionType::Daily),
            CallbackAction::PayOrder(8),
        ];
        for action in actions {
            assert_eq!(CallbackAction::parse(&action.to_string()), Some(action));
        }
    }

    #[test]
    fn test_permissions_fail_closed() {
        assert!(CallbackAction::Start.allowed_for(Role::Courier));
        assert!(CallbackAction::AcceptOrder(1).allowed_for(Role::Courier));
        assert!(!CallbackAction::AcceptOrder(1).allowed_for(Role::Client));
        assert!(CallbackAction::OperatorStatus(1).allowed_for(Role::Admin));
        assert!(!CallbackAction::OperatorStatus(1).allowed_for(Role::Courier));
        assert!(!CallbackAction::ApproveCourier(1).allowed_for(Role::Operator));
        assert!(!CallbackAction::ClientMenu.allowed_for(Role::Courier));
    }
}
