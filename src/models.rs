//! # Domain Enums
//!
//! Closed sets of values stored as text columns: user roles, the two order
//! status columns, courier application states and subscription plans.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error returned when a stored or received value is not a known variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for ParseEnumError {}

/// Implements `as_str`, `Display` and `FromStr` over a fixed string table.
macro_rules! text_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(ParseEnumError {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

/// The four mutually exclusive roles a Telegram user can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Client,
    Courier,
    Operator,
    Admin,
}

text_enum!(Role, "role", {
    Client => "client",
    Courier => "courier",
    Operator => "operator",
    Admin => "admin",
});

impl Role {
    /// Operators and admins share the order-management screens
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Operator | Role::Admin)
    }
}

/// Coarse order status, always derived from [`DetailedStatus`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Accepted,
    Completed,
    Cancelled,
}

text_enum!(OrderStatus, "order status", {
    Pending => "pending",
    Accepted => "accepted",
    Completed => "completed",
    Cancelled => "cancelled",
});

/// Fine-grained order lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailedStatus {
    WaitingPayment,
    SearchingCourier,
    CourierOnWay,
    CourierWorking,
    Completed,
    Cancelled,
}

text_enum!(DetailedStatus, "detailed status", {
    WaitingPayment => "waiting_payment",
    SearchingCourier => "searching_courier",
    CourierOnWay => "courier_on_way",
    CourierWorking => "courier_working",
    Completed => "completed",
    Cancelled => "cancelled",
});

impl DetailedStatus {
    /// Targets offered in the operator status editor, in display order
    pub const OPERATOR_TARGETS: [DetailedStatus; 5] = [
        DetailedStatus::SearchingCourier,
        DetailedStatus::CourierOnWay,
        DetailedStatus::CourierWorking,
        DetailedStatus::Completed,
        DetailedStatus::Cancelled,
    ];

    /// The coarse status this state projects onto
    pub fn status(&self) -> OrderStatus {
        match self {
            DetailedStatus::WaitingPayment | DetailedStatus::SearchingCourier => {
                OrderStatus::Pending
            }
            DetailedStatus::CourierOnWay | DetailedStatus::CourierWorking => OrderStatus::Accepted,
            DetailedStatus::Completed => OrderStatus::Completed,
            DetailedStatus::Cancelled => OrderStatus::Cancelled,
        }
    }

    /// States that only make sense with an assigned courier
    pub fn requires_courier(&self) -> bool {
        matches!(
            self,
            DetailedStatus::CourierOnWay | DetailedStatus::CourierWorking | DetailedStatus::Completed
        )
    }

    /// States that must not carry a courier
    pub fn precedes_courier(&self) -> bool {
        matches!(
            self,
            DetailedStatus::WaitingPayment | DetailedStatus::SearchingCourier
        )
    }

    /// Localization key of the human-readable label
    pub fn label_key(&self) -> &'static str {
        match self {
            DetailedStatus::WaitingPayment => "status-waiting-payment",
            DetailedStatus::SearchingCourier => "status-searching-courier",
            DetailedStatus::CourierOnWay => "status-courier-on-way",
            DetailedStatus::CourierWorking => "status-courier-working",
            DetailedStatus::Completed => "status-completed",
            DetailedStatus::Cancelled => "status-cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
}

text_enum!(ApplicationStatus, "application status", {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
});

/// Subscription plans: pickup every day or every other day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionType {
    Daily,
    Alternate,
}

text_enum!(SubscriptionType, "subscription type", {
    Daily => "daily",
    Alternate => "alternate",
});

impl SubscriptionType {
    pub const ALL: [SubscriptionType; 2] = [SubscriptionType::Daily, SubscriptionType::Alternate];

    /// Settings key holding the plan price and its fallback value
    pub fn price_setting(&self) -> (&'static str, i64) {
        match self {
            SubscriptionType::Daily => ("subscription_daily_price", 3000),
            SubscriptionType::Alternate => ("subscription_alternate_price", 1800),
        }
    }

    pub fn label_key(&self) -> &'static str {
        match self {
            SubscriptionType::Daily => "subscription-daily",
            SubscriptionType::Alternate => "subscription-alternate",
        }
    }
}

/// Settings key and fallback for the subscription length
pub const SUBSCRIPTION_DURATION_SETTING: (&str, i64) = ("subscription_duration_days", 30);
