//! # Payments
//!
//! Payment creation through the provider API and processing of the
//! provider's asynchronous notifications. Unlike the bot webhook, every
//! failure here maps to an explicit HTTP status so the provider can decide
//! whether to retry.

pub mod create;
pub mod webhook;
pub mod yookassa;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rand::Rng;
use serde::Serialize;
use serde_json::json;
use std::fmt;

pub use yookassa::YooKassaClient;

/// `metadata.order_id` prefix marking a subscription payment
pub const SUBSCRIPTION_PREFIX: &str = "sub_";

/// Default payment description when the caller gives none
pub const DEFAULT_DESCRIPTION: &str = "Оплата заказа";

/// What a payment pays for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentTarget {
    Order(i64),
    Subscription(i64),
}

impl PaymentTarget {
    /// Parse a `metadata.order_id` value ("7" or "sub_7")
    pub fn parse(raw: &str) -> Result<Self, PaymentError> {
        let raw = raw.trim();
        match raw.strip_prefix(SUBSCRIPTION_PREFIX) {
            Some(id) => id
                .parse()
                .map(PaymentTarget::Subscription)
                .map_err(|_| PaymentError::InvalidField(format!("Invalid subscription id: {}", raw))),
            None => raw
                .parse()
                .map(PaymentTarget::Order)
                .map_err(|_| PaymentError::InvalidField(format!("Invalid order id: {}", raw))),
        }
    }
}

impl fmt::Display for PaymentTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentTarget::Order(id) => write!(f, "{}", id),
            PaymentTarget::Subscription(id) => write!(f, "{}{}", SUBSCRIPTION_PREFIX, id),
        }
    }
}

/// A payment to create at the provider
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    /// Value stored in `metadata.order_id`
    pub order_ref: String,
    /// Amount with exactly two decimals, e.g. "500.00"
    pub amount: String,
    pub description: String,
    pub idempotency_key: String,
}

impl PaymentRequest {
    /// Build a request keyed by `order_<order_ref>_<request_id>`
    pub fn new(
        order_ref: impl Into<String>,
        amount: f64,
        description: impl Into<String>,
        request_id: &str,
    ) -> Self {
        let order_ref = order_ref.into();
        Self {
            idempotency_key: format!("order_{}_{}", order_ref, request_id),
            amount: format_amount(amount),
            description: description.into(),
            order_ref,
        }
    }
}

/// A payment the provider accepted
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatedPayment {
    pub payment_id: String,
    pub payment_url: String,
    pub status: String,
}

/// Render an amount the way the provider expects it
pub fn format_amount(amount: f64) -> String {
    format!("{:.2}", amount)
}

/// Random id distinguishing one inbound request from another
pub fn new_request_id() -> String {
    let value: u64 = rand::rng().random();
    format!("{:016x}", value)
}

/// Creates payments at an external provider
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_payment(&self, request: &PaymentRequest) -> Result<CreatedPayment, PaymentError>;
}

/// Failures on the payment boundary, each with its HTTP status
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentError {
    /// Required request fields are absent
    MissingFields(&'static str),
    /// A field is present but unusable
    InvalidField(String),
    /// Provider credentials are not configured
    NotConfigured,
    /// The order store cannot be reached
    StoreUnavailable(String),
    /// The provider answered with a non-success status
    Provider { status: u16, details: String },
    /// The provider could not be reached or answered garbage
    Transport(String),
    Internal(String),
}

impl fmt::Display for PaymentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentError::MissingFields(msg) => write!(f, "{}", msg),
            PaymentError::InvalidField(msg) => write!(f, "{}", msg),
            PaymentError::NotConfigured => write!(f, "Payment credentials not configured"),
            PaymentError::StoreUnavailable(msg) => write!(f, "{}", msg),
            PaymentError::Provider { .. } => write!(f, "Payment creation failed"),
            PaymentError::Transport(msg) => write!(f, "{}", msg),
            PaymentError::Internal(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for PaymentError {}

impl PaymentError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PaymentError::MissingFields(_) | PaymentError::InvalidField(_) => StatusCode::BAD_REQUEST,
            PaymentError::Provider { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            PaymentError::NotConfigured
            | PaymentError::StoreUnavailable(_)
            | PaymentError::Transport(_)
            | PaymentError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// JSON body returned to the caller
    pub fn body(&self) -> serde_json::Value {
        match self {
            PaymentError::Provider { details, .. } => json!({
                "error": self.to_string(),
                "details": details,
            }),
            _ => json!({ "error": self.to_string() }),
        }
    }

    /// Classify a store failure: lost connectivity is reported as such
    pub fn from_store(error: anyhow::Error) -> Self {
        let unavailable = error.chain().any(|cause| {
            matches!(
                cause.downcast_ref::<sqlx::Error>(),
                Some(
                    sqlx::Error::PoolTimedOut
                        | sqlx::Error::PoolClosed
                        | sqlx::Error::Io(_)
                        | sqlx::Error::Tls(_)
                )
            )
        });

        if unavailable {
            PaymentError::StoreUnavailable("Database unavailable".to_string())
        } else {
            PaymentError::Internal(format!("{:#}", error))
        }
    }
}

impl IntoResponse for PaymentError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.body())).into_response()
    }
}
