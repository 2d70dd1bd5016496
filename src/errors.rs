//! # Application Error Types
//!
//! Store and handler functions return `anyhow::Result`. The types here cover
//! configuration, webhook error policies and structured error logging.

use std::fmt;

/// Errors raised while starting up or validating input outside a request
#[derive(Debug, Clone, PartialEq)]
pub enum AppError {
    /// Missing or malformed configuration
    Config(String),
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(msg) => write!(f, "[CONFIG] {}", msg),
            AppError::Internal(msg) => write!(f, "[INTERNAL] {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(format!("{:#}", err))
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// How a webhook boundary reports failures to its caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Log the failure and answer 200, so the sender never retries
    AlwaysOk,
    /// Answer with the failure's status code and message
    SurfaceErrors,
}

impl std::str::FromStr for ErrorPolicy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "always_ok" => Ok(ErrorPolicy::AlwaysOk),
            "surface_errors" => Ok(ErrorPolicy::SurfaceErrors),
            other => Err(AppError::Config(format!(
                "Unknown error policy '{}'. Expected 'always_ok' or 'surface_errors'",
                other
            ))),
        }
    }
}

/// Structured error logging shared by handlers, the gateway and the HTTP routes
pub mod error_logging {
    use tracing::error;

    /// Log order lifecycle failures with the order and actor involved
    pub fn log_order_error(
        error: &impl std::fmt::Display,
        operation: &str,
        order_id: i64,
        actor_id: Option<i64>,
    ) {
        error!(
            error = %error,
            operation = %operation,
            order_id = %order_id,
            actor_id = ?actor_id,
            "Order transition failed"
        );
    }

    /// Log network/communication errors with connection context
    pub fn log_network_error(
        error: &impl std::fmt::Display,
        operation: &str,
        chat_id: Option<i64>,
        endpoint: Option<&str>,
    ) {
        error!(
            error = %error,
            operation = %operation,
            chat_id = ?chat_id,
            endpoint = ?endpoint,
            "Network operation failed"
        );
    }

    /// Log payment provider or webhook failures
    pub fn log_payment_error(
        error: &impl std::fmt::Display,
        operation: &str,
        order_ref: Option<&str>,
        status_code: Option<u16>,
    ) {
        error!(
            error = %error,
            operation = %operation,
            order_ref = ?order_ref,
            status_code = ?status_code,
            "Payment operation failed"
        );
    }

    /// Log internal application errors with component context
    pub fn log_internal_error(
        error: &impl std::fmt::Display,
        component: &str,
        operation: &str,
        user_id: Option<i64>,
    ) {
        error!(
            error = %error,
            component = %component,
            operation = %operation,
            user_id = ?user_id,
            "Internal application error"
        );
    }
}
