//! Payment creation requested over HTTP

use serde::Deserialize;
use serde_json::Value;
use tracing::Instrument;

use super::{
    new_request_id, CreatedPayment, PaymentError, PaymentProvider, PaymentRequest,
    DEFAULT_DESCRIPTION,
};
use crate::observability;

#[derive(Debug, Default, Deserialize)]
pub struct CreatePaymentBody {
    #[serde(default)]
    pub amount: Option<Value>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub order_id: Option<Value>,
}

const MISSING_FIELDS: &str = "Missing required fields: amount, order_id";

fn parse_amount(value: &Value) -> Result<f64, PaymentError> {
    let amount = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    match amount {
        Some(amount) if amount.is_finite() && amount > 0.0 => Ok(amount),
        _ => Err(PaymentError::InvalidField(
            "amount must be a positive number".to_string(),
        )),
    }
}

fn parse_order_ref(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Validate a request body into a provider request keyed by this request
pub fn build_request(body: &[u8], request_id: &str) -> Result<PaymentRequest, PaymentError> {
    let body: CreatePaymentBody = if body.iter().all(u8::is_ascii_whitespace) {
        CreatePaymentBody::default()
    } else {
        serde_json::from_slice(body)
            .map_err(|e| PaymentError::InvalidField(format!("Invalid JSON body: {}", e)))?
    };

    let order_ref = body.order_id.as_ref().and_then(parse_order_ref);
    let (Some(amount), Some(order_ref)) = (body.amount.as_ref(), order_ref) else {
        return Err(PaymentError::MissingFields(MISSING_FIELDS));
    };
    let amount = parse_amount(amount)?;

    let description = body
        .description
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string());

    Ok(PaymentRequest::new(order_ref, amount, description, request_id))
}

/// Create a payment for an HTTP request body
pub async fn create_payment(
    provider: Option<&dyn PaymentProvider>,
    body: &[u8],
) -> Result<CreatedPayment, PaymentError> {
    let request = build_request(body, &new_request_id())?;
    let provider = provider.ok_or(PaymentError::NotConfigured)?;

    let span = observability::payment_span("create", Some(&request.order_ref));
    provider.create_payment(&request).instrument(span).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request_from_body() {
        let request = build_request(br#"{"amount": 500, "order_id": 42}"#, "r1").unwrap();
        assert_eq!(request.amount, "500.00");
        assert_eq!(request.order_ref, "42");
        assert_eq!(request.description, DEFAULT_DESCRIPTION);
        assert_eq!(request.idempotency_key, "order_42_r1");
    }

    #[test]
    fn test_string_amount_and_custom_description() {
        let request = build_request(
            br#"{"amount": "1800.5", "order_id": "sub_3", "description": "Subscription"}"#,
            "r2",
        )
        .unwrap();
        assert_eq!(request.amount, "1800.50");
        assert_eq!(request.order_ref, "sub_3");
        assert_eq!(request.description, "Subscription");
    }

    #[test]
    fn test_missing_fields() {
        let bodies: [&[u8]; 3] = [b"", br#"{"amount": 100}"#, br#"{"order_id": "1"}"#];
        for body in bodies {
            assert_eq!(
                build_request(body, "r"),
                Err(PaymentError::MissingFields(MISSING_FIELDS))
            );
        }
    }

    #[test]
    fn test_invalid_amount() {
        assert!(matches!(
            build_request(br#"{"amount": -1, "order_id": 1}"#, "r"),
            Err(PaymentError::InvalidField(_))
        ));
        assert!(matches!(
            build_request(br#"{"amount": "lots", "order_id": 1}"#, "r"),
            Err(PaymentError::InvalidField(_))
        ));
    }

    #[tokio::test]
    async fn test_unconfigured_provider() {
        let result = create_payment(None, br#"{"amount": 100, "order_id": 1}"#).await;
        assert_eq!(result, Err(PaymentError::NotConfigured));
    }
}
