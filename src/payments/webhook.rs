//! Provider notification processing
//!
//! Only `payment.succeeded` changes state. Everything else is acknowledged
//! as ignored so the provider stops redelivering it.

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, Instrument};

use super::{PaymentError, PaymentTarget};
use crate::context::AppContext;
use crate::lifecycle;
use crate::observability;

pub const SUCCEEDED_EVENT: &str = "payment.succeeded";

#[derive(Debug, Default, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub object: Option<PaymentObject>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PaymentObject {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Metadata {
    /// Providers echo metadata back as strings, but numbers are tolerated
    #[serde(default)]
    pub order_id: Option<Value>,
}

/// What a notification asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookAction {
    Ignore,
    MarkPaid {
        target: PaymentTarget,
        payment_id: String,
        payment_status: String,
    },
}

/// Result reported back to the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Processed,
    Ignored,
}

impl WebhookOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookOutcome::Processed => "processed",
            WebhookOutcome::Ignored => "ignored",
        }
    }
}

fn non_empty(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse a request body; an empty body reads as an empty envelope
pub fn parse_envelope(body: &[u8]) -> Result<WebhookEnvelope, PaymentError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(WebhookEnvelope::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| PaymentError::InvalidField(format!("Invalid JSON body: {}", e)))
}

/// Decide what an envelope asks for without touching storage
pub fn classify(envelope: &WebhookEnvelope) -> Result<WebhookAction, PaymentError> {
    if envelope.event.as_deref() != Some(SUCCEEDED_EVENT) {
        return Ok(WebhookAction::Ignore);
    }

    let object = envelope.object.as_ref();
    let payment_id = object.and_then(|o| o.id.as_deref()).filter(|id| !id.trim().is_empty());
    let order_ref = non_empty(
        object
            .and_then(|o| o.metadata.as_ref())
            .and_then(|m| m.order_id.as_ref()),
    );

    let (Some(payment_id), Some(order_ref)) = (payment_id, order_ref) else {
        return Err(PaymentError::MissingFields("Missing order_id or payment_id"));
    };

    Ok(WebhookAction::MarkPaid {
        target: PaymentTarget::parse(&order_ref)?,
        payment_id: payment_id.to_string(),
        payment_status: object
            .and_then(|o| o.status.clone())
            .unwrap_or_else(|| "succeeded".to_string()),
    })
}

/// Apply a provider notification
pub async fn process_webhook(ctx: &AppContext, body: &[u8]) -> Result<WebhookOutcome, PaymentError> {
    let envelope = parse_envelope(body)?;
    let action = classify(&envelope)?;

    let WebhookAction::MarkPaid {
        target,
        payment_id,
        payment_status,
    } = action
    else {
        info!(event = ?envelope.event, "Ignoring payment event");
        return Ok(WebhookOutcome::Ignored);
    };

    let order_ref = target.to_string();
    let span = observability::payment_span("webhook", Some(&order_ref));
    async {
        match target {
            PaymentTarget::Order(order_id) => {
                lifecycle::mark_order_paid(ctx, order_id, &payment_id, &payment_status)
                    .await
                    .map_err(PaymentError::from_store)?;
            }
            PaymentTarget::Subscription(subscription_id) => {
                lifecycle::mark_subscription_paid(ctx, subscription_id, &payment_id, &payment_status)
                    .await
                    .map_err(PaymentError::from_store)?;
            }
        }
        Ok(WebhookOutcome::Processed)
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(raw: &str) -> WebhookEnvelope {
        parse_envelope(raw.as_bytes()).unwrap()
    }

    #[test]
    fn test_other_events_are_ignored() {
        let action = classify(&envelope(r#"{"event":"payment.canceled","object":{}}"#)).unwrap();
        assert_eq!(action, WebhookAction::Ignore);
        assert_eq!(classify(&envelope("")).unwrap(), WebhookAction::Ignore);
        assert_eq!(classify(&envelope("{}")).unwrap(), WebhookAction::Ignore);
    }

    #[test]
    fn test_succeeded_order_payment() {
        let raw = r#"{"event":"payment.succeeded","object":{"id":"p-1","status":"succeeded","metadata":{"order_id":"7"}}}"#;
        assert_eq!(
            classify(&envelope(raw)).unwrap(),
            WebhookAction::MarkPaid {
                target: PaymentTarget::Order(7),
                payment_id: "p-1".to_string(),
                payment_status: "succeeded".to_string(),
            }
        );
    }

    #[test]
    fn test_subscription_prefix_routes_to_subscription() {
        let raw = r#"{"event":"payment.succeeded","object":{"id":"p-2","status":"succeeded","metadata":{"order_id":"sub_3"}}}"#;
        assert!(matches!(
            classify(&envelope(raw)).unwrap(),
            WebhookAction::MarkPaid {
                target: PaymentTarget::Subscription(3),
                ..
            }
        ));
    }

    #[test]
    fn test_numeric_order_id_is_accepted() {
        let raw = r#"{"event":"payment.succeeded","object":{"id":"p-3","metadata":{"order_id":12}}}"#;
        assert!(matches!(
            classify(&envelope(raw)).unwrap(),
            WebhookAction::MarkPaid {
                target: PaymentTarget::Order(12),
                ..
            }
        ));
    }

    #[test]
    fn test_missing_ids_are_rejected() {
        let no_order = r#"{"event":"payment.succeeded","object":{"id":"p-1","metadata":{}}}"#;
        let no_payment = r#"{"event":"payment.succeeded","object":{"metadata":{"order_id":"7"}}}"#;
        for raw in [no_order, no_payment] {
            assert_eq!(
                classify(&envelope(raw)),
                Err(PaymentError::MissingFields("Missing order_id or payment_id"))
            );
        }
    }

    #[test]
    fn test_non_numeric_order_id_is_invalid() {
        let raw = r#"{"event":"payment.succeeded","object":{"id":"p-1","metadata":{"order_id":"seven"}}}"#;
        assert!(matches!(
            classify(&envelope(raw)),
            Err(PaymentError::InvalidField(_))
        ));
    }

    #[test]
    fn test_malformed_json_is_invalid() {
        assert!(matches!(
            parse_envelope(b"{not json"),
            Err(PaymentError::InvalidField(_))
        ));
    }
}
