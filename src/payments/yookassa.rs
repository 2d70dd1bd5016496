//! YooKassa payment API client

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{info, Instrument};

use super::{CreatedPayment, PaymentError, PaymentProvider, PaymentRequest};
use crate::config::PaymentConfig;
use crate::errors::error_logging;
use crate::observability;

pub struct YooKassaClient {
    http: reqwest::Client,
    api_url: String,
    shop_id: String,
    secret_key: String,
    return_url: String,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct PaymentResponse {
    id: String,
    status: String,
    confirmation: Option<Confirmation>,
}

#[derive(Debug, Deserialize)]
struct Confirmation {
    confirmation_url: Option<String>,
}

impl YooKassaClient {
    /// Build a client from configuration; `None` when credentials are missing
    pub fn from_config(config: &PaymentConfig) -> anyhow::Result<Option<Self>> {
        let (Some(shop_id), Some(secret_key)) = (&config.shop_id, &config.secret_key) else {
            return Ok(None);
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create payment HTTP client: {}", e))?;

        Ok(Some(Self {
            http,
            api_url: config.api_url.clone(),
            shop_id: shop_id.clone(),
            secret_key: secret_key.clone(),
            return_url: config.return_url.clone(),
            currency: config.currency.clone(),
        }))
    }

    /// JSON body sent to the payments endpoint
    fn request_body(&self, request: &PaymentRequest) -> serde_json::Value {
        json!({
            "amount": {
                "value": request.amount,
                "currency": self.currency,
            },
            "capture": true,
            "confirmation": {
                "type": "redirect",
                "return_url": self.return_url,
            },
            "description": request.description,
            "metadata": {
                "order_id": request.order_ref,
            },
        })
    }
}

#[async_trait]
impl PaymentProvider for YooKassaClient {
    async fn create_payment(&self, request: &PaymentRequest) -> Result<CreatedPayment, PaymentError> {
        let span = observability::payment_span("create_payment", Some(&request.order_ref));

        async {
            let response = self
                .http
                .post(&self.api_url)
                .basic_auth(&self.shop_id, Some(&self.secret_key))
                .header("Idempotence-Key", &request.idempotency_key)
                .json(&self.request_body(request))
                .send()
                .await
                .map_err(|e| {
                    error_logging::log_network_error(&e, "create_payment", None, Some(&self.api_url));
                    PaymentError::Transport(format!("Payment provider unreachable: {}", e))
                })?;

            let status = response.status();
            if !status.is_success() {
                let details = response.text().await.unwrap_or_default();
                let error = PaymentError::Provider {
                    status: status.as_u16(),
                    details,
                };
                error_logging::log_payment_error(
                    &error,
                    "create_payment",
                    Some(&request.order_ref),
                    Some(status.as_u16()),
                );
                return Err(error);
            }

            let body: PaymentResponse = response.json().await.map_err(|e| {
                PaymentError::Transport(format!("Invalid payment provider response: {}", e))
            })?;

            let payment_url = body
                .confirmation
                .and_then(|c| c.confirmation_url)
                .ok_or_else(|| {
                    PaymentError::Transport("Payment provider returned no confirmation URL".to_string())
                })?;

            info!(payment_id = %body.id, status = %body.status, "Payment created");
            Ok(CreatedPayment {
                payment_id: body.id,
                payment_url,
                status: body.status,
            })
        }
        .instrument(span)
        .await
    }
}
