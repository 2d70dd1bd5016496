//! Observability module for centralized metrics, tracing, and logging setup.
//!
//! This module provides:
//! - Structured logging with configurable levels and formats
//! - Metrics collection with a Prometheus handle rendered by the HTTP server
//! - Optional distributed tracing export over OTLP
//! - Readiness checks used by `/health/ready`

use std::time::Duration;

use anyhow::Result;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use opentelemetry::global;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::Sampler;
use sqlx::PgPool;
use tracing_subscriber::prelude::*;

use crate::observability_config::{LogFormat, ObservabilityConfig};

/// Initialize logging, metrics and trace export; returns the handle `/metrics` renders
pub fn init_observability(config: &ObservabilityConfig) -> Result<PrometheusHandle> {
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid observability configuration: {}", e))?;

    init_logging(config)?;
    let metrics_handle = init_metrics()?;
    init_trace_export(config)?;

    tracing::info!(
        environment = %config.environment,
        otlp_endpoint = ?config.otlp_endpoint,
        "Observability initialized"
    );
    Ok(metrics_handle)
}

fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("garbage_courier={}", config.log_level).parse()?)
        .add_directive("sqlx=warn".parse()?)
        .add_directive("teloxide=warn".parse()?);

    match config.effective_log_format() {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty().with_target(true))
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true),
            )
            .init(),
    }

    tracing::info!(log_level = %config.log_level, "Logging initialized");
    Ok(())
}

/// Install the global Prometheus recorder
fn init_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    tracing::info!("Metrics collection initialized");
    Ok(handle)
}

/// Export spans over OTLP when a collector is configured
fn init_trace_export(config: &ObservabilityConfig) -> Result<()> {
    let Some(endpoint) = &config.otlp_endpoint else {
        tracing::info!("Trace export disabled, no OTLP endpoint configured");
        return Ok(());
    };

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint.clone())
        .build()?;

    let mut builder = opentelemetry_sdk::trace::SdkTracerProvider::builder().with_batch_exporter(exporter);
    if let Some(ratio) = config.trace_sampling_ratio {
        builder = builder.with_sampler(Sampler::TraceIdRatioBased(ratio));
    }
    global::set_tracer_provider(builder.build());

    tracing::info!(
        otlp_endpoint = %endpoint,
        sampling_ratio = ?config.trace_sampling_ratio,
        "Trace export initialized"
    );
    Ok(())
}

/// Create a span for Telegram update handling
pub fn telegram_span(operation: &str, user_id: Option<i64>) -> tracing::Span {
    tracing::info_span!(
        "telegram_operation",
        operation = operation,
        user_id = user_id,
        component = "telegram"
    )
}

/// Create a span for an order store operation
pub fn db_span(operation: &str) -> tracing::Span {
    tracing::debug_span!("db_operation", operation = operation, component = "database")
}

/// Create a span for payment provider calls and webhooks
pub fn payment_span(operation: &str, order_ref: Option<&str>) -> tracing::Span {
    tracing::info_span!(
        "payment_operation",
        operation = operation,
        order_ref = order_ref,
        component = "payments"
    )
}

/// Record HTTP request metrics
pub fn record_request_metrics(route: &str, method: &str, status: u16, duration: Duration) {
    let route = route.to_string();
    let method = method.to_string();
    let status = status.to_string();
    metrics::counter!("requests_total", "route" => route.clone(), "method" => method, "status" => status)
        .increment(1);
    metrics::histogram!("request_duration_seconds", "route" => route).record(duration.as_secs_f64());
}

/// Record an inbound Telegram update by kind (message, callback, ignored)
pub fn record_telegram_update(kind: &str) {
    let kind = kind.to_string();
    metrics::counter!("telegram_updates_total", "kind" => kind).increment(1);
}

/// Record an order lifecycle transition and whether its guard matched
pub fn record_order_transition(transition: &str, applied: bool) {
    let transition = transition.to_string();
    let result = if applied { "applied" } else { "rejected" };
    metrics::counter!("order_transitions_total", "transition" => transition, "result" => result)
        .increment(1);
}

/// Record a suppressed Telegram API failure
pub fn record_gateway_failure(method: &'static str) {
    metrics::counter!("gateway_failures_total", "method" => method).increment(1);
}

/// Record a payment webhook outcome (processed, ignored, invalid, failed)
pub fn record_payment_webhook(outcome: &'static str) {
    metrics::counter!("payment_webhooks_total", "outcome" => outcome).increment(1);
}

pub fn record_unpaid_cancelled(count: usize) {
    metrics::counter!("unpaid_orders_cancelled_total").increment(count as u64);
}

/// Perform readiness checks against the database and bot token
pub async fn perform_readiness_checks(pool: &PgPool, bot_token: &str) -> Result<()> {
    check_database_health(pool).await?;
    check_bot_token_health(bot_token)?;
    Ok(())
}

/// Check database connectivity and basic query capability
pub async fn check_database_health(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .map_err(|e| anyhow::anyhow!("Database health check failed: {}", e))?;

    tracing::debug!("Database health check passed");
    Ok(())
}

/// Check the bot token format without calling Telegram
pub fn check_bot_token_health(token: &str) -> Result<()> {
    crate::config::validate_bot_token(token)
        .map_err(|e| anyhow::anyhow!("Bot token health check failed: {}", e))?;

    tracing::debug!("Bot token health check passed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bot_token_health() {
        assert!(check_bot_token_health("").is_err());
        assert!(check_bot_token_health("no-colon").is_err());
        assert!(check_bot_token_health("123456789:AAFakeTokenForTestingPurposes1234567890").is_ok());
    }

    #[test]
    fn test_metric_helpers_without_recorder() {
        // Without an installed recorder these are no-ops and must not panic
        record_request_metrics("/telegram/webhook", "POST", 200, Duration::from_millis(5));
        record_order_transition("accept", false);
        record_gateway_failure("sendMessage");
        record_unpaid_cancelled(3);
    }
}
