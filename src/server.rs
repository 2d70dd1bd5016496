//! # HTTP Server
//!
//! One axum router hosts every inbound entry point:
//!
//! | Route | Methods |
//! |---|---|
//! | `/telegram/webhook` | POST, OPTIONS |
//! | `/payments/webhook` | POST, OPTIONS |
//! | `/payments/create` | POST, OPTIONS |
//! | `/jobs/cancel-unpaid` | POST, GET, OPTIONS |
//! | `/health/live`, `/health/ready` | GET |
//! | `/metrics` | GET |
//!
//! Each webhook boundary reports failures according to its configured
//! [`ErrorPolicy`].

use anyhow::{Context, Result};
use axum::body::{Body, Bytes};
use axum::extract::{MatchedPath, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, MethodRouter};
use axum::{Json, Router};
use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use teloxide::types::Update;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bot::dispatcher;
use crate::context::AppContext;
use crate::errors::{error_logging, ErrorPolicy};
use crate::lifecycle;
use crate::observability;
use crate::payments::{create, webhook, PaymentError};

/// Everything the routes need
pub struct ServerState {
    pub app: AppContext,
    /// Prometheus renderer; `/metrics` answers 503 without it
    pub metrics: Option<PrometheusHandle>,
    /// Checked for format on readiness probes
    pub bot_token: String,
    /// Bearer token required on `/jobs/*` when set
    pub jobs_auth_token: Option<String>,
    pub bot_error_policy: ErrorPolicy,
    pub payment_error_policy: ErrorPolicy,
}

type SharedState = Arc<ServerState>;

/// Build the router with request metrics on every matched route
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/telegram/webhook", webhook_route(post(telegram_webhook), "POST, OPTIONS"))
        .route("/payments/webhook", webhook_route(post(payment_webhook), "POST, OPTIONS"))
        .route("/payments/create", webhook_route(post(create_payment), "POST, OPTIONS"))
        .route(
            "/jobs/cancel-unpaid",
            webhook_route(
                post(cancel_unpaid).get(cancel_unpaid),
                "GET, POST, OPTIONS",
            ),
        )
        .route("/health/live", get(liveness))
        .route("/health/ready", get(readiness))
        .route("/metrics", get(render_metrics))
        .route_layer(middleware::from_fn(track_requests))
        .with_state(state)
}

/// Add CORS preflight and the JSON 405 to a webhook route
fn webhook_route(
    route: MethodRouter<SharedState>,
    allowed_methods: &'static str,
) -> MethodRouter<SharedState> {
    route
        .options(move || async move { preflight(allowed_methods) })
        .fallback(method_not_allowed)
}

fn preflight(allowed_methods: &'static str) -> Response {
    let mut response = StatusCode::OK.into_response();
    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(allowed_methods),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("86400"));
    response
}

async fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({ "error": "Method not allowed" })),
    )
        .into_response()
}

async fn track_requests(request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_owned())
        .unwrap_or_else(|| request.uri().path().to_owned());
    let method = request.method().to_string();
    let started = Instant::now();

    let response = next.run(request).await;
    observability::record_request_metrics(
        &route,
        &method,
        response.status().as_u16(),
        started.elapsed(),
    );
    response
}

/// Telegram update webhook. Under `AlwaysOk` every outcome is `{"ok": true}`.
async fn telegram_webhook(State(state): State<SharedState>, body: Bytes) -> Response {
    let result = match serde_json::from_slice::<Update>(&body) {
        Ok(update) => dispatcher::dispatch_update(&state.app, &update).await,
        Err(e) => Err(anyhow::anyhow!("Invalid update payload: {}", e)),
    };

    match result {
        Ok(()) => Json(json!({ "ok": true })).into_response(),
        Err(e) => {
            error_logging::log_internal_error(&e, "telegram_webhook", "dispatch_update", None);
            match state.bot_error_policy {
                ErrorPolicy::AlwaysOk => Json(json!({ "ok": true })).into_response(),
                ErrorPolicy::SurfaceErrors => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "ok": false, "error": e.to_string() })),
                )
                    .into_response(),
            }
        }
    }
}

/// Render a payment-side failure under the configured policy
fn payment_failure(policy: ErrorPolicy, operation: &str, error: PaymentError) -> Response {
    let status = error.status_code().as_u16();
    error_logging::log_payment_error(&error, operation, None, Some(status));
    match policy {
        ErrorPolicy::SurfaceErrors => error.into_response(),
        ErrorPolicy::AlwaysOk => {
            Json(json!({ "status": "failed", "error": error.to_string() })).into_response()
        }
    }
}

async fn payment_webhook(State(state): State<SharedState>, body: Bytes) -> Response {
    match webhook::process_webhook(&state.app, &body).await {
        Ok(outcome) => {
            observability::record_payment_webhook(outcome.as_str());
            Json(json!({ "status": outcome.as_str() })).into_response()
        }
        Err(e) => {
            observability::record_payment_webhook("failed");
            payment_failure(state.payment_error_policy, "payment_webhook", e)
        }
    }
}

async fn create_payment(State(state): State<SharedState>, body: Bytes) -> Response {
    match create::create_payment(state.app.payments.as_deref(), &body).await {
        Ok(created) => Json(created).into_response(),
        Err(e) => payment_failure(state.payment_error_policy, "create_payment", e),
    }
}

/// Whether the request carries the configured jobs bearer token
fn jobs_authorized(expected: Option<&str>, headers: &HeaderMap) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|token| token.trim() == expected)
}

/// Cancel every order left unpaid past the timeout
async fn cancel_unpaid(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    if !jobs_authorized(state.jobs_auth_token.as_deref(), &headers) {
        warn!("Rejected unauthenticated jobs request");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Unauthorized" })),
        )
            .into_response();
    }

    let now = Utc::now();
    match lifecycle::cancel_unpaid_orders(&state.app, now).await {
        Ok(cancelled) => {
            let order_ids: Vec<i64> = cancelled.iter().map(|order| order.id).collect();
            Json(json!({
                "status": "success",
                "cancelled_orders": order_ids.len(),
                "order_ids": order_ids,
                "timestamp": now.to_rfc3339(),
            }))
            .into_response()
        }
        Err(e) => {
            error_logging::log_internal_error(&e, "jobs", "cancel_unpaid_orders", None);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn liveness() -> Response {
    Json(json!({ "status": "ok" })).into_response()
}

async fn readiness(State(state): State<SharedState>) -> Response {
    match observability::perform_readiness_checks(&state.app.pool, &state.bot_token).await {
        Ok(()) => Json(json!({ "status": "ready" })).into_response(),
        Err(e) => {
            warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable", "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn render_metrics(State(state): State<SharedState>) -> Response {
    match &state.metrics {
        Some(handle) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
            .body(Body::from(handle.render()))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics disabled").into_response(),
    }
}

/// Serve until `shutdown` is cancelled
pub async fn serve(state: SharedState, port: u16, shutdown: CancellationToken) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind HTTP server to {}", addr))?;

    info!(address = %addr, "HTTP server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("HTTP server failed")?;

    info!("HTTP server stopped");
    Ok(())
}
