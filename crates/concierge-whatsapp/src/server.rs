// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook HTTP server built on axum.
//!
//! Routes:
//! - `GET /webhooks/whatsapp`: subscription handshake
//! - `POST /webhooks/whatsapp`: message delivery, forwarded to the agent loop
//! - `GET /health`
//! - `GET /metrics` when a Prometheus render function is supplied

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use concierge_config::model::ServerConfig;
use concierge_core::types::InboundUnit;
use concierge_core::ConciergeError;

use crate::webhook::{parse_webhook, verify_handshake, verify_signature};

/// Shared state for webhook handlers.
#[derive(Clone)]
pub struct WebhookState {
    /// Channel for handing inbound units to the agent loop.
    pub inbound_tx: mpsc::Sender<InboundUnit>,
    pub verify_token: Option<String>,
    /// Enables `X-Hub-Signature-256` verification when set.
    pub app_secret: Option<String>,
    /// Optional Prometheus metrics render function.
    pub metrics_render: Option<Arc<dyn Fn() -> String + Send + Sync>>,
}

impl WebhookState {
    pub fn new(inbound_tx: mpsc::Sender<InboundUnit>) -> Self {
        Self {
            inbound_tx,
            verify_token: None,
            app_secret: None,
            metrics_render: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

/// Build the webhook router.
pub fn router(state: WebhookState) -> Router {
    let mut app = Router::new()
        .route(
            "/webhooks/whatsapp",
            get(verify_webhook).post(receive_webhook),
        )
        .route("/health", get(health));

    if state.metrics_render.is_some() {
        app = app.route("/metrics", get(metrics));
    }

    app.with_state(state).layer(TraceLayer::new_for_http())
}

/// Bind `config.host:config.port` and serve `app` until `cancel` fires.
///
/// `app` is usually [`router`], optionally merged with other channels'
/// endpoints.
pub async fn serve(
    config: &ServerConfig,
    app: Router,
    cancel: CancellationToken,
) -> Result<(), ConciergeError> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ConciergeError::Channel {
            message: format!("failed to bind webhook server to {addr}: {e}"),
            source: Some(Box::new(e)),
        })?;

    info!("webhook server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| ConciergeError::Channel {
            message: format!("webhook server error: {e}"),
            source: Some(Box::new(e)),
        })?;

    info!("webhook server stopped");
    Ok(())
}

async fn verify_webhook(
    State(state): State<WebhookState>,
    Query(query): Query<VerifyQuery>,
) -> Response {
    match verify_handshake(
        query.mode.as_deref(),
        query.verify_token.as_deref(),
        query.challenge.as_deref(),
        state.verify_token.as_deref(),
    ) {
        Some(challenge) => {
            info!("webhook verified");
            (StatusCode::OK, challenge).into_response()
        }
        None => {
            warn!(mode = ?query.mode, "webhook verification failed");
            (
                StatusCode::FORBIDDEN,
                Json(json!({"error": "verification failed"})),
            )
                .into_response()
        }
    }
}

async fn receive_webhook(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(secret) = state.app_secret.as_deref() {
        let signature = headers
            .get("x-hub-signature-256")
            .and_then(|v| v.to_str().ok());
        if !verify_signature(&body, signature, secret) {
            warn!("webhook signature verification failed");
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "invalid signature"})),
            )
                .into_response();
        }
    }

    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "webhook body is not JSON");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "invalid JSON"})),
            )
                .into_response();
        }
    };

    let units = parse_webhook(&payload);
    let received = units.len();
    if received > 0 {
        // Queue the whole batch or none of it.
        let permits = match state.inbound_tx.try_reserve_many(received) {
            Ok(permits) => permits,
            Err(mpsc::error::TrySendError::Full(())) => {
                warn!(received, "inbound queue full, asking for redelivery");
                return unavailable("inbound queue full");
            }
            Err(mpsc::error::TrySendError::Closed(())) => {
                warn!("agent loop not accepting messages");
                return unavailable("agent loop not accepting messages");
            }
        };
        for (permit, unit) in permits.zip(units) {
            debug!(user_id = %unit.user_id, kind = unit.kind.label(), "webhook message received");
            permit.send(unit);
        }
    }

    (StatusCode::OK, Json(json!({"status": "ok", "received": received}))).into_response()
}

fn unavailable(reason: &str) -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({"error": reason})),
    )
        .into_response()
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "healthy"})))
}

async fn metrics(State(state): State<WebhookState>) -> Response {
    match &state.metrics_render {
        Some(render) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
