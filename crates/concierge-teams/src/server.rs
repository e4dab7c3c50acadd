// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bot Framework messaging endpoint.
//!
//! Routes:
//! - `POST /api/messages`: activities from Teams, forwarded to the agent loop
//!
//! The router is merged into the webhook server, which already serves
//! `/health`.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use concierge_core::types::InboundUnit;

use crate::TeamsChannel;
use crate::activity::{TeamsEvent, parse_activity};

/// Shared state for the messaging endpoint.
#[derive(Clone)]
pub struct TeamsState {
    /// Channel for handing inbound units to the agent loop.
    pub inbound_tx: mpsc::Sender<InboundUnit>,
    pub channel: Arc<TeamsChannel>,
}

impl TeamsState {
    pub fn new(inbound_tx: mpsc::Sender<InboundUnit>, channel: Arc<TeamsChannel>) -> Self {
        Self {
            inbound_tx,
            channel,
        }
    }
}

/// Build the messaging endpoint router.
pub fn router(state: TeamsState) -> Router {
    Router::new()
        .route("/api/messages", post(receive_activity))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Audience claim of a bearer JWT.
///
/// Only the claim is read; the token signature is not checked here.
fn bearer_audience(headers: &HeaderMap) -> Option<String> {
    let token = headers
        .get("authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")?;
    let payload = token.split('.').nth(1)?;
    let claims: Value = serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).ok()?).ok()?;
    claims.get("aud")?.as_str().map(str::to_string)
}

async fn receive_activity(
    State(state): State<TeamsState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if bearer_audience(&headers).as_deref() != Some(state.channel.app_id()) {
        warn!("teams activity rejected: missing or foreign bearer token");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "unauthorized"})),
        )
            .into_response();
    }

    let activity: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "teams activity is not JSON");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "invalid JSON"})),
            )
                .into_response();
        }
    };

    match parse_activity(&activity) {
        TeamsEvent::Message { unit, reference } => {
            state.channel.remember(&unit.user_id, reference);
            debug!(user_id = %unit.user_id, kind = unit.kind.label(), "teams message received");
            match state.inbound_tx.try_send(unit) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("inbound queue full, asking for redelivery");
                    return unavailable("inbound queue full");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    warn!("agent loop not accepting messages");
                    return unavailable("agent loop not accepting messages");
                }
            }
        }
        TeamsEvent::MembersAdded { reference, members } => {
            if let Some(welcome) = state.channel.welcome_message() {
                info!(members = members.len(), "teams members added, sending welcome");
                let channel = Arc::clone(&state.channel);
                let welcome = welcome.to_string();
                tokio::spawn(async move {
                    if let Err(e) = channel.send_to(&reference, &welcome).await {
                        warn!(error = %e, "teams welcome message failed");
                    }
                });
            }
        }
        TeamsEvent::Ignored => {}
    }

    (StatusCode::OK, Json(json!({"status": "ok"}))).into_response()
}

fn unavailable(reason: &str) -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({"error": reason})),
    )
        .into_response()
}
