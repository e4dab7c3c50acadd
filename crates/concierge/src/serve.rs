// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `concierge serve` command implementation.
//!
//! Opens storage, builds the channel and AI collaborators, starts the
//! webhook server (WhatsApp, plus Teams when configured), and runs the
//! agent loop until SIGINT/SIGTERM. The metrics rollup runs alongside on
//! its own interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use concierge_agent::shutdown;
use concierge_agent::{
    AgentLoop, BusinessClock, ChannelMux, Collaborators, LaneDispatcher, MessageRouter,
    MetricsRollup,
};
use concierge_config::ConciergeConfig;
use concierge_core::types::HealthStatus;
use concierge_core::{ConciergeError, PluginAdapter, StorageAdapter};
use concierge_openai::{OpenAiResponder, OpenAiSpeech, OpenAiVision};
use concierge_storage::SqliteStorage;
use concierge_teams::{TeamsChannel, TeamsState};
use concierge_whatsapp::{WebhookState, WhatsappChannel};

/// Capacity of the webhook-to-agent queue.
const INBOUND_QUEUE: usize = 256;

/// Runs the `concierge serve` command.
pub async fn run_serve(config: ConciergeConfig) -> Result<(), ConciergeError> {
    info!(name = %config.agent.name, "starting concierge serve");

    let storage = {
        let storage = SqliteStorage::new(config.storage.clone());
        storage.initialize().await?;
        Arc::new(storage)
    };

    let metrics_render = init_metrics(&config);

    let whatsapp = Arc::new(WhatsappChannel::new(config.whatsapp.clone()));
    let teams = config
        .teams
        .clone()
        .map(|teams| Arc::new(TeamsChannel::new(teams)));
    let mut mux = ChannelMux::new().with(whatsapp);
    if let Some(teams) = &teams {
        mux.register(teams.clone());
    }
    let channels = Arc::new(mux);

    let responder = Arc::new(OpenAiResponder::new(
        config.responder.clone(),
        config.search.clone(),
        &config.routing.escalation_indicators,
    )?);
    let speech = Arc::new(OpenAiSpeech::new(&config.responder)?);
    let vision = Arc::new(OpenAiVision::new(&config.responder)?);

    let adapters: [&dyn PluginAdapter; 5] = [
        storage.as_ref(),
        channels.as_ref(),
        responder.as_ref(),
        speech.as_ref(),
        vision.as_ref(),
    ];
    for adapter in adapters {
        log_health(adapter).await;
    }

    let router = Arc::new(MessageRouter::new(
        &config,
        Collaborators {
            storage: storage.clone(),
            channels: channels.clone(),
            responder,
            speech,
            vision,
        },
    ));
    router.activity().system_started(&config.agent.name).await;

    let cancel = shutdown::install_signal_handler();

    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE);
    let mut state = WebhookState::new(inbound_tx.clone());
    state.verify_token = config.whatsapp.verify_token.clone();
    state.app_secret = config.whatsapp.app_secret.clone();
    state.metrics_render = metrics_render;
    if state.app_secret.is_none() {
        warn!("whatsapp.app_secret not set, webhook signatures are not verified");
    }
    let mut app = concierge_whatsapp::router(state);
    if let Some(teams) = teams {
        info!("teams endpoint enabled at /api/messages");
        app = app.merge(concierge_teams::router(TeamsState::new(inbound_tx, teams)));
    }

    let server_config = config.server.clone();
    let server_cancel = cancel.clone();
    let server = tokio::spawn(async move {
        let result = concierge_whatsapp::serve(&server_config, app, server_cancel.clone()).await;
        if let Err(e) = &result {
            error!(error = %e, "webhook server failed");
            server_cancel.cancel();
        }
        result
    });

    let rollup = Arc::new(MetricsRollup::new(
        storage.clone(),
        BusinessClock::new(config.routing.utc_offset_minutes),
        config.metrics.retention_days,
    ))
    .spawn(
        Duration::from_secs(config.metrics.rollup_interval_secs),
        cancel.clone(),
    );

    let dispatcher = LaneDispatcher::new(router, Duration::from_secs(config.lanes.idle_secs));
    AgentLoop::new(inbound_rx, dispatcher, &config.lanes)
        .run(cancel.clone())
        .await?;

    cancel.cancel();
    let server_result = match server.await {
        Ok(result) => result,
        Err(e) => Err(ConciergeError::Internal(format!("webhook server task panicked: {e}"))),
    };
    if let Err(e) = rollup.await {
        warn!(error = %e, "rollup task ended abnormally");
    }

    if let Err(e) = channels.shutdown().await {
        warn!(error = %e, "channel shutdown failed");
    }
    storage.close().await?;

    info!("concierge stopped");
    server_result
}

async fn log_health(adapter: &dyn PluginAdapter) {
    match adapter.health_check().await {
        Ok(HealthStatus::Healthy) => info!(adapter = adapter.name(), "adapter healthy"),
        Ok(HealthStatus::Degraded(reason)) => {
            warn!(adapter = adapter.name(), reason = %reason, "adapter degraded")
        }
        Ok(HealthStatus::Unhealthy(reason)) => {
            warn!(adapter = adapter.name(), reason = %reason, "adapter unhealthy")
        }
        Err(e) => warn!(adapter = adapter.name(), error = %e, "adapter health check failed"),
    }
}

#[cfg(feature = "prometheus")]
fn init_metrics(config: &ConciergeConfig) -> Option<Arc<dyn Fn() -> String + Send + Sync>> {
    if !config.server.metrics_enabled {
        return None;
    }
    match concierge_prometheus::PrometheusAdapter::new() {
        Ok(adapter) => {
            info!("prometheus metrics enabled at /metrics");
            let render: Arc<dyn Fn() -> String + Send + Sync> =
                Arc::new(move || adapter.render());
            Some(render)
        }
        Err(e) => {
            warn!(error = %e, "prometheus initialization failed, continuing without metrics");
            None
        }
    }
}

#[cfg(not(feature = "prometheus"))]
fn init_metrics(config: &ConciergeConfig) -> Option<Arc<dyn Fn() -> String + Send + Sync>> {
    if config.server.metrics_enabled {
        warn!("server.metrics_enabled is set but the prometheus feature is not compiled in");
    }
    None
}
