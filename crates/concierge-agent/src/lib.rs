// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message routing and escalation handling for the Concierge gateway.
//!
//! The [`AgentLoop`] is the central coordinator that:
//! - Receives inbound units pushed by channel webhooks
//! - Queues them on per-user lanes so each user is served in order
//! - Routes each unit through the escalation hold, FAQ, handoff, and AI stages
//! - Drains in-flight work on shutdown

pub mod activity;
pub mod channel_mux;
pub mod clock;
pub mod conversation;
mod deadline;
pub mod dispatch;
pub mod escalation;
mod metrics;
pub mod preprocess;
pub mod rollup;
pub mod router;
pub mod shutdown;

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use concierge_config::model::LanesConfig;
use concierge_core::types::InboundUnit;
use concierge_core::ConciergeError;

pub use activity::ActivityRecorder;
pub use channel_mux::ChannelMux;
pub use clock::BusinessClock;
pub use conversation::ConversationLog;
pub use dispatch::LaneDispatcher;
pub use escalation::EscalationStore;
pub use preprocess::{NormalizedInput, Preprocessed, Preprocessor};
pub use rollup::{Direction, MetricsRollup, RollupReport, Trend};
pub use router::{Collaborators, MessageRouter, RouteOutcome};

/// Receives inbound units and hands them to the lane dispatcher until cancelled.
pub struct AgentLoop {
    inbound: mpsc::Receiver<InboundUnit>,
    dispatcher: LaneDispatcher,
    reap_every: Duration,
    drain: Duration,
}

impl AgentLoop {
    pub fn new(
        inbound: mpsc::Receiver<InboundUnit>,
        dispatcher: LaneDispatcher,
        lanes: &LanesConfig,
    ) -> Self {
        Self {
            inbound,
            dispatcher,
            reap_every: Duration::from_secs((lanes.idle_secs / 2).max(1)),
            drain: Duration::from_secs(lanes.drain_secs),
        }
    }

    /// Runs until `cancel` fires or every inbound sender is dropped.
    ///
    /// Units already queued on the inbound channel at cancellation are still
    /// dispatched, then lanes are drained.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), ConciergeError> {
        info!("agent loop started");
        let mut reap = tokio::time::interval(self.reap_every);
        reap.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("shutdown signal received, stopping agent loop");
                    break;
                }
                unit = self.inbound.recv() => match unit {
                    Some(unit) => self.dispatcher.dispatch(unit),
                    None => {
                        info!("inbound channel closed, stopping agent loop");
                        break;
                    }
                },
                _ = reap.tick() => {
                    self.dispatcher.reap_idle();
                }
            }
        }

        self.inbound.close();
        let mut late = 0usize;
        while let Ok(unit) = self.inbound.try_recv() {
            self.dispatcher.dispatch(unit);
            late += 1;
        }
        if late > 0 {
            debug!(late, "dispatched units queued before shutdown");
        }

        self.dispatcher.shutdown(self.drain).await;
        info!("agent loop stopped");
        Ok(())
    }
}

/// Log-safe form of a user id: the first six characters then `***`.
pub fn mask_user(user_id: &str) -> String {
    let visible: String = user_id.chars().take(6).collect();
    format!("{visible}***")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use concierge_config::model::{ConciergeConfig, StorageConfig};
    use concierge_core::traits::StorageAdapter;
    use concierge_core::types::ChannelKind;
    use concierge_storage::SqliteStorage;
    use concierge_test_utils::{MockChannel, MockResponder, MockSpeech, MockVision};

    #[test]
    fn mask_user_keeps_prefix() {
        assert_eq!(mask_user("50688887777"), "506888***");
        assert_eq!(mask_user("abc"), "abc***");
    }

    async fn agent() -> (
        AgentLoop,
        mpsc::Sender<InboundUnit>,
        Arc<MockChannel>,
        tempfile::TempDir,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(SqliteStorage::new(StorageConfig {
            database_path: dir.path().join("test.db").to_string_lossy().into_owned(),
            wal_mode: true,
        }));
        storage.initialize().await.unwrap();
        let channel = Arc::new(MockChannel::new(ChannelKind::Test));
        let config = ConciergeConfig::default();
        let router = MessageRouter::new(
            &config,
            Collaborators {
                storage,
                channels: Arc::new(ChannelMux::new().with(channel.clone())),
                responder: Arc::new(MockResponder::new()),
                speech: Arc::new(MockSpeech::new()),
                vision: Arc::new(MockVision::new()),
            },
        );
        let dispatcher = LaneDispatcher::new(Arc::new(router), Duration::from_secs(60));
        let (tx, rx) = mpsc::channel(16);
        (AgentLoop::new(rx, dispatcher, &config.lanes), tx, channel, dir)
    }

    #[tokio::test]
    async fn loop_stops_when_senders_drop() {
        let (agent, tx, channel, _dir) = agent().await;
        tx.send(InboundUnit::text("u1", ChannelKind::Test, "horario"))
            .await
            .unwrap();
        drop(tx);

        agent.run(CancellationToken::new()).await.unwrap();
        assert_eq!(channel.sent_to("u1").await.len(), 1);
    }

    #[tokio::test]
    async fn queued_units_are_served_after_cancel() {
        let (agent, tx, channel, _dir) = agent().await;
        for user in ["u1", "u2", "u3"] {
            tx.send(InboundUnit::text(user, ChannelKind::Test, "horario"))
                .await
                .unwrap();
        }
        let cancel = CancellationToken::new();
        cancel.cancel();

        agent.run(cancel).await.unwrap();
        for user in ["u1", "u2", "u3"] {
            assert_eq!(channel.sent_to(user).await.len(), 1, "{user} not served");
        }
    }
}
