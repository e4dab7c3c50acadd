// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end routing tests.
//!
//! `TestHarness` assembles a complete router with mock collaborators and a
//! temp SQLite database. `send_text()` and `send()` drive one inbound unit
//! through the full pipeline.

use std::sync::Arc;

use concierge_agent::{ChannelMux, Collaborators, MessageRouter, RouteOutcome};
use concierge_config::model::{ConciergeConfig, StorageConfig};
use concierge_core::types::{
    ActivityEvent, ChannelKind, Conversation, Escalation, InboundUnit,
};
use concierge_core::{ConciergeError, StorageAdapter};
use concierge_storage::SqliteStorage;

use crate::mock_channel::MockChannel;
use crate::mock_media::{MockSpeech, MockVision};
use crate::mock_responder::MockResponder;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    config: ConciergeConfig,
    responder: MockResponder,
    speech: MockSpeech,
    vision: MockVision,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            config: ConciergeConfig::default(),
            responder: MockResponder::new(),
            speech: MockSpeech::new(),
            vision: MockVision::new(),
        }
    }

    /// Use `config` instead of the defaults. The storage section is replaced.
    pub fn with_config(mut self, config: ConciergeConfig) -> Self {
        self.config = config;
        self
    }

    /// Queue responder replies. Escalation indicators come from the config set so far.
    pub fn with_replies(mut self, replies: Vec<String>) -> Self {
        self.responder = MockResponder::with_replies(replies)
            .with_indicators(&self.config.routing.escalation_indicators);
        self
    }

    pub fn with_responder(mut self, responder: MockResponder) -> Self {
        self.responder = responder;
        self
    }

    pub fn with_speech(mut self, speech: MockSpeech) -> Self {
        self.speech = speech;
        self
    }

    pub fn with_vision(mut self, vision: MockVision) -> Self {
        self.vision = vision;
        self
    }

    /// Build the harness, creating the database and the router.
    pub async fn build(self) -> Result<TestHarness, ConciergeError> {
        let temp_dir = tempfile::TempDir::new().map_err(|e| ConciergeError::Storage {
            source: e.into(),
        })?;
        let storage = Arc::new(SqliteStorage::new(StorageConfig {
            database_path: temp_dir.path().join("test.db").to_string_lossy().into_owned(),
            wal_mode: true,
        }));
        storage.initialize().await?;

        let channel = Arc::new(MockChannel::new(ChannelKind::Test));
        let responder = Arc::new(self.responder);
        let router = MessageRouter::new(
            &self.config,
            Collaborators {
                storage: storage.clone(),
                channels: Arc::new(ChannelMux::new().with(channel.clone())),
                responder: responder.clone(),
                speech: Arc::new(self.speech),
                vision: Arc::new(self.vision),
            },
        );

        Ok(TestHarness {
            router: Arc::new(router),
            channel,
            responder,
            storage,
            config: self.config,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete routing stack for integration tests.
///
/// The temp directory is kept alive for the lifetime of the harness.
pub struct TestHarness {
    pub router: Arc<MessageRouter>,
    pub channel: Arc<MockChannel>,
    pub responder: Arc<MockResponder>,
    pub storage: Arc<SqliteStorage>,
    pub config: ConciergeConfig,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Route a text unit from `user_id` on the test channel.
    pub async fn send_text(&self, user_id: &str, body: &str) -> RouteOutcome {
        self.router
            .route(InboundUnit::text(user_id, ChannelKind::Test, body))
            .await
    }

    pub async fn send(&self, unit: InboundUnit) -> RouteOutcome {
        self.router.route(unit).await
    }

    /// Texts delivered to `user_id`, in order.
    pub async fn replies_to(&self, user_id: &str) -> Vec<String> {
        self.channel.sent_to(user_id).await
    }

    /// The last text delivered to `user_id`.
    pub async fn last_reply(&self, user_id: &str) -> Option<String> {
        self.channel.sent_to(user_id).await.pop()
    }

    pub async fn active_escalation(&self, user_id: &str) -> Result<Option<Escalation>, ConciergeError> {
        self.storage.active_escalation(user_id).await
    }

    pub async fn escalations(&self) -> Result<Vec<Escalation>, ConciergeError> {
        self.storage.list_escalations(true).await
    }

    /// Today's stored conversation for `user_id`.
    pub async fn conversation(&self, user_id: &str) -> Result<Option<Conversation>, ConciergeError> {
        let day = concierge_agent::BusinessClock::new(self.config.routing.utc_offset_minutes).today();
        self.storage.get_conversation(user_id, &day).await
    }

    pub async fn activities(&self, limit: usize) -> Result<Vec<ActivityEvent>, ConciergeError> {
        self.storage.recent_activities(limit).await
    }
}
