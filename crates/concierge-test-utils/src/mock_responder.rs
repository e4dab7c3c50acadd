// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock AI responder for deterministic testing.
//!
//! Replies are popped from a FIFO queue. When the queue is empty, a default
//! "mock reply" text is returned. Every call's history is captured.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use concierge_core::traits::{PluginAdapter, ResponderAdapter};
use concierge_core::types::{AdapterType, ChannelKind, HealthStatus, HistoryTurn};
use concierge_core::ConciergeError;
use concierge_intent::PhraseDetector;

pub struct MockResponder {
    replies: Arc<Mutex<VecDeque<String>>>,
    seen: Arc<Mutex<Vec<(String, Vec<HistoryTurn>)>>>,
    indicators: PhraseDetector,
    delay: Option<Duration>,
    fail: bool,
    document_search: bool,
}

impl MockResponder {
    /// A responder that never suggests escalation.
    pub fn new() -> Self {
        Self {
            replies: Arc::new(Mutex::new(VecDeque::new())),
            seen: Arc::new(Mutex::new(Vec::new())),
            indicators: PhraseDetector::default(),
            delay: None,
            fail: false,
            document_search: false,
        }
    }

    pub fn with_replies(replies: Vec<String>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(VecDeque::from(replies))),
            ..Self::new()
        }
    }

    /// Every call fails with a responder error.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    /// Phrases that make `should_escalate` return true.
    pub fn with_indicators<I, S>(mut self, indicators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.indicators = PhraseDetector::new(indicators);
        self
    }

    /// Sleep before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_document_search(mut self) -> Self {
        self.document_search = true;
        self
    }

    pub async fn add_reply(&self, text: impl Into<String>) {
        self.replies.lock().await.push_back(text.into());
    }

    /// Number of `generate_reply` calls.
    pub async fn calls(&self) -> usize {
        self.seen.lock().await.len()
    }

    /// The texts passed to `generate_reply`, in call order.
    pub async fn prompts(&self) -> Vec<String> {
        self.seen.lock().await.iter().map(|(t, _)| t.clone()).collect()
    }

    /// The history windows passed to `generate_reply`, in call order.
    pub async fn histories(&self) -> Vec<Vec<HistoryTurn>> {
        self.seen.lock().await.iter().map(|(_, h)| h.clone()).collect()
    }
}

impl Default for MockResponder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockResponder {
    fn name(&self) -> &str {
        "mock-responder"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Responder
    }

    async fn health_check(&self) -> Result<HealthStatus, ConciergeError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ConciergeError> {
        Ok(())
    }
}

#[async_trait]
impl ResponderAdapter for MockResponder {
    fn supports_document_search(&self) -> bool {
        self.document_search
    }

    async fn generate_reply(
        &self,
        text: &str,
        history: &[HistoryTurn],
        _channel: ChannelKind,
    ) -> Result<String, ConciergeError> {
        self.seen
            .lock()
            .await
            .push((text.to_string(), history.to_vec()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(ConciergeError::Responder {
                message: "mock responder failure".to_string(),
                source: None,
            });
        }
        Ok(self
            .replies
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| "mock reply".to_string()))
    }

    fn should_escalate(&self, reply: &str) -> bool {
        self.indicators.matches(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replies_are_fifo_then_default() {
        let responder = MockResponder::with_replies(vec!["uno".into(), "dos".into()]);
        let ch = ChannelKind::Test;
        assert_eq!(responder.generate_reply("a", &[], ch).await.unwrap(), "uno");
        assert_eq!(responder.generate_reply("b", &[], ch).await.unwrap(), "dos");
        assert_eq!(responder.generate_reply("c", &[], ch).await.unwrap(), "mock reply");
        assert_eq!(responder.calls().await, 3);
        assert_eq!(responder.prompts().await, vec!["a", "b", "c"]);
    }

    #[test]
    fn indicators_drive_should_escalate() {
        let responder = MockResponder::new().with_indicators(["no puedo ayudar"]);
        assert!(responder.should_escalate("Lo siento, NO PUEDO AYUDAR con eso"));
        assert!(!responder.should_escalate("Claro, con gusto"));
        assert!(!MockResponder::new().should_escalate("no puedo ayudar"));
    }

    #[tokio::test]
    async fn failing_responder_still_counts_calls() {
        let responder = MockResponder::failing();
        assert!(responder.generate_reply("x", &[], ChannelKind::Test).await.is_err());
        assert_eq!(responder.calls().await, 1);
    }
}
