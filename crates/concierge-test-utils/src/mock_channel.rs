// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock channel adapter for deterministic testing.
//!
//! `MockChannel` captures outbound texts per user, serves scripted media,
//! and can be told to fail sends or read receipts.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use concierge_core::traits::{ChannelAdapter, PluginAdapter};
use concierge_core::types::{AdapterType, ChannelKind, HealthStatus, MediaPayload};
use concierge_core::ConciergeError;

/// A mock messaging channel for testing.
pub struct MockChannel {
    kind: ChannelKind,
    sent: Arc<Mutex<Vec<(String, String)>>>,
    media: Arc<Mutex<HashMap<String, MediaPayload>>>,
    read: Arc<Mutex<Vec<String>>>,
    health: Arc<Mutex<HealthStatus>>,
    downloads: AtomicUsize,
    fail_sends: AtomicBool,
    fail_mark_read: AtomicBool,
}

impl MockChannel {
    pub fn new(kind: ChannelKind) -> Self {
        Self {
            kind,
            sent: Arc::new(Mutex::new(Vec::new())),
            media: Arc::new(Mutex::new(HashMap::new())),
            read: Arc::new(Mutex::new(Vec::new())),
            health: Arc::new(Mutex::new(HealthStatus::Healthy)),
            downloads: AtomicUsize::new(0),
            fail_sends: AtomicBool::new(false),
            fail_mark_read: AtomicBool::new(false),
        }
    }

    /// Make `media_ref` downloadable.
    pub async fn add_media(&self, media_ref: &str, payload: MediaPayload) {
        self.media.lock().await.insert(media_ref.to_string(), payload);
    }

    /// All `(user_id, text)` pairs sent so far, in order.
    pub async fn sent_messages(&self) -> Vec<(String, String)> {
        self.sent.lock().await.clone()
    }

    /// Texts sent to one user, in order.
    pub async fn sent_to(&self, user_id: &str) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|(to, _)| to == user_id)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    pub async fn clear_sent(&self) {
        self.sent.lock().await.clear();
    }

    /// Message refs passed to `mark_read`.
    pub async fn read_receipts(&self) -> Vec<String> {
        self.read.lock().await.clone()
    }

    /// Number of `download_media` calls, successful or not.
    pub async fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub async fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub async fn fail_mark_read(&self, fail: bool) {
        self.fail_mark_read.store(fail, Ordering::SeqCst);
    }

    pub async fn set_health(&self, status: HealthStatus) {
        *self.health.lock().await = status;
    }
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new(ChannelKind::Test)
    }
}

#[async_trait]
impl PluginAdapter for MockChannel {
    fn name(&self) -> &str {
        "mock-channel"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, ConciergeError> {
        Ok(self.health.lock().await.clone())
    }

    async fn shutdown(&self) -> Result<(), ConciergeError> {
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for MockChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn send(&self, user_id: &str, text: &str) -> Result<(), ConciergeError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ConciergeError::Channel {
                message: "mock send failure".to_string(),
                source: None,
            });
        }
        self.sent
            .lock()
            .await
            .push((user_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn download_media(&self, media_ref: &str) -> Result<MediaPayload, ConciergeError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.media
            .lock()
            .await
            .get(media_ref)
            .cloned()
            .ok_or_else(|| ConciergeError::Channel {
                message: format!("unknown media {media_ref}"),
                source: None,
            })
    }

    async fn mark_read(&self, message_ref: &str) -> Result<(), ConciergeError> {
        if self.fail_mark_read.load(Ordering::SeqCst) {
            return Err(ConciergeError::Channel {
                message: "mock mark_read failure".to_string(),
                source: None,
            });
        }
        self.read.lock().await.push(message_ref.to_string());
        Ok(())
    }
}
