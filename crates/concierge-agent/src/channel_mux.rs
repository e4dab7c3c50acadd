// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Maps each [`ChannelKind`] to the adapter that delivers replies on it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use concierge_core::traits::{ChannelAdapter, PluginAdapter};
use concierge_core::types::{AdapterType, ChannelKind, HealthStatus};
use concierge_core::ConciergeError;

/// Outbound routing table for channel adapters.
///
/// Replies always go back through the adapter the inbound unit arrived on.
#[derive(Default)]
pub struct ChannelMux {
    channels: HashMap<ChannelKind, Arc<dyn ChannelAdapter + Send + Sync>>,
}

impl ChannelMux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own kind, replacing any previous one.
    pub fn register(&mut self, channel: Arc<dyn ChannelAdapter + Send + Sync>) {
        let kind = channel.kind();
        info!(channel = %kind, adapter = channel.name(), "channel registered");
        if self.channels.insert(kind, channel).is_some() {
            warn!(channel = %kind, "replaced previously registered channel adapter");
        }
    }

    pub fn with(mut self, channel: Arc<dyn ChannelAdapter + Send + Sync>) -> Self {
        self.register(channel);
        self
    }

    pub fn get(
        &self,
        kind: ChannelKind,
    ) -> Result<Arc<dyn ChannelAdapter + Send + Sync>, ConciergeError> {
        self.channels
            .get(&kind)
            .cloned()
            .ok_or_else(|| ConciergeError::Channel {
                message: format!("no adapter registered for channel {kind}"),
                source: None,
            })
    }

    pub fn kinds(&self) -> Vec<ChannelKind> {
        let mut kinds: Vec<_> = self.channels.keys().copied().collect();
        kinds.sort_by_key(|k| k.to_string());
        kinds
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[async_trait]
impl PluginAdapter for ChannelMux {
    fn name(&self) -> &str {
        "channel-mux"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    /// Degraded when any child reports a problem; a failing check counts as unhealthy.
    async fn health_check(&self) -> Result<HealthStatus, ConciergeError> {
        if self.channels.is_empty() {
            return Ok(HealthStatus::Unhealthy("no channels registered".to_string()));
        }

        let mut reasons = Vec::new();
        for kind in self.kinds() {
            let Some(channel) = self.channels.get(&kind) else {
                continue;
            };
            match channel.health_check().await {
                Ok(HealthStatus::Healthy) => {}
                Ok(HealthStatus::Degraded(reason)) | Ok(HealthStatus::Unhealthy(reason)) => {
                    reasons.push(format!("{kind}: {reason}"));
                }
                Err(e) => reasons.push(format!("{kind}: {e}")),
            }
        }

        if reasons.is_empty() {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Degraded(reasons.join("; ")))
        }
    }

    async fn shutdown(&self) -> Result<(), ConciergeError> {
        for (kind, channel) in &self.channels {
            if let Err(e) = channel.shutdown().await {
                warn!(channel = %kind, error = %e, "channel shutdown error");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concierge_test_utils::MockChannel;

    #[test]
    fn get_returns_registered_adapter() {
        let mux = ChannelMux::new().with(Arc::new(MockChannel::new(ChannelKind::Test)));
        assert!(mux.get(ChannelKind::Test).is_ok());
        assert_eq!(mux.kinds(), vec![ChannelKind::Test]);
    }

    #[test]
    fn missing_channel_is_a_channel_error() {
        let mux = ChannelMux::new();
        let err = mux.get(ChannelKind::Teams).err().unwrap();
        assert_eq!(err.collaborator(), "channel");
        assert!(err.to_string().contains("teams"));
    }

    #[tokio::test]
    async fn health_aggregates_children() {
        let healthy = ChannelMux::new().with(Arc::new(MockChannel::new(ChannelKind::Test)));
        assert_eq!(healthy.health_check().await.unwrap(), HealthStatus::Healthy);

        let sick = MockChannel::new(ChannelKind::Whatsapp);
        sick.set_health(HealthStatus::Unhealthy("token expired".to_string()))
            .await;
        let mixed = ChannelMux::new()
            .with(Arc::new(MockChannel::new(ChannelKind::Test)))
            .with(Arc::new(sick));
        assert_eq!(
            mixed.health_check().await.unwrap(),
            HealthStatus::Degraded("whatsapp: token expired".to_string())
        );
    }

    #[tokio::test]
    async fn empty_mux_is_unhealthy() {
        assert!(matches!(
            ChannelMux::new().health_check().await.unwrap(),
            HealthStatus::Unhealthy(_)
        ));
    }
}
