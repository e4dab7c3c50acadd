// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel adapter trait for messaging platforms (WhatsApp, Teams).

use async_trait::async_trait;

use crate::error::ConciergeError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ChannelKind, MediaPayload};

/// Outbound side of a messaging platform.
///
/// Inbound delivery is push-based (webhooks) and lives outside this trait;
/// adapters turn webhook payloads into [`InboundUnit`](crate::types::InboundUnit)s.
#[async_trait]
pub trait ChannelAdapter: PluginAdapter {
    /// The platform this adapter speaks to.
    fn kind(&self) -> ChannelKind;

    /// Delivers a text message to a user.
    async fn send(&self, user_id: &str, text: &str) -> Result<(), ConciergeError>;

    /// Fetches media bytes referenced by an inbound unit.
    async fn download_media(&self, media_ref: &str) -> Result<MediaPayload, ConciergeError>;

    /// Marks an inbound message as read. Callers ignore failures.
    async fn mark_read(&self, message_ref: &str) -> Result<(), ConciergeError>;
}
