// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! AI responder trait.

use async_trait::async_trait;

use crate::error::ConciergeError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ChannelKind, HistoryTurn};

/// Large-language-model backed reply generator.
///
/// Prompt construction, retrieval, and tool use are private to the
/// implementation; the router only sees text in and text out.
#[async_trait]
pub trait ResponderAdapter: PluginAdapter {
    /// Whether replies are grounded in an internal document index.
    fn supports_document_search(&self) -> bool;

    /// Produces a reply for `text` given the recent history window.
    async fn generate_reply(
        &self,
        text: &str,
        history: &[HistoryTurn],
        channel: ChannelKind,
    ) -> Result<String, ConciergeError>;

    /// Whether a generated reply signals that a human should take over.
    fn should_escalate(&self, reply: &str) -> bool;
}
