// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator traits the router depends on.
//!
//! Every adapter extends [`PluginAdapter`] and uses `#[async_trait]` so the
//! router can hold them as `Arc<dyn Trait + Send + Sync>`.

pub mod adapter;
pub mod channel;
pub mod media;
pub mod responder;
pub mod storage;

pub use adapter::PluginAdapter;
pub use channel::ChannelAdapter;
pub use media::{SpeechAdapter, VisionAdapter};
pub use responder::ResponderAdapter;
pub use storage::StorageAdapter;
