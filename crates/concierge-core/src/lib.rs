// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Concierge gateway.
//!
//! Defines the collaborator traits the message router depends on, the
//! domain types for conversations, escalations, and activity events, and
//! the shared [`ConciergeError`] type.

pub mod error;
pub mod traits;
pub mod types;

pub use error::ConciergeError;
pub use types::{AdapterType, ChannelKind, HealthStatus, InboundKind, InboundUnit, Role};

pub use traits::{
    ChannelAdapter, PluginAdapter, ResponderAdapter, SpeechAdapter, StorageAdapter,
    VisionAdapter,
};
