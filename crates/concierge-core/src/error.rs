// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error type shared by every Concierge crate.

use std::time::Duration;

use thiserror::Error;

/// The primary error type used across adapter traits and routing operations.
#[derive(Debug, Error)]
pub enum ConciergeError {
    /// Configuration errors (invalid TOML, missing credentials, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database open, query failure, migration failure).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Channel adapter errors (delivery failure, media download, webhook payload).
    #[error("channel error: {message}")]
    Channel {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// AI responder errors (API failure, empty completion, document search).
    #[error("responder error: {message}")]
    Responder {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Speech-to-text or image-analysis collaborator errors.
    #[error("media analysis error: {message}")]
    Media {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Adapter health check failed.
    #[error("health check failed for {name}: {source}")]
    HealthCheckFailed {
        name: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An external call exceeded its configured deadline.
    #[error("{operation} timed out after {duration:?}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ConciergeError {
    /// Short label naming the collaborator that failed, used for metrics and activity details.
    pub fn collaborator(&self) -> &'static str {
        match self {
            ConciergeError::Config(_) => "config",
            ConciergeError::Storage { .. } => "storage",
            ConciergeError::Channel { .. } => "channel",
            ConciergeError::Responder { .. } => "responder",
            ConciergeError::Media { .. } => "media",
            ConciergeError::HealthCheckFailed { .. } => "health",
            ConciergeError::Timeout { .. } => "timeout",
            ConciergeError::Internal(_) => "internal",
        }
    }

    /// Build a `Storage` error from any displayable message.
    pub fn storage(message: impl Into<String>) -> Self {
        ConciergeError::Storage {
            source: message.into().into(),
        }
    }
}
