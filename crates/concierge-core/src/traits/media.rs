// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Speech-to-text and image-analysis collaborator traits.

use async_trait::async_trait;

use crate::error::ConciergeError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ImageAnalysis, MediaPayload};

/// Transcribes voice notes.
#[async_trait]
pub trait SpeechAdapter: PluginAdapter {
    /// Returns `Ok(None)` when the audio held no recognizable speech.
    async fn transcribe(&self, audio: &MediaPayload) -> Result<Option<String>, ConciergeError>;
}

/// Describes images and extracts visible text.
#[async_trait]
pub trait VisionAdapter: PluginAdapter {
    async fn describe(&self, image: &MediaPayload) -> Result<ImageAnalysis, ConciergeError>;
}
