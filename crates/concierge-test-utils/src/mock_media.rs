// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock speech and vision collaborators.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use concierge_core::traits::{PluginAdapter, SpeechAdapter, VisionAdapter};
use concierge_core::types::{AdapterType, HealthStatus, ImageAnalysis, MediaPayload};
use concierge_core::ConciergeError;

/// Returns a fixed transcript, nothing, or an error.
pub struct MockSpeech {
    transcript: Option<String>,
    fail: bool,
    calls: AtomicUsize,
}

impl MockSpeech {
    /// Recognizes nothing.
    pub fn new() -> Self {
        Self {
            transcript: None,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_transcript(text: impl Into<String>) -> Self {
        Self {
            transcript: Some(text.into()),
            ..Self::new()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockSpeech {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockSpeech {
    fn name(&self) -> &str {
        "mock-speech"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Speech
    }

    async fn health_check(&self) -> Result<HealthStatus, ConciergeError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ConciergeError> {
        Ok(())
    }
}

#[async_trait]
impl SpeechAdapter for MockSpeech {
    async fn transcribe(&self, _audio: &MediaPayload) -> Result<Option<String>, ConciergeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ConciergeError::Media {
                message: "mock transcription failure".to_string(),
                source: None,
            });
        }
        Ok(self.transcript.clone())
    }
}

/// Returns a fixed analysis or an error.
pub struct MockVision {
    analysis: ImageAnalysis,
    fail: bool,
    calls: AtomicUsize,
}

impl MockVision {
    pub fn new() -> Self {
        Self::with_analysis(ImageAnalysis {
            description: "mock image description".to_string(),
            extracted_text: None,
        })
    }

    pub fn with_analysis(analysis: ImageAnalysis) -> Self {
        Self {
            analysis,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockVision {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockVision {
    fn name(&self) -> &str {
        "mock-vision"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Vision
    }

    async fn health_check(&self) -> Result<HealthStatus, ConciergeError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ConciergeError> {
        Ok(())
    }
}

#[async_trait]
impl VisionAdapter for MockVision {
    async fn describe(&self, _image: &MediaPayload) -> Result<ImageAnalysis, ConciergeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ConciergeError::Media {
                message: "mock vision failure".to_string(),
                source: None,
            });
        }
        Ok(self.analysis.clone())
    }
}
