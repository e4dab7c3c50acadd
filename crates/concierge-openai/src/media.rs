// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Speech-to-text and image description over the same API.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::debug;

use concierge_config::model::ResponderConfig;
use concierge_core::traits::{PluginAdapter, SpeechAdapter, VisionAdapter};
use concierge_core::types::{AdapterType, HealthStatus, ImageAnalysis, MediaPayload};
use concierge_core::ConciergeError;

use crate::client::{OpenAiClient, Surface};
use crate::types::{ChatMessage, ChatRequest, ContentPart, ImageUrl, MessageContent};

/// Spoken language hint sent with every transcription.
const TRANSCRIPTION_LANGUAGE: &str = "es";

const VISION_MAX_TOKENS: u32 = 500;

const VISION_PROMPT: &str = "Describe esta imagen en espanol en una o dos oraciones. \
Luego transcribe cualquier texto visible. Responde exactamente con este formato:\n\
DESCRIPCION: <descripcion>\n\
TEXTO: <texto visible o NINGUNO>";

/// Voice-note transcription via `/audio/transcriptions`.
pub struct OpenAiSpeech {
    client: OpenAiClient,
    model: String,
}

impl OpenAiSpeech {
    pub fn new(config: &ResponderConfig) -> Result<Self, ConciergeError> {
        Ok(Self {
            client: OpenAiClient::new(&config.base_url, config.api_key.as_deref())?,
            model: config.transcription_model.clone(),
        })
    }
}

#[async_trait]
impl PluginAdapter for OpenAiSpeech {
    fn name(&self) -> &str {
        "openai-speech"
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
impl SpeechAdapter for OpenAiSpeech {
    async fn transcribe(&self, audio: &MediaPayload) -> Result<Option<String>, ConciergeError> {
        let text = self
            .client
            .transcribe(
                &self.model,
                TRANSCRIPTION_LANGUAGE,
                audio.bytes.clone(),
                &audio.mime_type,
            )
            .await?;
        let text = text.trim();
        debug!(chars = text.chars().count(), "audio transcribed");
        Ok((!text.is_empty()).then(|| text.to_string()))
    }
}

/// Image description via a vision-capable chat model.
pub struct OpenAiVision {
    client: OpenAiClient,
    model: String,
}

impl OpenAiVision {
    pub fn new(config: &ResponderConfig) -> Result<Self, ConciergeError> {
        Ok(Self {
            client: OpenAiClient::new(&config.base_url, config.api_key.as_deref())?,
            model: config.vision_model.clone(),
        })
    }
}

#[async_trait]
impl PluginAdapter for OpenAiVision {
    fn name(&self) -> &str {
        "openai-vision"
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
impl VisionAdapter for OpenAiVision {
    async fn describe(&self, image: &MediaPayload) -> Result<ImageAnalysis, ConciergeError> {
        let data_url = format!(
            "data:{};base64,{}",
            image.mime_type,
            STANDARD.encode(&image.bytes)
        );
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: MessageContent::Parts(vec![
                    ContentPart::Text {
                        text: VISION_PROMPT.to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: data_url },
                    },
                ]),
            }],
            max_tokens: VISION_MAX_TOKENS,
            temperature: None,
        };

        let response = self.client.chat(&request, Surface::Media).await?;
        let text = response
            .first_text()
            .ok_or_else(|| Surface::Media.error("vision model returned no description", None))?;
        let analysis = parse_analysis(text);
        debug!(
            has_text = analysis.extracted_text.is_some(),
            "image described"
        );
        Ok(analysis)
    }
}

/// Split a `DESCRIPCION: ... / TEXTO: ...` answer.
///
/// Answers without the labels are taken whole as the description.
pub fn parse_analysis(answer: &str) -> ImageAnalysis {
    let mut description = Vec::new();
    let mut text = Vec::new();
    let mut in_text = false;

    for line in answer.lines() {
        let trimmed = line.trim();
        if let Some(rest) = strip_label(trimmed, &["DESCRIPCION:", "DESCRIPCIÓN:", "descripción:"]) {
            in_text = false;
            description.push(rest);
        } else if let Some(rest) = strip_label(trimmed, &["TEXTO:"]) {
            in_text = true;
            text.push(rest);
        } else if in_text {
            text.push(trimmed);
        } else {
            description.push(trimmed);
        }
    }

    let description = join_nonempty(&description, " ");
    let extracted = join_nonempty(&text, "\n");
    let extracted_text = match extracted.to_lowercase().trim_end_matches('.') {
        "" | "ninguno" | "ninguna" | "no" | "n/a" | "-" => None,
        _ => Some(extracted),
    };

    ImageAnalysis {
        description,
        extracted_text,
    }
}

fn strip_label<'a>(line: &'a str, labels: &[&str]) -> Option<&'a str> {
    labels.iter().find_map(|label| {
        let head = line.get(..label.len())?;
        head.eq_ignore_ascii_case(label)
            .then(|| line[label.len()..].trim())
    })
}

fn join_nonempty(parts: &[&str], sep: &str) -> String {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(sep)
}
