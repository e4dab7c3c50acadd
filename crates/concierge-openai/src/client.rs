// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for OpenAI-compatible APIs.
//!
//! Provides [`OpenAiClient`] which handles authentication, request
//! construction, and a single retry on transient errors.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use tracing::{debug, warn};

use concierge_core::ConciergeError;

use crate::types::{ApiErrorResponse, ChatRequest, ChatResponse, TranscriptionResponse};

/// Which error variant a failed call maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Responder,
    Media,
}

impl Surface {
    pub fn error(
        self,
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> ConciergeError {
        let message = message.into();
        match self {
            Surface::Responder => ConciergeError::Responder { message, source },
            Surface::Media => ConciergeError::Media { message, source },
        }
    }
}

/// HTTP client for chat completions and audio transcription.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl OpenAiClient {
    /// Creates a client for `base_url` (up to and including the version segment).
    pub fn new(base_url: &str, api_key: Option<&str>) -> Result<Self, ConciergeError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key.filter(|k| !k.is_empty()) {
            let value = HeaderValue::from_str(&format!("Bearer {key}")).map_err(|e| {
                ConciergeError::Config(format!("invalid responder.api_key header value: {e}"))
            })?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| ConciergeError::Responder {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries: 1,
            retry_delay: Duration::from_secs(1),
        })
    }

    /// Shortens the retry delay, for tests against a local server.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sends a chat-completions request and returns the parsed response.
    ///
    /// On transient errors (429, 500, 502, 503), retries once.
    pub async fn chat(
        &self,
        request: &ChatRequest,
        surface: Surface,
    ) -> Result<ChatResponse, ConciergeError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut attempt = 0;
        loop {
            let response = self
                .client
                .post(&url)
                .json(request)
                .send()
                .await
                .map_err(|e| surface.error(format!("HTTP request failed: {e}"), Some(Box::new(e))))?;

            let status = response.status();
            debug!(status = %status, attempt, model = %request.model, "chat completion response");

            if status.is_success() {
                return response.json::<ChatResponse>().await.map_err(|e| {
                    surface.error(format!("failed to parse API response: {e}"), Some(Box::new(e)))
                });
            }

            let body = response.text().await.unwrap_or_default();
            if is_transient_error(status) && attempt < self.max_retries {
                warn!(status = %status, body = %body, "transient error, will retry");
                attempt += 1;
                tokio::time::sleep(self.retry_delay).await;
                continue;
            }
            return Err(surface.error(api_error_message(status, &body), None));
        }
    }

    /// Uploads audio to `/audio/transcriptions` and returns the transcript text.
    pub async fn transcribe(
        &self,
        model: &str,
        language: &str,
        audio: Vec<u8>,
        mime_type: &str,
    ) -> Result<String, ConciergeError> {
        let url = format!("{}/audio/transcriptions", self.base_url);
        let part = reqwest::multipart::Part::bytes(audio)
            .file_name(format!("audio.{}", audio_extension(mime_type)))
            .mime_str(mime_type)
            .map_err(|e| {
                Surface::Media.error(format!("invalid audio mime type {mime_type}: {e}"), Some(Box::new(e)))
            })?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", model.to_string())
            .text("language", language.to_string())
            .text("response_format", "json");

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Surface::Media.error(format!("HTTP request failed: {e}"), Some(Box::new(e))))?;

        let status = response.status();
        debug!(status = %status, model, "transcription response");
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Surface::Media.error(api_error_message(status, &body), None));
        }

        let parsed: TranscriptionResponse = response.json().await.map_err(|e| {
            Surface::Media.error(format!("failed to parse transcription: {e}"), Some(Box::new(e)))
        })?;
        Ok(parsed.text)
    }
}

/// Returns true for HTTP status codes that indicate transient errors worth retrying.
fn is_transient_error(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503)
}

fn api_error_message(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<ApiErrorResponse>(body) {
        Ok(api_err) => match api_err.error.type_ {
            Some(kind) => format!("API error ({kind}): {}", api_err.error.message),
            None => format!("API error ({status}): {}", api_err.error.message),
        },
        Err(_) => format!("API returned {status}: {body}"),
    }
}

/// File extension the transcription endpoint uses to detect the container.
fn audio_extension(mime_type: &str) -> &'static str {
    let base = mime_type.split(';').next().unwrap_or(mime_type).trim();
    match base {
        "audio/ogg" | "audio/opus" => "ogg",
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => "m4a",
        "audio/aac" => "aac",
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "audio/webm" => "webm",
        "audio/amr" => "amr",
        _ => "ogg",
    }
}
