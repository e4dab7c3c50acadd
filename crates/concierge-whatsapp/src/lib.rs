// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WhatsApp channel adapter for the Concierge gateway.
//!
//! Implements [`ChannelAdapter`] against the WhatsApp Cloud API (Graph API)
//! with `reqwest`. Inbound delivery is push-based: [`server`] serves the
//! webhook and [`webhook`] turns payloads into [`InboundUnit`]s.
//!
//! [`InboundUnit`]: concierge_core::types::InboundUnit

pub mod server;
pub mod webhook;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use concierge_config::model::WhatsappConfig;
use concierge_core::traits::{ChannelAdapter, PluginAdapter};
use concierge_core::types::{AdapterType, ChannelKind, HealthStatus, MediaPayload};
use concierge_core::ConciergeError;

pub use server::{WebhookState, router, serve};
pub use webhook::{parse_webhook, verify_handshake, verify_signature};

/// WhatsApp Cloud API channel.
pub struct WhatsappChannel {
    client: reqwest::Client,
    config: WhatsappConfig,
}

/// Media metadata returned by `GET /{version}/{media_id}`.
#[derive(Debug, Deserialize)]
struct MediaInfo {
    url: Option<String>,
    mime_type: Option<String>,
}

impl WhatsappChannel {
    /// Creates the adapter.
    ///
    /// Missing credentials are not an error here: the adapter reports
    /// itself unhealthy and every outbound call fails with a channel error.
    pub fn new(config: WhatsappConfig) -> Self {
        if config.access_token.is_none() || config.phone_number_id.is_none() {
            warn!("whatsapp credentials not configured, outbound delivery disabled");
        }
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Point the adapter at a different Graph API host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    fn api_url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.api_version,
            path
        )
    }

    fn token(&self) -> Result<&str, ConciergeError> {
        self.config
            .access_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| channel_error("whatsapp.access_token is not configured", None))
    }

    fn phone_number_id(&self) -> Result<&str, ConciergeError> {
        self.config
            .phone_number_id
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| channel_error("whatsapp.phone_number_id is not configured", None))
    }

    async fn post_message(&self, body: serde_json::Value, what: &str) -> Result<(), ConciergeError> {
        let url = self.api_url(&format!("{}/messages", self.phone_number_id()?));
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.token()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| channel_error(&format!("whatsapp {what} request failed"), Some(e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(channel_error(
                &format!("whatsapp {what} returned {status}: {text}"),
                None,
            ));
        }
        Ok(())
    }
}

/// Strip `+`, spaces, and dashes from a phone number.
pub fn clean_recipient(user_id: &str) -> String {
    user_id
        .chars()
        .filter(|c| !matches!(c, '+' | ' ' | '-'))
        .collect()
}

fn channel_error(message: &str, source: Option<reqwest::Error>) -> ConciergeError {
    ConciergeError::Channel {
        message: message.to_string(),
        source: source.map(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
    }
}

#[async_trait]
impl PluginAdapter for WhatsappChannel {
    fn name(&self) -> &str {
        "whatsapp"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, ConciergeError> {
        let mut missing = Vec::new();
        if self.token().is_err() {
            missing.push("access_token");
        }
        if self.phone_number_id().is_err() {
            missing.push("phone_number_id");
        }
        if missing.is_empty() {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy(format!(
                "missing whatsapp {}",
                missing.join(", ")
            )))
        }
    }

    async fn shutdown(&self) -> Result<(), ConciergeError> {
        debug!("whatsapp channel shutting down");
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for WhatsappChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Whatsapp
    }

    async fn send(&self, user_id: &str, text: &str) -> Result<(), ConciergeError> {
        let body = serde_json::json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": clean_recipient(user_id),
            "type": "text",
            "text": {
                "preview_url": false,
                "body": text,
            },
        });
        self.post_message(body, "send").await?;
        debug!(to = %user_id, chars = text.chars().count(), "whatsapp message sent");
        Ok(())
    }

    async fn download_media(&self, media_ref: &str) -> Result<MediaPayload, ConciergeError> {
        let token = self.token()?;

        let info: MediaInfo = self
            .client
            .get(self.api_url(media_ref))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| channel_error("whatsapp media lookup failed", Some(e)))?
            .error_for_status()
            .map_err(|e| channel_error("whatsapp media lookup rejected", Some(e)))?
            .json()
            .await
            .map_err(|e| channel_error("whatsapp media lookup returned invalid JSON", Some(e)))?;

        let url = info
            .url
            .ok_or_else(|| channel_error(&format!("no download url for media {media_ref}"), None))?;
        let mime_type = info
            .mime_type
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let bytes = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| channel_error("whatsapp media download failed", Some(e)))?
            .error_for_status()
            .map_err(|e| channel_error("whatsapp media download rejected", Some(e)))?
            .bytes()
            .await
            .map_err(|e| channel_error("whatsapp media body unreadable", Some(e)))?;

        if bytes.is_empty() {
            return Err(channel_error(
                &format!("whatsapp media {media_ref} is empty"),
                None,
            ));
        }
        debug!(media_ref, bytes = bytes.len(), mime_type = %mime_type, "media downloaded");
        Ok(MediaPayload {
            bytes: bytes.to_vec(),
            mime_type,
        })
    }

    async fn mark_read(&self, message_ref: &str) -> Result<(), ConciergeError> {
        let body = serde_json::json!({
            "messaging_product": "whatsapp",
            "status": "read",
            "message_id": message_ref,
        });
        self.post_message(body, "mark_read").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> WhatsappConfig {
        WhatsappConfig {
            access_token: Some("test-token".into()),
            phone_number_id: Some("12345".into()),
            ..Default::default()
        }
    }

    async fn channel(server: &MockServer) -> WhatsappChannel {
        WhatsappChannel::new(config()).with_base_url(server.uri())
    }

    #[test]
    fn recipient_is_cleaned() {
        assert_eq!(clean_recipient("+506 8888-7777"), "50688887777");
        assert_eq!(clean_recipient("50688887777"), "50688887777");
    }

    #[tokio::test]
    async fn send_posts_text_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v21.0/12345/messages"))
            .and(header("authorization", "Bearer test-token"))
            .and(body_json(serde_json::json!({
                "messaging_product": "whatsapp",
                "recipient_type": "individual",
                "to": "50688887777",
                "type": "text",
                "text": {"preview_url": false, "body": "hola"},
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "messages": [{"id": "wamid.1"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        channel(&server)
            .await
            .send("+506 8888-7777", "hola")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn send_error_status_is_channel_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
            .mount(&server)
            .await;

        let err = channel(&server).await.send("506", "hola").await.unwrap_err();
        assert!(matches!(err, ConciergeError::Channel { .. }));
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn send_without_credentials_fails_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let channel = WhatsappChannel::new(WhatsappConfig::default()).with_base_url(server.uri());
        assert!(channel.send("506", "hola").await.is_err());
    }

    #[tokio::test]
    async fn download_media_follows_metadata_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v21.0/media-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "url": format!("{}/files/media-1", server.uri()),
                "mime_type": "audio/ogg",
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/media-1"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
            .mount(&server)
            .await;

        let media = channel(&server).await.download_media("media-1").await.unwrap();
        assert_eq!(media.bytes, vec![1, 2, 3]);
        assert_eq!(media.mime_type, "audio/ogg");
    }

    #[tokio::test]
    async fn download_media_defaults_mime_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v21.0/media-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "url": format!("{}/files/media-2", server.uri()),
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/media-2"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![9u8]))
            .mount(&server)
            .await;

        let media = channel(&server).await.download_media("media-2").await.unwrap();
        assert_eq!(media.mime_type, "application/octet-stream");
    }

    #[tokio::test]
    async fn empty_media_body_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v21.0/media-3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "url": format!("{}/files/media-3", server.uri()),
                "mime_type": "image/jpeg",
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/media-3"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let err = channel(&server).await.download_media("media-3").await.unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[tokio::test]
    async fn missing_media_url_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v21.0/media-4"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        assert!(channel(&server).await.download_media("media-4").await.is_err());
    }

    #[tokio::test]
    async fn mark_read_posts_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v21.0/12345/messages"))
            .and(body_partial_json(serde_json::json!({
                "status": "read",
                "message_id": "wamid.42",
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        channel(&server).await.mark_read("wamid.42").await.unwrap();
    }

    #[tokio::test]
    async fn health_reports_missing_credentials() {
        let healthy = WhatsappChannel::new(config());
        assert_eq!(healthy.health_check().await.unwrap(), HealthStatus::Healthy);

        let unconfigured = WhatsappChannel::new(WhatsappConfig::default());
        match unconfigured.health_check().await.unwrap() {
            HealthStatus::Unhealthy(reason) => {
                assert!(reason.contains("access_token"));
                assert!(reason.contains("phone_number_id"));
            }
            other => panic!("expected unhealthy, got {other:?}"),
        }
    }
}
