// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Microsoft Teams channel adapter for the Concierge gateway.
//!
//! Implements [`ChannelAdapter`] against the Bot Framework connector API.
//! Bot Framework has no "send to user id" call: replies go to the
//! conversation an activity arrived on, so the adapter remembers one
//! [`ConversationRef`] per user as activities come in through [`server`].
//! Outbound calls authenticate with a client-credentials token that is
//! cached until shortly before it expires.

pub mod activity;
pub mod server;

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use concierge_config::model::TeamsConfig;
use concierge_core::traits::{ChannelAdapter, PluginAdapter};
use concierge_core::types::{AdapterType, ChannelKind, HealthStatus, MediaPayload};
use concierge_core::ConciergeError;

pub use activity::{ConversationRef, TeamsEvent, parse_activity};
pub use server::{TeamsState, router};

/// Tokens are refreshed this long before the issuer says they expire.
const TOKEN_MARGIN: Duration = Duration::from_secs(60);

/// Bot Framework channel.
pub struct TeamsChannel {
    client: reqwest::Client,
    config: TeamsConfig,
    token: Mutex<Option<CachedToken>>,
    conversations: DashMap<String, ConversationRef>,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
}

impl TeamsChannel {
    pub fn new(config: TeamsConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            token: Mutex::new(None),
            conversations: DashMap::new(),
        }
    }

    pub fn app_id(&self) -> &str {
        &self.config.app_id
    }

    pub fn welcome_message(&self) -> Option<&str> {
        self.config
            .welcome_message
            .as_deref()
            .filter(|w| !w.trim().is_empty())
    }

    /// Record where replies for `user_id` should go. Later activities from
    /// the same user replace the earlier reference.
    pub fn remember(&self, user_id: &str, reference: ConversationRef) {
        self.conversations.insert(user_id.to_string(), reference);
    }

    pub fn known_users(&self) -> usize {
        self.conversations.len()
    }

    /// Post a text message into a conversation.
    pub async fn send_to(&self, reference: &ConversationRef, text: &str) -> Result<(), ConciergeError> {
        let url = activities_url(reference)?;
        let token = self.access_token().await?;
        let response = self
            .client
            .post(url)
            .bearer_auth(&token)
            .json(&serde_json::json!({"type": "message", "text": text}))
            .send()
            .await
            .map_err(|e| channel_error("teams send request failed", Some(e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status == reqwest::StatusCode::UNAUTHORIZED {
                self.token.lock().await.take();
            }
            return Err(channel_error(
                &format!("teams send returned {status}: {body}"),
                None,
            ));
        }
        Ok(())
    }

    /// Bearer token for connector calls, fetched on first use and after expiry.
    async fn access_token(&self) -> Result<String, ConciergeError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref()
            && Instant::now() < token.refresh_at
        {
            return Ok(token.value.clone());
        }

        let fresh = self.request_token().await?;
        let value = fresh.value.clone();
        *cached = Some(fresh);
        Ok(value)
    }

    async fn request_token(&self) -> Result<CachedToken, ConciergeError> {
        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.config.login_base_url.trim_end_matches('/'),
            self.config.tenant_id
        );
        let form = serde_urlencoded::to_string([
            ("grant_type", "client_credentials"),
            ("client_id", self.config.app_id.as_str()),
            ("client_secret", self.config.app_password.as_str()),
            ("scope", self.config.scope.as_str()),
        ])
        .map_err(|e| ConciergeError::Internal(format!("teams token form: {e}")))?;

        let response = self
            .client
            .post(&url)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(form)
            .send()
            .await
            .map_err(|e| channel_error("teams token request failed", Some(e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(channel_error(
                &format!("teams token endpoint returned {status}: {body}"),
                None,
            ));
        }

        let payload: TokenResponse = response
            .json()
            .await
            .map_err(|e| channel_error("teams token response is not JSON", Some(e)))?;
        let value = payload
            .access_token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| channel_error("teams token response missing access_token", None))?;
        let lifetime = Duration::from_secs(payload.expires_in.unwrap_or(3600));

        info!(expires_in = lifetime.as_secs(), "teams access token acquired");
        Ok(CachedToken {
            value,
            refresh_at: Instant::now() + lifetime.saturating_sub(TOKEN_MARGIN),
        })
    }
}

fn activities_url(reference: &ConversationRef) -> Result<reqwest::Url, ConciergeError> {
    let invalid = || {
        channel_error(
            &format!("invalid teams service url {}", reference.service_url),
            None,
        )
    };
    let mut url = reqwest::Url::parse(&reference.service_url).map_err(|_| invalid())?;
    url.path_segments_mut()
        .map_err(|()| invalid())?
        .pop_if_empty()
        .extend(["v3", "conversations", reference.conversation_id.as_str(), "activities"]);
    Ok(url)
}

fn channel_error(message: &str, source: Option<reqwest::Error>) -> ConciergeError {
    ConciergeError::Channel {
        message: message.to_string(),
        source: source.map(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
    }
}

#[async_trait]
impl PluginAdapter for TeamsChannel {
    fn name(&self) -> &str {
        "teams"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, ConciergeError> {
        if self.config.app_id.trim().is_empty() || self.config.app_password.trim().is_empty() {
            Ok(HealthStatus::Unhealthy("missing teams credentials".into()))
        } else {
            Ok(HealthStatus::Healthy)
        }
    }

    async fn shutdown(&self) -> Result<(), ConciergeError> {
        debug!(conversations = self.conversations.len(), "teams channel shutting down");
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for TeamsChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Teams
    }

    async fn send(&self, user_id: &str, text: &str) -> Result<(), ConciergeError> {
        let reference = self
            .conversations
            .get(user_id)
            .map(|r| r.value().clone())
            .ok_or_else(|| {
                channel_error(&format!("no teams conversation known for {user_id}"), None)
            })?;
        self.send_to(&reference, text).await?;
        debug!(to = %user_id, chars = text.chars().count(), "teams message sent");
        Ok(())
    }

    async fn download_media(&self, media_ref: &str) -> Result<MediaPayload, ConciergeError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(media_ref)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| channel_error("teams attachment download failed", Some(e)))?
            .error_for_status()
            .map_err(|e| channel_error("teams attachment download rejected", Some(e)))?;

        let declared = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or_default().trim().to_string())
            .filter(|v| v.starts_with("image/") || v.starts_with("audio/"));

        let bytes = response
            .bytes()
            .await
            .map_err(|e| channel_error("teams attachment body unreadable", Some(e)))?;
        if bytes.is_empty() {
            return Err(channel_error("teams attachment is empty", None));
        }

        let mime_type = match declared {
            Some(mime) => mime,
            None => {
                let sniffed = activity::sniff_image_type(&bytes);
                warn!(mime_type = sniffed, "teams attachment without media type, sniffed");
                sniffed.to_string()
            }
        };
        debug!(bytes = bytes.len(), mime_type = %mime_type, "teams attachment downloaded");
        Ok(MediaPayload {
            bytes: bytes.to_vec(),
            mime_type,
        })
    }

    async fn mark_read(&self, _message_ref: &str) -> Result<(), ConciergeError> {
        // Bot Framework has no read receipts.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn channel(server: &MockServer) -> TeamsChannel {
        let mut config = TeamsConfig::new("app-1", "s3cret");
        config.login_base_url = server.uri();
        TeamsChannel::new(config)
    }

    fn reference(server: &MockServer) -> ConversationRef {
        ConversationRef {
            service_url: format!("{}/amer/", server.uri()),
            conversation_id: "a:1xyz".into(),
        }
    }

    async fn mount_token(server: &MockServer, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/botframework.com/oauth2/v2.0/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("client_id=app-1"))
            .and(body_string_contains("client_secret=s3cret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token_type": "Bearer",
                "expires_in": 3600,
                "access_token": "bf-token",
            })))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    #[test]
    fn activities_url_appends_conversation_path() {
        let url = activities_url(&ConversationRef {
            service_url: "https://smba.trafficmanager.net/amer/".into(),
            conversation_id: "a:1xyz".into(),
        })
        .unwrap();
        assert_eq!(
            url.as_str(),
            "https://smba.trafficmanager.net/amer/v3/conversations/a:1xyz/activities"
        );
    }

    #[test]
    fn bad_service_url_is_channel_error() {
        let err = activities_url(&ConversationRef {
            service_url: "not a url".into(),
            conversation_id: "a:1".into(),
        })
        .unwrap_err();
        assert!(matches!(err, ConciergeError::Channel { .. }));
    }

    #[tokio::test]
    async fn send_posts_to_remembered_conversation_with_cached_token() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/amer/v3/conversations/a:1xyz/activities"))
            .and(header("authorization", "Bearer bf-token"))
            .and(body_json(serde_json::json!({"type": "message", "text": "hola"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": "1"})))
            .expect(2)
            .mount(&server)
            .await;

        let channel = channel(&server);
        channel.remember("29:1abc", reference(&server));
        channel.send("29:1abc", "hola").await.unwrap();
        channel.send("29:1abc", "hola").await.unwrap();
    }

    #[tokio::test]
    async fn send_to_unknown_user_fails_without_request() {
        let server = MockServer::start().await;
        mount_token(&server, 0).await;

        let err = channel(&server).send("29:nobody", "hola").await.unwrap_err();
        assert!(matches!(err, ConciergeError::Channel { .. }));
        assert!(err.to_string().contains("29:nobody"));
    }

    #[tokio::test]
    async fn rejected_token_request_is_channel_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botframework.com/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_client"))
            .mount(&server)
            .await;

        let channel = channel(&server);
        channel.remember("29:1abc", reference(&server));
        let err = channel.send("29:1abc", "hola").await.unwrap_err();
        assert!(err.to_string().contains("400"));
    }

    #[tokio::test]
    async fn unauthorized_send_drops_cached_token() {
        let server = MockServer::start().await;
        mount_token(&server, 2).await;
        Mock::given(method("POST"))
            .and(path("/amer/v3/conversations/a:1xyz/activities"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let channel = channel(&server);
        channel.remember("29:1abc", reference(&server));
        assert!(channel.send("29:1abc", "hola").await.is_err());
        assert!(channel.send("29:1abc", "hola").await.is_err());
    }

    #[tokio::test]
    async fn download_uses_declared_media_type() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("GET"))
            .and(path("/attachments/1"))
            .and(header("authorization", "Bearer bf-token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(vec![1u8, 2, 3]),
            )
            .mount(&server)
            .await;

        let media = channel(&server)
            .download_media(&format!("{}/attachments/1", server.uri()))
            .await
            .unwrap();
        assert_eq!(media.bytes, vec![1, 2, 3]);
        assert_eq!(media.mime_type, "image/png");
    }

    #[tokio::test]
    async fn download_sniffs_generic_content_type() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("GET"))
            .and(path("/attachments/2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/octet-stream")
                    .set_body_bytes(b"GIF89a....".to_vec()),
            )
            .mount(&server)
            .await;

        let media = channel(&server)
            .download_media(&format!("{}/attachments/2", server.uri()))
            .await
            .unwrap();
        assert_eq!(media.mime_type, "image/gif");
    }

    #[tokio::test]
    async fn empty_attachment_is_an_error() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("GET"))
            .and(path("/attachments/3"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let err = channel(&server)
            .download_media(&format!("{}/attachments/3", server.uri()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[tokio::test]
    async fn mark_read_is_a_no_op() {
        let server = MockServer::start().await;
        mount_token(&server, 0).await;
        channel(&server).mark_read("1700000000000").await.unwrap();
    }

    #[tokio::test]
    async fn blank_credentials_report_unhealthy() {
        let channel = TeamsChannel::new(TeamsConfig::new("app-1", " "));
        assert!(matches!(
            channel.health_check().await.unwrap(),
            HealthStatus::Unhealthy(_)
        ));
        assert_eq!(channel.kind(), ChannelKind::Teams);
    }
}
