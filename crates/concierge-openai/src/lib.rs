// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI-compatible collaborator adapters for the Concierge gateway.
//!
//! - [`OpenAiResponder`]: chat-completions replies, optionally grounded in
//!   a document index
//! - [`OpenAiSpeech`]: voice-note transcription
//! - [`OpenAiVision`]: image description with visible-text extraction

pub mod client;
pub mod media;
pub mod search;
pub mod types;

use async_trait::async_trait;
use tracing::{debug, info};

use concierge_config::model::{ResponderConfig, SearchConfig};
use concierge_core::traits::{PluginAdapter, ResponderAdapter};
use concierge_core::types::{AdapterType, ChannelKind, HealthStatus, HistoryTurn};
use concierge_core::ConciergeError;
use concierge_intent::PhraseDetector;

use crate::client::{OpenAiClient, Surface};
use crate::search::{DocumentSearch, build_context};
use crate::types::{ChatMessage, ChatRequest};

pub use media::{OpenAiSpeech, OpenAiVision};

/// AI responder backed by a chat-completions endpoint.
pub struct OpenAiResponder {
    client: OpenAiClient,
    config: ResponderConfig,
    search: Option<DocumentSearch>,
    indicators: PhraseDetector,
}

impl OpenAiResponder {
    /// Creates the responder.
    ///
    /// `escalation_indicators` are the phrases that, found in a reply, mark
    /// it as a suggestion to hand off to a human.
    pub fn new(
        config: ResponderConfig,
        search: Option<SearchConfig>,
        escalation_indicators: &[String],
    ) -> Result<Self, ConciergeError> {
        let client = OpenAiClient::new(&config.base_url, config.api_key.as_deref())?;
        if search.is_some() {
            info!("document search enabled for AI replies");
        }
        Ok(Self {
            client,
            config,
            search: search.map(DocumentSearch::new),
            indicators: PhraseDetector::new(escalation_indicators),
        })
    }

    /// Replaces the HTTP client, e.g. one with a short retry delay.
    pub fn with_client(mut self, client: OpenAiClient) -> Self {
        self.client = client;
        self
    }

    async fn system_prompt(&self, text: &str, channel: ChannelKind) -> String {
        let mut prompt = self.config.system_prompt.clone();
        if let Some(search) = &self.search {
            let docs = search.search(text).await;
            debug!(found = docs.len(), "documents retrieved for prompt");
            prompt.push('\n');
            prompt.push_str(&build_context(&docs));
        }
        prompt.push_str(&format!("\n\nCanal: {}", channel_label(channel)));
        prompt
    }
}

fn channel_label(channel: ChannelKind) -> &'static str {
    match channel {
        ChannelKind::Whatsapp => "WhatsApp",
        ChannelKind::Teams => "Microsoft Teams",
        ChannelKind::Test => "prueba",
    }
}

#[async_trait]
impl PluginAdapter for OpenAiResponder {
    fn name(&self) -> &str {
        "openai"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Responder
    }

    async fn health_check(&self) -> Result<HealthStatus, ConciergeError> {
        if self.config.api_key.as_deref().is_some_and(|k| !k.is_empty()) {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Degraded(
                "responder.api_key not configured".to_string(),
            ))
        }
    }

    async fn shutdown(&self) -> Result<(), ConciergeError> {
        debug!("openai responder shutting down");
        Ok(())
    }
}

#[async_trait]
impl ResponderAdapter for OpenAiResponder {
    fn supports_document_search(&self) -> bool {
        self.search.is_some()
    }

    async fn generate_reply(
        &self,
        text: &str,
        history: &[HistoryTurn],
        channel: ChannelKind,
    ) -> Result<String, ConciergeError> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(self.system_prompt(text, channel).await));
        messages.extend(
            history
                .iter()
                .map(|turn| ChatMessage::text(&turn.role.to_string(), turn.content.clone())),
        );
        messages.push(ChatMessage::user(text));

        let request = ChatRequest {
            model: self.config.model.clone(),
            messages,
            max_tokens: self.config.max_tokens,
            temperature: Some(self.config.temperature),
        };
        debug!(messages = request.messages.len(), "requesting AI reply");

        let response = self.client.chat(&request, Surface::Responder).await?;
        let reply = response
            .first_text()
            .ok_or_else(|| Surface::Responder.error("responder returned an empty completion", None))?
            .trim()
            .to_string();
        debug!(chars = reply.chars().count(), "AI reply generated");
        Ok(reply)
    }

    fn should_escalate(&self, reply: &str) -> bool {
        self.indicators.matches(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn config(base_url: &str) -> ResponderConfig {
        ResponderConfig {
            base_url: base_url.to_string(),
            api_key: Some("sk-test".into()),
            system_prompt: "Eres un asistente.".into(),
            ..Default::default()
        }
    }

    fn completion(text: &str) -> serde_json::Value {
        serde_json::json!({"choices": [{"message": {"role": "assistant", "content": text}}]})
    }

    fn responder(server: &MockServer, search: Option<SearchConfig>) -> OpenAiResponder {
        OpenAiResponder::new(
            config(&format!("{}/v1", server.uri())),
            search,
            &["no tengo esa informacion".to_string()],
        )
        .unwrap()
    }

    fn last_chat_body(requests: &[Request]) -> serde_json::Value {
        let req = requests
            .iter()
            .rev()
            .find(|r| r.url.path().ends_with("/chat/completions"))
            .unwrap();
        serde_json::from_slice(&req.body).unwrap()
    }

    #[tokio::test]
    async fn reply_includes_history_and_user_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(serde_json::json!({"max_tokens": 400})))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("  Claro.  ")))
            .mount(&server)
            .await;

        let history = vec![HistoryTurn::user("hola"), HistoryTurn::assistant("buenas")];
        let reply = responder(&server, None)
            .generate_reply("que hacen?", &history, ChannelKind::Whatsapp)
            .await
            .unwrap();
        assert_eq!(reply, "Claro.");

        let body = last_chat_body(&server.received_requests().await.unwrap());
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], "system");
        assert!(messages[0]["content"].as_str().unwrap().contains("WhatsApp"));
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[2]["role"], "assistant");
        assert_eq!(messages[3]["content"], "que hacen?");
    }

    #[tokio::test]
    async fn empty_completion_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})))
            .mount(&server)
            .await;

        let err = responder(&server, None)
            .generate_reply("x", &[], ChannelKind::Test)
            .await
            .unwrap_err();
        assert!(matches!(err, ConciergeError::Responder { .. }));
    }

    #[tokio::test]
    async fn search_documents_are_added_to_system_prompt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/indexes/kb/docs/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": [{"title": "Horario", "content": "Lunes a viernes"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("ok")))
            .mount(&server)
            .await;

        let search = SearchConfig {
            endpoint: server.uri(),
            index: "kb".into(),
            api_key: None,
            top: 3,
        };
        let responder = responder(&server, Some(search));
        assert!(responder.supports_document_search());
        responder
            .generate_reply("horario?", &[], ChannelKind::Teams)
            .await
            .unwrap();

        let body = last_chat_body(&server.received_requests().await.unwrap());
        let system = body["messages"][0]["content"].as_str().unwrap();
        assert!(system.contains("Lunes a viernes"));
        assert!(system.contains("Microsoft Teams"));
    }

    #[tokio::test]
    async fn server_error_propagates_after_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        let base = format!("{}/v1", server.uri());
        let responder = responder(&server, None).with_client(
            OpenAiClient::new(&base, Some("sk-test"))
                .unwrap()
                .with_retry_delay(Duration::from_millis(1)),
        );
        assert!(responder.generate_reply("x", &[], ChannelKind::Test).await.is_err());
    }

    #[tokio::test]
    async fn escalation_indicators_are_case_insensitive() {
        let server = MockServer::start().await;
        let responder = responder(&server, None);
        assert!(!responder.supports_document_search());
        assert!(responder.should_escalate("Lo siento, NO TENGO ESA INFORMACION."));
        assert!(!responder.should_escalate("Con gusto le ayudo."));
    }

    #[tokio::test]
    async fn missing_api_key_is_degraded() {
        let responder = OpenAiResponder::new(ResponderConfig::default(), None, &[]).unwrap();
        assert!(matches!(
            responder.health_check().await.unwrap(),
            HealthStatus::Degraded(_)
        ));
    }
}
