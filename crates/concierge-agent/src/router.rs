// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The message router: one inbound unit in, at most one reply out.
//!
//! Stages run in a fixed order and the first one that answers stops the
//! pipeline:
//!
//! 1. escalation hold (only a return-to-bot phrase gets through)
//! 2. preprocessing of audio and images
//! 3. FAQ lookup
//! 4. handoff intent
//! 5. AI responder, which may also open an advisory escalation
//!
//! State is committed before the reply is sent. Any error is contained
//! here: it is logged, recorded in the activity trail, and answered with
//! the fallback reply.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use concierge_config::model::{ConciergeConfig, RepliesConfig};
use concierge_core::traits::{
    ChannelAdapter, ResponderAdapter, SpeechAdapter, StorageAdapter, VisionAdapter,
};
use concierge_core::types::{InboundKind, InboundUnit, ResolvedBy};
use concierge_core::ConciergeError;
use concierge_intent::{FaqMatcher, PhraseDetector};

use crate::activity::ActivityRecorder;
use crate::channel_mux::ChannelMux;
use crate::clock::BusinessClock;
use crate::conversation::{ConversationLog, LogLimits, Participant};
use crate::deadline::within;
use crate::escalation::EscalationStore;
use crate::mask_user;
use crate::metrics;
use crate::preprocess::{NormalizedInput, Preprocessed, Preprocessor};

/// What the router did with an inbound unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The user is escalated; the hold notice was sent.
    Held,
    /// The user returned to the bot and the escalation was resolved.
    Resumed,
    Faq { category: String },
    /// The user asked for a human; an escalation was opened.
    HandedOff,
    /// The responder answered; `escalated` when it also suggested a human.
    Answered { escalated: bool },
    AudioNotUnderstood,
    MediaUnavailable,
    Unsupported,
    /// The pipeline failed and the fallback reply was attempted.
    Failed,
}

impl RouteOutcome {
    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            RouteOutcome::Held => "held",
            RouteOutcome::Resumed => "resumed",
            RouteOutcome::Faq { .. } => "faq",
            RouteOutcome::HandedOff => "handed_off",
            RouteOutcome::Answered { escalated: false } => "answered",
            RouteOutcome::Answered { escalated: true } => "answered_escalated",
            RouteOutcome::AudioNotUnderstood => "audio_not_understood",
            RouteOutcome::MediaUnavailable => "media_unavailable",
            RouteOutcome::Unsupported => "unsupported",
            RouteOutcome::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RouteOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// External collaborators the router talks to.
pub struct Collaborators {
    pub storage: Arc<dyn StorageAdapter + Send + Sync>,
    pub channels: Arc<ChannelMux>,
    pub responder: Arc<dyn ResponderAdapter + Send + Sync>,
    pub speech: Arc<dyn SpeechAdapter + Send + Sync>,
    pub vision: Arc<dyn VisionAdapter + Send + Sync>,
}

pub struct MessageRouter {
    channels: Arc<ChannelMux>,
    responder: Arc<dyn ResponderAdapter + Send + Sync>,
    preprocessor: Preprocessor,
    log: ConversationLog,
    escalations: EscalationStore,
    activity: ActivityRecorder,
    faq: FaqMatcher,
    handoff: PhraseDetector,
    resume: PhraseDetector,
    replies: RepliesConfig,
    responder_timeout: Duration,
    channel_timeout: Duration,
}

impl MessageRouter {
    pub fn new(config: &ConciergeConfig, collaborators: Collaborators) -> Self {
        let Collaborators {
            storage,
            channels,
            responder,
            speech,
            vision,
        } = collaborators;
        let routing = &config.routing;
        let clock = BusinessClock::new(routing.utc_offset_minutes);

        Self {
            channels,
            responder,
            preprocessor: Preprocessor::new(
                speech,
                vision,
                config.replies.clone(),
                &config.timeouts,
            ),
            log: ConversationLog::new(
                storage.clone(),
                clock,
                LogLimits {
                    history_window: routing.history_window,
                    excerpt_turns: routing.excerpt_turns,
                    max_content_chars: routing.max_content_chars,
                },
            ),
            escalations: EscalationStore::new(storage.clone()),
            activity: ActivityRecorder::new(storage, config.activity.max_entries),
            faq: FaqMatcher::from_categories(&routing.faq),
            handoff: PhraseDetector::new(&routing.handoff_phrases),
            resume: PhraseDetector::new(&routing.resume_phrases),
            replies: config.replies.clone(),
            responder_timeout: Duration::from_secs(config.timeouts.responder_secs),
            channel_timeout: Duration::from_secs(config.timeouts.channel_secs),
        }
    }

    pub fn escalations(&self) -> &EscalationStore {
        &self.escalations
    }

    pub fn conversation_log(&self) -> &ConversationLog {
        &self.log
    }

    pub fn activity(&self) -> &ActivityRecorder {
        &self.activity
    }

    pub fn channels(&self) -> &Arc<ChannelMux> {
        &self.channels
    }

    /// Route one inbound unit. Never fails; see [`RouteOutcome::Failed`].
    pub async fn route(&self, unit: InboundUnit) -> RouteOutcome {
        let started = Instant::now();
        let outcome = match self.route_inner(&unit).await {
            Ok(outcome) => outcome,
            Err(e) => self.fail(&unit, e).await,
        };

        metrics::message(&unit.channel.to_string(), outcome.label());
        info!(
            user = %mask_user(&unit.user_id),
            channel = %unit.channel,
            kind = unit.kind.label(),
            outcome = %outcome,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "inbound unit routed"
        );
        outcome
    }

    async fn route_inner(&self, unit: &InboundUnit) -> Result<RouteOutcome, ConciergeError> {
        let channel = self.channels.get(unit.channel)?;
        self.mark_read(unit, channel.as_ref()).await;

        if self.escalations.is_active(&unit.user_id).await? {
            return self.held(unit, channel.as_ref()).await;
        }

        let input = match self.preprocessor.normalize(unit, channel.as_ref()).await? {
            Preprocessed::Ready(input) => input,
            Preprocessed::Early { reply, outcome } => {
                self.deliver(channel.as_ref(), &unit.user_id, &reply).await?;
                return Ok(outcome);
            }
        };

        let who = Participant {
            user_id: &unit.user_id,
            channel: unit.channel,
            display_name: unit.display_name.as_deref(),
        };

        if !input.ai_only {
            if let Some(hit) = self.faq.lookup(&input.routed_text) {
                debug!(category = hit.category, "faq match");
                self.log
                    .record_exchange(who, &input.logged_user, hit.reply)
                    .await?;
                let reply = format!("{}{}", input.reply_prefix, hit.reply);
                self.deliver(channel.as_ref(), &unit.user_id, &reply).await?;
                self.activity
                    .conversation(&unit.user_id, unit.channel, input.modality, &input.summary)
                    .await;
                return Ok(RouteOutcome::Faq {
                    category: hit.category.to_string(),
                });
            }

            if self.handoff.matches(&input.routed_text) {
                return self.hand_off(who, &input, channel.as_ref()).await;
            }
        }

        self.answer(who, &input, channel.as_ref()).await
    }

    /// The user is on hold: release on a return-to-bot phrase, otherwise repeat the notice.
    async fn held(
        &self,
        unit: &InboundUnit,
        channel: &(dyn ChannelAdapter + Send + Sync),
    ) -> Result<RouteOutcome, ConciergeError> {
        let wants_bot = match &unit.kind {
            InboundKind::Text { body } => self.resume.matches(body),
            _ => false,
        };

        if wants_bot && self.escalations.resolve(&unit.user_id, &ResolvedBy::User).await? {
            self.activity.user_resumed(&unit.user_id).await;
            self.deliver(channel, &unit.user_id, &self.replies.resume_ack)
                .await?;
            return Ok(RouteOutcome::Resumed);
        }

        self.deliver(channel, &unit.user_id, &self.replies.hold_notice)
            .await?;
        Ok(RouteOutcome::Held)
    }

    async fn hand_off(
        &self,
        who: Participant<'_>,
        input: &NormalizedInput,
        channel: &(dyn ChannelAdapter + Send + Sync),
    ) -> Result<RouteOutcome, ConciergeError> {
        let excerpt = self.log.excerpt(who.user_id).await?;
        self.log
            .record_exchange(who, &input.logged_user, &self.replies.handoff_notice)
            .await?;
        self.escalations
            .open(who.user_id, &input.summary, &excerpt)
            .await?;
        metrics::escalation("handoff");
        self.activity.escalation_requested(who.user_id).await;
        self.deliver(channel, who.user_id, &self.replies.handoff_notice)
            .await?;
        Ok(RouteOutcome::HandedOff)
    }

    async fn answer(
        &self,
        who: Participant<'_>,
        input: &NormalizedInput,
        channel: &(dyn ChannelAdapter + Send + Sync),
    ) -> Result<RouteOutcome, ConciergeError> {
        let history = self.log.history(who.user_id).await?;

        let started = Instant::now();
        let mut reply = within(
            "responder",
            self.responder_timeout,
            self.responder
                .generate_reply(&input.routed_text, &history, who.channel),
        )
        .await?;
        metrics::responder_latency(started.elapsed().as_secs_f64());

        let escalated = self.responder.should_escalate(&reply);
        if escalated {
            reply.push_str(&self.replies.escalation_invite);
        }

        self.log
            .record_answer(who, &input.logged_user, &input.history_user, &reply)
            .await?;

        // Hold only once the exchange that announces it is on record.
        if escalated {
            let excerpt = self.log.excerpt_of(&history);
            self.escalations
                .open(who.user_id, &input.summary, &excerpt)
                .await?;
            metrics::escalation("responder");
            self.activity.escalation_suggested(who.user_id).await;
        }

        let outbound = format!("{}{reply}", input.reply_prefix);
        self.deliver(channel, who.user_id, &outbound).await?;
        self.activity
            .conversation(who.user_id, who.channel, input.modality, &input.summary)
            .await;
        Ok(RouteOutcome::Answered { escalated })
    }

    async fn deliver(
        &self,
        channel: &(dyn ChannelAdapter + Send + Sync),
        user_id: &str,
        text: &str,
    ) -> Result<(), ConciergeError> {
        within("channel send", self.channel_timeout, channel.send(user_id, text)).await
    }

    /// Read receipts are best-effort.
    async fn mark_read(&self, unit: &InboundUnit, channel: &(dyn ChannelAdapter + Send + Sync)) {
        let Some(message_ref) = unit.message_ref.as_deref() else {
            return;
        };
        if let Err(e) = within(
            "mark read",
            self.channel_timeout,
            channel.mark_read(message_ref),
        )
        .await
        {
            debug!(error = %e, "mark_read failed");
        }
    }

    async fn fail(&self, unit: &InboundUnit, e: ConciergeError) -> RouteOutcome {
        let collaborator = match &e {
            ConciergeError::Timeout { operation, .. } => timeout_collaborator(operation),
            other => other.collaborator(),
        };
        error!(
            user = %mask_user(&unit.user_id),
            channel = %unit.channel,
            collaborator,
            error = %e,
            "routing failed, sending fallback"
        );
        metrics::external_failure(collaborator);
        self.activity
            .routing_failed(&unit.user_id, collaborator, &e.to_string())
            .await;

        match self.channels.get(unit.channel) {
            Ok(channel) => {
                if let Err(send_err) = self
                    .deliver(channel.as_ref(), &unit.user_id, &self.replies.fallback)
                    .await
                {
                    warn!(error = %send_err, "fallback reply could not be delivered");
                }
            }
            Err(lookup_err) => warn!(error = %lookup_err, "no channel for fallback reply"),
        }
        RouteOutcome::Failed
    }
}

fn timeout_collaborator(operation: &str) -> &'static str {
    match operation {
        "responder" => "responder",
        "image analysis" => "vision",
        "transcription" => "speech",
        _ => "channel",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concierge_config::model::StorageConfig;
    use concierge_core::types::{ChannelKind, MediaPayload, Role};
    use concierge_storage::SqliteStorage;
    use concierge_test_utils::{MockChannel, MockResponder, MockSpeech, MockVision};

    struct Fixture {
        router: MessageRouter,
        channel: Arc<MockChannel>,
        responder: Arc<MockResponder>,
        storage: Arc<SqliteStorage>,
        _dir: tempfile::TempDir,
    }

    async fn fixture(responder: MockResponder) -> Fixture {
        fixture_with(responder, MockSpeech::new(), ConciergeConfig::default()).await
    }

    async fn fixture_with(
        responder: MockResponder,
        speech: MockSpeech,
        config: ConciergeConfig,
    ) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(SqliteStorage::new(StorageConfig {
            database_path: dir.path().join("test.db").to_string_lossy().into_owned(),
            wal_mode: true,
        }));
        storage.initialize().await.unwrap();
        let channel = Arc::new(MockChannel::new(ChannelKind::Test));
        let responder = Arc::new(responder);
        let router = MessageRouter::new(
            &config,
            Collaborators {
                storage: storage.clone(),
                channels: Arc::new(ChannelMux::new().with(channel.clone())),
                responder: responder.clone(),
                speech: Arc::new(speech),
                vision: Arc::new(MockVision::new()),
            },
        );
        Fixture {
            router,
            channel,
            responder,
            storage,
            _dir: dir,
        }
    }

    fn text(user: &str, body: &str) -> InboundUnit {
        InboundUnit::text(user, ChannelKind::Test, body)
    }

    async fn today_turns(f: &Fixture, user: &str) -> Vec<(Role, String)> {
        f.storage
            .get_conversation(user, &BusinessClock::utc().today())
            .await
            .unwrap()
            .map(|c| c.messages.into_iter().map(|m| (m.role, m.content)).collect())
            .unwrap_or_default()
    }

    #[test]
    fn outcome_labels_are_distinct() {
        let labels = [
            RouteOutcome::Held,
            RouteOutcome::Resumed,
            RouteOutcome::Faq {
                category: "horario".into(),
            },
            RouteOutcome::HandedOff,
            RouteOutcome::Answered { escalated: false },
            RouteOutcome::Answered { escalated: true },
            RouteOutcome::AudioNotUnderstood,
            RouteOutcome::MediaUnavailable,
            RouteOutcome::Unsupported,
            RouteOutcome::Failed,
        ]
        .map(|o| o.label());
        let unique: std::collections::HashSet<_> = labels.iter().collect();
        assert_eq!(unique.len(), labels.len());
    }

    #[tokio::test]
    async fn faq_hit_never_calls_responder() {
        let f = fixture(MockResponder::new()).await;
        let outcome = f.router.route(text("u1", "cual es su horario?")).await;

        assert_eq!(
            outcome,
            RouteOutcome::Faq {
                category: "horario".to_string()
            }
        );
        assert_eq!(f.responder.calls().await, 0);
        let sent = f.channel.sent_to("u1").await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("Lunes a Viernes"));
        assert_eq!(today_turns(&f, "u1").await.len(), 2);
    }

    #[tokio::test]
    async fn handoff_opens_escalation_and_sends_notice() {
        let f = fixture(MockResponder::new()).await;
        let outcome = f
            .router
            .route(text("u1", "quiero hablar con un agente humano"))
            .await;

        assert_eq!(outcome, RouteOutcome::HandedOff);
        assert_eq!(f.responder.calls().await, 0);
        let esc = f.storage.active_escalation("u1").await.unwrap().unwrap();
        assert_eq!(esc.last_message, "quiero hablar con un agente humano");
        assert_eq!(
            f.channel.sent_to("u1").await,
            vec![RepliesConfig::default().handoff_notice]
        );
    }

    #[tokio::test]
    async fn held_user_gets_notice_for_everything_but_resume() {
        let f = fixture(MockResponder::new()).await;
        f.router.route(text("u1", "quiero un agente humano")).await;

        for body in ["cual es su horario", "quiero un agente humano", "hola"] {
            assert_eq!(f.router.route(text("u1", body)).await, RouteOutcome::Held);
        }
        assert_eq!(f.responder.calls().await, 0);
        assert_eq!(f.storage.list_escalations(true).await.unwrap().len(), 1);

        assert_eq!(
            f.router.route(text("u1", "quiero volver al bot")).await,
            RouteOutcome::Resumed
        );
        assert!(f.storage.active_escalation("u1").await.unwrap().is_none());
        let sent = f.channel.sent_to("u1").await;
        assert_eq!(sent.last(), Some(&RepliesConfig::default().resume_ack));
    }

    #[tokio::test]
    async fn held_image_gets_hold_notice_without_download() {
        let f = fixture(MockResponder::new()).await;
        f.router.route(text("u1", "quiero un agente humano")).await;

        let unit = InboundUnit {
            kind: InboundKind::Image {
                media_ref: "m1".to_string(),
                caption: Some("volver al bot".to_string()),
            },
            ..text("u1", "")
        };
        assert_eq!(f.router.route(unit).await, RouteOutcome::Held);
        assert_eq!(f.channel.download_count().await, 0);
    }

    #[tokio::test]
    async fn failed_log_write_does_not_leave_user_on_hold() {
        let responder = MockResponder::with_replies(vec![
            "Para eso necesita un agente humano.".to_string(),
        ])
        .with_indicators(["agente humano"]);
        let f = fixture(responder).await;
        let db = rusqlite::Connection::open(f._dir.path().join("test.db")).unwrap();
        db.execute_batch(
            "CREATE TRIGGER reject_replies BEFORE INSERT ON conversation_messages
             WHEN NEW.role = 'assistant'
             BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
        )
        .unwrap();

        let outcome = f.router.route(text("u1", "tengo un problema raro")).await;
        assert_eq!(outcome, RouteOutcome::Failed);
        assert!(f.storage.active_escalation("u1").await.unwrap().is_none());
        assert_eq!(
            f.channel.sent_to("u1").await,
            vec![RepliesConfig::default().fallback]
        );
    }

    #[tokio::test]
    async fn responder_escalation_is_advisory() {
        let responder = MockResponder::with_replies(vec![
            "Para eso necesita un agente humano.".to_string(),
        ])
        .with_indicators(["agente humano"]);
        let f = fixture(responder).await;

        let outcome = f.router.route(text("u1", "tengo un problema raro")).await;
        assert_eq!(outcome, RouteOutcome::Answered { escalated: true });

        let sent = f.channel.sent_to("u1").await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with("Para eso necesita un agente humano."));
        assert!(sent[0].ends_with(&RepliesConfig::default().escalation_invite));
        assert!(f.storage.active_escalation("u1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn ai_answer_updates_window_and_log() {
        let f = fixture(MockResponder::with_replies(vec!["primera".into(), "segunda".into()])).await;

        f.router.route(text("u1", "hola")).await;
        f.router.route(text("u1", "otra cosa")).await;

        let seen = f.responder.histories().await;
        assert_eq!(seen[0].len(), 0);
        assert_eq!(seen[1].len(), 2);
        assert_eq!(seen[1][1].content, "primera");
        assert_eq!(today_turns(&f, "u1").await.len(), 4);
    }

    #[tokio::test]
    async fn responder_failure_sends_fallback_and_records_activity() {
        let f = fixture(MockResponder::failing()).await;
        let outcome = f.router.route(text("u1", "hola")).await;

        assert_eq!(outcome, RouteOutcome::Failed);
        assert_eq!(
            f.channel.sent_to("u1").await,
            vec![RepliesConfig::default().fallback]
        );
        let events = f.storage.recent_activities(5).await.unwrap();
        assert!(events.iter().any(|e| e.message == "Error procesando mensaje"));
        assert!(today_turns(&f, "u1").await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn responder_timeout_is_a_failure() {
        let responder = MockResponder::with_replies(vec!["tarde".into()])
            .with_delay(Duration::from_secs(3600));
        let f = fixture(responder).await;
        assert_eq!(f.router.route(text("u1", "hola")).await, RouteOutcome::Failed);
    }

    #[tokio::test]
    async fn send_failure_does_not_crash() {
        let f = fixture(MockResponder::new()).await;
        f.channel.fail_sends(true).await;
        assert_eq!(
            f.router.route(text("u1", "cual es su horario")).await,
            RouteOutcome::Failed
        );
    }

    #[tokio::test]
    async fn audio_transcript_is_echoed_and_logged_with_marker() {
        let f = fixture_with(
            MockResponder::with_replies(vec!["Claro".into()]),
            MockSpeech::with_transcript("necesito ayuda con mi pedido"),
            ConciergeConfig::default(),
        )
        .await;
        f.channel
            .add_media(
                "a1",
                MediaPayload {
                    bytes: vec![0; 4],
                    mime_type: "audio/ogg".to_string(),
                },
            )
            .await;
        let unit = InboundUnit {
            kind: InboundKind::Audio {
                media_ref: "a1".to_string(),
            },
            ..text("u1", "")
        };

        assert_eq!(
            f.router.route(unit).await,
            RouteOutcome::Answered { escalated: false }
        );
        let sent = f.channel.sent_to("u1").await;
        assert_eq!(sent[0], "Escuche: 'necesito ayuda con mi pedido'\n\nClaro");
        let turns = today_turns(&f, "u1").await;
        assert_eq!(turns[0].1, "[Audio]: necesito ayuda con mi pedido");
        assert_eq!(turns[1].1, "Claro");
    }

    #[tokio::test]
    async fn failed_transcription_mutates_nothing() {
        let f = fixture(MockResponder::new()).await;
        f.channel
            .add_media(
                "a1",
                MediaPayload {
                    bytes: vec![0; 4],
                    mime_type: "audio/ogg".to_string(),
                },
            )
            .await;
        let unit = InboundUnit {
            kind: InboundKind::Audio {
                media_ref: "a1".to_string(),
            },
            ..text("u1", "")
        };

        assert_eq!(f.router.route(unit).await, RouteOutcome::AudioNotUnderstood);
        assert!(today_turns(&f, "u1").await.is_empty());
        assert!(f.storage.list_escalations(true).await.unwrap().is_empty());
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn routed_log_line_masks_user() {
        let f = fixture(MockResponder::new()).await;
        f.router.route(text("50688887777", "horario")).await;
        assert!(logs_contain("inbound unit routed"));
        assert!(logs_contain("user=506888***"));
    }

    #[tokio::test]
    async fn mark_read_failure_is_ignored() {
        let f = fixture(MockResponder::new()).await;
        f.channel.fail_mark_read(true).await;
        let unit = InboundUnit {
            message_ref: Some("wamid.9".to_string()),
            ..text("u1", "horario")
        };
        assert!(matches!(f.router.route(unit).await, RouteOutcome::Faq { .. }));
    }

    #[tokio::test]
    async fn content_is_truncated_in_storage() {
        let mut config = ConciergeConfig::default();
        config.routing.max_content_chars = 8;
        let f = fixture_with(
            MockResponder::with_replies(vec!["respuesta larga".into()]),
            MockSpeech::new(),
            config,
        )
        .await;
        f.router.route(text("u1", "mensaje muy largo")).await;
        let turns = today_turns(&f, "u1").await;
        assert_eq!(turns[0].1, "mensaje ");
        assert_eq!(turns[1].1, "respuest");
    }
}
