// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Multi-modal preprocessing.
//!
//! Turns an inbound unit into the text the router works with. Voice notes
//! are transcribed and then routed like text. Images are described and go
//! straight to the responder with a synthetic prompt. Failures that have a
//! dedicated user-facing reply short-circuit here, before any state is
//! touched.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use concierge_config::model::{RepliesConfig, TimeoutsConfig};
use concierge_core::traits::{ChannelAdapter, SpeechAdapter, VisionAdapter};
use concierge_core::types::{ImageAnalysis, InboundKind, InboundUnit};
use concierge_core::ConciergeError;

use crate::deadline::within;
use crate::metrics;
use crate::router::RouteOutcome;

/// Router-ready view of one inbound unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedInput {
    /// Text matched against FAQ and handoff phrases and sent to the responder.
    pub routed_text: String,
    /// Stored as the user turn in the conversation log.
    pub logged_user: String,
    /// Pushed into the history window.
    pub history_user: String,
    /// Short form used for escalation records and activity details.
    pub summary: String,
    /// Prepended to FAQ and responder replies.
    pub reply_prefix: String,
    /// Skip FAQ and handoff matching.
    pub ai_only: bool,
    /// Inbound kind label.
    pub modality: &'static str,
}

/// Outcome of preprocessing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preprocessed {
    Ready(NormalizedInput),
    /// Reply immediately without entering the router.
    Early { reply: String, outcome: RouteOutcome },
}

pub struct Preprocessor {
    speech: Arc<dyn SpeechAdapter + Send + Sync>,
    vision: Arc<dyn VisionAdapter + Send + Sync>,
    replies: RepliesConfig,
    speech_timeout: Duration,
    vision_timeout: Duration,
    channel_timeout: Duration,
}

impl Preprocessor {
    pub fn new(
        speech: Arc<dyn SpeechAdapter + Send + Sync>,
        vision: Arc<dyn VisionAdapter + Send + Sync>,
        replies: RepliesConfig,
        timeouts: &TimeoutsConfig,
    ) -> Self {
        Self {
            speech,
            vision,
            replies,
            speech_timeout: Duration::from_secs(timeouts.speech_secs),
            vision_timeout: Duration::from_secs(timeouts.vision_secs),
            channel_timeout: Duration::from_secs(timeouts.channel_secs),
        }
    }

    /// Normalize `unit`, downloading media through `channel` when needed.
    ///
    /// Only an image-analysis failure is returned as an error; every other
    /// failure maps to a dedicated early reply.
    pub async fn normalize(
        &self,
        unit: &InboundUnit,
        channel: &(dyn ChannelAdapter + Send + Sync),
    ) -> Result<Preprocessed, ConciergeError> {
        match &unit.kind {
            InboundKind::Text { body } => Ok(Preprocessed::Ready(NormalizedInput {
                routed_text: body.clone(),
                logged_user: body.clone(),
                history_user: body.clone(),
                summary: body.clone(),
                reply_prefix: String::new(),
                ai_only: false,
                modality: unit.kind.label(),
            })),
            InboundKind::Audio { media_ref } => Ok(self.audio(media_ref, channel).await),
            InboundKind::Image { media_ref, caption } => {
                self.image(media_ref, caption.as_deref(), channel).await
            }
            InboundKind::Unsupported { kind } => {
                debug!(kind = %kind, "unsupported inbound kind");
                Ok(Preprocessed::Early {
                    reply: self.replies.unsupported.clone(),
                    outcome: RouteOutcome::Unsupported,
                })
            }
        }
    }

    async fn audio(
        &self,
        media_ref: &str,
        channel: &(dyn ChannelAdapter + Send + Sync),
    ) -> Preprocessed {
        let payload = match within(
            "media download",
            self.channel_timeout,
            channel.download_media(media_ref),
        )
        .await
        {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "audio download failed");
                metrics::external_failure("channel");
                return Preprocessed::Early {
                    reply: self.replies.audio_download_failed.clone(),
                    outcome: RouteOutcome::MediaUnavailable,
                };
            }
        };

        let transcript = match within(
            "transcription",
            self.speech_timeout,
            self.speech.transcribe(&payload),
        )
        .await
        {
            Ok(Some(text)) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => String::new(),
            Err(e) => {
                warn!(error = %e, "transcription failed");
                metrics::external_failure("speech");
                String::new()
            }
        };
        if transcript.is_empty() {
            return Preprocessed::Early {
                reply: self.replies.audio_not_understood.clone(),
                outcome: RouteOutcome::AudioNotUnderstood,
            };
        }

        Preprocessed::Ready(NormalizedInput {
            logged_user: format!("{}{transcript}", self.replies.audio_log_prefix),
            history_user: transcript.clone(),
            summary: transcript.clone(),
            reply_prefix: self.replies.audio_echo.replace("{transcript}", &transcript),
            routed_text: transcript,
            ai_only: false,
            modality: "audio",
        })
    }

    async fn image(
        &self,
        media_ref: &str,
        caption: Option<&str>,
        channel: &(dyn ChannelAdapter + Send + Sync),
    ) -> Result<Preprocessed, ConciergeError> {
        let payload = match within(
            "media download",
            self.channel_timeout,
            channel.download_media(media_ref),
        )
        .await
        {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "image download failed");
                metrics::external_failure("channel");
                return Ok(Preprocessed::Early {
                    reply: self.replies.image_download_failed.clone(),
                    outcome: RouteOutcome::MediaUnavailable,
                });
            }
        };

        let analysis = within(
            "image analysis",
            self.vision_timeout,
            self.vision.describe(&payload),
        )
        .await?;

        let caption = caption.map(str::trim).filter(|c| !c.is_empty());
        let routed_text = self.image_prompt(caption, &analysis);
        let marker = self.replies.image_log_marker.clone();
        Ok(Preprocessed::Ready(NormalizedInput {
            routed_text,
            logged_user: marker.clone(),
            history_user: marker.clone(),
            summary: caption.map(str::to_string).unwrap_or(marker),
            reply_prefix: String::new(),
            ai_only: true,
            modality: "image",
        }))
    }

    /// Build the synthetic responder prompt for an image.
    fn image_prompt(&self, caption: Option<&str>, analysis: &ImageAnalysis) -> String {
        let mut prompt = self.replies.image_prompt.clone();
        if let Some(caption) = caption {
            prompt.push_str(&self.replies.image_caption.replace("{caption}", caption));
        }
        let mut described = analysis.description.trim().to_string();
        if let Some(text) = analysis
            .extracted_text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
        {
            described.push_str("\n\nTexto detectado: ");
            described.push_str(text);
        }
        prompt.push_str(&self.replies.image_analysis.replace("{analysis}", &described));
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concierge_core::types::{ChannelKind, MediaPayload};
    use concierge_test_utils::{MockChannel, MockSpeech, MockVision};

    fn preprocessor(speech: MockSpeech, vision: MockVision) -> Preprocessor {
        Preprocessor::new(
            Arc::new(speech),
            Arc::new(vision),
            RepliesConfig::default(),
            &TimeoutsConfig::default(),
        )
    }

    fn audio_unit() -> InboundUnit {
        InboundUnit {
            message_ref: Some("wamid.1".to_string()),
            user_id: "u1".to_string(),
            channel: ChannelKind::Test,
            display_name: None,
            kind: InboundKind::Audio {
                media_ref: "media-1".to_string(),
            },
        }
    }

    fn image_unit(caption: Option<&str>) -> InboundUnit {
        InboundUnit {
            message_ref: None,
            user_id: "u1".to_string(),
            channel: ChannelKind::Test,
            display_name: None,
            kind: InboundKind::Image {
                media_ref: "media-2".to_string(),
                caption: caption.map(str::to_string),
            },
        }
    }

    fn media() -> MediaPayload {
        MediaPayload {
            bytes: vec![1, 2, 3],
            mime_type: "audio/ogg".to_string(),
        }
    }

    #[tokio::test]
    async fn text_passes_through() {
        let pre = preprocessor(MockSpeech::new(), MockVision::new());
        let channel = MockChannel::new(ChannelKind::Test);
        let unit = InboundUnit::text("u1", ChannelKind::Test, "hola");
        let Preprocessed::Ready(input) = pre.normalize(&unit, &channel).await.unwrap() else {
            panic!("text should be ready");
        };
        assert_eq!(input.routed_text, "hola");
        assert_eq!(input.logged_user, "hola");
        assert!(input.reply_prefix.is_empty());
        assert!(!input.ai_only);
    }

    #[tokio::test]
    async fn transcript_is_routed_with_audio_marker() {
        let pre = preprocessor(MockSpeech::with_transcript("cual es el horario"), MockVision::new());
        let channel = MockChannel::new(ChannelKind::Test);
        channel.add_media("media-1", media()).await;

        let Preprocessed::Ready(input) = pre.normalize(&audio_unit(), &channel).await.unwrap() else {
            panic!("audio should be ready");
        };
        assert_eq!(input.routed_text, "cual es el horario");
        assert_eq!(input.logged_user, "[Audio]: cual es el horario");
        assert_eq!(input.reply_prefix, "Escuche: 'cual es el horario'\n\n");
        assert_eq!(input.modality, "audio");
    }

    #[tokio::test]
    async fn empty_transcript_is_not_understood() {
        let pre = preprocessor(MockSpeech::new(), MockVision::new());
        let channel = MockChannel::new(ChannelKind::Test);
        channel.add_media("media-1", media()).await;

        let result = pre.normalize(&audio_unit(), &channel).await.unwrap();
        assert_eq!(
            result,
            Preprocessed::Early {
                reply: RepliesConfig::default().audio_not_understood,
                outcome: RouteOutcome::AudioNotUnderstood,
            }
        );
    }

    #[tokio::test]
    async fn speech_failure_is_not_understood() {
        let pre = preprocessor(MockSpeech::failing(), MockVision::new());
        let channel = MockChannel::new(ChannelKind::Test);
        channel.add_media("media-1", media()).await;

        let result = pre.normalize(&audio_unit(), &channel).await.unwrap();
        assert!(matches!(
            result,
            Preprocessed::Early {
                outcome: RouteOutcome::AudioNotUnderstood,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn missing_media_gets_download_reply() {
        let pre = preprocessor(MockSpeech::with_transcript("x"), MockVision::new());
        let channel = MockChannel::new(ChannelKind::Test);

        let result = pre.normalize(&audio_unit(), &channel).await.unwrap();
        assert_eq!(
            result,
            Preprocessed::Early {
                reply: RepliesConfig::default().audio_download_failed,
                outcome: RouteOutcome::MediaUnavailable,
            }
        );

        let result = pre.normalize(&image_unit(None), &channel).await.unwrap();
        assert_eq!(
            result,
            Preprocessed::Early {
                reply: RepliesConfig::default().image_download_failed,
                outcome: RouteOutcome::MediaUnavailable,
            }
        );
    }

    #[tokio::test]
    async fn image_builds_synthetic_prompt_and_logs_marker() {
        let vision = MockVision::with_analysis(ImageAnalysis {
            description: "Una factura".to_string(),
            extracted_text: Some("Total: 5000".to_string()),
        });
        let pre = preprocessor(MockSpeech::new(), vision);
        let channel = MockChannel::new(ChannelKind::Test);
        channel.add_media("media-2", media()).await;

        let Preprocessed::Ready(input) = pre
            .normalize(&image_unit(Some("que es esto")), &channel)
            .await
            .unwrap()
        else {
            panic!("image should be ready");
        };
        assert!(input.ai_only);
        assert_eq!(input.logged_user, "[User sent an image]");
        assert_eq!(input.summary, "que es esto");
        assert!(input.routed_text.starts_with("El usuario envio una imagen"));
        assert!(input.routed_text.contains("Mensaje del usuario: 'que es esto'"));
        assert!(input.routed_text.contains("Una factura"));
        assert!(input.routed_text.contains("Total: 5000"));
    }

    #[tokio::test]
    async fn image_without_caption_omits_caption_line() {
        let pre = preprocessor(MockSpeech::new(), MockVision::new());
        let channel = MockChannel::new(ChannelKind::Test);
        channel.add_media("media-2", media()).await;

        let Preprocessed::Ready(input) = pre.normalize(&image_unit(None), &channel).await.unwrap()
        else {
            panic!("image should be ready");
        };
        assert!(!input.routed_text.contains("Mensaje del usuario"));
        assert_eq!(input.summary, "[User sent an image]");
    }

    #[tokio::test]
    async fn vision_failure_is_an_error() {
        let pre = preprocessor(MockSpeech::new(), MockVision::failing());
        let channel = MockChannel::new(ChannelKind::Test);
        channel.add_media("media-2", media()).await;
        assert!(pre.normalize(&image_unit(None), &channel).await.is_err());
    }

    #[tokio::test]
    async fn unsupported_kind_gets_static_reply() {
        let pre = preprocessor(MockSpeech::new(), MockVision::new());
        let channel = MockChannel::new(ChannelKind::Test);
        let unit = InboundUnit {
            kind: InboundKind::Unsupported {
                kind: "sticker".to_string(),
            },
            ..InboundUnit::text("u1", ChannelKind::Test, "")
        };
        let result = pre.normalize(&unit, &channel).await.unwrap();
        assert!(matches!(
            result,
            Preprocessed::Early {
                outcome: RouteOutcome::Unsupported,
                ..
            }
        ));
    }
}
