// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bot Framework activity parsing.
//!
//! Teams posts one activity per request. `message` activities become
//! [`InboundUnit`]s; `conversationUpdate` activities that add someone other
//! than the bot are surfaced so the endpoint can greet them. Everything else
//! (typing, reactions, installation updates) is acknowledged and dropped.

use serde_json::Value;
use tracing::debug;

use concierge_core::types::{ChannelKind, InboundKind, InboundUnit};

const FILE_DOWNLOAD_INFO: &str = "application/vnd.microsoft.teams.file.download.info";
const IMAGE_EXTENSIONS: [&str; 5] = [".jpg", ".jpeg", ".png", ".gif", ".webp"];

/// Where replies for a conversation are posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationRef {
    pub service_url: String,
    pub conversation_id: String,
}

/// What an incoming activity asks of the gateway.
#[derive(Debug, Clone, PartialEq)]
pub enum TeamsEvent {
    Message {
        unit: InboundUnit,
        reference: ConversationRef,
    },
    /// Someone other than the bot joined the conversation.
    MembersAdded {
        reference: ConversationRef,
        members: Vec<String>,
    },
    Ignored,
}

/// Classify one activity payload.
pub fn parse_activity(activity: &Value) -> TeamsEvent {
    let kind = str_at(activity, &["type"]).unwrap_or_default();
    let Some(reference) = conversation_ref(activity) else {
        debug!(kind, "activity without service url or conversation ignored");
        return TeamsEvent::Ignored;
    };

    match kind {
        "message" => {
            let Some(user_id) = str_at(activity, &["from", "id"]).filter(|id| !id.is_empty()) else {
                debug!("message activity without sender ignored");
                return TeamsEvent::Ignored;
            };
            TeamsEvent::Message {
                unit: InboundUnit {
                    message_ref: str_at(activity, &["id"]).map(str::to_string),
                    user_id: user_id.to_string(),
                    channel: ChannelKind::Teams,
                    display_name: str_at(activity, &["from", "name"])
                        .filter(|n| !n.trim().is_empty())
                        .map(str::to_string),
                    kind: classify(activity),
                },
                reference,
            }
        }
        "conversationUpdate" => {
            let bot = str_at(activity, &["recipient", "id"]);
            let members: Vec<String> = activity
                .get("membersAdded")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(|m| m.get("id").and_then(Value::as_str))
                .filter(|id| Some(*id) != bot)
                .map(str::to_string)
                .collect();
            if members.is_empty() {
                TeamsEvent::Ignored
            } else {
                TeamsEvent::MembersAdded { reference, members }
            }
        }
        _ => TeamsEvent::Ignored,
    }
}

fn str_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(value, |v, key| v.get(key))
        .and_then(Value::as_str)
}

fn conversation_ref(activity: &Value) -> Option<ConversationRef> {
    Some(ConversationRef {
        service_url: str_at(activity, &["serviceUrl"])?.to_string(),
        conversation_id: str_at(activity, &["conversation", "id"])?.to_string(),
    })
}

fn classify(activity: &Value) -> InboundKind {
    let text = str_at(activity, &["text"])
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);
    let attachments: &[Value] = activity
        .get("attachments")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    if let Some(media_ref) = attachments.iter().find_map(image_url) {
        return InboundKind::Image {
            media_ref,
            caption: text,
        };
    }
    if text.is_none()
        && let Some(media_ref) = attachments.iter().find_map(audio_url)
    {
        return InboundKind::Audio { media_ref };
    }
    if let Some(body) = text {
        return InboundKind::Text { body };
    }

    let kind = attachments
        .first()
        .and_then(|a| a.get("contentType"))
        .and_then(Value::as_str)
        .unwrap_or("message");
    InboundKind::Unsupported {
        kind: kind.to_string(),
    }
}

fn has_image_name(attachment: &Value) -> bool {
    str_at(attachment, &["name"])
        .map(str::to_lowercase)
        .is_some_and(|name| IMAGE_EXTENSIONS.iter().any(|ext| name.ends_with(ext)))
}

/// Download URL of an image attachment, covering inline images and files
/// shared through Teams.
fn image_url(attachment: &Value) -> Option<String> {
    let content_type = str_at(attachment, &["contentType"]).unwrap_or_default();
    let content_url = str_at(attachment, &["contentUrl"]);
    let download_url = str_at(attachment, &["content", "downloadUrl"]);

    let url = if content_type == FILE_DOWNLOAD_INFO {
        let file_type = str_at(attachment, &["content", "fileType"])
            .unwrap_or_default()
            .to_lowercase();
        let is_image = file_type.starts_with("image/")
            || IMAGE_EXTENSIONS
                .iter()
                .any(|ext| ext.trim_start_matches('.') == file_type)
            || has_image_name(attachment);
        download_url.filter(|_| is_image)
    } else if content_type.starts_with("image/") {
        content_url
    } else if has_image_name(attachment) {
        content_url.or(download_url)
    } else {
        None
    };
    url.map(str::to_string)
}

fn audio_url(attachment: &Value) -> Option<String> {
    let content_type = str_at(attachment, &["contentType"])?;
    if content_type.starts_with("audio/") {
        str_at(attachment, &["contentUrl"]).map(str::to_string)
    } else {
        None
    }
}

/// Mime type from leading magic bytes, defaulting to JPEG.
pub fn sniff_image_type(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0xff, 0xd8]) {
        "image/jpeg"
    } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        "image/png"
    } else if bytes.starts_with(b"GIF") {
        "image/gif"
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "image/jpeg"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(extra: Value) -> Value {
        let mut activity = json!({
            "type": "message",
            "id": "1700000000000",
            "serviceUrl": "https://smba.trafficmanager.net/amer/",
            "channelId": "msteams",
            "from": {"id": "29:1abc", "name": "Ana Mora"},
            "recipient": {"id": "28:bot", "name": "Concierge"},
            "conversation": {"id": "a:1xyz"},
        });
        if let (Some(target), Some(extra)) = (activity.as_object_mut(), extra.as_object()) {
            target.extend(extra.clone());
        }
        activity
    }

    fn unit_of(event: TeamsEvent) -> InboundUnit {
        match event {
            TeamsEvent::Message { unit, .. } => unit,
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[test]
    fn text_message_carries_sender_and_reference() {
        let event = parse_activity(&message(json!({"text": " ¿Horario? "})));
        let TeamsEvent::Message { unit, reference } = event else {
            panic!("expected message");
        };
        assert_eq!(unit.user_id, "29:1abc");
        assert_eq!(unit.channel, ChannelKind::Teams);
        assert_eq!(unit.display_name.as_deref(), Some("Ana Mora"));
        assert_eq!(unit.message_ref.as_deref(), Some("1700000000000"));
        assert_eq!(unit.kind, InboundKind::Text { body: "¿Horario?".into() });
        assert_eq!(reference.service_url, "https://smba.trafficmanager.net/amer/");
        assert_eq!(reference.conversation_id, "a:1xyz");
    }

    #[test]
    fn inline_image_keeps_text_as_caption() {
        let unit = unit_of(parse_activity(&message(json!({
            "text": "mi factura",
            "attachments": [{"contentType": "image/png", "contentUrl": "https://files/1.png"}]
        }))));
        assert_eq!(
            unit.kind,
            InboundKind::Image {
                media_ref: "https://files/1.png".into(),
                caption: Some("mi factura".into()),
            }
        );
    }

    #[test]
    fn shared_file_image_uses_download_url() {
        let unit = unit_of(parse_activity(&message(json!({
            "attachments": [
                {"contentType": "text/html", "content": "<p>hola</p>"},
                {
                    "contentType": FILE_DOWNLOAD_INFO,
                    "name": "captura.PNG",
                    "content": {"downloadUrl": "https://sharepoint/captura", "fileType": "png"}
                }
            ]
        }))));
        assert_eq!(
            unit.kind,
            InboundKind::Image {
                media_ref: "https://sharepoint/captura".into(),
                caption: None,
            }
        );
    }

    #[test]
    fn shared_non_image_file_is_unsupported() {
        let unit = unit_of(parse_activity(&message(json!({
            "attachments": [{
                "contentType": FILE_DOWNLOAD_INFO,
                "name": "contrato.pdf",
                "content": {"downloadUrl": "https://sharepoint/contrato", "fileType": "pdf"}
            }]
        }))));
        assert_eq!(
            unit.kind,
            InboundKind::Unsupported {
                kind: FILE_DOWNLOAD_INFO.into()
            }
        );
    }

    #[test]
    fn audio_attachment_without_text_is_audio() {
        let unit = unit_of(parse_activity(&message(json!({
            "attachments": [{"contentType": "audio/ogg", "contentUrl": "https://files/nota.ogg"}]
        }))));
        assert_eq!(
            unit.kind,
            InboundKind::Audio {
                media_ref: "https://files/nota.ogg".into()
            }
        );
    }

    #[test]
    fn empty_message_is_unsupported() {
        let unit = unit_of(parse_activity(&message(json!({"text": "   "}))));
        assert_eq!(unit.kind, InboundKind::Unsupported { kind: "message".into() });
    }

    #[test]
    fn members_added_excludes_the_bot() {
        let activity = json!({
            "type": "conversationUpdate",
            "serviceUrl": "https://smba/",
            "recipient": {"id": "28:bot"},
            "conversation": {"id": "a:1xyz"},
            "membersAdded": [{"id": "28:bot"}, {"id": "29:1abc"}]
        });
        match parse_activity(&activity) {
            TeamsEvent::MembersAdded { members, reference } => {
                assert_eq!(members, vec!["29:1abc".to_string()]);
                assert_eq!(reference.conversation_id, "a:1xyz");
            }
            other => panic!("expected members added, got {other:?}"),
        }

        let only_bot = json!({
            "type": "conversationUpdate",
            "serviceUrl": "https://smba/",
            "recipient": {"id": "28:bot"},
            "conversation": {"id": "a:1xyz"},
            "membersAdded": [{"id": "28:bot"}]
        });
        assert_eq!(parse_activity(&only_bot), TeamsEvent::Ignored);
    }

    #[test]
    fn activities_without_routing_data_are_ignored() {
        assert_eq!(parse_activity(&json!({"type": "message", "text": "hola"})), TeamsEvent::Ignored);
        assert_eq!(parse_activity(&message(json!({"type": "typing"}))), TeamsEvent::Ignored);
        let mut anonymous = message(json!({"text": "hola"}));
        anonymous["from"] = json!({});
        assert_eq!(parse_activity(&anonymous), TeamsEvent::Ignored);
    }

    #[test]
    fn image_type_is_sniffed_from_magic_bytes() {
        assert_eq!(sniff_image_type(&[0xff, 0xd8, 0xff]), "image/jpeg");
        assert_eq!(sniff_image_type(b"\x89PNG\r\n\x1a\nrest"), "image/png");
        assert_eq!(sniff_image_type(b"GIF89a"), "image/gif");
        assert_eq!(sniff_image_type(b"RIFF\0\0\0\0WEBPVP8"), "image/webp");
        assert_eq!(sniff_image_type(b"??"), "image/jpeg");
    }
}
