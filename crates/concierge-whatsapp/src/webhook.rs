// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook payload parsing and verification.
//!
//! Meta delivers batches shaped as `entry[].changes[].value.messages[]`.
//! Only changes with `field == "messages"` carry user messages; status
//! callbacks (delivered/read receipts) have no `messages` array and are skipped.

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use tracing::{debug, warn};

use concierge_core::types::{ChannelKind, InboundKind, InboundUnit};

type HmacSha256 = Hmac<Sha256>;

/// Extract every inbound message from a webhook payload, in delivery order.
///
/// Messages without a sender are dropped since there is nobody to reply to.
/// Messages whose body is missing or of an unknown type become
/// [`InboundKind::Unsupported`].
pub fn parse_webhook(payload: &Value) -> Vec<InboundUnit> {
    let mut units = Vec::new();

    let Some(entries) = payload.get("entry").and_then(Value::as_array) else {
        debug!("webhook without entry array ignored");
        return units;
    };

    for change in entries
        .iter()
        .filter_map(|e| e.get("changes").and_then(Value::as_array))
        .flatten()
    {
        if change.get("field").and_then(Value::as_str) != Some("messages") {
            continue;
        }
        let Some(value) = change.get("value") else {
            continue;
        };
        let Some(messages) = value.get("messages").and_then(Value::as_array) else {
            continue;
        };

        for message in messages {
            let Some(from) = message.get("from").and_then(Value::as_str) else {
                warn!("webhook message without sender dropped");
                continue;
            };
            units.push(InboundUnit {
                message_ref: str_field(message, "id"),
                user_id: from.to_string(),
                channel: ChannelKind::Whatsapp,
                display_name: contact_name(value, from),
                kind: classify(message),
            });
        }
    }

    units
}

fn str_field(v: &Value, key: &str) -> Option<String> {
    v.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Profile name from `value.contacts`, preferring the entry matching `wa_id`.
fn contact_name(value: &Value, from: &str) -> Option<String> {
    let contacts = value.get("contacts")?.as_array()?;
    let contact = contacts
        .iter()
        .find(|c| c.get("wa_id").and_then(Value::as_str) == Some(from))
        .or_else(|| contacts.first())?;
    contact
        .get("profile")
        .and_then(|p| p.get("name"))
        .and_then(Value::as_str)
        .filter(|n| !n.trim().is_empty())
        .map(str::to_string)
}

fn classify(message: &Value) -> InboundKind {
    let kind = message
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("unknown");

    let inner = |field: &str| message.get(kind).and_then(|v| str_field(v, field));

    let parsed = match kind {
        "text" => inner("body").map(|body| InboundKind::Text { body }),
        "audio" => inner("id").map(|media_ref| InboundKind::Audio { media_ref }),
        "image" => inner("id").map(|media_ref| InboundKind::Image {
            media_ref,
            caption: inner("caption").filter(|c| !c.trim().is_empty()),
        }),
        _ => None,
    };

    parsed.unwrap_or_else(|| InboundKind::Unsupported {
        kind: kind.to_string(),
    })
}

/// Answer the subscription handshake.
///
/// Returns the challenge to echo when `mode` is `subscribe` and `token`
/// matches the configured verify token. An unset verify token rejects every
/// handshake.
pub fn verify_handshake(
    mode: Option<&str>,
    token: Option<&str>,
    challenge: Option<&str>,
    expected: Option<&str>,
) -> Option<String> {
    let expected = expected.filter(|t| !t.is_empty())?;
    if mode == Some("subscribe") && token == Some(expected) {
        challenge.map(str::to_string)
    } else {
        None
    }
}

/// Check an `X-Hub-Signature-256` header (`sha256=<hex>`) against the raw body.
pub fn verify_signature(body: &[u8], header: Option<&str>, app_secret: &str) -> bool {
    let Some(signature) = header.and_then(|h| h.trim().strip_prefix("sha256=")) else {
        return false;
    };
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(app_secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}
