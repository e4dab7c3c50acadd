// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the router, the stores, and the adapters.
//!
//! Timestamps are RFC 3339 strings and days are `YYYY-MM-DD` strings so that
//! records sort lexicographically in SQLite and serialize without a clock type.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of collaborator behind an adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Channel,
    Responder,
    Speech,
    Vision,
    Storage,
    Observability,
}

/// The messaging platform a conversation arrived on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Whatsapp,
    Teams,
    Test,
}

/// Author of a conversation turn.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One `{role, content}` entry as handed to the AI responder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: Role,
    pub content: String,
}

impl HistoryTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Payload of an inbound unit, already classified by the channel adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundKind {
    /// Plain text typed by the user.
    Text { body: String },
    /// A voice note; the media reference is resolved through the channel.
    Audio { media_ref: String },
    /// A picture with an optional caption.
    Image {
        media_ref: String,
        caption: Option<String>,
    },
    /// Anything else (stickers, locations, malformed payloads).
    Unsupported { kind: String },
}

impl InboundKind {
    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            InboundKind::Text { .. } => "text",
            InboundKind::Audio { .. } => "audio",
            InboundKind::Image { .. } => "image",
            InboundKind::Unsupported { .. } => "other",
        }
    }
}

/// A single inbound unit of conversation as seen by the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundUnit {
    /// Channel-assigned message reference, used for read receipts.
    pub message_ref: Option<String>,
    /// Phone number or channel-assigned user id.
    pub user_id: String,
    pub channel: ChannelKind,
    /// Last-known display name, when the channel provides one.
    pub display_name: Option<String>,
    pub kind: InboundKind,
}

impl InboundUnit {
    /// Convenience constructor for a text unit.
    pub fn text(user_id: impl Into<String>, channel: ChannelKind, body: impl Into<String>) -> Self {
        Self {
            message_ref: None,
            user_id: user_id.into(),
            channel,
            display_name: None,
            kind: InboundKind::Text { body: body.into() },
        }
    }
}

/// Downloaded media bytes with their MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPayload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Result of the image-analysis collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImageAnalysis {
    pub description: String,
    pub extracted_text: Option<String>,
}

/// A stored conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: String,
    /// What this turn contributes to the responder's history window.
    /// `None` for turns that stay out of it (FAQ answers, handoffs).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// All turns exchanged with one user on one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub user_id: String,
    pub day: String,
    pub channel: ChannelKind,
    pub display_name: Option<String>,
    pub started_at: String,
    pub last_message_at: String,
    pub messages: Vec<ConversationMessage>,
}

impl Conversation {
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}

/// Lifecycle status of an escalation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EscalationStatus {
    Pending,
    InProgress,
    Resolved,
}

impl EscalationStatus {
    /// Label shown to human agents in audit history.
    pub fn label(&self) -> &'static str {
        match self {
            EscalationStatus::Pending => "Pendiente",
            EscalationStatus::InProgress => "En progreso",
            EscalationStatus::Resolved => "Resuelta",
        }
    }
}

/// Triage priority assigned by a human agent.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize, Default,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    #[default]
    #[strum(serialize = "none")]
    #[serde(rename = "none")]
    Unset,
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn label(&self) -> &'static str {
        match self {
            Priority::Unset => "Sin prioridad",
            Priority::Low => "Baja",
            Priority::Medium => "Media",
            Priority::High => "Alta",
            Priority::Urgent => "Urgente",
        }
    }
}

/// Kind of audit-history entry appended to an escalation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Created,
    PriorityChanged,
    Assigned,
    Unassigned,
    NoteAdded,
    StatusChanged,
    Resolved,
}

/// One append-only audit-history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub action: AuditAction,
    pub timestamp: String,
    pub actor: Option<String>,
    pub value: Option<String>,
}

/// A free-text note left by an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationNote {
    pub text: String,
    pub author: Option<String>,
    pub created_at: String,
}

/// A request for human assistance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escalation {
    pub id: i64,
    pub user_id: String,
    pub created_at: String,
    /// The user message that triggered the escalation.
    pub last_message: String,
    /// Up to the last N history turns at escalation time.
    pub excerpt: Vec<HistoryTurn>,
    pub status: EscalationStatus,
    pub resolved: bool,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<String>,
    pub priority: Priority,
    pub assigned_to: Option<String>,
    pub notes: Vec<EscalationNote>,
    pub history: Vec<AuditEntry>,
}

/// A single agent-facing mutation of an open escalation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscalationUpdate {
    Priority(Priority),
    Note(String),
    /// `None` clears the assignment.
    Assign(Option<String>),
    Status(EscalationStatus),
}

/// Who lifted an escalation hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedBy {
    /// The user asked to return to the bot.
    User,
    /// A human agent resolved it through the admin surface.
    Agent(String),
}

impl std::fmt::Display for ResolvedBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolvedBy::User => write!(f, "user"),
            ResolvedBy::Agent(name) => write!(f, "{name}"),
        }
    }
}

/// Category of an activity-trail event.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ActivityType {
    System,
    Conversation,
    Escalation,
    Auth,
    User,
    Config,
}

impl ActivityType {
    /// Severity shown in log views: escalations stand out as warnings.
    pub fn level(&self) -> &'static str {
        match self {
            ActivityType::Escalation => "warning",
            _ => "info",
        }
    }
}

/// A write-once activity-trail entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub activity_type: ActivityType,
    pub message: String,
    pub details: Option<String>,
    pub user_id: Option<String>,
    pub timestamp: String,
}

/// Aggregated metrics for one folded calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DailySnapshot {
    pub day: String,
    pub total_conversations: i64,
    pub whatsapp_conversations: i64,
    pub teams_conversations: i64,
    pub total_messages: i64,
    pub unique_users: i64,
    pub escalations_created: i64,
    pub escalations_resolved: i64,
    pub bot_success_rate: f64,
    pub escalation_resolution_rate: f64,
}

impl DailySnapshot {
    /// Recompute the derived percentage fields from the raw counts.
    pub fn with_rates(mut self) -> Self {
        self.bot_success_rate = if self.total_conversations > 0 {
            round2(
                (self.total_conversations - self.escalations_created) as f64
                    / self.total_conversations as f64
                    * 100.0,
            )
        } else {
            0.0
        };
        self.escalation_resolution_rate = if self.escalations_created > 0 {
            round2(self.escalations_resolved as f64 / self.escalations_created as f64 * 100.0)
        } else {
            0.0
        };
        self
    }

    /// Look up a numeric field by its snake_case name.
    pub fn metric(&self, name: &str) -> Option<f64> {
        let value = match name {
            "total_conversations" => self.total_conversations as f64,
            "whatsapp_conversations" => self.whatsapp_conversations as f64,
            "teams_conversations" => self.teams_conversations as f64,
            "total_messages" => self.total_messages as f64,
            "unique_users" => self.unique_users as f64,
            "escalations_created" => self.escalations_created as f64,
            "escalations_resolved" => self.escalations_resolved as f64,
            "bot_success_rate" => self.bot_success_rate,
            "escalation_resolution_rate" => self.escalation_resolution_rate,
            _ => return None,
        };
        Some(value)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Counters for the current day, as shown on the dashboard overview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LiveStats {
    pub active_conversations: i64,
    pub open_escalations: i64,
    pub messages_today: i64,
    pub unique_users: i64,
}
