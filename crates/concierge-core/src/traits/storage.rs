// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence trait for conversations, escalations, activities, and metric snapshots.

use async_trait::async_trait;

use crate::error::ConciergeError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    ActivityEvent, ChannelKind, Conversation, DailySnapshot, Escalation, EscalationUpdate,
    HistoryTurn, LiveStats, ResolvedBy, Role,
};

/// Passive record keeper behind the Conversation Log, Escalation Store, and
/// Activity Recorder. Holds no business rules beyond the invariants it guards:
/// one conversation per (user, day) and at most one open escalation per user.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Opens the backend and applies pending migrations.
    async fn initialize(&self) -> Result<(), ConciergeError>;

    /// Flushes pending writes and releases the connection.
    async fn close(&self) -> Result<(), ConciergeError>;

    // --- Conversation log ---

    /// Appends one turn to the (user, day) conversation, creating it on first use.
    ///
    /// `context` is the text the turn contributes to the responder's history
    /// window, if any.
    #[allow(clippy::too_many_arguments)]
    async fn append_message(
        &self,
        user_id: &str,
        day: &str,
        channel: ChannelKind,
        display_name: Option<&str>,
        role: Role,
        content: &str,
        context: Option<&str>,
    ) -> Result<(), ConciergeError>;

    async fn get_conversation(
        &self,
        user_id: &str,
        day: &str,
    ) -> Result<Option<Conversation>, ConciergeError>;

    async fn list_conversations(&self, day: &str) -> Result<Vec<Conversation>, ConciergeError>;

    // --- Escalations ---

    /// The unresolved escalation for a user, if any.
    async fn active_escalation(&self, user_id: &str)
    -> Result<Option<Escalation>, ConciergeError>;

    /// Opens an escalation, or returns the already-open one unchanged.
    async fn open_escalation(
        &self,
        user_id: &str,
        last_message: &str,
        excerpt: &[HistoryTurn],
    ) -> Result<Escalation, ConciergeError>;

    /// Resolves the open escalation. `Ok(false)` when none is open.
    async fn resolve_escalation(
        &self,
        user_id: &str,
        resolved_by: &ResolvedBy,
    ) -> Result<bool, ConciergeError>;

    /// Applies one agent-facing mutation. `Ok(false)` when none is open.
    async fn mutate_escalation(
        &self,
        user_id: &str,
        update: &EscalationUpdate,
        actor: Option<&str>,
    ) -> Result<bool, ConciergeError>;

    async fn list_escalations(
        &self,
        include_resolved: bool,
    ) -> Result<Vec<Escalation>, ConciergeError>;

    // --- Activity trail ---

    /// Appends an event and trims the trail to the newest `max_entries`.
    async fn append_activity(
        &self,
        event: &ActivityEvent,
        max_entries: usize,
    ) -> Result<(), ConciergeError>;

    /// Newest first.
    async fn recent_activities(&self, limit: usize) -> Result<Vec<ActivityEvent>, ConciergeError>;

    // --- Metrics ---

    /// Aggregates one business day. Escalation counts use timestamps, so the
    /// day's UTC window is derived from `utc_offset_minutes`.
    async fn summarize_day(
        &self,
        day: &str,
        utc_offset_minutes: i32,
    ) -> Result<DailySnapshot, ConciergeError>;

    async fn live_stats(&self, day: &str) -> Result<LiveStats, ConciergeError>;

    /// Distinct conversation days strictly before `day`, ascending.
    async fn conversation_days_before(&self, day: &str) -> Result<Vec<String>, ConciergeError>;

    /// Deletes every conversation recorded on `day`. Returns the number removed.
    async fn purge_conversations(&self, day: &str) -> Result<usize, ConciergeError>;

    /// Inserts or replaces the snapshot for its day.
    async fn upsert_snapshot(&self, snapshot: &DailySnapshot) -> Result<(), ConciergeError>;

    /// The newest `n` snapshots, newest first.
    async fn recent_snapshots(&self, n: usize) -> Result<Vec<DailySnapshot>, ConciergeError>;

    /// Snapshots with `start <= day <= end`, ascending.
    async fn snapshots_between(
        &self,
        start: &str,
        end: &str,
    ) -> Result<Vec<DailySnapshot>, ConciergeError>;

    /// Deletes snapshots older than `before_day`. Returns the number removed.
    async fn prune_snapshots(&self, before_day: &str) -> Result<usize, ConciergeError>;
}
