// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the StorageAdapter trait.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use concierge_config::model::StorageConfig;
use concierge_core::types::{
    ActivityEvent, ChannelKind, Conversation, DailySnapshot, Escalation, EscalationUpdate,
    HistoryTurn, LiveStats, ResolvedBy, Role,
};
use concierge_core::{AdapterType, ConciergeError, HealthStatus, PluginAdapter, StorageAdapter};

use crate::database::{Database, day_bounds, map_tr_err};
use crate::queries;

/// SQLite-backed storage adapter.
///
/// The connection is opened by [`StorageAdapter::initialize`]; every other
/// operation fails until then.
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    fn db(&self) -> Result<&Database, ConciergeError> {
        self.db
            .get()
            .ok_or_else(|| ConciergeError::storage("storage not initialized -- call initialize() first"))
    }

    async fn checkpoint(db: &Database) -> Result<(), ConciergeError> {
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, ConciergeError> {
        let Ok(db) = self.db() else {
            return Ok(HealthStatus::Unhealthy("not initialized".to_string()));
        };
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ConciergeError> {
        if let Some(db) = self.db.get() {
            Self::checkpoint(db).await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), ConciergeError> {
        let db = Database::open(&self.config.database_path, self.config.wal_mode).await?;
        self.db
            .set(db)
            .map_err(|_| ConciergeError::storage("storage already initialized"))?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), ConciergeError> {
        Self::checkpoint(self.db()?).await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    // --- Conversation log ---

    async fn append_message(
        &self,
        user_id: &str,
        day: &str,
        channel: ChannelKind,
        display_name: Option<&str>,
        role: Role,
        content: &str,
        context: Option<&str>,
    ) -> Result<(), ConciergeError> {
        queries::conversations::append_message(
            self.db()?,
            user_id,
            day,
            channel,
            display_name,
            role,
            content,
            context,
        )
        .await
    }

    async fn get_conversation(
        &self,
        user_id: &str,
        day: &str,
    ) -> Result<Option<Conversation>, ConciergeError> {
        queries::conversations::get_conversation(self.db()?, user_id, day).await
    }

    async fn list_conversations(&self, day: &str) -> Result<Vec<Conversation>, ConciergeError> {
        queries::conversations::list_conversations(self.db()?, day).await
    }

    // --- Escalations ---

    async fn active_escalation(
        &self,
        user_id: &str,
    ) -> Result<Option<Escalation>, ConciergeError> {
        queries::escalations::active(self.db()?, user_id).await
    }

    async fn open_escalation(
        &self,
        user_id: &str,
        last_message: &str,
        excerpt: &[HistoryTurn],
    ) -> Result<Escalation, ConciergeError> {
        queries::escalations::open(self.db()?, user_id, last_message, excerpt).await
    }

    async fn resolve_escalation(
        &self,
        user_id: &str,
        resolved_by: &ResolvedBy,
    ) -> Result<bool, ConciergeError> {
        queries::escalations::resolve(self.db()?, user_id, resolved_by).await
    }

    async fn mutate_escalation(
        &self,
        user_id: &str,
        update: &EscalationUpdate,
        actor: Option<&str>,
    ) -> Result<bool, ConciergeError> {
        queries::escalations::mutate(self.db()?, user_id, update, actor).await
    }

    async fn list_escalations(
        &self,
        include_resolved: bool,
    ) -> Result<Vec<Escalation>, ConciergeError> {
        queries::escalations::list(self.db()?, include_resolved).await
    }

    // --- Activity trail ---

    async fn append_activity(
        &self,
        event: &ActivityEvent,
        max_entries: usize,
    ) -> Result<(), ConciergeError> {
        queries::activities::append(self.db()?, event, max_entries).await
    }

    async fn recent_activities(&self, limit: usize) -> Result<Vec<ActivityEvent>, ConciergeError> {
        queries::activities::recent(self.db()?, limit).await
    }

    // --- Metrics ---

    async fn summarize_day(
        &self,
        day: &str,
        utc_offset_minutes: i32,
    ) -> Result<DailySnapshot, ConciergeError> {
        let db = self.db()?;
        let (start, end) = day_bounds(day, utc_offset_minutes)?;
        let totals = queries::snapshots::conversation_totals(db, day).await?;
        let (created, resolved) = queries::escalations::counts_between(db, &start, &end).await?;
        Ok(DailySnapshot {
            escalations_created: created,
            escalations_resolved: resolved,
            ..totals
        }
        .with_rates())
    }

    async fn live_stats(&self, day: &str) -> Result<LiveStats, ConciergeError> {
        let db = self.db()?;
        let open = queries::escalations::open_count(db).await?;
        queries::snapshots::live_stats(db, day, open).await
    }

    async fn conversation_days_before(&self, day: &str) -> Result<Vec<String>, ConciergeError> {
        queries::conversations::days_before(self.db()?, day).await
    }

    async fn purge_conversations(&self, day: &str) -> Result<usize, ConciergeError> {
        queries::conversations::purge_day(self.db()?, day).await
    }

    async fn upsert_snapshot(&self, snapshot: &DailySnapshot) -> Result<(), ConciergeError> {
        queries::snapshots::upsert(self.db()?, snapshot).await
    }

    async fn recent_snapshots(&self, n: usize) -> Result<Vec<DailySnapshot>, ConciergeError> {
        queries::snapshots::recent(self.db()?, n).await
    }

    async fn snapshots_between(
        &self,
        start: &str,
        end: &str,
    ) -> Result<Vec<DailySnapshot>, ConciergeError> {
        queries::snapshots::between(self.db()?, start, end).await
    }

    async fn prune_snapshots(&self, before_day: &str) -> Result<usize, ConciergeError> {
        queries::snapshots::prune(self.db()?, before_day).await
    }
}
