// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Escalation lifecycle operations over the storage adapter.
//!
//! The router opens and resolves escalations; human agents mutate them
//! through the admin surface. Both paths go through this type so that
//! resolve-by-phrase and resolve-by-agent share one implementation.
//! Operations on a user with no open escalation return `Ok(false)`.

use std::sync::Arc;

use tracing::{debug, info};

use concierge_core::traits::StorageAdapter;
use concierge_core::types::{
    Escalation, EscalationStatus, EscalationUpdate, HistoryTurn, Priority, ResolvedBy,
};
use concierge_core::ConciergeError;

#[derive(Clone)]
pub struct EscalationStore {
    storage: Arc<dyn StorageAdapter + Send + Sync>,
}

impl EscalationStore {
    pub fn new(storage: Arc<dyn StorageAdapter + Send + Sync>) -> Self {
        Self { storage }
    }

    pub async fn is_active(&self, user_id: &str) -> Result<bool, ConciergeError> {
        Ok(self.storage.active_escalation(user_id).await?.is_some())
    }

    pub async fn active(&self, user_id: &str) -> Result<Option<Escalation>, ConciergeError> {
        self.storage.active_escalation(user_id).await
    }

    /// Open an escalation. Returns the existing one if the user already has one open.
    pub async fn open(
        &self,
        user_id: &str,
        last_message: &str,
        excerpt: &[HistoryTurn],
    ) -> Result<Escalation, ConciergeError> {
        let escalation = self
            .storage
            .open_escalation(user_id, last_message, excerpt)
            .await?;
        info!(
            escalation_id = escalation.id,
            excerpt_turns = excerpt.len(),
            "escalation open"
        );
        Ok(escalation)
    }

    pub async fn resolve(
        &self,
        user_id: &str,
        resolved_by: &ResolvedBy,
    ) -> Result<bool, ConciergeError> {
        let resolved = self.storage.resolve_escalation(user_id, resolved_by).await?;
        debug!(user_id = %user_id, resolved_by = %resolved_by, resolved, "resolve escalation");
        Ok(resolved)
    }

    pub async fn set_priority(
        &self,
        user_id: &str,
        priority: Priority,
        actor: Option<&str>,
    ) -> Result<bool, ConciergeError> {
        self.storage
            .mutate_escalation(user_id, &EscalationUpdate::Priority(priority), actor)
            .await
    }

    pub async fn add_note(
        &self,
        user_id: &str,
        text: &str,
        actor: Option<&str>,
    ) -> Result<bool, ConciergeError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ConciergeError::Config("note text must not be empty".to_string()));
        }
        self.storage
            .mutate_escalation(user_id, &EscalationUpdate::Note(text.to_string()), actor)
            .await
    }

    /// Assign to `agent`, or clear the assignment with `None`.
    pub async fn assign_agent(
        &self,
        user_id: &str,
        agent: Option<&str>,
        actor: Option<&str>,
    ) -> Result<bool, ConciergeError> {
        let update = EscalationUpdate::Assign(agent.map(str::to_string));
        self.storage.mutate_escalation(user_id, &update, actor).await
    }

    pub async fn set_status(
        &self,
        user_id: &str,
        status: EscalationStatus,
        actor: Option<&str>,
    ) -> Result<bool, ConciergeError> {
        self.storage
            .mutate_escalation(user_id, &EscalationUpdate::Status(status), actor)
            .await
    }

    pub async fn list(&self, include_resolved: bool) -> Result<Vec<Escalation>, ConciergeError> {
        self.storage.list_escalations(include_resolved).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concierge_config::model::StorageConfig;
    use concierge_core::types::AuditAction;
    use concierge_storage::SqliteStorage;

    async fn store() -> (EscalationStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(SqliteStorage::new(StorageConfig {
            database_path: dir.path().join("test.db").to_string_lossy().into_owned(),
            wal_mode: true,
        }));
        storage.initialize().await.unwrap();
        (EscalationStore::new(storage), dir)
    }

    #[tokio::test]
    async fn open_then_resolve_lifts_hold() {
        let (store, _dir) = store().await;
        let excerpt = vec![HistoryTurn::user("hola"), HistoryTurn::assistant("hola!")];
        let esc = store.open("u1", "quiero un agente", &excerpt).await.unwrap();
        assert_eq!(esc.status, EscalationStatus::Pending);
        assert!(!esc.resolved);
        assert_eq!(esc.excerpt, excerpt);
        assert!(store.is_active("u1").await.unwrap());

        assert!(store.resolve("u1", &ResolvedBy::User).await.unwrap());
        assert!(!store.is_active("u1").await.unwrap());
    }

    #[tokio::test]
    async fn second_open_returns_existing() {
        let (store, _dir) = store().await;
        let first = store.open("u1", "a", &[]).await.unwrap();
        let second = store.open("u1", "b", &[]).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.last_message, "a");
        assert_eq!(store.list(true).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn operations_without_open_escalation_return_false() {
        let (store, _dir) = store().await;
        assert!(!store.resolve("ghost", &ResolvedBy::User).await.unwrap());
        assert!(!store.set_priority("ghost", Priority::High, None).await.unwrap());
        assert!(!store.add_note("ghost", "hola", None).await.unwrap());
        assert!(!store.assign_agent("ghost", Some("maria"), None).await.unwrap());
        assert!(
            !store
                .set_status("ghost", EscalationStatus::InProgress, None)
                .await
                .unwrap()
        );
        assert!(store.list(true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn each_mutation_appends_one_audit_entry() {
        let (store, _dir) = store().await;
        store.open("u1", "ayuda", &[]).await.unwrap();

        assert!(store.set_priority("u1", Priority::Urgent, Some("maria")).await.unwrap());
        assert!(store.add_note("u1", "llamar en la tarde", Some("maria")).await.unwrap());
        assert!(store.assign_agent("u1", Some("maria"), Some("maria")).await.unwrap());
        assert!(store.assign_agent("u1", None, Some("maria")).await.unwrap());
        assert!(
            store
                .set_status("u1", EscalationStatus::InProgress, Some("maria"))
                .await
                .unwrap()
        );

        let esc = store.active("u1").await.unwrap().unwrap();
        let actions: Vec<_> = esc.history.iter().map(|h| h.action).collect();
        assert_eq!(
            actions,
            vec![
                AuditAction::Created,
                AuditAction::PriorityChanged,
                AuditAction::NoteAdded,
                AuditAction::Assigned,
                AuditAction::Unassigned,
                AuditAction::StatusChanged,
            ]
        );
        for pair in esc.history.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
        assert_eq!(esc.priority, Priority::Urgent);
        assert_eq!(esc.assigned_to, None);
        assert_eq!(esc.status, EscalationStatus::InProgress);
        assert_eq!(esc.notes.len(), 1);
    }

    #[tokio::test]
    async fn empty_note_is_rejected() {
        let (store, _dir) = store().await;
        store.open("u1", "ayuda", &[]).await.unwrap();
        assert!(store.add_note("u1", "   ", None).await.is_err());
    }

    #[tokio::test]
    async fn resolved_status_goes_through_resolve() {
        let (store, _dir) = store().await;
        store.open("u1", "ayuda", &[]).await.unwrap();
        assert!(
            store
                .set_status("u1", EscalationStatus::Resolved, Some("maria"))
                .await
                .unwrap()
        );
        assert!(!store.is_active("u1").await.unwrap());

        let all = store.list(true).await.unwrap();
        assert!(all[0].resolved);
        assert_eq!(all[0].resolved_by.as_deref(), Some("maria"));
        assert_eq!(all[0].history.last().map(|h| h.action), Some(AuditAction::Resolved));
    }
}
