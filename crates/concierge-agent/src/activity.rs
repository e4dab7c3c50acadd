// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Best-effort activity trail.
//!
//! Recording never fails the caller: a storage error is logged and dropped.

use std::sync::Arc;

use tracing::warn;

use concierge_core::traits::StorageAdapter;
use concierge_core::types::{ActivityEvent, ActivityType, ChannelKind};

/// Number of characters of the user message kept in activity details.
const DETAIL_PREVIEW_CHARS: usize = 40;

/// Appends events to the trail and keeps it within `max_entries`.
#[derive(Clone)]
pub struct ActivityRecorder {
    storage: Arc<dyn StorageAdapter + Send + Sync>,
    max_entries: usize,
}

impl ActivityRecorder {
    pub fn new(storage: Arc<dyn StorageAdapter + Send + Sync>, max_entries: usize) -> Self {
        Self {
            storage,
            max_entries: max_entries.max(1),
        }
    }

    /// Record one event stamped with the current time.
    pub async fn record(
        &self,
        activity_type: ActivityType,
        message: impl Into<String>,
        details: Option<String>,
        user_id: Option<&str>,
    ) {
        let event = ActivityEvent {
            activity_type,
            message: message.into(),
            details,
            user_id: user_id.map(str::to_string),
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        };
        if let Err(e) = self.storage.append_activity(&event, self.max_entries).await {
            warn!(
                activity_type = %event.activity_type,
                error = %e,
                "failed to record activity"
            );
        }
    }

    pub async fn system_started(&self, agent_name: &str) {
        self.record(
            ActivityType::System,
            "Sistema iniciado",
            Some(format!("{agent_name} en linea")),
            None,
        )
        .await;
    }

    /// A user explicitly asked for a human.
    pub async fn escalation_requested(&self, user_id: &str) {
        self.record(
            ActivityType::Escalation,
            "Escalacion solicitada",
            Some("Usuario solicito agente humano".to_string()),
            Some(user_id),
        )
        .await;
    }

    /// The responder's reply suggested a human should take over.
    pub async fn escalation_suggested(&self, user_id: &str) {
        self.record(
            ActivityType::Escalation,
            "Escalacion sugerida",
            Some("La respuesta del asistente sugirio un agente humano".to_string()),
            Some(user_id),
        )
        .await;
    }

    pub async fn user_resumed(&self, user_id: &str) {
        self.record(
            ActivityType::User,
            "Usuario volvio al asistente",
            Some(format!("{user_id} resolvio su escalacion")),
            Some(user_id),
        )
        .await;
    }

    /// An inbound unit was answered; `modality` is the inbound kind label.
    pub async fn conversation(
        &self,
        user_id: &str,
        channel: ChannelKind,
        modality: &str,
        summary: &str,
    ) {
        let label = channel_label(channel);
        let (message, details) = match modality {
            "image" => (
                format!("Imagen recibida {label}"),
                format!("{user_id} envio una imagen"),
            ),
            "audio" => (
                format!("Audio recibido {label}"),
                format!("{user_id} - {}", preview(summary)),
            ),
            _ => (
                format!("Nueva conversacion {label}"),
                format!("{user_id} - {}", preview(summary)),
            ),
        };
        self.record(ActivityType::Conversation, message, Some(details), Some(user_id))
            .await;
    }

    /// A routing pipeline failed and the fallback reply was sent.
    pub async fn routing_failed(&self, user_id: &str, collaborator: &str, error: &str) {
        self.record(
            ActivityType::System,
            "Error procesando mensaje",
            Some(format!("{collaborator}: {error}")),
            Some(user_id),
        )
        .await;
    }
}

fn channel_label(channel: ChannelKind) -> &'static str {
    match channel {
        ChannelKind::Whatsapp => "WhatsApp",
        ChannelKind::Teams => "Teams",
        ChannelKind::Test => "Test",
    }
}

fn preview(text: &str) -> String {
    text.chars().take(DETAIL_PREVIEW_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use concierge_config::model::StorageConfig;
    use concierge_storage::SqliteStorage;

    async fn recorder(max_entries: usize) -> (ActivityRecorder, Arc<SqliteStorage>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(SqliteStorage::new(StorageConfig {
            database_path: dir.path().join("test.db").to_string_lossy().into_owned(),
            wal_mode: true,
        }));
        storage.initialize().await.unwrap();
        let recorder = ActivityRecorder::new(storage.clone(), max_entries);
        (recorder, storage, dir)
    }

    #[tokio::test]
    async fn escalation_requested_is_a_warning_level_event() {
        let (recorder, storage, _dir) = recorder(50).await;
        recorder.escalation_requested("50688887777").await;

        let events = storage.recent_activities(10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].activity_type, ActivityType::Escalation);
        assert_eq!(events[0].activity_type.level(), "warning");
        assert_eq!(events[0].message, "Escalacion solicitada");
        assert_eq!(
            events[0].details.as_deref(),
            Some("Usuario solicito agente humano")
        );
        assert_eq!(events[0].user_id.as_deref(), Some("50688887777"));
    }

    #[tokio::test]
    async fn conversation_details_preview_is_forty_chars() {
        let (recorder, storage, _dir) = recorder(50).await;
        let long = "a".repeat(100);
        recorder
            .conversation("u1", ChannelKind::Whatsapp, "text", &long)
            .await;

        let events = storage.recent_activities(1).await.unwrap();
        assert_eq!(events[0].message, "Nueva conversacion WhatsApp");
        assert_eq!(events[0].details.as_deref(), Some(format!("u1 - {}", "a".repeat(40)).as_str()));
    }

    #[tokio::test]
    async fn image_and_audio_events_are_labelled() {
        let (recorder, storage, _dir) = recorder(50).await;
        recorder.conversation("u1", ChannelKind::Whatsapp, "image", "").await;
        recorder.conversation("u1", ChannelKind::Whatsapp, "audio", "hola").await;

        let events = storage.recent_activities(2).await.unwrap();
        assert_eq!(events[0].message, "Audio recibido WhatsApp");
        assert_eq!(events[1].message, "Imagen recibida WhatsApp");
    }

    #[tokio::test]
    async fn trail_is_capped() {
        let (recorder, storage, _dir) = recorder(3).await;
        for i in 0..5 {
            recorder
                .record(ActivityType::System, format!("event {i}"), None, None)
                .await;
        }
        let events = storage.recent_activities(10).await.unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].message, "event 4");
    }

    #[tokio::test]
    async fn storage_failure_is_swallowed() {
        let storage = Arc::new(SqliteStorage::new(StorageConfig {
            database_path: "/nonexistent/never/opened.db".to_string(),
            wal_mode: false,
        }));
        let recorder = ActivityRecorder::new(storage, 10);
        // Never initialized: append fails, record must still return.
        recorder.system_started("concierge").await;
    }
}
