// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-user, per-day conversation log with bounded in-memory history windows.
//!
//! Storage holds every turn of the day; the window holds only the most
//! recent `history_window` responder exchanges. Each stored turn carries the
//! text it contributes to the window (none for FAQ answers and handoffs), so
//! a window rebuilt from storage after a restart or eviction matches the one
//! kept live. Windows belong to one business day and are rebuilt when the
//! day changes.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use concierge_core::traits::StorageAdapter;
use concierge_core::types::{ChannelKind, HistoryTurn, Role};
use concierge_core::ConciergeError;

use crate::clock::BusinessClock;

/// Sizing knobs for the log, taken from `[routing]`.
#[derive(Debug, Clone, Copy)]
pub struct LogLimits {
    pub history_window: usize,
    pub excerpt_turns: usize,
    pub max_content_chars: usize,
}

/// Identifies who an exchange belongs to.
#[derive(Debug, Clone, Copy)]
pub struct Participant<'a> {
    pub user_id: &'a str,
    pub channel: ChannelKind,
    pub display_name: Option<&'a str>,
}

struct Window {
    day: String,
    turns: VecDeque<HistoryTurn>,
}

pub struct ConversationLog {
    storage: Arc<dyn StorageAdapter + Send + Sync>,
    clock: BusinessClock,
    limits: LogLimits,
    windows: DashMap<String, Window>,
}

impl ConversationLog {
    pub fn new(
        storage: Arc<dyn StorageAdapter + Send + Sync>,
        clock: BusinessClock,
        limits: LogLimits,
    ) -> Self {
        Self {
            storage,
            clock,
            limits: LogLimits {
                history_window: limits.history_window.max(1),
                excerpt_turns: limits.excerpt_turns.max(1),
                max_content_chars: limits.max_content_chars.max(1),
            },
            windows: DashMap::new(),
        }
    }

    pub fn limits(&self) -> LogLimits {
        self.limits
    }

    /// Store both sides of an exchange that stays out of the responder's window.
    pub async fn record_exchange(
        &self,
        who: Participant<'_>,
        user_content: &str,
        assistant_content: &str,
    ) -> Result<(), ConciergeError> {
        let day = self.clock.today();
        self.append(who, &day, Role::User, user_content, None).await?;
        self.append(who, &day, Role::Assistant, assistant_content, None)
            .await
    }

    /// Store a responder exchange and push it into the user's window.
    ///
    /// `logged_user` is what the day's log shows; `context_user` is what the
    /// responder sees on later turns.
    pub async fn record_answer(
        &self,
        who: Participant<'_>,
        logged_user: &str,
        context_user: &str,
        reply: &str,
    ) -> Result<(), ConciergeError> {
        let day = self.clock.today();
        let max = self.limits.max_content_chars;
        let context_user = truncate_chars(context_user, max);
        let reply = truncate_chars(reply, max);
        self.append(who, &day, Role::User, logged_user, Some(context_user))
            .await?;
        self.append(who, &day, Role::Assistant, reply, Some(reply))
            .await?;
        self.remember(who.user_id, &day, context_user, reply);
        Ok(())
    }

    async fn append(
        &self,
        who: Participant<'_>,
        day: &str,
        role: Role,
        content: &str,
        context: Option<&str>,
    ) -> Result<(), ConciergeError> {
        let content = truncate_chars(content, self.limits.max_content_chars);
        self.storage
            .append_message(who.user_id, day, who.channel, who.display_name, role, content, context)
            .await
    }

    /// The bounded window handed to the responder, oldest first.
    pub async fn history(&self, user_id: &str) -> Result<Vec<HistoryTurn>, ConciergeError> {
        let day = self.clock.today();
        if let Some(window) = self.windows.get(user_id)
            && window.day == day
        {
            return Ok(window.turns.iter().cloned().collect());
        }

        let window = self.hydrate(user_id, day).await?;
        let turns = window.turns.iter().cloned().collect();
        self.windows.insert(user_id.to_string(), window);
        Ok(turns)
    }

    /// The last `excerpt_turns` turns, captured when an escalation opens.
    pub async fn excerpt(&self, user_id: &str) -> Result<Vec<HistoryTurn>, ConciergeError> {
        let history = self.history(user_id).await?;
        Ok(tail(history, self.limits.excerpt_turns))
    }

    /// The excerpt computed from an already-fetched window.
    pub fn excerpt_of(&self, history: &[HistoryTurn]) -> Vec<HistoryTurn> {
        tail(history.to_vec(), self.limits.excerpt_turns)
    }

    /// Push an exchange into today's window, evicting the oldest turns.
    ///
    /// A missing or stale window is left for [`history`](Self::history) to
    /// rebuild from storage, which already holds this exchange.
    fn remember(&self, user_id: &str, day: &str, user_turn: &str, assistant_turn: &str) {
        let cap = self.limits.history_window;
        let stale = match self.windows.get_mut(user_id) {
            Some(mut window) if window.day == day => {
                for turn in [HistoryTurn::user(user_turn), HistoryTurn::assistant(assistant_turn)] {
                    if window.turns.len() == cap {
                        window.turns.pop_front();
                    }
                    window.turns.push_back(turn);
                }
                false
            }
            Some(_) => true,
            None => false,
        };
        if stale {
            self.windows.remove(user_id);
        }
    }

    /// Drop a user's window; the next access rehydrates from storage.
    pub fn forget(&self, user_id: &str) {
        self.windows.remove(user_id);
    }

    /// Number of users with a window in memory.
    pub fn cached_users(&self) -> usize {
        self.windows.len()
    }

    async fn hydrate(&self, user_id: &str, day: String) -> Result<Window, ConciergeError> {
        let stored = self.storage.get_conversation(user_id, &day).await?;
        let turns: Vec<HistoryTurn> = stored
            .map(|c| {
                c.messages
                    .into_iter()
                    .filter_map(|m| {
                        m.context.map(|content| HistoryTurn {
                            role: m.role,
                            content,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        let turns: VecDeque<HistoryTurn> =
            tail(turns, self.limits.history_window).into_iter().collect();
        debug!(user_id = %user_id, turns = turns.len(), "hydrated history window");
        Ok(Window { day, turns })
    }
}

/// Cut `content` to at most `max_chars` characters without splitting a code point.
pub fn truncate_chars(content: &str, max_chars: usize) -> &str {
    match content.char_indices().nth(max_chars) {
        Some((idx, _)) => &content[..idx],
        None => content,
    }
}

fn tail(mut turns: Vec<HistoryTurn>, n: usize) -> Vec<HistoryTurn> {
    if turns.len() > n {
        turns.drain(..turns.len() - n);
    }
    turns
}

#[cfg(test)]
mod tests {
    use super::*;
    use concierge_config::model::StorageConfig;
    use concierge_storage::SqliteStorage;

    async fn log_with(limits: LogLimits) -> (ConversationLog, Arc<SqliteStorage>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(SqliteStorage::new(StorageConfig {
            database_path: dir.path().join("test.db").to_string_lossy().into_owned(),
            wal_mode: true,
        }));
        storage.initialize().await.unwrap();
        let log = ConversationLog::new(storage.clone(), BusinessClock::utc(), limits);
        (log, storage, dir)
    }

    fn limits() -> LogLimits {
        LogLimits {
            history_window: 4,
            excerpt_turns: 3,
            max_content_chars: 10,
        }
    }

    fn who(user_id: &str) -> Participant<'_> {
        Participant {
            user_id,
            channel: ChannelKind::Whatsapp,
            display_name: Some("Ana"),
        }
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("canción", 6), "canció");
        assert_eq!(truncate_chars("ñññ", 2), "ññ");
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[tokio::test]
    async fn exchange_is_stored_truncated() {
        let (log, storage, _dir) = log_with(limits()).await;
        log.record_exchange(who("u1"), "una pregunta muy larga", "ok")
            .await
            .unwrap();

        let conv = storage
            .get_conversation("u1", &BusinessClock::utc().today())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conv.message_count(), 2);
        assert_eq!(conv.messages[0].role, Role::User);
        assert_eq!(conv.messages[0].content, "una pregun");
        assert_eq!(conv.messages[0].context, None);
        assert_eq!(conv.messages[1].role, Role::Assistant);
        assert_eq!(conv.display_name.as_deref(), Some("Ana"));
    }

    #[tokio::test]
    async fn window_is_bounded_and_evicts_oldest() {
        let (log, _storage, _dir) = log_with(limits()).await;
        assert!(log.history("u1").await.unwrap().is_empty());
        for i in 0..3 {
            log.record_answer(who("u1"), &format!("q{i}"), &format!("q{i}"), &format!("a{i}"))
                .await
                .unwrap();
        }
        let history = log.history("u1").await.unwrap();
        let contents: Vec<_> = history.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["q1", "a1", "q2", "a2"]);
    }

    #[tokio::test]
    async fn excerpt_takes_last_turns() {
        let (log, _storage, _dir) = log_with(limits()).await;
        log.record_answer(who("u1"), "q0", "q0", "a0").await.unwrap();
        log.record_answer(who("u1"), "q1", "q1", "a1").await.unwrap();
        let excerpt = log.excerpt("u1").await.unwrap();
        let contents: Vec<_> = excerpt.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["a0", "q1", "a1"]);
    }

    #[tokio::test]
    async fn window_hydrates_from_today_after_restart() {
        let (log, storage, _dir) = log_with(limits()).await;
        log.record_answer(who("u1"), "q0", "q0", "a0").await.unwrap();
        log.record_answer(who("u1"), "q1", "q1", "a1").await.unwrap();
        log.record_answer(who("u1"), "q2", "q2", "a2").await.unwrap();

        let restarted = ConversationLog::new(storage, BusinessClock::utc(), limits());
        assert_eq!(restarted.cached_users(), 0);
        let history = restarted.history("u1").await.unwrap();
        let contents: Vec<_> = history.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["q1", "a1", "q2", "a2"]);
        assert_eq!(restarted.cached_users(), 1);
    }

    #[tokio::test]
    async fn rebuilt_window_matches_live_window() {
        let (log, storage, _dir) = log_with(limits()).await;
        log.history("u1").await.unwrap();
        log.record_answer(who("u1"), "[Audio]: hola", "hola", "Hola!")
            .await
            .unwrap();
        log.record_exchange(who("u1"), "horario", "8 a 5").await.unwrap();
        log.record_exchange(who("u1"), "un agente", "Te comunico").await.unwrap();
        log.record_answer(who("u1"), "[Imagen]", "[Imagen]", "Veo una factura")
            .await
            .unwrap();

        let live = log.history("u1").await.unwrap();
        let restarted = ConversationLog::new(storage, BusinessClock::utc(), limits());
        let rebuilt = restarted.history("u1").await.unwrap();
        assert_eq!(live, rebuilt);
        let contents: Vec<_> = live.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["hola", "Hola!", "[Imagen]", "Veo una fa"]);
    }

    #[tokio::test]
    async fn window_from_another_day_is_rebuilt() {
        let (log, _storage, _dir) = log_with(limits()).await;
        log.windows.insert(
            "u1".to_string(),
            Window {
                day: "2000-01-01".to_string(),
                turns: VecDeque::from(vec![HistoryTurn::user("ayer"), HistoryTurn::assistant("ok")]),
            },
        );
        assert!(log.history("u1").await.unwrap().is_empty());

        log.record_answer(who("u1"), "hoy", "hoy", "listo").await.unwrap();
        let contents: Vec<_> = log
            .history("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.content)
            .collect();
        assert_eq!(contents, vec!["hoy", "listo"]);
    }

    #[tokio::test]
    async fn stale_window_is_dropped_instead_of_extended() {
        let (log, _storage, _dir) = log_with(limits()).await;
        log.windows.insert(
            "u1".to_string(),
            Window {
                day: "2000-01-01".to_string(),
                turns: VecDeque::from(vec![HistoryTurn::user("ayer")]),
            },
        );
        log.record_answer(who("u1"), "hoy", "hoy", "listo").await.unwrap();
        assert_eq!(log.cached_users(), 0);
    }

    #[tokio::test]
    async fn unknown_user_has_empty_history() {
        let (log, _storage, _dir) = log_with(limits()).await;
        assert!(log.history("nobody").await.unwrap().is_empty());
        assert!(log.excerpt("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn forget_drops_window() {
        let (log, _storage, _dir) = log_with(limits()).await;
        log.history("u1").await.unwrap();
        assert_eq!(log.cached_users(), 1);
        log.forget("u1");
        assert_eq!(log.cached_users(), 0);
    }
}
