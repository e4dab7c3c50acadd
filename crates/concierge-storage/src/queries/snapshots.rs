// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Daily metric snapshots and the aggregate reads that feed them.

use concierge_core::ConciergeError;
use concierge_core::types::{ChannelKind, DailySnapshot, LiveStats};
use rusqlite::params;

use crate::database::{Database, map_tr_err, now_timestamp};

const SNAPSHOT_COLUMNS: &str = "day, total_conversations, whatsapp_conversations,
     teams_conversations, total_messages, unique_users, escalations_created,
     escalations_resolved, bot_success_rate, escalation_resolution_rate";

fn map_snapshot(row: &rusqlite::Row<'_>) -> rusqlite::Result<DailySnapshot> {
    Ok(DailySnapshot {
        day: row.get(0)?,
        total_conversations: row.get(1)?,
        whatsapp_conversations: row.get(2)?,
        teams_conversations: row.get(3)?,
        total_messages: row.get(4)?,
        unique_users: row.get(5)?,
        escalations_created: row.get(6)?,
        escalations_resolved: row.get(7)?,
        bot_success_rate: row.get(8)?,
        escalation_resolution_rate: row.get(9)?,
    })
}

/// Conversation-side counts for one day, with rates left at zero.
pub async fn conversation_totals(db: &Database, day: &str) -> Result<DailySnapshot, ConciergeError> {
    let day = day.to_string();
    db.connection()
        .call(move |conn| -> Result<DailySnapshot, rusqlite::Error> {
            let (total, whatsapp, teams, users): (i64, i64, i64, i64) = conn.query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(channel = ?2), 0),
                        COALESCE(SUM(channel = ?3), 0),
                        COUNT(DISTINCT user_id)
                 FROM conversations WHERE day = ?1",
                params![
                    day,
                    ChannelKind::Whatsapp.to_string(),
                    ChannelKind::Teams.to_string()
                ],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;
            let messages: i64 = conn.query_row(
                "SELECT COUNT(*) FROM conversation_messages m
                 JOIN conversations c ON c.id = m.conversation_id
                 WHERE c.day = ?1",
                params![day],
                |row| row.get(0),
            )?;
            Ok(DailySnapshot {
                day,
                total_conversations: total,
                whatsapp_conversations: whatsapp,
                teams_conversations: teams,
                total_messages: messages,
                unique_users: users,
                ..DailySnapshot::default()
            })
        })
        .await
        .map_err(map_tr_err)
}

/// Live counters for `day` plus the global open-escalation count.
pub async fn live_stats(db: &Database, day: &str, open_escalations: i64) -> Result<LiveStats, ConciergeError> {
    let totals = conversation_totals(db, day).await?;
    Ok(LiveStats {
        active_conversations: totals.total_conversations,
        open_escalations,
        messages_today: totals.total_messages,
        unique_users: totals.unique_users,
    })
}

/// Insert or replace the snapshot for its day.
pub async fn upsert(db: &Database, snapshot: &DailySnapshot) -> Result<(), ConciergeError> {
    let s = snapshot.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                &format!(
                    "INSERT INTO metric_snapshots ({SNAPSHOT_COLUMNS}, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                     ON CONFLICT(day) DO UPDATE SET
                         total_conversations = excluded.total_conversations,
                         whatsapp_conversations = excluded.whatsapp_conversations,
                         teams_conversations = excluded.teams_conversations,
                         total_messages = excluded.total_messages,
                         unique_users = excluded.unique_users,
                         escalations_created = excluded.escalations_created,
                         escalations_resolved = excluded.escalations_resolved,
                         bot_success_rate = excluded.bot_success_rate,
                         escalation_resolution_rate = excluded.escalation_resolution_rate"
                ),
                params![
                    s.day,
                    s.total_conversations,
                    s.whatsapp_conversations,
                    s.teams_conversations,
                    s.total_messages,
                    s.unique_users,
                    s.escalations_created,
                    s.escalations_resolved,
                    s.bot_success_rate,
                    s.escalation_resolution_rate,
                    now_timestamp(),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// The newest `n` snapshots, newest first.
pub async fn recent(db: &Database, n: usize) -> Result<Vec<DailySnapshot>, ConciergeError> {
    let n = i64::try_from(n).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| -> Result<Vec<DailySnapshot>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SNAPSHOT_COLUMNS} FROM metric_snapshots ORDER BY day DESC LIMIT ?1"
            ))?;
            let rows = stmt.query_map(params![n], map_snapshot)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Snapshots with `start <= day <= end`, ascending.
pub async fn between(
    db: &Database,
    start: &str,
    end: &str,
) -> Result<Vec<DailySnapshot>, ConciergeError> {
    let start = start.to_string();
    let end = end.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<DailySnapshot>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SNAPSHOT_COLUMNS} FROM metric_snapshots
                 WHERE day >= ?1 AND day <= ?2 ORDER BY day"
            ))?;
            let rows = stmt.query_map(params![start, end], map_snapshot)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Delete snapshots older than `before_day`.
pub async fn prune(db: &Database, before_day: &str) -> Result<usize, ConciergeError> {
    let before_day = before_day.to_string();
    db.connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "DELETE FROM metric_snapshots WHERE day < ?1",
                params![before_day],
            )
        })
        .await
        .map_err(map_tr_err)
}
