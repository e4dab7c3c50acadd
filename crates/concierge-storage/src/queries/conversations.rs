// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-user, per-day conversation log.

use concierge_core::ConciergeError;
use concierge_core::types::{ChannelKind, Conversation, ConversationMessage, Role};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err, monotonic_after, now_timestamp, parse_column};

/// Append one turn, creating the (user, day) conversation on first use.
#[allow(clippy::too_many_arguments)]
pub async fn append_message(
    db: &Database,
    user_id: &str,
    day: &str,
    channel: ChannelKind,
    display_name: Option<&str>,
    role: Role,
    content: &str,
    context: Option<&str>,
) -> Result<(), ConciergeError> {
    let user_id = user_id.to_string();
    let day = day.to_string();
    let display_name = display_name.map(str::to_string);
    let content = content.to_string();
    let context = context.map(str::to_string);
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            let tx = conn.transaction()?;
            let now = now_timestamp();
            tx.execute(
                "INSERT INTO conversations (user_id, day, channel, display_name, started_at, last_message_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                 ON CONFLICT(user_id, day) DO UPDATE SET
                     display_name = COALESCE(excluded.display_name, conversations.display_name)",
                params![user_id, day, channel.to_string(), display_name, now],
            )?;
            let (conversation_id, last): (i64, String) = tx.query_row(
                "SELECT id, last_message_at FROM conversations WHERE user_id = ?1 AND day = ?2",
                params![user_id, day],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            let timestamp = monotonic_after(Some(&last));
            tx.execute(
                "INSERT INTO conversation_messages (conversation_id, role, content, timestamp, context)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![conversation_id, role.to_string(), content, timestamp, context],
            )?;
            tx.execute(
                "UPDATE conversations SET last_message_at = ?1 WHERE id = ?2",
                params![timestamp, conversation_id],
            )?;
            tx.commit()
        })
        .await
        .map_err(map_tr_err)
}

struct ConversationRow {
    id: i64,
    conversation: Conversation,
}

fn map_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        conversation: Conversation {
            user_id: row.get(1)?,
            day: row.get(2)?,
            channel: parse_column(3, row.get(3)?)?,
            display_name: row.get(4)?,
            started_at: row.get(5)?,
            last_message_at: row.get(6)?,
            messages: Vec::new(),
        },
    })
}

fn load_messages(
    conn: &rusqlite::Connection,
    conversation_id: i64,
) -> rusqlite::Result<Vec<ConversationMessage>> {
    let mut stmt = conn.prepare_cached(
        "SELECT role, content, timestamp, context FROM conversation_messages
         WHERE conversation_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![conversation_id], |row| {
        Ok(ConversationMessage {
            role: parse_column::<Role>(0, row.get(0)?)?,
            content: row.get(1)?,
            timestamp: row.get(2)?,
            context: row.get(3)?,
        })
    })?;
    rows.collect()
}

/// The conversation for one user on one day, with its messages in order.
pub async fn get_conversation(
    db: &Database,
    user_id: &str,
    day: &str,
) -> Result<Option<Conversation>, ConciergeError> {
    let user_id = user_id.to_string();
    let day = day.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Conversation>, rusqlite::Error> {
            let row = conn
                .query_row(
                    "SELECT id, user_id, day, channel, display_name, started_at, last_message_at
                     FROM conversations WHERE user_id = ?1 AND day = ?2",
                    params![user_id, day],
                    map_conversation,
                )
                .optional()?;
            match row {
                Some(ConversationRow {
                    id,
                    mut conversation,
                }) => {
                    conversation.messages = load_messages(conn, id)?;
                    Ok(Some(conversation))
                }
                None => Ok(None),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Every conversation on `day`, most recently active first.
pub async fn list_conversations(
    db: &Database,
    day: &str,
) -> Result<Vec<Conversation>, ConciergeError> {
    let day = day.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<Conversation>, rusqlite::Error> {
            let rows: Vec<ConversationRow> = {
                let mut stmt = conn.prepare(
                    "SELECT id, user_id, day, channel, display_name, started_at, last_message_at
                     FROM conversations WHERE day = ?1 ORDER BY last_message_at DESC",
                )?;
                let mapped = stmt.query_map(params![day], map_conversation)?;
                mapped.collect::<rusqlite::Result<_>>()?
            };
            rows.into_iter()
                .map(|ConversationRow { id, mut conversation }| {
                    conversation.messages = load_messages(conn, id)?;
                    Ok(conversation)
                })
                .collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Distinct days strictly before `day` that still hold conversations, ascending.
pub async fn days_before(db: &Database, day: &str) -> Result<Vec<String>, ConciergeError> {
    let day = day.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<String>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT day FROM conversations WHERE day < ?1 ORDER BY day",
            )?;
            let rows = stmt.query_map(params![day], |row| row.get(0))?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Delete the conversations of one day; messages cascade.
pub async fn purge_day(db: &Database, day: &str) -> Result<usize, ConciergeError> {
    let day = day.to_string();
    db.connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute("DELETE FROM conversations WHERE day = ?1", params![day])
        })
        .await
        .map_err(map_tr_err)
}
