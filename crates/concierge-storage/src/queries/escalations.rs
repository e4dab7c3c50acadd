// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Escalation records with their notes and append-only audit history.
//!
//! Every mutation runs in one transaction together with its audit entry.

use concierge_core::ConciergeError;
use concierge_core::types::{
    AuditAction, AuditEntry, Escalation, EscalationNote, EscalationStatus, EscalationUpdate,
    HistoryTurn, ResolvedBy,
};
use rusqlite::{OptionalExtension, Transaction, params};

use crate::database::{Database, map_tr_err, monotonic_after, now_timestamp, parse_column};

/// Actor recorded when an agent-side change arrives without a name.
const UNNAMED_AGENT: &str = "agent";

const ESCALATION_COLUMNS: &str = "id, user_id, created_at, last_message, excerpt, status, resolved,
     resolved_by, resolved_at, priority, assigned_to";

fn map_escalation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Escalation> {
    let excerpt: String = row.get(4)?;
    let excerpt: Vec<HistoryTurn> = serde_json::from_str(&excerpt).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Escalation {
        id: row.get(0)?,
        user_id: row.get(1)?,
        created_at: row.get(2)?,
        last_message: row.get(3)?,
        excerpt,
        status: parse_column(5, row.get(5)?)?,
        resolved: row.get(6)?,
        resolved_by: row.get(7)?,
        resolved_at: row.get(8)?,
        priority: parse_column(9, row.get(9)?)?,
        assigned_to: row.get(10)?,
        notes: Vec::new(),
        history: Vec::new(),
    })
}

/// Fill in notes and history for a bare escalation row.
fn hydrate(conn: &rusqlite::Connection, mut escalation: Escalation) -> rusqlite::Result<Escalation> {
    let mut notes = conn.prepare_cached(
        "SELECT text, author, created_at FROM escalation_notes
         WHERE escalation_id = ?1 ORDER BY id",
    )?;
    escalation.notes = notes
        .query_map(params![escalation.id], |row| {
            Ok(EscalationNote {
                text: row.get(0)?,
                author: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<_>>()?;

    let mut history = conn.prepare_cached(
        "SELECT action, timestamp, actor, value FROM escalation_history
         WHERE escalation_id = ?1 ORDER BY id",
    )?;
    escalation.history = history
        .query_map(params![escalation.id], |row| {
            Ok(AuditEntry {
                action: parse_column::<AuditAction>(0, row.get(0)?)?,
                timestamp: row.get(1)?,
                actor: row.get(2)?,
                value: row.get(3)?,
            })
        })?
        .collect::<rusqlite::Result<_>>()?;
    Ok(escalation)
}

fn find_open(conn: &rusqlite::Connection, user_id: &str) -> rusqlite::Result<Option<Escalation>> {
    let open = conn
        .query_row(
            &format!("SELECT {ESCALATION_COLUMNS} FROM escalations WHERE user_id = ?1 AND resolved = 0"),
            params![user_id],
            map_escalation,
        )
        .optional()?;
    open.map(|escalation| hydrate(conn, escalation)).transpose()
}

fn open_id(tx: &Transaction<'_>, user_id: &str) -> rusqlite::Result<Option<i64>> {
    tx.query_row(
        "SELECT id FROM escalations WHERE user_id = ?1 AND resolved = 0",
        params![user_id],
        |row| row.get(0),
    )
    .optional()
}

/// Append one audit entry whose timestamp is never earlier than the previous one.
fn append_audit(
    tx: &Transaction<'_>,
    escalation_id: i64,
    action: AuditAction,
    actor: Option<&str>,
    value: Option<&str>,
) -> rusqlite::Result<String> {
    let last: Option<String> = tx.query_row(
        "SELECT MAX(timestamp) FROM escalation_history WHERE escalation_id = ?1",
        params![escalation_id],
        |row| row.get(0),
    )?;
    let timestamp = monotonic_after(last.as_deref());
    tx.execute(
        "INSERT INTO escalation_history (escalation_id, action, timestamp, actor, value)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![escalation_id, action.to_string(), timestamp, actor, value],
    )?;
    Ok(timestamp)
}

fn resolve_in(
    tx: &Transaction<'_>,
    escalation_id: i64,
    resolved_by: &ResolvedBy,
) -> rusqlite::Result<()> {
    let by = resolved_by.to_string();
    let timestamp = append_audit(
        tx,
        escalation_id,
        AuditAction::Resolved,
        Some(&by),
        Some(EscalationStatus::Resolved.label()),
    )?;
    tx.execute(
        "UPDATE escalations
         SET resolved = 1, status = ?1, resolved_by = ?2, resolved_at = ?3
         WHERE id = ?4",
        params![EscalationStatus::Resolved.to_string(), by, timestamp, escalation_id],
    )?;
    Ok(())
}

/// The unresolved escalation for `user_id`, if any.
pub async fn active(db: &Database, user_id: &str) -> Result<Option<Escalation>, ConciergeError> {
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Escalation>, rusqlite::Error> {
            find_open(conn, &user_id)
        })
        .await
        .map_err(map_tr_err)
}

/// Open an escalation unless one is already open; either way return the open record.
pub async fn open(
    db: &Database,
    user_id: &str,
    last_message: &str,
    excerpt: &[HistoryTurn],
) -> Result<Escalation, ConciergeError> {
    let user_id = user_id.to_string();
    let last_message = last_message.to_string();
    let excerpt = serde_json::to_string(excerpt).map_err(|e| ConciergeError::Storage {
        source: Box::new(e),
    })?;
    db.connection()
        .call(move |conn| -> Result<Escalation, rusqlite::Error> {
            let tx = conn.transaction()?;
            if open_id(&tx, &user_id)?.is_none() {
                tx.execute(
                    "INSERT INTO escalations (user_id, created_at, last_message, excerpt)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![user_id, now_timestamp(), last_message, excerpt],
                )?;
                let id = tx.last_insert_rowid();
                append_audit(&tx, id, AuditAction::Created, None, None)?;
            }
            tx.commit()?;
            find_open(conn, &user_id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
        })
        .await
        .map_err(map_tr_err)
}

/// Resolve the open escalation. `false` when there is none.
pub async fn resolve(
    db: &Database,
    user_id: &str,
    resolved_by: &ResolvedBy,
) -> Result<bool, ConciergeError> {
    let user_id = user_id.to_string();
    let resolved_by = resolved_by.clone();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let tx = conn.transaction()?;
            let Some(id) = open_id(&tx, &user_id)? else {
                return Ok(false);
            };
            resolve_in(&tx, id, &resolved_by)?;
            tx.commit()?;
            Ok(true)
        })
        .await
        .map_err(map_tr_err)
}

/// Apply one agent-facing change to the open escalation. `false` when there is none.
pub async fn mutate(
    db: &Database,
    user_id: &str,
    update: &EscalationUpdate,
    actor: Option<&str>,
) -> Result<bool, ConciergeError> {
    let user_id = user_id.to_string();
    let update = update.clone();
    let actor = actor.map(str::to_string);
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let tx = conn.transaction()?;
            let Some(id) = open_id(&tx, &user_id)? else {
                return Ok(false);
            };
            let actor = actor.as_deref();
            match &update {
                EscalationUpdate::Priority(priority) => {
                    tx.execute(
                        "UPDATE escalations SET priority = ?1 WHERE id = ?2",
                        params![priority.to_string(), id],
                    )?;
                    append_audit(&tx, id, AuditAction::PriorityChanged, actor, Some(priority.label()))?;
                }
                EscalationUpdate::Note(text) => {
                    tx.execute(
                        "INSERT INTO escalation_notes (escalation_id, text, author, created_at)
                         VALUES (?1, ?2, ?3, ?4)",
                        params![id, text, actor, now_timestamp()],
                    )?;
                    append_audit(&tx, id, AuditAction::NoteAdded, actor, Some(text.as_str()))?;
                }
                EscalationUpdate::Assign(Some(agent)) => {
                    tx.execute(
                        "UPDATE escalations SET assigned_to = ?1 WHERE id = ?2",
                        params![agent, id],
                    )?;
                    append_audit(&tx, id, AuditAction::Assigned, actor, Some(agent.as_str()))?;
                }
                EscalationUpdate::Assign(None) => {
                    tx.execute(
                        "UPDATE escalations SET assigned_to = NULL WHERE id = ?1",
                        params![id],
                    )?;
                    append_audit(&tx, id, AuditAction::Unassigned, actor, None)?;
                }
                EscalationUpdate::Status(EscalationStatus::Resolved) => {
                    let by = ResolvedBy::Agent(actor.unwrap_or(UNNAMED_AGENT).to_string());
                    resolve_in(&tx, id, &by)?;
                }
                EscalationUpdate::Status(status) => {
                    tx.execute(
                        "UPDATE escalations SET status = ?1 WHERE id = ?2",
                        params![status.to_string(), id],
                    )?;
                    append_audit(&tx, id, AuditAction::StatusChanged, actor, Some(status.label()))?;
                }
            }
            tx.commit()?;
            Ok(true)
        })
        .await
        .map_err(map_tr_err)
}

/// Escalations newest first, optionally including resolved ones.
pub async fn list(db: &Database, include_resolved: bool) -> Result<Vec<Escalation>, ConciergeError> {
    db.connection()
        .call(move |conn| -> Result<Vec<Escalation>, rusqlite::Error> {
            let filter = if include_resolved { "" } else { "WHERE resolved = 0" };
            let rows: Vec<Escalation> = {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ESCALATION_COLUMNS} FROM escalations {filter} ORDER BY id DESC"
                ))?;
                let mapped = stmt.query_map([], map_escalation)?;
                mapped.collect::<rusqlite::Result<_>>()?
            };
            rows.into_iter().map(|e| hydrate(conn, e)).collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Count escalations created and resolved inside `[start, end)`.
pub async fn counts_between(
    db: &Database,
    start: &str,
    end: &str,
) -> Result<(i64, i64), ConciergeError> {
    let start = start.to_string();
    let end = end.to_string();
    db.connection()
        .call(move |conn| -> Result<(i64, i64), rusqlite::Error> {
            let created = conn.query_row(
                "SELECT COUNT(*) FROM escalations WHERE created_at >= ?1 AND created_at < ?2",
                params![start, end],
                |row| row.get(0),
            )?;
            let resolved = conn.query_row(
                "SELECT COUNT(*) FROM escalations
                 WHERE resolved = 1 AND resolved_at >= ?1 AND resolved_at < ?2",
                params![start, end],
                |row| row.get(0),
            )?;
            Ok((created, resolved))
        })
        .await
        .map_err(map_tr_err)
}

/// Number of escalations still open.
pub async fn open_count(db: &Database) -> Result<i64, ConciergeError> {
    db.connection()
        .call(|conn| -> Result<i64, rusqlite::Error> {
            conn.query_row(
                "SELECT COUNT(*) FROM escalations WHERE resolved = 0",
                [],
                |row| row.get(0),
            )
        })
        .await
        .map_err(map_tr_err)
}
