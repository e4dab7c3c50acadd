// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded activity trail.

use concierge_core::ConciergeError;
use concierge_core::types::ActivityEvent;
use rusqlite::params;

use crate::database::{Database, map_tr_err, parse_column};

/// Insert an event and keep only the newest `max_entries` rows.
pub async fn append(
    db: &Database,
    event: &ActivityEvent,
    max_entries: usize,
) -> Result<(), ConciergeError> {
    let event = event.clone();
    let keep = i64::try_from(max_entries).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO activities (activity_type, message, details, user_id, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    event.activity_type.to_string(),
                    event.message,
                    event.details,
                    event.user_id,
                    event.timestamp,
                ],
            )?;
            tx.execute(
                "DELETE FROM activities WHERE id NOT IN
                     (SELECT id FROM activities ORDER BY id DESC LIMIT ?1)",
                params![keep],
            )?;
            tx.commit()
        })
        .await
        .map_err(map_tr_err)
}

/// The newest `limit` events, newest first.
pub async fn recent(db: &Database, limit: usize) -> Result<Vec<ActivityEvent>, ConciergeError> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| -> Result<Vec<ActivityEvent>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT activity_type, message, details, user_id, timestamp
                 FROM activities ORDER BY id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], |row| {
                Ok(ActivityEvent {
                    activity_type: parse_column(0, row.get(0)?)?,
                    message: row.get(1)?,
                    details: row.get(2)?,
                    user_id: row.get(3)?,
                    timestamp: row.get(4)?,
                })
            })?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}
