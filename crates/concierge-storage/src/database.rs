// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background thread.
//! Do NOT create additional Connection instances for writes.

use std::path::Path;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use concierge_core::ConciergeError;
use tracing::debug;

use crate::migrations::run_migrations;

/// Handle to the single SQLite connection.
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (creating if needed) the database at `path`, apply PRAGMAs, and run migrations.
    pub async fn open(path: &str, wal_mode: bool) -> Result<Self, ConciergeError> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| ConciergeError::Storage {
                source: Box::new(e),
            })?;
        }

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| ConciergeError::Storage {
                source: Box::new(e),
            })?;

        conn.call(move |conn| -> Result<(), rusqlite::Error> {
            let journal = if wal_mode { "WAL" } else { "DELETE" };
            conn.execute_batch(&format!(
                "PRAGMA journal_mode = {journal};
                 PRAGMA foreign_keys = ON;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA busy_timeout = 5000;"
            ))?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        conn.call(|conn| -> Result<(), ConciergeError> { run_migrations(conn) })
            .await
            .map_err(|e| ConciergeError::storage(format!("migration failed: {e}")))?;

        debug!(path, wal_mode, "database opened");
        Ok(Self { conn })
    }

    /// The underlying async connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }
}

/// Convert a tokio-rusqlite call error into a storage error.
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> ConciergeError {
    ConciergeError::Storage {
        source: Box::new(e),
    }
}

/// Current time as a fixed-width RFC 3339 UTC string.
///
/// Fixed width keeps lexicographic and chronological order identical.
pub(crate) fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A timestamp strictly later than `previous`.
///
/// Uses now unless that is not past `previous` (same millisecond or clock
/// skew), in which case `previous + 1ms`.
pub(crate) fn monotonic_after(previous: Option<&str>) -> String {
    let now = Utc::now();
    let floor = previous
        .and_then(|prev| DateTime::parse_from_rfc3339(prev).ok())
        .map(|prev| prev.with_timezone(&Utc) + chrono::Duration::milliseconds(1));
    let stamp = match floor {
        Some(floor) if floor > now => floor,
        _ => now,
    };
    stamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// UTC `[start, end)` bounds of a business day shifted by `utc_offset_minutes`.
pub(crate) fn day_bounds(day: &str, utc_offset_minutes: i32) -> Result<(String, String), ConciergeError> {
    let date = NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map_err(|e| ConciergeError::storage(format!("invalid day `{day}`: {e}")))?;
    let local_midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| ConciergeError::storage(format!("invalid day `{day}`")))?;
    let start = local_midnight - chrono::Duration::minutes(i64::from(utc_offset_minutes));
    let end = start + chrono::Duration::days(1);
    Ok((
        start.and_utc().to_rfc3339_opts(SecondsFormat::Millis, true),
        end.and_utc().to_rfc3339_opts(SecondsFormat::Millis, true),
    ))
}

/// Parse a text column through `FromStr`, reporting failures as conversion errors.
pub(crate) fn parse_column<T>(idx: usize, value: String) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
