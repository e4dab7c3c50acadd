// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Business-day calendar.
//!
//! Conversations are keyed by the business day, which starts at local
//! midnight for the configured UTC offset rather than UTC midnight.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Offset, Utc};

/// Turns instants into `YYYY-MM-DD` business days.
#[derive(Debug, Clone, Copy)]
pub struct BusinessClock {
    offset: FixedOffset,
    offset_minutes: i32,
}

impl BusinessClock {
    /// Offsets outside +/-24h fall back to UTC; config validation rejects them earlier.
    pub fn new(utc_offset_minutes: i32) -> Self {
        match FixedOffset::east_opt(utc_offset_minutes * 60) {
            Some(offset) => Self {
                offset,
                offset_minutes: utc_offset_minutes,
            },
            None => Self::utc(),
        }
    }

    pub fn utc() -> Self {
        Self {
            offset: Utc.fix(),
            offset_minutes: 0,
        }
    }

    pub fn offset_minutes(&self) -> i32 {
        self.offset_minutes
    }

    /// The business day containing `instant`.
    pub fn day_of(&self, instant: DateTime<Utc>) -> String {
        instant
            .with_timezone(&self.offset)
            .date_naive()
            .format("%Y-%m-%d")
            .to_string()
    }

    /// Today's business day.
    pub fn today(&self) -> String {
        self.day_of(Utc::now())
    }

    /// The business day `days` before today.
    pub fn days_ago(&self, days: u32) -> String {
        self.day_of(Utc::now() - Duration::days(i64::from(days)))
    }

    /// Shift a `YYYY-MM-DD` day by `days`; `None` if the input does not parse.
    pub fn shift_day(day: &str, days: i64) -> Option<String> {
        let date = NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()?;
        let shifted = date.checked_add_signed(Duration::days(days))?;
        Some(shifted.format("%Y-%m-%d").to_string())
    }
}

impl Default for BusinessClock {
    fn default() -> Self {
        Self::utc()
    }
}
