// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Daily metrics rollup.
//!
//! Conversations from days before today are folded into one
//! [`DailySnapshot`] per day and then purged. Snapshots older than the
//! retention window are pruned.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use concierge_core::traits::StorageAdapter;
use concierge_core::types::DailySnapshot;
use concierge_core::ConciergeError;

use crate::clock::BusinessClock;

/// What one rollup pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollupReport {
    /// Days folded into snapshots, ascending.
    pub days: Vec<String>,
    pub conversations_purged: usize,
    pub snapshots_pruned: usize,
}

pub struct MetricsRollup {
    storage: Arc<dyn StorageAdapter + Send + Sync>,
    clock: BusinessClock,
    retention_days: u32,
}

impl MetricsRollup {
    pub fn new(
        storage: Arc<dyn StorageAdapter + Send + Sync>,
        clock: BusinessClock,
        retention_days: u32,
    ) -> Self {
        Self {
            storage,
            clock,
            retention_days,
        }
    }

    /// Fold every finished day, purge its conversations, and prune old snapshots.
    pub async fn run_once(&self) -> Result<RollupReport, ConciergeError> {
        let today = self.clock.today();
        let mut report = RollupReport::default();

        for day in self.storage.conversation_days_before(&today).await? {
            let snapshot = self
                .storage
                .summarize_day(&day, self.clock.offset_minutes())
                .await?;
            self.storage.upsert_snapshot(&snapshot).await?;
            let purged = self.storage.purge_conversations(&day).await?;
            debug!(
                day = %day,
                conversations = snapshot.total_conversations,
                purged,
                "day folded into snapshot"
            );
            report.conversations_purged += purged;
            report.days.push(day);
        }

        let cutoff = self.clock.days_ago(self.retention_days);
        report.snapshots_pruned = self.storage.prune_snapshots(&cutoff).await?;

        if !report.days.is_empty() || report.snapshots_pruned > 0 {
            info!(
                days = report.days.len(),
                purged = report.conversations_purged,
                pruned = report.snapshots_pruned,
                "metrics rollup complete"
            );
        }
        Ok(report)
    }

    /// Compare the latest snapshot of `metric` with the mean of up to `days` before it.
    ///
    /// `None` when the metric name is unknown or fewer than two snapshots exist.
    pub async fn trend(&self, metric: &str, days: usize) -> Result<Option<Trend>, ConciergeError> {
        let snapshots = self.storage.recent_snapshots(days + 1).await?;
        Ok(Trend::from_snapshots(metric, &snapshots))
    }

    pub async fn recent(&self, n: usize) -> Result<Vec<DailySnapshot>, ConciergeError> {
        self.storage.recent_snapshots(n).await
    }

    /// Run [`run_once`](Self::run_once) every `interval` until `cancel` fires.
    ///
    /// The first pass runs immediately so that days missed while the process
    /// was down are folded at startup.
    pub fn spawn(self: Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("metrics rollup stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.run_once().await {
                            error!(error = %e, "metrics rollup failed");
                        }
                    }
                }
            }
        })
    }
}

/// Direction of change for a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Flat,
}

/// Latest value of a metric against the mean of the preceding days.
#[derive(Debug, Clone, PartialEq)]
pub struct Trend {
    pub metric: String,
    pub latest: f64,
    pub previous_mean: f64,
    /// Percent change, rounded to 1 decimal; 0 when the previous mean is 0.
    pub change_pct: f64,
}

impl Trend {
    /// `snapshots` must be newest first.
    pub(crate) fn from_snapshots(metric: &str, snapshots: &[DailySnapshot]) -> Option<Self> {
        let (latest, previous) = snapshots.split_first()?;
        let latest = latest.metric(metric)?;
        let values: Vec<f64> = previous.iter().filter_map(|s| s.metric(metric)).collect();
        if values.is_empty() {
            return None;
        }
        let previous_mean = values.iter().sum::<f64>() / values.len() as f64;
        let change_pct = if previous_mean == 0.0 {
            0.0
        } else {
            ((latest - previous_mean) / previous_mean * 100.0 * 10.0).round() / 10.0
        };
        Some(Self {
            metric: metric.to_string(),
            latest,
            previous_mean,
            change_pct,
        })
    }

    pub fn direction(&self) -> Direction {
        if self.change_pct > 0.0 {
            Direction::Up
        } else if self.change_pct < 0.0 {
            Direction::Down
        } else {
            Direction::Flat
        }
    }
}
