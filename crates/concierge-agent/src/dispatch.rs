// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-user lanes.
//!
//! Each active user gets one worker task fed by an unbounded FIFO queue.
//! Units from the same user are routed strictly in arrival order; different
//! users run concurrently. The dispatcher is owned by a single task, so lane
//! creation and reaping never race with each other.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use concierge_core::types::InboundUnit;

use crate::mask_user;
use crate::metrics;
use crate::router::MessageRouter;

struct Lane {
    user_id: String,
    tx: mpsc::UnboundedSender<InboundUnit>,
    /// Units queued or in flight.
    pending: Arc<AtomicUsize>,
    last_used: Instant,
    handle: JoinHandle<()>,
}

impl Lane {
    fn spawn(router: Arc<MessageRouter>, user_id: &str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let handle = tokio::spawn(run_lane(router, rx, pending.clone()));
        Self {
            user_id: user_id.to_string(),
            tx,
            pending,
            last_used: Instant::now(),
            handle,
        }
    }

    fn is_idle(&self, idle: Duration) -> bool {
        self.pending.load(Ordering::SeqCst) == 0 && self.last_used.elapsed() >= idle
    }
}

async fn run_lane(
    router: Arc<MessageRouter>,
    mut rx: mpsc::UnboundedReceiver<InboundUnit>,
    pending: Arc<AtomicUsize>,
) {
    while let Some(unit) = rx.recv().await {
        router.route(unit).await;
        pending.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Routes inbound units onto per-user lanes.
pub struct LaneDispatcher {
    router: Arc<MessageRouter>,
    lanes: HashMap<String, Lane>,
    idle: Duration,
}

impl LaneDispatcher {
    pub fn new(router: Arc<MessageRouter>, idle: Duration) -> Self {
        Self {
            router,
            lanes: HashMap::new(),
            idle,
        }
    }

    /// Queue `unit` on its user's lane, opening the lane if needed.
    pub fn dispatch(&mut self, unit: InboundUnit) {
        let key = lane_key(&unit);

        let unit = match self.lanes.get_mut(&key) {
            Some(lane) if !lane.handle.is_finished() => {
                lane.pending.fetch_add(1, Ordering::SeqCst);
                lane.last_used = Instant::now();
                match lane.tx.send(unit) {
                    Ok(()) => return,
                    Err(mpsc::error::SendError(unit)) => {
                        lane.pending.fetch_sub(1, Ordering::SeqCst);
                        warn!(lane = %mask_user(&key), "lane closed unexpectedly, respawning");
                        unit
                    }
                }
            }
            _ => unit,
        };

        let lane = Lane::spawn(self.router.clone(), &unit.user_id);
        lane.pending.fetch_add(1, Ordering::SeqCst);
        if lane.tx.send(unit).is_err() {
            // The receiver was created above and cannot be closed yet.
            lane.pending.fetch_sub(1, Ordering::SeqCst);
        }
        debug!(lane = %mask_user(&key), "lane opened");
        self.lanes.insert(key, lane);
        metrics::active_lanes(self.lanes.len());
    }

    /// Close lanes with nothing queued or in flight for the idle period,
    /// dropping their users' history windows.
    pub fn reap_idle(&mut self) -> usize {
        let before = self.lanes.len();
        let idle = self.idle;
        let log = self.router.conversation_log();
        self.lanes.retain(|_, lane| {
            let reap = lane.handle.is_finished() || lane.is_idle(idle);
            if reap {
                log.forget(&lane.user_id);
            }
            !reap
        });
        let reaped = before - self.lanes.len();
        if reaped > 0 {
            debug!(reaped, remaining = self.lanes.len(), "idle lanes reaped");
            metrics::active_lanes(self.lanes.len());
        }
        reaped
    }

    pub fn active_lanes(&self) -> usize {
        self.lanes.len()
    }

    /// Units queued or in flight across all lanes.
    pub fn pending(&self) -> usize {
        self.lanes
            .values()
            .map(|l| l.pending.load(Ordering::SeqCst))
            .sum()
    }

    /// Close every lane and wait up to `drain` for queued units to finish.
    ///
    /// Lanes still busy at the deadline are aborted.
    pub async fn shutdown(self, drain: Duration) {
        let pending = self.pending();
        info!(
            lanes = self.lanes.len(),
            pending, "draining lanes"
        );

        let mut handles = Vec::with_capacity(self.lanes.len());
        for (_, lane) in self.lanes {
            drop(lane.tx);
            handles.push(lane.handle);
        }

        let deadline = tokio::time::Instant::now() + drain;
        let mut aborted = 0usize;
        for mut handle in handles {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "lane task ended abnormally"),
                Err(_) => {
                    handle.abort();
                    aborted += 1;
                }
            }
        }

        metrics::active_lanes(0);
        if aborted > 0 {
            warn!(aborted, "lanes aborted after drain timeout");
        } else {
            info!("all lanes drained");
        }
    }
}

fn lane_key(unit: &InboundUnit) -> String {
    format!("{}:{}", unit.channel, unit.user_id)
}
