// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any recorder (Prometheus, statsd, etc.)
//! can collect these metrics.

use metrics::{describe_counter, describe_gauge, describe_histogram};

pub const MESSAGES_TOTAL: &str = "concierge_messages_total";
pub const ESCALATIONS_TOTAL: &str = "concierge_escalations_total";
pub const EXTERNAL_FAILURES_TOTAL: &str = "concierge_external_failures_total";
pub const RESPONDER_LATENCY_SECONDS: &str = "concierge_responder_latency_seconds";
pub const ACTIVE_LANES: &str = "concierge_active_lanes";

/// Register all Concierge metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(MESSAGES_TOTAL, "Inbound units routed, by channel and outcome");
    describe_counter!(ESCALATIONS_TOTAL, "Escalations opened, by trigger");
    describe_counter!(
        EXTERNAL_FAILURES_TOTAL,
        "Failed or timed-out calls to external collaborators"
    );
    describe_histogram!(
        RESPONDER_LATENCY_SECONDS,
        "AI responder latency in seconds"
    );
    describe_gauge!(ACTIVE_LANES, "Per-user worker lanes currently open");
}

/// Record one routed inbound unit.
pub fn record_message(channel: &str, outcome: &str) {
    metrics::counter!(
        MESSAGES_TOTAL,
        "channel" => channel.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record an opened escalation; `trigger` is `handoff` or `responder`.
pub fn record_escalation(trigger: &str) {
    metrics::counter!(ESCALATIONS_TOTAL, "trigger" => trigger.to_string()).increment(1);
}

/// Record a failed external call.
pub fn record_external_failure(collaborator: &str) {
    metrics::counter!(EXTERNAL_FAILURES_TOTAL, "collaborator" => collaborator.to_string())
        .increment(1);
}

pub fn record_responder_latency(seconds: f64) {
    metrics::histogram!(RESPONDER_LATENCY_SECONDS).record(seconds);
}

pub fn set_active_lanes(count: usize) {
    metrics::gauge!(ACTIVE_LANES).set(count as f64);
}
