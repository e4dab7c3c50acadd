// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric hooks that compile to nothing without the `prometheus` feature.

#[cfg(feature = "prometheus")]
pub(crate) fn message(channel: &str, outcome: &str) {
    concierge_prometheus::record_message(channel, outcome);
}

#[cfg(not(feature = "prometheus"))]
pub(crate) fn message(_channel: &str, _outcome: &str) {}

#[cfg(feature = "prometheus")]
pub(crate) fn escalation(trigger: &str) {
    concierge_prometheus::record_escalation(trigger);
}

#[cfg(not(feature = "prometheus"))]
pub(crate) fn escalation(_trigger: &str) {}

#[cfg(feature = "prometheus")]
pub(crate) fn external_failure(collaborator: &str) {
    concierge_prometheus::record_external_failure(collaborator);
}

#[cfg(not(feature = "prometheus"))]
pub(crate) fn external_failure(_collaborator: &str) {}

#[cfg(feature = "prometheus")]
pub(crate) fn responder_latency(seconds: f64) {
    concierge_prometheus::record_responder_latency(seconds);
}

#[cfg(not(feature = "prometheus"))]
pub(crate) fn responder_latency(_seconds: f64) {}

#[cfg(feature = "prometheus")]
pub(crate) fn active_lanes(count: usize) {
    concierge_prometheus::set_active_lanes(count);
}

#[cfg(not(feature = "prometheus"))]
pub(crate) fn active_lanes(_count: usize) {}
