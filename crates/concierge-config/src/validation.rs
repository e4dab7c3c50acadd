// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Collects every problem instead of stopping at the first one.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::ConciergeConfig;

/// Largest business-day offset accepted, matching real-world time zones.
const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

/// Validate a deserialized configuration for semantic correctness.
pub fn validate_config(config: &ConciergeConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let host = config.server.host.trim();
    if host.is_empty() {
        errors.push(ConfigError::validation("server.host must not be empty"));
    } else {
        let is_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_ip && !is_hostname {
            errors.push(ConfigError::validation(format!(
                "server.host `{host}` is not a valid IP address or hostname"
            )));
        }
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::validation(
            "storage.database_path must not be empty",
        ));
    }

    validate_routing(config, &mut errors);

    let timeouts = [
        ("responder_secs", config.timeouts.responder_secs),
        ("speech_secs", config.timeouts.speech_secs),
        ("vision_secs", config.timeouts.vision_secs),
        ("channel_secs", config.timeouts.channel_secs),
    ];
    for (name, value) in timeouts {
        if value == 0 {
            errors.push(ConfigError::validation(format!(
                "timeouts.{name} must be greater than 0"
            )));
        }
    }

    if config.activity.max_entries == 0 {
        errors.push(ConfigError::validation(
            "activity.max_entries must be at least 1",
        ));
    }

    if config.metrics.rollup_interval_secs == 0 {
        errors.push(ConfigError::validation(
            "metrics.rollup_interval_secs must be greater than 0",
        ));
    }

    if let Some(teams) = &config.teams {
        if teams.app_id.trim().is_empty() {
            errors.push(ConfigError::validation("teams.app_id must not be empty"));
        }
        if teams.app_password.trim().is_empty() {
            errors.push(ConfigError::validation(
                "teams.app_password must not be empty",
            ));
        }
    }

    if let Some(search) = &config.search {
        if search.endpoint.trim().is_empty() {
            errors.push(ConfigError::validation("search.endpoint must not be empty"));
        }
        if search.top == 0 {
            errors.push(ConfigError::validation("search.top must be at least 1"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_routing(config: &ConciergeConfig, errors: &mut Vec<ConfigError>) {
    let routing = &config.routing;

    for (key, value) in [
        ("history_window", routing.history_window),
        ("excerpt_turns", routing.excerpt_turns),
        ("max_content_chars", routing.max_content_chars),
    ] {
        if value == 0 {
            errors.push(ConfigError::validation(format!(
                "routing.{key} must be at least 1"
            )));
        }
    }

    if routing.utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
        errors.push(ConfigError::validation(format!(
            "routing.utc_offset_minutes must be within +/-{MAX_UTC_OFFSET_MINUTES}, got {}",
            routing.utc_offset_minutes
        )));
    }

    let mut seen = HashSet::new();
    for (i, category) in routing.faq.iter().enumerate() {
        let name = category.name.trim();
        if name.is_empty() {
            errors.push(ConfigError::validation(format!(
                "routing.faq[{i}].name must not be empty"
            )));
        } else if !seen.insert(name.to_lowercase()) {
            errors.push(ConfigError::validation(format!(
                "duplicate FAQ category `{name}` in [[routing.faq]]"
            )));
        }
        if category.keywords.iter().all(|k| k.trim().is_empty()) {
            errors.push(ConfigError::validation(format!(
                "routing.faq[{i}] must have at least one keyword"
            )));
        }
        if category.reply.trim().is_empty() {
            errors.push(ConfigError::validation(format!(
                "routing.faq[{i}].reply must not be empty"
            )));
        }
    }

    if routing.resume_phrases.iter().all(|p| p.trim().is_empty()) {
        errors.push(ConfigError::validation(
            "routing.resume_phrases must contain at least one phrase",
        ));
    }
}
