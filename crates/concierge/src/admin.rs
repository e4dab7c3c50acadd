// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agent-facing admin commands: escalation triage, the activity trail,
//! statistics, and the one-shot rollup.
//!
//! Every command opens the configured database directly, so they work while
//! `concierge serve` is running (SQLite WAL) or when it is stopped.

use std::sync::Arc;

use serde::Serialize;

use concierge_agent::{
    ActivityRecorder, BusinessClock, Direction, EscalationStore, MetricsRollup, Trend,
};
use concierge_config::ConciergeConfig;
use concierge_core::types::{
    ActivityEvent, ActivityType, DailySnapshot, Escalation, LiveStats, ResolvedBy,
};
use concierge_core::{ConciergeError, StorageAdapter};
use concierge_storage::SqliteStorage;

use crate::EscalationCommand;

/// Actor recorded when `--by` is omitted.
const DEFAULT_ACTOR: &str = "agent";

/// Metrics reported as trends by `concierge stats`.
const TREND_METRICS: [&str; 3] = ["total_conversations", "bot_success_rate", "unique_users"];

/// Result of an admin command that completed without an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Done,
    /// The addressed user has no open escalation.
    NotFound(String),
}

fn not_found(user: &str) -> Outcome {
    Outcome::NotFound(format!("no open escalation for {user}"))
}

async fn open_storage(config: &ConciergeConfig) -> Result<Arc<SqliteStorage>, ConciergeError> {
    let storage = SqliteStorage::new(config.storage.clone());
    storage.initialize().await?;
    Ok(Arc::new(storage))
}

/// Runs one `concierge escalations` subcommand.
pub async fn run_escalations(
    config: &ConciergeConfig,
    cmd: EscalationCommand,
) -> Result<Outcome, ConciergeError> {
    let storage = open_storage(config).await?;
    let mut out = String::new();
    let result = escalations(storage.clone(), config, cmd, &mut out).await;
    storage.close().await?;
    print!("{out}");
    result
}

async fn escalations(
    storage: Arc<SqliteStorage>,
    config: &ConciergeConfig,
    cmd: EscalationCommand,
    out: &mut String,
) -> Result<Outcome, ConciergeError> {
    let store = EscalationStore::new(storage.clone());
    let activity = ActivityRecorder::new(storage, config.activity.max_entries);

    let changed = match cmd {
        EscalationCommand::List { all, json } => {
            let list = store.list(all).await?;
            if json {
                out.push_str(&to_json(&list));
            } else {
                out.push_str(&render_escalation_table(&list));
            }
            return Ok(Outcome::Done);
        }
        EscalationCommand::Show { user, json } => {
            let Some(escalation) = store.active(&user).await? else {
                return Ok(not_found(&user));
            };
            if json {
                out.push_str(&to_json(&escalation));
            } else {
                out.push_str(&render_escalation(&escalation));
            }
            return Ok(Outcome::Done);
        }
        EscalationCommand::Resolve { user, actor } => {
            let agent = actor.by.unwrap_or_else(|| DEFAULT_ACTOR.to_string());
            let resolved = store.resolve(&user, &ResolvedBy::Agent(agent.clone())).await?;
            if resolved {
                activity
                    .record(
                        ActivityType::Escalation,
                        "Escalacion resuelta",
                        Some(format!("{agent} resolvio la escalacion de {user}")),
                        Some(&user),
                    )
                    .await;
                out.push_str(&format!("resolved escalation for {user}\n"));
            }
            (user, resolved)
        }
        EscalationCommand::Assign {
            user,
            agent,
            clear: _,
            actor,
        } => {
            let assigned = store
                .assign_agent(&user, agent.as_deref(), Some(actor_name(&actor.by)))
                .await?;
            if assigned {
                match &agent {
                    Some(agent) => {
                        activity
                            .record(
                                ActivityType::Escalation,
                                "Escalacion asignada",
                                Some(format!("Asignada a {agent}")),
                                Some(&user),
                            )
                            .await;
                        out.push_str(&format!("assigned {user} to {agent}\n"));
                    }
                    None => out.push_str(&format!("cleared assignment for {user}\n")),
                }
            }
            (user, assigned)
        }
        EscalationCommand::Priority { user, level, actor } => {
            let changed = store
                .set_priority(&user, level, Some(actor_name(&actor.by)))
                .await?;
            if changed {
                out.push_str(&format!("priority for {user} set to {level}\n"));
            }
            (user, changed)
        }
        EscalationCommand::Note { user, text, actor } => {
            let added = store
                .add_note(&user, &text, Some(actor_name(&actor.by)))
                .await?;
            if added {
                out.push_str(&format!("note added for {user}\n"));
            }
            (user, added)
        }
        EscalationCommand::Status {
            user,
            status,
            actor,
        } => {
            let changed = store
                .set_status(&user, status, Some(actor_name(&actor.by)))
                .await?;
            if changed {
                out.push_str(&format!("status for {user} set to {status}\n"));
            }
            (user, changed)
        }
    };

    match changed {
        (_, true) => Ok(Outcome::Done),
        (user, false) => Ok(not_found(&user)),
    }
}

fn actor_name(by: &Option<String>) -> &str {
    by.as_deref().unwrap_or(DEFAULT_ACTOR)
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    let mut json = serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string());
    json.push('\n');
    json
}

fn truncate(text: &str, max: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() <= max {
        return flat;
    }
    let mut cut: String = flat.chars().take(max.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}

fn render_escalation_table(list: &[Escalation]) -> String {
    if list.is_empty() {
        return "no escalations\n".to_string();
    }
    let mut out = format!(
        "{:<6} {:<16} {:<9} {:<12} {:<12} {:<25} {}\n",
        "ID", "USER", "PRIORITY", "STATUS", "ASSIGNED", "CREATED", "LAST MESSAGE"
    );
    for e in list {
        out.push_str(&format!(
            "{:<6} {:<16} {:<9} {:<12} {:<12} {:<25} {}\n",
            e.id,
            e.user_id,
            e.priority.to_string(),
            e.status.to_string(),
            e.assigned_to.as_deref().unwrap_or("-"),
            e.created_at,
            truncate(&e.last_message, 40)
        ));
    }
    out
}

fn render_escalation(e: &Escalation) -> String {
    let mut out = format!("Escalation #{} for {}\n", e.id, e.user_id);
    out.push_str(&format!("  Created:   {}\n", e.created_at));
    out.push_str(&format!("  Status:    {}\n", e.status.label()));
    out.push_str(&format!("  Priority:  {}\n", e.priority.label()));
    out.push_str(&format!(
        "  Assigned:  {}\n",
        e.assigned_to.as_deref().unwrap_or("-")
    ));
    out.push_str(&format!("  Message:   {}\n", e.last_message));

    if !e.excerpt.is_empty() {
        out.push_str("\n  Conversation:\n");
        for turn in &e.excerpt {
            out.push_str(&format!("    {}: {}\n", turn.role, truncate(&turn.content, 100)));
        }
    }
    if !e.notes.is_empty() {
        out.push_str("\n  Notes:\n");
        for note in &e.notes {
            out.push_str(&format!(
                "    [{}] {}: {}\n",
                note.created_at,
                note.author.as_deref().unwrap_or(DEFAULT_ACTOR),
                note.text
            ));
        }
    }
    out.push_str("\n  History:\n");
    for entry in &e.history {
        let mut line = format!("    [{}] {}", entry.timestamp, entry.action);
        if let Some(value) = &entry.value {
            line.push_str(&format!(" = {value}"));
        }
        if let Some(actor) = &entry.actor {
            line.push_str(&format!(" by {actor}"));
        }
        out.push_str(&line);
        out.push('\n');
    }
    out
}

/// Runs `concierge activity`.
pub async fn run_activity(
    config: &ConciergeConfig,
    limit: Option<usize>,
    json: bool,
) -> Result<Outcome, ConciergeError> {
    let storage = open_storage(config).await?;
    let events = storage
        .recent_activities(limit.unwrap_or(config.activity.recent_limit))
        .await;
    storage.close().await?;
    let events = events?;

    if json {
        print!("{}", to_json(&events));
    } else {
        print!("{}", render_activity(&events));
    }
    Ok(Outcome::Done)
}

fn render_activity(events: &[ActivityEvent]) -> String {
    if events.is_empty() {
        return "no activity recorded\n".to_string();
    }
    let mut out = String::new();
    for event in events {
        out.push_str(&format!(
            "{} {:<7} {:<12} {}",
            event.timestamp,
            event.activity_type.level(),
            event.activity_type,
            event.message
        ));
        if let Some(details) = &event.details {
            out.push_str(&format!(" - {details}"));
        }
        out.push('\n');
    }
    out
}

/// Trend of one metric in `--json` output.
#[derive(Debug, Serialize)]
struct TrendView {
    metric: String,
    latest: f64,
    previous_mean: f64,
    change_pct: f64,
    direction: &'static str,
}

impl From<Trend> for TrendView {
    fn from(trend: Trend) -> Self {
        let direction = match trend.direction() {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Flat => "flat",
        };
        Self {
            metric: trend.metric,
            latest: trend.latest,
            previous_mean: trend.previous_mean,
            change_pct: trend.change_pct,
            direction,
        }
    }
}

/// Structured output for `concierge stats --json`.
#[derive(Debug, Serialize)]
struct StatsResponse {
    today: String,
    live: LiveStats,
    snapshots: Vec<DailySnapshot>,
    trends: Vec<TrendView>,
}

async fn collect_stats(
    storage: Arc<SqliteStorage>,
    config: &ConciergeConfig,
    days: usize,
) -> Result<StatsResponse, ConciergeError> {
    let clock = BusinessClock::new(config.routing.utc_offset_minutes);
    let today = clock.today();
    let live = storage.live_stats(&today).await?;
    let rollup = MetricsRollup::new(storage, clock, config.metrics.retention_days);
    let snapshots = rollup.recent(days).await?;

    let mut trends = Vec::new();
    for metric in TREND_METRICS {
        if let Some(trend) = rollup.trend(metric, days).await? {
            trends.push(TrendView::from(trend));
        }
    }
    Ok(StatsResponse {
        today,
        live,
        snapshots,
        trends,
    })
}

/// Runs `concierge stats`.
pub async fn run_stats(
    config: &ConciergeConfig,
    days: usize,
    json: bool,
) -> Result<Outcome, ConciergeError> {
    let storage = open_storage(config).await?;
    let stats = collect_stats(storage.clone(), config, days).await;
    storage.close().await?;
    let stats = stats?;

    if json {
        print!("{}", to_json(&stats));
    } else {
        print!("{}", render_stats(&stats));
    }
    Ok(Outcome::Done)
}

fn render_stats(stats: &StatsResponse) -> String {
    let mut out = format!("\n  concierge stats ({})\n", stats.today);
    out.push_str(&format!("  {}\n", "-".repeat(35)));
    out.push_str(&format!(
        "    Active conversations: {}\n",
        stats.live.active_conversations
    ));
    out.push_str(&format!(
        "    Open escalations:     {}\n",
        stats.live.open_escalations
    ));
    out.push_str(&format!(
        "    Messages today:       {}\n",
        stats.live.messages_today
    ));
    out.push_str(&format!(
        "    Unique users:         {}\n",
        stats.live.unique_users
    ));

    if stats.snapshots.is_empty() {
        out.push_str("\n  No daily snapshots yet.\n");
    } else {
        out.push_str(&format!(
            "\n  {:<10} {:>6} {:>6} {:>6} {:>6} {:>8}\n",
            "DAY", "CONVS", "MSGS", "USERS", "ESC", "BOT %"
        ));
        for s in &stats.snapshots {
            out.push_str(&format!(
                "  {:<10} {:>6} {:>6} {:>6} {:>6} {:>8.2}\n",
                s.day,
                s.total_conversations,
                s.total_messages,
                s.unique_users,
                s.escalations_created,
                s.bot_success_rate
            ));
        }
    }

    if !stats.trends.is_empty() {
        out.push_str("\n  Trends:\n");
        for t in &stats.trends {
            out.push_str(&format!(
                "    {:<20} {:>8.2} ({:+.1}% {})\n",
                t.metric, t.latest, t.change_pct, t.direction
            ));
        }
    }
    out.push('\n');
    out
}

/// Runs `concierge rollup`.
pub async fn run_rollup(config: &ConciergeConfig) -> Result<Outcome, ConciergeError> {
    let storage = open_storage(config).await?;
    let rollup = MetricsRollup::new(
        storage.clone(),
        BusinessClock::new(config.routing.utc_offset_minutes),
        config.metrics.retention_days,
    );
    let report = rollup.run_once().await;
    storage.close().await?;
    let report = report?;

    if report.days.is_empty() {
        println!("no finished days to fold");
    } else {
        println!("folded {} day(s): {}", report.days.len(), report.days.join(", "));
    }
    println!(
        "purged {} conversation(s), pruned {} snapshot(s)",
        report.conversations_purged, report.snapshots_pruned
    );
    Ok(Outcome::Done)
}

/// Prints a summary of the validated configuration.
pub fn config_summary(config: &ConciergeConfig) -> Outcome {
    print!("{}", render_config(config));
    Outcome::Done
}

fn render_config(config: &ConciergeConfig) -> String {
    let configured = |value: &Option<String>| {
        if value.as_deref().is_some_and(|v| !v.is_empty()) {
            "set"
        } else {
            "missing"
        }
    };

    let mut out = String::from("configuration is valid\n");
    out.push_str(&format!("  agent:          {}\n", config.agent.name));
    out.push_str(&format!(
        "  listen:         {}:{}\n",
        config.server.host, config.server.port
    ));
    out.push_str(&format!(
        "  metrics:        {}\n",
        if config.server.metrics_enabled { "enabled" } else { "disabled" }
    ));
    out.push_str(&format!(
        "  whatsapp:       token {}, phone number id {}, app secret {}\n",
        configured(&config.whatsapp.access_token),
        configured(&config.whatsapp.phone_number_id),
        configured(&config.whatsapp.app_secret)
    ));
    match &config.teams {
        Some(teams) => out.push_str(&format!(
            "  teams:          app {} (tenant {})\n",
            teams.app_id, teams.tenant_id
        )),
        None => out.push_str("  teams:          disabled\n"),
    }
    out.push_str(&format!(
        "  responder:      {} (api key {})\n",
        config.responder.model,
        configured(&config.responder.api_key)
    ));
    match &config.search {
        Some(search) => out.push_str(&format!(
            "  search:         {} / {}\n",
            search.endpoint, search.index
        )),
        None => out.push_str("  search:         disabled\n"),
    }
    out.push_str(&format!("  database:       {}\n", config.storage.database_path));
    out.push_str(&format!(
        "  faq categories: {}\n",
        config.routing.faq.len()
    ));
    out.push_str(&format!(
        "  utc offset:     {} min\n",
        config.routing.utc_offset_minutes
    ));
    out
}
