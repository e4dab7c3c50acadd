// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Concierge - message routing and human escalation for WhatsApp.
//!
//! This is the binary entry point: the webhook server plus the agent-facing
//! admin commands.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod admin;
mod serve;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

use concierge_config::ConciergeConfig;
use concierge_core::types::{EscalationStatus, Priority};

/// Exit code when the addressed escalation does not exist or is not open.
const EXIT_NOT_FOUND: u8 = 4;

/// Concierge - message routing and human escalation for WhatsApp.
#[derive(Parser, Debug)]
#[command(name = "concierge", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the webhook server and the message router.
    Serve,
    /// Inspect and work on escalations.
    #[command(subcommand)]
    Escalations(EscalationCommand),
    /// Show the most recent activity-trail entries.
    Activity {
        /// Number of entries (defaults to activity.recent_limit).
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Show today's counters, recent daily snapshots, and trends.
    Stats {
        /// Number of daily snapshots to show.
        #[arg(long, default_value_t = 7)]
        days: usize,
        #[arg(long)]
        json: bool,
    },
    /// Fold finished days into snapshots once and exit.
    Rollup,
    /// Manage configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
enum EscalationCommand {
    /// List open escalations.
    List {
        /// Include resolved escalations.
        #[arg(long)]
        all: bool,
        #[arg(long)]
        json: bool,
    },
    /// Show one user's open escalation with notes and history.
    Show {
        user: String,
        #[arg(long)]
        json: bool,
    },
    /// Resolve a user's open escalation and release the hold.
    Resolve {
        user: String,
        #[command(flatten)]
        actor: Actor,
    },
    /// Assign the escalation to an agent, or clear the assignment.
    Assign {
        user: String,
        #[arg(required_unless_present = "clear")]
        agent: Option<String>,
        #[arg(long, conflicts_with = "agent")]
        clear: bool,
        #[command(flatten)]
        actor: Actor,
    },
    /// Set triage priority: none, low, medium, high, urgent.
    Priority {
        user: String,
        #[arg(value_parser = parse_priority)]
        level: Priority,
        #[command(flatten)]
        actor: Actor,
    },
    /// Add a free-text note.
    Note {
        user: String,
        text: String,
        #[command(flatten)]
        actor: Actor,
    },
    /// Set status: pending, in_progress, resolved.
    Status {
        user: String,
        #[arg(value_parser = parse_status)]
        status: EscalationStatus,
        #[command(flatten)]
        actor: Actor,
    },
}

#[derive(Args, Debug, Clone)]
struct Actor {
    /// Name of the agent performing the change.
    #[arg(long = "by", value_name = "AGENT")]
    by: Option<String>,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate configuration and print a summary.
    Check,
}

fn parse_priority(s: &str) -> Result<Priority, String> {
    s.parse()
        .map_err(|_| format!("unknown priority '{s}' (expected none, low, medium, high, urgent)"))
}

fn parse_status(s: &str) -> Result<EscalationStatus, String> {
    s.parse()
        .map_err(|_| format!("unknown status '{s}' (expected pending, in_progress, resolved)"))
}

fn load_config(path: Option<&PathBuf>) -> Result<ConciergeConfig, ExitCode> {
    let result = match path {
        Some(path) => concierge_config::load_and_validate_path(path),
        None => concierge_config::load_and_validate(),
    };
    result.map_err(|errors| {
        concierge_config::render_errors(&errors);
        ExitCode::FAILURE
    })
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("concierge={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_ref()) {
        Ok(config) => config,
        Err(code) => return code,
    };
    init_tracing(&config.agent.log_level);

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await.map(|()| admin::Outcome::Done),
        Some(Commands::Escalations(cmd)) => admin::run_escalations(&config, cmd).await,
        Some(Commands::Activity { limit, json }) => {
            admin::run_activity(&config, limit, json).await
        }
        Some(Commands::Stats { days, json }) => admin::run_stats(&config, days, json).await,
        Some(Commands::Rollup) => admin::run_rollup(&config).await,
        Some(Commands::Config(ConfigCommand::Check)) => Ok(admin::config_summary(&config)),
        None => {
            println!("concierge: use --help for available commands");
            Ok(admin::Outcome::Done)
        }
    };

    match result {
        Ok(admin::Outcome::Done) => ExitCode::SUCCESS,
        Ok(admin::Outcome::NotFound(message)) => {
            eprintln!("{message}");
            ExitCode::from(EXIT_NOT_FOUND)
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
