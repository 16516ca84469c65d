//! # Lookout
//!
//! Activity-duration alerts and cron reminders for community spaces.
//!
//! Usage:
//!   lookout run                                  # Consume events from stdin
//!   lookout run --events feed.ndjson             # Consume events from a file
//!   lookout alert add --space g1 --target kid --observer me --kind gaming --minutes 90
//!   lookout reminder add --to channel:42 --cron "0 9 * * 1-5" --message "Stand-up" --by me
//!   lookout cron next "*/15 9-17 * * 1-5" --count 5

mod commands;
mod events;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{ArgAction, Parser, Subcommand};
use lookout_core::{
    AlertKind, Clock, Dispatcher, JobStore, LookoutConfig, NewAlertRule, NewReminderJob,
    Recipient, RuleStore, SystemClock,
};
use lookout_db::SqliteStore;
use lookout_scheduler::SchedulerEngine;
use lookout_tracker::{ActivityTracker, spawn_matcher};
use tokio::io::{AsyncBufRead, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::events::EventRouter;

#[derive(Parser)]
#[command(
    name = "lookout",
    version,
    about = "👀 Lookout: activity alerts and cron reminders"
)]
struct Cli {
    /// Path to TOML configuration file (default ~/.lookout/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the tracker and the reminder scheduler
    Run {
        /// NDJSON event feed (default: stdin)
        #[arg(long)]
        events: Option<PathBuf>,
    },
    /// Manage activity alerts
    #[command(subcommand)]
    Alert(AlertCommand),
    /// Manage recurring reminders
    #[command(subcommand)]
    Reminder(ReminderCommand),
    /// Cron expression tools
    #[command(subcommand)]
    Cron(CronCommand),
}

#[derive(Subcommand)]
enum AlertCommand {
    /// Watch a user and notify an observer past a threshold
    Add {
        /// Space the rule applies to
        #[arg(long)]
        space: Option<String>,
        /// User to watch
        #[arg(long)]
        target: String,
        /// User to notify
        #[arg(long)]
        observer: String,
        /// gaming, voice or both
        #[arg(long, default_value = "both")]
        kind: AlertKind,
        /// Threshold in minutes
        #[arg(long, default_value = "60")]
        minutes: u32,
        /// Template with {user}, {duration} and {type}
        #[arg(long)]
        message: Option<String>,
    },
    /// List rules of a space or for a target
    List {
        #[arg(long)]
        space: Option<String>,
        #[arg(long)]
        target: Option<String>,
    },
    /// Enable or disable a rule
    Toggle {
        id: i64,
        #[arg(action = ArgAction::Set)]
        enabled: bool,
    },
    /// Delete a rule
    Delete { id: i64 },
}

#[derive(Subcommand)]
enum ReminderCommand {
    /// Create a reminder
    Add {
        #[arg(long)]
        space: Option<String>,
        /// user:<id> or channel:<id>
        #[arg(long)]
        to: Recipient,
        /// 5-field cron expression
        #[arg(long)]
        cron: String,
        #[arg(long)]
        message: String,
        /// Creator id
        #[arg(long)]
        by: String,
    },
    /// List reminders (all, or of one space)
    List {
        #[arg(long)]
        space: Option<String>,
    },
    /// Delete a reminder
    Delete { id: i64 },
}

#[derive(Subcommand)]
enum CronCommand {
    /// Print upcoming fire times
    Next {
        expression: String,
        #[arg(long, default_value = "5")]
        count: usize,
    },
}

const VERBOSE_FILTER: &str = "lookout=debug,lookout_core=debug,lookout_tracker=debug,\
                              lookout_scheduler=debug,lookout_db=debug,lookout_channels=debug";
const DEFAULT_FILTER: &str = "info";

fn load_config(path: Option<&PathBuf>) -> Result<LookoutConfig> {
    let config = match path {
        Some(path) => LookoutConfig::load_from(path)?,
        None => LookoutConfig::load()?,
    };
    Ok(config)
}

fn open_store(config: &LookoutConfig) -> Result<Arc<SqliteStore>> {
    let path = config.database_path();
    let store = SqliteStore::open(&path)
        .with_context(|| format!("opening database {}", path.display()))?;
    Ok(Arc::new(store))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Command::Run { events } => run(config, events).await,
        Command::Alert(cmd) => alert(&config, cmd).await,
        Command::Reminder(cmd) => reminder(&config, cmd).await,
        Command::Cron(CronCommand::Next { expression, count }) => {
            let offset = config.scheduler.offset()?;
            for at in commands::cron_next(&expression, count, offset, Utc::now())? {
                println!("{}", at.format("%Y-%m-%d %H:%M %:z (%a)"));
            }
            Ok(())
        }
    }
}

async fn run(config: LookoutConfig, events: Option<PathBuf>) -> Result<()> {
    config.validate()?;
    let store = open_store(&config)?;
    let offset = config.scheduler.offset()?;

    let delivery = lookout_channels::delivery_from_config(&config.delivery);
    let dispatcher = Dispatcher::new(
        delivery,
        Duration::from_secs(config.tracker.delivery_timeout_secs),
    );
    tracing::info!("📡 Delivery via {}", dispatcher.transport());

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let rules: Arc<dyn RuleStore> = store.clone();
    let jobs: Arc<dyn JobStore> = store;

    let engine = Arc::new(SchedulerEngine::new(dispatcher.clone(), clock.clone(), offset));
    let report = engine.load_all(&*jobs).await?;
    if !report.skipped.is_empty() {
        tracing::warn!("⚠️ {} reminder(s) could not be scheduled", report.skipped.len());
    }

    let tracker = Arc::new(ActivityTracker::new(rules, dispatcher));
    let shutdown = CancellationToken::new();
    let matcher = spawn_matcher(
        tracker.clone(),
        clock.clone(),
        Duration::from_secs(config.tracker.check_interval_secs),
        shutdown.clone(),
    );

    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received Ctrl+C, shutting down...");
            ctrl_c.cancel();
        }
    });

    let router = EventRouter {
        tracker: tracker.clone(),
        engine: engine.clone(),
        jobs,
        clock,
    };
    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &events {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("opening event feed {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };
    let applied = router.consume(reader, shutdown.clone()).await;
    tracing::info!("📊 {applied} event(s) processed");

    shutdown.cancel();
    if let Err(e) = matcher.await {
        tracing::warn!("⚠️ Matcher task ended abnormally: {e}");
    }
    tracker.stop();
    engine.stop_all();
    Ok(())
}

async fn alert(config: &LookoutConfig, cmd: AlertCommand) -> Result<()> {
    let store = open_store(config)?;
    match cmd {
        AlertCommand::Add {
            space,
            target,
            observer,
            kind,
            minutes,
            message,
        } => {
            let rule = commands::add_alert(
                &*store,
                NewAlertRule {
                    space_id: space,
                    target_id: target,
                    observer_id: observer,
                    kind,
                    threshold_minutes: minutes,
                    message,
                },
            )
            .await?;
            println!("✅ Alert created");
            println!("{}", commands::format_rule(&rule));
        }
        AlertCommand::List { space, target } => {
            let rules = commands::list_alerts(&*store, space.as_deref(), target.as_deref()).await?;
            if rules.is_empty() {
                println!("No alerts.");
            }
            for rule in &rules {
                println!("{}", commands::format_rule(rule));
            }
        }
        AlertCommand::Toggle { id, enabled } => {
            commands::toggle_alert(&*store, id, enabled).await?;
            println!("✅ Alert #{id} {}", if enabled { "enabled" } else { "disabled" });
        }
        AlertCommand::Delete { id } => {
            commands::delete_alert(&*store, id).await?;
            println!("🗑️ Alert #{id} deleted");
        }
    }
    Ok(())
}

async fn reminder(config: &LookoutConfig, cmd: ReminderCommand) -> Result<()> {
    let store = open_store(config)?;
    match cmd {
        ReminderCommand::Add {
            space,
            to,
            cron,
            message,
            by,
        } => {
            let job = commands::add_reminder(
                &*store,
                NewReminderJob {
                    space_id: space,
                    recipient: to,
                    message,
                    cron_expression: cron,
                    created_by: by,
                },
            )
            .await?;
            println!("✅ Reminder created");
            println!("{}", commands::format_reminder(&job));
        }
        ReminderCommand::List { space } => {
            let jobs = commands::list_reminders(&*store, space.as_deref()).await?;
            if jobs.is_empty() {
                println!("No reminders.");
            }
            for job in &jobs {
                println!("{}", commands::format_reminder(job));
            }
        }
        ReminderCommand::Delete { id } => {
            commands::delete_reminder(&*store, id).await?;
            println!("🗑️ Reminder #{id} deleted");
        }
    }
    Ok(())
}
