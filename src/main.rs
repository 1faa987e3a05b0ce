//! pressure-assistant daemon
//!
//! CLI for running the blood pressure bot and inspecting its state file.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use pressure_assistant::advisor::{Advisor, OpenAiAdvisor};
use pressure_assistant::clock::{Clock, SystemClock};
use pressure_assistant::config::Config;
use pressure_assistant::engine::ConversationEngine;
use pressure_assistant::export;
use pressure_assistant::scheduler::ReminderScheduler;
use pressure_assistant::session::SessionStore;
use pressure_assistant::store::{JsonFileStore, Repository};
use pressure_assistant::telegram::TelegramTransport;
use pressure_assistant::transport::ChatTransport;
use pressure_assistant::Error;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Blood pressure tracking chat bot
#[derive(Parser)]
#[command(name = "pressure-assistant")]
#[command(about = "Run and inspect the blood pressure tracking bot")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot: long polling plus the reminder loop
    Run,

    /// Show a summary of the state file
    Status,

    /// Write a user's measurement history as CSV
    Export {
        /// Chat platform user id
        user_id: i64,

        /// Output file (stdout when omitted)
        #[arg(short = 'o', long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env()?;

    match cli.command {
        Commands::Run => cmd_run(&config).await,
        Commands::Status => cmd_status(&config),
        Commands::Export { user_id, out } => cmd_export(&config, user_id, out.as_deref()),
    }
}

fn open_repository(config: &Config) -> anyhow::Result<Repository> {
    Repository::open(JsonFileStore::new(&config.state_file)).with_context(|| {
        format!(
            "Failed to load state file {}",
            config.state_file.display()
        )
    })
}

fn cmd_status(config: &Config) -> anyhow::Result<()> {
    let repo = open_repository(config)?;
    let snapshot = repo.snapshot();

    println!("State file: {}", config.state_file.display());
    println!("Users: {}", snapshot.users.len());
    println!("Measurements: {}", snapshot.entry_count());
    println!("Active reminders: {}", snapshot.active_reminder_count());
    Ok(())
}

fn cmd_export(config: &Config, user_id: i64, out: Option<&Path>) -> anyhow::Result<()> {
    let repo = open_repository(config)?;
    let snapshot = repo.snapshot();
    if !snapshot.is_registered(user_id) {
        bail!("User {} is not registered", user_id);
    }

    let history = snapshot.history(user_id);
    let bytes = export::history_csv(history)?;
    match out {
        Some(path) => {
            fs::write(path, &bytes)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Exported {} entries to {}", history.len(), path.display());
        }
        None => std::io::stdout().write_all(&bytes)?,
    }
    Ok(())
}

async fn cmd_run(config: &Config) -> anyhow::Result<()> {
    info!("pressure-assistant starting");

    let token = config.require_telegram_token()?;
    let api_key = config.require_openai_key()?;
    let tz = config.timezone()?;

    let repo = Arc::new(open_repository(config)?);
    {
        let snapshot = repo.snapshot();
        info!(
            "Loaded {} users, {} measurements, {} active reminders",
            snapshot.users.len(),
            snapshot.entry_count(),
            snapshot.active_reminder_count()
        );
    }

    let telegram = Arc::new(TelegramTransport::new(token));
    telegram
        .connect(config.startup_retries, config.startup_backoff())
        .await
        .context("Could not take over the Telegram bot session")?;

    let transport: Arc<dyn ChatTransport> = telegram.clone();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(tz));
    let advisor: Arc<dyn Advisor> = Arc::new(OpenAiAdvisor::new(config, api_key)?);

    let engine = ConversationEngine::new(
        Arc::clone(&repo),
        Arc::new(SessionStore::new()),
        Arc::clone(&transport),
        advisor,
        Arc::clone(&clock),
    );

    let scheduler =
        ReminderScheduler::new(Arc::clone(&repo), transport, clock, config.reminder_interval());
    tokio::spawn(scheduler.run());

    let mut offset = 0;
    let mut conflicts = 0;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                return Ok(());
            }
            polled = telegram.poll(&mut offset, config.poll_timeout_secs) => match polled {
                Ok(messages) => {
                    conflicts = 0;
                    for message in messages {
                        let user_id = message.user_id;
                        if let Err(e) = engine.handle(message).await {
                            error!(user_id, "Failed to handle message: {}", e);
                        }
                    }
                }
                Err(Error::Conflict) => {
                    conflicts += 1;
                    if conflicts >= config.startup_retries {
                        bail!("Another process keeps polling this bot, giving up");
                    }
                    warn!(
                        "Polling conflict {}/{}, retrying in {:?}",
                        conflicts,
                        config.startup_retries,
                        config.startup_backoff()
                    );
                    tokio::time::sleep(config.startup_backoff()).await;
                }
                Err(e) => {
                    warn!("Polling failed: {}", e);
                    tokio::time::sleep(config.startup_backoff()).await;
                }
            }
        }
    }
}
