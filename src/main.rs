// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Command};
use pigeon_channels::{NotificationBus, OutboundSender};
use pigeon_config::Config;
use pigeon_core::{notify_on_completion, Agent};
use pigeon_scheduler::{PromptRunner, Scheduler};
use pigeon_skills::SkillsManager;
use pigeon_store::Store;
use pigeon_tools::StandardToolProvider;

/// The platform name this binary's own REPL and stdout notifications use.
/// Real platform adapters (Discord, Telegram, ...) register their own name
/// and are out of scope here; see `pigeon_channels::NotificationBus`.
const CLI_PLATFORM: &str = "cli";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = pigeon_config::load(cli.config.as_deref())?;
    init_logging(cli.verbose, &config.logging.level);

    match cli.command.unwrap_or(Command::Run) {
        Command::ShowConfig => {
            println!("{}", serde_yaml::to_string(&config).unwrap_or_default());
            Ok(())
        }
        Command::Run => run_daemon(config).await,
        Command::Chat => run_chat(config).await,
    }
}

/// Build every long-lived piece of the agent (store, skills, tools,
/// notification bus, agent, scheduler) the same way for `run` and `chat` so
/// the two modes only differ in what drives `Agent::chat`.
async fn build_agent(config: &Config) -> anyhow::Result<(Arc<Agent>, Arc<NotificationBus>, Arc<Scheduler>)> {
    let db_path = expand_home(&config.store.db_path);
    let store = Store::open(&db_path).await.with_context(|| format!("opening store at {}", db_path.display()))?;

    let skills_dir = expand_home(&config.skills.skills_dir);
    let skills = SkillsManager::new(skills_dir);

    let channels = Arc::new(NotificationBus::new(store.clone()));

    let tool_provider = StandardToolProvider::new(store.clone(), skills.clone());
    let agent = Arc::new(Agent::new(config, &tool_provider, store.clone(), skills, channels.clone()).await?);

    let runner: Arc<dyn PromptRunner> = agent.clone();
    let scheduler = Arc::new(Scheduler::new(
        store,
        runner,
        std::time::Duration::from_secs(config.scheduler.heartbeat_interval_seconds),
        config.scheduler.overdue_grace_seconds as i64,
    ));
    scheduler.register_completion_handler(notify_on_completion(channels.clone()));

    Ok((agent, channels, scheduler))
}

async fn run_daemon(config: Config) -> anyhow::Result<()> {
    let (_agent, channels, scheduler) = build_agent(&config).await?;
    channels.register_sender(CLI_PLATFORM, Arc::new(StdoutSender)).await?;

    scheduler.start();
    tracing::info!(
        heartbeat_interval_seconds = config.scheduler.heartbeat_interval_seconds,
        "scheduler started, entering heartbeat loop"
    );

    // The daemon has nothing else to drive it: platform adapters live
    // outside this crate and connect to the running agent independently.
    // Block until the process is asked to stop.
    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    tracing::info!("shutdown signal received");
    Ok(())
}

async fn run_chat(config: Config) -> anyhow::Result<()> {
    let (agent, channels, scheduler) = build_agent(&config).await?;
    channels.register_sender(CLI_PLATFORM, Arc::new(StdoutSender)).await?;
    scheduler.start();

    println!("pigeon chat — type a message, or /quit to exit.");
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        io::stdout().flush().ok();
        let Some(line) = lines.next() else { break };
        let line = line.context("reading stdin")?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed == "/quit" || trimmed == "/exit" {
            break;
        }

        let mut print_chunk = |chunk: &str| {
            print!("{chunk}");
            io::stdout().flush().ok();
        };
        match agent.chat(trimmed, "local", None, CLI_PLATFORM, &[], Some(&mut print_chunk)).await {
            Ok(reply) => println!("{reply}"),
            Err(e) => eprintln!("error: {e:#}"),
        }
    }
    Ok(())
}

/// Delivers notifications (including approval prompts, sent via
/// `send_raw`) to stdout. No `ApprovalHandler` is registered for
/// `CLI_PLATFORM`, so any tool requiring approval is denied on timeout
/// rather than hanging the REPL waiting for a reply it has no way to
/// receive; see `pigeon_channels::approval::resolve`.
struct StdoutSender;

#[async_trait]
impl OutboundSender for StdoutSender {
    async fn send(&self, user_id: &str, message: &str) -> anyhow::Result<()> {
        println!("\n[notification to {user_id}]\n{message}\n");
        Ok(())
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    Path::new(path).to_path_buf()
}

/// `PIGEON_LOG` wins if set (mirrors `RUST_LOG` semantics); otherwise `-v`
/// overrides `config.logging.level`, which is itself the final fallback.
fn init_logging(verbosity: u8, configured_level: &str) {
    let level = match verbosity {
        0 => configured_level,
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_env("PIGEON_LOG").unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}
