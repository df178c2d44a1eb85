// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "pigeon", about = "A locally-hosted AI agent")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to an explicit config file, layered on top of the usual search path.
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace). Defaults to the
    /// configured `logging.level`.
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the agent's scheduler heartbeat and block. This is the
    /// long-running daemon mode; platform adapters connect to the running
    /// agent out of process and are not this crate's concern.
    Run,
    /// Local REPL: read prompts from stdin, print replies to stdout.
    /// Registered on the `"cli"` platform, useful for exercising the agent
    /// without a real platform adapter.
    Chat,
    /// Print the merged configuration and exit.
    ShowConfig,
}
