// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # dirgate CLI
//!
//! The `dirgate` binary drives the authorization core in-process against a
//! directory seeded from LDIF.
//!
//! ## Commands
//!
//! - `dirgate config show|validate|generate` - Configuration management
//! - `dirgate privileges --data FILE --dn DN [--admin]` - Effective privileges of an identity
//! - `dirgate task submit --data FILE --bind-dn DN [--admin] --task FILE` - Run an administrative task

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use dirgate_cli::commands::{self, ConfigCommand, PrivilegesArgs, TaskCommand};

/// dirgate - privilege-checked directory operations and administrative tasks
#[derive(Parser)]
#[command(name = "dirgate")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "DIRGATE_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "DIRGATE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Show the effective privileges of an identity
    #[command(name = "privileges")]
    Privileges {
        #[command(flatten)]
        args: PrivilegesArgs,
    },

    /// Administrative task operations
    #[command(name = "task")]
    Task {
        #[command(subcommand)]
        command: TaskCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    match cli.command {
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        Some(Commands::Privileges { args }) => commands::privileges::execute(args, cli.config).await,
        Some(Commands::Task { command }) => commands::task::handle_command(command, cli.config).await,
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    Ok(())
}
