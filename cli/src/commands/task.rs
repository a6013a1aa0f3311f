// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Administrative task commands
//!
//! Commands: submit

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;
use tracing::info;

use dirgate_core::infrastructure::ldif::parse_ldif;
use dirgate_core::server_config::ServerConfigManifest;
use dirgate_core::task::{Task, TaskState};

use crate::embedded::EmbeddedDirectory;

#[derive(Subcommand)]
pub enum TaskCommand {
    /// Submit a task entry and wait for it to finish
    Submit {
        /// LDIF file seeding the directory
        #[arg(long, value_name = "FILE")]
        data: PathBuf,

        /// DN of the identity submitting the task
        #[arg(long, value_name = "DN")]
        bind_dn: String,

        /// Bind as an administrative (root) user
        #[arg(long)]
        admin: bool,

        /// LDIF file holding the task entry
        #[arg(long, value_name = "FILE")]
        task: PathBuf,

        /// Print the finished task as JSON
        #[arg(long)]
        json: bool,
    },
}

pub async fn handle_command(command: TaskCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        TaskCommand::Submit {
            data,
            bind_dn,
            admin,
            task,
            json,
        } => submit(config_override, data, &bind_dn, admin, task, json).await,
    }
}

async fn submit(
    config_override: Option<PathBuf>,
    data: PathBuf,
    bind_dn: &str,
    admin: bool,
    task_file: PathBuf,
    json: bool,
) -> Result<()> {
    let config = ServerConfigManifest::load_or_default(config_override)
        .context("Failed to load configuration")?;

    let content = tokio::fs::read_to_string(&task_file)
        .await
        .with_context(|| format!("Failed to read task entry {:?}", task_file))?;
    let mut entries = parse_ldif(&content).with_context(|| format!("Failed to parse {:?}", task_file))?;
    if entries.len() != 1 {
        bail!("{:?} must hold exactly one task entry, found {}", task_file, entries.len());
    }
    let entry = entries.remove(0);

    let directory = EmbeddedDirectory::open(config, &data).await?;
    let identity = directory.bind(bind_dn, admin).await?;

    let task_id = directory.submit_task(&identity, entry).await?;
    info!(task_id = %task_id, "Task submitted");
    println!("Submitted task {}", task_id.to_string().bold());

    let task = directory.wait_for(&task_id).await;
    directory.shutdown().await;
    let task = task?;

    if json {
        println!("{}", serde_json::to_string_pretty(&task)?);
    } else {
        print_task(&task);
    }

    match task.state() {
        TaskState::CompletedSuccessfully | TaskState::CompletedWithErrors => Ok(()),
        state => bail!("Task {} finished in state {}", task_id, state),
    }
}

fn print_task(task: &Task) {
    let state = task.state();
    let label = match state {
        TaskState::CompletedSuccessfully => state.to_string().green(),
        TaskState::CompletedWithErrors => state.to_string().yellow(),
        _ => state.to_string().red(),
    };
    println!("{} {}: {}", task.kind().name(), task.id(), label);
    for message in task.messages() {
        println!("  {}", message);
    }
}
