// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use dirgate_core::server_config::{BackendConfig, LoggingConfig, ServerConfigManifest};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./dirgate-config.yaml)
        #[arg(short, long, default_value = "./dirgate-config.yaml")]
        output: PathBuf,

        /// Include an example backend, schema directory and logging section
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = ServerConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. DIRGATE_CONFIG_PATH: {}",
            std::env::var("DIRGATE_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./dirgate-config.yaml");
        println!("  4. ~/.dirgate/config.yaml");
        println!("  5. /etc/dirgate/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Layout:".bold());
    println!("  Configuration base: {}", config.spec.layout.config_base);
    println!("  Schema entry: {}", config.spec.layout.schema_dn);
    println!("  Tasks base: {}", config.spec.layout.tasks_base);
    println!("  Root DNs base: {}", config.spec.layout.root_dns_base);
    println!();

    println!("{}", "Default root privileges:".bold());
    for name in &config.spec.privileges.default_root_privileges {
        println!("  - {}", name);
    }
    println!();

    println!("{}", "Task engine:".bold());
    println!("  Max concurrent tasks: {}", config.spec.tasks.max_concurrent_tasks);
    println!("  Poll interval: {:?}", config.spec.tasks.poll_interval());
    println!("  Scheduling timeout: {:?}", config.spec.tasks.scheduling_timeout());
    println!("  Completion timeout: {:?}", config.spec.tasks.completion_timeout());
    println!("  Completed task retention: {:?}", config.spec.tasks.completed_task_retention());
    println!();

    println!("{}", "Backends:".bold());
    if config.spec.backends.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for backend in &config.spec.backends {
        println!("  {} → {}", backend.id.bold(), backend.base_dn);
    }
    if let Some(directory) = &config.spec.schema_directory {
        println!("  Schema directory: {}", directory.display());
    }
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = ServerConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

fn sample(with_examples: bool) -> ServerConfigManifest {
    let mut manifest = ServerConfigManifest::default();
    if with_examples {
        manifest.spec.backends.push(BackendConfig {
            id: "userRoot".to_string(),
            base_dn: "dc=example,dc=com".to_string(),
        });
        manifest.spec.schema_directory = Some(PathBuf::from("/etc/dirgate/schema"));
        manifest.spec.logging = Some(LoggingConfig {
            level: "info".to_string(),
            format: "text".to_string(),
        });
    }
    manifest
}

async fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    sample(with_examples)
        .to_yaml_file(&output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
