// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Effective privilege inspection

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use dirgate_core::privilege::Privilege;
use dirgate_core::server_config::ServerConfigManifest;

use crate::embedded::EmbeddedDirectory;

#[derive(Args)]
pub struct PrivilegesArgs {
    /// LDIF file seeding the directory
    #[arg(long, value_name = "FILE")]
    pub data: PathBuf,

    /// DN of the identity to inspect
    #[arg(long, value_name = "DN")]
    pub dn: String,

    /// Treat the identity as an administrative (root) user
    #[arg(long)]
    pub admin: bool,
}

pub async fn execute(args: PrivilegesArgs, config_override: Option<PathBuf>) -> Result<()> {
    let config = ServerConfigManifest::load_or_default(config_override)
        .context("Failed to load configuration")?;
    let directory = EmbeddedDirectory::open(config, &args.data).await?;

    let identity = directory.bind(&args.dn, args.admin).await?;
    let effective = directory.effective_privileges(&identity);

    let kind = if args.admin { "administrative" } else { "regular" };
    println!("{} ({})", identity.describe().bold(), kind);
    for privilege in Privilege::ALL {
        if effective.contains(privilege) {
            println!("  {} {}", "✓".green(), privilege);
        } else {
            println!("  {} {}", "✗".red(), privilege.to_string().dimmed());
        }
    }

    directory.shutdown().await;
    Ok(())
}
