// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the dirgate CLI

pub mod config;
pub mod privileges;
pub mod task;

pub use self::config::ConfigCommand;
pub use self::privileges::PrivilegesArgs;
pub use self::task::TaskCommand;
