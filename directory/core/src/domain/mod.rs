// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Mod
//!
//! Provides the domain model for the system.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Value objects, aggregates and collaborator contracts

pub mod dn;
pub mod entry;
pub mod events;
pub mod identity;
pub mod operation;
pub mod privilege;
pub mod privilege_registry;
pub mod repository;
pub mod result;
pub mod server_config;
pub mod task;
