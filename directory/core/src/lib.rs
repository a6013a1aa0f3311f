// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! dirgate core
//!
//! Privilege model, operation gate and administrative task engine.
//!
//! # Architecture
//!
//! - **domain:** privileges, identities, operations, tasks, configuration
//! - **application:** the operation gate and the task engine
//! - **infrastructure:** event bus, in-memory entry store, LDIF codec, task runner

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
