// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod entry_store;
pub mod event_bus;
pub mod ldif;
pub mod task_runner;

pub use entry_store::InMemoryEntryStore;
pub use event_bus::{DomainEvent, EventBus, EventBusError};
pub use task_runner::LdifTaskRunner;
