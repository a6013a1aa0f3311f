// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Collaborator Interfaces
//!
//! Contracts for the systems the gate and the task engine mediate access to.
//! Both are defined here and implemented in `crate::infrastructure`.
//!
//! | Trait | Role | Implementations |
//! |-------|------|----------------|
//! | `EntryStore` | lookup and mutation primitives for entries | `InMemoryEntryStore` |
//! | `TaskRunner` | executes the work behind one task | `LdifTaskRunner` |
//!
//! The gate only calls `EntryStore` mutation primitives after admission.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::dn::Dn;
use crate::domain::entry::{Entry, EntryError, Modification};
use crate::domain::operation::SearchScope;
use crate::domain::result::ResultCode;
use crate::domain::task::{Task, TaskOutcome};

#[derive(Debug, Error)]
pub enum EntryStoreError {
    #[error("No such entry: {0}")]
    NoSuchObject(Dn),

    #[error("Entry already exists: {0}")]
    AlreadyExists(Dn),

    #[error("Entry has subordinates: {0}")]
    NotAllowedOnNonLeaf(Dn),

    #[error("Modification rejected: {0}")]
    Modification(#[from] EntryError),

    #[error("Operation not supported: {0}")]
    Unsupported(String),

    #[error("Backend failure: {0}")]
    Backend(String),
}

impl EntryStoreError {
    pub fn result_code(&self) -> ResultCode {
        match self {
            EntryStoreError::NoSuchObject(_) => ResultCode::NoSuchObject,
            EntryStoreError::AlreadyExists(_) => ResultCode::EntryAlreadyExists,
            EntryStoreError::NotAllowedOnNonLeaf(_) => ResultCode::NotAllowedOnNonLeaf,
            EntryStoreError::Modification(EntryError::ValueExists { .. }) => ResultCode::AttributeOrValueExists,
            EntryStoreError::Modification(_) => ResultCode::NoSuchAttribute,
            EntryStoreError::Unsupported(_) => ResultCode::UnwillingToPerform,
            EntryStoreError::Backend(_) => ResultCode::Other,
        }
    }
}

/// Entry store collaborator.
#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Look up an entry by location
    async fn get(&self, dn: &Dn) -> Result<Option<Entry>, EntryStoreError>;

    /// Add a new entry; its parent must exist unless it is a suffix
    async fn add(&self, entry: Entry) -> Result<(), EntryStoreError>;

    /// Delete a leaf entry
    async fn delete(&self, dn: &Dn) -> Result<(), EntryStoreError>;

    /// Apply modifications atomically and return the updated entry
    async fn modify(&self, dn: &Dn, modifications: &[Modification]) -> Result<Entry, EntryStoreError>;

    /// Rename or move a leaf entry
    async fn rename(
        &self,
        dn: &Dn,
        new_rdn: &str,
        delete_old_rdn: bool,
        new_superior: Option<&Dn>,
    ) -> Result<Dn, EntryStoreError>;

    /// Entries within `scope` of `base`, parents first
    async fn search(&self, base: &Dn, scope: SearchScope) -> Result<Vec<Entry>, EntryStoreError>;

    /// Replace everything below and including `base` with `entries`
    async fn replace_subtree(&self, base: &Dn, entries: Vec<Entry>) -> Result<usize, EntryStoreError>;
}

#[derive(Debug, Error)]
pub enum TaskExecutionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid task argument: {0}")]
    InvalidArgument(String),

    #[error("LDIF error: {0}")]
    Ldif(String),

    #[error("Entry store error: {0}")]
    Store(#[from] EntryStoreError),
}

/// Executes the work behind one administrative task.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, task: &Task) -> Result<TaskOutcome, TaskExecutionError>;
}
