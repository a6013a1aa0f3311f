// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! LDIF task runner
//!
//! Executes the five administrative task kinds against an [`EntryStore`]
//! using LDIF files on disk:
//!
//! | Kind | Effect |
//! |------|--------|
//! | backup | writes `<dir>/<backend>/backup.ldif` per backend |
//! | restore | replaces the backend named by the last path component of `<dir>` with `<dir>/backup.ldif` |
//! | export | writes one backend to an LDIF file |
//! | import | replaces one backend with the content of an LDIF file |
//! | add-schema-file | merges `attributeTypes` / `objectClasses` from schema files into the schema subentry |
//!
//! Problems that affect a single entry or backend are reported in the
//! outcome's `errors` (the task then completes with errors). Problems that
//! leave nothing to do abort the run with a [`TaskExecutionError`].

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::dn::Dn;
use crate::domain::entry::{Entry, Modification, ModificationType};
use crate::domain::operation::SearchScope;
use crate::domain::repository::{EntryStore, EntryStoreError, TaskExecutionError, TaskRunner};
use crate::domain::task::{restore_backend_id, Task, TaskKind, TaskOutcome};
use crate::infrastructure::ldif::{read_records, write_ldif};

pub const BACKUP_FILE_NAME: &str = "backup.ldif";

const SCHEMA_ATTRIBUTES: [&str; 2] = ["attributeTypes", "objectClasses"];

pub struct LdifTaskRunner {
    store: Arc<dyn EntryStore>,
    backends: Vec<(String, Dn)>,
    schema_dn: Dn,
    schema_directory: Option<PathBuf>,
}

impl LdifTaskRunner {
    pub fn new(store: Arc<dyn EntryStore>, backends: Vec<(String, Dn)>, schema_dn: Dn) -> Self {
        Self {
            store,
            backends,
            schema_dn,
            schema_directory: None,
        }
    }

    pub fn with_schema_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.schema_directory = Some(directory.into());
        self
    }

    fn backend_base(&self, id: &str) -> Result<&Dn, TaskExecutionError> {
        self.backends
            .iter()
            .find(|(backend, _)| backend.eq_ignore_ascii_case(id))
            .map(|(_, base)| base)
            .ok_or_else(|| TaskExecutionError::InvalidArgument(format!("Unknown backend '{}'", id)))
    }

    async fn backend_entries(&self, base: &Dn) -> Result<Vec<Entry>, TaskExecutionError> {
        match self.store.search(base, SearchScope::Subtree).await {
            Ok(entries) => Ok(entries),
            Err(EntryStoreError::NoSuchObject(_)) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_backend(&self, id: &str, file: &Path) -> Result<usize, TaskExecutionError> {
        let base = self.backend_base(id)?;
        let entries = self.backend_entries(base).await?;
        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(file, write_ldif(&entries)).await?;
        debug!(backend = id, file = %file.display(), count = entries.len(), "Wrote backend LDIF");
        Ok(entries.len())
    }

    /// Replace a backend's content with the records of `file`. Records that
    /// fail to parse or fall outside the backend are skipped and reported.
    async fn load_backend(&self, id: &str, file: &Path, outcome: &mut TaskOutcome) -> Result<usize, TaskExecutionError> {
        let base = self.backend_base(id)?.clone();
        let content = tokio::fs::read_to_string(file).await?;

        let mut entries = Vec::new();
        for record in read_records(&content) {
            match record {
                Ok(entry) if entry.dn.is_within(&base) => entries.push(entry),
                Ok(entry) => outcome
                    .errors
                    .push(format!("Entry '{}' is not part of backend '{}'", entry.dn, id)),
                Err(e) => outcome.errors.push(format!("{}: {}", file.display(), e)),
            }
        }
        let count = self.store.replace_subtree(&base, entries).await?;
        debug!(backend = id, file = %file.display(), count, "Loaded backend LDIF");
        Ok(count)
    }

    async fn backup(&self, directory: &Path, backend_ids: &[String], backup_all: bool) -> Result<TaskOutcome, TaskExecutionError> {
        let targets: Vec<String> = if backup_all {
            self.backends.iter().map(|(id, _)| id.clone()).collect()
        } else {
            backend_ids.to_vec()
        };
        if targets.is_empty() {
            return Err(TaskExecutionError::InvalidArgument("No backends to back up".to_string()));
        }

        let mut outcome = TaskOutcome::default();
        let mut written = 0;
        for id in &targets {
            let file = directory.join(id).join(BACKUP_FILE_NAME);
            match self.write_backend(id, &file).await {
                Ok(count) => {
                    written += 1;
                    outcome
                        .messages
                        .push(format!("Backed up {} entries of backend '{}' to {}", count, id, file.display()));
                }
                Err(TaskExecutionError::InvalidArgument(reason)) => outcome.errors.push(reason),
                Err(e) => return Err(e),
            }
        }
        if written == 0 {
            return Err(TaskExecutionError::InvalidArgument(outcome.errors.join("; ")));
        }
        Ok(outcome)
    }

    async fn restore(&self, directory: &Path) -> Result<TaskOutcome, TaskExecutionError> {
        let id = restore_backend_id(directory).ok_or_else(|| {
            TaskExecutionError::InvalidArgument(format!(
                "Cannot determine backend from backup directory {}",
                directory.display()
            ))
        })?;
        let mut outcome = TaskOutcome::default();
        let count = self
            .load_backend(&id, &directory.join(BACKUP_FILE_NAME), &mut outcome)
            .await?;
        Ok(outcome.message(format!("Restored {} entries into backend '{}'", count, id)))
    }

    async fn add_schema_files(&self, file_names: &[String]) -> Result<TaskOutcome, TaskExecutionError> {
        let directory = self.schema_directory.as_deref().ok_or_else(|| {
            TaskExecutionError::InvalidArgument("No schema directory is configured".to_string())
        })?;
        let schema = self
            .store
            .get(&self.schema_dn)
            .await?
            .ok_or_else(|| EntryStoreError::NoSuchObject(self.schema_dn.clone()))?;

        let mut outcome = TaskOutcome::default();
        let mut modifications: Vec<Modification> = Vec::new();
        for name in file_names {
            if Path::new(name).components().count() != 1 {
                return Err(TaskExecutionError::InvalidArgument(format!(
                    "Schema file name '{}' must not contain a path",
                    name
                )));
            }
            let path = directory.join(name);
            let content = tokio::fs::read_to_string(&path).await?;
            let mut added = 0;
            for record in read_records(&content) {
                let definitions = match record {
                    Ok(entry) => entry,
                    Err(e) => {
                        outcome.errors.push(format!("{}: {}", name, e));
                        continue;
                    }
                };
                for attribute in SCHEMA_ATTRIBUTES {
                    for value in definitions.get(attribute) {
                        let pending = modifications
                            .iter()
                            .any(|m| m.touches(attribute) && m.values.contains(value));
                        if schema.has_value(attribute, value) || pending {
                            continue;
                        }
                        modifications.push(Modification {
                            kind: ModificationType::Add,
                            attribute: attribute.to_string(),
                            values: vec![value.clone()],
                        });
                        added += 1;
                    }
                }
            }
            outcome
                .messages
                .push(format!("Loaded {} new definitions from schema file '{}'", added, name));
        }

        if !modifications.is_empty() {
            self.store.modify(&self.schema_dn, &modifications).await?;
        }
        Ok(outcome)
    }
}

#[async_trait]
impl TaskRunner for LdifTaskRunner {
    async fn run(&self, task: &Task) -> Result<TaskOutcome, TaskExecutionError> {
        info!(task_id = %task.id(), kind = task.kind().name(), "Running task");
        match task.kind() {
            TaskKind::Backup {
                backup_directory,
                backend_ids,
                backup_all,
            } => self.backup(backup_directory, backend_ids, *backup_all).await,
            TaskKind::Restore { backup_directory } => self.restore(backup_directory).await,
            TaskKind::AddSchemaFile { file_names } => self.add_schema_files(file_names).await,
            TaskKind::Export { backend_id, ldif_file } => {
                let count = self.write_backend(backend_id, ldif_file).await?;
                Ok(TaskOutcome::default().message(format!(
                    "Exported {} entries of backend '{}' to {}",
                    count,
                    backend_id,
                    ldif_file.display()
                )))
            }
            TaskKind::Import { backend_id, ldif_file } => {
                let mut outcome = TaskOutcome::default();
                let count = self.load_backend(backend_id, ldif_file, &mut outcome).await?;
                Ok(outcome.message(format!("Imported {} entries into backend '{}'", count, backend_id)))
            }
        }
    }
}
