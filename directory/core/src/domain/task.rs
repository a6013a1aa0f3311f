// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Administrative Task Aggregate
//!
//! A task is one unit of administrative work (backup, restore, schema file
//! add, export, import) created through a privileged Add under the tasks base
//! and executed asynchronously by the task engine.
//!
//! ## Lifecycle
//!
//! ```text
//! UNSCHEDULED ──start──▶ RUNNING ──complete──▶ COMPLETED_SUCCESSFULLY
//!      │                    │                  COMPLETED_WITH_ERRORS
//!      │                    └──fail─────────▶ STOPPED_BY_ERROR
//!      └──cancel──▶ CANCELED_BEFORE_START
//! ```
//!
//! Terminal states are absorbing: every transition out of one is rejected
//! with [`TaskError::InvalidTransition`].
//!
//! Fields are private and transitions are crate-internal, so clones handed to
//! callers are read-only views.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

use super::dn::Dn;
use super::entry::Entry;
use super::privilege::Privilege;

pub const TASK_ID_ATTRIBUTE: &str = "ds-task-id";
pub const BACKUP_DIRECTORY_ATTRIBUTE: &str = "ds-backup-directory-path";
pub const BACKUP_ALL_ATTRIBUTE: &str = "ds-task-backup-all";
pub const BACKUP_BACKEND_ATTRIBUTE: &str = "ds-task-backup-backend-id";
pub const SCHEMA_FILE_ATTRIBUTE: &str = "ds-task-schema-file-name";
pub const EXPORT_BACKEND_ATTRIBUTE: &str = "ds-task-export-backend-id";
pub const EXPORT_FILE_ATTRIBUTE: &str = "ds-task-export-ldif-file";
pub const IMPORT_BACKEND_ATTRIBUTE: &str = "ds-task-import-backend-id";
pub const IMPORT_FILE_ATTRIBUTE: &str = "ds-task-import-ldif-file";

const BACKUP_CLASS: &str = "ds-task-backup";
const RESTORE_CLASS: &str = "ds-task-restore";
const ADD_SCHEMA_FILE_CLASS: &str = "ds-task-add-schema-file";
const EXPORT_CLASS: &str = "ds-task-export";
const IMPORT_CLASS: &str = "ds-task-import";

/// Task object classes in decoding order, with the privilege each requires.
const TASK_CLASSES: [(&str, Privilege); 5] = [
    (BACKUP_CLASS, Privilege::BackendBackup),
    (RESTORE_CLASS, Privilege::BackendRestore),
    (ADD_SCHEMA_FILE_CLASS, Privilege::UpdateSchema),
    (EXPORT_CLASS, Privilege::LdifExport),
    (IMPORT_CLASS, Privilege::LdifImport),
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("Invalid task state transition from {from} to {to}")]
    InvalidTransition { from: TaskState, to: TaskState },
    #[error("Entry '{0}' does not describe a recognized task")]
    UnrecognizedTask(String),
    #[error("Task entry is missing required attribute '{0}'")]
    MissingAttribute(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Unscheduled,
    Running,
    CompletedSuccessfully,
    CompletedWithErrors,
    StoppedByError,
    CanceledBeforeStart,
}

impl TaskState {
    pub fn is_done(&self) -> bool {
        !matches!(self, TaskState::Unscheduled | TaskState::Running)
    }

    pub fn is_successful(&self) -> bool {
        matches!(self, TaskState::CompletedSuccessfully | TaskState::CompletedWithErrors)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Unscheduled => "UNSCHEDULED",
            TaskState::Running => "RUNNING",
            TaskState::CompletedSuccessfully => "COMPLETED_SUCCESSFULLY",
            TaskState::CompletedWithErrors => "COMPLETED_WITH_ERRORS",
            TaskState::StoppedByError => "STOPPED_BY_ERROR",
            TaskState::CanceledBeforeStart => "CANCELED_BEFORE_START",
        };
        f.write_str(name)
    }
}

/// Backends a task touches, used to serialize conflicting tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendScope {
    None,
    All,
    Backends(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskKind {
    Backup {
        backup_directory: PathBuf,
        #[serde(default)]
        backend_ids: Vec<String>,
        #[serde(default)]
        backup_all: bool,
    },
    Restore {
        backup_directory: PathBuf,
    },
    AddSchemaFile {
        file_names: Vec<String>,
    },
    Export {
        backend_id: String,
        ldif_file: PathBuf,
    },
    Import {
        backend_id: String,
        ldif_file: PathBuf,
    },
}

impl TaskKind {
    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::Backup { .. } => "backup",
            TaskKind::Restore { .. } => "restore",
            TaskKind::AddSchemaFile { .. } => "add-schema-file",
            TaskKind::Export { .. } => "export",
            TaskKind::Import { .. } => "import",
        }
    }

    pub fn required_privilege(&self) -> Privilege {
        match self {
            TaskKind::Backup { .. } => Privilege::BackendBackup,
            TaskKind::Restore { .. } => Privilege::BackendRestore,
            TaskKind::AddSchemaFile { .. } => Privilege::UpdateSchema,
            TaskKind::Export { .. } => Privilege::LdifExport,
            TaskKind::Import { .. } => Privilege::LdifImport,
        }
    }

    pub fn backend_scope(&self) -> BackendScope {
        match self {
            TaskKind::Backup { backup_all: true, .. } => BackendScope::All,
            TaskKind::Backup { backend_ids, .. } => BackendScope::Backends(backend_ids.clone()),
            TaskKind::Restore { backup_directory } => match restore_backend_id(backup_directory) {
                Some(id) => BackendScope::Backends(vec![id]),
                None => BackendScope::All,
            },
            TaskKind::Export { backend_id, .. } | TaskKind::Import { backend_id, .. } => {
                BackendScope::Backends(vec![backend_id.clone()])
            }
            TaskKind::AddSchemaFile { .. } => BackendScope::None,
        }
    }

    /// Decode the task kind from the object classes and attributes of a task
    /// entry.
    /// Privilege guarding a task entry, decided by its object classes alone
    /// so that it is known even when the task arguments are incomplete.
    pub fn privilege_for_entry(entry: &Entry) -> Option<Privilege> {
        TASK_CLASSES
            .iter()
            .find(|(class, _)| entry.has_object_class(class))
            .map(|(_, privilege)| *privilege)
    }

    pub fn from_entry(entry: &Entry) -> Result<Self, TaskError> {
        if entry.has_object_class(BACKUP_CLASS) {
            let backup_directory = required(entry, BACKUP_DIRECTORY_ATTRIBUTE)?;
            let backup_all = entry
                .first_value(BACKUP_ALL_ATTRIBUTE)
                .is_some_and(|v| v.eq_ignore_ascii_case("true"));
            let backend_ids: Vec<String> = entry.get(BACKUP_BACKEND_ATTRIBUTE).to_vec();
            if !backup_all && backend_ids.is_empty() {
                return Err(TaskError::MissingAttribute(BACKUP_BACKEND_ATTRIBUTE));
            }
            return Ok(TaskKind::Backup {
                backup_directory: PathBuf::from(backup_directory),
                backend_ids,
                backup_all,
            });
        }
        if entry.has_object_class(RESTORE_CLASS) {
            return Ok(TaskKind::Restore {
                backup_directory: PathBuf::from(required(entry, BACKUP_DIRECTORY_ATTRIBUTE)?),
            });
        }
        if entry.has_object_class(ADD_SCHEMA_FILE_CLASS) {
            let file_names = entry.get(SCHEMA_FILE_ATTRIBUTE).to_vec();
            if file_names.is_empty() {
                return Err(TaskError::MissingAttribute(SCHEMA_FILE_ATTRIBUTE));
            }
            return Ok(TaskKind::AddSchemaFile { file_names });
        }
        if entry.has_object_class(EXPORT_CLASS) {
            return Ok(TaskKind::Export {
                backend_id: required(entry, EXPORT_BACKEND_ATTRIBUTE)?.to_string(),
                ldif_file: PathBuf::from(required(entry, EXPORT_FILE_ATTRIBUTE)?),
            });
        }
        if entry.has_object_class(IMPORT_CLASS) {
            return Ok(TaskKind::Import {
                backend_id: required(entry, IMPORT_BACKEND_ATTRIBUTE)?.to_string(),
                ldif_file: PathBuf::from(required(entry, IMPORT_FILE_ATTRIBUTE)?),
            });
        }
        Err(TaskError::UnrecognizedTask(entry.dn.to_string()))
    }
}

fn required<'a>(entry: &'a Entry, attribute: &'static str) -> Result<&'a str, TaskError> {
    entry
        .first_value(attribute)
        .ok_or(TaskError::MissingAttribute(attribute))
}

/// Restore directories are laid out as `<root>/<backend id>`.
pub fn restore_backend_id(backup_directory: &std::path::Path) -> Option<String> {
    backup_directory
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

/// Result of a task run that did not abort.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskOutcome {
    pub messages: Vec<String>,
    pub errors: Vec<String>,
}

impl TaskOutcome {
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.messages.push(message.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    entry_dn: Dn,
    kind: TaskKind,
    creator: Option<Dn>,
    state: TaskState,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    messages: Vec<String>,
}

impl Task {
    pub fn new(id: TaskId, entry_dn: Dn, kind: TaskKind, creator: Option<Dn>) -> Self {
        Self {
            id,
            entry_dn,
            kind,
            creator,
            state: TaskState::Unscheduled,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            messages: Vec::new(),
        }
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn entry_dn(&self) -> &Dn {
        &self.entry_dn
    }

    pub fn kind(&self) -> &TaskKind {
        &self.kind
    }

    pub fn creator(&self) -> Option<&Dn> {
        self.creator.as_ref()
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn required_privilege(&self) -> Privilege {
        self.kind.required_privilege()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Diagnostic detail accumulated while running.
    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub(crate) fn start(&mut self) -> Result<(), TaskError> {
        self.transition(TaskState::Unscheduled, TaskState::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub(crate) fn complete(&mut self, outcome: TaskOutcome) -> Result<(), TaskError> {
        let to = if outcome.errors.is_empty() {
            TaskState::CompletedSuccessfully
        } else {
            TaskState::CompletedWithErrors
        };
        self.transition(TaskState::Running, to)?;
        self.messages.extend(outcome.messages);
        self.messages.extend(outcome.errors);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub(crate) fn fail(&mut self, detail: String) -> Result<(), TaskError> {
        self.transition(TaskState::Running, TaskState::StoppedByError)?;
        self.messages.push(detail);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub(crate) fn cancel(&mut self) -> Result<(), TaskError> {
        self.transition(TaskState::Unscheduled, TaskState::CanceledBeforeStart)?;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    fn transition(&mut self, expected: TaskState, to: TaskState) -> Result<(), TaskError> {
        if self.state != expected {
            return Err(TaskError::InvalidTransition { from: self.state, to });
        }
        self.state = to;
        Ok(())
    }
}
