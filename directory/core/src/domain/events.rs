// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::operation::OperationKind;
use crate::domain::result::ResultCode;
use crate::domain::task::{TaskId, TaskState};

/// Outcome of the privilege gate for one operation.
///
/// Rejections carry no privilege names; they mirror what the client sees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AuthorizationEvent {
    OperationAdmitted {
        operation: OperationKind,
        target: Option<String>,
        identity: String,
        admitted_at: DateTime<Utc>,
    },
    OperationRejected {
        operation: OperationKind,
        target: Option<String>,
        identity: String,
        result_code: ResultCode,
        rejected_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TaskEvent {
    TaskScheduled {
        task_id: TaskId,
        kind: String,
        creator: Option<String>,
        scheduled_at: DateTime<Utc>,
    },
    TaskStarted {
        task_id: TaskId,
        started_at: DateTime<Utc>,
    },
    TaskCompleted {
        task_id: TaskId,
        state: TaskState,
        detail: Vec<String>,
        completed_at: DateTime<Utc>,
    },
    TaskCanceled {
        task_id: TaskId,
        canceled_at: DateTime<Utc>,
    },
}

impl TaskEvent {
    pub fn task_id(&self) -> &TaskId {
        match self {
            TaskEvent::TaskScheduled { task_id, .. }
            | TaskEvent::TaskStarted { task_id, .. }
            | TaskEvent::TaskCompleted { task_id, .. }
            | TaskEvent::TaskCanceled { task_id, .. } => task_id,
        }
    }
}
