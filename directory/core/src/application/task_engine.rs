// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Task Engine
//!
//! Owns the registry of administrative tasks and executes them in the
//! background.
//!
//! ## Flow
//!
//! ```text
//! submit ──▶ registry (UNSCHEDULED) ──▶ queue ──▶ scheduler ──▶ worker (RUNNING) ──▶ terminal
//! ```
//!
//! - `submit` returns as soon as the task is registered and queued.
//! - The scheduler takes tasks in creation order. For each task it acquires
//!   an execution slot and the locks of the backends the task touches, then
//!   spawns a worker. Tasks touching the same backend therefore never
//!   overlap, and a task waiting for a backend holds up the tasks queued
//!   behind it.
//! - A worker runs the task inside its own spawned future, so a panic is
//!   observed as a join error and recorded as `STOPPED_BY_ERROR`.
//! - Nothing is retried, and a running task cannot be interrupted.
//! - Finished tasks stay in the registry for the configured retention and
//!   are purged on the next submission after that. An entry DN stays taken
//!   until its task is purged.
//!
//! Callers learn about progress by polling [`TaskEngine::get_task`]; see
//! [`poll_until_done`] for the two-tier caller-side wait.

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::application::operation_gate::AdmissionTicket;
use crate::domain::dn::Dn;
use crate::domain::events::TaskEvent;
use crate::domain::privilege::Privilege;
use crate::domain::repository::{TaskExecutionError, TaskRunner};
use crate::domain::result::ResultCode;
use crate::domain::server_config::TaskEngineConfig;
use crate::domain::task::{BackendScope, Task, TaskId, TaskOutcome, TaskState};
use crate::infrastructure::event_bus::EventBus;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskEngineError {
    #[error("Task {0} not found")]
    NotFound(TaskId),

    #[error("Task {task_id} cannot be canceled in state {state}")]
    NotCancelable { task_id: TaskId, state: TaskState },

    #[error("Admission does not cover required privilege {required}")]
    PrivilegeMismatch { required: Privilege },

    #[error("Task {0} already exists")]
    AlreadyExists(TaskId),

    #[error("Task entry {0} already exists")]
    EntryExists(Dn),

    #[error("Task engine is shut down")]
    ShutDown,
}

impl TaskEngineError {
    pub fn result_code(&self) -> ResultCode {
        match self {
            TaskEngineError::NotFound(_) => ResultCode::NoSuchObject,
            TaskEngineError::NotCancelable { .. } => ResultCode::UnwillingToPerform,
            TaskEngineError::PrivilegeMismatch { .. } => ResultCode::InsufficientAccessRights,
            TaskEngineError::AlreadyExists(_) | TaskEngineError::EntryExists(_) => ResultCode::EntryAlreadyExists,
            TaskEngineError::ShutDown => ResultCode::UnwillingToPerform,
        }
    }
}

type Registry = Arc<RwLock<HashMap<TaskId, Task>>>;

pub struct TaskEngine {
    registry: Registry,
    queue: mpsc::UnboundedSender<TaskId>,
    event_bus: EventBus,
    shutdown_token: CancellationToken,
    scheduler: Mutex<Option<JoinHandle<()>>>,
    retention: Duration,
}

impl TaskEngine {
    /// Start an engine and its scheduler on the current tokio runtime.
    pub fn start(runner: Arc<dyn TaskRunner>, event_bus: EventBus, config: &TaskEngineConfig) -> Self {
        let registry: Registry = Arc::new(RwLock::new(HashMap::new()));
        let (queue, receiver) = mpsc::unbounded_channel();
        let shutdown_token = CancellationToken::new();
        let max_concurrent = config.max_concurrent_tasks.max(1);

        let scheduler = Scheduler {
            registry: registry.clone(),
            runner,
            event_bus: event_bus.clone(),
            slots: Arc::new(Semaphore::new(max_concurrent)),
            backend_locks: Arc::new(DashMap::new()),
            all_backends: Arc::new(tokio::sync::RwLock::new(())),
        };
        let token = shutdown_token.clone();
        let handle = tokio::spawn(async move { scheduler.run(receiver, token).await });

        let retention = config.completed_task_retention();
        info!(max_concurrent, retention = ?retention, "Task engine started");
        Self {
            registry,
            queue,
            event_bus,
            shutdown_token,
            scheduler: Mutex::new(Some(handle)),
            retention,
        }
    }

    /// Register and queue an admitted task. Returns before execution starts.
    pub fn submit(&self, ticket: &AdmissionTicket, task: Task) -> Result<TaskId, TaskEngineError> {
        if self.shutdown_token.is_cancelled() {
            return Err(TaskEngineError::ShutDown);
        }
        let required = task.required_privilege();
        if !ticket.covers(required) {
            warn!(task_id = %task.id(), required = %required, "Task admission does not cover its privilege");
            return Err(TaskEngineError::PrivilegeMismatch { required });
        }

        let task_id = task.id().clone();
        let event = TaskEvent::TaskScheduled {
            task_id: task_id.clone(),
            kind: task.kind().name().to_string(),
            creator: task.creator().map(|dn| dn.to_string()),
            scheduled_at: task.created_at(),
        };
        {
            let mut registry = self.registry.write();
            purge_expired(&mut registry, self.retention);
            if registry.contains_key(&task_id) {
                return Err(TaskEngineError::AlreadyExists(task_id));
            }
            if registry.values().any(|existing| existing.entry_dn() == task.entry_dn()) {
                return Err(TaskEngineError::EntryExists(task.entry_dn().clone()));
            }
            registry.insert(task_id.clone(), task);
        }

        // published before queueing so that it precedes TaskStarted
        info!(task_id = %task_id, "Task scheduled");
        self.event_bus.publish_task_event(event);
        if self.queue.send(task_id.clone()).is_err() {
            self.registry.write().remove(&task_id);
            return Err(TaskEngineError::ShutDown);
        }
        Ok(task_id)
    }

    /// Read-only view of a task.
    pub fn get_task(&self, task_id: &TaskId) -> Option<Task> {
        self.registry.read().get(task_id).cloned()
    }

    /// Read-only view of the task created by the entry at `dn`.
    pub fn find_by_entry(&self, dn: &Dn) -> Option<Task> {
        self.registry
            .read()
            .values()
            .find(|task| task.entry_dn() == dn)
            .cloned()
    }

    /// Cancel a task that has not started yet.
    pub fn cancel(&self, task_id: &TaskId) -> Result<Task, TaskEngineError> {
        let canceled = {
            let mut registry = self.registry.write();
            let task = registry
                .get_mut(task_id)
                .ok_or_else(|| TaskEngineError::NotFound(task_id.clone()))?;
            task.cancel().map_err(|_| TaskEngineError::NotCancelable {
                task_id: task_id.clone(),
                state: task.state(),
            })?;
            task.clone()
        };
        info!(task_id = %task_id, "Task canceled before start");
        self.event_bus.publish_task_event(TaskEvent::TaskCanceled {
            task_id: task_id.clone(),
            canceled_at: canceled.completed_at().unwrap_or_else(chrono::Utc::now),
        });
        Ok(canceled)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Stop the scheduler. Tasks already running finish normally; queued
    /// tasks are canceled before start.
    pub async fn shutdown(&self) {
        if self.shutdown_token.is_cancelled() {
            return;
        }
        info!("Shutting down task engine");
        self.shutdown_token.cancel();

        let handle = self.scheduler.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Task scheduler ended abnormally: {}", e);
            }
        }

        let pending: Vec<TaskId> = self
            .registry
            .read()
            .values()
            .filter(|task| task.state() == TaskState::Unscheduled)
            .map(|task| task.id().clone())
            .collect();
        for task_id in pending {
            if let Err(e) = self.cancel(&task_id) {
                debug!(task_id = %task_id, "Pending task not canceled at shutdown: {}", e);
            }
        }
    }
}

/// Drop finished tasks older than `retention`.
fn purge_expired(registry: &mut HashMap<TaskId, Task>, retention: Duration) {
    let now = chrono::Utc::now();
    let before = registry.len();
    registry.retain(|_, task| {
        let Some(completed_at) = task.completed_at().filter(|_| task.state().is_done()) else {
            return true;
        };
        // a clock step backwards keeps the task
        (now - completed_at).to_std().map_or(true, |age| age < retention)
    });
    let purged = before - registry.len();
    if purged > 0 {
        debug!(purged, "Purged finished tasks past retention");
    }
}

/// Everything a worker holds while its task runs.
#[derive(Default)]
struct BackendGuards {
    _shared: Option<OwnedRwLockReadGuard<()>>,
    _exclusive: Option<OwnedRwLockWriteGuard<()>>,
    _backends: Vec<OwnedMutexGuard<()>>,
}

struct ExecutionGuards {
    _slot: OwnedSemaphorePermit,
    _backends: BackendGuards,
}

#[derive(Clone)]
struct Scheduler {
    registry: Registry,
    runner: Arc<dyn TaskRunner>,
    event_bus: EventBus,
    slots: Arc<Semaphore>,
    /// One lock per backend id (lower-cased)
    backend_locks: Arc<DashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    /// Shared by single-backend tasks, exclusive for tasks touching every backend
    all_backends: Arc<tokio::sync::RwLock<()>>,
}

impl Scheduler {
    async fn run(self, mut queue: mpsc::UnboundedReceiver<TaskId>, shutdown_token: CancellationToken) {
        loop {
            let task_id = tokio::select! {
                _ = shutdown_token.cancelled() => break,
                next = queue.recv() => match next {
                    Some(task_id) => task_id,
                    None => break,
                },
            };

            let Some(scope) = self.pending_scope(&task_id) else {
                debug!(task_id = %task_id, "Skipping task that is no longer pending");
                continue;
            };

            let guards = tokio::select! {
                _ = shutdown_token.cancelled() => break,
                guards = self.acquire(scope) => guards,
            };
            match guards {
                Some(guards) => self.launch(task_id, guards),
                None => break,
            }
        }
        info!("Task scheduler stopped");
    }

    fn pending_scope(&self, task_id: &TaskId) -> Option<BackendScope> {
        self.registry
            .read()
            .get(task_id)
            .filter(|task| task.state() == TaskState::Unscheduled)
            .map(|task| task.kind().backend_scope())
    }

    async fn acquire(&self, scope: BackendScope) -> Option<ExecutionGuards> {
        let slot = self.slots.clone().acquire_owned().await.ok()?;
        let backends = match scope {
            BackendScope::None => BackendGuards::default(),
            BackendScope::All => BackendGuards {
                _exclusive: Some(self.all_backends.clone().write_owned().await),
                ..Default::default()
            },
            BackendScope::Backends(ids) => {
                let shared = self.all_backends.clone().read_owned().await;
                // fixed lock order
                let mut ids: Vec<String> = ids.iter().map(|id| id.to_ascii_lowercase()).collect();
                ids.sort();
                ids.dedup();
                let mut guards = Vec::with_capacity(ids.len());
                for id in ids {
                    let lock = self.backend_locks.entry(id).or_default().clone();
                    guards.push(lock.lock_owned().await);
                }
                BackendGuards {
                    _shared: Some(shared),
                    _exclusive: None,
                    _backends: guards,
                }
            }
        };
        Some(ExecutionGuards {
            _slot: slot,
            _backends: backends,
        })
    }

    fn launch(&self, task_id: TaskId, guards: ExecutionGuards) {
        let snapshot = {
            let mut registry = self.registry.write();
            let Some(task) = registry.get_mut(&task_id) else {
                return;
            };
            // canceled while waiting for its backends
            if task.start().is_err() {
                debug!(task_id = %task_id, state = %task.state(), "Task left the queue before starting");
                return;
            }
            task.clone()
        };

        info!(task_id = %task_id, kind = snapshot.kind().name(), "Task started");
        self.event_bus.publish_task_event(TaskEvent::TaskStarted {
            task_id: task_id.clone(),
            started_at: snapshot.started_at().unwrap_or_else(chrono::Utc::now),
        });

        let scheduler = self.clone();
        tokio::spawn(async move {
            let _guards = guards;
            let runner = scheduler.runner.clone();
            let result = tokio::spawn(async move { runner.run(&snapshot).await }).await;
            scheduler.finish(&task_id, result);
        });
    }

    fn finish(&self, task_id: &TaskId, result: Result<Result<TaskOutcome, TaskExecutionError>, JoinError>) {
        let finished = {
            let mut registry = self.registry.write();
            let Some(task) = registry.get_mut(task_id) else {
                return;
            };
            let transition = match result {
                Ok(Ok(outcome)) => task.complete(outcome),
                Ok(Err(e)) => {
                    warn!(task_id = %task_id, "Task failed: {}", e);
                    task.fail(e.to_string())
                }
                Err(e) => {
                    error!(task_id = %task_id, "Task aborted: {}", e);
                    task.fail(format!("Task aborted unexpectedly: {}", e))
                }
            };
            if let Err(e) = transition {
                error!(task_id = %task_id, "Could not record task result: {}", e);
                return;
            }
            task.clone()
        };

        info!(task_id = %task_id, state = %finished.state(), "Task finished");
        self.event_bus.publish_task_event(TaskEvent::TaskCompleted {
            task_id: task_id.clone(),
            state: finished.state(),
            detail: finished.messages().to_vec(),
            completed_at: finished.completed_at().unwrap_or_else(chrono::Utc::now),
        });
    }
}

#[derive(Debug, Error)]
pub enum TaskPollError {
    #[error("Task {task_id} did not appear within {timeout:?}")]
    NotScheduled { task_id: TaskId, timeout: Duration },

    #[error("Task {task_id} did not finish within {timeout:?} (last state {state})")]
    NotCompleted {
        task_id: TaskId,
        state: TaskState,
        timeout: Duration,
    },
}

/// Caller-side wait for a task: first for it to appear (scheduling timeout),
/// then for it to reach a terminal state (completion timeout). The engine
/// itself never waits or times out.
pub async fn poll_until_done(
    engine: &TaskEngine,
    task_id: &TaskId,
    config: &TaskEngineConfig,
) -> Result<Task, TaskPollError> {
    let interval = config.poll_interval();

    let appear = async {
        loop {
            if let Some(task) = engine.get_task(task_id) {
                return task;
            }
            tokio::time::sleep(interval).await;
        }
    };
    let mut task = tokio::time::timeout(config.scheduling_timeout(), appear)
        .await
        .map_err(|_| TaskPollError::NotScheduled {
            task_id: task_id.clone(),
            timeout: config.scheduling_timeout(),
        })?;

    let deadline = tokio::time::Instant::now() + config.completion_timeout();
    while !task.state().is_done() {
        if tokio::time::Instant::now() >= deadline {
            return Err(TaskPollError::NotCompleted {
                task_id: task_id.clone(),
                state: task.state(),
                timeout: config.completion_timeout(),
            });
        }
        tokio::time::sleep(interval).await;
        if let Some(latest) = engine.get_task(task_id) {
            task = latest;
        }
    }
    Ok(task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::privilege::PrivilegeSet;
    use crate::domain::task::TaskKind;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Runner whose behaviour is chosen by the export file name.
    #[derive(Default)]
    struct ScriptedRunner {
        release: Notify,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl TaskRunner for ScriptedRunner {
        async fn run(&self, task: &Task) -> Result<TaskOutcome, TaskExecutionError> {
            let TaskKind::Export { ldif_file, .. } = task.kind() else {
                return Ok(TaskOutcome::default().message("done"));
            };
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let result = match ldif_file.to_str() {
                Some("block") => {
                    self.release.notified().await;
                    Ok(TaskOutcome::default())
                }
                Some("slow") => {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    Ok(TaskOutcome::default())
                }
                Some("fail") => Err(TaskExecutionError::InvalidArgument("bad file".to_string())),
                Some("panic") => panic!("runner exploded"),
                _ => Ok(TaskOutcome::default()),
            };
            self.active.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    fn export(backend: &str, file: &str) -> TaskKind {
        TaskKind::Export {
            backend_id: backend.to_string(),
            ldif_file: PathBuf::from(file),
        }
    }

    fn new_task(id: &str, kind: TaskKind) -> Task {
        let dn = Dn::parse(&format!("ds-task-id={},cn=Scheduled Tasks,cn=Tasks", id)).unwrap();
        Task::new(TaskId(id.to_string()), dn, kind, None)
    }

    fn ticket() -> AdmissionTicket {
        AdmissionTicket::new(PrivilegeSet::all())
    }

    fn config(max_concurrent_tasks: usize) -> TaskEngineConfig {
        TaskEngineConfig {
            max_concurrent_tasks,
            poll_interval_ms: 5,
            scheduling_timeout_ms: 1_000,
            completion_timeout_ms: 5_000,
            completed_task_retention_secs: 3_600,
        }
    }

    fn engine(runner: Arc<ScriptedRunner>, max_concurrent_tasks: usize) -> TaskEngine {
        TaskEngine::start(runner, EventBus::new(64), &config(max_concurrent_tasks))
    }

    #[tokio::test]
    async fn test_submitted_task_completes() {
        let engine = engine(Arc::new(ScriptedRunner::default()), 2);
        let mut events = engine.event_bus.subscribe_task(TaskId("t1".to_string()));
        let id = engine.submit(&ticket(), new_task("t1", export("userRoot", "ok"))).unwrap();

        let initial = engine.get_task(&id).unwrap().state();
        assert!(matches!(initial, TaskState::Unscheduled | TaskState::Running | TaskState::CompletedSuccessfully));

        let task = poll_until_done(&engine, &id, &config(2)).await.unwrap();
        assert_eq!(task.state(), TaskState::CompletedSuccessfully);
        assert!(matches!(events.recv().await.unwrap(), TaskEvent::TaskScheduled { .. }));
    }

    #[tokio::test]
    async fn test_ticket_must_cover_task_privilege() {
        let engine = engine(Arc::new(ScriptedRunner::default()), 1);
        let narrow = AdmissionTicket::new([Privilege::BackendBackup].into_iter().collect());
        let err = engine
            .submit(&narrow, new_task("t1", export("userRoot", "ok")))
            .unwrap_err();
        assert_eq!(
            err,
            TaskEngineError::PrivilegeMismatch {
                required: Privilege::LdifExport
            }
        );
        assert!(engine.get_task(&TaskId("t1".to_string())).is_none());
    }

    #[tokio::test]
    async fn test_duplicate_ids_rejected() {
        let engine = engine(Arc::new(ScriptedRunner::default()), 1);
        engine.submit(&ticket(), new_task("dup", export("a", "ok"))).unwrap();
        let err = engine.submit(&ticket(), new_task("dup", export("b", "ok"))).unwrap_err();
        assert_eq!(err.result_code(), ResultCode::EntryAlreadyExists);
    }

    #[tokio::test]
    async fn test_duplicate_entry_dn_rejected() {
        let engine = engine(Arc::new(ScriptedRunner::default()), 1);
        let entry_dn = Dn::parse("cn=nightly,cn=Scheduled Tasks,cn=Tasks").unwrap();
        let first = Task::new(TaskId::new(), entry_dn.clone(), export("a", "ok"), None);
        let second = Task::new(TaskId::new(), entry_dn.clone(), export("b", "ok"), None);
        let second_id = second.id().clone();

        let id = engine.submit(&ticket(), first).unwrap();
        let err = engine.submit(&ticket(), second).unwrap_err();
        assert_eq!(err, TaskEngineError::EntryExists(entry_dn.clone()));
        assert_eq!(err.result_code(), ResultCode::EntryAlreadyExists);
        assert!(engine.get_task(&second_id).is_none());

        // still taken once the first task has finished
        poll_until_done(&engine, &id, &config(1)).await.unwrap();
        let third = Task::new(TaskId::new(), entry_dn, export("c", "ok"), None);
        assert!(matches!(
            engine.submit(&ticket(), third),
            Err(TaskEngineError::EntryExists(_))
        ));
    }

    #[tokio::test]
    async fn test_finished_tasks_purged_after_retention() {
        let immediate = TaskEngineConfig {
            completed_task_retention_secs: 0,
            ..config(1)
        };
        let purging = TaskEngine::start(Arc::new(ScriptedRunner::default()), EventBus::new(64), &immediate);
        let first = purging.submit(&ticket(), new_task("first", export("a", "ok"))).unwrap();
        let first_dn = purging.get_task(&first).unwrap().entry_dn().clone();
        poll_until_done(&purging, &first, &immediate).await.unwrap();

        // the same entry can be added again once the finished task is purged
        let again = Task::new(TaskId("again".to_string()), first_dn.clone(), export("a", "ok"), None);
        purging.submit(&ticket(), again).unwrap();
        assert!(purging.get_task(&first).is_none());
        assert_eq!(purging.find_by_entry(&first_dn).unwrap().id(), &TaskId("again".to_string()));

        let keeping = engine(Arc::new(ScriptedRunner::default()), 1);
        let done = keeping.submit(&ticket(), new_task("kept", export("a", "ok"))).unwrap();
        poll_until_done(&keeping, &done, &config(1)).await.unwrap();
        keeping.submit(&ticket(), new_task("next", export("a", "ok"))).unwrap();
        assert!(keeping.get_task(&done).is_some());
    }

    #[tokio::test]
    async fn test_cancel_only_while_unscheduled() {
        let runner = Arc::new(ScriptedRunner::default());
        let engine = engine(runner.clone(), 1);
        let blocker = engine.submit(&ticket(), new_task("blocker", export("a", "block"))).unwrap();
        let queued = engine.submit(&ticket(), new_task("queued", export("b", "ok"))).unwrap();

        // wait until the blocker holds the only slot
        for _ in 0..200 {
            if engine.get_task(&blocker).unwrap().state() == TaskState::Running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(engine.get_task(&blocker).unwrap().state(), TaskState::Running);

        let canceled = engine.cancel(&queued).unwrap();
        assert_eq!(canceled.state(), TaskState::CanceledBeforeStart);
        assert!(matches!(
            engine.cancel(&blocker),
            Err(TaskEngineError::NotCancelable { state: TaskState::Running, .. })
        ));
        assert!(matches!(
            engine.cancel(&TaskId("missing".to_string())),
            Err(TaskEngineError::NotFound(_))
        ));

        runner.release.notify_one();
        let done = poll_until_done(&engine, &blocker, &config(1)).await.unwrap();
        assert_eq!(done.state(), TaskState::CompletedSuccessfully);
        assert_eq!(engine.get_task(&queued).unwrap().state(), TaskState::CanceledBeforeStart);
    }

    #[tokio::test]
    async fn test_failures_stop_task_with_detail() {
        let engine = engine(Arc::new(ScriptedRunner::default()), 2);
        let failed = engine.submit(&ticket(), new_task("fail", export("a", "fail"))).unwrap();
        let panicked = engine.submit(&ticket(), new_task("panic", export("b", "panic"))).unwrap();

        let failed = poll_until_done(&engine, &failed, &config(2)).await.unwrap();
        assert_eq!(failed.state(), TaskState::StoppedByError);
        assert!(failed.messages()[0].contains("bad file"));

        let panicked = poll_until_done(&engine, &panicked, &config(2)).await.unwrap();
        assert_eq!(panicked.state(), TaskState::StoppedByError);

        // the engine keeps working afterwards
        let next = engine.submit(&ticket(), new_task("after", export("a", "ok"))).unwrap();
        let next = poll_until_done(&engine, &next, &config(2)).await.unwrap();
        assert_eq!(next.state(), TaskState::CompletedSuccessfully);
    }

    #[tokio::test]
    async fn test_same_backend_tasks_do_not_overlap() {
        let runner = Arc::new(ScriptedRunner::default());
        let engine = engine(runner.clone(), 4);
        let ids: Vec<TaskId> = (0..3)
            .map(|i| {
                engine
                    .submit(&ticket(), new_task(&format!("s{}", i), export("userRoot", "slow")))
                    .unwrap()
            })
            .collect();
        for id in &ids {
            poll_until_done(&engine, id, &config(4)).await.unwrap();
        }
        assert_eq!(runner.peak.load(Ordering::SeqCst), 1);

        let started: Vec<_> = ids
            .iter()
            .map(|id| engine.get_task(id).unwrap().started_at().unwrap())
            .collect();
        assert!(started.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_tasks() {
        let engine = engine(Arc::new(ScriptedRunner::default()), 1);
        engine.shutdown().await;
        assert!(engine.is_shut_down());
        let err = engine.submit(&ticket(), new_task("late", export("a", "ok"))).unwrap_err();
        assert_eq!(err, TaskEngineError::ShutDown);
        assert_eq!(err.result_code(), ResultCode::UnwillingToPerform);
    }
}
