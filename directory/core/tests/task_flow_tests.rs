// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Administrative tasks submitted through the gate as task entries.

mod common;

use std::path::Path;

use common::*;
use dirgate_core::application::task_engine::poll_until_done;
use dirgate_core::entry::Entry;
use dirgate_core::events::TaskEvent;
use dirgate_core::identity::IdentityContext;
use dirgate_core::infrastructure::ldif::parse_ldif;
use dirgate_core::operation::{Operation, OperationRequest};
use dirgate_core::result::ResultCode;
use dirgate_core::task::{
    Task, TaskId, TaskState, BACKUP_ALL_ATTRIBUTE, BACKUP_DIRECTORY_ATTRIBUTE, EXPORT_BACKEND_ATTRIBUTE,
    EXPORT_FILE_ATTRIBUTE, IMPORT_BACKEND_ATTRIBUTE, IMPORT_FILE_ATTRIBUTE, SCHEMA_FILE_ATTRIBUTE,
};
use tempfile::TempDir;

fn task_dn(id: &str) -> String {
    format!("ds-task-id={},cn=Scheduled Tasks,cn=Tasks", id)
}

fn backup_entry(id: &str, directory: &Path) -> Entry {
    Entry::new(dn(&task_dn(id)))
        .with_attribute("objectClass", &["top", "ds-task", "ds-task-backup"])
        .with_attribute(BACKUP_DIRECTORY_ATTRIBUTE, &[directory.to_string_lossy().as_ref()])
        .with_attribute(BACKUP_ALL_ATTRIBUTE, &["true"])
}

fn restore_entry(id: &str, directory: &Path) -> Entry {
    Entry::new(dn(&task_dn(id)))
        .with_attribute("objectClass", &["top", "ds-task", "ds-task-restore"])
        .with_attribute(BACKUP_DIRECTORY_ATTRIBUTE, &[directory.to_string_lossy().as_ref()])
}

fn export_entry(id: &str, file: &Path) -> Entry {
    Entry::new(dn(&task_dn(id)))
        .with_attribute("objectClass", &["top", "ds-task", "ds-task-export"])
        .with_attribute(EXPORT_BACKEND_ATTRIBUTE, &["userRoot"])
        .with_attribute(EXPORT_FILE_ATTRIBUTE, &[file.to_string_lossy().as_ref()])
}

fn import_entry(id: &str, file: &Path) -> Entry {
    Entry::new(dn(&task_dn(id)))
        .with_attribute("objectClass", &["top", "ds-task", "ds-task-import"])
        .with_attribute(IMPORT_BACKEND_ATTRIBUTE, &["userRoot"])
        .with_attribute(IMPORT_FILE_ATTRIBUTE, &[file.to_string_lossy().as_ref()])
}

async fn submit(h: &Harness, entry: Entry, identity: &IdentityContext) -> (ResultCode, Option<TaskId>) {
    let outcome = h
        .gate
        .check_and_run(OperationRequest::new(Operation::Add { entry }), identity)
        .await;
    (outcome.result_code, outcome.task_id)
}

async fn wait(h: &Harness, task_id: &TaskId) -> Task {
    poll_until_done(h.gate.engine(), task_id, &h.config).await.unwrap()
}

#[tokio::test]
async fn test_backup_task_per_identity() {
    let h = Harness::start(None).await;
    let directory = TempDir::new().unwrap();

    for (index, (name, identity, privileged)) in h.cast().await.into_iter().enumerate() {
        let id = format!("backup-{}", index);
        let target = directory.path().join(&id);
        let (code, task_id) = submit(&h, backup_entry(&id, &target), &identity).await;

        if privileged {
            assert_eq!(code, ResultCode::Success, "{}", name);
            let task = wait(&h, &task_id.unwrap()).await;
            assert_eq!(task.state(), TaskState::CompletedSuccessfully, "{}", name);
            assert_eq!(task.creator(), identity.dn());
            assert!(target.join("userRoot").join("backup.ldif").exists(), "{}", name);
        } else {
            assert_eq!(code, ResultCode::InsufficientAccessRights, "{}", name);
            assert!(task_id.is_none());
            // a rejected task is never registered
            assert!(h.gate.engine().find_by_entry(&dn(&task_dn(&id))).is_none(), "{}", name);
            assert!(!target.exists(), "{}", name);
        }
    }
}

#[tokio::test]
async fn test_task_lifecycle_events() {
    let h = Harness::start(None).await;
    let directory = TempDir::new().unwrap();
    let task_id = TaskId("events".to_string());
    let mut events = h.bus.subscribe_task(task_id.clone());

    let (code, submitted) = submit(&h, backup_entry("events", directory.path()), &h.root().await).await;
    assert_eq!(code, ResultCode::Success);
    assert_eq!(submitted.as_ref(), Some(&task_id));

    assert!(matches!(events.recv().await.unwrap(), TaskEvent::TaskScheduled { .. }));
    assert!(matches!(events.recv().await.unwrap(), TaskEvent::TaskStarted { .. }));
    match events.recv().await.unwrap() {
        TaskEvent::TaskCompleted { state, .. } => assert_eq!(state, TaskState::CompletedSuccessfully),
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_export_then_import_replaces_backend() {
    let h = Harness::start(None).await;
    let directory = TempDir::new().unwrap();
    let file = directory.path().join("userRoot.ldif");
    let user = h.privileged_user().await;

    let (code, task_id) = submit(&h, export_entry("export", &file), &user).await;
    assert_eq!(code, ResultCode::Success);
    assert_eq!(wait(&h, &task_id.unwrap()).await.state(), TaskState::CompletedSuccessfully);

    let exported = parse_ldif(&std::fs::read_to_string(&file).unwrap()).unwrap();
    assert_eq!(exported.len(), 3);

    // drop one user from the file and import it back
    let kept: Vec<&Entry> = exported
        .iter()
        .filter(|e| e.dn != dn(UNPRIVILEGED_USER_DN))
        .collect();
    std::fs::write(&file, dirgate_core::infrastructure::ldif::write_ldif(kept)).unwrap();

    let (code, task_id) = submit(&h, import_entry("import", &file), &user).await;
    assert_eq!(code, ResultCode::Success);
    assert_eq!(wait(&h, &task_id.unwrap()).await.state(), TaskState::CompletedSuccessfully);
    assert!(h.store.snapshot(&dn(UNPRIVILEGED_USER_DN)).is_none());
    assert!(h.store.snapshot(&dn(PRIVILEGED_USER_DN)).is_some());
    // other backends are untouched
    assert!(h.store.snapshot(&dn(ROOT_DN)).is_some());
}

#[tokio::test]
async fn test_import_with_stray_entries_completes_with_errors() {
    let h = Harness::start(None).await;
    let directory = TempDir::new().unwrap();
    let file = directory.path().join("mixed.ldif");
    std::fs::write(
        &file,
        "dn: o=test\no: test\n\ndn: cn=Elsewhere,o=other\ncn: Elsewhere\n",
    )
    .unwrap();

    let (code, task_id) = submit(&h, import_entry("mixed", &file), &h.root().await).await;
    assert_eq!(code, ResultCode::Success);
    let task = wait(&h, &task_id.unwrap()).await;
    assert_eq!(task.state(), TaskState::CompletedWithErrors);
    assert!(task.messages().iter().any(|m| m.contains("cn=Elsewhere")));
}

#[tokio::test]
async fn test_backup_then_restore() {
    let h = Harness::start(None).await;
    let directory = TempDir::new().unwrap();
    let root = h.root().await;

    let (_, task_id) = submit(&h, backup_entry("backup", directory.path()), &root).await;
    assert_eq!(wait(&h, &task_id.unwrap()).await.state(), TaskState::CompletedSuccessfully);

    let delete = h
        .gate
        .check_and_run(
            OperationRequest::new(Operation::Delete {
                dn: dn(UNPRIVILEGED_USER_DN),
            }),
            &root,
        )
        .await;
    assert_eq!(delete.result_code, ResultCode::Success);
    assert!(h.store.snapshot(&dn(UNPRIVILEGED_USER_DN)).is_none());

    let (code, task_id) = submit(&h, restore_entry("restore", &directory.path().join("userRoot")), &root).await;
    assert_eq!(code, ResultCode::Success);
    assert_eq!(wait(&h, &task_id.unwrap()).await.state(), TaskState::CompletedSuccessfully);
    assert!(h.store.snapshot(&dn(UNPRIVILEGED_USER_DN)).is_some());
}

#[tokio::test]
async fn test_restore_requires_restore_privilege() {
    let h = Harness::start(None).await;
    let directory = TempDir::new().unwrap();
    let (code, task_id) = submit(
        &h,
        restore_entry("restore", &directory.path().join("userRoot")),
        &h.unprivileged_root().await,
    )
    .await;
    assert_eq!(code, ResultCode::InsufficientAccessRights);
    assert!(task_id.is_none());
}

#[tokio::test]
async fn test_add_schema_file() {
    let schema_directory = TempDir::new().unwrap();
    std::fs::write(
        schema_directory.path().join("99-test.ldif"),
        "dn: cn=schema\nattributeTypes: ( 1.3.6.1.4.1.26027.1.999.100 NAME 'testAttr' )\n",
    )
    .unwrap();
    let h = Harness::start(Some(schema_directory.path())).await;

    let schema_task = |id: &str| {
        Entry::new(dn(&task_dn(id)))
            .with_attribute("objectClass", &["top", "ds-task", "ds-task-add-schema-file"])
            .with_attribute(SCHEMA_FILE_ATTRIBUTE, &["99-test.ldif"])
    };

    let (code, _) = submit(&h, schema_task("denied"), &h.unprivileged_user().await).await;
    assert_eq!(code, ResultCode::InsufficientAccessRights);

    let (code, task_id) = submit(&h, schema_task("allowed"), &h.privileged_user().await).await;
    assert_eq!(code, ResultCode::Success);
    assert_eq!(wait(&h, &task_id.unwrap()).await.state(), TaskState::CompletedSuccessfully);
    let schema = h.store.snapshot(&dn("cn=schema")).unwrap();
    assert!(schema.has_value(
        "attributeTypes",
        "( 1.3.6.1.4.1.26027.1.999.100 NAME 'testAttr' )"
    ));
}

#[tokio::test]
async fn test_missing_schema_file_stops_task() {
    let schema_directory = TempDir::new().unwrap();
    let h = Harness::start(Some(schema_directory.path())).await;
    let entry = Entry::new(dn(&task_dn("missing")))
        .with_attribute("objectClass", &["top", "ds-task", "ds-task-add-schema-file"])
        .with_attribute(SCHEMA_FILE_ATTRIBUTE, &["absent.ldif"]);

    let (code, task_id) = submit(&h, entry, &h.root().await).await;
    assert_eq!(code, ResultCode::Success);
    let task = wait(&h, &task_id.unwrap()).await;
    assert_eq!(task.state(), TaskState::StoppedByError);
    assert!(!task.messages().is_empty());
}

#[tokio::test]
async fn test_malformed_task_entry_is_unwilling() {
    let h = Harness::start(None).await;
    // a backup task without a backup directory
    let broken = || {
        Entry::new(dn(&task_dn("broken"))).with_attribute("objectClass", &["top", "ds-task", "ds-task-backup"])
    };

    // the missing argument is only noticed once the caller is admitted
    for (name, identity, privileged) in h.cast().await {
        let (code, task_id) = submit(&h, broken(), &identity).await;
        let expected = if privileged {
            ResultCode::UnwillingToPerform
        } else {
            ResultCode::InsufficientAccessRights
        };
        assert_eq!(code, expected, "{}", name);
        assert!(task_id.is_none(), "{}", name);
    }
    assert!(h.gate.engine().find_by_entry(&dn(&task_dn("broken"))).is_none());
}

#[tokio::test]
async fn test_task_entry_dn_cannot_be_added_twice() {
    let h = Harness::start(None).await;
    let directory = TempDir::new().unwrap();
    let root = h.root().await;
    let nightly = "cn=nightly,cn=Scheduled Tasks,cn=Tasks";
    let entry = |target: &str| {
        Entry::new(dn(nightly))
            .with_attribute("objectClass", &["top", "ds-task", "ds-task-backup"])
            .with_attribute(BACKUP_DIRECTORY_ATTRIBUTE, &[directory.path().join(target).to_string_lossy().as_ref()])
            .with_attribute(BACKUP_ALL_ATTRIBUTE, &["true"])
    };

    let (first, first_id) = submit(&h, entry("one"), &root).await;
    assert_eq!(first, ResultCode::Success);
    let (second, second_id) = submit(&h, entry("two"), &root).await;
    assert_eq!(second, ResultCode::EntryAlreadyExists);
    assert!(second_id.is_none());

    let task = wait(&h, &first_id.unwrap()).await;
    assert_eq!(h.gate.engine().find_by_entry(&dn(nightly)).unwrap().id(), task.id());
    assert!(!directory.path().join("two").exists());
}

#[tokio::test]
async fn test_deleting_task_entry() {
    let h = Harness::start(None).await;
    let directory = TempDir::new().unwrap();
    let root = h.root().await;
    let (_, task_id) = submit(&h, backup_entry("done", directory.path()), &root).await;
    wait(&h, &task_id.unwrap()).await;

    let delete = |identity: IdentityContext| {
        let gate = &h.gate;
        async move {
            gate.check_and_run(
                OperationRequest::new(Operation::Delete { dn: dn(&task_dn("done")) }),
                &identity,
            )
            .await
            .result_code
        }
    };

    // the task kind's privilege guards deletion too
    assert_eq!(delete(h.unprivileged_user().await).await, ResultCode::InsufficientAccessRights);
    // finished tasks cannot be canceled
    assert_eq!(delete(root.clone()).await, ResultCode::UnwillingToPerform);

    let unknown = h
        .gate
        .check_and_run(
            OperationRequest::new(Operation::Delete { dn: dn(&task_dn("unknown")) }),
            &root,
        )
        .await;
    assert_eq!(unknown.result_code, ResultCode::NoSuchObject);
}

#[tokio::test]
async fn test_shutdown_rejects_new_tasks() {
    let h = Harness::start(None).await;
    let directory = TempDir::new().unwrap();
    h.gate.engine().shutdown().await;
    let (code, task_id) = submit(&h, backup_entry("late", directory.path()), &h.root().await).await;
    assert_eq!(code, ResultCode::UnwillingToPerform);
    assert!(task_id.is_none());
}
