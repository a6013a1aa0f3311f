// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Embedded directory
//!
//! Builds the entry store, privilege registry, task engine and operation gate
//! in-process from a configuration manifest and an LDIF seed file.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use dirgate_core::{
    application::{task_engine::poll_until_done, OperationGate, TaskEngine},
    dn::Dn,
    entry::Entry,
    identity::IdentityContext,
    infrastructure::{ldif::parse_ldif, EventBus, InMemoryEntryStore, LdifTaskRunner},
    operation::{Operation, OperationRequest},
    privilege::PrivilegeSet,
    privilege_registry::PrivilegeRegistry,
    server_config::ServerConfigManifest,
    task::{Task, TaskId},
};

pub struct EmbeddedDirectory {
    gate: OperationGate,
    config: ServerConfigManifest,
}

impl EmbeddedDirectory {
    pub async fn open(config: ServerConfigManifest, data: &Path) -> Result<Self> {
        config
            .validate()
            .context("Configuration validation failed")?;

        let layout = config
            .spec
            .layout
            .resolve()
            .context("Invalid directory layout")?;
        let defaults = config
            .spec
            .privileges
            .resolve()
            .context("Invalid default root privileges")?;
        let backends = config.resolve_backends()?;

        let content = tokio::fs::read_to_string(data)
            .await
            .with_context(|| format!("Failed to read seed data {:?}", data))?;
        let entries = parse_ldif(&content).with_context(|| format!("Failed to parse {:?}", data))?;

        let store = InMemoryEntryStore::new();
        let seeded = store.seed(entries);
        info!(entries = seeded, data = %data.display(), "Seeded embedded directory");

        let mut runner = LdifTaskRunner::new(Arc::new(store.clone()), backends, layout.schema_dn.clone());
        if let Some(directory) = &config.spec.schema_directory {
            runner = runner.with_schema_directory(directory.clone());
        }

        let event_bus = EventBus::with_default_capacity();
        let engine = TaskEngine::start(Arc::new(runner), event_bus.clone(), &config.spec.tasks);
        let gate = OperationGate::new(
            Arc::new(PrivilegeRegistry::new(defaults)),
            Arc::new(store),
            Arc::new(engine),
            event_bus,
            layout,
        );
        let defaults = gate
            .sync_default_privileges()
            .await
            .context("Failed to reconcile default root privileges")?;
        info!(privileges = %defaults, "Default root privileges in effect");

        Ok(Self { gate, config })
    }

    pub async fn bind(&self, dn: &str, administrative: bool) -> Result<IdentityContext> {
        let dn = Dn::parse(dn).with_context(|| format!("Invalid DN '{}'", dn))?;
        self.gate
            .bind(&dn, administrative)
            .await
            .with_context(|| format!("Cannot bind as '{}'", dn))
    }

    pub fn effective_privileges(&self, identity: &IdentityContext) -> PrivilegeSet {
        identity.effective_privileges(self.gate.registry())
    }

    /// Add the task entry through the gate and return the registered id.
    pub async fn submit_task(&self, identity: &IdentityContext, entry: Entry) -> Result<TaskId> {
        let target = entry.dn.to_string();
        let outcome = self
            .gate
            .check_and_run(OperationRequest::new(Operation::Add { entry }), identity)
            .await;
        match outcome.task_id {
            Some(task_id) if outcome.is_success() => Ok(task_id),
            _ => match outcome.response {
                Some(detail) => bail!("Task entry '{}' rejected: {} ({})", target, outcome.result_code, detail),
                None => bail!("Task entry '{}' rejected: {}", target, outcome.result_code),
            },
        }
    }

    pub async fn wait_for(&self, task_id: &TaskId) -> Result<Task> {
        poll_until_done(self.gate.engine(), task_id, &self.config.spec.tasks)
            .await
            .context("Task did not finish")
    }

    pub async fn shutdown(&self) {
        self.gate.engine().shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirgate_core::privilege::Privilege;
    use std::io::Write;

    const SEED: &str = "dn: o=test
objectClass: organization
o: test

dn: cn=Reader,o=test
objectClass: person
cn: Reader
ds-privilege-name: config-read

dn: cn=config
cn: config

dn: cn=Root DNs,cn=config
cn: Root DNs

dn: cn=Directory Manager,cn=Root DNs,cn=config
cn: Directory Manager
ds-privilege-name: -ldif-export
";

    fn seed_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SEED.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_effective_privileges_of_seeded_identities() {
        let file = seed_file();
        let directory = EmbeddedDirectory::open(ServerConfigManifest::default(), file.path())
            .await
            .unwrap();

        let reader = directory.bind("cn=Reader,o=test", false).await.unwrap();
        let privileges = directory.effective_privileges(&reader);
        assert_eq!(privileges.names(), vec!["config-read"]);

        let root = directory
            .bind("cn=Directory Manager,cn=Root DNs,cn=config", true)
            .await
            .unwrap();
        let privileges = directory.effective_privileges(&root);
        assert!(privileges.contains(Privilege::BackendBackup));
        assert!(!privileges.contains(Privilege::LdifExport));
    }

    #[tokio::test]
    async fn test_default_privileges_stored_in_seed_win() {
        let seed = SEED.replace("cn: Root DNs\n", "cn: Root DNs\nds-cfg-default-root-privilege-name: config-read\n");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(seed.as_bytes()).unwrap();
        let directory = EmbeddedDirectory::open(ServerConfigManifest::default(), file.path())
            .await
            .unwrap();

        let root = directory
            .bind("cn=Directory Manager,cn=Root DNs,cn=config", true)
            .await
            .unwrap();
        assert_eq!(directory.effective_privileges(&root).names(), vec!["config-read"]);
    }

    #[tokio::test]
    async fn test_unknown_bind_dn_fails() {
        let file = seed_file();
        let directory = EmbeddedDirectory::open(ServerConfigManifest::default(), file.path())
            .await
            .unwrap();
        assert!(directory.bind("cn=Nobody,o=test", false).await.is_err());
    }
}
