// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Shared fixture: an in-memory directory with the usual cast of identities,
//! wired to a gate, a task engine and an LDIF task runner.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use dirgate_core::application::{OperationGate, TaskEngine};
use dirgate_core::dn::Dn;
use dirgate_core::identity::IdentityContext;
use dirgate_core::infrastructure::ldif::parse_ldif;
use dirgate_core::infrastructure::{EventBus, InMemoryEntryStore, LdifTaskRunner};
use dirgate_core::privilege::Privilege;
use dirgate_core::privilege_registry::PrivilegeRegistry;
use dirgate_core::server_config::{DirectoryLayout, TaskEngineConfig};

pub const ROOT_DN: &str = "cn=Directory Manager,cn=Root DNs,cn=config";
pub const UNPRIVILEGED_ROOT_DN: &str = "cn=Unprivileged Root,cn=Root DNs,cn=config";
pub const UNPRIVILEGED_USER_DN: &str = "cn=Unprivileged User,o=test";
pub const PRIVILEGED_USER_DN: &str = "cn=Privileged User,o=test";

pub fn seed_ldif() -> String {
    let revoke_all: String = Privilege::ALL
        .iter()
        .map(|p| format!("ds-privilege-name: -{}\n", p.name()))
        .collect();
    let grant_all: String = Privilege::ALL
        .iter()
        .map(|p| format!("ds-privilege-name: {}\n", p.name()))
        .collect();
    format!(
        "dn: o=test
objectClass: top
objectClass: organization
o: test

dn: {unprivileged_user}
objectClass: person
cn: Unprivileged User
sn: User
userPassword: password

dn: {privileged_user}
objectClass: person
cn: Privileged User
sn: User
userPassword: password
{grant_all}
dn: cn=config
objectClass: top
cn: config

dn: cn=Work Queue,cn=config
objectClass: ds-cfg-work-queue
cn: Work Queue

dn: cn=Root DNs,cn=config
objectClass: ds-cfg-root-dn
cn: Root DNs

dn: {root}
objectClass: person
objectClass: ds-cfg-root-dn-user
cn: Directory Manager
userPassword: password

dn: {unprivileged_root}
objectClass: person
objectClass: ds-cfg-root-dn-user
cn: Unprivileged Root
userPassword: password
{revoke_all}
dn: cn=schema
objectClass: top
objectClass: subschema
cn: schema
",
        unprivileged_user = UNPRIVILEGED_USER_DN,
        privileged_user = PRIVILEGED_USER_DN,
        root = ROOT_DN,
        unprivileged_root = UNPRIVILEGED_ROOT_DN,
        grant_all = grant_all,
        revoke_all = revoke_all,
    )
}

pub fn dn(s: &str) -> Dn {
    Dn::parse(s).unwrap()
}

pub fn engine_config() -> TaskEngineConfig {
    TaskEngineConfig {
        max_concurrent_tasks: 4,
        poll_interval_ms: 10,
        scheduling_timeout_ms: 10_000,
        completion_timeout_ms: 20_000,
        completed_task_retention_secs: 3_600,
    }
}

pub struct Harness {
    pub gate: OperationGate,
    pub store: InMemoryEntryStore,
    pub bus: EventBus,
    pub config: TaskEngineConfig,
}

impl Harness {
    /// Build the fixture and store the default root privileges on the root
    /// DNs entry, as a server does at startup.
    pub async fn start(schema_directory: Option<&Path>) -> Self {
        let store = InMemoryEntryStore::new();
        store.seed(parse_ldif(&seed_ldif()).unwrap());

        let layout = DirectoryLayout::default();
        let bus = EventBus::new(256);
        let config = engine_config();

        let mut runner = LdifTaskRunner::new(
            Arc::new(store.clone()),
            vec![("userRoot".to_string(), dn("o=test"))],
            layout.schema_dn.clone(),
        );
        if let Some(directory) = schema_directory {
            runner = runner.with_schema_directory(directory);
        }
        let engine = TaskEngine::start(Arc::new(runner), bus.clone(), &config);
        let gate = OperationGate::new(
            Arc::new(PrivilegeRegistry::with_full_defaults()),
            Arc::new(store.clone()),
            Arc::new(engine),
            bus.clone(),
            layout,
        );
        gate.sync_default_privileges().await.unwrap();
        Self {
            gate,
            store,
            bus,
            config,
        }
    }

    pub async fn anonymous(&self) -> IdentityContext {
        IdentityContext::anonymous()
    }

    pub async fn root(&self) -> IdentityContext {
        self.gate.bind(&dn(ROOT_DN), true).await.unwrap()
    }

    pub async fn unprivileged_root(&self) -> IdentityContext {
        self.gate.bind(&dn(UNPRIVILEGED_ROOT_DN), true).await.unwrap()
    }

    pub async fn unprivileged_user(&self) -> IdentityContext {
        self.gate.bind(&dn(UNPRIVILEGED_USER_DN), false).await.unwrap()
    }

    pub async fn privileged_user(&self) -> IdentityContext {
        self.gate.bind(&dn(PRIVILEGED_USER_DN), false).await.unwrap()
    }

    /// (name, identity, expected to hold every privilege)
    pub async fn cast(&self) -> Vec<(&'static str, IdentityContext, bool)> {
        vec![
            ("anonymous", self.anonymous().await, false),
            ("root", self.root().await, true),
            ("unprivileged root", self.unprivileged_root().await, false),
            ("unprivileged user", self.unprivileged_user().await, false),
            ("privileged user", self.privileged_user().await, true),
        ]
    }
}
