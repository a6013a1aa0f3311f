// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Operation Gate
//!
//! Every inbound operation passes through [`OperationGate::check_and_run`]:
//!
//! ```text
//! RECEIVED ──▶ CHECKING ──▶ ADMITTED ──▶ EXECUTING ──▶ SUCCEEDED | FAILED
//!                  └──────▶ REJECTED
//! ```
//!
//! The privilege check always comes first. An identity lacking a required
//! privilege gets `INSUFFICIENT_ACCESS_RIGHTS` even when the operation would
//! fail for another reason afterwards, and nothing reaches the entry store or
//! the task engine. The status never says which privilege was missing.
//!
//! ## Required privileges
//!
//! | Operation | Condition | Privilege |
//! |-----------|-----------|-----------|
//! | Search, Compare | target in configuration subtree | `config-read` |
//! | Add, Delete, Modify, ModifyDN | target (or new parent) in configuration subtree | `config-write` |
//! | Modify of a password attribute, password modify extended request | target is not the requester | `password-reset` |
//! | any write of the schema subentry | target (or new parent) in schema subtree | `update-schema` |
//! | Add of a task entry | by task object class | `backend-backup`, `backend-restore`, `update-schema`, `ldif-export`, `ldif-import` |
//! | Delete of a task entry | by task kind | as above |
//! | Add or Modify carrying `ds-privilege-name` | | `privilege-change` |
//! | any operation with a proxied authorization control | | `proxied-auth` in addition |

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::application::task_engine::TaskEngine;
use crate::domain::dn::Dn;
use crate::domain::entry::{Entry, Modification};
use crate::domain::events::AuthorizationEvent;
use crate::domain::identity::IdentityContext;
use crate::domain::operation::{is_password_attribute, ExtendedRequest, Operation, OperationRequest};
use crate::domain::privilege::{Privilege, PrivilegeSet, DEFAULT_ROOT_PRIVILEGE_ATTRIBUTE, PRIVILEGE_ATTRIBUTE};
use crate::domain::privilege_registry::PrivilegeRegistry;
use crate::domain::repository::{EntryStore, EntryStoreError};
use crate::domain::result::ResultCode;
use crate::domain::server_config::DirectoryLayout;
use crate::domain::task::{Task, TaskId, TaskKind, TASK_ID_ATTRIBUTE};
use crate::infrastructure::event_bus::EventBus;

const USER_PASSWORD_ATTRIBUTE: &str = "userPassword";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationPhase {
    Received,
    Checking,
    Admitted,
    Executing,
    Succeeded,
    Failed,
    Rejected,
}

/// Proof that the gate admitted an operation, carrying the privilege set it
/// was admitted against. Only the gate can issue one.
#[derive(Debug, Clone)]
pub struct AdmissionTicket {
    admitted: PrivilegeSet,
}

impl AdmissionTicket {
    pub(crate) fn new(admitted: PrivilegeSet) -> Self {
        Self { admitted }
    }

    pub fn admitted(&self) -> &PrivilegeSet {
        &self.admitted
    }

    pub fn covers(&self, privilege: Privilege) -> bool {
        self.admitted.contains(privilege)
    }
}

#[derive(Debug, Clone)]
pub struct OperationOutcome {
    pub result_code: ResultCode,
    /// Terminal phase: `Succeeded`, `Failed` or `Rejected`
    pub phase: OperationPhase,
    /// Search results
    pub entries: Vec<Entry>,
    /// Task registered by a task-creating Add
    pub task_id: Option<TaskId>,
    /// Extended operation response value or diagnostic message
    pub response: Option<String>,
}

impl OperationOutcome {
    fn rejected() -> Self {
        Self {
            result_code: ResultCode::InsufficientAccessRights,
            phase: OperationPhase::Rejected,
            entries: Vec::new(),
            task_id: None,
            response: None,
        }
    }

    fn status(result_code: ResultCode) -> Self {
        Self {
            result_code,
            phase: OperationPhase::Executing,
            entries: Vec::new(),
            task_id: None,
            response: None,
        }
    }

    fn with_response(mut self, response: impl Into<String>) -> Self {
        self.response = Some(response.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.phase == OperationPhase::Succeeded
    }
}

impl From<EntryStoreError> for OperationOutcome {
    fn from(e: EntryStoreError) -> Self {
        OperationOutcome::status(e.result_code()).with_response(e.to_string())
    }
}

/// The privileges an identity must hold for `request`.
///
/// `existing_task` is the task addressed by a Delete of a task entry, if any.
/// Pure: reads nothing but its arguments.
pub fn required_privileges(
    request: &OperationRequest,
    identity: &IdentityContext,
    layout: &DirectoryLayout,
    existing_task: Option<&TaskKind>,
) -> PrivilegeSet {
    let mut required = PrivilegeSet::empty();
    let in_config = |dn: &Dn| layout.is_configuration(dn);
    let in_schema = |dn: &Dn| layout.is_schema(dn);

    match &request.operation {
        Operation::Search { base: dn, .. } | Operation::Compare { dn, .. } => {
            if in_config(dn) {
                required.insert(Privilege::ConfigRead);
            }
        }
        Operation::Add { entry } => {
            if in_config(&entry.dn) {
                required.insert(Privilege::ConfigWrite);
            }
            if in_schema(&entry.dn) {
                required.insert(Privilege::UpdateSchema);
            }
            // task arguments are only checked after admission
            if layout.is_task_entry(&entry.dn) {
                if let Some(privilege) = TaskKind::privilege_for_entry(entry) {
                    required.insert(privilege);
                }
            }
            if entry.has_attribute(PRIVILEGE_ATTRIBUTE) {
                required.insert(Privilege::PrivilegeChange);
            }
        }
        Operation::Delete { dn } => {
            if in_config(dn) {
                required.insert(Privilege::ConfigWrite);
            }
            if in_schema(dn) {
                required.insert(Privilege::UpdateSchema);
            }
            if let Some(kind) = existing_task {
                required.insert(kind.required_privilege());
            }
        }
        Operation::Modify { dn, modifications } => {
            if in_config(dn) {
                required.insert(Privilege::ConfigWrite);
            }
            if in_schema(dn) {
                required.insert(Privilege::UpdateSchema);
            }
            if !identity.is_bound_to(dn) && modifications.iter().any(|m| is_password_attribute(&m.attribute)) {
                required.insert(Privilege::PasswordReset);
            }
            if modifications.iter().any(|m| m.touches(PRIVILEGE_ATTRIBUTE)) {
                required.insert(Privilege::PrivilegeChange);
            }
        }
        Operation::ModifyDn { dn, new_superior, .. } => {
            if in_config(dn) || new_superior.as_ref().is_some_and(in_config) {
                required.insert(Privilege::ConfigWrite);
            }
            if in_schema(dn) || new_superior.as_ref().is_some_and(in_schema) {
                required.insert(Privilege::UpdateSchema);
            }
        }
        Operation::Extended(ExtendedRequest::PasswordModify { user_identity, .. }) => {
            if user_identity.as_ref().is_some_and(|target| !identity.is_bound_to(target)) {
                required.insert(Privilege::PasswordReset);
            }
        }
        Operation::Extended(ExtendedRequest::WhoAmI) => {}
    }

    // applies whenever the control is present, even when it names the requester
    if request.has_proxied_authorization() {
        required.insert(Privilege::ProxiedAuth);
    }
    required
}

pub struct OperationGate {
    registry: Arc<PrivilegeRegistry>,
    store: Arc<dyn EntryStore>,
    engine: Arc<TaskEngine>,
    event_bus: EventBus,
    layout: DirectoryLayout,
    /// Held across the stored default privilege write and the registry swap.
    defaults_write: Mutex<()>,
}

impl OperationGate {
    pub fn new(
        registry: Arc<PrivilegeRegistry>,
        store: Arc<dyn EntryStore>,
        engine: Arc<TaskEngine>,
        event_bus: EventBus,
        layout: DirectoryLayout,
    ) -> Self {
        Self {
            registry,
            store,
            engine,
            event_bus,
            layout,
            defaults_write: Mutex::new(()),
        }
    }

    pub fn registry(&self) -> &Arc<PrivilegeRegistry> {
        &self.registry
    }

    pub fn engine(&self) -> &Arc<TaskEngine> {
        &self.engine
    }

    pub fn layout(&self) -> &DirectoryLayout {
        &self.layout
    }

    /// Reconcile the administrative defaults with the root DNs entry.
    ///
    /// Values already stored on the entry win. Otherwise the registry's set is
    /// written to the entry so that later modifications of the attribute start
    /// from what administrators actually hold. Run once at startup.
    pub async fn sync_default_privileges(&self) -> Result<PrivilegeSet, EntryStoreError> {
        let _guard = self.defaults_write.lock().await;
        let dn = &self.layout.root_dns_base;
        let Some(entry) = self.store.get(dn).await? else {
            debug!(dn = %dn, "No root DNs entry, keeping configured default privileges");
            return Ok(self.registry.current_defaults().privileges.clone());
        };

        let stored = entry.get(DEFAULT_ROOT_PRIVILEGE_ATTRIBUTE);
        if !stored.is_empty() {
            let mut defaults = PrivilegeSet::empty();
            for name in stored {
                match name.parse::<Privilege>() {
                    Ok(privilege) => {
                        defaults.insert(privilege);
                    }
                    Err(e) => warn!(dn = %dn, "Ignoring stored default privilege: {}", e),
                }
            }
            self.registry.replace_defaults(defaults.clone());
            return Ok(defaults);
        }

        let defaults = self.registry.current_defaults().privileges.clone();
        if !defaults.is_empty() {
            self.store
                .modify(dn, &[Modification::replace(DEFAULT_ROOT_PRIVILEGE_ATTRIBUTE, &defaults.names())])
                .await?;
            debug!(dn = %dn, privileges = %defaults, "Stored configured default privileges");
        }
        Ok(defaults)
    }

    /// Materialize an identity from the current content of its entry.
    pub async fn bind(&self, dn: &Dn, administrative: bool) -> Result<IdentityContext, EntryStoreError> {
        let entry = self
            .store
            .get(dn)
            .await?
            .ok_or_else(|| EntryStoreError::NoSuchObject(dn.clone()))?;
        Ok(self.registry.materialize(entry, administrative))
    }

    /// Check `request` against the identity's privileges and, if admitted,
    /// run it.
    pub async fn check_and_run(&self, request: OperationRequest, identity: &IdentityContext) -> OperationOutcome {
        let operation = request.operation.kind();
        let target = request.operation.target().map(|dn| dn.to_string());
        let who = identity.describe();
        debug!(operation = %operation, target = ?target, identity = %who, phase = ?OperationPhase::Received, "Operation received");

        // 1. Check
        debug!(operation = %operation, phase = ?OperationPhase::Checking, "Checking privileges");
        let existing_task = match &request.operation {
            Operation::Delete { dn } if self.layout.is_task_entry(dn) => self.engine.find_by_entry(dn),
            _ => None,
        };
        let required = required_privileges(&request, identity, &self.layout, existing_task.as_ref().map(Task::kind));
        let effective = self.registry.effective_privileges(identity);
        let missing = required.missing_from(&effective);
        if !missing.is_empty() {
            info!(
                operation = %operation,
                target = ?target,
                identity = %who,
                missing = %missing,
                result_code = %ResultCode::InsufficientAccessRights,
                "Operation rejected"
            );
            self.event_bus
                .publish_authorization_event(AuthorizationEvent::OperationRejected {
                    operation,
                    target,
                    identity: who,
                    result_code: ResultCode::InsufficientAccessRights,
                    rejected_at: Utc::now(),
                });
            return OperationOutcome::rejected();
        }

        // 2. Admit
        debug!(operation = %operation, target = ?target, identity = %who, required = %required, phase = ?OperationPhase::Admitted, "Operation admitted");
        self.event_bus
            .publish_authorization_event(AuthorizationEvent::OperationAdmitted {
                operation,
                target: target.clone(),
                identity: who.clone(),
                admitted_at: Utc::now(),
            });
        let ticket = AdmissionTicket::new(required);

        // 3. Execute
        debug!(operation = %operation, phase = ?OperationPhase::Executing, "Executing operation");
        let mut outcome = self.execute(request.operation, identity, &ticket, existing_task).await;
        outcome.phase = if matches!(
            outcome.result_code,
            ResultCode::Success | ResultCode::CompareTrue | ResultCode::CompareFalse
        ) {
            OperationPhase::Succeeded
        } else {
            OperationPhase::Failed
        };
        debug!(
            operation = %operation,
            target = ?target,
            identity = %who,
            result_code = %outcome.result_code,
            phase = ?outcome.phase,
            "Operation finished"
        );
        outcome
    }

    async fn execute(
        &self,
        operation: Operation,
        identity: &IdentityContext,
        ticket: &AdmissionTicket,
        existing_task: Option<Task>,
    ) -> OperationOutcome {
        match operation {
            Operation::Add { entry } if self.layout.is_task_entry(&entry.dn) => {
                self.create_task(entry, identity, ticket)
            }
            Operation::Add { entry } => match self.store.add(entry).await {
                Ok(()) => OperationOutcome::status(ResultCode::Success),
                Err(e) => e.into(),
            },
            Operation::Delete { dn } if self.layout.is_task_entry(&dn) => {
                let Some(task) = existing_task else {
                    return OperationOutcome::status(ResultCode::NoSuchObject);
                };
                match self.engine.cancel(task.id()) {
                    Ok(_) => OperationOutcome::status(ResultCode::Success),
                    Err(e) => OperationOutcome::status(e.result_code()).with_response(e.to_string()),
                }
            }
            Operation::Delete { dn } => match self.store.delete(&dn).await {
                Ok(()) => OperationOutcome::status(ResultCode::Success),
                Err(e) => e.into(),
            },
            Operation::Modify { dn, modifications } => self.modify(&dn, &modifications).await,
            Operation::ModifyDn {
                dn,
                new_rdn,
                delete_old_rdn,
                new_superior,
            } => {
                let touches_config = self.layout.is_configuration(&dn)
                    || new_superior.as_ref().is_some_and(|s| self.layout.is_configuration(s));
                if touches_config {
                    return OperationOutcome::status(ResultCode::UnwillingToPerform)
                        .with_response("Configuration entries cannot be renamed");
                }
                match self
                    .store
                    .rename(&dn, &new_rdn, delete_old_rdn, new_superior.as_ref())
                    .await
                {
                    Ok(_) => OperationOutcome::status(ResultCode::Success),
                    Err(e) => e.into(),
                }
            }
            Operation::Compare { dn, attribute, value } => match self.store.get(&dn).await {
                Ok(Some(entry)) if entry.has_value(&attribute, &value) => {
                    OperationOutcome::status(ResultCode::CompareTrue)
                }
                Ok(Some(_)) => OperationOutcome::status(ResultCode::CompareFalse),
                Ok(None) => OperationOutcome::status(ResultCode::NoSuchObject),
                Err(e) => e.into(),
            },
            Operation::Search { base, scope } => match self.store.search(&base, scope).await {
                Ok(entries) => OperationOutcome {
                    entries,
                    ..OperationOutcome::status(ResultCode::Success)
                },
                Err(e) => e.into(),
            },
            Operation::Extended(ExtendedRequest::PasswordModify {
                user_identity,
                new_password,
            }) => {
                let Some(target) = user_identity.or_else(|| identity.dn().cloned()) else {
                    return OperationOutcome::status(ResultCode::UnwillingToPerform)
                        .with_response("Anonymous clients cannot change their own password");
                };
                let change = [Modification::replace(USER_PASSWORD_ATTRIBUTE, &[new_password.as_str()])];
                match self.store.modify(&target, &change).await {
                    Ok(_) => OperationOutcome::status(ResultCode::Success),
                    Err(e) => e.into(),
                }
            }
            Operation::Extended(ExtendedRequest::WhoAmI) => {
                let authz_id = identity.dn().map(|dn| format!("dn:{}", dn)).unwrap_or_default();
                OperationOutcome::status(ResultCode::Success).with_response(authz_id)
            }
        }
    }

    fn create_task(&self, entry: Entry, identity: &IdentityContext, ticket: &AdmissionTicket) -> OperationOutcome {
        let kind = match TaskKind::from_entry(&entry) {
            Ok(kind) => kind,
            Err(e) => {
                warn!(target = %entry.dn, "Rejected task entry: {}", e);
                return OperationOutcome::status(ResultCode::UnwillingToPerform).with_response(e.to_string());
            }
        };
        let task_id = match entry.dn.rdn() {
            Some(rdn) if rdn.attribute() == TASK_ID_ATTRIBUTE => TaskId(rdn.value().to_string()),
            _ => TaskId::new(),
        };
        let task = Task::new(task_id, entry.dn, kind, identity.dn().cloned());
        match self.engine.submit(ticket, task) {
            Ok(task_id) => OperationOutcome {
                task_id: Some(task_id),
                ..OperationOutcome::status(ResultCode::Success)
            },
            Err(e) => OperationOutcome::status(e.result_code()).with_response(e.to_string()),
        }
    }

    async fn modify(&self, dn: &Dn, modifications: &[Modification]) -> OperationOutcome {
        let changes_defaults = *dn == self.layout.root_dns_base
            && modifications.iter().any(|m| m.touches(DEFAULT_ROOT_PRIVILEGE_ATTRIBUTE));
        if !changes_defaults {
            return match self.store.modify(dn, modifications).await {
                Ok(_) => OperationOutcome::status(ResultCode::Success),
                Err(e) => e.into(),
            };
        }

        let default_changes: Vec<Modification> = modifications
            .iter()
            .filter(|m| m.touches(DEFAULT_ROOT_PRIVILEGE_ATTRIBUTE))
            .cloned()
            .collect();
        if let Err(e) = PrivilegeRegistry::validate_default_modifications(&default_changes) {
            return OperationOutcome::status(ResultCode::UnwillingToPerform).with_response(e.to_string());
        }

        // the stored attribute and the registry change together
        let _guard = self.defaults_write.lock().await;
        let updated = match self.store.modify(dn, modifications).await {
            Ok(updated) => updated,
            Err(e) => return e.into(),
        };
        let defaults: PrivilegeSet = updated
            .get(DEFAULT_ROOT_PRIVILEGE_ATTRIBUTE)
            .iter()
            .filter_map(|name| name.parse::<Privilege>().ok())
            .collect();
        self.registry.replace_defaults(defaults);
        OperationOutcome::status(ResultCode::Success)
    }
}
