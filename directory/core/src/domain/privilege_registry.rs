// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Privilege Registry
//!
//! Pure evaluator computing an identity's effective privilege set, plus the
//! process-wide administrative default configuration it is evaluated against.
//!
//! ## Administrative Defaults
//!
//! The default set is held as an immutable [`AdministrativeDefaults`] value
//! behind an `Arc`. Writers build a new value and swap the pointer; readers
//! clone the pointer, so every reader sees one whole version and never a
//! half-applied update. The lock is only held for the pointer clone or swap.
//!
//! ## Evaluation
//!
//! - anonymous → ∅
//! - regular → explicit grants
//! - administrative → (pinned defaults ∪ grants) − revocations

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;

use super::entry::{Entry, Modification};
use super::identity::{AdministrativeDefaults, IdentityContext, IdentityKind};
use super::privilege::{Privilege, PrivilegeError, PrivilegeSet};

pub struct PrivilegeRegistry {
    defaults: RwLock<Arc<AdministrativeDefaults>>,
}

impl PrivilegeRegistry {
    pub fn new(default_privileges: PrivilegeSet) -> Self {
        Self {
            defaults: RwLock::new(Arc::new(AdministrativeDefaults::new(default_privileges))),
        }
    }

    /// Registry whose administrators hold every privilege by default.
    pub fn with_full_defaults() -> Self {
        Self::new(PrivilegeSet::all())
    }

    /// The current administrative default snapshot.
    pub fn current_defaults(&self) -> Arc<AdministrativeDefaults> {
        self.defaults.read().clone()
    }

    /// Build an identity for a bound entry, pinning the current defaults for
    /// administrative identities.
    pub fn materialize(&self, entry: Entry, administrative: bool) -> IdentityContext {
        if administrative {
            IdentityContext::administrative(entry, self.current_defaults())
        } else {
            IdentityContext::regular(entry)
        }
    }

    pub fn effective_privileges(&self, identity: &IdentityContext) -> PrivilegeSet {
        Self::evaluate(identity)
    }

    pub fn has_privilege(&self, identity: &IdentityContext, privilege: Privilege) -> bool {
        Self::evaluate(identity).contains(privilege)
    }

    /// Pure function of the identity's entry snapshot and pinned defaults.
    pub fn evaluate(identity: &IdentityContext) -> PrivilegeSet {
        match identity.kind() {
            IdentityKind::Anonymous => PrivilegeSet::empty(),
            IdentityKind::Regular => identity.grants().granted.clone(),
            IdentityKind::Administrative => {
                let mut effective = identity
                    .pinned_defaults()
                    .map(|d| d.privileges.clone())
                    .unwrap_or_default();
                effective.union_with(&identity.grants().granted);
                for revoked in identity.grants().revoked.iter() {
                    effective.remove(revoked);
                }
                effective
            }
        }
    }

    pub fn replace_defaults(&self, privileges: PrivilegeSet) -> Arc<AdministrativeDefaults> {
        self.swap(move |set| *set = privileges)
    }

    /// Check that every value in `modifications` names a known privilege.
    pub fn validate_default_modifications(modifications: &[Modification]) -> Result<(), PrivilegeError> {
        for modification in modifications {
            for value in &modification.values {
                value.parse::<Privilege>()?;
            }
        }
        Ok(())
    }

    fn swap<F>(&self, update: F) -> Arc<AdministrativeDefaults>
    where
        F: FnOnce(&mut PrivilegeSet),
    {
        let mut guard = self.defaults.write();
        let mut privileges = guard.privileges.clone();
        update(&mut privileges);
        let next = Arc::new(AdministrativeDefaults {
            privileges,
            generation: guard.generation + 1,
        });
        *guard = next.clone();
        drop(guard);
        info!(
            generation = next.generation,
            privileges = %next.privileges,
            "Administrative default privileges updated"
        );
        next
    }
}

impl Default for PrivilegeRegistry {
    fn default() -> Self {
        Self::with_full_defaults()
    }
}

impl IdentityContext {
    pub fn effective_privileges(&self, registry: &PrivilegeRegistry) -> PrivilegeSet {
        registry.effective_privileges(self)
    }

    pub fn has_privilege(&self, registry: &PrivilegeRegistry, privilege: Privilege) -> bool {
        registry.has_privilege(self, privilege)
    }
}
