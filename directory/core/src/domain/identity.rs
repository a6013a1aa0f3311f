// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Identity Context
//!
//! Immutable snapshot of one authenticated session. An `IdentityContext` is
//! exactly one of:
//!
//! | Kind | Bound entry | Effective privileges |
//! |------|-------------|----------------------|
//! | `Anonymous` | none | always empty |
//! | `Regular` | yes | the entry's explicit grants |
//! | `Administrative` | yes | (defaults ∪ grants) − revocations |
//!
//! ## Snapshot Contract
//!
//! The bound entry and, for administrative identities, the administrative
//! default set are captured when the context is materialized. Later writes to
//! the entry or to the default configuration are observed only by a newly
//! materialized context. Privilege sets are still recomputed on every query
//! from those two snapshots (see [`super::privilege_registry`]).

use std::sync::Arc;

use super::dn::Dn;
use super::entry::Entry;
use super::privilege::{PrivilegeGrants, PrivilegeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityKind {
    Anonymous,
    Regular,
    Administrative,
}

/// One immutable version of the administrative default privilege set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdministrativeDefaults {
    pub privileges: PrivilegeSet,
    /// Incremented on every swap; useful for diagnosing stale contexts.
    pub generation: u64,
}

impl AdministrativeDefaults {
    pub fn new(privileges: PrivilegeSet) -> Self {
        Self {
            privileges,
            generation: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IdentityContext {
    kind: IdentityKind,
    entry: Option<Arc<Entry>>,
    grants: PrivilegeGrants,
    defaults: Option<Arc<AdministrativeDefaults>>,
}

impl IdentityContext {
    pub fn anonymous() -> Self {
        Self {
            kind: IdentityKind::Anonymous,
            entry: None,
            grants: PrivilegeGrants::default(),
            defaults: None,
        }
    }

    pub fn regular(entry: Entry) -> Self {
        let grants = entry.privilege_grants();
        Self {
            kind: IdentityKind::Regular,
            entry: Some(Arc::new(entry)),
            grants,
            defaults: None,
        }
    }

    pub fn administrative(entry: Entry, defaults: Arc<AdministrativeDefaults>) -> Self {
        let grants = entry.privilege_grants();
        Self {
            kind: IdentityKind::Administrative,
            entry: Some(Arc::new(entry)),
            grants,
            defaults: Some(defaults),
        }
    }

    pub fn kind(&self) -> IdentityKind {
        self.kind
    }

    pub fn is_anonymous(&self) -> bool {
        self.kind == IdentityKind::Anonymous
    }

    pub fn is_administrative(&self) -> bool {
        self.kind == IdentityKind::Administrative
    }

    pub fn entry(&self) -> Option<&Entry> {
        self.entry.as_deref()
    }

    pub fn dn(&self) -> Option<&Dn> {
        self.entry.as_ref().map(|e| &e.dn)
    }

    /// `true` when `dn` names the entry this identity is bound to.
    pub fn is_bound_to(&self, dn: &Dn) -> bool {
        self.dn().is_some_and(|own| own == dn)
    }

    pub fn grants(&self) -> &PrivilegeGrants {
        &self.grants
    }

    /// Administrative defaults pinned at materialization (administrative only).
    pub fn pinned_defaults(&self) -> Option<&AdministrativeDefaults> {
        self.defaults.as_deref()
    }

    /// Display form used in logs.
    pub fn describe(&self) -> String {
        match self.dn() {
            Some(dn) => dn.to_string(),
            None => "anonymous".to_string(),
        }
    }
}
