// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Privilege Value Objects
//!
//! A [`Privilege`] is a coarse-grained capability gating a whole class of
//! directory operations. The catalogue is closed and fixed at process start.
//!
//! | Privilege | Gates |
//! |-----------|-------|
//! | `config-read` | Search / Compare inside the configuration subtree |
//! | `config-write` | Add / Delete / Modify / ModifyDN inside the configuration subtree |
//! | `password-reset` | Resetting another identity's credential |
//! | `update-schema` | Schema subentry writes, schema-file-add tasks |
//! | `ldif-import` / `ldif-export` | Import / export tasks |
//! | `backend-backup` / `backend-restore` | Backup / restore tasks |
//! | `proxied-auth` | Any operation carrying a proxied-authorization control |
//! | `privilege-change` | Writing the privilege attribute of an entry |
//!
//! ## Grant Encoding
//!
//! Entries carry grants in the multi-valued `ds-privilege-name` attribute.
//! A value prefixed with `-` is a revocation ([`PrivilegeGrant::Revoke`]).

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Attribute listing per-entry grants and revocations.
pub const PRIVILEGE_ATTRIBUTE: &str = "ds-privilege-name";

/// Configuration attribute listing the administrative default privileges.
pub const DEFAULT_ROOT_PRIVILEGE_ATTRIBUTE: &str = "ds-cfg-default-root-privilege-name";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PrivilegeError {
    #[error("Unknown privilege name: '{0}'")]
    UnknownPrivilege(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Privilege {
    ConfigRead,
    ConfigWrite,
    PasswordReset,
    UpdateSchema,
    LdifImport,
    LdifExport,
    BackendBackup,
    BackendRestore,
    ProxiedAuth,
    PrivilegeChange,
}

impl Privilege {
    pub const ALL: [Privilege; 10] = [
        Privilege::ConfigRead,
        Privilege::ConfigWrite,
        Privilege::PasswordReset,
        Privilege::UpdateSchema,
        Privilege::LdifImport,
        Privilege::LdifExport,
        Privilege::BackendBackup,
        Privilege::BackendRestore,
        Privilege::ProxiedAuth,
        Privilege::PrivilegeChange,
    ];

    /// Canonical attribute-value name of the privilege.
    pub fn name(&self) -> &'static str {
        match self {
            Privilege::ConfigRead => "config-read",
            Privilege::ConfigWrite => "config-write",
            Privilege::PasswordReset => "password-reset",
            Privilege::UpdateSchema => "update-schema",
            Privilege::LdifImport => "ldif-import",
            Privilege::LdifExport => "ldif-export",
            Privilege::BackendBackup => "backend-backup",
            Privilege::BackendRestore => "backend-restore",
            Privilege::ProxiedAuth => "proxied-auth",
            Privilege::PrivilegeChange => "privilege-change",
        }
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Privilege {
    type Err = PrivilegeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Privilege::ALL
            .iter()
            .copied()
            .find(|p| p.name() == normalized)
            .ok_or_else(|| PrivilegeError::UnknownPrivilege(s.to_string()))
    }
}

/// One decoded `ds-privilege-name` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivilegeGrant {
    Grant(Privilege),
    Revoke(Privilege),
}

impl PrivilegeGrant {
    pub fn parse(value: &str) -> Result<Self, PrivilegeError> {
        let value = value.trim();
        match value.strip_prefix('-') {
            Some(name) => Ok(PrivilegeGrant::Revoke(name.parse()?)),
            None => Ok(PrivilegeGrant::Grant(value.parse()?)),
        }
    }
}

/// Ordered set of privileges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrivilegeSet(BTreeSet<Privilege>);

impl PrivilegeSet {
    pub fn empty() -> Self {
        Self(BTreeSet::new())
    }

    pub fn all() -> Self {
        Privilege::ALL.iter().copied().collect()
    }

    pub fn insert(&mut self, privilege: Privilege) -> bool {
        self.0.insert(privilege)
    }

    pub fn remove(&mut self, privilege: Privilege) -> bool {
        self.0.remove(&privilege)
    }

    pub fn contains(&self, privilege: Privilege) -> bool {
        self.0.contains(&privilege)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_superset(&self, other: &PrivilegeSet) -> bool {
        self.0.is_superset(&other.0)
    }

    /// Privileges in `self` that `held` does not contain.
    pub fn missing_from(&self, held: &PrivilegeSet) -> PrivilegeSet {
        self.0.difference(&held.0).copied().collect()
    }

    pub fn union_with(&mut self, other: &PrivilegeSet) {
        self.0.extend(other.0.iter().copied());
    }

    pub fn iter(&self) -> impl Iterator<Item = Privilege> + '_ {
        self.0.iter().copied()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.0.iter().map(|p| p.name()).collect()
    }
}

impl FromIterator<Privilege> for PrivilegeSet {
    fn from_iter<I: IntoIterator<Item = Privilege>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for PrivilegeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.names().join(", "))
    }
}

/// Explicit grants and revocations decoded from one entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrivilegeGrants {
    pub granted: PrivilegeSet,
    pub revoked: PrivilegeSet,
}

impl PrivilegeGrants {
    /// Decode attribute values, skipping names outside the catalogue.
    pub fn from_values<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut grants = Self::default();
        for value in values {
            match PrivilegeGrant::parse(value) {
                Ok(PrivilegeGrant::Grant(p)) => {
                    grants.granted.insert(p);
                }
                Ok(PrivilegeGrant::Revoke(p)) => {
                    grants.revoked.insert(p);
                }
                Err(e) => {
                    tracing::warn!(value = %value, error = %e, "Ignoring unrecognized privilege value");
                }
            }
        }
        grants
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privilege_names_round_trip() {
        for p in Privilege::ALL {
            assert_eq!(p.name().parse::<Privilege>().unwrap(), p);
        }
        assert_eq!("Config-Read".parse::<Privilege>().unwrap(), Privilege::ConfigRead);
        assert!(matches!(
            "bypass-everything".parse::<Privilege>(),
            Err(PrivilegeError::UnknownPrivilege(_))
        ));
    }

    #[test]
    fn test_negation_prefix_is_revocation() {
        assert_eq!(
            PrivilegeGrant::parse("-backend-backup").unwrap(),
            PrivilegeGrant::Revoke(Privilege::BackendBackup)
        );
        assert_eq!(
            PrivilegeGrant::parse("backend-backup").unwrap(),
            PrivilegeGrant::Grant(Privilege::BackendBackup)
        );
    }

    #[test]
    fn test_grants_ignore_unknown_values() {
        let grants = PrivilegeGrants::from_values(["config-read", "-ldif-export", "no-such-thing"]);
        assert!(grants.granted.contains(Privilege::ConfigRead));
        assert!(grants.revoked.contains(Privilege::LdifExport));
        assert_eq!(grants.granted.len(), 1);
        assert_eq!(grants.revoked.len(), 1);
    }

    #[test]
    fn test_missing_from() {
        let required: PrivilegeSet = [Privilege::ConfigWrite, Privilege::ProxiedAuth].into_iter().collect();
        let held: PrivilegeSet = [Privilege::ConfigWrite].into_iter().collect();
        let missing = required.missing_from(&held);
        assert_eq!(missing.names(), vec!["proxied-auth"]);
        assert!(!held.is_superset(&required));
    }
}
