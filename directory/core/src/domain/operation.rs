// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Inbound directory operations
//!
//! A closed set of operation variants. Each carries its target location and,
//! for writes, enough payload to classify the special cases the gate cares
//! about (credential resets, schema writes, task entries, privilege writes).

use serde::{Deserialize, Serialize};
use std::fmt;

use super::dn::Dn;
use super::entry::{Entry, Modification};

/// Attributes that hold a user credential.
pub const PASSWORD_ATTRIBUTES: [&str; 2] = ["userpassword", "authpassword"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchScope {
    Base,
    OneLevel,
    Subtree,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum ExtendedRequest {
    /// Password modify. `user_identity` of `None` targets the requester.
    PasswordModify {
        user_identity: Option<Dn>,
        new_password: String,
    },
    WhoAmI,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "control", rename_all = "snake_case")]
pub enum RequestControl {
    ProxiedAuthorization { authorization_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Operation {
    Add {
        entry: Entry,
    },
    Delete {
        dn: Dn,
    },
    Modify {
        dn: Dn,
        modifications: Vec<Modification>,
    },
    ModifyDn {
        dn: Dn,
        new_rdn: String,
        #[serde(default)]
        delete_old_rdn: bool,
        #[serde(default)]
        new_superior: Option<Dn>,
    },
    Compare {
        dn: Dn,
        attribute: String,
        value: String,
    },
    Search {
        base: Dn,
        scope: SearchScope,
    },
    Extended(ExtendedRequest),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Add,
    Delete,
    Modify,
    ModifyDn,
    Compare,
    Search,
    Extended,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Add => "add",
            OperationKind::Delete => "delete",
            OperationKind::Modify => "modify",
            OperationKind::ModifyDn => "modify_dn",
            OperationKind::Compare => "compare",
            OperationKind::Search => "search",
            OperationKind::Extended => "extended",
        };
        f.write_str(name)
    }
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Add { .. } => OperationKind::Add,
            Operation::Delete { .. } => OperationKind::Delete,
            Operation::Modify { .. } => OperationKind::Modify,
            Operation::ModifyDn { .. } => OperationKind::ModifyDn,
            Operation::Compare { .. } => OperationKind::Compare,
            Operation::Search { .. } => OperationKind::Search,
            Operation::Extended(_) => OperationKind::Extended,
        }
    }

    /// The entry the operation addresses, if it addresses one.
    pub fn target(&self) -> Option<&Dn> {
        match self {
            Operation::Add { entry } => Some(&entry.dn),
            Operation::Delete { dn }
            | Operation::Modify { dn, .. }
            | Operation::ModifyDn { dn, .. }
            | Operation::Compare { dn, .. } => Some(dn),
            Operation::Search { base, .. } => Some(base),
            Operation::Extended(ExtendedRequest::PasswordModify { user_identity, .. }) => user_identity.as_ref(),
            Operation::Extended(ExtendedRequest::WhoAmI) => None,
        }
    }
}

/// An operation plus the request controls attached to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRequest {
    pub operation: Operation,
    #[serde(default)]
    pub controls: Vec<RequestControl>,
}

impl OperationRequest {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            controls: Vec::new(),
        }
    }

    pub fn with_control(mut self, control: RequestControl) -> Self {
        self.controls.push(control);
        self
    }

    pub fn has_proxied_authorization(&self) -> bool {
        self.controls
            .iter()
            .any(|c| matches!(c, RequestControl::ProxiedAuthorization { .. }))
    }
}

impl From<Operation> for OperationRequest {
    fn from(operation: Operation) -> Self {
        Self::new(operation)
    }
}

pub fn is_password_attribute(attribute: &str) -> bool {
    PASSWORD_ATTRIBUTES
        .iter()
        .any(|a| a.eq_ignore_ascii_case(attribute))
}
