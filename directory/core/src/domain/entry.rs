// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Directory entries and attribute modifications.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use super::dn::Dn;
use super::privilege::{PrivilegeGrants, PRIVILEGE_ATTRIBUTE};

pub const OBJECT_CLASS_ATTRIBUTE: &str = "objectclass";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EntryError {
    #[error("Attribute '{attribute}' already contains value '{value}'")]
    ValueExists { attribute: String, value: String },
    #[error("Attribute '{attribute}' has no value '{value}'")]
    NoSuchValue { attribute: String, value: String },
    #[error("Entry has no attribute '{0}'")]
    NoSuchAttribute(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModificationType {
    Add,
    Delete,
    Replace,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modification {
    pub kind: ModificationType,
    pub attribute: String,
    #[serde(default)]
    pub values: Vec<String>,
}

impl Modification {
    pub fn add(attribute: &str, values: &[&str]) -> Self {
        Self::new(ModificationType::Add, attribute, values)
    }

    pub fn delete(attribute: &str, values: &[&str]) -> Self {
        Self::new(ModificationType::Delete, attribute, values)
    }

    pub fn replace(attribute: &str, values: &[&str]) -> Self {
        Self::new(ModificationType::Replace, attribute, values)
    }

    fn new(kind: ModificationType, attribute: &str, values: &[&str]) -> Self {
        Self {
            kind,
            attribute: attribute.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    pub fn touches(&self, attribute: &str) -> bool {
        self.attribute.eq_ignore_ascii_case(attribute)
    }
}

/// A directory entry. Attribute names are stored lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub dn: Dn,
    attributes: BTreeMap<String, Vec<String>>,
}

impl Entry {
    pub fn new(dn: Dn) -> Self {
        Self {
            dn,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: &str, values: &[&str]) -> Self {
        for value in values {
            self.push_value(name, value);
        }
        self
    }

    /// Append a value without duplicate checking (used when decoding).
    pub fn push_value(&mut self, name: &str, value: &str) {
        let values = self.attributes.entry(name.to_ascii_lowercase()).or_default();
        if !values.iter().any(|v| v.eq_ignore_ascii_case(value)) {
            values.push(value.to_string());
        }
    }

    pub fn get(&self, name: &str) -> &[String] {
        self.attributes
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn first_value(&self, name: &str) -> Option<&str> {
        self.get(name).first().map(String::as_str)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        !self.get(name).is_empty()
    }

    pub fn has_value(&self, name: &str, value: &str) -> bool {
        self.get(name).iter().any(|v| v.eq_ignore_ascii_case(value))
    }

    pub fn has_object_class(&self, object_class: &str) -> bool {
        self.has_value(OBJECT_CLASS_ATTRIBUTE, object_class)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Grants and revocations carried by `ds-privilege-name`.
    pub fn privilege_grants(&self) -> PrivilegeGrants {
        PrivilegeGrants::from_values(self.get(PRIVILEGE_ATTRIBUTE).iter().map(String::as_str))
    }

    /// Apply modifications atomically: on error the entry is left untouched.
    pub fn apply_modifications(&mut self, modifications: &[Modification]) -> Result<(), EntryError> {
        let mut working = self.attributes.clone();
        for modification in modifications {
            apply_one(&mut working, modification)?;
        }
        self.attributes = working;
        Ok(())
    }
}

fn apply_one(attributes: &mut BTreeMap<String, Vec<String>>, modification: &Modification) -> Result<(), EntryError> {
    let name = modification.attribute.to_ascii_lowercase();
    match modification.kind {
        ModificationType::Add => {
            let values = attributes.entry(name.clone()).or_default();
            for value in &modification.values {
                if values.iter().any(|v| v.eq_ignore_ascii_case(value)) {
                    return Err(EntryError::ValueExists {
                        attribute: name,
                        value: value.clone(),
                    });
                }
                values.push(value.clone());
            }
        }
        ModificationType::Delete => {
            let values = attributes
                .get_mut(&name)
                .ok_or_else(|| EntryError::NoSuchAttribute(name.clone()))?;
            if modification.values.is_empty() {
                attributes.remove(&name);
                return Ok(());
            }
            for value in &modification.values {
                let position = values
                    .iter()
                    .position(|v| v.eq_ignore_ascii_case(value))
                    .ok_or_else(|| EntryError::NoSuchValue {
                        attribute: name.clone(),
                        value: value.clone(),
                    })?;
                values.remove(position);
            }
            if values.is_empty() {
                attributes.remove(&name);
            }
        }
        ModificationType::Replace => {
            if modification.values.is_empty() {
                attributes.remove(&name);
            } else {
                attributes.insert(name, modification.values.clone());
            }
        }
    }
    Ok(())
}
