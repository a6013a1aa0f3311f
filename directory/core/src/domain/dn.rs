// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Distinguished names
//!
//! Locations in the directory tree. Comparison is case-insensitive on both the
//! attribute type and the value, with surrounding whitespace ignored, so that
//! `CN=Config` and `cn=config` name the same entry.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DnError {
    #[error("Malformed RDN '{rdn}' in DN '{dn}'")]
    MalformedRdn { dn: String, rdn: String },
    #[error("Dangling escape at end of DN '{0}'")]
    DanglingEscape(String),
}

#[derive(Debug, Clone)]
pub struct Rdn {
    attribute: String,
    value: String,
    normalized_value: String,
}

impl Rdn {
    pub fn new(attribute: &str, value: &str) -> Self {
        Self {
            attribute: attribute.trim().to_ascii_lowercase(),
            value: value.trim().to_string(),
            normalized_value: value.trim().to_lowercase(),
        }
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Parse a single `attr=value` component.
    pub fn parse(input: &str) -> Result<Self, DnError> {
        let dn = Dn::parse(input)?;
        match dn.rdns.as_slice() {
            [rdn] => Ok(rdn.clone()),
            _ => Err(DnError::MalformedRdn {
                dn: input.to_string(),
                rdn: input.to_string(),
            }),
        }
    }
}

impl PartialEq for Rdn {
    fn eq(&self, other: &Self) -> bool {
        self.attribute == other.attribute && self.normalized_value == other.normalized_value
    }
}

impl Eq for Rdn {}

impl fmt::Display for Rdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=", self.attribute)?;
        for c in self.value.chars() {
            if matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=') {
                write!(f, "\\")?;
            }
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

/// A parsed DN, leaf RDN first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Dn {
    rdns: Vec<Rdn>,
}

impl Dn {
    /// The root DSE (zero RDNs).
    pub fn root() -> Self {
        Self { rdns: Vec::new() }
    }

    pub fn parse(input: &str) -> Result<Self, DnError> {
        let mut rdns = Vec::new();
        for raw in split_unescaped(input)? {
            let raw_trimmed = raw.trim();
            if raw_trimmed.is_empty() && rdns.is_empty() && input.trim().is_empty() {
                break;
            }
            let (attribute, value) = raw_trimmed.split_once('=').ok_or_else(|| DnError::MalformedRdn {
                dn: input.to_string(),
                rdn: raw_trimmed.to_string(),
            })?;
            if attribute.trim().is_empty() || value.trim().is_empty() {
                return Err(DnError::MalformedRdn {
                    dn: input.to_string(),
                    rdn: raw_trimmed.to_string(),
                });
            }
            rdns.push(Rdn::new(attribute, &unescape(value)));
        }
        Ok(Self { rdns })
    }

    pub fn is_root(&self) -> bool {
        self.rdns.is_empty()
    }

    pub fn rdn(&self) -> Option<&Rdn> {
        self.rdns.first()
    }

    pub fn depth(&self) -> usize {
        self.rdns.len()
    }

    pub fn parent(&self) -> Option<Dn> {
        if self.rdns.is_empty() {
            return None;
        }
        Some(Dn {
            rdns: self.rdns[1..].to_vec(),
        })
    }

    pub fn child(&self, attribute: &str, value: &str) -> Dn {
        let mut rdns = Vec::with_capacity(self.rdns.len() + 1);
        rdns.push(Rdn::new(attribute, value));
        rdns.extend(self.rdns.iter().cloned());
        Dn { rdns }
    }

    /// `true` when `self` is `base` or sits below it.
    pub fn is_within(&self, base: &Dn) -> bool {
        self.rdns.len() >= base.rdns.len() && self.ends_with(base)
    }

    /// `true` when `self` is an immediate child of `parent`.
    pub fn is_child_of(&self, parent: &Dn) -> bool {
        self.rdns.len() == parent.rdns.len() + 1 && self.ends_with(parent)
    }

    /// The DN produced by replacing the leaf RDN and, optionally, the parent.
    pub fn renamed(&self, new_rdn: Rdn, new_parent: Option<&Dn>) -> Dn {
        let mut rdns = vec![new_rdn];
        match new_parent {
            Some(parent) => rdns.extend(parent.rdns.iter().cloned()),
            None => rdns.extend(self.rdns.iter().skip(1).cloned()),
        }
        Dn { rdns }
    }

    fn ends_with(&self, suffix: &Dn) -> bool {
        let offset = self.rdns.len() - suffix.rdns.len();
        self.rdns[offset..] == suffix.rdns[..]
    }

    fn normalized(&self) -> String {
        self.rdns
            .iter()
            .map(|r| format!("{}={}", r.attribute, r.normalized_value))
            .collect::<Vec<_>>()
            .join(",")
    }
}

fn split_unescaped(input: &str) -> Result<Vec<String>, DnError> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let next = chars.next().ok_or_else(|| DnError::DanglingEscape(input.to_string()))?;
                current.push('\\');
                current.push(next);
            }
            ',' | ';' => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() || !parts.is_empty() {
        parts.push(current);
    }
    Ok(parts)
}

/// Resolve `\c` and `\XX` (hex-encoded UTF-8 byte) escapes.
fn unescape(value: &str) -> String {
    let mut bytes = Vec::with_capacity(value.len());
    let mut chars = value.trim().chars().peekable();
    let mut buf = [0u8; 4];
    while let Some(c) = chars.next() {
        let literal = if c == '\\' {
            let Some(next) = chars.next() else { break };
            match (next.to_digit(16), chars.peek().and_then(|low| low.to_digit(16))) {
                (Some(high), Some(low)) => {
                    chars.next();
                    bytes.push((high * 16 + low) as u8);
                    continue;
                }
                _ => next,
            }
        } else {
            c
        };
        bytes.extend_from_slice(literal.encode_utf8(&mut buf).as_bytes());
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

impl PartialEq for Dn {
    fn eq(&self, other: &Self) -> bool {
        self.rdns == other.rdns
    }
}

impl Eq for Dn {}

impl Hash for Dn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized().hash(state);
    }
}

impl PartialOrd for Dn {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Dn {
    /// Parents sort before their children.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        let key = |dn: &Dn| -> Vec<String> {
            dn.rdns
                .iter()
                .rev()
                .map(|r| format!("{}={}", r.attribute, r.normalized_value))
                .collect()
        };
        key(self).cmp(&key(other))
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, rdn) in self.rdns.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", rdn)?;
        }
        Ok(())
    }
}

impl FromStr for Dn {
    type Err = DnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dn::parse(s)
    }
}

impl TryFrom<String> for Dn {
    type Error = DnError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Dn::parse(&value)
    }
}

impl From<Dn> for String {
    fn from(dn: Dn) -> Self {
        dn.to_string()
    }
}
