// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! LDIF content records
//!
//! Reader and writer for the content form of LDIF (RFC 2849): records are
//! separated by blank lines, each starts with `dn:`, long lines are folded
//! with a single leading space and `::` marks a base64 value. Change records
//! and `:<` URL values are rejected.
//!
//! Used by the backup, restore, import and export tasks and by the CLI for
//! seeding entries.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;

use crate::domain::dn::{Dn, DnError};
use crate::domain::entry::Entry;

const FOLD_WIDTH: usize = 76;

#[derive(Debug, Error)]
pub enum LdifError {
    #[error("line {line}: record does not start with a dn")]
    MissingDn { line: usize },

    #[error("line {line}: malformed attribute line '{content}'")]
    MalformedLine { line: usize, content: String },

    #[error("line {line}: invalid base64 value")]
    InvalidBase64 { line: usize },

    #[error("line {line}: value is not valid UTF-8")]
    InvalidUtf8 { line: usize },

    #[error("line {line}: {source}")]
    InvalidDn {
        line: usize,
        #[source]
        source: DnError,
    },

    #[error("line {line}: {feature} is not supported")]
    Unsupported { line: usize, feature: &'static str },
}

/// Parse every record, failing on the first bad one.
pub fn parse_ldif(input: &str) -> Result<Vec<Entry>, LdifError> {
    read_records(input).into_iter().collect()
}

/// Parse every record independently so that one bad record does not hide the
/// others.
pub fn read_records(input: &str) -> Vec<Result<Entry, LdifError>> {
    let mut records = Vec::new();
    let mut current: Vec<(usize, String)> = Vec::new();

    for (line, content) in unfold(input) {
        if content.trim().is_empty() {
            if !current.is_empty() {
                records.push(parse_record(std::mem::take(&mut current)));
            }
            continue;
        }
        if current.is_empty() && records.is_empty() && content.starts_with("version:") {
            continue;
        }
        current.push((line, content));
    }
    if !current.is_empty() {
        records.push(parse_record(current));
    }
    records
}

/// Join folded lines and drop comments, keeping the starting line number of
/// each logical line.
fn unfold(input: &str) -> Vec<(usize, String)> {
    let mut lines: Vec<(usize, String)> = Vec::new();
    let mut in_comment = false;
    for (index, raw) in input.lines().enumerate() {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        if let Some(rest) = raw.strip_prefix(' ') {
            if in_comment {
                continue;
            }
            if let Some((_, last)) = lines.last_mut() {
                last.push_str(rest);
                continue;
            }
        }
        in_comment = raw.starts_with('#');
        if !in_comment {
            lines.push((index + 1, raw.to_string()));
        }
    }
    lines
}

fn parse_record(lines: Vec<(usize, String)>) -> Result<Entry, LdifError> {
    let mut iter = lines.into_iter();
    let Some((first_line, first)) = iter.next() else {
        return Err(LdifError::MissingDn { line: 0 });
    };
    let (name, dn_value) = split_line(first_line, &first)?;
    if !name.eq_ignore_ascii_case("dn") {
        return Err(LdifError::MissingDn { line: first_line });
    }
    let dn = Dn::parse(&dn_value).map_err(|source| LdifError::InvalidDn {
        line: first_line,
        source,
    })?;

    let mut entry = Entry::new(dn);
    for (line, content) in iter {
        let (name, value) = split_line(line, &content)?;
        if name.eq_ignore_ascii_case("changetype") {
            return Err(LdifError::Unsupported {
                line,
                feature: "changetype",
            });
        }
        entry.push_value(&name, &value);
    }
    Ok(entry)
}

fn split_line(line: usize, content: &str) -> Result<(String, String), LdifError> {
    let (name, rest) = content.split_once(':').ok_or_else(|| LdifError::MalformedLine {
        line,
        content: content.to_string(),
    })?;
    if name.trim().is_empty() {
        return Err(LdifError::MalformedLine {
            line,
            content: content.to_string(),
        });
    }
    let value = if let Some(encoded) = rest.strip_prefix(':') {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|_| LdifError::InvalidBase64 { line })?;
        String::from_utf8(bytes).map_err(|_| LdifError::InvalidUtf8 { line })?
    } else if rest.starts_with('<') {
        return Err(LdifError::Unsupported {
            line,
            feature: "URL value",
        });
    } else {
        rest.trim_start().to_string()
    };
    Ok((name.trim().to_string(), value))
}

/// Serialize entries as LDIF content records.
pub fn write_ldif<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = &'a Entry>,
{
    let mut out = String::new();
    for entry in entries {
        push_line(&mut out, "dn", &entry.dn.to_string());
        for (name, values) in entry.attributes() {
            for value in values {
                push_line(&mut out, name, value);
            }
        }
        out.push('\n');
    }
    out
}

fn push_line(out: &mut String, name: &str, value: &str) {
    let line = if needs_base64(value) {
        format!("{}:: {}", name, STANDARD.encode(value.as_bytes()))
    } else {
        format!("{}: {}", name, value)
    };
    fold_into(out, &line);
}

fn needs_base64(value: &str) -> bool {
    value.starts_with([' ', ':', '<'])
        || value.ends_with(' ')
        || value.chars().any(|c| !c.is_ascii() || c == '\n' || c == '\r' || c == '\0')
}

fn fold_into(out: &mut String, line: &str) {
    let mut rest = line;
    let mut width = FOLD_WIDTH;
    while rest.len() > width {
        // values are ASCII at this point (non-ASCII is base64 encoded)
        let (head, tail) = rest.split_at(width);
        out.push_str(head);
        out.push_str("\n ");
        rest = tail;
        width = FOLD_WIDTH - 1;
    }
    out.push_str(rest);
    out.push('\n');
}
