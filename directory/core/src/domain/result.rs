// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Operation result codes returned to the dispatcher.
//!
//! Every privilege denial is reported as [`ResultCode::InsufficientAccessRights`]
//! no matter which privilege was missing.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultCode {
    Success,
    CompareFalse,
    CompareTrue,
    NoSuchAttribute,
    AttributeOrValueExists,
    NoSuchObject,
    InsufficientAccessRights,
    UnwillingToPerform,
    NotAllowedOnNonLeaf,
    EntryAlreadyExists,
    Other,
}

impl ResultCode {
    /// Numeric value as carried on the wire.
    pub fn code(&self) -> u32 {
        match self {
            ResultCode::Success => 0,
            ResultCode::CompareFalse => 5,
            ResultCode::CompareTrue => 6,
            ResultCode::NoSuchAttribute => 16,
            ResultCode::AttributeOrValueExists => 20,
            ResultCode::NoSuchObject => 32,
            ResultCode::InsufficientAccessRights => 50,
            ResultCode::UnwillingToPerform => 53,
            ResultCode::NotAllowedOnNonLeaf => 66,
            ResultCode::EntryAlreadyExists => 68,
            ResultCode::Other => 80,
        }
    }

    /// `true` for codes a client treats as a completed operation.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            ResultCode::Success | ResultCode::CompareTrue | ResultCode::CompareFalse
        )
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResultCode::Success => "success",
            ResultCode::CompareFalse => "compareFalse",
            ResultCode::CompareTrue => "compareTrue",
            ResultCode::NoSuchAttribute => "noSuchAttribute",
            ResultCode::AttributeOrValueExists => "attributeOrValueExists",
            ResultCode::NoSuchObject => "noSuchObject",
            ResultCode::InsufficientAccessRights => "insufficientAccessRights",
            ResultCode::UnwillingToPerform => "unwillingToPerform",
            ResultCode::NotAllowedOnNonLeaf => "notAllowedOnNonLeaf",
            ResultCode::EntryAlreadyExists => "entryAlreadyExists",
            ResultCode::Other => "other",
        };
        write!(f, "{} ({})", name, self.code())
    }
}
