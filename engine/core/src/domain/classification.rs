// Copyright (c) 2026 DIVE25 Project
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("Unknown classification marking: {0}")]
    UnknownMarking(String),
}

/// The five canonical classification levels, in ascending order of
/// sensitivity. The derived `Ord` is the clearance scale: a requester may
/// access material at or below their own level.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    Unclassified,
    Restricted,
    Confidential,
    Secret,
    TopSecret,
}

impl Classification {
    /// Ordinal position on the clearance scale (0 = UNCLASSIFIED).
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    /// Parse a canonical marking string or a common short form.
    ///
    /// National equivalency mapping happens upstream; by the time a marking
    /// reaches the engine it is one of the canonical forms below.
    pub fn from_marking(marking: &str) -> Result<Self, ClassificationError> {
        match marking.trim().to_ascii_uppercase().as_str() {
            "UNCLASSIFIED" | "U" => Ok(Self::Unclassified),
            "RESTRICTED" | "R" => Ok(Self::Restricted),
            "CONFIDENTIAL" | "C" => Ok(Self::Confidential),
            "SECRET" | "S" => Ok(Self::Secret),
            "TOP_SECRET" | "TOP SECRET" | "TS" => Ok(Self::TopSecret),
            other => Err(ClassificationError::UnknownMarking(other.to_string())),
        }
    }

    pub fn as_marking(self) -> &'static str {
        match self {
            Self::Unclassified => "UNCLASSIFIED",
            Self::Restricted => "RESTRICTED",
            Self::Confidential => "CONFIDENTIAL",
            Self::Secret => "SECRET",
            Self::TopSecret => "TOP_SECRET",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_marking())
    }
}
