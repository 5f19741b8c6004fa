// Copyright (c) 2026 DIVE25 Project
// SPDX-License-Identifier: AGPL-3.0

//! Community-of-Interest model: membership snapshots, the relationship graph
//! consulted by label validation, and the conservative built-in table used
//! when the external membership provider is unavailable.

use crate::domain::country::CountryCode;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum MembershipError {
    #[error("COI membership provider unavailable: {0}")]
    Unavailable(String),
}

/// Point-in-time snapshot of COI name → member countries.
///
/// A COI with an empty member set is a membership-based group with no country
/// affiliation (access is granted by holding the tag, not by nationality).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoiMembership {
    groups: HashMap<String, HashSet<CountryCode>>,
}

impl CoiMembership {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        name: impl Into<String>,
        members: impl IntoIterator<Item = CountryCode>,
    ) {
        self.groups.insert(name.into(), members.into_iter().collect());
    }

    /// Member countries for a COI, or `None` when the name is unknown.
    pub fn members(&self, name: &str) -> Option<&HashSet<CountryCode>> {
        self.groups.get(name)
    }

    /// True when the COI exists and has no national membership.
    pub fn is_membership_only(&self, name: &str) -> Option<bool> {
        self.groups.get(name).map(HashSet::is_empty)
    }
}

/// Resolves COI names to their member countries. Implementations are expected
/// to serve an eventually consistent, administratively updated snapshot.
pub trait CoiMembershipProvider: Send + Sync {
    fn membership(&self) -> Result<CoiMembership, MembershipError>;
}

/// Conservative built-in membership table. Deliberately restrictive: it only
/// lists groups the platform ships with, so a stale provider can never widen
/// access beyond what deployment review approved.
#[derive(Debug, Default)]
pub struct BuiltinCoiTable;

const NATO_MEMBERS: &[&str] = &[
    "ALB", "BEL", "BGR", "CAN", "HRV", "CZE", "DNK", "EST", "FIN", "FRA", "DEU",
    "GRC", "HUN", "ISL", "ITA", "LVA", "LTU", "LUX", "MNE", "NLD", "MKD", "NOR",
    "POL", "PRT", "ROU", "SVK", "SVN", "ESP", "SWE", "TUR", "GBR", "USA",
];

impl BuiltinCoiTable {
    pub fn snapshot() -> CoiMembership {
        fn countries(codes: &[&str]) -> Vec<CountryCode> {
            codes.iter().map(|c| CountryCode::new(*c)).collect()
        }

        let mut table = CoiMembership::new();
        table.insert("FVEY", countries(&["USA", "GBR", "CAN", "AUS", "NZL"]));
        table.insert("CAN-US", countries(&["CAN", "USA"]));
        table.insert("AUKUS", countries(&["AUS", "GBR", "USA"]));
        table.insert("NATO", countries(NATO_MEMBERS));
        table.insert("US-ONLY", countries(&["USA"]));
        // Membership-based groups: no country affiliation.
        table.insert("CYBER-DEF", Vec::new());
        table.insert("MED-EVAL", Vec::new());
        table
    }
}

impl CoiMembershipProvider for BuiltinCoiTable {
    fn membership(&self) -> Result<CoiMembership, MembershipError> {
        Ok(Self::snapshot())
    }
}

/// Wraps an external provider and falls back to the built-in table when it
/// fails. Fail-safe, not fail-open: a provider outage tightens the table, it
/// never skips the checks that consume it.
pub struct FailSafeMembership<P> {
    inner: P,
}

impl<P: CoiMembershipProvider> FailSafeMembership<P> {
    pub fn new(inner: P) -> Self {
        Self { inner }
    }
}

impl<P: CoiMembershipProvider> CoiMembershipProvider for FailSafeMembership<P> {
    fn membership(&self) -> Result<CoiMembership, MembershipError> {
        match self.inner.membership() {
            Ok(snapshot) => Ok(snapshot),
            Err(e) => {
                warn!(error = %e, "COI membership provider failed, serving built-in table");
                Ok(BuiltinCoiTable::snapshot())
            }
        }
    }
}

/// Static relationship configuration consulted by the label validator:
/// mutual-exclusion pairs and narrower→broader pairs that are unsafe to
/// combine under ANY semantics.
#[derive(Debug, Clone)]
pub struct CoiRelationshipGraph {
    exclusions: HashMap<String, HashSet<String>>,
    broader: HashMap<String, String>,
}

impl CoiRelationshipGraph {
    pub fn new(
        exclusions: HashMap<String, HashSet<String>>,
        broader: HashMap<String, String>,
    ) -> Self {
        Self { exclusions, broader }
    }

    /// Tags that may never coexist with `name`.
    pub fn excluded_by(&self, name: &str) -> Option<&HashSet<String>> {
        self.exclusions.get(name)
    }

    /// The registered broader group of a narrower tag, if any.
    pub fn broader_of(&self, name: &str) -> Option<&str> {
        self.broader.get(name).map(String::as_str)
    }
}

impl Default for CoiRelationshipGraph {
    fn default() -> Self {
        let mut exclusions: HashMap<String, HashSet<String>> = HashMap::new();
        exclusions.insert(
            "US-ONLY".to_string(),
            ["FVEY", "CAN-US", "AUKUS", "NATO"]
                .into_iter()
                .map(String::from)
                .collect(),
        );

        let mut broader = HashMap::new();
        broader.insert("CAN-US".to_string(), "FVEY".to_string());
        broader.insert("AUKUS".to_string(), "FVEY".to_string());

        Self::new(exclusions, broader)
    }
}
