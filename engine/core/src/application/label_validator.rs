// Copyright (c) 2026 DIVE25 Project
// SPDX-License-Identifier: AGPL-3.0

//! Security-label coherence validation.
//!
//! Runs before a resource is ever sealed: a label that fails any invariant
//! never reaches the KAO factory. Validation is a pure function of the label,
//! the relationship graph and a point-in-time membership snapshot; the only
//! side effect is logging.

use crate::domain::coi::{CoiMembership, CoiRelationshipGraph};
use crate::domain::country::CountryCode;
use crate::domain::label::{Caveat, CoiOperator, SecurityLabel};
use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, warn};

/// A violated label invariant. The full list is always reported back to the
/// writer; nothing is auto-corrected.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "kind")]
pub enum LabelViolation {
    #[error("COI {exclusive} cannot be combined with {conflicting}")]
    MutualExclusion {
        exclusive: String,
        conflicting: String,
    },
    #[error(
        "COI {narrower} combined with broader {broader} widens access under ANY semantics"
    )]
    SupersetWidening { narrower: String, broader: String },
    #[error("Unknown COI: {name}")]
    UnknownCoi { name: String },
    #[error("Releasability country {country} is outside the member union of the listed COIs")]
    ReleasabilityOutsideCoi { country: CountryCode },
    #[error("NOFORN requires COI to be exactly {expected}")]
    NofornCoiMismatch { expected: String },
    #[error("NOFORN restricts releasability to {owning_nation}, found {country}")]
    NofornForeignReleasability {
        owning_nation: CountryCode,
        country: CountryCode,
    },
    #[error("releasabilityTo must not be empty")]
    EmptyReleasability,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<LabelViolation>,
    pub warnings: Vec<String>,
}

/// Raised by [`SecurityLabelValidator::validate_or_reject`]; carries every
/// violated invariant so the writer can fix the label in one round.
#[derive(Debug, Clone, Error)]
#[error("Security label rejected: {} invariant violation(s)", violations.len())]
pub struct PolicyViolation {
    pub violations: Vec<LabelViolation>,
}

#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// The nation that owns this instance; NOFORN collapses releasability to it.
    pub owning_nation: CountryCode,
    /// The national-only COI tag NOFORN requires.
    pub national_only_coi: String,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            owning_nation: CountryCode::new("USA"),
            national_only_coi: "US-ONLY".to_string(),
        }
    }
}

pub struct SecurityLabelValidator {
    graph: CoiRelationshipGraph,
    config: ValidatorConfig,
}

impl SecurityLabelValidator {
    pub fn new(graph: CoiRelationshipGraph, config: ValidatorConfig) -> Self {
        Self { graph, config }
    }

    pub fn with_defaults() -> Self {
        Self::new(CoiRelationshipGraph::default(), ValidatorConfig::default())
    }

    /// Check all six invariants, collecting every violation.
    pub fn validate(
        &self,
        label: &SecurityLabel,
        membership: &CoiMembership,
    ) -> ValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        self.check_mutual_exclusion(label, &mut errors);
        self.check_superset_widening(label, &mut errors);
        self.check_releasability_alignment(label, membership, &mut errors);
        self.check_noforn(label, &mut errors);

        if label.releasability_to.is_empty() {
            // Fail closed and loudly: an empty set would deny everyone silently.
            errors.push(LabelViolation::EmptyReleasability);
        }

        if label.coi.is_empty() && label.caveats.is_empty() {
            warnings.push("label has no COI-based key separation".to_string());
        }

        let valid = errors.is_empty();
        if valid {
            debug!(
                classification = %label.classification,
                warnings = warnings.len(),
                "security label validated"
            );
        } else {
            warn!(
                classification = %label.classification,
                violations = errors.len(),
                "security label rejected"
            );
        }

        ValidationResult {
            valid,
            errors,
            warnings,
        }
    }

    /// Guard used by the seal pipeline: any violation refuses object creation.
    pub fn validate_or_reject(
        &self,
        label: &SecurityLabel,
        membership: &CoiMembership,
    ) -> Result<(), PolicyViolation> {
        let result = self.validate(label, membership);
        if result.valid {
            Ok(())
        } else {
            Err(PolicyViolation {
                violations: result.errors,
            })
        }
    }

    /// Invariant 1: an exclusive tag may not coexist with any tag from its
    /// forbidden set.
    fn check_mutual_exclusion(&self, label: &SecurityLabel, errors: &mut Vec<LabelViolation>) {
        for tag in &label.coi {
            let Some(forbidden) = self.graph.excluded_by(tag) else {
                continue;
            };
            for conflicting in forbidden {
                if label.coi.contains(conflicting) {
                    errors.push(LabelViolation::MutualExclusion {
                        exclusive: tag.clone(),
                        conflicting: conflicting.clone(),
                    });
                }
            }
        }
    }

    /// Invariant 2: under ANY semantics a narrower tag must not appear with
    /// its registered broader tag. Under ALL semantics the intersection only
    /// narrows, so the combination is safe and never flagged.
    fn check_superset_widening(&self, label: &SecurityLabel, errors: &mut Vec<LabelViolation>) {
        if label.coi_operator != CoiOperator::Any {
            return;
        }
        for tag in &label.coi {
            if let Some(broader) = self.graph.broader_of(tag) {
                if label.coi.contains(broader) {
                    errors.push(LabelViolation::SupersetWidening {
                        narrower: tag.clone(),
                        broader: broader.to_string(),
                    });
                }
            }
        }
    }

    /// Invariant 3: releasability must sit inside the member union of the
    /// listed COIs. Skipped entirely when the COI set is empty or when every
    /// listed COI is membership-based (an explicit policy exception). Unknown
    /// COI names are themselves errors.
    fn check_releasability_alignment(
        &self,
        label: &SecurityLabel,
        membership: &CoiMembership,
        errors: &mut Vec<LabelViolation>,
    ) {
        if label.coi.is_empty() {
            return;
        }

        let mut union: HashSet<&CountryCode> = HashSet::new();
        let mut any_national = false;
        for tag in &label.coi {
            match membership.members(tag) {
                None => {
                    errors.push(LabelViolation::UnknownCoi { name: tag.clone() });
                }
                Some(members) if members.is_empty() => {
                    // No country affiliation; contributes nothing to the union.
                }
                Some(members) => {
                    any_national = true;
                    union.extend(members.iter());
                }
            }
        }

        if !any_national {
            return;
        }

        for country in &label.releasability_to {
            if !union.contains(country) {
                errors.push(LabelViolation::ReleasabilityOutsideCoi {
                    country: country.clone(),
                });
            }
        }
    }

    /// Invariant 4: NOFORN pins the COI set to the national-only tag and the
    /// releasability set to the owning nation.
    fn check_noforn(&self, label: &SecurityLabel, errors: &mut Vec<LabelViolation>) {
        if !label.has_caveat(Caveat::Noforn) {
            return;
        }

        let coi_is_national_only =
            label.coi.len() == 1 && label.coi.contains(&self.config.national_only_coi);
        if !coi_is_national_only {
            errors.push(LabelViolation::NofornCoiMismatch {
                expected: self.config.national_only_coi.clone(),
            });
        }

        for country in &label.releasability_to {
            if *country != self.config.owning_nation {
                errors.push(LabelViolation::NofornForeignReleasability {
                    owning_nation: self.config.owning_nation.clone(),
                    country: country.clone(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::classification::Classification;
    use crate::domain::coi::BuiltinCoiTable;

    fn validator() -> SecurityLabelValidator {
        SecurityLabelValidator::with_defaults()
    }

    fn membership() -> CoiMembership {
        BuiltinCoiTable::snapshot()
    }

    fn label(
        classification: Classification,
        releasability: &[&str],
        coi: &[&str],
        operator: CoiOperator,
        caveats: &[Caveat],
    ) -> SecurityLabel {
        SecurityLabel {
            classification,
            releasability_to: releasability.iter().map(|c| CountryCode::new(*c)).collect(),
            coi: coi.iter().map(|c| c.to_string()).collect(),
            coi_operator: operator,
            caveats: caveats.iter().copied().collect(),
        }
    }

    #[test]
    fn test_scenario_a_fvey_label_valid() {
        let l = label(
            Classification::Secret,
            &["USA", "GBR"],
            &["FVEY"],
            CoiOperator::All,
            &[],
        );
        let result = validator().validate(&l, &membership());
        assert!(result.valid, "errors: {:?}", result.errors);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_scenario_b_mutual_exclusion() {
        let l = label(
            Classification::Secret,
            &["USA"],
            &["US-ONLY", "FVEY"],
            CoiOperator::All,
            &[],
        );
        let result = validator().validate(&l, &membership());
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| matches!(
            e,
            LabelViolation::MutualExclusion { exclusive, conflicting }
                if exclusive == "US-ONLY" && conflicting == "FVEY"
        )));
    }

    #[test]
    fn test_scenario_c_superset_widening_under_any() {
        let l = label(
            Classification::Secret,
            &["USA", "CAN"],
            &["CAN-US", "FVEY"],
            CoiOperator::Any,
            &[],
        );
        let result = validator().validate(&l, &membership());
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| matches!(
            e,
            LabelViolation::SupersetWidening { narrower, broader }
                if narrower == "CAN-US" && broader == "FVEY"
        )));
    }

    #[test]
    fn test_superset_never_fires_under_all() {
        let l = label(
            Classification::Secret,
            &["USA", "CAN"],
            &["CAN-US", "FVEY"],
            CoiOperator::All,
            &[],
        );
        let result = validator().validate(&l, &membership());
        assert!(result.valid, "errors: {:?}", result.errors);
    }

    #[test]
    fn test_scenario_d_noforn() {
        let ok = label(
            Classification::Secret,
            &["USA"],
            &["US-ONLY"],
            CoiOperator::All,
            &[Caveat::Noforn],
        );
        assert!(validator().validate(&ok, &membership()).valid);

        let bad = label(
            Classification::Secret,
            &["USA", "GBR"],
            &["US-ONLY"],
            CoiOperator::All,
            &[Caveat::Noforn],
        );
        let result = validator().validate(&bad, &membership());
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| matches!(
            e,
            LabelViolation::NofornForeignReleasability { country, .. }
                if country == &CountryCode::new("GBR")
        )));
    }

    #[test]
    fn test_noforn_requires_national_only_coi() {
        let l = label(
            Classification::Secret,
            &["USA"],
            &["FVEY"],
            CoiOperator::All,
            &[Caveat::Noforn],
        );
        let result = validator().validate(&l, &membership());
        assert!(result
            .errors
            .iter()
            .any(|e| matches!(e, LabelViolation::NofornCoiMismatch { .. })));
    }

    #[test]
    fn test_releasability_outside_coi_union() {
        let l = label(
            Classification::Secret,
            &["USA", "FRA"],
            &["FVEY"],
            CoiOperator::All,
            &[],
        );
        let result = validator().validate(&l, &membership());
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| matches!(
            e,
            LabelViolation::ReleasabilityOutsideCoi { country }
                if country == &CountryCode::new("FRA")
        )));
    }

    #[test]
    fn test_unknown_coi_is_an_error() {
        let l = label(
            Classification::Secret,
            &["USA"],
            &["SHADOW-NET"],
            CoiOperator::All,
            &[],
        );
        let result = validator().validate(&l, &membership());
        assert!(result.errors.iter().any(|e| matches!(
            e,
            LabelViolation::UnknownCoi { name } if name == "SHADOW-NET"
        )));
    }

    #[test]
    fn test_membership_only_cois_skip_alignment() {
        // Every listed COI lacks national membership: alignment is skipped.
        let l = label(
            Classification::Confidential,
            &["FRA", "DEU"],
            &["CYBER-DEF", "MED-EVAL"],
            CoiOperator::All,
            &[],
        );
        let result = validator().validate(&l, &membership());
        assert!(result.valid, "errors: {:?}", result.errors);
    }

    #[test]
    fn test_mixed_membership_and_national_cois() {
        // A national COI is present, so alignment runs; the membership-only
        // group contributes nothing to the union.
        let l = label(
            Classification::Confidential,
            &["FRA"],
            &["CYBER-DEF", "FVEY"],
            CoiOperator::All,
            &[],
        );
        let result = validator().validate(&l, &membership());
        assert!(!result.valid);
        assert!(result
            .errors
            .iter()
            .any(|e| matches!(e, LabelViolation::ReleasabilityOutsideCoi { .. })));
    }

    #[test]
    fn test_empty_releasability_fails_closed() {
        let l = label(
            Classification::Secret,
            &[],
            &["FVEY"],
            CoiOperator::All,
            &[],
        );
        let result = validator().validate(&l, &membership());
        assert!(result
            .errors
            .iter()
            .any(|e| matches!(e, LabelViolation::EmptyReleasability)));
    }

    #[test]
    fn test_empty_coi_warns_only() {
        let l = label(
            Classification::Unclassified,
            &["USA", "FRA"],
            &[],
            CoiOperator::All,
            &[],
        );
        let result = validator().validate(&l, &membership());
        assert!(result.valid);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_validate_is_pure() {
        let l = label(
            Classification::Secret,
            &["USA", "FRA"],
            &["US-ONLY", "FVEY"],
            CoiOperator::Any,
            &[Caveat::Noforn],
        );
        let m = membership();
        let v = validator();
        assert_eq!(v.validate(&l, &m), v.validate(&l, &m));
    }

    #[test]
    fn test_validate_or_reject_carries_all_violations() {
        let l = label(
            Classification::Secret,
            &[],
            &["US-ONLY", "FVEY"],
            CoiOperator::All,
            &[],
        );
        let err = validator()
            .validate_or_reject(&l, &membership())
            .unwrap_err();
        assert!(err.violations.len() >= 2);
    }
}
