// Copyright (c) 2026 DIVE25 Project
// SPDX-License-Identifier: AGPL-3.0

//! Eligibility filtering and scored fallback ordering of Key Access Objects.
//!
//! The scoring constants are part of the engine's observable contract: they
//! determine tie-breaks and the attempt order the decryptor follows.

use crate::domain::decryption::RequesterAttributes;
use crate::domain::kao::KeyAccessObject;
use crate::infrastructure::circuit_breaker::CircuitBreakerRegistry;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

const COUNTRY_MATCH: i64 = 100;
const COI_MATCH_PER_TAG: i64 = 50;
const NO_COI_FLAT: i64 = 25;
const LOCAL_KAS: i64 = 10;
const KAS_UNAVAILABLE: i64 = -200;

/// One admissible KAO with its fallback score and score components.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredKao {
    /// Position in the original KAO list; preserved by the stable sort for
    /// deterministic tie-breaks.
    pub index: usize,
    pub kao: KeyAccessObject,
    pub score: i64,
    pub coi_matches: usize,
    pub country_match: bool,
    pub kas_available: bool,
}

/// Diagnostic classification of how the top candidate qualified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SelectionBasis {
    CoiMatch,
    CountryMatch,
    Fallback,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    /// Admissible KAOs, best first. Empty when the requester's clearance
    /// admits none; the caller must then return a clean not-authorized
    /// result without any network calls.
    pub candidates: Vec<ScoredKao>,
    pub basis: Option<SelectionBasis>,
}

pub struct KaoSelector {
    breakers: Arc<CircuitBreakerRegistry>,
    local_kas_id: Option<String>,
}

impl KaoSelector {
    pub fn new(breakers: Arc<CircuitBreakerRegistry>, local_kas_id: Option<String>) -> Self {
        Self {
            breakers,
            local_kas_id,
        }
    }

    pub fn select(&self, kaos: &[KeyAccessObject], requester: &RequesterAttributes) -> Selection {
        let mut candidates: Vec<ScoredKao> = Vec::new();

        for (index, kao) in kaos.iter().enumerate() {
            // Clearance gate: inadmissible KAOs are dropped, never scored.
            if requester.clearance.ordinal() < kao.policy_binding.clearance_required.ordinal() {
                continue;
            }

            let country_match = kao
                .policy_binding
                .countries_allowed
                .contains(&requester.country);

            let coi_matches = if kao.policy_binding.coi_required.is_empty() {
                0
            } else {
                kao.policy_binding
                    .coi_required
                    .iter()
                    .filter(|tag| requester.coi.contains(*tag))
                    .count()
            };

            let kas_available = self.breakers.is_available(&kao.kas_id);

            let mut score = 0i64;
            if country_match {
                score += COUNTRY_MATCH;
            }
            if kao.policy_binding.coi_required.is_empty() {
                score += NO_COI_FLAT;
            } else {
                score += COI_MATCH_PER_TAG * coi_matches as i64;
            }
            if self.local_kas_id.as_deref() == Some(kao.kas_id.as_str()) {
                score += LOCAL_KAS;
            }
            if !kas_available {
                // Deprioritize, never exclude: an unhealthy-but-only endpoint
                // is still attempted last as a hedge.
                score += KAS_UNAVAILABLE;
            }

            candidates.push(ScoredKao {
                index,
                kao: kao.clone(),
                score,
                coi_matches,
                country_match,
                kas_available,
            });
        }

        // Stable: equal scores keep original KAO order.
        candidates.sort_by(|a, b| b.score.cmp(&a.score));

        let basis = candidates.first().map(|top| {
            if top.coi_matches > 0 {
                SelectionBasis::CoiMatch
            } else if top.country_match {
                SelectionBasis::CountryMatch
            } else {
                SelectionBasis::Fallback
            }
        });

        debug!(
            total = kaos.len(),
            admissible = candidates.len(),
            basis = ?basis,
            "KAO selection complete"
        );

        Selection { candidates, basis }
    }
}
