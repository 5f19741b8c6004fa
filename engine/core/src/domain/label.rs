// Copyright (c) 2026 DIVE25 Project
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::classification::Classification;
use crate::domain::country::CountryCode;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::BTreeSet;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// How a multi-COI label is satisfied: every listed group, or any one of them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoiOperator {
    #[default]
    All,
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Caveat {
    /// Not releasable to foreign nationals.
    Noforn,
    /// Dissemination controlled by the originator.
    Orcon,
}

/// The security label governing disclosure of one sealed resource.
///
/// Once embedded in a sealed object the label is immutable and hash-bound to
/// the object's policy section via [`SecurityLabel::binding_hash`]; any
/// post-seal mutation is detected at decrypt time before the payload is
/// touched.
///
/// Ordered sets keep the canonical serialization deterministic, which the
/// binding hash depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityLabel {
    pub classification: Classification,
    pub releasability_to: BTreeSet<CountryCode>,
    #[serde(default)]
    pub coi: BTreeSet<String>,
    #[serde(default)]
    pub coi_operator: CoiOperator,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub caveats: BTreeSet<Caveat>,
}

impl SecurityLabel {
    /// Canonical JSON form used for the policy binding.
    pub fn canonical_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// HMAC-SHA256 over the canonical label, keyed by the content key, so the
    /// label and the ciphertext it governs cannot be recombined independently.
    pub fn binding_hash(&self, dek: &[u8]) -> Result<String, serde_json::Error> {
        let canonical = self.canonical_json()?;
        // HMAC accepts any key length.
        let mut mac = HmacSha256::new_from_slice(dek).expect("HMAC key of any length");
        mac.update(canonical.as_bytes());
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }

    /// Constant-time check of a recorded binding against this label and key.
    pub fn verify_binding(&self, dek: &[u8], recorded: &str) -> bool {
        let Ok(expected) = self.binding_hash(dek) else {
            return false;
        };
        let Ok(recorded_bytes) = STANDARD.decode(recorded) else {
            return false;
        };
        let Ok(expected_bytes) = STANDARD.decode(&expected) else {
            return false;
        };
        expected_bytes.ct_eq(&recorded_bytes).into()
    }

    pub fn has_caveat(&self, caveat: Caveat) -> bool {
        self.caveats.contains(&caveat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label() -> SecurityLabel {
        SecurityLabel {
            classification: Classification::Secret,
            releasability_to: [CountryCode::new("USA"), CountryCode::new("GBR")]
                .into_iter()
                .collect(),
            coi: ["FVEY".to_string()].into_iter().collect(),
            coi_operator: CoiOperator::All,
            caveats: BTreeSet::new(),
        }
    }

    #[test]
    fn test_canonical_json_is_deterministic() {
        let a = label().canonical_json().unwrap();
        let b = label().canonical_json().unwrap();
        assert_eq!(a, b);
        // camelCase wire fields
        assert!(a.contains("releasabilityTo"));
        assert!(a.contains("coiOperator"));
    }

    #[test]
    fn test_binding_roundtrip() {
        let dek = [7u8; 32];
        let l = label();
        let hash = l.binding_hash(&dek).unwrap();
        assert!(l.verify_binding(&dek, &hash));
    }

    #[test]
    fn test_binding_detects_label_mutation() {
        let dek = [7u8; 32];
        let hash = label().binding_hash(&dek).unwrap();

        let mut widened = label();
        widened.releasability_to.insert(CountryCode::new("FRA"));
        assert!(!widened.verify_binding(&dek, &hash));
    }

    #[test]
    fn test_binding_detects_wrong_key() {
        let l = label();
        let hash = l.binding_hash(&[7u8; 32]).unwrap();
        assert!(!l.verify_binding(&[8u8; 32], &hash));
    }

    #[test]
    fn test_caveat_wire_form() {
        let json = serde_json::to_string(&Caveat::Noforn).unwrap();
        assert_eq!(json, "\"NOFORN\"");
    }
}
