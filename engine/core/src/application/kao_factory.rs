// Copyright (c) 2026 DIVE25 Project
// SPDX-License-Identifier: AGPL-3.0

//! Encryption-time half of the engine: emit Key Access Objects for a valid
//! label and seal the payload under a fresh content key.

use crate::application::label_validator::{PolicyViolation, SecurityLabelValidator};
use crate::domain::coi::{CoiMembership, CoiMembershipProvider, MembershipError};
use crate::domain::kao::{KasEndpoint, KasRegistry, KeyAccessObject, PolicyBinding};
use crate::domain::label::SecurityLabel;
use crate::infrastructure::wrapping::{ContentKeyWrapper, WrapError};
use aes_gcm::aead::{Aead, AeadCore, OsRng};
use aes_gcm::{Aes256Gcm, KeyInit};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

const TAG_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum SealError {
    #[error(transparent)]
    Policy(#[from] PolicyViolation),
    #[error(transparent)]
    Membership(#[from] MembershipError),
    #[error("No key access server can serve this label")]
    NoServingKas,
    #[error(transparent)]
    Wrap(#[from] WrapError),
    #[error("Payload encryption failed")]
    Encryption,
    #[error("Label serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A sealed ZTDF object: ciphertext, the immutable label, its key-bound
/// policy hash, and the key-release bindings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZtdfEnvelope {
    pub resource_id: String,
    pub label: SecurityLabel,
    /// HMAC-SHA256 of the canonical label keyed by the content key, base64.
    pub policy_binding_hash: String,
    /// Base64 96-bit AES-GCM IV.
    pub iv: String,
    /// Base64 ciphertext, authentication tag excluded.
    pub ciphertext: String,
    /// Base64 16-byte authentication tag.
    pub auth_tag: String,
    pub key_access: Vec<KeyAccessObject>,
}

pub struct KaoFactory {
    validator: SecurityLabelValidator,
    membership: Arc<dyn CoiMembershipProvider>,
    registry: KasRegistry,
    wrapper: Arc<dyn ContentKeyWrapper>,
}

impl KaoFactory {
    pub fn new(
        validator: SecurityLabelValidator,
        membership: Arc<dyn CoiMembershipProvider>,
        registry: KasRegistry,
        wrapper: Arc<dyn ContentKeyWrapper>,
    ) -> Self {
        Self {
            validator,
            membership,
            registry,
            wrapper,
        }
    }

    /// Emit one KAO per registry endpoint relevant to the label, all wrapping
    /// the same content key:
    ///
    /// - a national KAO for each releasability country served by a national
    ///   KAS (`countries_allowed` pinned to that country, no COI gate);
    /// - a COI KAO for each label COI served by a COI KAS (`coi_required`
    ///   pinned to that group, `countries_allowed` = members ∩ releasability).
    ///
    /// The label must already be valid; this refuses otherwise.
    pub fn build_kaos(
        &self,
        label: &SecurityLabel,
        dek: &[u8; 32],
    ) -> Result<Vec<KeyAccessObject>, SealError> {
        let membership = self.membership.membership()?;
        self.validator.validate_or_reject(label, &membership)?;

        let mut kaos = Vec::new();

        for country in &label.releasability_to {
            if let Some(endpoint) = self.registry.national(country) {
                kaos.push(self.make_kao(
                    endpoint,
                    dek,
                    PolicyBinding {
                        clearance_required: label.classification,
                        countries_allowed: vec![country.clone()],
                        coi_required: Vec::new(),
                    },
                )?);
            }
        }

        for coi in &label.coi {
            if let Some(endpoint) = self.registry.for_coi(coi) {
                kaos.push(self.make_kao(
                    endpoint,
                    dek,
                    PolicyBinding {
                        clearance_required: label.classification,
                        countries_allowed: coi_countries(&membership, coi, label),
                        coi_required: vec![coi.clone()],
                    },
                )?);
            }
        }

        if kaos.is_empty() {
            // A sealed object nobody could ever open is a deployment error.
            return Err(SealError::NoServingKas);
        }

        Ok(kaos)
    }

    /// Seal a payload under a fresh random content key.
    pub fn seal(
        &self,
        resource_id: impl Into<String>,
        plaintext: &[u8],
        label: &SecurityLabel,
    ) -> Result<ZtdfEnvelope, SealError> {
        let dek: [u8; 32] = Aes256Gcm::generate_key(&mut OsRng).into();
        self.seal_with_key(resource_id, plaintext, label, &dek)
    }

    /// Seal with a caller-supplied content key. Used by re-seal flows and by
    /// test harnesses that need a known key.
    pub fn seal_with_key(
        &self,
        resource_id: impl Into<String>,
        plaintext: &[u8],
        label: &SecurityLabel,
        dek: &[u8; 32],
    ) -> Result<ZtdfEnvelope, SealError> {
        let resource_id = resource_id.into();
        let key_access = self.build_kaos(label, dek)?;

        let cipher = Aes256Gcm::new_from_slice(dek).map_err(|_| SealError::Encryption)?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let mut sealed = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| SealError::Encryption)?;
        let tag = sealed.split_off(sealed.len() - TAG_LEN);

        let envelope = ZtdfEnvelope {
            policy_binding_hash: label.binding_hash(dek)?,
            label: label.clone(),
            iv: STANDARD.encode(nonce),
            ciphertext: STANDARD.encode(&sealed),
            auth_tag: STANDARD.encode(&tag),
            key_access,
            resource_id: resource_id.clone(),
        };

        info!(
            resource_id = %resource_id,
            kaos = envelope.key_access.len(),
            classification = %label.classification,
            "resource sealed"
        );

        Ok(envelope)
    }

    fn make_kao(
        &self,
        endpoint: &KasEndpoint,
        dek: &[u8; 32],
        binding: PolicyBinding,
    ) -> Result<KeyAccessObject, SealError> {
        Ok(KeyAccessObject {
            kao_id: Uuid::new_v4().to_string(),
            kas_url: endpoint.url.clone(),
            kas_id: endpoint.kas_id.clone(),
            wrapped_key: self.wrapper.wrap_key(&endpoint.kas_id, dek)?,
            wrapping_algorithm: self.wrapper.algorithm().to_string(),
            policy_binding: binding,
        })
    }
}

/// Member countries of a COI intersected with the label's releasability,
/// sorted for deterministic output. Membership-based groups contribute an
/// empty list: their KAO gates purely on the COI tag.
fn coi_countries(
    membership: &CoiMembership,
    coi: &str,
    label: &SecurityLabel,
) -> Vec<crate::domain::country::CountryCode> {
    let Some(members) = membership.members(coi) else {
        return Vec::new();
    };
    label
        .releasability_to
        .iter()
        .filter(|c| members.contains(c))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::label_validator::SecurityLabelValidator;
    use crate::domain::classification::Classification;
    use crate::domain::coi::BuiltinCoiTable;
    use crate::domain::country::CountryCode;
    use crate::domain::kao::KasService;
    use crate::domain::label::CoiOperator;
    use crate::infrastructure::wrapping::AesGcmKeyWrapper;
    use std::collections::BTreeSet;

    fn registry() -> KasRegistry {
        KasRegistry::new(vec![
            KasEndpoint {
                kas_id: "kas-usa".into(),
                url: "https://kas.usa.example/kas".into(),
                serves: KasService::Nation(CountryCode::new("USA")),
                local: true,
            },
            KasEndpoint {
                kas_id: "kas-gbr".into(),
                url: "https://kas.gbr.example/kas".into(),
                serves: KasService::Nation(CountryCode::new("GBR")),
                local: false,
            },
            KasEndpoint {
                kas_id: "kas-fvey".into(),
                url: "https://kas.fvey.example/kas".into(),
                serves: KasService::Coi("FVEY".into()),
                local: false,
            },
        ])
    }

    fn wrapper() -> Arc<AesGcmKeyWrapper> {
        Arc::new(
            AesGcmKeyWrapper::new()
                .register("kas-usa", [1u8; 32])
                .register("kas-gbr", [2u8; 32])
                .register("kas-fvey", [3u8; 32]),
        )
    }

    fn factory() -> KaoFactory {
        KaoFactory::new(
            SecurityLabelValidator::with_defaults(),
            Arc::new(BuiltinCoiTable),
            registry(),
            wrapper(),
        )
    }

    fn fvey_label() -> SecurityLabel {
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
    fn test_emits_national_and_coi_kaos() {
        let dek = [9u8; 32];
        let kaos = factory().build_kaos(&fvey_label(), &dek).unwrap();
        assert_eq!(kaos.len(), 3);

        let usa = kaos.iter().find(|k| k.kas_id == "kas-usa").unwrap();
        assert_eq!(usa.policy_binding.countries_allowed, vec![CountryCode::new("USA")]);
        assert!(usa.policy_binding.coi_required.is_empty());

        let fvey = kaos.iter().find(|k| k.kas_id == "kas-fvey").unwrap();
        assert_eq!(fvey.policy_binding.coi_required, vec!["FVEY".to_string()]);
        assert_eq!(
            fvey.policy_binding.countries_allowed,
            vec![CountryCode::new("GBR"), CountryCode::new("USA")]
        );

        for kao in &kaos {
            assert_eq!(kao.policy_binding.clearance_required, Classification::Secret);
        }
    }

    #[test]
    fn test_all_kaos_wrap_the_same_dek() {
        let dek = [9u8; 32];
        let w = wrapper();
        let kaos = factory().build_kaos(&fvey_label(), &dek).unwrap();
        for kao in &kaos {
            assert_eq!(w.unwrap_key(&kao.kas_id, &kao.wrapped_key).unwrap(), dek);
        }
    }

    #[test]
    fn test_invalid_label_refused() {
        let mut label = fvey_label();
        label.coi.insert("US-ONLY".to_string());
        let err = factory().build_kaos(&label, &[9u8; 32]).unwrap_err();
        assert!(matches!(err, SealError::Policy(_)));
    }

    #[test]
    fn test_no_serving_kas_is_an_error() {
        let mut label = fvey_label();
        label.releasability_to =
            [CountryCode::new("CAN"), CountryCode::new("NZL")].into_iter().collect();
        // Valid label, but no national KAS for CAN/NZL and FVEY is still
        // served; drop the COI to exercise the empty case.
        label.coi.clear();
        let err = factory().build_kaos(&label, &[9u8; 32]).unwrap_err();
        assert!(matches!(err, SealError::NoServingKas));
    }

    #[test]
    fn test_seal_produces_complete_envelope() {
        let dek = [9u8; 32];
        let envelope = factory()
            .seal_with_key("res-1", b"coalition plan", &fvey_label(), &dek)
            .unwrap();
        assert_eq!(envelope.resource_id, "res-1");
        assert_eq!(envelope.key_access.len(), 3);
        assert!(envelope.label.verify_binding(&dek, &envelope.policy_binding_hash));

        let iv = STANDARD.decode(&envelope.iv).unwrap();
        let tag = STANDARD.decode(&envelope.auth_tag).unwrap();
        assert_eq!(iv.len(), 12);
        assert_eq!(tag.len(), 16);
        assert!(!STANDARD.decode(&envelope.ciphertext).unwrap().is_empty());
    }
}
