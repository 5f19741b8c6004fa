// Copyright (c) 2026 DIVE25 Project
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::classification::Classification;
use crate::domain::country::CountryCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Failed to parse KAS registry: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// The policy constraints a KAS enforces before releasing the key wrapped in
/// one KAO.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyBinding {
    pub clearance_required: Classification,
    #[serde(default)]
    pub countries_allowed: Vec<CountryCode>,
    #[serde(default)]
    pub coi_required: Vec<String>,
}

/// A policy-bound wrapped content key addressed to one Key Access Server.
/// Created at encryption time, immutable thereafter. Several KAOs on one
/// resource wrap the same underlying content key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyAccessObject {
    pub kao_id: String,
    pub kas_url: String,
    pub kas_id: String,
    /// Base64 of the wrapped content key.
    pub wrapped_key: String,
    pub wrapping_algorithm: String,
    pub policy_binding: PolicyBinding,
}

/// What a federation KAS serves: one nation's resources or one COI's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KasService {
    Nation(CountryCode),
    Coi(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KasEndpoint {
    pub kas_id: String,
    pub url: String,
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub serves: KasService,
    /// Co-located with this instance; preferred for latency at selection time.
    #[serde(default)]
    pub local: bool,
}

/// Deployment-configured set of federation KAS endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KasRegistry {
    pub endpoints: Vec<KasEndpoint>,
}

impl KasRegistry {
    pub fn new(endpoints: Vec<KasEndpoint>) -> Self {
        Self { endpoints }
    }

    pub fn from_yaml(raw: &str) -> Result<Self, RegistryError> {
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn national(&self, country: &CountryCode) -> Option<&KasEndpoint> {
        self.endpoints
            .iter()
            .find(|e| matches!(&e.serves, KasService::Nation(c) if c == country))
    }

    pub fn for_coi(&self, name: &str) -> Option<&KasEndpoint> {
        self.endpoints
            .iter()
            .find(|e| matches!(&e.serves, KasService::Coi(c) if c == name))
    }

    pub fn local_kas_id(&self) -> Option<&str> {
        self.endpoints
            .iter()
            .find(|e| e.local)
            .map(|e| e.kas_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kao_wire_shape() {
        let kao = KeyAccessObject {
            kao_id: "kao-1".into(),
            kas_url: "https://kas.usa.example/kas".into(),
            kas_id: "kas-usa".into(),
            wrapped_key: "AAAA".into(),
            wrapping_algorithm: "AES-256-GCM".into(),
            policy_binding: PolicyBinding {
                clearance_required: Classification::Secret,
                countries_allowed: vec![CountryCode::new("USA")],
                coi_required: vec![],
            },
        };
        let json = serde_json::to_value(&kao).unwrap();
        assert_eq!(json["kaoId"], "kao-1");
        assert_eq!(json["wrappedKey"], "AAAA");
        assert_eq!(json["policyBinding"]["clearanceRequired"], "SECRET");
        assert_eq!(json["policyBinding"]["countriesAllowed"][0], "USA");
    }

    #[test]
    fn test_registry_from_yaml() {
        let raw = r#"
endpoints:
  - kasId: kas-usa
    url: https://kas.usa.example/kas
    serves:
      nation: USA
    local: true
  - kasId: kas-fvey
    url: https://kas.fvey.example/kas
    serves:
      coi: FVEY
"#;
        let registry = KasRegistry::from_yaml(raw).unwrap();
        assert_eq!(registry.endpoints.len(), 2);
        assert_eq!(
            registry.national(&CountryCode::new("USA")).unwrap().kas_id,
            "kas-usa"
        );
        assert_eq!(registry.for_coi("FVEY").unwrap().kas_id, "kas-fvey");
        assert_eq!(registry.local_kas_id(), Some("kas-usa"));
        assert!(registry.national(&CountryCode::new("FRA")).is_none());
    }
}
