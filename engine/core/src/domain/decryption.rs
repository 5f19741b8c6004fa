// Copyright (c) 2026 DIVE25 Project
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::classification::Classification;
use crate::domain::country::CountryCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Attributes of the party requesting decryption, as asserted by the
/// federation identity layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequesterAttributes {
    pub clearance: Classification,
    pub country: CountryCode,
    #[serde(default)]
    pub coi: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptionRequest {
    pub resource_id: String,
    pub requester: RequesterAttributes,
    pub bearer_token: String,
}

/// Outcome of one candidate attempt. `Denied`, `Unreachable` and `Timeout`
/// all count against the KAS circuit breaker; `Skipped` means the breaker
/// gated the call off before any network traffic; `IntegrityFailure` is local
/// and candidate-scoped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptOutcome {
    Success,
    Skipped,
    Denied,
    Unreachable,
    Timeout,
    IntegrityFailure,
}

impl AttemptOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Skipped => "skipped",
            Self::Denied => "denied",
            Self::Unreachable => "unreachable",
            Self::Timeout => "timeout",
            Self::IntegrityFailure => "integrity_failure",
        }
    }
}

/// One entry of the per-candidate attempt trace emitted with every
/// decryption result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub kao_id: String,
    pub kas_id: String,
    pub latency_ms: u64,
    pub outcome: AttemptOutcome,
}

/// Terminal failure categories of a whole decryption operation. Per-candidate
/// failures live in the attempt trace, not here.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "kind")]
pub enum DecryptFailure {
    #[error("requester holds no eligible key access object")]
    NotAuthorized,
    #[error("all {attempted} candidate key access objects failed or were skipped")]
    Exhausted { attempted: usize },
}

/// Result of one decryption operation: either a plaintext plus the identity
/// of the winning KAO/KAS, or one aggregated failure. The attempt trace is
/// always complete — the caller never sees a partial outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptionResult {
    pub success: bool,
    #[serde(skip)]
    pub plaintext: Option<Vec<u8>>,
    pub kao_id: Option<String>,
    pub kas_id: Option<String>,
    /// Position of the winning candidate in the ordered list.
    pub success_kao_index: Option<usize>,
    pub failure: Option<DecryptFailure>,
    pub attempts: Vec<AttemptRecord>,
}

impl DecryptionResult {
    pub fn succeeded(
        plaintext: Vec<u8>,
        kao_id: String,
        kas_id: String,
        index: usize,
        attempts: Vec<AttemptRecord>,
    ) -> Self {
        Self {
            success: true,
            plaintext: Some(plaintext),
            kao_id: Some(kao_id),
            kas_id: Some(kas_id),
            success_kao_index: Some(index),
            failure: None,
            attempts,
        }
    }

    pub fn not_authorized() -> Self {
        Self {
            success: false,
            plaintext: None,
            kao_id: None,
            kas_id: None,
            success_kao_index: None,
            failure: Some(DecryptFailure::NotAuthorized),
            attempts: Vec::new(),
        }
    }

    pub fn exhausted(attempts: Vec<AttemptRecord>) -> Self {
        Self {
            success: false,
            plaintext: None,
            kao_id: None,
            kas_id: None,
            success_kao_index: None,
            failure: Some(DecryptFailure::Exhausted {
                attempted: attempts.len(),
            }),
            attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_serialization_omits_plaintext() {
        let result = DecryptionResult::succeeded(
            b"secret".to_vec(),
            "kao-1".into(),
            "kas-usa".into(),
            0,
            vec![AttemptRecord {
                kao_id: "kao-1".into(),
                kas_id: "kas-usa".into(),
                latency_ms: 12,
                outcome: AttemptOutcome::Success,
            }],
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["successKaoIndex"], 0);
        assert!(json.get("plaintext").is_none());
        assert_eq!(json["attempts"][0]["outcome"], "SUCCESS");
    }

    #[test]
    fn test_exhausted_counts_all_candidates() {
        let attempts = vec![
            AttemptRecord {
                kao_id: "kao-1".into(),
                kas_id: "kas-a".into(),
                latency_ms: 0,
                outcome: AttemptOutcome::Skipped,
            },
            AttemptRecord {
                kao_id: "kao-2".into(),
                kas_id: "kas-b".into(),
                latency_ms: 40,
                outcome: AttemptOutcome::Denied,
            },
        ];
        let result = DecryptionResult::exhausted(attempts);
        assert!(!result.success);
        assert_eq!(
            result.failure,
            Some(DecryptFailure::Exhausted { attempted: 2 })
        );
        assert_eq!(result.attempts.len(), 2);
    }
}
