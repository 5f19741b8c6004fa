// Copyright (c) 2026 DIVE25 Project
// SPDX-License-Identifier: AGPL-3.0

//! Multi-KAS decryption orchestration.
//!
//! Candidates are tried strictly in the order the selector produced, one at a
//! time. Sequential attempts bound trust-boundary crossings and avoid
//! broadcasting a key request to every federation KAS at once, at the cost of
//! worst-case latency. Every candidate leaves a trace entry; the caller never
//! receives a partial outcome.

use crate::application::kao_factory::ZtdfEnvelope;
use crate::application::kao_selector::ScoredKao;
use crate::domain::decryption::{
    AttemptOutcome, AttemptRecord, DecryptionRequest, DecryptionResult,
};
use crate::infrastructure::circuit_breaker::CircuitBreakerRegistry;
use crate::infrastructure::kas_client::{KasClientError, KeyReleaseClient, KeyReleaseRequest};
use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct DecryptorConfig {
    /// Bound on each remote key-release call. A timeout is bookkept
    /// identically to a denial.
    pub release_timeout: Duration,
}

impl Default for DecryptorConfig {
    fn default() -> Self {
        Self {
            release_timeout: Duration::from_secs(10),
        }
    }
}

/// Candidate-local failure while turning a released key into plaintext.
/// Never aborts the whole operation: a different KAO may wrap the same
/// content key correctly.
#[derive(Debug, Error)]
enum OpenError {
    #[error("released key is not a valid content key")]
    BadKey,
    #[error("policy binding mismatch")]
    BindingMismatch,
    #[error("payload authentication failed")]
    AeadFailure,
    #[error("malformed payload encoding")]
    Encoding,
}

pub struct MultiKasDecryptor {
    client: Arc<dyn KeyReleaseClient>,
    breakers: Arc<CircuitBreakerRegistry>,
    config: DecryptorConfig,
}

impl MultiKasDecryptor {
    pub fn new(client: Arc<dyn KeyReleaseClient>, breakers: Arc<CircuitBreakerRegistry>) -> Self {
        Self::with_config(client, breakers, DecryptorConfig::default())
    }

    pub fn with_config(
        client: Arc<dyn KeyReleaseClient>,
        breakers: Arc<CircuitBreakerRegistry>,
        config: DecryptorConfig,
    ) -> Self {
        Self {
            client,
            breakers,
            config,
        }
    }

    /// Try each candidate in order until one yields an authenticated
    /// plaintext. Breaker-gated endpoints are skipped without a network call.
    pub async fn decrypt(
        &self,
        envelope: &ZtdfEnvelope,
        candidates: &[ScoredKao],
        request: &DecryptionRequest,
    ) -> DecryptionResult {
        if candidates.is_empty() {
            info!(
                resource_id = %request.resource_id,
                "no eligible key access object for requester"
            );
            return DecryptionResult::not_authorized();
        }

        let mut attempts: Vec<AttemptRecord> = Vec::new();

        for (position, candidate) in candidates.iter().enumerate() {
            let kao = &candidate.kao;

            if !self.breakers.try_acquire(&kao.kas_id) {
                debug!(
                    kao_id = %kao.kao_id,
                    kas_id = %kao.kas_id,
                    "skipping candidate, circuit breaker open"
                );
                self.record(&mut attempts, kao, 0, AttemptOutcome::Skipped);
                continue;
            }

            let release_request = KeyReleaseRequest {
                resource_id: envelope.resource_id.clone(),
                kao_id: kao.kao_id.clone(),
                wrapped_key: kao.wrapped_key.clone(),
                bearer_token: request.bearer_token.clone(),
                request_id: Uuid::new_v4().to_string(),
                timestamp: Utc::now(),
            };

            let started = Instant::now();
            let release = timeout(
                self.config.release_timeout,
                self.client
                    .release_key(&kao.kas_id, &kao.kas_url, &release_request),
            )
            .await;
            let latency_ms = started.elapsed().as_millis() as u64;

            match release {
                Err(_) => {
                    warn!(kao_id = %kao.kao_id, kas_id = %kao.kas_id, latency_ms, "key release timed out");
                    self.breakers.record_failure(&kao.kas_id);
                    self.record(&mut attempts, kao, latency_ms, AttemptOutcome::Timeout);
                }
                Ok(Err(KasClientError::Denied(reason))) => {
                    info!(
                        kao_id = %kao.kao_id,
                        kas_id = %kao.kas_id,
                        latency_ms,
                        reason = %reason,
                        "key release denied"
                    );
                    // Denials count against the breaker the same as transient
                    // failures.
                    self.breakers.record_failure(&kao.kas_id);
                    self.record(&mut attempts, kao, latency_ms, AttemptOutcome::Denied);
                }
                Ok(Err(e)) => {
                    warn!(
                        kao_id = %kao.kao_id,
                        kas_id = %kao.kas_id,
                        latency_ms,
                        error = %e,
                        "key release failed"
                    );
                    self.breakers.record_failure(&kao.kas_id);
                    self.record(&mut attempts, kao, latency_ms, AttemptOutcome::Unreachable);
                }
                Ok(Ok(dek_b64)) => match self.open_payload(envelope, &dek_b64) {
                    Ok(plaintext) => {
                        self.breakers.record_success(&kao.kas_id);
                        self.record(&mut attempts, kao, latency_ms, AttemptOutcome::Success);
                        info!(
                            resource_id = %request.resource_id,
                            kao_id = %kao.kao_id,
                            kas_id = %kao.kas_id,
                            position,
                            "decryption succeeded"
                        );
                        return DecryptionResult::succeeded(
                            plaintext,
                            kao.kao_id.clone(),
                            kao.kas_id.clone(),
                            position,
                            attempts,
                        );
                    }
                    Err(e) => {
                        warn!(
                            kao_id = %kao.kao_id,
                            kas_id = %kao.kas_id,
                            error = %e,
                            "released key failed local authentication"
                        );
                        // Says nothing about KAS health; give the probe slot
                        // back without an outcome.
                        self.breakers.release(&kao.kas_id);
                        self.record(
                            &mut attempts,
                            kao,
                            latency_ms,
                            AttemptOutcome::IntegrityFailure,
                        );
                    }
                },
            }
        }

        warn!(
            resource_id = %request.resource_id,
            attempted = attempts.len(),
            "decryption exhausted all candidates"
        );
        DecryptionResult::exhausted(attempts)
    }

    fn record(
        &self,
        attempts: &mut Vec<AttemptRecord>,
        kao: &crate::domain::kao::KeyAccessObject,
        latency_ms: u64,
        outcome: AttemptOutcome,
    ) {
        metrics::counter!(
            "ztdf_key_release_attempts_total",
            "outcome" => outcome.as_str()
        )
        .increment(1);
        attempts.push(AttemptRecord {
            kao_id: kao.kao_id.clone(),
            kas_id: kao.kas_id.clone(),
            latency_ms,
            outcome,
        });
    }

    /// Verify the policy binding with the released key, then perform the
    /// authenticated decryption using the IV and tag recorded in the payload.
    fn open_payload(&self, envelope: &ZtdfEnvelope, dek_b64: &str) -> Result<Vec<u8>, OpenError> {
        let dek = STANDARD.decode(dek_b64).map_err(|_| OpenError::BadKey)?;
        if dek.len() != 32 {
            return Err(OpenError::BadKey);
        }

        // The label must still be the one the key was bound to at seal time.
        if !envelope
            .label
            .verify_binding(&dek, &envelope.policy_binding_hash)
        {
            return Err(OpenError::BindingMismatch);
        }

        let iv = STANDARD.decode(&envelope.iv).map_err(|_| OpenError::Encoding)?;
        let mut sealed = STANDARD
            .decode(&envelope.ciphertext)
            .map_err(|_| OpenError::Encoding)?;
        let tag = STANDARD
            .decode(&envelope.auth_tag)
            .map_err(|_| OpenError::Encoding)?;
        if iv.len() != 12 {
            return Err(OpenError::Encoding);
        }
        sealed.extend_from_slice(&tag);

        let cipher = Aes256Gcm::new_from_slice(&dek).map_err(|_| OpenError::BadKey)?;
        cipher
            .decrypt(Nonce::from_slice(&iv), sealed.as_slice())
            .map_err(|_| OpenError::AeadFailure)
    }
}
