// KAS Key-Release Client
//
// Anti-Corruption Layer for the federation key-release RPC

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KasClientError {
    /// The KAS explicitly refused to release the key.
    #[error("Key release denied: {0}")]
    Denied(String),
    /// Network-level failure, including non-auth HTTP errors.
    #[error("KAS unreachable: {0}")]
    Unreachable(String),
    #[error("Malformed KAS response: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyReleaseRequest {
    pub resource_id: String,
    pub kao_id: String,
    pub wrapped_key: String,
    pub bearer_token: String,
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyReleaseResponse {
    pub success: bool,
    #[serde(default)]
    pub dek: Option<String>,
    #[serde(default)]
    pub denial_reason: Option<String>,
}

/// Remote key-release boundary. The decryptor owns the per-call timeout;
/// implementations only map transport and protocol outcomes.
#[async_trait]
pub trait KeyReleaseClient: Send + Sync {
    /// Ask the KAS to unwrap the content key. Returns the base64 DEK.
    async fn release_key(
        &self,
        kas_id: &str,
        kas_url: &str,
        request: &KeyReleaseRequest,
    ) -> Result<String, KasClientError>;
}

pub struct HttpKeyReleaseClient {
    client: reqwest::Client,
}

impl HttpKeyReleaseClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpKeyReleaseClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyReleaseClient for HttpKeyReleaseClient {
    async fn release_key(
        &self,
        _kas_id: &str,
        kas_url: &str,
        request: &KeyReleaseRequest,
    ) -> Result<String, KasClientError> {
        let url = format!("{}/v1/key-release", kas_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .bearer_auth(&request.bearer_token)
            .json(request)
            .send()
            .await
            .map_err(|e| KasClientError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(if status == 401 || status == 403 {
                KasClientError::Denied(body)
            } else {
                KasClientError::Unreachable(format!("HTTP {}: {}", status, body))
            });
        }

        let release: KeyReleaseResponse = response
            .json()
            .await
            .map_err(|e| KasClientError::Malformed(e.to_string()))?;

        if release.success {
            release
                .dek
                .ok_or_else(|| KasClientError::Malformed("success response without dek".into()))
        } else {
            Err(KasClientError::Denied(
                release
                    .denial_reason
                    .unwrap_or_else(|| "unspecified".to_string()),
            ))
        }
    }
}
