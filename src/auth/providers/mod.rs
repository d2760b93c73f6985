/// Identity provider integrations
///
/// Token-endpoint response types and the key-set seam used to verify
/// provider-issued ID tokens. LINE Login is the only provider.
use crate::auth::error::AuthError;
use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub mod line;

/// OAuth2 token response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderTokens {
    /// Access token for provider API requests
    pub access_token: String,

    /// Token type (usually "Bearer")
    pub token_type: String,

    /// Token expiration time in seconds
    pub expires_in: Option<u64>,

    pub refresh_token: Option<String>,

    /// ID token (OpenID Connect)
    pub id_token: Option<String>,

    /// OAuth2 scopes granted
    pub scope: Option<String>,
}

/// Source of the provider's signing keys
#[async_trait]
pub trait KeySetSource: Send + Sync {
    async fn key_set(&self) -> Result<JwkSet, AuthError>;
}

/// Fetches the JWKS document on every verification
pub struct HttpKeySet {
    url: String,
    http_client: reqwest::Client,
}

impl HttpKeySet {
    pub fn new(url: impl Into<String>) -> Result<Self, AuthError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AuthError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            url: url.into(),
            http_client,
        })
    }
}

#[async_trait]
impl KeySetSource for HttpKeySet {
    async fn key_set(&self) -> Result<JwkSet, AuthError> {
        debug!(url = %self.url, "Fetching provider JWKS");

        let response = self.http_client.get(&self.url).send().await?;
        if !response.status().is_success() {
            return Err(AuthError::ProviderError(format!(
                "JWKS endpoint returned {}",
                response.status()
            )));
        }

        Ok(response.json::<JwkSet>().await?)
    }
}

/// Fixed key set, parsed once
#[derive(Debug, Clone)]
pub struct StaticKeySet {
    keys: JwkSet,
}

impl StaticKeySet {
    pub fn new(keys: JwkSet) -> Self {
        Self { keys }
    }

    pub fn from_json(json: &str) -> Result<Self, AuthError> {
        Ok(Self::new(serde_json::from_str(json)?))
    }
}

#[async_trait]
impl KeySetSource for StaticKeySet {
    async fn key_set(&self) -> Result<JwkSet, AuthError> {
        Ok(self.keys.clone())
    }
}
