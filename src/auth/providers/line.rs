/// LINE Login OAuth2/OIDC Provider Implementation
///
/// Authorization Code flow with PKCE for a public client. The handshake
/// (`nonce`, `code_verifier`) is parked in the ephemeral state store under
/// `UserLineLogin:<state>` until the callback arrives. The token request never
/// carries the channel secret, so LINE signs the ID token with its asymmetric
/// keys and the token is verified against the published JWKS.
use super::{KeySetSource, ProviderTokens};
use crate::auth::config::LineConfig;
use crate::auth::error::AuthError;
use crate::auth::pkce::{PkcePair, generate_nonce, generate_state};
use crate::auth::state_store::EphemeralStateStore;
use jsonwebtoken::jwk::AlgorithmParameters;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

/// Key namespace for pending LINE handshakes
pub const LINE_STATE_NAMESPACE: &str = "UserLineLogin";

/// How long a login URL stays redeemable
pub const HANDSHAKE_TTL_SECONDS: u64 = 600;

const ID_TOKEN_LEEWAY_SECONDS: u64 = 30;

const ALLOWED_ID_TOKEN_ALGORITHMS: [Algorithm; 2] = [Algorithm::RS256, Algorithm::ES256];

/// What the callback needs to finish the handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeState {
    pub nonce: String,
    pub code_verifier: String,
}

/// A prepared token request plus the nonce the ID token must carry
#[derive(Debug, Clone)]
pub struct TokenExchange {
    pub endpoint: String,
    pub params: Vec<(&'static str, String)>,
    pub nonce: String,
}

#[cfg(test)]
impl TokenExchange {
    fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// LINE ID token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineIdTokenClaims {
    /// Issuer (https://access.line.me)
    pub iss: String,

    /// LINE user ID
    pub sub: String,

    /// Channel ID
    pub aud: String,

    pub exp: i64,

    /// Issued at; a token without it fails to decode
    pub iat: i64,

    pub nonce: Option<String>,

    /// Display name
    pub name: Option<String>,

    pub picture: Option<String>,

    /// Only present when the `email` scope was granted
    pub email: Option<String>,
}

pub fn handshake_key(state: &str) -> String {
    format!("{}:{}", LINE_STATE_NAMESPACE, state)
}

/// LINE Login flow
pub struct LineOAuthFlow {
    config: LineConfig,
    state_store: Arc<dyn EphemeralStateStore>,
    key_set: Arc<dyn KeySetSource>,
    http_client: reqwest::Client,
}

impl LineOAuthFlow {
    pub fn new(
        config: LineConfig,
        state_store: Arc<dyn EphemeralStateStore>,
        key_set: Arc<dyn KeySetSource>,
    ) -> Result<Self, AuthError> {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| AuthError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            state_store,
            key_set,
            http_client,
        })
    }

    pub fn config(&self) -> &LineConfig {
        &self.config
    }

    /// Start a handshake and return the LINE authorization URL
    pub async fn build_login_url(&self) -> Result<String, AuthError> {
        let state = generate_state();
        let nonce = generate_nonce();
        let pkce = PkcePair::generate();

        let handshake = HandshakeState {
            nonce: nonce.clone(),
            code_verifier: pkce.code_verifier,
        };
        self.state_store
            .put(
                &handshake_key(&state),
                serde_json::to_string(&handshake)?,
                HANDSHAKE_TTL_SECONDS,
            )
            .await?;

        let url = url::Url::parse_with_params(
            &self.config.authorize_url,
            &[
                ("response_type", "code"),
                ("client_id", self.config.channel_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("scope", self.config.scope_param().as_str()),
                ("state", state.as_str()),
                ("nonce", nonce.as_str()),
                ("code_challenge", pkce.code_challenge.as_str()),
                ("code_challenge_method", "S256"),
            ],
        )
        .map_err(|e| AuthError::ConfigError(format!("Invalid authorize_url: {}", e)))?;

        debug!(state = %state, "Issued LINE login URL");
        Ok(url.into())
    }

    /// Look up the handshake for `state` and build the token request.
    ///
    /// `None` when the state was never issued or has expired.
    pub async fn prepare_token_exchange(
        &self,
        code: &str,
        state: &str,
    ) -> Result<Option<TokenExchange>, AuthError> {
        let Some(raw) = self.state_store.get(&handshake_key(state)).await? else {
            debug!(state = %state, "No pending LINE handshake for state");
            return Ok(None);
        };

        let handshake: HandshakeState = serde_json::from_str(&raw)?;

        Ok(Some(TokenExchange {
            endpoint: self.config.token_url.clone(),
            params: vec![
                ("grant_type", "authorization_code".to_string()),
                ("code", code.to_string()),
                ("client_id", self.config.channel_id.clone()),
                ("code_verifier", handshake.code_verifier),
                ("redirect_uri", self.config.redirect_uri.clone()),
            ],
            nonce: handshake.nonce,
        }))
    }

    /// POST the prepared request to the token endpoint
    pub async fn exchange_code(&self, exchange: &TokenExchange) -> Result<ProviderTokens, AuthError> {
        let response = self
            .http_client
            .post(&exchange.endpoint)
            .form(&exchange.params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "LINE token endpoint rejected code exchange");
            return Err(AuthError::ProviderError(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }

        Ok(response.json::<ProviderTokens>().await?)
    }

    /// Verify an ID token, reporting why it was refused
    pub async fn check_identity_token(
        &self,
        id_token: &str,
        nonce: &str,
    ) -> Result<LineIdTokenClaims, AuthError> {
        let header = decode_header(id_token).map_err(|e| {
            debug!(error = %e, "Failed to decode ID token header");
            AuthError::InvalidIdToken
        })?;

        if !ALLOWED_ID_TOKEN_ALGORITHMS.contains(&header.alg) {
            debug!(alg = ?header.alg, "ID token signed with a disallowed algorithm");
            return Err(AuthError::InvalidIdToken);
        }

        let kid = header.kid.ok_or_else(|| {
            debug!("ID token missing key ID (kid)");
            AuthError::InvalidIdToken
        })?;

        let keys = self.key_set.key_set().await?;
        let jwk = keys.find(&kid).ok_or_else(|| {
            debug!(kid = %kid, "Key ID not found in JWKS");
            AuthError::InvalidIdToken
        })?;

        let key_fits_algorithm = matches!(
            (&jwk.algorithm, header.alg),
            (AlgorithmParameters::RSA(_), Algorithm::RS256)
                | (AlgorithmParameters::EllipticCurve(_), Algorithm::ES256)
        );
        if !key_fits_algorithm {
            debug!(kid = %kid, alg = ?header.alg, "ID token algorithm does not fit the key type");
            return Err(AuthError::InvalidIdToken);
        }

        let decoding_key = DecodingKey::from_jwk(jwk).map_err(|e| {
            debug!(error = %e, "Failed to create decoding key");
            AuthError::InvalidIdToken
        })?;

        let mut validation = Validation::new(header.alg);
        validation.set_audience(&[&self.config.channel_id]);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_required_spec_claims(&["exp", "iat", "aud", "iss"]);
        validation.leeway = ID_TOKEN_LEEWAY_SECONDS;

        let claims = decode::<LineIdTokenClaims>(id_token, &decoding_key, &validation)
            .map_err(|e| {
                debug!(error = %e, "ID token validation failed");
                AuthError::InvalidIdToken
            })?
            .claims;

        let embedded = claims.nonce.as_deref().unwrap_or_default();
        if !bool::from(embedded.as_bytes().ct_eq(nonce.as_bytes())) || embedded.is_empty() {
            debug!(sub = %claims.sub, "ID token nonce does not match handshake");
            return Err(AuthError::NonceMismatch);
        }

        Ok(claims)
    }

    /// Verified claims, or `None` for any verification failure
    pub async fn verify_identity_token(
        &self,
        id_token: &str,
        nonce: &str,
    ) -> Option<LineIdTokenClaims> {
        self.check_identity_token(id_token, nonce).await.ok()
    }
}
