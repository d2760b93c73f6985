/// Session Token Service
///
/// Issues, verifies, and rotates the HS256 access and refresh tokens. Both
/// token kinds carry the same claim set and differ only in `exp`.
use chrono::Duration;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::config::AuthConfig;
use super::error::AuthError;
use crate::clock::Clock;

/// Subject fields shared by access and refresh tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub username: String,
    pub email: String,
    pub line_user_name: Option<String>,
    pub line_user_id: Option<String>,
    pub is_active: bool,
}

/// Decoded token payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(flatten)]
    pub session: SessionClaims,

    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
    refresh_days: i64,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    /// Create a token service; an empty secret is a startup error
    pub fn new(
        secret: &str,
        access_ttl: Duration,
        refresh_days: i64,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AuthError> {
        if secret.is_empty() {
            return Err(AuthError::ConfigError(
                "jwt_secret is not set".to_string(),
            ));
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl,
            refresh_days,
            clock,
        })
    }

    pub fn from_config(config: &AuthConfig, clock: Arc<dyn Clock>) -> Result<Self, AuthError> {
        let access_ttl = Duration::try_minutes(config.access_token_minutes).ok_or_else(|| {
            AuthError::ConfigError(format!(
                "access_token_minutes out of range: {}",
                config.access_token_minutes
            ))
        })?;

        Self::new(&config.jwt_secret, access_ttl, config.refresh_token_days, clock)
    }

    /// Configured refresh lifetime in days
    pub fn refresh_days(&self) -> i64 {
        self.refresh_days
    }

    pub fn issue_access(&self, claims: &SessionClaims) -> Result<String, AuthError> {
        self.sign(claims, self.access_ttl)
    }

    pub fn issue_refresh(&self, claims: &SessionClaims, days: i64) -> Result<String, AuthError> {
        let ttl = Duration::try_days(days)
            .ok_or_else(|| AuthError::Internal(format!("refresh lifetime out of range: {} days", days)))?;
        self.sign(claims, ttl)
    }

    /// Decode and check the signature; expiry is only checked when `enforce_exp` is set.
    ///
    /// Every failure is reported as `InvalidToken`.
    pub fn verify(&self, token: &str, enforce_exp: bool) -> Result<TokenClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is compared against the injected clock below
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        let claims = decode::<TokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| {
                debug!(error = %e, "Session token rejected");
                AuthError::InvalidToken
            })?
            .claims;

        if enforce_exp && claims.exp <= self.clock.now().timestamp() {
            debug!(exp = claims.exp, "Session token expired");
            return Err(AuthError::InvalidToken);
        }

        Ok(claims)
    }

    /// Mint a new access token from a still-valid refresh token.
    ///
    /// The access token may be expired but must carry the same subject as the
    /// refresh token on every claim except `exp`.
    pub fn rotate(&self, expired_access: &str, refresh: &str) -> Result<String, AuthError> {
        let access = self.verify(expired_access, false)?;
        let refresh = self.verify(refresh, true)?;

        if access.session != refresh.session {
            debug!(
                access_user = %access.session.username,
                refresh_user = %refresh.session.username,
                "Refresh token does not belong to access token subject"
            );
            return Err(AuthError::ClaimMismatch);
        }

        self.issue_access(&refresh.session)
    }

    fn sign(&self, claims: &SessionClaims, ttl: Duration) -> Result<String, AuthError> {
        let expires_at = self
            .clock
            .now()
            .checked_add_signed(ttl)
            .ok_or_else(|| AuthError::Internal("token expiry out of range".to_string()))?;

        let payload = TokenClaims {
            session: claims.clone(),
            exp: expires_at.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &payload, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("failed to sign token: {}", e)))
    }
}
