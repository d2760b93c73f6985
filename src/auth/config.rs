// Authentication Configuration
// Signing secret, token lifetimes, cookie mode, and LINE Login settings

use serde::{Deserialize, Serialize};

use super::error::AuthError;

/// Longest accepted access token lifetime (one day)
pub const MAX_ACCESS_TOKEN_MINUTES: i64 = 24 * 60;

/// Longest accepted refresh token lifetime
pub const MAX_REFRESH_TOKEN_DAYS: i64 = 365;

/// Main authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret for session tokens (minimum 32 characters)
    #[serde(default)]
    pub jwt_secret: String,

    /// Access token lifetime in minutes (default: 15)
    #[serde(default = "default_access_token_minutes")]
    pub access_token_minutes: i64,

    /// Refresh token and cookie lifetime in days (default: 3)
    #[serde(default = "default_refresh_token_days")]
    pub refresh_token_days: i64,

    /// Development mode drops the `Secure` cookie attribute
    #[serde(default = "default_true")]
    pub develop_mode: bool,

    /// Redis URL for handshake state; in-memory when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis_url: Option<String>,
}

impl AuthConfig {
    /// Validate configuration values
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.jwt_secret.is_empty() {
            return Err(AuthError::ConfigError(
                "jwt_secret is not set".to_string(),
            ));
        }

        if self.jwt_secret.len() < 32 {
            return Err(AuthError::InvalidConfig {
                key: "auth.jwt_secret".to_string(),
                reason: "must be at least 32 characters".to_string(),
            });
        }

        if !(1..=MAX_ACCESS_TOKEN_MINUTES).contains(&self.access_token_minutes) {
            return Err(AuthError::InvalidConfig {
                key: "auth.access_token_minutes".to_string(),
                reason: format!("must be between 1 and {}", MAX_ACCESS_TOKEN_MINUTES),
            });
        }

        if !(1..=MAX_REFRESH_TOKEN_DAYS).contains(&self.refresh_token_days) {
            return Err(AuthError::InvalidConfig {
                key: "auth.refresh_token_days".to_string(),
                reason: format!("must be between 1 and {}", MAX_REFRESH_TOKEN_DAYS),
            });
        }

        Ok(())
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(), // Must be set explicitly
            access_token_minutes: default_access_token_minutes(),
            refresh_token_days: default_refresh_token_days(),
            develop_mode: true,
            redis_url: None,
        }
    }
}

/// LINE Login (OAuth2 + OpenID Connect) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineConfig {
    /// LINE Login channel ID, used as `client_id` and expected `aud`
    #[serde(default)]
    pub channel_id: String,

    /// Callback URL registered with the channel
    #[serde(default)]
    pub redirect_uri: String,

    #[serde(default = "default_authorize_url")]
    pub authorize_url: String,

    #[serde(default = "default_token_url")]
    pub token_url: String,

    #[serde(default = "default_jwks_url")]
    pub jwks_url: String,

    /// Expected `iss` of ID tokens
    #[serde(default = "default_issuer")]
    pub issuer: String,

    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
}

impl LineConfig {
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.channel_id.is_empty() {
            return Err(AuthError::InvalidConfig {
                key: "line.channel_id".to_string(),
                reason: "cannot be empty".to_string(),
            });
        }

        for (key, value) in [
            ("line.redirect_uri", &self.redirect_uri),
            ("line.authorize_url", &self.authorize_url),
            ("line.token_url", &self.token_url),
            ("line.jwks_url", &self.jwks_url),
        ] {
            let parsed = url::Url::parse(value).map_err(|e| AuthError::InvalidConfig {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(AuthError::InvalidConfig {
                    key: key.to_string(),
                    reason: "must start with http:// or https://".to_string(),
                });
            }
        }

        if !self.scopes.iter().any(|s| s == "openid") {
            return Err(AuthError::InvalidConfig {
                key: "line.scopes".to_string(),
                reason: "must include openid".to_string(),
            });
        }

        Ok(())
    }

    /// Space-separated scope parameter
    pub fn scope_param(&self) -> String {
        self.scopes.join(" ")
    }
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            channel_id: String::new(),
            redirect_uri: String::new(),
            authorize_url: default_authorize_url(),
            token_url: default_token_url(),
            jwks_url: default_jwks_url(),
            issuer: default_issuer(),
            scopes: default_scopes(),
        }
    }
}

// Default value functions
fn default_access_token_minutes() -> i64 {
    15
}

fn default_refresh_token_days() -> i64 {
    3
}

fn default_true() -> bool {
    true
}

fn default_authorize_url() -> String {
    "https://access.line.me/oauth2/v2.1/authorize".to_string()
}

fn default_token_url() -> String {
    "https://api.line.me/oauth2/v2.1/token".to_string()
}

fn default_jwks_url() -> String {
    "https://api.line.me/oauth2/v2.1/certs".to_string()
}

fn default_issuer() -> String {
    "https://access.line.me".to_string()
}

fn default_scopes() -> Vec<String> {
    vec![
        "profile".to_string(),
        "openid".to_string(),
        "email".to_string(),
    ]
}
