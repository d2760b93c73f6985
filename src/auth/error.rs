// Authentication Error Types
// Token, OAuth2 handshake, and configuration failures

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use super::middleware::RequestContext;

/// Body returned for every authorization failure, whatever the cause
pub const UNAUTHORIZED_MESSAGE: &str = "authentication failed, please log in again";

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    // Session token errors (all collapse to the same 401)
    #[error("Missing credential")]
    MissingCredential,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Access and refresh token claims do not match")]
    ClaimMismatch,

    #[error("Invalid email or password")]
    InvalidCredentials,

    // OAuth2 handshake errors (no session exists yet, reported as 400)
    #[error("Authorization expired or was never issued, request a new login URL")]
    HandshakeExpired,

    #[error("ID token nonce does not match the login request")]
    NonceMismatch,

    #[error("ID token verification failed")]
    InvalidIdToken,

    #[error("Invalid callback: {0}")]
    InvalidCallback(String),

    #[error("LINE login was rejected: {0}")]
    ProviderRejected(String),

    #[error("OAuth2 provider error: {0}")]
    ProviderError(String),

    #[error("No account is linked to this LINE user")]
    AccountNotLinked,

    // Network/HTTP errors
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Provider communication timeout")]
    Timeout,

    #[error("JSON parsing error: {0}")]
    JsonError(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid configuration value for {key}: {reason}")]
    InvalidConfig { key: String, reason: String },

    // Infrastructure errors
    #[error("State store error: {0}")]
    StateStore(String),

    #[error("User directory error: {0}")]
    UserDirectory(String),

    #[error("Internal authentication error: {0}")]
    Internal(String),
}

// Conversion from reqwest errors
impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AuthError::Timeout
        } else {
            AuthError::HttpError(err.to_string())
        }
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        AuthError::JsonError(err.to_string())
    }
}

impl From<redis::RedisError> for AuthError {
    fn from(err: redis::RedisError) -> Self {
        AuthError::StateStore(err.to_string())
    }
}

impl From<crate::user_repository::UserRepositoryError> for AuthError {
    fn from(err: crate::user_repository::UserRepositoryError) -> Self {
        AuthError::UserDirectory(err.to_string())
    }
}

// HTTP status code mapping for error responses
impl AuthError {
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::MissingCredential
            | AuthError::InvalidToken
            | AuthError::ClaimMismatch
            | AuthError::InvalidCredentials => 401,

            AuthError::ConfigError(_)
            | AuthError::InvalidConfig { .. }
            | AuthError::StateStore(_)
            | AuthError::UserDirectory(_)
            | AuthError::Internal(_) => 500,

            _ => 400,
        }
    }

    /// True for the errors that must be answered with the uniform 401 body
    pub fn is_authorization_failure(&self) -> bool {
        self.status_code() == 401
    }
}

/// The uniform 401 response
pub fn unauthorized_response() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "success": false, "message": UNAUTHORIZED_MESSAGE })),
    )
        .into_response()
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if self.is_authorization_failure() {
            return unauthorized_response();
        }

        let status = StatusCode::from_u16(self.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let message = if status.is_server_error() {
            tracing::error!(error = %self, "Authentication internal error");
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(json!({ "success": false, "message": message }))).into_response()
    }
}

/// A gate rejection: the reason plus the request context kept for auditing.
///
/// Only `ErrorReporter` turns this into a response.
#[derive(Debug, Clone)]
pub struct AuthRejection {
    pub error: AuthError,
    pub context: RequestContext,
}

impl AuthRejection {
    pub fn new(error: AuthError, context: RequestContext) -> Self {
        Self { error, context }
    }
}
