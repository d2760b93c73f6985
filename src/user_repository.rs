use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier as _};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::auth::SessionClaims;

/// Defines the types of user repository errors that can occur
#[derive(Debug, thiserror::Error)]
pub enum UserRepositoryError {
    #[error("User not found: {0}")]
    UserNotFound(String),
    #[error("LINE account already bound to another user: {0}")]
    LineAccountTaken(String),
    #[error("Invalid data format: {0}")]
    InvalidData(String),
    #[error("Password hashing failed: {0}")]
    Hashing(String),
}

/// Account record as kept by the user store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    pub email: String,
    /// PHC-format password hash
    pub password_hash: String,
    /// Set once a LINE account is bound
    pub is_active: bool,
    pub line_user_name: Option<String>,
    pub line_user_id: Option<String>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl UserRecord {
    /// A fresh e-mail account, not yet bound to LINE
    pub fn new(username: impl Into<String>, email: impl Into<String>, password_hash: String) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password_hash,
            is_active: false,
            line_user_name: None,
            line_user_id: None,
            last_login_at: None,
        }
    }

    /// The claim set embedded in this user's session tokens
    pub fn session_claims(&self) -> SessionClaims {
        SessionClaims {
            username: self.username.clone(),
            email: self.email.clone(),
            line_user_name: self.line_user_name.clone(),
            line_user_id: self.line_user_id.clone(),
            is_active: self.is_active,
        }
    }
}

/// Account lookups needed by the login flows
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, UserRepositoryError>;

    async fn find_by_line_user_id(
        &self,
        line_user_id: &str,
    ) -> Result<Option<UserRecord>, UserRepositoryError>;

    /// Attach a LINE identity to the account registered under `email`
    async fn bind_line_account(
        &self,
        email: &str,
        line_user_id: &str,
        line_user_name: Option<String>,
    ) -> Result<UserRecord, UserRepositoryError>;

    /// Update the last-login timestamp
    async fn record_login(&self, email: &str, at: DateTime<Utc>) -> Result<(), UserRepositoryError>;
}

/// In-memory user store keyed by e-mail
#[derive(Default)]
pub struct MemoryUserDirectory {
    users: RwLock<HashMap<String, UserRecord>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, user: UserRecord) {
        debug!("Storing user {}", user.email);
        self.users.write().await.insert(user.email.clone(), user);
    }

    pub async fn get(&self, email: &str) -> Option<UserRecord> {
        self.users.read().await.get(email).cloned()
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, UserRepositoryError> {
        Ok(self.get(email).await)
    }

    async fn find_by_line_user_id(
        &self,
        line_user_id: &str,
    ) -> Result<Option<UserRecord>, UserRepositoryError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| u.line_user_id.as_deref() == Some(line_user_id))
            .cloned())
    }

    async fn bind_line_account(
        &self,
        email: &str,
        line_user_id: &str,
        line_user_name: Option<String>,
    ) -> Result<UserRecord, UserRepositoryError> {
        let mut users = self.users.write().await;

        if users
            .values()
            .any(|u| u.email != email && u.line_user_id.as_deref() == Some(line_user_id))
        {
            return Err(UserRepositoryError::LineAccountTaken(line_user_id.to_string()));
        }

        let user = users
            .get_mut(email)
            .ok_or_else(|| UserRepositoryError::UserNotFound(email.to_string()))?;

        user.line_user_id = Some(line_user_id.to_string());
        user.line_user_name = line_user_name;
        user.is_active = true;

        info!("Bound LINE account to user {}", user.username);
        Ok(user.clone())
    }

    async fn record_login(&self, email: &str, at: DateTime<Utc>) -> Result<(), UserRepositoryError> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(email)
            .ok_or_else(|| UserRepositoryError::UserNotFound(email.to_string()))?;

        user.last_login_at = Some(at);
        Ok(())
    }
}

/// Well-formed Argon2id hash that no password matches, verified against when an
/// e-mail has no account.
pub const UNKNOWN_ACCOUNT_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$c29tZXNhbHRzb21lc2FsdA$AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

/// Opaque password hashing capability
#[cfg_attr(test, mockall::automock)]
pub trait PasswordVerifier: Send + Sync {
    fn hash(&self, password: &str) -> Result<String, UserRepositoryError>;

    fn verify(&self, password: &str, password_hash: &str) -> bool;
}

/// Argon2id with the crate's default parameters
#[derive(Debug, Default, Clone)]
pub struct Argon2Passwords;

impl PasswordVerifier for Argon2Passwords {
    fn hash(&self, password: &str) -> Result<String, UserRepositoryError> {
        let salt_bytes: [u8; 16] = rand::random();
        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(|e| UserRepositoryError::Hashing(e.to_string()))?;

        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| UserRepositoryError::Hashing(e.to_string()))
    }

    fn verify(&self, password: &str, password_hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(password_hash) else {
            debug!("Stored password hash is not in PHC format");
            return false;
        };

        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }
}
