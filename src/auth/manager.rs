/// Authentication Manager
///
/// Central orchestrator for login operations, coordinating the token service,
/// the LINE flow, the user directory, and the audit reporter.
use crate::auth::providers::KeySetSource;
use crate::auth::providers::line::{LineIdTokenClaims, LineOAuthFlow};
use crate::auth::{
    AuthConfig, AuthError, EphemeralStateStore, LineConfig, RequestContext, SessionClaims,
    SessionCookieManager, TokenService,
};
use crate::clock::Clock;
use crate::security::{AuditSink, ErrorReporter, LoginAttempt, LoginMethod};
use crate::user_repository::{PasswordVerifier, UNKNOWN_ACCOUNT_HASH, UserDirectory, UserRecord};
use std::sync::Arc;
use tracing::{debug, info};

/// Collaborators the manager is wired with
pub struct AuthManagerDeps {
    pub state_store: Arc<dyn EphemeralStateStore>,
    pub key_set: Arc<dyn KeySetSource>,
    pub users: Arc<dyn UserDirectory>,
    pub passwords: Arc<dyn PasswordVerifier>,
    pub audit: Arc<dyn AuditSink>,
    pub clock: Arc<dyn Clock>,
}

/// Tokens minted for a successful login
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub access_token: String,
    pub refresh_token: String,
    pub claims: SessionClaims,
}

/// Central authentication manager
pub struct AuthManager {
    tokens: TokenService,
    cookies: SessionCookieManager,
    line: LineOAuthFlow,
    users: Arc<dyn UserDirectory>,
    passwords: Arc<dyn PasswordVerifier>,
    reporter: ErrorReporter,
    clock: Arc<dyn Clock>,
}

impl AuthManager {
    /// Create a new authentication manager
    pub fn new(
        auth_config: &AuthConfig,
        line_config: &LineConfig,
        deps: AuthManagerDeps,
    ) -> Result<Self, AuthError> {
        let tokens = TokenService::from_config(auth_config, deps.clock.clone())?;
        let line = LineOAuthFlow::new(line_config.clone(), deps.state_store, deps.key_set)?;

        Ok(Self {
            tokens,
            cookies: SessionCookieManager::new(auth_config.develop_mode),
            line,
            users: deps.users,
            passwords: deps.passwords,
            reporter: ErrorReporter::new(deps.audit),
            clock: deps.clock,
        })
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn cookies(&self) -> &SessionCookieManager {
        &self.cookies
    }

    pub fn line(&self) -> &LineOAuthFlow {
        &self.line
    }

    pub fn reporter(&self) -> &ErrorReporter {
        &self.reporter
    }

    /// E-mail and password login
    pub async fn login_with_password(
        &self,
        email: &str,
        password: &str,
        context: &RequestContext,
    ) -> Result<IssuedSession, AuthError> {
        let user = self.users.find_by_email(email).await?;

        // Unknown e-mails are checked against a hash no password matches
        let hash = user
            .as_ref()
            .map(|user| user.password_hash.clone())
            .unwrap_or_else(|| UNKNOWN_ACCOUNT_HASH.to_string());
        let passwords = self.passwords.clone();
        let candidate = password.to_string();
        let verified =
            tokio::task::spawn_blocking(move || passwords.verify(&candidate, &hash))
                .await
                .map_err(|e| AuthError::Internal(format!("password check failed: {}", e)))?
                && user.is_some();

        let Some(user) = user.filter(|_| verified) else {
            debug!(email = %email, "Password login rejected");
            self.reporter.record_login(LoginAttempt {
                ip: context.client_ip.clone(),
                email: Some(email.to_string()),
                line_user_name: None,
                line_user_id: None,
                method: LoginMethod::Password,
                success: false,
            });
            return Err(AuthError::InvalidCredentials);
        };

        self.start_session(user, context, LoginMethod::Password).await
    }

    /// Finish a LINE login from the callback's `code` and `state`
    pub async fn complete_line_login(
        &self,
        code: &str,
        state: &str,
        context: &RequestContext,
    ) -> Result<IssuedSession, AuthError> {
        match self.resolve_line_login(code, state).await {
            Ok(user) => self.start_session(user, context, LoginMethod::Line).await,
            Err(e) => {
                debug!(error = %e, "LINE login failed");
                self.reporter.record_login(LoginAttempt {
                    ip: context.client_ip.clone(),
                    email: None,
                    line_user_name: None,
                    line_user_id: None,
                    method: LoginMethod::Line,
                    success: false,
                });
                Err(e)
            }
        }
    }

    async fn resolve_line_login(&self, code: &str, state: &str) -> Result<UserRecord, AuthError> {
        let exchange = self
            .line
            .prepare_token_exchange(code, state)
            .await?
            .ok_or(AuthError::HandshakeExpired)?;

        let provider_tokens = self.line.exchange_code(&exchange).await?;
        let id_token = provider_tokens.id_token.ok_or_else(|| {
            AuthError::ProviderError("token response carried no id_token".to_string())
        })?;

        let claims = self
            .line
            .check_identity_token(&id_token, &exchange.nonce)
            .await?;

        self.find_line_user(&claims).await
    }

    /// The account bound to this LINE user, binding it by e-mail on first login
    async fn find_line_user(&self, claims: &LineIdTokenClaims) -> Result<UserRecord, AuthError> {
        if let Some(user) = self.users.find_by_line_user_id(&claims.sub).await? {
            return Ok(user);
        }

        let Some(email) = claims.email.as_deref() else {
            return Err(AuthError::AccountNotLinked);
        };

        if self.users.find_by_email(email).await?.is_none() {
            return Err(AuthError::AccountNotLinked);
        }

        Ok(self
            .users
            .bind_line_account(email, &claims.sub, claims.name.clone())
            .await?)
    }

    async fn start_session(
        &self,
        user: UserRecord,
        context: &RequestContext,
        method: LoginMethod,
    ) -> Result<IssuedSession, AuthError> {
        self.users.record_login(&user.email, self.clock.now()).await?;

        let claims = user.session_claims();
        let access_token = self.tokens.issue_access(&claims)?;
        let refresh_token = self
            .tokens
            .issue_refresh(&claims, self.tokens.refresh_days())?;

        self.reporter.record_login(LoginAttempt {
            ip: context.client_ip.clone(),
            email: Some(user.email.clone()),
            line_user_name: user.line_user_name.clone(),
            line_user_id: user.line_user_id.clone(),
            method,
            success: true,
        });

        info!(username = %user.username, method = ?method, "User logged in");

        Ok(IssuedSession {
            access_token,
            refresh_token,
            claims,
        })
    }
}
