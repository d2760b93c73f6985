/// Authentication Routes
///
/// HTTP handlers for password login, the LINE Login round trip, access-token
/// refresh, logout, and the current-user lookup. Mounted under `/app/auth`.
use crate::auth::{
    AuthError, AuthManager, AuthenticatedUser, IssuedSession, RequestContext, RotatedAccessToken,
    TokenClaims, require_access_token, require_refresh_cookie,
};
use axum::{
    Json, Router,
    extract::{Query, State},
    middleware,
    routing::{get, post},
};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Password login body
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// LINE callback parameters
#[derive(Debug, Deserialize)]
pub struct LineCallbackParams {
    /// Authorization code from LINE
    code: Option<String>,

    /// CSRF state token
    state: Option<String>,

    /// Error from LINE (user cancelled, etc.)
    error: Option<String>,

    error_description: Option<String>,
}

/// Access token handed to the client; the refresh token only travels in the cookie
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub success: bool,
    pub token: String,
    pub token_type: String,
}

impl TokenResponse {
    fn bearer(token: String) -> Self {
        Self {
            success: true,
            token,
            token_type: "bearer".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginUrlResponse {
    pub success: bool,
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MeResponse {
    pub success: bool,
    pub user: TokenClaims,
}

fn session_response(
    auth_manager: &AuthManager,
    jar: CookieJar,
    session: IssuedSession,
) -> (CookieJar, Json<TokenResponse>) {
    let jar = auth_manager.cookies().set_refresh_cookie(
        jar,
        &session.refresh_token,
        auth_manager.tokens().refresh_days(),
    );
    (jar, Json(TokenResponse::bearer(session.access_token)))
}

/// POST /login - e-mail and password
async fn login(
    State(auth_manager): State<Arc<AuthManager>>,
    context: RequestContext,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> Result<(CookieJar, Json<TokenResponse>), AuthError> {
    let session = auth_manager
        .login_with_password(&body.email, &body.password, &context)
        .await?;

    Ok(session_response(&auth_manager, jar, session))
}

/// GET /line/login-url - start a LINE Login handshake
async fn line_login_url(
    State(auth_manager): State<Arc<AuthManager>>,
) -> Result<Json<LoginUrlResponse>, AuthError> {
    let url = auth_manager.line().build_login_url().await?;
    Ok(Json(LoginUrlResponse { success: true, url }))
}

/// GET /line/callback - LINE redirects here with `code` and `state`
async fn line_callback(
    State(auth_manager): State<Arc<AuthManager>>,
    context: RequestContext,
    jar: CookieJar,
    Query(params): Query<LineCallbackParams>,
) -> Result<(CookieJar, Json<TokenResponse>), AuthError> {
    if let Some(error) = params.error {
        let reason = params.error_description.unwrap_or(error);
        info!(reason = %reason, "LINE login cancelled or refused");
        return Err(AuthError::ProviderRejected(reason));
    }

    let code = params
        .code
        .ok_or_else(|| AuthError::InvalidCallback("missing code".to_string()))?;
    let state = params
        .state
        .ok_or_else(|| AuthError::InvalidCallback("missing state".to_string()))?;

    let session = auth_manager
        .complete_line_login(&code, &state, &context)
        .await?;

    Ok(session_response(&auth_manager, jar, session))
}

/// POST /refresh - new access token minted by the refresh gate
async fn refresh(RotatedAccessToken(token): RotatedAccessToken) -> Json<TokenResponse> {
    debug!("Issued rotated access token");
    Json(TokenResponse::bearer(token))
}

/// POST /logout - drop the refresh cookie; issued access tokens stay valid until they expire
async fn logout(
    State(auth_manager): State<Arc<AuthManager>>,
    jar: CookieJar,
) -> (CookieJar, Json<MessageResponse>) {
    let jar = auth_manager.cookies().clear_refresh_cookie(jar);
    (
        jar,
        Json(MessageResponse {
            success: true,
            message: "logged out".to_string(),
        }),
    )
}

/// GET /me - verified claims of the caller
async fn me(AuthenticatedUser(claims): AuthenticatedUser) -> Json<MeResponse> {
    Json(MeResponse {
        success: true,
        user: claims,
    })
}

/// Create authentication router
pub fn create_auth_router(auth_manager: Arc<AuthManager>) -> Router {
    let protected = Router::new()
        .route("/me", get(me))
        .route_layer(middleware::from_fn_with_state(
            auth_manager.clone(),
            require_access_token,
        ));

    let refreshing = Router::new()
        .route("/refresh", post(refresh))
        .route_layer(middleware::from_fn_with_state(
            auth_manager.clone(),
            require_refresh_cookie,
        ));

    Router::new()
        .route("/login", post(login))
        .route("/line/login-url", get(line_login_url))
        .route("/line/callback", get(line_callback))
        .route("/logout", post(logout))
        .merge(protected)
        .merge(refreshing)
        .with_state(auth_manager)
}
