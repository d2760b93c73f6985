/// Authentication Middleware
///
/// Request-boundary gates for protected routes. Each request moves through
/// `Unauthenticated -> Authenticating -> {Admitted, Rejected}`: the gate pulls
/// the credential out of the request, verifies it with the `TokenService`,
/// and either injects the verified result into the request extensions
/// (admitted) or short-circuits with an `AuthRejection` that the
/// `ErrorReporter` turns into the uniform 401.
use crate::auth::{AuthError, AuthManager, AuthRejection, SessionCookieManager, TokenClaims, TokenService};
use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{HeaderMap, header, request::Parts},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

/// Who sent the request, kept for audit records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub client_ip: String,
    pub user_agent: String,

    /// Raw credential as presented; audit only, never echoed to the client
    pub credential: Option<String>,
}

impl RequestContext {
    pub fn from_headers(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        Self {
            client_ip: extract_client_ip(headers, peer),
            user_agent: extract_user_agent(headers),
            credential: headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string()),
        }
    }
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(Self::from_headers(&parts.headers, peer))
    }
}

/// Verified access-token claims of an admitted request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub TokenClaims);

/// Access token minted by the refresh gate for the handler to return
#[derive(Debug, Clone)]
pub struct RotatedAccessToken(pub String);

/// Extract client IP address: first X-Forwarded-For hop, then X-Real-IP,
/// then the socket peer
pub fn extract_client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(ip) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
    {
        return ip.to_string();
    }

    if let Some(ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        return ip.to_string();
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Extract user agent from request
pub fn extract_user_agent(headers: &HeaderMap) -> String {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// Bearer token from the Authorization header
fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::MissingCredential)
}

/// Access gate: admit only a request carrying a valid, unexpired access token
pub fn authorize(
    tokens: &TokenService,
    headers: &HeaderMap,
    context: RequestContext,
) -> Result<TokenClaims, AuthRejection> {
    let token = match extract_bearer_token(headers) {
        Ok(token) => token,
        Err(e) => return Err(AuthRejection::new(e, context)),
    };

    tokens
        .verify(token, true)
        .map_err(|e| AuthRejection::new(e, context))
}

/// Refresh gate: expired access token + live refresh cookie for the same subject
pub fn authorize_refresh(
    tokens: &TokenService,
    headers: &HeaderMap,
    context: RequestContext,
) -> Result<String, AuthRejection> {
    let access = match extract_bearer_token(headers) {
        Ok(token) => token,
        Err(e) => return Err(AuthRejection::new(e, context)),
    };

    let jar = CookieJar::from_headers(headers);
    let Some(refresh) = SessionCookieManager::read_refresh_cookie(&jar) else {
        return Err(AuthRejection::new(AuthError::MissingCredential, context));
    };

    tokens
        .rotate(access, &refresh)
        .map_err(|e| AuthRejection::new(e, context))
}

fn request_context(req: &Request) -> RequestContext {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    RequestContext::from_headers(req.headers(), peer)
}

/// Required authentication middleware - valid access token or uniform 401
pub async fn require_access_token(
    State(auth_manager): State<Arc<AuthManager>>,
    mut req: Request,
    next: Next,
) -> Response {
    let context = request_context(&req);

    match authorize(auth_manager.tokens(), req.headers(), context) {
        Ok(claims) => {
            req.extensions_mut().insert(AuthenticatedUser(claims));
            next.run(req).await
        }
        Err(rejection) => auth_manager.reporter().report(rejection),
    }
}

/// Refresh middleware - mints a new access token or answers the uniform 401
pub async fn require_refresh_cookie(
    State(auth_manager): State<Arc<AuthManager>>,
    mut req: Request,
    next: Next,
) -> Response {
    let context = request_context(&req);

    match authorize_refresh(auth_manager.tokens(), req.headers(), context) {
        Ok(token) => {
            req.extensions_mut().insert(RotatedAccessToken(token));
            next.run(req).await
        }
        Err(rejection) => auth_manager.reporter().report(rejection),
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or(AuthError::MissingCredential)
    }
}

impl<S> FromRequestParts<S> for RotatedAccessToken
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RotatedAccessToken>()
            .cloned()
            .ok_or(AuthError::MissingCredential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SessionClaims;
    use crate::clock::ManualClock;
    use axum::body::Body;
    use axum::http::{HeaderValue, Request};
    use chrono::Duration;

    fn tokens(clock: &ManualClock) -> TokenService {
        TokenService::new(
            "middleware-secret-middleware-secret",
            Duration::minutes(15),
            3,
            Arc::new(clock.clone()),
        )
        .unwrap()
    }

    fn claims(username: &str) -> SessionClaims {
        SessionClaims {
            username: username.to_string(),
            email: format!("{}@example.com", username),
            line_user_name: None,
            line_user_id: None,
            is_active: false,
        }
    }

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        headers
    }

    #[test]
    fn test_extract_client_ip_from_forwarded() {
        let h = headers(&[("x-forwarded-for", "192.168.1.1, 10.0.0.1")]);
        assert_eq!(extract_client_ip(&h, None), "192.168.1.1");
    }

    #[test]
    fn test_extract_client_ip_from_real_ip() {
        let h = headers(&[("x-real-ip", "192.168.1.100")]);
        assert_eq!(extract_client_ip(&h, None), "192.168.1.100");
    }

    #[test]
    fn test_extract_client_ip_from_peer() {
        let peer: SocketAddr = "203.0.113.9:51234".parse().unwrap();
        assert_eq!(extract_client_ip(&HeaderMap::new(), Some(peer)), "203.0.113.9");
        assert_eq!(extract_client_ip(&HeaderMap::new(), None), "unknown");
    }

    #[test]
    fn test_extract_user_agent() {
        let req = Request::builder()
            .header("User-Agent", "Mozilla/5.0 Test Browser")
            .body(Body::empty())
            .unwrap();

        assert_eq!(extract_user_agent(req.headers()), "Mozilla/5.0 Test Browser");
        assert_eq!(extract_user_agent(&HeaderMap::new()), "unknown");
    }

    #[test]
    fn test_authorize_missing_header() {
        let clock = ManualClock::starting_now();
        let h = HeaderMap::new();

        let rejection = authorize(&tokens(&clock), &h, RequestContext::from_headers(&h, None))
            .unwrap_err();
        assert!(matches!(rejection.error, AuthError::MissingCredential));
    }

    #[test]
    fn test_authorize_wrong_scheme() {
        let clock = ManualClock::starting_now();
        let service = tokens(&clock);
        let token = service.issue_access(&claims("alice")).unwrap();
        let h = headers(&[("authorization", &format!("Basic {}", token))]);

        let rejection = authorize(&service, &h, RequestContext::from_headers(&h, None))
            .unwrap_err();
        assert!(matches!(rejection.error, AuthError::MissingCredential));
    }

    #[test]
    fn test_authorize_admits_valid_token() {
        let clock = ManualClock::starting_now();
        let service = tokens(&clock);
        let token = service.issue_access(&claims("alice")).unwrap();
        let h = headers(&[("authorization", &format!("Bearer {}", token))]);

        let admitted = authorize(&service, &h, RequestContext::from_headers(&h, None)).unwrap();
        assert_eq!(admitted.session.username, "alice");
    }

    #[test]
    fn test_rejection_keeps_audit_context() {
        let clock = ManualClock::starting_now();
        let h = headers(&[
            ("authorization", "Bearer forged"),
            ("user-agent", "curl/8.0"),
            ("x-forwarded-for", "198.51.100.7"),
        ]);

        let rejection = authorize(&tokens(&clock), &h, RequestContext::from_headers(&h, None))
            .unwrap_err();
        assert!(matches!(rejection.error, AuthError::InvalidToken));
        assert_eq!(rejection.context.client_ip, "198.51.100.7");
        assert_eq!(rejection.context.user_agent, "curl/8.0");
        assert_eq!(rejection.context.credential.as_deref(), Some("Bearer forged"));
    }

    #[test]
    fn test_refresh_requires_cookie() {
        let clock = ManualClock::starting_now();
        let service = tokens(&clock);
        let access = service.issue_access(&claims("alice")).unwrap();
        let h = headers(&[("authorization", &format!("Bearer {}", access))]);

        let rejection =
            authorize_refresh(&service, &h, RequestContext::from_headers(&h, None)).unwrap_err();
        assert!(matches!(rejection.error, AuthError::MissingCredential));
    }

    #[test]
    fn test_refresh_with_matching_cookie() {
        let clock = ManualClock::starting_now();
        let service = tokens(&clock);
        let access = service.issue_access(&claims("alice")).unwrap();
        let refresh = service.issue_refresh(&claims("alice"), 3).unwrap();
        clock.advance(Duration::hours(1));

        let h = headers(&[
            ("authorization", &format!("Bearer {}", access)),
            ("cookie", &format!("refresh_token={}", refresh)),
        ]);

        let minted =
            authorize_refresh(&service, &h, RequestContext::from_headers(&h, None)).unwrap();
        assert_eq!(service.verify(&minted, true).unwrap().session.username, "alice");
    }

    #[test]
    fn test_refresh_with_foreign_cookie() {
        let clock = ManualClock::starting_now();
        let service = tokens(&clock);
        let access = service.issue_access(&claims("alice")).unwrap();
        let refresh = service.issue_refresh(&claims("mallory"), 3).unwrap();

        let h = headers(&[
            ("authorization", &format!("Bearer {}", access)),
            ("cookie", &format!("refresh_token={}", refresh)),
        ]);

        let rejection =
            authorize_refresh(&service, &h, RequestContext::from_headers(&h, None)).unwrap_err();
        assert!(matches!(rejection.error, AuthError::ClaimMismatch));
    }
}
