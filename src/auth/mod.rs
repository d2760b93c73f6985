// Authentication Module
// Session tokens, the refresh cookie, LINE Login, and the request gates

pub mod config;
pub mod cookies;
pub mod error;
pub mod manager;
pub mod middleware;
pub mod pkce;
pub mod providers;
pub mod routes;
pub mod state_store;
pub mod token;

pub use config::{AuthConfig, LineConfig};
pub use cookies::{REFRESH_COOKIE_NAME, SessionCookieManager};
pub use error::{AuthError, AuthRejection, UNAUTHORIZED_MESSAGE, unauthorized_response};
pub use manager::{AuthManager, AuthManagerDeps, IssuedSession};
pub use middleware::{
    AuthenticatedUser, RequestContext, RotatedAccessToken, authorize, authorize_refresh,
    require_access_token, require_refresh_cookie,
};
pub use providers::line::{LineIdTokenClaims, LineOAuthFlow, TokenExchange};
pub use providers::{HttpKeySet, KeySetSource, ProviderTokens, StaticKeySet};
pub use routes::create_auth_router;
pub use state_store::{EphemeralStateStore, MemoryStateStore, RedisStateStore};
pub use token::{SessionClaims, TokenClaims, TokenService};
