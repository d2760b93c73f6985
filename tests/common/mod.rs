#![allow(dead_code)]

pub mod line_mock;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, Response, header};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use moneylog::auth::{AuthConfig, AuthManager, AuthManagerDeps, LineConfig, MemoryStateStore, StaticKeySet};
use moneylog::clock::ManualClock;
use moneylog::config::ServerConfig;
use moneylog::security::{AuditEvent, audit_channel};
use moneylog::user_repository::{Argon2Passwords, MemoryUserDirectory, PasswordVerifier, UserRecord};
use moneylog::build_app;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower::ServiceExt;

pub const JWKS: &str = include_str!("../fixtures/line_test_jwks.json");
pub const KEY_PEM: &[u8] = include_bytes!("../fixtures/line_test_key.pem");
pub const KEY_ID: &str = "test-key-1";

pub const CHANNEL_ID: &str = "1657000000";
pub const JWT_SECRET: &str = "integration-secret-integration-secret";
pub const PASSWORD: &str = "hunter22";

/// Bound to LINE user `U_BOB`
pub const BOB_LINE_ID: &str = "U_BOB";

/// Application wired with in-memory collaborators and a manual clock
pub struct TestApp {
    pub router: Router,
    pub manager: Arc<AuthManager>,
    pub clock: ManualClock,
    pub users: Arc<MemoryUserDirectory>,
    pub audit: mpsc::Receiver<AuditEvent>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_line_token_url(None).await
    }

    /// Point the LINE token endpoint at a mock server
    pub async fn with_line_token_url(token_url: Option<String>) -> Self {
        let clock = ManualClock::starting_now();
        let users = Arc::new(MemoryUserDirectory::new());

        let hash = Argon2Passwords.hash(PASSWORD).expect("hash password");
        users
            .insert(UserRecord::new("alice", "alice@example.com", hash.clone()))
            .await;
        let mut bob = UserRecord::new("bob", "bob@example.com", hash);
        bob.line_user_id = Some(BOB_LINE_ID.to_string());
        bob.line_user_name = Some("Bob".to_string());
        bob.is_active = true;
        users.insert(bob).await;

        let (sink, audit) = audit_channel(64);

        let auth = AuthConfig {
            jwt_secret: JWT_SECRET.to_string(),
            develop_mode: false,
            ..AuthConfig::default()
        };
        let mut line = LineConfig {
            channel_id: CHANNEL_ID.to_string(),
            redirect_uri: "http://localhost:8000/app/auth/line/callback".to_string(),
            ..LineConfig::default()
        };
        if let Some(url) = token_url {
            line.token_url = url;
        }

        let manager = Arc::new(
            AuthManager::new(
                &auth,
                &line,
                AuthManagerDeps {
                    state_store: Arc::new(MemoryStateStore::new(Arc::new(clock.clone()))),
                    key_set: Arc::new(StaticKeySet::from_json(JWKS).expect("parse jwks")),
                    users: users.clone(),
                    passwords: Arc::new(Argon2Passwords),
                    audit: Arc::new(sink),
                    clock: Arc::new(clock.clone()),
                },
            )
            .expect("build auth manager"),
        );

        let router = build_app(manager.clone(), &ServerConfig::default());

        Self {
            router,
            manager,
            clock,
            users,
            audit,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    /// Password login; returns (access token, refresh token)
    pub async fn login(&self, email: &str) -> (String, String) {
        let response = self
            .send(json_post(
                "/app/auth/login",
                serde_json::json!({ "email": email, "password": PASSWORD }),
            ))
            .await;
        assert_eq!(response.status(), 200);

        let refresh = refresh_cookie(&response).expect("refresh cookie set");
        let body = body_json(response).await;
        let access = body["token"].as_str().expect("token in body").to_string();
        (access, cookie_value(&refresh))
    }

    /// Drain whatever the audit queue holds right now
    pub fn audit_events(&mut self) -> Vec<AuditEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.audit.try_recv() {
            events.push(event);
        }
        events
    }
}

pub fn json_post(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

pub fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).expect("request")
}

pub fn get_with_bearer(uri: &str, token: &str) -> Request<Body> {
    Request::get(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .expect("request")
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}

/// The `Set-Cookie` header for the refresh token, if any
pub fn refresh_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("refresh_token="))
        .map(str::to_string)
}

/// Value part of a `Set-Cookie` header
pub fn cookie_value(set_cookie: &str) -> String {
    set_cookie
        .split(';')
        .next()
        .and_then(|pair| pair.split_once('='))
        .map(|(_, value)| value.to_string())
        .unwrap_or_default()
}

/// Sign LINE-style ID token claims with the fixture key
pub fn sign_id_token(claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(KEY_ID.to_string());
    encode(
        &header,
        claims,
        &EncodingKey::from_rsa_pem(KEY_PEM).expect("fixture key"),
    )
    .expect("sign id token")
}
