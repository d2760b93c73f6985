/// Mock LINE token endpoint
///
/// Records every form posted to `/oauth2/v2.1/token` and answers with the
/// token response queued by the test.
use axum::{Form, Json, Router, extract::State, http::StatusCode, routing::post};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{Mutex, oneshot};

#[derive(Default)]
struct MockState {
    requests: Vec<HashMap<String, String>>,
    id_token: Option<String>,
    fail: bool,
}

pub struct MockLineServer {
    pub port: u16,
    state: Arc<Mutex<MockState>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockLineServer {
    /// Start a new mock server on a random available port
    pub async fn start() -> anyhow::Result<Self> {
        let state = Arc::new(Mutex::new(MockState::default()));

        let app = Router::new()
            .route("/oauth2/v2.1/token", post(handle_token))
            .with_state(state.clone());

        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let port = listener.local_addr()?.port();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("mock LINE server failed");
        });

        Ok(Self {
            port,
            state,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    pub fn token_url(&self) -> String {
        format!("http://127.0.0.1:{}/oauth2/v2.1/token", self.port)
    }

    /// ID token returned by the next exchange
    pub async fn respond_with_id_token(&self, id_token: String) {
        self.state.lock().await.id_token = Some(id_token);
    }

    /// Make the endpoint answer `400 invalid_grant`
    pub async fn fail_exchanges(&self) {
        self.state.lock().await.fail = true;
    }

    pub async fn requests(&self) -> Vec<HashMap<String, String>> {
        self.state.lock().await.requests.clone()
    }
}

impl Drop for MockLineServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn handle_token(
    State(state): State<Arc<Mutex<MockState>>>,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    let mut state = state.lock().await;
    state.requests.push(form);

    if state.fail {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid_grant", "error_description": "code expired" })),
        );
    }

    (
        StatusCode::OK,
        Json(json!({
            "access_token": "line-access-token",
            "expires_in": 2592000,
            "id_token": state.id_token.clone(),
            "refresh_token": "line-refresh-token",
            "scope": "profile openid email",
            "token_type": "Bearer",
        })),
    )
}
