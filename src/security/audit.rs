use axum::response::Response;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::auth::{AuthRejection, unauthorized_response};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LoginMethod {
    Password,
    Line,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginAttempt {
    pub ip: String,
    pub email: Option<String>,
    pub line_user_name: Option<String>,
    pub line_user_id: Option<String>,
    pub method: LoginMethod,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditRecord {
    AuthorizationFailure {
        ip: String,
        user_agent: String,
        credential: Option<String>,
        reason: String,
    },
    LoginAttempt(LoginAttempt),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub record: AuditRecord,
}

impl AuditEvent {
    pub fn new(record: AuditRecord) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            record,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit queue is full")]
    QueueFull,
    #[error("audit queue is closed")]
    QueueClosed,
}

/// Fire-and-forget destination for audit events. `enqueue` must not block.
#[cfg_attr(test, mockall::automock)]
pub trait AuditSink: Send + Sync {
    fn enqueue(&self, event: AuditEvent) -> Result<(), AuditError>;
}

/// Bounded in-process queue drained by [`spawn_audit_worker`]
#[derive(Clone)]
pub struct ChannelAuditSink {
    sender: mpsc::Sender<AuditEvent>,
}

impl AuditSink for ChannelAuditSink {
    fn enqueue(&self, event: AuditEvent) -> Result<(), AuditError> {
        self.sender.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => AuditError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => AuditError::QueueClosed,
        })
    }
}

pub fn audit_channel(capacity: usize) -> (ChannelAuditSink, mpsc::Receiver<AuditEvent>) {
    let (sender, receiver) = mpsc::channel(capacity);
    (ChannelAuditSink { sender }, receiver)
}

/// Short, stable identifier for a credential that is safe to log
pub fn credential_fingerprint(credential: &str) -> String {
    let digest = Sha256::digest(credential.as_bytes());
    digest[..8].iter().map(|b| format!("{:02x}", b)).collect()
}

/// Log an audit event to the structured logging system
pub fn log_audit_event(event: &AuditEvent) {
    match &event.record {
        AuditRecord::AuthorizationFailure {
            ip,
            user_agent,
            credential,
            reason,
        } => {
            warn!(
                event_id = %event.id,
                timestamp = %event.timestamp,
                ip_address = %ip,
                user_agent = %user_agent,
                credential = ?credential.as_deref().map(credential_fingerprint),
                reason = %reason,
                "Authorization failure"
            );
        }
        AuditRecord::LoginAttempt(attempt) if attempt.success => {
            info!(
                event_id = %event.id,
                timestamp = %event.timestamp,
                ip_address = %attempt.ip,
                email = ?attempt.email,
                line_user_id = ?attempt.line_user_id,
                method = ?attempt.method,
                "Login succeeded"
            );
        }
        AuditRecord::LoginAttempt(attempt) => {
            warn!(
                event_id = %event.id,
                timestamp = %event.timestamp,
                ip_address = %attempt.ip,
                email = ?attempt.email,
                line_user_id = ?attempt.line_user_id,
                method = ?attempt.method,
                "Login failed"
            );
        }
    }
}

/// Drain the audit queue until every sender is dropped
pub fn spawn_audit_worker(mut receiver: mpsc::Receiver<AuditEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            log_audit_event(&event);
        }
        debug!("Audit queue closed, worker exiting");
    })
}

/// Turns gate rejections into the uniform 401 and hands audit records to the sink
#[derive(Clone)]
pub struct ErrorReporter {
    sink: Arc<dyn AuditSink>,
}

impl ErrorReporter {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    pub fn report(&self, rejection: AuthRejection) -> Response {
        debug!(
            reason = %rejection.error,
            ip_address = %rejection.context.client_ip,
            "Request rejected by authentication gate"
        );

        let context = rejection.context;
        self.dispatch(AuditRecord::AuthorizationFailure {
            ip: context.client_ip,
            user_agent: context.user_agent,
            credential: context.credential,
            reason: rejection.error.to_string(),
        });

        unauthorized_response()
    }

    pub fn record_login(&self, attempt: LoginAttempt) {
        self.dispatch(AuditRecord::LoginAttempt(attempt));
    }

    fn dispatch(&self, record: AuditRecord) {
        if let Err(e) = self.sink.enqueue(AuditEvent::new(record)) {
            warn!(error = %e, "Dropped audit record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthError, RequestContext, UNAUTHORIZED_MESSAGE};
    use axum::body::to_bytes;
    use axum::http::StatusCode;

    fn rejection() -> AuthRejection {
        AuthRejection::new(
            AuthError::InvalidToken,
            RequestContext {
                client_ip: "198.51.100.7".to_string(),
                user_agent: "curl/8.0".to_string(),
                credential: Some("Bearer forged".to_string()),
            },
        )
    }

    #[test]
    fn test_login_attempt_serialization() {
        let record = AuditRecord::LoginAttempt(LoginAttempt {
            ip: "127.0.0.1".to_string(),
            email: Some("alice@example.com".to_string()),
            line_user_name: None,
            line_user_id: None,
            method: LoginMethod::Password,
            success: true,
        });

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "login_attempt");
        assert_eq!(json["method"], "password");
        assert_eq!(json["success"], true);
    }

    #[test]
    fn test_credential_fingerprint_is_stable_and_opaque() {
        let a = credential_fingerprint("Bearer secret.token.value");
        assert_eq!(a, credential_fingerprint("Bearer secret.token.value"));
        assert_ne!(a, credential_fingerprint("Bearer other"));
        assert_eq!(a.len(), 16);
        assert!(!a.contains("secret"));
    }

    #[tokio::test]
    async fn test_report_enqueues_context() {
        let mut sink = MockAuditSink::new();
        sink.expect_enqueue()
            .withf(|event| {
                matches!(
                    &event.record,
                    AuditRecord::AuthorizationFailure { ip, user_agent, credential, .. }
                        if ip == "198.51.100.7"
                            && user_agent == "curl/8.0"
                            && credential.as_deref() == Some("Bearer forged")
                )
            })
            .times(1)
            .returning(|_| Ok(()));

        let response = ErrorReporter::new(Arc::new(sink)).report(rejection());
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_report_swallows_enqueue_failure() {
        let mut sink = MockAuditSink::new();
        sink.expect_enqueue()
            .times(1)
            .returning(|_| Err(AuditError::QueueClosed));

        let response = ErrorReporter::new(Arc::new(sink)).report(rejection());
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], UNAUTHORIZED_MESSAGE);
    }

    #[tokio::test]
    async fn test_channel_sink_reports_full_queue() {
        let (sink, mut receiver) = audit_channel(1);
        let record = AuditRecord::LoginAttempt(LoginAttempt {
            ip: "127.0.0.1".to_string(),
            email: None,
            line_user_name: None,
            line_user_id: Some("U1".to_string()),
            method: LoginMethod::Line,
            success: false,
        });

        sink.enqueue(AuditEvent::new(record.clone())).unwrap();
        assert!(matches!(
            sink.enqueue(AuditEvent::new(record.clone())),
            Err(AuditError::QueueFull)
        ));

        assert_eq!(receiver.recv().await.unwrap().record, record);
    }

    #[tokio::test]
    async fn test_worker_exits_when_senders_drop() {
        let (sink, receiver) = audit_channel(8);
        let worker = spawn_audit_worker(receiver);

        ErrorReporter::new(Arc::new(sink)).report(rejection());

        worker.await.unwrap();
    }
}
