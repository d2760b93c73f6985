pub mod audit;

pub use audit::{
    AuditError, AuditEvent, AuditRecord, AuditSink, ChannelAuditSink, ErrorReporter, LoginAttempt,
    LoginMethod, audit_channel, credential_fingerprint, spawn_audit_worker,
};
