use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("unknown log format '{0}' (expected text, json or journald)")]
    InvalidFormat(String),
    #[error("journald output needs linux and the `journald` feature")]
    JournaldUnavailable,
    #[error("a global tracing subscriber is already installed")]
    AlreadyInitialized,
    #[error("logger setup failed: {0}")]
    Init(String),
    #[error("invalid log filter '{level}': {reason}")]
    InvalidLevel { level: String, reason: String },
}
