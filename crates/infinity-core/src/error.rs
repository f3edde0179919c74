use infinity_exec::ExecError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("policy {0} already exists")]
    Conflict(String),
    #[error("policy {0} not found")]
    NotFound(String),
    #[error("invalid policy {name}: {reason}")]
    InvalidPolicy { name: String, reason: String },
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error("scratch directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("capabilities: {0}")]
    Capabilities(String),
    #[error("supervisor is shutting down")]
    ShuttingDown,
}

pub type CoreResult<T> = Result<T, CoreError>;
