use thiserror::Error;

/// Failures of the worker process layer.
///
/// `Config` and `Launch` happen before any worker is alive; `Startup` carries the
/// sanitized line a worker printed before dying inside the startup window.
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("config error: {0}")]
    Config(String),
    #[error("launch error: {0}")]
    Launch(String),
    #[error("{0}")]
    Startup(String),
    #[error("stop error: {0}")]
    Stop(String),
    #[error("runner for policy {0} was already started")]
    AlreadyStarted(String),
    #[error("cancelled")]
    Cancelled,
}

pub type ExecResult<T> = Result<T, ExecError>;
