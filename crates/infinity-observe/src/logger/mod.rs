mod config;
mod error;
mod format;
mod log;

pub use config::LoggerConfig;
pub use error::LoggerError;
pub use format::LoggerFormat;

/// Install the global `tracing` subscriber described by `cfg`.
///
/// May be called once per process; a second call fails with [`LoggerError::AlreadyInitialized`].
pub fn logger_init(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    log::install(log::layer(cfg)?)
}
