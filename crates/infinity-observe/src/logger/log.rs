//! One boxed `fmt`/journald layer per output format, each carrying its own filter.
use std::io;

use time::{UtcOffset, format_description::well_known::Rfc3339};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, MakeWriter, time::OffsetTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::logger::{config::LoggerConfig, error::LoggerError, format::LoggerFormat};

pub(crate) type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Target of the events relaying worker stderr lines.
const WORKER_TARGET: &str = "infinity_exec::worker";

pub(crate) fn layer(cfg: &LoggerConfig) -> Result<BoxedLayer, LoggerError> {
    layer_with_writer(cfg, io::stdout)
}

fn layer_with_writer<W>(cfg: &LoggerConfig, writer: W) -> Result<BoxedLayer, LoggerError>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = filter(cfg)?;
    match cfg.format {
        LoggerFormat::Text => Ok(fmt::layer()
            .with_writer(writer)
            .with_ansi(cfg.use_color)
            .with_target(cfg.with_targets)
            .with_timer(local_timer())
            .with_filter(filter)
            .boxed()),
        LoggerFormat::Json => Ok(fmt::layer()
            .json()
            .with_writer(writer)
            .with_ansi(false)
            .with_current_span(true)
            .with_target(cfg.with_targets)
            .with_timer(local_timer())
            .with_filter(filter)
            .boxed()),
        LoggerFormat::Journald => journald(cfg, filter),
    }
}

/// Install `layer` as the process-wide subscriber.
pub(crate) fn install(layer: BoxedLayer) -> Result<(), LoggerError> {
    if tracing::dispatcher::has_been_set() {
        return Err(LoggerError::AlreadyInitialized);
    }
    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| LoggerError::Init(e.to_string()))
}

/// `level`, plus an override for [`WORKER_TARGET`] when a worker level is set.
fn directives(cfg: &LoggerConfig) -> String {
    match &cfg.worker_level {
        Some(worker) => format!("{},{WORKER_TARGET}={worker}", cfg.level),
        None => cfg.level.clone(),
    }
}

fn filter(cfg: &LoggerConfig) -> Result<EnvFilter, LoggerError> {
    let directives = directives(cfg);
    EnvFilter::try_new(&directives).map_err(|e| LoggerError::InvalidLevel {
        level: directives,
        reason: e.to_string(),
    })
}

fn local_timer() -> OffsetTime<Rfc3339> {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    OffsetTime::new(offset, Rfc3339)
}

#[cfg(all(target_os = "linux", feature = "journald"))]
fn journald(cfg: &LoggerConfig, filter: EnvFilter) -> Result<BoxedLayer, LoggerError> {
    let layer = tracing_journald::layer()
        .map_err(|e| LoggerError::Init(format!("journald: {e}")))?
        .with_syslog_identifier(cfg.syslog_identifier.clone());
    Ok(layer.with_filter(filter).boxed())
}

#[cfg(not(all(target_os = "linux", feature = "journald")))]
fn journald(_cfg: &LoggerConfig, _filter: EnvFilter) -> Result<BoxedLayer, LoggerError> {
    Err(LoggerError::JournaldUnavailable)
}
