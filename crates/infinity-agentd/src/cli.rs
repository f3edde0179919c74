use std::{path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand};
use infinity_core::{
    InfinityConfig,
    config::{DEFAULT_HOST, DEFAULT_PORT},
};
use infinity_observe::{LoggerConfig, LoggerFormat};

#[derive(Debug, Parser)]
#[command(name = "infinityd", version, about = "Supervisor for OpenTelemetry collector policies")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the supervisor and its HTTP control surface.
    Run(RunArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Log at debug level.
    #[arg(short, long, env = "INFINITY_DEBUG")]
    pub debug: bool,

    /// Keep the workers' own metrics endpoints enabled.
    #[arg(long, env = "INFINITY_SELF_TELEMETRY")]
    pub self_telemetry: bool,

    #[arg(long, env = "INFINITY_SERVER_HOST", default_value = DEFAULT_HOST)]
    pub server_host: String,

    #[arg(long, env = "INFINITY_SERVER_PORT", default_value_t = DEFAULT_PORT)]
    pub server_port: u16,

    /// Level for the workers' own stderr lines, e.g. `warn`. Defaults to the main level.
    #[arg(long, env = "INFINITY_WORKER_LOG_LEVEL")]
    pub worker_log_level: Option<String>,

    /// Log output: text, json or journald.
    #[arg(long, env = "INFINITY_LOG_FORMAT", default_value = "text")]
    pub log_format: LoggerFormat,

    /// Run this collector executable instead of the embedded one.
    #[arg(long, env = "INFINITY_WORKER_BINARY")]
    pub worker_binary: Option<PathBuf>,

    /// How long a new worker must stay quiet on stderr to count as started.
    #[arg(long, env = "INFINITY_STARTUP_TIMEOUT_MS", default_value_t = 1000)]
    pub startup_timeout_ms: u64,
}

impl RunArgs {
    pub fn logger_config(&self) -> LoggerConfig {
        LoggerConfig::for_debug(self.debug)
            .with_format(self.log_format)
            .with_worker_level(self.worker_log_level.clone())
    }

    pub fn infinity_config(&self) -> InfinityConfig {
        InfinityConfig {
            version: env!("CARGO_PKG_VERSION").to_string(),
            self_telemetry: self.self_telemetry,
            server_host: self.server_host.clone(),
            server_port: self.server_port,
            startup_timeout: Duration::from_millis(self.startup_timeout_ms),
            ..InfinityConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_args(argv: &[&str]) -> RunArgs {
        let cli = Cli::try_parse_from(argv).unwrap();
        match cli.command {
            Command::Run(args) => args,
        }
    }

    #[test]
    fn defaults_match_the_documented_ones() {
        let args = run_args(&["infinityd", "run"]);
        let cfg = args.infinity_config();
        assert_eq!(cfg.bind_addr(), "localhost:10222");
        assert!(!cfg.self_telemetry);
        assert_eq!(cfg.startup_timeout, Duration::from_secs(1));
        assert_eq!(args.logger_config().level, "info");
        assert!(args.logger_config().worker_level.is_none());
        assert!(args.worker_binary.is_none());
    }

    #[test]
    fn flags_override_defaults() {
        let args = run_args(&[
            "infinityd",
            "run",
            "--debug",
            "--self-telemetry",
            "--server-host",
            "0.0.0.0",
            "--server-port",
            "8080",
            "--log-format",
            "json",
            "--worker-log-level",
            "warn",
            "--worker-binary",
            "/opt/otelcol-contrib",
            "--startup-timeout-ms",
            "2500",
        ]);
        let cfg = args.infinity_config();
        assert_eq!(cfg.bind_addr(), "0.0.0.0:8080");
        assert!(cfg.self_telemetry);
        assert_eq!(cfg.startup_timeout, Duration::from_millis(2500));

        let log = args.logger_config();
        assert_eq!(log.level, "debug");
        assert_eq!(log.format, LoggerFormat::Json);
        assert_eq!(log.worker_level.as_deref(), Some("warn"));
        assert_eq!(args.worker_binary, Some(PathBuf::from("/opt/otelcol-contrib")));
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        assert!(Cli::try_parse_from(["infinityd", "run", "--log-format", "xml"]).is_err());
    }
}
