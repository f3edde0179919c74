use std::io::IsTerminal;

use crate::logger::format::LoggerFormat;

pub const DEFAULT_SYSLOG_IDENTIFIER: &str = "infinityd";

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    /// `EnvFilter` directive, e.g. `info` or `infinity_exec=debug,info`.
    pub level: String,
    /// Level for relayed worker stderr lines; `None` leaves them under `level`.
    pub worker_level: Option<String>,
    pub with_targets: bool,
    pub use_color: bool,
    /// `SYSLOG_IDENTIFIER` of journald entries.
    pub syslog_identifier: String,
}

impl LoggerConfig {
    /// Text logging at `debug` when `debug` is set, `info` otherwise.
    pub fn for_debug(debug: bool) -> Self {
        Self {
            level: if debug { "debug" } else { "info" }.to_string(),
            ..Self::default()
        }
    }

    pub fn with_format(mut self, format: LoggerFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_worker_level(mut self, level: Option<String>) -> Self {
        self.worker_level = level;
        self
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            format: LoggerFormat::Text,
            level: "info".to_string(),
            worker_level: None,
            with_targets: true,
            use_color: std::io::stdout().is_terminal(),
            syslog_identifier: DEFAULT_SYSLOG_IDENTIFIER.to_string(),
        }
    }
}
