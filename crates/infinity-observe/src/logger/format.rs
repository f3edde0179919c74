use std::str::FromStr;

use crate::logger::error::LoggerError;

/// Output encoding of log events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoggerFormat {
    /// Human readable lines, colored on a terminal.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
    /// Native systemd journal fields.
    Journald,
}

impl FromStr for LoggerFormat {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "plain" => Ok(LoggerFormat::Text),
            "json" => Ok(LoggerFormat::Json),
            "journald" | "journal" => {
                if cfg!(all(target_os = "linux", feature = "journald")) {
                    Ok(LoggerFormat::Journald)
                } else {
                    Err(LoggerError::JournaldUnavailable)
                }
            }
            _ => Err(LoggerError::InvalidFormat(s.to_string())),
        }
    }
}
