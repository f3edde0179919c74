use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of a policy runner.
///
/// ```text
/// Unknown ──(startup race won)──► Running ──(stderr after start)──► RunnerError
///                                    │                                  │
///                                    └──────────(stop)──► Offline ◄─────┘
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerStatus {
    /// Not started yet, or the start failed.
    #[default]
    Unknown,
    /// The worker survived the startup window.
    Running,
    /// The worker reported an error after it started; it may still be alive.
    RunnerError,
    /// Stopped on request. Terminal.
    Offline,
}

impl RunnerStatus {
    /// Returns `true` for states that own a live worker which must be stopped on shutdown.
    pub fn is_active(&self) -> bool {
        matches!(self, RunnerStatus::Running | RunnerStatus::RunnerError)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunnerStatus::Unknown => "unknown",
            RunnerStatus::Running => "running",
            RunnerStatus::RunnerError => "runner_error",
            RunnerStatus::Offline => "offline",
        }
    }
}

impl fmt::Display for RunnerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
