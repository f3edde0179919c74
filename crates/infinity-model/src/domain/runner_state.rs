use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use super::{RunnerStatus, timestamp};

/// Health snapshot of one runner.
///
/// Owned and mutated by the runner itself; everyone else receives clones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunnerState {
    pub status: RunnerStatus,
    /// When the last successful start finished its startup window.
    #[serde(default, with = "timestamp::option")]
    pub start_time: Option<SystemTime>,
    pub restart_count: u64,
    /// Most recent line the worker wrote to stderr.
    #[serde(skip)]
    pub last_log: Option<String>,
    /// Most recent error reported after start, sanitized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, with = "timestamp::option")]
    pub last_restart_time: Option<SystemTime>,
}
