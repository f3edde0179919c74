use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use super::{duration_nanos, timestamp};

/// Answer of the status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisorStatus {
    #[serde(with = "timestamp")]
    pub start_time: SystemTime,
    /// Serialized as nanoseconds.
    #[serde(with = "duration_nanos")]
    pub up_time: Duration,
    /// Supervisor build version.
    #[serde(rename = "otlpinf_version")]
    pub version: String,
    /// Version reported by the embedded worker, if it could be determined.
    #[serde(rename = "otel_contrib_version", skip_serializing_if = "Option::is_none")]
    pub worker_version: Option<String>,
    pub hostname: String,
    /// Number of registered policies.
    pub policies: usize,
}
