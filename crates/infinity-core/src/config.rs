use std::time::Duration;

use infinity_exec::{RunnerSettings, runner::STARTUP_TIMEOUT};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 10222;

/// How long shutdown waits for runner tasks after every worker was told to stop.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Runtime settings of the supervisor.
#[derive(Debug, Clone)]
pub struct InfinityConfig {
    /// Supervisor build version, reported by the status endpoint.
    pub version: String,
    /// Keep each worker's own metrics endpoint enabled.
    pub self_telemetry: bool,
    pub server_host: String,
    pub server_port: u16,
    pub startup_timeout: Duration,
    pub shutdown_grace: Duration,
}

impl Default for InfinityConfig {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            self_telemetry: false,
            server_host: DEFAULT_HOST.to_string(),
            server_port: DEFAULT_PORT,
            startup_timeout: STARTUP_TIMEOUT,
            shutdown_grace: SHUTDOWN_GRACE,
        }
    }
}

impl InfinityConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.server_host.trim().is_empty() {
            return Err("server host must not be empty".into());
        }
        if self.startup_timeout.is_zero() {
            return Err("startup timeout must be greater than zero".into());
        }
        Ok(())
    }

    /// `host:port` the control surface binds to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn runner_settings(&self) -> RunnerSettings {
        RunnerSettings {
            self_telemetry: self.self_telemetry,
            startup_timeout: self.startup_timeout,
        }
    }
}
