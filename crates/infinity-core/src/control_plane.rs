//! Supervisor lifetime: scratch directory, worker capabilities, registry, shutdown.
use std::{
    borrow::Cow,
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError},
    time::SystemTime,
};

use infinity_exec::{EmbeddedLauncher, Launcher};
use infinity_model::{Capabilities, Policy, PolicyView, RunnerState, SupervisorStatus};
use tempfile::TempDir;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{info, warn};

use crate::{
    config::InfinityConfig,
    error::{CoreError, CoreResult},
    registry::PolicyRegistry,
    system,
};

/// Reported when the worker's descriptor carries no readable build version.
pub const UNKNOWN_VERSION: &str = "unknown";

pub struct ControlPlane {
    config: InfinityConfig,
    start_time: SystemTime,
    scratch: Mutex<Option<TempDir>>,
    capabilities: Capabilities,
    registry: PolicyRegistry,
    root: CancellationToken,
    tracker: TaskTracker,
}

impl ControlPlane {
    /// Create the scratch directory, materialize the worker from `payload` and read its capabilities once.
    pub async fn start(
        config: InfinityConfig,
        payload: impl Into<Cow<'static, [u8]>>,
    ) -> CoreResult<Self> {
        let start_time = system::init_uptime();
        let scratch = tempfile::Builder::new().prefix("policies").tempdir()?;
        info!(dir = %scratch.path().display(), "scratch directory created");

        let launcher: Arc<dyn Launcher> =
            Arc::new(EmbeddedLauncher::new(payload, scratch.path()));
        let capabilities = Capabilities::from_raw(launcher.capabilities().await?);
        match capabilities.version() {
            Some(version) => info!(worker_version = version, "worker capabilities loaded"),
            None => warn!("worker capabilities carry no readable build version"),
        }

        let root = CancellationToken::new();
        let tracker = TaskTracker::new();
        let registry = PolicyRegistry::new(
            scratch.path(),
            launcher,
            config.runner_settings(),
        )
        .with_root(root.clone())
        .with_tracker(tracker.clone());

        Ok(Self {
            config,
            start_time,
            scratch: Mutex::new(Some(scratch)),
            capabilities,
            registry,
            root,
            tracker,
        })
    }

    /// Directory holding the worker binary and policy configs, `None` after shutdown.
    pub fn scratch_dir(&self) -> Option<PathBuf> {
        self.scratch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|dir| dir.path().to_path_buf())
    }

    pub fn status(&self) -> SupervisorStatus {
        SupervisorStatus {
            start_time: self.start_time,
            up_time: system::uptime(),
            version: self.config.version.clone(),
            worker_version: Some(
                self.capabilities
                    .version()
                    .unwrap_or(UNKNOWN_VERSION)
                    .to_string(),
            ),
            hostname: system::hostname(),
            policies: self.registry.len(),
        }
    }

    /// The worker's self-description as JSON.
    pub fn capabilities(&self) -> CoreResult<serde_json::Value> {
        self.capabilities
            .descriptor()
            .map_err(|e| CoreError::Capabilities(e.to_string()))
    }

    pub async fn create_policy(&self, name: &str, policy: Policy) -> CoreResult<RunnerState> {
        self.registry.create(name, policy).await
    }

    pub fn delete_policy(&self, name: &str, caller: &str) -> CoreResult<RunnerState> {
        self.registry.delete(name, caller)
    }

    pub fn policies(&self) -> Vec<String> {
        self.registry.list()
    }

    pub fn policy(&self, name: &str) -> Option<PolicyView> {
        self.registry.get(name)
    }

    /// Stop every policy, wait for runner tasks and remove the scratch directory.
    ///
    /// Safe to call more than once.
    pub async fn shutdown(&self, caller: &str) {
        self.registry.shutdown_all(caller);
        self.root.cancel();

        self.tracker.close();
        if tokio::time::timeout(self.config.shutdown_grace, self.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                grace = ?self.config.shutdown_grace,
                "runner tasks still alive after shutdown grace"
            );
        }

        let scratch = self
            .scratch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(dir) = scratch {
            let path = dir.path().display().to_string();
            match dir.close() {
                Ok(()) => info!(dir = %path, "scratch directory removed"),
                Err(e) => warn!(dir = %path, error = %e, "failed to remove scratch directory"),
            }
        }
    }
}
