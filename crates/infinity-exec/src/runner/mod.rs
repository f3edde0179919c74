//! One supervised worker per policy.
//!
//! A [`PolicyRunner`] is configured once, started once and stopped at most
//! once. `start` only returns `Ok` when the worker survived the startup window;
//! later failures show up in [`PolicyRunner::status`] as `RunnerError`.
use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, SystemTime},
};

use infinity_model::{Policy, RunnerState};
use tokio::sync::mpsc;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    config::WorkerArgs,
    error::ExecError,
    launcher::Launcher,
};

mod sanitize;
mod supervise;

pub use sanitize::{sanitize, worker_report};
use supervise::RunnerCtx;

/// Default length of the startup window.
pub const STARTUP_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
pub struct RunnerSettings {
    /// Leave the worker's own metrics endpoint on.
    pub self_telemetry: bool,
    /// A worker still silent after this long is considered started.
    pub startup_timeout: Duration,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            self_telemetry: false,
            startup_timeout: STARTUP_TIMEOUT,
        }
    }
}

pub struct PolicyRunner {
    ctx: RunnerCtx,
    policy_dir: PathBuf,
    settings: RunnerSettings,
    launcher: Arc<dyn Launcher>,
    tracker: TaskTracker,
    args: Option<WorkerArgs>,
    started: AtomicBool,
}

impl PolicyRunner {
    pub fn new(
        policy_name: &str,
        policy_dir: impl Into<PathBuf>,
        launcher: Arc<dyn Launcher>,
        settings: RunnerSettings,
    ) -> Self {
        Self {
            ctx: RunnerCtx::new(policy_name, CancellationToken::new()),
            policy_dir: policy_dir.into(),
            settings,
            launcher,
            tracker: TaskTracker::new(),
            args: None,
            started: AtomicBool::new(false),
        }
    }

    /// Bind the runner to `parent`: cancelling it stops this runner too.
    pub fn with_parent(mut self, parent: &CancellationToken) -> Self {
        self.ctx.token = parent.child_token();
        self
    }

    /// Spawn background tasks on `tracker` so an owner can wait for them.
    pub fn with_tracker(mut self, tracker: TaskTracker) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn id(&self) -> Uuid {
        self.ctx.id
    }

    /// Materialized worker config, once [`Self::configure`] succeeded.
    pub fn config_file(&self) -> Option<&Path> {
        self.args.as_ref().map(|a| a.config_file.as_path())
    }

    /// Write the policy's config file and remember the worker flags.
    pub fn configure(&mut self, policy: &Policy) -> Result<(), ExecError> {
        let args = WorkerArgs::materialize(&self.ctx.policy, &self.policy_dir, policy)?;
        debug!(
            policy = %self.ctx.policy,
            runner_id = %self.ctx.id,
            config_file = %args.config_file.display(),
            "policy configured"
        );
        self.args = Some(args);
        Ok(())
    }

    /// Launch the worker and race its first error line against the startup window.
    pub async fn start(&self) -> Result<(), ExecError> {
        let Some(args) = &self.args else {
            return Err(ExecError::Config(format!(
                "policy {} was not configured",
                self.ctx.policy
            )));
        };
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(ExecError::AlreadyStarted(self.ctx.policy.to_string()));
        }

        let argv = args.to_args(self.settings.self_telemetry);
        let started_at = SystemTime::now();
        let mut errors = match self.launch(argv).await {
            Ok(rx) => rx,
            Err(e) => {
                self.ctx.token.cancel();
                return Err(e);
            }
        };

        let outcome = tokio::select! {
            biased;
            _ = self.ctx.token.cancelled() => Err(ExecError::Cancelled),
            Some(line) = errors.recv() => Err(ExecError::Startup(worker_report(&line))),
            _ = tokio::time::sleep(self.settings.startup_timeout) => Ok(()),
        };

        if let Err(e) = outcome {
            self.ctx.token.cancel();
            warn!(policy = %self.ctx.policy, runner_id = %self.ctx.id, error = %e, "runner failed to start");
            return Err(e);
        }

        self.ctx.mark_running(started_at);
        self.tracker
            .spawn(supervise::monitor(self.ctx.clone(), errors));
        info!(policy = %self.ctx.policy, runner_id = %self.ctx.id, "runner started");
        Ok(())
    }

    async fn launch(&self, argv: Vec<String>) -> Result<mpsc::Receiver<String>, ExecError> {
        let mut process = self
            .launcher
            .command(self.ctx.token.clone(), argv)
            .await?
            .start()
            .await?;
        let stderr = process
            .take_stderr()
            .ok_or_else(|| ExecError::Launch("worker stderr is not piped".into()))?;
        debug!(policy = %self.ctx.policy, runner_id = %self.ctx.id, pid = ?process.id(), "worker spawned");

        let (tx, rx) = mpsc::channel(1);
        let exited = Arc::new(AtomicBool::new(false));

        let reader = self.tracker.spawn(supervise::read_stderr(
            self.ctx.clone(),
            stderr,
            tx.clone(),
            exited.clone(),
        ));
        self.tracker.spawn(supervise::wait_exit(
            self.ctx.clone(),
            process,
            reader,
            tx,
            exited,
        ));
        Ok(rx)
    }

    /// Cancel the worker and mark the runner `Offline`.
    ///
    /// Returns without waiting for the background tasks; they wind down on their own.
    pub fn stop(&self, caller: &str) -> Result<(), ExecError> {
        if !self.started.load(Ordering::Acquire) {
            return Err(ExecError::Stop(format!(
                "runner for policy {} was never started",
                self.ctx.policy
            )));
        }
        self.ctx.token.cancel();
        self.ctx.mark_offline(caller);
        Ok(())
    }

    pub fn status(&self) -> RunnerState {
        self.ctx.snapshot()
    }
}

impl Drop for PolicyRunner {
    // A runner that is gone must not leave its worker behind.
    fn drop(&mut self) {
        self.ctx.token.cancel();
    }
}
