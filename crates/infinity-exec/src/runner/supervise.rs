//! Background tasks of a running policy.
//!
//! Every runner owns up to three tasks, all bound to the runner token:
//! - `read_stderr`: records each worker line, forwards lines printed after exit;
//! - `wait_exit`: reaps the worker and reports an abnormal exit;
//! - `monitor`: after a successful start, turns reported lines into `RunnerError`.
//!
//! The error channel has exactly one consumer at a time: the startup race in
//! `PolicyRunner::start`, then `monitor`, which receives the `Receiver` by value.
use std::{
    sync::{
        Arc, PoisonError, RwLock,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, SystemTime},
};

use infinity_model::{RunnerState, RunnerStatus, WORKER_NAME};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::ChildStderr,
    sync::mpsc,
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::sanitize::worker_report;
use crate::launcher::{WorkerExit, WorkerProcess};

/// Target of relayed worker stderr lines, filtered apart by the logger.
const WORKER_LOG_TARGET: &str = "infinity_exec::worker";

/// How long the exit waiter lets the stderr reader catch up before reporting.
const STDERR_DRAIN: Duration = Duration::from_millis(250);

/// Identity and shared state handed to every task of one runner.
#[derive(Clone)]
pub(crate) struct RunnerCtx {
    pub id: Uuid,
    pub policy: Arc<str>,
    pub token: CancellationToken,
    state: Arc<RwLock<RunnerState>>,
}

impl RunnerCtx {
    pub fn new(policy: &str, token: CancellationToken) -> Self {
        Self {
            id: Uuid::new_v4(),
            policy: Arc::from(policy),
            token,
            state: Arc::new(RwLock::new(RunnerState::default())),
        }
    }

    pub fn snapshot(&self) -> RunnerState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update<R>(&self, f: impl FnOnce(&mut RunnerState) -> R) -> R {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    fn record_log(&self, line: &str) {
        self.update(|s| s.last_log = Some(line.to_string()));
    }

    fn last_log(&self) -> Option<String> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last_log
            .clone()
    }

    /// `Unknown → Running`; `started_at` is when the worker was launched.
    pub fn mark_running(&self, started_at: SystemTime) -> bool {
        self.update(|s| {
            if s.status != RunnerStatus::Unknown {
                return false;
            }
            s.status = RunnerStatus::Running;
            s.start_time = Some(started_at);
            true
        })
    }

    /// `Running|RunnerError → RunnerError`; an offline runner stays offline.
    fn mark_error(&self, report: String) -> bool {
        self.update(|s| {
            if !s.status.is_active() {
                return false;
            }
            s.status = RunnerStatus::RunnerError;
            s.last_error = Some(report);
            true
        })
    }

    /// `Running|RunnerError → Offline`. Returns `false` when nothing changed.
    pub fn mark_offline(&self, caller: &str) -> bool {
        let changed = self.update(|s| {
            if !s.status.is_active() {
                return false;
            }
            s.status = RunnerStatus::Offline;
            true
        });
        if changed {
            info!(policy = %self.policy, runner_id = %self.id, caller, "runner process stopped");
        }
        changed
    }

    /// Send `line` to whoever currently owns the error channel.
    ///
    /// Gives up once the runner token is cancelled or the receiver is gone.
    async fn forward(&self, tx: &mpsc::Sender<String>, line: String) -> bool {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => false,
            sent = tx.send(line) => sent.is_ok(),
        }
    }
}

pub(crate) async fn read_stderr(
    ctx: RunnerCtx,
    stderr: ChildStderr,
    tx: mpsc::Sender<String>,
    exited: Arc<AtomicBool>,
) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        let line = tokio::select! {
            biased;
            _ = ctx.token.cancelled() => break,
            next = lines.next_line() => match next {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    debug!(policy = %ctx.policy, error = %e, "stderr closed with error");
                    break;
                }
            },
        };

        ctx.record_log(&line);
        info!(target: WORKER_LOG_TARGET, policy = %ctx.policy, runner_id = %ctx.id, log = %line, "{WORKER_NAME}");

        if exited.load(Ordering::Acquire) && !ctx.forward(&tx, line).await {
            break;
        }
    }
}

pub(crate) async fn wait_exit(
    ctx: RunnerCtx,
    process: WorkerProcess,
    mut reader: JoinHandle<()>,
    tx: mpsc::Sender<String>,
    exited: Arc<AtomicBool>,
) {
    let status = match process.wait().await {
        Ok(WorkerExit::Cancelled) => {
            debug!(policy = %ctx.policy, runner_id = %ctx.id, "worker terminated");
            return;
        }
        Ok(WorkerExit::Exited(status)) => status,
        Err(e) => {
            error!(policy = %ctx.policy, runner_id = %ctx.id, error = %e, "waiting for worker failed");
            ctx.forward(&tx, e.to_string()).await;
            return;
        }
    };

    // Let the reader pick up what the worker wrote right before it died.
    tokio::select! {
        biased;
        _ = ctx.token.cancelled() => return,
        _ = tokio::time::timeout(STDERR_DRAIN, &mut reader) => {}
    }
    exited.store(true, Ordering::Release);

    if status.success() {
        info!(policy = %ctx.policy, runner_id = %ctx.id, "worker exited");
        return;
    }

    warn!(policy = %ctx.policy, runner_id = %ctx.id, %status, "worker exited abnormally");
    let line = ctx
        .last_log()
        .unwrap_or_else(|| format!("worker exited with {status}"));
    ctx.forward(&tx, line).await;
}

pub(crate) async fn monitor(ctx: RunnerCtx, mut rx: mpsc::Receiver<String>) {
    let mut open = true;
    loop {
        tokio::select! {
            biased;
            _ = ctx.token.cancelled() => {
                ctx.mark_offline("runner-monitor");
                return;
            }
            msg = rx.recv(), if open => match msg {
                Some(line) => {
                    let report = worker_report(&line);
                    if ctx.mark_error(report.clone()) {
                        warn!(policy = %ctx.policy, runner_id = %ctx.id, last_error = %report, "runner degraded");
                    }
                }
                None => open = false,
            },
        }
    }
}
