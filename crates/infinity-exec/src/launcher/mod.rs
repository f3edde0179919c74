//! Process handles for the worker binary.
//!
//! A [`Launcher`] knows where the worker executable lives and produces
//! [`WorkerCommand`]s bound to a [`CancellationToken`]: cancelling the token is
//! the only way to stop a worker, and it always terminates the OS process.
use std::{
    path::PathBuf,
    process::{ExitStatus, Stdio},
};

use async_trait::async_trait;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{
    error::ExecError,
    util::{TERM_GRACE, kill_graceful, spawn_retrying},
};

mod embedded;
pub use embedded::{EmbeddedLauncher, WORKER_PAYLOAD};

/// Argument that makes the worker print its static self-description.
pub const COMPONENTS_ARG: &str = "components";

#[async_trait]
pub trait Launcher: Send + Sync + 'static {
    /// Run the worker's `components` command and return its stdout.
    async fn capabilities(&self) -> Result<Vec<u8>, ExecError>;

    /// Build a worker command with `args`, terminated when `token` is cancelled.
    async fn command(
        &self,
        token: CancellationToken,
        args: Vec<String>,
    ) -> Result<WorkerCommand, ExecError>;
}

/// A not yet started worker invocation.
pub struct WorkerCommand {
    program: PathBuf,
    cmd: Command,
    token: CancellationToken,
}

impl WorkerCommand {
    /// Stdin is closed, stderr is piped, stdout is discarded unless [`Self::capture_stdout`] is called.
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, token: CancellationToken) -> Self {
        let program = program.into();
        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        Self {
            program,
            cmd,
            token,
        }
    }

    pub fn capture_stdout(mut self) -> Self {
        self.cmd.stdout(Stdio::piped());
        self
    }

    /// Spawn the OS process.
    pub async fn start(mut self) -> Result<WorkerProcess, ExecError> {
        trace!(target: "infinity.exec.launcher", program = %self.program.display(), "spawn");

        let child = spawn_retrying(&mut self.cmd)
            .await
            .map_err(|e| ExecError::Launch(format!("spawn {}: {e}", self.program.display())))?;

        Ok(WorkerProcess {
            child,
            token: self.token,
        })
    }
}

/// How a worker process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// The process exited on its own.
    Exited(ExitStatus),
    /// The token was cancelled and the process was terminated.
    Cancelled,
}

/// A running worker.
pub struct WorkerProcess {
    child: Child,
    token: CancellationToken,
}

impl WorkerProcess {
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Wait for the process to exit, or terminate it once the token is cancelled.
    pub async fn wait(mut self) -> Result<WorkerExit, ExecError> {
        tokio::select! {
            status = self.child.wait() => {
                let status = status.map_err(|e| ExecError::Launch(format!("wait: {e}")))?;
                Ok(WorkerExit::Exited(status))
            }
            _ = self.token.cancelled() => {
                debug!(target: "infinity.exec.launcher", pid = ?self.child.id(), "cancelled; terminating worker");
                kill_graceful(&mut self.child, TERM_GRACE)
                    .await
                    .map_err(|e| ExecError::Stop(format!("terminate worker: {e}")))?;
                Ok(WorkerExit::Cancelled)
            }
        }
    }
}
