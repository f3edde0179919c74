use std::{
    borrow::Cow,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use infinity_model::WORKER_NAME;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    sync::OnceCell,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{COMPONENTS_ARG, Launcher, WorkerCommand, WorkerExit};
use crate::error::ExecError;

/// Worker executable embedded at build time (see `build.rs`).
pub static WORKER_PAYLOAD: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/worker.bin"));

/// Launcher for a worker carried as bytes.
///
/// The payload is written once into `dir` and marked executable. The file is
/// never removed here; it lives as long as the directory does.
pub struct EmbeddedLauncher {
    payload: Cow<'static, [u8]>,
    dir: PathBuf,
    binary: OnceCell<PathBuf>,
}

impl EmbeddedLauncher {
    pub fn new(payload: impl Into<Cow<'static, [u8]>>, dir: impl Into<PathBuf>) -> Self {
        Self {
            payload: payload.into(),
            dir: dir.into(),
            binary: OnceCell::new(),
        }
    }

    /// Path of the materialized executable, writing it on first use.
    pub async fn materialize(&self) -> Result<&Path, ExecError> {
        self.binary
            .get_or_try_init(|| self.write_binary())
            .await
            .map(PathBuf::as_path)
    }

    async fn write_binary(&self) -> Result<PathBuf, ExecError> {
        if self.payload.is_empty() {
            return Err(ExecError::Launch(format!(
                "no {WORKER_NAME} binary embedded; rebuild with INFINITY_WORKER_BINARY set or pass --worker-binary"
            )));
        }

        let materialize_err = |e: std::io::Error| {
            ExecError::Launch(format!("materialize {WORKER_NAME} in {}: {e}", self.dir.display()))
        };

        // Reserve a unique name, then close our handle before the payload goes in.
        let (_, path) = tempfile::Builder::new()
            .prefix(WORKER_NAME)
            .tempfile_in(&self.dir)
            .map_err(materialize_err)?
            .keep()
            .map_err(|e| materialize_err(e.error))?;

        tokio::fs::write(&path, &self.payload)
            .await
            .map_err(materialize_err)?;
        make_executable(&path).await.map_err(materialize_err)?;

        info!(path = %path.display(), bytes = self.payload.len(), "worker binary materialized");
        Ok(path)
    }
}

#[cfg(unix)]
async fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700)).await
}

#[cfg(not(unix))]
async fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[async_trait]
impl Launcher for EmbeddedLauncher {
    async fn capabilities(&self) -> Result<Vec<u8>, ExecError> {
        let binary = self.materialize().await?;
        let pipe_err =
            |e: std::io::Error| ExecError::Launch(format!("{WORKER_NAME} {COMPONENTS_ARG}: {e}"));

        let mut process = WorkerCommand::new(
            binary,
            vec![COMPONENTS_ARG.to_string()],
            CancellationToken::new(),
        )
        .capture_stdout()
        .start()
        .await?;

        let (stdout, stderr) = tokio::join!(
            read_all(process.take_stdout()),
            read_all(process.take_stderr())
        );
        let (stdout, stderr) = (stdout.map_err(pipe_err)?, stderr.map_err(pipe_err)?);

        match process.wait().await? {
            WorkerExit::Exited(status) if status.success() => {
                debug!(bytes = stdout.len(), "capabilities read");
                Ok(stdout)
            }
            WorkerExit::Exited(status) => Err(ExecError::Launch(format!(
                "{WORKER_NAME} {COMPONENTS_ARG} exited with {status}: {}",
                String::from_utf8_lossy(&stderr).trim()
            ))),
            WorkerExit::Cancelled => Err(ExecError::Cancelled),
        }
    }

    async fn command(
        &self,
        token: CancellationToken,
        args: Vec<String>,
    ) -> Result<WorkerCommand, ExecError> {
        let binary = self.materialize().await?;
        Ok(WorkerCommand::new(binary, args, token))
    }
}

async fn read_all<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}
