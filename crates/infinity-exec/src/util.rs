use std::{io, time::Duration};

use tokio::process::{Child, Command};

/// How long a worker gets between SIGTERM and SIGKILL.
pub const TERM_GRACE: Duration = Duration::from_secs(5);

const SPAWN_ATTEMPTS: u32 = 5;
const SPAWN_RETRY_DELAY: Duration = Duration::from_millis(20);

/// Spawn `cmd`, retrying while the kernel reports `ETXTBSY`.
///
/// A freshly written executable can stay "busy" for a moment when another thread
/// forks while the writer's descriptor is still open.
pub async fn spawn_retrying(cmd: &mut Command) -> io::Result<Child> {
    let mut attempt = 1;
    loop {
        match cmd.spawn() {
            Err(e) if is_text_busy(&e) && attempt < SPAWN_ATTEMPTS => {
                attempt += 1;
                tokio::time::sleep(SPAWN_RETRY_DELAY).await;
            }
            other => return other,
        }
    }
}

#[cfg(unix)]
fn is_text_busy(e: &io::Error) -> bool {
    e.raw_os_error() == Some(libc::ETXTBSY)
}

#[cfg(not(unix))]
fn is_text_busy(_e: &io::Error) -> bool {
    false
}

/// SIGTERM, wait up to `grace`, then SIGKILL.
#[cfg(unix)]
pub async fn kill_graceful(child: &mut Child, grace: Duration) -> io::Result<()> {
    if let Some(pid) = child.id() {
        // SAFETY: plain kill(2) on a pid we own and have not reaped yet.
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
        if let Ok(res) = tokio::time::timeout(grace, child.wait()).await {
            return res.map(|_| ());
        }
    }
    child.kill().await
}

#[cfg(not(unix))]
pub async fn kill_graceful(child: &mut Child, _grace: Duration) -> io::Result<()> {
    child.kill().await
}
