//! Name → running policy map.
//!
//! The registry is the only writer of the map. A name is reserved before its
//! runner is started so two concurrent creates of the same policy can never
//! both spawn a worker; the map lock itself is never held across an await.
//! Once `shutdown_all` ran the registry is closed and every create fails.
use std::{
    collections::{HashMap, HashSet},
    path::PathBuf,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use infinity_exec::{Launcher, PolicyRunner, RunnerSettings};
use infinity_model::{Policy, PolicyView, RunnerState};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, error, info, instrument, warn};

use crate::error::{CoreError, CoreResult};

/// Caller recorded when the registry itself stops a runner.
const REGISTRY_CALLER: &str = "registry";

struct RunnerInfo {
    policy: Policy,
    runner: PolicyRunner,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, RunnerInfo>,
    /// Names whose create is in flight.
    pending: HashSet<String>,
    /// Set by `shutdown_all`; no entry is added afterwards.
    closed: bool,
}

pub struct PolicyRegistry {
    inner: RwLock<Inner>,
    policy_dir: PathBuf,
    launcher: Arc<dyn Launcher>,
    settings: RunnerSettings,
    root: CancellationToken,
    tracker: TaskTracker,
}

impl PolicyRegistry {
    pub fn new(
        policy_dir: impl Into<PathBuf>,
        launcher: Arc<dyn Launcher>,
        settings: RunnerSettings,
    ) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            policy_dir: policy_dir.into(),
            launcher,
            settings,
            root: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Every runner token becomes a child of `root`.
    pub fn with_root(mut self, root: CancellationToken) -> Self {
        self.root = root;
        self
    }

    /// Runner background tasks are spawned on `tracker`.
    pub fn with_tracker(mut self, tracker: TaskTracker) -> Self {
        self.tracker = tracker;
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a worker for `policy` and register it under `name`.
    ///
    /// Nothing is registered unless the worker survived its startup window.
    #[instrument(level = "debug", skip(self, policy), fields(policy = %name))]
    pub async fn create(&self, name: &str, policy: Policy) -> CoreResult<RunnerState> {
        let reservation = self.reserve(name, &policy)?;

        let mut runner = PolicyRunner::new(
            name,
            self.policy_dir.clone(),
            Arc::clone(&self.launcher),
            self.settings,
        )
        .with_parent(&self.root)
        .with_tracker(self.tracker.clone());

        runner.configure(&policy)?;
        if let Err(e) = runner.start().await {
            discard_config(name, &runner);
            return Err(e.into());
        }

        let state = runner.status();
        let runner_id = runner.id();
        let refused = {
            let mut inner = self.write();
            if inner.closed {
                Some(runner)
            } else {
                inner.entries.insert(name.to_string(), RunnerInfo { policy, runner });
                None
            }
        };
        drop(reservation);

        if let Some(runner) = refused {
            if let Err(e) = runner.stop(REGISTRY_CALLER) {
                warn!(policy = %name, %runner_id, error = %e, "late runner not stopped");
            }
            discard_config(name, &runner);
            info!(policy = %name, %runner_id, "policy started during shutdown, stopped again");
            return Err(CoreError::ShuttingDown);
        }

        info!(policy = %name, %runner_id, "policy created");
        Ok(state)
    }

    fn reserve<'a>(&'a self, name: &str, policy: &Policy) -> CoreResult<Reservation<'a>> {
        let mut inner = self.write();
        if inner.closed {
            return Err(CoreError::ShuttingDown);
        }
        if inner.entries.contains_key(name) || inner.pending.contains(name) {
            return Err(CoreError::Conflict(name.to_string()));
        }
        if !policy.has_config() {
            return Err(CoreError::InvalidPolicy {
                name: name.to_string(),
                reason: "config section is empty".into(),
            });
        }
        inner.pending.insert(name.to_string());
        Ok(Reservation {
            registry: self,
            name: name.to_string(),
        })
    }

    /// Stop the runner of `name` and forget it. Returns the final runner state.
    ///
    /// The entry stays registered when the stop fails.
    pub fn delete(&self, name: &str, caller: &str) -> CoreResult<RunnerState> {
        let info = {
            let mut inner = self.write();
            let info = inner
                .entries
                .get(name)
                .ok_or_else(|| CoreError::NotFound(name.to_string()))?;
            info.runner.stop(caller)?;
            inner
                .entries
                .remove(name)
                .ok_or_else(|| CoreError::NotFound(name.to_string()))?
        };
        discard_config(name, &info.runner);

        info!(policy = %name, runner_id = %info.runner.id(), caller, "policy deleted");
        Ok(info.runner.status())
    }

    /// Registered names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().entries.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn get(&self, name: &str) -> Option<PolicyView> {
        self.read()
            .entries
            .get(name)
            .map(|info| PolicyView::new(info.policy.clone(), info.runner.status()))
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Refuse further creates, stop every live runner and drop it.
    ///
    /// Returns the final state of each dropped entry, sorted by name. A failed
    /// stop is logged and its entry kept.
    pub fn shutdown_all(&self, caller: &str) -> Vec<(String, RunnerState)> {
        let mut inner = self.write();
        inner.closed = true;
        let mut dropped = Vec::with_capacity(inner.entries.len());

        inner.entries.retain(|name, info| {
            if info.runner.status().status.is_active()
                && let Err(e) = info.runner.stop(caller)
            {
                error!(policy = %name, caller, error = %e, "failed to stop policy");
                return true;
            }
            dropped.push((name.clone(), info.runner.status()));
            false
        });

        if !inner.entries.is_empty() {
            warn!(remaining = inner.entries.len(), "policies left registered after shutdown");
        }
        info!(stopped = dropped.len(), caller, "all policies stopped");
        dropped.sort_by(|a, b| a.0.cmp(&b.0));
        dropped
    }
}

/// Best-effort removal of a runner's materialized config.
fn discard_config(name: &str, runner: &PolicyRunner) {
    if let Some(file) = runner.config_file()
        && let Err(e) = std::fs::remove_file(file)
    {
        debug!(policy = %name, file = %file.display(), error = %e, "config file not removed");
    }
}

/// Releases a pending name when the create finishes, fails or is dropped.
struct Reservation<'a> {
    registry: &'a PolicyRegistry,
    name: String,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.registry.write().pending.remove(&self.name);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::{path::Path, time::Duration};

    use infinity_exec::{EmbeddedLauncher, ExecError};
    use infinity_model::RunnerStatus;

    use super::*;

    const HEALTHY: &str = "#!/bin/sh
echo \"starting collector $*\" >&2
exec sleep 30
";

    const FAILING: &str = "#!/bin/sh
echo 'Error: failed to get config: cannot unmarshal the configuration' >&2
exit 1
";

    // Policies whose name starts with `degrade` fail after the startup window.
    const MIXED: &str = "#!/bin/sh
case \"$2\" in
  */degrade*)
    echo 'collector up' >&2
    sleep 1
    echo 'Error: exporter otlp failed' >&2
    exit 1
    ;;
esac
echo \"starting collector $*\" >&2
exec sleep 30
";

    fn registry(script: &str, dir: &Path) -> PolicyRegistry {
        let launcher = Arc::new(EmbeddedLauncher::new(script.as_bytes().to_vec(), dir));
        let settings = RunnerSettings {
            self_telemetry: false,
            startup_timeout: Duration::from_millis(300),
        };
        PolicyRegistry::new(dir, launcher, settings)
    }

    fn policy() -> Policy {
        serde_yaml::from_str(
            r#"
feature_gates: [connector.spanmetrics]
set:
  processors.batch.timeout: 5s
config:
  receivers:
    otlp:
      protocols:
        grpc: {}
  exporters:
    debug: {}
  service:
    pipelines:
      traces:
        receivers: [otlp]
        exporters: [debug]
"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn create_then_get_is_running() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(HEALTHY, dir.path());

        let state = reg.create("p1", policy()).await.unwrap();
        assert_eq!(state.status, RunnerStatus::Running);
        assert_eq!(reg.list(), vec!["p1"]);

        let view = reg.get("p1").unwrap();
        assert_eq!(view.policy, policy());
        assert_eq!(view.state.status, RunnerStatus::Running);

        reg.shutdown_all("test");
    }

    #[tokio::test]
    async fn duplicate_create_conflicts_without_replacing() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(HEALTHY, dir.path());
        reg.create("p1", policy()).await.unwrap();
        let start = reg.get("p1").unwrap().state.start_time;

        let err = reg.create("p1", policy()).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(name) if name == "p1"));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get("p1").unwrap().state.start_time, start);

        reg.shutdown_all("test");
    }

    #[tokio::test]
    async fn concurrent_creates_of_one_name_start_one_worker() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(HEALTHY, dir.path());

        let (a, b) = tokio::join!(reg.create("p1", policy()), reg.create("p1", policy()));
        assert!(a.is_ok() ^ b.is_ok(), "{a:?} / {b:?}");
        assert!(matches!(a.err().or(b.err()), Some(CoreError::Conflict(_))));
        assert_eq!(reg.list(), vec!["p1"]);

        reg.shutdown_all("test");
    }

    #[tokio::test]
    async fn empty_config_is_rejected_before_anything_runs() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(HEALTHY, dir.path());

        let mut bare = policy();
        bare.config.clear();
        let err = reg.create("p1", bare).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidPolicy { .. }));
        assert!(reg.is_empty());
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn startup_failure_registers_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(FAILING, dir.path());

        let err = reg.create("p1", policy()).await.unwrap_err();
        match err {
            CoreError::Exec(ExecError::Startup(msg)) => assert_eq!(
                msg,
                "otelcol-contrib - Error: failed to get config: cannot unmarshal the configuration"
            ),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(reg.list().is_empty());

        // The name is free again.
        assert!(matches!(
            reg.create("p1", policy()).await,
            Err(CoreError::Exec(ExecError::Startup(_)))
        ));
    }

    #[tokio::test]
    async fn delete_stops_and_forgets() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(HEALTHY, dir.path());

        assert!(matches!(reg.delete("nope", "test"), Err(CoreError::NotFound(_))));

        reg.create("p1", policy()).await.unwrap();
        let state = reg.delete("p1", "test").unwrap();
        assert_eq!(state.status, RunnerStatus::Offline);
        assert!(reg.get("p1").is_none());
        assert!(reg.list().is_empty());
    }

    #[tokio::test]
    async fn failed_creates_leave_no_config_behind() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(FAILING, dir.path());

        for _ in 0..3 {
            assert!(reg.create("p1", policy()).await.is_err());
        }

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1, "{names:?}");
        assert!(names[0].starts_with(infinity_model::WORKER_NAME), "{names:?}");
    }

    #[tokio::test]
    async fn delete_removes_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(HEALTHY, dir.path());

        reg.create("p1", policy()).await.unwrap();
        let yaml = |dir: &Path| {
            std::fs::read_dir(dir)
                .unwrap()
                .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().ends_with(".yaml"))
                .count()
        };
        assert_eq!(yaml(dir.path()), 1);

        reg.delete("p1", "test").unwrap();
        assert_eq!(yaml(dir.path()), 0);
    }

    #[tokio::test]
    async fn shutdown_all_stops_everything() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = TaskTracker::new();
        let reg = registry(MIXED, dir.path()).with_tracker(tracker.clone());

        for name in ["a", "b", "degrade"] {
            reg.create(name, policy()).await.unwrap();
        }
        assert_eq!(reg.list(), vec!["a", "b", "degrade"]);

        let mut degraded = None;
        for _ in 0..100 {
            let state = reg.get("degrade").unwrap().state;
            if state.status == RunnerStatus::RunnerError {
                degraded = Some(state);
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        let degraded = degraded.expect("degrade never reported its failure");
        assert_eq!(
            degraded.last_error.as_deref(),
            Some("otelcol-contrib - Error: exporter otlp failed")
        );
        assert_eq!(reg.get("a").unwrap().state.status, RunnerStatus::Running);

        let stopped = reg.shutdown_all("test");
        let names: Vec<&str> = stopped.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "degrade"]);
        for (name, state) in &stopped {
            assert_eq!(state.status, RunnerStatus::Offline, "{name}");
        }
        assert!(reg.is_empty());

        tracker.close();
        tokio::time::timeout(Duration::from_secs(10), tracker.wait())
            .await
            .expect("runner tasks should drain");
    }

    #[tokio::test]
    async fn create_after_shutdown_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(HEALTHY, dir.path());

        assert!(reg.shutdown_all("test").is_empty());
        assert!(matches!(
            reg.create("p1", policy()).await,
            Err(CoreError::ShuttingDown)
        ));
        assert!(reg.is_empty());
    }

    #[tokio::test]
    async fn create_racing_shutdown_is_stopped_and_refused() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(HEALTHY, dir.path());

        let (created, stopped) = tokio::join!(reg.create("late", policy()), async {
            // Inside the 300ms startup window of `late`.
            tokio::time::sleep(Duration::from_millis(100)).await;
            reg.shutdown_all("test")
        });

        assert!(stopped.is_empty());
        assert!(matches!(created, Err(CoreError::ShuttingDown)), "{created:?}");
        assert!(reg.is_empty());
        assert!(reg.get("late").is_none());
    }
}
