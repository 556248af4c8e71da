//! Worker: one managed workload wrapping one external executable.
//!
//! A `Worker` owns its child process, its parameters and its lifecycle
//! state. Everything a worker needs from the outside (settings, the pid
//! ledger, the state store, observers) arrives through `WorkerEnv`, owned
//! by the registry and lent to each call.
//!
//! Files under the worker's state directory:
//!
//! ```text
//! state.json    parameters + committed running flag
//! args.json     cached launch plan (port + argv)
//! config.json   generated config for config-file driven kinds
//! preserve      marker: reuse args.json/config.json as they are
//! output.log    stdout/stderr of the executable
//! ```

pub mod events;
pub mod kind;
pub mod kinds;
pub mod params;
pub mod state;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Child;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde::Serialize;
use serde_json::{json, Value};

use crate::data::{write_atomic, Paths, StateStore, WorkerRecord};
use crate::error::{ControlError, RuntimeCause};
use crate::infrastructure::{find_free_port, process, Ledger};
use crate::now_ms;
use crate::telemetry::WorkerProbe;
use crate::types::config::Settings;

pub use events::{ErrorReporter, EventLog, Hooks, LogReporter, WorkerEvent, WorkerObserver};
pub use kind::{Hardware, LaunchContext, LaunchPlan, WorkerKind, ALL_KINDS};
pub use params::{ParameterSpec, Parameters};
pub use state::{Transition, WorkerState};

const ARGS_FILE: &str = "args.json";
const CONFIG_FILE: &str = "config.json";
const PRESERVE_MARKER: &str = "preserve";
const LOG_FILE: &str = "output.log";
const GRACE_POLL: Duration = Duration::from_millis(10);


/// Shared collaborators lent to every worker operation.
pub struct WorkerEnv {
    pub settings: Settings,
    pub ledger: Ledger,
    pub store: StateStore,
    pub hooks: Hooks,
}

impl WorkerEnv {
    pub fn new(paths: &Paths, settings: Settings, hooks: Hooks) -> Self {
        WorkerEnv {
            settings,
            ledger: Ledger::load(&paths.ledger_file()),
            store: StateStore::new(&paths.workers_dir()),
            hooks,
        }
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.settings.stop_timeout_ms)
    }

    fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.settings.startup_grace_ms)
    }
}


/// Read-only projection returned by `GET /workers`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerView {
    pub name: String,
    pub kind: WorkerKind,
    pub state: WorkerState,
    pub running: bool,
    /// Desired state, restored on the next boot.
    pub committed: bool,
    pub pid: Option<u32>,
    pub uses_hardware: Hardware,
    pub uses_account: String,
    pub options: Vec<ParameterSpec>,
    pub parameters: Parameters,
    pub daemon_port: Option<u16>,
    pub started_at: Option<u64>,
}


pub struct Worker {
    kind: WorkerKind,
    binary: PathBuf,
    dir: PathBuf,
    params: Parameters,
    committed: bool,
    state: WorkerState,
    child: Option<Child>,
    port: Option<u16>,
    started_at_ms: Option<u64>,
    /// Set right before a deliberate termination signal, cleared once the
    /// exit has been handled.
    will_quit: bool,
    probe: WorkerProbe,
}

impl Worker {
    /// Instantiate a worker, restoring parameters and the committed flag
    /// from the state store. The worker always starts out idle.
    pub fn restore(kind: WorkerKind, binary: PathBuf, store: &StateStore) -> Worker {
        let record = store.load(kind.name());
        Worker {
            kind,
            binary,
            dir: store.worker_dir(kind.name()),
            params: params::restore(&kind.parameters(), &record.parameters),
            committed: record.running,
            state: WorkerState::Idle,
            child: None,
            port: None,
            started_at_ms: None,
            will_quit: false,
            probe: WorkerProbe::new(kind),
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn kind(&self) -> WorkerKind {
        self.kind
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    pub fn committed(&self) -> bool {
        self.committed
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    pub fn probe(&self) -> WorkerProbe {
        self.probe.clone()
    }

    pub fn args_path(&self) -> PathBuf {
        self.dir.join(ARGS_FILE)
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE)
    }

    fn marker_path(&self) -> PathBuf {
        self.dir.join(PRESERVE_MARKER)
    }

    pub fn view(&self) -> WorkerView {
        WorkerView {
            name: self.name().to_string(),
            kind: self.kind,
            state: self.state,
            running: self.is_running(),
            committed: self.committed,
            pid: self.pid(),
            uses_hardware: self.kind.hardware(),
            uses_account: self.kind.currency().to_string(),
            options: self.kind.parameters(),
            parameters: self.params.clone(),
            daemon_port: self.port,
            started_at: self.started_at_ms,
        }
    }

    // -- lifecycle ----------------------------------------------------------

    /// Spawn the executable. Exclusion is the caller's job: the registry
    /// stops conflicting workers before calling this.
    pub fn start(&mut self, env: &mut WorkerEnv, commit: bool) -> Result<(), ControlError> {
        if self.state != WorkerState::Idle {
            return Err(ControlError::Domain(format!(
                "{} is already {}",
                self.name(),
                self.state.label()
            )));
        }
        self.state = self.state.apply(Transition::StartRequested)?;
        let (child, port) = match self.launch(env) {
            Ok(launched) => launched,
            Err(e) => {
                self.state = self.state.apply(Transition::SpawnFailed)?;
                env.hooks.emit(WorkerEvent::RuntimeError {
                    name: self.name().to_string(),
                    graceful: false,
                    message: e.to_string(),
                });
                return Err(e);
            }
        };
        info!("{} started (pid {}, port {})", self.name(), child.id(), port);
        self.child = Some(child);
        self.port = Some(port);
        self.started_at_ms = Some(now_ms());
        self.state = self.state.apply(Transition::Spawned)?;
        self.probe.mark_running(port);
        if commit {
            if let Err(e) = self.commit(env, true) {
                warn!("{}: cannot persist running flag: {}", self.name(), e);
            }
        }
        env.hooks.emit(WorkerEvent::StateChanged {
            name: self.name().to_string(),
            running: true,
        });
        Ok(())
    }

    /// Terminate the executable. Stopping an idle worker succeeds without
    /// doing anything.
    /// With `commit`, the stopped state is persisted only once the process
    /// is confirmed gone.
    pub fn stop(&mut self, env: &mut WorkerEnv, commit: bool) -> Result<(), ControlError> {
        if self.state == WorkerState::Idle {
            return if commit { self.commit(env, false) } else { Ok(()) };
        }
        let mut child = self
            .child
            .take()
            .ok_or_else(|| ControlError::Internal(format!("{} is running without a process", self.name())))?;
        let pid = child.id();
        self.state = self.state.apply(Transition::StopRequested)?;
        self.will_quit = true;
        match process::terminate_child(&mut child, env.stop_timeout()) {
            Ok(status) => {
                self.on_exit(env, pid, &process::describe(&status));
                if commit {
                    self.commit(env, false)?;
                }
                Ok(())
            }
            Err(e) => {
                // The signal never landed; the process is still ours.
                self.child = Some(child);
                self.will_quit = false;
                self.state = WorkerState::Running;
                Err(ControlError::io(format!("stop {}", self.name()), e))
            }
        }
    }

    /// `stop` then `start`. Not atomic: a failed start leaves the worker idle.
    pub fn reload(&mut self, env: &mut WorkerEnv, commit: bool) -> Result<(), ControlError> {
        self.stop(env, false)?;
        self.start(env, commit)
    }

    /// Poll the child for an exit nobody asked for. Returns true if the
    /// worker went down.
    pub fn reap(&mut self, env: &mut WorkerEnv) -> bool {
        let exited = match self.child.as_mut() {
            Some(child) => match child.try_wait() {
                Ok(Some(status)) => Some((child.id(), process::describe(&status))),
                Ok(None) => None,
                Err(e) => {
                    warn!("cannot poll {}: {}", self.name(), e);
                    None
                }
            },
            None => None,
        };
        match exited {
            Some((pid, how)) => {
                self.child = None;
                warn!("{} (pid {}) exited unexpectedly: {}", self.name(), pid, how);
                self.on_exit(env, pid, &how);
                true
            }
            None => false,
        }
    }

    /// Exit callback shared by deliberate stops and crashes.
    fn on_exit(&mut self, env: &mut WorkerEnv, pid: u32, how: &str) {
        if let Err(e) = env.ledger.remove(pid) {
            warn!("cannot remove pid {} from ledger: {}", pid, e);
        }
        let transition = if self.state == WorkerState::Stopping {
            Transition::Stopped
        } else {
            Transition::Crashed
        };
        self.state = self.state.apply(transition).unwrap_or(WorkerState::Idle);
        self.port = None;
        self.started_at_ms = None;
        self.probe.mark_stopped();
        let graceful = self.will_quit;
        env.hooks.emit(WorkerEvent::StateChanged {
            name: self.name().to_string(),
            running: false,
        });
        env.hooks.emit(WorkerEvent::RuntimeError {
            name: self.name().to_string(),
            graceful,
            message: how.to_string(),
        });
        self.will_quit = false;
    }

    /// Negotiate a port, resolve the launch plan and spawn. A process that
    /// dies within the startup grace period is retried once on the next
    /// port, unless its arguments are preserved verbatim.
    fn launch(&self, env: &mut WorkerEnv) -> Result<(Child, u16), ControlError> {
        let preserved = self.preserved_plan();
        let plan = match &preserved {
            Some(plan) => plan.clone(),
            None => self.fresh_plan(env, find_free_port(self.kind.preferred_port())?)?,
        };
        match self.spawn_checked(env, &plan) {
            Ok(child) => Ok((child, plan.port)),
            Err(e) if preserved.is_none() && is_early_exit(&e) => {
                warn!("{}: {}; retrying on the next port", self.name(), e);
                let next = plan.port.checked_add(1).ok_or_else(|| {
                    ControlError::runtime(format!("start {}", self.name()), "no port left to retry on")
                })?;
                let retry = self.fresh_plan(env, find_free_port(next)?)?;
                let child = self.spawn_checked(env, &retry)?;
                Ok((child, retry.port))
            }
            Err(e) => Err(e),
        }
    }

    fn spawn_checked(&self, env: &mut WorkerEnv, plan: &LaunchPlan) -> Result<Child, ControlError> {
        let log_path = self.dir.join(LOG_FILE);
        let mut child = process::spawn(&self.binary, &plan.args, &self.dir, &log_path)?;
        let pid = child.id();
        if let Err(e) = env.ledger.add(pid) {
            let _ = process::terminate_child(&mut child, env.stop_timeout());
            return Err(e);
        }
        let deadline = Instant::now() + env.startup_grace();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    if let Err(e) = env.ledger.remove(pid) {
                        warn!("cannot remove pid {} from ledger: {}", pid, e);
                    }
                    return Err(ControlError::Runtime {
                        context: format!("start {} on port {}", self.name(), plan.port),
                        cause: RuntimeCause::EarlyExit(process::describe(&status)),
                    });
                }
                Ok(None) if Instant::now() >= deadline => return Ok(child),
                Ok(None) => std::thread::sleep(GRACE_POLL),
                Err(e) => {
                    let _ = process::terminate_child(&mut child, env.stop_timeout());
                    let _ = env.ledger.remove(pid);
                    return Err(ControlError::io(format!("start {}", self.name()), e));
                }
            }
        }
    }

    /// The cached plan, if the operator asked for it to be preserved.
    fn preserved_plan(&self) -> Option<LaunchPlan> {
        if !self.marker_path().exists() {
            return None;
        }
        let content = fs::read_to_string(self.args_path()).ok()?;
        match serde_json::from_str(&content) {
            Ok(plan) => {
                debug!("{}: reusing preserved arguments", self.name());
                Some(plan)
            }
            Err(e) => {
                warn!("{}: ignoring unreadable {}: {}", self.name(), ARGS_FILE, e);
                None
            }
        }
    }

    /// Build a plan from current parameters and persist it (and the
    /// generated config, if any) for later reuse.
    fn fresh_plan(&self, env: &WorkerEnv, port: u16) -> Result<LaunchPlan, ControlError> {
        let currency = self.kind.currency();
        let wallet = env.settings.wallets.get(currency).ok_or_else(|| {
            ControlError::validation("wallets", format!("no {} wallet configured", currency))
        })?;
        let pool = env.settings.pools.get(currency).ok_or_else(|| {
            ControlError::validation("pools", format!("no {} pool configured", currency))
        })?;
        let config_path = self.config_path();
        let ctx = LaunchContext {
            port,
            params: &self.params,
            wallet,
            pool,
            rig_name: &env.settings.rig_name,
            config_path: &config_path,
        };
        let plan = self.kind.build_args(&ctx)?;
        if let Some(config) = &plan.config {
            write_atomic(&config_path, config.as_bytes())?;
        }
        let cached = LaunchPlan {
            config: None,
            ..plan.clone()
        };
        write_atomic(&self.args_path(), &serde_json::to_vec_pretty(&cached)?)?;
        Ok(plan)
    }

    // -- configuration ------------------------------------------------------

    /// Validate, apply and persist one parameter. Config-file driven kinds
    /// get their config regenerated before this returns. On any failure the
    /// previous value stays in effect.
    pub fn set_custom_parameter(&mut self, env: &WorkerEnv, id: &str, value: &str) -> Result<(), ControlError> {
        params::validate(&self.kind.parameters(), id, value)?;
        let previous = self.params.insert(id.to_string(), value.to_string());
        let port = self.port.unwrap_or_else(|| self.kind.preferred_port());
        let regenerate = self.kind.uses_config_file();
        let planned = if regenerate { self.fresh_plan(env, port).map(|_| ()) } else { Ok(()) };
        let result = match planned {
            Ok(()) => self.persist(env).map_err(|e| (e, regenerate)),
            Err(e) => Err((e, false)),
        };
        if let Err((e, plan_written)) = result {
            match previous {
                Some(old) => self.params.insert(id.to_string(), old),
                None => self.params.remove(id),
            };
            if plan_written {
                if let Err(restore) = self.fresh_plan(env, port) {
                    warn!("{}: cannot restore launch plan: {}", self.name(), restore);
                }
            }
            return Err(e);
        }
        info!("{}: {} = {}", self.name(), id, value);
        Ok(())
    }

    /// Run a named side action.
    pub fn invoke(&mut self, env: &WorkerEnv, func: &str, value: Option<&str>) -> Result<Value, ControlError> {
        match func {
            "preserveConfig" => {
                let on = parse_flag(value)?;
                if on {
                    write_atomic(&self.marker_path(), b"")?;
                } else {
                    remove_if_present(&self.marker_path())?;
                }
                Ok(json!({ "preserve": on }))
            }
            "resetConfig" => {
                remove_if_present(&self.args_path())?;
                remove_if_present(&self.config_path())?;
                Ok(json!({ "reset": true }))
            }
            "configPath" => Ok(json!({ "path": self.args_path() })),
            "hugePages" if self.kind == WorkerKind::Xmrig => {
                let on = parse_flag(value)?;
                self.set_custom_parameter(env, "huge_pages", if on { "true" } else { "false" })?;
                Ok(json!({ "hugePages": on }))
            }
            other => Err(ControlError::validation(
                "func",
                format!("{} has no action '{}'", self.name(), other),
            )),
        }
    }

    fn commit(&mut self, env: &WorkerEnv, running: bool) -> Result<(), ControlError> {
        self.committed = running;
        self.persist(env)
    }

    fn persist(&self, env: &WorkerEnv) -> Result<(), ControlError> {
        env.store.save(
            self.name(),
            &WorkerRecord {
                parameters: self.params.clone(),
                running: self.committed,
            },
        )
    }
}


fn is_early_exit(err: &ControlError) -> bool {
    matches!(
        err,
        ControlError::Runtime {
            cause: RuntimeCause::EarlyExit(_),
            ..
        }
    )
}

fn parse_flag(value: Option<&str>) -> Result<bool, ControlError> {
    match value {
        Some("true") | Some("1") => Ok(true),
        Some("false") | Some("0") => Ok(false),
        other => Err(ControlError::validation(
            "value",
            format!("expected true or false, got {:?}", other.unwrap_or("")),
        )),
    }
}

fn remove_if_present(path: &Path) -> Result<(), ControlError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ControlError::io(format!("remove {}", path.display()), e)),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit;
    use serial_test::serial;
    use std::sync::Arc;

    fn sleeper_worker(root: &Path, env: &WorkerEnv, kind: WorkerKind) -> Worker {
        Worker::restore(kind, testkit::sleeper(root), &env.store)
    }

    #[test]
    fn restore_fills_defaults_and_committed_flag() {
        let dir = tempfile::tempdir().unwrap();
        let env = testkit::env(dir.path());
        let mut stored = Parameters::new();
        stored.insert("intensity".into(), "22".into());
        stored.insert("bogus".into(), "1".into());
        env.store
            .save("t-rex", &WorkerRecord { parameters: stored, running: true })
            .unwrap();

        let worker = Worker::restore(WorkerKind::TRex, PathBuf::from("/nonexistent"), &env.store);
        assert_eq!(worker.parameters()["intensity"], "22");
        assert_eq!(worker.parameters()["temperature_limit"], "off");
        assert!(!worker.parameters().contains_key("bogus"));
        assert!(worker.committed());
        assert!(!worker.is_running());
        assert_eq!(worker.pid(), None);
    }

    #[test]
    #[serial]
    fn start_then_stop() {
        let dir = tempfile::tempdir().unwrap();
        let (mut env, log) = testkit::env_with_log(dir.path());
        let mut worker = sleeper_worker(dir.path(), &env, WorkerKind::TRex);

        worker.start(&mut env, true).unwrap();
        let pid = worker.pid().unwrap();
        assert!(worker.is_running());
        assert!(env.ledger.contains(pid));
        assert!(worker.port().is_some());
        assert!(env.store.load("t-rex").running);
        assert!(worker.args_path().exists());

        worker.stop(&mut env, true).unwrap();
        assert!(!worker.is_running());
        assert_eq!(worker.pid(), None);
        assert!(!env.ledger.contains(pid));
        assert!(!process::is_alive(pid));
        assert!(!env.store.load("t-rex").running);

        let errors = log.runtime_errors("t-rex");
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], WorkerEvent::RuntimeError { graceful: true, .. }));
    }

    /// Records the persisted running flag each time a worker reports down.
    struct DesiredAtExit {
        store: StateStore,
        seen: std::sync::Mutex<Vec<bool>>,
    }

    impl WorkerObserver for DesiredAtExit {
        fn notify(&self, event: &WorkerEvent) {
            if let WorkerEvent::StateChanged { name, running: false } = event {
                self.seen.lock().unwrap().push(self.store.load(name).running);
            }
        }
    }

    #[test]
    #[serial]
    fn committed_stop_persists_only_after_exit() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = testkit::env(dir.path());
        let watcher = Arc::new(DesiredAtExit {
            store: env.store.clone(),
            seen: Default::default(),
        });
        env.hooks.observe(watcher.clone());
        let mut worker = sleeper_worker(dir.path(), &env, WorkerKind::TRex);

        worker.start(&mut env, true).unwrap();
        worker.stop(&mut env, true).unwrap();
        // Still committed while the exit was being handled.
        assert_eq!(*watcher.seen.lock().unwrap(), vec![true]);
        assert!(!env.store.load("t-rex").running);
        assert!(!worker.committed());
    }

    #[test]
    fn committed_stop_of_idle_worker_clears_desired_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = testkit::env(dir.path());
        env.store
            .save("gminer", &WorkerRecord { parameters: Parameters::new(), running: true })
            .unwrap();
        let mut worker = sleeper_worker(dir.path(), &env, WorkerKind::GMiner);
        assert!(worker.committed());
        worker.stop(&mut env, true).unwrap();
        assert!(!worker.committed());
        assert!(!env.store.load("gminer").running);
    }

    #[test]
    #[serial]
    fn start_without_commit_keeps_desired_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = testkit::env(dir.path());
        let mut worker = sleeper_worker(dir.path(), &env, WorkerKind::LolMiner);
        worker.start(&mut env, false).unwrap();
        assert!(!env.store.load("lolminer").running);
        worker.stop(&mut env, false).unwrap();
    }

    #[test]
    #[serial]
    fn double_start_is_domain_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = testkit::env(dir.path());
        let mut worker = sleeper_worker(dir.path(), &env, WorkerKind::GMiner);
        worker.start(&mut env, false).unwrap();
        let err = worker.start(&mut env, false).unwrap_err();
        assert_eq!(err.kind(), "DomainError");
        assert!(worker.is_running());
        worker.stop(&mut env, false).unwrap();
    }

    #[test]
    fn stopping_idle_worker_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let (mut env, log) = testkit::env_with_log(dir.path());
        let mut worker = sleeper_worker(dir.path(), &env, WorkerKind::Xmrig);
        worker.stop(&mut env, false).unwrap();
        assert!(log.events().is_empty());
    }

    #[test]
    #[serial]
    fn out_of_band_kill_is_one_unexpected_error() {
        let dir = tempfile::tempdir().unwrap();
        let (mut env, log) = testkit::env_with_log(dir.path());
        let mut worker = sleeper_worker(dir.path(), &env, WorkerKind::TRex);
        worker.start(&mut env, true).unwrap();
        let pid = worker.pid().unwrap();

        process::signal(pid, libc::SIGKILL).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while !worker.reap(&mut env) {
            assert!(Instant::now() < deadline, "child never reaped");
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(!worker.reap(&mut env));

        assert!(!worker.is_running());
        assert!(!env.ledger.contains(pid));
        // Desired state survives a crash.
        assert!(worker.committed());
        let errors = log.runtime_errors("t-rex");
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], WorkerEvent::RuntimeError { graceful: false, .. }));
    }

    #[test]
    #[serial]
    fn early_exit_is_retried_once_then_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (mut env, log) = testkit::env_with_log(dir.path());
        let binary = testkit::script(dir.path(), "crasher", "exit 3");
        let mut worker = Worker::restore(WorkerKind::GMiner, binary, &env.store);

        let err = worker.start(&mut env, true).unwrap_err();
        assert_eq!(err.kind(), "RuntimeError");
        assert!(err.to_string().contains("exit code 3"));
        assert_eq!(worker.state(), WorkerState::Idle);
        assert!(env.ledger.pids().is_empty());
        assert!(!env.store.load("gminer").running);
        assert_eq!(log.runtime_errors("gminer").len(), 1);
    }

    #[test]
    #[serial]
    fn early_exit_then_success_moves_past_first_port() {
        let dir = tempfile::tempdir().unwrap();
        let (mut env, log) = testkit::env_with_log(dir.path());
        let marker = dir.path().join("ran-once");
        let binary = testkit::script(
            dir.path(),
            "flaky",
            &format!(
                "if [ ! -e {m} ]; then touch {m}; exit 4; fi\nexec sleep 30",
                m = marker.display()
            ),
        );
        let mut worker = Worker::restore(WorkerKind::TRex, binary, &env.store);
        let first = find_free_port(WorkerKind::TRex.preferred_port()).unwrap();

        worker.start(&mut env, true).unwrap();
        assert!(marker.exists());
        assert!(worker.is_running());
        assert!(worker.port().unwrap() > first);
        assert_eq!(env.ledger.pids(), vec![worker.pid().unwrap()]);
        assert!(env.store.load("t-rex").running);
        // The failed first attempt is not surfaced as a worker crash.
        assert!(log.runtime_errors("t-rex").is_empty());

        worker.stop(&mut env, false).unwrap();
    }

    #[test]
    fn failed_config_regeneration_keeps_previous_value() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = testkit::env(dir.path());
        env.settings.wallets.clear();
        let mut worker = sleeper_worker(dir.path(), &env, WorkerKind::Xmrig);
        let before = worker.parameters().get("threads").cloned();

        let err = worker.set_custom_parameter(&env, "threads", "4").unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
        assert_eq!(worker.parameters().get("threads"), before.as_ref());
        assert_ne!(env.store.load("xmrig").parameters.get("threads").map(String::as_str), Some("4"));
        assert!(!worker.config_path().exists());
    }

    #[test]
    #[serial]
    fn preserved_arguments_are_reused() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = testkit::env(dir.path());
        let mut worker = sleeper_worker(dir.path(), &env, WorkerKind::TRex);
        let hand_edited = LaunchPlan {
            port: 15999,
            args: vec!["--hand-edited".into()],
            config: None,
        };
        let bytes = serde_json::to_vec(&hand_edited).unwrap();
        write_atomic(&worker.args_path(), &bytes).unwrap();
        worker.invoke(&env, "preserveConfig", Some("true")).unwrap();

        worker.start(&mut env, false).unwrap();
        assert_eq!(worker.port(), Some(15999));
        assert_eq!(fs::read(worker.args_path()).unwrap(), bytes);
        worker.stop(&mut env, false).unwrap();
    }

    #[test]
    fn set_custom_parameter_validates_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let env = testkit::env(dir.path());
        let mut worker = sleeper_worker(dir.path(), &env, WorkerKind::TRex);

        let err = worker.set_custom_parameter(&env, "intensity", "99").unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
        assert_eq!(worker.parameters()["intensity"], "auto");

        worker.set_custom_parameter(&env, "intensity", "20").unwrap();
        assert_eq!(env.store.load("t-rex").parameters["intensity"], "20");
        assert!(!worker.config_path().exists());
    }

    #[test]
    fn config_driven_kind_regenerates_config() {
        let dir = tempfile::tempdir().unwrap();
        let env = testkit::env(dir.path());
        let mut worker = sleeper_worker(dir.path(), &env, WorkerKind::Xmrig);
        worker.invoke(&env, "hugePages", Some("false")).unwrap();

        let config: Value =
            serde_json::from_str(&fs::read_to_string(worker.config_path()).unwrap()).unwrap();
        assert_eq!(config["cpu"]["huge-pages"], false);
        assert_eq!(env.store.load("xmrig").parameters["huge_pages"], "false");
    }

    #[test]
    fn side_actions() {
        let dir = tempfile::tempdir().unwrap();
        let env = testkit::env(dir.path());
        let mut worker = sleeper_worker(dir.path(), &env, WorkerKind::GMiner);

        let path = worker.invoke(&env, "configPath", None).unwrap();
        assert_eq!(path["path"], worker.args_path().display().to_string());

        worker.invoke(&env, "preserveConfig", Some("true")).unwrap();
        assert!(worker.marker_path().exists());
        worker.invoke(&env, "preserveConfig", Some("false")).unwrap();
        assert!(!worker.marker_path().exists());
        worker.invoke(&env, "resetConfig", None).unwrap();

        assert!(worker.invoke(&env, "preserveConfig", Some("maybe")).is_err());
        // hugePages is xmrig-only.
        assert_eq!(
            worker.invoke(&env, "hugePages", Some("true")).unwrap_err().kind(),
            "ValidationError"
        );
    }

    #[test]
    fn missing_wallet_fails_start() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = testkit::env(dir.path());
        env.settings.wallets.clear();
        let mut worker = sleeper_worker(dir.path(), &env, WorkerKind::LolMiner);
        let err = worker.start(&mut env, false).unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
        assert_eq!(worker.state(), WorkerState::Idle);
    }

    #[test]
    fn view_projects_identity() {
        let dir = tempfile::tempdir().unwrap();
        let env = testkit::env(dir.path());
        let worker = sleeper_worker(dir.path(), &env, WorkerKind::Xmrig);
        let v = serde_json::to_value(worker.view()).unwrap();
        assert_eq!(v["name"], "xmrig");
        assert_eq!(v["usesHardware"], "cpu");
        assert_eq!(v["usesAccount"], "XMR");
        assert_eq!(v["running"], false);
        assert!(v["daemonPort"].is_null());
        assert!(v["options"].as_array().unwrap().len() >= 4);
    }

    #[test]
    fn observers_shared_across_env() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = testkit::env(dir.path());
        let log = Arc::new(EventLog::default());
        env.hooks.observe(log.clone());
        env.hooks.emit(WorkerEvent::StateChanged {
            name: "x".into(),
            running: true,
        });
        assert_eq!(log.events().len(), 1);
    }
}
