//! Worker Registry: one `Worker` per installed kind, plus the
//! mutual-exclusion policy applied before every start.
//!
//! The registry owns the `WorkerEnv` shared by its workers and is itself
//! owned by the daemon loop, so every call here is already serialized.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::Serialize;
use serde_json::Value;

use crate::data::Paths;
use crate::error::ControlError;
use crate::manifest::{
    resolve_binaries, verify_installed, write_mirror, BinaryStore, DiskStore, FileManifest,
    ManifestEntry, ManifestSource,
};
use crate::telemetry::ProbeDirectory;
use crate::types::config::Settings;
use crate::worker::{Hooks, Worker, WorkerEnv, WorkerView};


/// Per-worker results of a bulk action. A failing worker never aborts the
/// rest of the batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkOutcome {
    pub ok: Vec<String>,
    pub failed: BTreeMap<String, String>,
}

impl BulkOutcome {
    fn record(&mut self, name: &str, result: Result<(), ControlError>) {
        match result {
            Ok(()) => self.ok.push(name.to_string()),
            Err(e) => {
                warn!("{}: {}", name, e);
                self.failed.insert(name.to_string(), e.to_string());
            }
        }
    }
}


pub struct Registry {
    env: WorkerEnv,
    workers: BTreeMap<String, Worker>,
    source: Box<dyn ManifestSource>,
    binaries: Box<dyn BinaryStore>,
    mirror_path: PathBuf,
    manifest: Vec<ManifestEntry>,
    probes: ProbeDirectory,
}

impl Registry {
    pub fn new(
        env: WorkerEnv,
        source: Box<dyn ManifestSource>,
        binaries: Box<dyn BinaryStore>,
        mirror_path: &Path,
    ) -> Self {
        Registry {
            env,
            workers: BTreeMap::new(),
            source,
            binaries,
            mirror_path: mirror_path.to_path_buf(),
            manifest: Vec::new(),
            probes: ProbeDirectory::default(),
        }
    }

    /// Registry over the standard config-dir layout.
    pub fn open(paths: &Paths, settings: Settings, hooks: Hooks) -> Self {
        let bin = paths.binaries_dir(&settings);
        Registry::new(
            WorkerEnv::new(paths, settings, hooks),
            Box::new(FileManifest::new(&paths.manifest_file())),
            Box::new(DiskStore::new(&bin)),
            &paths.manifest_mirror(),
        )
    }

    pub fn env(&self) -> &WorkerEnv {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut WorkerEnv {
        &mut self.env
    }

    /// Name-indexed telemetry handles; stays valid across rebuilds.
    pub fn probes(&self) -> ProbeDirectory {
        self.probes.clone()
    }

    /// The last verified manifest.
    pub fn manifest(&self) -> &[ManifestEntry] {
        &self.manifest
    }

    pub fn names(&self) -> Vec<String> {
        self.workers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn get(&self, name: &str) -> Result<&Worker, ControlError> {
        self.workers
            .get(name)
            .ok_or_else(|| ControlError::NotFound(name.to_string()))
    }

    pub fn running(&self) -> Vec<String> {
        self.workers
            .values()
            .filter(|w| w.is_running())
            .map(|w| w.name().to_string())
            .collect()
    }

    /// Re-read the manifest, verify binaries and instantiate one worker per
    /// usable kind. Running workers are stopped first so no process outlives
    /// the object that controls it.
    pub fn rebuild(&mut self) -> Result<usize, ControlError> {
        let stopped = self.stop_all(false);
        if !stopped.ok.is_empty() {
            info!("stopped {} before rebuild", stopped.ok.join(", "));
        }
        let entries = self.source.entries()?;
        let installed = verify_installed(&entries, self.binaries.as_ref());
        let verified: Vec<ManifestEntry> = installed.iter().map(|i| i.entry.clone()).collect();
        if let Err(e) = write_mirror(&self.mirror_path, &verified) {
            warn!("cannot write manifest mirror: {}", e);
        }

        let binaries = resolve_binaries(&installed, &self.env.settings);
        self.workers = binaries
            .into_iter()
            .map(|(kind, path)| {
                (
                    kind.name().to_string(),
                    Worker::restore(kind, path, &self.env.store),
                )
            })
            .collect();
        self.manifest = verified;
        self.probes.publish(
            self.workers
                .iter()
                .map(|(name, w)| (name.clone(), w.probe()))
                .collect(),
        );
        info!("registry rebuilt: [{}]", self.names().join(", "));
        Ok(self.workers.len())
    }

    /// Every worker's projection, rebuilding first if the registry is empty
    /// or `force` is set.
    pub fn workers(&mut self, force: bool) -> Result<Vec<WorkerView>, ControlError> {
        if force || self.workers.is_empty() {
            self.rebuild()?;
        }
        Ok(self.workers.values().map(Worker::view).collect())
    }

    /// Stop every running worker in `name`'s exclusion set, then start it.
    /// Exclusions are evaluated against current membership on every call,
    /// and the displaced workers' desired state follows `commit`.
    pub fn start(&mut self, name: &str, commit: bool) -> Result<(), ControlError> {
        let worker = self.get(name)?;
        if worker.is_running() {
            return Err(ControlError::Domain(format!("{} is already running", name)));
        }
        for excluded in worker.kind().exclusion_set() {
            if let Some(other) = self.workers.get_mut(excluded.name()) {
                if other.is_running() {
                    info!("stopping {} to make room for {}", other.name(), name);
                    other.stop(&mut self.env, commit)?;
                }
            }
        }
        let worker = self
            .workers
            .get_mut(name)
            .ok_or_else(|| ControlError::NotFound(name.to_string()))?;
        worker.start(&mut self.env, commit)
    }

    /// Stop a running worker. Stopping one that is not running is a domain
    /// error here, unlike `Worker::stop`.
    pub fn stop(&mut self, name: &str, commit: bool) -> Result<(), ControlError> {
        let worker = self
            .workers
            .get_mut(name)
            .ok_or_else(|| ControlError::NotFound(name.to_string()))?;
        if !worker.is_running() {
            return Err(ControlError::Domain(format!("{} is not running", name)));
        }
        worker.stop(&mut self.env, commit)
    }

    pub fn reload(&mut self, name: &str, commit: bool) -> Result<(), ControlError> {
        let worker = self
            .workers
            .get_mut(name)
            .ok_or_else(|| ControlError::NotFound(name.to_string()))?;
        worker.stop(&mut self.env, false)?;
        self.start(name, commit)
    }

    pub fn set_custom_parameter(&mut self, name: &str, id: &str, value: &str) -> Result<(), ControlError> {
        let worker = self
            .workers
            .get_mut(name)
            .ok_or_else(|| ControlError::NotFound(name.to_string()))?;
        worker.set_custom_parameter(&self.env, id, value)
    }

    pub fn invoke(&mut self, name: &str, func: &str, value: Option<&str>) -> Result<Value, ControlError> {
        let worker = self
            .workers
            .get_mut(name)
            .ok_or_else(|| ControlError::NotFound(name.to_string()))?;
        worker.invoke(&self.env, func, value)
    }

    /// Start every worker whose committed flag is set and that is not
    /// already running.
    pub fn start_all(&mut self, commit: bool) -> BulkOutcome {
        let targets: Vec<String> = self
            .workers
            .values()
            .filter(|w| w.committed() && !w.is_running())
            .map(|w| w.name().to_string())
            .collect();
        let mut outcome = BulkOutcome::default();
        for name in targets {
            let result = self.start(&name, commit);
            outcome.record(&name, result);
        }
        outcome
    }

    pub fn stop_all(&mut self, commit: bool) -> BulkOutcome {
        let mut outcome = BulkOutcome::default();
        for name in self.running() {
            let result = self.stop(&name, commit);
            outcome.record(&name, result);
        }
        outcome
    }

    pub fn reload_all(&mut self, commit: bool) -> BulkOutcome {
        let mut outcome = BulkOutcome::default();
        for name in self.running() {
            let result = self.reload(&name, commit);
            outcome.record(&name, result);
        }
        outcome
    }

    /// Detect workers whose process exited on its own. Returns their names.
    pub fn reap_exited(&mut self) -> Vec<String> {
        let env = &mut self.env;
        self.workers
            .values_mut()
            .filter_map(|w| {
                if w.reap(env) {
                    Some(w.name().to_string())
                } else {
                    None
                }
            })
            .collect()
    }

    /// Stop everything without touching desired state, so the same set is
    /// resumed on the next boot.
    pub fn shutdown(&mut self) {
        let outcome = self.stop_all(false);
        for (name, err) in &outcome.failed {
            warn!("{} did not stop cleanly: {}", name, err);
        }
    }
}
