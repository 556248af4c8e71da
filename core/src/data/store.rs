//! Durable per-worker state and the atomic write helper used by every
//! persisted file (worker blobs, ledger, manifest mirror, settings).

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::ControlError;


/// Write `bytes` to `path` via a sibling temp file, fsync, then rename.
/// A crash mid-write leaves either the old or the new content, never a mix.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ControlError> {
    write_with_mode(path, bytes, 0o666)
}

/// `write_atomic` for files only the owner may read. The temp file is
/// created 0600, so the content is never visible under a wider mode.
pub fn write_private(path: &Path, bytes: &[u8]) -> Result<(), ControlError> {
    write_with_mode(path, bytes, 0o600)
}

fn write_with_mode(path: &Path, bytes: &[u8], mode: u32) -> Result<(), ControlError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| ControlError::io(format!("cannot create {}", parent.display()), e))?;
    }
    let tmp = path.with_extension("tmp");
    let write = || -> std::io::Result<()> {
        // A leftover temp file would keep its old mode.
        match fs::remove_file(&tmp) {
            Err(e) if e.kind() != ErrorKind::NotFound => return Err(e),
            _ => {}
        }
        let mut file = OpenOptions::new().write(true).create_new(true).mode(mode).open(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    };
    write().map_err(|e| ControlError::io(format!("cannot write {}", path.display()), e))
}


/// The persisted slice of a worker: its parameters and committed
/// (desired) running flag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerRecord {
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    #[serde(default)]
    pub running: bool,
}


/// Reads and writes `WorkerRecord`s under `<state_dir>/workers/<name>/state.json`.
#[derive(Debug, Clone)]
pub struct StateStore {
    root: PathBuf,
}

impl StateStore {
    pub fn new(root: &Path) -> Self {
        StateStore {
            root: root.to_path_buf(),
        }
    }

    pub fn worker_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.worker_dir(name).join("state.json")
    }

    /// Load a record. Missing or unreadable records yield the default so a
    /// corrupt blob never prevents the worker from being instantiated.
    pub fn load(&self, name: &str) -> WorkerRecord {
        let path = self.record_path(name);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => return WorkerRecord::default(),
        };
        match serde_json::from_str(&content) {
            Ok(record) => record,
            Err(e) => {
                warn!("discarding corrupt state for {}: {}", name, e);
                WorkerRecord::default()
            }
        }
    }

    pub fn save(&self, name: &str, record: &WorkerRecord) -> Result<(), ControlError> {
        let json = serde_json::to_vec_pretty(record)?;
        write_atomic(&self.record_path(name), &json)
    }
}
