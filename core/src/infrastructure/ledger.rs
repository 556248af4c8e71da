//! Process-exit ledger: persisted pids of every process we spawned.
//!
//! A pid is added right after spawn and removed once the process is known to
//! be gone. Anything still listed when the daemon boots was left behind by an
//! ungraceful shutdown and is terminated before any worker starts.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{info, warn};

use crate::data::write_atomic;
use crate::error::ControlError;
use crate::infrastructure::process;


#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    pids: BTreeSet<u32>,
}

impl Ledger {
    /// Load the ledger at `path`. Missing or corrupt files yield an empty
    /// ledger; a corrupt file is logged and overwritten on the next change.
    pub fn load(path: &Path) -> Ledger {
        let pids = match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<Vec<u32>>(&content) {
                Ok(list) => list.into_iter().collect(),
                Err(e) => {
                    warn!("ignoring corrupt ledger {}: {}", path.display(), e);
                    BTreeSet::new()
                }
            },
            Err(_) => BTreeSet::new(),
        };
        Ledger {
            path: path.to_path_buf(),
            pids,
        }
    }

    pub fn pids(&self) -> Vec<u32> {
        self.pids.iter().copied().collect()
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.pids.contains(&pid)
    }

    pub fn add(&mut self, pid: u32) -> Result<(), ControlError> {
        if self.pids.insert(pid) {
            self.persist()?;
        }
        Ok(())
    }

    pub fn remove(&mut self, pid: u32) -> Result<(), ControlError> {
        if self.pids.remove(&pid) {
            self.persist()?;
        }
        Ok(())
    }

    /// Terminate every listed process and clear the ledger. Returns the
    /// pids that were still alive and got signalled.
    pub fn reap_orphans(&mut self, timeout: Duration) -> Result<Vec<u32>, ControlError> {
        let mut killed = Vec::new();
        for pid in self.pids() {
            if process::terminate_pid(pid, timeout) {
                info!("terminated orphaned worker process {}", pid);
                killed.push(pid);
            }
        }
        if !self.pids.is_empty() {
            self.pids.clear();
            self.persist()?;
        }
        Ok(killed)
    }

    fn persist(&self) -> Result<(), ControlError> {
        let list: Vec<u32> = self.pids();
        write_atomic(&self.path, &serde_json::to_vec(&list)?)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::process::Command;

    #[test]
    fn add_remove_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pids.json");
        let mut ledger = Ledger::load(&path);
        ledger.add(100).unwrap();
        ledger.add(200).unwrap();
        ledger.remove(100).unwrap();

        let reloaded = Ledger::load(&path);
        assert_eq!(reloaded.pids(), vec![200]);
        assert_eq!(fs::read_to_string(&path).unwrap(), "[200]");
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pids.json");
        fs::write(&path, "not json").unwrap();
        assert!(Ledger::load(&path).pids().is_empty());
    }

    #[test]
    fn reap_orphans_terminates_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pids.json");
        let mut orphan = Command::new("sleep").arg("30").spawn().unwrap();

        let mut ledger = Ledger::load(&path);
        ledger.add(orphan.id()).unwrap();
        drop(ledger);

        let mut ledger = Ledger::load(&path);
        let killed = ledger.reap_orphans(Duration::from_millis(200)).unwrap();
        assert_eq!(killed, vec![orphan.id()]);
        let status = orphan.wait().unwrap();
        assert!(status.signal().is_some());
        assert!(Ledger::load(&path).pids().is_empty());
    }

    #[test]
    fn reap_skips_dead_pids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pids.json");
        let mut gone = Command::new("true").spawn().unwrap();
        gone.wait().unwrap();

        let mut ledger = Ledger::load(&path);
        ledger.add(gone.id()).unwrap();
        let killed = ledger.reap_orphans(Duration::from_millis(50)).unwrap();
        assert!(killed.is_empty());
        assert!(ledger.pids().is_empty());
    }
}
