use std::path::{Path, PathBuf};

use crate::types::config::Settings;


/// On-disk layout of a minerdock config directory.
///
/// ```text
/// <config_dir>/
///   settings.yaml
///   manifest.json          supplied by the downloader
///   secret                 Control-Plane shared secret
///   bin/<module>/<version>/<name>
///   state/
///     pids.json            process-exit ledger
///     manifest.json        mirror of the last verified manifest
///     workers/<name>/      state.json, args.json, config.json, preserve, output.log
/// ```
#[derive(Debug, Clone)]
pub struct Paths {
    config_dir: PathBuf,
}

impl Paths {
    pub fn new(config_dir: &Path) -> Self {
        Paths {
            config_dir: config_dir.to_path_buf(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join("settings.yaml")
    }

    pub fn manifest_file(&self) -> PathBuf {
        self.config_dir.join("manifest.json")
    }

    pub fn secret_file(&self) -> PathBuf {
        self.config_dir.join("secret")
    }

    pub fn state_dir(&self) -> PathBuf {
        self.config_dir.join("state")
    }

    pub fn ledger_file(&self) -> PathBuf {
        self.state_dir().join("pids.json")
    }

    pub fn manifest_mirror(&self) -> PathBuf {
        self.state_dir().join("manifest.json")
    }

    pub fn workers_dir(&self) -> PathBuf {
        self.state_dir().join("workers")
    }

    pub fn binaries_dir(&self, settings: &Settings) -> PathBuf {
        settings
            .binaries_dir
            .clone()
            .unwrap_or_else(|| self.config_dir.join("bin"))
    }
}
