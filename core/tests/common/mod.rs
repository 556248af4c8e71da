//! Config-directory fixtures for the integration tests.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use minerdock_core::data::{settings, Paths};
use minerdock_core::manifest::{sha256_file, ManifestEntry};
use minerdock_core::types::config::Settings;
use minerdock_core::worker::WorkerKind;


pub struct ConfigDir {
    pub dir: tempfile::TempDir,
    pub paths: Paths,
}

impl ConfigDir {
    pub fn new() -> ConfigDir {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(dir.path());
        ConfigDir { dir, paths }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Settings with a wallet and pool for every coin and short timeouts.
    pub fn settings(&self) -> Settings {
        let mut s = Settings::default();
        for currency in ["XMR", "RVN", "ETC", "ERG"] {
            s.wallets.insert(currency.into(), format!("{}-wallet", currency.to_lowercase()));
            s.pools.insert(currency.into(), "pool.example:3333".into());
        }
        s.api_port = 0;
        s.stop_timeout_ms = 500;
        s.startup_grace_ms = 100;
        s.poll_interval_ms = 20;
        s.rig_name = "it-rig".into();
        s
    }

    /// Persist `settings` to settings.yaml and read it back.
    pub fn write_settings(&self, s: &Settings) -> Settings {
        settings::save(&self.paths.settings_file(), s).unwrap();
        settings::load(&self.paths.settings_file()).unwrap()
    }

    /// Install an idling stand-in binary per kind under bin/ and list the
    /// checksums in manifest.json.
    pub fn install(&self, kinds: &[WorkerKind]) -> Vec<ManifestEntry> {
        let mut entries = Vec::new();
        for kind in kinds {
            let dir = self.root().join("bin").join(kind.module()).join("2.1.0");
            fs::create_dir_all(&dir).unwrap();
            let path = dir.join(kind.name());
            write_script(&path, "exec sleep 30");
            entries.push(ManifestEntry {
                name: kind.name().into(),
                hash: sha256_file(&path).unwrap(),
                version: "2.1.0".into(),
                module: kind.module().into(),
            });
        }
        fs::write(self.paths.manifest_file(), serde_json::to_vec(&entries).unwrap()).unwrap();
        entries
    }

    pub fn ledger(&self) -> Vec<u32> {
        match fs::read_to_string(self.paths.ledger_file()) {
            Ok(s) => serde_json::from_str(&s).unwrap(),
            Err(_) => Vec::new(),
        }
    }
}

pub fn write_script(path: &PathBuf, body: &str) {
    fs::write(path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}
