//! Fixtures shared by unit tests: fake executables and a scratch env.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::data::Paths;
use crate::types::config::Settings;
use crate::worker::{EventLog, Hooks, WorkerEnv};


/// Write an executable `#!/bin/sh` script.
pub fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// A stand-in miner that ignores its arguments and idles.
pub fn sleeper(dir: &Path) -> PathBuf {
    let path = dir.join("sleeper");
    if path.exists() {
        return path;
    }
    script(dir, "sleeper", "exec sleep 30")
}

pub fn settings() -> Settings {
    let mut s = Settings::default();
    for currency in ["XMR", "RVN", "ETC", "ERG"] {
        s.wallets.insert(currency.into(), format!("{}-wallet", currency.to_lowercase()));
        s.pools.insert(currency.into(), "pool.example:3333".into());
    }
    s.stop_timeout_ms = 2_000;
    s.startup_grace_ms = 100;
    s.rig_name = "test-rig".into();
    s
}

pub fn env(root: &Path) -> WorkerEnv {
    WorkerEnv::new(&Paths::new(root), settings(), Hooks::default())
}

pub fn env_with_log(root: &Path) -> (WorkerEnv, Arc<EventLog>) {
    let mut env = env(root);
    let log = Arc::new(EventLog::default());
    env.hooks.observe(log.clone());
    (env, log)
}
