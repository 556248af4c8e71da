use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Daemon settings, loaded from `settings.yaml`. Every key is optional;
/// missing keys fall back to `Settings::default()`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Loopback port of the Control-Plane API.
    pub api_port: u16,
    /// Root of downloaded worker binaries. Defaults to `<config_dir>/bin`.
    pub binaries_dir: Option<PathBuf>,
    /// Daemon tick: how long the queue consumer waits for an event.
    pub poll_interval_ms: u64,
    pub stats_timeout_ms: u64,
    /// How often running workers' rates are sampled into their telemetry
    /// window. 0 disables background sampling.
    pub sample_interval_ms: u64,
    /// Grace period between SIGTERM and SIGKILL.
    pub stop_timeout_ms: u64,
    /// How long a freshly spawned process must survive to count as started.
    pub startup_grace_ms: u64,
    pub rig_name: String,
    /// currency -> payout address
    pub wallets: BTreeMap<String, String>,
    /// currency -> pool URL
    pub pools: BTreeMap<String, String>,
    /// Worker kinds enabled even without a verified manifest entry.
    pub force_include: Vec<String>,
    /// kind -> executable path, used together with `force_include`.
    pub binary_overrides: BTreeMap<String, PathBuf>,
    /// kind -> relative profitability score.
    pub profitability: BTreeMap<String, f64>,
    pub automation: AutomationSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AutomationSettings {
    pub enabled: bool,
    pub interval_ms: u64,
    /// YAML rule table; the built-in default table is used when unset.
    pub policy_file: Option<PathBuf>,
    /// Shell command printing milliseconds since last user input.
    pub idle_command: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            api_port: 7474,
            binaries_dir: None,
            poll_interval_ms: 50,
            stats_timeout_ms: 1500,
            sample_interval_ms: 1000,
            stop_timeout_ms: 5000,
            startup_grace_ms: 500,
            rig_name: "minerdock".into(),
            wallets: BTreeMap::new(),
            pools: BTreeMap::new(),
            force_include: Vec::new(),
            binary_overrides: BTreeMap::new(),
            profitability: BTreeMap::new(),
            automation: AutomationSettings::default(),
        }
    }
}

impl Default for AutomationSettings {
    fn default() -> Self {
        AutomationSettings {
            enabled: false,
            interval_ms: 10_000,
            policy_file: None,
            idle_command: "xprintidle".into(),
        }
    }
}
