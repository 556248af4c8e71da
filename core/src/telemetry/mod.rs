//! Worker telemetry: the rolling rate window, loopback stats probing, the
//! background sampler and the typed results handed back to callers.

pub mod probe;
pub mod sampler;
pub mod window;

use serde::{Deserialize, Serialize};

pub use probe::{ProbeDirectory, WorkerProbe};
pub use sampler::Sampler;
pub use window::TelemetryWindow;


/// Normalised status report of a wrapped executable. Rates are in H/s.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MinerStats {
    pub hashrate: f64,
    pub accepted: u64,
    pub rejected: u64,
    pub uptime_secs: u64,
    pub devices: Vec<DeviceStats>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceStats {
    pub index: u32,
    pub name: String,
    pub hashrate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Speed {
    pub current: f64,
    /// `None` until the window is a minute old.
    pub minute: Option<f64>,
    /// `None` until the window is an hour old.
    pub hour: Option<f64>,
}

/// Outcome of a telemetry read. Never an error: a worker that cannot be
/// queried is reported, not failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum Reading<T> {
    Available(T),
    Unavailable(Unavailable),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Unavailable {
    NotRunning,
    Timeout,
    Unreachable,
    Malformed,
}
