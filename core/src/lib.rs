//! Minerdock: a local daemon that supervises third-party cryptocurrency
//! miner executables.
//!
//! # Modules
//!
//! - [`worker`]: one supervised miner: lifecycle, parameters, launch plans
//! - [`registry`]: the set of installed workers, rebuilt from the manifest
//! - [`daemon`]: Action Queue consumer and main loop
//! - [`api`]: loopback Control-Plane HTTP surface
//! - [`telemetry`]: stats and speed read from each miner's own API
//! - [`automation`]: idle-time policy that starts and stops workers
//! - [`manifest`]: binary manifest, checksum verification, mirror
//! - [`infrastructure`]: ports, processes, pid ledger, shell runner
//! - [`data`]: on-disk layout, settings, per-worker state

pub mod api;
pub mod automation;
pub mod daemon;
pub mod data;
pub mod error;
pub mod infrastructure;
pub mod manifest;
pub mod queue;
pub mod registry;
pub mod telemetry;
pub mod types;
pub mod worker;

#[cfg(test)]
mod testkit;

pub use error::ControlError;

use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
