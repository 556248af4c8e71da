//! The closed set of worker kinds and the capability interface each one
//! provides: parameters, argument building, stats parsing, exclusions.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ControlError;
use crate::telemetry::MinerStats;
use crate::worker::kinds::{gminer, lolminer, trex, xmrig};
use crate::worker::params::{ParameterSpec, Parameters};


#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WorkerKind {
    #[serde(rename = "xmrig")]
    Xmrig,
    #[serde(rename = "t-rex")]
    TRex,
    #[serde(rename = "gminer")]
    GMiner,
    #[serde(rename = "lolminer")]
    LolMiner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hardware {
    Cpu,
    Gpu,
}

/// Inputs to a kind's argument builder.
#[derive(Debug, Clone)]
pub struct LaunchContext<'a> {
    pub port: u16,
    pub params: &'a Parameters,
    pub wallet: &'a str,
    pub pool: &'a str,
    pub rig_name: &'a str,
    /// Where a config-file driven kind must write its generated config.
    pub config_path: &'a Path,
}

/// Resolved command line, cached on disk for "preserve configuration".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchPlan {
    pub port: u16,
    pub args: Vec<String>,
    /// Contents of the generated config file, if the kind uses one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
}

pub const ALL_KINDS: [WorkerKind; 4] = [
    WorkerKind::Xmrig,
    WorkerKind::TRex,
    WorkerKind::GMiner,
    WorkerKind::LolMiner,
];

const GPU_KINDS: [WorkerKind; 3] = [WorkerKind::TRex, WorkerKind::GMiner, WorkerKind::LolMiner];

impl WorkerKind {
    /// Worker name; also the registry key and the manifest module tag.
    pub fn name(self) -> &'static str {
        match self {
            WorkerKind::Xmrig => "xmrig",
            WorkerKind::TRex => "t-rex",
            WorkerKind::GMiner => "gminer",
            WorkerKind::LolMiner => "lolminer",
        }
    }

    pub fn from_name(name: &str) -> Option<WorkerKind> {
        ALL_KINDS.iter().copied().find(|k| k.name() == name)
    }

    pub fn module(self) -> &'static str {
        self.name()
    }

    pub fn hardware(self) -> Hardware {
        match self {
            WorkerKind::Xmrig => Hardware::Cpu,
            _ => Hardware::Gpu,
        }
    }

    /// Payout currency; selects the wallet and pool from settings.
    pub fn currency(self) -> &'static str {
        match self {
            WorkerKind::Xmrig => "XMR",
            WorkerKind::TRex => "RVN",
            WorkerKind::GMiner => "ETC",
            WorkerKind::LolMiner => "ERG",
        }
    }

    /// Kinds that must not run alongside this one. GPU miners contend for
    /// the same devices.
    pub fn exclusion_set(self) -> Vec<WorkerKind> {
        match self.hardware() {
            Hardware::Cpu => Vec::new(),
            Hardware::Gpu => GPU_KINDS.iter().copied().filter(|k| *k != self).collect(),
        }
    }

    pub fn preferred_port(self) -> u16 {
        match self {
            WorkerKind::Xmrig => 16000,
            WorkerKind::TRex => 14050,
            WorkerKind::GMiner => 14060,
            WorkerKind::LolMiner => 14070,
        }
    }

    /// Whether the executable is driven by a generated config file.
    pub fn uses_config_file(self) -> bool {
        matches!(self, WorkerKind::Xmrig)
    }

    pub fn parameters(self) -> Vec<ParameterSpec> {
        match self {
            WorkerKind::Xmrig => xmrig::parameters(),
            WorkerKind::TRex => trex::parameters(),
            WorkerKind::GMiner => gminer::parameters(),
            WorkerKind::LolMiner => lolminer::parameters(),
        }
    }

    pub fn build_args(self, ctx: &LaunchContext) -> Result<LaunchPlan, ControlError> {
        match self {
            WorkerKind::Xmrig => xmrig::build_args(ctx),
            WorkerKind::TRex => trex::build_args(ctx),
            WorkerKind::GMiner => gminer::build_args(ctx),
            WorkerKind::LolMiner => lolminer::build_args(ctx),
        }
    }

    pub fn stats_path(self) -> &'static str {
        match self {
            WorkerKind::Xmrig => "/2/summary",
            WorkerKind::TRex => "/summary",
            WorkerKind::GMiner => "/stat",
            WorkerKind::LolMiner => "/summary",
        }
    }

    pub fn parse_stats(self, body: &Value) -> Result<MinerStats, String> {
        match self {
            WorkerKind::Xmrig => xmrig::parse_stats(body),
            WorkerKind::TRex => trex::parse_stats(body),
            WorkerKind::GMiner => gminer::parse_stats(body),
            WorkerKind::LolMiner => lolminer::parse_stats(body),
        }
    }
}
