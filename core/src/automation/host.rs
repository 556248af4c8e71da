//! The fixed capability set the automation policy may use: idle time,
//! profitability ranking, and start/stop by worker name.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;

use crate::daemon::DaemonHandle;
use crate::error::ControlError;
use crate::infrastructure::CommandRunner;
use crate::queue::Action;


/// Milliseconds since the user last touched keyboard or mouse.
pub trait IdleSource: Send {
    fn idle_ms(&self) -> Result<u64, ControlError>;
}

/// Runs a shell command (such as `xprintidle`) that prints idle
/// milliseconds on stdout.
pub struct CommandIdleSource {
    runner: Box<dyn CommandRunner>,
    command: String,
}

impl CommandIdleSource {
    pub fn new(runner: Box<dyn CommandRunner>, command: &str) -> Self {
        CommandIdleSource {
            runner,
            command: command.to_string(),
        }
    }
}

impl IdleSource for CommandIdleSource {
    fn idle_ms(&self) -> Result<u64, ControlError> {
        let out = self
            .runner
            .run(&self.command)
            .map_err(|e| ControlError::runtime(format!("idle command '{}'", self.command), e.trim().to_string()))?;
        out.trim().parse::<u64>().map_err(|_| {
            ControlError::validation("idle", format!("'{}' printed {:?}, not milliseconds", self.command, out.trim()))
        })
    }
}

/// Settable idle time.
#[derive(Debug, Default)]
pub struct FixedIdle(AtomicU64);

impl FixedIdle {
    pub fn new(ms: u64) -> Self {
        FixedIdle(AtomicU64::new(ms))
    }

    pub fn set(&self, ms: u64) {
        self.0.store(ms, Ordering::SeqCst);
    }
}

impl IdleSource for FixedIdle {
    fn idle_ms(&self) -> Result<u64, ControlError> {
        Ok(self.0.load(Ordering::SeqCst))
    }
}

impl<T: IdleSource + Sync> IdleSource for std::sync::Arc<T> {
    fn idle_ms(&self) -> Result<u64, ControlError> {
        (**self).idle_ms()
    }
}


pub trait ProfitabilitySource: Send {
    /// Order `installed` worker names best first.
    fn rank(&self, installed: &[String]) -> Vec<String>;
}

/// Ranks by fixed per-kind scores. Unscored workers rank last; ties go by
/// name.
#[derive(Debug, Clone, Default)]
pub struct StaticProfitability {
    scores: BTreeMap<String, f64>,
}

impl StaticProfitability {
    pub fn new(scores: BTreeMap<String, f64>) -> Self {
        StaticProfitability { scores }
    }
}

impl ProfitabilitySource for StaticProfitability {
    fn rank(&self, installed: &[String]) -> Vec<String> {
        let mut ranked: Vec<(f64, String)> = installed
            .iter()
            .map(|name| (self.scores.get(name).copied().unwrap_or(f64::NEG_INFINITY), name.clone()))
            .collect();
        ranked.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        ranked.into_iter().map(|(_, name)| name).collect()
    }
}


/// What the engine is allowed to do to the registry.
pub trait AutomationHost: Send {
    /// Installed workers, best first.
    fn ranking(&self) -> Result<Vec<String>, ControlError>;
    fn running(&self) -> Result<Vec<String>, ControlError>;
    fn start(&self, name: &str) -> Result<(), ControlError>;
    fn stop(&self, name: &str) -> Result<(), ControlError>;
}


/// Host that submits through the daemon's Action Queue, like any other
/// caller. Automation decisions are not committed as desired state.
pub struct QueueHost {
    handle: DaemonHandle,
    profitability: Box<dyn ProfitabilitySource>,
}

impl QueueHost {
    pub fn new(handle: DaemonHandle, profitability: Box<dyn ProfitabilitySource>) -> Self {
        QueueHost {
            handle,
            profitability,
        }
    }

    fn list(&self) -> Result<Vec<Value>, ControlError> {
        match self.handle.submit(Action::ListWorkers { force: false })? {
            Value::Array(items) => Ok(items),
            other => Err(ControlError::Internal(format!("unexpected worker list {}", other))),
        }
    }
}

fn names_where(items: &[Value], pred: impl Fn(&Value) -> bool) -> Vec<String> {
    items
        .iter()
        .filter(|w| pred(w))
        .filter_map(|w| w.get("name").and_then(Value::as_str).map(str::to_string))
        .collect()
}

impl AutomationHost for QueueHost {
    fn ranking(&self) -> Result<Vec<String>, ControlError> {
        let installed = names_where(&self.list()?, |_| true);
        Ok(self.profitability.rank(&installed))
    }

    fn running(&self) -> Result<Vec<String>, ControlError> {
        Ok(names_where(&self.list()?, |w| w["running"] == true))
    }

    fn start(&self, name: &str) -> Result<(), ControlError> {
        self.handle
            .submit(Action::Start {
                name: name.to_string(),
                commit: false,
            })
            .map(|_| ())
    }

    fn stop(&self, name: &str) -> Result<(), ControlError> {
        self.handle
            .submit(Action::Stop {
                name: name.to_string(),
                commit: false,
            })
            .map(|_| ())
    }
}
