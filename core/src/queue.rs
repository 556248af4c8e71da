//! Actions carried by the Action Queue.
//!
//! Every registry mutation, from either the Control-Plane API or the
//! Automation Engine, is expressed as an `Action` and executed by the daemon
//! loop one at a time, in submission order.

use serde_json::{json, Value};

use crate::error::ControlError;
use crate::registry::Registry;


#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Projection of every worker; `force` rebuilds the registry first.
    ListWorkers { force: bool },
    Manifest,
    Start { name: String, commit: bool },
    Stop { name: String, commit: bool },
    Reload { name: String, commit: bool },
    /// Start every worker whose committed flag is set.
    StartAll { commit: bool },
    StopAll { commit: bool },
    ReloadAll { commit: bool },
    SetParameter { name: String, id: String, value: String },
    Invoke { name: String, func: String, value: Option<String> },
}

impl Action {
    /// Short label for logs.
    pub fn label(&self) -> String {
        match self {
            Action::ListWorkers { force } => format!("list(force={})", force),
            Action::Manifest => "manifest".into(),
            Action::Start { name, .. } => format!("start {}", name),
            Action::Stop { name, .. } => format!("stop {}", name),
            Action::Reload { name, .. } => format!("reload {}", name),
            Action::StartAll { .. } => "start all".into(),
            Action::StopAll { .. } => "stop all".into(),
            Action::ReloadAll { .. } => "reload all".into(),
            Action::SetParameter { name, id, .. } => format!("set {}.{}", name, id),
            Action::Invoke { name, func, .. } => format!("func {}.{}", name, func),
        }
    }

    /// Run this action to completion against the registry.
    pub fn execute(self, registry: &mut Registry) -> Result<Value, ControlError> {
        match self {
            Action::ListWorkers { force } => Ok(serde_json::to_value(registry.workers(force)?)?),
            Action::Manifest => Ok(serde_json::to_value(registry.manifest())?),
            Action::Start { name, commit } => {
                registry.start(&name, commit)?;
                Ok(json!({ "name": name, "running": true }))
            }
            Action::Stop { name, commit } => {
                registry.stop(&name, commit)?;
                Ok(json!({ "name": name, "running": false }))
            }
            Action::Reload { name, commit } => {
                registry.reload(&name, commit)?;
                Ok(json!({ "name": name, "running": true }))
            }
            Action::StartAll { commit } => Ok(serde_json::to_value(registry.start_all(commit))?),
            Action::StopAll { commit } => Ok(serde_json::to_value(registry.stop_all(commit))?),
            Action::ReloadAll { commit } => Ok(serde_json::to_value(registry.reload_all(commit))?),
            Action::SetParameter { name, id, value } => {
                registry.set_custom_parameter(&name, &id, &value)?;
                Ok(json!({ "name": name, "id": id, "value": value }))
            }
            Action::Invoke { name, func, value } => registry.invoke(&name, &func, value.as_deref()),
        }
    }
}
