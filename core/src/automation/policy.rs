//! Declarative automation policy: an ordered idle-time rule table.
//!
//! ```yaml
//! rules:
//!   - idle_at_least_ms: 60000
//!     action: start_best
//!   - idle_at_least_ms: 0
//!     idle_below_ms: 60000
//!     action: stop_all
//! ```
//!
//! `action` is one of `start_best`, `stop_all`, `start:<worker>` or
//! `stop:<worker>`. The first matching rule wins.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ControlError;

pub const DEFAULT_IDLE_THRESHOLD_MS: u64 = 60_000;


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RuleAction {
    /// Start the most profitable installed worker.
    StartBest,
    Start(String),
    Stop(String),
    StopAll,
}

impl TryFrom<String> for RuleAction {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.trim() {
            "start_best" => return Ok(RuleAction::StartBest),
            "stop_all" => return Ok(RuleAction::StopAll),
            _ => {}
        }
        match s.trim().split_once(':') {
            Some(("start", name)) if !name.trim().is_empty() => Ok(RuleAction::Start(name.trim().into())),
            Some(("stop", name)) if !name.trim().is_empty() => Ok(RuleAction::Stop(name.trim().into())),
            _ => Err(format!("unknown action '{}'", s)),
        }
    }
}

impl From<RuleAction> for String {
    fn from(a: RuleAction) -> String {
        a.to_string()
    }
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleAction::StartBest => f.write_str("start_best"),
            RuleAction::Start(name) => write!(f, "start:{}", name),
            RuleAction::Stop(name) => write!(f, "stop:{}", name),
            RuleAction::StopAll => f.write_str("stop_all"),
        }
    }
}


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub idle_at_least_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_below_ms: Option<u64>,
    pub action: RuleAction,
}

impl Rule {
    pub fn matches(&self, idle_ms: u64) -> bool {
        idle_ms >= self.idle_at_least_ms && self.idle_below_ms.map_or(true, |below| idle_ms < below)
    }
}


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub rules: Vec<Rule>,
}

impl Default for Policy {
    /// Mine on the best worker once the user has been away for a minute;
    /// stop everything as soon as they return.
    fn default() -> Self {
        Policy {
            rules: vec![
                Rule {
                    idle_at_least_ms: DEFAULT_IDLE_THRESHOLD_MS,
                    idle_below_ms: None,
                    action: RuleAction::StartBest,
                },
                Rule {
                    idle_at_least_ms: 0,
                    idle_below_ms: Some(DEFAULT_IDLE_THRESHOLD_MS),
                    action: RuleAction::StopAll,
                },
            ],
        }
    }
}

impl Policy {
    pub fn parse(yaml: &str) -> Result<Policy, ControlError> {
        let policy: Policy = serde_yaml::from_str(yaml)
            .map_err(|e| ControlError::validation("policy", e.to_string()))?;
        policy.check()?;
        Ok(policy)
    }

    pub fn load(path: &Path) -> Result<Policy, ControlError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ControlError::io(format!("read {}", path.display()), e))?;
        Policy::parse(&content)
    }

    fn check(&self) -> Result<(), ControlError> {
        if self.rules.is_empty() {
            return Err(ControlError::validation("policy", "no rules"));
        }
        for (i, rule) in self.rules.iter().enumerate() {
            if let Some(below) = rule.idle_below_ms {
                if below <= rule.idle_at_least_ms {
                    return Err(ControlError::validation(
                        "policy",
                        format!("rule {}: idle_below_ms must exceed idle_at_least_ms", i),
                    ));
                }
            }
        }
        Ok(())
    }

    /// First rule matching `idle_ms`, with its index.
    pub fn select(&self, idle_ms: u64) -> Option<(usize, &Rule)> {
        self.rules.iter().enumerate().find(|(_, r)| r.matches(idle_ms))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table() {
        let p = Policy::default();
        assert_eq!(p.select(0).unwrap().1.action, RuleAction::StopAll);
        assert_eq!(p.select(59_999).unwrap().0, 1);
        assert_eq!(p.select(60_000).unwrap().1.action, RuleAction::StartBest);
    }

    #[test]
    fn parse_yaml_table() {
        let yaml = "\
rules:
  - idle_at_least_ms: 300000
    action: start:xmrig
  - idle_at_least_ms: 120000
    idle_below_ms: 300000
    action: start_best
  - idle_at_least_ms: 0
    idle_below_ms: 120000
    action: stop:t-rex
";
        let p = Policy::parse(yaml).unwrap();
        assert_eq!(p.rules.len(), 3);
        assert_eq!(p.select(400_000).unwrap().1.action, RuleAction::Start("xmrig".into()));
        assert_eq!(p.select(150_000).unwrap().1.action, RuleAction::StartBest);
        assert_eq!(p.select(10).unwrap().1.action, RuleAction::Stop("t-rex".into()));
    }

    #[test]
    fn gaps_select_nothing() {
        let p = Policy::parse("rules:\n  - idle_at_least_ms: 1000\n    action: stop_all\n").unwrap();
        assert!(p.select(500).is_none());
    }

    #[test]
    fn rejects_bad_tables() {
        assert!(Policy::parse("rules: []").is_err());
        assert!(Policy::parse("rules:\n  - idle_at_least_ms: 5\n    action: explode\n").is_err());
        assert!(Policy::parse(
            "rules:\n  - idle_at_least_ms: 5\n    idle_below_ms: 5\n    action: stop_all\n"
        )
        .is_err());
    }

    #[test]
    fn action_display_round_trips_through_yaml() {
        let yaml = serde_yaml::to_string(&Policy::default()).unwrap();
        assert!(yaml.contains("start_best"));
        assert_eq!(Policy::parse(&yaml).unwrap(), Policy::default());
    }
}
