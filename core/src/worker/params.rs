//! Enumerated worker settings: descriptors, validation and restoration of
//! persisted values.

use std::collections::BTreeMap;

use log::warn;
use serde::Serialize;

use crate::error::ControlError;

/// Current value of every parameter, keyed by parameter id.
pub type Parameters = BTreeMap<String, String>;


#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterOption {
    pub value: String,
    pub label: String,
}

/// One configurable setting with its legal value set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSpec {
    pub id: String,
    pub label: String,
    pub options: Vec<ParameterOption>,
    pub default: String,
}

impl ParameterSpec {
    pub fn new(id: &str, label: &str, default: &str) -> Self {
        ParameterSpec {
            id: id.to_string(),
            label: label.to_string(),
            options: Vec::new(),
            default: default.to_string(),
        }
    }

    pub fn option(mut self, value: &str, label: &str) -> Self {
        self.options.push(ParameterOption {
            value: value.to_string(),
            label: label.to_string(),
        });
        self
    }

    pub fn allows(&self, value: &str) -> bool {
        self.options.iter().any(|o| o.value == value)
    }
}


/// Check `value` against the enumeration of parameter `id`.
pub fn validate(specs: &[ParameterSpec], id: &str, value: &str) -> Result<(), ControlError> {
    let spec = specs
        .iter()
        .find(|s| s.id == id)
        .ok_or_else(|| ControlError::validation("id", format!("unknown parameter '{}'", id)))?;
    if spec.allows(value) {
        Ok(())
    } else {
        let legal: Vec<&str> = spec.options.iter().map(|o| o.value.as_str()).collect();
        Err(ControlError::validation(
            "value",
            format!("'{}' is not one of [{}] for {}", value, legal.join(", "), id),
        ))
    }
}


/// Merge persisted values over defaults. Unknown ids and values no longer in
/// the enumeration are dropped.
pub fn restore(specs: &[ParameterSpec], stored: &Parameters) -> Parameters {
    let mut params = Parameters::new();
    for spec in specs {
        let value = match stored.get(&spec.id) {
            Some(v) if spec.allows(v) => v.clone(),
            Some(v) => {
                warn!("dropping stale value '{}' for parameter {}", v, spec.id);
                spec.default.clone()
            }
            None => spec.default.clone(),
        };
        params.insert(spec.id.clone(), value);
    }
    params
}
