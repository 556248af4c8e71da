//! Per-kind argument builders and stats parsers.

pub mod gminer;
pub mod lolminer;
pub mod trex;
pub mod xmrig;

use serde_json::Value;

use crate::error::ControlError;
use crate::worker::params::Parameters;


pub(crate) fn param<'a>(params: &'a Parameters, id: &str) -> &'a str {
    params.get(id).map(String::as_str).unwrap_or("")
}

pub(crate) fn num(v: &Value, pointer: &str) -> f64 {
    v.pointer(pointer).and_then(Value::as_f64).unwrap_or(0.0)
}

pub(crate) fn count(v: &Value, pointer: &str) -> u64 {
    v.pointer(pointer).and_then(Value::as_u64).unwrap_or(0)
}

pub(crate) fn text(v: &Value, pointer: &str) -> String {
    v.pointer(pointer)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Stats bodies must at least be JSON objects.
pub(crate) fn expect_object(v: &Value) -> Result<(), String> {
    if v.is_object() {
        Ok(())
    } else {
        Err(format!("expected a JSON object, got {}", v))
    }
}

/// Split `stratum+tcp://host:port` or `host:port` into its parts.
pub(crate) fn host_port(url: &str) -> Result<(String, String), ControlError> {
    let bare = url.rsplit("://").next().unwrap_or(url);
    match bare.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
            Ok((host.to_string(), port.to_string()))
        }
        _ => Err(ControlError::validation(
            "pool",
            format!("'{}' is not a host:port pool address", url),
        )),
    }
}
