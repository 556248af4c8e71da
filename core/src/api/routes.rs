//! URL → `Route` parsing for the Control-Plane API.
//!
//! ```text
//! GET /manifest
//! GET /workers?asArray=&updateCache=
//! GET /workers/{start|stop|reload}?dontCommit=
//! GET /workers/:id/{start|stop|reload}?dontCommit=
//! GET /workers/:id/setCustomParameter?id=&value=
//! GET /workers/:id/{getStats|getSpeed}
//! GET /workers/:id/func/:func?value=
//! ```

use std::collections::BTreeMap;

use crate::error::ControlError;


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Start,
    Stop,
    Reload,
}

impl Op {
    fn parse(s: &str) -> Option<Op> {
        match s {
            "start" => Some(Op::Start),
            "stop" => Some(Op::Stop),
            "reload" => Some(Op::Reload),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Read {
    Stats,
    Speed,
}


#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    Manifest,
    Workers { as_array: bool, update_cache: bool },
    Bulk { op: Op, commit: bool },
    Single { name: String, op: Op, commit: bool },
    SetParameter { name: String, id: String, value: String },
    Telemetry { name: String, read: Read },
    Func { name: String, func: String, value: Option<String> },
}


/// A request URL split into decoded path segments and query pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Target {
    pub segments: Vec<String>,
    pub query: BTreeMap<String, String>,
}

impl Target {
    pub fn parse(url: &str) -> Target {
        let (path, query) = url.split_once('?').unwrap_or((url, ""));
        let segments = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(percent_decode)
            .collect();
        let query = query
            .split('&')
            .filter(|p| !p.is_empty())
            .map(|pair| {
                let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
                (percent_decode(k), percent_decode(v))
            })
            .collect();
        Target { segments, query }
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    fn flag(&self, key: &str) -> bool {
        matches!(self.param(key), Some("true") | Some("1") | Some(""))
    }

    fn required(&self, key: &str) -> Result<String, ControlError> {
        self.param(key)
            .map(str::to_string)
            .ok_or_else(|| ControlError::validation(key, "missing query parameter"))
    }
}


pub fn parse(method: &str, url: &str) -> Result<Route, ControlError> {
    if !method.eq_ignore_ascii_case("GET") {
        return Err(ControlError::validation("method", format!("{} is not supported", method)));
    }
    let target = Target::parse(url);
    let commit = !target.flag("dontCommit");
    let segs: Vec<&str> = target.segments.iter().map(String::as_str).collect();
    let route = match segs.as_slice() {
        ["manifest"] => Route::Manifest,
        ["workers"] => Route::Workers {
            as_array: target.flag("asArray"),
            update_cache: target.flag("updateCache"),
        },
        ["workers", op] => match Op::parse(op) {
            Some(op) => Route::Bulk { op, commit },
            None => return Err(unknown(url)),
        },
        ["workers", name, "setCustomParameter"] => Route::SetParameter {
            name: name.to_string(),
            id: target.required("id")?,
            value: target.required("value")?,
        },
        ["workers", name, "getStats"] => Route::Telemetry {
            name: name.to_string(),
            read: Read::Stats,
        },
        ["workers", name, "getSpeed"] => Route::Telemetry {
            name: name.to_string(),
            read: Read::Speed,
        },
        ["workers", name, "func", func] => Route::Func {
            name: name.to_string(),
            func: func.to_string(),
            value: target.param("value").map(str::to_string),
        },
        ["workers", name, op] => match Op::parse(op) {
            Some(op) => Route::Single {
                name: name.to_string(),
                op,
                commit,
            },
            None => return Err(unknown(url)),
        },
        _ => return Err(unknown(url)),
    };
    Ok(route)
}

fn unknown(url: &str) -> ControlError {
    let path = url.split('?').next().unwrap_or(url);
    ControlError::validation("path", format!("no route for {}", path))
}


/// Decode `%XX` escapes and `+`. Malformed escapes are kept literally.
pub fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hi = (bytes[i + 1] as char).to_digit(16);
                let lo = (bytes[i + 2] as char).to_digit(16);
                match (hi, lo) {
                    (Some(hi), Some(lo)) => {
                        out.push((hi * 16 + lo) as u8);
                        i += 3;
                        continue;
                    }
                    _ => out.push(b'%'),
                }
            }
            b'+' => out.push(b' '),
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
