//! Error taxonomy shared by every layer of the daemon.
//!
//! `ControlError` is what crosses the Action Queue and the Control-Plane
//! boundary. `RuntimeCause` keeps the original lower-level failure so the
//! envelope can surface it, and `FsHint` turns filesystem error codes into
//! remediation advice.

use std::io;

use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;


// ---------------------------------------------------------------------------
// ControlError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ControlError {
    /// Bad parameter or request shape. Never retried.
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },
    /// Unknown worker id.
    #[error("worker not found: {0}")]
    NotFound(String),
    /// Missing or wrong shared secret.
    #[error("missing or invalid control secret")]
    Authorization,
    /// Operation is illegal in the worker's current state.
    #[error("{0}")]
    Domain(String),
    /// Lower-level failure (spawn, filesystem, network).
    #[error("{context}: {cause}")]
    Runtime {
        context: String,
        #[source]
        cause: RuntimeCause,
    },
    /// Telemetry fetch exceeded its bound. Means "temporarily unqueryable".
    #[error("{what} timed out after {after_ms}ms")]
    Timeout { what: String, after_ms: u64 },
    #[error("internal error: {0}")]
    Internal(String),
}

/// The original failure wrapped by `ControlError::Runtime`.
#[derive(Debug, Error)]
pub enum RuntimeCause {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("process exited during startup ({0})")]
    EarlyExit(String),
    #[error("{0}")]
    Message(String),
}

impl ControlError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        ControlError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn io(context: impl Into<String>, err: io::Error) -> Self {
        ControlError::Runtime {
            context: context.into(),
            cause: RuntimeCause::Io(err),
        }
    }

    pub fn runtime(context: impl Into<String>, message: impl Into<String>) -> Self {
        ControlError::Runtime {
            context: context.into(),
            cause: RuntimeCause::Message(message.into()),
        }
    }

    /// Stable kind tag used in the error envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            ControlError::Validation { .. } => "ValidationError",
            ControlError::NotFound(_) => "NotFoundError",
            ControlError::Authorization => "AuthorizationError",
            ControlError::Domain(_) => "DomainError",
            ControlError::Runtime { .. } => "RuntimeError",
            ControlError::Timeout { .. } => "TimeoutError",
            ControlError::Internal(_) => "InternalError",
        }
    }

    /// Whether the caller could reasonably have anticipated this error.
    pub fn expected(&self) -> bool {
        matches!(
            self,
            ControlError::Validation { .. }
                | ControlError::NotFound(_)
                | ControlError::Authorization
                | ControlError::Domain(_)
        )
    }

    pub fn http_status(&self) -> u16 {
        match self {
            ControlError::Validation { .. } => 400,
            ControlError::Authorization => 401,
            ControlError::NotFound(_) => 404,
            ControlError::Domain(_) => 409,
            ControlError::Timeout { .. } => 504,
            ControlError::Runtime { .. } | ControlError::Internal(_) => 500,
        }
    }

    /// Advisory remediation hint when the root cause is a filesystem error.
    pub fn fs_hint(&self) -> Option<FsHint> {
        match self {
            ControlError::Runtime {
                cause: RuntimeCause::Io(e),
                ..
            } => FsHint::classify(e),
            _ => None,
        }
    }

    /// Render the uniform `{ error: { expected, kind, message, stack? } }`
    /// envelope. Runtime errors carry their cause chain as `stack` and an
    /// optional filesystem `hint`.
    pub fn envelope(&self) -> Value {
        let mut body = json!({
            "expected": self.expected(),
            "kind": self.kind(),
            "message": self.to_string(),
        });
        if let ControlError::Runtime { cause, .. } = self {
            body["stack"] = Value::String(cause_chain(cause));
            if let Some(hint) = self.fs_hint() {
                body["hint"] = json!({ "code": hint, "advice": hint.advice() });
            }
        }
        json!({ "error": body })
    }
}

fn cause_chain(err: &dyn std::error::Error) -> String {
    let mut lines = vec![err.to_string()];
    let mut source = err.source();
    while let Some(e) = source {
        lines.push(format!("caused by: {}", e));
        source = e.source();
    }
    lines.join("\n")
}

impl From<serde_json::Error> for ControlError {
    fn from(e: serde_json::Error) -> Self {
        ControlError::runtime("json", e.to_string())
    }
}


// ---------------------------------------------------------------------------
// FsHint
// ---------------------------------------------------------------------------

/// Classification of a filesystem failure by OS error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FsHint {
    PermissionDenied,
    DiskFull,
    MissingFile,
    FileBusy,
    ReadOnly,
}

impl FsHint {
    pub fn classify(err: &io::Error) -> Option<FsHint> {
        if let Some(code) = err.raw_os_error() {
            match code {
                libc::EACCES | libc::EPERM => return Some(FsHint::PermissionDenied),
                libc::ENOSPC | libc::EDQUOT => return Some(FsHint::DiskFull),
                libc::ENOENT => return Some(FsHint::MissingFile),
                libc::EBUSY | libc::ETXTBSY => return Some(FsHint::FileBusy),
                libc::EROFS => return Some(FsHint::ReadOnly),
                _ => {}
            }
        }
        match err.kind() {
            io::ErrorKind::NotFound => Some(FsHint::MissingFile),
            io::ErrorKind::PermissionDenied => Some(FsHint::PermissionDenied),
            _ => None,
        }
    }

    pub fn advice(&self) -> &'static str {
        match self {
            FsHint::PermissionDenied => {
                "the file is not accessible; check permissions or antivirus quarantine"
            }
            FsHint::DiskFull => "the disk is full; free some space and retry",
            FsHint::MissingFile => "a required file is missing; re-download the worker binary",
            FsHint::FileBusy => "the file is in use by another process",
            FsHint::ReadOnly => "the target filesystem is read-only",
        }
    }
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
