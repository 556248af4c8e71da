//! Command runner abstraction for executing shell commands.
//!
//! `CommandRunner` is the seam the idle-time probe uses to query the desktop
//! session. `ShellRunner` spawns `sh -c`. `MockRunner` records calls and
//! returns preset responses.

use std::collections::VecDeque;
use std::process::Command;
use std::sync::Mutex;

/// Trait for executing shell command strings.
pub trait CommandRunner: Send + Sync {
    fn run(&self, cmd: &str) -> Result<String, String>;
}

/// Production runner that spawns `sh -c <cmd>`.
pub struct ShellRunner;

impl CommandRunner for ShellRunner {
    fn run(&self, cmd: &str) -> Result<String, String> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .output()
            .map_err(|e| format!("failed to execute: {}", e))?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            Err(String::from_utf8_lossy(&output.stderr).to_string())
        }
    }
}

/// Test-double runner that records commands and returns pre-configured responses.
#[derive(Default)]
pub struct MockRunner {
    responses: Mutex<VecDeque<Result<String, String>>>,
    commands: Mutex<Vec<String>>,
}

impl MockRunner {
    pub fn with_responses(responses: Vec<Result<String, String>>) -> Self {
        MockRunner {
            responses: Mutex::new(responses.into()),
            commands: Mutex::new(Vec::new()),
        }
    }

    pub fn executed_commands(&self) -> Vec<String> {
        self.commands.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl CommandRunner for MockRunner {
    fn run(&self, cmd: &str) -> Result<String, String> {
        if let Ok(mut commands) = self.commands.lock() {
            commands.push(cmd.to_string());
        }
        self.responses
            .lock()
            .ok()
            .and_then(|mut r| r.pop_front())
            .unwrap_or_else(|| Ok(String::new()))
    }
}
