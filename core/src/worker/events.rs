//! Worker notifications and the external error-tracking seam.
//!
//! Observers are called synchronously, right after the mutation that caused
//! the event, in registration order.

use std::sync::{Arc, Mutex};

use log::{error, info};
use serde::Serialize;


#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkerEvent {
    StateChanged { name: String, running: bool },
    /// The wrapped process ended. `graceful` is true when the exit was
    /// requested by a stop already in flight.
    RuntimeError {
        name: String,
        graceful: bool,
        message: String,
    },
}

impl WorkerEvent {
    pub fn worker(&self) -> &str {
        match self {
            WorkerEvent::StateChanged { name, .. } => name,
            WorkerEvent::RuntimeError { name, .. } => name,
        }
    }
}


pub trait WorkerObserver: Send + Sync {
    fn notify(&self, event: &WorkerEvent);
}

/// Receives unexpected worker failures.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, worker: &str, message: &str);
}


/// Default reporter: the log is the error tracker.
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, worker: &str, message: &str) {
        error!("{} crashed: {}", worker, message);
    }
}


/// Observer that keeps every event it sees. Used by tests and by callers
/// that want to poll for notifications instead of reacting to them.
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<WorkerEvent>>,
}

impl EventLog {
    pub fn events(&self) -> Vec<WorkerEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn runtime_errors(&self, worker: &str) -> Vec<WorkerEvent> {
        self.events()
            .into_iter()
            .filter(|e| matches!(e, WorkerEvent::RuntimeError { .. }) && e.worker() == worker)
            .collect()
    }
}

impl WorkerObserver for EventLog {
    fn notify(&self, event: &WorkerEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}


/// Observer list plus error reporter, shared by every worker of a registry.
#[derive(Clone)]
pub struct Hooks {
    observers: Vec<Arc<dyn WorkerObserver>>,
    reporter: Arc<dyn ErrorReporter>,
}

impl Default for Hooks {
    fn default() -> Self {
        Hooks {
            observers: Vec::new(),
            reporter: Arc::new(LogReporter),
        }
    }
}

impl Hooks {
    pub fn with_reporter(reporter: Arc<dyn ErrorReporter>) -> Self {
        Hooks {
            observers: Vec::new(),
            reporter,
        }
    }

    pub fn observe(&mut self, observer: Arc<dyn WorkerObserver>) {
        self.observers.push(observer);
    }

    pub fn emit(&self, event: WorkerEvent) {
        match &event {
            WorkerEvent::StateChanged { name, running } => {
                info!("{} is now {}", name, if *running { "running" } else { "stopped" });
            }
            WorkerEvent::RuntimeError {
                name,
                graceful,
                message,
            } => {
                if *graceful {
                    info!("{} exited: {}", name, message);
                } else {
                    self.reporter.report(name, message);
                }
            }
        }
        for observer in &self.observers {
            observer.notify(&event);
        }
    }
}
