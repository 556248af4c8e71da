//! Daemon: the minerdock main event loop and the Action Queue consumer.
//!
//! The daemon is single-threaded for state mutation. The registry lives on
//! the loop thread; the Control-Plane server and the automation thread talk
//! to it through a `DaemonHandle`, which sends over an mpsc channel. The
//! main loop is the single consumer, so actions execute FIFO and never
//! overlap.
//!
//! # Boot
//!
//! 1. Terminate every pid left in the ledger by a previous run
//! 2. Rebuild the registry from the manifest
//! 3. Resume workers whose committed flag is set, without re-committing
//!
//! # Main loop tick
//!
//! 1. Wait up to `poll_interval_ms` for an event, then drain the channel
//! 2. Reap workers whose process exited on its own
//!
//! While the loop runs, a telemetry sampler reads running workers every
//! `sample_interval_ms` on its own thread.

use std::sync::mpsc;
use std::time::Duration;

use log::{debug, error, info, warn};
use serde_json::Value;

use crate::data::Paths;
use crate::error::ControlError;
use crate::queue::Action;
use crate::registry::Registry;
use crate::telemetry::{ProbeDirectory, Sampler};
use crate::types::config::Settings;
use crate::worker::Hooks;


/// Events that can be sent to the daemon's main loop via the channel.
#[derive(Debug)]
pub enum DaemonEvent {
    /// An action to execute; the result goes back on `reply`.
    Submit {
        action: Action,
        reply: mpsc::Sender<Result<Value, ControlError>>,
    },
    /// Request the daemon to shut down gracefully.
    Shutdown,
}


/// Handle returned from `Daemon::handle()` allowing threads to submit
/// actions.
#[derive(Clone)]
pub struct DaemonHandle {
    sender: mpsc::Sender<DaemonEvent>,
}

impl DaemonHandle {
    /// Enqueue `action` and block until the loop has executed it.
    pub fn submit(&self, action: Action) -> Result<Value, ControlError> {
        let (reply, result) = mpsc::channel();
        self.sender
            .send(DaemonEvent::Submit { action, reply })
            .map_err(|_| ControlError::Internal("daemon is not running".into()))?;
        result
            .recv()
            .map_err(|_| ControlError::Internal("daemon dropped the action".into()))?
    }

    /// Request daemon shutdown.
    pub fn shutdown(&self) -> Result<(), ControlError> {
        self.sender
            .send(DaemonEvent::Shutdown)
            .map_err(|_| ControlError::Internal("daemon is not running".into()))
    }
}


pub struct Daemon {
    registry: Registry,
    /// Taken when the loop exits, so later submits fail instead of waiting.
    receiver: Option<mpsc::Receiver<DaemonEvent>>,
    handle: DaemonHandle,
    poll: Duration,
}

impl Daemon {
    /// Boot over the standard config-dir layout.
    pub fn open(paths: &Paths, settings: Settings, hooks: Hooks) -> Result<Daemon, ControlError> {
        Daemon::new(Registry::open(paths, settings, hooks))
    }

    /// Reap orphans, rebuild the registry and resume committed workers.
    pub fn new(mut registry: Registry) -> Result<Daemon, ControlError> {
        let timeout = registry.env().stop_timeout();
        let reaped = registry.env_mut().ledger.reap_orphans(timeout)?;
        if !reaped.is_empty() {
            warn!("terminated {} orphaned process(es): {:?}", reaped.len(), reaped);
        }
        if let Err(e) = registry.rebuild() {
            error!("cannot load manifest, starting with no workers: {}", e);
        }
        let resumed = registry.start_all(false);
        if !resumed.ok.is_empty() {
            info!("resumed {}", resumed.ok.join(", "));
        }

        let (sender, receiver) = mpsc::channel();
        let poll = Duration::from_millis(registry.env().settings.poll_interval_ms.max(1));
        Ok(Daemon {
            registry,
            receiver: Some(receiver),
            handle: DaemonHandle { sender },
            poll,
        })
    }

    /// Get a handle for sending events to this daemon.
    pub fn handle(&self) -> DaemonHandle {
        self.handle.clone()
    }

    pub fn probes(&self) -> ProbeDirectory {
        self.registry.probes()
    }

    /// Borrow the registry for inspection (testing).
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Run the main event loop. Blocks until shutdown is received, then
    /// refuses whatever is still queued and stops every worker without
    /// touching their desired state.
    pub fn run(&mut self) {
        let sampler = self.spawn_sampler();
        loop {
            if self.tick() {
                break;
            }
        }
        info!("shutting down");
        if let Some(sampler) = sampler {
            sampler.stop();
        }
        self.close();
        self.registry.shutdown();
    }

    fn spawn_sampler(&self) -> Option<Sampler> {
        let settings = &self.registry.env().settings;
        if settings.sample_interval_ms == 0 {
            return None;
        }
        let interval = Duration::from_millis(settings.sample_interval_ms);
        let timeout = Duration::from_millis(settings.stats_timeout_ms);
        match Sampler::spawn(self.registry.probes(), interval, timeout) {
            Ok(sampler) => Some(sampler),
            Err(e) => {
                warn!("telemetry sampling disabled: {}", e);
                None
            }
        }
    }

    /// Stop accepting events. Queued submits get an error; later ones fail
    /// to send.
    fn close(&mut self) {
        let receiver = match self.receiver.take() {
            Some(r) => r,
            None => return,
        };
        let mut refused = 0;
        while let Ok(event) = receiver.try_recv() {
            if let DaemonEvent::Submit { reply, .. } = event {
                let _ = reply.send(Err(ControlError::Internal("daemon is shutting down".into())));
                refused += 1;
            }
        }
        if refused > 0 {
            debug!("refused {} queued action(s)", refused);
        }
    }

    /// Run exactly one tick of the main loop.
    /// Returns true if shutdown was requested.
    pub fn tick(&mut self) -> bool {
        let received = match &self.receiver {
            Some(receiver) => receiver.recv_timeout(self.poll),
            None => return true,
        };
        match received {
            Ok(event) => {
                if self.handle_event(event) {
                    return true;
                }
                if self.drain_channel() {
                    return true;
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                warn!("channel disconnected, shutting down");
                return true;
            }
        }
        for name in self.registry.reap_exited() {
            debug!("reaped {}", name);
        }
        false
    }

    /// Drain all pending events without blocking.
    /// Returns true if a Shutdown event was received.
    fn drain_channel(&mut self) -> bool {
        loop {
            let next = match &self.receiver {
                Some(receiver) => receiver.try_recv(),
                None => return true,
            };
            match next {
                Ok(event) => {
                    if self.handle_event(event) {
                        return true;
                    }
                }
                Err(mpsc::TryRecvError::Empty) => return false,
                Err(mpsc::TryRecvError::Disconnected) => return true,
            }
        }
    }

    fn handle_event(&mut self, event: DaemonEvent) -> bool {
        match event {
            DaemonEvent::Submit { action, reply } => {
                let label = action.label();
                debug!("action: {}", label);
                // Reap first so an action never acts on a stale running flag.
                self.registry.reap_exited();
                let result = action.execute(&mut self.registry);
                if let Err(e) = &result {
                    debug!("action {} failed: {}", label, e);
                }
                // The submitter may have given up; nothing to do then.
                let _ = reply.send(result);
                false
            }
            DaemonEvent::Shutdown => true,
        }
    }
}
