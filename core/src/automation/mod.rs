//! Automation: a user-facing policy that starts and stops workers based on
//! how long the machine has been idle.
//!
//! The policy runs on its own thread and reaches the registry only through
//! an `AutomationHost`, the same Action Queue every other caller uses. At
//! most one policy is active: `Supervisor::run_policy` stops the previous
//! loop before starting the next.

pub mod host;
pub mod policy;

pub use host::{
    AutomationHost, CommandIdleSource, FixedIdle, IdleSource, ProfitabilitySource, QueueHost,
    StaticProfitability,
};
pub use policy::{Policy, Rule, RuleAction, DEFAULT_IDLE_THRESHOLD_MS};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};

use crate::error::ControlError;
use crate::infrastructure::sleep_unless;


/// Evaluates the rule table against idle samples.
pub struct Engine {
    policy: Policy,
    host: Box<dyn AutomationHost>,
    idle: Box<dyn IdleSource>,
    last_rule: Option<usize>,
}

impl Engine {
    pub fn new(policy: Policy, host: Box<dyn AutomationHost>, idle: Box<dyn IdleSource>) -> Self {
        Engine {
            policy,
            host,
            idle,
            last_rule: None,
        }
    }

    /// Index of the rule applied most recently.
    pub fn last_rule(&self) -> Option<usize> {
        self.last_rule
    }

    /// Sample the idle source and act on it.
    pub fn poll_once(&mut self) -> Result<(), ControlError> {
        let idle_ms = self.idle.idle_ms()?;
        self.on_sample(idle_ms)
    }

    /// Apply the first rule matching `idle_ms`. A rule that already
    /// succeeded is not reapplied until a different rule has matched, so
    /// a user's manual change is not undone every interval.
    pub fn on_sample(&mut self, idle_ms: u64) -> Result<(), ControlError> {
        let (index, action) = match self.policy.select(idle_ms) {
            Some((index, rule)) => (index, rule.action.clone()),
            None => {
                self.last_rule = None;
                return Ok(());
            }
        };
        if self.last_rule == Some(index) {
            return Ok(());
        }
        debug!("idle {}ms matches rule {} ({})", idle_ms, index, action);
        self.apply(&action)?;
        self.last_rule = Some(index);
        Ok(())
    }

    fn apply(&self, action: &RuleAction) -> Result<(), ControlError> {
        match action {
            RuleAction::StartBest => {
                let best = match self.host.ranking()?.into_iter().next() {
                    Some(best) => best,
                    None => return Ok(()),
                };
                self.start(&best)
            }
            RuleAction::Start(name) => self.start(name),
            RuleAction::Stop(name) => {
                if self.host.running()?.iter().any(|r| r == name) {
                    info!("automation: stopping {}", name);
                    self.host.stop(name)?;
                }
                Ok(())
            }
            RuleAction::StopAll => {
                let mut first_err = None;
                for name in self.host.running()? {
                    info!("automation: stopping {}", name);
                    if let Err(e) = self.host.stop(&name) {
                        warn!("automation: stop {} failed: {}", name, e);
                        first_err.get_or_insert(e);
                    }
                }
                first_err.map_or(Ok(()), Err)
            }
        }
    }

    fn start(&self, name: &str) -> Result<(), ControlError> {
        if self.host.running()?.iter().any(|r| r == name) {
            return Ok(());
        }
        info!("automation: starting {}", name);
        self.host.start(name)
    }
}


/// A running policy loop. Dropping it without `stop()` leaves the thread
/// running until the process exits.
pub struct PollLoop {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl PollLoop {
    pub fn spawn(mut engine: Engine, interval: Duration) -> Result<PollLoop, ControlError> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let thread = thread::Builder::new()
            .name("automation".into())
            .spawn(move || {
                while !flag.load(Ordering::SeqCst) {
                    if let Err(e) = engine.poll_once() {
                        warn!("automation: {}", e);
                    }
                    sleep_unless(&flag, interval);
                }
                debug!("automation loop exited");
            })
            .map_err(|e| ControlError::io("spawn automation thread", e))?;
        Ok(PollLoop {
            stop,
            thread: Some(thread),
        })
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().map_or(false, |t| !t.is_finished())
    }

    pub fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Owns the single active policy loop.
#[derive(Default)]
pub struct Supervisor {
    active: Option<PollLoop>,
}

impl Supervisor {
    pub fn new() -> Self {
        Supervisor { active: None }
    }

    /// Replace the active policy with `engine`.
    pub fn run_policy(&mut self, engine: Engine, interval: Duration) -> Result<(), ControlError> {
        self.stop();
        self.active = Some(PollLoop::spawn(engine, interval)?);
        info!("automation policy started (every {}ms)", interval.as_millis());
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.active.as_ref().map_or(false, PollLoop::is_running)
    }

    pub fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.stop();
            info!("automation policy stopped");
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::Mutex;
    use std::time::Instant;

    /// Host over an in-memory running set, recording every call.
    #[derive(Clone, Default)]
    struct MockHost {
        ranking: Vec<String>,
        running: Arc<Mutex<BTreeSet<String>>>,
        calls: Arc<Mutex<Vec<String>>>,
        fail_start: bool,
    }

    impl MockHost {
        fn ranked(names: &[&str]) -> Self {
            MockHost {
                ranking: names.iter().map(|s| s.to_string()).collect(),
                ..MockHost::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn set_running(&self, name: &str) {
            self.running.lock().unwrap().insert(name.to_string());
        }
    }

    impl AutomationHost for MockHost {
        fn ranking(&self) -> Result<Vec<String>, ControlError> {
            Ok(self.ranking.clone())
        }

        fn running(&self) -> Result<Vec<String>, ControlError> {
            Ok(self.running.lock().unwrap().iter().cloned().collect())
        }

        fn start(&self, name: &str) -> Result<(), ControlError> {
            self.calls.lock().unwrap().push(format!("start {}", name));
            if self.fail_start {
                return Err(ControlError::Domain(format!("{} refused", name)));
            }
            self.set_running(name);
            Ok(())
        }

        fn stop(&self, name: &str) -> Result<(), ControlError> {
            self.calls.lock().unwrap().push(format!("stop {}", name));
            self.running.lock().unwrap().remove(name);
            Ok(())
        }
    }

    fn engine(host: &MockHost) -> Engine {
        Engine::new(Policy::default(), Box::new(host.clone()), Box::new(FixedIdle::new(0)))
    }

    #[test]
    fn idle_starts_best_and_activity_stops_all() {
        let host = MockHost::ranked(&["t-rex", "xmrig"]);
        let mut e = engine(&host);
        e.on_sample(61_000).unwrap();
        assert_eq!(host.calls(), vec!["start t-rex"]);

        host.set_running("xmrig");
        e.on_sample(10).unwrap();
        assert_eq!(host.calls(), vec!["start t-rex", "stop t-rex", "stop xmrig"]);
        assert!(host.running().unwrap().is_empty());
    }

    #[test]
    fn same_rule_is_not_reapplied() {
        let host = MockHost::ranked(&["gminer"]);
        let mut e = engine(&host);
        e.on_sample(70_000).unwrap();
        // The user stops it by hand; automation leaves that alone.
        host.stop("gminer").unwrap();
        e.on_sample(80_000).unwrap();
        e.on_sample(90_000).unwrap();
        assert_eq!(host.calls(), vec!["start gminer", "stop gminer"]);
        assert_eq!(e.last_rule(), Some(0));
    }

    #[test]
    fn failed_action_is_retried_next_sample() {
        let host = MockHost {
            fail_start: true,
            ..MockHost::ranked(&["lolminer"])
        };
        let mut e = engine(&host);
        assert!(e.on_sample(60_000).is_err());
        assert_eq!(e.last_rule(), None);
        assert!(e.on_sample(60_000).is_err());
        assert_eq!(host.calls().len(), 2);
    }

    #[test]
    fn start_best_skips_already_running() {
        let host = MockHost::ranked(&["xmrig"]);
        host.set_running("xmrig");
        let mut e = engine(&host);
        e.on_sample(100_000).unwrap();
        assert!(host.calls().is_empty());
    }

    #[test]
    fn named_actions_only_touch_their_worker() {
        let policy = Policy::parse(
            "rules:\n  - idle_at_least_ms: 1000\n    action: start:xmrig\n  - idle_at_least_ms: 0\n    idle_below_ms: 1000\n    action: stop:xmrig\n",
        )
        .unwrap();
        let host = MockHost::ranked(&["t-rex", "xmrig"]);
        host.set_running("t-rex");
        let mut e = Engine::new(policy, Box::new(host.clone()), Box::new(FixedIdle::new(0)));
        e.on_sample(5_000).unwrap();
        e.on_sample(0).unwrap();
        assert_eq!(host.calls(), vec!["start xmrig", "stop xmrig"]);
        assert_eq!(host.running().unwrap(), vec!["t-rex"]);
    }

    #[test]
    fn poll_loop_follows_idle_source() {
        let host = MockHost::ranked(&["xmrig"]);
        let idle = Arc::new(FixedIdle::new(120_000));
        let e = Engine::new(Policy::default(), Box::new(host.clone()), Box::new(idle.clone()));
        let mut supervisor = Supervisor::new();
        supervisor.run_policy(e, Duration::from_millis(10)).unwrap();
        assert!(supervisor.is_active());

        let deadline = Instant::now() + Duration::from_secs(2);
        while host.running().unwrap().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(host.running().unwrap(), vec!["xmrig"]);

        idle.set(0);
        while !host.running().unwrap().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(host.running().unwrap().is_empty());
        supervisor.stop();
        assert!(!supervisor.is_active());
    }

    #[test]
    fn run_policy_replaces_the_active_loop() {
        let first = MockHost::ranked(&["t-rex"]);
        let second = MockHost::ranked(&["gminer"]);
        let mut supervisor = Supervisor::new();
        let e1 = Engine::new(Policy::default(), Box::new(first.clone()), Box::new(FixedIdle::new(0)));
        supervisor.run_policy(e1, Duration::from_millis(10)).unwrap();
        let e2 = Engine::new(Policy::default(), Box::new(second.clone()), Box::new(FixedIdle::new(90_000)));
        supervisor.run_policy(e2, Duration::from_millis(10)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while second.calls().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        supervisor.stop();
        assert_eq!(second.calls(), vec!["start gminer"]);
        assert!(first.calls().is_empty());
    }
}
