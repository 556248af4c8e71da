//! Loopback stats fetch and the per-worker probe handle.
//!
//! A `WorkerProbe` is shared between the worker (which flips it on start and
//! stop) and readers outside the Action Queue. Reads never block behind
//! queued actions and never fail: every problem folds into `Unavailable`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant};

use log::debug;
use serde_json::Value;

use crate::error::ControlError;
use crate::now_ms;
use crate::telemetry::window::TelemetryWindow;
use crate::telemetry::{MinerStats, Reading, Speed, Unavailable};
use crate::worker::kind::WorkerKind;


/// GET `http://127.0.0.1:<port><path>` and parse the body as JSON, giving up
/// after `timeout`.
pub fn fetch_json(port: u16, path: &str, timeout: Duration) -> Result<Value, ControlError> {
    let url = format!("http://127.0.0.1:{}{}", port, path);
    let agent = ureq::AgentBuilder::new().timeout(timeout).build();
    let started = Instant::now();
    let response = agent.get(&url).call().map_err(|e| {
        if started.elapsed() >= timeout {
            ControlError::Timeout {
                what: format!("GET {}", url),
                after_ms: timeout.as_millis() as u64,
            }
        } else {
            ControlError::runtime(format!("GET {}", url), e.to_string())
        }
    })?;
    let body = response
        .into_string()
        .map_err(|e| ControlError::io(format!("read {}", url), e))?;
    serde_json::from_str(&body)
        .map_err(|e| ControlError::validation("stats body", e.to_string()))
}


#[derive(Debug, Default)]
pub struct ProbeState {
    pub running: bool,
    pub port: Option<u16>,
    pub window: TelemetryWindow,
}


#[derive(Debug, Clone)]
pub struct WorkerProbe {
    kind: WorkerKind,
    state: Arc<Mutex<ProbeState>>,
}

impl WorkerProbe {
    pub fn new(kind: WorkerKind) -> Self {
        WorkerProbe {
            kind,
            state: Arc::new(Mutex::new(ProbeState::default())),
        }
    }

    pub fn kind(&self) -> WorkerKind {
        self.kind
    }

    fn lock(&self) -> MutexGuard<'_, ProbeState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn mark_running(&self, port: u16) {
        let mut s = self.lock();
        s.running = true;
        s.port = Some(port);
    }

    pub fn mark_stopped(&self) {
        let mut s = self.lock();
        s.running = false;
        s.port = None;
        s.window.reset();
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// Port of the running process, or `None` when stopped.
    fn live_port(&self) -> Option<u16> {
        let s = self.lock();
        if s.running {
            s.port
        } else {
            None
        }
    }

    /// Fetch and parse the executable's own status report.
    pub fn stats(&self, timeout: Duration) -> Reading<MinerStats> {
        self.sample_at(timeout, now_ms())
    }

    /// `stats`, with the rate recorded at `at_ms`.
    pub fn sample_at(&self, timeout: Duration, at_ms: u64) -> Reading<MinerStats> {
        let port = match self.live_port() {
            Some(p) => p,
            None => return Reading::Unavailable(Unavailable::NotRunning),
        };
        let body = match fetch_json(port, self.kind.stats_path(), timeout) {
            Ok(b) => b,
            Err(e) => return Reading::Unavailable(self.classify(&e)),
        };
        match self.kind.parse_stats(&body) {
            Ok(stats) => {
                self.record(stats.hashrate, at_ms);
                Reading::Available(stats)
            }
            Err(e) => {
                debug!("{}: malformed stats: {}", self.kind.name(), e);
                Reading::Unavailable(Unavailable::Malformed)
            }
        }
    }

    /// Current rate plus the rolling means. Every successful read feeds the
    /// telemetry window.
    pub fn speed(&self, timeout: Duration) -> Reading<Speed> {
        match self.stats(timeout) {
            Reading::Available(stats) => {
                let now = now_ms();
                let s = self.lock();
                Reading::Available(Speed {
                    current: stats.hashrate,
                    minute: s.window.minute_speed(now),
                    hour: s.window.hour_speed(now),
                })
            }
            Reading::Unavailable(u) => Reading::Unavailable(u),
        }
    }

    /// Samples currently held in the telemetry window.
    pub fn sample_count(&self) -> usize {
        self.lock().window.len()
    }

    pub fn record(&self, rate: f64, now_ms: u64) {
        let mut s = self.lock();
        if s.running {
            s.window.record(rate, now_ms);
        }
    }

    /// A fetch that raced a concurrent stop reports "not running", not a
    /// transport failure.
    fn classify(&self, err: &ControlError) -> Unavailable {
        if !self.is_running() {
            return Unavailable::NotRunning;
        }
        match err {
            ControlError::Timeout { .. } => Unavailable::Timeout,
            ControlError::Validation { .. } => Unavailable::Malformed,
            _ => Unavailable::Unreachable,
        }
    }
}


/// Name-indexed probes, republished on every registry rebuild.
#[derive(Debug, Clone, Default)]
pub struct ProbeDirectory {
    inner: Arc<RwLock<BTreeMap<String, WorkerProbe>>>,
}

impl ProbeDirectory {
    pub fn get(&self, name: &str) -> Option<WorkerProbe> {
        self.inner
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(name)
            .cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.inner
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    pub fn publish(&self, probes: BTreeMap<String, WorkerProbe>) {
        *self.inner.write().unwrap_or_else(|p| p.into_inner()) = probes;
    }

    /// Read every running worker once, feeding its window. Returns how many
    /// reads succeeded.
    pub fn sample_running(&self, timeout: Duration) -> usize {
        let running: Vec<WorkerProbe> = self
            .inner
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .values()
            .filter(|probe| probe.is_running())
            .cloned()
            .collect();
        running
            .iter()
            .filter(|probe| matches!(probe.stats(timeout), Reading::Available(_)))
            .count()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tiny_http::{Response, Server};

    fn serve_once(body: &'static str) -> u16 {
        let server = Server::http("127.0.0.1:0").unwrap();
        let port = server.server_addr().to_ip().unwrap().port();
        thread::spawn(move || {
            if let Ok(req) = server.recv() {
                let _ = req.respond(Response::from_string(body));
            }
        });
        port
    }

    #[test]
    fn stopped_probe_is_not_running() {
        let probe = WorkerProbe::new(WorkerKind::TRex);
        assert_eq!(
            probe.stats(Duration::from_millis(100)),
            Reading::Unavailable(Unavailable::NotRunning)
        );
    }

    #[test]
    fn stats_are_parsed_and_recorded() {
        let port = serve_once(r#"{"hashrate": 42000000, "accepted_count": 7, "rejected_count": 1, "uptime": 90, "gpus": []}"#);
        let probe = WorkerProbe::new(WorkerKind::TRex);
        probe.mark_running(port);
        match probe.speed(Duration::from_secs(2)) {
            Reading::Available(speed) => {
                assert_eq!(speed.current, 42_000_000.0);
                assert_eq!(speed.minute, None);
            }
            other => panic!("expected speed, got {:?}", other),
        }
        assert_eq!(probe.lock().window.len(), 1);
    }

    fn serve_forever(body: &'static str) -> u16 {
        let server = Server::http("127.0.0.1:0").unwrap();
        let port = server.server_addr().to_ip().unwrap().port();
        thread::spawn(move || {
            for req in server.incoming_requests() {
                let _ = req.respond(Response::from_string(body));
            }
        });
        port
    }

    #[test]
    fn minute_mean_from_samples_alone() {
        let port = serve_forever(r#"{"hashrate": 1000, "accepted_count": 0, "rejected_count": 0, "uptime": 1, "gpus": []}"#);
        let probe = WorkerProbe::new(WorkerKind::TRex);
        probe.mark_running(port);
        let now = now_ms();
        assert!(matches!(probe.sample_at(Duration::from_secs(2), now - 61_000), Reading::Available(_)));
        assert!(matches!(probe.sample_at(Duration::from_secs(2), now), Reading::Available(_)));
        assert_eq!(probe.sample_count(), 2);
        assert_eq!(probe.lock().window.minute_speed(now), Some(1000.0));
    }

    #[test]
    fn directory_samples_only_running_workers() {
        let port = serve_forever(r#"{"hashrate": 5, "accepted_count": 0, "rejected_count": 0, "uptime": 1, "gpus": []}"#);
        let live = WorkerProbe::new(WorkerKind::TRex);
        live.mark_running(port);
        let idle = WorkerProbe::new(WorkerKind::GMiner);
        let dir = ProbeDirectory::default();
        let mut map = BTreeMap::new();
        map.insert("t-rex".to_string(), live.clone());
        map.insert("gminer".to_string(), idle.clone());
        dir.publish(map);

        assert_eq!(dir.sample_running(Duration::from_secs(2)), 1);
        assert_eq!(dir.sample_running(Duration::from_secs(2)), 1);
        assert_eq!(live.sample_count(), 2);
        assert_eq!(idle.sample_count(), 0);
    }

    #[test]
    fn unreachable_port_is_unavailable() {
        let port = crate::infrastructure::find_free_port(0).unwrap();
        let probe = WorkerProbe::new(WorkerKind::GMiner);
        probe.mark_running(port);
        assert_eq!(
            probe.stats(Duration::from_millis(300)),
            Reading::Unavailable(Unavailable::Unreachable)
        );
    }

    #[test]
    fn silent_server_times_out() {
        let server = Server::http("127.0.0.1:0").unwrap();
        let port = server.server_addr().to_ip().unwrap().port();
        let hold = thread::spawn(move || {
            let req = server.recv().ok();
            thread::sleep(Duration::from_millis(600));
            drop(req);
        });
        let probe = WorkerProbe::new(WorkerKind::LolMiner);
        probe.mark_running(port);
        assert_eq!(
            probe.stats(Duration::from_millis(200)),
            Reading::Unavailable(Unavailable::Timeout)
        );
        hold.join().unwrap();
    }

    #[test]
    fn malformed_body() {
        let port = serve_once("<html>");
        let probe = WorkerProbe::new(WorkerKind::TRex);
        probe.mark_running(port);
        assert_eq!(
            probe.stats(Duration::from_secs(2)),
            Reading::Unavailable(Unavailable::Malformed)
        );
    }

    #[test]
    fn directory_publish_replaces() {
        let dir = ProbeDirectory::default();
        let mut map = BTreeMap::new();
        map.insert("t-rex".to_string(), WorkerProbe::new(WorkerKind::TRex));
        dir.publish(map);
        assert_eq!(dir.names(), vec!["t-rex"]);
        dir.publish(BTreeMap::new());
        assert!(dir.get("t-rex").is_none());
    }
}
