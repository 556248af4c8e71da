//! Background thread feeding every running worker's telemetry window at a
//! fixed interval, so rolling means exist without anyone asking for stats.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::debug;

use crate::error::ControlError;
use crate::infrastructure::sleep_unless;
use crate::telemetry::ProbeDirectory;


pub struct Sampler {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Sampler {
    pub fn spawn(probes: ProbeDirectory, interval: Duration, timeout: Duration) -> Result<Sampler, ControlError> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let thread = thread::Builder::new()
            .name("telemetry".into())
            .spawn(move || {
                while !flag.load(Ordering::SeqCst) {
                    probes.sample_running(timeout);
                    sleep_unless(&flag, interval);
                }
                debug!("telemetry sampler exited");
            })
            .map_err(|e| ControlError::io("spawn telemetry thread", e))?;
        Ok(Sampler {
            stop,
            thread: Some(thread),
        })
    }

    pub fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::WorkerProbe;
    use crate::worker::kind::WorkerKind;
    use std::collections::BTreeMap;
    use std::time::Instant;
    use tiny_http::{Response, Server};

    #[test]
    fn running_workers_are_sampled_without_reads() {
        let server = Server::http("127.0.0.1:0").unwrap();
        let port = server.server_addr().to_ip().unwrap().port();
        thread::spawn(move || {
            for req in server.incoming_requests() {
                let body = r#"{"hashrate": {"total": [250.0]}, "connection": {"accepted": 1, "rejected": 0}, "uptime": 3}"#;
                let _ = req.respond(Response::from_string(body));
            }
        });
        let probe = WorkerProbe::new(WorkerKind::Xmrig);
        probe.mark_running(port);
        let probes = ProbeDirectory::default();
        let mut map = BTreeMap::new();
        map.insert("xmrig".to_string(), probe.clone());
        probes.publish(map);

        let sampler = Sampler::spawn(probes, Duration::from_millis(10), Duration::from_secs(1)).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while probe.sample_count() < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        sampler.stop();
        assert!(probe.sample_count() >= 3);
    }
}
