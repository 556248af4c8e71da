//! Loopback HTTP server and request dispatch.
//!
//! `ControlPlane` is stateless per request: authenticate, parse the route,
//! perform exactly one operation. Mutations go through the daemon's Action
//! Queue; telemetry reads go straight to the worker probes. Every error is
//! rendered as the uniform envelope at this boundary.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};
use serde_json::{Map, Value};
use tiny_http::{Header, Request, Response, Server};

use crate::api::auth::{Secret, SECRET_HEADER};
use crate::api::routes::{self, Op, Read, Route, Target};
use crate::daemon::DaemonHandle;
use crate::error::ControlError;
use crate::queue::Action;
use crate::telemetry::ProbeDirectory;


pub struct ControlPlane {
    handle: DaemonHandle,
    probes: ProbeDirectory,
    secret: Secret,
    stats_timeout: Duration,
}

impl ControlPlane {
    pub fn new(handle: DaemonHandle, probes: ProbeDirectory, secret: Secret, stats_timeout: Duration) -> Self {
        ControlPlane {
            handle,
            probes,
            secret,
            stats_timeout,
        }
    }

    /// Handle one request, returning the HTTP status and JSON body.
    pub fn dispatch(&self, method: &str, url: &str, header_secret: Option<&str>) -> (u16, Value) {
        match self.route(method, url, header_secret) {
            Ok(body) => (200, body),
            Err(e) => {
                if e.expected() {
                    debug!("{} {}: {}", method, strip_query(url), e);
                } else {
                    warn!("{} {}: {}", method, strip_query(url), e);
                }
                (e.http_status(), e.envelope())
            }
        }
    }

    fn authorize(&self, url: &str, header_secret: Option<&str>) -> Result<(), ControlError> {
        let target;
        let presented = match header_secret {
            Some(s) => Some(s),
            None => {
                target = Target::parse(url);
                target.param("secret")
            }
        };
        match presented {
            Some(s) if self.secret.matches(s) => Ok(()),
            _ => Err(ControlError::Authorization),
        }
    }

    fn route(&self, method: &str, url: &str, header_secret: Option<&str>) -> Result<Value, ControlError> {
        self.authorize(url, header_secret)?;
        match routes::parse(method, url)? {
            Route::Manifest => self.handle.submit(Action::Manifest),
            Route::Workers {
                as_array,
                update_cache,
            } => {
                let list = self.handle.submit(Action::ListWorkers {
                    force: update_cache,
                })?;
                if as_array {
                    Ok(list)
                } else {
                    Ok(key_by_name(list))
                }
            }
            Route::Bulk { op, commit } => self.handle.submit(match op {
                Op::Start => Action::StartAll { commit },
                Op::Stop => Action::StopAll { commit },
                Op::Reload => Action::ReloadAll { commit },
            }),
            Route::Single { name, op, commit } => self.handle.submit(match op {
                Op::Start => Action::Start { name, commit },
                Op::Stop => Action::Stop { name, commit },
                Op::Reload => Action::Reload { name, commit },
            }),
            Route::SetParameter { name, id, value } => {
                self.handle.submit(Action::SetParameter { name, id, value })
            }
            Route::Func { name, func, value } => self.handle.submit(Action::Invoke { name, func, value }),
            Route::Telemetry { name, read } => {
                let probe = self
                    .probes
                    .get(&name)
                    .ok_or(ControlError::NotFound(name))?;
                let body = match read {
                    Read::Stats => serde_json::to_value(probe.stats(self.stats_timeout))?,
                    Read::Speed => serde_json::to_value(probe.speed(self.stats_timeout))?,
                };
                Ok(body)
            }
        }
    }
}

fn key_by_name(list: Value) -> Value {
    let mut map = Map::new();
    if let Value::Array(items) = list {
        for item in items {
            if let Some(name) = item.get("name").and_then(Value::as_str) {
                map.insert(name.to_string(), item.clone());
            }
        }
    }
    Value::Object(map)
}

fn strip_query(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}


/// The listening server. Each request is handled on its own thread so a
/// slow telemetry read never holds up other callers.
pub struct ControlServer {
    server: Arc<Server>,
    port: u16,
    thread: Option<JoinHandle<()>>,
}

impl ControlServer {
    /// Listen on `127.0.0.1:<port>`. Port 0 picks a free one.
    pub fn bind(port: u16, plane: ControlPlane) -> Result<ControlServer, ControlError> {
        let server = Server::http(("127.0.0.1", port))
            .map_err(|e| ControlError::runtime(format!("bind 127.0.0.1:{}", port), e.to_string()))?;
        let port = server.server_addr().to_ip().map(|a| a.port()).unwrap_or(port);
        let server = Arc::new(server);
        let plane = Arc::new(plane);
        let accept = server.clone();
        let thread = thread::Builder::new()
            .name("control-plane".into())
            .spawn(move || serve(&accept, plane))
            .map_err(|e| ControlError::io("spawn control-plane thread", e))?;
        info!("control plane listening on 127.0.0.1:{}", port);
        Ok(ControlServer {
            server,
            port,
            thread: Some(thread),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn shutdown(mut self) {
        self.server.unblock();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn serve(server: &Server, plane: Arc<ControlPlane>) {
    for request in server.incoming_requests() {
        let plane = plane.clone();
        thread::spawn(move || respond(&plane, request));
    }
}

fn respond(plane: &ControlPlane, request: Request) {
    let secret = request
        .headers()
        .iter()
        .find(|h| h.field.equiv(SECRET_HEADER))
        .map(|h| h.value.as_str().to_string());
    let method = request.method().to_string();
    let (status, body) = plane.dispatch(&method, request.url(), secret.as_deref());
    let mut response = Response::from_string(body.to_string()).with_status_code(status);
    if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
        response = response.with_header(header);
    }
    if let Err(e) = request.respond(response) {
        debug!("client went away: {}", e);
    }
}
