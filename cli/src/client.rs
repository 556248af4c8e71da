//! ApiClient: HTTP calls to a running minerdock daemon.

use std::time::Duration;

use minerdock_core::api::SECRET_HEADER;
use serde_json::Value;


pub struct ApiClient {
    base: String,
    secret: String,
    agent: ureq::Agent,
}

impl ApiClient {
    pub fn new(port: u16, secret: &str, timeout: Duration) -> Self {
        ApiClient {
            base: format!("http://127.0.0.1:{}", port),
            secret: secret.to_string(),
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }

    /// GET `path` with `query` pairs (encoded by ureq) and return the JSON
    /// body. Error envelopes are turned into their message.
    pub fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value, String> {
        let url = format!("{}{}", self.base, path);
        let mut request = self.agent.get(&url).set(SECRET_HEADER, &self.secret);
        for (key, value) in query {
            request = request.query(key, value);
        }
        match request.call() {
            Ok(response) => read_json(response),
            Err(ureq::Error::Status(code, response)) => {
                let body = read_json(response)?;
                Err(envelope_message(code, &body))
            }
            Err(ureq::Error::Transport(t)) => Err(format!("daemon unreachable at {}: {}", self.base, t)),
        }
    }
}

fn read_json(response: ureq::Response) -> Result<Value, String> {
    let text = response.into_string().map_err(|e| format!("read response: {}", e))?;
    serde_json::from_str(&text).map_err(|e| format!("bad response body: {}", e))
}

fn envelope_message(code: u16, body: &Value) -> String {
    let error = &body["error"];
    match (error["kind"].as_str(), error["message"].as_str()) {
        (Some(kind), Some(message)) => format!("{} ({}): {}", kind, code, message),
        _ => format!("HTTP {}: {}", code, body),
    }
}
