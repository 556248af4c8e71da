//! minerdock: run the daemon, or talk to a running one.
//!
//! # Usage
//!
//! ```text
//! minerdock init
//! minerdock run
//! minerdock workers --json
//! minerdock start xmrig --dont-commit
//! minerdock stop
//! minerdock stats t-rex --speed
//! minerdock set xmrig threads 4
//! minerdock func xmrig preserveConfig true
//! ```

mod client;

use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};
use log::{error, info, warn};
use serde_json::Value;

use minerdock_core::api::{ControlPlane, ControlServer, Secret};
use minerdock_core::automation::{
    CommandIdleSource, Engine, Policy, QueueHost, StaticProfitability, Supervisor,
};
use minerdock_core::daemon::{Daemon, DaemonHandle};
use minerdock_core::data::{settings, Paths};
use minerdock_core::infrastructure::ShellRunner;
use minerdock_core::types::config::Settings;
use minerdock_core::worker::Hooks;
use minerdock_core::ControlError;

use client::ApiClient;


#[derive(Parser)]
#[command(name = "minerdock", about = "Supervise local miner executables", version)]
struct Cli {
    /// Configuration directory (default: $MINERDOCK_DIR or ~/.config/minerdock)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default settings file and the Control-Plane secret.
    Init {
        /// Overwrite an existing settings file.
        #[arg(long)]
        force: bool,
    },
    /// Run the daemon in the foreground.
    Run,
    /// Print the Control-Plane secret, creating it if needed.
    Secret,
    /// List installed workers.
    Workers {
        #[arg(long)]
        json: bool,
        /// Re-read and re-verify the manifest first.
        #[arg(long)]
        refresh: bool,
    },
    /// Start one worker, or every committed worker.
    Start {
        name: Option<String>,
        #[arg(long)]
        dont_commit: bool,
    },
    /// Stop one worker, or every running worker.
    Stop {
        name: Option<String>,
        #[arg(long)]
        dont_commit: bool,
    },
    /// Restart one worker, or every running worker.
    Reload {
        name: Option<String>,
        #[arg(long)]
        dont_commit: bool,
    },
    /// Show a worker's stats, or its speed with --speed.
    Stats {
        name: String,
        #[arg(long)]
        speed: bool,
    },
    /// Set a worker parameter.
    Set { name: String, id: String, value: String },
    /// Invoke a worker side action.
    Func {
        name: String,
        func: String,
        value: Option<String>,
    },
    /// Print the verified manifest mirror.
    Manifest,
}


fn main() {
    let cli = Cli::parse();
    let paths = Paths::new(&resolve_config_dir(cli.config_dir.as_deref()));

    let result = match cli.cmd {
        Command::Init { force } => init(&paths, force),
        Command::Run => run_daemon(&paths),
        Command::Secret => Secret::load_or_create(&paths.secret_file())
            .map(|s| println!("{}", s.as_str()))
            .map_err(|e| e.to_string()),
        other => remote(&paths, other),
    };
    if let Err(e) = result {
        eprintln!("minerdock: {}", e);
        process::exit(1);
    }
}


/// `--config-dir`, then `$MINERDOCK_DIR`, then `~/.config/minerdock`.
fn resolve_config_dir(flag: Option<&Path>) -> PathBuf {
    if let Some(dir) = flag {
        return dir.to_path_buf();
    }
    if let Ok(dir) = std::env::var("MINERDOCK_DIR") {
        return PathBuf::from(dir);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home).join(".config").join("minerdock")
}


fn init(paths: &Paths, force: bool) -> Result<(), String> {
    let path = paths.settings_file();
    if path.exists() && !force {
        return Err(format!("{} already exists (use --force to overwrite)", path.display()));
    }
    settings::save(&path, &Settings::default()).map_err(|e| e.to_string())?;
    Secret::load_or_create(&paths.secret_file()).map_err(|e| e.to_string())?;
    println!("wrote {}", path.display());
    Ok(())
}


fn run_daemon(paths: &Paths) -> Result<(), String> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = settings::load(&paths.settings_file()).map_err(|e| e.to_string())?;
    let secret = Secret::load_or_create(&paths.secret_file()).map_err(|e| e.to_string())?;
    let mut daemon = Daemon::open(paths, settings.clone(), Hooks::default()).map_err(|e| e.to_string())?;
    let handle = daemon.handle();

    let plane = ControlPlane::new(
        handle.clone(),
        daemon.probes(),
        secret,
        Duration::from_millis(settings.stats_timeout_ms),
    );
    let server = ControlServer::bind(settings.api_port, plane).map_err(|e| e.to_string())?;

    let mut automation = Supervisor::new();
    if settings.automation.enabled {
        match automation_engine(&settings, handle.clone()) {
            Ok(engine) => {
                let interval = Duration::from_millis(settings.automation.interval_ms.max(1));
                if let Err(e) = automation.run_policy(engine, interval) {
                    warn!("automation disabled: {}", e);
                }
            }
            Err(e) => warn!("automation disabled: {}", e),
        }
    }

    let stopper = handle.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("interrupt received");
        let _ = stopper.shutdown();
    }) {
        error!("cannot install signal handler: {}", e);
    }

    // Automation submits fail fast once the daemon loop has closed its queue.
    daemon.run();
    automation.stop();
    server.shutdown();
    Ok(())
}

fn automation_engine(
    settings: &Settings,
    handle: DaemonHandle,
) -> Result<Engine, ControlError> {
    let policy = match &settings.automation.policy_file {
        Some(path) => Policy::load(path)?,
        None => Policy::default(),
    };
    let host = QueueHost::new(
        handle,
        Box::new(StaticProfitability::new(settings.profitability.clone())),
    );
    let idle = CommandIdleSource::new(Box::new(ShellRunner), &settings.automation.idle_command);
    Ok(Engine::new(policy, Box::new(host), Box::new(idle)))
}


/// A Control-Plane call: path plus query pairs, left to the HTTP client to
/// encode.
#[derive(Debug, PartialEq)]
struct Request {
    path: String,
    query: Vec<(&'static str, String)>,
}

impl Request {
    fn new(path: String) -> Self {
        Request { path, query: Vec::new() }
    }

    fn with(mut self, key: &'static str, value: &str) -> Self {
        self.query.push((key, value.to_string()));
        self
    }
}

/// Worker and function names travel as path segments.
fn segment(s: &str) -> Result<&str, String> {
    let ok = !s.is_empty()
        && s.bytes().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
    if ok {
        Ok(s)
    } else {
        Err(format!("invalid name '{}'", s))
    }
}

/// Map a client subcommand to its Control-Plane request.
fn request(cmd: &Command) -> Result<Request, String> {
    let verb = |op: &str, name: &Option<String>, dont_commit: bool| -> Result<Request, String> {
        let path = match name {
            Some(name) => format!("/workers/{}/{}", segment(name)?, op),
            None => format!("/workers/{}", op),
        };
        let req = Request::new(path);
        Ok(if dont_commit { req.with("dontCommit", "true") } else { req })
    };
    let req = match cmd {
        Command::Workers { refresh, .. } => {
            let req = Request::new("/workers".into()).with("asArray", "true");
            if *refresh {
                req.with("updateCache", "true")
            } else {
                req
            }
        }
        Command::Start { name, dont_commit } => verb("start", name, *dont_commit)?,
        Command::Stop { name, dont_commit } => verb("stop", name, *dont_commit)?,
        Command::Reload { name, dont_commit } => verb("reload", name, *dont_commit)?,
        Command::Stats { name, speed } => Request::new(format!(
            "/workers/{}/{}",
            segment(name)?,
            if *speed { "getSpeed" } else { "getStats" }
        )),
        Command::Set { name, id, value } => {
            Request::new(format!("/workers/{}/setCustomParameter", segment(name)?))
                .with("id", id)
                .with("value", value)
        }
        Command::Func { name, func, value } => {
            let req = Request::new(format!("/workers/{}/func/{}", segment(name)?, segment(func)?));
            match value {
                Some(v) => req.with("value", v),
                None => req,
            }
        }
        Command::Manifest => Request::new("/manifest".into()),
        Command::Init { .. } | Command::Run | Command::Secret => {
            return Err("not a remote command".into())
        }
    };
    Ok(req)
}


fn remote(paths: &Paths, cmd: Command) -> Result<(), String> {
    let settings = settings::load(&paths.settings_file()).map_err(|e| e.to_string())?;
    let secret = Secret::load_or_create(&paths.secret_file()).map_err(|e| e.to_string())?;
    let client = ApiClient::new(settings.api_port, secret.as_str(), Duration::from_secs(30));
    let req = request(&cmd)?;
    let body = client.get(&req.path, &req.query)?;
    match cmd {
        Command::Workers { json: false, .. } => print_workers(&body),
        _ => println!("{}", serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.to_string())),
    }
    Ok(())
}

fn print_workers(list: &Value) {
    let workers = list.as_array().cloned().unwrap_or_default();
    if workers.is_empty() {
        println!("no workers installed");
        return;
    }
    println!("{:<12} {:<10} {:<9} {:>8} {:>6}", "NAME", "STATE", "COMMITTED", "PID", "PORT");
    for w in workers {
        let num = |key: &str| w[key].as_u64().map(|n| n.to_string()).unwrap_or_else(|| "-".into());
        println!(
            "{:<12} {:<10} {:<9} {:>8} {:>6}",
            w["name"].as_str().unwrap_or("?"),
            w["state"].as_str().unwrap_or("?"),
            if w["committed"] == true { "yes" } else { "no" },
            num("pid"),
            num("daemonPort"),
        );
    }
}
