//! Spawning and signalling of wrapped executables.

use std::fs::OpenOptions;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::error::ControlError;

const POLL: Duration = Duration::from_millis(20);


/// Spawn `binary` with `args` in `cwd`, appending stdout/stderr to `log_path`.
pub fn spawn(binary: &Path, args: &[String], cwd: &Path, log_path: &Path) -> Result<Child, ControlError> {
    let context = || format!("spawn {}", binary.display());
    std::fs::create_dir_all(cwd).map_err(|e| ControlError::io(context(), e))?;
    let log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .map_err(|e| ControlError::io(context(), e))?;
    let log_err = log.try_clone().map_err(|e| ControlError::io(context(), e))?;

    debug!("exec {} {:?}", binary.display(), args);
    Command::new(binary)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err))
        .spawn()
        .map_err(|e| ControlError::io(context(), e))
}


/// Whether a process with this pid exists (zombies included).
pub fn is_alive(pid: u32) -> bool {
    match to_pid_t(pid) {
        Some(p) => unsafe { libc::kill(p, 0) == 0 },
        None => false,
    }
}


/// Send `sig` to `pid`. A process that is already gone counts as success.
pub fn signal(pid: u32, sig: libc::c_int) -> io::Result<()> {
    let p = to_pid_t(pid)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("refusing to signal pid {}", pid)))?;
    if unsafe { libc::kill(p, sig) } == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(())
    } else {
        Err(err)
    }
}


/// SIGTERM our own child, wait up to `timeout`, then SIGKILL. Tolerates a
/// child that has already exited.
pub fn terminate_child(child: &mut Child, timeout: Duration) -> io::Result<ExitStatus> {
    if let Some(status) = child.try_wait()? {
        return Ok(status);
    }
    signal(child.id(), libc::SIGTERM)?;
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        std::thread::sleep(POLL);
    }
    warn!("pid {} ignored SIGTERM for {:?}, killing", child.id(), timeout);
    // kill() fails with InvalidInput if the child was reaped in between.
    let _ = child.kill();
    child.wait()
}


/// Terminate a process we do not own (an orphan from a previous daemon).
/// Returns true if a signal was delivered.
pub fn terminate_pid(pid: u32, timeout: Duration) -> bool {
    if !is_alive(pid) {
        return false;
    }
    if let Err(e) = signal(pid, libc::SIGTERM) {
        warn!("cannot signal orphan {}: {}", pid, e);
        return false;
    }
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if !is_alive(pid) {
            return true;
        }
        std::thread::sleep(POLL);
    }
    let _ = signal(pid, libc::SIGKILL);
    true
}


/// Short human description of how a process ended.
pub fn describe(status: &ExitStatus) -> String {
    match (status.code(), status.signal()) {
        (Some(code), _) => format!("exit code {}", code),
        (None, Some(sig)) => format!("signal {}", sig),
        _ => "unknown status".into(),
    }
}


fn to_pid_t(pid: u32) -> Option<libc::pid_t> {
    // 0 and negative values address process groups; never send those.
    if pid == 0 || pid > i32::MAX as u32 {
        None
    } else {
        Some(pid as libc::pid_t)
    }
}
