//! Application lifecycle: start, stop and liveness checks.
//!
//! Processes are matched by the basename of `argv[0]` as read from
//! `/proc/<pid>/cmdline`. Liveness is judged by summing thread counts over
//! all matching processes.
//!
//! # Async Safety
//!
//! The `/proc` scan performs blocking I/O; callers run it via
//! `spawn_blocking`.

use std::ffi::OsStr;
use std::path::Path;

use tokio::process::Command;
use tracing::{debug, info, warn};

use rta_core::{AppStatus, ErrorCode};

/// A running process whose `argv[0]` matched an application name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppProcess {
    pub pid: i32,
    pub threads: u64,
}

/// Returns true if `argv0`'s basename equals `name`.
pub fn matches_app_name(argv0: &str, name: &str) -> bool {
    !name.is_empty() && Path::new(argv0).file_name() == Some(OsStr::new(name))
}

/// Scans `/proc` for processes named `name`.
///
/// Processes that vanish or cannot be read mid-scan are skipped.
pub fn find_app_processes(name: &str) -> Vec<AppProcess> {
    let processes = match procfs::process::all_processes() {
        Ok(processes) => processes,
        Err(e) => {
            warn!(error = %e, "Failed to read /proc");
            return Vec::new();
        }
    };

    processes
        .flatten()
        .filter(|process| {
            process
                .cmdline()
                .ok()
                .and_then(|argv| argv.into_iter().next())
                .map(|argv0| matches_app_name(&argv0, name))
                .unwrap_or(false)
        })
        .map(|process| AppProcess {
            pid: process.pid(),
            threads: process
                .stat()
                .map(|stat| u64::try_from(stat.num_threads).unwrap_or(0))
                .unwrap_or(0),
        })
        .collect()
}

/// Reports whether the application appears to be running.
pub fn check_app_status(name: &str) -> AppStatus {
    let processes = find_app_processes(name);
    let threads: u64 = processes.iter().map(|p| p.threads).sum();
    let status = AppStatus::from_threads(processes.len(), threads);
    debug!(app = name, processes = processes.len(), threads, status = %status, "Checked application status");
    status
}

fn process_exists(pid: i32) -> bool {
    // SAFETY: signal 0 only performs the permission and existence check.
    unsafe { libc::kill(pid, 0) == 0 }
}

/// Sends `signal` to `pid`; a process that is already gone counts as success.
fn signal_process(pid: i32, signal: libc::c_int) -> bool {
    // SAFETY: kill(2) has no memory-safety preconditions.
    let delivered = unsafe { libc::kill(pid, signal) == 0 };
    if delivered || !process_exists(pid) {
        debug!(pid, signal, "Process signalled");
        true
    } else {
        warn!(pid, signal, error = %std::io::Error::last_os_error(), "Failed to signal process");
        false
    }
}

/// Stops every process named `name`.
///
/// Sends SIGTERM to all of them; if any could not be signalled, escalates to
/// SIGKILL for the survivors.
pub fn stop_app(name: &str) -> ErrorCode {
    let pids: Vec<i32> = find_app_processes(name).iter().map(|p| p.pid).collect();
    info!(app = name, count = pids.len(), "Stopping application");

    let all_terminated = pids
        .iter()
        .fold(true, |ok, &pid| signal_process(pid, libc::SIGTERM) && ok);
    if all_terminated {
        return ErrorCode::Success;
    }

    let all_killed = pids
        .iter()
        .filter(|&&pid| process_exists(pid))
        .fold(true, |ok, &pid| signal_process(pid, libc::SIGKILL) && ok);

    if all_killed {
        ErrorCode::Success
    } else {
        ErrorCode::Failed
    }
}

/// Spawns `path/name` with `path` as its working directory.
///
/// A detached task reaps the child and logs how it exited.
pub fn start_app(path: &Path, name: &str) -> ErrorCode {
    let program = path.join(name);
    let mut child = match Command::new(&program).current_dir(path).spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!(program = %program.display(), error = %e, "Failed to start application");
            return ErrorCode::Failed;
        }
    };

    let pid = child.id();
    info!(program = %program.display(), pid = ?pid, "Application started");

    let app = name.to_string();
    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) => info!(app = %app, pid = ?pid, status = %status, "Application exited"),
            Err(e) => warn!(app = %app, pid = ?pid, error = %e, "Failed to wait for application"),
        }
    });

    ErrorCode::Success
}
