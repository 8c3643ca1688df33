//! Process table helpers.
//!
//! Used for the best-effort cleanup of stale managed processes left over from
//! a previous run, and as a liveness fallback when no child handle is held.
//! The table comes from `sysinfo`; signals go through `libc`.

use std::path::Path;
use sysinfo::{Pid, Process, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::debug;

/// The kernel keeps at most this many bytes of the executable name.
const COMM_LEN: usize = 15;

/// One entry of the process table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: i32,
    pub name: String,
    pub cmdline: Vec<String>,
}

impl ProcessEntry {
    fn from_process(pid: Pid, process: &Process) -> Self {
        Self {
            pid: pid.as_u32() as i32,
            name: process.name().to_string_lossy().to_string(),
            cmdline: process
                .cmd()
                .iter()
                .map(|arg| arg.to_string_lossy().to_string())
                .collect(),
        }
    }

    /// Whether this process is an instance of `name`.
    ///
    /// Matches the process name (also when truncated like the kernel does),
    /// the basename of argv[0], or the basename of argv[1] for interpreted
    /// programs such as `python3 /usr/bin/websockify`.
    pub fn matches(&self, name: &str) -> bool {
        if !self.name.is_empty() {
            let truncated: String = name.chars().take(COMM_LEN).collect();
            if self.name == name || self.name == truncated {
                return true;
            }
        }

        self.cmdline
            .iter()
            .take(2)
            .any(|arg| basename(arg) == name)
    }
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Read the process table.
pub fn list_processes() -> Vec<ProcessEntry> {
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::everything(),
    );

    system
        .processes()
        .iter()
        .map(|(pid, process)| ProcessEntry::from_process(*pid, process))
        .collect()
}

/// Processes matching `name`, excluding this process.
pub fn find_by_name(name: &str) -> Vec<ProcessEntry> {
    let own = std::process::id() as i32;
    list_processes()
        .into_iter()
        .filter(|p| p.pid != own && p.matches(name))
        .collect()
}

/// Check if a process exists by PID.
pub fn pid_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    // On Unix, sending signal 0 checks if process exists
    if unsafe { libc::kill(pid, 0) } == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// SIGKILL every instance of `name`. Returns how many were signalled.
///
/// Failures (already gone, not permitted) are ignored.
pub fn kill_by_name(name: &str) -> usize {
    find_by_name(name)
        .into_iter()
        .filter(|p| {
            let sent = unsafe { libc::kill(p.pid, libc::SIGKILL) } == 0;
            let outcome = if sent { "sent" } else { "failed" };
            debug!("SIGKILL {} (pid {}): {}", name, p.pid, outcome);
            sent
        })
        .count()
}

/// Remove stale display lock and socket files. Returns how many were removed.
pub fn remove_stale_files<P: AsRef<Path>>(files: &[P]) -> usize {
    let mut removed = 0;
    for file in files {
        let path: &Path = file.as_ref();
        if std::fs::remove_file(path).is_ok() {
            debug!("Removed stale {}", path.display());
            removed += 1;
        }
    }
    removed
}
