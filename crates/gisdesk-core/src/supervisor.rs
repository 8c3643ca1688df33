//! Process supervisor: cleanup, ordered launch and one-shot verification.
//!
//! Stages are visited strictly forward:
//!
//! ```text
//! CLEANUP -> LAUNCH(display) -> LAUNCH(wm) -> LAUNCH(vnc) -> LAUNCH(bridge)
//!         -> LAUNCH(app) -> VERIFY -> READY | DEGRADED
//! ```
//!
//! The supervisor keeps the child handle of every process it spawns and
//! verifies liveness through that handle rather than by name.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::OpenOptions;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, error, info, warn};

use crate::config::{DisplayConfig, ProcessSpec, Role};
use crate::error::{Error, Result};
use crate::proctable;
use crate::readiness::{self, ReadyState};

/// Supervisor stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Idle,
    Cleanup,
    Launch(Role),
    Verify,
    Ready,
    Degraded,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Idle => write!(f, "IDLE"),
            Stage::Cleanup => write!(f, "CLEANUP"),
            Stage::Launch(role) => write!(f, "LAUNCH_{}", role.as_str().to_uppercase()),
            Stage::Verify => write!(f, "VERIFY"),
            Stage::Ready => write!(f, "READY"),
            Stage::Degraded => write!(f, "DEGRADED"),
        }
    }
}

/// A process started by the supervisor.
#[derive(Debug)]
pub struct LaunchedProcess {
    pub name: String,
    pub role: Role,
    pub pid: Option<u32>,
    pub child: Option<Child>,
}

/// What a cleanup pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub killed: usize,
    pub removed_files: usize,
}

/// Starts, inspects and cleans up managed processes.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Kill every instance of `names` and remove stale display files.
    /// Never fails.
    async fn cleanup(&self, names: &[String], display: &DisplayConfig) -> CleanupReport;

    /// Spawn `spec` detached with output going to `log_file`.
    fn spawn(
        &self,
        spec: &ProcessSpec,
        args: &[String],
        env: &BTreeMap<String, String>,
        log_file: &Path,
    ) -> Result<LaunchedProcess>;

    /// Whether a launched process is still running.
    fn is_alive(&self, process: &mut LaunchedProcess) -> bool;
}

/// Launcher backed by the real OS.
#[derive(Debug, Clone, Default)]
pub struct SystemLauncher;

#[async_trait]
impl ProcessLauncher for SystemLauncher {
    async fn cleanup(&self, names: &[String], display: &DisplayConfig) -> CleanupReport {
        let killed: usize = names.iter().map(|n| proctable::kill_by_name(n)).sum();
        if killed > 0 {
            // Give the kernel a moment to release the display socket
            tokio::time::sleep(Duration::from_millis(500)).await;
        }

        let removed_files =
            proctable::remove_stale_files(&[display.lock_file(), display.socket_file()]);

        CleanupReport {
            killed,
            removed_files,
        }
    }

    fn spawn(
        &self,
        spec: &ProcessSpec,
        args: &[String],
        env: &BTreeMap<String, String>,
        log_file: &Path,
    ) -> Result<LaunchedProcess> {
        let spawn_err = |reason: String| Error::Spawn {
            name: spec.name.clone(),
            reason,
        };

        let stdout = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .map_err(|e| spawn_err(format!("cannot open {}: {}", log_file.display(), e)))?;
        let stderr = stdout
            .try_clone()
            .map_err(|e| spawn_err(e.to_string()))?;

        let child = Command::new(&spec.program)
            .args(args)
            .envs(env)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .process_group(0)
            .kill_on_drop(false)
            .spawn()
            .map_err(|e| spawn_err(e.to_string()))?;

        Ok(LaunchedProcess {
            name: spec.name.clone(),
            role: spec.role,
            pid: child.id(),
            child: Some(child),
        })
    }

    fn is_alive(&self, process: &mut LaunchedProcess) -> bool {
        match process.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => process
                .pid
                .map(|pid| proctable::pid_alive(pid as i32))
                .unwrap_or(false),
        }
    }
}

/// Per-process verification result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessCheck {
    pub name: String,
    pub pid: Option<u32>,
    pub alive: bool,
    pub verified: bool,
}

/// Result of the verification pass.
#[derive(Debug, Clone, Default)]
pub struct Verification {
    pub all_running: bool,
    /// Verified processes found dead
    pub missing: Vec<String>,
    pub checks: Vec<ProcessCheck>,
}

/// Drives the launch sequence for one run and owns the launched children.
pub struct Supervisor<'a> {
    launcher: &'a dyn ProcessLauncher,
    stage: Stage,
    children: Vec<LaunchedProcess>,
}

impl<'a> Supervisor<'a> {
    pub fn new(launcher: &'a dyn ProcessLauncher) -> Self {
        Self {
            launcher,
            stage: Stage::Idle,
            children: Vec::new(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn children(&self) -> &[LaunchedProcess] {
        &self.children
    }

    /// Hand the launched children over to the caller.
    pub fn into_children(self) -> Vec<LaunchedProcess> {
        self.children
    }

    fn advance(&mut self, next: Stage) -> Result<()> {
        if next <= self.stage {
            return Err(Error::InvalidStateTransition {
                from: self.stage.to_string(),
                to: next.to_string(),
            });
        }
        debug!("stage {} -> {}", self.stage, next);
        self.stage = next;
        Ok(())
    }

    /// Best-effort removal of leftovers from a previous run.
    pub async fn cleanup(
        &mut self,
        specs: &[ProcessSpec],
        display: &DisplayConfig,
    ) -> Result<CleanupReport> {
        self.advance(Stage::Cleanup)?;

        let names: Vec<String> = specs.iter().map(|s| s.name.clone()).collect();
        let report = self.launcher.cleanup(&names, display).await;

        info!(
            "Cleanup: {} stale process(es) killed, {} stale file(s) removed",
            report.killed, report.removed_files
        );
        Ok(report)
    }

    /// Launch every process in order, waiting for each to become ready.
    ///
    /// A spawn failure stops the sequence; later processes are not started.
    pub async fn launch_all(
        &mut self,
        specs: &[ProcessSpec],
        display: &DisplayConfig,
        env: &BTreeMap<String, String>,
        log_dir: &Path,
    ) -> Result<()> {
        for spec in specs {
            self.advance(Stage::Launch(spec.role))?;

            let args = spec.expanded_args(display);
            let log_file = spec.log_file(log_dir);
            info!("Starting {} ({} {})", spec.name, spec.program, args.join(" "));

            let mut process = match self.launcher.spawn(spec, &args, env, &log_file) {
                Ok(p) => p,
                Err(e) => {
                    error!("✗ {}", e);
                    return Err(e);
                }
            };
            info!("  pid {:?}, log {}", process.pid, log_file.display());

            let launcher = self.launcher;
            let budget = Duration::from_secs(spec.wait_secs);
            let state = readiness::wait_ready(&spec.readiness, display, budget, || {
                launcher.is_alive(&mut process)
            })
            .await;

            match state {
                ReadyState::Ready => info!("✓ {} ready", spec.name),
                ReadyState::TimedOut => warn!(
                    "⚠ {} not ready after {}s, continuing",
                    spec.name, spec.wait_secs
                ),
                ReadyState::Exited => warn!("⚠ {} exited during startup", spec.name),
            }

            self.children.push(process);
        }

        Ok(())
    }

    /// Check every verified process once. Missing processes do not stop
    /// the scan.
    pub fn verify(&mut self, specs: &[ProcessSpec]) -> Result<Verification> {
        self.advance(Stage::Verify)?;

        let mut verification = Verification {
            all_running: true,
            ..Default::default()
        };

        for spec in specs {
            let child = self.children.iter_mut().find(|c| c.name == spec.name);
            let (pid, alive) = match child {
                Some(c) => (c.pid, self.launcher.is_alive(c)),
                None => (None, false),
            };

            if spec.verify {
                if alive {
                    info!("✓ {} running", spec.name);
                } else {
                    error!("✗ {} not running", spec.name);
                    verification.all_running = false;
                    verification.missing.push(spec.name.clone());
                }
            } else {
                debug!("{} not verified (alive: {})", spec.name, alive);
            }

            verification.checks.push(ProcessCheck {
                name: spec.name.clone(),
                pid,
                alive,
                verified: spec.verify,
            });
        }

        let terminal = if verification.all_running {
            Stage::Ready
        } else {
            Stage::Degraded
        };
        self.advance(terminal)?;

        Ok(verification)
    }
}
