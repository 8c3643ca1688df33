//! Startup orchestrator.
//!
//! Runs the startup checklist against a [`Host`] and records exactly one
//! terminal status per run, plus one `STOPPED` when an idle run is
//! interrupted:
//!
//! 1. runtime packages (soft, optional upgrade)
//! 2. version floors (soft)
//! 3. required commands (hard: `FAILED`)
//! 4. cleanup, ordered launch (spawn error: `FAILED`)
//! 5. verification (`RUNNING` or `PARTIAL`)
//!
//! Any other error is caught here and recorded as `ERROR`.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::compat::{self, UNKNOWN_VERSION};
use crate::config::{Config, Role};
use crate::deps::{self, PythonProbe, RuntimeProbe};
use crate::error::{Error, Result};
use crate::status::{ProcessReport, Status, StatusRecord, StatusWriter};
use crate::supervisor::{LaunchedProcess, ProcessLauncher, Supervisor, SystemLauncher};
use crate::tools::{self, CommandLocator, PathLocator};

/// The outside world the orchestrator talks to.
#[derive(Clone)]
pub struct Host {
    pub locator: Arc<dyn CommandLocator>,
    pub probe: Arc<dyn RuntimeProbe>,
    pub launcher: Arc<dyn ProcessLauncher>,
}

impl Host {
    /// The real system: `PATH` lookups, the configured interpreter, OS processes.
    pub fn system(config: &Config) -> Self {
        let timeout = Duration::from_secs(config.checks.command_timeout_secs);
        Self {
            locator: Arc::new(PathLocator),
            probe: Arc::new(PythonProbe::new(&config.runtime, timeout)),
            launcher: Arc::new(SystemLauncher),
        }
    }
}

/// How the checklist ended, before it is turned into a status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ready,
    Degraded(Vec<String>),
    Failed(String),
}

/// State carried through one orchestrator run.
pub struct RunContext {
    pub config: Config,
    pub run_id: Uuid,
    pub hostname: String,
    writer: StatusWriter,
    packages: BTreeMap<String, String>,
    runtime_version: Option<String>,
    application_version: Option<String>,
    processes: BTreeMap<String, ProcessReport>,
    children: Vec<LaunchedProcess>,
    last_status: Option<Status>,
}

impl RunContext {
    pub fn new(config: Config) -> Self {
        let writer = StatusWriter::new(&config.paths.status_file);
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_default();

        Self {
            config,
            run_id: Uuid::new_v4(),
            hostname,
            writer,
            packages: BTreeMap::new(),
            runtime_version: None,
            application_version: None,
            processes: BTreeMap::new(),
            children: Vec::new(),
            last_status: None,
        }
    }

    pub fn last_status(&self) -> Option<Status> {
        self.last_status
    }

    /// Number of status records written during this run.
    pub fn status_writes(&self) -> usize {
        self.writer.writes()
    }

    pub fn children(&self) -> &[LaunchedProcess] {
        &self.children
    }
}

/// Drives one startup run.
pub struct Orchestrator {
    host: Host,
    ctx: RunContext,
}

impl Orchestrator {
    pub fn new(config: Config, host: Host) -> Self {
        Self {
            host,
            ctx: RunContext::new(config),
        }
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Run the checklist and record its terminal status.
    pub async fn start(&mut self) -> Status {
        info!("gisdesk run {} starting", self.ctx.run_id);

        let (status, message) = match self.run_checklist().await {
            Ok(Outcome::Ready) => {
                info!("✓ All managed processes running");
                (Status::Running, None)
            }
            Ok(Outcome::Degraded(missing)) => {
                warn!("⚠ Started with missing processes: {}", missing.join(", "));
                (
                    Status::Partial,
                    Some(format!("not running: {}", missing.join(", "))),
                )
            }
            Ok(Outcome::Failed(reason)) => {
                error!("✗ Startup failed: {}", reason);
                (Status::Failed, Some(reason))
            }
            Err(e) => {
                error!("✗ Unexpected error during startup: {}", e);
                (Status::Error, Some(e.to_string()))
            }
        };

        self.report(status, message).await;
        status
    }

    async fn run_checklist(&mut self) -> Result<Outcome> {
        let config = self.ctx.config.clone();

        info!("Checking runtime packages...");
        let report = deps::check_with_upgrade(self.host.probe.as_ref(), &config.runtime).await;
        if !report.all_present {
            warn!("⚠ Missing packages: {}", report.missing.join(", "));
        }
        self.ctx.packages = report.versions;

        info!("Checking package versions...");
        let compat =
            compat::verify_compatibility(&self.ctx.packages, &config.runtime.minimum_versions);
        if !compat.all_compatible {
            warn!(
                "⚠ {} package(s) below their minimum version",
                compat.incompatible.len()
            );
        }

        info!("Checking required commands...");
        let commands =
            tools::check_commands(self.host.locator.as_ref(), &config.checks.required_commands);
        if !commands.all_present {
            return Ok(Outcome::Failed(
                Error::MissingCommands(commands.missing).to_string(),
            ));
        }

        config.ensure_dirs()?;

        let launcher = self.host.launcher.clone();
        let mut supervisor = Supervisor::new(launcher.as_ref());
        supervisor.cleanup(&config.processes, &config.display).await?;

        let launched = supervisor
            .launch_all(
                &config.processes,
                &config.display,
                &config.base_env(),
                &config.paths.log_dir,
            )
            .await;

        if let Err(e) = launched {
            self.ctx.children = supervisor.into_children();
            return if e.is_precondition() {
                Ok(Outcome::Failed(e.to_string()))
            } else {
                Err(e)
            };
        }

        info!("Verifying managed processes...");
        let verification = supervisor.verify(&config.processes)?;
        self.ctx.processes = verification
            .checks
            .iter()
            .map(|c| {
                (
                    c.name.clone(),
                    ProcessReport {
                        pid: c.pid,
                        alive: c.alive,
                        verified: c.verified,
                    },
                )
            })
            .collect();
        self.ctx.children = supervisor.into_children();

        if verification.all_running {
            Ok(Outcome::Ready)
        } else {
            Ok(Outcome::Degraded(verification.missing))
        }
    }

    /// Block until `shutdown` resolves, logging a liveness summary every
    /// heartbeat, then record `STOPPED`.
    pub async fn idle<F>(&mut self, shutdown: F) -> Status
    where
        F: Future<Output = ()>,
    {
        let period = Duration::from_secs(self.ctx.config.supervisor.heartbeat_secs.max(1));
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        tokio::pin!(shutdown);

        info!("Idle; heartbeat every {}s", period.as_secs());
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => self.heartbeat(),
            }
        }

        info!("Shutdown requested");
        self.report(Status::Stopped, None).await;
        Status::Stopped
    }

    fn heartbeat(&mut self) {
        let launcher = self.host.launcher.clone();
        let total = self.ctx.children.len();

        let mut gone = Vec::new();
        for child in self.ctx.children.iter_mut() {
            if !launcher.is_alive(child) {
                gone.push(child.name.clone());
            }
        }

        let alive = total - gone.len();
        if gone.is_empty() {
            info!("heartbeat: {}/{} managed processes alive", alive, total);
        } else {
            warn!(
                "heartbeat: {}/{} managed processes alive, gone: {}",
                alive,
                total,
                gone.join(", ")
            );
        }
    }

    /// Collect versions once per run.
    async fn ensure_versions(&mut self) {
        if self.ctx.runtime_version.is_none() {
            self.ctx.runtime_version = Some(
                self.host
                    .probe
                    .runtime_version()
                    .await
                    .unwrap_or_else(|| UNKNOWN_VERSION.to_string()),
            );
        }

        if self.ctx.application_version.is_none() {
            let version = match self.ctx.config.process(Role::Application) {
                Some(app) => self.host.probe.program_version(&app.program).await,
                None => None,
            };
            self.ctx.application_version =
                Some(version.unwrap_or_else(|| UNKNOWN_VERSION.to_string()));
        }
    }

    /// Write the status record. A failed write is logged, never raised.
    async fn report(&mut self, status: Status, message: Option<String>) {
        self.ensure_versions().await;

        let mut record = StatusRecord::now(status);
        record.application_version = self
            .ctx
            .application_version
            .clone()
            .unwrap_or_else(|| UNKNOWN_VERSION.to_string());
        record.runtime_version = self
            .ctx
            .runtime_version
            .clone()
            .unwrap_or_else(|| UNKNOWN_VERSION.to_string());
        record.installed_packages = self.ctx.packages.clone();
        record.processes = self.ctx.processes.clone();
        record.hostname = self.ctx.hostname.clone();
        record.run_id = self.ctx.run_id.to_string();
        record.message = message;

        match self.ctx.writer.write(&record) {
            Ok(()) => info!(
                "Status {} recorded in {}",
                status,
                self.ctx.writer.path().display()
            ),
            Err(e) => error!("✗ Failed to write status file: {}", e),
        }
        self.ctx.last_status = Some(status);
    }
}
