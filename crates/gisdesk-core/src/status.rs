//! Status record persisted for external health checks.
//!
//! The record is rewritten wholesale on every status change. Writes go to a
//! temporary file in the same directory which is then renamed over the
//! target, so readers never observe a partial file.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{Error, Result};

/// Overall health of the desktop stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    /// Every verified process is alive
    Running,
    /// Launched, but at least one verified process is missing
    Partial,
    /// A hard precondition failed or a process could not be started
    Failed,
    /// Unexpected fault
    Error,
    /// Interrupted after a completed startup
    Stopped,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Running => "RUNNING",
            Status::Partial => "PARTIAL",
            Status::Failed => "FAILED",
            Status::Error => "ERROR",
            Status::Stopped => "STOPPED",
        }
    }

    /// Process exit code for a run that ended in this status.
    pub fn exit_code(&self) -> u8 {
        match self {
            Status::Running | Status::Partial | Status::Stopped => 0,
            Status::Failed | Status::Error => 1,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "RUNNING" => Ok(Status::Running),
            "PARTIAL" => Ok(Status::Partial),
            "FAILED" => Ok(Status::Failed),
            "ERROR" => Ok(Status::Error),
            "STOPPED" => Ok(Status::Stopped),
            other => Err(Error::Other(format!("Unknown status: {}", other))),
        }
    }
}

/// Liveness of one managed process at the time of the write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessReport {
    pub pid: Option<u32>,
    pub alive: bool,
    pub verified: bool,
}

/// The persisted health summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub status: Status,
    pub timestamp: String,
    pub application_version: String,
    pub runtime_version: String,
    pub installed_packages: BTreeMap<String, String>,
    #[serde(default)]
    pub processes: BTreeMap<String, ProcessReport>,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub run_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusRecord {
    /// A record stamped with the current time.
    pub fn now(status: Status) -> Self {
        Self {
            status,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            application_version: crate::compat::UNKNOWN_VERSION.to_string(),
            runtime_version: crate::compat::UNKNOWN_VERSION.to_string(),
            installed_packages: BTreeMap::new(),
            processes: BTreeMap::new(),
            hostname: String::new(),
            run_id: String::new(),
            message: None,
        }
    }
}

/// Writes status records to one well-known path.
#[derive(Debug, Clone)]
pub struct StatusWriter {
    path: PathBuf,
    writes: usize,
}

impl StatusWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writes: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records written by this writer.
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Atomically replace the status file with `record`.
    pub fn write(&mut self, record: &StatusRecord) -> Result<()> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)?;

        let mut content = serde_json::to_string_pretty(record)?;
        content.push('\n');

        let mut tmp = NamedTempFile::new_in(&parent)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)?;

        self.writes += 1;
        debug!("Status {} written to {}", record.status, self.path.display());
        Ok(())
    }
}

/// Read the status record at `path`.
pub fn read(path: &Path) -> Result<StatusRecord> {
    if !path.exists() {
        return Err(Error::StatusNotFound(path.display().to_string()));
    }
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
