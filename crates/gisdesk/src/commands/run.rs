//! Startup run: checklist, then idle until SIGINT or SIGTERM.

use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use gisdesk_core::status::StatusWriter;
use gisdesk_core::{Config, Host, Orchestrator, Status, StatusRecord};
use tokio::signal::unix::{SignalKind, signal};
use tracing::warn;

use crate::logging;

pub async fn execute(config: Config) -> Result<ExitCode> {
    let host = Host::system(&config);
    let mut orchestrator = Orchestrator::new(config, host);

    let mut status = orchestrator.start().await;
    if matches!(status, Status::Running | Status::Partial) {
        status = orchestrator.idle(shutdown_signal()).await;
    }

    Ok(ExitCode::from(status.exit_code()))
}

/// Set up logging for a run, recording ERROR if that fails.
pub fn init_logging(config: &Config) -> Result<()> {
    logging::init(Some(&config.startup_log()))
        .inspect_err(|e| record_startup_error(&config.paths.status_file, e))
}

/// Record ERROR for a run that failed before the orchestrator started, so a
/// record left by an earlier run does not keep reporting healthy.
pub fn record_startup_error(status_file: &Path, err: &anyhow::Error) {
    let mut record = StatusRecord::now(Status::Error);
    record.message = Some(format!("{:#}", err));

    if let Err(e) = StatusWriter::new(status_file).write(&record) {
        eprintln!("Failed to write status file {}: {}", status_file.display(), e);
    }
}

/// Resolves on the first SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gisdesk_core::status;
    use tempfile::tempdir;

    #[test]
    fn test_logging_failure_replaces_stale_running() {
        let temp = tempdir().unwrap();
        let status_file = temp.path().join("state").join("status.json");
        StatusWriter::new(&status_file)
            .write(&StatusRecord::now(Status::Running))
            .unwrap();

        // A log directory that cannot be created
        let blocker = temp.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let mut config = Config::default();
        config.paths.log_dir = blocker.join("logs");
        config.paths.status_file = status_file.clone();

        assert!(init_logging(&config).is_err());

        let record = status::read(&status_file).unwrap();
        assert_eq!(record.status, Status::Error);
        assert_eq!(record.status.exit_code(), 1);
        assert!(record.message.unwrap().contains("blocker"));
    }

    #[test]
    fn test_startup_error_records_context_chain() {
        let temp = tempdir().unwrap();
        let status_file = temp.path().join("status.json");
        let err = anyhow::anyhow!("processes = 7 is not a list")
            .context("Failed to load configuration");

        record_startup_error(&status_file, &err);

        let record = status::read(&status_file).unwrap();
        assert_eq!(record.status, Status::Error);
        assert_eq!(
            record.message.as_deref(),
            Some("Failed to load configuration: processes = 7 is not a list")
        );
    }

    #[test]
    fn test_unwritable_status_file_is_not_fatal() {
        let temp = tempdir().unwrap();
        let blocker = temp.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();

        record_startup_error(&blocker.join("status.json"), &anyhow::anyhow!("boom"));

        assert!(!blocker.join("status.json").exists());
    }
}
