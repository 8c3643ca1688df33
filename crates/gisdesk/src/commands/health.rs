//! Container health check against the recorded status.

use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use gisdesk_core::{Config, Error, Status, status};

pub fn execute(config: &Config, allow_partial: bool) -> Result<ExitCode> {
    let (healthy, reason) = evaluate(&config.paths.status_file, allow_partial);
    if healthy {
        println!("healthy: {}", reason);
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("unhealthy: {}", reason);
        Ok(ExitCode::FAILURE)
    }
}

fn evaluate(path: &Path, allow_partial: bool) -> (bool, String) {
    match status::read(path) {
        Ok(record) => {
            let healthy = match record.status {
                Status::Running => true,
                Status::Partial => allow_partial,
                _ => false,
            };
            let reason = match record.message {
                Some(message) => format!("{} ({})", record.status, message),
                None => record.status.to_string(),
            };
            (healthy, reason)
        }
        Err(Error::StatusNotFound(path)) => (false, format!("no status recorded at {}", path)),
        Err(e) => (false, format!("unreadable status: {}", e)),
    }
}
