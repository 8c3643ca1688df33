//! Environment validation command.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use colored::Colorize;
use gisdesk_core::Config;
use gisdesk_core::deps::PythonProbe;
use gisdesk_core::validate::{self, ValidationReport};

pub async fn execute(config: &Config, quick: bool) -> Result<ExitCode> {
    let probe = PythonProbe::new(
        &config.runtime,
        Duration::from_secs(config.checks.command_timeout_secs),
    );
    let report = validate::run(&probe, config, quick).await;

    for line in render(&report) {
        println!("{}", line);
    }

    if report.passed() {
        println!("{}", "Environment OK".green().bold());
        Ok(ExitCode::SUCCESS)
    } else {
        println!("{}", "Environment has problems".red().bold());
        Ok(ExitCode::FAILURE)
    }
}

/// One line per package and directory.
fn render(report: &ValidationReport) -> Vec<String> {
    let mut lines = Vec::new();

    for (name, version) in &report.packages.versions {
        lines.push(format!("{} {}: {}", "[OK]".green(), name, version));
    }
    for name in &report.packages.missing {
        lines.push(format!("{} {}: not importable", "[ERROR]".red(), name));
    }
    for (dir, exists) in &report.directories {
        if *exists {
            lines.push(format!("{} {}", "[OK]".green(), dir.display()));
        } else {
            lines.push(format!("{} {} missing", "[ERROR]".red(), dir.display()));
        }
    }

    lines
}
