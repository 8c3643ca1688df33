//! Show the last recorded status.
//!
//! Supports JSON output for programmatic use.

use std::process::ExitCode;

use anyhow::{Context, Result};
use colored::Colorize;
use gisdesk_core::{Config, Status, StatusRecord, status};

pub fn execute(config: &Config, json: bool) -> Result<ExitCode> {
    let path = &config.paths.status_file;
    let record = status::read(path).context("Failed to load status")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        print_human(&record);
    }

    Ok(ExitCode::SUCCESS)
}

fn colored_status(status: Status) -> colored::ColoredString {
    match status {
        Status::Running => status.as_str().green().bold(),
        Status::Partial => status.as_str().yellow().bold(),
        Status::Stopped => status.as_str().dimmed(),
        Status::Failed | Status::Error => status.as_str().red().bold(),
    }
}

fn print_human(record: &StatusRecord) {
    println!("{} {}", "Status:".cyan().bold(), colored_status(record.status));
    println!("{}", "─".repeat(50));
    println!("  Recorded:    {}", record.timestamp);
    if !record.hostname.is_empty() {
        println!("  Host:        {}", record.hostname);
    }
    if !record.run_id.is_empty() {
        println!("  Run:         {}", record.run_id);
    }
    println!("  QGIS:        {}", record.application_version);
    println!("  Python:      {}", record.runtime_version);
    if let Some(message) = &record.message {
        println!("  Message:     {}", message);
    }

    if !record.installed_packages.is_empty() {
        println!();
        println!("{}", "Packages".cyan().bold());
        for (name, version) in &record.installed_packages {
            println!("  {:<12} {}", name, version);
        }
    }

    if !record.processes.is_empty() {
        println!();
        println!("{}", "Processes".cyan().bold());
        for (name, process) in &record.processes {
            let pid = process
                .pid
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string());
            let state = if process.alive {
                "✓ alive".green()
            } else if process.verified {
                "✗ gone".red()
            } else {
                "○ gone (unverified)".yellow()
            };
            println!("  {:<12} {:>8}  {}", name, pid, state);
        }
    }
}
