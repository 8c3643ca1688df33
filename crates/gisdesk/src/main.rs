//! gisdesk - GIS desktop startup orchestrator
//!
//! Brings up the virtual display, window manager, VNC server, websocket
//! bridge and QGIS in order, then records a status file for health checks.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use gisdesk_core::Config;

mod cli;
mod commands;
mod logging;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            let e = anyhow::Error::from(e).context("Failed to load configuration");
            if cli.command == Commands::Run {
                let fallback = Config::from_env();
                commands::run::record_startup_error(&fallback.paths.status_file, &e);
            }
            return Err(e);
        }
    };

    // Only a run writes the startup log
    if cli.command == Commands::Run {
        commands::run::init_logging(&config)?;
    } else {
        logging::init(None)?;
    }

    // Execute command
    match cli.command {
        Commands::Run => commands::run::execute(config).await,
        Commands::Validate { quick } => commands::validate::execute(&config, quick).await,
        Commands::Health { allow_partial } => commands::health::execute(&config, allow_partial),
        Commands::Status { json } => commands::status::execute(&config, json),
        Commands::Version => {
            println!("gisdesk {}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::SUCCESS)
        }
    }
}
