//! CLI argument definitions using clap derive macros.

use clap::{Parser, Subcommand};

/// GIS desktop startup orchestrator
///
/// Starts the display stack and QGIS, and reports their health.
#[derive(Parser, Debug)]
#[command(name = "gisdesk")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Run the startup checklist, then stay up until interrupted
    Run,

    /// Validate the runtime environment
    Validate {
        /// Only import the core packages
        #[arg(long)]
        quick: bool,
    },

    /// Exit 0 when the last recorded status is healthy
    Health {
        /// Treat PARTIAL as healthy
        #[arg(long)]
        allow_partial: bool,
    },

    /// Show the last recorded status
    Status {
        /// Print the raw record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show version information
    Version,
}
