//! Environment validation used by the container health check.
//!
//! Quick mode imports only the core packages. Full mode also checks every
//! declared package and the mounted directories.

use std::path::PathBuf;

use crate::config::Config;
use crate::deps::{self, DependencyReport, RuntimeProbe};

/// Result of a validation pass.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub packages: DependencyReport,
    /// Directory and whether it exists; empty in quick mode
    pub directories: Vec<(PathBuf, bool)>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.packages.all_present && self.directories.iter().all(|(_, exists)| *exists)
    }

    pub fn missing_directories(&self) -> Vec<&PathBuf> {
        self.directories
            .iter()
            .filter(|(_, exists)| !exists)
            .map(|(dir, _)| dir)
            .collect()
    }
}

/// Run the validation.
pub async fn run(probe: &dyn RuntimeProbe, config: &Config, quick: bool) -> ValidationReport {
    if quick {
        let core: Vec<_> = config
            .runtime
            .packages
            .iter()
            .filter(|p| p.core)
            .cloned()
            .collect();
        return ValidationReport {
            packages: deps::check_packages(probe, &core).await,
            directories: Vec::new(),
        };
    }

    let directories = config
        .checks
        .required_dirs
        .iter()
        .map(|dir| (dir.clone(), dir.is_dir()))
        .collect();

    ValidationReport {
        packages: deps::check_packages(probe, &config.runtime.packages).await,
        directories,
    }
}
