//! Required external command checks.

use std::path::PathBuf;
use tracing::{debug, error, info};

/// Resolves executable names on the search path.
pub trait CommandLocator: Send + Sync {
    fn locate(&self, name: &str) -> Option<PathBuf>;
}

/// `which`-style lookup against `PATH`.
#[derive(Debug, Clone, Default)]
pub struct PathLocator;

impl CommandLocator for PathLocator {
    fn locate(&self, name: &str) -> Option<PathBuf> {
        which::which(name).ok()
    }
}

/// Result of resolving every required command.
#[derive(Debug, Clone, Default)]
pub struct CommandReport {
    pub all_present: bool,
    pub missing: Vec<String>,
}

/// Resolve each command, logging one line per lookup.
pub fn check_commands(locator: &dyn CommandLocator, commands: &[String]) -> CommandReport {
    let mut missing = Vec::new();

    for name in commands {
        match locator.locate(name) {
            Some(path) => {
                info!("✓ {} found", name);
                debug!("{} resolved to {:?}", name, path);
            }
            None => {
                error!("✗ {} not found on PATH", name);
                missing.push(name.clone());
            }
        }
    }

    CommandReport {
        all_present: missing.is_empty(),
        missing,
    }
}
