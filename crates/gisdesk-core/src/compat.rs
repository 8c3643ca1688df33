//! Package version floors.
//!
//! Versions are compared numerically on major.minor.patch. Anything that
//! cannot be read as a version (including the `unknown` sentinel) passes
//! with a warning: an unreadable version never blocks startup.

use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};

/// Version string recorded when a package's version cannot be resolved.
pub const UNKNOWN_VERSION: &str = "unknown";

/// A numeric major.minor.patch version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    /// Parse the leading numeric components of a version string.
    ///
    /// Missing components are zero and anything after the first
    /// non-numeric character of a component is ignored, so `3.34.4-Prizren`
    /// reads as 3.34.4 and `2.0rc1` as 2.0.0.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let raw = raw.strip_prefix('v').unwrap_or(raw);

        let mut parts = [0u64; 3];
        let mut seen = 0;

        for (i, component) in raw.split('.').take(3).enumerate() {
            let digits: String = component
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            if digits.is_empty() {
                break;
            }
            parts[i] = digits.parse().ok()?;
            seen += 1;

            // A suffix ends the numeric part of the version
            if digits.len() != component.len() {
                break;
            }
        }

        if seen == 0 {
            return None;
        }

        Some(Self {
            major: parts[0],
            minor: parts[1],
            patch: parts[2],
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// A package found below its floor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incompatibility {
    pub package: String,
    pub found: String,
    pub required: String,
}

/// Result of comparing installed versions against their floors.
#[derive(Debug, Clone, Default)]
pub struct CompatibilityReport {
    pub all_compatible: bool,
    pub incompatible: Vec<Incompatibility>,
    /// Packages whose comparison degraded to a pass
    pub unverified: Vec<String>,
}

/// Compare every installed package that has a floor against it.
///
/// Packages missing from `versions` are skipped; absence is reported by
/// the dependency check.
pub fn verify_compatibility(
    versions: &BTreeMap<String, String>,
    minimums: &BTreeMap<String, String>,
) -> CompatibilityReport {
    let mut report = CompatibilityReport {
        all_compatible: true,
        ..Default::default()
    };

    for (package, required) in minimums {
        let Some(found) = versions.get(package) else {
            continue;
        };

        let (Some(have), Some(need)) = (Version::parse(found), Version::parse(required)) else {
            warn!(
                "⚠ {}: cannot compare version '{}' against '{}', skipping",
                package, found, required
            );
            report.unverified.push(package.clone());
            continue;
        };

        if have >= need {
            info!("✓ {} {} (>= {})", package, found, required);
        } else {
            warn!("✗ {} {} is older than required {}", package, found, required);
            report.all_compatible = false;
            report.incompatible.push(Incompatibility {
                package: package.clone(),
                found: found.clone(),
                required: required.clone(),
            });
        }
    }

    report
}
