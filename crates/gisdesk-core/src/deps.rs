//! Runtime package checks.
//!
//! Packages are probed by asking the interpreter to import each module and
//! report the installed distribution version. A missing package is never a
//! hard error here; it only clears `all_present` for the caller to act on.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::compat::UNKNOWN_VERSION;
use crate::config::{PackageSpec, RuntimeConfig};
use crate::error::Result;
use crate::exec;

/// Resolves the distribution version, then the module's `__version__`.
const PROBE_SCRIPT: &str = r#"import importlib, sys
mod = importlib.import_module(sys.argv[1])
try:
    from importlib.metadata import version
    print(version(sys.argv[2]))
except Exception:
    print(getattr(mod, "__version__", "unknown"))
"#;

/// Outcome of probing one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Importable, with its version (possibly `unknown`)
    Present(String),
    /// Not importable, with the reason
    Missing(String),
}

/// Source of version information about the runtime and external programs.
#[async_trait]
pub trait RuntimeProbe: Send + Sync {
    /// Try to import a package and resolve its version.
    async fn probe_package(&self, package: &PackageSpec) -> ProbeOutcome;

    /// Version of the interpreter itself.
    async fn runtime_version(&self) -> Option<String>;

    /// First line of `<program> --version`.
    async fn program_version(&self, program: &str) -> Option<String>;

    /// Upgrade the given distributions in place.
    async fn upgrade(&self, distributions: &[String]) -> Result<()>;
}

/// Probes a Python interpreter by running it as a subprocess.
#[derive(Debug, Clone)]
pub struct PythonProbe {
    interpreter: String,
    timeout: Duration,
    upgrade_timeout: Duration,
    env: BTreeMap<String, String>,
}

impl PythonProbe {
    pub fn new(runtime: &RuntimeConfig, timeout: Duration) -> Self {
        // Importing GUI bindings must not need a display
        let mut env = BTreeMap::new();
        env.insert("QT_QPA_PLATFORM".to_string(), "offscreen".to_string());

        Self {
            interpreter: runtime.interpreter.clone(),
            timeout,
            upgrade_timeout: Duration::from_secs(runtime.upgrade_timeout_secs),
            env,
        }
    }
}

#[async_trait]
impl RuntimeProbe for PythonProbe {
    async fn probe_package(&self, package: &PackageSpec) -> ProbeOutcome {
        let args = [
            "-c",
            PROBE_SCRIPT,
            package.module.as_str(),
            package.distribution.as_str(),
        ];

        match exec::run_checked(&self.interpreter, &args, &self.env, self.timeout).await {
            Ok(stdout) => {
                let version = stdout.lines().last().map(str::trim).unwrap_or_default();
                if version.is_empty() {
                    ProbeOutcome::Present(UNKNOWN_VERSION.to_string())
                } else {
                    ProbeOutcome::Present(version.to_string())
                }
            }
            Err(e) => ProbeOutcome::Missing(last_line(&e.to_string())),
        }
    }

    async fn runtime_version(&self) -> Option<String> {
        let output = exec::run_captured(&self.interpreter, &["--version"], &self.env, self.timeout)
            .await
            .ok()?;
        exec::first_line(&output).map(|line| {
            line.strip_prefix("Python ")
                .map(String::from)
                .unwrap_or(line)
        })
    }

    async fn program_version(&self, program: &str) -> Option<String> {
        let output = exec::run_captured(program, &["--version"], &self.env, self.timeout)
            .await
            .ok()?;
        if !output.status.success() {
            return None;
        }
        exec::first_line(&output)
    }

    async fn upgrade(&self, distributions: &[String]) -> Result<()> {
        let mut args = vec!["-m", "pip", "install", "--upgrade"];
        args.extend(distributions.iter().map(String::as_str));

        exec::run_checked(&self.interpreter, &args, &self.env, self.upgrade_timeout).await?;
        Ok(())
    }
}

/// Import errors end with the interesting line.
fn last_line(message: &str) -> String {
    message
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .unwrap_or(message)
        .to_string()
}

/// Result of checking every declared package.
#[derive(Debug, Clone, Default)]
pub struct DependencyReport {
    pub all_present: bool,
    /// Distribution name to version, for importable packages
    pub versions: BTreeMap<String, String>,
    /// Distribution names that failed to import
    pub missing: Vec<String>,
}

/// Probe every package, logging one line per package.
pub async fn check_packages(
    probe: &dyn RuntimeProbe,
    packages: &[PackageSpec],
) -> DependencyReport {
    let mut report = DependencyReport {
        all_present: true,
        ..Default::default()
    };

    for package in packages {
        match probe.probe_package(package).await {
            ProbeOutcome::Present(version) => {
                info!("✓ {} {}", package.module, version);
                report.versions.insert(package.distribution.clone(), version);
            }
            ProbeOutcome::Missing(reason) => {
                error!("✗ {} not importable: {}", package.module, reason);
                report.all_present = false;
                report.missing.push(package.distribution.clone());
            }
        }
    }

    report
}

/// Check packages, upgrading and re-checking once if any are missing and
/// `auto_upgrade` is set.
pub async fn check_with_upgrade(
    probe: &dyn RuntimeProbe,
    runtime: &RuntimeConfig,
) -> DependencyReport {
    let report = check_packages(probe, &runtime.packages).await;
    if report.all_present || !runtime.auto_upgrade {
        return report;
    }

    info!("Upgrading missing packages: {}", report.missing.join(", "));
    if let Err(e) = probe.upgrade(&report.missing).await {
        warn!("Package upgrade failed: {}", e);
        return report;
    }

    check_packages(probe, &runtime.packages).await
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::Error;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    /// In-memory probe: packages are present when listed in `installed`.
    #[derive(Default)]
    pub(crate) struct FakeProbe {
        pub installed: Mutex<BTreeMap<String, String>>,
        pub upgradable: BTreeSet<String>,
        pub upgrades: Mutex<Vec<Vec<String>>>,
        pub app_version: Option<String>,
    }

    impl FakeProbe {
        pub(crate) fn with(installed: &[(&str, &str)]) -> Self {
            Self {
                installed: Mutex::new(
                    installed
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl RuntimeProbe for FakeProbe {
        async fn probe_package(&self, package: &PackageSpec) -> ProbeOutcome {
            match self.installed.lock().unwrap().get(&package.distribution) {
                Some(v) => ProbeOutcome::Present(v.clone()),
                None => ProbeOutcome::Missing(format!(
                    "ModuleNotFoundError: No module named '{}'",
                    package.module
                )),
            }
        }

        async fn runtime_version(&self) -> Option<String> {
            Some("3.10.12".to_string())
        }

        async fn program_version(&self, _program: &str) -> Option<String> {
            self.app_version.clone()
        }

        async fn upgrade(&self, distributions: &[String]) -> Result<()> {
            self.upgrades.lock().unwrap().push(distributions.to_vec());
            let mut installed = self.installed.lock().unwrap();
            for dist in distributions {
                if self.upgradable.contains(dist) {
                    installed.insert(dist.clone(), "9.9.9".to_string());
                }
            }
            if distributions.iter().all(|d| self.upgradable.contains(d)) {
                Ok(())
            } else {
                Err(Error::Other("pip could not resolve".into()))
            }
        }
    }

    fn runtime(packages: &[&str], auto_upgrade: bool) -> RuntimeConfig {
        RuntimeConfig {
            packages: packages
                .iter()
                .map(|p| PackageSpec {
                    module: p.to_string(),
                    distribution: p.to_string(),
                    core: false,
                })
                .collect(),
            auto_upgrade,
            ..RuntimeConfig::default()
        }
    }

    #[tokio::test]
    async fn test_all_present() {
        let probe = FakeProbe::with(&[("numpy", "1.24.3"), ("pandas", "2.0.3")]);
        let rt = runtime(&["numpy", "pandas"], false);

        let report = check_packages(&probe, &rt.packages).await;

        assert!(report.all_present);
        assert!(report.missing.is_empty());
        assert_eq!(report.versions.get("numpy"), Some(&"1.24.3".to_string()));
        assert_eq!(report.versions.get("pandas"), Some(&"2.0.3".to_string()));
    }

    #[tokio::test]
    async fn test_missing_package_is_soft() {
        let probe = FakeProbe::with(&[("numpy", "1.24.3")]);
        let rt = runtime(&["numpy", "rasterio", "geopandas"], false);

        let report = check_packages(&probe, &rt.packages).await;

        assert!(!report.all_present);
        assert_eq!(report.missing, vec!["rasterio", "geopandas"]);
        assert_eq!(report.versions.len(), 1);
    }

    #[tokio::test]
    async fn test_no_upgrade_unless_enabled() {
        let probe = FakeProbe::with(&[]);
        let rt = runtime(&["numpy"], false);

        let report = check_with_upgrade(&probe, &rt).await;

        assert!(!report.all_present);
        assert!(probe.upgrades.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upgrade_then_recheck() {
        let mut probe = FakeProbe::with(&[("pandas", "2.0.3")]);
        probe.upgradable.insert("numpy".to_string());
        let rt = runtime(&["numpy", "pandas"], true);

        let report = check_with_upgrade(&probe, &rt).await;

        assert!(report.all_present);
        assert_eq!(report.versions.get("numpy"), Some(&"9.9.9".to_string()));
        assert_eq!(*probe.upgrades.lock().unwrap(), vec![vec!["numpy".to_string()]]);
    }

    #[tokio::test]
    async fn test_failed_upgrade_keeps_first_report() {
        let probe = FakeProbe::with(&[]);
        let rt = runtime(&["numpy"], true);

        let report = check_with_upgrade(&probe, &rt).await;

        assert!(!report.all_present);
        assert_eq!(report.missing, vec!["numpy"]);
        assert_eq!(probe.upgrades.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_last_line() {
        let msg = concat!(
            "Command failed: python3 -c ...\n",
            "Traceback (most recent call last):\n",
            "  File \"<string>\"\n",
            "ModuleNotFoundError: No module named 'rasterio'\n",
        );
        assert_eq!(last_line(msg), "ModuleNotFoundError: No module named 'rasterio'");
    }

    #[tokio::test]
    async fn test_python_probe_missing_interpreter() {
        let rt = RuntimeConfig {
            interpreter: "gisdesk-no-such-python".to_string(),
            ..RuntimeConfig::default()
        };
        let probe = PythonProbe::new(&rt, Duration::from_secs(1));
        let package = PackageSpec {
            module: "numpy".into(),
            distribution: "numpy".into(),
            core: true,
        };

        assert!(matches!(
            probe.probe_package(&package).await,
            ProbeOutcome::Missing(_)
        ));
        assert_eq!(probe.runtime_version().await, None);
        assert_eq!(probe.program_version("gisdesk-no-such-app").await, None);
    }
}
