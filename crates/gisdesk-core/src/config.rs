//! Configuration management for gisdesk.
//!
//! Configuration is loaded from multiple sources with precedence:
//! 1. Environment variables (GISDESK_*)
//! 2. Config file ($GISDESK_CONFIG, /config/gisdesk.toml, or the user config dir)
//! 3. Default values
//!
//! The defaults describe the container layout: Xvfb on display :99, fluxbox,
//! x11vnc on 5900, websockify serving noVNC on 6080, and QGIS.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log and status file locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Interpreter and package checks
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// External command and directory checks
    #[serde(default)]
    pub checks: ChecksConfig,

    /// Virtual display settings
    #[serde(default)]
    pub display: DisplayConfig,

    /// Idle loop settings
    #[serde(default)]
    pub supervisor: SupervisorConfig,

    /// Managed processes, launched in order
    #[serde(default = "default_processes")]
    pub processes: Vec<ProcessSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding the orchestrator log and one log per managed process
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Status record written after every status change
    #[serde(default = "default_status_file")]
    pub status_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Interpreter used to probe packages
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    /// Packages that must be importable
    #[serde(default = "default_packages")]
    pub packages: Vec<PackageSpec>,

    /// Minimum versions, keyed by distribution name
    #[serde(default = "default_minimum_versions")]
    pub minimum_versions: BTreeMap<String, String>,

    /// Run a package upgrade when a package is missing, then re-check
    #[serde(default)]
    pub auto_upgrade: bool,

    /// Upper bound for the package upgrade in seconds
    #[serde(default = "default_upgrade_timeout")]
    pub upgrade_timeout_secs: u64,
}

/// A runtime package: the module to import and the distribution that provides it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackageSpec {
    pub module: String,
    pub distribution: String,

    /// Part of the quick health check
    #[serde(default)]
    pub core: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecksConfig {
    /// Executables that must resolve on PATH before anything is launched
    #[serde(default = "default_required_commands")]
    pub required_commands: Vec<String>,

    /// Bound for a single external query (import probe, --version)
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Directories checked by the full validation
    #[serde(default = "default_required_dirs")]
    pub required_dirs: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// X display number (`:99`)
    #[serde(default = "default_display_number")]
    pub number: u32,

    /// Screen geometry passed to the display server
    #[serde(default = "default_geometry")]
    pub geometry: String,

    /// Raw VNC port
    #[serde(default = "default_vnc_port")]
    pub vnc_port: u16,

    /// Browser-facing bridge port
    #[serde(default = "default_web_port")]
    pub web_port: u16,

    /// Static noVNC client served by the bridge
    #[serde(default = "default_novnc_dir")]
    pub novnc_dir: PathBuf,

    /// Directory holding the X lock file and socket directory
    #[serde(default = "default_tmp_dir")]
    pub tmp_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Idle loop wake interval in seconds
    #[serde(default = "default_heartbeat")]
    pub heartbeat_secs: u64,

    /// Runtime directory exported to every managed process
    #[serde(default = "default_runtime_dir")]
    pub runtime_dir: PathBuf,
}

/// Position of a managed process in the launch order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Display,
    WindowManager,
    Vnc,
    Bridge,
    Application,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Display => "display",
            Role::WindowManager => "window_manager",
            Role::Vnc => "vnc",
            Role::Bridge => "bridge",
            Role::Application => "application",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How to decide a freshly spawned process is ready.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Readiness {
    /// Sleep the whole wait budget
    Delay,
    /// A unix socket file appears
    Socket { path: String },
    /// A localhost TCP connect succeeds; `port` may be a placeholder such
    /// as `{vnc_port}`
    Tcp { port: String },
    /// An HTTP GET gets any response
    Http { url: String },
}

/// One managed process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSpec {
    /// Name used for process table matching and the log file
    pub name: String,
    pub role: Role,
    pub program: String,

    /// Arguments; `{display}`, `{display_number}`, `{geometry}`, `{vnc_port}`,
    /// `{web_port}` and `{novnc_dir}` are expanded
    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment on top of the orchestrator environment
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Wait budget after spawning, in seconds
    #[serde(default = "default_wait")]
    pub wait_secs: u64,

    #[serde(default = "default_readiness")]
    pub readiness: Readiness,

    /// Included in the post-launch liveness check
    #[serde(default = "default_true")]
    pub verify: bool,
}

impl ProcessSpec {
    /// Arguments with display placeholders expanded.
    pub fn expanded_args(&self, display: &DisplayConfig) -> Vec<String> {
        self.args.iter().map(|a| display.expand(a)).collect()
    }

    /// Log file for this process inside `log_dir`.
    pub fn log_file(&self, log_dir: &Path) -> PathBuf {
        log_dir.join(format!("{}.log", self.name.to_lowercase()))
    }
}

impl DisplayConfig {
    /// The `DISPLAY` value, e.g. `:99`.
    pub fn display(&self) -> String {
        format!(":{}", self.number)
    }

    /// X server lock file for this display.
    pub fn lock_file(&self) -> PathBuf {
        self.tmp_dir.join(format!(".X{}-lock", self.number))
    }

    /// X server unix socket for this display.
    pub fn socket_file(&self) -> PathBuf {
        self.tmp_dir
            .join(".X11-unix")
            .join(format!("X{}", self.number))
    }

    /// Expand display placeholders in a template string.
    pub fn expand(&self, template: &str) -> String {
        template
            .replace("{display_number}", &self.number.to_string())
            .replace("{display}", &self.display())
            .replace("{geometry}", &self.geometry)
            .replace("{vnc_port}", &self.vnc_port.to_string())
            .replace("{web_port}", &self.web_port.to_string())
            .replace("{novnc_dir}", &self.novnc_dir.display().to_string())
            .replace("{tmp_dir}", &self.tmp_dir.display().to_string())
    }
}

/// File name of the status record inside the log directory.
const STATUS_FILE_NAME: &str = "status.json";

// Default value functions
fn default_log_dir() -> PathBuf {
    PathBuf::from("/logs")
}

fn default_status_file() -> PathBuf {
    default_log_dir().join(STATUS_FILE_NAME)
}

fn default_interpreter() -> String {
    "python3".to_string()
}

fn package(module: &str, distribution: &str, core: bool) -> PackageSpec {
    PackageSpec {
        module: module.to_string(),
        distribution: distribution.to_string(),
        core,
    }
}

fn default_packages() -> Vec<PackageSpec> {
    vec![
        package("qgis.core", "qgis", true),
        package("numpy", "numpy", true),
        package("pandas", "pandas", true),
        package("scipy", "scipy", false),
        package("rasterio", "rasterio", false),
        package("geopandas", "geopandas", false),
    ]
}

fn default_minimum_versions() -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    map.insert("numpy".to_string(), "1.24.0".to_string());
    map.insert("pandas".to_string(), "2.0.0".to_string());
    map.insert("scipy".to_string(), "1.10.0".to_string());
    map.insert("rasterio".to_string(), "1.3.0".to_string());
    map.insert("geopandas".to_string(), "0.13.0".to_string());
    map
}

fn default_upgrade_timeout() -> u64 {
    300
}

fn default_required_commands() -> Vec<String> {
    ["Xvfb", "fluxbox", "x11vnc", "websockify", "qgis"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_command_timeout() -> u64 {
    5
}

fn default_required_dirs() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/workspace"),
        PathBuf::from("/logs"),
        PathBuf::from("/config"),
    ]
}

fn default_display_number() -> u32 {
    99
}

fn default_geometry() -> String {
    "1920x1080x24".to_string()
}

fn default_vnc_port() -> u16 {
    5900
}

fn default_web_port() -> u16 {
    6080
}

fn default_novnc_dir() -> PathBuf {
    PathBuf::from("/usr/share/novnc")
}

fn default_tmp_dir() -> PathBuf {
    PathBuf::from("/tmp")
}

fn default_heartbeat() -> u64 {
    60
}

fn default_runtime_dir() -> PathBuf {
    PathBuf::from("/tmp/runtime-root")
}

fn default_wait() -> u64 {
    3
}

fn default_readiness() -> Readiness {
    Readiness::Delay
}

fn default_true() -> bool {
    true
}

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn default_processes() -> Vec<ProcessSpec> {
    let mut app_env = BTreeMap::new();
    app_env.insert("QT_QPA_PLATFORM".to_string(), "xcb".to_string());
    app_env.insert("LIBGL_ALWAYS_SOFTWARE".to_string(), "1".to_string());
    app_env.insert("QT_X11_NO_MITSHM".to_string(), "1".to_string());

    let mut display_env = BTreeMap::new();
    display_env.insert("LIBGL_ALWAYS_SOFTWARE".to_string(), "1".to_string());

    vec![
        ProcessSpec {
            name: "Xvfb".to_string(),
            role: Role::Display,
            program: "Xvfb".to_string(),
            args: args(&[
                "{display}",
                "-screen",
                "0",
                "{geometry}",
                "-ac",
                "+extension",
                "GLX",
                "+render",
                "-noreset",
            ]),
            env: display_env,
            wait_secs: 3,
            readiness: Readiness::Socket {
                path: "{tmp_dir}/.X11-unix/X{display_number}".to_string(),
            },
            verify: true,
        },
        // Started but excluded from verification, matching the container's
        // historical behaviour.
        ProcessSpec {
            name: "fluxbox".to_string(),
            role: Role::WindowManager,
            program: "fluxbox".to_string(),
            args: Vec::new(),
            env: BTreeMap::new(),
            wait_secs: 2,
            readiness: Readiness::Delay,
            verify: false,
        },
        ProcessSpec {
            name: "x11vnc".to_string(),
            role: Role::Vnc,
            program: "x11vnc".to_string(),
            args: args(&[
                "-display",
                "{display}",
                "-forever",
                "-shared",
                "-nopw",
                "-rfbport",
                "{vnc_port}",
            ]),
            env: BTreeMap::new(),
            wait_secs: 3,
            readiness: Readiness::Tcp {
                port: "{vnc_port}".to_string(),
            },
            verify: true,
        },
        ProcessSpec {
            name: "websockify".to_string(),
            role: Role::Bridge,
            program: "websockify".to_string(),
            args: args(&["--web", "{novnc_dir}", "{web_port}", "localhost:{vnc_port}"]),
            env: BTreeMap::new(),
            wait_secs: 3,
            readiness: Readiness::Http {
                url: "http://localhost:{web_port}/".to_string(),
            },
            verify: true,
        },
        ProcessSpec {
            name: "qgis".to_string(),
            role: Role::Application,
            program: "qgis".to_string(),
            args: Vec::new(),
            env: app_env,
            wait_secs: 5,
            readiness: Readiness::Delay,
            verify: true,
        },
    ]
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            status_file: default_status_file(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            packages: default_packages(),
            minimum_versions: default_minimum_versions(),
            auto_upgrade: false,
            upgrade_timeout_secs: default_upgrade_timeout(),
        }
    }
}

impl Default for ChecksConfig {
    fn default() -> Self {
        Self {
            required_commands: default_required_commands(),
            command_timeout_secs: default_command_timeout(),
            required_dirs: default_required_dirs(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            number: default_display_number(),
            geometry: default_geometry(),
            vnc_port: default_vnc_port(),
            web_port: default_web_port(),
            novnc_dir: default_novnc_dir(),
            tmp_dir: default_tmp_dir(),
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: default_heartbeat(),
            runtime_dir: default_runtime_dir(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            runtime: RuntimeConfig::default(),
            checks: ChecksConfig::default(),
            display: DisplayConfig::default(),
            supervisor: SupervisorConfig::default(),
            processes: default_processes(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment.
    pub fn load() -> Result<Self> {
        let mut config = match Self::config_path() {
            Some(path) => Self::from_file(&path)?,
            None => Config::default(),
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse a config file without applying environment overrides.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let mut config: Config = toml::from_str(&content)?;
        config.move_log_dir(config.paths.log_dir.clone(), &default_log_dir());
        Ok(config)
    }

    /// Defaults plus environment overrides, without reading any file.
    ///
    /// Used to find the status file when the config itself cannot be loaded.
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env();
        config
    }

    /// Get the config file path, if one exists.
    pub fn config_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("GISDESK_CONFIG") {
            return Some(PathBuf::from(path));
        }

        let container = PathBuf::from("/config/gisdesk.toml");
        if container.exists() {
            return Some(container);
        }

        dirs::config_dir()
            .map(|dir| dir.join("gisdesk").join("config.toml"))
            .filter(|path| path.exists())
    }

    fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    fn apply_env_from<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = var("GISDESK_LOG_DIR") {
            let previous = self.paths.log_dir.clone();
            self.move_log_dir(PathBuf::from(dir), &previous);
        }
        if let Some(file) = var("GISDESK_STATUS_FILE") {
            self.paths.status_file = PathBuf::from(file);
        }
        if let Some(display) = var("GISDESK_DISPLAY") {
            if let Ok(number) = display.trim_start_matches(':').parse() {
                self.display.number = number;
            }
        }
    }

    /// Point the log directory at `dir`. A status file still sitting at its
    /// default place inside `previous` moves along with it.
    fn move_log_dir(&mut self, dir: PathBuf, previous: &Path) {
        if self.paths.status_file == previous.join(STATUS_FILE_NAME) {
            self.paths.status_file = dir.join(STATUS_FILE_NAME);
        }
        self.paths.log_dir = dir;
    }

    /// Check the process list describes one forward launch sequence.
    pub fn validate(&self) -> Result<()> {
        if self.processes.is_empty() {
            return Err(Error::Config("no managed processes configured".into()));
        }

        for pair in self.processes.windows(2) {
            if pair[0].role >= pair[1].role {
                return Err(Error::Config(format!(
                    "process {} ({}) must come before {} ({})",
                    pair[1].name, pair[1].role, pair[0].name, pair[0].role
                )));
            }
        }

        let mut names = std::collections::BTreeSet::new();
        for spec in &self.processes {
            if spec.name.trim().is_empty() || spec.program.trim().is_empty() {
                return Err(Error::Config(format!(
                    "process for role {} needs a name and a program",
                    spec.role
                )));
            }
            // Log files are named after the lowercased process name
            if !names.insert(spec.name.to_lowercase()) {
                return Err(Error::Config(format!(
                    "process name {} is used more than once",
                    spec.name
                )));
            }
            if let Readiness::Tcp { port } = &spec.readiness {
                let expanded = self.display.expand(port);
                if expanded.parse::<u16>().is_err() {
                    return Err(Error::Config(format!(
                        "process {} has an invalid readiness port: {}",
                        spec.name, expanded
                    )));
                }
            }
        }

        Ok(())
    }

    /// The process playing `role`, if configured.
    pub fn process(&self, role: Role) -> Option<&ProcessSpec> {
        self.processes.iter().find(|p| p.role == role)
    }

    /// Names of every managed process, in launch order.
    pub fn process_names(&self) -> Vec<String> {
        self.processes.iter().map(|p| p.name.clone()).collect()
    }

    /// Orchestrator log file.
    pub fn startup_log(&self) -> PathBuf {
        self.paths.log_dir.join("startup.log")
    }

    /// Environment every managed process receives on top of the inherited one.
    pub fn base_env(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert("DISPLAY".to_string(), self.display.display());
        env.insert(
            "XDG_RUNTIME_DIR".to_string(),
            self.supervisor.runtime_dir.display().to_string(),
        );
        env
    }

    /// Ensure the log directory and runtime directory exist.
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.paths.log_dir)?;
        if let Some(parent) = self.paths.status_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::create_dir_all(&self.supervisor.runtime_dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.display.number, 99);
        assert_eq!(config.display.display(), ":99");
        assert_eq!(config.supervisor.heartbeat_secs, 60);
        assert_eq!(config.checks.command_timeout_secs, 5);
        assert_eq!(config.paths.status_file, PathBuf::from("/logs/status.json"));

        // Five managed processes in launch order
        let roles: Vec<Role> = config.processes.iter().map(|p| p.role).collect();
        assert_eq!(
            roles,
            vec![
                Role::Display,
                Role::WindowManager,
                Role::Vnc,
                Role::Bridge,
                Role::Application
            ]
        );

        let waits: Vec<u64> = config.processes.iter().map(|p| p.wait_secs).collect();
        assert_eq!(waits, vec![3, 2, 3, 3, 5]);

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_window_manager_not_verified_by_default() {
        let config = Config::default();
        let wm = config.process(Role::WindowManager).unwrap();
        assert!(!wm.verify);

        let verified: Vec<&str> = config
            .processes
            .iter()
            .filter(|p| p.verify)
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(verified, vec!["Xvfb", "x11vnc", "websockify", "qgis"]);
    }

    #[test]
    fn test_expand_placeholders() {
        let config = Config::default();
        let vnc = config.process(Role::Vnc).unwrap();
        assert_eq!(
            vnc.expanded_args(&config.display),
            vec!["-display", ":99", "-forever", "-shared", "-nopw", "-rfbport", "5900"]
        );

        let bridge = config.process(Role::Bridge).unwrap();
        assert_eq!(
            bridge.expanded_args(&config.display),
            vec!["--web", "/usr/share/novnc", "6080", "localhost:5900"]
        );

        assert_eq!(
            config.display.expand("{tmp_dir}/.X11-unix/X{display_number}"),
            "/tmp/.X11-unix/X99"
        );
    }

    #[test]
    fn test_display_files() {
        let display = DisplayConfig {
            number: 42,
            tmp_dir: PathBuf::from("/var/tmp"),
            ..DisplayConfig::default()
        };
        assert_eq!(display.lock_file(), PathBuf::from("/var/tmp/.X42-lock"));
        assert_eq!(
            display.socket_file(),
            PathBuf::from("/var/tmp/.X11-unix/X42")
        );
    }

    #[test]
    fn test_validate_rejects_out_of_order_roles() {
        let mut config = Config::default();
        config.processes.swap(0, 2);

        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_validate_rejects_duplicate_roles() {
        let mut config = Config::default();
        let duplicate = config.processes[0].clone();
        config.processes.insert(1, duplicate);

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_process_list() {
        let config = Config {
            processes: Vec::new(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp = tempdir().expect("Failed to create temp dir");
        let path = temp.path().join("gisdesk.toml");
        std::fs::write(
            &path,
            r#"
[paths]
log_dir = "/var/log/gisdesk"

[display]
number = 1

[[processes]]
name = "Xvfb"
role = "display"
program = "Xvfb"
args = ["{display}"]
readiness = { kind = "socket", path = "/tmp/.X11-unix/X1" }

[[processes]]
name = "qgis"
role = "application"
program = "qgis"
wait_secs = 10
"#,
        )
        .expect("Failed to write config");

        let config = Config::from_file(&path).expect("Failed to load config");

        assert_eq!(config.paths.log_dir, PathBuf::from("/var/log/gisdesk"));
        // An unset status file follows the log directory
        assert_eq!(
            config.paths.status_file,
            PathBuf::from("/var/log/gisdesk/status.json")
        );
        assert_eq!(config.display.number, 1);
        assert_eq!(config.display.vnc_port, 5900);
        assert_eq!(config.runtime.interpreter, "python3");

        assert_eq!(config.processes.len(), 2);
        assert_eq!(
            config.processes[0].readiness,
            Readiness::Socket {
                path: "/tmp/.X11-unix/X1".to_string()
            }
        );
        assert_eq!(config.processes[1].wait_secs, 10);
        assert_eq!(config.processes[1].readiness, Readiness::Delay);
        assert!(config.processes[1].verify);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let temp = tempdir().expect("Failed to create temp dir");
        let path = temp.path().join("broken.toml");
        std::fs::write(&path, "processes = 7").expect("Failed to write config");

        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_base_env() {
        let config = Config::default();
        let env = config.base_env();
        assert_eq!(env.get("DISPLAY"), Some(&":99".to_string()));
        assert_eq!(
            env.get("XDG_RUNTIME_DIR"),
            Some(&"/tmp/runtime-root".to_string())
        );
    }

    #[test]
    fn test_log_file_per_process() {
        let config = Config::default();
        let xvfb = config.process(Role::Display).unwrap();
        assert_eq!(
            xvfb.log_file(Path::new("/logs")),
            PathBuf::from("/logs/xvfb.log")
        );
        assert_eq!(config.startup_log(), PathBuf::from("/logs/startup.log"));
    }

    #[test]
    fn test_ensure_dirs_creates_directories() {
        let temp = tempdir().expect("Failed to create temp dir");
        let mut config = Config::default();
        config.paths.log_dir = temp.path().join("logs");
        config.paths.status_file = temp.path().join("state").join("status.json");
        config.supervisor.runtime_dir = temp.path().join("runtime");

        config.ensure_dirs().expect("Failed to create directories");

        assert!(config.paths.log_dir.exists());
        assert!(temp.path().join("state").exists());
        assert!(config.supervisor.runtime_dir.exists());
    }

    #[test]
    fn test_vnc_readiness_follows_configured_port() {
        let temp = tempdir().expect("Failed to create temp dir");
        let path = temp.path().join("gisdesk.toml");
        std::fs::write(&path, "[display]\nvnc_port = 5901\n").expect("Failed to write config");

        let config = Config::from_file(&path).expect("Failed to load config");
        let vnc = config.process(Role::Vnc).unwrap();

        assert!(vnc.expanded_args(&config.display).contains(&"5901".to_string()));
        let Readiness::Tcp { port } = &vnc.readiness else {
            panic!("x11vnc should wait on a TCP port");
        };
        assert_eq!(config.display.expand(port), "5901");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_readiness_port() {
        let mut config = Config::default();
        config.processes[2].readiness = Readiness::Tcp {
            port: "{web_prot}".to_string(),
        };

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("invalid readiness port"));
    }

    #[test]
    fn test_validate_rejects_duplicate_names() {
        let mut config = Config::default();
        // Same log file as Xvfb once lowercased
        config.processes[1].name = "xvfb".to_string();

        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("xvfb")));
    }

    #[test]
    fn test_log_dir_env_moves_default_status_file() {
        let mut config = Config::default();
        config.apply_env_from(|key| match key {
            "GISDESK_LOG_DIR" => Some("/var/log/gisdesk".to_string()),
            _ => None,
        });

        assert_eq!(config.paths.log_dir, PathBuf::from("/var/log/gisdesk"));
        assert_eq!(
            config.paths.status_file,
            PathBuf::from("/var/log/gisdesk/status.json")
        );
    }

    #[test]
    fn test_explicit_status_file_wins() {
        let mut config = Config::default();
        config.apply_env_from(|key| match key {
            "GISDESK_LOG_DIR" => Some("/var/log/gisdesk".to_string()),
            "GISDESK_STATUS_FILE" => Some("/run/gisdesk/status.json".to_string()),
            "GISDESK_DISPLAY" => Some(":5".to_string()),
            _ => None,
        });

        assert_eq!(
            config.paths.status_file,
            PathBuf::from("/run/gisdesk/status.json")
        );
        assert_eq!(config.display.number, 5);

        // A status file placed outside the log directory stays put
        let mut config = Config::default();
        config.paths.status_file = PathBuf::from("/state/status.json");
        config.apply_env_from(|key| {
            (key == "GISDESK_LOG_DIR").then(|| "/var/log/gisdesk".to_string())
        });
        assert_eq!(config.paths.status_file, PathBuf::from("/state/status.json"));
    }
}
