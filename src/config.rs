use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::detection::BackendKind;
use crate::error::{Result, ServiceError};

/// Directories that must be on a job's PATH even when the caller's is sparse.
/// Launch agents and user units do not inherit an interactive shell's PATH.
const BASELINE_PATH: &[&str] = &[
    "/usr/local/bin",
    "/opt/homebrew/bin",
    "/usr/bin",
    "/bin",
    "/usr/sbin",
    "/sbin",
];

/// Service-manager configuration (`~/.config/checkpoint/service.toml`).
///
/// Every artifact location lives here so a test can point the whole manager
/// at a scratch directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Skip host detection and use this backend
    pub backend: Option<BackendKind>,
    pub home_dir: PathBuf,
    pub launch_agents_dir: PathBuf,
    pub systemd_user_dir: PathBuf,
    /// PID files of cron-launched jobs
    pub state_dir: PathBuf,
    pub log_dir: PathBuf,
    /// On-disk templates overriding the compiled-in set
    pub template_dir: Option<PathBuf>,
    pub command_timeout_secs: u64,
    /// Pause between stop and start on launchd restarts
    pub restart_settle_ms: u64,
    pub daemon_interval_secs: u64,
    /// PATH exported to launch agents and units
    pub path_env: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/tmp"));
        Self::with_home(home)
    }
}

impl ManagerConfig {
    /// Defaults rooted at an explicit home directory
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        let state_dir = home.join(".checkpoint");
        Self {
            backend: None,
            launch_agents_dir: home.join("Library").join("LaunchAgents"),
            systemd_user_dir: home.join(".config").join("systemd").join("user"),
            log_dir: state_dir.join("logs"),
            state_dir,
            template_dir: None,
            command_timeout_secs: 30,
            restart_settle_ms: 1000,
            daemon_interval_secs: 3600,
            path_env: default_path_env(std::env::var("PATH").ok().as_deref()),
            home_dir: home,
        }
    }

    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("checkpoint").join("service.toml"))
    }

    /// Load `path`, or the default location; a missing file yields defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path() {
                Some(p) => p,
                None => return Ok(Self::default()),
            },
        };

        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("no config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        let cfg: ManagerConfig = toml::from_str(&text)
            .map_err(|e| ServiceError::Config(format!("{}: {e}", path.display())))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.command_timeout_secs == 0 {
            return Err(ServiceError::Config(
                "command_timeout_secs must be greater than zero".into(),
            ));
        }
        if self.daemon_interval_secs < 60 {
            return Err(ServiceError::Config(
                "daemon_interval_secs must be at least 60".into(),
            ));
        }
        Ok(())
    }

    #[inline]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    #[inline]
    pub fn restart_settle(&self) -> Duration {
        Duration::from_millis(self.restart_settle_ms)
    }

    pub fn pid_file(&self, service_name: &str) -> PathBuf {
        self.state_dir.join(format!("{service_name}.pid"))
    }
}

/// Caller's PATH with the baseline directories appended when missing
pub fn default_path_env(current: Option<&str>) -> String {
    let mut entries: Vec<&str> = current
        .unwrap_or_default()
        .split(':')
        .filter(|e| !e.is_empty())
        .collect();
    for dir in BASELINE_PATH {
        if !entries.contains(dir) {
            entries.push(dir);
        }
    }
    entries.join(":")
}
