//! Service-manager backend detection
//!
//! Classifies the host into one of three backends:
//! - macOS: per-user launch agents (launchd)
//! - Linux with a live systemd: per-user units (systemd)
//! - anything else: the user's crontab (cron)
//!
//! Detection runs once per [`BackendDetector`]; the free function [`detect`]
//! memoizes one detector for the whole process.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServiceError};

/// Directory that exists only while systemd is the running init
const SYSTEMD_RUNTIME_DIR: &str = "/run/systemd/system";
const PID1_EXE: &str = "/proc/1/exe";

/// Native service-management substrate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Launchd,
    Systemd,
    Cron,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Launchd => "launchd",
            BackendKind::Systemd => "systemd",
            BackendKind::Cron => "cron",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "launchd" => Ok(BackendKind::Launchd),
            "systemd" => Ok(BackendKind::Systemd),
            "cron" => Ok(BackendKind::Cron),
            other => Err(ServiceError::Config(format!(
                "unknown backend `{other}` (expected launchd, systemd or cron)"
            ))),
        }
    }
}

/// Host facts the detector depends on
pub trait HostProbe: Send + Sync {
    fn is_darwin(&self) -> bool;
    fn systemd_runtime_present(&self) -> bool;
    /// Resolved target of PID 1's executable, if readable
    fn pid1_exe(&self) -> Option<PathBuf>;
}

/// Probe reading the real host
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProbe;

impl HostProbe for SystemProbe {
    fn is_darwin(&self) -> bool {
        std::env::consts::OS == "macos"
    }

    fn systemd_runtime_present(&self) -> bool {
        Path::new(SYSTEMD_RUNTIME_DIR).is_dir()
    }

    fn pid1_exe(&self) -> Option<PathBuf> {
        // Unprivileged users may be denied this link inside containers
        std::fs::read_link(PID1_EXE).ok()
    }
}

/// Classify a host from its probe results
pub fn classify(probe: &dyn HostProbe) -> BackendKind {
    if probe.is_darwin() {
        return BackendKind::Launchd;
    }
    if probe.systemd_runtime_present() {
        return BackendKind::Systemd;
    }
    if probe
        .pid1_exe()
        .is_some_and(|exe| exe.to_string_lossy().contains("systemd"))
    {
        return BackendKind::Systemd;
    }
    BackendKind::Cron
}

/// Lazily-initialized backend value, injectable into the manager
pub struct BackendDetector {
    probe: Box<dyn HostProbe>,
    cached: OnceCell<BackendKind>,
}

impl BackendDetector {
    pub fn new(probe: Box<dyn HostProbe>) -> Self {
        Self {
            probe,
            cached: OnceCell::new(),
        }
    }

    /// Detector that always answers `kind` without touching the host
    pub fn fixed(kind: BackendKind) -> Self {
        let cached = OnceCell::new();
        let _ = cached.set(kind);
        Self {
            probe: Box::new(SystemProbe),
            cached,
        }
    }

    pub fn detect(&self) -> BackendKind {
        *self.cached.get_or_init(|| {
            let kind = classify(self.probe.as_ref());
            log::debug!("detected service backend: {kind}");
            kind
        })
    }
}

impl Default for BackendDetector {
    fn default() -> Self {
        Self::new(Box::new(SystemProbe))
    }
}

/// Detect the backend of the current host, cached for the process lifetime
pub fn detect() -> BackendKind {
    static PROCESS_DETECTOR: OnceCell<BackendKind> = OnceCell::new();
    *PROCESS_DETECTOR.get_or_init(|| BackendDetector::default().detect())
}
