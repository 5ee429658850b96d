//! Service descriptors and the value types shared by every backend

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ServiceError};

/// Scheduling shape of an installed job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    /// Continuous file watcher, restarted on failure
    Watcher,
    /// Periodic backup runner (hourly by default)
    Daemon,
    /// Continuous health watchdog, restarted on failure
    Watchdog,
}

impl ServiceType {
    pub const ALL: [ServiceType; 3] = [Self::Watcher, Self::Daemon, Self::Watchdog];

    #[inline]
    pub fn is_periodic(self) -> bool {
        matches!(self, ServiceType::Daemon)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ServiceType::Watcher => "watcher",
            ServiceType::Daemon => "daemon",
            ServiceType::Watchdog => "watchdog",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "watcher" => Ok(ServiceType::Watcher),
            "daemon" => Ok(ServiceType::Daemon),
            "watchdog" => Ok(ServiceType::Watchdog),
            other => Err(ServiceError::InstallFailed(format!(
                "unknown service type `{other}` (expected watcher, daemon or watchdog)"
            ))),
        }
    }
}

/// Everything needed to install one background job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    /// Logical name, unique per project and purpose
    pub service_name: String,
    /// Executable the job runs, owned by the caller
    pub script_path: PathBuf,
    pub project_dir: PathBuf,
    pub project_name: String,
    pub service_type: ServiceType,
}

impl ServiceDescriptor {
    pub fn new(
        service_name: impl Into<String>,
        script_path: impl Into<PathBuf>,
        project_dir: impl Into<PathBuf>,
        project_name: impl Into<String>,
        service_type: ServiceType,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            script_path: script_path.into(),
            project_dir: project_dir.into(),
            project_name: project_name.into(),
            service_type,
        }
    }
}

/// Observed state of an installed job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    /// The job's process is executing right now
    Running,
    /// Periodic job armed by the native scheduler but idle between runs
    Scheduled,
    /// Artifact present but not loaded or not active
    Stopped,
    /// No artifact under any identity
    NotInstalled,
}

impl ServiceStatus {
    /// True when the native scheduler will run (or is running) the job
    #[inline]
    pub fn is_running(self) -> bool {
        matches!(self, ServiceStatus::Running | ServiceStatus::Scheduled)
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ServiceStatus::Running => "running",
            ServiceStatus::Scheduled => "scheduled",
            ServiceStatus::Stopped => "stopped",
            ServiceStatus::NotInstalled => "not installed",
        })
    }
}
