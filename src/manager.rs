use std::sync::Arc;

use crate::config::ManagerConfig;
use crate::control::{Driver, DriverContext, driver_for};
use crate::detection::{BackendDetector, BackendKind};
use crate::error::Result;
use crate::identity;
use crate::runner::{CommandRunner, SystemRunner};
use crate::service::{ServiceDescriptor, ServiceStatus};

/// Uniform lifecycle facade over the host's service manager.
///
/// Holds exactly one driver, chosen once at construction. Operations on the
/// same service are multi-step sequences at the OS level; callers serialize
/// them per service.
pub struct ServiceManager {
    driver: Box<dyn Driver>,
}

impl ServiceManager {
    /// Manager for the current host, honouring a configured backend override
    pub fn new(config: ManagerConfig) -> Result<Self> {
        config.validate()?;
        let detector = match config.backend {
            Some(kind) => BackendDetector::fixed(kind),
            None => BackendDetector::default(),
        };
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner::new(config.command_timeout()));
        Ok(Self::with_detector(&detector, DriverContext::new(runner, config)))
    }

    /// Manager whose backend comes from `detector`
    pub fn with_detector(detector: &BackendDetector, ctx: DriverContext) -> Self {
        Self::with_backend(detector.detect(), ctx)
    }

    /// Manager bound to a fixed backend
    pub fn with_backend(kind: BackendKind, ctx: DriverContext) -> Self {
        Self {
            driver: driver_for(kind, ctx),
        }
    }

    pub fn backend(&self) -> BackendKind {
        self.driver.backend()
    }

    pub fn install(&self, desc: &ServiceDescriptor) -> Result<()> {
        self.driver.install(desc)
    }

    pub fn uninstall(&self, service_name: &str) -> Result<()> {
        self.driver.uninstall(service_name)
    }

    pub fn start(&self, service_name: &str) -> Result<()> {
        self.driver.start(service_name)
    }

    pub fn stop(&self, service_name: &str) -> Result<()> {
        self.driver.stop(service_name)
    }

    pub fn restart(&self, service_name: &str) -> Result<()> {
        self.driver.restart(service_name)
    }

    pub fn status(&self, service_name: &str) -> Result<ServiceStatus> {
        self.driver.status(service_name)
    }

    /// Raw backend-native rows containing `pattern`
    pub fn list(&self, pattern: &str) -> Result<Vec<String>> {
        self.driver.list(pattern)
    }

    /// Raw rows of every checkpoint service, legacy launchd labels included
    pub fn list_checkpoint_rows(&self) -> Result<Vec<String>> {
        let pattern = match self.backend() {
            BackendKind::Launchd => ".",
            BackendKind::Systemd => identity::SYSTEMD_PREFIX,
            BackendKind::Cron => identity::CRON_MARKER_PREFIX,
        };
        Ok(self
            .driver
            .list(pattern)?
            .into_iter()
            .filter(|row| is_checkpoint_row(row))
            .collect())
    }

    /// Logical names of every checkpoint service the backend knows about.
    ///
    /// Rows that belong to checkpoint but cannot be parsed are errors, not
    /// silently dropped.
    pub fn list_service_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for row in self.list_checkpoint_rows()? {
            let name = identity::parse_service_name(&row)?;
            if !names.contains(&name) {
                names.push(name);
            }
        }
        Ok(names)
    }
}

fn is_checkpoint_row(row: &str) -> bool {
    row.contains(identity::LAUNCHD_PREFIX)
        || row.contains(identity::LEGACY_LAUNCHD_PREFIX)
        || row.contains(identity::CRON_MARKER_PREFIX)
        || row
            .split_whitespace()
            .any(|token| token.starts_with(identity::SYSTEMD_PREFIX))
}
