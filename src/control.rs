//! Service lifecycle control - delegates to the host's native service manager
//!
//! Provides one contract over three substrates:
//! - launchd: per-user launch agents (launchctl)
//! - systemd: per-user units and timers (systemctl --user)
//! - cron: one marked line per service in the user's crontab

use std::path::Path;
use std::sync::Arc;

use crate::config::ManagerConfig;
use crate::detection::BackendKind;
use crate::error::{Result, ServiceError};
use crate::runner::CommandRunner;
use crate::service::{ServiceDescriptor, ServiceStatus};
use crate::template::{TemplateEngine, TemplateVars};

mod cron_control;
mod launchd_control;
mod plist;
mod systemd_control;
#[cfg(test)]
pub(crate) mod testing;

pub use cron_control::{CronDriver, cron_line, default_schedule};
pub use launchd_control::LaunchdDriver;
pub use systemd_control::SystemdDriver;

/// Operations every backend implements
pub trait Driver: Send + Sync {
    fn backend(&self) -> BackendKind;

    /// Install (or reinstall) and activate the service
    fn install(&self, desc: &ServiceDescriptor) -> Result<()>;

    /// Remove every identity of the service; absent services are a no-op
    fn uninstall(&self, service_name: &str) -> Result<()>;

    fn start(&self, service_name: &str) -> Result<()>;

    fn stop(&self, service_name: &str) -> Result<()>;

    fn restart(&self, service_name: &str) -> Result<()> {
        self.stop(service_name)?;
        self.start(service_name)
    }

    fn status(&self, service_name: &str) -> Result<ServiceStatus>;

    /// Raw backend-native listing lines containing `pattern`
    fn list(&self, pattern: &str) -> Result<Vec<String>>;
}

/// Collaborators shared by all drivers
#[derive(Clone)]
pub struct DriverContext {
    pub runner: Arc<dyn CommandRunner>,
    pub config: ManagerConfig,
    pub templates: TemplateEngine,
}

impl DriverContext {
    pub fn new(runner: Arc<dyn CommandRunner>, config: ManagerConfig) -> Self {
        let templates = match &config.template_dir {
            Some(dir) => TemplateEngine::with_override_dir(dir),
            None => TemplateEngine::builtin(),
        };
        Self {
            runner,
            config,
            templates,
        }
    }

    pub fn with_templates(mut self, templates: TemplateEngine) -> Self {
        self.templates = templates;
        self
    }

    pub(crate) fn vars(&self, desc: &ServiceDescriptor) -> TemplateVars {
        TemplateVars::for_descriptor(
            desc,
            &self.config.home_dir,
            &self.config.path_env,
            &self.config.log_dir,
            self.config.daemon_interval_secs,
        )
    }

    pub(crate) fn ensure_log_dir(&self) -> Result<()> {
        ensure_dir(&self.config.log_dir)
    }
}

pub(crate) fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| {
        ServiceError::InstallFailed(format!("Failed to create {}: {e}", dir.display()))
    })
}

/// Build the driver for `kind`
pub fn driver_for(kind: BackendKind, ctx: DriverContext) -> Box<dyn Driver> {
    match kind {
        BackendKind::Launchd => Box::new(LaunchdDriver::new(ctx)),
        BackendKind::Systemd => Box::new(SystemdDriver::new(ctx)),
        BackendKind::Cron => Box::new(CronDriver::new(ctx)),
    }
}

/// Lines of `text` containing `pattern`, trimmed, blanks dropped
pub(crate) fn filter_lines(text: &str, pattern: &str) -> Vec<String> {
    text.lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty() && line.contains(pattern))
        .map(str::to_string)
        .collect()
}
