//! Universal fallback: one marked line per service in the user's crontab
//!
//! Cron owns the schedule, so there is nothing to start or stop natively.
//! `stop` instead terminates a run in progress, found through the PID file
//! the job writes under the state directory.

use std::fs;
use std::path::Path;

use log::{debug, info};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

use super::{Driver, DriverContext, ensure_dir, filter_lines};
use crate::detection::BackendKind;
use crate::error::{Result, ServiceError};
use crate::file_ops::remove_if_exists;
use crate::identity;
use crate::runner::ToolCommand;
use crate::service::{ServiceDescriptor, ServiceStatus, ServiceType};

const CRONTAB: &str = "crontab";

/// Default schedule by service type
pub fn default_schedule(service_type: ServiceType) -> &'static str {
    match service_type {
        ServiceType::Watcher => "*/5 * * * *",
        ServiceType::Daemon => "0 * * * *",
        ServiceType::Watchdog => "* * * * *",
    }
}

/// Quote for `sh`; `%` is escaped because cron turns it into a newline
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''").replace('%', r"\%"))
}

/// The complete crontab line for a service, marker comment included
pub fn cron_line(desc: &ServiceDescriptor, log_dir: &Path) -> String {
    let log_file = log_dir.join(format!("{}.log", desc.service_name));
    format!(
        "{} cd {} && {} >> {} 2>&1 {}",
        default_schedule(desc.service_type),
        shell_quote(&desc.project_dir.to_string_lossy()),
        shell_quote(&desc.script_path.to_string_lossy()),
        shell_quote(&log_file.to_string_lossy()),
        identity::cron_marker(&desc.service_name),
    )
}

fn is_marked_for(line: &str, name: &str) -> bool {
    identity::cron_marker_name(line) == Some(name)
}

pub struct CronDriver {
    ctx: DriverContext,
}

impl CronDriver {
    pub fn new(ctx: DriverContext) -> Self {
        Self { ctx }
    }

    /// Current crontab lines; a user without a crontab has an empty one
    fn read_crontab(&self) -> Result<Vec<String>> {
        let output = self.ctx.runner.run(&ToolCommand::new(CRONTAB).arg("-l"))?;
        if output.success() {
            return Ok(output.stdout.lines().map(str::to_string).collect());
        }
        if output.stderr.contains("no crontab for") {
            return Ok(Vec::new());
        }
        // Never rewrite a crontab we failed to read
        output.into_result(CRONTAB).map(|_| Vec::new())
    }

    /// Replace the whole crontab in a single call
    fn write_crontab(&self, lines: &[String]) -> Result<()> {
        let mut content = lines.join("\n");
        if !content.is_empty() {
            content.push('\n');
        }
        self.ctx
            .runner
            .run(&ToolCommand::new(CRONTAB).arg("-").stdin(content))?
            .into_result(CRONTAB)?;
        Ok(())
    }

    fn is_installed(&self, name: &str) -> Result<bool> {
        Ok(self
            .read_crontab()?
            .iter()
            .any(|line| is_marked_for(line, name)))
    }

    fn require_installed(&self, name: &str) -> Result<()> {
        identity::validate_service_name(name)?;
        if self.is_installed(name)? {
            Ok(())
        } else {
            Err(ServiceError::not_installed(name))
        }
    }

    /// PID recorded for a run in progress, if that process is still alive
    fn live_pid(&self, name: &str) -> Option<Pid> {
        let path = self.ctx.config.pid_file(name);
        let raw = fs::read_to_string(&path).ok()?;
        let pid: i32 = raw.trim().parse().ok()?;
        // 0 and negatives address process groups, never a single job
        if pid <= 0 {
            return None;
        }
        let pid = Pid::from_raw(pid);
        match signal::kill(pid, None) {
            Ok(()) | Err(Errno::EPERM) => Some(pid),
            Err(_) => None,
        }
    }
}

impl Driver for CronDriver {
    fn backend(&self) -> BackendKind {
        BackendKind::Cron
    }

    fn install(&self, desc: &ServiceDescriptor) -> Result<()> {
        let name = desc.service_name.as_str();
        identity::validate_service_name(name)?;

        let mut lines = self.read_crontab()?;
        lines.retain(|line| !is_marked_for(line, name));
        lines.push(cron_line(desc, &self.ctx.config.log_dir));

        self.ctx.ensure_log_dir()?;
        ensure_dir(&self.ctx.config.state_dir)?;
        self.write_crontab(&lines)?;

        info!(
            "Installed {name} in crontab ({})",
            default_schedule(desc.service_type)
        );
        Ok(())
    }

    fn uninstall(&self, service_name: &str) -> Result<()> {
        identity::validate_service_name(service_name)?;

        let mut lines = self.read_crontab()?;
        let before = lines.len();
        lines.retain(|line| !is_marked_for(line, service_name));

        if lines.len() == before {
            debug!("{service_name} has no crontab entry; nothing to uninstall");
            return Ok(());
        }

        self.write_crontab(&lines)?;
        info!("Uninstalled {service_name}");
        Ok(())
    }

    fn start(&self, service_name: &str) -> Result<()> {
        self.require_installed(service_name)?;
        debug!("{service_name} runs on cron's schedule; nothing to start");
        Ok(())
    }

    fn stop(&self, service_name: &str) -> Result<()> {
        self.require_installed(service_name)?;
        let pid_file = self.ctx.config.pid_file(service_name);

        if let Some(pid) = self.live_pid(service_name) {
            signal::kill(pid, Signal::SIGTERM).map_err(|e| {
                ServiceError::toggle(service_name, format!("failed to signal pid {pid}: {e}"))
            })?;
            debug!("sent SIGTERM to {service_name} (pid {pid})");
        } else {
            debug!("{service_name} is not running");
        }

        remove_if_exists(&pid_file)?;
        Ok(())
    }

    fn status(&self, service_name: &str) -> Result<ServiceStatus> {
        identity::validate_service_name(service_name)?;
        if !self.is_installed(service_name)? {
            return Ok(ServiceStatus::NotInstalled);
        }
        Ok(match self.live_pid(service_name) {
            Some(_) => ServiceStatus::Running,
            None => ServiceStatus::Scheduled,
        })
    }

    fn list(&self, pattern: &str) -> Result<Vec<String>> {
        let lines = self.read_crontab()?;
        Ok(filter_lines(&lines.join("\n"), pattern))
    }
}
