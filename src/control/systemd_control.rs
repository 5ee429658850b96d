//! Linux service control using per-user systemd units (systemctl --user)
//!
//! Continuous services (watcher, watchdog) are a single `.service` that is
//! enabled and started directly. Periodic services (daemon) get a paired
//! `.timer`; only the timer is enabled and started, the timer activates the
//! service.

use std::path::PathBuf;

use log::{debug, info, warn};

use super::{Driver, DriverContext, filter_lines};
use crate::detection::BackendKind;
use crate::error::{Result, ServiceError};
use crate::file_ops::{remove_if_exists, write_file_atomic};
use crate::identity;
use crate::runner::{CommandOutput, ToolCommand, run_logged};
use crate::service::{ServiceDescriptor, ServiceStatus};
use crate::template::render;

const SYSTEMCTL: &str = "systemctl";
const LOGINCTL: &str = "loginctl";

pub struct SystemdDriver {
    ctx: DriverContext,
}

impl SystemdDriver {
    pub fn new(ctx: DriverContext) -> Self {
        Self { ctx }
    }

    pub fn unit_path(&self, unit: &str) -> PathBuf {
        self.ctx.config.systemd_user_dir.join(unit)
    }

    fn systemctl<'a>(&self, args: impl IntoIterator<Item = &'a str>) -> ToolCommand {
        ToolCommand::new(SYSTEMCTL).arg("--user").args(args)
    }

    /// Run an intermediate systemctl step whose failure is expected at times
    fn systemctl_logged(&self, args: &[&str]) -> Result<CommandOutput> {
        run_logged(self.ctx.runner.as_ref(), &self.systemctl(args.iter().copied()))
    }

    /// Run a result-determining systemctl step
    fn systemctl_checked(&self, args: &[&str]) -> Result<()> {
        self.ctx
            .runner
            .run(&self.systemctl(args.iter().copied()))?
            .into_result(SYSTEMCTL)?;
        Ok(())
    }

    /// Unit that start/stop act on: the timer when one exists, else the service
    fn toggle_target(&self, name: &str) -> Result<String> {
        identity::validate_service_name(name)?;
        let timer = identity::systemd_timer_unit(name);
        if self.unit_path(&timer).is_file() {
            return Ok(timer);
        }
        let service = identity::systemd_service_unit(name);
        if self.unit_path(&service).is_file() {
            return Ok(service);
        }
        Err(ServiceError::not_installed(name))
    }

    fn is_active(&self, unit: &str) -> Result<bool> {
        // is-active exits 0 when active, 3 when inactive
        Ok(self.ctx.runner.run(&self.systemctl(["is-active", unit]))?.success())
    }

    /// Units stop with the user's last session unless lingering is enabled
    fn note_lingering(&self) {
        let uid = nix::unistd::getuid().to_string();
        let cmd = ToolCommand::new(LOGINCTL).args(["show-user", uid.as_str(), "--property=Linger", "--value"]);
        match self.ctx.runner.run(&cmd) {
            Ok(out) if out.success() && out.stdout.trim() == "no" => debug!(
                "Lingering is disabled for this user; checkpoint services stop at logout \
                 (enable with `loginctl enable-linger`)"
            ),
            Ok(_) => {}
            Err(e) => debug!("could not query lingering: {e}"),
        }
    }
}

impl Driver for SystemdDriver {
    fn backend(&self) -> BackendKind {
        BackendKind::Systemd
    }

    fn install(&self, desc: &ServiceDescriptor) -> Result<()> {
        let name = desc.service_name.as_str();
        identity::validate_service_name(name)?;
        let service_unit = identity::systemd_service_unit(name);
        let timer_unit = identity::systemd_timer_unit(name);
        let timer_path = self.unit_path(&timer_unit);
        let had_timer = timer_path.is_file();
        let had_service = self.unit_path(&service_unit).is_file();

        // Resolve and render everything before touching the running units
        let mut vars = self.ctx.vars(desc);
        let template = self
            .ctx
            .templates
            .find_template(desc.service_type, BackendKind::Systemd)
            .ok_or_else(|| {
                ServiceError::InstallFailed(format!(
                    "no systemd template for service type {}",
                    desc.service_type
                ))
            })?;
        let service_text = render(&template, &vars)?;

        let timer_text = if desc.service_type.is_periodic() {
            let template = self
                .ctx
                .templates
                .find_timer_template(desc.service_type)
                .ok_or_else(|| {
                    ServiceError::InstallFailed(format!(
                        "no systemd timer template for service type {}",
                        desc.service_type
                    ))
                })?;
            vars.unit = Some(service_unit.clone());
            Some(render(&template, &vars)?)
        } else {
            None
        };

        // "not loaded" failures are expected on first install
        if had_timer {
            self.systemctl_logged(&["stop", &timer_unit])?;
        }
        self.systemctl_logged(&["stop", &service_unit])?;

        self.ctx.ensure_log_dir()?;
        write_file_atomic(&self.unit_path(&service_unit), &service_text)?;
        match &timer_text {
            Some(text) => {
                // A former watcher left its default.target symlink; only the timer may stay enabled
                if had_service {
                    self.systemctl_logged(&["disable", &service_unit])?;
                }
                write_file_atomic(&timer_path, text)?;
            }
            None if had_timer => {
                // Former daemon reinstalled as a continuous service
                self.systemctl_logged(&["disable", &timer_unit])?;
                remove_if_exists(&timer_path)?;
            }
            None => {}
        }

        let reload = self.systemctl_logged(&["daemon-reload"])?;
        if !reload.success() {
            warn!("systemctl daemon-reload failed: {}", reload.stderr.trim());
        }

        let target = if timer_text.is_some() {
            &timer_unit
        } else {
            &service_unit
        };
        self.systemctl_checked(&["enable", target])?;
        self.systemctl_checked(&["start", target])?;

        self.note_lingering();
        info!("Installed {name} as systemd user unit {target}");
        Ok(())
    }

    fn uninstall(&self, service_name: &str) -> Result<()> {
        identity::validate_service_name(service_name)?;
        let mut removed = false;

        // Timer first so it cannot re-trigger the service mid-teardown
        for unit in [
            identity::systemd_timer_unit(service_name),
            identity::systemd_service_unit(service_name),
        ] {
            let path = self.unit_path(&unit);
            if !path.is_file() {
                continue;
            }
            self.systemctl_logged(&["stop", &unit])?;
            self.systemctl_logged(&["disable", &unit])?;
            removed |= remove_if_exists(&path)?;
        }

        if !removed {
            debug!("{service_name} has no systemd units; nothing to uninstall");
            return Ok(());
        }

        let reload = self.systemctl_logged(&["daemon-reload"])?;
        if !reload.success() {
            warn!("systemctl daemon-reload failed: {}", reload.stderr.trim());
        }
        self.systemctl_logged(&["reset-failed", &identity::systemd_service_unit(service_name)])?;

        info!("Uninstalled {service_name}");
        Ok(())
    }

    fn start(&self, service_name: &str) -> Result<()> {
        let target = self.toggle_target(service_name)?;
        self.systemctl_checked(&["start", &target])
    }

    fn stop(&self, service_name: &str) -> Result<()> {
        let target = self.toggle_target(service_name)?;
        self.systemctl_checked(&["stop", &target])
    }

    fn status(&self, service_name: &str) -> Result<ServiceStatus> {
        identity::validate_service_name(service_name)?;
        let service = identity::systemd_service_unit(service_name);
        let timer = identity::systemd_timer_unit(service_name);

        if self.unit_path(&timer).is_file() {
            return Ok(if self.is_active(&service)? {
                ServiceStatus::Running
            } else if self.is_active(&timer)? {
                ServiceStatus::Scheduled
            } else {
                ServiceStatus::Stopped
            });
        }

        if self.unit_path(&service).is_file() {
            return Ok(if self.is_active(&service)? {
                ServiceStatus::Running
            } else {
                ServiceStatus::Stopped
            });
        }

        Ok(ServiceStatus::NotInstalled)
    }

    fn list(&self, pattern: &str) -> Result<Vec<String>> {
        let output = self
            .ctx
            .runner
            .run(&self.systemctl([
                "list-units",
                "--all",
                "--no-legend",
                "--plain",
                "--type=service,timer",
                "checkpoint-*",
            ]))?
            .into_result(SYSTEMCTL)?;
        Ok(filter_lines(&output.stdout, pattern)
            .into_iter()
            .map(|line| line.trim_start().to_string())
            .collect())
    }
}
