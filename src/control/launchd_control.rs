//! macOS service control using per-user launch agents (launchctl)

use std::path::PathBuf;
use std::thread;

use log::{debug, info, warn};

use super::{Driver, DriverContext, filter_lines, plist};
use crate::detection::BackendKind;
use crate::error::{Result, ServiceError};
use crate::file_ops::{remove_if_exists, write_file_atomic};
use crate::identity::{self, LabelScheme};
use crate::runner::{CommandOutput, ToolCommand, run_logged};
use crate::service::{ServiceDescriptor, ServiceStatus};
use crate::template::render;

const LAUNCHCTL: &str = "launchctl";
const SCHEMES: [LabelScheme; 2] = [LabelScheme::Current, LabelScheme::Legacy];

/// One row of `launchctl list`
#[derive(Debug, Clone, PartialEq, Eq)]
struct AgentEntry {
    pid: Option<u32>,
    label: String,
}

pub struct LaunchdDriver {
    ctx: DriverContext,
}

impl LaunchdDriver {
    pub fn new(ctx: DriverContext) -> Self {
        Self { ctx }
    }

    pub fn plist_path(&self, label: &str) -> PathBuf {
        self.ctx
            .config
            .launch_agents_dir
            .join(format!("{label}.plist"))
    }

    /// Naming scheme of the installed plist, current preferred over legacy
    fn installed_scheme(&self, name: &str) -> Option<LabelScheme> {
        identity::resolve_launchd_label(name, |label| self.plist_path(label).is_file())
    }

    fn launchctl<'a>(&self, args: impl IntoIterator<Item = &'a str>) -> ToolCommand {
        ToolCommand::new(LAUNCHCTL).args(args)
    }

    fn load(&self, plist: &str) -> Result<CommandOutput> {
        // -w clears any Disabled override so the agent also loads at next login
        self.ctx.runner.run(&self.launchctl(["load", "-w", plist]))
    }

    /// Agents known to launchd for this user
    fn agents(&self) -> Result<Vec<AgentEntry>> {
        let output = self
            .ctx
            .runner
            .run(&self.launchctl(["list"]))?
            .into_result(LAUNCHCTL)?;

        // Output format: "PID\tStatus\tLabel"; PID is "-" when loaded but idle
        Ok(output
            .stdout
            .lines()
            .filter_map(|line| {
                let mut parts = line.split_whitespace();
                let pid = parts.next()?;
                let _status = parts.next()?;
                let label = parts.next()?;
                (pid != "PID").then(|| AgentEntry {
                    pid: pid.parse().ok(),
                    label: label.to_string(),
                })
            })
            .collect())
    }

    /// Plist of an installed service, or `ToggleFailed` when there is none
    fn installed_plist(&self, name: &str) -> Result<String> {
        identity::validate_service_name(name)?;
        let scheme = self
            .installed_scheme(name)
            .ok_or_else(|| ServiceError::not_installed(name))?;
        let plist = self.plist_path(&scheme.label(name));
        Ok(plist.to_string_lossy().into_owned())
    }

    fn render_plist(&self, desc: &ServiceDescriptor, label: &str) -> Result<String> {
        let mut vars = self.ctx.vars(desc);
        vars.label = Some(label.to_string());

        match self
            .ctx
            .templates
            .find_template(desc.service_type, BackendKind::Launchd)
        {
            Some(template) => Ok(render(&template, &vars)?),
            None if desc.service_type.is_periodic() => {
                debug!("no launchd template for {}, synthesizing plist", desc.service_type);
                plist::generate_periodic_plist(label, &vars)
            }
            None => Err(ServiceError::InstallFailed(format!(
                "no launchd template for service type {}",
                desc.service_type
            ))),
        }
    }
}

impl Driver for LaunchdDriver {
    fn backend(&self) -> BackendKind {
        BackendKind::Launchd
    }

    fn install(&self, desc: &ServiceDescriptor) -> Result<()> {
        let name = desc.service_name.as_str();
        identity::validate_service_name(name)?;
        let label = identity::launchd_label(name);

        // Unload whatever an earlier install left behind, under either scheme.
        // Legacy plists are retired so only the current identity remains.
        for scheme in SCHEMES {
            let path = self.plist_path(&scheme.label(name));
            if !path.is_file() {
                continue;
            }
            run_logged(
                self.ctx.runner.as_ref(),
                &self.launchctl(["unload", "-w", path.to_string_lossy().as_ref()]),
            )?;
            if scheme == LabelScheme::Legacy {
                remove_if_exists(&path)?;
                debug!("retired legacy plist {}", path.display());
            }
        }

        let content = self.render_plist(desc, &label)?;
        self.ctx.ensure_log_dir()?;
        let plist_path = self.plist_path(&label);
        write_file_atomic(&plist_path, &content)?;

        let output = self.load(&plist_path.to_string_lossy())?;
        if !output.success() {
            // The plist stays on disk; a later start or reinstall retries the load
            warn!(
                "launchctl load failed for {label} (plist kept at {}): {}",
                plist_path.display(),
                output.stderr.trim()
            );
        }

        info!("Installed {name} as launch agent {label}");
        Ok(())
    }

    fn uninstall(&self, service_name: &str) -> Result<()> {
        identity::validate_service_name(service_name)?;
        let mut removed = false;

        for scheme in SCHEMES {
            let path = self.plist_path(&scheme.label(service_name));
            if path.is_file() {
                run_logged(
                    self.ctx.runner.as_ref(),
                    &self.launchctl(["unload", "-w", path.to_string_lossy().as_ref()]),
                )?;
                removed |= remove_if_exists(&path)?;
            }
        }

        // A job can outlive its plist (file deleted by hand); drop it from launchd too
        let loaded = self.agents().unwrap_or_else(|e| {
            debug!("launchctl list failed during uninstall: {e}");
            Vec::new()
        });
        for scheme in SCHEMES {
            let label = scheme.label(service_name);
            if loaded.iter().any(|a| a.label == label) {
                run_logged(
                    self.ctx.runner.as_ref(),
                    &self.launchctl(["remove", label.as_str()]),
                )?;
                removed = true;
            }
        }

        if removed {
            info!("Uninstalled {service_name}");
        } else {
            debug!("{service_name} has no launch agent; nothing to uninstall");
        }
        Ok(())
    }

    fn start(&self, service_name: &str) -> Result<()> {
        let plist = self.installed_plist(service_name)?;
        self.load(&plist)?.into_result(LAUNCHCTL)?;
        Ok(())
    }

    fn stop(&self, service_name: &str) -> Result<()> {
        let plist = self.installed_plist(service_name)?;
        self.ctx
            .runner
            .run(&self.launchctl(["unload", plist.as_str()]))?
            .into_result(LAUNCHCTL)?;
        Ok(())
    }

    fn restart(&self, service_name: &str) -> Result<()> {
        let plist = self.installed_plist(service_name)?;
        // An agent that was not loaded fails to unload; that is fine here
        run_logged(
            self.ctx.runner.as_ref(),
            &self.launchctl(["unload", plist.as_str()]),
        )?;
        // launchd debounces rapid unload/load cycles of the same label
        thread::sleep(self.ctx.config.restart_settle());
        self.load(&plist)?.into_result(LAUNCHCTL)?;
        Ok(())
    }

    fn status(&self, service_name: &str) -> Result<ServiceStatus> {
        identity::validate_service_name(service_name)?;
        let agents = self.agents()?;

        let listed = SCHEMES.iter().find_map(|scheme| {
            let label = scheme.label(service_name);
            agents.iter().find(|a| a.label == label)
        });

        Ok(match listed {
            Some(AgentEntry { pid: Some(_), .. }) => ServiceStatus::Running,
            Some(AgentEntry { pid: None, .. }) => ServiceStatus::Scheduled,
            None if self.installed_scheme(service_name).is_some() => ServiceStatus::Stopped,
            None => ServiceStatus::NotInstalled,
        })
    }

    fn list(&self, pattern: &str) -> Result<Vec<String>> {
        let output = self
            .ctx
            .runner
            .run(&self.launchctl(["list"]))?
            .into_result(LAUNCHCTL)?;
        Ok(filter_lines(&output.stdout, pattern))
    }
}
