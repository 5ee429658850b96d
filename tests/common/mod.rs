//! Shared test utilities for lifecycle integration tests.
//!
//! Provides `TestEnv` - an isolated home directory plus a `HostSim` runner
//! that stands in for launchctl, systemctl, loginctl and crontab. The
//! simulator keeps just enough state (loaded agents, enabled and active
//! units, the crontab text) for the managers under test to observe the
//! effect of their own commands.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tempfile::TempDir;

use checkpoint_service::{
    BackendKind, CommandOutput, CommandRunner, DriverContext, ManagerConfig, ServiceDescriptor,
    ServiceError, ServiceManager, ServiceType, TemplateEngine, ToolCommand,
};

/// PID reported for continuously running launch agents
pub const AGENT_PID: u32 = 4242;

#[derive(Default)]
struct SimState {
    /// launchd label -> pid (None when loaded but idle)
    agents: BTreeMap<String, Option<u32>>,
    enabled: BTreeSet<String>,
    active: BTreeSet<String>,
    daemon_reloads: usize,
    crontab: Option<String>,
    calls: Vec<String>,
}

/// Simulated host: answers native tool calls from in-memory state
pub struct HostSim {
    systemd_dir: PathBuf,
    missing_tools: HashSet<String>,
    state: Mutex<SimState>,
}

impl HostSim {
    pub fn new(systemd_dir: &Path) -> Self {
        Self {
            systemd_dir: systemd_dir.to_path_buf(),
            missing_tools: HashSet::new(),
            state: Mutex::new(SimState::default()),
        }
    }

    pub fn without_tool(mut self, tool: &str) -> Self {
        self.missing_tools.insert(tool.to_string());
        self
    }

    pub fn set_crontab(&self, text: &str) {
        self.state.lock().unwrap().crontab = Some(text.to_string());
    }

    pub fn crontab(&self) -> Option<String> {
        self.state.lock().unwrap().crontab.clone()
    }

    /// Pretend launchd already knows `label` (e.g. a job loaded by hand)
    pub fn load_agent(&self, label: &str, pid: Option<u32>) {
        self.state
            .lock()
            .unwrap()
            .agents
            .insert(label.to_string(), pid);
    }

    pub fn agent(&self, label: &str) -> Option<Option<u32>> {
        self.state.lock().unwrap().agents.get(label).copied()
    }

    pub fn is_enabled(&self, unit: &str) -> bool {
        self.state.lock().unwrap().enabled.contains(unit)
    }

    pub fn is_active(&self, unit: &str) -> bool {
        self.state.lock().unwrap().active.contains(unit)
    }

    /// Mark a unit active as if its timer had just fired
    pub fn activate(&self, unit: &str) {
        self.state.lock().unwrap().active.insert(unit.to_string());
    }

    pub fn daemon_reloads(&self) -> usize {
        self.state.lock().unwrap().daemon_reloads
    }

    /// Every invocation as `program arg arg ...`
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_to(&self, program: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.split(' ').next() == Some(program))
            .collect()
    }

    fn launchctl(&self, state: &mut SimState, args: &[&str]) -> CommandOutput {
        match args {
            ["list"] => {
                let mut out = String::from("PID\tStatus\tLabel\n");
                out.push_str("-\t0\tcom.apple.Safari.History\n");
                for (label, pid) in &state.agents {
                    let pid = pid.map_or_else(|| "-".to_string(), |p| p.to_string());
                    out.push_str(&format!("{pid}\t0\t{label}\n"));
                }
                CommandOutput::ok(out)
            }
            ["load", "-w", path] | ["load", path] => {
                let path = Path::new(path);
                let Ok(content) = fs::read_to_string(path) else {
                    return CommandOutput::failed(1, "No such file or directory");
                };
                let label = plist_label(path);
                // Interval jobs sit idle until their first tick
                let pid = (!content.contains("StartInterval")).then_some(AGENT_PID);
                state.agents.insert(label, pid);
                CommandOutput::ok("")
            }
            ["unload", "-w", path] | ["unload", path] => {
                let label = plist_label(Path::new(path));
                match state.agents.remove(&label) {
                    Some(_) => CommandOutput::ok(""),
                    None => CommandOutput::failed(1, "Could not find specified service"),
                }
            }
            ["remove", label] => match state.agents.remove(*label) {
                Some(_) => CommandOutput::ok(""),
                None => CommandOutput::failed(3, "No such process"),
            },
            _ => CommandOutput::failed(64, "Unrecognized subcommand"),
        }
    }

    fn systemctl(&self, state: &mut SimState, args: &[&str]) -> CommandOutput {
        let args = match args {
            ["--user", rest @ ..] => rest,
            _ => return CommandOutput::failed(1, "Failed to connect to bus"),
        };
        let unit_file = |unit: &str| self.systemd_dir.join(unit).is_file();
        match args {
            ["daemon-reload"] => {
                state.daemon_reloads += 1;
                CommandOutput::ok("")
            }
            ["enable", unit] if unit_file(*unit) => {
                state.enabled.insert(unit.to_string());
                CommandOutput::ok("")
            }
            ["start", unit] if unit_file(*unit) => {
                state.active.insert(unit.to_string());
                CommandOutput::ok("")
            }
            ["stop", unit] if unit_file(*unit) || state.active.contains(*unit) => {
                state.active.remove(*unit);
                CommandOutput::ok("")
            }
            ["disable", unit] => {
                state.enabled.remove(*unit);
                CommandOutput::ok("")
            }
            ["enable" | "start" | "stop", unit] => {
                CommandOutput::failed(5, format!("Unit {unit} not found."))
            }
            ["is-active", unit] => {
                if state.active.contains(*unit) {
                    CommandOutput::ok("active\n")
                } else {
                    let mut out = CommandOutput::failed(3, "");
                    out.stdout = "inactive\n".into();
                    out
                }
            }
            ["reset-failed", _] => CommandOutput::ok(""),
            ["list-units", ..] => {
                let units: BTreeSet<&String> =
                    state.enabled.iter().chain(state.active.iter()).collect();
                let mut out = String::new();
                for unit in units {
                    let sub = if state.active.contains(unit) {
                        "active running"
                    } else {
                        "inactive dead"
                    };
                    out.push_str(&format!("{unit} loaded {sub} checkpoint job\n"));
                }
                CommandOutput::ok(out)
            }
            _ => CommandOutput::failed(1, "Unknown command verb"),
        }
    }

    fn crontab_cmd(&self, state: &mut SimState, cmd: &ToolCommand) -> CommandOutput {
        match cmd.args.first().map(String::as_str) {
            Some("-l") => match &state.crontab {
                Some(text) => CommandOutput::ok(text.clone()),
                None => CommandOutput::failed(1, "no crontab for tester"),
            },
            Some("-") => {
                state.crontab = Some(cmd.stdin.clone().unwrap_or_default());
                CommandOutput::ok("")
            }
            _ => CommandOutput::failed(1, "usage: crontab [-l | -]"),
        }
    }
}

impl CommandRunner for HostSim {
    fn run(&self, cmd: &ToolCommand) -> checkpoint_service::Result<CommandOutput> {
        if self.missing_tools.contains(&cmd.program) {
            return Err(ServiceError::ToolUnavailable {
                tool: cmd.program.clone(),
            });
        }
        let mut state = self.state.lock().unwrap();
        state.calls.push(cmd.display());
        let args: Vec<&str> = cmd.args.iter().map(String::as_str).collect();
        Ok(match cmd.program.as_str() {
            "launchctl" => self.launchctl(&mut state, &args),
            "systemctl" => self.systemctl(&mut state, &args),
            "loginctl" => CommandOutput::ok("yes\n"),
            "crontab" => self.crontab_cmd(&mut state, cmd),
            other => CommandOutput::failed(127, format!("{other}: command not found")),
        })
    }
}

fn plist_label(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Isolated environment: temp home, simulated host, artifact inspectors
pub struct TestEnv {
    pub temp: TempDir,
    pub config: ManagerConfig,
    pub sim: Arc<HostSim>,
}

impl TestEnv {
    pub fn new() -> Result<Self> {
        Self::with_sim(|sim| sim)
    }

    /// Build with a customized simulator (e.g. a missing tool)
    pub fn with_sim(customize: impl FnOnce(HostSim) -> HostSim) -> Result<Self> {
        let temp = TempDir::new()?;
        let home = temp.path().join("home");
        fs::create_dir_all(&home)?;

        let mut config = ManagerConfig::with_home(&home);
        config.restart_settle_ms = 0;
        config.path_env = "/usr/local/bin:/usr/bin:/bin".into();

        let sim = Arc::new(customize(HostSim::new(&config.systemd_user_dir)));
        Ok(Self { temp, config, sim })
    }

    pub fn manager(&self, backend: BackendKind) -> ServiceManager {
        self.manager_with_templates(backend, TemplateEngine::builtin())
    }

    pub fn manager_with_templates(
        &self,
        backend: BackendKind,
        templates: TemplateEngine,
    ) -> ServiceManager {
        let runner: Arc<dyn CommandRunner> = self.sim.clone();
        let ctx = DriverContext::new(runner, self.config.clone()).with_templates(templates);
        ServiceManager::with_backend(backend, ctx)
    }

    /// Descriptor for a job whose script and project live in the temp dir
    pub fn descriptor(&self, name: &str, service_type: ServiceType) -> ServiceDescriptor {
        let project_dir = self.temp.path().join("project");
        ServiceDescriptor::new(
            name,
            self.temp.path().join("opt/checkpoint/bin/checkpoint-run"),
            project_dir,
            "Demo",
            service_type,
        )
    }

    pub fn plist_path(&self, label: &str) -> PathBuf {
        self.config.launch_agents_dir.join(format!("{label}.plist"))
    }

    pub fn unit_path(&self, unit: &str) -> PathBuf {
        self.config.systemd_user_dir.join(unit)
    }

    /// Write a plist as an older release would have
    pub fn write_legacy_plist(&self, name: &str) -> Result<PathBuf> {
        let label = format!("com.claudecode.backup.{name}");
        let path = self.plist_path(&label);
        fs::create_dir_all(&self.config.launch_agents_dir)?;
        fs::write(
            &path,
            format!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<plist version=\"1.0\">\n<dict>\n\
                 <key>Label</key><string>{label}</string>\n</dict>\n</plist>\n"
            ),
        )?;
        Ok(path)
    }

    /// Files under a directory, or empty when it does not exist
    pub fn files_in(&self, dir: &Path) -> Vec<String> {
        let Ok(entries) = fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    pub fn plists(&self) -> Vec<String> {
        self.files_in(&self.config.launch_agents_dir)
    }

    pub fn units(&self) -> Vec<String> {
        self.files_in(&self.config.systemd_user_dir)
    }

    /// Crontab lines tagged for `name`
    pub fn cron_lines_for(&self, name: &str) -> Vec<String> {
        let marker = format!("# checkpoint:{name}");
        self.sim
            .crontab()
            .unwrap_or_default()
            .lines()
            .filter(|l| l.trim_end().ends_with(&marker))
            .map(str::to_string)
            .collect()
    }
}
