//! Scripted command runner for driver unit tests

use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::config::ManagerConfig;
use crate::error::Result;
use crate::runner::{CommandOutput, CommandRunner, ToolCommand};

use super::DriverContext;

type Handler = Box<dyn Fn(&ToolCommand) -> Result<CommandOutput> + Send + Sync>;

/// Records every invocation and answers through a handler closure
pub(crate) struct FakeRunner {
    calls: Mutex<Vec<ToolCommand>>,
    handler: Handler,
}

impl FakeRunner {
    pub(crate) fn new(
        handler: impl Fn(&ToolCommand) -> Result<CommandOutput> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            handler: Box::new(handler),
        })
    }

    /// Every command succeeds with empty output
    pub(crate) fn succeeding() -> Arc<Self> {
        Self::new(|_| Ok(CommandOutput::ok("")))
    }

    /// Invocations rendered as `program arg arg ...`
    pub(crate) fn lines(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(ToolCommand::display)
            .collect()
    }

    pub(crate) fn calls(&self) -> Vec<ToolCommand> {
        self.calls.lock().unwrap().clone()
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, cmd: &ToolCommand) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(cmd.clone());
        (self.handler)(cmd)
    }
}

pub(crate) fn context(runner: Arc<FakeRunner>, home: &Path) -> DriverContext {
    let mut config = ManagerConfig::with_home(home);
    config.restart_settle_ms = 0;
    config.path_env = "/usr/local/bin:/usr/bin:/bin".into();
    DriverContext::new(runner, config)
}
