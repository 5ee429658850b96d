//! Native tool invocation behind a narrow port.
//!
//! Drivers never call `std::process::Command` directly; they describe the
//! invocation as a [`ToolCommand`] and hand it to a [`CommandRunner`]. The
//! production [`SystemRunner`] spawns the real tool with a bounded wait, while
//! tests substitute a fake that simulates launchctl/systemctl/crontab state.

use std::io::{Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use log::debug;
use wait_timeout::ChildExt;

use crate::error::{Result, ServiceError};

/// Timeout for collecting output from child process pipes after exit
const OUTPUT_COLLECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// A single native tool invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<String>,
}

impl ToolCommand {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Text piped to the child's stdin
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Rendered as a single line for diagnostics
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Structured result of a finished tool invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when terminated by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    #[inline]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Convert a non-zero exit into [`ServiceError::CommandFailed`]
    pub fn into_result(self, tool: &str) -> Result<CommandOutput> {
        if self.success() {
            Ok(self)
        } else {
            Err(ServiceError::CommandFailed {
                tool: tool.to_string(),
                code: self.code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Port through which every native tool call flows
pub trait CommandRunner: Send + Sync {
    /// Run the command to completion.
    ///
    /// A non-zero exit is NOT an error at this level: it is reported through
    /// [`CommandOutput::code`] so callers can decide whether the step matters.
    /// Errors are reserved for a missing tool, a spawn failure or a timeout.
    fn run(&self, cmd: &ToolCommand) -> Result<CommandOutput>;
}

/// Run a command and log its outcome at debug level.
///
/// Used for intermediate steps whose failure is expected and non-fatal
/// (unload before reinstall, stop of a unit that is not loaded).
pub(crate) fn run_logged(runner: &dyn CommandRunner, cmd: &ToolCommand) -> Result<CommandOutput> {
    let output = runner.run(cmd)?;
    if output.success() {
        debug!("`{}` succeeded", cmd.display());
    } else {
        debug!(
            "`{}` exited with {:?}: {}",
            cmd.display(),
            output.code,
            output.stderr.trim()
        );
    }
    Ok(output)
}

/// Production runner spawning real processes with a bounded wait
#[derive(Debug, Clone)]
pub struct SystemRunner {
    timeout: Duration,
}

impl SystemRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn spawn(&self, cmd: &ToolCommand) -> Result<Child> {
        let program = which::which(&cmd.program).map_err(|_| ServiceError::ToolUnavailable {
            tool: cmd.program.clone(),
        })?;

        Command::new(program)
            .args(&cmd.args)
            .stdin(if cmd.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ServiceError::ToolUnavailable {
                    tool: cmd.program.clone(),
                },
                _ => ServiceError::Io(e),
            })
    }
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, cmd: &ToolCommand) -> Result<CommandOutput> {
        debug!("running `{}`", cmd.display());
        let mut child = self.spawn(cmd)?;

        // Drain both pipes concurrently with the wait, otherwise a chatty child
        // blocks on a full pipe buffer and looks like a timeout.
        let stdout_rx = drain(child.stdout.take());
        let stderr_rx = drain(child.stderr.take());

        if let Some(input) = &cmd.stdin
            && let Some(stdin) = child.stdin.take()
        {
            feed(stdin, input.clone(), cmd.program.clone());
        }

        let status = match child.wait_timeout(self.timeout) {
            Ok(status) => status,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e.into());
            }
        };

        let Some(status) = status else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ServiceError::Timeout {
                tool: cmd.program.clone(),
                secs: self.timeout.as_secs(),
            });
        };

        let stdout = stdout_rx
            .recv_timeout(OUTPUT_COLLECTION_TIMEOUT)
            .unwrap_or_default();
        let stderr = stderr_rx
            .recv_timeout(OUTPUT_COLLECTION_TIMEOUT)
            .unwrap_or_default();

        Ok(CommandOutput {
            code: status.code(),
            stdout,
            stderr,
        })
    }
}

/// Write `input` to the child's stdin off the calling thread.
///
/// A tool that exits without reading closes the pipe; that is reported by its
/// exit status, not by the write. Dropping the handle closes the pipe so tools
/// like `crontab -` see EOF.
fn feed(mut stdin: ChildStdin, input: String, program: String) {
    thread::spawn(move || {
        if let Err(e) = stdin.write_all(input.as_bytes()) {
            debug!("`{program}` did not take all of its stdin: {e}");
        }
    });
}

fn drain<R: Read + Send + 'static>(stream: Option<R>) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    match stream {
        Some(mut stream) => {
            thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = stream.read_to_end(&mut buf);
                let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
            });
        }
        None => {
            let _ = tx.send(String::new());
        }
    }
    rx
}
