use std::io::Read;
use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::{Result, RexecError};
use crate::exec::{AsyncExecutor, CommandLine, Executor};
use crate::scheduler::CommandResult;

const WAIT_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Default)]
struct ProcessOptions {
    cwd: Option<PathBuf>,
    env: Vec<(String, String)>,
    timeout: Option<Duration>,
}

impl ProcessOptions {
    fn command(&self, line: &CommandLine) -> std::process::Command {
        let mut command = std::process::Command::new(line.program());
        command
            .args(line.args())
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(ref cwd) = self.cwd {
            command.current_dir(cwd);
        }
        command
    }
}

fn spawn_error(line: &CommandLine, e: std::io::Error) -> RexecError {
    RexecError::Spawn {
        program: line.program().to_string(),
        message: e.to_string(),
    }
}

fn timed_out(line: &CommandLine, timeout: Duration) -> RexecError {
    tracing::warn!(command = %line, ?timeout, "Command timed out, killed");
    RexecError::CommandTimeout {
        program: line.program().to_string(),
        timeout,
    }
}

/// Runs commands on this machine with `std::process`, blocking the caller.
#[derive(Debug, Clone, Default)]
pub struct LocalExecutor {
    options: ProcessOptions,
}

impl LocalExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_dir(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.options.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.env.push((key.into(), value.into()));
        self
    }

    /// Kill the process if it runs longer than `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }
}

impl Executor for LocalExecutor {
    fn run(&self, line: &CommandLine) -> Result<CommandResult> {
        tracing::debug!(command = %line, "Running local command");
        let mut child = self
            .options
            .command(line)
            .spawn()
            .map_err(|e| spawn_error(line, e))?;

        let Some(timeout) = self.options.timeout else {
            return Ok(CommandResult::from_output(child.wait_with_output()?));
        };

        // Drain both pipes while waiting so a chatty child cannot block on a
        // full pipe before the deadline.
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);
        let deadline = Instant::now() + timeout;

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(timed_out(line, timeout));
            }
            thread::sleep(WAIT_INTERVAL);
        };

        Ok(CommandResult::from_output(Output {
            status,
            stdout: collect(stdout),
            stderr: collect(stderr),
        }))
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn collect(reader: Option<thread::JoinHandle<Vec<u8>>>) -> Vec<u8> {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

/// Runs commands on this machine with `tokio::process`. A timed-out or
/// abandoned process is killed when its future is dropped.
#[derive(Debug, Clone, Default)]
pub struct AsyncLocalExecutor {
    options: ProcessOptions,
}

impl AsyncLocalExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_dir(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.options.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.env.push((key.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl AsyncExecutor for AsyncLocalExecutor {
    async fn run_async(&self, line: &CommandLine) -> Result<CommandResult> {
        tracing::debug!(command = %line, "Running local command");
        let mut command = tokio::process::Command::from(self.options.command(line));
        command.kill_on_drop(true);
        let child = command.spawn().map_err(|e| spawn_error(line, e))?;

        let output = match self.options.timeout {
            Some(timeout) => tokio::time::timeout(timeout, child.wait_with_output())
                .await
                .map_err(|_| timed_out(line, timeout))??,
            None => child.wait_with_output().await?,
        };
        Ok(CommandResult::from_output(output))
    }
}
