use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, RexecError};
use crate::exec::{AsyncExecutor, CommandLine, Executor};
use crate::rpc::{JobResult, RpcClient};
use crate::scheduler::CommandResult;

/// Runs commands on a remote server through an [`RpcClient`].
///
/// Cancelling the token stops local waiting only; the remote job keeps
/// running and its result remains fetchable by handle.
#[derive(Debug, Clone)]
pub struct RemoteExecutor {
    client: Arc<RpcClient>,
    timeout: Option<Duration>,
    poll_interval: Duration,
    monitor: bool,
    cancel: CancellationToken,
}

impl RemoteExecutor {
    /// Uses the client's poll interval and, unless overridden, its timeout.
    pub fn new(client: Arc<RpcClient>) -> Self {
        let poll_interval = client.config().poll_interval;
        Self {
            client,
            timeout: None,
            poll_interval,
            monitor: true,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// With monitoring off, polling uses the cheap `is_running` probe and
    /// the result is fetched once at the end.
    pub fn with_monitor(mut self, monitor: bool) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn client(&self) -> &RpcClient {
        &self.client
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn monitor(&self) -> bool {
        self.monitor
    }

    fn effective_timeout(&self) -> Duration {
        self.timeout.unwrap_or(self.client.config().timeout)
    }

    async fn poll_until_done(&self, job_id: &str) -> Result<CommandResult> {
        let timeout = self.effective_timeout();
        let deadline = Instant::now() + timeout;

        loop {
            if self.monitor {
                match self.client.get_result(job_id).await? {
                    JobResult::Done { result, .. } => return Ok(result),
                    JobResult::Running { .. } => {
                        tracing::info!(job_id, "Job still running");
                    }
                }
            } else if !self.client.is_running(job_id).await? {
                return finished(self.client.get_result(job_id).await?);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(RexecError::Timeout {
                    job_id: job_id.to_string(),
                    timeout,
                });
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!(job_id, "Stopped waiting for job");
                    return Err(RexecError::Cancelled);
                }
                _ = tokio::time::sleep(self.poll_interval.min(deadline - now)) => {}
            }
        }
    }
}

fn finished(result: JobResult) -> Result<CommandResult> {
    match result {
        JobResult::Done { result, .. } => Ok(result),
        JobResult::Running { job_id } => Err(RexecError::Server(format!(
            "job {} reported finished but has no result",
            job_id
        ))),
    }
}

#[async_trait]
impl AsyncExecutor for RemoteExecutor {
    async fn run_async(&self, line: &CommandLine) -> Result<CommandResult> {
        if self.cancel.is_cancelled() {
            return Err(RexecError::Cancelled);
        }
        let submission = self.client.submit(&line.to_argv()).await?;
        let job_id = submission.job_id.ok_or(RexecError::SubmissionFailed)?;
        tracing::info!(job_id = %job_id, command = %line, monitor = self.monitor, "Submitted remote command");

        self.poll_until_done(&job_id).await
    }
}

impl Executor for RemoteExecutor {
    /// Blocks the calling thread. Inside a multi-threaded runtime the worker
    /// is handed off with `block_in_place`; a current-thread runtime cannot
    /// do that, so the call fails instead.
    fn run(&self, line: &CommandLine) -> Result<CommandResult> {
        block_on(self.run_async(line))?
    }
}

fn block_on<F: Future>(future: F) -> Result<F::Output> {
    match Handle::try_current() {
        Ok(handle) => match handle.runtime_flavor() {
            RuntimeFlavor::MultiThread => {
                Ok(tokio::task::block_in_place(|| handle.block_on(future)))
            }
            _ => Err(RexecError::Config(
                "blocking remote execution is not supported on a current-thread runtime; use run_async"
                    .to_string(),
            )),
        },
        Err(_) => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            Ok(runtime.block_on(future))
        }
    }
}
