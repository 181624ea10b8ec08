use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;
use uuid::Uuid;

use crate::scheduler::CommandResult;

/// Spawns submitted argument vectors and captures their output.
///
/// The first element is the program, looked up on `PATH`; the rest are
/// passed through verbatim with no shell in between.
#[derive(Debug, Clone, Default)]
pub struct JobExecutor {
    working_dir: Option<PathBuf>,
}

impl JobExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_working_dir(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: Some(working_dir.into()),
        }
    }

    /// Run `args` to completion. Never fails: a process that cannot be
    /// started is reported through [`CommandResult::error`].
    pub async fn execute(&self, job_id: Uuid, args: &[String]) -> CommandResult {
        let Some((program, rest)) = args.split_first() else {
            tracing::warn!(job_id = %job_id, "Rejected empty command");
            return CommandResult::failed("empty command");
        };

        tracing::info!(job_id = %job_id, program = %program, argc = args.len(), "Executing job");

        let mut command = Command::new(program);
        command
            .args(rest)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(ref dir) = self.working_dir {
            command.current_dir(dir);
        }

        Self::process_output(job_id, command.output().await)
    }

    fn process_output(
        job_id: Uuid,
        result: Result<std::process::Output, std::io::Error>,
    ) -> CommandResult {
        match result {
            Ok(output) => {
                match output.status.code() {
                    Some(exit_code) => {
                        tracing::info!(job_id = %job_id, exit_code, "Job completed")
                    }
                    None => {
                        tracing::warn!(job_id = %job_id, status = %output.status, "Job terminated")
                    }
                }
                CommandResult::from_output(output)
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Job execution failed");
                CommandResult::failed(e.to_string())
            }
        }
    }
}
