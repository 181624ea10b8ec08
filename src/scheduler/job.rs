use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, RexecError};

/// Outcome of running one command line.
///
/// Once terminal, exactly one of `exit_code` (the process ran to completion)
/// or `error` (it could not be run at all) is populated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    #[serde(default)]
    pub stdout: Option<String>,
    #[serde(default)]
    pub stderr: Option<String>,
    #[serde(default, rename = "returncode", alias = "exit_code")]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub error: Option<String>,
}

impl CommandResult {
    pub fn completed(stdout: String, stderr: String, exit_code: i32) -> Self {
        Self {
            stdout: Some(stdout),
            stderr: Some(stderr),
            exit_code: Some(exit_code),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Capture a finished process. A process killed by a signal has no exit
    /// code, so it is reported through `error` with its output kept.
    pub fn from_output(output: std::process::Output) -> Self {
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        match output.status.code() {
            Some(exit_code) => Self::completed(stdout, stderr, exit_code),
            None => Self {
                stdout: Some(stdout),
                stderr: Some(stderr),
                exit_code: None,
                error: Some(format!(
                    "process terminated abnormally ({})",
                    output.status
                )),
            },
        }
    }

    pub fn ok(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Turn a non-zero or failed result into an error, for output parsers
    /// that treat anything but success as fatal.
    pub fn check(self) -> Result<Self> {
        if self.ok() {
            return Ok(self);
        }
        if let Some(error) = self.error {
            return Err(RexecError::Server(error));
        }
        Err(RexecError::NonZeroExit {
            exit_code: self.exit_code,
            stderr: self.stderr.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    /// Waiting for a free worker slot.
    Queued,
    Running,
    Finished(CommandResult),
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Finished(_))
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Queued => write!(f, "queued"),
            JobState::Running => write!(f, "running"),
            JobState::Finished(_) => write!(f, "finished"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub args: Vec<String>,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(args: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            args,
            state: JobState::Queued,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_only_for_zero_exit() {
        assert!(CommandResult::completed("out".into(), String::new(), 0).ok());
        assert!(!CommandResult::completed(String::new(), "bad".into(), 2).ok());
        assert!(!CommandResult::failed("No such file or directory").ok());
    }

    #[test]
    fn check_surfaces_exit_code_and_spawn_error() {
        let err = CommandResult::completed(String::new(), "boom".into(), 3)
            .check()
            .unwrap_err();
        assert!(matches!(
            err,
            RexecError::NonZeroExit { exit_code: Some(3), ref stderr } if stderr == "boom"
        ));

        let err = CommandResult::failed("cannot spawn").check().unwrap_err();
        assert!(matches!(err, RexecError::Server(_)));
    }

    #[test]
    fn wire_name_is_returncode() {
        let json = serde_json::to_value(CommandResult::completed("hi".into(), "".into(), 0)).unwrap();
        assert_eq!(json["returncode"], 0);
        assert_eq!(json["stdout"], "hi");
        assert!(json["error"].is_null());

        let parsed: CommandResult =
            serde_json::from_str(r#"{"stdout":"x","exit_code":1}"#).unwrap();
        assert_eq!(parsed.exit_code, Some(1));
        assert!(parsed.stderr.is_none());
    }

    #[test]
    fn new_job_starts_queued() {
        let job = Job::new(vec!["echo".into(), "hello".into()]);
        assert_eq!(job.state, JobState::Queued);
        assert!(!job.state.is_terminal());
        assert!(job.started_at.is_none());
        assert_eq!(job.args, vec!["echo", "hello"]);
    }
}
