//! Wire types shared by [`RpcServer`](super::RpcServer) and
//! [`RpcClient`](super::RpcClient).
//!
//! A request is a JSON envelope posted to `/rpc`:
//!
//! ```json
//! {"token": "...", "call": {"method": "run", "params": {"args": ["echo", "hi"]}}}
//! ```
//!
//! and every reply is tagged with `outcome`, so a domain error can never be
//! mistaken for a successful payload.

use serde::{Deserialize, Serialize};

use crate::error::RpcError;
use crate::scheduler::{CommandResult, JobSnapshot};
use crate::store::FileRecord;

pub use crate::store::{BulkDeleteReceipt, UploadReceipt};

pub const RPC_PATH: &str = "/rpc";
pub const HEALTH_PATH: &str = "/health";

fn default_overwrite() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub token: Option<String>,
    pub call: Procedure,
}

/// Every procedure exposed by the server, with its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum Procedure {
    Run {
        args: Vec<String>,
    },
    Result {
        job_id: String,
    },
    IsRunning {
        job_id: String,
    },
    Jobs,
    UploadFile {
        filename: String,
        data_base64: String,
        #[serde(default = "default_overwrite")]
        overwrite: bool,
    },
    DownloadFile {
        filename: String,
    },
    ListFiles,
    DeleteFile {
        filename: String,
    },
    DeleteAllFiles,
}

impl Procedure {
    pub fn name(&self) -> &'static str {
        match self {
            Procedure::Run { .. } => "run",
            Procedure::Result { .. } => "result",
            Procedure::IsRunning { .. } => "is_running",
            Procedure::Jobs => "jobs",
            Procedure::UploadFile { .. } => "upload_file",
            Procedure::DownloadFile { .. } => "download_file",
            Procedure::ListFiles => "list_files",
            Procedure::DeleteFile { .. } => "delete_file",
            Procedure::DeleteAllFiles => "delete_all_files",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RpcReply<T> {
    Success { value: T },
    Failure { error: RpcError },
}

impl<T> RpcReply<T> {
    pub fn into_result(self) -> Result<T, RpcError> {
        match self {
            RpcReply::Success { value } => Ok(value),
            RpcReply::Failure { error } => Err(error),
        }
    }
}

impl<T> From<Result<T, RpcError>> for RpcReply<T> {
    fn from(result: Result<T, RpcError>) -> Self {
        match result {
            Ok(value) => RpcReply::Success { value },
            Err(error) => RpcReply::Failure { error },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSubmission {
    #[serde(default)]
    pub job_id: Option<String>,
}

/// Status of a job as seen by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobResult {
    Running {
        job_id: String,
    },
    Done {
        job_id: String,
        result: CommandResult,
    },
}

impl JobResult {
    pub fn job_id(&self) -> &str {
        match self {
            JobResult::Running { job_id } | JobResult::Done { job_id, .. } => job_id,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, JobResult::Done { .. })
    }

    pub fn into_command_result(self) -> Option<CommandResult> {
        match self {
            JobResult::Done { result, .. } => Some(result),
            JobResult::Running { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobList {
    pub running: Vec<String>,
    pub finished: Vec<String>,
}

impl From<JobSnapshot> for JobList {
    fn from(snapshot: JobSnapshot) -> Self {
        Self {
            running: snapshot.running.iter().map(|id| id.to_string()).collect(),
            finished: snapshot.finished.iter().map(|id| id.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePayload {
    pub filename: String,
    pub size: u64,
    pub data_base64: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileListing {
    pub files: Vec<FileRecord>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReceipt {
    pub filename: String,
}
