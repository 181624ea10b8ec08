use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable failure category carried in every RPC failure reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Authentication,
    UnknownJob,
    InvalidName,
    TooLarge,
    AlreadyExists,
    NotFound,
    InvalidRequest,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Authentication => "authentication",
            ErrorKind::UnknownJob => "unknown_job",
            ErrorKind::InvalidName => "invalid_name",
            ErrorKind::TooLarge => "too_large",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// Structured error payload returned by the server instead of raising.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind}: {message}")]
pub struct RpcError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

impl RpcError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            job_id: None,
        }
    }

    pub fn unauthenticated() -> Self {
        Self::new(ErrorKind::Authentication, "Invalid or expired token")
    }

    pub fn unknown_job(job_id: &str) -> Self {
        Self {
            kind: ErrorKind::UnknownJob,
            message: "Invalid job_id".to_string(),
            job_id: Some(job_id.to_string()),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

#[derive(Error, Debug)]
pub enum RexecError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Unknown job: {0}")]
    UnknownJob(String),

    #[error("{kind}: {message}")]
    Validation { kind: ErrorKind, message: String },

    #[error("Server error: {0}")]
    Server(String),

    #[error("Job {job_id} did not complete within {timeout:?}")]
    Timeout { job_id: String, timeout: Duration },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Job submission failed: no job id returned")]
    SubmissionFailed,

    #[error("Command has not been executed yet")]
    NotExecuted,

    #[error("Failed to start `{program}`: {message}")]
    Spawn { program: String, message: String },

    #[error("Command `{program}` timed out after {timeout:?}")]
    CommandTimeout { program: String, timeout: Duration },

    #[error("Command exited with code {exit_code:?}: {stderr}")]
    NonZeroExit {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Failed to parse command output: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid base64 payload: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Malformed payload: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<RpcError> for RexecError {
    fn from(err: RpcError) -> Self {
        match err.kind {
            ErrorKind::Authentication => RexecError::Authentication(err.message),
            ErrorKind::UnknownJob => {
                RexecError::UnknownJob(err.job_id.unwrap_or(err.message))
            }
            ErrorKind::Internal => RexecError::Server(err.message),
            kind => RexecError::Validation {
                kind,
                message: err.message,
            },
        }
    }
}

impl RexecError {
    /// Wire category for errors that originated on the server.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            RexecError::Authentication(_) => Some(ErrorKind::Authentication),
            RexecError::UnknownJob(_) => Some(ErrorKind::UnknownJob),
            RexecError::Validation { kind, .. } => Some(*kind),
            RexecError::Server(_) => Some(ErrorKind::Internal),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, RexecError>;
