use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use tokio::time::Instant;

use crate::config::ClientConfig;
use crate::error::{ErrorKind, Result, RexecError};
use crate::rpc::protocol::{
    BulkDeleteReceipt, DeleteReceipt, FileListing, FilePayload, JobList, JobResult,
    JobSubmission, Procedure, RpcReply, RpcRequest, UploadReceipt, RPC_PATH,
};
use crate::store::FileRecord;

/// Typed caller-side wrapper over the server's procedures.
///
/// Every structured failure returned by the server is converted into a
/// [`RexecError`] carrying the server's message.
#[derive(Debug, Clone)]
pub struct RpcClient {
    config: ClientConfig,
    endpoint: String,
    http: reqwest::Client,
}

impl RpcClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let endpoint = format!("{}{}", config.server_url.trim_end_matches('/'), RPC_PATH);

        tracing::info!(server_url = %config.server_url, "RPC client initialized");
        Ok(Self {
            config,
            endpoint,
            http,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn call<T: DeserializeOwned>(&self, call: Procedure) -> Result<T> {
        let method = call.name();
        let request = RpcRequest {
            token: Some(self.config.token.expose().to_string()),
            call,
        };

        let response = self.http.post(&self.endpoint).json(&request).send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        let reply: RpcReply<T> = serde_json::from_slice(&body).map_err(|e| {
            tracing::debug!(method, %status, error = %e, "Undecodable reply");
            RexecError::Server(format!("unexpected reply to {} (HTTP {}): {}", method, status, e))
        })?;

        Ok(reply.into_result()?)
    }

    /// Submit a command and return the raw submission reply.
    pub async fn submit(&self, args: &[String]) -> Result<JobSubmission> {
        self.call(Procedure::Run {
            args: args.to_vec(),
        })
        .await
    }

    /// Submit a command for background execution and return its job handle.
    pub async fn submit_command(&self, args: &[String]) -> Result<String> {
        let job_id = self
            .submit(args)
            .await?
            .job_id
            .ok_or(RexecError::SubmissionFailed)?;
        tracing::info!(job_id = %job_id, args = ?args, "Submitted command");
        Ok(job_id)
    }

    pub async fn get_result(&self, job_id: &str) -> Result<JobResult> {
        self.call(Procedure::Result {
            job_id: job_id.to_string(),
        })
        .await
    }

    /// Poll until the job is done. Fails with [`RexecError::Timeout`] when the
    /// deadline passes first; the remote job keeps running and stays fetchable.
    pub async fn wait_for_result(
        &self,
        job_id: &str,
        timeout: Option<Duration>,
    ) -> Result<JobResult> {
        let timeout = timeout.unwrap_or(self.config.timeout);
        let deadline = Instant::now() + timeout;

        loop {
            let result = self.get_result(job_id).await?;
            if result.is_done() {
                return Ok(result);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(RexecError::Timeout {
                    job_id: job_id.to_string(),
                    timeout,
                });
            }
            tokio::time::sleep(self.config.poll_interval.min(deadline - now)).await;
        }
    }

    /// Submit a command and wait for it to finish.
    pub async fn run_command(
        &self,
        args: &[String],
        timeout: Option<Duration>,
    ) -> Result<JobResult> {
        let job_id = self.submit_command(args).await?;
        self.wait_for_result(&job_id, timeout).await
    }

    pub async fn is_running(&self, job_id: &str) -> Result<bool> {
        self.call(Procedure::IsRunning {
            job_id: job_id.to_string(),
        })
        .await
    }

    pub async fn list_jobs(&self) -> Result<JobList> {
        self.call(Procedure::Jobs).await
    }

    /// Upload a local file. Existence and size are checked locally before
    /// anything is sent. The remote name defaults to the local file name.
    pub async fn upload_file(
        &self,
        local_path: impl AsRef<Path>,
        remote_name: Option<&str>,
        overwrite: bool,
    ) -> Result<UploadReceipt> {
        let local_path = local_path.as_ref();
        let metadata = match tokio::fs::metadata(local_path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RexecError::Validation {
                    kind: ErrorKind::NotFound,
                    message: format!("Local file not found: {}", local_path.display()),
                })
            }
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_file() {
            return Err(RexecError::Validation {
                kind: ErrorKind::NotFound,
                message: format!("Path is not a file: {}", local_path.display()),
            });
        }
        if metadata.len() > self.config.max_file_size {
            return Err(RexecError::Validation {
                kind: ErrorKind::TooLarge,
                message: format!(
                    "File too large: {} bytes. Maximum: {} bytes",
                    metadata.len(),
                    self.config.max_file_size
                ),
            });
        }

        let filename = match remote_name {
            Some(name) => name.to_string(),
            None => local_path
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string)
                .ok_or_else(|| RexecError::Validation {
                    kind: ErrorKind::InvalidName,
                    message: format!("Cannot derive a file name from {}", local_path.display()),
                })?,
        };

        let data = tokio::fs::read(local_path).await?;
        tracing::info!(
            local = %local_path.display(),
            filename = %filename,
            size = data.len(),
            "Uploading file"
        );

        self.call(Procedure::UploadFile {
            filename,
            data_base64: BASE64.encode(&data),
            overwrite,
        })
        .await
    }

    /// Download a remote file, creating parent directories as needed.
    /// Defaults to the remote name relative to the working directory.
    pub async fn download_file(
        &self,
        remote_name: &str,
        local_path: Option<&Path>,
    ) -> Result<PathBuf> {
        let local_path = local_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(remote_name));

        let payload: FilePayload = self
            .call(Procedure::DownloadFile {
                filename: remote_name.to_string(),
            })
            .await?;
        let data = BASE64.decode(payload.data_base64.as_bytes())?;

        if let Some(parent) = local_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&local_path, &data).await?;

        tracing::info!(
            filename = remote_name,
            local = %local_path.display(),
            size = data.len(),
            "Downloaded file"
        );
        Ok(local_path)
    }

    pub async fn list_files(&self) -> Result<Vec<FileRecord>> {
        let listing: FileListing = self.call(Procedure::ListFiles).await?;
        Ok(listing.files)
    }

    pub async fn delete_file(&self, remote_name: &str) -> Result<DeleteReceipt> {
        let receipt = self
            .call(Procedure::DeleteFile {
                filename: remote_name.to_string(),
            })
            .await?;
        tracing::info!(filename = remote_name, "Deleted remote file");
        Ok(receipt)
    }

    pub async fn delete_all_files(&self) -> Result<BulkDeleteReceipt> {
        let receipt: BulkDeleteReceipt = self.call(Procedure::DeleteAllFiles).await?;
        tracing::info!(deleted = receipt.deleted_count, "Deleted all remote files");
        Ok(receipt)
    }

    /// Cheap connectivity and authentication probe. Never fails.
    pub async fn ping(&self) -> bool {
        match self.list_jobs().await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Server ping failed");
                false
            }
        }
    }
}
