use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::auth::AuthGate;
use crate::config::ServerConfig;
use crate::error::{ErrorKind, Result, RexecError, RpcError};
use crate::rpc::protocol::{
    DeleteReceipt, FileListing, FilePayload, JobList, JobResult, JobSubmission, Procedure,
    RpcReply, RpcRequest, HEALTH_PATH, RPC_PATH,
};
use crate::scheduler::{JobPoll, JobTable};
use crate::store::FileStore;
use crate::worker::JobExecutor;

/// Slack on top of the base64-inflated file limit for the JSON envelope.
const ENVELOPE_OVERHEAD: usize = 64 * 1024;

/// Binds the auth gate, job table and file store to the RPC procedures.
#[derive(Debug, Clone)]
pub struct RpcServer {
    listen_addr: SocketAddr,
    gate: Arc<AuthGate>,
    jobs: JobTable,
    files: Arc<FileStore>,
}

impl RpcServer {
    pub fn new(config: &ServerConfig) -> Result<Self> {
        config.validate()?;
        let files = FileStore::open(&config.transfer_dir, config.max_file_size).map_err(|e| {
            RexecError::Config(format!(
                "cannot open transfer directory {}: {}",
                config.transfer_dir.display(),
                e
            ))
        })?;

        Ok(Self {
            listen_addr: config.listen_addr,
            gate: Arc::new(AuthGate::new(config.token.clone())),
            jobs: JobTable::new(config.max_workers, JobExecutor::new()),
            files: Arc::new(files),
        })
    }

    pub fn jobs(&self) -> &JobTable {
        &self.jobs
    }

    pub fn files(&self) -> &FileStore {
        &self.files
    }

    pub fn router(&self) -> Router {
        let body_limit = (self.files.max_file_size() as usize)
            .saturating_mul(4)
            .div_ceil(3)
            .saturating_add(ENVELOPE_OVERHEAD);

        Router::new()
            .route(RPC_PATH, post(rpc_handler))
            .route(HEALTH_PATH, get(health_check))
            .layer(DefaultBodyLimit::max(body_limit))
            .layer(TraceLayer::new_for_http())
            .with_state(self.clone())
    }

    /// Authenticate and dispatch one request. Never fails: every error is
    /// folded into the reply.
    pub async fn handle(&self, request: RpcRequest) -> RpcReply<Value> {
        let method = request.call.name();
        if let Err(e) = self.gate.check(request.token.as_deref()) {
            tracing::warn!(method, "Rejected unauthenticated call");
            return RpcReply::Failure { error: e };
        }

        let reply = self.dispatch(request.call).await;
        if let Err(ref e) = reply {
            tracing::debug!(method, kind = %e.kind, error = %e.message, "Call failed");
        }
        reply.into()
    }

    async fn dispatch(&self, call: Procedure) -> std::result::Result<Value, RpcError> {
        match call {
            Procedure::Run { args } => {
                if args.is_empty() || args[0].trim().is_empty() {
                    return Err(RpcError::invalid_request("Command cannot be empty"));
                }
                let job_id = self.jobs.submit(args).await;
                to_value(JobSubmission {
                    job_id: Some(job_id.to_string()),
                })
            }
            Procedure::Result { job_id } => match self.jobs.result(&job_id).await {
                Ok(JobPoll::Running) => to_value(JobResult::Running { job_id }),
                Ok(JobPoll::Done(result)) => to_value(JobResult::Done { job_id, result }),
                Err(_) => Err(RpcError::unknown_job(&job_id)),
            },
            Procedure::IsRunning { job_id } => to_value(self.jobs.is_running(&job_id).await),
            Procedure::Jobs => to_value(JobList::from(self.jobs.list().await)),
            Procedure::UploadFile {
                filename,
                data_base64,
                overwrite,
            } => {
                let data = BASE64
                    .decode(data_base64.as_bytes())
                    .map_err(|e| RpcError::invalid_request(format!("Invalid base64 payload: {}", e)))?;
                to_value(self.files.upload(&filename, &data, overwrite).await?)
            }
            Procedure::DownloadFile { filename } => {
                let data = self.files.download(&filename).await?;
                to_value(FilePayload {
                    filename,
                    size: data.len() as u64,
                    data_base64: BASE64.encode(&data),
                })
            }
            Procedure::ListFiles => {
                let files = self.files.list().await?;
                to_value(FileListing {
                    count: files.len(),
                    files,
                })
            }
            Procedure::DeleteFile { filename } => {
                let filename = self.files.delete(&filename).await?;
                to_value(DeleteReceipt { filename })
            }
            Procedure::DeleteAllFiles => to_value(self.files.delete_all().await?),
        }
    }

    /// Serve on an already-bound listener until `shutdown` is cancelled.
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        let local_addr = listener.local_addr()?;
        tracing::info!(
            addr = %local_addr,
            max_workers = self.jobs.max_workers(),
            transfer_dir = %self.files.root().display(),
            "Starting RPC server"
        );

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        tracing::info!("RPC server stopped");
        Ok(())
    }

    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let listener = TcpListener::bind(self.listen_addr).await?;
        self.serve(listener, shutdown).await
    }
}

fn to_value<T: Serialize>(value: T) -> std::result::Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::internal(e.to_string()))
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Authentication => StatusCode::UNAUTHORIZED,
        ErrorKind::UnknownJob | ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::AlreadyExists => StatusCode::CONFLICT,
        ErrorKind::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        ErrorKind::InvalidName | ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for RpcReply<Value> {
    fn into_response(self) -> Response {
        let status = match &self {
            RpcReply::Success { .. } => StatusCode::OK,
            RpcReply::Failure { error } => status_for(error.kind),
        };
        (status, Json(self)).into_response()
    }
}

async fn rpc_handler(
    State(server): State<RpcServer>,
    body: std::result::Result<Bytes, BytesRejection>,
) -> RpcReply<Value> {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            tracing::warn!(error = %rejection.body_text(), "Rejected request body");
            let error = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                RpcError::new(
                    ErrorKind::TooLarge,
                    format!(
                        "Request too large. Maximum file size: {} bytes",
                        server.files.max_file_size()
                    ),
                )
            } else {
                RpcError::invalid_request(rejection.body_text())
            };
            return RpcReply::Failure { error };
        }
    };

    match serde_json::from_slice::<RpcRequest>(&body) {
        Ok(request) => server.handle(request).await,
        Err(e) => RpcReply::Failure {
            error: RpcError::invalid_request(format!("Malformed request: {}", e)),
        },
    }
}

async fn health_check() -> &'static str {
    "ok"
}
