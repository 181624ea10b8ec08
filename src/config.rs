use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::auth::AuthToken;
use crate::error::{Result, RexecError};

/// 5 MiB, shared by server and client unless overridden.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 5 * 1024 * 1024;
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// YAML section holding server settings in a shared config document.
pub const SERVER_SECTION: &str = "rpc_server";

fn default_transfer_dir() -> PathBuf {
    std::env::var_os("TEMP")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("temp"))
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// Number of commands allowed to execute at the same time.
    pub max_workers: usize,
    /// Upper bound in bytes for uploaded and downloaded files.
    pub max_file_size: u64,
    /// Root of the file-transfer sandbox.
    pub transfer_dir: PathBuf,
    pub token: AuthToken,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            max_workers: DEFAULT_MAX_WORKERS,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            transfer_dir: default_transfer_dir(),
            token: AuthToken::generate(),
        }
    }
}

impl ServerConfig {
    pub fn new(listen_addr: SocketAddr, transfer_dir: impl Into<PathBuf>) -> Self {
        Self {
            listen_addr,
            transfer_dir: transfer_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_token(mut self, token: AuthToken) -> Self {
        self.token = token;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_max_file_size(mut self, max_file_size: u64) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    /// Parse the `rpc_server` section of a YAML document on top of the defaults.
    /// A document without the section yields the defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let doc: ConfigDocument = serde_yaml::from_str(yaml)
            .map_err(|e| RexecError::Config(format!("invalid YAML: {}", e)))?;
        let config = doc.rpc_server.unwrap_or_default().apply(Self::default());
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            RexecError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&yaml)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(RexecError::Config("max_workers must be at least 1".into()));
        }
        if self.max_file_size == 0 {
            return Err(RexecError::Config("max_file_size must be positive".into()));
        }
        if self.token.is_empty() {
            return Err(RexecError::Config("token must not be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigDocument {
    #[serde(default)]
    rpc_server: Option<ServerSection>,
}

/// On-disk form of [`ServerConfig`]; every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ServerSection {
    address: Option<IpAddr>,
    port: Option<u16>,
    max_workers: Option<usize>,
    max_file_size: Option<u64>,
    file_transfer_dir: Option<PathBuf>,
    token: Option<String>,
}

impl ServerSection {
    fn apply(self, mut base: ServerConfig) -> ServerConfig {
        if let Some(address) = self.address {
            base.listen_addr.set_ip(address);
        }
        if let Some(port) = self.port {
            base.listen_addr.set_port(port);
        }
        if let Some(max_workers) = self.max_workers {
            base.max_workers = max_workers;
        }
        if let Some(max_file_size) = self.max_file_size {
            base.max_file_size = max_file_size;
        }
        if let Some(dir) = self.file_transfer_dir {
            base.transfer_dir = dir;
        }
        if let Some(token) = self.token {
            base.token = AuthToken::new(token);
        }
        base
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the server, e.g. `http://127.0.0.1:8000`.
    pub server_url: String,
    pub token: AuthToken,
    /// Default deadline for `wait_for_result` and `run_command`.
    pub timeout: Duration,
    pub poll_interval: Duration,
    /// Local ceiling checked before an upload is transmitted.
    pub max_file_size: u64,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(server_url: impl Into<String>, token: AuthToken) -> Self {
        Self {
            server_url: server_url.into(),
            token,
            timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_max_file_size(mut self, max_file_size: u64) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.server_url.starts_with("http://") || self.server_url.starts_with("https://")) {
            return Err(RexecError::Config(format!(
                "server_url must start with http:// or https://, got {}",
                self.server_url
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(RexecError::Config("poll_interval must be positive".into()));
        }
        Ok(())
    }
}
