//! Test harness for server/client integration tests.
//!
//! Spawns an `RpcServer` on an ephemeral port with a temporary transfer
//! directory and hands back a client pointed at it.

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use rexec_lite::auth::AuthToken;
use rexec_lite::config::{ClientConfig, ServerConfig};
use rexec_lite::rpc::{RpcClient, RpcServer};

pub const TEST_TOKEN: &str = "test-secret-token";

/// Server configuration with a fixed token and a fresh sandbox.
pub fn test_server_config(dir: &TempDir) -> ServerConfig {
    ServerConfig::new(
        "127.0.0.1:0".parse().unwrap(),
        dir.path().join("transfer"),
    )
    .with_token(AuthToken::new(TEST_TOKEN))
}

/// Client settings with short polling so tests stay fast.
pub fn test_client_config(url: &str, token: &str) -> ClientConfig {
    ClientConfig::new(url, AuthToken::new(token))
        .with_poll_interval(Duration::from_millis(50))
        .with_timeout(Duration::from_secs(10))
}

/// Handle to a running test server
pub struct TestServer {
    pub url: String,
    pub server: RpcServer,
    pub dir: TempDir,
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(|config| config).await
    }

    /// Start with a customised configuration.
    pub async fn start_with<F>(customise: F) -> Self
    where
        F: FnOnce(ServerConfig) -> ServerConfig,
    {
        let dir = tempfile::tempdir().unwrap();
        let config = customise(test_server_config(&dir));
        let server = RpcServer::new(&config).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let shutdown = CancellationToken::new();

        let serving = server.clone();
        let token = shutdown.clone();
        let handle = tokio::spawn(async move {
            serving.serve(listener, token).await.unwrap();
        });

        Self {
            url,
            server,
            dir,
            shutdown,
            handle,
        }
    }

    pub fn client(&self) -> RpcClient {
        self.client_with_token(TEST_TOKEN)
    }

    pub fn client_with_token(&self, token: &str) -> RpcClient {
        RpcClient::new(test_client_config(&self.url, token)).unwrap()
    }

    pub fn shared_client(&self) -> Arc<RpcClient> {
        Arc::new(self.client())
    }

    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        let _ = (&mut self.handle).await;
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Wait for a condition to become true with timeout
pub async fn wait_for<F, Fut>(
    condition: F,
    timeout_duration: Duration,
    poll_interval: Duration,
) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = tokio::time::Instant::now();
    while start.elapsed() < timeout_duration {
        if condition().await {
            return true;
        }
        tokio::time::sleep(poll_interval).await;
    }
    false
}

/// Assert a condition eventually becomes true
pub async fn assert_eventually<F, Fut>(condition: F, timeout_duration: Duration, message: &str)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let result = wait_for(condition, timeout_duration, Duration::from_millis(20)).await;
    assert!(result, "{}", message);
}
