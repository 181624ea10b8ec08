pub mod auth;
pub mod config;
pub mod error;
pub mod exec;
pub mod rpc;
pub mod scheduler;
pub mod shutdown;
pub mod store;
pub mod worker;

pub use auth::{AuthGate, AuthToken};
pub use config::{ClientConfig, ServerConfig};
pub use error::{ErrorKind, Result, RexecError, RpcError};
pub use exec::{
    AsyncExecutor, AsyncLocalExecutor, Command, CommandLine, Executor, LocalExecutor,
    RemoteExecutor,
};
pub use rpc::{RpcClient, RpcServer};
pub use scheduler::CommandResult;
