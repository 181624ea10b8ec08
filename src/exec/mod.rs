//! Command abstraction and the executors that run it.
//!
//! A [`Command`] does not know where it runs. [`LocalExecutor`] and
//! [`AsyncLocalExecutor`] spawn it on this machine, [`RemoteExecutor`]
//! submits it to a server and polls for the result.

use async_trait::async_trait;

use crate::error::Result;
use crate::scheduler::CommandResult;

pub mod command;
pub mod local;
pub mod remote;

pub use command::{stdout_parser, Command, CommandLine};
pub use local::{AsyncLocalExecutor, LocalExecutor};
pub use remote::RemoteExecutor;

/// Runs a command line to completion, blocking the calling thread.
pub trait Executor {
    fn run(&self, line: &CommandLine) -> Result<CommandResult>;
}

/// Runs a command line to completion without blocking the runtime.
#[async_trait]
pub trait AsyncExecutor: Send + Sync {
    async fn run_async(&self, line: &CommandLine) -> Result<CommandResult>;
}
