//! Process execution for submitted jobs.
//!
//! [`JobExecutor`] runs one argument vector via `tokio::process` and turns
//! the outcome into a [`CommandResult`](crate::scheduler::CommandResult).
//! Scheduling and the worker-slot bound live in
//! [`JobTable`](crate::scheduler::JobTable).

pub mod executor;

pub use executor::JobExecutor;
