pub mod client;
pub mod protocol;
pub mod server;

pub use client::RpcClient;
pub use protocol::{JobList, JobResult, JobSubmission, Procedure, RpcReply, RpcRequest};
pub use server::RpcServer;
