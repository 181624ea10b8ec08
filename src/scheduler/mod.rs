pub mod job;
pub mod queue;
pub mod table;

pub use job::{CommandResult, Job, JobState};
pub use queue::{JobPoll, JobQueue, JobSnapshot};
pub use table::JobTable;
