use std::sync::Arc;

use tokio::sync::{RwLock, Semaphore};
use uuid::Uuid;

use crate::error::{Result, RexecError};
use crate::scheduler::job::{CommandResult, Job};
use crate::scheduler::queue::{JobPoll, JobQueue, JobSnapshot};
use crate::worker::JobExecutor;

/// Concurrency-safe job registry backed by a bounded worker pool.
///
/// All reads and writes of the underlying [`JobQueue`] go through a single
/// `RwLock`. At most `max_workers` jobs execute at once; further
/// submissions stay queued until a slot frees up.
#[derive(Debug, Clone)]
pub struct JobTable {
    queue: Arc<RwLock<JobQueue>>,
    slots: Arc<Semaphore>,
    executor: JobExecutor,
    max_workers: usize,
}

impl JobTable {
    pub fn new(max_workers: usize, executor: JobExecutor) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            queue: Arc::new(RwLock::new(JobQueue::new())),
            slots: Arc::new(Semaphore::new(max_workers)),
            executor,
            max_workers,
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Register `args` as a new job and schedule it. Returns without waiting
    /// for the command to start or finish.
    pub async fn submit(&self, args: Vec<String>) -> Uuid {
        let job = Job::new(args.clone());
        let job_id = job.id;
        self.queue.write().await.add_job(job);

        tracing::info!(job_id = %job_id, args = ?args, "Submitted job");

        let queue = self.queue.clone();
        let slots = self.slots.clone();
        let executor = self.executor.clone();
        tokio::spawn(async move {
            let _permit = match slots.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    queue
                        .write()
                        .await
                        .complete(&job_id, CommandResult::failed("worker pool is shut down"));
                    return;
                }
            };

            queue.write().await.mark_running(&job_id);
            let result = executor.execute(job_id, &args).await;
            queue.write().await.complete(&job_id, result);
            // The slot is released only after the result is visible.
        });

        job_id
    }

    /// Non-blocking status read. A finished job is evicted by this call, so
    /// its result can be observed exactly once.
    pub async fn result(&self, job_id: &str) -> Result<JobPoll> {
        let id = parse_handle(job_id)?;
        let poll = self
            .queue
            .write()
            .await
            .take_if_finished(&id)
            .ok_or_else(|| RexecError::UnknownJob(job_id.to_string()))?;

        if let JobPoll::Done(ref result) = poll {
            tracing::debug!(job_id = %id, exit_code = ?result.exit_code, "Job result fetched and evicted");
        }
        Ok(poll)
    }

    /// True while the job is queued or executing; false once terminal or unknown.
    pub async fn is_running(&self, job_id: &str) -> bool {
        match Uuid::parse_str(job_id) {
            Ok(id) => self.queue.read().await.is_running(&id),
            Err(_) => false,
        }
    }

    pub async fn list(&self) -> JobSnapshot {
        self.queue.read().await.snapshot()
    }

    /// Jobs currently holding a worker slot.
    pub async fn executing(&self) -> usize {
        self.queue.read().await.executing()
    }

    pub async fn len(&self) -> usize {
        self.queue.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.queue.read().await.is_empty()
    }
}

fn parse_handle(job_id: &str) -> Result<Uuid> {
    Uuid::parse_str(job_id).map_err(|_| RexecError::UnknownJob(job_id.to_string()))
}
