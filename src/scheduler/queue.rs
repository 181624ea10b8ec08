use std::collections::HashMap;

use chrono::Utc;
use uuid::Uuid;

use crate::scheduler::job::{CommandResult, Job, JobState};

/// Snapshot of the table partitioned by terminal state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobSnapshot {
    pub running: Vec<Uuid>,
    pub finished: Vec<Uuid>,
}

/// Non-blocking view of a job returned by [`JobQueue::take_if_finished`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobPoll {
    Running,
    Done(CommandResult),
}

/// Registry of jobs by handle. Callers serialize access through one lock.
#[derive(Debug, Default)]
pub struct JobQueue {
    jobs: HashMap<Uuid, Job>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_job(&mut self, job: Job) {
        self.jobs.insert(job.id, job);
    }

    pub fn get_job(&self, id: &Uuid) -> Option<&Job> {
        self.jobs.get(id)
    }

    /// Move a queued job into the running state once it holds a worker slot.
    pub fn mark_running(&mut self, id: &Uuid) -> bool {
        match self.jobs.get_mut(id) {
            Some(job) if job.state == JobState::Queued => {
                job.state = JobState::Running;
                job.started_at = Some(Utc::now());
                true
            }
            _ => false,
        }
    }

    /// Record the terminal result. A job becomes terminal at most once.
    pub fn complete(&mut self, id: &Uuid, result: CommandResult) -> bool {
        match self.jobs.get_mut(id) {
            Some(job) if !job.state.is_terminal() => {
                job.state = JobState::Finished(result);
                job.completed_at = Some(Utc::now());
                true
            }
            _ => false,
        }
    }

    /// Report a job's progress, evicting it if it has finished.
    pub fn take_if_finished(&mut self, id: &Uuid) -> Option<JobPoll> {
        if !self.jobs.get(id)?.state.is_terminal() {
            return Some(JobPoll::Running);
        }
        match self.jobs.remove(id)?.state {
            JobState::Finished(result) => Some(JobPoll::Done(result)),
            _ => None,
        }
    }

    pub fn is_running(&self, id: &Uuid) -> bool {
        self.jobs
            .get(id)
            .is_some_and(|job| !job.state.is_terminal())
    }

    pub fn snapshot(&self) -> JobSnapshot {
        let mut jobs: Vec<&Job> = self.jobs.values().collect();
        jobs.sort_by_key(|j| j.created_at);

        let (finished, running): (Vec<&Job>, Vec<&Job>) =
            jobs.into_iter().partition(|j| j.state.is_terminal());
        JobSnapshot {
            running: running.into_iter().map(|j| j.id).collect(),
            finished: finished.into_iter().map(|j| j.id).collect(),
        }
    }

    /// Number of jobs currently holding a worker slot.
    pub fn executing(&self) -> usize {
        self.jobs
            .values()
            .filter(|j| j.state == JobState::Running)
            .count()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
