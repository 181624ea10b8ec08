use rexec_lite::scheduler::job::{CommandResult, Job, JobState};
use rexec_lite::scheduler::queue::{JobPoll, JobQueue};
use uuid::Uuid;

fn job(args: &[&str]) -> Job {
    Job::new(args.iter().map(|s| s.to_string()).collect())
}

#[test]
fn test_job_creation() {
    let job = job(&["echo", "hello"]);
    assert_eq!(job.state, JobState::Queued);
    assert_eq!(job.args, ["echo", "hello"]);
    assert!(job.started_at.is_none());
    assert!(job.completed_at.is_none());
}

#[test]
fn test_job_lifecycle() {
    let mut queue = JobQueue::new();
    let job = job(&["echo", "1"]);
    let id = job.id;
    queue.add_job(job);

    assert!(queue.is_running(&id));
    assert_eq!(queue.executing(), 0);

    assert!(queue.mark_running(&id));
    assert!(!queue.mark_running(&id));
    assert_eq!(queue.executing(), 1);
    assert!(queue.get_job(&id).unwrap().started_at.is_some());

    let result = CommandResult::completed("1\n".into(), String::new(), 0);
    assert!(queue.complete(&id, result.clone()));
    assert!(!queue.is_running(&id));
    assert_eq!(queue.executing(), 0);

    // Terminal exactly once.
    assert!(!queue.complete(&id, CommandResult::failed("late")));
    assert_eq!(
        queue.get_job(&id).unwrap().state,
        JobState::Finished(result)
    );
}

#[test]
fn test_take_if_finished_evicts_once() {
    let mut queue = JobQueue::new();
    let job = job(&["true"]);
    let id = job.id;
    queue.add_job(job);

    assert_eq!(queue.take_if_finished(&id), Some(JobPoll::Running));
    assert_eq!(queue.len(), 1);

    queue.complete(&id, CommandResult::completed(String::new(), String::new(), 0));
    assert!(matches!(queue.take_if_finished(&id), Some(JobPoll::Done(_))));
    assert_eq!(queue.take_if_finished(&id), None);
    assert!(queue.is_empty());
}

#[test]
fn test_unknown_job() {
    let mut queue = JobQueue::new();
    let id = Uuid::new_v4();

    assert!(!queue.is_running(&id));
    assert!(!queue.mark_running(&id));
    assert!(!queue.complete(&id, CommandResult::failed("x")));
    assert_eq!(queue.take_if_finished(&id), None);
}

#[test]
fn test_snapshot_partitions_in_submission_order() {
    let mut queue = JobQueue::new();
    let first = job(&["a"]);
    let mut second = job(&["b"]);
    let mut third = job(&["c"]);
    second.created_at = first.created_at + chrono::Duration::milliseconds(1);
    third.created_at = first.created_at + chrono::Duration::milliseconds(2);
    let (id1, id2, id3) = (first.id, second.id, third.id);

    queue.add_job(third);
    queue.add_job(first);
    queue.add_job(second);

    queue.complete(&id2, CommandResult::failed("boom"));
    queue.mark_running(&id3);

    let snapshot = queue.snapshot();
    assert_eq!(snapshot.running, vec![id1, id3]);
    assert_eq!(snapshot.finished, vec![id2]);
    assert_eq!(queue.len(), 3);
}
