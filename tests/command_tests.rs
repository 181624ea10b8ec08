mod test_harness;

use std::time::Duration;

use rexec_lite::error::RexecError;
use rexec_lite::exec::{
    stdout_parser, AsyncLocalExecutor, Command, CommandLine, Executor, LocalExecutor,
    RemoteExecutor,
};
use rexec_lite::scheduler::CommandResult;
use test_harness::TestServer;

fn word_count(output: &CommandResult) -> rexec_lite::Result<usize> {
    let stdout = stdout_parser(output)?;
    stdout
        .parse()
        .map_err(|e| RexecError::Parse(format!("{}: {:?}", e, stdout)))
}

// =============================================================================
// Local executors
// =============================================================================

#[test]
fn test_local_identity_command() {
    let mut command = Command::new(CommandLine::new("echo").with_arg("hello"));

    let result = command.execute(&LocalExecutor::new()).unwrap();
    assert_eq!(result.stdout.as_deref(), Some("hello\n"));
    assert_eq!(result.exit_code, Some(0));

    // The last result stays readable.
    assert!(command.result().unwrap().ok());
    assert!(command.output().is_some());
}

#[test]
fn test_local_parser_output() {
    let mut command = Command::with_parser(CommandLine::shell("echo one two three | wc -w"), word_count);

    assert_eq!(*command.execute(&LocalExecutor::new()).unwrap(), 3);
    assert_eq!(*command.result().unwrap(), 3);
}

#[test]
fn test_local_non_zero_exit_is_a_result() {
    let result = LocalExecutor::new()
        .run(&CommandLine::shell("echo bad >&2; exit 4"))
        .unwrap();

    assert_eq!(result.exit_code, Some(4));
    assert_eq!(result.stderr.as_deref(), Some("bad\n"));
    assert!(matches!(
        result.check(),
        Err(RexecError::NonZeroExit { exit_code: Some(4), .. })
    ));
}

#[test]
fn test_parser_failure_leaves_no_result() {
    let mut command = Command::with_parser(CommandLine::shell("exit 1"), stdout_parser);

    let err = command.execute(&LocalExecutor::new()).unwrap_err();
    assert!(matches!(err, RexecError::NonZeroExit { .. }));
    assert!(matches!(command.result(), Err(RexecError::NotExecuted)));
    assert_eq!(command.output().unwrap().exit_code, Some(1));
}

#[test]
fn test_local_timeout_kills_process() {
    let executor = LocalExecutor::new().timeout(Duration::from_millis(200));
    let started = std::time::Instant::now();

    let err = executor.run(&CommandLine::new("sleep").with_arg("10")).unwrap_err();

    assert!(matches!(err, RexecError::CommandTimeout { ref program, .. } if program == "sleep"));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_local_timeout_collects_output_when_in_time() {
    let executor = LocalExecutor::new().timeout(Duration::from_secs(10));

    let result = executor.run(&CommandLine::new("seq").with_args(["1", "500"])).unwrap();
    assert_eq!(result.stdout.unwrap().lines().count(), 500);
}

#[tokio::test]
async fn test_async_local_executor() {
    let executor = AsyncLocalExecutor::new().env("GREETING", "hi there");
    let mut command = Command::with_parser(CommandLine::shell("echo \"$GREETING\""), stdout_parser);

    let stdout = command.execute_async(&executor).await.unwrap();
    assert_eq!(stdout, "hi there");
}

#[tokio::test]
async fn test_async_local_timeout_and_spawn_error() {
    let executor = AsyncLocalExecutor::new().timeout(Duration::from_millis(200));

    let mut slow = Command::new(CommandLine::new("sleep").with_arg("10"));
    let err = slow.execute_async(&executor).await.unwrap_err();
    assert!(matches!(err, RexecError::CommandTimeout { .. }));

    let mut missing = Command::new(CommandLine::new("nonexistent_command_12345"));
    let err = missing.execute_async(&executor).await.unwrap_err();
    assert!(matches!(err, RexecError::Spawn { .. }));
    assert!(matches!(missing.result(), Err(RexecError::NotExecuted)));
}

// =============================================================================
// Remote executor
// =============================================================================

#[tokio::test]
async fn test_remote_async_with_monitor() {
    let server = TestServer::start().await;
    let executor = RemoteExecutor::new(server.shared_client());
    assert!(executor.monitor());

    let mut command = Command::new(CommandLine::new("echo").with_args(["hello", "world"]));
    let result = command.execute_async(&executor).await.unwrap();

    assert_eq!(result.stdout.as_deref(), Some("hello world\n"));
    assert_eq!(result.exit_code, Some(0));
}

#[tokio::test]
async fn test_remote_async_without_monitor() {
    let server = TestServer::start().await;
    let executor = RemoteExecutor::new(server.shared_client()).with_monitor(false);

    let mut command = Command::with_parser(CommandLine::shell("sleep 0.2; echo done"), stdout_parser);
    let stdout = command.execute_async(&executor).await.unwrap();

    assert_eq!(stdout, "done");
    // The single final fetch consumed the job.
    assert!(server.server.jobs().is_empty().await);
}

#[tokio::test]
async fn test_remote_timeout() {
    let server = TestServer::start().await;
    let executor =
        RemoteExecutor::new(server.shared_client()).with_timeout(Duration::from_millis(300));

    let mut command = Command::new(CommandLine::new("sleep").with_arg("10"));
    let err = command.execute_async(&executor).await.unwrap_err();

    assert!(matches!(err, RexecError::Timeout { .. }));
    // The remote job keeps running.
    assert_eq!(server.server.jobs().list().await.running.len(), 1);
}

#[tokio::test]
async fn test_remote_timeout_not_overshot_by_poll_interval() {
    let server = TestServer::start().await;
    let executor = RemoteExecutor::new(server.shared_client())
        .with_timeout(Duration::from_millis(300))
        .with_poll_interval(Duration::from_secs(10));

    let started = tokio::time::Instant::now();
    let mut command = Command::new(CommandLine::new("sleep").with_arg("10"));
    let err = command.execute_async(&executor).await.unwrap_err();

    assert!(matches!(err, RexecError::Timeout { .. }));
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn test_remote_cancellation() {
    let server = TestServer::start().await;
    let executor = RemoteExecutor::new(server.shared_client())
        .with_poll_interval(Duration::from_secs(5));

    let cancel = executor.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
    });

    let started = tokio::time::Instant::now();
    let mut command = Command::new(CommandLine::new("sleep").with_arg("10"));
    let err = command.execute_async(&executor).await.unwrap_err();

    assert!(matches!(err, RexecError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(server.server.jobs().len().await, 1);
}

#[tokio::test]
async fn test_remote_failure_reported_in_result() {
    let server = TestServer::start().await;
    let executor = RemoteExecutor::new(server.shared_client());

    let mut command = Command::new(CommandLine::new("nonexistent_command_12345"));
    let result = command.execute_async(&executor).await.unwrap();

    assert!(result.exit_code.is_none());
    assert!(result.error.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_remote_blocking_run_on_multi_thread_runtime() {
    let server = TestServer::start().await;
    let executor = RemoteExecutor::new(server.shared_client());

    let mut command = Command::with_parser(CommandLine::new("echo").with_arg("sync"), stdout_parser);
    let stdout = command.execute(&executor).unwrap();

    assert_eq!(stdout, "sync");
}

#[tokio::test]
async fn test_remote_blocking_run_on_current_thread_runtime_errors() {
    let server = TestServer::start().await;
    let executor = RemoteExecutor::new(server.shared_client());

    let err = executor.run(&CommandLine::new("true")).unwrap_err();
    assert!(matches!(err, RexecError::Config(_)));
    assert!(server.server.jobs().is_empty().await);
}
