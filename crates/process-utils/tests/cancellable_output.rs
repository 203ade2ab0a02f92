//! Behaviour of `output_with_cancel` against real shell commands.
//!
//! These tests rely on a POSIX `sh` and are skipped on Windows.

#![cfg(unix)]

use std::time::{Duration, Instant};

use process_utils::{CancellationToken, CommandError, output_with_cancel, tokio_command};

#[tokio::test]
async fn captures_stdout_and_stderr() {
    let token = CancellationToken::new();
    let mut cmd = tokio_command("sh");
    cmd.args(["-c", "echo out; echo err 1>&2"]);

    let output = output_with_cancel(&mut cmd, &token).await.unwrap();

    assert!(output.success());
    assert_eq!(output.stdout_trimmed(), "out");
    assert_eq!(output.combined(), "out\nerr");
}

#[tokio::test]
async fn reports_non_zero_exit_without_error() {
    let token = CancellationToken::new();
    let mut cmd = tokio_command("sh");
    cmd.args(["-c", "echo broken 1>&2; exit 3"]);

    let output = output_with_cancel(&mut cmd, &token).await.unwrap();

    assert!(!output.success());
    assert_eq!(output.status.code(), Some(3));
    assert_eq!(output.combined(), "broken");
}

#[tokio::test]
async fn cancellation_kills_the_child() {
    let token = CancellationToken::new();
    let mut cmd = tokio_command("sh");
    cmd.args(["-c", "sleep 30"]);

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let start = Instant::now();
    let result = output_with_cancel(&mut cmd, &token).await;

    assert!(matches!(result, Err(CommandError::Cancelled { .. })));
    assert!(start.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn already_cancelled_token_never_spawns() {
    let token = CancellationToken::new();
    token.cancel();
    let mut cmd = tokio_command("definitely-not-a-real-binary");

    let result = output_with_cancel(&mut cmd, &token).await;

    assert!(matches!(result, Err(CommandError::Cancelled { .. })));
}

#[tokio::test]
async fn missing_binary_is_a_spawn_error() {
    let token = CancellationToken::new();
    let mut cmd = tokio_command("definitely-not-a-real-binary");

    let result = output_with_cancel(&mut cmd, &token).await;

    assert!(matches!(result, Err(CommandError::Spawn { .. })));
}
