mod common;

use grader_sandbox::{ResourceLimits, SandboxArgs, SandboxError};
use grader_utils::os_cmd::OsCmd;

use std::time::Instant;

use anyhow::Result;

#[tokio::test]
async fn stdin_is_fed_to_child() -> Result<()> {
    common::init();

    let mut args = common::sh("cat");
    args.stdin = b"hello\n".to_vec();
    let output = common::run(&args).await?;

    assert!(output.is_success());
    assert_eq!(output.stdout, b"hello\n");
    assert!(output.stderr.is_empty());
    Ok(())
}

#[tokio::test]
async fn nonzero_exit_is_reported() -> Result<()> {
    common::init();

    let output = common::run(&common::sh("echo oops >&2; exit 3")).await?;

    assert!(!output.is_success());
    assert_eq!(output.code, Some(3));
    assert_eq!(output.signal, None);
    assert_eq!(output.stderr, b"oops\n");
    Ok(())
}

#[tokio::test]
async fn killed_by_signal() -> Result<()> {
    common::init();

    let output = common::run(&common::sh("kill -SEGV $$")).await?;

    assert!(!output.is_success());
    assert_eq!(output.code, None);
    assert_eq!(output.signal, Some(libc::SIGSEGV));
    Ok(())
}

#[tokio::test]
async fn real_time_limit_kills_child() -> Result<()> {
    common::init();

    let mut args = common::sh("echo started; sleep 30");
    args.real_time_limit = 300;

    let t0 = Instant::now();
    let output = common::run(&args).await?;
    let elapsed = t0.elapsed();

    assert!(output.timed_out);
    assert!(!output.is_success());
    assert!(output.stdout.is_empty());
    assert!(elapsed.as_secs() < 5, "elapsed = {:?}", elapsed);
    Ok(())
}

#[tokio::test]
async fn descendants_holding_pipes_are_killed() -> Result<()> {
    common::init();

    // the background sleep keeps stdout open after the shell exits
    let mut args = common::sh("sleep 30 & exit 0");
    args.real_time_limit = 300;

    let t0 = Instant::now();
    let output = common::run(&args).await?;

    assert!(output.timed_out);
    assert!(t0.elapsed().as_secs() < 5);
    Ok(())
}

#[tokio::test]
async fn output_is_capped() -> Result<()> {
    common::init();

    let mut args = common::sh("head -c 100000 /dev/zero");
    args.output_limit = 1024;
    let output = common::run(&args).await?;

    assert!(output.is_success());
    assert_eq!(output.stdout.len(), 1024);
    Ok(())
}

#[tokio::test]
async fn limits_are_installed_before_exec() -> Result<()> {
    common::init();

    let mut args = common::sh("ulimit -t; ulimit -v");
    args.limits = Some(ResourceLimits::default());
    let output = common::run(&args).await?;

    assert!(output.is_success());
    let stdout = String::from_utf8(output.stdout)?;
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines, ["2", "204800"]);
    Ok(())
}

#[tokio::test]
async fn environment_is_cleared() -> Result<()> {
    common::init();

    let mut cmd = OsCmd::new("/bin/sh");
    cmd.arg("-c").arg("echo \"[$HOME]\"");
    let output = common::run(&SandboxArgs::new(cmd)).await?;

    assert_eq!(output.stdout, b"[]\n");
    Ok(())
}

#[tokio::test]
async fn missing_binary_is_a_distinct_error() {
    common::init();

    let args = SandboxArgs::new(OsCmd::new("/nonexistent/grader-test-binary"));
    let err = grader_sandbox::run(&args).await.unwrap_err();
    assert!(matches!(err, SandboxError::NotFound(_)), "{:?}", err);
}
