//! Utilities for running external programs with proper error handling and timeouts

use anyhow::{Context, Result};
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error};

fn build_command(
    program: &str,
    args: &[&str],
    env: &[(&str, &str)],
    working_dir: Option<&Path>,
) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args);
    for (key, value) in env {
        cmd.env(key, value);
    }
    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }
    cmd.kill_on_drop(true);
    cmd
}

async fn wait_with_timeout(
    program: &str,
    cmd: &mut Command,
    timeout: Option<Duration>,
) -> Result<Output> {
    let output = match timeout {
        Some(limit) => tokio::time::timeout(limit, cmd.output())
            .await
            .map_err(|_| anyhow::anyhow!("{} timed out after {:?}", program, limit))?,
        None => cmd.output().await,
    };
    output.context(format!("Failed to execute {}", program))
}

fn check_status(program: &str, args: &[&str], output: Output) -> Result<Output> {
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        error!("Command failed: {} {}", program, args.join(" "));
        error!("Stderr: {}", stderr.trim());
        anyhow::bail!(
            "{} failed with exit code {:?}: {}",
            program,
            output.status.code(),
            stderr.trim()
        );
    }
    Ok(output)
}

/// Run a command with optional timeout, failing on a non-zero exit status
pub async fn run_command(
    program: &str,
    args: &[&str],
    env: &[(&str, &str)],
    working_dir: Option<&Path>,
    timeout: Option<Duration>,
) -> Result<Output> {
    let mut cmd = build_command(program, args, env, working_dir);
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    debug!("Running command: {} {}", program, args.join(" "));

    let output = wait_with_timeout(program, &mut cmd, timeout).await?;
    let output = check_status(program, args, output)?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.is_empty() {
        debug!("Command output: {}", stdout.trim_end());
    }

    Ok(output)
}

/// Run a command and return stdout as string
pub async fn run_command_stdout(
    program: &str,
    args: &[&str],
    env: &[(&str, &str)],
    timeout: Option<Duration>,
) -> Result<String> {
    let output = run_command(program, args, env, None, timeout).await?;
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Run a command with its stdout redirected into `output_path`
pub async fn run_command_to_file(
    program: &str,
    args: &[&str],
    env: &[(&str, &str)],
    output_path: &Path,
    timeout: Option<Duration>,
) -> Result<()> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(output_path)
        .context(format!("Failed to open output file {:?}", output_path))?;

    let mut cmd = build_command(program, args, env, None);
    cmd.stdout(Stdio::from(file));
    cmd.stderr(Stdio::piped());

    debug!(
        "Running command: {} {} > {:?}",
        program,
        args.join(" "),
        output_path
    );

    // `output()` would replace the file handle with a pipe
    let child = cmd
        .spawn()
        .context(format!("Failed to execute {}", program))?;
    let output = match timeout {
        Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
            .await
            .map_err(|_| anyhow::anyhow!("{} timed out after {:?}", program, limit))?,
        None => child.wait_with_output().await,
    }
    .context(format!("Failed to execute {}", program))?;
    check_status(program, args, output)?;
    Ok(())
}

/// Run a command with the contents of `input_path` on its stdin
pub async fn run_command_with_input(
    program: &str,
    args: &[&str],
    env: &[(&str, &str)],
    input_path: &Path,
    timeout: Option<Duration>,
) -> Result<Output> {
    let file = std::fs::File::open(input_path)
        .context(format!("Failed to open input file {:?}", input_path))?;

    let mut cmd = build_command(program, args, env, None);
    cmd.stdin(Stdio::from(file));
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    debug!(
        "Running command: {} {} < {:?}",
        program,
        args.join(" "),
        input_path
    );

    let output = wait_with_timeout(program, &mut cmd, timeout).await?;
    check_status(program, args, output)
}

/// Run a shell script (used for hooks)
pub async fn run_script(
    script: &Path,
    env: &[(&str, &str)],
    timeout: Option<Duration>,
) -> Result<Output> {
    let script_str = script.to_string_lossy().to_string();
    let working_dir = script.parent();
    run_command("sh", &[script_str.as_str()], env, working_dir, timeout).await
}
