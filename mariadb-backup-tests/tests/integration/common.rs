//! Common utilities for integration tests
//!
//! This module provides cleanup guards and helper functions for integration tests.

use anyhow::Result;
use std::process::Command;
use std::thread;
use std::time::Duration;

pub const ROOT_PASSWORD: &str = "testpass";

/// Guard that ensures Docker container cleanup on drop (even on panic)
pub struct ContainerGuard {
    name: String,
}

impl ContainerGuard {
    pub fn new(name: String) -> Self {
        Self { name }
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        cleanup_container(&self.name);
    }
}

/// Helper to stop and remove a Docker container
/// The -v flag also removes anonymous volumes associated with the container
fn cleanup_container(name: &str) {
    let _ = Command::new("docker").args(["stop", name]).output();
    let _ = Command::new("docker").args(["rm", "-v", name]).output();
}

/// Helper to check if Docker is available
pub fn is_docker_available() -> bool {
    Command::new("docker")
        .args(["ps"])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Helper to check if a MariaDB or MySQL dump client is on PATH
pub fn is_client_available() -> bool {
    ["mariadb-dump", "mysqldump"]
        .iter()
        .any(|name| Command::new(name).arg("--version").output().is_ok())
}

/// Start a MariaDB container publishing 3306 on `port`
pub fn start_mariadb_container(name: &str, port: u16) -> Result<ContainerGuard> {
    let output = Command::new("docker")
        .args([
            "run",
            "-d",
            "--name",
            name,
            "-p",
            &format!("127.0.0.1:{}:3306", port),
            "-e",
            &format!("MARIADB_ROOT_PASSWORD={}", ROOT_PASSWORD),
            "mariadb:11",
        ])
        .output()?;
    if !output.status.success() {
        anyhow::bail!(
            "docker run failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }
    let guard = ContainerGuard::new(name.to_string());

    for _ in 0..60 {
        if exec_sql(name, "SELECT 1").is_ok() {
            return Ok(guard);
        }
        thread::sleep(Duration::from_secs(1));
    }

    Err(anyhow::anyhow!("MariaDB failed to become ready"))
}

/// Helper to execute SQL in the container
pub fn exec_sql(container: &str, sql: &str) -> Result<String> {
    let output = Command::new("docker")
        .args([
            "exec",
            container,
            "mariadb",
            "-uroot",
            &format!("-p{}", ROOT_PASSWORD),
            "--batch",
            "--skip-column-names",
            "-e",
            sql,
        ])
        .output()?;

    if !output.status.success() {
        anyhow::bail!("{}", String::from_utf8_lossy(&output.stderr));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
