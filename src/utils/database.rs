//! Database client abstraction
//!
//! Dumping and restoring are delegated to the MariaDB/MySQL client tools
//! (`mariadb-dump`/`mysqldump` and `mariadb`/`mysql`). The `DatabaseDumper`
//! trait keeps the dump coordinator independent of those binaries.

use super::executor::{CommandExecutor, RealExecutor};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

pub const DEFAULT_PORT: u16 = 3306;

/// Connection parameters passed to the client tools
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Connection {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
}

impl Connection {
    fn args(&self) -> Vec<String> {
        let mut args = vec![
            format!("--host={}", self.host),
            format!("--port={}", self.port),
        ];
        if !self.user.is_empty() {
            args.push(format!("--user={}", self.user));
        }
        args
    }

    /// The password travels in the environment, never on the command line
    fn env(&self) -> Vec<(&str, &str)> {
        if self.pass.is_empty() {
            Vec::new()
        } else {
            vec![("MYSQL_PWD", self.pass.as_str())]
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("pass", &if self.pass.is_empty() { "" } else { "***" })
            .finish()
    }
}

/// What to dump and how
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DumpRequest {
    pub databases: Vec<String>,
    /// Omit `CREATE DATABASE`/`USE` so the dump restores into any database
    pub suppress_use_database: bool,
    pub compact: bool,
    /// Client/server buffer ceiling in bytes; 0 keeps the tool's default
    pub max_allowed_packet: u64,
}

#[async_trait]
pub trait DatabaseDumper: Send + Sync {
    /// List every database on the server
    async fn list_databases(&self, conn: &Connection) -> Result<Vec<String>>;

    /// Write SQL for the requested databases into `output`
    async fn dump(&self, conn: &Connection, request: &DumpRequest, output: &Path) -> Result<()>;

    /// Replay an uncompressed SQL file against the server
    async fn restore(&self, conn: &Connection, input: &Path) -> Result<()>;
}

/// Dumper backed by the MariaDB/MySQL command line clients
pub struct MysqlDumper {
    executor: Arc<dyn CommandExecutor>,
    dump_binary: String,
    client_binary: String,
}

impl MysqlDumper {
    /// Locate the client binaries on PATH, preferring the MariaDB names
    pub fn new() -> Self {
        Self::with_executor(Arc::new(RealExecutor::new()))
    }

    pub fn with_executor(executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            executor,
            dump_binary: find_binary(&["mariadb-dump", "mysqldump"]),
            client_binary: find_binary(&["mariadb", "mysql"]),
        }
    }

    /// Use explicit binary names instead of searching PATH
    pub fn with_binaries(
        executor: Arc<dyn CommandExecutor>,
        dump_binary: &str,
        client_binary: &str,
    ) -> Self {
        Self {
            executor,
            dump_binary: dump_binary.to_string(),
            client_binary: client_binary.to_string(),
        }
    }

    fn dump_args(&self, conn: &Connection, request: &DumpRequest) -> Vec<String> {
        let mut args = conn.args();
        args.push("--single-transaction".to_string());
        args.push("--routines".to_string());
        args.push("--events".to_string());
        if request.compact {
            args.push("--compact".to_string());
        }
        if request.max_allowed_packet > 0 {
            args.push(format!("--max-allowed-packet={}", request.max_allowed_packet));
        }
        args
    }
}

impl Default for MysqlDumper {
    fn default() -> Self {
        Self::new()
    }
}

fn find_binary(candidates: &[&str]) -> String {
    candidates
        .iter()
        .find(|name| which::which(name).is_ok())
        .unwrap_or(&candidates[candidates.len() - 1])
        .to_string()
}

#[async_trait]
impl DatabaseDumper for MysqlDumper {
    async fn list_databases(&self, conn: &Connection) -> Result<Vec<String>> {
        let mut args = conn.args();
        args.extend(
            ["--batch", "--skip-column-names", "--execute=SHOW DATABASES"]
                .iter()
                .map(|s| s.to_string()),
        );
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        let stdout = self
            .executor
            .run_command_stdout(&self.client_binary, &args, &conn.env(), None)
            .await
            .context("Failed to list databases")?;

        let databases: Vec<String> = stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        debug!("Server reports databases: {:?}", databases);
        Ok(databases)
    }

    async fn dump(&self, conn: &Connection, request: &DumpRequest, output: &Path) -> Result<()> {
        let base = self.dump_args(conn, request);
        let env = conn.env();

        if request.suppress_use_database {
            // Without --databases the dump carries no USE statement, but then
            // only one database can be named per invocation.
            for database in &request.databases {
                info!("Dumping database '{}'", database);
                let mut args: Vec<&str> = base.iter().map(String::as_str).collect();
                args.push(database);
                self.executor
                    .run_command_to_file(&self.dump_binary, &args, &env, output, None)
                    .await
                    .with_context(|| format!("Failed to dump database '{}'", database))?;
            }
        } else {
            info!("Dumping databases: {}", request.databases.join(", "));
            let mut args: Vec<&str> = base.iter().map(String::as_str).collect();
            args.push("--databases");
            args.extend(request.databases.iter().map(String::as_str));
            self.executor
                .run_command_to_file(&self.dump_binary, &args, &env, output, None)
                .await
                .context("Failed to dump databases")?;
        }

        Ok(())
    }

    async fn restore(&self, conn: &Connection, input: &Path) -> Result<()> {
        let args = conn.args();
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.executor
            .run_command_with_input(&self.client_binary, &args, &conn.env(), input, None)
            .await
            .context("Failed to restore dump")?;
        Ok(())
    }
}

/// Mock dumper for testing
/// Available for use in external test crates
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum DumperCall {
        ListDatabases,
        Dump(DumpRequest),
        Restore(Vec<u8>),
    }

    /// Records calls and writes canned SQL
    #[derive(Default)]
    pub struct MockDumper {
        databases: Vec<String>,
        fail_dump: bool,
        calls: Mutex<Vec<DumperCall>>,
    }

    impl MockDumper {
        pub fn new() -> Self {
            Self::default()
        }

        /// Databases the fake server reports
        pub fn with_databases(mut self, databases: &[&str]) -> Self {
            self.databases = databases.iter().map(|d| d.to_string()).collect();
            self
        }

        pub fn with_failing_dump(mut self) -> Self {
            self.fail_dump = true;
            self
        }

        pub fn get_calls(&self) -> Vec<DumperCall> {
            self.calls.lock().unwrap().clone()
        }

        /// The request passed to the last dump, if any
        pub fn last_dump(&self) -> Option<DumpRequest> {
            self.calls.lock().unwrap().iter().rev().find_map(|c| match c {
                DumperCall::Dump(request) => Some(request.clone()),
                _ => None,
            })
        }

        pub fn dump_called(&self) -> bool {
            self.last_dump().is_some()
        }
    }

    #[async_trait]
    impl DatabaseDumper for MockDumper {
        async fn list_databases(&self, _conn: &Connection) -> Result<Vec<String>> {
            self.calls.lock().unwrap().push(DumperCall::ListDatabases);
            Ok(self.databases.clone())
        }

        async fn dump(&self, _conn: &Connection, request: &DumpRequest, output: &Path) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(DumperCall::Dump(request.clone()));
            if self.fail_dump {
                anyhow::bail!("mock dump failure");
            }
            let sql: String = request
                .databases
                .iter()
                .map(|db| format!("-- database {}\nCREATE TABLE t (id INT);\n", db))
                .collect();
            std::fs::write(output, sql)?;
            Ok(())
        }

        async fn restore(&self, _conn: &Connection, input: &Path) -> Result<()> {
            let sql = std::fs::read(input)?;
            self.calls.lock().unwrap().push(DumperCall::Restore(sql));
            Ok(())
        }
    }
}
