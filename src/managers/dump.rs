//! Dump pipeline - database to compressed artifact to every target

use crate::artifact::artifact_name;
use crate::compression::Compressor;
use crate::managers::hooks;
use crate::storage::{BoxError, Storage, StorageError, TargetErrors};
use crate::utils::database::{Connection, DatabaseDumper, DumpRequest};
use crate::utils::executor::CommandExecutor;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Server-internal schemas that are never dumped unless explicitly included
pub const SYSTEM_DATABASES: [&str; 4] = ["information_schema", "performance_schema", "sys", "mysql"];

#[derive(Debug, Error)]
pub enum DumpError {
    #[error("no targets")]
    NoTargets,

    #[error("no databases to dump")]
    NoDatabases,

    #[error("failed to list databases: {0}")]
    ListDatabases(#[source] BoxError),

    #[error("pre-backup hook failed: {0}")]
    PreHookFailed(#[source] BoxError),

    #[error("database dump failed: {0}")]
    DumpFailed(#[source] BoxError),

    #[error("failed to stage dump: {0}")]
    Staging(#[from] std::io::Error),

    #[error(transparent)]
    TargetsFailed(#[from] TargetErrors),
}

/// Everything one dump run needs, fixed for the duration of the run
#[derive(Debug, Clone)]
pub struct DumpOptions {
    pub targets: Vec<Arc<dyn Storage>>,
    pub connection: Connection,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub compressor: Compressor,
    pub safechars: bool,
    pub pre_backup_scripts: Option<PathBuf>,
    pub post_backup_scripts: Option<PathBuf>,
    pub compact: bool,
    pub suppress_use_database: bool,
    pub max_allowed_packet: u64,
}

/// Outcome of a successful dump run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DumpReport {
    pub artifact: String,
    /// Compressed size in bytes
    pub size: u64,
    pub databases: Vec<String>,
    /// Bytes written, per target URL
    pub targets: Vec<(String, u64)>,
    /// Post-backup hook failures; they do not fail the run
    pub warnings: Vec<String>,
}

pub struct DumpManager {
    dumper: Arc<dyn DatabaseDumper>,
    executor: Arc<dyn CommandExecutor>,
}

impl DumpManager {
    pub fn new(dumper: Arc<dyn DatabaseDumper>, executor: Arc<dyn CommandExecutor>) -> Self {
        Self { dumper, executor }
    }

    /// Run one dump, named after the current time
    pub async fn dump(&self, options: &DumpOptions) -> Result<DumpReport, DumpError> {
        self.dump_at(options, Utc::now()).await
    }

    /// Run one dump whose artifact is named after `now`
    pub async fn dump_at(
        &self,
        options: &DumpOptions,
        now: DateTime<Utc>,
    ) -> Result<DumpReport, DumpError> {
        if options.targets.is_empty() {
            return Err(DumpError::NoTargets);
        }
        let start = Instant::now();

        let databases = self.resolve_databases(options).await?;
        info!("Dumping {} database(s): {}", databases.len(), databases.join(", "));

        let staging = TempDir::new()?;
        let dump_dir = staging.path().to_string_lossy().to_string();
        let port = options.connection.port.to_string();

        if let Some(dir) = &options.pre_backup_scripts {
            let env = [
                ("DB_SERVER", options.connection.host.as_str()),
                ("DB_PORT", port.as_str()),
                ("DUMP_DIR", dump_dir.as_str()),
            ];
            hooks::run_hooks(self.executor.as_ref(), dir, &env)
                .await
                .map_err(|e| DumpError::PreHookFailed(e.into()))?;
        }

        let raw = staging.path().join("dump.sql");
        let request = DumpRequest {
            databases: databases.clone(),
            suppress_use_database: options.suppress_use_database,
            compact: options.compact,
            max_allowed_packet: options.max_allowed_packet,
        };
        self.dumper
            .dump(&options.connection, &request, &raw)
            .await
            .map_err(|e| DumpError::DumpFailed(e.into()))?;

        let name = artifact_name(now, options.compressor.extension(), options.safechars);
        let artifact = staging.path().join(&name);
        let size = compress(options.compressor, raw, artifact.clone()).await?;
        debug!("Compressed dump to {} ({} bytes)", name, size);

        let results = join_all(
            options
                .targets
                .iter()
                .map(|target| write_to_target(target.as_ref(), &name, &artifact)),
        )
        .await;

        let mut report = DumpReport {
            artifact: name.clone(),
            size,
            databases,
            ..Default::default()
        };
        let mut errors = TargetErrors::default();
        for (target, result) in options.targets.iter().zip(results) {
            match result {
                Ok(written) => {
                    info!("Wrote {} to {} ({} bytes)", name, target.url(), written);
                    report.targets.push((target.url().to_string(), written));
                }
                Err(e) => {
                    error!("Failed to write {} to {}: {}", name, target.url(), e);
                    errors.push(target.url(), e);
                }
            }
        }

        if let Some(dir) = &options.post_backup_scripts {
            let dump_file = artifact.to_string_lossy().to_string();
            let env = [
                ("DB_SERVER", options.connection.host.as_str()),
                ("DB_PORT", port.as_str()),
                ("DUMP_DIR", dump_dir.as_str()),
                ("DUMP_FILE", dump_file.as_str()),
            ];
            report.warnings =
                hooks::run_hooks_best_effort(self.executor.as_ref(), dir, &env).await;
        }

        if !errors.is_empty() {
            return Err(errors.into());
        }

        info!(
            "Dump {} completed in {:.1}s",
            report.artifact,
            start.elapsed().as_secs_f64()
        );
        Ok(report)
    }

    async fn resolve_databases(&self, options: &DumpOptions) -> Result<Vec<String>, DumpError> {
        if !options.include.is_empty() {
            return Ok(options.include.clone());
        }

        let all = self
            .dumper
            .list_databases(&options.connection)
            .await
            .map_err(|e| DumpError::ListDatabases(e.into()))?;
        let databases = filter_databases(all, &options.exclude);
        if databases.is_empty() {
            warn!("No databases left after exclusions");
            return Err(DumpError::NoDatabases);
        }
        Ok(databases)
    }
}

/// Drop excluded and system databases, keeping server order
pub fn filter_databases(all: Vec<String>, exclude: &[String]) -> Vec<String> {
    let skip: HashSet<&str> = exclude
        .iter()
        .map(String::as_str)
        .chain(SYSTEM_DATABASES)
        .collect();
    all.into_iter()
        .filter(|db| !skip.contains(db.as_str()))
        .collect()
}

async fn compress(compressor: Compressor, source: PathBuf, destination: PathBuf) -> Result<u64, DumpError> {
    tokio::task::spawn_blocking(move || compressor.compress_file(&source, &destination))
        .await
        .map_err(std::io::Error::other)?
        .map_err(DumpError::from)
}

async fn write_to_target(target: &dyn Storage, name: &str, artifact: &Path) -> Result<u64, StorageError> {
    let mut file = tokio::fs::File::open(artifact)
        .await
        .map_err(|e| StorageError::unreachable(target.url(), "write", e))?;
    target.write(name, &mut file).await
}
