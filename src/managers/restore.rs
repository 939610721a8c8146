//! Restore an artifact from a target into the database

use crate::compression::{CompressionError, Compressor};
use crate::storage::{BoxError, Storage, StorageError};
use crate::utils::database::{Connection, DatabaseDumper};
use regex::bytes::Regex;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tempfile::TempDir;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum RestoreError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Compression(#[from] CompressionError),

    #[error("failed to stage restore: {0}")]
    Staging(#[from] std::io::Error),

    #[error("restore failed: {0}")]
    RestoreFailed(#[source] BoxError),
}

/// Source database name to the name it is restored under
pub type DatabaseMap = BTreeMap<String, String>;

/// Parse one `old:new` database mapping
pub fn parse_database_mapping(value: &str) -> Result<(String, String), String> {
    match value.split_once(':') {
        Some((from, to)) if !from.is_empty() && !to.is_empty() && !to.contains(':') => {
            Ok((from.to_string(), to.to_string()))
        }
        _ => Err(format!("invalid database mapping '{}', expected old:new", value)),
    }
}

pub struct RestoreManager {
    dumper: Arc<dyn DatabaseDumper>,
    databases: DatabaseMap,
}

impl RestoreManager {
    pub fn new(dumper: Arc<dyn DatabaseDumper>) -> Self {
        Self {
            dumper,
            databases: DatabaseMap::new(),
        }
    }

    /// Restore the named databases under new names
    pub fn with_database_map(mut self, databases: DatabaseMap) -> Self {
        self.databases = databases;
        self
    }

    /// Fetch `name` from `target`, decompress it according to its extension,
    /// and replay it against the server
    pub async fn restore(
        &self,
        target: &dyn Storage,
        name: &str,
        connection: &Connection,
    ) -> Result<u64, RestoreError> {
        let extension = name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
        let compressor = Compressor::from_extension(extension)?;

        let staging = TempDir::new()?;
        let downloaded = staging.path().join("artifact");
        let mut file = tokio::fs::File::create(&downloaded).await?;
        let size = target.read(name, &mut file).await?;
        file.flush().await?;
        drop(file);
        info!("Fetched {} from {} ({} bytes)", name, target.url(), size);

        let mut sql = staging.path().join("restore.sql");
        decompress(compressor, &downloaded, &sql).await?;

        if !self.databases.is_empty() {
            let renamed = staging.path().join("renamed.sql");
            rename(&self.databases, &sql, &renamed).await?;
            sql = renamed;
        }

        self.dumper
            .restore(connection, &sql)
            .await
            .map_err(|e| RestoreError::RestoreFailed(e.into()))?;
        info!("Restored {}", name);
        Ok(size)
    }
}

async fn decompress(compressor: Compressor, source: &Path, destination: &Path) -> std::io::Result<u64> {
    let (source, destination) = (source.to_path_buf(), destination.to_path_buf());
    tokio::task::spawn_blocking(move || compressor.decompress_file(&source, &destination))
        .await
        .map_err(std::io::Error::other)?
}

fn database_statement() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(USE |CREATE DATABASE (?:/\*!32312 IF NOT EXISTS\*/ )?|-- Current Database: )`([^`]+)`")
            .expect("valid regex")
    })
}

/// Point `USE` and `CREATE DATABASE` statements at the mapped names
fn rename_databases(
    databases: &DatabaseMap,
    source: &Path,
    destination: &Path,
) -> io::Result<u64> {
    let mut input = BufReader::new(File::open(source)?);
    let mut output = BufWriter::new(File::create(destination)?);
    let mut line = Vec::new();
    let mut renamed = 0;

    while input.read_until(b'\n', &mut line)? > 0 {
        let replacement = database_statement().captures(&line).and_then(|caps| {
            let name = std::str::from_utf8(&caps[2]).ok()?;
            let to = databases.get(name)?;
            let prefix = caps.get(1)?.as_bytes();
            let end = caps.get(0)?.end();
            let mut rewritten = Vec::with_capacity(line.len() + to.len());
            rewritten.extend_from_slice(prefix);
            rewritten.push(b'`');
            rewritten.extend_from_slice(to.as_bytes());
            rewritten.push(b'`');
            rewritten.extend_from_slice(&line[end..]);
            Some(rewritten)
        });
        match replacement {
            Some(rewritten) => {
                output.write_all(&rewritten)?;
                renamed += 1;
            }
            None => output.write_all(&line)?,
        }
        line.clear();
    }
    output.flush()?;
    Ok(renamed)
}

async fn rename(databases: &DatabaseMap, source: &Path, destination: &Path) -> io::Result<()> {
    let databases = databases.clone();
    let (source, destination) = (source.to_path_buf(), destination.to_path_buf());
    let renamed = tokio::task::spawn_blocking(move || rename_databases(&databases, &source, &destination))
        .await
        .map_err(io::Error::other)??;
    debug!("Rewrote {} database statement(s)", renamed);
    Ok(())
}
