//! Configuration module for mariadb-backup
//!
//! This module handles loading, validating, and resolving configuration from
//! TOML files and command-line overrides.
//!
//! ## Resolution Order
//!
//! Settings are applied in this order (later overrides earlier):
//! 1. Built-in defaults
//! 2. Config file
//! 3. Command-line flags and their environment variables
//!
//! ## Example Usage
//!
//! ```no_run
//! use mariadb_backup::config::{self, Overrides};
//!
//! let file = config::load_config("backup.toml")?;
//! let settings = config::resolve_settings(&Overrides::default(), Some(&file))?;
//!
//! for target in &settings.targets {
//!     println!("Target: {} ({})", target.name, target.url);
//! }
//! # Ok::<(), config::ConfigError>(())
//! ```

mod loader;
mod types;

pub use loader::{load_config, resolve_settings, ConfigError, Result};
pub use types::*;

use crate::managers::dump::DumpOptions;
use crate::storage::{self, Storage, StorageError};
use std::sync::Arc;

impl Settings {
    /// Build a storage backend for every resolved target
    pub fn build_targets(&self) -> std::result::Result<Vec<Arc<dyn Storage>>, StorageError> {
        self.targets
            .iter()
            .map(|t| storage::parse_url(&t.url, &t.credentials))
            .collect()
    }

    /// Options for one dump run against `targets`
    pub fn dump_options(&self, targets: Vec<Arc<dyn Storage>>) -> DumpOptions {
        DumpOptions {
            targets,
            connection: self.connection.clone(),
            include: self.include.clone(),
            exclude: self.exclude.clone(),
            compressor: self.compressor,
            safechars: self.safechars,
            pre_backup_scripts: self.pre_backup_scripts.clone(),
            post_backup_scripts: self.post_backup_scripts.clone(),
            compact: self.compact,
            suppress_use_database: self.suppress_use_database,
            max_allowed_packet: self.max_allowed_packet,
        }
    }

    /// A dump or restore needs a server to talk to
    pub fn require_server(&self) -> Result<()> {
        if self.connection.host.is_empty() {
            return Err(ConfigError::ValidationError(
                "no database server configured (--server or DB_SERVER)".to_string(),
            ));
        }
        Ok(())
    }
}

/// Expand tilde (~) in path
pub fn expand_tilde(path: &std::path::Path) -> std::path::PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}
