//! Fluent API for building test configurations
//!
//! Provides a builder pattern for creating test configurations with sensible defaults.

use mariadb_backup::config::{Config, TargetConfig};
use mariadb_backup::storage::Credentials;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Builder for creating test configurations
pub struct ConfigBuilder {
    temp_dir: TempDir,
    config: Config,
}

impl ConfigBuilder {
    /// Create a new ConfigBuilder with no targets and no server
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        // Create log directory
        let log_directory = temp_dir.path().join("logs");
        fs::create_dir_all(&log_directory).expect("Failed to create log directory");

        let mut config = Config::default();
        config.logging.directory = Some(log_directory);

        Self { temp_dir, config }
    }

    /// Create a minimal config with a server and one local target
    pub fn minimal() -> Self {
        let builder = Self::new().with_server("db.example.com", 3306);

        let backup_path = builder.temp_dir.path().join("backups");
        fs::create_dir_all(&backup_path).expect("Failed to create backup dir");

        builder.add_local_target("local", &backup_path)
    }

    /// Set the database server
    pub fn with_server(mut self, host: &str, port: u16) -> Self {
        self.config.database.server = Some(host.to_string());
        self.config.database.port = Some(port);
        self
    }

    /// Set the database credentials
    pub fn with_credentials(mut self, user: &str, password: &str) -> Self {
        self.config.database.user = Some(user.to_string());
        self.config.database.password = Some(password.to_string());
        self
    }

    /// Add a local target
    pub fn add_local_target(mut self, name: &str, path: &Path) -> Self {
        self.config.targets.insert(
            name.to_string(),
            TargetConfig {
                url: path.display().to_string(),
                description: format!("Local target: {}", name),
                credentials: Credentials::default(),
            },
        );
        self
    }

    /// Add a target with an arbitrary URL
    pub fn add_target(mut self, name: &str, url: &str) -> Self {
        self.config.targets.insert(
            name.to_string(),
            TargetConfig {
                url: url.to_string(),
                description: String::new(),
                credentials: Credentials::default(),
            },
        );
        self
    }

    /// Restrict dumps to the named targets
    pub fn dump_to(mut self, names: &[&str]) -> Self {
        self.config.dump.targets = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn with_compression(mut self, name: &str) -> Self {
        self.config.dump.compression = Some(name.to_string());
        self
    }

    pub fn with_include(mut self, databases: &[&str]) -> Self {
        self.config.dump.include = databases.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn with_exclude(mut self, databases: &[&str]) -> Self {
        self.config.dump.exclude = databases.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn with_safechars(mut self) -> Self {
        self.config.dump.safechars = Some(true);
        self
    }

    /// Run a single dump and exit
    pub fn once(mut self) -> Self {
        self.config.dump.schedule.once = Some(true);
        self
    }

    pub fn with_cron(mut self, expression: &str) -> Self {
        self.config.dump.schedule.cron = Some(expression.to_string());
        self
    }

    pub fn with_interval(mut self, begin: &str, frequency_minutes: u64) -> Self {
        self.config.dump.schedule.begin = Some(begin.to_string());
        self.config.dump.schedule.frequency = Some(frequency_minutes);
        self
    }

    pub fn with_retention(mut self, retention: &str) -> Self {
        self.config.prune.retention = Some(retention.to_string());
        self
    }

    /// Use `dir` as the pre-backup script directory
    pub fn with_pre_backup_scripts(mut self, dir: &Path) -> Self {
        self.config.dump.scripts.pre_backup = Some(dir.to_path_buf());
        self
    }

    /// Use `dir` as the post-backup script directory
    pub fn with_post_backup_scripts(mut self, dir: &Path) -> Self {
        self.config.dump.scripts.post_backup = Some(dir.to_path_buf());
        self
    }

    /// Get the temp directory path
    pub fn temp_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Get a local target's path
    pub fn target_path(&self, name: &str) -> Option<PathBuf> {
        self.config.targets.get(name).map(|t| PathBuf::from(&t.url))
    }

    /// Build the Config
    pub fn build(self) -> Config {
        self.config
    }

    /// Keep the temp directory (don't delete on drop)
    pub fn persist(self) -> (Config, TempDir) {
        (self.config, self.temp_dir)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
