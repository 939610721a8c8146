use crate::compression::Compressor;
use crate::managers::timer::{TimerConfig, TimerOptions};
use crate::storage::Credentials;
use crate::utils::database::Connection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Root configuration file structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Named backup targets
    #[serde(default)]
    pub targets: BTreeMap<String, TargetConfig>,

    #[serde(default)]
    pub dump: DumpConfig,

    #[serde(default)]
    pub prune: PruneConfig,

    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Database server connection
#[derive(Clone, Default, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// A backup destination
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TargetConfig {
    /// `/path`, `file:///path`, `smb://host/share/path` or `s3://bucket/path`
    pub url: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub credentials: Credentials,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DumpConfig {
    /// Names from `[targets]`; empty means every defined target
    #[serde(default)]
    pub targets: Vec<String>,

    /// Databases to dump; empty means all except `exclude` and system schemas
    #[serde(default)]
    pub include: Vec<String>,

    #[serde(default)]
    pub exclude: Vec<String>,

    #[serde(default)]
    pub safechars: Option<bool>,

    /// Omit `CREATE DATABASE`/`USE` statements
    #[serde(default)]
    pub no_database_name: Option<bool>,

    #[serde(default)]
    pub compact: Option<bool>,

    /// `gzip`, `bzip2` or `none`
    #[serde(default)]
    pub compression: Option<String>,

    #[serde(default)]
    pub max_allowed_packet: Option<u64>,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub scripts: ScriptsConfig,
}

/// At most one of `once`, `cron` and `begin`/`frequency`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ScheduleConfig {
    #[serde(default)]
    pub once: Option<bool>,
    #[serde(default)]
    pub cron: Option<String>,
    #[serde(default)]
    pub begin: Option<String>,
    /// Minutes between runs
    #[serde(default)]
    pub frequency: Option<u64>,
}

impl ScheduleConfig {
    pub fn timer_options(&self) -> TimerOptions {
        TimerOptions {
            once: self.once.unwrap_or(false),
            cron: self.cron.clone(),
            begin: self.begin.clone(),
            frequency: self.frequency,
        }
    }
}

/// Hook script directories
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ScriptsConfig {
    #[serde(default)]
    pub pre_backup: Option<PathBuf>,
    #[serde(default)]
    pub post_backup: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PruneConfig {
    /// e.g. `7d`, `4w`, `30c`
    #[serde(default)]
    pub retention: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingSettings {
    /// Directory for daily log files; console only when unset
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_max_files")]
    pub max_files: u32,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: None,
            level: default_log_level(),
            max_files: default_log_max_files(),
        }
    }
}

/// Values given on the command line or through the environment. Anything
/// set here wins over the config file.
#[derive(Clone, Default)]
pub struct Overrides {
    pub server: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub pass: Option<String>,

    /// Target URLs; when non-empty they replace the file's targets
    pub targets: Vec<String>,
    /// Credentials applied to the URLs in `targets`
    pub credentials: Credentials,

    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub safechars: Option<bool>,
    pub no_database_name: Option<bool>,
    pub compact: Option<bool>,
    pub compression: Option<String>,
    pub max_allowed_packet: Option<u64>,

    /// When any timer option is set here, the file's schedule is ignored
    pub timer: TimerOptions,

    pub pre_backup_scripts: Option<PathBuf>,
    pub post_backup_scripts: Option<PathBuf>,

    pub retention: Option<String>,
}

impl std::fmt::Debug for Overrides {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Overrides")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("pass", &self.pass.as_ref().map(|_| "***"))
            .field("targets", &self.targets)
            .field("credentials", &self.credentials)
            .field("timer", &self.timer)
            .field("retention", &self.retention)
            .finish_non_exhaustive()
    }
}

/// A target ready to be turned into a storage backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    /// Name from the config file, or the URL itself for command-line targets
    pub name: String,
    pub url: String,
    pub credentials: Credentials,
}

/// Fully resolved, validated settings for one invocation
#[derive(Debug, Clone)]
pub struct Settings {
    pub connection: Connection,
    pub targets: Vec<ResolvedTarget>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub safechars: bool,
    pub suppress_use_database: bool,
    pub compact: bool,
    pub compressor: Compressor,
    pub max_allowed_packet: u64,
    pub timer: TimerConfig,
    pub pre_backup_scripts: Option<PathBuf>,
    pub post_backup_scripts: Option<PathBuf>,
    /// Validated retention expression, if pruning is enabled
    pub retention: Option<String>,
    pub logging: LoggingSettings,
}

// Default value functions

pub const DEFAULT_COMPRESSION: &str = "gzip";
pub const DEFAULT_MAX_ALLOWED_PACKET: u64 = 4_194_304;

fn default_log_level() -> String { "info".to_string() }
fn default_log_max_files() -> u32 { 10 }
