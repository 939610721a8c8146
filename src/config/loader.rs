use super::types::*;
use crate::compression::{CompressionError, Compressor};
use crate::managers::retention::{Retention, RetentionError};
use crate::managers::timer::{TimerConfig, TimerError, TimerOptions};
use crate::storage::{StorageError, TargetUrl};
use crate::utils::database::{Connection, DEFAULT_PORT};
use std::fs;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Target '{0}' not found")]
    TargetNotFound(String),

    #[error(transparent)]
    InvalidTarget(#[from] StorageError),

    #[error(transparent)]
    Timer(#[from] TimerError),

    #[error(transparent)]
    Retention(#[from] RetentionError),

    #[error(transparent)]
    Compression(#[from] CompressionError),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Load and validate configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let contents = fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    validate_config(&config)?;
    Ok(config)
}

/// Checks that need nothing beyond the file itself
fn validate_config(config: &Config) -> Result<()> {
    for (name, target) in &config.targets {
        TargetUrl::parse(&target.url).map_err(|e| {
            ConfigError::ValidationError(format!("Target '{}': {}", name, e))
        })?;
    }

    for name in &config.dump.targets {
        if !config.targets.contains_key(name) {
            return Err(ConfigError::TargetNotFound(name.clone()));
        }
    }

    Ok(())
}

/// Pick the timer options: command-line ones replace the file's entirely
fn effective_timer(overrides: &TimerOptions, file: Option<&Config>) -> TimerOptions {
    if *overrides != TimerOptions::default() {
        return overrides.clone();
    }
    file.map(|c| c.dump.schedule.timer_options())
        .unwrap_or_default()
}

fn resolve_targets(overrides: &Overrides, file: Option<&Config>) -> Result<Vec<ResolvedTarget>> {
    if !overrides.targets.is_empty() {
        return overrides
            .targets
            .iter()
            .map(|url| -> Result<ResolvedTarget> {
                TargetUrl::parse(url)?;
                Ok(ResolvedTarget {
                    name: url.clone(),
                    url: url.clone(),
                    credentials: overrides.credentials.clone(),
                })
            })
            .collect();
    }

    let Some(config) = file else {
        return Ok(Vec::new());
    };

    let names: Vec<&String> = if config.dump.targets.is_empty() {
        config.targets.keys().collect()
    } else {
        config.dump.targets.iter().collect()
    };

    names
        .into_iter()
        .map(|name| -> Result<ResolvedTarget> {
            let target = config
                .targets
                .get(name)
                .ok_or_else(|| ConfigError::TargetNotFound(name.clone()))?;
            TargetUrl::parse(&target.url)?;
            Ok(ResolvedTarget {
                name: name.clone(),
                url: target.url.clone(),
                credentials: target.credentials.clone(),
            })
        })
        .collect()
}

/// Merge command-line overrides, the config file and built-in defaults
///
/// Resolution order is override > file > default. The result is validated
/// once here; nothing downstream re-reads flags, environment or the file.
pub fn resolve_settings(overrides: &Overrides, file: Option<&Config>) -> Result<Settings> {
    let database = file.map(|c| c.database.clone()).unwrap_or_default();
    let dump = file.map(|c| c.dump.clone()).unwrap_or_default();

    let connection = Connection {
        host: overrides
            .server
            .clone()
            .or(database.server)
            .unwrap_or_default(),
        port: overrides.port.or(database.port).unwrap_or(DEFAULT_PORT),
        user: overrides.user.clone().or(database.user).unwrap_or_default(),
        pass: overrides
            .pass
            .clone()
            .or(database.password)
            .unwrap_or_default(),
    };

    let timer = TimerConfig::from_options(&effective_timer(&overrides.timer, file))?;

    let compression = overrides
        .compression
        .clone()
        .or(dump.compression)
        .unwrap_or_else(|| DEFAULT_COMPRESSION.to_string());
    let compressor = Compressor::from_name(&compression)?;

    let retention = overrides
        .retention
        .clone()
        .or_else(|| file.and_then(|c| c.prune.retention.clone()));
    if let Some(retention) = &retention {
        Retention::parse(retention)?;
    }

    let pick = |over: &Vec<String>, file: Vec<String>| {
        if over.is_empty() {
            file
        } else {
            over.clone()
        }
    };

    Ok(Settings {
        connection,
        targets: resolve_targets(overrides, file)?,
        include: pick(&overrides.include, dump.include),
        exclude: pick(&overrides.exclude, dump.exclude),
        safechars: overrides.safechars.or(dump.safechars).unwrap_or(false),
        suppress_use_database: overrides
            .no_database_name
            .or(dump.no_database_name)
            .unwrap_or(false),
        compact: overrides.compact.or(dump.compact).unwrap_or(false),
        compressor,
        max_allowed_packet: overrides
            .max_allowed_packet
            .or(dump.max_allowed_packet)
            .unwrap_or(DEFAULT_MAX_ALLOWED_PACKET),
        timer,
        pre_backup_scripts: overrides
            .pre_backup_scripts
            .clone()
            .or(dump.scripts.pre_backup)
            .map(|p| super::expand_tilde(&p)),
        post_backup_scripts: overrides
            .post_backup_scripts
            .clone()
            .or(dump.scripts.post_backup)
            .map(|p| super::expand_tilde(&p)),
        retention,
        logging: file.map(|c| c.logging.clone()).unwrap_or_default(),
    })
}
