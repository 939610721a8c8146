use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use mariadb_backup::config::{self, Overrides, Settings};
use mariadb_backup::managers::dump::{DumpError, DumpManager, DumpOptions};
use mariadb_backup::managers::logging::{init_console_logging, init_logging, LoggingConfig};
use mariadb_backup::managers::prune::{prune, PruneError};
use mariadb_backup::managers::restore::{parse_database_mapping, DatabaseMap, RestoreManager};
use mariadb_backup::managers::timer::{Scheduler, TimerOptions};
use mariadb_backup::storage::{AwsCredentials, Credentials, SmbCredentials, Storage};
use mariadb_backup::utils::{CommandExecutor, MysqlDumper, RealExecutor};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "mariadb-backup")]
#[command(about = "Scheduled MariaDB/MySQL dumps to local, SMB and S3 targets", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "DB_DUMP_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    database: DatabaseArgs,

    #[command(flatten)]
    targets: TargetArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct DatabaseArgs {
    /// Database server hostname
    #[arg(long, env = "DB_SERVER", global = true)]
    server: Option<String>,

    /// Database server port
    #[arg(long, env = "DB_PORT", global = true)]
    port: Option<u16>,

    /// Database user
    #[arg(long, env = "DB_USER", global = true)]
    user: Option<String>,

    /// Database password
    #[arg(long, env = "DB_PASS", hide_env_values = true, global = true)]
    pass: Option<String>,
}

#[derive(Args)]
struct TargetArgs {
    /// Backup target URL: /path, file:///path, smb://host/share/path or
    /// s3://bucket/path (repeatable; replaces targets from the config file)
    #[arg(long = "target", env = "DB_DUMP_TARGET", value_delimiter = ',', global = true)]
    targets: Vec<String>,

    /// SMB username for smb:// targets
    #[arg(long, env = "SMB_USER", global = true)]
    smb_user: Option<String>,

    /// SMB password for smb:// targets
    #[arg(long, env = "SMB_PASS", hide_env_values = true, global = true)]
    smb_pass: Option<String>,

    /// SMB domain/workgroup for smb:// targets
    #[arg(long, env = "SMB_DOMAIN", global = true)]
    smb_domain: Option<String>,

    /// Custom S3 endpoint, e.g. for MinIO
    #[arg(long, env = "AWS_ENDPOINT_URL", global = true)]
    aws_endpoint_url: Option<String>,

    /// S3 region
    #[arg(long, env = "AWS_REGION", global = true)]
    aws_region: Option<String>,

    /// S3 access key id
    #[arg(long, env = "AWS_ACCESS_KEY_ID", global = true)]
    aws_access_key_id: Option<String>,

    /// S3 secret access key
    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true, global = true)]
    aws_secret_access_key: Option<String>,

    /// Use path-style S3 addressing
    #[arg(long, env = "AWS_PATH_STYLE", global = true)]
    aws_path_style: bool,
}

#[derive(Args)]
struct DumpArgs {
    /// Databases to dump (default: all except system schemas)
    #[arg(long, env = "DB_DUMP_INCLUDE", value_delimiter = ',')]
    include: Vec<String>,

    /// Databases to skip
    #[arg(long, env = "DB_DUMP_EXCLUDE", value_delimiter = ',')]
    exclude: Vec<String>,

    /// Replace ':' in artifact names with '-'
    #[arg(long, env = "DB_DUMP_SAFECHARS")]
    safechars: bool,

    /// Omit CREATE DATABASE and USE statements from the dump
    #[arg(long, env = "DB_DUMP_NO_DATABASE_NAME")]
    no_database_name: bool,

    /// Produce a less verbose dump
    #[arg(long, env = "DB_DUMP_COMPACT")]
    compact: bool,

    /// Compression algorithm: gzip, bzip2 or none
    #[arg(long, env = "DB_DUMP_COMPRESSION")]
    compression: Option<String>,

    /// Maximum packet size for the dump client, in bytes
    #[arg(long, env = "DB_DUMP_MAX_ALLOWED_PACKET")]
    max_allowed_packet: Option<u64>,

    /// Run a single dump and exit
    #[arg(long, env = "DB_DUMP_ONCE")]
    once: bool,

    /// Cron expression for dump times
    #[arg(long, env = "DB_DUMP_CRON")]
    cron: Option<String>,

    /// First dump time: HHMM local time, or +<minutes> from start
    #[arg(long, env = "DB_DUMP_BEGIN")]
    begin: Option<String>,

    /// Minutes between dumps
    #[arg(long, env = "DB_DUMP_FREQUENCY")]
    frequency: Option<u64>,

    /// Directory of *.sh scripts to run before each dump
    #[arg(long, env = "DB_DUMP_PRE_BACKUP_SCRIPTS")]
    pre_backup_scripts: Option<PathBuf>,

    /// Directory of *.sh scripts to run after each dump
    #[arg(long, env = "DB_DUMP_POST_BACKUP_SCRIPTS")]
    post_backup_scripts: Option<PathBuf>,

    /// Prune after each dump: <n>h, d, w, m, y (age) or <n>c (count)
    #[arg(long, env = "DB_DUMP_RETENTION")]
    retention: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Dump databases on the configured schedule
    #[command(alias = "backup")]
    Dump(DumpArgs),

    /// Apply the retention policy to every target once
    Prune {
        /// <n>h, d, w, m, y (age) or <n>c (count)
        #[arg(long, env = "DB_DUMP_RETENTION")]
        retention: Option<String>,
    },

    /// Restore an artifact from the first target into the database
    Restore {
        /// Artifact file name, e.g. db_backup_2024-01-01T00:00:00Z.gz
        filename: String,

        /// Restore database `old` as `new`; repeatable
        #[arg(long = "database", value_name = "OLD:NEW", value_parser = parse_database_mapping)]
        databases: Vec<(String, String)>,
    },

    /// Validate configuration and print a summary
    Validate(DumpArgs),
}

/// Flag-to-Option: an unset boolean flag must not override the file
fn flag(value: bool) -> Option<bool> {
    value.then_some(true)
}

fn build_overrides(cli: &Cli) -> Overrides {
    let t = &cli.targets;
    let mut overrides = Overrides {
        server: cli.database.server.clone(),
        port: cli.database.port,
        user: cli.database.user.clone(),
        pass: cli.database.pass.clone(),
        targets: t.targets.clone(),
        credentials: Credentials {
            smb: SmbCredentials {
                domain: t.smb_domain.clone().unwrap_or_default(),
                username: t.smb_user.clone().unwrap_or_default(),
                password: t.smb_pass.clone().unwrap_or_default(),
            },
            aws: AwsCredentials {
                endpoint_url: t.aws_endpoint_url.clone(),
                region: t.aws_region.clone(),
                access_key_id: t.aws_access_key_id.clone(),
                secret_access_key: t.aws_secret_access_key.clone(),
                path_style: t.aws_path_style,
            },
        },
        ..Default::default()
    };

    match &cli.command {
        Commands::Dump(args) | Commands::Validate(args) => {
            overrides.include = args.include.clone();
            overrides.exclude = args.exclude.clone();
            overrides.safechars = flag(args.safechars);
            overrides.no_database_name = flag(args.no_database_name);
            overrides.compact = flag(args.compact);
            overrides.compression = args.compression.clone();
            overrides.max_allowed_packet = args.max_allowed_packet;
            overrides.timer = TimerOptions {
                once: args.once,
                cron: args.cron.clone(),
                begin: args.begin.clone(),
                frequency: args.frequency,
            };
            overrides.pre_backup_scripts = args.pre_backup_scripts.clone();
            overrides.post_backup_scripts = args.post_backup_scripts.clone();
            overrides.retention = args.retention.clone();
        }
        Commands::Prune { retention } => {
            overrides.retention = retention.clone();
        }
        Commands::Restore { .. } => {}
    }

    overrides
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration file if given, then layer flags/env on top
    let file = match &cli.config {
        Some(path) => Some(
            config::load_config(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
        ),
        None => None,
    };
    let settings = config::resolve_settings(&build_overrides(&cli), file.as_ref())?;

    // Validation only needs the console; everything else gets full logging
    // (must keep guard alive)
    let _log_guard = match &cli.command {
        Commands::Validate(_) => {
            init_console_logging();
            None
        }
        _ => Some(init_logging(&LoggingConfig::from_settings(&settings.logging))?),
    };

    match cli.command {
        Commands::Dump(_) => handle_dump(&settings).await,
        Commands::Prune { .. } => handle_prune(&settings).await,
        Commands::Restore {
            filename,
            databases,
        } => handle_restore(&settings, &filename, databases.into_iter().collect()).await,
        Commands::Validate(_) => handle_validate(&settings),
    }
}

/// Dump, then prune when a retention policy is set
async fn run_once(
    manager: &DumpManager,
    options: &DumpOptions,
    retention: Option<&str>,
) -> Result<()> {
    let report = manager.dump(options).await?;
    for warning in &report.warnings {
        warn!("{}", warning);
    }
    info!(
        "Backup {} ({} bytes) written to {} target(s)",
        report.artifact,
        report.size,
        report.targets.len()
    );

    if let Some(retention) = retention {
        let pruned = prune(&options.targets, retention, Utc::now()).await?;
        info!("Pruned {} artifact(s)", pruned.deleted_count());
    }
    Ok(())
}

async fn handle_dump(settings: &Settings) -> Result<()> {
    if settings.targets.is_empty() {
        return Err(DumpError::NoTargets.into());
    }
    settings.require_server()?;

    let targets = settings.build_targets()?;
    let options = settings.dump_options(targets);
    let executor: Arc<dyn CommandExecutor> = Arc::new(RealExecutor::new());
    let manager = DumpManager::new(
        Arc::new(MysqlDumper::with_executor(executor.clone())),
        executor,
    );
    let retention = settings.retention.as_deref();

    let cancel = CancellationToken::new();
    spawn_shutdown_listener(cancel.clone());

    info!("Schedule: {}", settings.timer);
    Scheduler::new(settings.timer.clone())
        .run(|| run_once(&manager, &options, retention), cancel)
        .await
}

async fn handle_prune(settings: &Settings) -> Result<()> {
    if settings.targets.is_empty() {
        return Err(PruneError::NoTargets.into());
    }
    let retention = settings
        .retention
        .as_deref()
        .context("no retention policy configured (--retention or [prune].retention)")?;

    let targets = settings.build_targets()?;
    let report = prune(&targets, retention, Utc::now()).await?;

    for target in &report.targets {
        println!(
            "{}: deleted {}, kept {}",
            target.target,
            target.deleted.len(),
            target.kept
        );
    }
    println!("✓ Pruned {} artifact(s)", report.deleted_count());
    Ok(())
}

async fn handle_restore(settings: &Settings, filename: &str, databases: DatabaseMap) -> Result<()> {
    if settings.targets.is_empty() {
        return Err(DumpError::NoTargets.into());
    }
    settings.require_server()?;

    let targets = settings.build_targets()?;
    let target: &dyn Storage = targets[0].as_ref();
    if targets.len() > 1 {
        info!("Restoring from first target {}", target.url());
    }

    println!("Restoring {} from {}", filename, target.url());
    for (from, to) in &databases {
        info!("Restoring database '{}' as '{}'", from, to);
    }
    let size = RestoreManager::new(Arc::new(MysqlDumper::new()))
        .with_database_map(databases)
        .restore(target, filename, &settings.connection)
        .await?;
    println!("✓ Restore completed successfully ({} bytes)", size);
    Ok(())
}

fn handle_validate(settings: &Settings) -> Result<()> {
    settings.build_targets()?;

    println!("Configuration is valid!");
    if settings.connection.host.is_empty() {
        println!("Database: (not set)");
    } else {
        println!(
            "Database: {}:{}",
            settings.connection.host, settings.connection.port
        );
    }
    println!("Targets: {}", settings.targets.len());
    for target in &settings.targets {
        println!("  {} -> {}", target.name, target.url);
    }
    println!("Schedule: {}", settings.timer);
    println!("Compression: {}", settings.compressor);
    println!(
        "Retention: {}",
        settings.retention.as_deref().unwrap_or("(none)")
    );
    Ok(())
}

/// Cancel `token` on SIGINT or SIGTERM
fn spawn_shutdown_listener(token: CancellationToken) {
    tokio::spawn(async move {
        wait_for_shutdown().await;
        info!("Shutdown requested, stopping after the current run");
        token.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}
