//! Test fixtures and sample data
//!
//! Provides pre-built artifact names and config templates for testing.

use chrono::{DateTime, Duration, TimeZone, Utc};
use mariadb_backup::artifact::artifact_name;

/// Ages in hours of the artifacts in [`aged_artifacts`], before the extra
/// half hour each one carries
pub const ARTIFACT_AGES_HOURS: [f64; 24] = [
    0.25, 1.0, 2.0, 3.0, 24.0, 36.0, 48.0, 60.0, 72.0, 167.0, 168.0, 240.0, 336.0, 504.0,
    576.0, 744.0, 720.0, 1000.0, 1440.0, 1800.0, 2160.0, 8760.0, 12000.0, 17520.0,
];

/// Reference time the aged artifacts are measured from
pub fn reference_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 1, 1, 0, 30, 0).unwrap()
}

/// Artifact name for a dump taken `hours` (plus half an hour) before
/// [`reference_time`]
pub fn artifact_aged(hours: f64) -> String {
    let minutes = (hours * 60.0).round() as i64 + 30;
    artifact_name(reference_time() - Duration::minutes(minutes), "gz", false)
}

/// One gzip artifact per entry of [`ARTIFACT_AGES_HOURS`], youngest first
pub fn aged_artifacts() -> Vec<String> {
    ARTIFACT_AGES_HOURS.iter().map(|h| artifact_aged(*h)).collect()
}

/// Files that live next to artifacts but are never touched by pruning
pub fn foreign_files() -> Vec<String> {
    vec![
        "README.txt".to_string(),
        "db_backup_notatime.gz".to_string(),
        "backup_2020-01-01T00:00:00Z.gz".to_string(),
    ]
}

/// Minimal valid config TOML template
pub fn minimal_config_toml() -> &'static str {
    r#"
[database]
server = "db.example.com"
user = "backup"
password = "secret"

[targets.local]
url = "{backup_path}"
description = "Local test target"

[dump]
compression = "gzip"

[dump.schedule]
once = true
"#
}

/// Config with several targets, a cron schedule and pruning
pub fn multi_target_config_toml() -> &'static str {
    r#"
[database]
server = "db.example.com"
port = 3307

[targets.local]
url = "{backup_path}"

[targets.archive]
url = "s3://backup-bucket/mariadb"

[targets.archive.credentials.aws]
region = "eu-west-1"
access_key_id = "AKIDEXAMPLE"
secret_access_key = "wJalrXUtnFEMI"

[targets.nas]
url = "smb://nas.local/backups/db"

[targets.nas.credentials.smb]
username = "backup"
password = "nas-secret"

[dump]
targets = ["local", "archive"]
exclude = ["scratch"]
compression = "bzip2"
safechars = true

[dump.schedule]
cron = "0 3 * * *"

[prune]
retention = "14d"

[logging]
level = "debug"
max_files = 3
"#
}

/// Render a template, substituting `{backup_path}`
pub fn render_config(template: &str, backup_path: &std::path::Path) -> String {
    template.replace("{backup_path}", &backup_path.display().to_string())
}
