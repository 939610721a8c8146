//! Tests for the 'prune' command
//!
//! Pruning after a series of dumps keeps only what the retention allows.

use chrono::{Duration, TimeZone, Utc};
use mariadb_backup::config::{resolve_settings, Overrides};
use mariadb_backup::managers::dump::DumpManager;
use mariadb_backup::managers::prune::prune;
use std::sync::Arc;
use test_utils::{ConfigBuilder, MockDumper, MockExecutor, TestContext};

#[tokio::test]
async fn test_prune_after_daily_dumps() {
    let ctx = TestContext::from_builder(ConfigBuilder::minimal().with_retention("3d"));
    let settings = resolve_settings(&Overrides::default(), ctx.config()).unwrap();
    let targets = settings.build_targets().unwrap();
    let options = settings.dump_options(targets.clone());

    let manager = DumpManager::new(
        Arc::new(MockDumper::new().with_databases(&["shop"])),
        Arc::new(MockExecutor::new()),
    );
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 2, 0, 0).unwrap();
    for day in 0..10 {
        manager
            .dump_at(&options, start + Duration::days(day))
            .await
            .unwrap();
    }
    assert_eq!(ctx.list_files("backups").len(), 10);

    let now = start + Duration::days(9) + Duration::minutes(5);
    let retention = settings.retention.as_deref().unwrap();
    let report = prune(&targets, retention, now).await.unwrap();

    // Days 7, 8 and 9 are within three days; day 6 is three days and five minutes old
    assert_eq!(report.deleted_count(), 7);
    assert_eq!(
        ctx.list_files("backups"),
        vec![
            "db_backup_2024-01-08T02:00:00Z.gz",
            "db_backup_2024-01-09T02:00:00Z.gz",
            "db_backup_2024-01-10T02:00:00Z.gz",
        ]
    );
}

#[tokio::test]
async fn test_prune_count_retention_mixed_safechars() {
    let ctx = TestContext::new();
    for name in [
        "db_backup_2024-01-01T00:00:00Z.gz",
        "db_backup_2024-01-02T00-00-00Z.gz",
        "db_backup_2024-01-03T00:00:00Z.bz2",
        "notes.txt",
    ] {
        ctx.create_file(&format!("backups/{}", name), "x");
    }
    let overrides = Overrides {
        targets: vec![ctx.temp_dir().join("backups").display().to_string()],
        retention: Some("2c".to_string()),
        ..Default::default()
    };
    let settings = resolve_settings(&overrides, None).unwrap();
    let targets = settings.build_targets().unwrap();

    prune(&targets, "2c", Utc::now()).await.unwrap();

    assert_eq!(
        ctx.list_files("backups"),
        vec![
            "db_backup_2024-01-02T00-00-00Z.gz",
            "db_backup_2024-01-03T00:00:00Z.bz2",
            "notes.txt",
        ]
    );
}

#[tokio::test]
async fn test_prune_without_targets() {
    let settings = resolve_settings(&Overrides::default(), None).unwrap();
    let targets = settings.build_targets().unwrap();

    let err = prune(&targets, "7d", Utc::now()).await.unwrap_err();
    assert_eq!(err.to_string(), "no targets");
}
