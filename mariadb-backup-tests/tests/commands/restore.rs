//! Tests for the 'restore' command
//!
//! The restore command fetches an artifact, decompresses it by extension and
//! replays it into the server.

use chrono::{TimeZone, Utc};
use mariadb_backup::config::{resolve_settings, Overrides};
use mariadb_backup::managers::dump::DumpManager;
use mariadb_backup::managers::restore::{DatabaseMap, RestoreError, RestoreManager};
use mariadb_backup::storage::{Storage, StorageError};
use mariadb_backup::utils::MysqlDumper;
use rstest::rstest;
use std::sync::Arc;
use test_utils::{
    ConfigBuilder, DumperCall, MemoryStorage, MockDumper, MockExecutor, TestContext,
};

#[rstest]
#[case("gzip")]
#[case("bzip2")]
#[case("none")]
#[tokio::test]
async fn test_restore_what_was_dumped(#[case] compression: &str) {
    let ctx = TestContext::from_builder(ConfigBuilder::minimal().with_compression(compression));
    let settings = resolve_settings(&Overrides::default(), ctx.config()).unwrap();
    let targets = settings.build_targets().unwrap();
    let options = settings.dump_options(targets.clone());

    let dumper = Arc::new(MockDumper::new().with_databases(&["shop", "blog"]));
    let report = DumpManager::new(dumper.clone(), Arc::new(MockExecutor::new()))
        .dump_at(&options, Utc.with_ymd_and_hms(2024, 2, 3, 4, 5, 6).unwrap())
        .await
        .unwrap();

    let size = RestoreManager::new(dumper.clone())
        .restore(targets[0].as_ref(), &report.artifact, &settings.connection)
        .await
        .unwrap();
    assert_eq!(size, report.size);

    let restored = dumper
        .get_calls()
        .into_iter()
        .find_map(|call| match call {
            DumperCall::Restore(sql) => Some(String::from_utf8(sql).unwrap()),
            _ => None,
        })
        .unwrap();
    assert_eq!(
        restored,
        "-- database shop\nCREATE TABLE t (id INT);\n-- database blog\nCREATE TABLE t (id INT);\n"
    );
}

#[tokio::test]
async fn test_restore_feeds_client_stdin() {
    let storage = MemoryStorage::new("mem://restore");
    storage.insert("db_backup_2024-01-01T00:00:00Z.sql", b"INSERT INTO t VALUES (1);\n");

    let executor = Arc::new(MockExecutor::new());
    let dumper = Arc::new(MysqlDumper::with_binaries(executor.clone(), "mysqldump", "mysql"));
    let settings = resolve_settings(
        &Overrides::default(),
        Some(&ConfigBuilder::minimal().with_credentials("root", "pw").build()),
    )
    .unwrap();

    RestoreManager::new(dumper)
        .restore(&storage, "db_backup_2024-01-01T00:00:00Z.sql", &settings.connection)
        .await
        .unwrap();

    let call = executor.get_calls().pop().unwrap();
    assert_eq!(call.program, "mysql");
    assert!(call.args.contains(&"--host=db.example.com".to_string()));
    assert_eq!(call.input.as_deref(), Some(&b"INSERT INTO t VALUES (1);\n"[..]));
}

#[tokio::test]
async fn test_restore_missing_artifact() {
    let storage = MemoryStorage::new("mem://restore");
    let dumper = Arc::new(MockDumper::new());

    let err = RestoreManager::new(dumper.clone())
        .restore(
            &storage,
            "db_backup_2024-01-01T00:00:00Z.gz",
            &resolve_settings(&Overrides::default(), None).unwrap().connection,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, RestoreError::Storage(StorageError::NotFound { .. })));
    assert!(dumper.get_calls().is_empty());
}

#[tokio::test]
async fn test_restore_unknown_extension() {
    let storage = MemoryStorage::new("mem://restore");
    storage.insert("db_backup_2024-01-01T00:00:00Z.zst", b"??");

    let err = RestoreManager::new(Arc::new(MockDumper::new()))
        .restore(
            &storage as &dyn Storage,
            "db_backup_2024-01-01T00:00:00Z.zst",
            &resolve_settings(&Overrides::default(), None).unwrap().connection,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, RestoreError::Compression(_)));
}

#[tokio::test]
async fn test_restore_unreachable_target() {
    let storage = MemoryStorage::new("mem://down");
    storage.insert("db_backup_2024-01-01T00:00:00Z.gz", b"");
    storage.fail_reads();

    let err = RestoreManager::new(Arc::new(MockDumper::new()))
        .restore(
            &storage,
            "db_backup_2024-01-01T00:00:00Z.gz",
            &resolve_settings(&Overrides::default(), None).unwrap().connection,
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RestoreError::Storage(StorageError::TargetUnreachable { .. })
    ));
    assert!(err.to_string().contains("mem://down"));
}

#[tokio::test]
async fn test_restore_into_differently_named_databases() {
    let storage = MemoryStorage::new("mem://restore");
    storage.insert(
        "db_backup_2024-01-01T00:00:00Z.sql",
        b"CREATE DATABASE `shop`;\nUSE `shop`;\nINSERT INTO t VALUES (1);\nUSE `blog`;\n",
    );

    let executor = Arc::new(MockExecutor::new());
    let dumper = Arc::new(MysqlDumper::with_binaries(executor.clone(), "mysqldump", "mysql"));
    let databases = DatabaseMap::from([
        ("shop".to_string(), "shop_staging".to_string()),
        ("blog".to_string(), "blog_staging".to_string()),
    ]);

    RestoreManager::new(dumper)
        .with_database_map(databases)
        .restore(
            &storage,
            "db_backup_2024-01-01T00:00:00Z.sql",
            &resolve_settings(&Overrides::default(), None).unwrap().connection,
        )
        .await
        .unwrap();

    let call = executor.get_calls().pop().unwrap();
    assert_eq!(
        call.input.as_deref(),
        Some(
            &b"CREATE DATABASE `shop_staging`;\nUSE `shop_staging`;\nINSERT INTO t VALUES (1);\nUSE `blog_staging`;\n"[..]
        )
    );
}
