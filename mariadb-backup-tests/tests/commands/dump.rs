//! Tests for the 'dump' command
//!
//! A dump lists databases, runs hooks, writes one compressed artifact and
//! copies it to every target.

use chrono::{TimeZone, Utc};
use mariadb_backup::compression::Compressor;
use mariadb_backup::config::{resolve_settings, Overrides};
use mariadb_backup::managers::dump::{DumpError, DumpManager};
use mariadb_backup::storage::Storage;
use mariadb_backup::utils::{MysqlDumper, RealExecutor};
use std::sync::Arc;
use test_utils::{
    ConfigBuilder, DumperCall, MemoryStorage, MockDumper, MockExecutor, MockResponse,
    TestContext,
};

fn decompress(compressor: Compressor, data: &[u8]) -> String {
    let mut out = Vec::new();
    compressor.decompress(data, &mut out).unwrap();
    String::from_utf8(out).unwrap()
}

#[tokio::test]
async fn test_dump_to_every_configured_target() {
    let builder = ConfigBuilder::minimal();
    let second = builder.temp_dir().join("second");
    let ctx = TestContext::from_builder(builder.add_local_target("second", &second));

    let settings = resolve_settings(&Overrides::default(), ctx.config()).unwrap();
    let options = settings.dump_options(settings.build_targets().unwrap());

    let dumper = Arc::new(MockDumper::new().with_databases(&["shop", "mysql", "blog"]));
    let manager = DumpManager::new(dumper.clone(), Arc::new(MockExecutor::new()));
    let now = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
    let report = manager.dump_at(&options, now).await.unwrap();

    assert_eq!(report.artifact, "db_backup_2024-05-06T07:08:09Z.gz");
    assert_eq!(report.databases, vec!["shop", "blog"]);
    assert_eq!(report.targets.len(), 2);
    assert!(report.warnings.is_empty());

    for dir in ["backups", "second"] {
        assert_eq!(ctx.list_files(dir), vec![report.artifact.clone()]);
        let bytes = std::fs::read(ctx.temp_dir().join(dir).join(&report.artifact)).unwrap();
        assert_eq!(bytes.len() as u64, report.size);
        let sql = decompress(Compressor::Gzip, &bytes);
        assert!(sql.contains("-- database shop"));
        assert!(!sql.contains("-- database mysql"));
    }
}

#[tokio::test]
async fn test_dump_include_skips_listing() {
    let ctx = TestContext::from_builder(
        ConfigBuilder::minimal()
            .with_include(&["only_this"])
            .with_compression("none")
            .with_safechars(),
    );
    let settings = resolve_settings(&Overrides::default(), ctx.config()).unwrap();
    let options = settings.dump_options(settings.build_targets().unwrap());

    let dumper = Arc::new(MockDumper::new().with_databases(&["a", "b"]));
    let manager = DumpManager::new(dumper.clone(), Arc::new(MockExecutor::new()));
    let now = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
    let report = manager.dump_at(&options, now).await.unwrap();

    assert_eq!(report.artifact, "db_backup_2024-05-06T07-08-09Z.sql");
    assert!(!dumper.get_calls().contains(&DumperCall::ListDatabases));
    assert_eq!(dumper.last_dump().unwrap().databases, vec!["only_this"]);

    let sql = ctx
        .read_file(&format!("backups/{}", report.artifact))
        .unwrap();
    assert!(sql.contains("-- database only_this"));
}

#[tokio::test]
async fn test_dump_through_mysql_clients() {
    let ctx = TestContext::from_builder(
        ConfigBuilder::minimal()
            .with_credentials("backup", "s3cret")
            .with_exclude(&["scratch"])
            .with_compression("bzip2"),
    );
    let settings = resolve_settings(&Overrides::default(), ctx.config()).unwrap();
    let options = settings.dump_options(settings.build_targets().unwrap());

    let executor = Arc::new(
        MockExecutor::new()
            .expect(
                "mysql",
                MockResponse::Success {
                    stdout: "information_schema\nshop\nscratch\nsys\n".to_string(),
                },
            )
            .expect(
                "mysqldump",
                MockResponse::Success {
                    stdout: "CREATE TABLE orders (id INT);\n".to_string(),
                },
            ),
    );
    let dumper = Arc::new(MysqlDumper::with_binaries(executor.clone(), "mysqldump", "mysql"));
    let manager = DumpManager::new(dumper, executor.clone());
    let report = manager.dump(&options).await.unwrap();

    assert_eq!(report.databases, vec!["shop"]);
    assert!(report.artifact.ends_with(".bz2"));

    let dump_call = executor
        .get_calls()
        .into_iter()
        .find(|c| c.program == "mysqldump")
        .unwrap();
    assert!(dump_call.args.contains(&"--databases".to_string()));
    assert!(dump_call.args.contains(&"shop".to_string()));
    assert!(!dump_call.args.iter().any(|a| a.contains("s3cret")));
    assert!(dump_call
        .env
        .iter()
        .any(|(k, v)| k == "MYSQL_PWD" && v == "s3cret"));

    let bytes = std::fs::read(ctx.temp_dir().join("backups").join(&report.artifact)).unwrap();
    assert!(decompress(Compressor::Bzip2, &bytes).contains("CREATE TABLE orders"));
}

#[tokio::test]
async fn test_dump_runs_hooks_in_order_with_environment() {
    let ctx = TestContext::new();
    let pre = ctx.create_subdir("pre");
    let post = ctx.create_subdir("post");
    ctx.create_script("pre", "20-second.sh", "true");
    ctx.create_script("pre", "10-first.sh", "true");
    ctx.create_script("post", "10-notify.sh", "true");
    ctx.create_file("pre/README", "not a hook");

    let builder = ConfigBuilder::minimal()
        .with_pre_backup_scripts(&pre)
        .with_post_backup_scripts(&post);
    let settings = resolve_settings(&Overrides::default(), Some(&builder.build())).unwrap();
    let target = Arc::new(MemoryStorage::new("mem://hooks"));
    let options = settings.dump_options(vec![target.clone() as Arc<dyn Storage>]);

    let executor = Arc::new(MockExecutor::new());
    let manager = DumpManager::new(
        Arc::new(MockDumper::new().with_databases(&["shop"])),
        executor.clone(),
    );
    let report = manager.dump(&options).await.unwrap();

    let programs: Vec<String> = executor.get_calls().into_iter().map(|c| c.program).collect();
    assert_eq!(programs, vec!["10-first.sh", "20-second.sh", "10-notify.sh"]);

    let calls = executor.get_calls();
    let env_of = |i: usize, key: &str| {
        calls[i]
            .env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    };
    assert_eq!(env_of(0, "DB_SERVER").as_deref(), Some("db.example.com"));
    assert_eq!(env_of(0, "DB_PORT").as_deref(), Some("3306"));
    assert!(env_of(0, "DUMP_FILE").is_none());
    assert!(env_of(2, "DUMP_FILE").unwrap().ends_with(&report.artifact));

    assert_eq!(target.names(), vec![report.artifact]);
}

#[tokio::test]
async fn test_failing_pre_hook_aborts_before_dump() {
    let ctx = TestContext::new();
    let pre = ctx.create_subdir("pre");
    ctx.create_script("pre", "10-check.sh", "exit 1");

    let settings = resolve_settings(
        &Overrides::default(),
        Some(&ConfigBuilder::minimal().with_pre_backup_scripts(&pre).build()),
    )
    .unwrap();
    let target = Arc::new(MemoryStorage::new("mem://pre"));
    let options = settings.dump_options(vec![target.clone() as Arc<dyn Storage>]);

    let executor = Arc::new(MockExecutor::new().expect(
        "10-check.sh",
        MockResponse::Failure {
            stderr: "disk full".to_string(),
            exit_code: 1,
        },
    ));
    let dumper = Arc::new(MockDumper::new().with_databases(&["shop"]));
    let manager = DumpManager::new(dumper.clone(), executor);

    let err = manager.dump(&options).await.unwrap_err();
    assert!(matches!(err, DumpError::PreHookFailed(_)));
    assert!(!dumper.dump_called());
    assert!(target.names().is_empty());
}

#[tokio::test]
async fn test_failing_post_hook_is_a_warning() {
    let ctx = TestContext::new();
    let post = ctx.create_subdir("post");
    ctx.create_script("post", "10-a.sh", "exit 1");
    ctx.create_script("post", "20-b.sh", "true");

    let settings = resolve_settings(
        &Overrides::default(),
        Some(&ConfigBuilder::minimal().with_post_backup_scripts(&post).build()),
    )
    .unwrap();
    let target = Arc::new(MemoryStorage::new("mem://post"));
    let options = settings.dump_options(vec![target.clone() as Arc<dyn Storage>]);

    let executor = Arc::new(MockExecutor::new().expect(
        "10-a.sh",
        MockResponse::Failure {
            stderr: "boom".to_string(),
            exit_code: 2,
        },
    ));
    let manager = DumpManager::new(
        Arc::new(MockDumper::new().with_databases(&["shop"])),
        executor.clone(),
    );

    let report = manager.dump(&options).await.unwrap();
    assert_eq!(report.warnings.len(), 1);
    assert!(executor.was_called("20-b.sh"));
    assert_eq!(target.names().len(), 1);
}

#[tokio::test]
async fn test_one_failing_target_does_not_block_others() {
    let healthy = Arc::new(MemoryStorage::new("mem://healthy"));
    let broken = Arc::new(MemoryStorage::new("mem://broken"));
    broken.fail_writes();

    let settings = resolve_settings(&Overrides::default(), Some(&ConfigBuilder::minimal().build()))
        .unwrap();
    let options = settings.dump_options(vec![
        broken.clone() as Arc<dyn Storage>,
        healthy.clone() as Arc<dyn Storage>,
    ]);

    let manager = DumpManager::new(
        Arc::new(MockDumper::new().with_databases(&["shop"])),
        Arc::new(MockExecutor::new()),
    );
    let err = manager.dump(&options).await.unwrap_err();

    match err {
        DumpError::TargetsFailed(errors) => assert_eq!(errors.targets(), vec!["mem://broken"]),
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(healthy.names().len(), 1);
    assert!(broken.names().is_empty());
}

#[tokio::test]
async fn test_dump_without_targets() {
    let settings = resolve_settings(&Overrides::default(), None).unwrap();
    let options = settings.dump_options(Vec::new());
    let manager = DumpManager::new(Arc::new(MockDumper::new()), Arc::new(MockExecutor::new()));

    let err = manager.dump(&options).await.unwrap_err();
    assert_eq!(err.to_string(), "no targets");
}

#[tokio::test]
async fn test_dump_with_only_system_databases() {
    let target = Arc::new(MemoryStorage::new("mem://empty"));
    let settings = resolve_settings(&Overrides::default(), None).unwrap();
    let options = settings.dump_options(vec![target.clone() as Arc<dyn Storage>]);
    let manager = DumpManager::new(
        Arc::new(MockDumper::new().with_databases(&["mysql", "sys"])),
        Arc::new(MockExecutor::new()),
    );

    let err = manager.dump(&options).await.unwrap_err();
    assert!(matches!(err, DumpError::NoDatabases));
    assert!(target.names().is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn test_dump_captures_real_dump_tool_output() {
    let ctx = TestContext::from_builder(ConfigBuilder::minimal().with_include(&["shop"]));
    let dump_tool = ctx.create_script(
        "bin",
        "fake-dump",
        "echo \"-- args: $*\"\necho 'CREATE TABLE t (id INT);'",
    );
    let settings = resolve_settings(&Overrides::default(), ctx.config()).unwrap();
    let options = settings.dump_options(settings.build_targets().unwrap());

    let executor = Arc::new(RealExecutor::new());
    let dumper = Arc::new(MysqlDumper::with_binaries(
        executor.clone(),
        &dump_tool.to_string_lossy(),
        "mysql",
    ));
    let now = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
    let report = DumpManager::new(dumper, executor)
        .dump_at(&options, now)
        .await
        .unwrap();

    assert_eq!(report.artifact, "db_backup_2021-01-01T00:00:00Z.gz");
    let bytes = std::fs::read(ctx.temp_dir().join("backups").join(&report.artifact)).unwrap();
    let sql = decompress(Compressor::Gzip, &bytes);
    assert!(sql.contains("CREATE TABLE t (id INT);"), "dump output lost: {:?}", sql);
    assert!(sql.contains("--databases shop"), "unexpected arguments: {:?}", sql);
}
