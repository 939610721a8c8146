//! MariaDB integration tests
//!
//! These tests require Docker and verify the dump/restore workflow end to end.

use super::common::{
    exec_sql, is_client_available, is_docker_available, start_mariadb_container, ROOT_PASSWORD,
};
use mariadb_backup::config::{resolve_settings, Overrides};
use mariadb_backup::managers::dump::DumpManager;
use mariadb_backup::managers::prune::prune;
use mariadb_backup::managers::restore::RestoreManager;
use mariadb_backup::utils::{MysqlDumper, RealExecutor};
use std::sync::Arc;
use test_utils::TestContext;

const PORT: u16 = 33061;

fn create_test_data(container: &str) -> anyhow::Result<()> {
    exec_sql(container, "CREATE DATABASE shop")?;
    exec_sql(
        container,
        "CREATE TABLE shop.orders (id INT PRIMARY KEY, item TEXT)",
    )?;
    exec_sql(
        container,
        "INSERT INTO shop.orders VALUES (1, 'a'), (2, 'b'), (3, 'c')",
    )?;
    Ok(())
}

fn count_orders(container: &str) -> anyhow::Result<i32> {
    let result = exec_sql(container, "SELECT COUNT(*) FROM shop.orders")?;
    result
        .parse::<i32>()
        .map_err(|e| anyhow::anyhow!("Failed to parse count: {}", e))
}

#[tokio::test]
#[ignore]
async fn test_mariadb_dump_and_restore() {
    if !is_docker_available() || !is_client_available() {
        eprintln!("Docker or MariaDB client not available, skipping test");
        return;
    }

    let container = "mariadb-backup-test-dump-restore";
    let _guard = start_mariadb_container(container, PORT).unwrap();
    create_test_data(container).unwrap();

    let ctx = TestContext::new();
    let backups = ctx.create_subdir("backups");
    let overrides = Overrides {
        server: Some("127.0.0.1".to_string()),
        port: Some(PORT),
        user: Some("root".to_string()),
        pass: Some(ROOT_PASSWORD.to_string()),
        targets: vec![backups.display().to_string()],
        retention: Some("1c".to_string()),
        ..Default::default()
    };
    let settings = resolve_settings(&overrides, None).unwrap();
    let targets = settings.build_targets().unwrap();
    let options = settings.dump_options(targets.clone());

    let executor = Arc::new(RealExecutor::new());
    let dumper = Arc::new(MysqlDumper::with_executor(executor.clone()));
    let manager = DumpManager::new(dumper.clone(), executor);

    let report = manager.dump(&options).await.unwrap();
    assert!(report.databases.contains(&"shop".to_string()));
    assert!(!report.databases.contains(&"mysql".to_string()));
    assert_eq!(ctx.list_files("backups"), vec![report.artifact.clone()]);

    exec_sql(container, "DROP DATABASE shop").unwrap();
    RestoreManager::new(dumper)
        .restore(targets[0].as_ref(), &report.artifact, &settings.connection)
        .await
        .unwrap();
    assert_eq!(count_orders(container).unwrap(), 3);

    // A second dump and a count retention of one leaves only the newest
    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    let second = manager.dump(&options).await.unwrap();
    prune(&targets, settings.retention.as_deref().unwrap(), chrono::Utc::now())
        .await
        .unwrap();
    assert_eq!(ctx.list_files("backups"), vec![second.artifact]);
}
