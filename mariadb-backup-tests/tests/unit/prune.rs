//! Unit tests for retention parsing and pruning against a real directory

use mariadb_backup::managers::prune::{prune, select_for_deletion, PruneError};
use mariadb_backup::managers::retention::Retention;
use mariadb_backup::storage::{LocalStorage, Storage};
use rstest::rstest;
use std::sync::Arc;
use test_utils::{aged_artifacts, foreign_files, reference_time, MemoryStorage, TestContext};

fn populate(ctx: &TestContext, dir: &str, names: &[String]) {
    for name in names {
        ctx.create_file(&format!("{}/{}", dir, name), "data");
    }
}

#[rstest]
#[case("1h", 1)]
#[case("2h", 2)]
#[case("2d", 6)]
#[case("3w", 13)]
#[case("5c", 5)]
#[case("1m", 15)]
#[case("1y", 21)]
#[tokio::test]
async fn test_prune_local_directory(#[case] retention: &str, #[case] survivors: usize) {
    let ctx = TestContext::new();
    let artifacts = aged_artifacts();
    populate(&ctx, "backups", &artifacts);

    let target: Arc<dyn Storage> = Arc::new(LocalStorage::new(ctx.temp_dir().join("backups")));
    let report = prune(&[target], retention, reference_time()).await.unwrap();

    assert_eq!(ctx.list_files("backups").len(), survivors);
    assert_eq!(report.deleted_count(), artifacts.len() - survivors);
    assert_eq!(report.targets[0].kept, survivors);
}

#[tokio::test]
async fn test_prune_leaves_foreign_files() {
    let ctx = TestContext::new();
    populate(&ctx, "backups", &aged_artifacts());
    populate(&ctx, "backups", &foreign_files());

    let target: Arc<dyn Storage> = Arc::new(LocalStorage::new(ctx.temp_dir().join("backups")));
    prune(&[target], "1h", reference_time()).await.unwrap();

    let remaining = ctx.list_files("backups");
    for foreign in foreign_files() {
        assert!(remaining.contains(&foreign), "{} should survive", foreign);
    }
    assert_eq!(remaining.len(), foreign_files().len() + 1);
}

#[tokio::test]
async fn test_prune_applies_to_every_target() {
    let ctx = TestContext::new();
    populate(&ctx, "a", &aged_artifacts());
    let memory = Arc::new(MemoryStorage::new("mem://b").with_files(&aged_artifacts()));

    let targets: Vec<Arc<dyn Storage>> = vec![
        Arc::new(LocalStorage::new(ctx.temp_dir().join("a"))),
        memory.clone(),
    ];
    let report = prune(&targets, "2d", reference_time()).await.unwrap();

    assert_eq!(report.targets.len(), 2);
    assert_eq!(ctx.list_files("a").len(), 6);
    assert_eq!(memory.names().len(), 6);
}

#[tokio::test]
async fn test_prune_missing_directory_is_reported() {
    let ctx = TestContext::new();
    let healthy = Arc::new(MemoryStorage::new("mem://ok").with_files(&aged_artifacts()));
    let targets: Vec<Arc<dyn Storage>> = vec![
        Arc::new(LocalStorage::new(ctx.temp_dir().join("absent"))),
        healthy.clone(),
    ];

    let err = prune(&targets, "1h", reference_time()).await.unwrap_err();
    match err {
        PruneError::TargetsFailed(errors) => assert_eq!(errors.len(), 1),
        other => panic!("unexpected error: {}", other),
    }
    // The healthy target is still pruned
    assert_eq!(healthy.names().len(), 1);
}

#[tokio::test]
async fn test_prune_rejects_bad_retention_before_touching_targets() {
    let memory = Arc::new(MemoryStorage::new("mem://a").with_files(&aged_artifacts()));
    let targets: Vec<Arc<dyn Storage>> = vec![memory.clone()];

    let err = prune(&targets, "3x", reference_time()).await.unwrap_err();
    assert!(err.to_string().contains("invalid retention string"));
    assert!(memory.deleted().is_empty());
}

#[test]
fn test_select_for_deletion_count_keeps_newest() {
    let names = aged_artifacts();
    let (deleted, kept) = select_for_deletion(&names, Retention::Count { keep: 3 }, reference_time());

    assert_eq!(kept, 3);
    for newest in &names[..3] {
        assert!(!deleted.contains(newest));
    }
    assert_eq!(deleted.len(), names.len() - 3);
}
