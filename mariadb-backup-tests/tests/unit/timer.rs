//! Unit tests for schedule resolution and the scheduler loop

use chrono::{Duration, TimeZone, Utc};
use mariadb_backup::config::{resolve_settings, Overrides};
use mariadb_backup::managers::timer::{Scheduler, SchedulerState, TimerConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use test_utils::{ConfigBuilder, ManualClock};
use tokio_util::sync::CancellationToken;

#[test]
fn test_interval_schedule_from_config() {
    let config = ConfigBuilder::minimal().with_interval("+5", 60).build();
    let settings = resolve_settings(&Overrides::default(), Some(&config)).unwrap();

    assert_eq!(settings.timer.to_string(), "every 60 minutes, beginning +5");
}

#[test]
fn test_cron_schedule_from_config() {
    let config = ConfigBuilder::minimal().with_cron("*/15 * * * *").build();
    let settings = resolve_settings(&Overrides::default(), Some(&config)).unwrap();

    assert_eq!(settings.timer.to_string(), "cron '*/15 * * * *'");
}

#[tokio::test]
async fn test_interval_scheduler_runs_until_cancelled() {
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let clock = Arc::new(ManualClock::new(start));
    let config = ConfigBuilder::minimal().with_interval("+10", 30).build();
    let settings = resolve_settings(&Overrides::default(), Some(&config)).unwrap();
    let scheduler = Scheduler::with_clock(settings.timer, clock.clone());

    let runs = Arc::new(AtomicUsize::new(0));
    let cancel = CancellationToken::new();
    let action = {
        let runs = runs.clone();
        let cancel = cancel.clone();
        move || {
            let runs = runs.clone();
            let cancel = cancel.clone();
            async move {
                if runs.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
                    cancel.cancel();
                }
                Ok::<(), anyhow::Error>(())
            }
        }
    };

    scheduler.run(action, cancel).await.unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 3);
    assert_eq!(scheduler.state(), SchedulerState::Terminated);
    assert_eq!(
        clock.sleeps(),
        vec![
            start + Duration::minutes(10),
            start + Duration::minutes(40),
            start + Duration::minutes(70),
        ]
    );
}

#[tokio::test]
async fn test_once_scheduler_propagates_failure() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let scheduler = Scheduler::with_clock(TimerConfig::Once, clock.clone());

    let result = scheduler
        .run(
            || async { Err::<(), _>(anyhow::anyhow!("dump failed")) },
            CancellationToken::new(),
        )
        .await;

    assert!(result.unwrap_err().to_string().contains("dump failed"));
    assert!(clock.sleeps().is_empty());
}
