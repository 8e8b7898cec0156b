use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cronflow::{CronflowError, Scheduler, SchedulerConfig, State};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[tokio::test]
async fn test_full_scheduler_lifecycle() {
    init_logging();
    let scheduler = Scheduler::new();

    scheduler
        .add("* * * * * *", "task-1", || async { Ok(()) })
        .await
        .unwrap();
    scheduler
        .add("*/5 * * * * *", "task-2", || async { Ok(()) })
        .await
        .unwrap();

    assert_eq!(scheduler.state().await, State::Initial);

    scheduler.start().await;
    assert_eq!(scheduler.state().await, State::Running);

    tokio::time::sleep(Duration::from_millis(100)).await;

    scheduler.stop().await;
    assert_eq!(scheduler.state().await, State::Terminated);
}

#[tokio::test]
async fn test_counting_job_fires_and_stops_after_stop() {
    init_logging();
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = Arc::clone(&counter);

    let scheduler = Scheduler::new();
    scheduler
        .add("* * * * * *", "counter", move || {
            let counter = Arc::clone(&counter_clone);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await
        .unwrap();

    scheduler.start().await;
    tokio::time::sleep(Duration::from_millis(2500)).await;
    scheduler.stop().await;

    let after_stop = counter.load(Ordering::SeqCst);
    assert!(after_stop >= 1, "expected at least one firing, got {}", after_stop);

    // no further firings once stop has returned
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(counter.load(Ordering::SeqCst), after_stop);
}

#[tokio::test]
async fn test_jobs_sharing_an_instant_all_fire() {
    init_logging();
    let counter = Arc::new(AtomicU32::new(0));

    let scheduler = Scheduler::new();
    for i in 0..3 {
        let counter_clone = Arc::clone(&counter);
        scheduler
            .add("* * * * * *", format!("shared-{}", i), move || {
                let counter = Arc::clone(&counter_clone);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await
            .unwrap();
    }

    scheduler.start().await;
    tokio::time::sleep(Duration::from_millis(2500)).await;
    scheduler.stop().await;

    // three jobs share every whole-second bucket
    assert!(counter.load(Ordering::SeqCst) >= 3);
}

#[tokio::test]
async fn test_remove_while_running_prevents_firing() {
    init_logging();
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = Arc::clone(&counter);

    let scheduler = Scheduler::new();
    scheduler.start().await;

    scheduler
        .add("0 30 3 1 1 *", "doomed", move || {
            let counter = Arc::clone(&counter_clone);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await
        .unwrap();
    scheduler.remove("0 30 3 1 1 *", "doomed").await.unwrap();

    tokio::time::sleep(Duration::from_millis(1000)).await;
    scheduler.stop().await;

    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_lifecycle_misuse_is_an_error_not_a_crash() {
    init_logging();
    let scheduler = Scheduler::new();
    scheduler.start().await;
    scheduler.stop().await;

    let result = scheduler.add("* * * * * *", "late", || async { Ok(()) }).await;
    assert!(matches!(result, Err(CronflowError::Terminated)));

    let result = scheduler.remove("* * * * * *", "late").await;
    assert!(matches!(result, Err(CronflowError::Terminated)));

    // start and stop stay no-ops
    scheduler.start().await;
    scheduler.stop().await;
    assert_eq!(scheduler.state().await, State::Terminated);
}

#[tokio::test]
async fn test_invalid_registrations_are_rejected_synchronously() {
    init_logging();
    let scheduler = Scheduler::new();

    let result = scheduler.add("not a cron line", "a", || async { Ok(()) }).await;
    assert!(matches!(result, Err(CronflowError::InvalidExpression(_))));

    let result = scheduler.add("@reboot", "a", || async { Ok(()) }).await;
    assert!(matches!(result, Err(CronflowError::InvalidExpression(_))));

    let result = scheduler.add("* * * * * *", "   ", || async { Ok(()) }).await;
    assert!(matches!(result, Err(CronflowError::UnresolvableIdentity(_))));
}

#[tokio::test]
async fn test_multiple_schedulers_run_independently() {
    init_logging();
    let scheduler1 = Scheduler::new();
    let scheduler2 = Scheduler::with_config(SchedulerConfig {
        idle_check_interval: Duration::from_millis(50),
    });

    scheduler1
        .add("* * * * * *", "one", || async { Ok(()) })
        .await
        .unwrap();
    scheduler2
        .add("* * * * * *", "two", || async { Ok(()) })
        .await
        .unwrap();

    scheduler1.start().await;
    scheduler2.start().await;

    assert_eq!(scheduler1.state().await, State::Running);
    assert_eq!(scheduler2.state().await, State::Running);

    scheduler1.stop().await;
    assert_eq!(scheduler1.state().await, State::Terminated);
    assert_eq!(scheduler2.state().await, State::Running);

    scheduler2.stop().await;
    assert_eq!(scheduler2.state().await, State::Terminated);
}

#[tokio::test]
async fn test_slow_callback_does_not_block_dispatch() {
    init_logging();
    let fast_counter = Arc::new(AtomicU32::new(0));
    let fast_clone = Arc::clone(&fast_counter);

    let scheduler = Scheduler::new();
    scheduler
        .add("* * * * * *", "slow", || async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        })
        .await
        .unwrap();
    scheduler
        .add("* * * * * *", "fast", move || {
            let counter = Arc::clone(&fast_clone);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await
        .unwrap();

    scheduler.start().await;
    tokio::time::sleep(Duration::from_millis(2500)).await;
    scheduler.stop().await;

    // fire-and-forget: the 30s callback never held up the fast one
    assert!(fast_counter.load(Ordering::SeqCst) >= 2);
}
