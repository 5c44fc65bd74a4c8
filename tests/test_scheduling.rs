//! Concurrency guarantees of the health check scheduler
//!
//! Checks on one integration never overlap, checks on different
//! integrations run in parallel, and a cycle only returns once every check
//! has finished.

mod common;

use common::{alert_manager, check_config, ConcurrencyTracker};
use integration_monitor::monitoring::{HealthCheckScheduler, HealthChecker};
use integration_monitor::{CheckOutcome, HealthStatus};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

const LATENCY: Duration = Duration::from_millis(80);

struct Fixture {
    scheduler: Arc<HealthCheckScheduler>,
    trackers: Vec<Arc<ConcurrencyTracker>>,
    checkers: Vec<Arc<HealthChecker>>,
    global_max: Arc<AtomicUsize>,
}

fn fixture(count: usize) -> Fixture {
    let global = Arc::new(AtomicUsize::new(0));
    let global_max = Arc::new(AtomicUsize::new(0));
    let mut trackers = Vec::new();
    let mut checkers = Vec::new();
    let mut map = HashMap::new();

    for i in 0..count {
        let id = format!("integration-{}", i);
        let tracker = Arc::new(ConcurrencyTracker::new(
            &id,
            LATENCY,
            global.clone(),
            global_max.clone(),
        ));
        let checker = Arc::new(HealthChecker::new(
            &id,
            &id,
            "marketplace",
            tracker.clone(),
            check_config(),
        ));
        map.insert(id, checker.clone());
        trackers.push(tracker);
        checkers.push(checker);
    }

    Fixture {
        scheduler: Arc::new(HealthCheckScheduler::new(
            Arc::new(RwLock::new(map)),
            alert_manager(false),
        )),
        trackers,
        checkers,
        global_max,
    }
}

mod exclusivity {
    use super::*;

    #[tokio::test]
    async fn test_same_integration_checks_never_overlap() {
        let f = fixture(1);
        let mut handles = Vec::new();
        for _ in 0..4 {
            let scheduler = f.scheduler.clone();
            handles.push(tokio::spawn(async move {
                scheduler.check_integration("integration-0").await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), CheckOutcome::Succeeded);
        }

        assert_eq!(f.trackers[0].max_in_flight(), 1);
        assert_eq!(f.checkers[0].snapshot().await.metrics.total_checks, 4);
    }

    #[tokio::test]
    async fn test_manual_check_waits_for_scheduled_one() {
        let f = fixture(1);
        let scheduler = f.scheduler.clone();
        let cycle = tokio::spawn(async move { scheduler.perform_health_checks().await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        f.scheduler.check_integration("integration-0").await.unwrap();
        cycle.await.unwrap();
        assert_eq!(f.trackers[0].max_in_flight(), 1);
    }
}

mod parallelism {
    use super::*;

    #[tokio::test]
    async fn test_different_integrations_run_in_parallel() {
        let f = fixture(5);
        let started = Instant::now();
        let report = f.scheduler.perform_health_checks().await;
        let elapsed = started.elapsed();

        assert_eq!(report.succeeded, 5);
        assert_eq!(f.global_max.load(Ordering::SeqCst), 5);
        // Sequential execution would take five latencies
        assert!(elapsed < LATENCY * 3, "cycle took {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_cycle_is_a_completion_barrier() {
        let f = fixture(3);
        f.scheduler.perform_health_checks().await;

        for checker in &f.checkers {
            let snapshot = checker.snapshot().await;
            assert_eq!(snapshot.metrics.total_checks, 1);
            assert_eq!(snapshot.status, HealthStatus::Healthy);
        }
        assert_eq!(f.scheduler.cycles_completed(), 1);
        assert!(f.scheduler.last_cycle().await.is_some());
    }

    #[tokio::test]
    async fn test_one_failing_integration_does_not_affect_others() {
        let f = fixture(3);
        f.trackers[1].set_failing(true);
        let report = f.scheduler.perform_health_checks().await;

        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(f.checkers[1].status().await, HealthStatus::Degraded);
        assert_eq!(f.checkers[0].status().await, HealthStatus::Healthy);
    }
}
