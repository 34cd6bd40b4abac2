//! End-to-end quota scenarios over the in-memory backend

mod common;

use std::collections::BTreeSet;

use common::{ts, Harness};
use tally_core::AdmissionRequest;
use tally_types::{QuotaType, Tier};

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_free_tier_burst_admits_exactly_limit() {
    let harness = Harness::new();
    let user = harness.user(Tier::Free);
    let now = ts("2025-06-01T12:00:00Z");

    let handles: Vec<_> = (0..25)
        .map(|_| {
            let service = harness.service.clone();
            tokio::spawn(async move {
                service
                    .admit_at(&AdmissionRequest::new(user, QuotaType::Search), now)
                    .await
            })
        })
        .collect();

    let mut verdicts = Vec::new();
    for handle in handles {
        verdicts.push(handle.await.unwrap().unwrap());
    }

    let (admitted, denied): (Vec<_>, Vec<_>) = verdicts.into_iter().partition(|v| v.allowed);
    assert_eq!(admitted.len(), 20);
    assert_eq!(denied.len(), 5);

    let remaining: BTreeSet<u64> = admitted.iter().map(|v| v.remaining.unwrap()).collect();
    assert_eq!(remaining, (0..20).collect::<BTreeSet<u64>>());

    for verdict in &denied {
        assert_eq!(verdict.remaining, Some(0));
        assert_eq!(verdict.usage_count, 20);
        assert_eq!(verdict.suggested_tier, Some(Tier::Pro));
    }

    let usage = harness
        .service
        .usage_at(&user, QuotaType::Search, now)
        .await
        .unwrap();
    assert_eq!(usage.usage_count, 20);
}

#[tokio::test]
async fn test_enterprise_is_unmetered_but_counted() {
    let harness = Harness::new();
    let user = harness.user(Tier::Enterprise);
    let now = ts("2025-06-01T12:00:00Z");

    for _ in 0..1000 {
        let verdict = harness
            .service
            .admit_at(&AdmissionRequest::new(user, QuotaType::Search), now)
            .await
            .unwrap();
        assert!(verdict.allowed);
        assert_eq!(verdict.remaining, None);
        assert_eq!(verdict.suggested_tier, None);
    }

    let usage = harness
        .service
        .usage_at(&user, QuotaType::Search, now)
        .await
        .unwrap();
    assert_eq!(usage.usage_count, 1000);
}

#[tokio::test]
async fn test_scheduler_rolls_exhausted_quota_at_day_boundary() {
    let harness = Harness::new();
    let user = harness.user(Tier::Free);
    let late = ts("2025-06-01T23:59:30Z");

    for _ in 0..20 {
        harness
            .service
            .admit_at(&AdmissionRequest::new(user, QuotaType::Search), late)
            .await
            .unwrap();
    }
    let exhausted = harness
        .service
        .admit_at(&AdmissionRequest::new(user, QuotaType::Search), late)
        .await
        .unwrap();
    assert!(!exhausted.allowed);

    let boundary = ts("2025-06-02T00:00:05Z");
    let log = harness.service.scheduler().run_once(boundary).await.unwrap();
    assert!(log.users_reset >= 1);
    assert_eq!(log.quotas_reset, 1);
    assert_eq!(log.failed_count, 0);

    let usage = harness
        .service
        .usage_at(&user, QuotaType::Search, boundary)
        .await
        .unwrap();
    assert_eq!(usage.usage_count, 0);
    assert_eq!(usage.period_start, ts("2025-06-02T00:00:00Z"));

    let again = harness.service.scheduler().run_once(boundary).await.unwrap();
    assert_eq!(again.quotas_reset, 0);
}

#[tokio::test]
async fn test_average_is_taken_over_whole_window() {
    let harness = Harness::new();
    let user = harness.user(Tier::Free);
    harness.seed(&user, QuotaType::Search, ts("2025-06-03T00:00:00Z"), 12);
    harness.seed(&user, QuotaType::Search, ts("2025-06-06T00:00:00Z"), 20);

    let summary = harness
        .service
        .statistics_at(&user, QuotaType::Search, 7, ts("2025-06-07T09:00:00Z"))
        .await
        .unwrap();

    assert_eq!(summary.days, 7);
    assert_eq!(summary.total_usage, 32);
    assert!((summary.avg_daily_usage - 32.0 / 7.0).abs() < 1e-9);
    assert_eq!(summary.max_daily_usage, 20);
    assert_eq!(summary.days_at_limit, 1);
}
