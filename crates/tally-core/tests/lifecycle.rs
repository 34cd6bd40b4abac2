//! Scheduler runs and upgrade prompt lifecycle

mod common;

use common::{ts, Harness};
use tally_core::{AdmissionRequest, QuotaError};
use tally_types::{QuotaType, SchedulerState, Tier};

#[tokio::test]
async fn test_failed_reset_is_counted_and_skipped() {
    let harness = Harness::new();
    let healthy = harness.user(Tier::Free);
    let broken = harness.user(Tier::Pro);
    let yesterday = ts("2025-06-01T00:00:00Z");
    harness.seed(&healthy, QuotaType::Search, yesterday, 7);
    harness.seed(&healthy, QuotaType::Export, yesterday, 2);
    harness.seed(&broken, QuotaType::Search, yesterday, 9);
    harness.repos.usage.fail_resets_for(broken.0);

    let log = harness
        .service
        .scheduler()
        .run_once(ts("2025-06-02T01:00:00Z"))
        .await
        .unwrap();

    assert_eq!(log.users_reset, 1);
    assert_eq!(log.quotas_reset, 2);
    assert_eq!(log.failed_count, 1);

    let status = harness.service.scheduler_status().await;
    assert_eq!(status.state, SchedulerState::Idle);
    assert_eq!(status.last_run_at, Some(ts("2025-06-02T01:00:00Z")));
    assert_eq!(harness.service.recent_reset_logs(5).await.unwrap(), vec![log]);
}

#[tokio::test]
async fn test_reset_logs_are_newest_first() {
    let harness = Harness::new();
    let scheduler = harness.service.scheduler();

    for hour in ["01", "02", "03"] {
        scheduler
            .run_once(ts(&format!("2025-06-02T{hour}:00:00Z")))
            .await
            .unwrap();
    }

    let logs = harness.service.recent_reset_logs(2).await.unwrap();
    let times: Vec<_> = logs.iter().map(|l| l.executed_at).collect();
    assert_eq!(times, [ts("2025-06-02T03:00:00Z"), ts("2025-06-02T02:00:00Z")]);
}

#[tokio::test]
async fn test_manual_reset_restores_full_limit() {
    let harness = Harness::new();
    let user = harness.user(Tier::Free);

    for _ in 0..5 {
        harness
            .service
            .admit(&AdmissionRequest::new(user, QuotaType::Export))
            .await
            .unwrap();
    }
    harness.service.reset_user(&user, QuotaType::Export).await.unwrap();

    let verdict = harness
        .service
        .admit(&AdmissionRequest::new(user, QuotaType::Export))
        .await
        .unwrap();
    assert!(verdict.allowed);
    assert_eq!(verdict.remaining, Some(4));
}

#[tokio::test]
async fn test_repeated_threshold_crossings_yield_one_open_prompt() {
    let harness = Harness::new();
    let user = harness.user(Tier::Free);
    let now = ts("2025-06-01T10:00:00Z");

    let mut created = 0;
    for _ in 0..20 {
        let verdict = harness
            .service
            .admit_at(&AdmissionRequest::new(user, QuotaType::Search), now)
            .await
            .unwrap();
        if harness
            .service
            .evaluate_prompt(&user, &verdict, now)
            .await
            .unwrap()
            .is_some()
        {
            created += 1;
        }
    }

    assert_eq!(created, 1);
    let prompts = harness.service.list_prompts(&user, false).await.unwrap();
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0].current_tier, Tier::Free);
    assert_eq!(prompts[0].suggested_tier, Tier::Pro);
}

#[tokio::test]
async fn test_sweep_prompts_users_near_their_limit() {
    let harness = Harness::new();
    let now = ts("2025-06-01T10:00:00Z");
    let today = ts("2025-06-01T00:00:00Z");
    let near = harness.user(Tier::Pro);
    let far = harness.user(Tier::Pro);
    let top = harness.user(Tier::Enterprise);
    harness.seed(&near, QuotaType::Export, today, 40);
    harness.seed(&far, QuotaType::Export, today, 10);
    harness.seed(&top, QuotaType::Export, today, 10_000);

    let summary = harness.service.sweep_prompts(now).await.unwrap();
    assert_eq!(summary.evaluated, 3);
    assert_eq!(summary.created, 1);
    assert_eq!(summary.failed, 0);

    let again = harness.service.sweep_prompts(now).await.unwrap();
    assert_eq!(again.created, 0);

    assert_eq!(harness.service.list_prompts(&near, false).await.unwrap().len(), 1);
    assert!(harness.service.list_prompts(&far, true).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_prompt_terminal_states_are_sticky() {
    let harness = Harness::new();
    let user = harness.user(Tier::Free);
    let now = ts("2025-06-01T10:00:00Z");
    let verdict = harness
        .service
        .admit_at(&AdmissionRequest::new(user, QuotaType::Export).with_increment(5), now)
        .await
        .unwrap();
    let prompt = harness
        .service
        .evaluate_prompt(&user, &verdict, now)
        .await
        .unwrap()
        .unwrap();

    let converted = harness.service.convert_prompt(prompt.id).await.unwrap();
    assert!(converted.converted_at.is_some());

    let dismissed = harness.service.dismiss_prompt(prompt.id).await.unwrap();
    assert_eq!(dismissed.converted_at, converted.converted_at);
    assert!(dismissed.dismissed_at.is_none());
}

#[tokio::test]
async fn test_unknown_prompt_is_reported() {
    let harness = Harness::new();
    let result = harness
        .service
        .dismiss_prompt(tally_types::PromptId::new())
        .await;
    assert!(matches!(result, Err(QuotaError::PromptNotFound(_))));
}
