//! PostgreSQL repository tests
//!
//! Need a scratch database: `DATABASE_URL=postgres://... cargo test -- --ignored`

use chrono::{DateTime, Duration, DurationRound, Utc};
use tally_db::{
    create_pool, run_migrations, CreatePrompt, DbPool, IncrementRequest, PromptRepository,
    Repositories, UsageRepository, UserRepository,
};
use uuid::Uuid;

async fn pool() -> DbPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for ignored tests");
    let pool = create_pool(&url).await.expect("connect");
    run_migrations(&pool).await.expect("migrate");
    pool
}

fn today() -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc::now().duration_trunc(Duration::days(1)).unwrap();
    (start, start + Duration::days(1))
}

fn request(user: Uuid, ceiling: Option<i64>, key: Option<&str>) -> IncrementRequest {
    let (start, end) = today();
    IncrementRequest {
        user_id: user,
        quota_type: "search".to_string(),
        period_start: start,
        period_end: end,
        increment: 1,
        ceiling,
        idempotency_key: key.map(String::from),
        now: Utc::now(),
    }
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_concurrent_increments_respect_ceiling() {
    let repos = Repositories::new(pool().await);
    let user = Uuid::new_v4();

    let handles: Vec<_> = (0..30)
        .map(|_| {
            let usage = repos.usage.clone();
            tokio::spawn(async move { usage.increment_with_ceiling(request(user, Some(10), None)).await })
        })
        .collect();

    let mut admitted = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap().allowed {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 10);

    let (start, _) = today();
    let row = repos.usage.find(user, "search", start).await.unwrap().unwrap();
    assert_eq!(row.usage_count, 10);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_idempotent_increment_replays() {
    let repos = Repositories::new(pool().await);
    let user = Uuid::new_v4();
    let key = format!("test:{}", Uuid::new_v4());

    let first = repos
        .usage
        .increment_with_ceiling(request(user, Some(5), Some(&key)))
        .await
        .unwrap();
    let retry = repos
        .usage
        .increment_with_ceiling(request(user, Some(5), Some(&key)))
        .await
        .unwrap();

    assert!(!first.replayed);
    assert!(retry.replayed);
    assert_eq!(retry.usage_count, 1);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_idempotency_key_is_scoped_to_pair() {
    let repos = Repositories::new(pool().await);
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let key = format!("test:{}", Uuid::new_v4());

    repos
        .usage
        .increment_with_ceiling(request(alice, Some(5), Some(&key)))
        .await
        .unwrap();
    let exhausted = repos
        .usage
        .increment_with_ceiling(request(bob, Some(0), Some(&key)))
        .await
        .unwrap();

    assert!(!exhausted.replayed);
    assert!(!exhausted.allowed);
    assert_eq!(exhausted.usage_count, 0);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_roll_forward_keeps_counted_admissions() {
    let repos = Repositories::new(pool().await);
    let user = Uuid::new_v4();
    let (start, end) = today();

    repos
        .usage
        .increment_with_ceiling(request(user, Some(3), None))
        .await
        .unwrap();
    repos
        .usage
        .roll_forward(user, "search", start, end, Utc::now())
        .await
        .unwrap();

    let row = repos.usage.find(user, "search", start).await.unwrap().unwrap();
    assert_eq!(row.usage_count, 1);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_stale_pairs_and_reset() {
    let repos = Repositories::new(pool().await);
    let user = Uuid::new_v4();
    let (start, end) = today();
    let mut yesterday = request(user, None, None);
    yesterday.period_start = start - Duration::days(1);
    yesterday.period_end = start;
    repos.usage.increment_with_ceiling(yesterday).await.unwrap();

    let stale = repos.usage.find_stale(Utc::now(), 10_000).await.unwrap();
    assert!(stale.iter().any(|k| k.user_id == user));

    repos
        .usage
        .reset(user, "search", start, end, Utc::now())
        .await
        .unwrap();
    let stale = repos.usage.find_stale(Utc::now(), 10_000).await.unwrap();
    assert!(!stale.iter().any(|k| k.user_id == user));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_single_open_prompt_per_pair() {
    let repos = Repositories::new(pool().await);
    let user = Uuid::new_v4();
    let create = || CreatePrompt {
        id: Uuid::new_v4(),
        user_id: user,
        quota_type: "export".to_string(),
        current_tier: "free".to_string(),
        suggested_tier: "pro".to_string(),
        shown_at: Utc::now(),
    };

    let first = repos.prompts.create_if_absent(create()).await.unwrap().unwrap();
    assert!(repos.prompts.create_if_absent(create()).await.unwrap().is_none());

    assert!(repos.prompts.dismiss(first.id, Utc::now()).await.unwrap());
    assert!(!repos.prompts.mark_converted(first.id, Utc::now()).await.unwrap());
    assert!(repos.prompts.create_if_absent(create()).await.unwrap().is_some());
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_user_tier_lookup() {
    let pool = pool().await;
    let repos = Repositories::new(pool.clone());
    let user = Uuid::new_v4();

    assert_eq!(repos.users.find_tier(user).await.unwrap(), None);

    sqlx::query("INSERT INTO users (id, tier) VALUES ($1, 'pro')")
        .bind(user)
        .execute(&pool)
        .await
        .unwrap();
    assert_eq!(repos.users.find_tier(user).await.unwrap().as_deref(), Some("pro"));
}
