use chrono::{Duration, Utc};
use scholarflow_sync::billing::{AccountSource, PgAccountSource, SubscriptionRecord};
use sqlx::PgPool;
use uuid::Uuid;

async fn insert_user(pool: &PgPool, email: &str, subscription: Option<&str>) -> Uuid {
    let user_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO users (id, email, role, stripe_subscription_id) VALUES ($1, $2, 'RESEARCHER', $3)",
    )
    .bind(user_id)
    .bind(email)
    .bind(subscription)
    .execute(pool)
    .await
    .unwrap();
    user_id
}

// key: sync-pg-tests -> latest subscription row wins
#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn pg_source_reads_latest_subscription(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    let user_id = insert_user(&pool, "reader@example.com", Some("sub_1")).await;
    let now = Utc::now();
    for (status, plan, updated_at) in [
        ("active", "pro", now - Duration::days(30)),
        ("canceled", "pro", now - Duration::minutes(1)),
    ] {
        sqlx::query(
            "INSERT INTO subscriptions (id, user_id, status, plan_id, updated_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(status)
        .bind(plan)
        .bind(updated_at)
        .execute(&pool)
        .await
        .unwrap();
    }

    let source = PgAccountSource::new(pool.clone(), user_id);
    let profile = source.fetch_profile().await.unwrap();
    assert_eq!(profile.role.as_deref(), Some("RESEARCHER"));
    assert_eq!(profile.stripe_subscription_id.as_deref(), Some("sub_1"));
    assert_eq!(profile.email.as_deref(), Some("reader@example.com"));

    let subscription = source.fetch_subscription().await.unwrap();
    assert_eq!(subscription.status.as_deref(), Some("canceled"));
    assert_eq!(subscription.plan_id.as_deref(), Some("pro"));
    assert_eq!(subscription.cancel_at_period_end, Some(false));
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn pg_source_handles_missing_rows(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    let user_id = insert_user(&pool, "free@example.com", None).await;
    let source = PgAccountSource::new(pool.clone(), user_id);
    assert_eq!(
        source.fetch_subscription().await.unwrap(),
        SubscriptionRecord::default()
    );

    let missing = PgAccountSource::new(pool, Uuid::new_v4());
    assert!(missing.fetch_profile().await.is_err());
}
