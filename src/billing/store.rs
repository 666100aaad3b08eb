use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::adapters::AccountSource;
use super::models::{SubscriptionRecord, UserProfile};
use crate::error::SyncError;

/// key: sync-source-pg -> server-side reads against the relational store
#[derive(Clone)]
pub struct PgAccountSource {
    pool: PgPool,
    user_id: Uuid,
}

#[derive(Debug, FromRow)]
struct ProfileRow {
    id: Uuid,
    email: String,
    role: String,
    stripe_subscription_id: Option<String>,
}

#[derive(Debug, FromRow)]
struct SubscriptionRow {
    status: String,
    plan_id: Option<String>,
    current_period_end: Option<DateTime<Utc>>,
    cancel_at_period_end: bool,
}

impl PgAccountSource {
    pub fn new(pool: PgPool, user_id: Uuid) -> Self {
        Self { pool, user_id }
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }
}

#[async_trait]
impl AccountSource for PgAccountSource {
    async fn fetch_profile(&self) -> Result<UserProfile> {
        let row = sqlx::query_as::<_, ProfileRow>(
            r#"
            SELECT id, email, role, stripe_subscription_id
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(self.user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(SyncError::Db)
        .context("failed to load user profile")?
        .with_context(|| format!("user {} not found", self.user_id))?;

        Ok(UserProfile {
            id: Some(row.id.to_string()),
            email: Some(row.email),
            role: Some(row.role),
            stripe_subscription_id: row.stripe_subscription_id,
        })
    }

    async fn fetch_subscription(&self) -> Result<SubscriptionRecord> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            SELECT status, plan_id, current_period_end, cancel_at_period_end
            FROM subscriptions
            WHERE user_id = $1
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(self.user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(SyncError::Db)
        .context("failed to load subscription")?;

        Ok(row
            .map(|row| SubscriptionRecord {
                status: Some(row.status),
                plan_id: row.plan_id,
                current_period_end: row.current_period_end,
                cancel_at_period_end: Some(row.cancel_at_period_end),
            })
            .unwrap_or_default())
    }
}
