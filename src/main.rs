use std::sync::Arc;

use anyhow::Context;
use scholarflow_sync::billing::{
    checkout_reference, AccountSource, CachedAccountReader, HttpAccountSource, PgAccountSource,
    QueryCache, SubscriptionSyncPoller, SyncOptions, SyncOutcome,
};
use scholarflow_sync::config;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{fmt, EnvFilter};
use uuid::Uuid;

const EXIT_TIMED_OUT: i32 = 2;

async fn build_source() -> anyhow::Result<Arc<dyn AccountSource>> {
    if let (Some(db_url), Some(user_id)) =
        (config::DATABASE_URL.as_ref(), config::SYNC_USER_ID.as_ref())
    {
        let user_id = Uuid::parse_str(user_id).context("SYNC_USER_ID must be a UUID")?;
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(db_url)
            .await
            .context("failed to connect to DATABASE_URL")?;
        tracing::info!(%user_id, "reading account state from postgres");
        return Ok(Arc::new(PgAccountSource::new(pool, user_id)));
    }

    tracing::info!(api = %config::SCHOLARFLOW_API_URL.as_str(), "reading account state from api");
    let source = HttpAccountSource::new(
        config::SCHOLARFLOW_API_URL.as_str(),
        config::SCHOLARFLOW_API_TOKEN.clone(),
        config::http_timeout(),
    )?;
    Ok(Arc::new(source))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let Some(return_url) = std::env::args()
        .nth(1)
        .or_else(|| config::SYNC_RETURN_URL.clone())
    else {
        tracing::warn!("no return url supplied; nothing to reconcile");
        return Ok(());
    };

    let Some(reference) = checkout_reference(&return_url) else {
        tracing::info!(%return_url, "return url carries no checkout reference; skipping sync");
        return Ok(());
    };
    tracing::info!(%reference, "user returned from billing portal");

    let source = build_source().await?;
    let reader = Arc::new(CachedAccountReader::new(
        source,
        Arc::new(QueryCache::new(config::cache_ttl())),
    ));
    let poller = SubscriptionSyncPoller::new(reader);
    let session = poller.start(SyncOptions::from_return_url(&return_url))?;

    match session.outcome().await {
        Some(SyncOutcome::Changed {
            current, changed, ..
        }) => {
            tracing::info!(
                role = current.role().unwrap_or("-"),
                status = current.status().unwrap_or("-"),
                plan = current.plan_id().unwrap_or("-"),
                changed = changed.len(),
                "subscription updated"
            );
            Ok(())
        }
        Some(SyncOutcome::TimedOut { attempts }) => {
            tracing::warn!(attempts, "billing still processing; check back later");
            std::process::exit(EXIT_TIMED_OUT);
        }
        None => {
            tracing::warn!("subscription sync ended without an outcome");
            Ok(())
        }
    }
}
