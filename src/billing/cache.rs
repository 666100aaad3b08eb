use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace};

use super::adapters::AccountSource;
use super::models::{SubscriptionRecord, SubscriptionSnapshot, UserProfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheTag {
    User,
    Subscription,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    tags: Vec<CacheTag>,
    fetched_at: DateTime<Utc>,
}

/// key: sync-cache -> process-wide read cache with tag invalidation
///
/// Entries are stored as JSON so any read can share the same map, the way a
/// client-side query cache keys results by endpoint.
#[derive(Debug, Default)]
pub struct QueryCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Option<Duration>,
}

impl QueryCache {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entry = self.entries.get(key)?.clone();
        if self.is_expired(&entry) {
            self.entries.remove(key);
            trace!(key, "cache entry expired");
            return None;
        }
        match serde_json::from_value(entry.value) {
            Ok(value) => Some(value),
            Err(err) => {
                debug!(?err, key, "dropping undecodable cache entry");
                self.entries.remove(key);
                None
            }
        }
    }

    pub fn insert<T: Serialize>(&self, key: &str, tags: &[CacheTag], value: &T) -> Result<()> {
        let value = serde_json::to_value(value)
            .with_context(|| format!("failed to serialize cache entry {key}"))?;
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                tags: tags.to_vec(),
                fetched_at: Utc::now(),
            },
        );
        Ok(())
    }

    /// Drops every entry carrying `tag`, regardless of who cached it.
    pub fn invalidate_tag(&self, tag: CacheTag) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.tags.contains(&tag));
        let removed = before.saturating_sub(self.entries.len());
        debug!(?tag, removed, "invalidated cached reads");
        removed
    }

    #[cfg(test)]
    fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_expired(&self, entry: &CacheEntry) -> bool {
        let Some(ttl) = self.ttl else {
            return false;
        };
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => entry.fetched_at + ttl <= Utc::now(),
            Err(_) => false,
        }
    }
}

pub const PROFILE_KEY: &str = "getCurrentUser";
pub const SUBSCRIPTION_KEY: &str = "getSubscription";

const PROFILE_TAGS: &[CacheTag] = &[CacheTag::User];
const SUBSCRIPTION_TAGS: &[CacheTag] = &[CacheTag::User, CacheTag::Subscription];

/// key: sync-reader -> cached profile/subscription reads
pub struct CachedAccountReader<S> {
    source: S,
    cache: Arc<QueryCache>,
}

impl<S: AccountSource> CachedAccountReader<S> {
    pub fn new(source: S, cache: Arc<QueryCache>) -> Self {
        Self { source, cache }
    }

    pub async fn profile(&self) -> Result<UserProfile> {
        if let Some(profile) = self.cache.get::<UserProfile>(PROFILE_KEY) {
            trace!("profile cache hit");
            return Ok(profile);
        }
        let profile = self.source.fetch_profile().await?;
        self.cache.insert(PROFILE_KEY, PROFILE_TAGS, &profile)?;
        Ok(profile)
    }

    pub async fn subscription(&self) -> Result<SubscriptionRecord> {
        if let Some(subscription) = self.cache.get::<SubscriptionRecord>(SUBSCRIPTION_KEY) {
            trace!("subscription cache hit");
            return Ok(subscription);
        }
        let subscription = self.source.fetch_subscription().await?;
        self.cache
            .insert(SUBSCRIPTION_KEY, SUBSCRIPTION_TAGS, &subscription)?;
        Ok(subscription)
    }

    /// Invalidates every `User`-tagged read, then re-issues both reads together.
    pub async fn refresh(&self) -> Result<(UserProfile, SubscriptionRecord)> {
        self.cache.invalidate_tag(CacheTag::User);
        tokio::try_join!(self.profile(), self.subscription())
    }

    /// Refreshes both reads and captures the billing fields that get compared.
    pub async fn refreshed_snapshot(&self) -> Result<SubscriptionSnapshot> {
        let (profile, subscription) = self.refresh().await?;
        Ok(SubscriptionSnapshot::capture(&profile, &subscription))
    }
}
