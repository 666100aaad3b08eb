use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::models::{SubscriptionRecord, UserProfile};
use crate::error::SyncError;

/// key: sync-source -> the two reads a reconciliation cycle depends on
#[async_trait]
pub trait AccountSource: Send + Sync {
    async fn fetch_profile(&self) -> Result<UserProfile>;
    async fn fetch_subscription(&self) -> Result<SubscriptionRecord>;
}

#[async_trait]
impl<T: AccountSource + ?Sized> AccountSource for std::sync::Arc<T> {
    async fn fetch_profile(&self) -> Result<UserProfile> {
        (**self).fetch_profile().await
    }

    async fn fetch_subscription(&self) -> Result<SubscriptionRecord> {
        (**self).fetch_subscription().await
    }
}

const PROFILE_PATH: &str = "api/users/me";
const SUBSCRIPTION_PATH: &str = "api/billing/subscription";

/// key: sync-source-http -> ScholarFlow REST API
pub struct HttpAccountSource {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

/// The API wraps payloads as `{ "success": true, "data": ... }`; older routes
/// return the object bare.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ApiEnvelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> ApiEnvelope<T> {
    fn into_inner(self) -> T {
        match self {
            ApiEnvelope::Wrapped { data } | ApiEnvelope::Bare(data) => data,
        }
    }
}

impl HttpAccountSource {
    pub fn new(
        base_url: impl Into<String>,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build scholarflow api client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            auth_token,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(token) = &self.auth_token {
            request.bearer_auth(token)
        } else {
            request
        }
    }

    /// Returns `Ok(None)` on 404 so callers can decide what absence means.
    async fn get_json<T>(&self, path: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .auth(self.client.get(self.endpoint(path)))
            .send()
            .await
            .map_err(SyncError::Http)
            .with_context(|| format!("failed to reach scholarflow api at {path}"))?;

        match response.status() {
            StatusCode::NOT_FOUND => return Ok(None),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(SyncError::Unauthorized.into())
            }
            status if !status.is_success() => {
                return Err(SyncError::Upstream {
                    endpoint: path.to_string(),
                    status: status.as_u16(),
                }
                .into())
            }
            _ => {}
        }

        let envelope: ApiEnvelope<T> = response
            .json()
            .await
            .map_err(SyncError::Http)
            .with_context(|| format!("failed to decode response from {path}"))?;
        Ok(Some(envelope.into_inner()))
    }
}

#[async_trait]
impl AccountSource for HttpAccountSource {
    async fn fetch_profile(&self) -> Result<UserProfile> {
        self.get_json::<UserProfile>(PROFILE_PATH)
            .await?
            .ok_or_else(|| {
                SyncError::Upstream {
                    endpoint: PROFILE_PATH.to_string(),
                    status: StatusCode::NOT_FOUND.as_u16(),
                }
                .into()
            })
    }

    async fn fetch_subscription(&self) -> Result<SubscriptionRecord> {
        // no subscription on file is a legitimate state after cancellation
        Ok(self
            .get_json::<SubscriptionRecord>(SUBSCRIPTION_PATH)
            .await?
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn endpoint_joins_without_duplicate_slashes() {
        let source =
            HttpAccountSource::new("http://api.test/", None, Duration::from_secs(1)).unwrap();
        assert_eq!(
            source.endpoint("/api/users/me"),
            "http://api.test/api/users/me"
        );
    }

    #[test]
    fn envelope_accepts_wrapped_and_bare_payloads() {
        let wrapped: ApiEnvelope<UserProfile> = serde_json::from_value(json!({
            "success": true,
            "data": { "role": "ADMIN" }
        }))
        .unwrap();
        assert_eq!(wrapped.into_inner().role.as_deref(), Some("ADMIN"));

        let bare: ApiEnvelope<UserProfile> =
            serde_json::from_value(json!({ "role": "RESEARCHER" })).unwrap();
        assert_eq!(bare.into_inner().role.as_deref(), Some("RESEARCHER"));

        let empty: ApiEnvelope<SubscriptionRecord> =
            serde_json::from_value(json!({ "success": true, "data": null })).unwrap();
        assert_eq!(empty.into_inner(), SubscriptionRecord::default());
    }
}
