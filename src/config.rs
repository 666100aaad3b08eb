use once_cell::sync::Lazy;
use std::time::Duration;

/// key: sync-config -> maximum reconciliation attempts per session
pub static SYNC_MAX_ATTEMPTS: Lazy<u32> = Lazy::new(|| {
    parse_positive_env("SYNC_MAX_ATTEMPTS").unwrap_or(DEFAULT_MAX_ATTEMPTS)
});

/// key: sync-config -> cadence between reconciliation attempts
pub static SYNC_POLL_INTERVAL_MS: Lazy<u64> = Lazy::new(|| {
    parse_positive_env("SYNC_POLL_INTERVAL_MS").unwrap_or(DEFAULT_POLL_INTERVAL_MS)
});

/// Lifetime of cached account reads. `0` keeps entries until they are invalidated.
pub static SYNC_CACHE_TTL_SECS: Lazy<u64> = Lazy::new(|| {
    std::env::var("SYNC_CACHE_TTL_SECS")
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(60)
});

/// Base URL of the ScholarFlow REST API. Defaults to `http://localhost:5000`.
pub static SCHOLARFLOW_API_URL: Lazy<String> = Lazy::new(|| {
    read_optional_env("SCHOLARFLOW_API_URL").unwrap_or_else(|| "http://localhost:5000".to_string())
});

/// Bearer token presented to the REST API.
pub static SCHOLARFLOW_API_TOKEN: Lazy<Option<String>> =
    Lazy::new(|| read_optional_env("SCHOLARFLOW_API_TOKEN"));

/// Per-request timeout for REST reads.
pub static SCHOLARFLOW_HTTP_TIMEOUT_SECS: Lazy<u64> = Lazy::new(|| {
    parse_positive_env("SCHOLARFLOW_HTTP_TIMEOUT_SECS").unwrap_or(15)
});

/// Return URL to inspect when none is passed on the command line.
pub static SYNC_RETURN_URL: Lazy<Option<String>> =
    Lazy::new(|| read_optional_env("SYNC_RETURN_URL"));

/// When both this and `SYNC_USER_ID` are set, reads go straight to Postgres.
pub static DATABASE_URL: Lazy<Option<String>> = Lazy::new(|| read_optional_env("DATABASE_URL"));

pub static SYNC_USER_ID: Lazy<Option<String>> = Lazy::new(|| read_optional_env("SYNC_USER_ID"));

pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;

pub fn poll_interval() -> Duration {
    Duration::from_millis(*SYNC_POLL_INTERVAL_MS)
}

pub fn cache_ttl() -> Option<Duration> {
    match *SYNC_CACHE_TTL_SECS {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    }
}

pub fn http_timeout() -> Duration {
    Duration::from_secs(*SCHOLARFLOW_HTTP_TIMEOUT_SECS)
}

fn read_optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_positive_env<T>(key: &str) -> Option<T>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    read_optional_env(key).and_then(|value| parse_positive(&value))
}

fn parse_positive<T>(raw: &str) -> Option<T>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    raw.trim()
        .parse::<T>()
        .ok()
        .filter(|value| *value > T::default())
}
