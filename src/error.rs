use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid sync configuration: {0}")]
    InvalidConfig(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("upstream returned {status} for {endpoint}")]
    Upstream { endpoint: String, status: u16 },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

impl SyncError {
    /// Whether the next poll cycle can reasonably expect a different result.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Upstream { status, .. } => *status >= 500 || *status == 429,
            SyncError::Http(err) => !err.is_decode(),
            SyncError::Db(_) => true,
            SyncError::InvalidConfig(_) | SyncError::Unauthorized => false,
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
