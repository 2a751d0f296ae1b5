use thiserror::Error;

pub type Result<T, E = CuratorError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum CuratorError {
    /// Input with no recoverable scheme or host. Dropped from batches, never fatal.
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("organization not found: {slug}")]
    OrganizationNotFound { slug: String },

    #[error("datasource {url:?} not found in organization {slug}")]
    DataSourceNotFound { slug: String, url: String },

    /// Another writer replaced the organization document between our read and write.
    #[error("concurrent write on organization {slug} (expected revision {expected})")]
    PersistenceConflict { slug: String, expected: i64 },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CuratorError {
    pub fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        CuratorError::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CuratorError::OrganizationNotFound { .. } | CuratorError::DataSourceNotFound { .. }
        )
    }
}
