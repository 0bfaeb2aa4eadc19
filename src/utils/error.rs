//! Error types for the event log store
//!
//! One taxonomy covers both backends and the mirror pipeline. Duplicate
//! idempotent writes and malformed stored payloads are deliberately NOT
//! errors; they degrade to `false` / absent values at the call sites.

use thiserror::Error;

/// Store error types
#[derive(Debug, Error)]
pub enum StoreError {
    /// An operation was called before `init()`
    #[error("store not initialized: call init() first")]
    NotInitialized,

    /// Underlying storage rejected a write; not retried internally
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// A read/query against the backend failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Cross-process partition lock unobtainable within bounded retries;
    /// retryable by the caller
    #[error("lock timeout: {0}")]
    LockTimeout(String),

    /// Writing the debug mirror file failed after the lock was held
    #[error("mirror write failed: {0}")]
    MirrorWriteFailed(String),
}

impl StoreError {
    /// Whether the caller may retry the same operation as-is
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::LockTimeout(_))
    }

    pub(crate) fn write(err: sqlx::Error) -> Self {
        // A writer that waited out the busy timeout should be retried by
        // the caller, not treated as a hard write failure
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.message().contains("database is locked") {
                return StoreError::LockTimeout(db_err.message().to_string());
            }
        }
        StoreError::WriteFailed(err.to_string())
    }

    pub(crate) fn query(err: sqlx::Error) -> Self {
        StoreError::QueryFailed(err.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::MirrorWriteFailed(err.to_string())
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;
