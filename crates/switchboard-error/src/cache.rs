// Response-cache error types

use thiserror::Error;

use crate::ErrorCode;

/// Cache-specific error codes
pub mod codes {
    use crate::ErrorCode;

    // Cache error codes start with 6000
    pub const DUPLICATE_ENTRY: ErrorCode = ErrorCode(6001);
    pub const NOT_FOUND: ErrorCode = ErrorCode(6002);
    pub const SYNC_ERROR: ErrorCode = ErrorCode(6003);
}

/// Response-cache error types
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// An entry already exists for the cache key
    #[error("Duplicate cache entry for key: {0}")]
    DuplicateEntry(String),

    /// No entry exists for the cache key
    #[error("Cache entry not found: {0}")]
    NotFound(String),

    /// Lock acquisition or synchronization error
    #[error("Sync error: {0}")]
    SyncError(String),
}

impl CacheError {
    /// The numeric code for this error
    pub fn code(&self) -> ErrorCode {
        use codes::*;
        match self {
            CacheError::DuplicateEntry(_) => DUPLICATE_ENTRY,
            CacheError::NotFound(_) => NOT_FOUND,
            CacheError::SyncError(_) => SYNC_ERROR,
        }
    }
}

/// Result type for cache operations
pub type CacheResult<T> = std::result::Result<T, CacheError>;
