// Engine-specific error types
// These errors cover the dispatcher, the invocation chain and the registries.

use thiserror::Error;

use crate::{CacheError, ErrorCode};

/// Engine-specific error codes
pub mod codes {
    use crate::ErrorCode;

    // Engine error codes start with 5000
    pub const LISTENER_FAILED: ErrorCode = ErrorCode(5001);
    pub const STAGE_FAILED: ErrorCode = ErrorCode(5002);
    pub const MISSING_RESUME_POINT: ErrorCode = ErrorCode(5003);
    pub const UNKNOWN_STAGE: ErrorCode = ErrorCode(5004);
    pub const CALLBACK_STILL_PENDING: ErrorCode = ErrorCode(5005);
    pub const CONTEXT_ERROR: ErrorCode = ErrorCode(5006);
    pub const NOT_FOUND: ErrorCode = ErrorCode(5007);
    pub const SYNC_ERROR: ErrorCode = ErrorCode(5008);
    pub const INVALID_ARGUMENT: ErrorCode = ErrorCode(5009);
    pub const UNAUTHORIZED: ErrorCode = ErrorCode(5010);
    pub const TIMEOUT: ErrorCode = ErrorCode(5011);
    pub const CACHE_ERROR: ErrorCode = ErrorCode(5012);
    pub const INTERNAL: ErrorCode = ErrorCode(5013);
}

/// Engine-specific error types
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    /// A listener raised an error during dispatch
    #[error("Listener failed: {0}")]
    ListenerFailed(String),

    /// A chain stage raised an error
    #[error("Stage failed: {0}")]
    StageFailed(String),

    /// A pending outcome was produced without a resumption pointer
    #[error("Pending outcome without a resumption pointer: {0}")]
    MissingResumePoint(String),

    /// A resumption pointer names a stage the driver does not know
    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    /// A callback resolution carried a response that is itself still pending
    #[error("Callback resolution is still pending: {0}")]
    CallbackStillPending(String),

    /// Invocation context error
    #[error("Context error: {0}")]
    ContextError(String),

    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Lock acquisition or synchronization error
    #[error("Sync error: {0}")]
    SyncError(String),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Credentials rejected for the target endpoint
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Synchronous wait elapsed
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Response cache error
    #[error("Cache error: {0}")]
    CacheError(#[from] CacheError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// The numeric code for this error
    pub fn code(&self) -> ErrorCode {
        use codes::*;
        match self {
            EngineError::ListenerFailed(_) => LISTENER_FAILED,
            EngineError::StageFailed(_) => STAGE_FAILED,
            EngineError::MissingResumePoint(_) => MISSING_RESUME_POINT,
            EngineError::UnknownStage(_) => UNKNOWN_STAGE,
            EngineError::CallbackStillPending(_) => CALLBACK_STILL_PENDING,
            EngineError::ContextError(_) => CONTEXT_ERROR,
            EngineError::NotFound(_) => NOT_FOUND,
            EngineError::SyncError(_) => SYNC_ERROR,
            EngineError::InvalidArgument(_) => INVALID_ARGUMENT,
            EngineError::Unauthorized(_) => UNAUTHORIZED,
            EngineError::Timeout(_) => TIMEOUT,
            EngineError::CacheError(_) => CACHE_ERROR,
            EngineError::Internal(_) => INTERNAL,
        }
    }
}

/// Result type for engine operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;
