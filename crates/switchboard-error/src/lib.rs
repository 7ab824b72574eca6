// Switchboard error handling
// Central location for the error types used by the pipeline crates.

use std::fmt;

use serde::{Deserialize, Serialize};

// Re-export common error handling tools for convenience
pub use anyhow;
pub use thiserror;

mod cache;
mod engine;

pub use cache::{CacheError, CacheResult};
pub use engine::{EngineError, EngineResult};

/// Numeric error code for categorizing errors across process boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorCode(pub u32);

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.0)
    }
}
