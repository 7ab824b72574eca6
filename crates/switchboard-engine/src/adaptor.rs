// External collaborator seams
//
// Protocol adaptors, auth providers and observer resumption are consumed
// through these traits. Concrete adaptors (HTTP, email, page generation) live
// outside this crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use switchboard_error::{EngineError, EngineResult};
use switchboard_types::{EndpointName, EventId};

use crate::event::Event;

/// Response produced by an adaptor invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InvokeResponse {
    /// The call finished and produced final data
    Final(Value),
    /// The call is asynchronous; the result arrives via a later signal
    Pending {
        /// Tag the adaptor needs to correlate the eventual completion.
        /// A pending response without one is a defect, not a valid outcome.
        resume_tag: Option<String>,
        /// Human-readable message for the waiting caller
        message: String,
    },
}

impl InvokeResponse {
    pub fn pending(resume_tag: impl Into<String>, message: impl Into<String>) -> Self {
        InvokeResponse::Pending {
            resume_tag: Some(resume_tag.into()),
            message: message.into(),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, InvokeResponse::Pending { .. })
    }

    /// The final value, if the response is resolved
    pub fn final_value(&self) -> Option<&Value> {
        match self {
            InvokeResponse::Final(value) => Some(value),
            InvokeResponse::Pending { .. } => None,
        }
    }
}

/// Outcome of an auth check round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AuthOutcome {
    /// Credentials are valid for the target endpoint
    Ok,
    /// Another round is required (e.g. a redirect-based token exchange);
    /// `tag` names the provider-specific continuation step
    Pending { tag: String },
    /// Credentials rejected; the caller must re-initiate
    Unauthorized(String),
}

/// Caching policy an adaptor declares for one endpoint call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CachePolicy {
    /// Cache key; an empty key means the call is not cacheable
    pub key: String,
    /// Time-to-live in milliseconds, if TTL-based
    pub ttl_ms: Option<i64>,
    /// Whether the endpoint is inherently asynchronous
    pub asynchronous: bool,
}

impl CachePolicy {
    /// Policy for a call that must never be cached
    pub fn none() -> Self {
        CachePolicy::default()
    }

    pub fn ttl(key: impl Into<String>, ttl_ms: i64) -> Self {
        CachePolicy {
            key: key.into(),
            ttl_ms: Some(ttl_ms),
            asynchronous: false,
        }
    }

    pub fn asynchronous(key: impl Into<String>) -> Self {
        CachePolicy {
            key: key.into(),
            ttl_ms: None,
            asynchronous: true,
        }
    }

    /// A key is only meaningful if it is non-empty and either a TTL is set or
    /// the endpoint is inherently asynchronous
    pub fn really_cacheable(&self) -> bool {
        !self.key.is_empty() && (self.ttl_ms.is_some() || self.asynchronous)
    }
}

/// Protocol adaptor for one endpoint type
#[async_trait]
pub trait EndpointAdaptor: Send + Sync {
    /// Invoke the endpoint with the mapped arguments
    async fn invoke(
        &self,
        endpoint: &EndpointName,
        args: &Value,
        event: &Event,
    ) -> EngineResult<InvokeResponse>;

    /// Shape a raw response into the endpoint's declared response schema
    async fn postprocess(
        &self,
        raw: &Value,
        event: &Event,
        endpoint: &EndpointName,
    ) -> EngineResult<Value>;

    /// Compute the cache key and TTL policy for the endpoint call
    async fn cache_policy(&self, endpoint: &EndpointName, args: &Value)
        -> EngineResult<CachePolicy>;
}

/// Credential validation for a target endpoint
#[async_trait]
pub trait AuthResolver: Send + Sync {
    /// Validate or refresh credentials; may suspend for a token exchange
    async fn check(&self, event: &Event, endpoint: &EndpointName) -> EngineResult<AuthOutcome>;

    /// Continue a suspended exchange at the provider-specific step named by
    /// `sub_step`, with the payload the external callback carried, if any
    async fn resume(
        &self,
        event: &Event,
        endpoint: &EndpointName,
        sub_step: &str,
        payload: Option<&Value>,
    ) -> EngineResult<AuthOutcome>;
}

/// Resumes or fails a suspended caller parked on a cache entry
#[async_trait]
pub trait ObserverResumer: Send + Sync {
    /// Deliver the resolved response to a parked observer
    async fn resume(&self, observer: &EventId, response: &Value) -> EngineResult<()>;

    /// Fail a parked observer because the entry it awaited was discarded.
    /// The default is a no-op for resumers that do not track suspended
    /// callers.
    async fn abort(&self, _observer: &EventId, _error: &EngineError) -> EngineResult<()> {
        Ok(())
    }
}
