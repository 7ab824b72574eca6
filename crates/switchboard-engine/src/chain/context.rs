// Invocation context
//
// Per-endpoint-call state for one run of the stage chain. The context is
// persisted on the owning event for the duration of any suspension and
// discarded once the chain reaches a terminal stage. The resumption pointer
// addresses exactly one stage at a time; chain execution is single-threaded
// per context.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use switchboard_types::EndpointName;

use crate::adaptor::{CachePolicy, InvokeResponse};
use crate::cache::CacheLifetime;

/// Default sub-step a stage is entered at
pub const START_STEP: &str = "start";

/// Closed set of stage identifiers, in chain order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageKind {
    AuthCheck,
    CacheRead,
    Invoke,
    PostProcess,
    CacheWrite,
    CallbackResolve,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageKind::AuthCheck => "auth-check",
            StageKind::CacheRead => "cache-read",
            StageKind::Invoke => "invoke",
            StageKind::PostProcess => "post-process",
            StageKind::CacheWrite => "cache-write",
            StageKind::CallbackResolve => "callback-resolve",
        };
        write!(f, "{}", name)
    }
}

/// Persisted pointer naming exactly where a suspended chain re-enters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumePoint {
    /// The stage to re-enter
    pub stage: StageKind,
    /// Stage-local sub-step (e.g. a provider-specific continuation)
    pub sub_step: String,
    /// Optional stage-private continuation tag
    pub tag: Option<String>,
}

impl ResumePoint {
    pub fn new(stage: StageKind) -> Self {
        ResumePoint {
            stage,
            sub_step: START_STEP.to_string(),
            tag: None,
        }
    }

    pub fn with_sub_step(mut self, sub_step: impl Into<String>) -> Self {
        self.sub_step = sub_step.into();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

/// State for one endpoint call through the stage chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationContext {
    /// Target endpoint name
    pub endpoint: EndpointName,
    /// Invocation arguments
    pub args: Value,
    /// Last response produced by the chain (raw, then shaped)
    pub response: Option<InvokeResponse>,
    /// Inbound resolution delivered by an external signal, consumed by the
    /// stage the chain re-enters at
    pub resolved: Option<InvokeResponse>,
    /// Cache key, if the endpoint call is cacheable
    pub cache_key: Option<String>,
    /// TTL in milliseconds, if TTL-based
    pub cache_ttl_ms: Option<i64>,
    /// Whether the endpoint is inherently asynchronous
    pub asynchronous: bool,
    /// Whether this context installed the live cache entry for its key and
    /// still owes it a resolution
    pub cache_claimed: bool,
    /// Where a suspended chain re-enters; None while running from the top
    pub resume: Option<ResumePoint>,
    /// Set once the chain reached a terminal stage
    pub halted: bool,
}

impl InvocationContext {
    /// Create a context for a fresh chain run
    pub fn new(endpoint: EndpointName, args: Value) -> Self {
        InvocationContext {
            endpoint,
            args,
            response: None,
            resolved: None,
            cache_key: None,
            cache_ttl_ms: None,
            asynchronous: false,
            cache_claimed: false,
            resume: None,
            halted: false,
        }
    }

    /// Record the cache policy computed for this call
    pub fn apply_policy(&mut self, policy: &CachePolicy) {
        self.cache_key = if policy.key.is_empty() {
            None
        } else {
            Some(policy.key.clone())
        };
        self.cache_ttl_ms = policy.ttl_ms;
        self.asynchronous = policy.asynchronous;
    }

    /// A key is only meaningful if non-empty and either TTL-based or
    /// inherently asynchronous
    pub fn really_cacheable(&self) -> bool {
        self.cache_key.is_some() && (self.cache_ttl_ms.is_some() || self.asynchronous)
    }

    /// The cache lifetime implied by the recorded policy
    pub fn cache_lifetime(&self) -> CacheLifetime {
        match self.cache_ttl_ms {
            Some(ttl_ms) => CacheLifetime::Ttl(ttl_ms),
            None => CacheLifetime::ReadOnce,
        }
    }
}
