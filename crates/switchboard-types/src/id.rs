// Identifier types for events, tasks and endpoints.
//
// Event and task ids are content-derived: a blake3 hash over creation time,
// a random nonce and the optional parent id, rendered as hex. This keeps ids
// unique without a central allocator and makes related ids traceable.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Payload hashed to derive a fresh identifier
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IdPayload {
    /// Creation timestamp (unix millis)
    timestamp: i64,
    /// Random nonce for uniqueness
    nonce: [u8; 8],
    /// Optional parent identifier
    parent: Option<String>,
}

impl IdPayload {
    fn fresh(parent: Option<&str>) -> Self {
        IdPayload {
            timestamp: Utc::now().timestamp_millis(),
            nonce: rand::random::<[u8; 8]>(),
            parent: parent.map(|p| p.to_string()),
        }
    }

    /// Hash the payload and render the first 16 bytes as hex
    fn digest(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.timestamp.to_le_bytes());
        hasher.update(&self.nonce);
        if let Some(parent) = &self.parent {
            hasher.update(parent.as_bytes());
        }
        let hash = hasher.finalize();
        hex::encode(&hash.as_bytes()[..16])
    }
}

/// Unique identifier for an event
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

impl EventId {
    /// Generate a fresh event id
    pub fn new() -> Self {
        EventId(format!("event:{}", IdPayload::fresh(None).digest()))
    }

    /// Generate a fresh event id derived from a parent event
    pub fn child_of(parent: &EventId) -> Self {
        EventId(format!(
            "event:{}",
            IdPayload::fresh(Some(parent.as_str())).digest()
        ))
    }

    /// Create an event id from an existing string form
    pub fn from_str(s: impl Into<String>) -> Self {
        EventId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        EventId::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier correlating related events to one task (e.g. an original call
/// and the callback that resolves it)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    /// Generate a fresh task id
    pub fn new() -> Self {
        TaskId(format!("task:{}", IdPayload::fresh(None).digest()))
    }

    /// Create a task id from an existing string form
    pub fn from_str(s: impl Into<String>) -> Self {
        TaskId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        TaskId::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the producer that emitted an event
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceId(pub String);

impl SourceId {
    pub fn new(s: impl Into<String>) -> Self {
        SourceId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of an endpoint an invocation chain targets
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointName(pub String);

impl EndpointName {
    pub fn new(s: impl Into<String>) -> Self {
        EndpointName(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
