// Core types shared across the Switchboard pipeline crates.
//
// These are the identifier newtypes and the status-code model used by the
// event envelope, the invocation chain and the response cache.

pub mod id;
pub mod status;

pub use id::{EndpointName, EventId, SourceId, TaskId};
pub use status::StatusCode;
