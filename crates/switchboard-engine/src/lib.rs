//! Switchboard engine
//!
//! This crate drives an externally-triggered request through a sequence of
//! processing stages, any of which may finish synchronously, fail, or suspend
//! pending an external asynchronous signal and later resume exactly where it
//! suspended. It is built from three components:
//!
//! - the event dispatcher, which matches and runs ordered listeners for a
//!   typed event ([`dispatch`]);
//! - the invocation chain, which drives one endpoint call through its stages
//!   with suspend/resume support ([`chain`]);
//! - the response cache, which de-duplicates concurrent invocations and fans
//!   the eventual result out to every waiting observer ([`cache`]).

pub mod adaptor;
pub mod cache;
pub mod chain;
pub mod dispatch;
pub mod event;
pub mod system;

// Re-export key types
pub use adaptor::{
    AuthOutcome, AuthResolver, CachePolicy, EndpointAdaptor, InvokeResponse, ObserverResumer,
};
pub use cache::{CacheEntry, CacheLifetime, ResponseCache, WriteOutcome, DEFAULT_OBSERVER_BATCH};
pub use chain::context::{InvocationContext, ResumePoint, StageKind};
pub use chain::stage::{Stage, StageEntry, StageOutcome};
pub use chain::{ChainDriver, ChainOutcome};
pub use dispatch::registry::{
    Listener, ListenerRegistration, ListenerRegistry, ListenerScope, TypePattern,
};
pub use dispatch::store::EventStore;
pub use dispatch::{DispatchResult, EventDispatcher, TimedDispatch};
pub use event::{Event, EventContext};
pub use system::{DispatchMetrics, SwitchboardSystem};

// Re-export the shared type and error crates
pub use switchboard_error::{CacheError, CacheResult, EngineError, EngineResult};
pub use switchboard_types::{EndpointName, EventId, SourceId, StatusCode, TaskId};
