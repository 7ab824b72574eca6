// Event envelope
//
// The envelope a producer emits and every listener and stage mutates. The
// typed fields this core reads and writes live on the envelope itself; the
// `side` map is an opaque side channel reserved for adaptor-private data the
// core never inspects.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use switchboard_types::{EventId, SourceId, StatusCode, TaskId};

use crate::chain::context::InvocationContext;

/// Mutable context carried by an event across suspensions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventContext {
    /// Per-endpoint-call state while an invocation chain is live
    pub invocation: Option<InvocationContext>,
    /// Final response data, once dispatch completes
    pub resp: Option<Value>,
    /// Listener index a suspended dispatch continues from
    pub resume_listener_index: Option<usize>,
    /// Adaptor-private side channel, opaque to the core
    pub side: HashMap<String, Value>,
}

/// Event envelope routed through the dispatcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier for this event
    pub id: EventId,
    /// Identifier of the producer that emitted the event
    pub source_id: SourceId,
    /// Event type, matched against listener registrations
    pub event_type: String,
    /// Data type, matched against listener registrations
    pub data_type: String,
    /// Optional task id correlating related events
    pub task_id: Option<TaskId>,
    /// Optional parent event id
    pub parent_id: Option<EventId>,
    /// Current status of the event
    pub status: StatusCode,
    /// Human-readable message accompanying the status
    pub message: String,
    /// Set by a listener to end dispatch after it returns
    pub stop_propagation: bool,
    /// Set by a listener to mark the default action as prevented
    pub default_prevented: bool,
    /// Mutable context bag
    pub context: EventContext,
}

impl Event {
    /// Create a new event with a fresh id
    pub fn new(
        source_id: SourceId,
        event_type: impl Into<String>,
        data_type: impl Into<String>,
    ) -> Self {
        Event {
            id: EventId::new(),
            source_id,
            event_type: event_type.into(),
            data_type: data_type.into(),
            task_id: None,
            parent_id: None,
            status: StatusCode::InProgress,
            message: String::new(),
            stop_propagation: false,
            default_prevented: false,
            context: EventContext::default(),
        }
    }

    /// Correlate this event with a task
    pub fn with_task(mut self, task_id: TaskId) -> Self {
        self.task_id = Some(task_id);
        self
    }

    /// Record the parent event this one was spawned from
    pub fn with_parent(mut self, parent_id: EventId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Seed the adaptor-private side channel
    pub fn with_side_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.side.insert(key.into(), value);
        self
    }

    /// Mark the event successful with final response data
    pub fn succeed(&mut self, resp: Value) {
        self.status = StatusCode::Success;
        self.message.clear();
        self.context.resp = Some(resp);
    }

    /// Mark the event failed with a negative code and message
    pub fn fail(&mut self, code: i32, message: impl Into<String>) {
        self.status = StatusCode::Failed(code);
        self.message = message.into();
    }

    /// Mark the event pending with a message for the caller
    pub fn mark_pending(&mut self, message: impl Into<String>) {
        self.status = StatusCode::Pending;
        self.message = message.into();
    }

    /// End dispatch after the current listener returns
    pub fn stop_propagation(&mut self) {
        self.stop_propagation = true;
    }

    /// Mark the default action as prevented
    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    /// Whether the event has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
