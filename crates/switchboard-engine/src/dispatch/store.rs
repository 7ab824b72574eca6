// Event store
//
// Snapshots of in-flight, suspended and completed events, indexed by event
// id. A suspended event's persisted state lives here until an external signal
// re-enters it; a completed event's final state stays retrievable by id for
// callers that timed out waiting.

use std::collections::HashMap;
use std::sync::RwLock;

use switchboard_error::{EngineError, EngineResult};
use switchboard_types::{EventId, TaskId};

use crate::event::Event;

/// Storage for event snapshots
#[derive(Debug, Default)]
pub struct EventStore {
    /// Snapshots indexed by event id
    events: RwLock<HashMap<EventId, Event>>,
}

impl EventStore {
    pub fn new() -> Self {
        EventStore {
            events: RwLock::new(HashMap::new()),
        }
    }

    /// Store or replace the snapshot for an event
    pub fn store(&self, event: &Event) -> EngineResult<()> {
        let mut events = self.events.write().map_err(|_| {
            EngineError::SyncError("Failed to acquire write lock on event store".to_string())
        })?;

        events.insert(event.id.clone(), event.clone());
        Ok(())
    }

    /// Retrieve a snapshot by event id
    pub fn get(&self, event_id: &EventId) -> EngineResult<Option<Event>> {
        let events = self.events.read().map_err(|_| {
            EngineError::SyncError("Failed to acquire read lock on event store".to_string())
        })?;

        Ok(events.get(event_id).cloned())
    }

    /// Remove a snapshot
    pub fn remove(&self, event_id: &EventId) -> EngineResult<Option<Event>> {
        let mut events = self.events.write().map_err(|_| {
            EngineError::SyncError("Failed to acquire write lock on event store".to_string())
        })?;

        Ok(events.remove(event_id))
    }

    /// Find the snapshot correlated with a task id
    pub fn find_by_task(&self, task_id: &TaskId) -> EngineResult<Option<Event>> {
        let events = self.events.read().map_err(|_| {
            EngineError::SyncError("Failed to acquire read lock on event store".to_string())
        })?;

        Ok(events
            .values()
            .find(|e| e.task_id.as_ref() == Some(task_id))
            .cloned())
    }

    /// Count stored snapshots
    pub fn count(&self) -> EngineResult<usize> {
        let events = self.events.read().map_err(|_| {
            EngineError::SyncError("Failed to acquire read lock on event store".to_string())
        })?;

        Ok(events.len())
    }

    /// Clear all snapshots
    pub fn clear(&self) -> EngineResult<()> {
        let mut events = self.events.write().map_err(|_| {
            EngineError::SyncError("Failed to acquire write lock on event store".to_string())
        })?;

        events.clear();
        Ok(())
    }
}
