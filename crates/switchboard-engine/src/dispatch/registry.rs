// Listener registry
//
// Registrations are administrative data: created explicitly at process start,
// rarely mutated at runtime, and read-only at dispatch time. Matching is by
// source scope, event type and data type; ordering is ascending priority with
// ties broken global-scope-first.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use switchboard_error::{EngineError, EngineResult};
use switchboard_types::SourceId;

use crate::event::Event;

/// Which sources a registration applies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListenerScope {
    /// Applies to events from any source
    Global,
    /// Applies only to events from one source
    Source(SourceId),
}

impl ListenerScope {
    pub fn matches(&self, source: &SourceId) -> bool {
        match self {
            ListenerScope::Global => true,
            ListenerScope::Source(id) => id == source,
        }
    }

    /// Ordering rank for priority ties: global scope executes first
    fn rank(&self) -> u8 {
        match self {
            ListenerScope::Global => 0,
            ListenerScope::Source(_) => 1,
        }
    }
}

/// Exact-or-wildcard match on an event or data type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypePattern {
    /// Matches any type
    Any,
    /// Matches one type exactly
    Exact(String),
}

impl TypePattern {
    pub fn exact(s: impl Into<String>) -> Self {
        TypePattern::Exact(s.into())
    }

    pub fn matches(&self, value: &str) -> bool {
        match self {
            TypePattern::Any => true,
            TypePattern::Exact(expected) => expected == value,
        }
    }
}

/// Administrative registration of one listener
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerRegistration {
    /// Unique registration id
    pub id: String,
    /// Source scope: a specific source id, or the global wildcard
    pub scope: ListenerScope,
    /// Event type to match, or wildcard
    pub event_type: TypePattern,
    /// Data type to match, or wildcard
    pub data_type: TypePattern,
    /// Ascending priority: lower runs earlier
    pub priority: i32,
    /// Disabled registrations never match
    pub enabled: bool,
}

impl ListenerRegistration {
    pub fn new(id: impl Into<String>, scope: ListenerScope) -> Self {
        ListenerRegistration {
            id: id.into(),
            scope,
            event_type: TypePattern::Any,
            data_type: TypePattern::Any,
            priority: 0,
            enabled: true,
        }
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = TypePattern::exact(event_type);
        self
    }

    pub fn with_data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = TypePattern::exact(data_type);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Whether this registration matches the event
    pub fn matches(&self, event: &Event) -> bool {
        self.enabled
            && self.scope.matches(&event.source_id)
            && self.event_type.matches(&event.event_type)
            && self.data_type.matches(&event.data_type)
    }
}

/// Handler executed for a matched event
#[async_trait]
pub trait Listener: Send + Sync {
    /// Handle the event; mutate it and return, set stop_propagation to end
    /// dispatch, or leave it pending to suspend dispatch
    async fn on_event(&self, event: &mut Event) -> EngineResult<()>;
}

/// Registry of listener registrations and their handlers
pub struct ListenerRegistry {
    entries: RwLock<Vec<(ListenerRegistration, Arc<dyn Listener>)>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        ListenerRegistry {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Register a listener. Registration ids are unique.
    pub fn register(
        &self,
        registration: ListenerRegistration,
        handler: Arc<dyn Listener>,
    ) -> EngineResult<()> {
        let mut entries = self.entries.write().map_err(|_| {
            EngineError::SyncError("Failed to acquire write lock on listener registry".to_string())
        })?;

        if entries.iter().any(|(r, _)| r.id == registration.id) {
            return Err(EngineError::InvalidArgument(format!(
                "Listener with id '{}' already registered",
                registration.id
            )));
        }

        entries.push((registration, handler));
        Ok(())
    }

    /// Enable or disable a registration
    pub fn set_enabled(&self, id: &str, enabled: bool) -> EngineResult<()> {
        let mut entries = self.entries.write().map_err(|_| {
            EngineError::SyncError("Failed to acquire write lock on listener registry".to_string())
        })?;

        let entry = entries
            .iter_mut()
            .find(|(r, _)| r.id == id)
            .ok_or_else(|| EngineError::NotFound(format!("Listener not found: {}", id)))?;

        entry.0.enabled = enabled;
        Ok(())
    }

    /// Number of registrations
    pub fn count(&self) -> EngineResult<usize> {
        let entries = self.entries.read().map_err(|_| {
            EngineError::SyncError("Failed to acquire read lock on listener registry".to_string())
        })?;

        Ok(entries.len())
    }

    /// Resolve the ordered set of listeners matching the event: ascending
    /// priority, ties broken global-scope-first, then registration id for
    /// determinism.
    pub fn matches_for(
        &self,
        event: &Event,
    ) -> EngineResult<Vec<(ListenerRegistration, Arc<dyn Listener>)>> {
        let entries = self.entries.read().map_err(|_| {
            EngineError::SyncError("Failed to acquire read lock on listener registry".to_string())
        })?;

        let mut matched: Vec<_> = entries
            .iter()
            .filter(|(r, _)| r.matches(event))
            .cloned()
            .collect();

        matched.sort_by(|(a, _), (b, _)| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.scope.rank().cmp(&b.scope.rank()))
                .then_with(|| a.id.cmp(&b.id))
        });

        Ok(matched)
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        ListenerRegistry::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopListener;

    #[async_trait]
    impl Listener for NoopListener {
        async fn on_event(&self, _event: &mut Event) -> EngineResult<()> {
            Ok(())
        }
    }

    fn test_event(source: &str) -> Event {
        Event::new(SourceId::new(source), "endpoint.call", "json")
    }

    fn register(
        registry: &ListenerRegistry,
        id: &str,
        scope: ListenerScope,
        priority: i32,
    ) -> EngineResult<()> {
        registry.register(
            ListenerRegistration::new(id, scope).with_priority(priority),
            Arc::new(NoopListener),
        )
    }

    #[test]
    fn test_duplicate_id_rejected() -> EngineResult<()> {
        let registry = ListenerRegistry::new();
        register(&registry, "l1", ListenerScope::Global, 0)?;

        let dup = register(&registry, "l1", ListenerScope::Global, 5);
        assert!(matches!(dup, Err(EngineError::InvalidArgument(_))));
        assert_eq!(registry.count()?, 1);
        Ok(())
    }

    #[test]
    fn test_priority_ordering_regardless_of_insertion() -> EngineResult<()> {
        let registry = ListenerRegistry::new();
        register(&registry, "mid", ListenerScope::Global, 0)?;
        register(&registry, "late", ListenerScope::Global, 100)?;
        register(&registry, "early", ListenerScope::Global, -100)?;

        let matched = registry.matches_for(&test_event("src-1"))?;
        let ids: Vec<_> = matched.iter().map(|(r, _)| r.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "mid", "late"]);
        Ok(())
    }

    #[test]
    fn test_global_scope_wins_priority_ties() -> EngineResult<()> {
        let registry = ListenerRegistry::new();
        register(
            &registry,
            "specific",
            ListenerScope::Source(SourceId::new("src-1")),
            10,
        )?;
        register(&registry, "global", ListenerScope::Global, 10)?;

        let matched = registry.matches_for(&test_event("src-1"))?;
        let ids: Vec<_> = matched.iter().map(|(r, _)| r.id.as_str()).collect();
        assert_eq!(ids, vec!["global", "specific"]);
        Ok(())
    }

    #[test]
    fn test_scope_and_type_filtering() -> EngineResult<()> {
        let registry = ListenerRegistry::new();
        register(
            &registry,
            "other-source",
            ListenerScope::Source(SourceId::new("src-2")),
            0,
        )?;
        registry.register(
            ListenerRegistration::new("other-type", ListenerScope::Global)
                .with_event_type("different.call"),
            Arc::new(NoopListener),
        )?;
        registry.register(
            ListenerRegistration::new("exact", ListenerScope::Global)
                .with_event_type("endpoint.call")
                .with_data_type("json"),
            Arc::new(NoopListener),
        )?;

        let matched = registry.matches_for(&test_event("src-1"))?;
        let ids: Vec<_> = matched.iter().map(|(r, _)| r.id.as_str()).collect();
        assert_eq!(ids, vec!["exact"]);
        Ok(())
    }

    #[test]
    fn test_disabled_listener_never_matches() -> EngineResult<()> {
        let registry = ListenerRegistry::new();
        register(&registry, "l1", ListenerScope::Global, 0)?;

        registry.set_enabled("l1", false)?;
        assert!(registry.matches_for(&test_event("src-1"))?.is_empty());

        registry.set_enabled("l1", true)?;
        assert_eq!(registry.matches_for(&test_event("src-1"))?.len(), 1);
        Ok(())
    }
}
