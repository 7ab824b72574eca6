//! Event dispatcher
//!
//! Resolves the ordered set of registered listeners for an incoming event and
//! runs them one at a time. A listener may mutate the event and return, end
//! dispatch by stopping propagation, or leave the event pending. In the
//! pending case dispatch suspends, and the persisted listener index lets a
//! later re-entry continue with the listeners that had not yet run.

pub mod registry;
pub mod store;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use switchboard_error::EngineResult;
use switchboard_types::{EventId, StatusCode};

use crate::dispatch::registry::ListenerRegistry;
use crate::dispatch::store::EventStore;
use crate::event::Event;

/// How a dispatch run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchResult {
    /// All matched listeners ran, or one stopped propagation or failed;
    /// the event's status and message stand
    Completed,
    /// A listener left the event pending; dispatch resumes on a later signal
    Suspended,
}

/// Result of a dispatch bounded by a synchronous wait timeout
#[derive(Debug)]
pub enum TimedDispatch {
    /// Dispatch finished within the wait window
    Done {
        result: DispatchResult,
        event: Event,
    },
    /// The wait elapsed; the work continues out-of-band and the final state
    /// is retrievable from the store by event id
    Processing { event_id: EventId },
}

/// Runs matched listeners in priority order for one event at a time
pub struct EventDispatcher {
    registry: Arc<ListenerRegistry>,
    store: Arc<EventStore>,
}

impl EventDispatcher {
    pub fn new(registry: Arc<ListenerRegistry>, store: Arc<EventStore>) -> Self {
        EventDispatcher { registry, store }
    }

    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    /// Dispatch the event to every matched listener, starting at the
    /// persisted listener index when re-entering a suspended dispatch.
    pub async fn dispatch(&self, event: &mut Event) -> EngineResult<DispatchResult> {
        let matched = self.registry.matches_for(event)?;
        let start = event.context.resume_listener_index.take().unwrap_or(0);

        debug!(
            event = %event.id,
            listeners = matched.len(),
            start,
            "dispatching event"
        );

        for idx in start..matched.len() {
            let (registration, listener) = &matched[idx];

            if let Err(err) = listener.on_event(event).await {
                warn!(event = %event.id, listener = %registration.id, %err, "listener failed");
                event.fail(-(err.code().0 as i32), err.to_string());
                self.store.store(event)?;
                return Ok(DispatchResult::Completed);
            }

            if event.status.is_pending() {
                // Continue after the suspended listener on re-entry; its own
                // continuation happens through the chain driver
                event.context.resume_listener_index = Some(idx + 1);
                self.store.store(event)?;
                return Ok(DispatchResult::Suspended);
            }

            if event.stop_propagation {
                debug!(event = %event.id, listener = %registration.id, "propagation stopped");
                break;
            }
        }

        if !event.status.is_terminal() {
            event.status = StatusCode::Success;
        }
        self.store.store(event)?;
        Ok(DispatchResult::Completed)
    }

    /// Dispatch with a synchronous wait bound. If the wait elapses the
    /// underlying work is not aborted: it completes out-of-band and the final
    /// event is retrievable from the store by id.
    pub async fn dispatch_with_timeout(
        self: &Arc<Self>,
        mut event: Event,
        wait: Duration,
    ) -> EngineResult<TimedDispatch> {
        let event_id = event.id.clone();

        // Snapshot the in-progress event so callers can poll it immediately
        self.store.store(&event)?;

        let dispatcher = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let result = dispatcher.dispatch(&mut event).await;
            result.map(|r| (r, event))
        });

        match tokio::time::timeout(wait, handle).await {
            Ok(Ok(joined)) => {
                let (result, event) = joined?;
                Ok(TimedDispatch::Done { result, event })
            }
            Ok(Err(join_err)) => Err(switchboard_error::EngineError::Internal(format!(
                "dispatch task failed: {}",
                join_err
            ))),
            // Dropping the handle detaches the task; the dispatch keeps
            // running and stores its final snapshot
            Err(_) => Ok(TimedDispatch::Processing { event_id }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::registry::{Listener, ListenerRegistration, ListenerScope};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use switchboard_error::EngineError;
    use switchboard_types::SourceId;

    struct RecordingListener {
        name: String,
        log: Arc<Mutex<Vec<String>>>,
        stop: bool,
        pend: bool,
        fail: bool,
    }

    impl RecordingListener {
        fn plain(name: &str, log: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(RecordingListener {
                name: name.to_string(),
                log,
                stop: false,
                pend: false,
                fail: false,
            })
        }
    }

    #[async_trait]
    impl Listener for RecordingListener {
        async fn on_event(&self, event: &mut Event) -> EngineResult<()> {
            self.log.lock().unwrap().push(self.name.clone());
            if self.fail {
                return Err(EngineError::ListenerFailed("deliberate".to_string()));
            }
            if self.pend {
                event.mark_pending("suspended by listener");
            }
            if self.stop {
                event.stop_propagation();
            }
            Ok(())
        }
    }

    fn setup() -> (Arc<ListenerRegistry>, Arc<EventDispatcher>) {
        let registry = Arc::new(ListenerRegistry::new());
        let store = Arc::new(EventStore::new());
        let dispatcher = Arc::new(EventDispatcher::new(registry.clone(), store));
        (registry, dispatcher)
    }

    fn test_event() -> Event {
        Event::new(SourceId::new("src-1"), "endpoint.call", "json")
    }

    #[tokio::test]
    async fn test_listeners_run_in_priority_order() -> EngineResult<()> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (registry, dispatcher) = setup();

        registry.register(
            ListenerRegistration::new("b", ListenerScope::Global).with_priority(0),
            RecordingListener::plain("b", log.clone()),
        )?;
        registry.register(
            ListenerRegistration::new("c", ListenerScope::Global).with_priority(100),
            RecordingListener::plain("c", log.clone()),
        )?;
        registry.register(
            ListenerRegistration::new("a", ListenerScope::Global).with_priority(-100),
            RecordingListener::plain("a", log.clone()),
        )?;

        let mut event = test_event();
        let result = dispatcher.dispatch(&mut event).await?;

        assert_eq!(result, DispatchResult::Completed);
        assert_eq!(event.status, StatusCode::Success);
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_stop_propagation_ends_dispatch() -> EngineResult<()> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (registry, dispatcher) = setup();

        registry.register(
            ListenerRegistration::new("first", ListenerScope::Global).with_priority(0),
            Arc::new(RecordingListener {
                name: "first".to_string(),
                log: log.clone(),
                stop: true,
                pend: false,
                fail: false,
            }),
        )?;
        registry.register(
            ListenerRegistration::new("second", ListenerScope::Global).with_priority(1),
            RecordingListener::plain("second", log.clone()),
        )?;

        let mut event = test_event();
        dispatcher.dispatch(&mut event).await?;

        assert_eq!(*log.lock().unwrap(), vec!["first"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_listener_failure_aborts_with_negative_status() -> EngineResult<()> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (registry, dispatcher) = setup();

        registry.register(
            ListenerRegistration::new("boom", ListenerScope::Global).with_priority(0),
            Arc::new(RecordingListener {
                name: "boom".to_string(),
                log: log.clone(),
                stop: false,
                pend: false,
                fail: true,
            }),
        )?;
        registry.register(
            ListenerRegistration::new("after", ListenerScope::Global).with_priority(1),
            RecordingListener::plain("after", log.clone()),
        )?;

        let mut event = test_event();
        let result = dispatcher.dispatch(&mut event).await?;

        assert_eq!(result, DispatchResult::Completed);
        assert!(matches!(event.status, StatusCode::Failed(code) if code < 0));
        assert!(event.message.contains("deliberate"));
        assert_eq!(*log.lock().unwrap(), vec!["boom"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_suspension_persists_next_listener_index() -> EngineResult<()> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (registry, dispatcher) = setup();

        registry.register(
            ListenerRegistration::new("first", ListenerScope::Global).with_priority(0),
            RecordingListener::plain("first", log.clone()),
        )?;
        registry.register(
            ListenerRegistration::new("pends", ListenerScope::Global).with_priority(1),
            Arc::new(RecordingListener {
                name: "pends".to_string(),
                log: log.clone(),
                stop: false,
                pend: true,
                fail: false,
            }),
        )?;
        registry.register(
            ListenerRegistration::new("later", ListenerScope::Global).with_priority(2),
            RecordingListener::plain("later", log.clone()),
        )?;

        let mut event = test_event();
        let result = dispatcher.dispatch(&mut event).await?;
        assert_eq!(result, DispatchResult::Suspended);
        assert_eq!(event.context.resume_listener_index, Some(2));
        assert_eq!(*log.lock().unwrap(), vec!["first", "pends"]);

        // The external signal resolved the suspension; re-entry continues
        // with the listeners that had not yet run
        event.succeed(json!("resolved"));
        let result = dispatcher.dispatch(&mut event).await?;
        assert_eq!(result, DispatchResult::Completed);
        assert_eq!(*log.lock().unwrap(), vec!["first", "pends", "later"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_timeout_returns_processing_and_completes_out_of_band() -> EngineResult<()> {
        let (registry, dispatcher) = setup();

        struct SlowListener;

        #[async_trait]
        impl Listener for SlowListener {
            async fn on_event(&self, event: &mut Event) -> EngineResult<()> {
                tokio::time::sleep(Duration::from_millis(50)).await;
                event.succeed(json!("slow result"));
                Ok(())
            }
        }

        registry.register(
            ListenerRegistration::new("slow", ListenerScope::Global),
            Arc::new(SlowListener),
        )?;

        let event = test_event();
        let event_id = event.id.clone();

        let timed = dispatcher
            .dispatch_with_timeout(event, Duration::from_millis(5))
            .await?;
        let returned_id = match timed {
            TimedDispatch::Processing { event_id } => event_id,
            TimedDispatch::Done { .. } => panic!("wait must elapse before the slow listener"),
        };
        assert_eq!(returned_id, event_id);

        // The work was not aborted; the final result lands in the store
        tokio::time::sleep(Duration::from_millis(100)).await;
        let stored = dispatcher
            .store()
            .get(&event_id)?
            .expect("final snapshot must be stored");
        assert_eq!(stored.status, StatusCode::Success);
        assert_eq!(stored.context.resp, Some(json!("slow result")));
        Ok(())
    }
}
