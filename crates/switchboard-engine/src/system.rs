//! Assembled system
//!
//! [`SwitchboardSystem`] wires the listener registry, event dispatcher, chain
//! driver and response cache into one facade. It owns the re-entry paths: an
//! external completion signal lands here, is matched to its suspended event,
//! and is pushed back through the chain and the remaining listeners. The
//! system is also the observer resumer handed to the chain, so a resolved
//! cache entry fans out to parked events through the same path.

use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use switchboard_error::{EngineError, EngineResult};
use switchboard_types::{EventId, TaskId};

use crate::adaptor::{AuthResolver, EndpointAdaptor, InvokeResponse, ObserverResumer};
use crate::cache::{ResponseCache, DEFAULT_OBSERVER_BATCH};
use crate::chain::{ChainDriver, ChainOutcome};
use crate::dispatch::registry::ListenerRegistry;
use crate::dispatch::store::EventStore;
use crate::dispatch::{DispatchResult, EventDispatcher, TimedDispatch};
use crate::event::Event;

/// Running tallies over everything the system has dispatched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchMetrics {
    /// Events submitted through the system
    pub submitted: u64,
    /// Dispatches that ended in success
    pub completed: u64,
    /// Dispatches that ended in failure
    pub failed: u64,
    /// Dispatches that suspended pending an external signal
    pub suspended: u64,
}

/// The assembled engine: registry, dispatcher, chain and cache behind one
/// facade, plus the re-entry paths for external completion signals
pub struct SwitchboardSystem {
    registry: Arc<ListenerRegistry>,
    dispatcher: Arc<EventDispatcher>,
    driver: Arc<ChainDriver>,
    cache: Arc<ResponseCache>,
    store: Arc<EventStore>,
    metrics: RwLock<DispatchMetrics>,
}

/// Observer resumer backed by the owning system.
///
/// Holds a weak reference: the system owns the chain which owns this resumer,
/// and a strong reference would keep that cycle alive forever.
struct SystemResumer {
    system: Weak<SwitchboardSystem>,
}

#[async_trait]
impl ObserverResumer for SystemResumer {
    async fn resume(&self, observer: &EventId, response: &Value) -> EngineResult<()> {
        let system = self.system.upgrade().ok_or_else(|| {
            EngineError::Internal("system dropped while observers were parked".to_string())
        })?;
        system.resume_observer(observer, response).await
    }

    async fn abort(&self, observer: &EventId, error: &EngineError) -> EngineResult<()> {
        let system = self.system.upgrade().ok_or_else(|| {
            EngineError::Internal("system dropped while observers were parked".to_string())
        })?;
        system.abort_observer(observer, error)
    }
}

impl SwitchboardSystem {
    /// Assemble a system with the default observer batch size
    pub fn new(adaptor: Arc<dyn EndpointAdaptor>, auth: Arc<dyn AuthResolver>) -> Arc<Self> {
        Self::with_batch_size(adaptor, auth, DEFAULT_OBSERVER_BATCH)
    }

    /// Assemble a system with an explicit observer batch size
    pub fn with_batch_size(
        adaptor: Arc<dyn EndpointAdaptor>,
        auth: Arc<dyn AuthResolver>,
        batch_size: usize,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| {
            let registry = Arc::new(ListenerRegistry::new());
            let store = Arc::new(EventStore::new());
            let cache = Arc::new(ResponseCache::new(batch_size));
            let resumer: Arc<dyn ObserverResumer> = Arc::new(SystemResumer {
                system: weak.clone(),
            });
            let driver = Arc::new(ChainDriver::standard(
                adaptor,
                auth,
                cache.clone(),
                resumer,
            ));
            let dispatcher = Arc::new(EventDispatcher::new(registry.clone(), store.clone()));

            SwitchboardSystem {
                registry,
                dispatcher,
                driver,
                cache,
                store,
                metrics: RwLock::new(DispatchMetrics::default()),
            }
        })
    }

    pub fn registry(&self) -> &Arc<ListenerRegistry> {
        &self.registry
    }

    pub fn driver(&self) -> &Arc<ChainDriver> {
        &self.driver
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    /// Submit an event and dispatch it to completion or suspension
    pub async fn submit(&self, mut event: Event) -> EngineResult<Event> {
        self.note_submitted()?;
        let result = self.dispatcher.dispatch(&mut event).await?;
        self.note_outcome(&event, result)?;
        Ok(event)
    }

    /// Submit an event with a synchronous wait bound. If the wait elapses the
    /// dispatch continues out-of-band; poll [`result_of`](Self::result_of)
    /// with the returned event id for the final state.
    pub async fn submit_with_timeout(
        self: &Arc<Self>,
        event: Event,
        wait: Duration,
    ) -> EngineResult<TimedDispatch> {
        self.note_submitted()?;
        let timed = self.dispatcher.dispatch_with_timeout(event, wait).await?;
        if let TimedDispatch::Done { result, event } = &timed {
            self.note_outcome(event, *result)?;
        }
        Ok(timed)
    }

    /// Deliver an external completion signal to the suspended event it
    /// belongs to, identified by event id. The resolution re-enters the
    /// chain at the persisted resumption pointer; if the chain completes,
    /// the remaining listeners run.
    pub async fn resolve_callback(
        &self,
        event_id: &EventId,
        resolution: InvokeResponse,
    ) -> EngineResult<Event> {
        let mut event = self
            .store
            .get(event_id)?
            .ok_or_else(|| EngineError::NotFound(format!("No event with id {}", event_id)))?;

        self.resume(&mut event, resolution).await?;
        Ok(event)
    }

    /// Deliver an external completion signal by task correlation id
    pub async fn resolve_task(
        &self,
        task_id: &TaskId,
        resolution: InvokeResponse,
    ) -> EngineResult<Event> {
        let mut event = self
            .store
            .find_by_task(task_id)?
            .ok_or_else(|| EngineError::NotFound(format!("No event for task {}", task_id)))?;

        self.resume(&mut event, resolution).await?;
        Ok(event)
    }

    /// The stored snapshot for an event, if the system has seen it
    pub fn result_of(&self, event_id: &EventId) -> EngineResult<Option<Event>> {
        self.store.get(event_id)
    }

    /// Snapshot of the running dispatch tallies
    pub fn metrics(&self) -> EngineResult<DispatchMetrics> {
        let metrics = self.metrics.read().map_err(|_| {
            EngineError::SyncError("Failed to acquire read lock on metrics".to_string())
        })?;
        Ok(*metrics)
    }

    /// Resume an event parked as an observer on a cache entry
    async fn resume_observer(&self, observer: &EventId, response: &Value) -> EngineResult<()> {
        debug!(event = %observer, "resuming cache observer");
        let mut event = self
            .store
            .get(observer)?
            .ok_or_else(|| EngineError::NotFound(format!("No event with id {}", observer)))?;

        self.resume(&mut event, InvokeResponse::Final(response.clone()))
            .await
    }

    /// Push a resolution into the event's suspended chain and, if the chain
    /// completes, continue dispatch with the listeners that had not yet run
    async fn resume(&self, event: &mut Event, resolution: InvokeResponse) -> EngineResult<()> {
        // Duplicate delivery for an already-finished event: the recorded
        // result stands, and no listener runs again
        if event.is_terminal() {
            debug!(event = %event.id, "ignoring resolution for a completed event");
            return Ok(());
        }

        let ctx = event.context.invocation.as_mut().ok_or_else(|| {
            EngineError::ContextError("event carries no invocation context".to_string())
        })?;
        ctx.resolved = Some(resolution);

        let outcome = match self.driver.run(event).await {
            Ok(outcome) => outcome,
            Err(err) => {
                event.fail(-(err.code().0 as i32), err.to_string());
                self.store.store(event)?;
                self.note_outcome(event, DispatchResult::Completed)?;
                return Err(err);
            }
        };

        match outcome {
            ChainOutcome::Completed(_) => {
                let result = self.dispatcher.dispatch(event).await?;
                self.note_outcome(event, result)?;
            }
            ChainOutcome::Pending { .. } => {
                // Another round is required; persist the re-suspended state
                self.store.store(event)?;
                self.note_outcome(event, DispatchResult::Suspended)?;
            }
        }

        Ok(())
    }

    /// Fail an event parked as an observer of a discarded cache entry
    fn abort_observer(&self, observer: &EventId, error: &EngineError) -> EngineResult<()> {
        debug!(event = %observer, "failing cache observer");
        let mut event = self
            .store
            .get(observer)?
            .ok_or_else(|| EngineError::NotFound(format!("No event with id {}", observer)))?;

        event.fail(-(error.code().0 as i32), error.to_string());
        self.store.store(&event)?;
        self.note_outcome(&event, DispatchResult::Completed)
    }

    fn note_submitted(&self) -> EngineResult<()> {
        let mut metrics = self.metrics.write().map_err(|_| {
            EngineError::SyncError("Failed to acquire write lock on metrics".to_string())
        })?;
        metrics.submitted += 1;
        Ok(())
    }

    fn note_outcome(&self, event: &Event, result: DispatchResult) -> EngineResult<()> {
        let mut metrics = self.metrics.write().map_err(|_| {
            EngineError::SyncError("Failed to acquire write lock on metrics".to_string())
        })?;

        match result {
            DispatchResult::Suspended => metrics.suspended += 1,
            DispatchResult::Completed => {
                if matches!(event.status, switchboard_types::StatusCode::Failed(_)) {
                    metrics.failed += 1;
                } else {
                    metrics.completed += 1;
                }
            }
        }
        Ok(())
    }
}
