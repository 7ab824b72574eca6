//! Invocation chain
//!
//! Runs an ordered, fixed list of stages against one invocation context,
//! producing either a final response or a pending marker. A suspended chain
//! re-enters at exactly the stage and sub-step named by the persisted
//! resumption pointer; prior stages are never re-run.

pub mod context;
pub mod stage;
pub mod stages;

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use switchboard_error::{EngineError, EngineResult};
use switchboard_types::StatusCode;

use crate::adaptor::{AuthResolver, EndpointAdaptor, InvokeResponse, ObserverResumer};
use crate::cache::ResponseCache;
use crate::chain::context::{InvocationContext, ResumePoint, StageKind};
use crate::chain::stage::{Stage, StageEntry, StageOutcome};
use crate::chain::stages::{
    AuthCheckStage, CacheReadStage, CacheWriteStage, CallbackResolveStage, InvokeStage,
    PostProcessStage,
};
use crate::event::Event;

/// Result of driving a chain until it halts
#[derive(Debug, Clone, PartialEq)]
pub enum ChainOutcome {
    /// The chain reached a terminal stage with final data
    Completed(Value),
    /// The chain suspended; the context carries the resumption pointer
    Pending { message: String },
}

/// Drives one invocation context through the ordered stage table
pub struct ChainDriver {
    /// Explicit ordered stage table, built once at construction
    stages: Vec<Arc<dyn Stage>>,
    /// Cache to release a claimed pending placeholder into on chain error
    cache: Option<Arc<ResponseCache>>,
    /// Resumer used to fail observers of a discarded placeholder
    resumer: Option<Arc<dyn ObserverResumer>>,
}

impl ChainDriver {
    /// Build the standard six-stage chain
    pub fn standard(
        adaptor: Arc<dyn EndpointAdaptor>,
        auth: Arc<dyn AuthResolver>,
        cache: Arc<ResponseCache>,
        resumer: Arc<dyn ObserverResumer>,
    ) -> Self {
        let stages: Vec<Arc<dyn Stage>> = vec![
            Arc::new(AuthCheckStage::new(auth)),
            Arc::new(CacheReadStage::new(cache.clone(), adaptor.clone())),
            Arc::new(InvokeStage::new(adaptor.clone())),
            Arc::new(PostProcessStage::new(adaptor.clone())),
            Arc::new(CacheWriteStage::new(cache.clone(), resumer.clone())),
            Arc::new(CallbackResolveStage::new(cache.clone(), adaptor, resumer.clone())),
        ];
        ChainDriver {
            stages,
            cache: Some(cache),
            resumer: Some(resumer),
        }
    }

    /// Build a driver over a custom stage table
    pub fn with_stages(stages: Vec<Arc<dyn Stage>>) -> Self {
        ChainDriver {
            stages,
            cache: None,
            resumer: None,
        }
    }

    fn index_of(&self, kind: StageKind) -> Option<usize> {
        self.stages.iter().position(|s| s.kind() == kind)
    }

    /// Drive the event's invocation context until the chain completes or
    /// suspends. Starts at the first stage, or at the persisted resumption
    /// pointer when the context carries one.
    pub async fn run(&self, event: &mut Event) -> EngineResult<ChainOutcome> {
        let mut ctx = event.context.invocation.take().ok_or_else(|| {
            EngineError::ContextError("event carries no invocation context".to_string())
        })?;

        let result = self.drive(event, &mut ctx).await;
        event.context.invocation = Some(ctx);
        result
    }

    async fn drive(
        &self,
        event: &mut Event,
        ctx: &mut InvocationContext,
    ) -> EngineResult<ChainOutcome> {
        if ctx.halted {
            // Resuming a finished chain is safe: hand back the recorded result
            return match &ctx.response {
                Some(InvokeResponse::Final(value)) => Ok(ChainOutcome::Completed(value.clone())),
                _ => Err(EngineError::ContextError(
                    "halted context without a final response".to_string(),
                )),
            };
        }

        // Re-entering a suspended chain puts the event back in progress; the
        // pending status belonged to the suspension being resolved
        if event.status.is_pending() {
            event.status = StatusCode::InProgress;
            event.message.clear();
        }

        let start = match &ctx.resume {
            Some(point) => match self.index_of(point.stage) {
                Some(idx) => idx,
                None => {
                    let err = EngineError::UnknownStage(point.stage.to_string());
                    self.release_claim(ctx, &err).await;
                    return Err(err);
                }
            },
            None => 0,
        };

        for idx in start..self.stages.len() {
            let stage = &self.stages[idx];

            let entry = match ctx.resume.take() {
                Some(point) if point.stage == stage.kind() => StageEntry {
                    sub_step: point.sub_step,
                    tag: point.tag,
                },
                other => {
                    ctx.resume = other;
                    StageEntry::start()
                }
            };

            debug!(event = %event.id, stage = %stage.kind(), sub_step = %entry.sub_step, "running stage");

            let outcome = match stage.run(event, ctx, entry).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    self.release_claim(ctx, &err).await;
                    return Err(err);
                }
            };

            match outcome {
                StageOutcome::Advance => {
                    // A pending event without a pointer is a defect, never a
                    // valid way to advance
                    if event.status.is_pending() {
                        let err = EngineError::MissingResumePoint(format!(
                            "stage {} left the event pending without suspending",
                            stage.kind()
                        ));
                        self.release_claim(ctx, &err).await;
                        return Err(err);
                    }
                }
                StageOutcome::Suspend {
                    sub_step,
                    tag,
                    message,
                } => {
                    ctx.resume = Some(ResumePoint {
                        stage: stage.kind(),
                        sub_step,
                        tag,
                    });
                    event.mark_pending(message.clone());
                    return Ok(ChainOutcome::Pending { message });
                }
                StageOutcome::Complete(value) => {
                    ctx.resume = None;
                    ctx.cache_claimed = false;
                    ctx.halted = true;
                    ctx.response = Some(InvokeResponse::Final(value.clone()));
                    event.succeed(value.clone());
                    return Ok(ChainOutcome::Completed(value));
                }
            }
        }

        Err(EngineError::Internal(
            "chain ran out of stages without a terminal outcome".to_string(),
        ))
    }

    /// Release the pending placeholder this context installed when the chain
    /// cannot resolve it: the entry is discarded so the next caller starts
    /// fresh, and observers already parked on it are failed rather than left
    /// waiting for a resolution that will never come.
    async fn release_claim(&self, ctx: &mut InvocationContext, error: &EngineError) {
        if !ctx.cache_claimed {
            return;
        }
        ctx.cache_claimed = false;

        let (Some(cache), Some(key)) = (&self.cache, &ctx.cache_key) else {
            return;
        };

        let observers = match cache.discard(key) {
            Ok(observers) => observers,
            Err(err) => {
                warn!(key = %key, %err, "failed to discard claimed cache entry");
                return;
            }
        };

        if let Some(resumer) = &self.resumer {
            for observer in &observers {
                if let Err(abort_err) = resumer.abort(observer, error).await {
                    warn!(observer = %observer, %abort_err, "failed to abort cache observer");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use switchboard_types::{EndpointName, SourceId};

    /// Scripted stage that records every entry and follows a fixed plan
    struct ScriptedStage {
        kind: StageKind,
        log: Arc<Mutex<Vec<String>>>,
        /// Suspend on first entry, complete or advance afterwards
        suspend_first: bool,
        complete_with: Option<Value>,
        mark_pending_and_advance: bool,
    }

    impl ScriptedStage {
        fn advancing(kind: StageKind, log: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(ScriptedStage {
                kind,
                log,
                suspend_first: false,
                complete_with: None,
                mark_pending_and_advance: false,
            })
        }

        fn suspending(kind: StageKind, log: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(ScriptedStage {
                kind,
                log,
                suspend_first: true,
                complete_with: None,
                mark_pending_and_advance: false,
            })
        }

        fn completing(kind: StageKind, log: Arc<Mutex<Vec<String>>>, value: Value) -> Arc<Self> {
            Arc::new(ScriptedStage {
                kind,
                log,
                suspend_first: false,
                complete_with: Some(value),
                mark_pending_and_advance: false,
            })
        }

        fn defective(kind: StageKind, log: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(ScriptedStage {
                kind,
                log,
                suspend_first: false,
                complete_with: None,
                mark_pending_and_advance: true,
            })
        }
    }

    #[async_trait]
    impl Stage for ScriptedStage {
        fn kind(&self) -> StageKind {
            self.kind
        }

        async fn run(
            &self,
            event: &mut Event,
            _ctx: &mut InvocationContext,
            entry: StageEntry,
        ) -> EngineResult<StageOutcome> {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.kind, entry.sub_step));

            if self.mark_pending_and_advance {
                // Pending without a pointer: the driver must reject this
                event.mark_pending("defective stage");
                return Ok(StageOutcome::Advance);
            }

            if self.suspend_first && entry.is_start() {
                return Ok(StageOutcome::suspend("round-2", None, "waiting"));
            }

            match &self.complete_with {
                Some(value) => Ok(StageOutcome::Complete(value.clone())),
                None => Ok(StageOutcome::Advance),
            }
        }
    }

    fn test_event() -> Event {
        let mut event = Event::new(SourceId::new("test"), "endpoint.call", "json");
        event.context.invocation = Some(InvocationContext::new(
            EndpointName::new("crm.lookup"),
            json!({}),
        ));
        event
    }

    #[tokio::test]
    async fn test_resume_skips_completed_stages() -> EngineResult<()> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let driver = ChainDriver::with_stages(vec![
            ScriptedStage::advancing(StageKind::AuthCheck, log.clone()),
            ScriptedStage::suspending(StageKind::Invoke, log.clone()),
            ScriptedStage::completing(StageKind::CallbackResolve, log.clone(), json!("done")),
        ]);

        let mut event = test_event();

        // First pass: A runs, B suspends, C has not run
        let outcome = driver.run(&mut event).await?;
        assert!(matches!(outcome, ChainOutcome::Pending { .. }));
        assert_eq!(event.status, StatusCode::Pending);
        {
            let entries = log.lock().unwrap();
            assert_eq!(*entries, vec!["auth-check:start", "invoke:start"]);
        }

        let point = event
            .context
            .invocation
            .as_ref()
            .and_then(|ctx| ctx.resume.clone())
            .expect("suspended context must carry a pointer");
        assert_eq!(point.stage, StageKind::Invoke);
        assert_eq!(point.sub_step, "round-2");

        // Resume: B re-enters at its recorded sub-step, A is not re-run
        let outcome = driver.run(&mut event).await?;
        assert_eq!(outcome, ChainOutcome::Completed(json!("done")));
        {
            let entries = log.lock().unwrap();
            assert_eq!(
                *entries,
                vec![
                    "auth-check:start",
                    "invoke:start",
                    "invoke:round-2",
                    "callback-resolve:start"
                ]
            );
        }

        assert_eq!(event.status, StatusCode::Success);
        assert_eq!(event.context.resp, Some(json!("done")));
        Ok(())
    }

    #[tokio::test]
    async fn test_pending_without_pointer_is_rejected() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let driver = ChainDriver::with_stages(vec![
            ScriptedStage::defective(StageKind::Invoke, log.clone()),
            ScriptedStage::completing(StageKind::CallbackResolve, log, json!("unreachable")),
        ]);

        let mut event = test_event();
        let result = driver.run(&mut event).await;

        assert!(matches!(result, Err(EngineError::MissingResumePoint(_))));
    }

    #[tokio::test]
    async fn test_double_resume_returns_recorded_result() -> EngineResult<()> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let driver = ChainDriver::with_stages(vec![ScriptedStage::completing(
            StageKind::CallbackResolve,
            log.clone(),
            json!(7),
        )]);

        let mut event = test_event();
        assert_eq!(driver.run(&mut event).await?, ChainOutcome::Completed(json!(7)));

        // Driving a halted context again must not re-enter any stage
        assert_eq!(driver.run(&mut event).await?, ChainOutcome::Completed(json!(7)));
        assert_eq!(log.lock().unwrap().len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_stage_pointer() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let driver = ChainDriver::with_stages(vec![ScriptedStage::advancing(
            StageKind::AuthCheck,
            log,
        )]);

        let mut event = test_event();
        if let Some(ctx) = event.context.invocation.as_mut() {
            ctx.resume = Some(ResumePoint::new(StageKind::CacheWrite));
        }

        let result = driver.run(&mut event).await;
        assert!(matches!(result, Err(EngineError::UnknownStage(_))));
    }

    #[tokio::test]
    async fn test_missing_context_is_an_error() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let driver = ChainDriver::with_stages(vec![ScriptedStage::advancing(
            StageKind::AuthCheck,
            log,
        )]);

        let mut event = Event::new(SourceId::new("test"), "endpoint.call", "json");
        let result = driver.run(&mut event).await;
        assert!(matches!(result, Err(EngineError::ContextError(_))));
    }
}
