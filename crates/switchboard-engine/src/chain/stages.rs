// The six standard stages
//
// AuthCheck -> CacheRead -> Invoke -> PostProcess -> CacheWrite ->
// CallbackResolve. Stage order is fixed by the driver and never reordered.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use switchboard_error::{CacheError, EngineError, EngineResult};

use crate::adaptor::{AuthOutcome, AuthResolver, EndpointAdaptor, InvokeResponse, ObserverResumer};
use crate::cache::{ResponseCache, WriteOutcome};
use crate::chain::context::{InvocationContext, StageKind};
use crate::chain::stage::{Stage, StageEntry, StageOutcome};
use crate::event::Event;

/// Sub-step a chain parked on an in-flight cache entry re-enters at
pub const OBSERVE_STEP: &str = "observe";
/// Sub-step a chain awaiting an asynchronous completion re-enters at
pub const AWAIT_STEP: &str = "await";

/// Validates or refreshes credentials for the target endpoint.
/// May itself suspend across multiple rounds of a token exchange.
pub struct AuthCheckStage {
    auth: Arc<dyn AuthResolver>,
}

impl AuthCheckStage {
    pub fn new(auth: Arc<dyn AuthResolver>) -> Self {
        AuthCheckStage { auth }
    }
}

#[async_trait]
impl Stage for AuthCheckStage {
    fn kind(&self) -> StageKind {
        StageKind::AuthCheck
    }

    async fn run(
        &self,
        event: &mut Event,
        ctx: &mut InvocationContext,
        entry: StageEntry,
    ) -> EngineResult<StageOutcome> {
        let outcome = if entry.is_start() {
            self.auth.check(event, &ctx.endpoint).await?
        } else {
            let payload = ctx.resolved.take();
            let payload_value = payload.as_ref().and_then(|r| r.final_value());
            self.auth
                .resume(event, &ctx.endpoint, &entry.sub_step, payload_value)
                .await?
        };

        match outcome {
            AuthOutcome::Ok => Ok(StageOutcome::Advance),
            AuthOutcome::Pending { tag } => Ok(StageOutcome::suspend(
                tag.clone(),
                Some(tag),
                "awaiting credential exchange",
            )),
            AuthOutcome::Unauthorized(reason) => Err(EngineError::Unauthorized(reason)),
        }
    }
}

/// Computes the cache policy and consults the cache.
///
/// On a really-cacheable miss this stage atomically installs a pending
/// placeholder, so exactly one concurrent caller proceeds to Invoke; every
/// later arrival observes the placeholder and suspends.
pub struct CacheReadStage {
    cache: Arc<ResponseCache>,
    adaptor: Arc<dyn EndpointAdaptor>,
}

impl CacheReadStage {
    pub fn new(cache: Arc<ResponseCache>, adaptor: Arc<dyn EndpointAdaptor>) -> Self {
        CacheReadStage { cache, adaptor }
    }
}

#[async_trait]
impl Stage for CacheReadStage {
    fn kind(&self) -> StageKind {
        StageKind::CacheRead
    }

    async fn run(
        &self,
        event: &mut Event,
        ctx: &mut InvocationContext,
        entry: StageEntry,
    ) -> EngineResult<StageOutcome> {
        if entry.is_start() {
            let policy = self.adaptor.cache_policy(&ctx.endpoint, &ctx.args).await?;
            ctx.apply_policy(&policy);
        } else if let Some(InvokeResponse::Final(value)) = ctx.resolved.take() {
            // Observer resumption: the resolved response was delivered with
            // the signal, no second cache round-trip needed.
            return Ok(StageOutcome::Complete(value));
        }

        if !ctx.really_cacheable() {
            return Ok(StageOutcome::Advance);
        }

        let key = ctx
            .cache_key
            .clone()
            .ok_or_else(|| EngineError::ContextError("cacheable call without a key".to_string()))?;

        let placeholder = InvokeResponse::Pending {
            resume_tag: None,
            message: "first invocation in flight".to_string(),
        };

        match self
            .cache
            .read_or_create(&key, placeholder, ctx.cache_lifetime())?
        {
            WriteOutcome::Created => {
                // This caller now owes the key a resolution
                ctx.cache_claimed = true;
                Ok(StageOutcome::Advance)
            }
            WriteOutcome::Existing(existing) => match existing.response {
                InvokeResponse::Final(value) => {
                    debug!(key, "cache hit");
                    Ok(StageOutcome::Complete(value))
                }
                InvokeResponse::Pending { .. } => {
                    self.cache.add_observer(&key, event.id.clone())?;
                    Ok(StageOutcome::suspend(
                        OBSERVE_STEP,
                        None,
                        "awaiting in-flight response for shared cache key",
                    ))
                }
            },
        }
    }
}

/// Calls the protocol adaptor's invoke operation
pub struct InvokeStage {
    adaptor: Arc<dyn EndpointAdaptor>,
}

impl InvokeStage {
    pub fn new(adaptor: Arc<dyn EndpointAdaptor>) -> Self {
        InvokeStage { adaptor }
    }
}

#[async_trait]
impl Stage for InvokeStage {
    fn kind(&self) -> StageKind {
        StageKind::Invoke
    }

    async fn run(
        &self,
        event: &mut Event,
        ctx: &mut InvocationContext,
        _entry: StageEntry,
    ) -> EngineResult<StageOutcome> {
        let response = self.adaptor.invoke(&ctx.endpoint, &ctx.args, event).await?;

        if let InvokeResponse::Pending {
            resume_tag: None, ..
        } = &response
        {
            // A pending result must always carry a way back in
            return Err(EngineError::MissingResumePoint(format!(
                "adaptor returned a pending response without a resume tag for {}",
                ctx.endpoint
            )));
        }

        ctx.response = Some(response);
        Ok(StageOutcome::Advance)
    }
}

/// Shapes a final raw response into the endpoint's declared schema.
/// A still-pending response passes through untouched.
pub struct PostProcessStage {
    adaptor: Arc<dyn EndpointAdaptor>,
}

impl PostProcessStage {
    pub fn new(adaptor: Arc<dyn EndpointAdaptor>) -> Self {
        PostProcessStage { adaptor }
    }
}

#[async_trait]
impl Stage for PostProcessStage {
    fn kind(&self) -> StageKind {
        StageKind::PostProcess
    }

    async fn run(
        &self,
        event: &mut Event,
        ctx: &mut InvocationContext,
        _entry: StageEntry,
    ) -> EngineResult<StageOutcome> {
        if let Some(InvokeResponse::Final(raw)) = &ctx.response {
            let shaped = self.adaptor.postprocess(raw, event, &ctx.endpoint).await?;
            ctx.response = Some(InvokeResponse::Final(shaped));
        }
        Ok(StageOutcome::Advance)
    }
}

/// Persists the final or still-pending response under the computed cache key.
///
/// When a final response lands while observers are already parked on the
/// placeholder (they arrived during a synchronous invoke), they are notified
/// here rather than waiting for a callback that will never come.
pub struct CacheWriteStage {
    cache: Arc<ResponseCache>,
    resumer: Arc<dyn ObserverResumer>,
}

impl CacheWriteStage {
    pub fn new(cache: Arc<ResponseCache>, resumer: Arc<dyn ObserverResumer>) -> Self {
        CacheWriteStage { cache, resumer }
    }
}

#[async_trait]
impl Stage for CacheWriteStage {
    fn kind(&self) -> StageKind {
        StageKind::CacheWrite
    }

    async fn run(
        &self,
        _event: &mut Event,
        ctx: &mut InvocationContext,
        _entry: StageEntry,
    ) -> EngineResult<StageOutcome> {
        if !ctx.really_cacheable() {
            return Ok(StageOutcome::Advance);
        }

        let key = ctx
            .cache_key
            .clone()
            .ok_or_else(|| EngineError::ContextError("cacheable call without a key".to_string()))?;
        let response = ctx
            .response
            .clone()
            .ok_or_else(|| EngineError::ContextError("no response to cache".to_string()))?;

        match self.cache.update(&key, response.clone()) {
            Ok(entry) => {
                if let InvokeResponse::Final(value) = &response {
                    if !entry.observer_ids.is_empty() {
                        self.cache
                            .notify_observers(&key, value, self.resumer.as_ref())
                            .await?;
                    }
                }
            }
            Err(CacheError::NotFound(_)) => {
                // The placeholder expired mid-invoke; start a fresh row
                self.cache.write(&key, response, ctx.cache_lifetime())?;
                ctx.cache_claimed = true;
            }
            Err(err) => return Err(err.into()),
        }

        Ok(StageOutcome::Advance)
    }
}

/// Terminal stage: completes a synchronous call, parks an asynchronous one,
/// and on re-entry resolves it, updating the cache entry and fanning the
/// result out to every observer.
pub struct CallbackResolveStage {
    cache: Arc<ResponseCache>,
    adaptor: Arc<dyn EndpointAdaptor>,
    resumer: Arc<dyn ObserverResumer>,
}

impl CallbackResolveStage {
    pub fn new(
        cache: Arc<ResponseCache>,
        adaptor: Arc<dyn EndpointAdaptor>,
        resumer: Arc<dyn ObserverResumer>,
    ) -> Self {
        CallbackResolveStage {
            cache,
            adaptor,
            resumer,
        }
    }
}

#[async_trait]
impl Stage for CallbackResolveStage {
    fn kind(&self) -> StageKind {
        StageKind::CallbackResolve
    }

    async fn run(
        &self,
        event: &mut Event,
        ctx: &mut InvocationContext,
        entry: StageEntry,
    ) -> EngineResult<StageOutcome> {
        if entry.is_start() {
            return match &ctx.response {
                Some(InvokeResponse::Final(value)) => Ok(StageOutcome::Complete(value.clone())),
                Some(InvokeResponse::Pending {
                    resume_tag,
                    message,
                }) => Ok(StageOutcome::suspend(
                    AWAIT_STEP,
                    resume_tag.clone(),
                    message.clone(),
                )),
                None => Err(EngineError::ContextError(
                    "no response produced by the invoke stage".to_string(),
                )),
            };
        }

        // Re-entry: an external completion arrived for this invocation
        let resolved = ctx.resolved.take().ok_or_else(|| {
            EngineError::ContextError("callback re-entry without a resolution".to_string())
        })?;

        let raw = match resolved {
            InvokeResponse::Pending { message, .. } => {
                // A pending callback is a logic error, not a valid resolution
                return Err(EngineError::CallbackStillPending(message));
            }
            InvokeResponse::Final(raw) => raw,
        };

        let shaped = self.adaptor.postprocess(&raw, event, &ctx.endpoint).await?;
        ctx.response = Some(InvokeResponse::Final(shaped.clone()));

        if ctx.really_cacheable() {
            let key = ctx.cache_key.clone().ok_or_else(|| {
                EngineError::ContextError("cacheable call without a key".to_string())
            })?;

            match self
                .cache
                .update(&key, InvokeResponse::Final(shaped.clone()))
            {
                Ok(_) => {
                    self.cache
                        .notify_observers(&key, &shaped, self.resumer.as_ref())
                        .await?;
                }
                // The entry was expired by an operator-level cleanup; the
                // resolution still reaches this caller
                Err(CacheError::NotFound(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }

        Ok(StageOutcome::Complete(shaped))
    }
}
