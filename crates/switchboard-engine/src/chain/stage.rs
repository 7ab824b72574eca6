// Stage interface
//
// A stage decides to advance, suspend, or short-circuit the whole chain with
// final data. Errors propagate; a stage never swallows them.

use async_trait::async_trait;
use serde_json::Value;

use switchboard_error::EngineResult;

use crate::chain::context::{InvocationContext, StageKind, START_STEP};
use crate::event::Event;

/// How a stage is being entered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageEntry {
    /// Sub-step to run; "start" on first entry, a stage-local step on resume
    pub sub_step: String,
    /// Stage-private continuation tag persisted at suspension
    pub tag: Option<String>,
}

impl StageEntry {
    /// Entry at the beginning of a stage
    pub fn start() -> Self {
        StageEntry {
            sub_step: START_STEP.to_string(),
            tag: None,
        }
    }

    pub fn is_start(&self) -> bool {
        self.sub_step == START_STEP
    }
}

/// What a stage run decided
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    /// Move to the next stage
    Advance,
    /// Halt the chain; re-enter this stage at `sub_step` on the next signal
    Suspend {
        sub_step: String,
        tag: Option<String>,
        message: String,
    },
    /// Stop the whole chain immediately with final data
    Complete(Value),
}

impl StageOutcome {
    pub fn suspend(
        sub_step: impl Into<String>,
        tag: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        StageOutcome::Suspend {
            sub_step: sub_step.into(),
            tag,
            message: message.into(),
        }
    }
}

/// One stage of the invocation chain
#[async_trait]
pub trait Stage: Send + Sync {
    /// Which stage this is, for resumption pointers
    fn kind(&self) -> StageKind;

    /// Run the stage (or one of its sub-steps) against the context
    async fn run(
        &self,
        event: &mut Event,
        ctx: &mut InvocationContext,
        entry: StageEntry,
    ) -> EngineResult<StageOutcome>;
}
