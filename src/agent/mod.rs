//! Agent lifecycle: the stage reducer and the state manager around it.

mod stage;
mod state;

pub use stage::{AgentContext, Stage, StageEvent, ToolResultRecord, reduce};
pub use state::{
    DEFAULT_HISTORY_CAP, DEFAULT_MAX_ITERATIONS, StateChange, StateManager, SubscriptionId,
};
