//! State manager wrapping the stage reducer.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use super::stage::{AgentContext, Stage, StageEvent, reduce};
use crate::config::CoreConfig;
use crate::security::{Clock, SystemClock};
use crate::types::Message;

pub const DEFAULT_MAX_ITERATIONS: u32 = 30;
pub const DEFAULT_HISTORY_CAP: usize = 200;

/// Notification delivered to subscribers after every applied event.
#[derive(Debug, Clone)]
pub struct StateChange {
    /// `None` when the change came from [`StateManager::reset`].
    pub event: Option<StageEvent>,
    pub previous_stage: Stage,
    pub context: AgentContext,
}

/// Handle returned by [`StateManager::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber = Arc<dyn Fn(&StateChange) + Send + Sync>;
type StageCallback = Arc<dyn Fn(Stage, Stage) + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(&str, Option<u16>) + Send + Sync>;

/// Thread-safe owner of the [`AgentContext`].
///
/// Every change goes through [`reduce`] except history updates.
pub struct StateManager {
    context: RwLock<AgentContext>,
    subscribers: RwLock<Vec<(SubscriptionId, Subscriber)>>,
    stage_callbacks: RwLock<Vec<StageCallback>>,
    error_callbacks: RwLock<Vec<ErrorCallback>>,
    history_cap: usize,
    max_iterations: u32,
    clock: Arc<dyn Clock>,
    next_id: AtomicU64,
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl StateManager {
    /// Manager with the default history cap and iteration limit.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Manager using the configured history cap and iteration limit.
    pub fn from_config(config: &CoreConfig) -> Self {
        Self::new()
            .history_cap(config.history_cap)
            .max_iterations(config.max_iterations)
    }

    /// Timestamps come from `clock` instead of the system time.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            context: RwLock::new(AgentContext::default()),
            subscribers: RwLock::new(Vec::new()),
            stage_callbacks: RwLock::new(Vec::new()),
            error_callbacks: RwLock::new(Vec::new()),
            history_cap: DEFAULT_HISTORY_CAP,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            clock,
            next_id: AtomicU64::new(1),
        }
    }

    /// Keep at most `cap` messages in [`history`](Self::history).
    pub fn history_cap(mut self, cap: usize) -> Self {
        self.history_cap = cap.max(1);
        self
    }

    /// Limit used by [`within_limit`](Self::within_limit).
    pub fn max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    /// Snapshot of the current context.
    pub fn context(&self) -> AgentContext {
        self.context
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn stage(&self) -> Stage {
        self.context
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .stage
    }

    /// Iterations started in the current run.
    pub fn iteration(&self) -> u32 {
        self.context
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iteration
    }

    pub fn is_processing(&self) -> bool {
        self.context
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_processing
    }

    pub fn can_execute_tools(&self) -> bool {
        self.stage().can_execute_tools()
    }

    /// Guard against runaway tool loops: false once in the error stage or
    /// when `max_iterations` iterations have started in this run.
    pub fn should_continue(&self, max_iterations: u32) -> bool {
        let ctx = self.context.read().unwrap_or_else(PoisonError::into_inner);
        !ctx.stage.is_error() && ctx.iteration < max_iterations
    }

    /// [`should_continue`](Self::should_continue) with the configured limit.
    pub fn within_limit(&self) -> bool {
        self.should_continue(self.max_iterations)
    }

    /// Receive a [`StateChange`] after every applied event and reset.
    pub fn subscribe<F>(&self, subscriber: F) -> SubscriptionId
    where
        F: Fn(&StateChange) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(subscriber)));
        id
    }

    /// Returns whether the subscription existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    /// Called with `(from, to)` only when the stage actually changes.
    pub fn on_stage_change<F>(&self, callback: F)
    where
        F: Fn(Stage, Stage) + Send + Sync + 'static,
    {
        self.stage_callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(callback));
    }

    /// Called when a new error message is recorded.
    pub fn on_error<F>(&self, callback: F)
    where
        F: Fn(&str, Option<u16>) + Send + Sync + 'static,
    {
        self.error_callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(callback));
    }

    /// Apply `event` through the reducer and notify listeners.
    pub fn send(&self, event: StageEvent) -> AgentContext {
        let now = self.clock.now();
        let (previous, next) = {
            let mut ctx = self.context.write().unwrap_or_else(PoisonError::into_inner);
            let previous = ctx.clone();
            let next = reduce(&previous, &event, now);
            *ctx = next.clone();
            (previous, next)
        };

        tracing::trace!(
            from = %previous.stage,
            to = %next.stage,
            iteration = next.iteration,
            "stage event applied"
        );

        self.notify(Some(event), &previous, &next);
        next
    }

    /// Begin an iteration: THINKING, `iteration + 1`.
    pub fn start_processing(&self) -> AgentContext {
        self.send(StageEvent::StartProcessing)
    }

    /// The model asked for `name`; `id` keys the result that follows.
    pub fn tool_call(&self, name: impl Into<String>, id: impl Into<String>) -> AgentContext {
        self.send(StageEvent::ToolCall {
            name: name.into(),
            id: id.into(),
        })
    }

    /// Record the current tool's result and move to EXECUTING.
    pub fn tool_complete(&self, result: impl Into<String>) -> AgentContext {
        self.send(StageEvent::ToolComplete {
            result: result.into(),
        })
    }

    /// Record a failed tool without leaving the loop.
    pub fn tool_error(&self, message: impl Into<String>) -> AgentContext {
        self.send(StageEvent::ToolError {
            message: message.into(),
        })
    }

    /// The assistant message finished; pending results are cleared.
    pub fn message_complete(&self, content: impl Into<String>) -> AgentContext {
        self.send(StageEvent::MessageComplete {
            content: content.into(),
        })
    }

    /// Enter the error stage with an optional HTTP-like status.
    pub fn error(&self, message: impl Into<String>, status: Option<u16>) -> AgentContext {
        self.send(StageEvent::Error {
            message: message.into(),
            status,
        })
    }

    /// Leave the error stage and try again.
    pub fn retry(&self) -> AgentContext {
        self.send(StageEvent::Retry)
    }

    /// End the run and return to IDLE.
    pub fn complete(&self) -> AgentContext {
        self.send(StageEvent::Complete)
    }

    /// Return to the initial context (session reset).
    pub fn reset(&self) {
        let (previous, next) = {
            let mut ctx = self.context.write().unwrap_or_else(PoisonError::into_inner);
            let previous = std::mem::take(&mut *ctx);
            (previous, ctx.clone())
        };
        self.notify(None, &previous, &next);
    }

    /// Replace the conversation history without going through the reducer.
    ///
    /// No notification is emitted, so subscribers may briefly observe a
    /// history that lags this call. Only the most recent `history_cap`
    /// messages are kept; `history_size` records the full length.
    pub fn update_history(&self, messages: Vec<Message>) {
        let size = messages.len();
        let start = size.saturating_sub(self.history_cap);
        let kept: Arc<[Message]> = messages.into_iter().skip(start).collect();

        let mut ctx = self.context.write().unwrap_or_else(PoisonError::into_inner);
        ctx.history = kept;
        ctx.history_size = size;
    }

    /// The capped history.
    pub fn history(&self) -> Arc<[Message]> {
        self.context
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .history
            .clone()
    }

    /// Length of the last history passed in, before capping.
    pub fn history_size(&self) -> usize {
        self.context
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .history_size
    }

    fn notify(&self, event: Option<StageEvent>, previous: &AgentContext, next: &AgentContext) {
        let subscribers: Vec<Subscriber> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, s)| s.clone())
            .collect();

        if !subscribers.is_empty() {
            let change = StateChange {
                event,
                previous_stage: previous.stage,
                context: next.clone(),
            };
            for subscriber in subscribers {
                deliver("state subscriber", || subscriber(&change));
            }
        }

        if previous.stage != next.stage {
            let callbacks = self
                .stage_callbacks
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            for callback in callbacks {
                deliver("stage callback", || callback(previous.stage, next.stage));
            }
        }

        if previous.error != next.error
            && let Some(ref message) = next.error
        {
            let callbacks = self
                .error_callbacks
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            for callback in callbacks {
                deliver("error callback", || callback(message, next.error_status));
            }
        }
    }
}

/// Run a listener, containing any panic so remaining listeners still run.
fn deliver(kind: &str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::warn!(listener = kind, "Listener panicked; continuing delivery");
    }
}
