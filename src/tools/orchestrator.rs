//! Resolves, gates and runs tool calls coming from the model.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use futures::FutureExt;
use futures::future::join_all;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::ask_user::{ASK_USER_TOOL, AskUserHandler, AskUserInput, ask_user_definition};
use super::context::{ArtifactCallback, ExecutionContext, StreamCallback};
use super::mode::WorkMode;
use super::registry::ToolRegistry;
use super::source::{DynamicSource, ToolSource};
use super::traits::Tool;
use crate::config::CoreConfig;
use crate::permissions::{WILDCARD, is_path_sensitive};
use crate::security::{ConfirmationGate, SweeperHandle};
use crate::skills::SkillToolSource;
use crate::types::{ToolDefinition, ToolError, ToolResult, ToolResultBlock, ToolUseBlock};

/// Resolves tool calls from the model, applies the work mode and runs them.
pub struct ToolOrchestrator {
    registry: ToolRegistry,
    sources: Vec<DynamicSource>,
    ask_user: Option<Arc<dyn AskUserHandler>>,
    gate: Arc<ConfirmationGate>,
    mode: RwLock<WorkMode>,
    on_artifact: Option<ArtifactCallback>,
    working_dir: PathBuf,
    calls: Mutex<CancellationToken>,
    sweeper: Mutex<Option<SweeperHandle>>,
}

impl ToolOrchestrator {
    /// Start building with the gate every sensitive tool asks through.
    pub fn builder(gate: Arc<ConfirmationGate>) -> ToolOrchestratorBuilder {
        ToolOrchestratorBuilder::new(gate)
    }

    pub fn mode(&self) -> WorkMode {
        *self.mode.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes effect on the next call; calls in flight keep their mode.
    pub fn set_mode(&self, mode: WorkMode) {
        let previous = std::mem::replace(
            &mut *self.mode.write().unwrap_or_else(PoisonError::into_inner),
            mode,
        );
        if previous != mode {
            tracing::debug!(from = %previous, to = %mode, "work mode changed");
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn gate(&self) -> &Arc<ConfirmationGate> {
        &self.gate
    }

    /// Start background housekeeping (the confirmation sweeper).
    pub fn start(&self, config: &CoreConfig) {
        let mut sweeper = self.sweeper.lock().unwrap_or_else(PoisonError::into_inner);
        if sweeper.is_none() {
            *sweeper = Some(
                self.gate
                    .security()
                    .spawn_sweeper(config.sweep_interval()),
            );
        }
    }

    /// Stop housekeeping and abort every in-flight call.
    pub fn shutdown(&self) {
        if let Some(sweeper) = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            sweeper.stop();
        }
        let previous = std::mem::replace(
            &mut *self.calls.lock().unwrap_or_else(PoisonError::into_inner),
            CancellationToken::new(),
        );
        previous.cancel();
    }

    /// Whether [`start`](Self::start) ran without a later shutdown.
    pub fn is_running(&self) -> bool {
        self.sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Forget loaded dynamic definitions; they load again on next use.
    pub fn reload_sources(&self) {
        for source in &self.sources {
            source.reset();
        }
    }

    /// Tool schemas visible to the model in `mode`.
    ///
    /// Chat exposes only `ask_user`. Other modes add every static executor
    /// allowed in the mode and every dynamic source's tools, loading sources
    /// on first use.
    pub async fn get_tools(&self, mode: WorkMode) -> Vec<ToolDefinition> {
        let mut tools = vec![ask_user_definition()];
        if mode.is_chat() {
            return tools;
        }

        tools.extend(self.registry.definitions_for(mode));

        let visible: Vec<_> = self
            .sources
            .iter()
            .filter(|s| s.source().modes().contains(&mode))
            .collect();
        let loaded = join_all(visible.iter().map(|s| s.definitions())).await;

        let mut seen: HashSet<String> = tools.iter().map(|t| t.name.clone()).collect();
        for definitions in loaded {
            for definition in definitions.iter() {
                if seen.insert(definition.name.clone()) {
                    tools.push(definition.clone());
                } else {
                    tracing::debug!(tool = %definition.name, "duplicate dynamic tool ignored");
                }
            }
        }
        tools
    }

    /// Run one tool call, keeping the failure kind.
    pub async fn dispatch(
        &self,
        name: &str,
        input: Value,
        stream: Option<StreamCallback>,
    ) -> Result<String, ToolError> {
        let cancel = self
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .child_token();
        self.dispatch_with(name, input, stream, cancel).await
    }

    /// [`dispatch`](Self::dispatch) with a caller-supplied abort signal.
    pub async fn dispatch_with(
        &self,
        name: &str,
        input: Value,
        stream: Option<StreamCallback>,
        cancel: CancellationToken,
    ) -> Result<String, ToolError> {
        let mode = self.mode();
        tracing::debug!(tool = %name, "dispatching tool call");

        if name == ASK_USER_TOOL {
            return self.ask_user(input).await;
        }

        if let Some(tool) = self.registry.get(name) {
            if !tool.allowed_in(mode) {
                return Err(ToolError::mode_denied(name, mode));
            }
            tool.validate(&input)
                .map_err(|message| ToolError::validation(name, message))?;

            let context = self.context(name, mode, stream, cancel);
            return guarded(name, tool.execute(input, &context)).await;
        }

        let Some(source) = self
            .sources
            .iter()
            .map(DynamicSource::source)
            .find(|s| s.claims(name))
        else {
            return Err(ToolError::unknown_tool(name));
        };
        if !source.modes().contains(&mode) {
            return Err(ToolError::mode_denied(name, mode));
        }

        let context = self.context(name, mode, stream, cancel);
        if is_path_sensitive(name) && !confirm_dynamic(name, &input, &context).await {
            return Ok(format!("User denied permission to run {}", name));
        }
        guarded(name, source.call(name, input, &context)).await
    }

    /// Run one tool call and flatten every outcome to the text the model sees.
    pub async fn execute_tool(
        &self,
        name: &str,
        input: Value,
        stream: Option<StreamCallback>,
    ) -> String {
        let span = crate::observability::tool_span(name, self.mode());
        match self.dispatch(name, input, stream).instrument(span).await {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!(tool = %name, error = %e, "tool call failed");
                e.to_model_text()
            }
        }
    }

    /// Answer every tool call of an assistant turn, in order.
    pub async fn answer_all(
        &self,
        calls: impl IntoIterator<Item = &ToolUseBlock>,
        stream: Option<StreamCallback>,
    ) -> Vec<ToolResultBlock> {
        let mut results = Vec::new();
        for call in calls {
            let span = crate::observability::tool_span(&call.name, self.mode());
            let outcome = self
                .dispatch(&call.name, call.input.clone(), stream.clone())
                .instrument(span)
                .await;
            results.push(ToolResultBlock::from_dispatch(&call.id, outcome));
        }
        results
    }

    async fn ask_user(&self, input: Value) -> Result<String, ToolError> {
        let input: AskUserInput = serde_json::from_value(input)
            .map_err(|e| ToolError::validation(ASK_USER_TOOL, format!("Invalid input: {}", e)))?;
        let Some(handler) = &self.ask_user else {
            return Err(ToolError::execution(
                ASK_USER_TOOL,
                "no user interaction handler is available",
            ));
        };
        guarded(
            ASK_USER_TOOL,
            handler.ask(input).map(|answer| answer.map(ToolResult::success)),
        )
        .await
    }

    fn context(
        &self,
        name: &str,
        mode: WorkMode,
        stream: Option<StreamCallback>,
        cancel: CancellationToken,
    ) -> ExecutionContext {
        ExecutionContext::new(name, mode)
            .with_working_dir(&self.working_dir)
            .with_gate(self.gate.clone())
            .with_artifacts(self.on_artifact.clone())
            .with_stream(stream)
            .with_cancellation(cancel)
    }
}

/// Await an executor, turning `Err` and panics into `ToolError::Execution`.
/// Dynamic tools carry no executor-side prompt, so sensitive ones are asked
/// about here. The target is the `path` argument, else the wildcard.
async fn confirm_dynamic(name: &str, input: &Value, context: &ExecutionContext) -> bool {
    let path = input
        .get("path")
        .and_then(Value::as_str)
        .unwrap_or(WILDCARD);
    context
        .request_confirmation(format!("Run {} on {}", name, path), input.clone(), path)
        .await
}

async fn guarded<F>(name: &str, call: F) -> Result<String, ToolError>
where
    F: std::future::Future<Output = crate::Result<ToolResult>>,
{
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(Ok(result)) => Ok(result.text()),
        Ok(Err(crate::Error::Tool(ToolError::Validation { message, .. }))) => {
            Err(ToolError::validation(name, message))
        }
        Ok(Err(e)) => Err(ToolError::execution(name, e.to_string())),
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            tracing::warn!(tool = %name, panic = %message, "tool executor panicked");
            Err(ToolError::execution(name, message))
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "executor panicked".to_string())
}

impl std::fmt::Debug for ToolOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolOrchestrator")
            .field("mode", &self.mode())
            .field("registry", &self.registry)
            .field("sources", &self.sources)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

pub struct ToolOrchestratorBuilder {
    gate: Arc<ConfirmationGate>,
    registry: ToolRegistry,
    sources: Vec<Arc<dyn ToolSource>>,
    ask_user: Option<Arc<dyn AskUserHandler>>,
    mode: WorkMode,
    on_artifact: Option<ArtifactCallback>,
    working_dir: Option<PathBuf>,
}

impl ToolOrchestratorBuilder {
    pub fn new(gate: Arc<ConfirmationGate>) -> Self {
        Self {
            gate,
            registry: ToolRegistry::new(),
            sources: Vec::new(),
            ask_user: None,
            mode: WorkMode::default(),
            on_artifact: None,
            working_dir: None,
        }
    }

    /// Register `run_command` and `write_file`, a skill source over
    /// `config.skill_dirs`, and take the working directory from `config`.
    pub fn builtin_tools(mut self, config: &CoreConfig) -> Self {
        self.registry.merge(ToolRegistry::builtin(config));
        if !config.skill_dirs.is_empty() {
            self.sources
                .push(Arc::new(SkillToolSource::new(config.skill_dirs.clone())));
        }
        if self.working_dir.is_none() {
            self.working_dir = config.working_dir.clone();
        }
        self
    }

    /// Register a static executor.
    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.registry.register(tool);
        self
    }

    /// Add a dynamic source; earlier sources win on name clashes.
    pub fn source(mut self, source: Arc<dyn ToolSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn ask_user(mut self, handler: Arc<dyn AskUserHandler>) -> Self {
        self.ask_user = Some(handler);
        self
    }

    /// Initial work mode.
    pub fn mode(mut self, mode: WorkMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn on_artifact(mut self, callback: impl Fn(&Path) + Send + Sync + 'static) -> Self {
        self.on_artifact = Some(Arc::new(callback));
        self
    }

    /// Base for relative paths. Defaults to the current directory.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn build(self) -> ToolOrchestrator {
        ToolOrchestrator {
            registry: self.registry,
            sources: self.sources.into_iter().map(DynamicSource::new).collect(),
            ask_user: self.ask_user,
            gate: self.gate,
            mode: RwLock::new(self.mode),
            on_artifact: self.on_artifact,
            working_dir: self
                .working_dir
                .unwrap_or_else(|| std::env::current_dir().unwrap_or_default()),
            calls: Mutex::new(CancellationToken::new()),
            sweeper: Mutex::new(None),
        }
    }
}
