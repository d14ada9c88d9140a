//! Per-call execution context handed to executors.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::mode::WorkMode;
use crate::security::{ConfirmationGate, ConfirmationPrompt};

/// Receives incremental output while a tool runs.
pub type StreamCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Notified for every file a tool creates or overwrites.
pub type ArtifactCallback = Arc<dyn Fn(&Path) + Send + Sync>;

/// Everything an executor may use during one call.
#[derive(Clone)]
pub struct ExecutionContext {
    tool_name: String,
    mode: WorkMode,
    working_dir: PathBuf,
    gate: Option<Arc<ConfirmationGate>>,
    on_artifact: Option<ArtifactCallback>,
    on_stream: Option<StreamCallback>,
    cancel: CancellationToken,
}

impl ExecutionContext {
    /// A context with no confirmation gate: every confirmation is denied.
    pub fn new(tool_name: impl Into<String>, mode: WorkMode) -> Self {
        Self {
            tool_name: tool_name.into(),
            mode,
            working_dir: std::env::current_dir().unwrap_or_default(),
            gate: None,
            on_artifact: None,
            on_stream: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Without a gate every confirmation is denied.
    pub fn with_gate(mut self, gate: Arc<ConfirmationGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn with_artifacts(mut self, callback: Option<ArtifactCallback>) -> Self {
        self.on_artifact = callback;
        self
    }

    pub fn with_stream(mut self, callback: Option<StreamCallback>) -> Self {
        self.on_stream = callback;
        self
    }

    /// Abort signal shared with the orchestrator.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    pub fn mode(&self) -> WorkMode {
        self.mode
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Absolute paths are kept; relative ones resolve against the working dir.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_dir.join(path)
        }
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Ask the user to approve an action on `path` (`*` when there is none).
    pub async fn request_confirmation(
        &self,
        description: impl Into<String>,
        args: Value,
        path: impl Into<String>,
    ) -> bool {
        let Some(gate) = &self.gate else {
            tracing::debug!(tool = %self.tool_name, "no confirmation gate; denying");
            return false;
        };
        let prompt = ConfirmationPrompt::new(&self.tool_name, description, args, path);
        tokio::select! {
            approved = gate.request(prompt) => approved,
            _ = self.cancel.cancelled() => false,
        }
    }

    /// Report a file the tool produced.
    pub fn artifact_created(&self, path: &Path) {
        if let Some(callback) = &self.on_artifact {
            callback(path);
        }
    }

    /// Forward partial output, if anyone listens.
    pub fn stream(&self, chunk: &str) {
        if let Some(callback) = &self.on_stream {
            callback(chunk);
        }
    }

    pub fn stream_callback(&self) -> Option<&StreamCallback> {
        self.on_stream.as_ref()
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("tool_name", &self.tool_name)
            .field("mode", &self.mode)
            .field("working_dir", &self.working_dir)
            .field("has_gate", &self.gate.is_some())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_without_gate_denies() {
        let ctx = ExecutionContext::new("write_file", WorkMode::Code);
        assert!(
            !ctx.request_confirmation("Write", serde_json::json!({}), "/a")
                .await
        );
    }

    #[test]
    fn test_callbacks() {
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let artifacts = seen.clone();
        let chunks = seen.clone();

        let ctx = ExecutionContext::new("write_file", WorkMode::Code)
            .with_artifacts(Some(Arc::new(move |p: &Path| {
                artifacts.lock().unwrap().push(p.display().to_string())
            })))
            .with_stream(Some(Arc::new(move |c: &str| {
                chunks.lock().unwrap().push(c.to_string())
            })));

        ctx.artifact_created(Path::new("/tmp/out.txt"));
        ctx.stream("line");
        assert_eq!(*seen.lock().unwrap(), vec!["/tmp/out.txt", "line"]);
    }

    #[test]
    fn test_resolve() {
        let ctx = ExecutionContext::new("write_file", WorkMode::Code).with_working_dir("/proj");
        assert_eq!(ctx.resolve("src/a.rs"), PathBuf::from("/proj/src/a.rs"));
        assert_eq!(ctx.resolve("/etc/hosts"), PathBuf::from("/etc/hosts"));
    }
}
