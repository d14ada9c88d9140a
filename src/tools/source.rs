//! Dynamically discovered tools (skills, MCP servers) and their load state.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use super::context::ExecutionContext;
use super::mode::WorkMode;
use super::traits::DEFAULT_MODES;
use crate::types::{ToolDefinition, ToolResult};

/// A family of tools discovered at runtime.
#[async_trait]
pub trait ToolSource: Send + Sync {
    fn name(&self) -> &str;

    /// Whether `tool_name` belongs to this source, decided by name pattern
    /// alone so calls resolve even before the source has been listed.
    fn claims(&self, tool_name: &str) -> bool;

    fn modes(&self) -> &[WorkMode] {
        DEFAULT_MODES
    }

    async fn load(&self) -> crate::Result<Vec<ToolDefinition>>;

    async fn call(
        &self,
        tool_name: &str,
        input: serde_json::Value,
        context: &ExecutionContext,
    ) -> crate::Result<ToolResult>;
}

/// Loading progress of a dynamic source.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadState {
    NotLoaded,
    Loading,
    Ready(Arc<[ToolDefinition]>),
}

/// A [`ToolSource`] plus its lazily computed definitions.
///
/// The first caller to find the source `NotLoaded` performs the load; callers
/// arriving while it is `Loading` wait for that same load. A failed (or
/// abandoned) load returns to `NotLoaded` and the waiting callers see no tools.
pub struct DynamicSource {
    source: Arc<dyn ToolSource>,
    state: watch::Sender<LoadState>,
}

impl DynamicSource {
    pub fn new(source: Arc<dyn ToolSource>) -> Self {
        let (state, _) = watch::channel(LoadState::NotLoaded);
        Self { source, state }
    }

    pub fn source(&self) -> &Arc<dyn ToolSource> {
        &self.source
    }

    pub fn state(&self) -> LoadState {
        self.state.borrow().clone()
    }

    /// Forget loaded definitions; the next call loads again.
    pub fn reset(&self) {
        self.state.send_replace(LoadState::NotLoaded);
    }

    /// Load once and cache. A failed load yields no tools and is retried on next use.
    pub async fn definitions(&self) -> Arc<[ToolDefinition]> {
        let mut rx = self.state.subscribe();

        let mut claimed = false;
        self.state.send_if_modified(|state| {
            if matches!(state, LoadState::NotLoaded) {
                *state = LoadState::Loading;
                claimed = true;
                return true;
            }
            false
        });
        if claimed {
            return self.run_load().await;
        }

        loop {
            let current = rx.borrow_and_update().clone();
            match current {
                LoadState::Ready(definitions) => return definitions,
                LoadState::NotLoaded => return empty(),
                LoadState::Loading => {
                    if rx.changed().await.is_err() {
                        return empty();
                    }
                }
            }
        }
    }

    async fn run_load(&self) -> Arc<[ToolDefinition]> {
        let mut guard = LoadGuard {
            state: &self.state,
            armed: true,
        };

        let loaded = match self.source.load().await {
            Ok(definitions) => {
                tracing::debug!(source = %self.source.name(), count = definitions.len(), "tool source loaded");
                let definitions: Arc<[ToolDefinition]> = definitions.into();
                self.state.send_replace(LoadState::Ready(definitions.clone()));
                definitions
            }
            Err(e) => {
                tracing::warn!(source = %self.source.name(), error = %e, "tool source failed to load");
                self.state.send_replace(LoadState::NotLoaded);
                empty()
            }
        };
        guard.armed = false;
        loaded
    }
}

fn empty() -> Arc<[ToolDefinition]> {
    Arc::from(Vec::new())
}

/// Resets a `Loading` state if the loading future is dropped midway.
struct LoadGuard<'a> {
    state: &'a watch::Sender<LoadState>,
    armed: bool,
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state.send_if_modified(|state| {
                if matches!(state, LoadState::Loading) {
                    *state = LoadState::NotLoaded;
                    return true;
                }
                false
            });
        }
    }
}

impl std::fmt::Debug for DynamicSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &*self.state.borrow() {
            LoadState::NotLoaded => "not_loaded".to_string(),
            LoadState::Loading => "loading".to_string(),
            LoadState::Ready(defs) => format!("ready({})", defs.len()),
        };
        f.debug_struct("DynamicSource")
            .field("source", &self.source.name())
            .field("state", &state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingSource {
        loads: AtomicUsize,
        fail_first: bool,
    }

    #[async_trait]
    impl ToolSource for CountingSource {
        fn name(&self) -> &str {
            "counting"
        }

        fn claims(&self, tool_name: &str) -> bool {
            tool_name.starts_with("count__")
        }

        async fn load(&self) -> crate::Result<Vec<ToolDefinition>> {
            let n = self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail_first && n == 0 {
                return Err(crate::Error::Skill("disk unavailable".into()));
            }
            Ok(vec![ToolDefinition::object(
                "count__one",
                "one",
                serde_json::json!({}),
                &[],
            )])
        }

        async fn call(
            &self,
            _tool_name: &str,
            _input: serde_json::Value,
            _context: &ExecutionContext,
        ) -> crate::Result<ToolResult> {
            Ok(ToolResult::empty())
        }
    }

    fn source(fail_first: bool) -> (Arc<CountingSource>, DynamicSource) {
        let inner = Arc::new(CountingSource {
            loads: AtomicUsize::new(0),
            fail_first,
        });
        let dynamic = DynamicSource::new(inner.clone());
        (inner, dynamic)
    }

    #[tokio::test]
    async fn test_concurrent_first_calls_load_once() {
        let (inner, dynamic) = source(false);
        let (a, b, c) = tokio::join!(
            dynamic.definitions(),
            dynamic.definitions(),
            dynamic.definitions()
        );
        assert_eq!(inner.loads.load(Ordering::SeqCst), 1);
        assert_eq!(a.len(), 1);
        assert_eq!(a, b);
        assert_eq!(b, c);

        dynamic.definitions().await;
        assert_eq!(inner.loads.load(Ordering::SeqCst), 1);
        assert!(matches!(dynamic.state(), LoadState::Ready(_)));
    }

    #[tokio::test]
    async fn test_failed_load_retries_next_call() {
        let (inner, dynamic) = source(true);
        assert!(dynamic.definitions().await.is_empty());
        assert_eq!(dynamic.state(), LoadState::NotLoaded);

        assert_eq!(dynamic.definitions().await.len(), 1);
        assert_eq!(inner.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_reset_reloads() {
        let (inner, dynamic) = source(false);
        dynamic.definitions().await;
        dynamic.reset();
        dynamic.definitions().await;
        assert_eq!(inner.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_abandoned_load_resets() {
        let (_, dynamic) = source(false);
        let attempt = tokio::time::timeout(Duration::from_millis(1), dynamic.definitions()).await;
        assert!(attempt.is_err());
        assert_eq!(dynamic.state(), LoadState::NotLoaded);
    }
}
