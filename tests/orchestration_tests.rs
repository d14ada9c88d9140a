//! Orchestration Tests
//!
//! Tool resolution, mode gating, validation, failure flattening, dynamic
//! sources and the built-in tools end to end.
//!
//! Run: cargo nextest run --test orchestration_tests

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};
use toolgate::permissions::MemoryPermissionStore;
use toolgate::security::{
    ChannelConfirmationUi, ConfirmationGate, ConfirmationResponse, SecurityContext,
};
use toolgate::tools::{AskUserHandler, AskUserInput, ExecutionContext, ToolSource};
use toolgate::{CoreConfig, ToolDefinition, ToolError, ToolOrchestrator, ToolResult, WorkMode};

/// A gate whose UI approves every request, optionally asking to remember it.
fn auto_gate(remember: bool) -> (Arc<ConfirmationGate>, Arc<AtomicUsize>) {
    answering_gate(true, remember)
}

/// A gate whose UI gives the same answer to every request and counts them.
fn answering_gate(approve: bool, remember: bool) -> (Arc<ConfirmationGate>, Arc<AtomicUsize>) {
    let security = Arc::new(SecurityContext::builder().build());
    let (ui, mut rx) = ChannelConfirmationUi::channel(8);
    let gate = Arc::new(ConfirmationGate::new(
        security,
        Arc::new(MemoryPermissionStore::new()),
        Arc::new(ui),
    ));
    let prompts = Arc::new(AtomicUsize::new(0));

    let responder = gate.clone();
    let counter = prompts.clone();
    tokio::spawn(async move {
        while let Some((request, token)) = rx.recv().await {
            counter.fetch_add(1, Ordering::SeqCst);
            let mut response = if approve {
                ConfirmationResponse::approve(&request.id)
            } else {
                ConfirmationResponse::deny(&request.id)
            };
            if approve && remember {
                let path = request.args["path"].as_str().unwrap_or("*").to_string();
                response = response.remember(&request.tool, path, &token);
            }
            let _ = responder.respond(response).await;
        }
    });

    (gate, prompts)
}

/// A gate nobody answers.
fn silent_gate() -> Arc<ConfirmationGate> {
    let (ui, rx) = ChannelConfirmationUi::channel(8);
    std::mem::forget(rx);
    Arc::new(ConfirmationGate::new(
        Arc::new(SecurityContext::builder().build()),
        Arc::new(MemoryPermissionStore::new()),
        Arc::new(ui),
    ))
}

struct FakeSource {
    prefix: &'static str,
    tools: Vec<&'static str>,
    loads: AtomicUsize,
}

impl FakeSource {
    fn new(prefix: &'static str, tools: Vec<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            prefix,
            tools,
            loads: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ToolSource for FakeSource {
    fn name(&self) -> &str {
        self.prefix
    }

    fn claims(&self, tool_name: &str) -> bool {
        tool_name.starts_with(self.prefix)
    }

    async fn load(&self) -> toolgate::Result<Vec<ToolDefinition>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .tools
            .iter()
            .map(|name| ToolDefinition::object(*name, "fake tool", json!({}), &[]))
            .collect())
    }

    async fn call(
        &self,
        tool_name: &str,
        input: Value,
        _context: &ExecutionContext,
    ) -> toolgate::Result<ToolResult> {
        Ok(ToolResult::success(format!("{} <- {}", tool_name, input)))
    }
}

// =============================================================================
// Tool listing
// =============================================================================

mod listing_tests {
    use super::*;

    #[tokio::test]
    async fn test_chat_exposes_only_ask_user() {
        let (gate, _) = auto_gate(false);
        let source = FakeSource::new("mcp__", vec!["mcp__github__search"]);
        let orchestrator = ToolOrchestrator::builder(gate)
            .builtin_tools(&CoreConfig::default())
            .source(source.clone())
            .build();

        let tools = orchestrator.get_tools(WorkMode::Chat).await;
        let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["ask_user"]);
        assert_eq!(source.loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cowork_lists_static_and_dynamic_tools() {
        let (gate, _) = auto_gate(false);
        let mcp = FakeSource::new("mcp__", vec!["mcp__github__search", "mcp__github__open"]);
        let skills = FakeSource::new("skill__", vec!["skill__review"]);
        let orchestrator = ToolOrchestrator::builder(gate)
            .builtin_tools(&CoreConfig::default())
            .source(mcp.clone())
            .source(skills)
            .build();

        let tools = orchestrator.get_tools(WorkMode::Cowork).await;
        let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        for expected in [
            "ask_user",
            "run_command",
            "write_file",
            "mcp__github__search",
            "mcp__github__open",
            "skill__review",
        ] {
            assert!(names.contains(&expected), "missing {}: {:?}", expected, names);
        }

        let again = orchestrator.get_tools(WorkMode::Code).await;
        assert_eq!(again.len(), tools.len());
        assert_eq!(mcp.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_definitions_carry_only_wire_fields() {
        let (gate, _) = auto_gate(false);
        let orchestrator = ToolOrchestrator::builder(gate)
            .builtin_tools(&CoreConfig::default())
            .build();

        for tool in orchestrator.get_tools(WorkMode::Code).await {
            let value = serde_json::to_value(&tool).unwrap();
            let mut keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
            keys.sort();
            assert_eq!(keys, vec!["description", "input_schema", "name"]);
            assert_eq!(tool.input_schema["type"], "object");
        }
    }

    #[tokio::test]
    async fn test_duplicate_dynamic_name_is_ignored() {
        let (gate, _) = auto_gate(false);
        let orchestrator = ToolOrchestrator::builder(gate)
            .builtin_tools(&CoreConfig::default())
            .source(FakeSource::new("write", vec!["write_file"]))
            .build();

        let tools = orchestrator.get_tools(WorkMode::Code).await;
        let count = tools.iter().filter(|t| t.name == "write_file").count();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_reload_sources_loads_again() {
        let (gate, _) = auto_gate(false);
        let source = FakeSource::new("mcp__", vec!["mcp__a__b"]);
        let orchestrator = ToolOrchestrator::builder(gate).source(source.clone()).build();

        orchestrator.get_tools(WorkMode::Code).await;
        orchestrator.reload_sources();
        orchestrator.get_tools(WorkMode::Code).await;
        assert_eq!(source.loads.load(Ordering::SeqCst), 2);
    }
}

// =============================================================================
// Dispatch
// =============================================================================

mod dispatch_tests {
    use super::*;
    use schemars::JsonSchema;
    use serde::Deserialize;
    use toolgate::SchemaTool;

    #[derive(Debug, Deserialize, JsonSchema)]
    struct EmptyInput {}

    struct ExplodingTool;

    #[async_trait]
    impl SchemaTool for ExplodingTool {
        type Input = EmptyInput;
        const NAME: &'static str = "explode";
        const DESCRIPTION: &'static str = "Always panics";

        async fn handle(
            &self,
            _input: EmptyInput,
            _context: &ExecutionContext,
        ) -> toolgate::Result<ToolResult> {
            panic!("kaboom")
        }
    }

    struct FailingTool;

    #[async_trait]
    impl SchemaTool for FailingTool {
        type Input = EmptyInput;
        const NAME: &'static str = "fail";
        const DESCRIPTION: &'static str = "Always errors";

        async fn handle(
            &self,
            _input: EmptyInput,
            _context: &ExecutionContext,
        ) -> toolgate::Result<ToolResult> {
            Err(toolgate::Error::Process("disk full".into()))
        }
    }

    struct FixedAnswer;

    #[async_trait]
    impl AskUserHandler for FixedAnswer {
        async fn ask(&self, input: AskUserInput) -> toolgate::Result<String> {
            Ok(format!("{} -> {}", input.question, input.options.join("|")))
        }
    }

    #[tokio::test]
    async fn test_unknown_tool_text() {
        let (gate, _) = auto_gate(false);
        let orchestrator = ToolOrchestrator::builder(gate).mode(WorkMode::Code).build();

        let text = orchestrator.execute_tool("unknown_tool", json!({}), None).await;
        assert_eq!(text, "Error: Unknown tool: unknown_tool");

        let err = orchestrator
            .dispatch("unknown_tool", json!({}), None)
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::unknown_tool("unknown_tool"));
    }

    #[tokio::test]
    async fn test_mode_denied_before_validation() {
        let (gate, prompts) = auto_gate(false);
        let orchestrator = ToolOrchestrator::builder(gate)
            .builtin_tools(&CoreConfig::default())
            .build();
        assert_eq!(orchestrator.mode(), WorkMode::Chat);

        let err = orchestrator
            .dispatch("run_command", json!({}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ModeDenied { mode: WorkMode::Chat, .. }));
        assert_eq!(
            err.to_model_text(),
            "Tool 'run_command' is not available in chat mode"
        );
        assert_eq!(prompts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_validation_short_circuits_execution() {
        let (gate, prompts) = auto_gate(false);
        let orchestrator = ToolOrchestrator::builder(gate)
            .builtin_tools(&CoreConfig::default())
            .mode(WorkMode::Cowork)
            .build();

        let err = orchestrator
            .dispatch("write_file", json!({ "path": "  ", "content": "x" }), None)
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::validation("write_file", "path must not be empty"));

        let text = orchestrator
            .execute_tool("write_file", json!({ "content": "x" }), None)
            .await;
        assert!(text.starts_with("Invalid input"), "{}", text);
        assert_eq!(prompts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_executor_failures_become_text() {
        let (gate, _) = auto_gate(false);
        let orchestrator = ToolOrchestrator::builder(gate)
            .tool(Arc::new(ExplodingTool))
            .tool(Arc::new(FailingTool))
            .mode(WorkMode::Code)
            .build();

        let text = orchestrator.execute_tool("explode", json!({}), None).await;
        assert_eq!(text, "Error executing tool explode: kaboom");

        let err = orchestrator.dispatch("fail", json!({}), None).await.unwrap_err();
        assert_eq!(
            err,
            ToolError::execution("fail", "Process error: disk full")
        );
    }

    #[tokio::test]
    async fn test_ask_user_in_chat() {
        let (gate, _) = auto_gate(false);
        let orchestrator = ToolOrchestrator::builder(gate)
            .ask_user(Arc::new(FixedAnswer))
            .build();

        let text = orchestrator
            .execute_tool(
                "ask_user",
                json!({ "question": "Deploy?", "options": ["yes", "no"] }),
                None,
            )
            .await;
        assert_eq!(text, "Deploy? -> yes|no");
    }

    #[tokio::test]
    async fn test_answer_assistant_turn() {
        let (gate, _) = auto_gate(false);
        let orchestrator = ToolOrchestrator::builder(gate)
            .ask_user(Arc::new(FixedAnswer))
            .build();

        let turn: toolgate::Message = serde_json::from_value(json!({
            "role": "assistant",
            "content": [
                { "type": "text", "text": "Let me check." },
                { "type": "tool_use", "id": "toolu_1", "name": "ask_user",
                  "input": { "question": "Proceed?" } },
                { "type": "tool_use", "id": "toolu_2", "name": "unknown_tool", "input": {} }
            ]
        }))
        .unwrap();

        let results = orchestrator.answer_all(turn.tool_uses(), None).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].tool_use_id, "toolu_1");
        assert_eq!(results[0].content, "Proceed? -> ");
        assert!(!results[0].is_error);
        assert_eq!(results[1].content, "Error: Unknown tool: unknown_tool");
        assert!(results[1].is_error);

        let reply = toolgate::Message::tool_results(results);
        assert_eq!(reply.role, toolgate::Role::User);
    }

    #[tokio::test]
    async fn test_ask_user_without_handler() {
        let (gate, _) = auto_gate(false);
        let orchestrator = ToolOrchestrator::builder(gate).build();

        let err = orchestrator
            .dispatch("ask_user", json!({ "question": "?" }), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Execution { .. }));
    }

    #[tokio::test]
    async fn test_dynamic_names_resolve_before_listing() {
        let (gate, _) = auto_gate(false);
        let mcp = FakeSource::new("mcp__", vec![]);
        let orchestrator = ToolOrchestrator::builder(gate)
            .source(mcp.clone())
            .source(FakeSource::new("skill__", vec![]))
            .mode(WorkMode::Cowork)
            .build();

        let text = orchestrator
            .execute_tool("mcp__github__search", json!({ "q": "rust" }), None)
            .await;
        assert_eq!(text, r#"mcp__github__search <- {"q":"rust"}"#);

        let text = orchestrator
            .execute_tool("skill__review", json!({}), None)
            .await;
        assert_eq!(text, "skill__review <- {}");
        assert_eq!(mcp.loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dynamic_tool_denied_in_chat() {
        let (gate, _) = auto_gate(false);
        let orchestrator = ToolOrchestrator::builder(gate)
            .source(FakeSource::new("mcp__", vec![]))
            .build();

        let err = orchestrator
            .dispatch("mcp__github__search", json!({}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ModeDenied { .. }));
    }

    #[tokio::test]
    async fn test_mode_switch_takes_effect_on_next_call() {
        let (gate, _) = auto_gate(false);
        let orchestrator = ToolOrchestrator::builder(gate)
            .source(FakeSource::new("mcp__", vec![]))
            .build();

        assert!(orchestrator.dispatch("mcp__a__b", json!({}), None).await.is_err());
        orchestrator.set_mode(WorkMode::Code);
        assert!(orchestrator.dispatch("mcp__a__b", json!({}), None).await.is_ok());
    }
}

// =============================================================================
// Built-in tools
// =============================================================================

mod builtin_tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_write_file_end_to_end() {
        let dir = tempdir().unwrap();
        let (gate, prompts) = auto_gate(true);
        let artifacts: Arc<Mutex<Vec<PathBuf>>> = Arc::default();
        let seen = artifacts.clone();

        let orchestrator = ToolOrchestrator::builder(gate.clone())
            .builtin_tools(&CoreConfig::default())
            .working_dir(dir.path())
            .on_artifact(move |path| seen.lock().unwrap().push(path.to_path_buf()))
            .mode(WorkMode::Cowork)
            .build();

        let text = orchestrator
            .execute_tool(
                "write_file",
                json!({ "path": "notes/a.txt", "content": "hello" }),
                None,
            )
            .await;
        let target = dir.path().join("notes/a.txt");
        assert_eq!(
            text,
            format!("Successfully wrote 5 bytes to {}", target.display())
        );
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "hello");
        assert_eq!(artifacts.lock().unwrap().as_slice(), &[target.clone()]);
        assert_eq!(prompts.load(Ordering::SeqCst), 1);
        while gate.store().list().await.unwrap().is_empty() {
            tokio::task::yield_now().await;
        }

        // The remembered grant covers the second write.
        orchestrator
            .execute_tool(
                "write_file",
                json!({ "path": "notes/a.txt", "content": "again" }),
                None,
            )
            .await;
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "again");
        assert_eq!(prompts.load(Ordering::SeqCst), 1);
        assert_eq!(gate.store().list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_run_command_wildcard_is_not_remembered() {
        let dir = tempdir().unwrap();
        let (gate, prompts) = auto_gate(true);
        let orchestrator = ToolOrchestrator::builder(gate.clone())
            .builtin_tools(&CoreConfig::default())
            .working_dir(dir.path())
            .mode(WorkMode::Code)
            .build();

        let chunks: Arc<Mutex<String>> = Arc::default();
        let sink = chunks.clone();
        let stream: toolgate::tools::StreamCallback =
            Arc::new(move |chunk: &str| sink.lock().unwrap().push_str(chunk));

        let text = orchestrator
            .execute_tool("run_command", json!({ "command": "echo hello" }), Some(stream))
            .await;
        assert_eq!(text.trim(), "hello");
        assert!(chunks.lock().unwrap().contains("hello"));

        orchestrator
            .execute_tool("run_command", json!({ "command": "true" }), None)
            .await;
        assert_eq!(prompts.load(Ordering::SeqCst), 2);
        assert!(gate.store().list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_command_nonzero_exit() {
        let (gate, _) = auto_gate(false);
        let orchestrator = ToolOrchestrator::builder(gate)
            .builtin_tools(&CoreConfig::default())
            .mode(WorkMode::Code)
            .build();

        let text = orchestrator
            .execute_tool("run_command", json!({ "command": "exit 3" }), None)
            .await;
        assert!(text.starts_with("Exit code: 3"), "{}", text);
    }

    #[tokio::test]
    async fn test_shutdown_aborts_running_command() {
        let (gate, _) = auto_gate(false);
        let orchestrator = Arc::new(
            ToolOrchestrator::builder(gate.clone())
                .builtin_tools(&CoreConfig::default())
                .mode(WorkMode::Code)
                .build(),
        );

        let running = orchestrator.clone();
        let call = tokio::spawn(async move {
            running
                .execute_tool("run_command", json!({ "command": "sleep 30" }), None)
                .await
        });

        // Let the confirmation round trip finish and the process start.
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        assert_eq!(gate.waiting(), 0);
        orchestrator.shutdown();

        let text = tokio::time::timeout(std::time::Duration::from_secs(5), call)
            .await
            .expect("call should finish after shutdown")
            .unwrap();
        assert!(
            text.ends_with("[aborted]") || text.contains("denied"),
            "{}",
            text
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_confirmation_denies() {
        let dir = tempdir().unwrap();
        let orchestrator = ToolOrchestrator::builder(silent_gate())
            .builtin_tools(&CoreConfig::default())
            .working_dir(dir.path())
            .mode(WorkMode::Cowork)
            .build();

        let text = orchestrator
            .execute_tool("write_file", json!({ "path": "a.txt", "content": "x" }), None)
            .await;
        assert!(text.starts_with("User denied permission"), "{}", text);
        assert!(!dir.path().join("a.txt").exists());
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let (gate, _) = auto_gate(false);
        let orchestrator = ToolOrchestrator::builder(gate).build();
        let config = CoreConfig::default();

        assert!(!orchestrator.is_running());
        orchestrator.start(&config);
        orchestrator.start(&config);
        assert!(orchestrator.is_running());
        orchestrator.shutdown();
        assert!(!orchestrator.is_running());
    }
}

// =============================================================================
// MCP tools
// =============================================================================

mod mcp_tests {
    use super::*;
    use toolgate::mcp::{
        McpClient, McpContent, McpResult, McpToolDefinition, McpToolResult, McpToolSource,
    };

    /// Records every call it receives and answers with the tool name.
    #[derive(Default)]
    struct RecordingServer {
        calls: Mutex<Vec<String>>,
    }

    impl RecordingServer {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl McpClient for RecordingServer {
        async fn list_tools(&self) -> McpResult<Vec<McpToolDefinition>> {
            Ok(Vec::new())
        }

        async fn call_tool(&self, name: &str, _arguments: Value) -> McpResult<McpToolResult> {
            self.calls.lock().unwrap().push(name.to_string());
            Ok(McpToolResult {
                content: vec![McpContent::Text {
                    text: format!("{} done", name),
                }],
                is_error: false,
            })
        }
    }

    fn orchestrator(
        gate: Arc<ConfirmationGate>,
        server: &str,
        client: Arc<RecordingServer>,
    ) -> ToolOrchestrator {
        ToolOrchestrator::builder(gate)
            .source(Arc::new(McpToolSource::new().server(server, client)))
            .mode(WorkMode::Cowork)
            .build()
    }

    #[tokio::test]
    async fn test_denied_delete_never_reaches_server() {
        let (gate, prompts) = answering_gate(false, false);
        let server = Arc::new(RecordingServer::default());
        let orchestrator = orchestrator(gate, "fs", server.clone());

        let text = orchestrator
            .execute_tool("mcp__fs__delete_file", json!({ "path": "/proj/a.txt" }), None)
            .await;
        assert_eq!(text, "User denied permission to run mcp__fs__delete_file");
        assert_eq!(prompts.load(Ordering::SeqCst), 1);
        assert!(server.calls().is_empty());
    }

    #[tokio::test]
    async fn test_approved_delete_is_forwarded() {
        let (gate, prompts) = auto_gate(false);
        let server = Arc::new(RecordingServer::default());
        let orchestrator = orchestrator(gate, "fs", server.clone());

        let text = orchestrator
            .execute_tool("mcp__fs__delete_file", json!({ "path": "/proj/a.txt" }), None)
            .await;
        assert_eq!(text, "delete_file done");
        assert_eq!(prompts.load(Ordering::SeqCst), 1);
        assert_eq!(server.calls(), vec!["delete_file"]);
    }

    #[tokio::test]
    async fn test_read_only_tool_is_not_prompted() {
        let (gate, prompts) = answering_gate(false, false);
        let server = Arc::new(RecordingServer::default());
        let orchestrator = orchestrator(gate, "fs", server.clone());

        let text = orchestrator
            .execute_tool("mcp__fs__read_file", json!({ "path": "/proj/a.txt" }), None)
            .await;
        assert_eq!(text, "read_file done");
        assert_eq!(prompts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_screenshot_wildcard_is_remembered() {
        let (gate, prompts) = auto_gate(true);
        let server = Arc::new(RecordingServer::default());
        let orchestrator = orchestrator(gate.clone(), "computer", server.clone());

        let text = orchestrator
            .execute_tool("mcp__computer__screenshot", json!({}), None)
            .await;
        assert_eq!(text, "screenshot done");
        assert_eq!(prompts.load(Ordering::SeqCst), 1);
        while gate.store().list().await.unwrap().is_empty() {
            tokio::task::yield_now().await;
        }
        let grants = gate.store().list().await.unwrap();
        assert_eq!(grants[0].tool, "mcp__computer__screenshot");
        assert_eq!(grants[0].path_pattern, "*");

        orchestrator
            .execute_tool("mcp__computer__screenshot", json!({}), None)
            .await;
        assert_eq!(prompts.load(Ordering::SeqCst), 1);
        assert_eq!(server.calls(), vec!["screenshot", "screenshot"]);
    }

    #[tokio::test]
    async fn test_click_wildcard_is_not_remembered() {
        let (gate, prompts) = auto_gate(true);
        let server = Arc::new(RecordingServer::default());
        let orchestrator = orchestrator(gate.clone(), "computer", server.clone());

        for _ in 0..2 {
            let text = orchestrator
                .execute_tool("mcp__computer__click", json!({ "x": 10, "y": 20 }), None)
                .await;
            assert_eq!(text, "click done");
        }
        assert_eq!(prompts.load(Ordering::SeqCst), 2);
        assert!(gate.store().list().await.unwrap().is_empty());
        assert_eq!(server.calls(), vec!["click", "click"]);
    }
}

// =============================================================================
// Skills
// =============================================================================

mod skill_tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_skill_dirs_from_config() {
        let root = tempdir().unwrap();
        let skill = root.path().join("greet");
        std::fs::create_dir_all(&skill).unwrap();
        std::fs::write(
            skill.join("SKILL.md"),
            "---\ndescription: Greets someone\n---\nSay hello to $ARGUMENTS",
        )
        .unwrap();

        let config = CoreConfig {
            skill_dirs: vec![root.path().to_path_buf()],
            ..CoreConfig::default()
        };
        let (gate, _) = auto_gate(false);
        let orchestrator = ToolOrchestrator::builder(gate)
            .builtin_tools(&config)
            .mode(WorkMode::Code)
            .build();

        let tools = orchestrator.get_tools(WorkMode::Code).await;
        assert!(tools.iter().any(|t| t.name == "skill__greet"));

        let text = orchestrator
            .execute_tool("skill__greet", json!({ "arguments": "Ada" }), None)
            .await;
        assert_eq!(text.trim(), "Say hello to Ada");
    }
}

// =============================================================================
// State manager
// =============================================================================

mod state_tests {
    use toolgate::{Stage, StageEvent, StateManager};

    #[test]
    fn test_tool_loop_scenario() {
        let state = StateManager::new();
        let stages = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let recorded = stages.clone();
        state.on_stage_change(move |from, to| recorded.lock().unwrap().push((from, to)));

        state.start_processing();
        state.tool_call("write_file", "toolu_1");
        state.tool_complete("ok");
        state.message_complete("done");
        let ctx = state.complete();

        assert_eq!(ctx.stage, Stage::Idle);
        assert_eq!(ctx.iteration, 0);
        assert!(!ctx.is_processing);
        assert_eq!(
            stages.lock().unwrap().as_slice(),
            &[
                (Stage::Idle, Stage::Thinking),
                (Stage::Thinking, Stage::Planning),
                (Stage::Planning, Stage::Executing),
                (Stage::Executing, Stage::Feedback),
                (Stage::Feedback, Stage::Idle),
            ]
        );
    }

    #[test]
    fn test_configured_limit_resets_between_runs() {
        let config = toolgate::CoreConfig {
            max_iterations: 3,
            ..toolgate::CoreConfig::default()
        };
        let state = StateManager::from_config(&config);

        for _ in 0..3 {
            for _ in 0..3 {
                assert!(state.within_limit());
                state.start_processing();
            }
            assert!(!state.within_limit());
            state.complete();
        }
        assert!(state.within_limit());
        assert_eq!(state.start_processing().iteration, 1);
    }

    #[test]
    fn test_iteration_limit_and_error() {
        let state = StateManager::new();
        state.send(StageEvent::StartProcessing);
        state.send(StageEvent::StartProcessing);
        assert!(state.should_continue(3));
        assert!(!state.should_continue(2));

        state.error("overloaded", Some(529));
        assert!(!state.should_continue(10));
        assert_eq!(state.context().error_status, Some(529));
    }
}
