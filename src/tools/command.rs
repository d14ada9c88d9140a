//! `run_command`: shell execution behind a confirmation.

use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;

use super::context::ExecutionContext;
use super::process::{self, ProcessOptions};
use super::traits::SchemaTool;
use crate::config::CoreConfig;
use crate::permissions::WILDCARD;
use crate::types::ToolResult;

const MAX_TIMEOUT_MS: u64 = 600_000;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RunCommandInput {
    /// The command to execute
    pub command: String,
    /// Optional timeout in milliseconds (max 600000)
    #[serde(default)]
    pub timeout: Option<u64>,
    /// Short description of what this command does, shown to the user
    #[serde(default)]
    pub description: Option<String>,
}

/// Runs a shell command after confirmation. Never remembered for `*`.
#[derive(Debug, Clone)]
pub struct RunCommandTool {
    options: ProcessOptions,
}

impl RunCommandTool {
    pub fn new(options: ProcessOptions) -> Self {
        Self { options }
    }

    /// Timeout and output limit from configuration.
    pub fn from_config(config: &CoreConfig) -> Self {
        Self::new(ProcessOptions {
            timeout: config.command_timeout(),
            max_output_chars: config.max_output_chars,
        })
    }
}

impl Default for RunCommandTool {
    fn default() -> Self {
        Self::new(ProcessOptions::default())
    }
}

#[async_trait]
impl SchemaTool for RunCommandTool {
    type Input = RunCommandInput;
    const NAME: &'static str = "run_command";
    const DESCRIPTION: &'static str = "Executes a bash command in the working directory. \
        The user is asked to approve every command. \
        Default timeout is 120 seconds, maximum is 600 seconds. \
        Output is truncated at 30,000 characters.";

    fn check(input: &RunCommandInput) -> Result<(), String> {
        if input.command.trim().is_empty() {
            return Err("command must not be empty".into());
        }
        Ok(())
    }

    async fn handle(
        &self,
        input: RunCommandInput,
        context: &ExecutionContext,
    ) -> crate::Result<ToolResult> {
        let description = input
            .description
            .clone()
            .unwrap_or_else(|| format!("Run command: {}", input.command));
        let approved = context
            .request_confirmation(
                description,
                serde_json::json!({ "command": input.command }),
                WILDCARD,
            )
            .await;
        if !approved {
            return Ok(ToolResult::error("User denied permission to run this command"));
        }

        let mut options = self.options.clone();
        if let Some(ms) = input.timeout {
            options.timeout = Duration::from_millis(ms.min(MAX_TIMEOUT_MS));
        }

        let outcome = process::run(
            &input.command,
            context.working_dir(),
            &options,
            context.stream_callback(),
            context.cancellation(),
        )
        .await?;

        Ok(ToolResult::success(outcome.render()).with_metadata(serde_json::json!({
            "status": outcome.status,
            "exitCode": outcome.exit_code,
            "elapsedMs": outcome.elapsed.as_millis() as u64,
        })))
    }
}
