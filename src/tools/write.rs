//! `write_file`: create or overwrite a file after the user approves the path.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;

use super::context::ExecutionContext;
use super::traits::SchemaTool;
use crate::types::ToolResult;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct WriteFileInput {
    /// Path of the file to write, absolute or relative to the working directory
    pub path: String,
    /// The content to write to the file
    pub content: String,
}

/// Writes a file after confirmation, creating parent directories.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteFileTool;

#[async_trait]
impl SchemaTool for WriteFileTool {
    type Input = WriteFileInput;
    const NAME: &'static str = "write_file";
    const DESCRIPTION: &'static str = "Writes a file to the local filesystem, \
        creating parent directories as needed. Overwrites existing files. \
        The user is asked to approve the target path.";

    fn check(input: &WriteFileInput) -> Result<(), String> {
        if input.path.trim().is_empty() {
            return Err("path must not be empty".into());
        }
        Ok(())
    }

    async fn handle(
        &self,
        input: WriteFileInput,
        context: &ExecutionContext,
    ) -> crate::Result<ToolResult> {
        let path = context.resolve(&input.path);
        let display = path.display().to_string();

        let approved = context
            .request_confirmation(
                format!("Write {} bytes to {}", input.content.len(), display),
                serde_json::json!({ "path": display }),
                display.as_str(),
            )
            .await;
        if !approved {
            return Ok(ToolResult::error(format!(
                "User denied permission to write {}",
                display
            )));
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &input.content).await?;
        context.artifact_created(&path);

        Ok(ToolResult::success(format!(
            "Successfully wrote {} bytes to {}",
            input.content.len(),
            display
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{Tool, WorkMode};
    use tempfile::tempdir;

    #[test]
    fn test_modes() {
        assert!(!WriteFileTool.allowed_in(WorkMode::Chat));
        assert!(WriteFileTool.allowed_in(WorkMode::Code));
        assert!(WriteFileTool.allowed_in(WorkMode::Cowork));
    }

    #[test]
    fn test_validate() {
        assert!(WriteFileTool.validate(&serde_json::json!({"path": "a.txt"})).is_err());
        assert!(
            WriteFileTool
                .validate(&serde_json::json!({"path": "", "content": "x"}))
                .is_err()
        );
        assert!(
            WriteFileTool
                .validate(&serde_json::json!({"path": "a.txt", "content": "x"}))
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_denied_does_not_write() {
        let dir = tempdir().unwrap();
        let ctx = ExecutionContext::new("write_file", WorkMode::Code).with_working_dir(dir.path());
        let result = WriteFileTool
            .execute(serde_json::json!({"path": "a.txt", "content": "x"}), &ctx)
            .await
            .unwrap();
        assert!(result.is_error());
        assert!(!dir.path().join("a.txt").exists());
    }
}
