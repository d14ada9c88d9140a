use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;

use super::{make_skill_name, parse_frontmatter, parse_skill_name, substitute_args};
use crate::tools::{ExecutionContext, ToolSource};
use crate::types::{ToolDefinition, ToolResult};

pub const SKILL_FILE: &str = "SKILL.md";

/// YAML header of a `SKILL.md`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SkillFrontmatter {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "argument-hint")]
    pub argument_hint: Option<String>,
}

#[derive(Debug)]
struct Skill {
    name: String,
    description: String,
    argument_hint: Option<String>,
    body: String,
    path: PathBuf,
}

/// Scans skill directories; bodies are read again on every call so edits
/// show up without a reload.
#[derive(Debug, Clone, Default)]
pub struct SkillToolSource {
    dirs: Vec<PathBuf>,
}

impl SkillToolSource {
    /// Source scanning each directory for `<skill>/SKILL.md`.
    pub fn new(dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            dirs: dirs.into_iter().collect(),
        }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    async fn read_skill(path: &Path) -> crate::Result<Skill> {
        let content = tokio::fs::read_to_string(path).await?;
        let doc = parse_frontmatter::<SkillFrontmatter>(&content)?;
        let fallback = path
            .parent()
            .and_then(|dir| dir.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Skill {
            name: doc.frontmatter.name.unwrap_or(fallback),
            description: doc.frontmatter.description,
            argument_hint: doc.frontmatter.argument_hint,
            body: doc.body,
            path: path.to_path_buf(),
        })
    }

    async fn scan(&self) -> crate::Result<Vec<Skill>> {
        let mut skills = Vec::new();
        for dir in &self.dirs {
            let mut entries = match tokio::fs::read_dir(dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!(dir = %dir.display(), "skill directory missing");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let mut found = Vec::new();
            while let Some(entry) = entries.next_entry().await? {
                let candidate = entry.path().join(SKILL_FILE);
                if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                    found.push(candidate);
                }
            }
            found.sort();

            for path in found {
                match Self::read_skill(&path).await {
                    Ok(skill) => skills.push(skill),
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "skipping invalid skill")
                    }
                }
            }
        }
        Ok(skills)
    }

    async fn find(&self, name: &str) -> crate::Result<Skill> {
        for dir in &self.dirs {
            let direct = dir.join(name).join(SKILL_FILE);
            if tokio::fs::try_exists(&direct).await.unwrap_or(false) {
                let skill = Self::read_skill(&direct).await?;
                if skill.name == name {
                    return Ok(skill);
                }
            }
        }
        self.scan()
            .await?
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| crate::Error::Skill(format!("Skill not found: {}", name)))
    }
}

#[async_trait]
impl ToolSource for SkillToolSource {
    fn name(&self) -> &str {
        "skills"
    }

    fn claims(&self, tool_name: &str) -> bool {
        parse_skill_name(tool_name).is_some()
    }

    async fn load(&self) -> crate::Result<Vec<ToolDefinition>> {
        let mut seen = std::collections::HashSet::new();
        Ok(self
            .scan()
            .await?
            .into_iter()
            .filter(|skill| seen.insert(skill.name.clone()))
            .map(|skill| {
                let hint = skill
                    .argument_hint
                    .unwrap_or_else(|| "Arguments passed to the skill".to_string());
                ToolDefinition::object(
                    make_skill_name(&skill.name),
                    skill.description,
                    serde_json::json!({
                        "arguments": { "type": "string", "description": hint }
                    }),
                    &[],
                )
            })
            .collect())
    }

    async fn call(
        &self,
        tool_name: &str,
        input: serde_json::Value,
        _context: &ExecutionContext,
    ) -> crate::Result<ToolResult> {
        let name = parse_skill_name(tool_name)
            .ok_or_else(|| crate::Error::Skill(format!("Not a skill tool: {}", tool_name)))?;
        let skill = self.find(name).await?;

        let arguments = input
            .get("arguments")
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        Ok(ToolResult::success(substitute_args(&skill.body, arguments)).with_metadata(
            serde_json::json!({
                "skill": skill.name,
                "path": skill.path.display().to_string(),
            }),
        ))
    }
}
