//! Work modes deciding which tools the model may see and call.

use serde::{Deserialize, Serialize};

/// The assistant's current working mode.
///
/// - **Chat**: conversation only; the model can ask the user questions and nothing else.
/// - **Code**: software work inside a project directory.
/// - **Cowork**: general desktop work, including files outside a project.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkMode {
    #[default]
    Chat,
    Code,
    Cowork,
}

impl WorkMode {
    pub const ALL: &'static [WorkMode] = &[WorkMode::Chat, WorkMode::Code, WorkMode::Cowork];

    pub fn is_chat(&self) -> bool {
        matches!(self, WorkMode::Chat)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkMode::Chat => "chat",
            WorkMode::Code => "code",
            WorkMode::Cowork => "cowork",
        }
    }
}

impl std::fmt::Display for WorkMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WorkMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "chat" => Ok(WorkMode::Chat),
            "code" => Ok(WorkMode::Code),
            "cowork" | "co-work" => Ok(WorkMode::Cowork),
            _ => Err(format!("Unknown work mode: {}", s)),
        }
    }
}
