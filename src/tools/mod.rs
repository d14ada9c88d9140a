//! Tool executors, dynamic tool sources and the orchestrator that runs them.

mod ask_user;
mod command;
mod context;
mod mode;
mod orchestrator;
pub mod process;
mod registry;
mod source;
mod traits;
mod write;

pub use ask_user::{ASK_USER_TOOL, AskUserHandler, AskUserInput, ask_user_definition};
pub use command::{RunCommandInput, RunCommandTool};
pub use context::{ArtifactCallback, ExecutionContext, StreamCallback};
pub use mode::WorkMode;
pub use orchestrator::{ToolOrchestrator, ToolOrchestratorBuilder};
pub use process::{ProcessOptions, ProcessOutcome, ProcessStatus};
pub use registry::ToolRegistry;
pub use source::{DynamicSource, LoadState, ToolSource};
pub use traits::{DEFAULT_MODES, SchemaTool, Tool};
pub use write::{WriteFileInput, WriteFileTool};
