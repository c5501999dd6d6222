//! Agent Orchestrator: wraps the external model client, intercepts tool
//! calls through a hook, drives auto-checkpointing, and handles
//! restore-from-snapshot including history re-injection.

mod builtin_tools;
mod model_client;
mod orchestrator;

pub use builtin_tools::{checkpoint_tool_descriptors, CHECKPOINT_TOOL_DESCRIPTIONS};
pub use model_client::{ModelClient, ModelResponse, ToolCall, ToolDescriptor};
pub use orchestrator::{EngineEvent, Orchestrator, RunOutcome};
