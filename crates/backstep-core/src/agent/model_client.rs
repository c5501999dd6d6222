use async_trait::async_trait;
use serde_json::Value;

use crate::error::EngineResult;
use crate::model::HistoryEntry;

/// A tool surfaced to the model, with a description that teaches it when to
/// invoke the tool.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's arguments, opaque to the engine.
    pub parameters: Value,
}

/// A tool call the model emitted during a `run`.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub name: String,
    pub args: Value,
}

/// The model client's reply to one `run` invocation.
#[derive(Debug, Clone, Default)]
pub struct ModelResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
}

/// The external, opaque language-model client the orchestrator drives.
///
/// The client is presumed to persist its own per-session message log; the
/// orchestrator does not rely on that log for correctness — see history
/// re-injection in [`super::orchestrator`].
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn run(
        &self,
        message: &str,
        history: Option<&[HistoryEntry]>,
        tools: &[ToolDescriptor],
    ) -> EngineResult<ModelResponse>;
}
