//! A no-op `ModelClient` used by `backstep run`: echoes the user's message
//! back without ever calling a tool. Exercising the engine against a real
//! LLM backend is an application concern left to callers embedding
//! `backstep-sdk` directly.

use async_trait::async_trait;
use backstep_core::agent::{ModelClient, ModelResponse, ToolDescriptor};
use backstep_core::error::EngineResult;
use backstep_core::model::HistoryEntry;

pub struct EchoModelClient;

#[async_trait]
impl ModelClient for EchoModelClient {
    async fn run(&self, message: &str, _history: Option<&[HistoryEntry]>, tools: &[ToolDescriptor]) -> EngineResult<ModelResponse> {
        Ok(ModelResponse {
            text: format!(
                "echo: {message} ({} tool(s) available, none invoked)",
                tools.len()
            ),
            tool_calls: Vec::new(),
        })
    }
}
