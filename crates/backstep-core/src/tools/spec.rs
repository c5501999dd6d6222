use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EngineError, EngineResult};

/// Names of the built-in checkpoint tools (§4.4.3). These never require a
/// reverse handler and are skipped during `rollback_from` and excluded from
/// the auto-checkpoint trigger.
pub const CHECKPOINT_TOOL_NAMES: &[&str] = &[
    "create_checkpoint",
    "list_checkpoints",
    "rollback_to_checkpoint",
    "delete_checkpoint",
    "get_checkpoint_info",
    "cleanup_auto_checkpoints",
];

pub fn is_checkpoint_tool(name: &str) -> bool {
    CHECKPOINT_TOOL_NAMES.contains(&name)
}

/// `forward(args) -> result`, opaque to the engine.
pub type ForwardHandler =
    Arc<dyn Fn(&Value) -> EngineResult<Value> + Send + Sync>;

/// `reverse(args, result) -> ()`, side-effect only.
pub type ReverseHandler =
    Arc<dyn Fn(&Value, &Value) -> EngineResult<()> + Send + Sync>;

/// Registration record for one tool.
///
/// A reverse handler is required unless `name` is in
/// [`CHECKPOINT_TOOL_NAMES`].
#[derive(Clone)]
pub struct ToolSpec {
    pub name: String,
    pub forward: ForwardHandler,
    pub reverse: Option<ReverseHandler>,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, forward: ForwardHandler, reverse: Option<ReverseHandler>) -> Self {
        Self {
            name: name.into(),
            forward,
            reverse,
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.reverse.is_none() && !is_checkpoint_tool(&self.name) {
            return Err(EngineError::invalid_registration(format!(
                "tool '{}' must register a reverse handler unless it is a checkpoint tool",
                self.name
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for ToolSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSpec")
            .field("name", &self.name)
            .field("has_reverse", &self.reverse.is_some())
            .finish()
    }
}

/// A single entry in the Track.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolInvocationRecord {
    pub tool_name: String,
    pub args: Value,
    pub result: Option<Value>,
    pub success: bool,
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ToolInvocationRecord {
    pub fn success(tool_name: impl Into<String>, args: Value, result: Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            args,
            result: Some(result),
            success: true,
            error_message: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(tool_name: impl Into<String>, args: Value, error_message: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            args,
            result: None,
            success: false,
            error_message: Some(error_message.into()),
            timestamp: Utc::now(),
        }
    }
}

/// Result of invoking a reverse handler during rollback.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReverseInvocationResult {
    pub tool_name: String,
    pub reversed_successfully: bool,
    pub error_message: Option<String>,
}
