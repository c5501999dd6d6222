use serde_json::json;

use super::model_client::ToolDescriptor;
use crate::tools::CHECKPOINT_TOOL_NAMES;

/// Human-facing descriptions paired with [`CHECKPOINT_TOOL_NAMES`], in the
/// same order, used to teach the model when to invoke each built-in tool.
pub const CHECKPOINT_TOOL_DESCRIPTIONS: &[&str] = &[
    "Create a manual checkpoint of the current conversation and tool state, optionally giving it a name.",
    "List the checkpoints available in the current conversation.",
    "Request a rollback to a prior checkpoint by id or by a case-insensitive substring of its name. Does not perform the rollback itself.",
    "Delete a checkpoint belonging to the current conversation.",
    "Get metadata about a specific checkpoint.",
    "Prune old automatic checkpoints, keeping only the most recent ones. Manual checkpoints are never pruned.",
];

/// Tool descriptors for the reserved checkpoint-tool set, ready to hand to
/// a [`super::ModelClient`] alongside caller-registered tools.
pub fn checkpoint_tool_descriptors() -> Vec<ToolDescriptor> {
    CHECKPOINT_TOOL_NAMES
        .iter()
        .zip(CHECKPOINT_TOOL_DESCRIPTIONS.iter())
        .map(|(name, description)| ToolDescriptor {
            name: name.to_string(),
            description: description.to_string(),
            parameters: match *name {
                "create_checkpoint" => json!({
                    "type": "object",
                    "properties": { "name": { "type": "string" } },
                }),
                "rollback_to_checkpoint" => json!({
                    "type": "object",
                    "properties": { "id_or_name": { "type": "string" } },
                    "required": ["id_or_name"],
                }),
                "delete_checkpoint" | "get_checkpoint_info" => json!({
                    "type": "object",
                    "properties": { "checkpoint_id": { "type": "integer" } },
                    "required": ["checkpoint_id"],
                }),
                "cleanup_auto_checkpoints" => json!({
                    "type": "object",
                    "properties": { "keep_latest": { "type": "integer", "default": 5 } },
                }),
                _ => json!({ "type": "object", "properties": {} }),
            },
        })
        .collect()
}
