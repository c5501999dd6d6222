use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::error::{EngineError, EngineResult};

use super::spec::{is_checkpoint_tool, ReverseInvocationResult, ToolInvocationRecord, ToolSpec};

/// Holds registered tools and the ordered invocation Track for one
/// orchestrator. Never shared across orchestrators: each internal session's
/// live agent owns its own registry, which simplifies reasoning at the cost
/// of one registry per live session.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolSpec>,
    track: Vec<ToolInvocationRecord>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `spec`, replacing any prior spec under the same name.
    ///
    /// Fails with [`EngineError::InvalidRegistration`] if `spec.reverse` is
    /// absent and `spec.name` is not a reserved checkpoint tool.
    pub fn register(&mut self, spec: ToolSpec) -> EngineResult<()> {
        spec.validate()?;
        self.tools.insert(spec.name.clone(), spec);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.get(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// Appends an immutable record to the Track. The Track's length
    /// increases by exactly one.
    pub fn record(&mut self, record: ToolInvocationRecord) -> usize {
        self.track.push(record);
        self.track.len()
    }

    pub fn track_len(&self) -> usize {
        self.track.len()
    }

    pub fn track(&self) -> &[ToolInvocationRecord] {
        &self.track
    }

    /// Executes `spec.forward` and records the outcome, success or failure.
    pub fn invoke_and_record(&mut self, name: &str, args: Value) -> EngineResult<Value> {
        let spec = self
            .tools
            .get(name)
            .ok_or_else(|| EngineError::not_found(format!("tool '{name}'")))?
            .clone();

        match (spec.forward)(&args) {
            Ok(result) => {
                self.record(ToolInvocationRecord::success(name, args, result.clone()));
                Ok(result)
            }
            Err(e) => {
                self.record(ToolInvocationRecord::failure(name, args, e.to_string()));
                Err(EngineError::tool_forward_failed(name, e.to_string()))
            }
        }
    }

    /// Invokes reverse handlers for every record at `[index .. len)` in
    /// reverse order. Checkpoint-tool records are skipped. All reverse
    /// attempts execute even if one fails; outcomes are collected and
    /// returned rather than short-circuiting. On return the Track is
    /// logically truncated to `index`.
    #[instrument(skip(self), fields(index, track_len = self.track.len()))]
    pub fn rollback_from(&mut self, index: usize) -> EngineResult<Vec<ReverseInvocationResult>> {
        if index > self.track.len() {
            return Err(EngineError::invalid_state_transition(format!(
                "rollback index {index} exceeds track length {}",
                self.track.len()
            )));
        }

        let mut results = Vec::new();
        for record in self.track[index..].iter().rev() {
            if is_checkpoint_tool(&record.tool_name) {
                continue;
            }
            if !record.success {
                continue;
            }

            let spec = self.tools.get(&record.tool_name);
            let Some(spec) = spec else {
                results.push(ReverseInvocationResult {
                    tool_name: record.tool_name.clone(),
                    reversed_successfully: false,
                    error_message: Some("tool is no longer registered".to_string()),
                });
                continue;
            };
            let Some(reverse) = &spec.reverse else {
                results.push(ReverseInvocationResult {
                    tool_name: record.tool_name.clone(),
                    reversed_successfully: false,
                    error_message: Some("no reverse handler registered".to_string()),
                });
                continue;
            };

            let result_value = record.result.clone().unwrap_or(Value::Null);
            match reverse(&record.args, &result_value) {
                Ok(()) => results.push(ReverseInvocationResult {
                    tool_name: record.tool_name.clone(),
                    reversed_successfully: true,
                    error_message: None,
                }),
                Err(e) => {
                    warn!(tool = %record.tool_name, error = %e, "reverse handler failed");
                    results.push(ReverseInvocationResult {
                        tool_name: record.tool_name.clone(),
                        reversed_successfully: false,
                        error_message: Some(e.to_string()),
                    })
                }
            }
        }

        self.track.truncate(index);
        debug!(remaining = self.track.len(), "rollback_from complete");
        Ok(results)
    }

    /// Re-executes forward handlers in original order using recorded
    /// arguments, appending new records. Does not erase prior records.
    pub fn redo(&mut self) -> Vec<ToolInvocationRecord> {
        let snapshot: Vec<ToolInvocationRecord> = self.track.clone();
        let mut new_records = Vec::with_capacity(snapshot.len());

        for record in snapshot {
            let Some(spec) = self.tools.get(&record.tool_name) else {
                continue;
            };
            let new_record = match (spec.forward)(&record.args) {
                Ok(result) => ToolInvocationRecord::success(&record.tool_name, record.args.clone(), result),
                Err(e) => ToolInvocationRecord::failure(&record.tool_name, record.args.clone(), e.to_string()),
            };
            self.track.push(new_record.clone());
            new_records.push(new_record);
        }

        new_records
    }
}
