//! Ergonomic constructors for [`EngineError`].

use super::types::EngineError;

impl EngineError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn integrity(what: impl Into<String>) -> Self {
        Self::Integrity(what.into())
    }

    pub fn invalid_registration(what: impl Into<String>) -> Self {
        Self::InvalidRegistration(what.into())
    }

    pub fn invalid_state_transition(what: impl Into<String>) -> Self {
        Self::InvalidStateTransition(what.into())
    }

    pub fn tool_forward_failed(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolForwardFailed {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    pub fn tool_reverse_failed(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolReverseFailed {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    pub fn model_client(message: impl Into<String>) -> Self {
        Self::ModelClient(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn busy() -> Self {
        Self::Busy
    }

    pub fn permission_denied(what: impl Into<String>) -> Self {
        Self::PermissionDenied(what.into())
    }

    /// Whether the caller can reasonably retry the operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy)
    }
}
