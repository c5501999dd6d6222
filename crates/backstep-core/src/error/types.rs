//! Error taxonomy.

use thiserror::Error;

/// All errors the engine can raise.
///
/// Variants map one-to-one onto the error taxonomy the engine contracts are
/// specified against: store failures surface as [`EngineError::NotFound`] or
/// [`EngineError::Integrity`], tool registration failures as
/// [`EngineError::InvalidRegistration`], and so on.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An entity id did not resolve to a row.
    #[error("not found: {0}")]
    NotFound(String),

    /// A unique or foreign-key constraint failed.
    #[error("integrity violation: {0}")]
    Integrity(String),

    /// A tool was registered without a reverse handler and is not a
    /// reserved checkpoint tool.
    #[error("invalid tool registration: {0}")]
    InvalidRegistration(String),

    /// A requested operation would move the engine into a state the
    /// invariants forbid (e.g. rollback past the track length).
    #[error("invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// A tool's forward handler returned an error.
    #[error("tool '{tool_name}' forward handler failed: {message}")]
    ToolForwardFailed { tool_name: String, message: String },

    /// A tool's reverse handler returned an error during rollback.
    #[error("tool '{tool_name}' reverse handler failed: {message}")]
    ToolReverseFailed { tool_name: String, message: String },

    /// A `run()` was attempted on an internal session already mid-turn.
    #[error("session is busy")]
    Busy,

    /// A caller attempted an operation its identity is not authorized for
    /// (e.g. a non-admin deleting another user, or anyone deleting the root
    /// user).
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The configured model client returned an error.
    #[error("model client error: {0}")]
    ModelClient(String),

    /// Underlying storage backend failure, opaque to the engine.
    #[error("storage error: {0}")]
    Storage(String),

    /// JSON (de)serialization failure on a stored or transmitted payload.
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    /// Configuration could not be loaded or was invalid.
    #[error("configuration error: {0}")]
    Config(String),
}
