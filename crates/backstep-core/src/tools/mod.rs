//! Tool Registry & Track: forward/reverse handler pairs and the ordered
//! invocation log that drives undo (reverse order) and redo (forward order).

mod registry;
mod spec;

pub use registry::ToolRegistry;
pub use spec::{
    is_checkpoint_tool, ForwardHandler, ReverseHandler, ReverseInvocationResult,
    ToolInvocationRecord, ToolSpec, CHECKPOINT_TOOL_NAMES,
};
