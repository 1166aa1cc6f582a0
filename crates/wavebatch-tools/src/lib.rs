pub mod builtin;
pub mod registry;

pub use registry::{ToolDefinition, ToolRegistry};
