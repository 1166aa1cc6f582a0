use futures::future::BoxFuture;

use crate::error::ToolError;

/// An externally supplied capability, invoked by name.
///
/// The engine knows nothing about what a tool computes. It hands over the
/// fully resolved argument structure and records whatever comes back.
pub trait Tool: Send + Sync + 'static {
    /// Tool name (used in `Operation::tool`).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// JSON Schema for tool input.
    fn input_schema(&self) -> serde_json::Value;

    /// Invoke the tool with resolved arguments.
    fn invoke(
        &self,
        input: serde_json::Value,
    ) -> BoxFuture<'_, std::result::Result<serde_json::Value, ToolError>>;
}
