use thiserror::Error;

/// Batch-level failure. Anything returned as this type aborts the whole
/// batch before a single tool is invoked.
#[derive(Debug, Error)]
pub enum BatchError {
    // Graph validation errors
    #[error("operation id '{id}' contains invalid characters (allowed: letters, digits, '_', '-')")]
    InvalidOperationId { id: String },

    #[error("duplicate operation id '{id}'")]
    DuplicateOperationId { id: String },

    #[error("Duplicate dependencies in operation '{operation}': '{dependency}' listed more than once")]
    DuplicateDependency { operation: String, dependency: String },

    #[error("operation '{operation}' depends on non-existent operations: '{missing}'")]
    UnknownDependency { operation: String, missing: String },

    #[error("operation '{operation}' references non-existent operation '{missing}'")]
    UnknownReference { operation: String, missing: String },

    #[error("circular dependency detected: {}", cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },

    // Request errors
    #[error("batch contains no operations")]
    EmptyBatch,

    #[error("batch contains {count} operations, the limit is {max}")]
    TooManyOperations { count: usize, max: usize },

    #[error("max_concurrent must be between 1 and {max}, got {value}")]
    InvalidConcurrency { value: usize, max: usize },

    #[error("Unknown tool '{tool}' in operation '{operation}'. Available tools: {}", available.join(", "))]
    UnknownTool {
        operation: String,
        tool: String,
        available: Vec<String>,
    },

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BatchError {
    /// Stable machine-readable kind, used in the top-level error reply.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidOperationId { .. } => "invalid_operation_id",
            Self::DuplicateOperationId { .. } => "duplicate_operation_id",
            Self::DuplicateDependency { .. } => "duplicate_dependency",
            Self::UnknownDependency { .. } => "unknown_dependency",
            Self::UnknownReference { .. } => "unknown_reference",
            Self::CircularDependency { .. } => "circular_dependency",
            Self::EmptyBatch => "empty_batch",
            Self::TooManyOperations { .. } => "too_many_operations",
            Self::InvalidConcurrency { .. } => "invalid_concurrency",
            Self::UnknownTool { .. } => "unknown_tool",
            Self::Config(_) => "config",
            Self::ConfigNotFound(_) => "config_not_found",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
        }
    }

    /// Whether this error came out of dependency-graph validation.
    pub fn is_graph_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidOperationId { .. }
                | Self::DuplicateOperationId { .. }
                | Self::DuplicateDependency { .. }
                | Self::UnknownDependency { .. }
                | Self::UnknownReference { .. }
                | Self::CircularDependency { .. }
        )
    }
}

/// Failure to substitute a reference token. Scoped to one operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("invalid reference syntax: '{token}' ({reason})")]
    InvalidSyntax { token: String, reason: String },

    #[error("reference to unknown operation '{0}'")]
    UnknownOperation(String),

    #[error("path not found: {segment} (in '{token}')")]
    PathNotFound { segment: String, token: String },
}

/// Failure reported by a tool. Scoped to one operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Domain(String),

    #[error("{0}")]
    Failed(String),
}

impl ToolError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::Domain(_) => "domain_error",
            Self::Failed(_) => "execution_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, BatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_names_participants() {
        let err = BatchError::CircularDependency {
            cycle: vec!["op1".into(), "op2".into(), "op1".into()],
        };
        assert_eq!(err.to_string(), "circular dependency detected: op1 -> op2 -> op1");
        assert_eq!(err.kind(), "circular_dependency");
        assert!(err.is_graph_error());
    }

    #[test]
    fn unknown_tool_lists_available() {
        let err = BatchError::UnknownTool {
            operation: "bad".into(),
            tool: "nonexistent".into(),
            available: vec!["add".into(), "mean".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("nonexistent"));
        assert!(msg.ends_with("Available tools: add, mean"));
        assert!(!err.is_graph_error());
    }

    #[test]
    fn resolution_messages() {
        assert_eq!(
            ResolutionError::UnknownOperation("op2".into()).to_string(),
            "reference to unknown operation 'op2'"
        );
        let err = ResolutionError::PathNotFound {
            segment: ".nonexistent".into(),
            token: "$op1.nonexistent".into(),
        };
        assert!(err.to_string().starts_with("path not found: .nonexistent"));
    }
}
