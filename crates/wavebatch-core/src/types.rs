use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{BatchError, ResolutionError, ToolError};

/// How a batch is turned into dispatch waves.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// One at a time, in caller order.
    Sequential,
    /// Everything in a single wave, dependencies ignored.
    Parallel,
    /// Waves derived from the dependency graph.
    #[default]
    Auto,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Sequential => "sequential",
            Self::Parallel => "parallel",
            Self::Auto => "auto",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "sequential" => Ok(Self::Sequential),
            "parallel" => Ok(Self::Parallel),
            "auto" => Ok(Self::Auto),
            other => Err(format!(
                "unknown execution mode '{}' (expected sequential, parallel or auto)",
                other
            )),
        }
    }
}

/// Whether `id` only uses letters, digits, `_` and `-`.
pub fn is_valid_operation_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn generate_operation_id() -> String {
    Uuid::new_v4().to_string()
}

fn empty_arguments() -> Value {
    Value::Object(Map::new())
}

/// One unit of work submitted as part of a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    /// Unique within the batch. Generated when omitted.
    #[serde(default = "generate_operation_id")]
    pub id: String,
    /// Name of the registered tool to invoke.
    pub tool: String,
    /// Tool input; may contain `$id.path` reference tokens.
    #[serde(default = "empty_arguments")]
    pub arguments: Value,
    /// Operations that must finish first.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Resolved like `arguments`, then merged over them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_mapping: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Operation {
    pub fn new(id: impl Into<String>, tool: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            tool: tool.into(),
            arguments,
            depends_on: vec![],
            result_mapping: None,
            timeout_ms: None,
            context: None,
            label: None,
        }
    }

    pub fn depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_result_mapping(mut self, mapping: Map<String, Value>) -> Self {
        self.result_mapping = Some(mapping);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_context(mut self, context: impl Into<Value>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Terminal status of an operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Success,
    Error,
    Timeout,
}

impl OperationStatus {
    pub fn is_failure(self) -> bool {
        !matches!(self, Self::Success)
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// `{kind, message}` pair carried by failed results and batch rejections.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorDetail {
    pub kind: String,
    pub message: String,
}

impl ErrorDetail {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn timeout(timeout_ms: u64) -> Self {
        Self::new(
            "timeout",
            format!("operation timeout: exceeded {}ms", timeout_ms),
        )
    }

    pub fn dependency_failed(dependency: &str) -> Self {
        Self::new(
            "dependency_failed",
            format!("dependency failed: '{}' did not succeed", dependency),
        )
    }

    /// Sequential mode reached an operation before one of its declared
    /// dependencies.
    pub fn dependency_not_ready(dependency: &str) -> Self {
        Self::new(
            "dependency_not_ready",
            format!("dependency not ready: '{}' has not run yet", dependency),
        )
    }
}

impl From<&ResolutionError> for ErrorDetail {
    fn from(err: &ResolutionError) -> Self {
        Self::new("resolution_error", err.to_string())
    }
}

impl From<&ToolError> for ErrorDetail {
    fn from(err: &ToolError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

impl From<&BatchError> for ErrorDetail {
    fn from(err: &BatchError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

/// Outcome of a single operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult {
    pub id: String,
    pub tool: String,
    pub status: OperationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
    pub execution_time_ms: f64,
    pub wave: usize,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

impl OperationResult {
    fn for_operation(op: &Operation, status: OperationStatus) -> Self {
        Self {
            id: op.id.clone(),
            tool: op.tool.clone(),
            status,
            result: None,
            error: None,
            execution_time_ms: 0.0,
            wave: 0,
            dependencies: vec![],
            label: op.label.clone(),
            context: op.context.clone(),
        }
    }

    pub fn success(op: &Operation, payload: Value) -> Self {
        let mut result = Self::for_operation(op, OperationStatus::Success);
        result.result = Some(payload);
        result
    }

    pub fn error(op: &Operation, error: ErrorDetail) -> Self {
        let mut result = Self::for_operation(op, OperationStatus::Error);
        result.error = Some(error);
        result
    }

    pub fn timeout(op: &Operation, timeout_ms: u64) -> Self {
        let mut result = Self::for_operation(op, OperationStatus::Timeout);
        result.error = Some(ErrorDetail::timeout(timeout_ms));
        result
    }

    pub fn at_wave(mut self, wave: usize, dependencies: Vec<String>) -> Self {
        self.wave = wave;
        self.dependencies = dependencies;
        self
    }

    pub fn with_elapsed_ms(mut self, elapsed_ms: f64) -> Self {
        self.execution_time_ms = elapsed_ms;
        self
    }

    pub fn succeeded(&self) -> bool {
        self.status == OperationStatus::Success
    }
}

/// Aggregate counts for a finished batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExecutionSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub total_execution_time_ms: f64,
    pub num_waves: usize,
}

impl ExecutionSummary {
    pub fn tally(results: &[OperationResult], total_execution_time_ms: f64, num_waves: usize) -> Self {
        let mut summary = Self {
            total: results.len(),
            total_execution_time_ms,
            num_waves,
            ..Self::default()
        };
        for r in results {
            match r.status {
                OperationStatus::Success => summary.succeeded += 1,
                OperationStatus::Error => summary.failed += 1,
                OperationStatus::Timeout => summary.timed_out += 1,
            }
        }
        summary
    }
}

/// A batch as submitted by a caller. Omitted options fall back to config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub operations: Vec<Operation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_mode: Option<ExecutionMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_on_error: Option<bool>,
}

impl BatchRequest {
    pub fn new(operations: Vec<Operation>) -> Self {
        Self {
            operations,
            execution_mode: None,
            max_concurrent: None,
            stop_on_error: None,
        }
    }

    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = Some(mode);
        self
    }

    pub fn max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = Some(n);
        self
    }

    pub fn stop_on_error(mut self, stop: bool) -> Self {
        self.stop_on_error = Some(stop);
        self
    }
}

/// Response for a batch that passed validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResponse {
    pub results: Vec<OperationResult>,
    pub summary: ExecutionSummary,
}

impl BatchResponse {
    pub fn get(&self, id: &str) -> Option<&OperationResult> {
        self.results.iter().find(|r| r.id == id)
    }
}

/// What goes back over the wire: either a full response or a rejection
/// with no partial results.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchReply {
    Completed(BatchResponse),
    Rejected {
        error: ErrorDetail,
        results: Vec<OperationResult>,
    },
}

impl BatchReply {
    pub fn rejected(err: &BatchError) -> Self {
        Self::Rejected {
            error: err.into(),
            results: vec![],
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

impl From<crate::error::Result<BatchResponse>> for BatchReply {
    fn from(result: crate::error::Result<BatchResponse>) -> Self {
        match result {
            Ok(response) => Self::Completed(response),
            Err(e) => Self::rejected(&e),
        }
    }
}

/// Progress event broadcast while a batch runs.
#[derive(Debug, Clone)]
pub enum BatchEvent {
    BatchStarted {
        operations: usize,
        mode: ExecutionMode,
        max_concurrent: usize,
    },
    WaveStarted { wave: usize, size: usize },
    OperationStarted { id: String, tool: String, wave: usize },
    OperationFinished {
        id: String,
        status: OperationStatus,
        elapsed_ms: f64,
    },
    /// Never dispatched because a dependency failed or had not run.
    OperationSkipped {
        id: String,
        dependency: String,
        reason: String,
    },
    /// `stop_on_error` tripped; nothing further will be dispatched.
    BatchHalted { failed_id: String },
    BatchFinished { summary: ExecutionSummary },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn operation_defaults() {
        let op: Operation =
            serde_json::from_value(json!({"tool": "calculate", "arguments": {"expression": "2 + 2"}}))
                .unwrap();
        assert_eq!(op.tool, "calculate");
        assert!(op.depends_on.is_empty());
        assert!(op.result_mapping.is_none());
        assert!(op.timeout_ms.is_none());
        assert!(op.context.is_none());
        assert!(op.label.is_none());
        assert!(!op.id.is_empty());
        assert!(is_valid_operation_id(&op.id));
    }

    #[test]
    fn missing_arguments_default_to_empty_object() {
        let op: Operation = serde_json::from_value(json!({"id": "a", "tool": "t"})).unwrap();
        assert_eq!(op.arguments, json!({}));
    }

    #[test]
    fn operation_id_charset() {
        assert!(is_valid_operation_id("my_calc-2"));
        assert!(!is_valid_operation_id("my calc!"));
        assert!(!is_valid_operation_id("a.b"));
        assert!(!is_valid_operation_id(""));
    }

    #[test]
    fn execution_mode_parsing() {
        assert_eq!("auto".parse::<ExecutionMode>().unwrap(), ExecutionMode::Auto);
        assert!("dag".parse::<ExecutionMode>().is_err());
        let mode: ExecutionMode = serde_json::from_value(json!("sequential")).unwrap();
        assert_eq!(mode, ExecutionMode::Sequential);
        assert_eq!(ExecutionMode::default(), ExecutionMode::Auto);
    }

    #[test]
    fn success_result_carries_passthrough() {
        let op = Operation::new("op1", "calculate", json!({}))
            .with_label("Calculate bond PV")
            .with_context("ctx");
        let r = OperationResult::success(&op, json!({"result": 42})).at_wave(2, vec!["op0".into()]);
        assert!(r.succeeded());
        assert_eq!(r.label.as_deref(), Some("Calculate bond PV"));
        assert_eq!(r.context, Some(json!("ctx")));
        assert_eq!(r.wave, 2);
        assert!(r.error.is_none());

        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["status"], "success");
        assert!(v.get("error").is_none());
    }

    #[test]
    fn timeout_result_message() {
        let op = Operation::new("op1", "slow", json!({}));
        let r = OperationResult::timeout(&op, 100);
        assert_eq!(r.status, OperationStatus::Timeout);
        let err = r.error.unwrap();
        assert_eq!(err.kind, "timeout");
        assert!(err.message.contains("exceeded 100ms"));
        assert!(r.result.is_none());
    }

    #[test]
    fn summary_tally() {
        let op = Operation::new("a", "t", json!({}));
        let results = vec![
            OperationResult::success(&op, json!(1)),
            OperationResult::error(&op, ErrorDetail::new("execution_error", "boom")),
            OperationResult::timeout(&op, 10),
        ];
        let summary = ExecutionSummary::tally(&results, 12.5, 3);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.timed_out, 1);
        assert_eq!(summary.num_waves, 3);
    }

    #[test]
    fn rejected_reply_shape() {
        let err = BatchError::CircularDependency {
            cycle: vec!["op1".into(), "op2".into(), "op1".into()],
        };
        let reply = BatchReply::rejected(&err);
        assert!(reply.is_rejected());
        let v = serde_json::to_value(&reply).unwrap();
        assert_eq!(v["error"]["kind"], "circular_dependency");
        assert_eq!(v["results"], json!([]));
        assert!(v.get("summary").is_none());
    }
}
