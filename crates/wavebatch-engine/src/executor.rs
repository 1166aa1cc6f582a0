use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, warn};

use wavebatch_core::types::{ErrorDetail, Operation, OperationResult};
use wavebatch_tools::ToolRegistry;

use crate::resolver::Resolver;
use crate::store::ResultStore;

/// Runs a single operation: resolve, invoke with a deadline, classify.
///
/// Never fails. Every problem, from a bad reference token to a panicking
/// tool, comes back as an `error` or `timeout` result.
#[derive(Clone)]
pub struct OperationExecutor {
    registry: Arc<ToolRegistry>,
    default_timeout_ms: u64,
}

impl OperationExecutor {
    pub fn new(registry: Arc<ToolRegistry>, default_timeout_ms: u64) -> Self {
        Self {
            registry,
            default_timeout_ms,
        }
    }

    /// Deadline for `op`: its own `timeout_ms`, else the default.
    pub fn timeout_ms(&self, op: &Operation) -> u64 {
        op.timeout_ms.unwrap_or(self.default_timeout_ms)
    }

    pub async fn execute(&self, op: &Operation, store: &ResultStore) -> OperationResult {
        let start = Instant::now();
        let elapsed_ms = || start.elapsed().as_secs_f64() * 1000.0;

        // Guard is dropped before the tool runs.
        let prepared = {
            let results = store.read().await;
            prepare_arguments(op, &results)
        };
        let arguments = match prepared {
            Ok(args) => args,
            Err(detail) => {
                debug!(op_id = %op.id, error = %detail.message, "Argument resolution failed");
                return OperationResult::error(op, detail).with_elapsed_ms(elapsed_ms());
            }
        };

        let Some(tool) = self.registry.get(&op.tool) else {
            return OperationResult::error(
                op,
                ErrorDetail::new("tool_not_found", format!("Tool not found: {}", op.tool)),
            )
            .with_elapsed_ms(elapsed_ms());
        };

        let timeout_ms = self.timeout_ms(op);
        // Own task so a panicking tool surfaces as a JoinError, not a crash.
        let mut invocation = tokio::spawn(async move { tool.invoke(arguments).await });

        let deadline = Duration::from_millis(timeout_ms);
        let result = match tokio::time::timeout(deadline, &mut invocation).await {
            Ok(Ok(Ok(payload))) => {
                OperationResult::success(op, inject_context(payload, op.context.as_ref()))
            }
            Ok(Ok(Err(e))) => {
                debug!(op_id = %op.id, tool = %op.tool, error = %e, "Tool returned an error");
                OperationResult::error(op, (&e).into())
            }
            Ok(Err(join_error)) => {
                let message = if join_error.is_panic() {
                    panic_message(join_error.into_panic().as_ref())
                } else {
                    "tool task was cancelled".to_string()
                };
                warn!(op_id = %op.id, tool = %op.tool, error = %message, "Tool task failed");
                OperationResult::error(op, ErrorDetail::new("panic", message))
            }
            Err(_) => {
                invocation.abort();
                warn!(op_id = %op.id, tool = %op.tool, timeout_ms, "Operation timed out");
                OperationResult::timeout(op, timeout_ms)
            }
        };

        result.with_elapsed_ms(elapsed_ms())
    }
}

/// Resolve `arguments`, then merge the resolved `result_mapping` over them.
pub fn prepare_arguments(
    op: &Operation,
    results: &HashMap<String, Value>,
) -> Result<Value, ErrorDetail> {
    let resolver = Resolver::new(results);
    let mut arguments = resolver.resolve(&op.arguments).map_err(|e| ErrorDetail::from(&e))?;

    if let Some(mapping) = &op.result_mapping {
        let Value::Object(target) = &mut arguments else {
            return Err(ErrorDetail::new(
                "invalid_arguments",
                "result_mapping requires arguments to be a mapping",
            ));
        };
        for (key, value) in mapping {
            let resolved = resolver.resolve(value).map_err(|e| ErrorDetail::from(&e))?;
            target.insert(key.clone(), resolved);
        }
    }

    Ok(arguments)
}

/// Copy the operation's context into a mapping payload.
fn inject_context(payload: Value, context: Option<&Value>) -> Value {
    match (payload, context) {
        (Value::Object(mut map), Some(ctx)) => {
            map.insert("context".to_string(), ctx.clone());
            Value::Object(map)
        }
        (payload, _) => payload,
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("tool panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("tool panicked: {}", s)
    } else {
        "tool panicked".to_string()
    }
}
