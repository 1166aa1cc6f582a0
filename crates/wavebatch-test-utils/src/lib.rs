//! Shared test utilities for wavebatch crates.
//!
//! Mock tools with controllable behavior, counters for asserting how often
//! and how concurrently tools ran, and small fixtures.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::{json, Value};
use tempfile::NamedTempFile;

use wavebatch_core::error::ToolError;
use wavebatch_core::traits::Tool;
use wavebatch_core::types::Operation;

type Handler = dyn Fn(Value) -> Result<Value, ToolError> + Send + Sync;

fn open_schema() -> Value {
    json!({"type": "object"})
}

/// Tool backed by a closure. The closure runs inside the returned future,
/// so a panicking handler panics where the executor can observe it.
pub struct MockTool {
    name: String,
    handler: Arc<Handler>,
}

impl MockTool {
    pub fn new<F>(name: &str, handler: F) -> Self
    where
        F: Fn(Value) -> Result<Value, ToolError> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            handler: Arc::new(handler),
        }
    }

    /// Returns its input unchanged.
    pub fn echo(name: &str) -> Self {
        Self::new(name, Ok)
    }

    /// Always returns `payload`.
    pub fn constant(name: &str, payload: Value) -> Self {
        Self::new(name, move |_| Ok(payload.clone()))
    }
}

impl Tool for MockTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Mock tool"
    }

    fn input_schema(&self) -> Value {
        open_schema()
    }

    fn invoke(&self, input: Value) -> BoxFuture<'_, Result<Value, ToolError>> {
        let handler = self.handler.clone();
        Box::pin(async move { handler(input) })
    }
}

/// Always fails with the configured error.
pub struct FailingTool {
    name: String,
    error: ToolError,
}

impl FailingTool {
    pub fn new(name: &str, error: ToolError) -> Self {
        Self {
            name: name.to_string(),
            error,
        }
    }
}

impl Tool for FailingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    fn input_schema(&self) -> Value {
        open_schema()
    }

    fn invoke(&self, _input: Value) -> BoxFuture<'_, Result<Value, ToolError>> {
        Box::pin(async move { Err(self.error.clone()) })
    }
}

/// Sleeps for a fixed delay, then succeeds with `{"slept_ms": delay}`.
pub struct SlowTool {
    name: String,
    delay_ms: u64,
}

impl SlowTool {
    pub fn new(name: &str, delay_ms: u64) -> Self {
        Self {
            name: name.to_string(),
            delay_ms,
        }
    }
}

impl Tool for SlowTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Sleeps before answering"
    }

    fn input_schema(&self) -> Value {
        open_schema()
    }

    fn invoke(&self, _input: Value) -> BoxFuture<'_, Result<Value, ToolError>> {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            Ok(json!({"slept_ms": self.delay_ms}))
        })
    }
}

/// Handle onto a [`CallCounter`]'s count, kept after the tool is moved
/// into a registry.
#[derive(Clone, Default)]
pub struct CallCount(Arc<AtomicUsize>);

impl CallCount {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counts invocations and answers `{"calls": n}`.
pub struct CallCounter {
    name: String,
    calls: CallCount,
}

impl CallCounter {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            calls: CallCount::default(),
        }
    }

    pub fn calls(&self) -> CallCount {
        self.calls.clone()
    }
}

impl Tool for CallCounter {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Counts invocations"
    }

    fn input_schema(&self) -> Value {
        open_schema()
    }

    fn invoke(&self, _input: Value) -> BoxFuture<'_, Result<Value, ToolError>> {
        Box::pin(async move {
            let n = self.calls.0.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(json!({"calls": n}))
        })
    }
}

/// Counters shared between a [`ConcurrencyProbe`] and the test.
#[derive(Default)]
pub struct ProbeStats {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl ProbeStats {
    /// Highest number of invocations seen running at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Records how many invocations overlap. Each call holds its slot for
/// `delay_ms` so that overlapping dispatches are observable.
pub struct ConcurrencyProbe {
    name: String,
    delay_ms: u64,
    stats: Arc<ProbeStats>,
}

impl ConcurrencyProbe {
    pub fn new(name: &str, delay_ms: u64) -> Self {
        Self {
            name: name.to_string(),
            delay_ms,
            stats: Arc::default(),
        }
    }

    pub fn stats(&self) -> Arc<ProbeStats> {
        self.stats.clone()
    }
}

impl Tool for ConcurrencyProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Measures overlapping invocations"
    }

    fn input_schema(&self) -> Value {
        open_schema()
    }

    fn invoke(&self, _input: Value) -> BoxFuture<'_, Result<Value, ToolError>> {
        Box::pin(async move {
            let stats = &self.stats;
            stats.calls.fetch_add(1, Ordering::SeqCst);
            let now = stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            stats.peak.fetch_max(now, Ordering::SeqCst);

            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;

            stats.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(json!({"in_flight": now}))
        })
    }
}

/// Shorthand for `Operation::new`.
pub fn op(id: impl Into<String>, tool: &str, arguments: Value) -> Operation {
    Operation::new(id, tool, arguments)
}

/// Write `content` to a temporary `.toml` file that lives as long as the
/// returned handle.
pub fn temp_config(content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("create temp config");
    file.write_all(content.as_bytes()).expect("write temp config");
    file
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counter_counts() {
        let counter = CallCounter::new("count");
        let calls = counter.calls();
        counter.invoke(json!({})).await.unwrap();
        let out = counter.invoke(json!({})).await.unwrap();
        assert_eq!(out, json!({"calls": 2}));
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn failing_tool_returns_its_error() {
        let tool = FailingTool::new("fail", ToolError::Domain("nope".into()));
        assert_eq!(tool.invoke(json!({})).await, Err(ToolError::Domain("nope".into())));
    }

    #[tokio::test]
    async fn probe_tracks_overlap() {
        let probe = Arc::new(ConcurrencyProbe::new("probe", 20));
        let stats = probe.stats();
        let (a, b) = tokio::join!(probe.invoke(json!({})), probe.invoke(json!({})));
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(stats.calls(), 2);
        assert_eq!(stats.peak(), 2);
    }

    #[test]
    fn temp_config_is_readable() {
        let file = temp_config("[execution]\nmax_concurrent = 3\n");
        let content = std::fs::read_to_string(file.path()).unwrap();
        assert!(content.contains("max_concurrent = 3"));
    }
}
