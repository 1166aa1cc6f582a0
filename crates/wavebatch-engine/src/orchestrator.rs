use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::task::{self, JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use wavebatch_core::config::AppConfig;
use wavebatch_core::error::{BatchError, Result};
use wavebatch_core::event::EventBus;
use wavebatch_core::types::{
    BatchEvent, BatchReply, BatchRequest, BatchResponse, ErrorDetail, ExecutionMode,
    ExecutionSummary, Operation, OperationResult,
};
use wavebatch_tools::ToolRegistry;

use crate::executor::OperationExecutor;
use crate::graph::DependencyGraph;
use crate::scheduler::Schedule;
use crate::store::ResultStore;

/// Effective options for one batch, after config defaults are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    pub mode: ExecutionMode,
    pub max_concurrent: usize,
    pub stop_on_error: bool,
}

/// Drives a batch from validation to aggregated response.
///
/// The registry is fixed at construction; orchestrators built over
/// different registries are fully independent.
pub struct BatchOrchestrator {
    registry: Arc<ToolRegistry>,
    config: AppConfig,
    event_bus: Option<Arc<EventBus>>,
}

impl BatchOrchestrator {
    pub fn new(registry: Arc<ToolRegistry>, config: AppConfig) -> Self {
        Self {
            registry,
            config,
            event_bus: None,
        }
    }

    /// Publish progress events on `bus`.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Request options with config defaults filled in.
    pub fn options_for(&self, request: &BatchRequest) -> BatchOptions {
        let defaults = &self.config.execution;
        BatchOptions {
            mode: request.execution_mode.unwrap_or(defaults.default_mode),
            max_concurrent: request.max_concurrent.unwrap_or(defaults.max_concurrent),
            stop_on_error: request.stop_on_error.unwrap_or(defaults.stop_on_error),
        }
    }

    /// Validate a request and compute its dispatch plan without running it.
    pub fn plan(&self, request: &BatchRequest) -> Result<(DependencyGraph, Schedule)> {
        let options = self.options_for(request);
        self.validate_request(request, &options)?;
        let graph = DependencyGraph::build(&request.operations)?;
        let schedule = Schedule::plan(options.mode, &graph, options.max_concurrent);
        Ok((graph, schedule))
    }

    /// Run a batch. Only batch-level validation failures are returned as
    /// `Err`; per-operation failures are part of the response.
    pub async fn execute(&self, request: BatchRequest) -> Result<BatchResponse> {
        let start = Instant::now();
        let options = self.options_for(&request);

        let (graph, schedule) = match self.plan(&request) {
            Ok(planned) => planned,
            Err(e) => {
                if e.is_graph_error() {
                    warn!(error = %e, "Batch rejected by dependency validation");
                } else {
                    warn!(error = %e, "Batch request rejected");
                }
                return Err(e);
            }
        };

        info!(
            operations = request.operations.len(),
            mode = %options.mode,
            max_concurrent = options.max_concurrent,
            stop_on_error = options.stop_on_error,
            num_waves = schedule.num_waves(),
            "Executing batch"
        );
        self.publish(BatchEvent::BatchStarted {
            operations: request.operations.len(),
            mode: options.mode,
            max_concurrent: schedule.concurrency,
        });

        let mut run = BatchRun::new(
            request.operations,
            &graph,
            &schedule,
            OperationExecutor::new(
                self.registry.clone(),
                self.config.execution.default_timeout_ms,
            ),
            options.stop_on_error,
            self.event_bus.clone(),
        );
        run.drive(&schedule).await;

        let results = run.into_results();
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        let summary = ExecutionSummary::tally(&results, elapsed_ms, schedule.num_waves());

        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            timed_out = summary.timed_out,
            elapsed_ms = summary.total_execution_time_ms,
            "Batch complete"
        );
        self.publish(BatchEvent::BatchFinished {
            summary: summary.clone(),
        });

        Ok(BatchResponse { results, summary })
    }

    /// `execute`, folded into the wire-level reply.
    pub async fn submit(&self, request: BatchRequest) -> BatchReply {
        self.execute(request).await.into()
    }

    fn validate_request(&self, request: &BatchRequest, options: &BatchOptions) -> Result<()> {
        let limits = &self.config.limits;
        if request.operations.is_empty() {
            return Err(BatchError::EmptyBatch);
        }
        if request.operations.len() > limits.max_operations {
            return Err(BatchError::TooManyOperations {
                count: request.operations.len(),
                max: limits.max_operations,
            });
        }
        if options.max_concurrent == 0 || options.max_concurrent > limits.max_concurrent {
            return Err(BatchError::InvalidConcurrency {
                value: options.max_concurrent,
                max: limits.max_concurrent,
            });
        }
        if let Some(op) = request
            .operations
            .iter()
            .find(|op| !self.registry.contains(&op.tool))
        {
            return Err(BatchError::UnknownTool {
                operation: op.id.clone(),
                tool: op.tool.clone(),
                available: self.registry.list().into_iter().map(String::from).collect(),
            });
        }
        Ok(())
    }

    fn publish(&self, event: BatchEvent) {
        if let Some(bus) = self.event_bus.as_ref().filter(|b| b.has_listeners()) {
            bus.publish(event);
        }
    }
}

/// Mutable state of one batch while it runs.
struct BatchRun {
    operations: Vec<Arc<Operation>>,
    dependencies: Vec<Vec<usize>>,
    waves: Vec<usize>,
    results: Vec<Option<OperationResult>>,
    store: ResultStore,
    executor: OperationExecutor,
    stop_on_error: bool,
    halted: bool,
    event_bus: Option<Arc<EventBus>>,
}

impl BatchRun {
    fn new(
        operations: Vec<Operation>,
        graph: &DependencyGraph,
        schedule: &Schedule,
        executor: OperationExecutor,
        stop_on_error: bool,
        event_bus: Option<Arc<EventBus>>,
    ) -> Self {
        let position = |id: &str| operations.iter().position(|op| op.id == id);
        let dependencies = graph
            .nodes()
            .iter()
            .map(|n| n.dependencies.iter().filter_map(|d| position(d)).collect())
            .collect();
        let len = operations.len();
        Self {
            dependencies,
            waves: schedule.wave_numbers(len),
            results: vec![None; len],
            operations: operations.into_iter().map(Arc::new).collect(),
            store: ResultStore::new(),
            executor,
            stop_on_error,
            halted: false,
            event_bus,
        }
    }

    async fn drive(&mut self, schedule: &Schedule) {
        for wave in &schedule.waves {
            if self.halted {
                break;
            }
            self.publish(BatchEvent::WaveStarted {
                wave: wave.number,
                size: wave.operations.len(),
            });
            debug!(wave = wave.number, size = wave.operations.len(), "Dispatching wave");

            let mut ready = Vec::with_capacity(wave.operations.len());
            for &i in &wave.operations {
                match self.blocker(i, schedule) {
                    Some((dep, detail)) => self.skip(i, dep, detail),
                    None => ready.push(i),
                }
            }

            self.run_wave(ready, schedule.concurrency).await;
        }
    }

    /// Dispatch `ready` with at most `concurrency` in flight, returning once
    /// every dispatched operation has finished.
    async fn run_wave(&mut self, ready: Vec<usize>, concurrency: usize) {
        let mut tasks: JoinSet<(usize, OperationResult)> = JoinSet::new();
        let mut pending = ready.into_iter();
        let mut spawned: HashMap<task::Id, usize> = HashMap::new();

        loop {
            while !self.halted && tasks.len() < concurrency {
                let Some(i) = pending.next() else { break };

                let op = Arc::clone(&self.operations[i]);
                let executor = self.executor.clone();
                let store = self.store.clone();
                self.publish(BatchEvent::OperationStarted {
                    id: op.id.clone(),
                    tool: op.tool.clone(),
                    wave: self.waves[i],
                });
                debug!(op_id = %op.id, tool = %op.tool, wave = self.waves[i], "Dispatching operation");

                let handle = tasks.spawn(async move { (i, executor.execute(&op, &store).await) });
                spawned.insert(handle.id(), i);
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };
            match joined {
                Ok((i, result)) => self.record(i, result).await,
                Err(e) => match spawned.get(&e.id()).copied() {
                    Some(i) => self.task_lost(i, &e).await,
                    None => error!(error = %e, "Unknown operation task failed to complete"),
                },
            }
        }
    }

    async fn record(&mut self, i: usize, result: OperationResult) {
        let result = result.at_wave(self.waves[i], self.dependency_ids(i));

        if result.succeeded() {
            if let Some(payload) = &result.result {
                self.store.publish(&result.id, payload.clone()).await;
            }
        } else if self.stop_on_error && !self.halted {
            self.halted = true;
            warn!(op_id = %result.id, status = %result.status, "Operation failed, halting batch");
            self.publish(BatchEvent::BatchHalted {
                failed_id: result.id.clone(),
            });
        }

        info!(
            op_id = %result.id,
            tool = %result.tool,
            wave = result.wave,
            status = %result.status,
            elapsed_ms = result.execution_time_ms,
            "Operation finished"
        );
        self.publish(BatchEvent::OperationFinished {
            id: result.id.clone(),
            status: result.status,
            elapsed_ms: result.execution_time_ms,
        });
        self.results[i] = Some(result);
    }

    /// Record a terminal error for an operation whose task never reported
    /// a result.
    async fn task_lost(&mut self, i: usize, err: &JoinError) {
        let op = &self.operations[i];
        error!(op_id = %op.id, error = %err, "Operation task failed to complete");
        let kind = if err.is_panic() { "panic" } else { "cancelled" };
        let result = OperationResult::error(
            op,
            ErrorDetail::new(kind, format!("operation task failed: {}", err)),
        );
        self.record(i, result).await;
    }

    /// The dependency that keeps `i` from being dispatched, with the error
    /// to record in its place.
    ///
    /// A failed dependency blocks in every mode that honors dependencies.
    /// Sequential mode also refuses to run ahead of a `depends_on` target
    /// that comes later in caller order. Token references to such a target
    /// are left to fail resolution inside the operation.
    fn blocker(&self, i: usize, schedule: &Schedule) -> Option<(usize, ErrorDetail)> {
        if !schedule.honors_dependencies {
            return None;
        }
        if let Some(dep) = self.failed_dependency(i) {
            let detail = ErrorDetail::dependency_failed(&self.operations[dep].id);
            return Some((dep, detail));
        }
        if schedule.mode != ExecutionMode::Sequential {
            return None;
        }
        let op = &self.operations[i];
        self.dependencies[i]
            .iter()
            .copied()
            .find(|&d| {
                self.results[d].is_none() && op.depends_on.contains(&self.operations[d].id)
            })
            .map(|d| (d, ErrorDetail::dependency_not_ready(&self.operations[d].id)))
    }

    /// First dependency of `i` that has already terminated unsuccessfully.
    fn failed_dependency(&self, i: usize) -> Option<usize> {
        self.dependencies[i].iter().copied().find(|&d| {
            self.results[d]
                .as_ref()
                .is_some_and(|r| r.status.is_failure())
        })
    }

    fn skip(&mut self, i: usize, dep: usize, detail: ErrorDetail) {
        let op = &self.operations[i];
        let dep_id = &self.operations[dep].id;
        info!(op_id = %op.id, dependency = %dep_id, kind = %detail.kind, "Skipping operation");
        self.publish(BatchEvent::OperationSkipped {
            id: op.id.clone(),
            dependency: dep_id.clone(),
            reason: detail.message.clone(),
        });
        let result = OperationResult::error(op, detail).at_wave(self.waves[i], self.dependency_ids(i));
        self.results[i] = Some(result);
    }

    fn dependency_ids(&self, i: usize) -> Vec<String> {
        self.dependencies[i]
            .iter()
            .map(|&d| self.operations[d].id.clone())
            .collect()
    }

    fn publish(&self, event: BatchEvent) {
        if let Some(bus) = self.event_bus.as_ref().filter(|b| b.has_listeners()) {
            bus.publish(event);
        }
    }

    /// Completed results in caller order.
    fn into_results(self) -> Vec<OperationResult> {
        self.results.into_iter().flatten().collect()
    }
}
