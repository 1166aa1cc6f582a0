use wavebatch_core::types::ExecutionMode;

use crate::graph::DependencyGraph;

/// A group of operations dispatched together. Every operation in wave `k`
/// reaches a terminal state before wave `k + 1` starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wave {
    pub number: usize,
    /// Indices into the batch's operation list.
    pub operations: Vec<usize>,
}

/// Ordered dispatch plan for one batch.
#[derive(Debug, Clone)]
pub struct Schedule {
    pub mode: ExecutionMode,
    pub waves: Vec<Wave>,
    /// Upper bound on operations in flight at once.
    pub concurrency: usize,
    /// Whether an unsatisfied dependency prevents dispatch of its dependents.
    pub honors_dependencies: bool,
}

impl Schedule {
    pub fn plan(mode: ExecutionMode, graph: &DependencyGraph, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        match mode {
            ExecutionMode::Sequential => Self {
                mode,
                waves: (0..graph.len())
                    .map(|i| Wave {
                        number: i,
                        operations: vec![i],
                    })
                    .collect(),
                concurrency: 1,
                honors_dependencies: true,
            },
            ExecutionMode::Parallel => Self {
                mode,
                waves: vec![Wave {
                    number: 0,
                    operations: (0..graph.len()).collect(),
                }],
                concurrency: max_concurrent,
                honors_dependencies: false,
            },
            ExecutionMode::Auto => Self {
                mode,
                waves: graph
                    .waves()
                    .into_iter()
                    .enumerate()
                    .map(|(number, operations)| Wave { number, operations })
                    .collect(),
                concurrency: max_concurrent,
                honors_dependencies: true,
            },
        }
    }

    pub fn num_waves(&self) -> usize {
        self.waves.len()
    }

    /// Wave number of each operation, indexed like the operation list.
    pub fn wave_numbers(&self, len: usize) -> Vec<usize> {
        let mut numbers = vec![0; len];
        for wave in &self.waves {
            for &i in &wave.operations {
                numbers[i] = wave.number;
            }
        }
        numbers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wavebatch_core::types::Operation;

    fn graph() -> DependencyGraph {
        let ops = [
            Operation::new("op1", "add", json!({"a": 2, "b": 2})),
            Operation::new("op2", "mul", json!({"x": "$op1.result", "y": 2})),
            Operation::new("op3", "add", json!({})),
        ];
        DependencyGraph::build(&ops).unwrap()
    }

    #[test]
    fn auto_follows_graph_waves() {
        let s = Schedule::plan(ExecutionMode::Auto, &graph(), 4);
        assert_eq!(s.num_waves(), 2);
        assert_eq!(s.waves[0].operations, vec![0, 2]);
        assert_eq!(s.waves[1].operations, vec![1]);
        assert_eq!(s.concurrency, 4);
        assert!(s.honors_dependencies);
        assert_eq!(s.wave_numbers(3), vec![0, 1, 0]);
    }

    #[test]
    fn parallel_is_one_wave() {
        let s = Schedule::plan(ExecutionMode::Parallel, &graph(), 2);
        assert_eq!(s.num_waves(), 1);
        assert_eq!(s.waves[0].operations, vec![0, 1, 2]);
        assert!(!s.honors_dependencies);
        assert_eq!(s.wave_numbers(3), vec![0, 0, 0]);
    }

    #[test]
    fn sequential_is_caller_order_one_at_a_time() {
        let s = Schedule::plan(ExecutionMode::Sequential, &graph(), 8);
        assert_eq!(s.concurrency, 1);
        assert_eq!(s.num_waves(), 3);
        let order: Vec<usize> = s.waves.iter().flat_map(|w| w.operations.clone()).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn zero_concurrency_is_clamped() {
        let s = Schedule::plan(ExecutionMode::Parallel, &graph(), 0);
        assert_eq!(s.concurrency, 1);
    }
}
