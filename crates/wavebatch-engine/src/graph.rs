//! Dependency graph construction and validation.
//!
//! Edges come from two places: an operation's explicit `depends_on`, and
//! the reference tokens found in its `arguments` and `result_mapping`.
//! Once validated, every operation gets a wave number: 0 with no
//! dependencies, else one more than its deepest dependency.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::debug;

use wavebatch_core::error::{BatchError, Result};
use wavebatch_core::types::{is_valid_operation_id, Operation};

use crate::resolver::referenced_ids;

/// One operation's place in the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    pub id: String,
    /// Explicit dependencies first, in caller order, then inferred ones.
    pub dependencies: Vec<String>,
    pub wave: usize,
}

/// Validated, acyclic, layered dependency graph. Nodes keep the caller's
/// operation order.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: Vec<GraphNode>,
    index: HashMap<String, usize>,
    num_waves: usize,
}

/// `depends_on`, rejecting entries listed twice.
pub fn explicit_dependencies(op: &Operation) -> Result<Vec<String>> {
    let mut seen = HashSet::with_capacity(op.depends_on.len());
    for dep in &op.depends_on {
        if !seen.insert(dep.as_str()) {
            return Err(BatchError::DuplicateDependency {
                operation: op.id.clone(),
                dependency: dep.clone(),
            });
        }
    }
    Ok(op.depends_on.clone())
}

/// Ids referenced by tokens in `arguments` and `result_mapping`.
pub fn implicit_dependencies(op: &Operation) -> BTreeSet<String> {
    let mut ids = referenced_ids(&op.arguments);
    if let Some(mapping) = &op.result_mapping {
        for value in mapping.values() {
            ids.extend(referenced_ids(value));
        }
    }
    ids
}

impl DependencyGraph {
    /// Validate `operations` and lay them out in waves.
    ///
    /// Fails on the first invalid or duplicate id, duplicate `depends_on`
    /// entry, reference to an id outside the batch, or cycle.
    pub fn build(operations: &[Operation]) -> Result<Self> {
        let mut index = HashMap::with_capacity(operations.len());
        for (i, op) in operations.iter().enumerate() {
            if !is_valid_operation_id(&op.id) {
                return Err(BatchError::InvalidOperationId { id: op.id.clone() });
            }
            if index.insert(op.id.clone(), i).is_some() {
                return Err(BatchError::DuplicateOperationId { id: op.id.clone() });
            }
        }

        let mut nodes = Vec::with_capacity(operations.len());
        for op in operations {
            let mut dependencies = explicit_dependencies(op)?;
            if let Some(missing) = dependencies.iter().find(|d| !index.contains_key(*d)) {
                return Err(BatchError::UnknownDependency {
                    operation: op.id.clone(),
                    missing: missing.clone(),
                });
            }

            for id in implicit_dependencies(op) {
                if !index.contains_key(&id) {
                    return Err(BatchError::UnknownReference {
                        operation: op.id.clone(),
                        missing: id,
                    });
                }
                if !dependencies.contains(&id) {
                    dependencies.push(id);
                }
            }

            nodes.push(GraphNode {
                id: op.id.clone(),
                dependencies,
                wave: 0,
            });
        }

        let edges: Vec<Vec<usize>> = nodes
            .iter()
            .map(|n| n.dependencies.iter().map(|d| index[d]).collect())
            .collect();

        let order = CycleDetector::new(&nodes, &edges).topological_order()?;

        let mut num_waves = 0;
        for &i in &order {
            let wave = edges[i]
                .iter()
                .map(|&d| nodes[d].wave + 1)
                .max()
                .unwrap_or(0);
            nodes[i].wave = wave;
            num_waves = num_waves.max(wave + 1);
        }

        debug!(operations = nodes.len(), num_waves, "Dependency graph built");

        Ok(Self {
            nodes,
            index,
            num_waves,
        })
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn num_waves(&self) -> usize {
        self.num_waves
    }

    /// Operation indices grouped by wave, caller order within each wave.
    pub fn waves(&self) -> Vec<Vec<usize>> {
        let mut waves = vec![Vec::new(); self.num_waves];
        for (i, node) in self.nodes.iter().enumerate() {
            waves[node.wave].push(i);
        }
        waves
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Three-color depth-first search over dependency edges.
///
/// The walk keeps its own frame stack of `(node, next edge)` pairs, so a
/// long dependency chain costs heap rather than thread stack.
struct CycleDetector<'g> {
    nodes: &'g [GraphNode],
    edges: &'g [Vec<usize>],
    colors: Vec<Color>,
    stack: Vec<(usize, usize)>,
    order: Vec<usize>,
}

impl<'g> CycleDetector<'g> {
    fn new(nodes: &'g [GraphNode], edges: &'g [Vec<usize>]) -> Self {
        Self {
            nodes,
            edges,
            colors: vec![Color::White; nodes.len()],
            stack: Vec::new(),
            order: Vec::with_capacity(nodes.len()),
        }
    }

    /// Dependencies-first ordering, or the first cycle found.
    fn topological_order(mut self) -> Result<Vec<usize>> {
        for i in 0..self.nodes.len() {
            if self.colors[i] == Color::White {
                self.visit(i)?;
            }
        }
        Ok(self.order)
    }

    fn visit(&mut self, root: usize) -> Result<()> {
        self.colors[root] = Color::Gray;
        self.stack.push((root, 0));

        while let Some(frame) = self.stack.last_mut() {
            let (node, next) = *frame;
            let Some(&dep) = self.edges[node].get(next) else {
                self.stack.pop();
                self.colors[node] = Color::Black;
                self.order.push(node);
                continue;
            };
            frame.1 += 1;

            match self.colors[dep] {
                Color::White => {
                    self.colors[dep] = Color::Gray;
                    self.stack.push((dep, 0));
                }
                Color::Gray => return Err(self.cycle_through(dep)),
                Color::Black => {}
            }
        }
        Ok(())
    }

    fn cycle_through(&self, start: usize) -> BatchError {
        let from = self.stack.iter().position(|&(i, _)| i == start).unwrap_or(0);
        let mut cycle: Vec<String> = self.stack[from..]
            .iter()
            .map(|&(i, _)| self.nodes[i].id.clone())
            .collect();
        cycle.push(self.nodes[start].id.clone());
        BatchError::CircularDependency { cycle }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn op(id: &str) -> Operation {
        Operation::new(id, "calculate", json!({}))
    }

    #[test]
    fn independent_operations_share_wave_zero() {
        let g = DependencyGraph::build(&[op("a"), op("b"), op("c")]).unwrap();
        assert_eq!(g.num_waves(), 1);
        assert!(g.nodes().iter().all(|n| n.wave == 0 && n.dependencies.is_empty()));
        assert_eq!(g.waves(), vec![vec![0, 1, 2]]);
    }

    #[test]
    fn chain_gets_increasing_waves() {
        let ops = [
            op("c").depends_on(["b"]),
            op("b").depends_on(["a"]),
            op("a"),
        ];
        let g = DependencyGraph::build(&ops).unwrap();
        assert_eq!(g.node("a").unwrap().wave, 0);
        assert_eq!(g.node("b").unwrap().wave, 1);
        assert_eq!(g.node("c").unwrap().wave, 2);
        assert_eq!(g.num_waves(), 3);
        assert_eq!(g.waves(), vec![vec![2], vec![1], vec![0]]);
    }

    #[test]
    fn diamond_wave_is_one_past_deepest_dependency() {
        let ops = [
            op("root"),
            op("left").depends_on(["root"]),
            op("mid").depends_on(["left"]),
            op("join").depends_on(["root", "mid"]),
        ];
        let g = DependencyGraph::build(&ops).unwrap();
        assert_eq!(g.node("join").unwrap().wave, 3);
        for node in g.nodes() {
            for dep in &node.dependencies {
                assert!(node.wave > g.node(dep).unwrap().wave);
            }
        }
    }

    #[test]
    fn implicit_dependencies_from_arguments_and_mapping() {
        let mut mapping = serde_json::Map::new();
        mapping.insert("variables".into(), json!({"x": "$op1.result", "y": "$op2.result"}));
        let ops = [
            op("op1"),
            op("op2"),
            Operation::new("op3", "calculate", json!({"z": "$op1.values[0]"}))
                .with_result_mapping(mapping),
        ];
        let g = DependencyGraph::build(&ops).unwrap();
        let op3 = g.node("op3").unwrap();
        assert_eq!(op3.dependencies, vec!["op1", "op2"]);
        assert_eq!(op3.wave, 1);
        assert_eq!(g.num_waves(), 2);
    }

    #[test]
    fn explicit_and_implicit_are_merged_once() {
        let ops = [
            op("a"),
            op("b"),
            Operation::new("c", "t", json!({"x": "$a.result", "y": "$b"})).depends_on(["b"]),
        ];
        let g = DependencyGraph::build(&ops).unwrap();
        assert_eq!(g.node("c").unwrap().dependencies, vec!["b", "a"]);
    }

    #[test]
    fn two_node_cycle_is_rejected() {
        let ops = [op("op1").depends_on(["op2"]), op("op2").depends_on(["op1"])];
        let err = DependencyGraph::build(&ops).unwrap_err();
        assert!(err.to_string().contains("circular dependency"));
        match err {
            BatchError::CircularDependency { cycle } => {
                assert_eq!(cycle, vec!["op1", "op2", "op1"]);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn cycle_through_reference_tokens() {
        let ops = [
            Operation::new("a", "t", json!({"x": "$c.result"})),
            Operation::new("b", "t", json!({"x": "$a.result"})),
            Operation::new("c", "t", json!({"x": "$b.result"})),
        ];
        assert!(matches!(
            DependencyGraph::build(&ops),
            Err(BatchError::CircularDependency { .. })
        ));
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let err = DependencyGraph::build(&[op("a").depends_on(["a"])]).unwrap_err();
        assert_eq!(err.to_string(), "circular dependency detected: a -> a");
    }

    #[test]
    fn unknown_explicit_dependency() {
        let err = DependencyGraph::build(&[op("op1").depends_on(["nonexistent"])]).unwrap_err();
        assert!(err.to_string().contains("non-existent operations"));
        assert!(matches!(err, BatchError::UnknownDependency { ref missing, .. } if missing == "nonexistent"));
    }

    #[test]
    fn unknown_token_reference() {
        let ops = [Operation::new("op1", "t", json!({"x": "$ghost.result"}))];
        let err = DependencyGraph::build(&ops).unwrap_err();
        assert!(matches!(err, BatchError::UnknownReference { ref missing, .. } if missing == "ghost"));
    }

    #[test]
    fn malformed_tokens_do_not_create_edges() {
        let ops = [op("a"), Operation::new("b", "t", json!({"x": "$ a"}))];
        let g = DependencyGraph::build(&ops).unwrap();
        assert!(g.node("b").unwrap().dependencies.is_empty());
    }

    #[test]
    fn duplicate_dependency_entries() {
        let ops = [op("op1"), op("op2"), op("op3").depends_on(["op1", "op1", "op2"])];
        let err = DependencyGraph::build(&ops).unwrap_err();
        assert!(err.to_string().contains("Duplicate dependencies"));
    }

    #[test]
    fn deep_chain_builds_without_recursion() {
        let n = 10_000;
        let ops: Vec<Operation> = (0..n)
            .map(|i| {
                let o = op(&format!("op{}", i));
                if i + 1 < n {
                    o.depends_on([format!("op{}", i + 1)])
                } else {
                    o
                }
            })
            .collect();

        let g = DependencyGraph::build(&ops).unwrap();
        assert_eq!(g.num_waves(), n);
        assert_eq!(g.node("op0").unwrap().wave, n - 1);
        assert_eq!(g.node(&format!("op{}", n - 1)).unwrap().wave, 0);
    }

    #[test]
    fn cycle_closing_a_deep_chain_is_reported() {
        let n = 10_000;
        let ops: Vec<Operation> = (0..n)
            .map(|i| op(&format!("op{}", i)).depends_on([format!("op{}", (i + 1) % n)]))
            .collect();

        match DependencyGraph::build(&ops).unwrap_err() {
            BatchError::CircularDependency { cycle } => {
                assert_eq!(cycle.len(), n + 1);
                assert_eq!(cycle.first(), cycle.last());
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn invalid_and_duplicate_ids() {
        let err = DependencyGraph::build(&[op("my calc!")]).unwrap_err();
        assert!(err.to_string().contains("invalid characters"));

        let err = DependencyGraph::build(&[op("a"), op("a")]).unwrap_err();
        assert!(matches!(err, BatchError::DuplicateOperationId { .. }));
    }
}
