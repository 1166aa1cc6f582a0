//! Batch execution engine.
//!
//! A batch is a set of operations, each naming a tool. Operations may wait
//! on each other explicitly (`depends_on`) or implicitly by embedding
//! `$id.path` reference tokens in their arguments. The engine:
//!
//! 1. builds and validates the dependency graph ([`graph`]),
//! 2. lays it out as dispatch waves for the chosen mode ([`scheduler`]),
//! 3. runs each wave under a concurrency bound ([`orchestrator`]),
//!    resolving tokens against completed results ([`resolver`]) and
//!    invoking tools with a deadline ([`executor`]).

pub mod executor;
pub mod graph;
pub mod orchestrator;
pub mod resolver;
pub mod scheduler;
pub mod store;

pub use executor::OperationExecutor;
pub use graph::DependencyGraph;
pub use orchestrator::{BatchOptions, BatchOrchestrator};
pub use resolver::{parse_reference, referenced_ids, Reference, Resolver, Segment};
pub use scheduler::{Schedule, Wave};
pub use store::ResultStore;
