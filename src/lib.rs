//! # pregel-flow
//!
//! A Pregel-style, superstep-synchronized graph execution engine: user
//! functions as graph nodes, conditional edges for routing, a merge-aware
//! shared state store, and a bounded-retry node runner — the core described
//! in `SPEC_FULL.md`.
//!
//! ## Design principles
//!
//! - **Bulk synchronous parallel execution.** Every node with a pending
//!   message runs exactly once per superstep, in parallel with its peers;
//!   a hard barrier separates supersteps, so there is never a
//!   happens-before relationship between two nodes in the same superstep.
//! - **Explicit merge semantics.** Concurrent writes to the shared
//!   [`engine::StateStore`] are reconciled under a [`value::MergeStrategy`],
//!   either the engine-wide default or a per-key override.
//! - **Conditional, cycle-tolerant routing.** Edges fire based on a
//!   predicate over a node's output and the current state snapshot;
//!   self-edges and cycles are first-class, bounded by `max_iterations`.
//! - **Typed failure handling.** Timeouts and user errors are retried with
//!   exponential backoff; exhausted failures are isolated, propagated, or
//!   substituted per [`config::FailurePolicy`].
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use pregel_flow::{AsyncFnNode, Edge, Engine, EngineConfig, Graph, Node};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let a = Node::new("a", Arc::new(AsyncFnNode::new(|inputs, _ctx| async move {
//!     let v = inputs.get("v").and_then(|v| v.as_i64()).unwrap_or(0);
//!     Ok(json!({ "v": v + 1 }))
//! })));
//! let graph = Graph::builder("demo", "a").add_node(a).build().unwrap();
//!
//! let engine = Engine::new(graph, EngineConfig::default());
//! let result = engine.run(json!({ "v": 1 })).await;
//! assert_eq!(result.final_state["v"], json!(2));
//! # }
//! ```
//!
//! ## Main modules
//!
//! - [`graph`]: the immutable graph data model — [`graph::Graph`],
//!   [`graph::Node`], [`graph::Edge`], the `NodeFn` contract, and edge
//!   predicates.
//! - [`engine`]: the execution engine — [`engine::Engine`] (the superstep
//!   scheduler), [`engine::StateStore`], and [`engine::MessageBus`].
//! - [`config`]: [`config::EngineConfig`], [`config::FailurePolicy`],
//!   [`config::CancellationToken`].
//! - [`value`]: the dynamically-typed value model and [`value::MergeStrategy`].
//! - [`event`]: the lifecycle event bus observers subscribe to.
//! - [`error`]: the engine's error taxonomy.
//! - [`result`]: [`result::ExecutionResult`], the final-state-plus-trace
//!   envelope returned by a run.
//!
//! ## Out of scope
//!
//! The builder/decorator sugar, concrete node implementations (LLM
//! clients, HTTP tools), CLI/config-file loaders, and cross-process
//! persistence are external collaborators layered on top of this engine,
//! not part of it.

pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod graph;
pub mod logging;
pub mod result;
pub mod value;

pub use config::{CancellationToken, EngineConfig, EngineConfigBuilder, FailurePolicy};
pub use engine::{Engine, MessageBus, StateStore};
pub use error::{EngineError, GraphInvalid, MergeConflict, NodeErrorCause, NodeFailure};
pub use event::{dispatch, Event, NoopObserver, Observer};
pub use graph::{
    AsyncFnNode, BlockingFnNode, BoxedNodeFn, Edge, Graph, GraphBuilder, Node, NodeConfig,
    NodeContext, NodeFn, NodeId, Predicate,
};
pub use result::{ExecutionResult, NodeStats, TerminatedBy};
pub use value::{merge_values, MergeStrategy};
