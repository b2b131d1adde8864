//! The user-function contract (§6): `(inputs, context) → outputs`, all
//! mappings. The engine does not care whether a node's work is cooperative
//! or blocking/CPU-bound (§4.5, §9) — both shapes implement the same
//! `NodeFn` trait so the scheduler and node runner treat them identically.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::NodeId;

/// Context passed to a user function alongside its folded `inputs` mapping.
///
/// `state` is an immutable snapshot (§3): mutating it has no effect on the
/// engine's state store, by construction — there is no setter.
#[derive(Debug, Clone)]
pub struct NodeContext {
    pub superstep: u64,
    pub node_id: NodeId,
    pub state: Value,
}

/// A node's executable body. Implementations must be side-effect-free with
/// respect to the engine's state store and inboxes — a node communicates
/// only through its return value (§5, shared-resource policy).
#[async_trait]
pub trait NodeFn: Send + Sync {
    /// Run once with a folded `inputs` mapping, returning an `outputs`
    /// mapping. A non-`Ok` result that is not a JSON object is surfaced by
    /// the node runner as `InvalidOutput`; an `Err` is surfaced as `UserError`.
    async fn call(&self, inputs: Value, context: NodeContext) -> Result<Value, String>;
}

/// Adapts a plain async closure `Fn(Value, NodeContext) -> Future<Output = Result<Value, String>>`
/// into a `NodeFn`, so graphs can be built from closures without a bespoke
/// struct per node.
pub struct AsyncFnNode<F> {
    f: F,
}

impl<F, Fut> AsyncFnNode<F>
where
    F: Fn(Value, NodeContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, String>> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> NodeFn for AsyncFnNode<F>
where
    F: Fn(Value, NodeContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, String>> + Send + 'static,
{
    async fn call(&self, inputs: Value, context: NodeContext) -> Result<Value, String> {
        (self.f)(inputs, context).await
    }
}

/// Wraps a synchronous, potentially CPU-bound or blocking closure so it runs
/// on a dedicated blocking thread rather than stalling the scheduler's
/// cooperative pool (§4.5 step 2b, §9 coroutine-vs-thread dispatch).
pub struct BlockingFnNode<F> {
    f: Arc<F>,
}

impl<F> BlockingFnNode<F>
where
    F: Fn(Value, NodeContext) -> Result<Value, String> + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f: Arc::new(f) }
    }
}

#[async_trait]
impl<F> NodeFn for BlockingFnNode<F>
where
    F: Fn(Value, NodeContext) -> Result<Value, String> + Send + Sync + 'static,
{
    async fn call(&self, inputs: Value, context: NodeContext) -> Result<Value, String> {
        let f = Arc::clone(&self.f);
        tokio::task::spawn_blocking(move || f(inputs, context))
            .await
            .map_err(|e| format!("blocking node panicked: {e}"))?
    }
}

/// Type-erased handle to a node's executable body, as stored in `Node`.
pub type BoxedNodeFn = Arc<dyn NodeFn>;
