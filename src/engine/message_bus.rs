//! Message bus & inbox folding (§4.3): double-buffered per-node inbox maps,
//! atomically swapped at the superstep boundary. Nodes never publish to
//! `next_inboxes` directly (§5, shared-resource policy) — only the
//! scheduler writes to it, after evaluating outgoing edges.

use std::collections::HashMap;

use serde_json::Value;

use crate::graph::NodeId;
use crate::value::fold_inbox;

#[derive(Default)]
pub struct MessageBus {
    current: HashMap<NodeId, Vec<Value>>,
    next: HashMap<NodeId, Vec<Value>>,
}

impl MessageBus {
    /// Seed `current_inboxes = { start_node: [initial_state] }` (§4.6 init).
    pub fn seed(start: NodeId, initial_message: Value) -> Self {
        let mut current = HashMap::new();
        current.insert(start, vec![initial_message]);
        Self {
            current,
            next: HashMap::new(),
        }
    }

    /// Nodes with a non-empty current inbox — the active set (§4.6 step 1).
    pub fn active_nodes(&self) -> Vec<NodeId> {
        let mut active: Vec<NodeId> = self
            .current
            .iter()
            .filter(|(_, msgs)| !msgs.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        active.sort();
        active
    }

    pub fn is_quiescent(&self) -> bool {
        self.current.values().all(|msgs| msgs.is_empty())
    }

    /// Fold a node's current inbox into a single `inputs` mapping (§4.3).
    pub fn fold(&self, node: &str) -> Value {
        let messages = self.current.get(node).cloned().unwrap_or_default();
        fold_inbox(messages)
    }

    /// Append a fired edge's message to the target's next-superstep inbox
    /// (§4.6 step 6b). Appends happen in the scheduler's fixed evaluation
    /// order (ascending source-completion handling, then edge construction
    /// order), so two edges into the same target enqueue in that order.
    pub fn enqueue_next(&mut self, target: NodeId, message: Value) {
        self.next.entry(target).or_default().push(message);
    }

    /// Atomic swap at the superstep boundary (§4.3, §4.6 step 8): the
    /// next-superstep map becomes the current map, and a fresh empty map is
    /// ready to receive superstep N+2's messages.
    pub fn swap(&mut self) {
        self.current = std::mem::take(&mut self.next);
    }
}
