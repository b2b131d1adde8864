//! The engine's value representation and merge semantics.
//!
//! State is dynamically typed from the engine's point of view: a mapping
//! from string keys to arbitrary values. `serde_json::Value` already has the
//! tagged-variant shape (mapping | sequence | string | number | bool | null)
//! this calls for, so it is reused directly rather than re-deriving an
//! equivalent enum.

use serde_json::{Map, Value};

/// Per-key rule for combining a new write with an existing value in the
/// state store (§3, §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeStrategy {
    /// New value replaces existing.
    Overwrite,
    /// Recursive deep merge for mappings, concatenation for lists,
    /// overwrite otherwise. The engine-wide default.
    #[default]
    Merge,
    /// Keep the existing value if present, else set.
    Ignore,
    /// Fail with a merge conflict if the key already exists.
    Reject,
}

/// Combine `existing` (may be absent) with `incoming` under `strategy`,
/// without REJECT's fallibility — callers that need REJECT's conflict
/// signal use `try_merge_into` instead.
pub fn merge_values(existing: Option<Value>, incoming: Value, strategy: MergeStrategy) -> Value {
    match (existing, strategy) {
        (None, _) => incoming,
        (Some(_), MergeStrategy::Overwrite) => incoming,
        (Some(old), MergeStrategy::Ignore) => old,
        (Some(old), MergeStrategy::Reject) => old, // conflict handled by caller
        (Some(old), MergeStrategy::Merge) => merge_recursive(old, incoming),
    }
}

/// The recursive `MERGE` rule from §4.2:
/// - mapping ⊕ mapping → recursive key-wise MERGE
/// - sequence ⊕ sequence → concatenation in write order
/// - scalar ⊕ anything → overwrite by the later write
/// - type mismatch (mapping ⊕ scalar) → overwrite by the later write
pub fn merge_recursive(old: Value, new: Value) -> Value {
    match (old, new) {
        (Value::Object(mut old_map), Value::Object(new_map)) => {
            for (key, new_val) in new_map {
                let merged = match old_map.remove(&key) {
                    Some(old_val) => merge_recursive(old_val, new_val),
                    None => new_val,
                };
                old_map.insert(key, merged);
            }
            Value::Object(old_map)
        }
        (Value::Array(mut old_seq), Value::Array(new_seq)) => {
            old_seq.extend(new_seq);
            Value::Array(old_seq)
        }
        (_, new) => new,
    }
}

/// Fold an ordered inbox of messages (each a full output mapping) into a
/// single `inputs` mapping, left-to-right under `MERGE` semantics (§4.3).
pub fn fold_inbox(messages: impl IntoIterator<Item = Value>) -> Value {
    let mut acc: Option<Value> = None;
    for msg in messages {
        acc = Some(match acc {
            None => msg,
            Some(prev) => merge_recursive(prev, msg),
        });
    }
    acc.unwrap_or_else(|| Value::Object(Map::new()))
}

/// True if `value` is a JSON object (the only shape a node's output may take
/// to be valid — see `InvalidOutput` in §4.5/§6).
pub fn is_mapping(value: &Value) -> bool {
    value.is_object()
}
