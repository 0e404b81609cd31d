//! Shared helpers for the shipped passes

use crate::error::{RewriteError, RewriteResult};
use crate::graph::{Graph, Value};
use crate::pattern::Binding;

/// Labeled capture lookup that treats absence as a pass-authoring bug
pub fn capture(binding: &Binding, label: &str) -> RewriteResult<Value> {
    binding
        .labeled(label)
        .ok_or_else(|| RewriteError::MissingCapture(label.to_string()))
}

/// Total element count of a value, `None` unless fully static
pub fn static_numel(graph: &Graph, value: Value) -> Option<i64> {
    graph.value_shape(value).and_then(|s| s.numel())
}

/// Whether a transpose order is the identity with the two innermost axes
/// swapped, e.g. `[0, 1, 3, 2]`
pub fn is_innermost_swap(order: &[i64]) -> bool {
    let n = order.len();
    if n < 2 {
        return false;
    }
    order[..n - 2]
        .iter()
        .enumerate()
        .all(|(i, &axis)| axis == i as i64)
        && order[n - 2] == n as i64 - 1
        && order[n - 1] == n as i64 - 2
}
