//! Shared per-pipeline-run state
//!
//! One [`PassContext`] lives for the duration of a pipeline run and is
//! handed to every rewrite callback. It carries the explicit cross-cutting
//! hooks the engine supports — node skipping, early stop, and an opt-in memo
//! cache — so passes never need hidden global state.

use std::cell::{Cell, RefCell};

use rustc_hash::FxHashMap;

use crate::graph::{AttrValue, Graph, NodeId};

/// Hook deciding whether a candidate anchor node should be skipped
pub type SkipHook = Box<dyn Fn(&Graph, NodeId) -> bool>;

/// Execution context threaded through a pipeline run
#[derive(Default)]
pub struct PassContext {
    skip: Option<SkipHook>,
    stop: Cell<bool>,
    memo: RefCell<FxHashMap<(&'static str, NodeId), AttrValue>>,
}

impl PassContext {
    /// Context with no hooks installed
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a skip hook consulted before every match attempt
    pub fn with_skip_hook(hook: SkipHook) -> Self {
        PassContext {
            skip: Some(hook),
            ..Self::default()
        }
    }

    /// Whether the driver should skip this anchor node
    pub fn should_skip(&self, graph: &Graph, node: NodeId) -> bool {
        self.skip.as_ref().is_some_and(|hook| hook(graph, node))
    }

    /// Ask the driver to stop after the current callback returns
    ///
    /// Stops the current pass's sweep and the rest of the pipeline; the
    /// graph keeps every commit made so far.
    pub fn request_stop(&self) {
        self.stop.set(true);
    }

    /// Whether a stop has been requested
    pub fn stop_requested(&self) -> bool {
        self.stop.get()
    }

    // ========================================================================
    // Memo cache
    // ========================================================================
    //
    // Keyed by (namespace, node) so independent passes cannot collide.
    // Entries for detached nodes go stale but can never alias a live node,
    // because node ids are not reused.

    /// Cached value for a node under a pass-chosen namespace
    pub fn memo_get(&self, namespace: &'static str, node: NodeId) -> Option<AttrValue> {
        self.memo.borrow().get(&(namespace, node)).cloned()
    }

    /// Cache a value for a node under a pass-chosen namespace
    pub fn memo_insert(&self, namespace: &'static str, node: NodeId, value: AttrValue) {
        self.memo.borrow_mut().insert((namespace, node), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ElementType, Shape};

    #[test]
    fn test_stop_flag() {
        let cx = PassContext::new();
        assert!(!cx.stop_requested());
        cx.request_stop();
        assert!(cx.stop_requested());
    }

    #[test]
    fn test_skip_hook() {
        let mut g = Graph::new();
        let x = g.add_parameter("x", ElementType::F32, Shape::fixed(&[4]));
        let skip_me = g.add_parameter("skip_me", ElementType::F32, Shape::fixed(&[4]));

        let cx = PassContext::with_skip_hook(Box::new(|g: &Graph, id| {
            g.node(id).is_some_and(|n| n.name().starts_with("skip_"))
        }));
        assert!(!cx.should_skip(&g, x));
        assert!(cx.should_skip(&g, skip_me));
    }

    #[test]
    fn test_memo_is_namespaced() {
        let mut g = Graph::new();
        let x = g.add_parameter("x", ElementType::F32, Shape::fixed(&[4]));

        let cx = PassContext::new();
        cx.memo_insert("triu", x, AttrValue::Bool(true));
        assert_eq!(cx.memo_get("triu", x), Some(AttrValue::Bool(true)));
        assert_eq!(cx.memo_get("other", x), None);
    }
}
