//! Graph mutation operations
//!
//! Rewiring and node removal. These are the only structural mutations; both
//! keep the consumer sets exact, which is what makes detachability checks in
//! the commit path a lookup instead of a traversal.

use crate::error::{RewriteError, RewriteResult};

use super::core::Graph;
use super::node::{AttrValue, Node, NodeId, Value};

impl Graph {
    /// Rewire every consumer (and graph result) of `old` to read `new`
    ///
    /// Positional: each consuming input port keeps its index, only the
    /// producing value changes.
    pub fn replace_value_uses(&mut self, old: Value, new: Value) {
        let ports = self.consumers_take(old);

        for port in &ports {
            if let Some(node) = self.node_mut(port.node) {
                if let Some(slot) = node.inputs.get_mut(port.index) {
                    *slot = new;
                }
            }
        }
        self.consumers_extend(new, ports);
        self.retarget_results(old, new);
    }

    fn retarget_results(&mut self, old: Value, new: Value) {
        for result in self.results_mut() {
            if *result == old {
                *result = new;
            }
        }
    }

    /// Remove a node whose outputs are no longer consumed
    ///
    /// Fails if any output still has a consumer or feeds a graph result —
    /// callers decide liveness through [`Graph::consumer_count`] first.
    pub fn remove_node(&mut self, id: NodeId) -> RewriteResult<Node> {
        let node = self
            .node(id)
            .ok_or_else(|| RewriteError::DanglingValue(id.to_string()))?;

        for port in 0..node.outputs().len() {
            if self.consumer_count(Value::new(id, port)) > 0 {
                return Err(RewriteError::InvariantViolation {
                    root: node.name().to_string(),
                    detail: format!("removing node with live consumers on port {port}"),
                });
            }
        }
        if self.feeds_result(id) {
            return Err(RewriteError::InvariantViolation {
                root: node.name().to_string(),
                detail: "removing node that feeds a graph result".to_string(),
            });
        }

        let node = self
            .take_node(id)
            .ok_or_else(|| RewriteError::DanglingValue(id.to_string()))?;
        for (index, &input) in node.inputs().iter().enumerate() {
            self.consumers_remove(input, id, index);
        }
        for port in 0..node.outputs().len() {
            self.consumers_drop_value(Value::new(id, port));
        }
        Ok(node)
    }

    /// Rename a node in place
    pub fn set_node_name(&mut self, id: NodeId, name: impl Into<String>) {
        if let Some(node) = self.node_mut(id) {
            node.name = name.into();
        }
    }

    /// Set a runtime-info entry on a node
    pub fn set_rt_info(&mut self, id: NodeId, key: impl Into<String>, value: AttrValue) {
        if let Some(node) = self.node_mut(id) {
            node.set_rt_info(key, value);
        }
    }
}
