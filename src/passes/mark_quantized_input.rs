//! Quantized-input marking
//!
//! Anchors on every `FakeQuantize` and walks its consumers to a bounded
//! depth; any `MatMul` or `Convolution` reached gets a `"quantized_input"`
//! runtime-info tag for downstream kernel selection. A metadata-only pass:
//! no node is created, rewired, or detached.

use crate::error::RewriteResult;
use crate::graph::{AttrValue, Graph, NodeId, Value};
use crate::ops::OpKind;
use crate::pass::{Outcome, Pass};
use crate::pattern::{Binding, PatternBuilder, PatternTree};
use crate::rewrite::PassContext;

/// Runtime-info key set on marked nodes
pub const QUANTIZED_INPUT_KEY: &str = "quantized_input";

/// Consumer-walk depth limit
const MAX_DEPTH: usize = 10;

/// Tag `MatMul`/`Convolution` nodes downstream of a `FakeQuantize`
#[derive(Debug, Default)]
pub struct MarkQuantizedInput;

impl MarkQuantizedInput {
    /// Create the pass
    pub fn new() -> Self {
        Self
    }

    /// Whether a node carries the quantized-input tag
    pub fn is_marked(graph: &Graph, id: NodeId) -> bool {
        graph
            .node(id)
            .and_then(|n| n.rt_info_get(QUANTIZED_INPUT_KEY))
            .and_then(AttrValue::as_bool)
            .unwrap_or(false)
    }
}

fn mark_downstream(graph: &mut Graph, id: NodeId, depth: usize) -> bool {
    if depth > MAX_DEPTH {
        return false;
    }
    let kind = match graph.node(id) {
        Some(node) => *node.kind(),
        None => return false,
    };
    if kind == OpKind::MatMul || kind == OpKind::Convolution {
        graph.set_rt_info(id, QUANTIZED_INPUT_KEY, AttrValue::Bool(true));
        return true;
    }

    let consumers: Vec<NodeId> = graph
        .consumers(Value::new(id, 0))
        .iter()
        .map(|port| port.node)
        .collect();
    let mut marked = false;
    for consumer in consumers {
        marked |= mark_downstream(graph, consumer, depth + 1);
    }
    marked
}

impl Pass for MarkQuantizedInput {
    fn name(&self) -> &str {
        "mark_quantized_input"
    }

    fn pattern(&self) -> PatternTree {
        let mut p = PatternBuilder::new();
        let data = p.any_input();
        let in_low = p.any_input();
        let in_high = p.any_input();
        let out_low = p.any_input();
        let out_high = p.any_input();
        let fq = p.exact(
            OpKind::FakeQuantize,
            &[data, in_low, in_high, out_low, out_high],
        );
        p.finish(fq)
    }

    fn rewrite(
        &self,
        graph: &mut Graph,
        binding: &Binding,
        _cx: &PassContext,
    ) -> RewriteResult<Outcome> {
        if mark_downstream(graph, binding.root_node(), 0) {
            Ok(Outcome::Committed)
        } else {
            Ok(Outcome::Rejected)
        }
    }
}
