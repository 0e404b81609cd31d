//! Transpose absorption into MatMul
//!
//! Absorbs `Transpose` producers that merely swap the two innermost axes
//! into the `MatMul`'s own transpose flags:
//!
//! ```text
//!   Transpose(a, [.., n-1, n-2]) ─┐
//!                                 ├─→ MatMul   ⇒   MatMul(a, b) with
//!   Transpose(b, [.., n-1, n-2]) ─┘                flipped transpose flags
//! ```
//!
//! Either operand may come through a transpose; `Or` patterns cover the
//! plain and transposed forms of each side. Operands already produced by a
//! transpose-of-a-transpose are left alone (the wildcard rejects transpose
//! producers), and a `MatMul` whose only consumer is itself a `Transpose`
//! is skipped so output-side handling stays with that consumer's match.

use crate::error::RewriteResult;
use crate::graph::{AttrMap, AttrValue, Graph, Value};
use crate::ops::OpKind;
use crate::pass::{Outcome, Pass, Traversal};
use crate::pattern::{pred, Binding, PatternBuilder, PatternTree};
use crate::rewrite::{commit_replacement, PassContext};

use super::common::{capture, is_innermost_swap};

/// Fold innermost-swap `Transpose` producers into `MatMul` flags
#[derive(Debug, Default)]
pub struct TransposeMatMulFusion;

impl TransposeMatMulFusion {
    /// Create the pass
    pub fn new() -> Self {
        Self
    }
}

impl TransposeMatMulFusion {
    /// Order constant of a matched transpose, if it swaps the innermost axes
    fn absorbable_order(graph: &Graph, order: Value) -> bool {
        graph
            .constant_ints(order)
            .is_some_and(is_innermost_swap)
    }
}

impl Pass for TransposeMatMulFusion {
    fn name(&self) -> &str {
        "transpose_matmul_fusion"
    }

    fn pattern(&self) -> PatternTree {
        let mut p = PatternBuilder::new();

        let input_a = p.any_input_where(pred::all(vec![
            pred::not_kind(OpKind::Transpose),
            pred::is_float(),
        ]));
        p.label(input_a, "input_a");
        let order_a = p.constant_where(pred::consumers_count(1));
        p.label(order_a, "order_a");
        let transpose_a = p.exact_where(OpKind::Transpose, &[input_a, order_a], pred::is_float());
        p.label(transpose_a, "transpose_a");
        let in_a = p.or(&[input_a, transpose_a]);

        let input_b = p.any_input_where(pred::all(vec![
            pred::not_kind(OpKind::Transpose),
            pred::is_float(),
        ]));
        p.label(input_b, "input_b");
        let order_b = p.constant_where(pred::consumers_count(1));
        p.label(order_b, "order_b");
        let transpose_b = p.exact_where(OpKind::Transpose, &[input_b, order_b], pred::is_float());
        p.label(transpose_b, "transpose_b");
        let in_b = p.or(&[input_b, transpose_b]);

        let matmul = p.exact(OpKind::MatMul, &[in_a, in_b]);
        p.finish(matmul)
    }

    fn traversal(&self) -> Traversal {
        Traversal::Topological
    }

    fn fixpoint(&self) -> bool {
        true
    }

    fn rewrite(
        &self,
        graph: &mut Graph,
        binding: &Binding,
        _cx: &PassContext,
    ) -> RewriteResult<Outcome> {
        let root = binding.root_value();

        // Output-side transposes are absorbed by matching that transpose's
        // own consumer chain, not here.
        let consumers = graph.consumers(root);
        if consumers.len() == 1
            && graph
                .node(consumers[0].node)
                .is_some_and(|n| *n.kind() == OpKind::Transpose)
        {
            return Ok(Outcome::Rejected);
        }

        let matched_a = binding.contains_label("transpose_a");
        let matched_b = binding.contains_label("transpose_b");
        if !matched_a && !matched_b {
            return Ok(Outcome::Rejected);
        }
        if matched_a && !Self::absorbable_order(graph, capture(binding, "order_a")?) {
            return Ok(Outcome::Rejected);
        }
        if matched_b && !Self::absorbable_order(graph, capture(binding, "order_b")?) {
            return Ok(Outcome::Rejected);
        }

        let (mut flag_a, mut flag_b) = match graph.node(root.node) {
            Some(node) => (
                node.attr_b("transpose_a").unwrap_or(false),
                node.attr_b("transpose_b").unwrap_or(false),
            ),
            None => return Ok(Outcome::Rejected),
        };
        flag_a ^= matched_a;
        flag_b ^= matched_b;

        let a = capture(binding, "input_a")?;
        let b = capture(binding, "input_b")?;

        let mut attrs = AttrMap::default();
        attrs.insert("transpose_a".to_string(), AttrValue::Bool(flag_a));
        attrs.insert("transpose_b".to_string(), AttrValue::Bool(flag_b));
        let fused = graph.add_node_with_attrs(OpKind::MatMul, "", &[a, b], attrs)?;

        commit_replacement(graph, binding, fused)?;
        Ok(Outcome::Committed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeId;
    use crate::pass::Pipeline;
    use crate::types::{ElementType, Shape};

    /// `MatMul(Transpose(a, order), b)` with `b`'s shape chosen to suit the
    /// transposed operand
    fn transposed_matmul(order: Vec<i64>, b_dims: &[i64]) -> (Graph, NodeId, NodeId) {
        let mut g = Graph::new();
        let a = g.add_parameter("a", ElementType::F32, Shape::fixed(&[2, 4, 8]));
        let ord = g.add_constant_ints("order", order);
        let t = g
            .add_node(OpKind::Transpose, "t_a", &[Value::new(a, 0), Value::new(ord, 0)])
            .unwrap();
        let b = g.add_parameter("b", ElementType::F32, Shape::fixed(b_dims));
        let mm = g
            .add_node(OpKind::MatMul, "mm_0", &[Value::new(t, 0), Value::new(b, 0)])
            .unwrap();
        g.mark_result(Value::new(mm, 0));
        (g, a, mm)
    }

    #[test]
    fn test_absorbs_innermost_swap() {
        let (mut g, a, _) = transposed_matmul(vec![0, 2, 1], &[2, 4, 16]);
        let stats = Pipeline::new().add(TransposeMatMulFusion::new()).run(&mut g).unwrap();

        assert_eq!(stats.total_commits(), 1);
        let fused = g.results()[0].node;
        let node = g.node(fused).unwrap();
        assert_eq!(*node.kind(), OpKind::MatMul);
        assert_eq!(node.name(), "mm_0");
        assert_eq!(node.attr_b("transpose_a"), Some(true));
        assert_eq!(node.attr_b("transpose_b"), Some(false));
        assert_eq!(node.inputs()[0], Value::new(a, 0));
        // Transpose and its order constant are gone.
        assert_eq!(g.node_count(), 3);
        // [2,8,4] x [2,4,16] with transpose_a keeps the output shape.
        assert_eq!(
            g.value_shape(Value::new(fused, 0)),
            Some(&Shape::fixed(&[2, 8, 16]))
        );
        assert!(g.validate().is_ok());
    }

    #[test]
    fn test_second_sweep_commits_nothing() {
        let (mut g, _, _) = transposed_matmul(vec![0, 2, 1], &[2, 4, 16]);
        let pipeline = Pipeline::new().add(TransposeMatMulFusion::new());
        let stats = pipeline.run(&mut g).unwrap();

        // Fixpoint: the rewritten MatMul matches again through the plain
        // alternatives but rejects, so exactly one extra sweep runs.
        assert_eq!(stats.passes[0].commits, 1);
        assert_eq!(stats.passes[0].sweeps, 2);

        let dump = g.dump();
        let stats = pipeline.run(&mut g).unwrap();
        assert_eq!(stats.total_commits(), 0);
        assert_eq!(g.dump(), dump);
    }

    #[test]
    fn test_rejects_general_permutation() {
        // [1, 0, 2] permutes a to [4, 2, 8]; b's batch dim follows suit so
        // the graph constructs and the rejection is the pass's own.
        let (mut g, _, _) = transposed_matmul(vec![1, 0, 2], &[4, 2, 16]);
        let before = g.dump();

        let stats = Pipeline::new().add(TransposeMatMulFusion::new()).run(&mut g).unwrap();
        assert_eq!(stats.total_commits(), 0);
        assert_eq!(g.dump(), before);
    }

    #[test]
    fn test_skips_matmul_feeding_single_transpose() {
        let mut g = Graph::new();
        let a = g.add_parameter("a", ElementType::F32, Shape::fixed(&[2, 4, 8]));
        let ord = g.add_constant_ints("order", vec![0, 2, 1]);
        let t = g
            .add_node(OpKind::Transpose, "t_a", &[Value::new(a, 0), Value::new(ord, 0)])
            .unwrap();
        let b = g.add_parameter("b", ElementType::F32, Shape::fixed(&[2, 4, 16]));
        let mm = g
            .add_node(OpKind::MatMul, "mm_0", &[Value::new(t, 0), Value::new(b, 0)])
            .unwrap();
        let out_ord = g.add_constant_ints("out_order", vec![0, 2, 1]);
        let t_out = g
            .add_node(
                OpKind::Transpose,
                "t_out",
                &[Value::new(mm, 0), Value::new(out_ord, 0)],
            )
            .unwrap();
        g.mark_result(Value::new(t_out, 0));

        let stats = Pipeline::new().add(TransposeMatMulFusion::new()).run(&mut g).unwrap();
        assert_eq!(stats.total_commits(), 0);
    }

    #[test]
    fn test_shared_transpose_is_preserved() {
        // A transpose with a second consumer outside the match survives the
        // commit; only the MatMul edge moves.
        let mut g = Graph::new();
        let a = g.add_parameter("a", ElementType::F32, Shape::fixed(&[2, 4, 8]));
        let ord = g.add_constant_ints("order", vec![0, 2, 1]);
        let t = g
            .add_node(OpKind::Transpose, "t_a", &[Value::new(a, 0), Value::new(ord, 0)])
            .unwrap();
        let b = g.add_parameter("b", ElementType::F32, Shape::fixed(&[2, 4, 16]));
        let mm = g
            .add_node(OpKind::MatMul, "mm_0", &[Value::new(t, 0), Value::new(b, 0)])
            .unwrap();
        let probe = g.add_node(OpKind::Squeeze, "probe", &[Value::new(t, 0)]).unwrap();
        g.mark_result(Value::new(mm, 0));
        g.mark_result(Value::new(probe, 0));

        // The order constant now has its single consumer but the transpose
        // has two; the order predicate still holds, so the match commits and
        // the transpose must survive for the probe.
        let stats = Pipeline::new().add(TransposeMatMulFusion::new()).run(&mut g).unwrap();
        assert_eq!(stats.total_commits(), 1);
        assert!(g.is_live(t));
        assert_eq!(g.input_value(probe, 0), Some(Value::new(t, 0)));
        assert!(g.validate().is_ok());
    }
}
