//! Causal-mask preprocessing fusion
//!
//! Recognizes the attention-mask preparation chain language models emit
//! around a tiled upper-triangular constant and collapses it into one
//! registry-registered `CausalMaskPreprocess` op:
//!
//! ```text
//!   triu ─→ Tile ─→ Convert ─→ Multiply(·, -FLT_MAX) ─┬─→ Equal(·, 0) ──┐
//!                                                     │                 ↓
//!   mask ─→ Unsqueeze ─→ Convert ─→ Equal(·, 0) ──────┼─→ LogicalAnd    │
//!                                                     │        ↓        │
//!                                                     └─→ Select(and, -FLT_MAX, ·)
//! ```
//!
//! The mask side length appears twice in the triangular constant's shape
//! and is constrained with one `max_seq_len` symbol. The constant's payload
//! is verified to really be strictly upper triangular; that scan is linear
//! in the mask area, so its verdict is cached per constant in the run's
//! [`PassContext`] memo rather than in any pass-global state.

use crate::error::{RewriteError, RewriteResult};
use crate::graph::{AttrMap, AttrValue, Graph, OutputInfo, Value};
use crate::ops::{CustomOpId, OpKind, OpRegistry, OpSpec};
use crate::pass::{Outcome, Pass};
use crate::pattern::{Binding, DimExpr, PatternBuilder, PatternTree};
use crate::rewrite::{commit_replacement, PassContext};
use crate::types::{Dim, ElementType, Shape};

use super::common::capture;

/// Memo namespace for cached triangularity verdicts
const TRIU_MEMO: &str = "causal_mask_triu";

/// Fuse the causal-mask preparation chain into `CausalMaskPreprocess`
#[derive(Debug)]
pub struct CausalMaskFusion {
    op: CustomOpId,
}

impl CausalMaskFusion {
    /// Create the pass, registering the emitted op kind
    pub fn new(registry: &mut OpRegistry) -> Self {
        let op = registry.register(OpSpec {
            name: "CausalMaskPreprocess",
            min_inputs: 2,
            max_inputs: 2,
            infer: infer_causal_mask,
        });
        CausalMaskFusion { op }
    }

    /// Kind of the node this pass emits
    pub fn op_kind(&self) -> OpKind {
        OpKind::Custom(self.op)
    }
}

/// `CausalMaskPreprocess(attention_mask, triu)`: batch is runtime-sized,
/// the mask square comes from the triangular constant
fn infer_causal_mask(
    graph: &Graph,
    inputs: &[Value],
    _attrs: &AttrMap,
) -> RewriteResult<Vec<OutputInfo>> {
    let triu_shape = graph.value_shape(inputs[1]).ok_or_else(|| {
        RewriteError::DanglingValue(format!("{}:{}", inputs[1].node, inputs[1].port))
    })?;
    let side = triu_shape.dim(2).unwrap_or(Dim::Dynamic);
    let shape = Shape::from_dims([Dim::Dynamic, Dim::Static(1), side, side]);
    Ok(vec![OutputInfo::new(ElementType::F32, shape)])
}

/// Strictly upper triangular: zero on and below the diagonal, nonzero above
fn is_triu(payload: &[i64], side: usize) -> bool {
    if payload.len() != side * side {
        return false;
    }
    for y in 0..side {
        let row = &payload[y * side..(y + 1) * side];
        if row[..=y].iter().any(|&v| v != 0) {
            return false;
        }
        if row[y + 1..].iter().any(|&v| v == 0) {
            return false;
        }
    }
    true
}

fn is_neg_flt_max(graph: &Graph, value: Value) -> bool {
    graph
        .constant_floats(value)
        .is_some_and(|vals| vals == [-f32::MAX])
}

impl Pass for CausalMaskFusion {
    fn name(&self) -> &str {
        "causal_mask_fusion"
    }

    fn pattern(&self) -> PatternTree {
        let mut p = PatternBuilder::new();
        let max_seq_len = p.symbol("max_seq_len");

        let triu = p.constant();
        p.label(triu, "triu");
        p.require_dim(triu, 0, DimExpr::Lit(1));
        p.require_dim(triu, 1, DimExpr::Lit(1));
        p.require_dim(triu, 2, DimExpr::Sym(max_seq_len));
        p.require_dim(triu, 3, DimExpr::Sym(max_seq_len));

        let repeats = p.any_input();
        let tiled = p.exact(OpKind::Tile, &[triu, repeats]);
        let to_float = p.exact(OpKind::Convert, &[tiled]);
        let neg = p.constant();
        p.label(neg, "neg");
        let causal = p.exact(OpKind::Multiply, &[to_float, neg]);
        p.label(causal, "causal");

        let zero_mask = p.constant();
        let causal_zero = p.exact(OpKind::Equal, &[causal, zero_mask]);

        let attention_mask = p.any_input();
        p.label(attention_mask, "attention_mask");
        let unsqueeze_axes = p.constant();
        let unsqueezed = p.exact(OpKind::Unsqueeze, &[attention_mask, unsqueeze_axes]);
        let mask_float = p.exact(OpKind::Convert, &[unsqueezed]);
        let zero_pad = p.constant();
        let padding_zero = p.exact(OpKind::Equal, &[mask_float, zero_pad]);

        let both = p.exact(OpKind::LogicalAnd, &[causal_zero, padding_zero]);
        let fill = p.constant();
        p.label(fill, "fill");
        let select = p.exact(OpKind::Select, &[both, fill, causal]);

        p.finish(select)
    }

    fn rewrite(
        &self,
        graph: &mut Graph,
        binding: &Binding,
        cx: &PassContext,
    ) -> RewriteResult<Outcome> {
        if !is_neg_flt_max(graph, capture(binding, "neg")?)
            || !is_neg_flt_max(graph, capture(binding, "fill")?)
        {
            return Ok(Outcome::Rejected);
        }

        let triu = capture(binding, "triu")?;
        let side = match graph
            .value_shape(triu)
            .and_then(|s| s.dim(2))
            .and_then(|d| d.value())
        {
            Some(s) if s > 0 => s as usize,
            _ => return Ok(Outcome::Rejected),
        };

        // The payload scan is quadratic in the mask side; cache the verdict
        // per constant for the rest of the run.
        let triangular = match cx.memo_get(TRIU_MEMO, triu.node).and_then(|v| v.as_bool()) {
            Some(cached) => cached,
            None => {
                let verdict = graph
                    .constant_ints(triu)
                    .is_some_and(|payload| is_triu(payload, side));
                cx.memo_insert(TRIU_MEMO, triu.node, AttrValue::Bool(verdict));
                verdict
            }
        };
        if !triangular {
            return Ok(Outcome::Rejected);
        }

        let attention_mask = capture(binding, "attention_mask")?;
        let fused = graph.add_node(self.op_kind(), "", &[attention_mask, triu])?;
        commit_replacement(graph, binding, fused)?;
        Ok(Outcome::Committed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeId;
    use crate::pass::Pipeline;

    /// Row-major strictly-upper-triangular payload of the given side
    fn triu_payload(side: usize) -> Vec<i64> {
        let mut payload = vec![0i64; side * side];
        for y in 0..side {
            for x in (y + 1)..side {
                payload[y * side + x] = 1;
            }
        }
        payload
    }

    fn mask_chain(g: &mut Graph, triu_payload: Vec<i64>, rows: i64, cols: i64) -> NodeId {
        let triu = g.add_constant(
            "triu",
            ElementType::U8,
            Shape::fixed(&[1, 1, rows, cols]),
            AttrValue::Ints(triu_payload),
        );
        let reps = g.add_constant_ints("reps", vec![2, 1, 1, 1]);
        let tiled = g
            .add_node(OpKind::Tile, "tile", &[Value::new(triu, 0), Value::new(reps, 0)])
            .unwrap();
        let mut to_f32 = AttrMap::default();
        to_f32.insert("to".to_string(), AttrValue::Str("f32".to_string()));
        let cvt = g
            .add_node_with_attrs(OpKind::Convert, "to_float", &[Value::new(tiled, 0)], to_f32.clone())
            .unwrap();
        let neg = g.add_constant_floats("neg", Shape::fixed(&[1, 1, 1, 1]), vec![-f32::MAX]);
        let causal = g
            .add_node(OpKind::Multiply, "causal", &[Value::new(cvt, 0), Value::new(neg, 0)])
            .unwrap();

        let zero_a = g.add_constant_floats("zero_a", Shape::fixed(&[1, 1, 1, 1]), vec![0.0]);
        let eq_causal = g
            .add_node(OpKind::Equal, "eq_causal", &[Value::new(causal, 0), Value::new(zero_a, 0)])
            .unwrap();

        let mask = g.add_parameter("attention_mask", ElementType::I32, Shape::fixed(&[2, cols]));
        let axes = g.add_constant_ints("unsq_axes", vec![1, 2]);
        let unsq = g
            .add_node(OpKind::Unsqueeze, "unsq", &[Value::new(mask, 0), Value::new(axes, 0)])
            .unwrap();
        let mask_f = g
            .add_node_with_attrs(OpKind::Convert, "mask_f", &[Value::new(unsq, 0)], to_f32)
            .unwrap();
        let zero_b = g.add_constant_floats("zero_b", Shape::fixed(&[1, 1, 1, 1]), vec![0.0]);
        let eq_pad = g
            .add_node(OpKind::Equal, "eq_pad", &[Value::new(mask_f, 0), Value::new(zero_b, 0)])
            .unwrap();

        let both = g
            .add_node(
                OpKind::LogicalAnd,
                "both",
                &[Value::new(eq_causal, 0), Value::new(eq_pad, 0)],
            )
            .unwrap();
        let fill = g.add_constant_floats("fill", Shape::fixed(&[1, 1, 1, 1]), vec![-f32::MAX]);
        let select = g
            .add_node(
                OpKind::Select,
                "masked_fill",
                &[Value::new(both, 0), Value::new(fill, 0), Value::new(causal, 0)],
            )
            .unwrap();
        g.mark_result(Value::new(select, 0));
        select
    }

    #[test]
    fn test_fuses_triangular_mask_chain() {
        let mut g = Graph::new();
        let pass = CausalMaskFusion::new(g.registry_mut());
        let emitted = pass.op_kind();
        mask_chain(&mut g, triu_payload(4), 4, 4);

        let stats = Pipeline::new().add(pass).run(&mut g).unwrap();
        assert_eq!(stats.total_commits(), 1);

        let fused = g.results()[0].node;
        let node = g.node(fused).unwrap();
        assert_eq!(*node.kind(), emitted);
        assert_eq!(node.name(), "masked_fill");
        // Inputs are the raw mask and the surviving triangular constant.
        assert_eq!(node.inputs().len(), 2);
        let triu = g.node(node.inputs()[1].node).unwrap();
        assert_eq!(*triu.kind(), OpKind::Constant);
        assert_eq!(triu.name(), "triu");
        // mask, triu, fused: everything else is detached.
        assert_eq!(g.node_count(), 3);
        assert!(g.validate().is_ok());
    }

    #[test]
    fn test_rejects_non_triangular_constant() {
        let mut g = Graph::new();
        let pass = CausalMaskFusion::new(g.registry_mut());
        let mut payload = triu_payload(4);
        // A single one on the diagonal breaks triangularity.
        payload[0] = 1;
        mask_chain(&mut g, payload, 4, 4);
        let before = g.dump();

        let stats = Pipeline::new().add(pass).run(&mut g).unwrap();
        assert_eq!(stats.passes[0].matches, 1);
        assert_eq!(stats.total_commits(), 0);
        assert_eq!(g.dump(), before);
    }

    #[test]
    fn test_rejects_rectangular_mask() {
        // Unequal side lengths fail the max_seq_len symbol before the
        // callback ever runs.
        let mut g = Graph::new();
        let pass = CausalMaskFusion::new(g.registry_mut());
        mask_chain(&mut g, vec![0; 32], 4, 8);

        let stats = Pipeline::new().add(pass).run(&mut g).unwrap();
        assert_eq!(stats.passes[0].matches, 0);
        assert_eq!(stats.total_commits(), 0);
    }

    #[test]
    fn test_triu_predicate() {
        assert!(is_triu(&triu_payload(3), 3));
        assert!(!is_triu(&[1, 1, 0, 1], 2));
        assert!(!is_triu(&[0, 0, 0, 0], 2));
        assert!(!is_triu(&triu_payload(3), 2));
    }
}
