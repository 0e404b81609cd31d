//! GroupNormalization fusion
//!
//! Replaces the decomposed group-normalization sub-graph with a single
//! `GroupNormalization` op. Pattern detected:
//!
//! ```text
//!   data ──┬─→ Reshape([N, G, ...]) → Mvn(axes) → Reshape(·, ShapeOf(data))
//!          │                                          ↓
//!          └─→ ShapeOf ───────────────────────────────┘
//!                                 Multiply(·, scale | Convert(scale))
//!                                     ↓
//!                                 Add(·, bias | Convert(bias))
//! ```
//!
//! Fused into `GroupNormalization(data, Squeeze(scale), Squeeze(bias))` with
//! `num_groups` taken from the pre-reshape target and `epsilon` from the Mvn.
//!
//! Guards: the feature dimension (`data` axis 1) and the group count must be
//! static, scale and bias must each hold exactly `feature_dim` elements, the
//! feature count must divide evenly into groups, and the Mvn must use the
//! inside-sqrt epsilon mode.

use crate::error::RewriteResult;
use crate::graph::{AttrMap, AttrValue, Graph, Value};
use crate::ops::OpKind;
use crate::pass::{Outcome, Pass};
use crate::pattern::{Binding, PatternBuilder, PatternTree};
use crate::rewrite::{commit_replacement, PassContext};

use super::common::{capture, static_numel};

/// Fuse decomposed group normalization into a `GroupNormalization` node
#[derive(Debug, Default)]
pub struct GroupNormFusion;

impl GroupNormFusion {
    /// Create the pass
    pub fn new() -> Self {
        Self
    }
}

impl Pass for GroupNormFusion {
    fn name(&self) -> &str {
        "group_norm_fusion"
    }

    fn pattern(&self) -> PatternTree {
        let mut p = PatternBuilder::new();

        let data = p.any_input();
        p.label(data, "data");
        let pre_reshape_const = p.constant();
        let pre_reshape = p.exact(OpKind::Reshape, &[data, pre_reshape_const]);
        p.label(pre_reshape, "pre_reshape");
        let axes_const = p.constant();
        let mvn = p.exact(OpKind::Mvn, &[pre_reshape, axes_const]);
        p.label(mvn, "mvn");
        let shapeof = p.exact(OpKind::ShapeOf, &[data]);
        let post_reshape = p.exact(OpKind::Reshape, &[mvn, shapeof]);

        let scale_in = p.any_input();
        p.label(scale_in, "scale_in");
        let scale_cvt = p.exact(OpKind::Convert, &[scale_in]);
        p.label(scale_cvt, "scale_cvt");
        let scale = p.or(&[scale_cvt, scale_in]);
        let mul = p.exact(OpKind::Multiply, &[post_reshape, scale]);

        let bias_in = p.any_input();
        p.label(bias_in, "bias_in");
        let bias_cvt = p.exact(OpKind::Convert, &[bias_in]);
        p.label(bias_cvt, "bias_cvt");
        let bias = p.or(&[bias_cvt, bias_in]);
        let add = p.exact(OpKind::Add, &[mul, bias]);

        p.finish(add)
    }

    fn rewrite(
        &self,
        graph: &mut Graph,
        binding: &Binding,
        _cx: &PassContext,
    ) -> RewriteResult<Outcome> {
        let data = capture(binding, "data")?;

        // Feature dim must be static.
        let feature_dim = match graph
            .value_shape(data)
            .and_then(|s| s.dim(1))
            .and_then(|d| d.value())
        {
            Some(f) => f,
            None => return Ok(Outcome::Rejected),
        };

        let scale_in = capture(binding, "scale_in")?;
        if static_numel(graph, scale_in) != Some(feature_dim) {
            return Ok(Outcome::Rejected);
        }
        let bias_in = capture(binding, "bias_in")?;
        if static_numel(graph, bias_in) != Some(feature_dim) {
            return Ok(Outcome::Rejected);
        }

        // Group count from the pre-reshape target, must divide the features.
        let pre_reshape = capture(binding, "pre_reshape")?;
        let num_groups = match graph
            .value_shape(pre_reshape)
            .and_then(|s| s.dim(1))
            .and_then(|d| d.value())
        {
            Some(g) if g > 0 => g,
            _ => return Ok(Outcome::Rejected),
        };
        if feature_dim % num_groups != 0 {
            return Ok(Outcome::Rejected);
        }

        let mvn = capture(binding, "mvn")?;
        let (eps_mode_ok, eps) = match graph.node(mvn.node) {
            Some(node) => (
                node.attr_s("eps_mode") == Some("inside_sqrt"),
                node.attr_f("eps"),
            ),
            None => (false, None),
        };
        if !eps_mode_ok {
            return Ok(Outcome::Rejected);
        }
        let eps = match eps {
            Some(e) => e,
            None => return Ok(Outcome::Rejected),
        };

        // All guards passed; from here on the commit must go through.
        let scale = binding.labeled("scale_cvt").unwrap_or(scale_in);
        let bias = binding.labeled("bias_cvt").unwrap_or(bias_in);

        let scale_name = producer_name(graph, scale);
        let scale_1d = graph.add_node(OpKind::Squeeze, "", &[scale])?;
        graph.set_rt_info(scale_1d, "fused_names_0", AttrValue::Str(scale_name));

        let bias_name = producer_name(graph, bias);
        let bias_1d = graph.add_node(OpKind::Squeeze, "", &[bias])?;
        graph.set_rt_info(bias_1d, "fused_names_0", AttrValue::Str(bias_name));

        let mut attrs = AttrMap::default();
        attrs.insert("num_groups".to_string(), AttrValue::Int(num_groups));
        attrs.insert("epsilon".to_string(), AttrValue::Float(eps));
        let group_norm = graph.add_node_with_attrs(
            OpKind::GroupNormalization,
            "",
            &[data, Value::new(scale_1d, 0), Value::new(bias_1d, 0)],
            attrs,
        )?;

        commit_replacement(graph, binding, group_norm)?;
        Ok(Outcome::Committed)
    }
}

fn producer_name(graph: &Graph, value: Value) -> String {
    graph
        .node(value.node)
        .map(|n| n.name().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeId;
    use crate::pass::Pipeline;
    use crate::types::{ElementType, Shape};

    /// The decomposed chain over X of shape [1, 12, 6, 8]
    fn decomposed_graph(num_groups: i64) -> (Graph, NodeId) {
        let mut g = Graph::new();
        let x = g.add_parameter("x", ElementType::F32, Shape::fixed(&[1, 12, 6, 8]));
        let pre_c = g.add_constant_ints("pre_shape", vec![1, num_groups, 3, -1]);
        let pre = g
            .add_node(OpKind::Reshape, "pre", &[Value::new(x, 0), Value::new(pre_c, 0)])
            .unwrap();
        let axes = g.add_constant_ints("axes", vec![2, 3]);
        let mut mvn_attrs = AttrMap::default();
        mvn_attrs.insert("eps".to_string(), AttrValue::Float(1e-5));
        mvn_attrs.insert("eps_mode".to_string(), AttrValue::Str("inside_sqrt".to_string()));
        let mvn = g
            .add_node_with_attrs(
                OpKind::Mvn,
                "mvn_0",
                &[Value::new(pre, 0), Value::new(axes, 0)],
                mvn_attrs,
            )
            .unwrap();
        let so = g.add_node(OpKind::ShapeOf, "shapeof", &[Value::new(x, 0)]).unwrap();
        let post = g
            .add_node(OpKind::Reshape, "post", &[Value::new(mvn, 0), Value::new(so, 0)])
            .unwrap();
        let scale = g.add_constant_floats("scale", Shape::fixed(&[1, 12, 1, 1]), vec![1.0; 12]);
        let mul = g
            .add_node(OpKind::Multiply, "mul_0", &[Value::new(post, 0), Value::new(scale, 0)])
            .unwrap();
        let bias = g.add_constant_floats("bias", Shape::fixed(&[1, 12, 1, 1]), vec![0.0; 12]);
        let add = g
            .add_node(OpKind::Add, "add_0", &[Value::new(mul, 0), Value::new(bias, 0)])
            .unwrap();
        g.mark_result(Value::new(add, 0));
        (g, x)
    }

    #[test]
    fn test_fuses_when_groups_divide_features() {
        let (mut g, x) = decomposed_graph(4);
        let stats = Pipeline::new().add(GroupNormFusion::new()).run(&mut g).unwrap();

        assert_eq!(stats.total_commits(), 1);
        // x, scale, bias, two squeezes, and the fused node remain.
        assert_eq!(g.node_count(), 6);

        let gn = g.results()[0].node;
        let node = g.node(gn).unwrap();
        assert_eq!(*node.kind(), OpKind::GroupNormalization);
        assert_eq!(node.name(), "add_0");
        assert_eq!(node.attr_i("num_groups"), Some(4));
        assert_eq!(node.attr_f("epsilon"), Some(1e-5));
        assert_eq!(node.inputs()[0], Value::new(x, 0));

        // Squeezed scale/bias feed ports 1 and 2.
        for port in 1..=2 {
            let producer = g.node(node.inputs()[port].node).unwrap();
            assert_eq!(*producer.kind(), OpKind::Squeeze);
        }
        assert!(g.validate().is_ok());
    }

    #[test]
    fn test_rejects_non_dividing_group_count() {
        let (mut g, _) = decomposed_graph(5);
        let before = g.dump();

        let stats = Pipeline::new().add(GroupNormFusion::new()).run(&mut g).unwrap();
        assert_eq!(stats.passes[0].matches, 1);
        assert_eq!(stats.total_commits(), 0);
        // 12 % 5 != 0: the whole chain survives byte for byte.
        assert_eq!(g.dump(), before);
    }

    #[test]
    fn test_rejects_wrong_eps_mode() {
        let (mut g, _) = decomposed_graph(4);
        // Flip the Mvn to the outside-sqrt mode.
        for id in g.node_ids().collect::<Vec<_>>() {
            if g.node(id).is_some_and(|n| *n.kind() == OpKind::Mvn) {
                if let Some(node) = g.node_mut(id) {
                    node.set_attr("eps_mode", AttrValue::Str("outside_sqrt".to_string()));
                }
            }
        }
        let before = g.dump();

        let stats = Pipeline::new().add(GroupNormFusion::new()).run(&mut g).unwrap();
        assert_eq!(stats.total_commits(), 0);
        assert_eq!(g.dump(), before);
    }

    #[test]
    fn test_scale_behind_convert() {
        let (mut g, _) = decomposed_graph(4);

        // Reroute the Multiply's scale operand through a Convert from f16.
        let scale16 = g.add_constant(
            "scale16",
            ElementType::F16,
            Shape::fixed(&[1, 12, 1, 1]),
            AttrValue::Floats(vec![1.0; 12]),
        );
        let mut attrs = AttrMap::default();
        attrs.insert("to".to_string(), AttrValue::Str("f32".to_string()));
        let cvt = g
            .add_node_with_attrs(OpKind::Convert, "cvt_scale", &[Value::new(scale16, 0)], attrs)
            .unwrap();
        let mul = g
            .node_ids()
            .find(|&id| g.node(id).is_some_and(|n| n.name() == "mul_0"))
            .unwrap();
        let old_scale = g.input_value(mul, 1).unwrap();
        g.replace_value_uses(old_scale, Value::new(cvt, 0));

        let stats = Pipeline::new().add(GroupNormFusion::new()).run(&mut g).unwrap();
        assert_eq!(stats.total_commits(), 1);

        // The Convert survives, feeding the squeezed scale.
        assert!(g.is_live(cvt));
        let gn = g.results()[0].node;
        let squeeze = g.node(g.node(gn).unwrap().inputs()[1].node).unwrap();
        assert_eq!(squeeze.inputs()[0], Value::new(cvt, 0));
        assert!(g.validate().is_ok());
    }
}
