//! MVN/Reshape folding
//!
//! Folds a `Reshape` following a two-input `Mvn` into the fused three-input
//! `Mvn` form carrying the target shape:
//!
//! ```text
//!   Mvn(data, axes) → Reshape(·, shape)   ⇒   Mvn(data, axes, shape)
//! ```
//!
//! The fused node keeps the Mvn's attributes and name, plus the reshape's
//! `special_zero` flag.

use crate::error::RewriteResult;
use crate::graph::{AttrValue, Graph};
use crate::ops::OpKind;
use crate::pass::{Outcome, Pass};
use crate::pattern::{Binding, PatternBuilder, PatternTree};
use crate::rewrite::{commit_replacement, PassContext};

use super::common::capture;

/// Fold `Reshape(Mvn(..), shape)` into a three-input `Mvn`
#[derive(Debug, Default)]
pub struct MvnReshapeFusion;

impl MvnReshapeFusion {
    /// Create the pass
    pub fn new() -> Self {
        Self
    }
}

impl Pass for MvnReshapeFusion {
    fn name(&self) -> &str {
        "mvn_reshape_fusion"
    }

    fn pattern(&self) -> PatternTree {
        let mut p = PatternBuilder::new();
        let data = p.any_input();
        p.label(data, "data");
        let axes = p.constant();
        p.label(axes, "axes");
        let mvn = p.exact(OpKind::Mvn, &[data, axes]);
        p.label(mvn, "mvn");
        let shape = p.any_input();
        p.label(shape, "shape");
        let reshape = p.exact(OpKind::Reshape, &[mvn, shape]);
        p.finish(reshape)
    }

    fn rewrite(
        &self,
        graph: &mut Graph,
        binding: &Binding,
        _cx: &PassContext,
    ) -> RewriteResult<Outcome> {
        let data = capture(binding, "data")?;
        let axes = capture(binding, "axes")?;
        let mvn = capture(binding, "mvn")?;
        let shape = capture(binding, "shape")?;

        // The fused form needs a resolvable target shape.
        let shape_resolvable = graph.constant_ints(shape).is_some()
            || graph
                .node(shape.node)
                .is_some_and(|n| *n.kind() == OpKind::ShapeOf);
        if !shape_resolvable {
            return Ok(Outcome::Rejected);
        }

        let (mut attrs, name) = match graph.node(mvn.node) {
            Some(node) => (node.attrs().clone(), node.name().to_string()),
            None => return Ok(Outcome::Rejected),
        };
        if let Some(special_zero) = graph
            .node(binding.root_node())
            .and_then(|n| n.attr_b("special_zero"))
        {
            attrs.insert("special_zero".to_string(), AttrValue::Bool(special_zero));
        }

        let fused = graph.add_node_with_attrs(OpKind::Mvn, name, &[data, axes, shape], attrs)?;
        commit_replacement(graph, binding, fused)?;
        Ok(Outcome::Committed)
    }
}
