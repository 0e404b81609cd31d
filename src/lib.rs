//! # dataflow-opt
//!
//! Sub-graph pattern matching and rewriting for dataflow computation graphs.
//!
//! The crate separates three concerns:
//!
//! - **Pattern Matching**: declarative pattern trees ([`pattern`]) matched
//!   against graph values, with symbolic dimension constraints
//! - **Commit Protocol**: atomic replacement of a matched sub-graph by a new
//!   node ([`rewrite`]), with provenance tracking and orphan cleanup
//! - **Pass Driving**: sweep/fixpoint orchestration of passes over a graph
//!   ([`pass`]), plus a set of shipped fusion passes ([`passes`])
//!
//! ## Example
//!
//! ```
//! use dataflow_opt::prelude::*;
//!
//! # fn main() -> RewriteResult<()> {
//! let mut graph = Graph::new();
//! let x = graph.add_parameter("x", ElementType::F32, Shape::fixed(&[1, 4, 8]));
//! let axes = graph.add_constant_ints("axes", vec![1, 2]);
//! let mvn = graph.add_node(OpKind::Mvn, "mvn", &[Value::new(x, 0), Value::new(axes, 0)])?;
//! let target = graph.add_constant_ints("target", vec![1, 32]);
//! let reshape = graph.add_node(
//!     OpKind::Reshape,
//!     "reshape",
//!     &[Value::new(mvn, 0), Value::new(target, 0)],
//! )?;
//! graph.mark_result(Value::new(reshape, 0));
//!
//! let stats = Pipeline::new().add(MvnReshapeFusion::new()).run(&mut graph)?;
//! assert_eq!(stats.total_commits(), 1);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod graph;
pub mod ops;
pub mod pass;
pub mod passes;
pub mod pattern;
pub mod rewrite;
pub mod types;

// ============================================================================
// Prelude module for convenient imports
// ============================================================================

/// Prelude module - import commonly used types with `use dataflow_opt::prelude::*`
pub mod prelude {
    pub use crate::error::{RewriteError, RewriteResult};
    pub use crate::graph::{AttrMap, AttrValue, Graph, Node, NodeId, Value};
    pub use crate::ops::{CustomOpId, OpKind, OpRegistry, OpSpec};
    pub use crate::pass::{Outcome, Pass, Pipeline, PipelineStats, Traversal};
    pub use crate::passes::{
        default_pipeline, CausalMaskFusion, GroupNormFusion, MarkQuantizedInput, MvnReshapeFusion,
        TransposeMatMulFusion,
    };
    pub use crate::pattern::{Binding, Matcher, PatternBuilder, PatternTree};
    pub use crate::rewrite::{commit_replacement, PassContext};
    pub use crate::types::{Dim, ElementType, Shape};
}

// ============================================================================
// Crate-level re-exports
// ============================================================================

pub use error::{RewriteError, RewriteResult};
pub use graph::Graph;
pub use pass::{Pass, Pipeline};
