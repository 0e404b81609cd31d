//! Shipped optimization passes
//!
//! Ready-to-use passes built on the pattern engine:
//!
//! - **Fusion**: collapse decomposed sub-graphs into single ops
//!   ([`GroupNormFusion`], [`MvnReshapeFusion`], [`CausalMaskFusion`])
//! - **Absorption**: fold producers into consumer configuration
//!   ([`TransposeMatMulFusion`])
//! - **Marking**: tag nodes with runtime info for downstream consumers
//!   ([`MarkQuantizedInput`])
//!
//! # Overview
//!
//! Each pass implements the [`Pass`](crate::pass::Pass) trait and can be run
//! individually through [`run_pass`](crate::pass::run_pass) or combined:
//!
//! ```ignore
//! use dataflow_opt::pass::Pipeline;
//! use dataflow_opt::passes::{GroupNormFusion, MvnReshapeFusion};
//!
//! let pipeline = Pipeline::new()
//!     .add(GroupNormFusion::new())
//!     .add(MvnReshapeFusion::new());
//! let stats = pipeline.run(&mut graph)?;
//! println!("committed {} rewrites", stats.total_commits());
//! ```

/// Causal-mask preprocessing fusion
pub mod causal_mask_fusion;
/// Shared helpers
pub mod common;
/// Decomposed group-normalization fusion
pub mod group_norm_fusion;
/// Quantized-input marking
pub mod mark_quantized_input;
/// MVN/Reshape folding
pub mod mvn_reshape_fusion;
/// Transpose absorption into MatMul flags
pub mod transpose_matmul_fusion;

pub use causal_mask_fusion::CausalMaskFusion;
pub use group_norm_fusion::GroupNormFusion;
pub use mark_quantized_input::MarkQuantizedInput;
pub use mvn_reshape_fusion::MvnReshapeFusion;
pub use transpose_matmul_fusion::TransposeMatMulFusion;

use crate::graph::Graph;
use crate::pass::Pipeline;

/// Default pipeline with every shipped pass, in the order the original
/// model-preparation flow applies them
///
/// Registers the custom operator kinds the passes emit on the graph's
/// registry.
pub fn default_pipeline(graph: &mut Graph) -> Pipeline {
    Pipeline::new()
        .add(MarkQuantizedInput::new())
        .add(GroupNormFusion::new())
        .add(MvnReshapeFusion::new())
        .add(TransposeMatMulFusion::new())
        .add(CausalMaskFusion::new(graph.registry_mut()))
}
