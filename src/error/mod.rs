//! Error types for dataflow-opt
//!
//! This module defines all error types used throughout the crate.
//!
//! Note the taxonomy: match failures, guard rejections, and symbol conflicts
//! are *expected* outcomes and never surface here — the matcher returns
//! `Option` and rewrite callbacks return [`Outcome`](crate::pass::Outcome).
//! `RewriteError` is reserved for graph-authoring bugs and invariant
//! violations, which abort the pipeline.

use thiserror::Error;

/// Main error type for graph rewriting operations
#[derive(Error, Debug)]
pub enum RewriteError {
    /// Node construction received the wrong number of inputs for its kind
    #[error("arity mismatch for {kind}: expected {expected}, got {got}")]
    ArityMismatch {
        /// Operation kind name
        kind: String,
        /// Expected input arity (rendered range)
        expected: String,
        /// Actual number of inputs
        got: usize,
    },

    /// A custom operation kind was used without being registered
    #[error("unregistered custom op kind: {0}")]
    UnregisteredOp(u32),

    /// An input references a dead or out-of-range node/port
    #[error("dangling value reference: {0}")]
    DanglingValue(String),

    /// Shape inference could not produce an output shape
    #[error("shape inference failed: {0}")]
    ShapeInference(String),

    /// A commit would produce a malformed graph
    ///
    /// Always indicates a defect in a pass's rewrite callback, never a
    /// property of valid input graphs.
    #[error("invariant violation at '{root}': {detail}")]
    InvariantViolation {
        /// Name of the match root node
        root: String,
        /// What went wrong
        detail: String,
    },

    /// A rewrite callback asked for a labeled capture the pattern never bound
    ///
    /// Indicates a mismatch between a pass's pattern and its callback.
    #[error("missing labeled capture: {0}")]
    MissingCapture(String),

    /// A pass failed; wraps the underlying error with diagnosis context
    #[error("pass '{pass}' failed at node '{root}': {source}")]
    Pass {
        /// Name of the offending pass
        pass: String,
        /// Name of the match root at the time of failure
        root: String,
        /// Underlying error
        #[source]
        source: Box<RewriteError>,
    },
}

/// Result type alias for rewrite operations
pub type RewriteResult<T> = Result<T, RewriteError>;
