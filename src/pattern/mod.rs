//! Declarative sub-graph patterns and the matching engine
//!
//! A pass describes the shape it is looking for as a [`PatternTree`] built
//! from combinators, then the driver aligns that tree against candidate
//! anchor values with a [`Matcher`]. A successful alignment yields a
//! [`Binding`] mapping pattern nodes (and their labels) to concrete graph
//! values; a failed alignment yields nothing and leaves no trace.
//!
//! Matching is total-before-effect: the engine never mutates the graph, so
//! any number of failed attempts is observationally free.

pub mod matcher;
pub mod symbols;
pub mod tree;

pub use matcher::{Binding, Matcher};
pub use symbols::{SymbolId, SymbolTable};
pub use tree::{pred, DimExpr, PatternBuilder, PatternId, PatternTree, Predicate};
