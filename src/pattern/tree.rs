//! Pattern trees and combinators
//!
//! A pattern is built declaratively through [`PatternBuilder`]; construction
//! never touches a graph. The combinators:
//!
//! - [`PatternBuilder::exact`] — match a node of one kind with exactly the
//!   given child patterns as inputs, in order
//! - [`PatternBuilder::any_input`] — match any single value; the recursion
//!   base case, nothing upstream of it is inspected
//! - [`PatternBuilder::or`] — alternatives tried left to right, first match
//!   wins; which alternative matched is recoverable from the binding
//! - [`PatternBuilder::constant`] — restricted to constant producers, for
//!   extracting literal payloads
//!
//! Patterns are DAG-shaped: a pattern node may feed several parents, and a
//! re-encountered pattern node must re-bind to the identical graph value.
//!
//! Predicates are pure functions of a candidate value (element type, shape,
//! producer identity); they must not mutate the graph and must be
//! idempotent. Shape constraints against named symbols are declared with
//! [`PatternBuilder::require_dim`].

use crate::graph::{Graph, Value};
use crate::ops::OpKind;

use super::symbols::SymbolId;

/// Index of a pattern node within its tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PatternId(pub(crate) usize);

/// Pure predicate over a candidate value
pub type Predicate = Box<dyn Fn(&Graph, Value) -> bool>;

/// Expected extent of one dimension
#[derive(Debug, Clone, Copy)]
pub enum DimExpr {
    /// Literal extent
    Lit(i64),
    /// Symbol bound on first observation, checked afterwards
    Sym(SymbolId),
}

#[derive(Debug)]
pub(crate) enum PatternKind {
    Exact { op: OpKind, inputs: Vec<PatternId> },
    Any,
    Or(Vec<PatternId>),
    Constant,
}

pub(crate) struct PatternNode {
    pub(crate) kind: PatternKind,
    pub(crate) predicate: Option<Predicate>,
    pub(crate) dims: Vec<(usize, DimExpr)>,
    pub(crate) label: Option<String>,
}

/// A complete pattern: combinator nodes plus one declared root
pub struct PatternTree {
    nodes: Vec<PatternNode>,
    root: PatternId,
    symbol_names: Vec<String>,
    labels: Vec<(String, PatternId)>,
}

impl PatternTree {
    pub(crate) fn node(&self, id: PatternId) -> &PatternNode {
        &self.nodes[id.0]
    }

    /// The root pattern node; matching starts here against one anchor value
    pub fn root(&self) -> PatternId {
        self.root
    }

    /// Number of declared symbols
    pub fn symbol_count(&self) -> usize {
        self.symbol_names.len()
    }

    /// Declared labels and the pattern nodes they name
    pub fn labels(&self) -> &[(String, PatternId)] {
        &self.labels
    }
}

/// Builder for [`PatternTree`]
///
/// Side-effect free; every method only records structure.
#[derive(Default)]
pub struct PatternBuilder {
    nodes: Vec<PatternNode>,
    symbol_names: Vec<String>,
}

impl PatternBuilder {
    /// Start an empty pattern
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, kind: PatternKind, predicate: Option<Predicate>) -> PatternId {
        let id = PatternId(self.nodes.len());
        self.nodes.push(PatternNode {
            kind,
            predicate,
            dims: Vec::new(),
            label: None,
        });
        id
    }

    /// Match any single value
    pub fn any_input(&mut self) -> PatternId {
        self.push(PatternKind::Any, None)
    }

    /// Match any single value satisfying a predicate
    pub fn any_input_where(&mut self, predicate: Predicate) -> PatternId {
        self.push(PatternKind::Any, Some(predicate))
    }

    /// Match a node of the given kind whose inputs match the child patterns
    /// in order (extra or missing inputs fail immediately)
    pub fn exact(&mut self, op: OpKind, inputs: &[PatternId]) -> PatternId {
        self.push(
            PatternKind::Exact {
                op,
                inputs: inputs.to_vec(),
            },
            None,
        )
    }

    /// [`Self::exact`] with an output predicate
    pub fn exact_where(&mut self, op: OpKind, inputs: &[PatternId], predicate: Predicate) -> PatternId {
        self.push(
            PatternKind::Exact {
                op,
                inputs: inputs.to_vec(),
            },
            Some(predicate),
        )
    }

    /// Match a constant producer
    pub fn constant(&mut self) -> PatternId {
        self.push(PatternKind::Constant, None)
    }

    /// Match a constant producer satisfying a predicate
    pub fn constant_where(&mut self, predicate: Predicate) -> PatternId {
        self.push(PatternKind::Constant, Some(predicate))
    }

    /// Alternatives tried left to right, first match wins
    pub fn or(&mut self, alternatives: &[PatternId]) -> PatternId {
        self.push(PatternKind::Or(alternatives.to_vec()), None)
    }

    /// Declare a named symbol usable in [`Self::require_dim`]
    pub fn symbol(&mut self, name: impl Into<String>) -> SymbolId {
        let id = SymbolId(self.symbol_names.len());
        self.symbol_names.push(name.into());
        id
    }

    /// Constrain one dimension of the value a pattern node binds to
    ///
    /// A dynamic dimension at that axis fails the match (fail closed).
    pub fn require_dim(&mut self, pattern: PatternId, axis: usize, expected: DimExpr) {
        self.nodes[pattern.0].dims.push((axis, expected));
    }

    /// Name a pattern node so the rewrite callback can look its binding up
    pub fn label(&mut self, pattern: PatternId, name: impl Into<String>) {
        self.nodes[pattern.0].label = Some(name.into());
    }

    /// Finish the pattern with the given root
    pub fn finish(self, root: PatternId) -> PatternTree {
        let labels = self
            .nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.label.clone().map(|l| (l, PatternId(i))))
            .collect();
        PatternTree {
            nodes: self.nodes,
            root,
            symbol_names: self.symbol_names,
            labels,
        }
    }
}

/// Ready-made predicates in the style pattern authors need most
pub mod pred {
    use super::Predicate;
    use crate::graph::Graph;
    use crate::ops::OpKind;

    /// Value has a floating-point element type
    pub fn is_float() -> Predicate {
        Box::new(|g: &Graph, v| g.value_type(v).is_some_and(|t| t.is_float()))
    }

    /// Value's producer is not of the given kind
    pub fn not_kind(op: OpKind) -> Predicate {
        Box::new(move |g: &Graph, v| g.node(v.node).is_some_and(|n| *n.kind() != op))
    }

    /// Dimension at `axis` is statically known
    pub fn static_dim(axis: usize) -> Predicate {
        Box::new(move |g: &Graph, v| {
            g.value_shape(v)
                .and_then(|s| s.dim(axis))
                .is_some_and(|d| d.is_static())
        })
    }

    /// Value has exactly `n` consuming input ports
    pub fn consumers_count(n: usize) -> Predicate {
        Box::new(move |g: &Graph, v| g.consumer_count(v) == n)
    }

    /// Value has the given rank
    pub fn rank(r: usize) -> Predicate {
        Box::new(move |g: &Graph, v| g.value_shape(v).is_some_and(|s| s.rank() == r))
    }

    /// All of the given predicates hold
    pub fn all(preds: Vec<Predicate>) -> Predicate {
        Box::new(move |g: &Graph, v| preds.iter().all(|p| p(g, v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_structure() {
        let mut p = PatternBuilder::new();
        let data = p.any_input();
        p.label(data, "data");
        let axes = p.constant();
        let mvn = p.exact(OpKind::Mvn, &[data, axes]);
        let tree = p.finish(mvn);

        assert_eq!(tree.root(), mvn);
        assert_eq!(tree.labels(), &[("data".to_string(), data)]);
        match &tree.node(mvn).kind {
            PatternKind::Exact { op, inputs } => {
                assert_eq!(*op, OpKind::Mvn);
                assert_eq!(inputs, &[data, axes]);
            }
            _ => panic!("expected exact pattern"),
        }
    }

    #[test]
    fn test_symbols_and_dims() {
        let mut p = PatternBuilder::new();
        let s = p.symbol("max_seq_len");
        let mask = p.constant();
        p.require_dim(mask, 2, DimExpr::Sym(s));
        p.require_dim(mask, 3, DimExpr::Sym(s));
        let tree = p.finish(mask);

        assert_eq!(tree.symbol_count(), 1);
        assert_eq!(tree.node(mask).dims.len(), 2);
    }
}
