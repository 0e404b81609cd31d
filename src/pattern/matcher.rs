//! Pattern matching engine
//!
//! Aligns one [`PatternTree`] against one anchor value by recursive descent,
//! producing a [`Binding`] or failing with zero graph side effects. Failure
//! is a normal control-flow outcome (`None`), never an error.
//!
//! `Or` alternatives are tried left to right against a checkpoint of both
//! the partial binding and the symbol table, so a failed alternative cannot
//! leak partial state. The whole binding is validated before any rewrite
//! logic runs — there is no partial rewiring on a partial match.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;

use crate::graph::{Graph, NodeId, Value};

use super::symbols::{SymbolId, SymbolTable};
use super::tree::{DimExpr, PatternId, PatternKind, PatternTree};

/// Result of a successful match
///
/// Insertion-ordered map from pattern nodes to the concrete values they
/// matched (the root is always first), plus the final symbol bindings.
/// Created fresh per match attempt and discarded after the rewrite callback
/// runs, whether or not a commit happened.
#[derive(Debug, Clone)]
pub struct Binding {
    map: IndexMap<PatternId, Value>,
    labels: FxHashMap<String, PatternId>,
    symbols: SymbolTable,
    root: Value,
}

impl Binding {
    /// Value bound to a pattern node
    pub fn value(&self, pattern: PatternId) -> Option<Value> {
        self.map.get(&pattern).copied()
    }

    /// Producer node bound to a pattern node
    pub fn node(&self, pattern: PatternId) -> Option<NodeId> {
        self.value(pattern).map(|v| v.node)
    }

    /// Whether the pattern node participated in the match
    ///
    /// For `Or` alternatives this is how callbacks learn which branch won:
    /// only the matching alternative is present.
    pub fn contains(&self, pattern: PatternId) -> bool {
        self.map.contains_key(&pattern)
    }

    /// Value bound to a labeled pattern node
    pub fn labeled(&self, label: &str) -> Option<Value> {
        self.labels.get(label).and_then(|&p| self.value(p))
    }

    /// Whether a labeled pattern node participated in the match
    pub fn contains_label(&self, label: &str) -> bool {
        self.labels.get(label).is_some_and(|&p| self.contains(p))
    }

    /// The anchor value the root matched
    pub fn root_value(&self) -> Value {
        self.root
    }

    /// The match root node
    pub fn root_node(&self) -> NodeId {
        self.root.node
    }

    /// Final value of a symbol
    pub fn symbol(&self, symbol: SymbolId) -> Option<i64> {
        self.symbols.get(symbol)
    }

    /// Distinct matched nodes in match order (root first)
    pub fn matched_nodes(&self) -> Vec<NodeId> {
        let mut nodes = Vec::with_capacity(self.map.len());
        for value in self.map.values() {
            if !nodes.contains(&value.node) {
                nodes.push(value.node);
            }
        }
        nodes
    }

    /// Number of bound pattern nodes
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the binding is empty (never true for a successful match)
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Matcher for one pattern against one graph
pub struct Matcher<'a> {
    graph: &'a Graph,
    tree: &'a PatternTree,
}

impl<'a> Matcher<'a> {
    /// Create a matcher
    pub fn new(graph: &'a Graph, tree: &'a PatternTree) -> Self {
        Matcher { graph, tree }
    }

    /// Try to align the pattern root against the given anchor value
    pub fn match_at(&self, anchor: Value) -> Option<Binding> {
        let mut map = IndexMap::new();
        let mut symbols = SymbolTable::new(self.tree.symbol_count());

        if !self.try_match(self.tree.root(), anchor, &mut map, &mut symbols) {
            return None;
        }

        let labels = self
            .tree
            .labels()
            .iter()
            .map(|(name, id)| (name.clone(), *id))
            .collect();

        Some(Binding {
            map,
            labels,
            symbols,
            root: anchor,
        })
    }

    fn try_match(
        &self,
        pattern: PatternId,
        candidate: Value,
        map: &mut IndexMap<PatternId, Value>,
        symbols: &mut SymbolTable,
    ) -> bool {
        // Re-encounter of a DAG-shaped pattern node: must re-bind identically.
        if let Some(&bound) = map.get(&pattern) {
            return bound == candidate;
        }

        let node = self.tree.node(pattern);

        for &(axis, expected) in &node.dims {
            let dim = match self.graph.value_shape(candidate).and_then(|s| s.dim(axis)) {
                Some(d) => d,
                None => return false,
            };
            // Fail closed on dynamic dimensions.
            let observed = match dim.value() {
                Some(v) => v,
                None => return false,
            };
            let ok = match expected {
                DimExpr::Lit(expected) => observed == expected,
                DimExpr::Sym(symbol) => symbols.bind_or_check(symbol, observed),
            };
            if !ok {
                return false;
            }
        }

        if let Some(predicate) = &node.predicate {
            if !predicate(self.graph, candidate) {
                return false;
            }
        }

        match &node.kind {
            PatternKind::Any => {
                map.insert(pattern, candidate);
                true
            }

            PatternKind::Constant => {
                let is_const = self
                    .graph
                    .node(candidate.node)
                    .is_some_and(|n| *n.kind() == crate::ops::OpKind::Constant);
                if is_const {
                    map.insert(pattern, candidate);
                    true
                } else {
                    false
                }
            }

            PatternKind::Exact { op, inputs } => {
                let graph_node = match self.graph.node(candidate.node) {
                    Some(n) => n,
                    None => return false,
                };
                if graph_node.kind() != op {
                    return false;
                }
                // Exact arity: extra or missing inputs fail immediately.
                if graph_node.inputs().len() != inputs.len() {
                    return false;
                }

                map.insert(pattern, candidate);
                for (index, &child) in inputs.iter().enumerate() {
                    let input = graph_node.inputs()[index];
                    if !self.try_match(child, input, map, symbols) {
                        return false;
                    }
                }
                true
            }

            PatternKind::Or(alternatives) => {
                for &alternative in alternatives {
                    let mark = map.len();
                    let snapshot = symbols.snapshot();
                    if self.try_match(alternative, candidate, map, symbols) {
                        map.insert(pattern, candidate);
                        return true;
                    }
                    map.truncate(mark);
                    symbols.restore(snapshot);
                }
                false
            }
        }
    }
}
