//! Graph arena and accessors
//!
//! `Graph` exclusively owns all nodes. Nodes sit in an arena of optional
//! slots; a slot going `None` is the only way a node dies, and ids are never
//! reused, so stale ids read as dead instead of aliasing. Consumer sets are
//! maintained incrementally on every mutation — detachability is a map
//! lookup, not a pointer-liveness question.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::error::{RewriteError, RewriteResult};
use crate::ops::{self, OpKind, OpRegistry};
use crate::types::{ElementType, Shape};

use super::node::{AttrMap, AttrValue, InputPort, Node, NodeId, OutputInfo, Value};

/// Consumer set of one value, small-size optimized for the 1–4 consumer case
pub type Consumers = SmallVec<[InputPort; 4]>;

/// The mutable dataflow graph the engine operates on
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Option<Node>>,
    consumers: FxHashMap<Value, Consumers>,
    results: Vec<Value>,
    registry: OpRegistry,
}

impl Graph {
    /// Create an empty graph with an empty operator registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty graph with the given operator registry
    pub fn with_registry(registry: OpRegistry) -> Self {
        Graph {
            registry,
            ..Self::default()
        }
    }

    /// Operator registry used for custom-kind arity and shape inference
    pub fn registry(&self) -> &OpRegistry {
        &self.registry
    }

    /// Mutable access to the operator registry
    pub fn registry_mut(&mut self) -> &mut OpRegistry {
        &mut self.registry
    }

    // ========================================================================
    // Construction
    // ========================================================================

    /// Add a graph input
    pub fn add_parameter(
        &mut self,
        name: impl Into<String>,
        element_type: ElementType,
        shape: Shape,
    ) -> NodeId {
        self.insert(Node {
            kind: OpKind::Parameter,
            name: name.into(),
            inputs: Vec::new(),
            outputs: vec![OutputInfo::new(element_type, shape)],
            attrs: AttrMap::default(),
            rt_info: AttrMap::default(),
        })
    }

    /// Add a constant with an explicit payload in the `"value"` attribute
    pub fn add_constant(
        &mut self,
        name: impl Into<String>,
        element_type: ElementType,
        shape: Shape,
        value: AttrValue,
    ) -> NodeId {
        let mut attrs = AttrMap::default();
        attrs.insert("value".to_string(), value);
        self.insert(Node {
            kind: OpKind::Constant,
            name: name.into(),
            inputs: Vec::new(),
            outputs: vec![OutputInfo::new(element_type, shape)],
            attrs,
            rt_info: AttrMap::default(),
        })
    }

    /// Add an i64 constant vector
    pub fn add_constant_ints(&mut self, name: impl Into<String>, values: Vec<i64>) -> NodeId {
        let shape = Shape::fixed(&[values.len() as i64]);
        self.add_constant(name, ElementType::I64, shape, AttrValue::Ints(values))
    }

    /// Add an f32 constant with the given shape
    pub fn add_constant_floats(
        &mut self,
        name: impl Into<String>,
        shape: Shape,
        values: Vec<f32>,
    ) -> NodeId {
        self.add_constant(name, ElementType::F32, shape, AttrValue::Floats(values))
    }

    /// Add an operation node, inferring its output shapes and types
    ///
    /// Validates input liveness and kind arity; shape inference runs here,
    /// once, so every live node always carries complete output info.
    pub fn add_node(
        &mut self,
        kind: OpKind,
        name: impl Into<String>,
        inputs: &[Value],
    ) -> RewriteResult<NodeId> {
        self.add_node_with_attrs(kind, name, inputs, AttrMap::default())
    }

    /// Add an operation node with attributes
    pub fn add_node_with_attrs(
        &mut self,
        kind: OpKind,
        name: impl Into<String>,
        inputs: &[Value],
        attrs: AttrMap,
    ) -> RewriteResult<NodeId> {
        for &input in inputs {
            if self.value_info(input).is_none() {
                return Err(RewriteError::DanglingValue(format!(
                    "{}:{}",
                    input.node, input.port
                )));
            }
        }

        let (min, max) = kind.arity(&self.registry)?;
        if inputs.len() < min || inputs.len() > max {
            return Err(RewriteError::ArityMismatch {
                kind: kind.display_name(&self.registry),
                expected: if min == max {
                    format!("{min}")
                } else {
                    format!("{min}..={max}")
                },
                got: inputs.len(),
            });
        }

        let outputs = ops::infer::infer_outputs(self, &kind, inputs, &attrs)?;

        Ok(self.insert(Node {
            kind,
            name: name.into(),
            inputs: inputs.to_vec(),
            outputs,
            attrs,
            rt_info: AttrMap::default(),
        }))
    }

    pub(crate) fn insert(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        for (index, &input) in node.inputs.iter().enumerate() {
            self.consumers
                .entry(input)
                .or_default()
                .push(InputPort { node: id, index });
        }
        self.nodes.push(Some(node));
        id
    }

    /// Mark a value as a graph result
    ///
    /// Result-feeding nodes are never detached by a commit.
    pub fn mark_result(&mut self, value: Value) {
        self.results.push(value);
    }

    /// Graph results in declaration order
    pub fn results(&self) -> &[Value] {
        &self.results
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Node by id, `None` if the node has been detached
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index()).and_then(|slot| slot.as_ref())
    }

    /// Mutable node access
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index()).and_then(|slot| slot.as_mut())
    }

    /// Whether the node is still alive
    pub fn is_live(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    /// Number of live nodes
    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|slot| slot.is_some()).count()
    }

    /// Ids of all live nodes in arena (creation) order
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|_| NodeId(i as u32)))
    }

    /// Output info of a value, `None` if the producer is dead or the port
    /// is out of range
    pub fn value_info(&self, value: Value) -> Option<&OutputInfo> {
        self.node(value.node).and_then(|n| n.output(value.port))
    }

    /// Element type of a value
    pub fn value_type(&self, value: Value) -> Option<ElementType> {
        self.value_info(value).map(|info| info.element_type)
    }

    /// Shape of a value
    pub fn value_shape(&self, value: Value) -> Option<&Shape> {
        self.value_info(value).map(|info| &info.shape)
    }

    /// Consumers of a value
    pub fn consumers(&self, value: Value) -> &[InputPort] {
        self.consumers.get(&value).map(|c| c.as_slice()).unwrap_or(&[])
    }

    /// Number of input ports consuming a value (graph results not counted)
    pub fn consumer_count(&self, value: Value) -> usize {
        self.consumers(value).len()
    }

    /// Whether any graph result reads from this node
    pub fn feeds_result(&self, id: NodeId) -> bool {
        self.results.iter().any(|r| r.node == id)
    }

    /// The i-th input value of a node
    pub fn input_value(&self, id: NodeId, index: usize) -> Option<Value> {
        self.node(id).and_then(|n| n.input(index))
    }

    /// Constant i64 payload of a value, if its producer is an i64 constant
    pub fn constant_ints(&self, value: Value) -> Option<&[i64]> {
        let node = self.node(value.node)?;
        if node.kind != OpKind::Constant {
            return None;
        }
        node.attr("value").and_then(AttrValue::as_ints)
    }

    /// Constant f32 payload of a value, if its producer is an f32 constant
    pub fn constant_floats(&self, value: Value) -> Option<&[f32]> {
        let node = self.node(value.node)?;
        if node.kind != OpKind::Constant {
            return None;
        }
        node.attr("value").and_then(AttrValue::as_floats)
    }

    // ========================================================================
    // Internal consumer-set maintenance (used by mutators)
    // ========================================================================

    pub(crate) fn consumers_take(&mut self, value: Value) -> Consumers {
        self.consumers.remove(&value).unwrap_or_default()
    }

    pub(crate) fn consumers_extend(&mut self, value: Value, ports: Consumers) {
        if !ports.is_empty() {
            self.consumers.entry(value).or_default().extend(ports);
        }
    }

    pub(crate) fn consumers_remove(&mut self, value: Value, node: NodeId, index: usize) {
        if let Some(ports) = self.consumers.get_mut(&value) {
            ports.retain(|p| !(p.node == node && p.index == index));
            if ports.is_empty() {
                self.consumers.remove(&value);
            }
        }
    }

    pub(crate) fn consumers_drop_value(&mut self, value: Value) {
        self.consumers.remove(&value);
    }

    pub(crate) fn take_node(&mut self, id: NodeId) -> Option<Node> {
        self.nodes.get_mut(id.index()).and_then(|slot| slot.take())
    }

    pub(crate) fn results_mut(&mut self) -> &mut [Value] {
        &mut self.results
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Live node ids in topological (producers-before-consumers) order
    ///
    /// Ties are broken by creation order, which keeps sweeps deterministic.
    pub fn topo_order(&self) -> Vec<NodeId> {
        let mut pending: FxHashMap<NodeId, usize> = FxHashMap::default();
        for id in self.node_ids() {
            let degree = self
                .node(id)
                .map(|n| {
                    n.inputs
                        .iter()
                        .filter(|v| self.is_live(v.node))
                        .count()
                })
                .unwrap_or(0);
            pending.insert(id, degree);
        }

        let mut ready: Vec<NodeId> = pending
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(&id, _)| id)
            .collect();
        ready.sort();

        let mut order = Vec::with_capacity(pending.len());
        let mut cursor = 0;
        while cursor < ready.len() {
            let id = ready[cursor];
            cursor += 1;
            order.push(id);

            let node = match self.node(id) {
                Some(n) => n,
                None => continue,
            };
            let mut released: Vec<NodeId> = Vec::new();
            for port in 0..node.outputs.len() {
                for consumer in self.consumers(Value::new(id, port)) {
                    if let Some(d) = pending.get_mut(&consumer.node) {
                        *d -= 1;
                        if *d == 0 {
                            released.push(consumer.node);
                        }
                    }
                }
            }
            released.sort();
            released.dedup();
            ready.extend(released);
        }

        order
    }

    /// Whether `target` is reachable from `from` walking upstream along
    /// input edges (`from` itself does not count)
    pub fn reaches_upstream(&self, from: NodeId, target: NodeId) -> bool {
        let mut stack: Vec<NodeId> = match self.node(from) {
            Some(n) => n.inputs.iter().map(|v| v.node).collect(),
            None => return false,
        };
        let mut seen: Vec<NodeId> = Vec::new();
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if seen.contains(&id) {
                continue;
            }
            seen.push(id);
            if let Some(n) = self.node(id) {
                stack.extend(n.inputs.iter().map(|v| v.node));
            }
        }
        false
    }

    // ========================================================================
    // Validation and diagnostics
    // ========================================================================

    /// Check structural well-formedness: live input references, in-range
    /// ports, acyclicity along value edges, live results
    pub fn validate(&self) -> RewriteResult<()> {
        for id in self.node_ids() {
            let node = match self.node(id) {
                Some(n) => n,
                None => continue,
            };
            for &input in &node.inputs {
                if self.value_info(input).is_none() {
                    return Err(RewriteError::DanglingValue(format!(
                        "{} input {}:{}",
                        node.name, input.node, input.port
                    )));
                }
            }
        }

        for &result in &self.results {
            if self.value_info(result).is_none() {
                return Err(RewriteError::DanglingValue(format!(
                    "result {}:{}",
                    result.node, result.port
                )));
            }
        }

        // Kahn's algorithm visits every node iff the graph is acyclic.
        if self.topo_order().len() != self.node_count() {
            return Err(RewriteError::InvariantViolation {
                root: "<graph>".to_string(),
                detail: "cycle along value-producing edges".to_string(),
            });
        }

        Ok(())
    }

    /// Deterministic textual dump of the whole graph
    ///
    /// Stable across runs (attribute keys sorted), so tests can compare
    /// dumps to assert bit-for-bit non-mutation.
    pub fn dump(&self) -> String {
        use std::fmt::Write;

        fn fmt_attrs(out: &mut String, attrs: &AttrMap) {
            let mut keys: Vec<&String> = attrs.keys().collect();
            keys.sort();
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                let _ = write!(out, "{}={:?}", key, attrs[*key]);
            }
        }

        let mut out = String::new();
        for id in self.node_ids() {
            let node = match self.node(id) {
                Some(n) => n,
                None => continue,
            };
            let _ = write!(out, "{} {} = {}(", id, node.name, node.kind.display_name(&self.registry));
            for (i, input) in node.inputs.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                let _ = write!(out, "{}:{}", input.node, input.port);
            }
            out.push(')');
            for info in &node.outputs {
                let _ = write!(out, " {}{}", info.element_type, info.shape);
            }
            if !node.attrs.is_empty() {
                out.push_str(" {");
                fmt_attrs(&mut out, &node.attrs);
                out.push('}');
            }
            if !node.rt_info.is_empty() {
                out.push_str(" rt{");
                fmt_attrs(&mut out, &node.rt_info);
                out.push('}');
            }
            out.push('\n');
        }
        for &result in &self.results {
            let _ = writeln!(out, "result {}:{}", result.node, result.port);
        }
        out
    }
}
