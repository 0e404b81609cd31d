//! Node, value, and attribute types
//!
//! Nodes live in the [`Graph`](super::Graph) arena and are addressed by
//! stable [`NodeId`]s. A [`Value`] names one output port of one node and is
//! the currency of matching and rewiring: patterns bind `Value`s, consumers
//! reference `Value`s, and commits rewire `Value`s by position.

use rustc_hash::FxHashMap;

use crate::ops::OpKind;
use crate::types::{ElementType, Shape};

/// Stable identifier of a node in the graph arena
///
/// Ids are never reused within one graph's lifetime, so a stale id held
/// across a commit safely reads as "dead" rather than aliasing a new node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// One output port of one node — the "Output" a pattern binds to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Value {
    /// Producing node
    pub node: NodeId,
    /// Output port index on the producer
    pub port: usize,
}

impl Value {
    /// Value for the given node and output port
    pub fn new(node: NodeId, port: usize) -> Self {
        Value { node, port }
    }
}

/// One input port of one node — an edge endpoint on the consumer side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputPort {
    /// Consuming node
    pub node: NodeId,
    /// Input index on the consumer
    pub index: usize,
}

/// Element type and shape carried by one output port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputInfo {
    /// Element type of the produced value
    pub element_type: ElementType,
    /// Shape of the produced value
    pub shape: Shape,
}

impl OutputInfo {
    /// Convenience constructor
    pub fn new(element_type: ElementType, shape: Shape) -> Self {
        OutputInfo { element_type, shape }
    }
}

/// Attribute value (also used for runtime-info entries)
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// 64-bit integer
    Int(i64),
    /// 32-bit float
    Float(f32),
    /// Integer list (also holds constant payloads and boolean masks as 0/1)
    Ints(Vec<i64>),
    /// Float list
    Floats(Vec<f32>),
    /// String
    Str(String),
    /// String list (provenance records)
    Strs(Vec<String>),
    /// Boolean flag
    Bool(bool),
}

impl AttrValue {
    /// As integer, if this is an `Int`
    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// As float, if this is a `Float`
    pub fn as_float(&self) -> Option<f32> {
        match self {
            AttrValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// As integer slice, if this is an `Ints`
    pub fn as_ints(&self) -> Option<&[i64]> {
        match self {
            AttrValue::Ints(v) => Some(v),
            _ => None,
        }
    }

    /// As float slice, if this is a `Floats`
    pub fn as_floats(&self) -> Option<&[f32]> {
        match self {
            AttrValue::Floats(v) => Some(v),
            _ => None,
        }
    }

    /// As string, if this is a `Str`
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(v) => Some(v),
            _ => None,
        }
    }

    /// As string slice, if this is a `Strs`
    pub fn as_strs(&self) -> Option<&[String]> {
        match self {
            AttrValue::Strs(v) => Some(v),
            _ => None,
        }
    }

    /// As bool, if this is a `Bool`
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

/// Attribute map (keys unique)
pub type AttrMap = FxHashMap<String, AttrValue>;

/// A node in the computation graph
///
/// Owned exclusively by the graph arena; mutated in place only for
/// attribute/runtime-info changes and rewiring, destroyed only by a commit
/// once all outputs are unconsumed.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) kind: OpKind,
    pub(crate) name: String,
    pub(crate) inputs: Vec<Value>,
    pub(crate) outputs: Vec<OutputInfo>,
    pub(crate) attrs: AttrMap,
    pub(crate) rt_info: AttrMap,
}

impl Node {
    /// Operation kind
    pub fn kind(&self) -> &OpKind {
        &self.kind
    }

    /// Human-readable name (not required to be unique)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ordered input values
    pub fn inputs(&self) -> &[Value] {
        &self.inputs
    }

    /// Input at the given index
    pub fn input(&self, index: usize) -> Option<Value> {
        self.inputs.get(index).copied()
    }

    /// Per-output type and shape
    pub fn outputs(&self) -> &[OutputInfo] {
        &self.outputs
    }

    /// Output info for one port
    pub fn output(&self, port: usize) -> Option<&OutputInfo> {
        self.outputs.get(port)
    }

    // ========================================================================
    // Attributes
    // ========================================================================

    /// Full attribute map
    pub fn attrs(&self) -> &AttrMap {
        &self.attrs
    }

    /// Raw attribute lookup
    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attrs.get(name)
    }

    /// Integer attribute
    pub fn attr_i(&self, name: &str) -> Option<i64> {
        self.attrs.get(name).and_then(AttrValue::as_int)
    }

    /// Float attribute
    pub fn attr_f(&self, name: &str) -> Option<f32> {
        self.attrs.get(name).and_then(AttrValue::as_float)
    }

    /// Integer-list attribute
    pub fn attr_ints(&self, name: &str) -> Option<&[i64]> {
        self.attrs.get(name).and_then(AttrValue::as_ints)
    }

    /// String attribute
    pub fn attr_s(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).and_then(AttrValue::as_str)
    }

    /// Boolean attribute
    pub fn attr_b(&self, name: &str) -> Option<bool> {
        self.attrs.get(name).and_then(AttrValue::as_bool)
    }

    /// Set or replace an attribute
    pub fn set_attr(&mut self, name: impl Into<String>, value: AttrValue) {
        self.attrs.insert(name.into(), value);
    }

    /// Check attribute presence
    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.contains_key(name)
    }

    // ========================================================================
    // Runtime info (provenance and semantic tags, opaque to the engine)
    // ========================================================================

    /// Full runtime-info map
    pub fn rt_info(&self) -> &AttrMap {
        &self.rt_info
    }

    /// Runtime-info lookup
    pub fn rt_info_get(&self, key: &str) -> Option<&AttrValue> {
        self.rt_info.get(key)
    }

    /// Set or replace a runtime-info entry
    pub fn set_rt_info(&mut self, key: impl Into<String>, value: AttrValue) {
        self.rt_info.insert(key.into(), value);
    }

    /// Remove a runtime-info entry
    pub fn remove_rt_info(&mut self, key: &str) -> Option<AttrValue> {
        self.rt_info.remove(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_node() -> Node {
        Node {
            kind: OpKind::Multiply,
            name: "mul_0".to_string(),
            inputs: vec![],
            outputs: vec![OutputInfo::new(ElementType::F32, Shape::fixed(&[2, 3]))],
            attrs: AttrMap::default(),
            rt_info: AttrMap::default(),
        }
    }

    #[test]
    fn test_attr_roundtrip() {
        let mut node = make_node();

        node.set_attr("num_groups", AttrValue::Int(4));
        assert_eq!(node.attr_i("num_groups"), Some(4));

        node.set_attr("num_groups", AttrValue::Int(8));
        assert_eq!(node.attr_i("num_groups"), Some(8));

        assert_eq!(node.attr_i("missing"), None);
        // Wrong-typed access returns None rather than panicking
        node.set_attr("eps_mode", AttrValue::Str("inside_sqrt".to_string()));
        assert_eq!(node.attr_i("eps_mode"), None);
        assert_eq!(node.attr_s("eps_mode"), Some("inside_sqrt"));
    }

    #[test]
    fn test_rt_info() {
        let mut node = make_node();

        node.set_rt_info("quantized_input", AttrValue::Bool(true));
        assert_eq!(
            node.rt_info_get("quantized_input").and_then(AttrValue::as_bool),
            Some(true)
        );

        assert!(node.remove_rt_info("quantized_input").is_some());
        assert!(node.rt_info_get("quantized_input").is_none());
    }
}
