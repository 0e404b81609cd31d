//! Computation graph module
//!
//! The mutable dataflow IR the rewrite engine operates on:
//!
//! - [`Graph`]: arena-owned nodes with incrementally maintained consumer sets
//! - [`Node`] / [`NodeId`] / [`Value`] / [`InputPort`]: the addressing model
//! - [`mutators`]: rewiring and removal primitives used by commits
//!
//! # Overview
//!
//! Nodes are identified by stable ids and connected by typed, ordered edges:
//! each input port of a node reads exactly one [`Value`] (an output port of
//! some producer). The graph is acyclic along value edges; [`Graph::validate`]
//! checks this together with port-arity well-formedness.
//!
//! # Example
//!
//! ```ignore
//! use dataflow_opt::graph::{Graph, Value};
//! use dataflow_opt::ops::OpKind;
//! use dataflow_opt::types::{ElementType, Shape};
//!
//! let mut g = Graph::new();
//! let x = g.add_parameter("x", ElementType::F32, Shape::fixed(&[1, 12, 6, 8]));
//! let y = g.add_parameter("y", ElementType::F32, Shape::fixed(&[1, 12, 6, 8]));
//! let mul = g.add_node(OpKind::Multiply, "mul", &[Value::new(x, 0), Value::new(y, 0)])?;
//! g.mark_result(Value::new(mul, 0));
//! ```

pub mod core;
pub mod mutators;
pub mod node;

pub use core::{Consumers, Graph};
pub use node::{AttrMap, AttrValue, InputPort, Node, NodeId, OutputInfo, Value};
