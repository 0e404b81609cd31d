//! Value types carried on graph outputs
//!
//! Every output port of a [`Node`](crate::graph::Node) carries an element
//! type and a (possibly partially dynamic) shape. These are the only pieces
//! of operator semantics the engine itself understands — everything else is
//! delegated to the [`ops`](crate::ops) registry.

pub mod element;
pub mod shape;

pub use element::ElementType;
pub use shape::{broadcast, Dim, Shape};
