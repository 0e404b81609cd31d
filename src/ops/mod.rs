//! Operation kinds and the extension registry
//!
//! Built-in kinds form a closed enum; externally supplied operators go
//! through [`OpRegistry`], which maps a [`CustomOpId`] to a validated arity
//! and a shape-inference function. The engine never downcasts — dispatch on
//! kind is always a `match` plus one registry lookup.
//!
//! Shape/type inference lives in [`infer`] and is invoked once, when a node
//! is constructed; the rewrite engine itself only does symbol bookkeeping.

pub mod infer;

use rustc_hash::FxHashMap;

use crate::error::{RewriteError, RewriteResult};
use crate::graph::{AttrMap, Graph, OutputInfo, Value};

/// Operation kind of a node
///
/// The built-in set covers the operators the shipped passes match and emit.
/// Anything else is a [`OpKind::Custom`] kind resolved via [`OpRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// Graph input placeholder
    Parameter,
    /// Compile-time constant (payload in the `"value"` attribute)
    Constant,
    /// Reshape(data, target_shape)
    Reshape,
    /// ShapeOf(data) — runtime shape as a 1-D i64 tensor
    ShapeOf,
    /// Mean-variance normalization: Mvn(data, axes[, target_shape])
    ///
    /// The three-input form is the fused variant that also reshapes its
    /// output, produced by the MVN/Reshape fusion pass.
    Mvn,
    /// Elementwise multiply with numpy broadcasting
    Multiply,
    /// Elementwise add with numpy broadcasting
    Add,
    /// Element type cast (destination in the `"to"` attribute)
    Convert,
    /// Drop all size-1 dimensions
    Squeeze,
    /// Unsqueeze(data, axes)
    Unsqueeze,
    /// Transpose(data, order)
    Transpose,
    /// MatMul(a, b) with `"transpose_a"`/`"transpose_b"` flags
    MatMul,
    /// Convolution(data, weights) — opaque to this crate beyond identity
    Convolution,
    /// FakeQuantize(data, in_low, in_high, out_low, out_high)
    FakeQuantize,
    /// GroupNormalization(data, scale, bias) with `"num_groups"`/`"epsilon"`
    GroupNormalization,
    /// Elementwise equality, boolean result
    Equal,
    /// Elementwise logical and, boolean result
    LogicalAnd,
    /// Select(cond, then, else)
    Select,
    /// Tile(data, repeats)
    Tile,
    /// Slice(data, start, stop, step, axes)
    Slice,
    /// Externally registered operator
    Custom(CustomOpId),
}

impl OpKind {
    /// Valid input arity range `(min, max)` for this kind
    pub fn arity(&self, registry: &OpRegistry) -> RewriteResult<(usize, usize)> {
        Ok(match self {
            OpKind::Parameter | OpKind::Constant => (0, 0),
            OpKind::ShapeOf | OpKind::Convert | OpKind::Squeeze => (1, 1),
            OpKind::Reshape
            | OpKind::Multiply
            | OpKind::Add
            | OpKind::Unsqueeze
            | OpKind::Transpose
            | OpKind::MatMul
            | OpKind::Convolution
            | OpKind::Equal
            | OpKind::LogicalAnd
            | OpKind::Tile => (2, 2),
            OpKind::Mvn => (2, 3),
            OpKind::Select | OpKind::GroupNormalization => (3, 3),
            OpKind::FakeQuantize | OpKind::Slice => (5, 5),
            OpKind::Custom(id) => {
                let spec = registry
                    .get(*id)
                    .ok_or(RewriteError::UnregisteredOp(id.0))?;
                (spec.min_inputs, spec.max_inputs)
            }
        })
    }

    /// Display name, resolving custom kinds through the registry
    pub fn display_name(&self, registry: &OpRegistry) -> String {
        match self {
            OpKind::Custom(id) => registry
                .get(*id)
                .map(|s| s.name.to_string())
                .unwrap_or_else(|| format!("Custom#{}", id.0)),
            other => format!("{other:?}"),
        }
    }
}

/// Identifier of a registered custom operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CustomOpId(pub u32);

/// Shape/type inference function for a custom operator
pub type InferFn = fn(&Graph, &[Value], &AttrMap) -> RewriteResult<Vec<OutputInfo>>;

/// Registered description of a custom operator kind
#[derive(Debug, Clone)]
pub struct OpSpec {
    /// Operator name for diagnostics
    pub name: &'static str,
    /// Minimum input arity
    pub min_inputs: usize,
    /// Maximum input arity
    pub max_inputs: usize,
    /// Output shape/type inference
    pub infer: InferFn,
}

/// Registry of custom operation kinds
///
/// Kind ids are allocated by the registry; passes that emit custom ops hold
/// the id they were constructed with rather than consulting ambient state.
#[derive(Debug, Clone, Default)]
pub struct OpRegistry {
    specs: FxHashMap<u32, OpSpec>,
    next_id: u32,
}

impl OpRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a custom operator, allocating its kind id
    pub fn register(&mut self, spec: OpSpec) -> CustomOpId {
        let id = CustomOpId(self.next_id);
        self.next_id += 1;
        self.specs.insert(id.0, spec);
        id
    }

    /// Look up a registered operator
    pub fn get(&self, id: CustomOpId) -> Option<&OpSpec> {
        self.specs.get(&id.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ElementType, Shape};

    fn dummy_infer(
        _graph: &Graph,
        _inputs: &[Value],
        _attrs: &AttrMap,
    ) -> RewriteResult<Vec<OutputInfo>> {
        Ok(vec![OutputInfo::new(ElementType::F32, Shape::dynamic(4))])
    }

    #[test]
    fn test_builtin_arity() {
        let registry = OpRegistry::new();
        assert_eq!(OpKind::Multiply.arity(&registry).unwrap(), (2, 2));
        assert_eq!(OpKind::Mvn.arity(&registry).unwrap(), (2, 3));
        assert_eq!(OpKind::Constant.arity(&registry).unwrap(), (0, 0));
    }

    #[test]
    fn test_custom_registration() {
        let mut registry = OpRegistry::new();
        let id = registry.register(OpSpec {
            name: "CausalMaskPreprocess",
            min_inputs: 2,
            max_inputs: 2,
            infer: dummy_infer,
        });

        let kind = OpKind::Custom(id);
        assert_eq!(kind.arity(&registry).unwrap(), (2, 2));
        assert_eq!(kind.display_name(&registry), "CausalMaskPreprocess");
    }

    #[test]
    fn test_unregistered_custom_fails() {
        let registry = OpRegistry::new();
        let kind = OpKind::Custom(CustomOpId(42));
        assert!(matches!(
            kind.arity(&registry),
            Err(RewriteError::UnregisteredOp(42))
        ));
    }
}
