//! Output shape/type inference, run once at node construction
//!
//! This is the crate's stand-in for a full operator semantics library: just
//! enough per-kind inference to keep every live node's output info complete.
//! The engine proper never consults it after construction.

use smallvec::SmallVec;

use crate::error::{RewriteError, RewriteResult};
use crate::graph::{AttrMap, AttrValue, Graph, OutputInfo, Value};
use crate::types::{broadcast, Dim, ElementType, Shape};

use super::OpKind;

/// Infer output infos for a node under construction
pub fn infer_outputs(
    graph: &Graph,
    kind: &OpKind,
    inputs: &[Value],
    attrs: &AttrMap,
) -> RewriteResult<Vec<OutputInfo>> {
    match kind {
        OpKind::Parameter | OpKind::Constant => Err(RewriteError::ShapeInference(
            "parameters and constants carry explicit output info".to_string(),
        )),

        OpKind::Reshape => {
            let data = info(graph, inputs[0])?;
            let shape = target_shape(graph, inputs[1], &data.shape, special_zero(attrs))?;
            Ok(vec![OutputInfo::new(data.element_type, shape)])
        }

        OpKind::ShapeOf => {
            let data = info(graph, inputs[0])?;
            let rank = data.shape.rank() as i64;
            Ok(vec![OutputInfo::new(ElementType::I64, Shape::fixed(&[rank]))])
        }

        OpKind::Mvn => {
            let data = info(graph, inputs[0])?;
            let shape = if inputs.len() == 3 {
                // The fused form carries the folded reshape's special_zero.
                target_shape(graph, inputs[2], &data.shape, special_zero(attrs))?
            } else {
                data.shape.clone()
            };
            Ok(vec![OutputInfo::new(data.element_type, shape)])
        }

        OpKind::Multiply | OpKind::Add => {
            let a = info(graph, inputs[0])?;
            let b = info(graph, inputs[1])?;
            let shape = broadcast_or_err(&a.shape, &b.shape)?;
            Ok(vec![OutputInfo::new(a.element_type, shape)])
        }

        OpKind::Equal | OpKind::LogicalAnd => {
            let a = info(graph, inputs[0])?;
            let b = info(graph, inputs[1])?;
            let shape = broadcast_or_err(&a.shape, &b.shape)?;
            Ok(vec![OutputInfo::new(ElementType::Bool, shape)])
        }

        OpKind::Select => {
            let cond = info(graph, inputs[0])?;
            let then = info(graph, inputs[1])?;
            let other = info(graph, inputs[2])?;
            let branches = broadcast_or_err(&then.shape, &other.shape)?;
            let shape = broadcast_or_err(&cond.shape, &branches)?;
            Ok(vec![OutputInfo::new(then.element_type, shape)])
        }

        OpKind::Convert => {
            let data = info(graph, inputs[0])?;
            let to = attrs
                .get("to")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse::<ElementType>().ok())
                .ok_or_else(|| {
                    RewriteError::ShapeInference(
                        "Convert requires a 'to' attribute naming an element type".to_string(),
                    )
                })?;
            Ok(vec![OutputInfo::new(to, data.shape.clone())])
        }

        OpKind::Squeeze => {
            let data = info(graph, inputs[0])?;
            let dims: SmallVec<[Dim; 4]> = data
                .shape
                .dims()
                .iter()
                .copied()
                .filter(|d| *d != Dim::Static(1))
                .collect();
            Ok(vec![OutputInfo::new(data.element_type, Shape::from_dims(dims))])
        }

        OpKind::Unsqueeze => {
            let data = info(graph, inputs[0])?;
            let axes = graph.constant_ints(inputs[1]).ok_or_else(|| {
                RewriteError::ShapeInference("Unsqueeze axes must be constant".to_string())
            })?;
            let out_rank = data.shape.rank() + axes.len();
            let mut normalized: Vec<usize> = axes
                .iter()
                .map(|&a| {
                    let a = if a < 0 { a + out_rank as i64 } else { a };
                    a as usize
                })
                .collect();
            normalized.sort_unstable();

            let mut dims: Vec<Dim> = data.shape.dims().to_vec();
            for &axis in &normalized {
                if axis > dims.len() {
                    return Err(RewriteError::ShapeInference(format!(
                        "Unsqueeze axis {axis} out of range for rank {out_rank}"
                    )));
                }
                dims.insert(axis, Dim::Static(1));
            }
            Ok(vec![OutputInfo::new(data.element_type, Shape::from_dims(dims))])
        }

        OpKind::Transpose => {
            let data = info(graph, inputs[0])?;
            let order = graph.constant_ints(inputs[1]).ok_or_else(|| {
                RewriteError::ShapeInference("Transpose order must be constant".to_string())
            })?;
            if order.len() != data.shape.rank() {
                return Err(RewriteError::ShapeInference(format!(
                    "Transpose order rank {} != data rank {}",
                    order.len(),
                    data.shape.rank()
                )));
            }
            let dims: RewriteResult<Vec<Dim>> = order
                .iter()
                .map(|&axis| {
                    data.shape.dim(axis as usize).ok_or_else(|| {
                        RewriteError::ShapeInference(format!("Transpose axis {axis} out of range"))
                    })
                })
                .collect();
            Ok(vec![OutputInfo::new(data.element_type, Shape::from_dims(dims?))])
        }

        OpKind::MatMul => {
            let a = info(graph, inputs[0])?;
            let b = info(graph, inputs[1])?;
            let ta = attrs.get("transpose_a").and_then(|v| v.as_bool()).unwrap_or(false);
            let tb = attrs.get("transpose_b").and_then(|v| v.as_bool()).unwrap_or(false);
            let shape = matmul_shape(&a.shape, &b.shape, ta, tb)?;
            Ok(vec![OutputInfo::new(a.element_type, shape)])
        }

        OpKind::Convolution => {
            // Spatial inference is a backend concern; only rank and type are kept.
            let data = info(graph, inputs[0])?;
            Ok(vec![OutputInfo::new(
                data.element_type,
                Shape::dynamic(data.shape.rank()),
            )])
        }

        OpKind::Tile => {
            let data = info(graph, inputs[0])?;
            let shape = match graph.constant_ints(inputs[1]) {
                Some(repeats) if repeats.len() == data.shape.rank() => {
                    let dims = data.shape.dims().iter().zip(repeats).map(|(d, &r)| {
                        match d.value() {
                            Some(v) => Dim::Static(v * r),
                            None => Dim::Dynamic,
                        }
                    });
                    Shape::from_dims(dims)
                }
                _ => Shape::dynamic(data.shape.rank()),
            };
            Ok(vec![OutputInfo::new(data.element_type, shape)])
        }

        OpKind::Slice => {
            let data = info(graph, inputs[0])?;
            Ok(vec![OutputInfo::new(
                data.element_type,
                Shape::dynamic(data.shape.rank()),
            )])
        }

        OpKind::FakeQuantize | OpKind::GroupNormalization => {
            let data = info(graph, inputs[0])?;
            Ok(vec![data.clone()])
        }

        OpKind::Custom(id) => {
            let spec = graph
                .registry()
                .get(*id)
                .ok_or(RewriteError::UnregisteredOp(id.0))?;
            (spec.infer)(graph, inputs, attrs)
        }
    }
}

fn info(graph: &Graph, value: Value) -> RewriteResult<&OutputInfo> {
    graph.value_info(value).ok_or_else(|| {
        RewriteError::DanglingValue(format!("{}:{}", value.node, value.port))
    })
}

fn broadcast_or_err(a: &Shape, b: &Shape) -> RewriteResult<Shape> {
    broadcast(a, b).ok_or_else(|| {
        RewriteError::ShapeInference(format!("shapes {a} and {b} are not broadcastable"))
    })
}

fn special_zero(attrs: &AttrMap) -> bool {
    attrs
        .get("special_zero")
        .and_then(AttrValue::as_bool)
        .unwrap_or(false)
}

/// Resolve a reshape-style target-shape operand
///
/// Constant targets give literal dimensions: negative entries are dynamic,
/// and a zero entry copies the data dimension at the same axis when
/// `special_zero` is set. A `ShapeOf` producer gives the shape of whatever
/// it observes.
fn target_shape(
    graph: &Graph,
    target: Value,
    data: &Shape,
    special_zero: bool,
) -> RewriteResult<Shape> {
    if let Some(entries) = graph.constant_ints(target) {
        let dims = entries.iter().enumerate().map(|(axis, &d)| {
            if d == 0 && special_zero {
                data.dim(axis).unwrap_or(Dim::Dynamic)
            } else {
                Dim::from(d)
            }
        });
        return Ok(Shape::from_dims(dims));
    }
    if let Some(producer) = graph.node(target.node) {
        if *producer.kind() == OpKind::ShapeOf {
            if let Some(observed) = producer.input(0) {
                if let Some(shape) = graph.value_shape(observed) {
                    return Ok(shape.clone());
                }
            }
        }
    }
    Err(RewriteError::ShapeInference(
        "target shape is neither constant nor a ShapeOf".to_string(),
    ))
}

fn matmul_shape(a: &Shape, b: &Shape, ta: bool, tb: bool) -> RewriteResult<Shape> {
    if a.rank() < 2 || b.rank() < 2 {
        return Err(RewriteError::ShapeInference(format!(
            "MatMul requires rank >= 2 operands, got {a} x {b}"
        )));
    }

    let (ar, br) = (a.rank(), b.rank());
    let m = if ta { a.dims()[ar - 1] } else { a.dims()[ar - 2] };
    let n = if tb { b.dims()[br - 2] } else { b.dims()[br - 1] };

    let batch_a = Shape::from_dims(a.dims()[..ar - 2].iter().copied());
    let batch_b = Shape::from_dims(b.dims()[..br - 2].iter().copied());
    let batch = broadcast_or_err(&batch_a, &batch_b)?;

    let mut dims: Vec<Dim> = batch.dims().to_vec();
    dims.push(m);
    dims.push(n);
    Ok(Shape::from_dims(dims))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::AttrValue;

    #[test]
    fn test_reshape_from_constant() {
        let mut g = Graph::new();
        let x = g.add_parameter("x", ElementType::F32, Shape::fixed(&[1, 12, 6, 8]));
        let target = g.add_constant_ints("target", vec![1, 4, -1]);
        let reshape = g
            .add_node(OpKind::Reshape, "pre", &[Value::new(x, 0), Value::new(target, 0)])
            .unwrap();

        let shape = g.value_shape(Value::new(reshape, 0)).unwrap();
        assert_eq!(shape.dim(0), Some(Dim::Static(1)));
        assert_eq!(shape.dim(1), Some(Dim::Static(4)));
        assert_eq!(shape.dim(2), Some(Dim::Dynamic));
    }

    #[test]
    fn test_reshape_special_zero_copies_input_dim() {
        let mut g = Graph::new();
        let x = g.add_parameter("x", ElementType::F32, Shape::fixed(&[2, 12, 6]));
        let target = g.add_constant_ints("target", vec![0, 12, -1]);

        let mut attrs = AttrMap::default();
        attrs.insert("special_zero".to_string(), AttrValue::Bool(true));
        let r = g
            .add_node_with_attrs(
                OpKind::Reshape,
                "r",
                &[Value::new(x, 0), Value::new(target, 0)],
                attrs,
            )
            .unwrap();
        let shape = g.value_shape(Value::new(r, 0)).unwrap();
        assert_eq!(shape.dim(0), Some(Dim::Static(2)));
        assert_eq!(shape.dim(1), Some(Dim::Static(12)));
        assert_eq!(shape.dim(2), Some(Dim::Dynamic));

        // Without the flag a zero entry is a literal zero extent.
        let r2 = g
            .add_node(OpKind::Reshape, "r2", &[Value::new(x, 0), Value::new(target, 0)])
            .unwrap();
        assert_eq!(
            g.value_shape(Value::new(r2, 0)).unwrap().dim(0),
            Some(Dim::Static(0))
        );
    }

    #[test]
    fn test_reshape_from_shapeof() {
        let mut g = Graph::new();
        let x = g.add_parameter("x", ElementType::F32, Shape::fixed(&[1, 12, 6, 8]));
        let target = g.add_constant_ints("target", vec![1, 4, -1]);
        let pre = g
            .add_node(OpKind::Reshape, "pre", &[Value::new(x, 0), Value::new(target, 0)])
            .unwrap();
        let shapeof = g.add_node(OpKind::ShapeOf, "shapeof", &[Value::new(x, 0)]).unwrap();
        let post = g
            .add_node(OpKind::Reshape, "post", &[Value::new(pre, 0), Value::new(shapeof, 0)])
            .unwrap();

        assert_eq!(
            g.value_shape(Value::new(post, 0)),
            Some(&Shape::fixed(&[1, 12, 6, 8]))
        );
    }

    #[test]
    fn test_squeeze_drops_unit_dims() {
        let mut g = Graph::new();
        let scale = g.add_parameter("scale", ElementType::F32, Shape::fixed(&[1, 12, 1, 1]));
        let sq = g.add_node(OpKind::Squeeze, "sq", &[Value::new(scale, 0)]).unwrap();
        assert_eq!(g.value_shape(Value::new(sq, 0)), Some(&Shape::fixed(&[12])));
    }

    #[test]
    fn test_convert_needs_destination() {
        let mut g = Graph::new();
        let x = g.add_parameter("x", ElementType::F16, Shape::fixed(&[4]));
        assert!(g.add_node(OpKind::Convert, "cvt", &[Value::new(x, 0)]).is_err());

        let mut attrs = AttrMap::default();
        attrs.insert("to".to_string(), AttrValue::Str("f32".to_string()));
        let cvt = g
            .add_node_with_attrs(OpKind::Convert, "cvt", &[Value::new(x, 0)], attrs)
            .unwrap();
        assert_eq!(g.value_type(Value::new(cvt, 0)), Some(ElementType::F32));
    }

    #[test]
    fn test_matmul_with_transpose_flags() {
        let mut g = Graph::new();
        let a = g.add_parameter("a", ElementType::F32, Shape::fixed(&[2, 4, 8]));
        let b = g.add_parameter("b", ElementType::F32, Shape::fixed(&[2, 16, 8]));

        let mut attrs = AttrMap::default();
        attrs.insert("transpose_b".to_string(), AttrValue::Bool(true));
        let mm = g
            .add_node_with_attrs(OpKind::MatMul, "mm", &[Value::new(a, 0), Value::new(b, 0)], attrs)
            .unwrap();
        assert_eq!(
            g.value_shape(Value::new(mm, 0)),
            Some(&Shape::fixed(&[2, 4, 16]))
        );
    }

    #[test]
    fn test_transpose_permutes() {
        let mut g = Graph::new();
        let x = g.add_parameter("x", ElementType::F32, Shape::fixed(&[2, 3, 4]));
        let order = g.add_constant_ints("order", vec![0, 2, 1]);
        let t = g
            .add_node(OpKind::Transpose, "t", &[Value::new(x, 0), Value::new(order, 0)])
            .unwrap();
        assert_eq!(
            g.value_shape(Value::new(t, 0)),
            Some(&Shape::fixed(&[2, 4, 3]))
        );
    }
}
