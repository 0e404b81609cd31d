//! Shapes with static and dynamic dimensions
//!
//! Dimensions are either statically known or dynamic (symbolic at the graph
//! level). Shape predicates in patterns and guards in rewrite callbacks
//! decide per axis whether a dynamic dimension is acceptable.

use std::fmt;

use smallvec::SmallVec;

/// A single dimension of a tensor shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dim {
    /// Statically known extent
    Static(i64),
    /// Unknown at graph construction time
    Dynamic,
}

impl Dim {
    /// Whether the dimension is statically known
    pub fn is_static(&self) -> bool {
        matches!(self, Dim::Static(_))
    }

    /// Static extent, if known
    pub fn value(&self) -> Option<i64> {
        match self {
            Dim::Static(v) => Some(*v),
            Dim::Dynamic => None,
        }
    }
}

impl From<i64> for Dim {
    fn from(v: i64) -> Self {
        if v < 0 {
            Dim::Dynamic
        } else {
            Dim::Static(v)
        }
    }
}

/// Tensor shape: an ordered list of dimensions
///
/// Rank is always known; individual dimensions may be dynamic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape {
    dims: SmallVec<[Dim; 4]>,
}

impl Shape {
    /// Scalar shape (rank 0)
    pub fn scalar() -> Self {
        Shape { dims: SmallVec::new() }
    }

    /// Fully static shape from extents
    pub fn fixed(dims: &[i64]) -> Self {
        Shape {
            dims: dims.iter().map(|&d| Dim::Static(d)).collect(),
        }
    }

    /// Shape from explicit dimensions
    pub fn from_dims(dims: impl IntoIterator<Item = Dim>) -> Self {
        Shape {
            dims: dims.into_iter().collect(),
        }
    }

    /// Fully dynamic shape of the given rank
    pub fn dynamic(rank: usize) -> Self {
        Shape {
            dims: (0..rank).map(|_| Dim::Dynamic).collect(),
        }
    }

    /// Number of dimensions
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Dimension at the given axis
    pub fn dim(&self, axis: usize) -> Option<Dim> {
        self.dims.get(axis).copied()
    }

    /// All dimensions
    pub fn dims(&self) -> &[Dim] {
        &self.dims
    }

    /// Whether every dimension is statically known
    pub fn is_static(&self) -> bool {
        self.dims.iter().all(|d| d.is_static())
    }

    /// Total element count, if the shape is fully static
    pub fn numel(&self) -> Option<i64> {
        self.dims
            .iter()
            .map(|d| d.value())
            .try_fold(1i64, |acc, d| d.map(|v| acc * v))
    }

    /// Static extents, if the shape is fully static
    pub fn to_static(&self) -> Option<Vec<i64>> {
        self.dims.iter().map(|d| d.value()).collect()
    }
}

/// Numpy-style broadcast of two shapes, aligning trailing dimensions
///
/// Dynamic dimensions broadcast with anything. Returns `None` when two
/// static dimensions conflict.
pub fn broadcast(a: &Shape, b: &Shape) -> Option<Shape> {
    let rank = a.rank().max(b.rank());
    let mut out: SmallVec<[Dim; 4]> = SmallVec::with_capacity(rank);

    for i in 0..rank {
        let da = if i < rank - a.rank() {
            Dim::Static(1)
        } else {
            a.dims[i - (rank - a.rank())]
        };
        let db = if i < rank - b.rank() {
            Dim::Static(1)
        } else {
            b.dims[i - (rank - b.rank())]
        };

        let d = match (da, db) {
            (Dim::Static(1), d) | (d, Dim::Static(1)) => d,
            (Dim::Static(x), Dim::Static(y)) if x == y => Dim::Static(x),
            (Dim::Static(_), Dim::Static(_)) => return None,
            (Dim::Dynamic, _) | (_, Dim::Dynamic) => Dim::Dynamic,
        };
        out.push(d);
    }

    Some(Shape { dims: out })
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            match d {
                Dim::Static(v) => write!(f, "{v}")?,
                Dim::Dynamic => write!(f, "?")?,
            }
        }
        write!(f, "]")
    }
}
