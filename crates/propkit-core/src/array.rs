//! # Numeric Arrays
//!
//! A small dense n-dimensional array used by array and vector properties.
//! Elements are stored row-major as `f64`; [`DType`] records whether the
//! array holds booleans, integers or floats so that serialization and dtype
//! checks behave like a typed array.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use thiserror::Error;

/// Element type of an array. Ordered by promotion: mixing kinds yields the
/// largest one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    /// `true`/`false`, stored as 1.0/0.0.
    Bool,
    /// Whole numbers.
    Int,
    /// Floating point.
    Float,
}

impl DType {
    /// The wider of two dtypes.
    pub fn promote(self, other: DType) -> DType {
        self.max(other)
    }

    /// Lowercase name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One axis of a declared shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dim {
    /// Any length.
    Any,
    /// Exactly this length.
    Fixed(usize),
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::Fixed(n) => write!(f, "{n}"),
        }
    }
}

/// Array construction failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArrayError {
    /// Nested sequences of unequal length or depth.
    #[error("nested sequences are ragged")]
    Ragged,
    /// An element is not a number or boolean.
    #[error("array elements must be numbers or booleans")]
    NotNumeric,
    /// Data length does not match the shape.
    #[error("shape {shape:?} needs {expected} elements, got {found}")]
    ShapeMismatch {
        /// Declared shape.
        shape: Vec<usize>,
        /// Element count the shape requires.
        expected: usize,
        /// Element count supplied.
        found: usize,
    },
}

/// Dense row-major array.
#[derive(Debug, Clone, PartialEq)]
pub struct NdArray {
    shape: Vec<usize>,
    data: Vec<f64>,
    dtype: DType,
}

impl NdArray {
    /// Build an array, checking that the data fills the shape.
    pub fn new(shape: Vec<usize>, data: Vec<f64>, dtype: DType) -> Result<Self, ArrayError> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(ArrayError::ShapeMismatch {
                shape,
                expected,
                found: data.len(),
            });
        }
        Ok(Self { shape, data, dtype })
    }

    /// A one-dimensional float array.
    pub fn vector(data: Vec<f64>) -> Self {
        Self {
            shape: vec![data.len()],
            data,
            dtype: DType::Float,
        }
    }

    /// Axis lengths.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Row-major elements.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Element type.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Number of axes.
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Whether the shape matches a declared shape, axis by axis.
    pub fn matches_shape(&self, declared: &[Dim]) -> bool {
        declared.len() == self.shape.len()
            && declared.iter().zip(&self.shape).all(|(dim, len)| match dim {
                Dim::Any => true,
                Dim::Fixed(n) => n == len,
            })
    }

    /// Convert to another dtype. Casting to `Int` truncates, casting to
    /// `Bool` maps non-zero to `true`.
    pub fn cast(mut self, dtype: DType) -> Self {
        match dtype {
            DType::Float => {}
            DType::Int => self.data.iter_mut().for_each(|x| *x = x.trunc()),
            DType::Bool => self
                .data
                .iter_mut()
                .for_each(|x| *x = if *x != 0.0 { 1.0 } else { 0.0 }),
        }
        self.dtype = dtype;
        self
    }

    /// Mutable rows along the last axis.
    pub fn rows_mut(&mut self) -> std::slice::ChunksMut<'_, f64> {
        let width = self.shape.last().copied().unwrap_or(1).max(1);
        self.data.chunks_mut(width)
    }

    /// Parse nested JSON lists of numbers or booleans. `"nan"`, `"inf"` and
    /// `"-inf"` are accepted as float elements.
    pub fn from_json(json: &Json) -> Result<Self, ArrayError> {
        let mut walk = Walk::default();
        walk.visit(json, 0)?;
        let dtype = walk.dtype.unwrap_or(DType::Float);
        Self::new(walk.shape, walk.data, dtype)
    }

    /// Nested JSON lists. Non-finite floats become strings.
    pub fn to_json(&self) -> Json {
        self.encode(0, 0).0
    }

    fn encode(&self, axis: usize, offset: usize) -> (Json, usize) {
        if axis == self.shape.len() {
            let x = self.data.get(offset).copied().unwrap_or(0.0);
            let leaf = match self.dtype {
                DType::Bool => Json::Bool(x != 0.0),
                DType::Int => Json::from(x as i64),
                DType::Float => float_to_json(x),
            };
            return (leaf, offset + 1);
        }
        let mut items = Vec::with_capacity(self.shape[axis]);
        let mut cursor = offset;
        for _ in 0..self.shape[axis] {
            let (item, next) = self.encode(axis + 1, cursor);
            items.push(item);
            cursor = next;
        }
        (Json::Array(items), cursor)
    }
}

/// Encode a float, mapping non-finite values to strings.
pub fn float_to_json(x: f64) -> Json {
    match serde_json::Number::from_f64(x) {
        Some(n) => Json::Number(n),
        None if x.is_nan() => Json::String("nan".into()),
        None if x > 0.0 => Json::String("inf".into()),
        None => Json::String("-inf".into()),
    }
}

/// Decode a float written by [`float_to_json`].
pub fn float_from_json(json: &Json) -> Option<f64> {
    match json {
        Json::Number(n) => n.as_f64(),
        Json::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "nan" => Some(f64::NAN),
            "inf" | "infinity" => Some(f64::INFINITY),
            "-inf" | "-infinity" => Some(f64::NEG_INFINITY),
            _ => None,
        },
        _ => None,
    }
}

#[derive(Default)]
struct Walk {
    shape: Vec<usize>,
    data: Vec<f64>,
    dtype: Option<DType>,
    leaf_depth: Option<usize>,
}

impl Walk {
    fn visit(&mut self, json: &Json, depth: usize) -> Result<(), ArrayError> {
        if let Json::Array(items) = json {
            if self.leaf_depth == Some(depth) {
                return Err(ArrayError::Ragged);
            }
            match self.shape.get(depth) {
                Some(len) if *len != items.len() => return Err(ArrayError::Ragged),
                Some(_) => {}
                None if self.shape.len() == depth => self.shape.push(items.len()),
                None => return Err(ArrayError::Ragged),
            }
            for item in items {
                self.visit(item, depth + 1)?;
            }
            return Ok(());
        }

        let (x, kind) = match json {
            Json::Bool(b) => (if *b { 1.0 } else { 0.0 }, DType::Bool),
            Json::Number(n) if n.is_i64() || n.is_u64() => {
                (n.as_f64().ok_or(ArrayError::NotNumeric)?, DType::Int)
            }
            other => (float_from_json(other).ok_or(ArrayError::NotNumeric)?, DType::Float),
        };
        match self.leaf_depth {
            Some(d) if d != depth => return Err(ArrayError::Ragged),
            Some(_) => {}
            None if self.shape.len() > depth => return Err(ArrayError::Ragged),
            None => self.leaf_depth = Some(depth),
        }
        self.dtype = Some(self.dtype.map_or(kind, |d| d.promote(kind)));
        self.data.push(x);
        Ok(())
    }
}
