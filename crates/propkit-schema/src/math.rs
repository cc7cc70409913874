//! # Array and Vector Kinds
//!
//! Numeric arrays with a declared shape and dtype set, and 2D/3D vectors
//! (single or stacked) with direction shorthands and optional rescaling.

use propkit_core::{float_to_json, DType, Dim, NdArray, FieldError, PropertyError, SchemaDefinitionError};
use serde_json::Value as Json;

use crate::kind::{FieldContext, PropertyKind};
use crate::registry::TypeRegistry;
use crate::serialize::{DeserializeContext, SerializeContext};
use crate::value::Value;

/// Convert list/tuple/array input into JSON numbers for array parsing.
fn numeric_json(value: &Value) -> Option<Json> {
    match value {
        Value::Bool(b) => Some(Json::Bool(*b)),
        Value::Int(i) => Some(Json::from(*i)),
        Value::Float(x) => Some(float_to_json(*x)),
        Value::List(items) | Value::Tuple(items) => {
            items.iter().map(numeric_json).collect::<Option<Vec<_>>>().map(Json::Array)
        }
        Value::Array(array) => Some(array.to_json()),
        _ => None,
    }
}

fn to_ndarray(value: &Value) -> Option<NdArray> {
    match value {
        Value::Array(array) => Some(array.clone()),
        Value::List(_) | Value::Tuple(_) => NdArray::from_json(&numeric_json(value)?).ok(),
        _ => None,
    }
}

fn encode(value: &Value, ctx: &SerializeContext) -> Result<Json, PropertyError> {
    to_ndarray(value)
        .map(|array| array.to_json())
        .ok_or_else(|| ctx.malformed(format!("expected an array, found {}", value.type_name())))
}

fn decode(json: &Json, ctx: &DeserializeContext<'_>) -> Result<Value, PropertyError> {
    NdArray::from_json(json)
        .map(Value::Array)
        .map_err(|e| ctx.malformed(e.to_string()))
}

fn shape_text(shape: &[Dim]) -> String {
    let dims: Vec<String> = shape.iter().map(Dim::to_string).collect();
    format!("({})", dims.join(", "))
}

// ─── Array ──────────────────────────────────────────────────────────

/// A dense numeric array. Each axis of `shape` is fixed or a wildcard;
/// the array's dtype must be one of `dtypes`.
#[derive(Debug, Clone)]
pub struct Array {
    shape: Vec<Dim>,
    dtypes: Vec<DType>,
}

impl Default for Array {
    fn default() -> Self {
        Self {
            shape: vec![Dim::Any],
            dtypes: vec![DType::Float, DType::Int],
        }
    }
}

impl Array {
    /// One axis of any length, int or float elements.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shape(mut self, shape: impl Into<Vec<Dim>>) -> Self {
        self.shape = shape.into();
        self
    }

    pub fn dtypes(mut self, dtypes: impl Into<Vec<DType>>) -> Self {
        self.dtypes = dtypes.into();
        self
    }
}

impl PropertyKind for Array {
    fn label(&self) -> &'static str {
        "Array"
    }

    fn info(&self) -> String {
        let dtypes: Vec<&str> = self.dtypes.iter().map(DType::name).collect();
        format!(
            "a list or array of {} with shape {}",
            dtypes.join(", "),
            shape_text(&self.shape)
        )
    }

    fn validate(&self, ctx: &FieldContext<'_>, value: Value) -> Result<Value, FieldError> {
        let Some(array) = to_ndarray(&value) else {
            return Err(ctx.invalid(self, &value, ""));
        };
        if !self.dtypes.contains(&array.dtype()) {
            return Err(ctx.invalid(
                self,
                &value,
                &format!("Array dtype {} is not allowed.", array.dtype()),
            ));
        }
        if !array.matches_shape(&self.shape) {
            return Err(ctx.invalid(
                self,
                &value,
                &format!("Array shape {:?} does not match the declared shape.", array.shape()),
            ));
        }
        Ok(Value::Array(array))
    }

    fn to_json(&self, value: &Value, ctx: &mut SerializeContext) -> Result<Json, PropertyError> {
        encode(value, ctx)
    }

    fn from_json(&self, json: &Json, ctx: &mut DeserializeContext<'_>) -> Result<Value, PropertyError> {
        decode(json, ctx)
    }

    fn bind(&mut self, property: &str, _registry: &TypeRegistry) -> Result<(), SchemaDefinitionError> {
        let reason = if self.shape.is_empty() {
            "shape must have at least one axis"
        } else if self.dtypes.is_empty() {
            "at least one dtype must be allowed"
        } else {
            return Ok(());
        };
        Err(SchemaDefinitionError::InvalidKind {
            property: property.to_string(),
            reason: reason.into(),
        })
    }
}

// ─── Vector ─────────────────────────────────────────────────────────

/// Unit vector for a direction word. 2D vectors have no Z axis.
pub fn direction(word: &str, dim: usize) -> Option<Vec<f64>> {
    let xyz: [f64; 3] = match word.trim().to_ascii_uppercase().as_str() {
        "ZERO" => [0.0, 0.0, 0.0],
        "X" | "EAST" => [1.0, 0.0, 0.0],
        "Y" | "NORTH" => [0.0, 1.0, 0.0],
        "-X" | "WEST" => [-1.0, 0.0, 0.0],
        "-Y" | "SOUTH" => [0.0, -1.0, 0.0],
        "Z" | "UP" if dim == 3 => [0.0, 0.0, 1.0],
        "-Z" | "DOWN" if dim == 3 => [0.0, 0.0, -1.0],
        _ => return None,
    };
    Some(xyz[..dim].to_vec())
}

/// A 2D or 3D float vector, or a stack of them (`n x dim`). Direction
/// words such as `"up"` or `"-x"` are accepted as input.
#[derive(Debug, Clone)]
pub struct Vector {
    dim: usize,
    many: bool,
    length: Option<f64>,
}

impl Vector {
    pub fn vector2() -> Self {
        Self { dim: 2, many: false, length: None }
    }

    pub fn vector3() -> Self {
        Self { dim: 3, many: false, length: None }
    }

    pub fn vector2_array() -> Self {
        Self { dim: 2, many: true, length: None }
    }

    pub fn vector3_array() -> Self {
        Self { dim: 3, many: true, length: None }
    }

    /// Rescale every vector to this length.
    pub fn length(mut self, length: f64) -> Self {
        self.length = Some(length);
        self
    }

    fn declared_shape(&self) -> Vec<Dim> {
        if self.many {
            vec![Dim::Any, Dim::Fixed(self.dim)]
        } else {
            vec![Dim::Fixed(self.dim)]
        }
    }

    fn parse(&self, value: &Value) -> Option<NdArray> {
        match value {
            Value::Str(word) if !self.many => direction(word, self.dim).map(NdArray::vector),
            Value::List(items) | Value::Tuple(items)
                if self.many && !items.is_empty() && items.iter().all(|v| matches!(v, Value::Str(_))) =>
            {
                let mut data = Vec::with_capacity(items.len() * self.dim);
                for item in items {
                    data.extend(direction(item.as_str()?, self.dim)?);
                }
                NdArray::new(vec![items.len(), self.dim], data, DType::Float).ok()
            }
            _ => to_ndarray(value).map(|array| array.cast(DType::Float)),
        }
    }
}

impl PropertyKind for Vector {
    fn label(&self) -> &'static str {
        match (self.dim, self.many) {
            (2, false) => "Vector2",
            (2, true) => "Vector2Array",
            (_, false) => "Vector3",
            (_, true) => "Vector3Array",
        }
    }

    fn info(&self) -> String {
        if self.many {
            format!("a list of Vector{}", self.dim)
        } else {
            format!("a {}D Vector", self.dim)
        }
    }

    fn validate(&self, ctx: &FieldContext<'_>, value: Value) -> Result<Value, FieldError> {
        let Some(mut array) = self.parse(&value) else {
            return Err(ctx.invalid(self, &value, ""));
        };
        if !array.matches_shape(&self.declared_shape()) {
            return Err(ctx.invalid(self, &value, ""));
        }
        if let Some(length) = self.length {
            let mut zero = false;
            for row in array.rows_mut() {
                let norm = row.iter().map(|x| x * x).sum::<f64>().sqrt();
                if norm == 0.0 {
                    zero |= length != 0.0;
                    continue;
                }
                row.iter_mut().for_each(|x| *x = *x / norm * length);
            }
            if zero {
                return Err(ctx.invalid(
                    self,
                    &value,
                    "The vector must have a nonzero magnitude to be rescaled (division by zero).",
                ));
            }
        }
        Ok(Value::Array(array))
    }

    fn to_json(&self, value: &Value, ctx: &mut SerializeContext) -> Result<Json, PropertyError> {
        encode(value, ctx)
    }

    fn from_json(&self, json: &Json, ctx: &mut DeserializeContext<'_>) -> Result<Value, PropertyError> {
        decode(json, ctx)
    }
}
