//! # Serialization Pass
//!
//! Records encode to JSON objects: one key per stored property (each
//! through its own property's encoder, absent values omitted) plus an
//! optional `__class__` tag naming the record type.
//!
//! Nested records are written inline. A record met again while it is still
//! being written is a cycle and fails with `SelfReference`; shared acyclic
//! references are simply written twice. Graphs with cycles go through the
//! UID registry instead (see [`crate::uid`]), which swaps each identified
//! record for its identifier and writes the record once into a flat table.
//!
//! Decoding builds a fresh record, routes each key through its property's
//! decoder, and stores mutable values silently. Keys the schema does not
//! know are reported as warnings, or as errors in strict mode.

use std::fmt;
use std::rc::Rc;

use propkit_core::{float_to_json, DeserializeError, InstanceId, PropertyError};
use serde_json::{Map, Value as Json};

use crate::basic::DATETIME_FORMAT;
use crate::handlers::Notify;
use crate::kind::json_type;
use crate::record::Record;
use crate::registry::TypeRegistry;
use crate::schema::RecordType;
use crate::uid::{encode_reference, UidSession};
use crate::value::Value;

/// Key naming the record type in serialized objects.
pub const CLASS_KEY: &str = "__class__";

// ─── Encoding ───────────────────────────────────────────────────────

/// Options for encoding records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerializeOptions {
    /// Write the `__class__` tag on every record.
    pub include_class: bool,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self { include_class: true }
    }
}

/// State threaded through one encoding pass.
#[derive(Debug)]
pub struct SerializeContext {
    options: SerializeOptions,
    active: Vec<InstanceId>,
    registry: Option<Map<String, Json>>,
    property: String,
}

impl SerializeContext {
    pub fn new(options: SerializeOptions) -> Self {
        Self {
            options,
            active: Vec::new(),
            registry: None,
            property: String::new(),
        }
    }

    /// A context that collects identified records into a flat table.
    pub(crate) fn with_registry(options: SerializeOptions) -> Self {
        Self {
            registry: Some(Map::new()),
            ..Self::new(options)
        }
    }

    pub fn options(&self) -> SerializeOptions {
        self.options
    }

    /// A malformed-value error naming the property being encoded.
    pub fn malformed(&self, reason: impl Into<String>) -> PropertyError {
        DeserializeError::Malformed {
            property: self.property.clone(),
            reason: reason.into(),
        }
        .into()
    }

    pub(crate) fn with_property<T>(
        &mut self,
        name: &str,
        f: impl FnOnce(&mut Self) -> Result<T, PropertyError>,
    ) -> Result<T, PropertyError> {
        let outer = std::mem::replace(&mut self.property, name.to_string());
        let result = f(self);
        self.property = outer;
        result
    }

    /// Whether identified records are being collected into a uid table.
    pub(crate) fn has_registry(&self) -> bool {
        self.registry.is_some()
    }

    pub(crate) fn registry_mut(&mut self) -> Option<&mut Map<String, Json>> {
        self.registry.as_mut()
    }

    pub(crate) fn take_registry(&mut self) -> Option<Map<String, Json>> {
        self.registry.take()
    }
}

/// Encode a value with no property to guide it. Used for untyped members
/// of dictionaries.
pub(crate) fn value_to_json(value: &Value, ctx: &mut SerializeContext) -> Result<Json, PropertyError> {
    Ok(match value {
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Json::from(*i),
        Value::Float(x) => float_to_json(*x),
        Value::Str(s) => Json::String(s.clone()),
        Value::DateTime(dt) => Json::String(dt.format(DATETIME_FORMAT).to_string()),
        Value::Uuid(id) => Json::String(id.hyphenated().to_string()),
        Value::List(items) | Value::Tuple(items) => Json::Array(
            items
                .iter()
                .map(|item| value_to_json(item, ctx))
                .collect::<Result<_, _>>()?,
        ),
        Value::Set(set) => Json::Array(
            set.iter()
                .map(|item| value_to_json(item, ctx))
                .collect::<Result<_, _>>()?,
        ),
        Value::Map(map) => {
            let mut out = Map::new();
            for (key, item) in map.iter() {
                let key = key
                    .as_str()
                    .ok_or_else(|| ctx.malformed(format!("map key must be a string, found {}", key.type_name())))?;
                out.insert(key.to_string(), value_to_json(item, ctx)?);
            }
            Json::Object(out)
        }
        Value::Array(array) => array.to_json(),
        Value::Record(record) => record.to_json_in(ctx)?,
    })
}

impl Record {
    /// Encode the record and everything it reaches.
    pub fn serialize(&self, options: SerializeOptions) -> Result<Json, PropertyError> {
        self.to_json_in(&mut SerializeContext::new(options))
    }

    pub(crate) fn to_json_in(&self, ctx: &mut SerializeContext) -> Result<Json, PropertyError> {
        if ctx.has_registry() && self.record_type().has_identity() {
            return encode_reference(self, ctx);
        }
        if ctx.active.contains(&self.id()) {
            return Err(PropertyError::SelfReference {
                type_name: self.type_name().to_string(),
            });
        }
        ctx.active.push(self.id());
        let result = self.fields_to_json(ctx);
        ctx.active.pop();
        result
    }

    /// The record's own object: class tag and stored values.
    pub(crate) fn fields_to_json(&self, ctx: &mut SerializeContext) -> Result<Json, PropertyError> {
        let mut out = Map::new();
        if ctx.options.include_class {
            out.insert(CLASS_KEY.to_string(), Json::String(self.type_name().to_string()));
        }
        let ty = Rc::clone(self.record_type());
        for prop in ty.properties().iter().filter(|p| !p.is_dynamic()) {
            let Some(value) = self.stored(prop.name()) else {
                continue;
            };
            if let Some(json) = prop.serialize(&value, ctx)? {
                out.insert(prop.name().to_string(), json);
            }
        }
        Ok(Json::Object(out))
    }
}

// ─── Decoding ───────────────────────────────────────────────────────

/// Options for decoding records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeserializeOptions {
    /// Honour `__class__` tags naming a registered subtype.
    pub trusted: bool,
    /// Turn warnings into errors.
    pub strict: bool,
    /// Run `validate()` on the decoded record.
    pub assert_valid: bool,
}

/// A non-fatal problem found while decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeserializeWarning {
    /// Keys the schema does not recognize.
    UnusedKeys { type_name: String, keys: Vec<String> },
    /// A trusted `__class__` tag named no registered type.
    UnknownClass { class_name: String },
}

impl fmt::Display for DeserializeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnusedKeys { type_name, keys } => {
                write!(f, "unused properties while deserializing {type_name}: {}", keys.join(", "))
            }
            Self::UnknownClass { class_name } => write!(f, "class '{class_name}' is not registered"),
        }
    }
}

/// A decoded record with the warnings raised while building it.
#[derive(Debug)]
pub struct Deserialized {
    pub record: Record,
    pub warnings: Vec<DeserializeWarning>,
}

/// State threaded through one decoding pass.
pub struct DeserializeContext<'a> {
    pub(crate) types: &'a TypeRegistry,
    pub(crate) options: DeserializeOptions,
    warnings: Vec<DeserializeWarning>,
    property: String,
    pub(crate) session: Option<UidSession<'a>>,
}

impl<'a> DeserializeContext<'a> {
    pub fn new(types: &'a TypeRegistry, options: DeserializeOptions) -> Self {
        Self {
            types,
            options,
            warnings: Vec::new(),
            property: String::new(),
            session: None,
        }
    }

    pub fn options(&self) -> DeserializeOptions {
        self.options
    }

    /// Registry used to resolve nested and tagged types.
    pub fn types(&self) -> &'a TypeRegistry {
        self.types
    }

    pub fn warnings(&self) -> &[DeserializeWarning] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<DeserializeWarning> {
        self.warnings
    }

    /// A malformed-value error naming the property being decoded.
    pub fn malformed(&self, reason: impl Into<String>) -> PropertyError {
        DeserializeError::Malformed {
            property: self.property.clone(),
            reason: reason.into(),
        }
        .into()
    }

    pub(crate) fn with_property<T>(
        &mut self,
        name: &str,
        f: impl FnOnce(&mut Self) -> Result<T, PropertyError>,
    ) -> Result<T, PropertyError> {
        let outer = std::mem::replace(&mut self.property, name.to_string());
        let result = f(self);
        self.property = outer;
        result
    }

    pub(crate) fn in_uid_session(&self) -> bool {
        self.session.is_some()
    }

    /// The type to build for `obj`: `expected`, or the registered subtype
    /// its class tag names when decoding trusted input.
    pub(crate) fn resolve_class(
        &mut self,
        expected: &Rc<RecordType>,
        obj: &Map<String, Json>,
    ) -> Result<Rc<RecordType>, PropertyError> {
        if !self.options.trusted {
            return Ok(Rc::clone(expected));
        }
        let Some(class_name) = obj.get(CLASS_KEY).and_then(Json::as_str) else {
            return Ok(Rc::clone(expected));
        };
        match self.types.get(class_name) {
            Some(tagged) if tagged.is_a(expected) => Ok(tagged),
            Some(_) => Err(self.malformed(format!(
                "class '{class_name}' is not a subtype of {}",
                expected.name()
            ))),
            None if self.options.strict => Err(DeserializeError::UnknownClass {
                class_name: class_name.to_string(),
            }
            .into()),
            None => {
                tracing::warn!(class_name = %class_name, expected = %expected.name(), "class tag is not registered; decoding as the expected type");
                self.warnings.push(DeserializeWarning::UnknownClass {
                    class_name: class_name.to_string(),
                });
                Ok(Rc::clone(expected))
            }
        }
    }

    pub(crate) fn unused_keys(&mut self, type_name: &str, keys: Vec<String>) -> Result<(), PropertyError> {
        if keys.is_empty() {
            return Ok(());
        }
        if self.options.strict {
            return Err(DeserializeError::UnusedKeys {
                type_name: type_name.to_string(),
                keys,
            }
            .into());
        }
        if self.types.config().warn_unused_keys {
            tracing::warn!(type_name = %type_name, keys = ?keys, "unused properties while deserializing");
        }
        self.warnings.push(DeserializeWarning::UnusedKeys {
            type_name: type_name.to_string(),
            keys,
        });
        Ok(())
    }
}

impl fmt::Debug for DeserializeContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeserializeContext")
            .field("options", &self.options)
            .field("warnings", &self.warnings)
            .field("uid_session", &self.session.is_some())
            .finish_non_exhaustive()
    }
}

/// Decode a record of type `ty` (or, when trusted, a tagged subtype).
pub fn deserialize(
    ty: &Rc<RecordType>,
    data: &Json,
    types: &TypeRegistry,
    options: DeserializeOptions,
) -> Result<Deserialized, PropertyError> {
    let mut ctx = DeserializeContext::new(types, options);
    let record = record_from_json(ty, data, &mut ctx)?;
    if options.assert_valid {
        record.validate()?;
    }
    Ok(Deserialized {
        record,
        warnings: ctx.into_warnings(),
    })
}

pub(crate) fn record_from_json(
    ty: &Rc<RecordType>,
    json: &Json,
    ctx: &mut DeserializeContext<'_>,
) -> Result<Record, PropertyError> {
    let obj = json.as_object().ok_or_else(|| DeserializeError::NotAnObject {
        type_name: ty.name().to_string(),
        found: json_type(json).to_string(),
    })?;
    let ty = ctx.resolve_class(ty, obj)?;
    let record = Record::blank(&ty)?;
    populate(&record, obj, ctx)?;
    record.initialize()?;
    Ok(record)
}

/// Decode `obj` into an already constructed record. Mutable values are
/// stored silently, read-only values are validated and written directly.
pub(crate) fn populate(
    record: &Record,
    obj: &Map<String, Json>,
    ctx: &mut DeserializeContext<'_>,
) -> Result<(), PropertyError> {
    let ty = Rc::clone(record.record_type());
    let mut kwargs = Vec::new();
    let mut unused = Vec::new();
    for (key, raw) in obj {
        if key == CLASS_KEY {
            continue;
        }
        let name = ty.renamed_target(key).unwrap_or(key);
        let Some(prop) = ty.property(name).filter(|p| !p.is_dynamic()) else {
            unused.push(key.clone());
            continue;
        };
        let Some(value) = prop.deserialize(raw, ctx)? else {
            continue;
        };
        if prop.is_read_only() {
            let value = prop.validate(Some(record), value)?;
            record.store_unchecked(prop.name(), value);
        } else {
            kwargs.push((prop.name().to_string(), value));
        }
    }
    ctx.unused_keys(ty.name(), unused)?;
    record.apply_keywords(kwargs, Notify::Silent)
}
