//! # Property Descriptors
//!
//! A [`Property`] is immutable schema metadata for one field: its kind,
//! documentation, required flag, default, access mode and optional
//! serialization overrides. Descriptors are shared read-only by every
//! instance of a record type.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use propkit_core::{FieldError, PropertyError, SchemaDefinitionError};
use serde::Serialize;
use serde_json::Value as Json;

use crate::kind::{FieldContext, PropertyKind};
use crate::record::Record;
use crate::registry::TypeRegistry;
use crate::serialize::{DeserializeContext, SerializeContext};
use crate::validate::{EqualityGuard, VisitSet};
use crate::value::Value;

pub type Serializer = Rc<dyn Fn(&Value) -> Result<Json, PropertyError>>;
pub type Deserializer = Rc<dyn Fn(&Json) -> Result<Value, PropertyError>>;
pub type Getter = Rc<dyn Fn(&Record) -> Result<Option<Value>, PropertyError>>;
pub type Setter = Rc<dyn Fn(&Record, Value) -> Result<(), PropertyError>>;

// ─── Defaults ───────────────────────────────────────────────────────

/// A default value, or a generator called once per instance.
#[derive(Clone)]
pub enum DefaultValue {
    Value(Value),
    Generator(Rc<dyn Fn() -> Result<Value, PropertyError>>),
}

impl DefaultValue {
    pub fn generator<F>(func: F) -> Self
    where
        F: Fn() -> Value + 'static,
    {
        Self::Generator(Rc::new(move || Ok(func())))
    }

    /// Produce the value. Generators run on every call.
    pub fn resolve(&self) -> Result<Value, PropertyError> {
        match self {
            Self::Value(value) => Ok(value.clone()),
            Self::Generator(func) => func(),
        }
    }

    pub fn is_generator(&self) -> bool {
        matches!(self, Self::Generator(_))
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Generator(_) => f.write_str("Generator(..)"),
        }
    }
}

// ─── Access ─────────────────────────────────────────────────────────

/// How a property is stored and written.
#[derive(Clone, Default)]
pub enum Access {
    /// Validated on every write, notifies listeners.
    #[default]
    Mutable,
    /// Materialized from the default at construction; never assigned.
    ReadOnly,
    /// Computed on read; writes go to the setter if there is one.
    Dynamic {
        getter: Getter,
        setter: Option<Setter>,
    },
}

impl fmt::Debug for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mutable => f.write_str("Mutable"),
            Self::ReadOnly => f.write_str("ReadOnly"),
            Self::Dynamic { setter, .. } => f
                .debug_struct("Dynamic")
                .field("settable", &setter.is_some())
                .finish(),
        }
    }
}

/// Documentation classification of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Required,
    Optional,
    Immutable,
}

// ─── Property ───────────────────────────────────────────────────────

/// Schema descriptor for one field.
pub struct Property {
    name: String,
    doc: String,
    required: bool,
    default: Option<DefaultValue>,
    access: Access,
    kind: Box<dyn PropertyKind>,
    serializer: Option<Serializer>,
    deserializer: Option<Deserializer>,
    tags: BTreeMap<String, Json>,
}

impl Property {
    /// A required, mutable property.
    pub fn new(doc: impl Into<String>, kind: impl PropertyKind + 'static) -> Self {
        Self {
            name: String::new(),
            doc: doc.into(),
            required: true,
            default: None,
            access: Access::Mutable,
            kind: Box::new(kind),
            serializer: None,
            deserializer: None,
            tags: BTreeMap::new(),
        }
    }

    /// A property computed by `getter` and validated by `kind`.
    pub fn dynamic<F>(doc: impl Into<String>, kind: impl PropertyKind + 'static, getter: F) -> Self
    where
        F: Fn(&Record) -> Result<Option<Value>, PropertyError> + 'static,
    {
        let mut prop = Self::new(doc, kind);
        prop.required = false;
        prop.access = Access::Dynamic {
            getter: Rc::new(getter),
            setter: None,
        };
        prop
    }

    /// Writes to a dynamic property go through `setter` after validation.
    /// No effect on stored properties.
    pub fn with_setter<F>(mut self, setter: F) -> Self
    where
        F: Fn(&Record, Value) -> Result<(), PropertyError> + 'static,
    {
        if let Access::Dynamic { setter: slot, .. } = &mut self.access {
            *slot = Some(Rc::new(setter));
        }
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn optional(self) -> Self {
        self.required(false)
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Value(value.into()));
        self
    }

    /// Default computed fresh for every instance.
    pub fn default_with<F>(mut self, func: F) -> Self
    where
        F: Fn() -> Value + 'static,
    {
        self.default = Some(DefaultValue::generator(func));
        self
    }

    /// Materialize the default at construction and reject every write.
    pub fn read_only(mut self) -> Self {
        self.access = Access::ReadOnly;
        self
    }

    pub fn serializer<F>(mut self, func: F) -> Self
    where
        F: Fn(&Value) -> Result<Json, PropertyError> + 'static,
    {
        self.serializer = Some(Rc::new(func));
        self
    }

    pub fn deserializer<F>(mut self, func: F) -> Self
    where
        F: Fn(&Json) -> Result<Value, PropertyError> + 'static,
    {
        self.deserializer = Some(Rc::new(func));
        self
    }

    /// Attach free-form metadata.
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<Json>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    // ─── Accessors ──────────────────────────────────────────────────

    /// Name assigned by the schema builder; empty before binding.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn doc(&self) -> &str {
        &self.doc
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn access(&self) -> &Access {
        &self.access
    }

    pub fn kind(&self) -> &dyn PropertyKind {
        self.kind.as_ref()
    }

    pub fn tags(&self) -> &BTreeMap<String, Json> {
        &self.tags
    }

    pub fn is_mutable(&self) -> bool {
        matches!(self.access, Access::Mutable)
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self.access, Access::ReadOnly)
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self.access, Access::Dynamic { .. })
    }

    /// Default declared on the property itself.
    pub fn explicit_default(&self) -> Option<&DefaultValue> {
        self.default.as_ref()
    }

    /// Declared default, falling back to the kind's own.
    pub fn default_value(&self) -> Option<DefaultValue> {
        self.default.clone().or_else(|| self.kind.class_default())
    }

    pub fn classification(&self) -> Classification {
        if self.is_read_only() {
            Classification::Immutable
        } else if self.required {
            Classification::Required
        } else {
            Classification::Optional
        }
    }

    pub fn info(&self) -> String {
        self.kind.info()
    }

    pub fn nested_type(&self) -> Option<String> {
        self.kind.nested_type()
    }

    pub(crate) fn clear_default(&mut self) {
        self.default = None;
    }

    /// Assign the name and let the kind check its configuration. A
    /// descriptor keeps its first name for life.
    pub(crate) fn bind(&mut self, name: &str, registry: &TypeRegistry) -> Result<(), SchemaDefinitionError> {
        if !self.name.is_empty() && self.name != name {
            return Err(SchemaDefinitionError::NameReassigned {
                from: self.name.clone(),
                to: name.to_string(),
            });
        }
        self.name = name.to_string();
        self.kind.bind(name, registry)
    }

    // ─── Behavior ───────────────────────────────────────────────────

    pub fn validate(&self, owner: Option<&Record>, value: Value) -> Result<Value, FieldError> {
        self.kind.validate(&FieldContext::new(owner, &self.name), value)
    }

    pub fn assert_valid(
        &self,
        owner: Option<&Record>,
        value: &Value,
        visits: &mut VisitSet,
        failures: &mut Vec<FieldError>,
    ) -> Result<(), PropertyError> {
        self.kind
            .assert_valid(&FieldContext::new(owner, &self.name), value, visits, failures)
    }

    pub fn equal(&self, a: &Value, b: &Value) -> bool {
        self.equal_in(a, b, &mut EqualityGuard::default())
    }

    pub(crate) fn equal_in(&self, a: &Value, b: &Value, guard: &mut EqualityGuard) -> bool {
        self.kind.equal(a, b, guard)
    }

    /// Encode a value. `None` means the value is omitted.
    pub fn serialize(&self, value: &Value, ctx: &mut SerializeContext) -> Result<Option<Json>, PropertyError> {
        let json = match &self.serializer {
            Some(func) => func(value)?,
            None => ctx.with_property(&self.name, |ctx| self.kind.to_json(value, ctx))?,
        };
        Ok((!json.is_null()).then_some(json))
    }

    /// Decode a value. JSON `null` decodes to no value.
    pub fn deserialize(&self, json: &Json, ctx: &mut DeserializeContext<'_>) -> Result<Option<Value>, PropertyError> {
        if json.is_null() {
            return Ok(None);
        }
        let value = match &self.deserializer {
            Some(func) => func(json)?,
            None => ctx.with_property(&self.name, |ctx| self.kind.from_json(json, ctx))?,
        };
        Ok(Some(value))
    }
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("required", &self.required)
            .field("access", &self.access)
            .field("default", &self.default)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::{Integer, Text};

    #[test]
    fn test_classification() {
        let registry = TypeRegistry::new();
        let mut required = Property::new("", Integer::new());
        required.bind("a", &registry).unwrap();
        assert_eq!(required.classification(), Classification::Required);
        assert_eq!(
            Property::new("", Integer::new()).optional().classification(),
            Classification::Optional
        );
        assert_eq!(
            Property::new("", Integer::new()).read_only().classification(),
            Classification::Immutable
        );
    }

    #[test]
    fn test_name_is_assigned_once() {
        let registry = TypeRegistry::new();
        let mut prop = Property::new("doc", Text::new());
        prop.bind("first", &registry).unwrap();
        prop.bind("first", &registry).unwrap();
        let err = prop.bind("second", &registry).unwrap_err();
        assert!(matches!(err, SchemaDefinitionError::NameReassigned { .. }));
        assert_eq!(prop.name(), "first");
    }

    #[test]
    fn test_generator_defaults_run_each_time() {
        use std::cell::Cell;
        let counter = Rc::new(Cell::new(0));
        let seen = Rc::clone(&counter);
        let prop = Property::new("", Integer::new()).default_with(move || {
            seen.set(seen.get() + 1);
            Value::Int(seen.get())
        });
        let default = prop.default_value().unwrap();
        assert_eq!(default.resolve().unwrap(), Value::Int(1));
        assert_eq!(default.resolve().unwrap(), Value::Int(2));
        assert!(default.is_generator());
        assert_eq!(counter.get(), 2);
    }

    #[test]
    fn test_validate_without_owner_names_property() {
        let registry = TypeRegistry::new();
        let mut prop = Property::new("", Integer::new().min(0));
        prop.bind("count", &registry).unwrap();
        let err = prop.validate(None, Value::Int(-1)).unwrap_err();
        assert_eq!(err.property, "count");
        assert!(err.owner.is_none());
        assert!(err.message.contains("'count'"));
    }
}
