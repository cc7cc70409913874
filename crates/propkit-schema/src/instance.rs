//! # Instance Kind
//!
//! A field holding one nested record. The nested type is named, not held,
//! and resolved through the registry the owning type was built against, so
//! a type may refer to itself or to types registered later.

use std::rc::Rc;

use propkit_core::{FieldError, PropertyError, SchemaDefinitionError};
use serde_json::Value as Json;

use crate::kind::{json_type, FieldContext, PropertyKind};
use crate::property::DefaultValue;
use crate::record::Record;
use crate::registry::{TypeRegistry, WeakTypeRegistry};
use crate::schema::RecordType;
use crate::serialize::{record_from_json, DeserializeContext, SerializeContext};
use crate::validate::{EqualityGuard, VisitSet};
use crate::value::Value;

/// A nested record of a named type or one of its subtypes.
///
/// Validation accepts an existing record unchanged, builds a record from a
/// map of keyword arguments, or passes any other value to the type's
/// positional field.
#[derive(Debug, Clone)]
pub struct Instance {
    type_name: String,
    auto_create: bool,
    registry: Option<WeakTypeRegistry>,
}

impl Instance {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            auto_create: false,
            registry: None,
        }
    }

    /// Default to a freshly constructed record with no arguments.
    pub fn auto_create(mut self) -> Self {
        self.auto_create = true;
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The nested record type, if it is registered.
    pub fn resolve(&self) -> Option<Rc<RecordType>> {
        self.registry.as_ref()?.upgrade()?.get(&self.type_name)
    }

    fn target(&self, ctx: &FieldContext<'_>) -> Result<Rc<RecordType>, FieldError> {
        self.resolve().ok_or_else(|| {
            ctx.failure(format!(
                "The '{}' property refers to record type '{}', which is not registered.",
                ctx.property(),
                self.type_name
            ))
        })
    }

    fn construction_failure(&self, ctx: &FieldContext<'_>, value: &Value, err: PropertyError) -> FieldError {
        let related = err.failures().to_vec();
        ctx.invalid(self, value, &format!("Construction failed: {err}"))
            .with_related(related)
    }

    /// Build a record of `target` from a non-record value.
    fn construct(&self, ctx: &FieldContext<'_>, target: &Rc<RecordType>, value: Value) -> Result<Value, FieldError> {
        match value {
            Value::Map(map) => {
                let mut kwargs = Vec::with_capacity(map.len());
                for (key, item) in map.iter() {
                    match key.as_str() {
                        Some(name) => kwargs.push((name.to_string(), item.clone())),
                        None => return Err(ctx.invalid(self, &Value::Map(map.clone()), "Keyword names must be strings.")),
                    }
                }
                Record::with(target, kwargs)
                    .map(Value::Record)
                    .map_err(|e| self.construction_failure(ctx, &Value::Map(map), e))
            }
            other => match target.positional() {
                Some(field) => Record::with(target, [(field.to_string(), other.clone())])
                    .map(Value::Record)
                    .map_err(|e| self.construction_failure(ctx, &other, e)),
                None => Err(ctx.invalid(self, &other, "")),
            },
        }
    }
}

impl PropertyKind for Instance {
    fn label(&self) -> &'static str {
        "Instance"
    }

    fn info(&self) -> String {
        format!("an instance of {}", self.type_name)
    }

    fn validate(&self, ctx: &FieldContext<'_>, value: Value) -> Result<Value, FieldError> {
        let target = self.target(ctx)?;
        let is_subtype = value.as_record().map(|r| r.record_type().is_a(&target));
        match is_subtype {
            Some(true) => Ok(value),
            Some(false) => Err(ctx.invalid(self, &value, "")),
            None => self.construct(ctx, &target, value),
        }
    }

    fn assert_valid(
        &self,
        ctx: &FieldContext<'_>,
        value: &Value,
        visits: &mut VisitSet,
        failures: &mut Vec<FieldError>,
    ) -> Result<(), PropertyError> {
        match value {
            Value::Record(record) => {
                let target = match self.target(ctx) {
                    Ok(target) => target,
                    Err(failure) => {
                        failures.push(failure);
                        return Ok(());
                    }
                };
                if !record.record_type().is_a(&target) {
                    failures.push(ctx.invalid(self, value, ""));
                    return Ok(());
                }
                failures.extend(record.collect_failures(visits)?);
                Ok(())
            }
            other => {
                failures.push(ctx.invalid(self, other, "Expected a record instance."));
                Ok(())
            }
        }
    }

    fn equal(&self, a: &Value, b: &Value, guard: &mut EqualityGuard) -> bool {
        match (a, b) {
            (Value::Record(x), Value::Record(y)) => x.equal_in(y, guard),
            _ => a == b,
        }
    }

    fn to_json(&self, value: &Value, ctx: &mut SerializeContext) -> Result<Json, PropertyError> {
        match value {
            Value::Record(record) => record.to_json_in(ctx),
            other => Err(ctx.malformed(format!("expected a record, found {}", other.type_name()))),
        }
    }

    fn from_json(&self, json: &Json, ctx: &mut DeserializeContext<'_>) -> Result<Value, PropertyError> {
        let target = self
            .resolve()
            .ok_or_else(|| SchemaDefinitionError::UnknownType {
                type_name: self.type_name.clone(),
            })?;
        match json {
            Json::String(uid) if ctx.in_uid_session() => ctx.resolve_uid(uid, &target).map(Value::Record),
            Json::Object(_) => record_from_json(&target, json, ctx).map(Value::Record),
            other => Err(ctx.malformed(format!(
                "expected an object for {}, found {}",
                self.type_name,
                json_type(other)
            ))),
        }
    }

    fn class_default(&self) -> Option<DefaultValue> {
        if !self.auto_create {
            return None;
        }
        let registry = self.registry.clone();
        let type_name = self.type_name.clone();
        Some(DefaultValue::Generator(Rc::new(move || {
            let target = registry
                .as_ref()
                .and_then(WeakTypeRegistry::upgrade)
                .and_then(|r| r.get(&type_name))
                .ok_or_else(|| SchemaDefinitionError::UnknownType {
                    type_name: type_name.clone(),
                })?;
            Record::new(&target).map(Value::Record)
        })))
    }

    fn bind(&mut self, _property: &str, registry: &TypeRegistry) -> Result<(), SchemaDefinitionError> {
        self.registry = Some(registry.downgrade());
        Ok(())
    }

    fn nested_type(&self) -> Option<String> {
        Some(self.type_name.clone())
    }
}
