//! # Property Kinds
//!
//! [`PropertyKind`] is the seam every field type implements: a validator
//! that coerces raw input, an equality rule, and a JSON codec. Built-in
//! kinds live in [`crate::basic`], [`crate::math`], [`crate::container`],
//! [`crate::instance`] and [`crate::union`]; external collaborators (file
//! or image fields, for instance) implement the same trait.
//!
//! A kind never knows its own property name until the schema builder calls
//! [`PropertyKind::bind`]. Validation receives a [`FieldContext`] naming the
//! property and the owning record so failures can say where they happened.

use std::fmt;

use propkit_core::{FieldError, PropertyError, SchemaDefinitionError};
use serde_json::Value as Json;

use crate::property::DefaultValue;
use crate::record::Record;
use crate::registry::TypeRegistry;
use crate::serialize::{DeserializeContext, SerializeContext};
use crate::validate::{EqualityGuard, VisitSet};
use crate::value::Value;

/// Where a value is being validated: which property, on which record.
#[derive(Clone, Copy)]
pub struct FieldContext<'a> {
    owner: Option<&'a Record>,
    property: &'a str,
}

impl<'a> FieldContext<'a> {
    pub fn new(owner: Option<&'a Record>, property: &'a str) -> Self {
        Self { owner, property }
    }

    /// The record the property belongs to. `None` for schema defaults and
    /// detached checks.
    pub fn owner(&self) -> Option<&'a Record> {
        self.owner
    }

    pub fn property(&self) -> &'a str {
        self.property
    }

    /// A failure with a free-form message.
    pub fn failure(&self, message: impl Into<String>) -> FieldError {
        FieldError::invalid(self.property, self.owner.map(Record::owner), message)
    }

    /// The standard rejection message: what the property must be and what
    /// was given, followed by an optional detail sentence.
    pub fn invalid(&self, kind: &dyn PropertyKind, value: &Value, extra: &str) -> FieldError {
        let mut message = match self.owner {
            Some(owner) => format!(
                "The '{}' property of a {} instance must be {}. A value of {} <{}> was specified.",
                self.property,
                owner.type_name(),
                kind.info(),
                value,
                value.type_name()
            ),
            None => format!(
                "The '{}' property must be {}. A value of {} <{}> was specified.",
                self.property,
                kind.info(),
                value,
                value.type_name()
            ),
        };
        if !extra.is_empty() {
            message.push(' ');
            message.push_str(extra);
        }
        self.failure(message)
    }
}

impl fmt::Debug for FieldContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldContext")
            .field("owner", &self.owner.map(Record::owner))
            .field("property", &self.property)
            .finish()
    }
}

/// Behavior of one field type.
pub trait PropertyKind: fmt::Debug {
    /// Short kind name, e.g. `"Integer"`.
    fn label(&self) -> &'static str;

    /// What an accepted value looks like, phrased to follow "must be".
    fn info(&self) -> String;

    /// Coerce `value` into the accepted form or explain why it is rejected.
    fn validate(&self, ctx: &FieldContext<'_>, value: Value) -> Result<Value, FieldError>;

    /// Whole-object validation of a stored value. Field failures are pushed
    /// onto `failures`; only structural errors are returned. Kinds holding
    /// records recurse through `visits`.
    fn assert_valid(
        &self,
        ctx: &FieldContext<'_>,
        value: &Value,
        _visits: &mut VisitSet,
        failures: &mut Vec<FieldError>,
    ) -> Result<(), PropertyError> {
        if let Err(failure) = self.validate(ctx, value.clone()) {
            failures.push(failure);
        }
        Ok(())
    }

    /// Whether two stored values are the same for change detection.
    fn equal(&self, a: &Value, b: &Value, _guard: &mut EqualityGuard) -> bool {
        a == b
    }

    /// Encode a stored value.
    fn to_json(&self, value: &Value, ctx: &mut SerializeContext) -> Result<Json, PropertyError>;

    /// Decode a non-null JSON value. The result is validated by the caller.
    fn from_json(&self, json: &Json, ctx: &mut DeserializeContext<'_>) -> Result<Value, PropertyError>;

    /// Default carried by the kind itself, used when the property declares none.
    fn class_default(&self) -> Option<DefaultValue> {
        None
    }

    /// Called once by the schema builder with the property name and the
    /// registry the type is built against. Configuration checks go here.
    fn bind(&mut self, _property: &str, _registry: &TypeRegistry) -> Result<(), SchemaDefinitionError> {
        Ok(())
    }

    /// Name of the record type this kind holds, for documentation.
    fn nested_type(&self) -> Option<String> {
        None
    }

    /// Whether copy-on-write proxies may be taken on values of this kind.
    fn observes_mutations(&self) -> bool {
        false
    }
}

/// Describe a JSON value's type for error messages.
pub(crate) fn json_type(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}
