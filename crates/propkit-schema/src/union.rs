//! # Union Kind
//!
//! A value accepted by any of several candidate properties. Candidates are
//! tried in declaration order and the first that accepts wins, so order is
//! a tie-break: `[Text, Integer]` keeps `"5"` a string while
//! `[Integer, Text]` with `Integer::cast` would turn it into `5`.

use propkit_core::{FieldError, PropertyError, SchemaDefinitionError};
use serde_json::Value as Json;

use crate::kind::{FieldContext, PropertyKind};
use crate::property::{DefaultValue, Property};
use crate::registry::TypeRegistry;
use crate::serialize::{DeserializeContext, SerializeContext, SerializeOptions, CLASS_KEY};
use crate::validate::{EqualityGuard, VisitSet};
use crate::value::Value;

/// Ordered alternatives.
#[derive(Debug)]
pub struct Union {
    candidates: Vec<Property>,
}

impl Union {
    pub fn new(candidates: Vec<Property>) -> Self {
        Self { candidates }
    }

    /// Candidates from bare kinds.
    pub fn of(kinds: Vec<Box<dyn PropertyKind>>) -> Self {
        Self::new(kinds.into_iter().map(|kind| Property::new("", BoxedKind(kind))).collect())
    }

    pub fn candidates(&self) -> &[Property] {
        &self.candidates
    }

    /// Info text of every candidate that carries a default, when more than
    /// one does. Only the first is used.
    pub fn default_conflicts(&self) -> Vec<String> {
        let with_defaults: Vec<String> = self
            .candidates
            .iter()
            .filter(|c| c.default_value().is_some())
            .map(Property::info)
            .collect();
        if with_defaults.len() > 1 {
            with_defaults
        } else {
            Vec::new()
        }
    }

    /// The first candidate that accepts `value`, validated without an owner.
    fn accepting(&self, value: &Value) -> Option<&Property> {
        self.candidates
            .iter()
            .find(|c| c.validate(None, value.clone()).is_ok())
    }
}

impl PropertyKind for Union {
    fn label(&self) -> &'static str {
        "Union"
    }

    fn info(&self) -> String {
        let infos: Vec<String> = self.candidates.iter().map(Property::info).collect();
        infos.join(" or ")
    }

    fn validate(&self, ctx: &FieldContext<'_>, value: Value) -> Result<Value, FieldError> {
        let mut rejected = Vec::with_capacity(self.candidates.len());
        for candidate in &self.candidates {
            match candidate.kind().validate(ctx, value.clone()) {
                Ok(accepted) => return Ok(accepted),
                Err(failure) => rejected.push(failure),
            }
        }
        Err(ctx.invalid(self, &value, "").with_related(rejected))
    }

    fn assert_valid(
        &self,
        ctx: &FieldContext<'_>,
        value: &Value,
        visits: &mut VisitSet,
        failures: &mut Vec<FieldError>,
    ) -> Result<(), PropertyError> {
        let candidate = self
            .candidates
            .iter()
            .find(|c| c.kind().validate(ctx, value.clone()).is_ok());
        match candidate {
            Some(candidate) => candidate.kind().assert_valid(ctx, value, visits, failures),
            None => {
                if let Err(failure) = self.validate(ctx, value.clone()) {
                    failures.push(failure);
                }
                Ok(())
            }
        }
    }

    fn equal(&self, a: &Value, b: &Value, guard: &mut EqualityGuard) -> bool {
        self.candidates.iter().any(|c| c.equal_in(a, b, guard))
    }

    fn to_json(&self, value: &Value, ctx: &mut SerializeContext) -> Result<Json, PropertyError> {
        let candidate = self
            .accepting(value)
            .ok_or_else(|| ctx.malformed(format!("no union candidate accepts a {}", value.type_name())))?;
        Ok(candidate.serialize(value, ctx)?.unwrap_or(Json::Null))
    }

    fn from_json(&self, json: &Json, ctx: &mut DeserializeContext<'_>) -> Result<Value, PropertyError> {
        if let Some(class) = json.get(CLASS_KEY).and_then(Json::as_str) {
            let tagged = self.candidates.iter().find(|c| {
                c.nested_type().is_some_and(|nested| {
                    nested == class
                        || ctx
                            .types()
                            .get(class)
                            .zip(ctx.types().get(&nested))
                            .is_some_and(|(tag, nested)| tag.is_a(&nested))
                })
            });
            if let Some(candidate) = tagged {
                if let Some(value) = candidate.deserialize(json, ctx)? {
                    return Ok(value);
                }
            }
        }
        // Lenient decoders (an integer reading "5") must not shadow a later
        // candidate that encodes the scalar exactly as given.
        if matches!(json, Json::String(_) | Json::Number(_) | Json::Bool(_)) {
            for candidate in &self.candidates {
                if let Some(value) = decode_exact(candidate, json, ctx) {
                    return Ok(value);
                }
            }
        }
        for candidate in &self.candidates {
            if let Ok(Some(value)) = candidate.deserialize(json, ctx) {
                if candidate.validate(None, value.clone()).is_ok() {
                    return Ok(value);
                }
            }
        }
        Err(ctx.malformed("no union candidate could decode the value"))
    }

    fn class_default(&self) -> Option<DefaultValue> {
        self.candidates.iter().find_map(Property::default_value)
    }

    fn bind(&mut self, property: &str, registry: &TypeRegistry) -> Result<(), SchemaDefinitionError> {
        if self.candidates.is_empty() {
            return Err(SchemaDefinitionError::InvalidKind {
                property: property.to_string(),
                reason: "a union needs at least one candidate".into(),
            });
        }
        for candidate in &mut self.candidates {
            candidate.bind(property, registry)?;
        }
        let conflicts = self.default_conflicts();
        if !conflicts.is_empty() {
            tracing::warn!(
                property = %property,
                candidates = ?conflicts,
                "union candidates declare conflicting defaults; the first is used"
            );
        }
        Ok(())
    }

    fn nested_type(&self) -> Option<String> {
        let nested: Vec<String> = self.candidates.iter().filter_map(Property::nested_type).collect();
        (!nested.is_empty()).then(|| nested.join(", "))
    }
}

/// The value `candidate` decodes from `json`, if it validates and encodes
/// back to the same JSON.
fn decode_exact(candidate: &Property, json: &Json, ctx: &mut DeserializeContext<'_>) -> Option<Value> {
    let value = candidate.deserialize(json, ctx).ok()??;
    let value = candidate.validate(None, value).ok()?;
    let mut encoder = SerializeContext::new(SerializeOptions::default());
    let encoded = candidate.serialize(&value, &mut encoder).ok()??;
    (encoded == *json).then_some(value)
}

/// Adapter so boxed kinds can back a [`Property`].
#[derive(Debug)]
struct BoxedKind(Box<dyn PropertyKind>);

impl PropertyKind for BoxedKind {
    fn label(&self) -> &'static str {
        self.0.label()
    }

    fn info(&self) -> String {
        self.0.info()
    }

    fn validate(&self, ctx: &FieldContext<'_>, value: Value) -> Result<Value, FieldError> {
        self.0.validate(ctx, value)
    }

    fn assert_valid(
        &self,
        ctx: &FieldContext<'_>,
        value: &Value,
        visits: &mut VisitSet,
        failures: &mut Vec<FieldError>,
    ) -> Result<(), PropertyError> {
        self.0.assert_valid(ctx, value, visits, failures)
    }

    fn equal(&self, a: &Value, b: &Value, guard: &mut EqualityGuard) -> bool {
        self.0.equal(a, b, guard)
    }

    fn to_json(&self, value: &Value, ctx: &mut SerializeContext) -> Result<Json, PropertyError> {
        self.0.to_json(value, ctx)
    }

    fn from_json(&self, json: &Json, ctx: &mut DeserializeContext<'_>) -> Result<Value, PropertyError> {
        self.0.from_json(json, ctx)
    }

    fn class_default(&self) -> Option<DefaultValue> {
        self.0.class_default()
    }

    fn bind(&mut self, property: &str, registry: &TypeRegistry) -> Result<(), SchemaDefinitionError> {
        self.0.bind(property, registry)
    }

    fn nested_type(&self) -> Option<String> {
        self.0.nested_type()
    }

    fn observes_mutations(&self) -> bool {
        self.0.observes_mutations()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::{Boolean, Integer, Text};

    fn union(kinds: Vec<Box<dyn PropertyKind>>) -> Union {
        let mut union = Union::of(kinds);
        union.bind("field", &TypeRegistry::new()).unwrap();
        union
    }

    fn check(kind: &Union, value: impl Into<Value>) -> Result<Value, FieldError> {
        kind.validate(&FieldContext::new(None, "field"), value.into())
    }

    #[test]
    fn test_first_accepting_candidate_wins() {
        let text_first = union(vec![Box::new(Text::new()), Box::new(Integer::new().cast(true))]);
        assert_eq!(check(&text_first, "5").unwrap(), Value::Str("5".into()));
        assert_eq!(check(&text_first, 5).unwrap(), Value::Int(5));

        let int_first = union(vec![Box::new(Integer::new().cast(true)), Box::new(Text::new())]);
        assert_eq!(check(&int_first, "5").unwrap(), Value::Int(5));
    }

    #[test]
    fn test_failure_collects_every_candidate() {
        let kind = union(vec![Box::new(Integer::new()), Box::new(Boolean::new())]);
        let err = check(&kind, "x").unwrap_err();
        assert_eq!(err.related.len(), 2);
        assert!(err.message.contains("an integer or a boolean"));
    }

    #[test]
    fn test_first_default_wins_and_conflicts_are_reported() {
        let kind = Union::new(vec![
            Property::new("", Integer::new()),
            Property::new("", Integer::new()).default(1),
            Property::new("", Boolean::new()).default(true),
        ]);
        assert_eq!(kind.class_default().unwrap().resolve().unwrap(), Value::Int(1));
        assert_eq!(kind.default_conflicts().len(), 2);

        let single = Union::new(vec![Property::new("", Integer::new()).default(1)]);
        assert!(single.default_conflicts().is_empty());
    }

    #[test]
    fn test_serializes_with_first_accepting_candidate() {
        let kind = union(vec![Box::new(Integer::new()), Box::new(Text::new())]);
        let mut ctx = SerializeContext::new(Default::default());
        assert_eq!(kind.to_json(&Value::Int(3), &mut ctx).unwrap(), Json::from(3));
        assert_eq!(kind.to_json(&Value::from("a"), &mut ctx).unwrap(), Json::from("a"));
        assert!(kind.to_json(&Value::Bool(true), &mut ctx).is_err());
    }

    #[test]
    fn test_decoding_prefers_an_exact_scalar_match() {
        let registry = TypeRegistry::new();
        let kind = union(vec![Box::new(Integer::new()), Box::new(Text::new())]);
        let mut ctx = DeserializeContext::new(&registry, Default::default());
        assert_eq!(kind.from_json(&Json::from("7"), &mut ctx).unwrap(), Value::from("7"));
        assert_eq!(kind.from_json(&Json::from(7), &mut ctx).unwrap(), Value::Int(7));
        assert!(kind.from_json(&Json::Null, &mut ctx).is_err());
    }

    #[test]
    fn test_empty_union_is_a_definition_error() {
        let mut kind = Union::new(Vec::new());
        assert!(kind.bind("field", &TypeRegistry::new()).is_err());
    }
}
