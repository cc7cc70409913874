//! # Container Kinds
//!
//! Homogeneous lists, sets and tuples ([`Collection`]) and key-value maps
//! ([`Dictionary`]). Every member passes through the inner property's
//! validator. Containers that observe mutations hand out copy-on-write
//! proxies (see [`crate::observed`]); others follow plain value semantics
//! and must be reassigned to notify.

use propkit_core::{FieldError, PropertyError, SchemaDefinitionError};
use serde_json::Value as Json;

use crate::kind::{json_type, FieldContext, PropertyKind};
use crate::property::Property;
use crate::registry::TypeRegistry;
use crate::serialize::{value_to_json, DeserializeContext, SerializeContext};
use crate::validate::{EqualityGuard, VisitSet};
use crate::value::{Value, ValueMap};

/// Which container a [`Collection`] holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    List,
    Set,
    Tuple,
}

impl Flavor {
    fn noun(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Set => "set",
            Self::Tuple => "tuple",
        }
    }

    fn wrap(self, items: Vec<Value>) -> Value {
        match self {
            Self::List => Value::List(items),
            Self::Set => Value::Set(items.into_iter().collect()),
            Self::Tuple => Value::Tuple(items),
        }
    }
}

/// Members of any list, tuple or set value.
fn members(value: &Value) -> Option<Vec<&Value>> {
    match value {
        Value::List(items) | Value::Tuple(items) => Some(items.iter().collect()),
        Value::Set(set) => Some(set.iter().collect()),
        _ => None,
    }
}

fn item_failure(ctx: &FieldContext<'_>, label: &str, what: &str, cause: FieldError) -> FieldError {
    let message = format!(
        "The {label} property '{}' contains an invalid {what}. {}",
        ctx.property(),
        cause.message
    );
    ctx.failure(message).with_related(vec![cause])
}

// ─── Collection ─────────────────────────────────────────────────────

/// A list, set or tuple whose items all satisfy one inner property.
#[derive(Debug)]
pub struct Collection {
    flavor: Flavor,
    inner: Box<Property>,
    min_length: Option<usize>,
    max_length: Option<usize>,
    coerce: bool,
    observe_mutations: bool,
}

impl Collection {
    fn with_flavor(flavor: Flavor, inner: Property) -> Self {
        Self {
            flavor,
            inner: Box::new(inner),
            min_length: None,
            max_length: None,
            coerce: false,
            observe_mutations: false,
        }
    }

    pub fn list(inner: Property) -> Self {
        Self::with_flavor(Flavor::List, inner)
    }

    pub fn set(inner: Property) -> Self {
        Self::with_flavor(Flavor::Set, inner)
    }

    pub fn tuple(inner: Property) -> Self {
        Self::with_flavor(Flavor::Tuple, inner)
    }

    /// List of an undocumented inner kind.
    pub fn list_of(kind: impl PropertyKind + 'static) -> Self {
        Self::list(Property::new("", kind))
    }

    pub fn set_of(kind: impl PropertyKind + 'static) -> Self {
        Self::set(Property::new("", kind))
    }

    pub fn tuple_of(kind: impl PropertyKind + 'static) -> Self {
        Self::tuple(Property::new("", kind))
    }

    pub fn min_length(mut self, min: usize) -> Self {
        self.min_length = Some(min);
        self
    }

    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    /// Wrap scalars as singletons and convert other containers.
    pub fn coerce(mut self, coerce: bool) -> Self {
        self.coerce = coerce;
        self
    }

    /// Hand out copy-on-write proxies for in-place mutation.
    pub fn observe_mutations(mut self, observe: bool) -> Self {
        self.observe_mutations = observe;
        self
    }

    pub fn flavor(&self) -> Flavor {
        self.flavor
    }

    pub fn inner(&self) -> &Property {
        &self.inner
    }

    fn check_length(&self, ctx: &FieldContext<'_>, value: &Value, len: usize) -> Result<(), FieldError> {
        let short = self.min_length.is_some_and(|min| len < min);
        let long = self.max_length.is_some_and(|max| len > max);
        if short || long {
            return Err(ctx.invalid(self, value, &format!("The {} has {len} items.", self.flavor.noun())));
        }
        Ok(())
    }
}

impl PropertyKind for Collection {
    fn label(&self) -> &'static str {
        match self.flavor {
            Flavor::List => "List",
            Flavor::Set => "Set",
            Flavor::Tuple => "Tuple",
        }
    }

    fn info(&self) -> String {
        let mut info = format!("a {} (each item is {})", self.flavor.noun(), self.inner.info());
        match (self.min_length, self.max_length) {
            (Some(lo), Some(hi)) => info.push_str(&format!(" with length between {lo} and {hi}")),
            (Some(lo), None) => info.push_str(&format!(" with length >= {lo}")),
            (None, Some(hi)) => info.push_str(&format!(" with length <= {hi}")),
            (None, None) => {}
        }
        info
    }

    fn validate(&self, ctx: &FieldContext<'_>, value: Value) -> Result<Value, FieldError> {
        let items = match (self.flavor, value) {
            (Flavor::List, Value::List(items)) | (Flavor::Tuple, Value::Tuple(items)) => items,
            (Flavor::Set, Value::Set(set)) => set.into_vec(),
            (_, other) if self.coerce => match other {
                Value::List(items) | Value::Tuple(items) => items,
                Value::Set(set) => set.into_vec(),
                scalar => vec![scalar],
            },
            (_, other) => return Err(ctx.invalid(self, &other, "")),
        };
        let mut accepted = Vec::with_capacity(items.len());
        for item in items {
            match self.inner.kind().validate(ctx, item) {
                Ok(item) => accepted.push(item),
                Err(cause) => return Err(item_failure(ctx, self.label(), "item", cause)),
            }
        }
        let value = self.flavor.wrap(accepted);
        let len = members(&value).map_or(0, |m| m.len());
        self.check_length(ctx, &value, len)?;
        Ok(value)
    }

    fn assert_valid(
        &self,
        ctx: &FieldContext<'_>,
        value: &Value,
        visits: &mut VisitSet,
        failures: &mut Vec<FieldError>,
    ) -> Result<(), PropertyError> {
        let Some(items) = members(value) else {
            failures.push(ctx.invalid(self, value, ""));
            return Ok(());
        };
        if let Err(failure) = self.check_length(ctx, value, items.len()) {
            failures.push(failure);
        }
        for item in items {
            self.inner.kind().assert_valid(ctx, item, visits, failures)?;
        }
        Ok(())
    }

    fn equal(&self, a: &Value, b: &Value, guard: &mut EqualityGuard) -> bool {
        let (Some(xs), Some(ys)) = (members(a), members(b)) else {
            return a == b;
        };
        if xs.len() != ys.len() {
            return false;
        }
        if self.flavor != Flavor::Set {
            return xs.iter().zip(&ys).all(|(x, y)| self.inner.equal_in(x, y, guard));
        }
        // Unordered: each member of `a` consumes one distinct equal member of `b`.
        let mut unmatched: Vec<&Value> = ys;
        for x in xs {
            match unmatched.iter().position(|y| self.inner.equal_in(x, y, guard)) {
                Some(i) => {
                    unmatched.swap_remove(i);
                }
                None => return false,
            }
        }
        true
    }

    fn to_json(&self, value: &Value, ctx: &mut SerializeContext) -> Result<Json, PropertyError> {
        let items = members(value)
            .ok_or_else(|| ctx.malformed(format!("expected a {}, found {}", self.flavor.noun(), value.type_name())))?;
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            out.push(self.inner.serialize(item, ctx)?.unwrap_or(Json::Null));
        }
        Ok(Json::Array(out))
    }

    fn from_json(&self, json: &Json, ctx: &mut DeserializeContext<'_>) -> Result<Value, PropertyError> {
        let Json::Array(raw) = json else {
            return Err(ctx.malformed(format!(
                "expected an array for a {}, found {}",
                self.flavor.noun(),
                json_type(json)
            )));
        };
        let mut items = Vec::with_capacity(raw.len());
        for entry in raw {
            if let Some(item) = self.inner.deserialize(entry, ctx)? {
                items.push(item);
            }
        }
        Ok(self.flavor.wrap(items))
    }

    fn bind(&mut self, property: &str, registry: &TypeRegistry) -> Result<(), SchemaDefinitionError> {
        if let (Some(lo), Some(hi)) = (self.min_length, self.max_length) {
            if lo > hi {
                return Err(SchemaDefinitionError::InvalidKind {
                    property: property.to_string(),
                    reason: format!("min_length {lo} is greater than max_length {hi}"),
                });
            }
        }
        if self.observe_mutations && self.flavor == Flavor::Tuple {
            return Err(SchemaDefinitionError::InvalidKind {
                property: property.to_string(),
                reason: "tuples are immutable and cannot observe mutations".into(),
            });
        }
        if self.inner.explicit_default().is_some() {
            tracing::warn!(property = %property, "default on a container item is ignored");
            self.inner.clear_default();
        }
        self.inner.bind(property, registry)
    }

    fn nested_type(&self) -> Option<String> {
        self.inner.nested_type()
    }

    fn observes_mutations(&self) -> bool {
        self.observe_mutations
    }
}

// ─── Dictionary ─────────────────────────────────────────────────────

/// A map whose keys and values each optionally satisfy a property.
#[derive(Debug, Default)]
pub struct Dictionary {
    key: Option<Box<Property>>,
    value: Option<Box<Property>>,
    observe_mutations: bool,
}

impl Dictionary {
    /// A map with unconstrained keys and values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(mut self, key: Property) -> Self {
        self.key = Some(Box::new(key));
        self
    }

    pub fn value(mut self, value: Property) -> Self {
        self.value = Some(Box::new(value));
        self
    }

    pub fn observe_mutations(mut self, observe: bool) -> Self {
        self.observe_mutations = observe;
        self
    }

    fn equal_member(prop: Option<&Property>, a: &Value, b: &Value, guard: &mut EqualityGuard) -> bool {
        match prop {
            Some(prop) => prop.equal_in(a, b, guard),
            None => a == b,
        }
    }
}

impl PropertyKind for Dictionary {
    fn label(&self) -> &'static str {
        "Dictionary"
    }

    fn info(&self) -> String {
        match (&self.key, &self.value) {
            (None, None) => "a dictionary".into(),
            (Some(k), None) => format!("a dictionary (each key is {})", k.info()),
            (None, Some(v)) => format!("a dictionary (each value is {})", v.info()),
            (Some(k), Some(v)) => format!(
                "a dictionary (each key is {}; each value is {})",
                k.info(),
                v.info()
            ),
        }
    }

    fn validate(&self, ctx: &FieldContext<'_>, value: Value) -> Result<Value, FieldError> {
        let Value::Map(map) = value else {
            return Err(ctx.invalid(self, &value, ""));
        };
        let mut accepted = ValueMap::new();
        for (key, item) in map {
            let key = match &self.key {
                Some(prop) => prop
                    .kind()
                    .validate(ctx, key)
                    .map_err(|cause| item_failure(ctx, self.label(), "key", cause))?,
                None => key,
            };
            let item = match &self.value {
                Some(prop) => prop
                    .kind()
                    .validate(ctx, item)
                    .map_err(|cause| item_failure(ctx, self.label(), "value", cause))?,
                None => item,
            };
            accepted.insert(key, item);
        }
        Ok(Value::Map(accepted))
    }

    fn assert_valid(
        &self,
        ctx: &FieldContext<'_>,
        value: &Value,
        visits: &mut VisitSet,
        failures: &mut Vec<FieldError>,
    ) -> Result<(), PropertyError> {
        let Value::Map(map) = value else {
            failures.push(ctx.invalid(self, value, ""));
            return Ok(());
        };
        for (key, item) in map.iter() {
            if let Some(prop) = &self.key {
                prop.kind().assert_valid(ctx, key, visits, failures)?;
            }
            if let Some(prop) = &self.value {
                prop.kind().assert_valid(ctx, item, visits, failures)?;
            }
        }
        Ok(())
    }

    fn equal(&self, a: &Value, b: &Value, guard: &mut EqualityGuard) -> bool {
        let (Value::Map(xs), Value::Map(ys)) = (a, b) else {
            return a == b;
        };
        if xs.len() != ys.len() {
            return false;
        }
        let key_prop = self.key.as_deref();
        let value_prop = self.value.as_deref();
        xs.iter().all(|(k, x)| {
            ys.iter().any(|(j, y)| {
                Self::equal_member(key_prop, k, j, guard) && Self::equal_member(value_prop, x, y, guard)
            })
        })
    }

    fn to_json(&self, value: &Value, ctx: &mut SerializeContext) -> Result<Json, PropertyError> {
        let Value::Map(map) = value else {
            return Err(ctx.malformed(format!("expected a map, found {}", value.type_name())));
        };
        let mut out = serde_json::Map::new();
        for (key, item) in map.iter() {
            let encoded_key = match &self.key {
                Some(prop) => prop.serialize(key, ctx)?.unwrap_or(Json::Null),
                None => value_to_json(key, ctx)?,
            };
            let key = match encoded_key {
                Json::String(s) => s,
                Json::Number(n) => n.to_string(),
                Json::Bool(b) => b.to_string(),
                other => {
                    return Err(ctx.malformed(format!("map key encodes to {}", json_type(&other))))
                }
            };
            let item = match &self.value {
                Some(prop) => prop.serialize(item, ctx)?.unwrap_or(Json::Null),
                None => value_to_json(item, ctx)?,
            };
            out.insert(key, item);
        }
        Ok(Json::Object(out))
    }

    fn from_json(&self, json: &Json, ctx: &mut DeserializeContext<'_>) -> Result<Value, PropertyError> {
        let Json::Object(raw) = json else {
            return Err(ctx.malformed(format!("expected an object, found {}", json_type(json))));
        };
        let mut map = ValueMap::new();
        for (key, entry) in raw {
            let key_json = Json::String(key.clone());
            let key = match &self.key {
                Some(prop) => prop.deserialize(&key_json, ctx)?,
                None => Some(Value::Str(key.clone())),
            };
            let item = match &self.value {
                Some(prop) => prop.deserialize(entry, ctx)?,
                None => Value::from_json(entry),
            };
            if let (Some(key), Some(item)) = (key, item) {
                map.insert(key, item);
            }
        }
        Ok(Value::Map(map))
    }

    fn bind(&mut self, property: &str, registry: &TypeRegistry) -> Result<(), SchemaDefinitionError> {
        for prop in [self.key.as_deref_mut(), self.value.as_deref_mut()].into_iter().flatten() {
            if prop.explicit_default().is_some() {
                tracing::warn!(property = %property, "default on a dictionary member is ignored");
                prop.clear_default();
            }
            prop.bind(property, registry)?;
        }
        Ok(())
    }

    fn nested_type(&self) -> Option<String> {
        self.value.as_ref().and_then(|v| v.nested_type())
    }

    fn observes_mutations(&self) -> bool {
        self.observe_mutations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::{Integer, Text};

    fn bound(mut kind: impl PropertyKind, name: &str) -> impl PropertyKind {
        kind.bind(name, &TypeRegistry::new()).unwrap();
        kind
    }

    fn check(kind: &dyn PropertyKind, value: impl Into<Value>) -> Result<Value, FieldError> {
        kind.validate(&FieldContext::new(None, "items"), value.into())
    }

    #[test]
    fn test_list_validates_every_item() {
        let kind = bound(Collection::list_of(Integer::new()), "items");
        assert_eq!(check(&kind, vec![1.0, 2.0]).unwrap(), Value::list([1, 2]));
        let err = check(&kind, Value::list([Value::Int(1), Value::from("x")])).unwrap_err();
        assert!(err.message.contains("invalid item"));
        assert_eq!(err.related.len(), 1);
    }

    #[test]
    fn test_container_type_is_strict_without_coerce() {
        let strict = Collection::list_of(Integer::new());
        assert!(check(&strict, Value::tuple([1, 2])).is_err());
        assert!(check(&strict, 1).is_err());

        let loose = Collection::list_of(Integer::new()).coerce(true);
        assert_eq!(check(&loose, 1).unwrap(), Value::list([1]));
        assert_eq!(check(&loose, Value::tuple([1, 2])).unwrap(), Value::list([1, 2]));
        assert_eq!(
            check(&Collection::set_of(Integer::new()).coerce(true), vec![1, 1, 2]).unwrap(),
            Value::set([1, 2])
        );
    }

    #[test]
    fn test_length_bounds() {
        let kind = Collection::list_of(Integer::new()).min_length(2).max_length(2);
        assert!(check(&kind, vec![1, 2]).is_ok());
        assert!(check(&kind, vec![1]).is_err());
        assert!(check(&kind, vec![1, 2, 3]).is_err());

        let mut failures = Vec::new();
        kind.assert_valid(
            &FieldContext::new(None, "items"),
            &Value::list([1]),
            &mut VisitSet::new(),
            &mut failures,
        )
        .unwrap();
        assert_eq!(failures.len(), 1);
    }

    #[test]
    fn test_set_equality_counts_duplicates() {
        let kind = Collection::set_of(Integer::new());
        let mut guard = EqualityGuard::default();
        let a = Value::Set([Value::Int(1), Value::Int(2)].into_iter().collect());
        let b = Value::Set([Value::Int(2), Value::Int(1)].into_iter().collect());
        assert!(kind.equal(&a, &b, &mut guard));

        // Both members of `x` are close to 1.1, but 1.1 can only be matched once.
        let floats = Collection::set_of(crate::basic::Float::new().tolerance(0.5));
        let x = Value::set([1.0, 1.2]);
        let y = Value::set([1.1, 5.0]);
        assert!(!floats.equal(&x, &y, &mut guard));
    }

    #[test]
    fn test_tuple_cannot_observe_mutations() {
        let mut kind = Collection::tuple_of(Integer::new()).observe_mutations(true);
        assert!(kind.bind("t", &TypeRegistry::new()).is_err());
    }

    #[test]
    fn test_dictionary_validates_keys_and_values() {
        let kind = Dictionary::new()
            .key(Property::new("", Text::new()))
            .value(Property::new("", Integer::new()));
        let ok = check(&kind, Value::map([("a", 1.0)])).unwrap();
        assert_eq!(ok, Value::map([("a", 1)]));
        let bad_key = check(&kind, Value::map([(1, 1)])).unwrap_err();
        assert!(bad_key.message.contains("invalid key"));
        let bad_value = check(&kind, Value::map([("a", "b")])).unwrap_err();
        assert!(bad_value.message.contains("invalid value"));
        assert!(check(&kind, vec![1]).is_err());
    }
}
