//! # Identity Registry
//!
//! Record types built through [`UidRegistry::builder`] carry a `uid` string
//! property and are tracked in the registry from construction on. That
//! identity is what makes cyclic and shared graphs serializable: each
//! identified record is written once into a flat table keyed by uid, and
//! every reference to it becomes the uid string.
//!
//! ```text
//! {
//!   "__uid__": "a1",
//!   "a1": {"__class__": "Node", "uid": "a1", "next": "b2"},
//!   "b2": {"__class__": "Node", "uid": "b2", "next": "a1"}
//! }
//! ```
//!
//! Decoding registers each record under its uid *before* decoding its
//! fields, so a reference back to a record still being built resolves to
//! that same instance.
//!
//! ## Lifecycle
//!
//! Entries are added when an identified record is constructed or its uid
//! changes, and are never evicted: the registry keeps every identified
//! record alive for as long as the registry itself lives. Long-running
//! processes should scope registries to a unit of work. [`UidRegistry::clear`]
//! empties the table.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use propkit_core::{DeserializeError, FieldError, PropertyError, SchemaDefinitionError, UidError};
use serde_json::{Map, Value as Json};
use uuid::Uuid;

use crate::basic::Text;
use crate::builder::SchemaBuilder;
use crate::instance::Instance;
use crate::kind::{json_type, FieldContext, PropertyKind};
use crate::property::Property;
use crate::record::Record;
use crate::registry::TypeRegistry;
use crate::schema::RecordType;
use crate::serialize::{
    populate, DeserializeContext, DeserializeOptions, Deserialized, SerializeContext, SerializeOptions,
};
use crate::validate::{EqualityGuard, VisitSet};
use crate::value::Value;

/// Top-level key naming the root record of a serialized graph.
pub const ROOT_KEY: &str = "__uid__";

/// Name of the identifier property on identified record types.
pub const UID_PROPERTY: &str = "uid";

type Instances = Rc<RefCell<HashMap<String, Record>>>;

/// Live identified records by uid.
#[derive(Clone, Default)]
pub struct UidRegistry {
    instances: Instances,
}

impl UidRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A schema builder for an identified record type tracked by this
    /// registry.
    pub fn builder(&self, name: impl Into<String>) -> SchemaBuilder {
        let check = Rc::downgrade(&self.instances);
        let track = Weak::clone(&check);
        let enroll = Weak::clone(&check);
        SchemaBuilder::new(name)
            .identity()
            .property(
                UID_PROPERTY,
                Property::new("Unique identifier", Text::new())
                    .default_with(|| Value::Str(Uuid::new_v4().to_string())),
            )
            .validator(UID_PROPERTY, move |record, change| {
                let (Some(instances), Some(uid)) = (check.upgrade(), change.value.as_ref().and_then(Value::as_str))
                else {
                    return Ok(());
                };
                let taken = instances.borrow().get(uid).is_some_and(|holder| !holder.ptr_eq(record));
                if taken {
                    let reason = UidError::AlreadyUsed { uid: uid.to_string() };
                    return Err(FieldError::invalid(UID_PROPERTY, Some(record.owner()), reason.to_string()).into());
                }
                Ok(())
            })
            .observer(UID_PROPERTY, move |record, change| {
                if let (Some(instances), Some(uid)) = (track.upgrade(), change.value.as_ref().and_then(Value::as_str)) {
                    tracing::debug!(uid = %uid, type_name = %record.type_name(), "uid registry updated");
                    instances.borrow_mut().insert(uid.to_string(), record.clone());
                }
                Ok(())
            })
            .initializer(move |record| match enroll.upgrade() {
                Some(instances) => enroll_in(&instances, record),
                None => Ok(()),
            })
    }

    /// The live record holding `uid`.
    pub fn load(&self, uid: &str) -> Option<Record> {
        self.instances.borrow().get(uid).cloned()
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.instances.borrow().contains_key(uid)
    }

    pub fn len(&self) -> usize {
        self.instances.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.borrow().is_empty()
    }

    /// Forget every record.
    pub fn clear(&self) {
        self.instances.borrow_mut().clear();
    }

    /// Track `record` under its current uid.
    pub fn register(&self, record: &Record) -> Result<(), PropertyError> {
        enroll_in(&self.instances, record)
    }

    /// Decode a graph written by [`serialize_graph`], starting from the
    /// entry its `__uid__` key names.
    ///
    /// `ty` must be a type built by this registry's [`builder`](Self::builder).
    pub fn deserialize(
        &self,
        ty: &Rc<RecordType>,
        data: &Json,
        types: &TypeRegistry,
        options: DeserializeOptions,
    ) -> Result<Deserialized, PropertyError> {
        let root = data
            .get(ROOT_KEY)
            .and_then(Json::as_str)
            .ok_or(DeserializeError::MissingRoot)?;
        self.deserialize_root(ty, data, types, options, root)
    }

    /// Decode a graph starting from an explicit root uid.
    pub fn deserialize_root(
        &self,
        ty: &Rc<RecordType>,
        data: &Json,
        types: &TypeRegistry,
        options: DeserializeOptions,
        root: &str,
    ) -> Result<Deserialized, PropertyError> {
        let table = data.as_object().ok_or_else(|| DeserializeError::NotAnObject {
            type_name: ty.name().to_string(),
            found: json_type(data).to_string(),
        })?;
        let mut pending = table.clone();
        pending.remove(ROOT_KEY);

        let mut ctx = DeserializeContext::new(types, options);
        ctx.session = Some(UidSession {
            registry: self,
            pending,
            built: HashMap::new(),
        });
        let record = ctx.resolve_uid(root, ty)?;
        if options.assert_valid {
            record.validate()?;
        }
        Ok(Deserialized {
            record,
            warnings: ctx.into_warnings(),
        })
    }
}

impl fmt::Debug for UidRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UidRegistry").field("len", &self.len()).finish()
    }
}

fn enroll_in(instances: &RefCell<HashMap<String, Record>>, record: &Record) -> Result<(), PropertyError> {
    if !record.record_type().has_identity() {
        return Err(UidError::NotIdentified {
            type_name: record.type_name().to_string(),
        }
        .into());
    }
    let uid = uid_of(record).ok_or_else(|| UidError::Invalid { uid: String::new() })?;
    let mut map = instances.borrow_mut();
    if map.get(&uid).is_some_and(|holder| !holder.ptr_eq(record)) {
        return Err(UidError::AlreadyUsed { uid }.into());
    }
    tracing::debug!(uid = %uid, type_name = %record.type_name(), "registered identified record");
    map.insert(uid, record.clone());
    Ok(())
}

fn uid_of(record: &Record) -> Option<String> {
    record
        .stored(UID_PROPERTY)
        .and_then(|value| value.as_str().map(str::to_string))
}

// ─── Encoding ───────────────────────────────────────────────────────

/// Encode `record` and every identified record it reaches as a flat table
/// keyed by uid, with `__uid__` naming the root.
pub fn serialize_graph(record: &Record, options: SerializeOptions) -> Result<Json, PropertyError> {
    if !record.record_type().has_identity() {
        return Err(UidError::NotIdentified {
            type_name: record.type_name().to_string(),
        }
        .into());
    }
    let mut ctx = SerializeContext::with_registry(options);
    let root = encode_reference(record, &mut ctx)?;
    let mut table = ctx.take_registry().unwrap_or_default();
    table.insert(ROOT_KEY.to_string(), root);
    Ok(Json::Object(table))
}

/// Write `record` into the table once and return its uid reference. The
/// slot is claimed before the fields are encoded so cycles stop here.
pub(crate) fn encode_reference(record: &Record, ctx: &mut SerializeContext) -> Result<Json, PropertyError> {
    let uid = uid_of(record).ok_or_else(|| ctx.malformed(format!("{} instance has no uid", record.type_name())))?;
    let claimed = match ctx.registry_mut() {
        Some(table) if !table.contains_key(&uid) => {
            table.insert(uid.clone(), Json::Null);
            true
        }
        Some(_) => false,
        None => return Err(ctx.malformed("uid references need a uid registry")),
    };
    if claimed {
        let body = record.fields_to_json(ctx)?;
        if let Some(table) = ctx.registry_mut() {
            table.insert(uid.clone(), body);
        }
    }
    Ok(Json::String(uid))
}

// ─── Decoding ───────────────────────────────────────────────────────

/// Uid table being decoded and the records built from it so far.
pub(crate) struct UidSession<'a> {
    registry: &'a UidRegistry,
    pending: Map<String, Json>,
    built: HashMap<String, Record>,
}

impl DeserializeContext<'_> {
    /// The record a uid reference points at: one already built in this
    /// pass, one built now from the table, or a live registered record.
    pub(crate) fn resolve_uid(&mut self, uid: &str, expected: &Rc<RecordType>) -> Result<Record, PropertyError> {
        let Some(session) = self.session.as_mut() else {
            return Err(self.malformed(format!("uid reference '{uid}' outside a uid registry")));
        };
        let found = match session.built.get(uid) {
            Some(record) => Some(record.clone()),
            None => {
                let live = session.registry.load(uid);
                let data = session.pending.remove(uid);
                match (live, data) {
                    (Some(_), Some(_)) => return Err(UidError::AlreadyUsed { uid: uid.to_string() }.into()),
                    (None, None) => return Err(UidError::Invalid { uid: uid.to_string() }.into()),
                    (Some(record), None) => Some(record),
                    (None, Some(data)) => return self.build_uid(uid, expected, &data),
                }
            }
        };
        match found {
            Some(record) if record.record_type().is_a(expected) => Ok(record),
            Some(record) => Err(self.malformed(format!(
                "uid '{uid}' is a {}, expected {}",
                record.type_name(),
                expected.name()
            ))),
            None => Err(UidError::Invalid { uid: uid.to_string() }.into()),
        }
    }

    fn build_uid(&mut self, uid: &str, expected: &Rc<RecordType>, data: &Json) -> Result<Record, PropertyError> {
        let obj = data.as_object().ok_or_else(|| DeserializeError::NotAnObject {
            type_name: expected.name().to_string(),
            found: json_type(data).to_string(),
        })?;
        let ty = self.resolve_class(expected, obj)?;
        if !ty.has_identity() {
            return Err(UidError::NotIdentified {
                type_name: ty.name().to_string(),
            }
            .into());
        }
        let record = Record::blank(&ty)?;
        record.store_unchecked(UID_PROPERTY, Value::Str(uid.to_string()));
        if let Some(session) = self.session.as_mut() {
            session.built.insert(uid.to_string(), record.clone());
        }
        let mut fields = obj.clone();
        fields.remove(UID_PROPERTY);
        populate(&record, &fields, self)?;
        record.initialize()?;
        Ok(record)
    }
}

// ─── Pointer ────────────────────────────────────────────────────────

/// Reference to an identified record that may also be held as a bare uid.
///
/// Pointers always serialize as the uid string. With [`Pointer::load`], a
/// uid naming a live record is swapped for that record on validation and
/// on decoding.
#[derive(Debug)]
pub struct Pointer {
    instance: Instance,
    registry: Option<UidRegistry>,
}

impl Pointer {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            instance: Instance::new(type_name),
            registry: None,
        }
    }

    /// Resolve uids through `registry`.
    pub fn load(mut self, registry: &UidRegistry) -> Self {
        self.registry = Some(registry.clone());
        self
    }

    fn live(&self, uid: &str) -> Option<Record> {
        self.registry.as_ref()?.load(uid)
    }
}

impl PropertyKind for Pointer {
    fn label(&self) -> &'static str {
        "Pointer"
    }

    fn info(&self) -> String {
        format!("{} or its uid", self.instance.info())
    }

    fn validate(&self, ctx: &FieldContext<'_>, value: Value) -> Result<Value, FieldError> {
        match value {
            Value::Str(uid) => match self.live(&uid) {
                Some(record) => self.instance.validate(ctx, Value::Record(record)),
                None => Ok(Value::Str(uid)),
            },
            other => self.instance.validate(ctx, other),
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
            Value::Str(_) => Ok(()),
            other => self.instance.assert_valid(ctx, other, visits, failures),
        }
    }

    fn equal(&self, a: &Value, b: &Value, guard: &mut EqualityGuard) -> bool {
        match (a, b) {
            (Value::Record(r), Value::Str(uid)) | (Value::Str(uid), Value::Record(r)) => {
                uid_of(r).as_deref() == Some(uid.as_str())
            }
            _ => self.instance.equal(a, b, guard),
        }
    }

    fn to_json(&self, value: &Value, ctx: &mut SerializeContext) -> Result<Json, PropertyError> {
        match value {
            Value::Str(uid) => Ok(Json::String(uid.clone())),
            Value::Record(record) if ctx.has_registry() && record.record_type().has_identity() => {
                encode_reference(record, ctx)
            }
            Value::Record(record) => uid_of(record)
                .map(Json::String)
                .ok_or_else(|| ctx.malformed(format!("{} instance has no uid", record.type_name()))),
            other => Err(ctx.malformed(format!("expected a record or uid, found {}", other.type_name()))),
        }
    }

    fn from_json(&self, json: &Json, ctx: &mut DeserializeContext<'_>) -> Result<Value, PropertyError> {
        match json {
            Json::String(uid) if ctx.in_uid_session() => self.instance.from_json(json, ctx).or_else(|err| match err {
                PropertyError::Uid(UidError::Invalid { .. }) => Ok(Value::Str(uid.clone())),
                other => Err(other),
            }),
            Json::String(uid) => Ok(self.live(uid).map(Value::Record).unwrap_or_else(|| Value::Str(uid.clone()))),
            other => self.instance.from_json(other, ctx),
        }
    }

    fn bind(&mut self, property: &str, registry: &TypeRegistry) -> Result<(), SchemaDefinitionError> {
        self.instance.bind(property, registry)
    }

    fn nested_type(&self) -> Option<String> {
        self.instance.nested_type()
    }
}
