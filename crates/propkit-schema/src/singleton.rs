//! # Singleton Registry
//!
//! A [`Singletons`] registry hands out at most one record per identifying
//! name, enum-style. Asking again for a live name returns the same
//! instance and ignores any keywords. When the record type declares a
//! `name` property it is set to the identifying name at construction; the
//! identifying name itself never changes, even if `name` is reassigned.
//!
//! Serialized singletons carry their identifying name under
//! [`SINGLETON_KEY`]. Decoding a name that is already live returns the live
//! instance and ignores the input values.
//!
//! Like [`UidRegistry`](crate::uid::UidRegistry), the registry is an
//! explicit value and never evicts.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use propkit_core::{DeserializeError, InstanceId, PropertyError, SingletonError};
use serde_json::Value as Json;

use crate::kind::json_type;
use crate::record::Record;
use crate::registry::TypeRegistry;
use crate::schema::RecordType;
use crate::serialize::{deserialize, DeserializeOptions, Deserialized, SerializeOptions};
use crate::value::Value;

/// Key holding the identifying name in serialized singletons.
pub const SINGLETON_KEY: &str = "_singleton_id";

/// Property that mirrors the identifying name when the type declares it.
pub const NAME_PROPERTY: &str = "name";

#[derive(Default)]
struct Table {
    by_name: HashMap<String, Record>,
    names: HashMap<InstanceId, String>,
}

/// Live singletons by identifying name.
#[derive(Clone, Default)]
pub struct Singletons {
    table: Rc<RefCell<Table>>,
}

impl Singletons {
    pub fn new() -> Self {
        Self::default()
    }

    /// The singleton `name` of type `ty`, constructed from `kwargs` if it
    /// does not exist yet.
    ///
    /// Fails with [`SingletonError::TypeMismatch`] when `name` is held by a
    /// record of another type.
    pub fn get_or_create<I, K, V>(&self, ty: &Rc<RecordType>, name: &str, kwargs: I) -> Result<Record, PropertyError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        if let Some(existing) = self.live(name, ty, |held, wanted| Rc::ptr_eq(held, wanted))? {
            return Ok(existing);
        }
        let mut all: Vec<(String, Value)> = Vec::new();
        if ty.property(NAME_PROPERTY).is_some() {
            all.push((NAME_PROPERTY.to_string(), Value::from(name)));
        }
        all.extend(kwargs.into_iter().map(|(k, v)| (k.into(), v.into())));
        let record = Record::with(ty, all)?;
        self.enroll(name, &record);
        Ok(record)
    }

    pub fn load(&self, name: &str) -> Option<Record> {
        self.table.borrow().by_name.get(name).cloned()
    }

    /// The identifying name `record` was registered under.
    pub fn name_of(&self, record: &Record) -> Option<String> {
        self.table.borrow().names.get(&record.id()).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table.borrow().by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.table.borrow().by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.borrow().by_name.is_empty()
    }

    /// Forget every singleton.
    pub fn clear(&self) {
        let mut table = self.table.borrow_mut();
        table.by_name.clear();
        table.names.clear();
    }

    /// Encode `record` with its identifying name added under
    /// [`SINGLETON_KEY`]. Records this registry does not know are encoded
    /// plainly.
    pub fn serialize(&self, record: &Record, options: SerializeOptions) -> Result<Json, PropertyError> {
        let mut json = record.serialize(options)?;
        if let (Some(name), Json::Object(obj)) = (self.name_of(record), &mut json) {
            obj.insert(SINGLETON_KEY.to_string(), Json::String(name));
        }
        Ok(json)
    }

    /// Decode a singleton. The identifying name is read from
    /// [`SINGLETON_KEY`], falling back to the `name` key.
    pub fn deserialize(
        &self,
        ty: &Rc<RecordType>,
        data: &Json,
        types: &TypeRegistry,
        options: DeserializeOptions,
    ) -> Result<Deserialized, PropertyError> {
        let obj = data.as_object().ok_or_else(|| DeserializeError::NotAnObject {
            type_name: ty.name().to_string(),
            found: json_type(data).to_string(),
        })?;
        let identifier = obj
            .get(SINGLETON_KEY)
            .or_else(|| obj.get(NAME_PROPERTY))
            .and_then(Json::as_str)
            .ok_or(SingletonError::MissingName)?
            .to_string();
        if let Some(existing) = self.live(&identifier, ty, |held, wanted| held.is_a(wanted))? {
            return Ok(Deserialized {
                record: existing,
                warnings: Vec::new(),
            });
        }

        let mut obj = obj.clone();
        obj.remove(SINGLETON_KEY);
        let has_name = ty.property(NAME_PROPERTY).is_some();
        let display = match obj.get(NAME_PROPERTY).and_then(Json::as_str) {
            Some(name) if has_name && name != identifier => Some(name.to_string()),
            _ => None,
        };
        if has_name {
            obj.insert(NAME_PROPERTY.to_string(), Json::String(identifier.clone()));
        }
        let decoded = deserialize(ty, &Json::Object(obj), types, options)?;
        if let Some(name) = display {
            decoded.record.set(NAME_PROPERTY, name)?;
        }
        self.enroll(&identifier, &decoded.record);
        Ok(decoded)
    }

    /// The live singleton `name`, checked against `ty` with `fits`.
    fn live(
        &self,
        name: &str,
        ty: &Rc<RecordType>,
        fits: impl Fn(&Rc<RecordType>, &Rc<RecordType>) -> bool,
    ) -> Result<Option<Record>, PropertyError> {
        let Some(existing) = self.load(name) else {
            return Ok(None);
        };
        if !fits(existing.record_type(), ty) {
            return Err(SingletonError::TypeMismatch {
                name: name.to_string(),
                existing: existing.type_name().to_string(),
                requested: ty.name().to_string(),
            }
            .into());
        }
        Ok(Some(existing))
    }

    fn enroll(&self, name: &str, record: &Record) {
        tracing::debug!(name = %name, type_name = %record.type_name(), "singleton registered");
        let mut table = self.table.borrow_mut();
        table.by_name.insert(name.to_string(), record.clone());
        table.names.insert(record.id(), name.to_string());
    }
}

impl fmt::Debug for Singletons {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Singletons").field("len", &self.len()).finish()
    }
}
