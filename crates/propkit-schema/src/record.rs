//! # Record Runtime
//!
//! A [`Record`] is a shared handle to one instance of a [`RecordType`]: a
//! backend map from property name to validated value, plus instance-level
//! listeners. Cloning the handle shares the instance; identity comparisons
//! use [`Record::ptr_eq`].
//!
//! ## Set path
//!
//! Every mutable write runs, in order:
//!
//! 1. the property's validator with the record as owner,
//! 2. `Validate` listeners, which may replace the proposed value,
//! 3. the store,
//! 4. `ObserveChange` listeners, only if the stored value differs from the
//!    previous one under the property's equality rule,
//! 5. `ObserveSet` listeners.
//!
//! Silent writes skip steps 2, 4 and 5. No `RefCell` borrow is held while a
//! listener runs, so listeners may read and write the record freely.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use propkit_core::{InstanceId, Owner, PropertyError};

use crate::handlers::{Change, HandlerFn, Listener, ListenerMode, Names, Notify};
use crate::property::{Access, Property};
use crate::schema::RecordType;
use crate::validate::EqualityGuard;
use crate::value::Value;

struct RecordCell {
    id: InstanceId,
    ty: Rc<RecordType>,
    backend: RefCell<BTreeMap<String, Value>>,
    listeners: RefCell<Vec<Listener>>,
}

/// Handle to a record instance.
#[derive(Clone)]
pub struct Record(Rc<RecordCell>);

impl Record {
    /// Construct with no keyword arguments.
    pub fn new(ty: &Rc<RecordType>) -> Result<Self, PropertyError> {
        Self::with(ty, Vec::<(String, Value)>::new())
    }

    /// Construct from keyword arguments.
    ///
    /// Unknown names fail before anything is built. Defaults are stored
    /// silently, then each keyword goes through the full set path. Field
    /// failures from all keywords are reported together, through the
    /// type's error hook when it has one.
    pub fn with<I, K, V>(ty: &Rc<RecordType>, kwargs: I) -> Result<Self, PropertyError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let kwargs: Vec<(String, Value)> = kwargs.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        ty.check_keywords(kwargs.iter().map(|(k, _)| k.as_str()))?;
        let record = Self::blank(ty)?;
        record.apply_keywords(kwargs, Notify::Loud)?;
        record.initialize()?;
        Ok(record)
    }

    /// A record with read-only fields materialized and mutable fields reset
    /// to their defaults without notification.
    pub(crate) fn blank(ty: &Rc<RecordType>) -> Result<Self, PropertyError> {
        let record = Self(Rc::new(RecordCell {
            id: InstanceId::new(),
            ty: Rc::clone(ty),
            backend: RefCell::new(BTreeMap::new()),
            listeners: RefCell::new(Vec::new()),
        }));
        for prop in ty.properties() {
            match prop.access() {
                Access::ReadOnly => {
                    if let Some(default) = ty.default_for(prop.name()) {
                        let value = prop.validate(Some(&record), default.resolve()?)?;
                        record.store_unchecked(prop.name(), value);
                    }
                }
                Access::Mutable => record.reset_with(prop, Notify::Silent)?,
                Access::Dynamic { .. } => {}
            }
        }
        Ok(record)
    }

    pub(crate) fn initialize(&self) -> Result<(), PropertyError> {
        for init in self.0.ty.initializers() {
            init(self)?;
        }
        Ok(())
    }

    pub fn id(&self) -> InstanceId {
        self.0.id
    }

    pub fn record_type(&self) -> &Rc<RecordType> {
        &self.0.ty
    }

    pub fn type_name(&self) -> &str {
        self.0.ty.name()
    }

    /// Owner reference carried by failures on this record.
    pub fn owner(&self) -> Owner {
        Owner::new(self.type_name(), self.0.id)
    }

    /// Whether both handles point at the same instance.
    pub fn ptr_eq(&self, other: &Record) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    // ─── Reading ────────────────────────────────────────────────────

    /// Current value of a property. `None` when unset.
    ///
    /// Dynamic properties are computed and validated on every read.
    pub fn get(&self, name: &str) -> Result<Option<Value>, PropertyError> {
        let prop = self.lookup(name)?;
        match prop.access() {
            Access::Dynamic { getter, .. } => match getter(self)? {
                Some(value) => Ok(Some(prop.validate(Some(self), value)?)),
                None => Ok(None),
            },
            _ => Ok(self.stored(prop.name())),
        }
    }

    /// Whether a stored property currently holds a value.
    pub fn contains(&self, name: &str) -> bool {
        let name = self.0.ty.renamed_target(name).unwrap_or(name);
        self.0.backend.borrow().contains_key(name)
    }

    /// Snapshot of every stored value, keyed by property name.
    pub fn values(&self) -> BTreeMap<String, Value> {
        self.0.backend.borrow().clone()
    }

    // ─── Writing ────────────────────────────────────────────────────

    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<(), PropertyError> {
        self.assign(name, value.into(), Notify::Loud)
    }

    /// Validate and store without notifying listeners.
    pub fn set_silent(&self, name: &str, value: impl Into<Value>) -> Result<(), PropertyError> {
        self.assign(name, value.into(), Notify::Silent)
    }

    /// Remove the stored value. Listeners see the change to `None`.
    pub fn unset(&self, name: &str) -> Result<(), PropertyError> {
        let prop = self.lookup(name)?;
        self.ensure_mutable(&prop)?;
        self.store(&prop, None, Notify::Loud)
    }

    /// Revert to the default, computed fresh when it is a generator.
    pub fn reset(&self, name: &str) -> Result<(), PropertyError> {
        let prop = self.lookup(name)?;
        self.ensure_mutable(&prop)?;
        self.reset_with(&prop, Notify::Loud)
    }

    pub fn reset_silent(&self, name: &str) -> Result<(), PropertyError> {
        let prop = self.lookup(name)?;
        self.ensure_mutable(&prop)?;
        self.reset_with(&prop, Notify::Silent)
    }

    /// Set several properties. Unknown names fail before anything is
    /// written; field failures are reported together.
    pub fn update<I, K, V>(&self, kwargs: I) -> Result<(), PropertyError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let kwargs: Vec<(String, Value)> = kwargs.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self.0.ty.check_keywords(kwargs.iter().map(|(k, _)| k.as_str()))?;
        self.apply_keywords(kwargs, Notify::Loud)
    }

    /// Attach a listener to this instance only. It runs after the type's
    /// listeners of the same phase.
    pub fn observe(&self, listener: Listener) -> Result<(), PropertyError> {
        if let Names::Only(names) = listener.names() {
            for name in names {
                let prop = self.lookup(name)?;
                self.ensure_mutable(&prop)?;
            }
        }
        self.0.listeners.borrow_mut().push(listener);
        Ok(())
    }

    /// Structural equality under each property's equality rule. Cycles
    /// compare equal on re-entry.
    pub fn equal(&self, other: &Record) -> bool {
        self.equal_in(other, &mut EqualityGuard::default())
    }

    pub(crate) fn equal_in(&self, other: &Record, guard: &mut EqualityGuard) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        if !Rc::ptr_eq(&self.0.ty, &other.0.ty) {
            return false;
        }
        if !guard.enter(self.0.id, other.0.id) {
            return true;
        }
        let equal = self.0.ty.properties().iter().filter(|p| !p.is_dynamic()).all(|prop| {
            match (self.stored(prop.name()), other.stored(prop.name())) {
                (None, None) => true,
                (Some(a), Some(b)) => prop.equal_in(&a, &b, guard),
                _ => false,
            }
        });
        guard.leave(self.0.id, other.0.id);
        equal
    }

    // ─── Internals ──────────────────────────────────────────────────

    /// Resolve a name, following renamed aliases with a warning.
    pub(crate) fn lookup(&self, name: &str) -> Result<Rc<Property>, PropertyError> {
        let ty = &self.0.ty;
        let resolved = match ty.renamed_target(name) {
            Some(target) => {
                tracing::warn!(
                    type_name = %ty.name(),
                    property = %name,
                    replacement = %target,
                    "property has been renamed; use the new name"
                );
                target
            }
            None => name,
        };
        ty.property(resolved)
            .cloned()
            .ok_or_else(|| PropertyError::UnknownProperty {
                type_name: ty.name().to_string(),
                property: name.to_string(),
            })
    }

    fn ensure_mutable(&self, prop: &Property) -> Result<(), PropertyError> {
        if prop.is_mutable() {
            Ok(())
        } else {
            Err(self.read_only(prop))
        }
    }

    fn read_only(&self, prop: &Property) -> PropertyError {
        PropertyError::ReadOnly {
            type_name: self.type_name().to_string(),
            property: prop.name().to_string(),
        }
    }

    pub(crate) fn assign(&self, name: &str, value: Value, notify: Notify) -> Result<(), PropertyError> {
        let prop = self.lookup(name)?;
        match prop.access() {
            Access::Mutable => {
                let value = prop.validate(Some(self), value)?;
                self.store(&prop, Some(value), notify)
            }
            Access::Dynamic { setter: Some(setter), .. } => {
                let value = prop.validate(Some(self), value)?;
                setter(self, value)
            }
            _ => Err(self.read_only(&prop)),
        }
    }

    pub(crate) fn reset_with(&self, prop: &Property, notify: Notify) -> Result<(), PropertyError> {
        let value = match self.0.ty.default_for(prop.name()) {
            Some(default) => Some(prop.validate(Some(self), default.resolve()?)?),
            None => None,
        };
        self.store(prop, value, notify)
    }

    /// Store an already validated value, running the notification phases.
    pub(crate) fn store(&self, prop: &Property, value: Option<Value>, notify: Notify) -> Result<(), PropertyError> {
        let name = prop.name();
        if notify == Notify::Silent {
            self.write_backend(name, value);
            return Ok(());
        }
        let previous = self.stored(name);
        let mut change = Change {
            name: name.to_string(),
            previous: previous.clone(),
            value,
            mode: ListenerMode::Validate,
        };
        let proposed = change.value.clone();
        self.notify(&mut change)?;
        let value = match change.value.take() {
            Some(replaced) if !proposed.as_ref().is_some_and(|p| prop.equal(p, &replaced)) => {
                Some(prop.validate(Some(self), replaced)?)
            }
            other => other,
        };
        self.write_backend(name, value.clone());

        let changed = match (&previous, &value) {
            (Some(a), Some(b)) => !prop.equal(a, b),
            (None, None) => false,
            _ => true,
        };
        let mut change = Change {
            name: name.to_string(),
            previous,
            value,
            mode: ListenerMode::ObserveChange,
        };
        if changed {
            self.notify(&mut change)?;
        }
        change.mode = ListenerMode::ObserveSet;
        self.notify(&mut change)
    }

    fn write_backend(&self, name: &str, value: Option<Value>) {
        let mut backend = self.0.backend.borrow_mut();
        match value {
            Some(value) => backend.insert(name.to_string(), value),
            None => backend.remove(name),
        };
    }

    /// Run every listener for `change.name` in `change.mode`: type listeners
    /// first, then instance listeners.
    pub(crate) fn notify(&self, change: &mut Change) -> Result<(), PropertyError> {
        let handlers: Vec<HandlerFn> = self
            .0
            .ty
            .listeners()
            .iter()
            .chain(self.0.listeners.borrow().iter())
            .filter(|l| l.applies(&change.name, change.mode))
            .map(Listener::handler)
            .collect();
        for handler in handlers {
            handler(self, change)?;
        }
        Ok(())
    }

    /// Set keywords in order. Field failures are collected and reported
    /// together; structural errors stop immediately.
    pub(crate) fn apply_keywords(&self, kwargs: Vec<(String, Value)>, notify: Notify) -> Result<(), PropertyError> {
        let mut failures = Vec::new();
        for (name, value) in kwargs {
            if let Err(err) = self.assign(&name, value, notify) {
                failures.extend(err.into_failures()?);
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(self.0.ty.report(self, failures))
        }
    }

    pub(crate) fn stored(&self, name: &str) -> Option<Value> {
        self.0.backend.borrow().get(name).cloned()
    }

    /// Write without validation or notification.
    pub(crate) fn store_unchecked(&self, name: &str, value: Value) {
        self.0.backend.borrow_mut().insert(name.to_string(), value);
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Field values are omitted: a cyclic graph would print forever.
        let fields: Vec<String> = self.0.backend.borrow().keys().cloned().collect();
        f.debug_struct("Record")
            .field("type", &self.type_name())
            .field("id", &self.0.id)
            .field("fields", &fields)
            .finish()
    }
}
