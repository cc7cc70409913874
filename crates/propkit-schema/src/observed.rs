//! # Copy-on-Write Container Proxies
//!
//! [`Record::observed`] hands out an [`Observed`] view of a list, set or
//! map field whose property observes mutations. Every mutating call on the
//! view:
//!
//! 1. clones the current items,
//! 2. applies the operation to the clone,
//! 3. assigns the clone back through the owner's validated set path, so
//!    listeners fire and invalid results are rejected,
//! 4. rebinds the view to the value the owner now holds.
//!
//! The view remembers the stored value it was built from, `None` for an
//! unset field. A view whose field was reassigned behind its back no
//! longer matches that value under the property's equality rule and is
//! stale: it detaches on its next mutation and from then on behaves as a
//! plain container. Cloning a view also yields a detached copy.

use std::fmt;
use std::ops::Deref;

use propkit_core::PropertyError;

use crate::record::Record;
use crate::value::{Value, ValueMap, ValueSet};

/// A container type a proxy can wrap.
pub trait ObservableContainer: Clone + Default + fmt::Debug {
    /// Extract from a stored value of the matching shape.
    fn from_value(value: &Value) -> Option<Self>;

    fn into_value(self) -> Value;
}

impl ObservableContainer for Vec<Value> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::List(items) => Some(items.clone()),
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        Value::List(self)
    }
}

impl ObservableContainer for ValueSet {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_set().cloned()
    }

    fn into_value(self) -> Value {
        Value::Set(self)
    }
}

impl ObservableContainer for ValueMap {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_map().cloned()
    }

    fn into_value(self) -> Value {
        Value::Map(self)
    }
}

/// Mutation-observing view of one container field.
pub struct Observed<C: ObservableContainer> {
    owner: Option<Record>,
    name: String,
    origin: Option<Value>,
    items: C,
}

impl Record {
    /// A copy-on-write view of a container field. The field's property must
    /// observe mutations. An unset field yields an empty view.
    pub fn observed<C: ObservableContainer>(&self, name: &str) -> Result<Observed<C>, PropertyError> {
        let prop = self.lookup(name)?;
        let not_observable = || PropertyError::NotObservable {
            type_name: self.type_name().to_string(),
            property: prop.name().to_string(),
        };
        if !prop.is_mutable() || !prop.kind().observes_mutations() {
            return Err(not_observable());
        }
        let origin = self.stored(prop.name());
        let items = match &origin {
            Some(value) => C::from_value(value).ok_or_else(not_observable)?,
            None => C::default(),
        };
        Ok(Observed {
            owner: Some(self.clone()),
            name: prop.name().to_string(),
            origin,
            items,
        })
    }
}

impl<C: ObservableContainer> Observed<C> {
    /// A view bound to no record.
    pub fn detached(items: C) -> Self {
        Self {
            owner: None,
            name: String::new(),
            origin: None,
            items,
        }
    }

    pub fn owner(&self) -> Option<&Record> {
        self.owner.as_ref()
    }

    pub fn is_attached(&self) -> bool {
        self.owner.is_some()
    }

    /// Stop writing through to the owner.
    pub fn detach(&mut self) {
        self.owner = None;
        self.origin = None;
    }

    pub fn into_inner(self) -> C {
        self.items
    }

    /// Apply `op` copy-on-write. On a validation failure the view and the
    /// owner are left unchanged.
    pub fn mutate<R>(&mut self, op: impl FnOnce(&mut C) -> R) -> Result<R, PropertyError> {
        let mut next = self.items.clone();
        let out = op(&mut next);
        let Some(owner) = self.owner.clone() else {
            self.items = next;
            return Ok(out);
        };
        let prop = owner.lookup(&self.name)?;
        let fresh = match (owner.stored(&self.name), &self.origin) {
            (None, None) => true,
            (Some(current), Some(origin)) => prop.equal(&current, origin),
            _ => false,
        };
        if !fresh {
            tracing::debug!(
                type_name = %owner.type_name(),
                property = %self.name,
                "container view is stale; detaching"
            );
            self.detach();
            self.items = next;
            return Ok(out);
        }
        owner.set(&self.name, next.clone().into_value())?;
        self.origin = owner.stored(&self.name);
        self.items = self
            .origin
            .as_ref()
            .and_then(C::from_value)
            .unwrap_or(next);
        Ok(out)
    }

    /// Replace every item.
    pub fn replace(&mut self, items: C) -> Result<(), PropertyError> {
        self.mutate(|current| *current = items)
    }
}

impl Observed<Vec<Value>> {
    pub fn push(&mut self, value: impl Into<Value>) -> Result<(), PropertyError> {
        let value = value.into();
        self.mutate(|items| items.push(value))
    }

    /// Insert at `index`, clamped to the length.
    pub fn insert(&mut self, index: usize, value: impl Into<Value>) -> Result<(), PropertyError> {
        let value = value.into();
        self.mutate(|items| items.insert(index.min(items.len()), value))
    }

    /// Remove the item at `index`. `None` when out of range.
    pub fn remove(&mut self, index: usize) -> Result<Option<Value>, PropertyError> {
        if index >= self.items.len() {
            return Ok(None);
        }
        self.mutate(|items| Some(items.remove(index)))
    }

    pub fn pop(&mut self) -> Result<Option<Value>, PropertyError> {
        if self.items.is_empty() {
            return Ok(None);
        }
        self.mutate(Vec::pop)
    }

    /// Replace the item at `index`, returning the old one. `None` when out
    /// of range.
    pub fn set(&mut self, index: usize, value: impl Into<Value>) -> Result<Option<Value>, PropertyError> {
        if index >= self.items.len() {
            return Ok(None);
        }
        let value = value.into();
        self.mutate(|items| Some(std::mem::replace(&mut items[index], value)))
    }

    pub fn extend<I, T>(&mut self, values: I) -> Result<(), PropertyError>
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.mutate(|items| items.extend(values))
    }

    pub fn clear(&mut self) -> Result<(), PropertyError> {
        self.mutate(Vec::clear)
    }
}

impl Observed<ValueSet> {
    /// `false` when an equal value was already present.
    pub fn insert(&mut self, value: impl Into<Value>) -> Result<bool, PropertyError> {
        let value = value.into();
        self.mutate(|items| items.insert(value))
    }

    pub fn remove(&mut self, value: &Value) -> Result<bool, PropertyError> {
        self.mutate(|items| items.remove(value))
    }

    pub fn clear(&mut self) -> Result<(), PropertyError> {
        self.mutate(ValueSet::clear)
    }
}

impl Observed<ValueMap> {
    pub fn insert(&mut self, key: impl Into<Value>, value: impl Into<Value>) -> Result<Option<Value>, PropertyError> {
        let (key, value) = (key.into(), value.into());
        self.mutate(|items| items.insert(key, value))
    }

    pub fn remove(&mut self, key: &Value) -> Result<Option<Value>, PropertyError> {
        self.mutate(|items| items.remove(key))
    }

    pub fn clear(&mut self) -> Result<(), PropertyError> {
        self.mutate(ValueMap::clear)
    }
}

impl<C: ObservableContainer> Deref for Observed<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.items
    }
}

impl<C: ObservableContainer> Clone for Observed<C> {
    /// Copies are detached.
    fn clone(&self) -> Self {
        Self::detached(self.items.clone())
    }
}

impl<C: ObservableContainer> fmt::Debug for Observed<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observed")
            .field("owner", &self.owner.as_ref().map(Record::owner))
            .field("name", &self.name)
            .field("items", &self.items)
            .finish()
    }
}
