//! # Type Registry
//!
//! Maps type names to built record types. Instance properties resolve
//! their nested type through it, and trusted deserialization uses it to
//! honour `__class__` tags.
//!
//! A registry is an explicit value rather than a global: build types
//! against one, pass it to deserialization, and drop it when done. Cloning
//! yields another handle to the same table.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use propkit_core::{ConfigError, DuplicatePolicy, EngineConfig, SchemaDefinitionError};

use crate::schema::RecordType;

struct RegistryInner {
    config: EngineConfig,
    types: RefCell<BTreeMap<String, Rc<RecordType>>>,
}

/// Outcome of [`TypeRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The name was new.
    Added,
    /// An earlier type with the same name was shadowed.
    Replaced,
}

/// Name → record type table with its engine configuration.
#[derive(Clone)]
pub struct TypeRegistry {
    inner: Rc<RegistryInner>,
}

/// Non-owning handle held by instance properties.
#[derive(Clone)]
pub struct WeakTypeRegistry {
    inner: Weak<RegistryInner>,
}

impl WeakTypeRegistry {
    pub fn upgrade(&self) -> Option<TypeRegistry> {
        self.inner.upgrade().map(|inner| TypeRegistry { inner })
    }
}

impl fmt::Debug for WeakTypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WeakTypeRegistry")
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    /// Empty registry with default configuration.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            inner: Rc::new(RegistryInner {
                config,
                types: RefCell::new(BTreeMap::new()),
            }),
        }
    }

    /// Empty registry configured from `PROPKIT_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::with_config(EngineConfig::from_env()?))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Add a type under its name. On collision the configured
    /// [`DuplicatePolicy`] decides: `Replace` shadows the earlier type and
    /// logs a warning, `Reject` fails.
    pub fn register(&self, ty: Rc<RecordType>) -> Result<Registration, SchemaDefinitionError> {
        let name = ty.name().to_string();
        let mut types = self.inner.types.borrow_mut();
        if types.contains_key(&name) {
            if self.inner.config.duplicate_types == DuplicatePolicy::Reject {
                return Err(SchemaDefinitionError::DuplicateType { type_name: name });
            }
            tracing::warn!(type_name = %name, "record type registered twice; the later definition wins");
            types.insert(name, ty);
            return Ok(Registration::Replaced);
        }
        tracing::debug!(type_name = %name, "registered record type");
        types.insert(name, ty);
        Ok(Registration::Added)
    }

    pub fn get(&self, name: &str) -> Option<Rc<RecordType>> {
        self.inner.types.borrow().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.types.borrow().contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.inner.types.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.types.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.types.borrow().is_empty()
    }

    pub fn downgrade(&self) -> WeakTypeRegistry {
        WeakTypeRegistry {
            inner: Rc::downgrade(&self.inner),
        }
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("config", &self.inner.config)
            .field("types", &self.names())
            .finish()
    }
}
