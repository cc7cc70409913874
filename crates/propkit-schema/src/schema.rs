//! # Record Types
//!
//! The immutable schema produced by [`crate::SchemaBuilder`]: the ordered
//! property table (inherited first), renamed aliases, listeners, class
//! validators, default overrides, documentation order and hooks.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;

use propkit_core::{EngineConfig, FieldError, PropertyError};
use serde::Serialize;

use crate::handlers::{ClassValidator, ErrorHook, Initializer, Listener};
use crate::property::{Classification, DefaultValue, Property};
use crate::record::Record;

/// Documentation facts for one property.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyDoc {
    pub name: String,
    pub doc: String,
    pub info: String,
    pub classification: Classification,
    pub nested_type: Option<String>,
}

/// A built record type.
pub struct RecordType {
    pub(crate) name: String,
    pub(crate) bases: Vec<Rc<RecordType>>,
    pub(crate) properties: Vec<Rc<Property>>,
    pub(crate) index: HashMap<String, usize>,
    pub(crate) renamed: BTreeMap<String, String>,
    pub(crate) listeners: Vec<Listener>,
    pub(crate) validators: Vec<ClassValidator>,
    pub(crate) defaults: BTreeMap<String, DefaultValue>,
    pub(crate) doc_order: Vec<String>,
    pub(crate) error_hook: Option<ErrorHook>,
    pub(crate) initializers: Vec<Initializer>,
    pub(crate) positional: Option<String>,
    pub(crate) identity: bool,
    pub(crate) config: EngineConfig,
}

impl RecordType {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bases(&self) -> &[Rc<RecordType>] {
        &self.bases
    }

    /// Whether this type is `other` or derives from it.
    pub fn is_a(&self, other: &RecordType) -> bool {
        std::ptr::eq(self, other) || self.bases.iter().any(|base| base.is_a(other))
    }

    /// Properties in declaration order, inherited ones first.
    pub fn properties(&self) -> &[Rc<Property>] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&Rc<Property>> {
        self.index.get(name).map(|i| &self.properties[*i])
    }

    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|p| p.name())
    }

    /// Names of properties with the given classification.
    pub fn classified(&self, classification: Classification) -> Vec<&str> {
        self.properties
            .iter()
            .filter(|p| p.classification() == classification)
            .map(|p| p.name())
            .collect()
    }

    /// Names in documentation order.
    pub fn doc_order(&self) -> &[String] {
        &self.doc_order
    }

    /// Documentation facts for every property, in documentation order.
    pub fn property_docs(&self) -> Vec<PropertyDoc> {
        self.doc_order
            .iter()
            .filter_map(|name| self.property(name))
            .map(|p| PropertyDoc {
                name: p.name().to_string(),
                doc: p.doc().to_string(),
                info: p.info(),
                classification: p.classification(),
                nested_type: p.nested_type(),
            })
            .collect()
    }

    /// The effective default: a type-level override, else the property's.
    pub fn default_for(&self, name: &str) -> Option<DefaultValue> {
        self.defaults
            .get(name)
            .cloned()
            .or_else(|| self.property(name).and_then(|p| p.default_value()))
    }

    /// Target of a deprecated alias.
    pub fn renamed_target(&self, name: &str) -> Option<&str> {
        self.renamed.get(name).map(String::as_str)
    }

    /// Whether `name` is a property or a renamed alias.
    pub fn accepts(&self, name: &str) -> bool {
        self.index.contains_key(name) || self.renamed.contains_key(name)
    }

    /// Split `input` into entries naming a declared property and the rest.
    pub fn filter_props<I, V>(&self, input: I) -> (BTreeMap<String, V>, BTreeMap<String, V>)
    where
        I: IntoIterator<Item = (String, V)>,
    {
        input.into_iter().partition(|(name, _)| self.index.contains_key(name))
    }

    /// The field receiving a single positional constructor argument.
    pub fn positional(&self) -> Option<&str> {
        self.positional.as_deref()
    }

    /// Whether instances carry a registry-tracked unique identifier.
    pub fn has_identity(&self) -> bool {
        self.identity
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn listeners(&self) -> &[Listener] {
        &self.listeners
    }

    pub(crate) fn validators(&self) -> &[ClassValidator] {
        &self.validators
    }

    pub(crate) fn initializers(&self) -> &[Initializer] {
        &self.initializers
    }

    /// Keyword names that are neither properties nor aliases.
    pub(crate) fn check_keywords<'k>(&self, names: impl Iterator<Item = &'k str>) -> Result<(), PropertyError> {
        let unknown: Vec<String> = names.filter(|n| !self.accepts(n)).map(str::to_string).collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(PropertyError::UnknownKeyword {
                type_name: self.name.clone(),
                keys: unknown,
            })
        }
    }

    /// Turn collected failures into the error the caller sees.
    pub(crate) fn report(&self, record: &Record, failures: Vec<FieldError>) -> PropertyError {
        match &self.error_hook {
            Some(hook) => hook(record, failures),
            None => PropertyError::Validation(propkit_core::AggregateValidation::new(failures)),
        }
    }
}

impl fmt::Debug for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bases: Vec<&str> = self.bases.iter().map(|b| b.name()).collect();
        f.debug_struct("RecordType")
            .field("name", &self.name)
            .field("bases", &bases)
            .field("properties", &self.doc_order)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}
