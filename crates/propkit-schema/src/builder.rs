//! # Schema Builder
//!
//! Assembles a [`RecordType`] once, at definition time:
//!
//! 1. Merge property tables, listeners, validators, defaults and hooks from
//!    base types. Later bases are merged first so earlier bases win, and the
//!    type's own declarations win over all of them.
//! 2. Name each declared property exactly once, rejecting private
//!    (`_`-prefixed) and duplicate names.
//! 3. Check aliases, handler targets and default overrides. Every default is
//!    validated against its own property with no owner.
//! 4. Compute documentation order: alphabetical unless an explicit order is
//!    given, which must be a permutation of all property names.
//! 5. Register the result in the [`TypeRegistry`].
//!
//! All failures are [`SchemaDefinitionError`]s; nothing here touches
//! instances.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::rc::Rc;

use propkit_core::{FieldError, PropertyError, SchemaDefinitionError};

use crate::handlers::{Change, ClassValidator, ErrorHook, Initializer, Listener, Names};
use crate::property::{DefaultValue, Property};
use crate::record::Record;
use crate::registry::TypeRegistry;
use crate::schema::RecordType;
use crate::value::Value;

/// Declarative description of a record type.
pub struct SchemaBuilder {
    name: String,
    bases: Vec<Rc<RecordType>>,
    properties: Vec<(String, Property)>,
    renamed: Vec<(String, String)>,
    listeners: Vec<Listener>,
    validators: Vec<ClassValidator>,
    defaults: Vec<(String, DefaultValue)>,
    doc_order: Option<Vec<String>>,
    error_hook: Option<ErrorHook>,
    initializers: Vec<Initializer>,
    positional: Option<String>,
    identity: bool,
}

impl SchemaBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bases: Vec::new(),
            properties: Vec::new(),
            renamed: Vec::new(),
            listeners: Vec::new(),
            validators: Vec::new(),
            defaults: Vec::new(),
            doc_order: None,
            error_hook: None,
            initializers: Vec::new(),
            positional: None,
            identity: false,
        }
    }

    /// Inherit from `base`. Call repeatedly for several bases; earlier
    /// bases take precedence.
    pub fn extends(mut self, base: &Rc<RecordType>) -> Self {
        self.bases.push(Rc::clone(base));
        self
    }

    pub fn property(mut self, name: impl Into<String>, property: Property) -> Self {
        self.properties.push((name.into(), property));
        self
    }

    /// Keep `old` as a deprecated alias of `new`.
    pub fn renamed(mut self, old: impl Into<String>, new: impl Into<String>) -> Self {
        self.renamed.push((old.into(), new.into()));
        self
    }

    /// Run `func` after a watched property changes value.
    pub fn observer<F>(mut self, names: impl Into<Names>, func: F) -> Self
    where
        F: Fn(&Record, &Change) -> Result<(), PropertyError> + 'static,
    {
        self.listeners.push(Listener::observer(names, func));
        self
    }

    /// Run `func` after every set of a watched property.
    pub fn observe_set<F>(mut self, names: impl Into<Names>, func: F) -> Self
    where
        F: Fn(&Record, &Change) -> Result<(), PropertyError> + 'static,
    {
        self.listeners.push(Listener::set_observer(names, func));
        self
    }

    /// Run `func` before a watched property is stored. It may replace
    /// `change.value`.
    pub fn validator<F>(mut self, names: impl Into<Names>, func: F) -> Self
    where
        F: Fn(&Record, &mut Change) -> Result<(), PropertyError> + 'static,
    {
        self.listeners.push(Listener::validator(names, func));
        self
    }

    pub fn listener(mut self, listener: Listener) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Whole-record check run by `validate()`, after property checks.
    pub fn class_validator<F>(mut self, func: F) -> Self
    where
        F: Fn(&Record) -> Result<(), PropertyError> + 'static,
    {
        self.validators.push(Rc::new(func));
        self
    }

    /// Override the default of a declared or inherited property.
    pub fn default(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.push((name.into(), DefaultValue::Value(value.into())));
        self
    }

    pub fn default_with<F>(mut self, name: impl Into<String>, func: F) -> Self
    where
        F: Fn() -> Value + 'static,
    {
        self.defaults.push((name.into(), DefaultValue::generator(func)));
        self
    }

    /// Explicit documentation order; must name every property exactly once.
    pub fn doc_order<I, S>(mut self, order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.doc_order = Some(order.into_iter().map(Into::into).collect());
        self
    }

    /// Translate validation failures into a domain error. The hook receives
    /// every failure.
    pub fn error_hook<F>(mut self, func: F) -> Self
    where
        F: Fn(&Record, Vec<FieldError>) -> PropertyError + 'static,
    {
        self.error_hook = Some(Rc::new(func));
        self
    }

    /// Run after keyword construction and after deserialization.
    pub fn initializer<F>(mut self, func: F) -> Self
    where
        F: Fn(&Record) -> Result<(), PropertyError> + 'static,
    {
        self.initializers.push(Rc::new(func));
        self
    }

    /// Field that receives a non-mapping value given to an instance property.
    pub fn positional(mut self, name: impl Into<String>) -> Self {
        self.positional = Some(name.into());
        self
    }

    pub(crate) fn identity(mut self) -> Self {
        self.identity = true;
        self
    }

    /// Build the record type and register it.
    pub fn build(self, registry: &TypeRegistry) -> Result<Rc<RecordType>, SchemaDefinitionError> {
        let type_name = self.name;
        if type_name.is_empty() {
            return Err(SchemaDefinitionError::EmptyTypeName);
        }

        let mut table = PropertyTable::default();
        let mut renamed = BTreeMap::new();
        let mut listeners: Vec<Listener> = Vec::new();
        let mut validators: Vec<ClassValidator> = Vec::new();
        let mut defaults = BTreeMap::new();
        let mut initializers: Vec<Initializer> = Vec::new();
        let mut error_hook = None;
        let mut positional = None;
        let mut identity = self.identity;

        for base in self.bases.iter().rev() {
            for prop in base.properties() {
                table.insert(Rc::clone(prop));
            }
            renamed.extend(base.renamed.clone());
            for listener in base.listeners() {
                if !listeners.iter().any(|l| l.same_handler(listener)) {
                    listeners.push(listener.clone());
                }
            }
            for validator in base.validators() {
                if !validators.iter().any(|v| Rc::ptr_eq(v, validator)) {
                    validators.push(Rc::clone(validator));
                }
            }
            for init in base.initializers() {
                if !initializers.iter().any(|i| Rc::ptr_eq(i, init)) {
                    initializers.push(Rc::clone(init));
                }
            }
            defaults.extend(base.defaults.clone());
            if base.error_hook.is_some() {
                error_hook = base.error_hook.clone();
            }
            if base.positional.is_some() {
                positional = base.positional.clone();
            }
            identity |= base.identity;
        }

        let mut declared = HashSet::new();
        for (name, mut prop) in self.properties {
            if name.starts_with('_') {
                return Err(SchemaDefinitionError::PrivateName {
                    type_name,
                    property: name,
                });
            }
            if !declared.insert(name.clone()) {
                return Err(SchemaDefinitionError::DuplicateProperty {
                    type_name,
                    property: name,
                });
            }
            prop.bind(&name, registry)?;
            if let Some(default) = prop.explicit_default() {
                check_default(&type_name, &prop, default)?;
            }
            // An own property replaces any inherited override of its default.
            defaults.remove(&name);
            renamed.remove(&name);
            table.insert(Rc::new(prop));
        }

        for (old, new) in self.renamed {
            let reason = if table.contains(&old) {
                Some("the alias shadows a declared property")
            } else if !table.contains(&new) {
                Some("the target is not a declared property")
            } else {
                None
            };
            if let Some(reason) = reason {
                return Err(SchemaDefinitionError::InvalidRename {
                    type_name,
                    old,
                    new,
                    reason: reason.into(),
                });
            }
            renamed.insert(old, new);
        }

        for listener in &self.listeners {
            if let Names::Only(names) = listener.names() {
                for name in names {
                    check_handler_target(&type_name, &table, name)?;
                }
            }
        }
        listeners.extend(self.listeners);
        validators.extend(self.validators);

        for (name, default) in self.defaults {
            let prop = table
                .get(&name)
                .ok_or_else(|| SchemaDefinitionError::UnknownDefault {
                    type_name: type_name.clone(),
                    property: name.clone(),
                })?;
            check_default(&type_name, prop, &default)?;
            defaults.insert(name, default);
        }

        let names: Vec<String> = table.props.iter().map(|p| p.name().to_string()).collect();
        let doc_order = match self.doc_order {
            Some(order) => {
                check_doc_order(&type_name, &names, &order)?;
                order
            }
            None => {
                let mut sorted = names.clone();
                sorted.sort();
                sorted
            }
        };

        if let Some(hook) = self.error_hook {
            error_hook = Some(hook);
        }
        if let Some(field) = self.positional {
            positional = Some(field);
        }
        if let Some(field) = &positional {
            if !table.get(field).is_some_and(|p| p.is_mutable()) {
                return Err(SchemaDefinitionError::InvalidKind {
                    property: field.clone(),
                    reason: format!("positional argument of {type_name} must name a mutable property"),
                });
            }
        }
        initializers.extend(self.initializers);

        let ty = Rc::new(RecordType {
            name: type_name,
            bases: self.bases,
            properties: table.props,
            index: table.index,
            renamed,
            listeners,
            validators,
            defaults,
            doc_order,
            error_hook,
            initializers,
            positional,
            identity,
            config: registry.config().clone(),
        });
        registry.register(Rc::clone(&ty))?;
        Ok(ty)
    }
}

/// Ordered properties with name lookup; re-inserting a name keeps its slot.
#[derive(Default)]
struct PropertyTable {
    props: Vec<Rc<Property>>,
    index: HashMap<String, usize>,
}

impl PropertyTable {
    fn insert(&mut self, prop: Rc<Property>) {
        match self.index.get(prop.name()) {
            Some(&i) => self.props[i] = prop,
            None => {
                self.index.insert(prop.name().to_string(), self.props.len());
                self.props.push(prop);
            }
        }
    }

    fn get(&self, name: &str) -> Option<&Rc<Property>> {
        self.index.get(name).map(|&i| &self.props[i])
    }

    fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }
}

fn check_default(type_name: &str, prop: &Property, default: &DefaultValue) -> Result<(), SchemaDefinitionError> {
    let invalid = |reason: String| SchemaDefinitionError::InvalidDefault {
        type_name: type_name.to_string(),
        property: prop.name().to_string(),
        reason,
    };
    let value = default.resolve().map_err(|e| invalid(e.to_string()))?;
    prop.validate(None, value).map_err(|e| invalid(e.message))?;
    Ok(())
}

fn check_handler_target(type_name: &str, table: &PropertyTable, name: &str) -> Result<(), SchemaDefinitionError> {
    match table.get(name) {
        None => Err(SchemaDefinitionError::UnknownHandlerTarget {
            type_name: type_name.to_string(),
            property: name.to_string(),
        }),
        Some(prop) if !prop.is_mutable() => Err(SchemaDefinitionError::ImmutableHandlerTarget {
            type_name: type_name.to_string(),
            property: name.to_string(),
        }),
        Some(_) => Ok(()),
    }
}

fn check_doc_order(type_name: &str, names: &[String], order: &[String]) -> Result<(), SchemaDefinitionError> {
    let expected: BTreeSet<&str> = names.iter().map(String::as_str).collect();
    let given: BTreeSet<&str> = order.iter().map(String::as_str).collect();
    let reason = if given.len() != order.len() {
        "a name appears more than once".to_string()
    } else if expected != given {
        let missing: Vec<&str> = expected.difference(&given).copied().collect();
        let extra: Vec<&str> = given.difference(&expected).copied().collect();
        format!("missing {missing:?}, unknown {extra:?}")
    } else {
        return Ok(());
    };
    Err(SchemaDefinitionError::DocOrder {
        type_name: type_name.to_string(),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::{Integer, Text};
    use crate::handlers::ListenerMode;
    use crate::instance::Instance;
    use crate::property::Classification;

    fn modes(ty: &RecordType) -> Vec<ListenerMode> {
        ty.listeners().iter().map(Listener::mode).collect()
    }

    fn int(doc: &str) -> Property {
        Property::new(doc, Integer::new())
    }

    #[test]
    fn test_private_and_duplicate_names_are_rejected() {
        let registry = TypeRegistry::new();
        let private = SchemaBuilder::new("P").property("_a", int("")).build(&registry);
        assert!(matches!(private, Err(SchemaDefinitionError::PrivateName { .. })));

        let dup = SchemaBuilder::new("D")
            .property("a", int(""))
            .property("a", int(""))
            .build(&registry);
        assert!(matches!(dup, Err(SchemaDefinitionError::DuplicateProperty { .. })));
        assert!(matches!(
            SchemaBuilder::new("").build(&registry),
            Err(SchemaDefinitionError::EmptyTypeName)
        ));
    }

    #[test]
    fn test_doc_order_defaults_to_alphabetical() {
        let registry = TypeRegistry::new();
        let ty = SchemaBuilder::new("T")
            .property("b", int("B"))
            .property("a", int("A"))
            .build(&registry)
            .unwrap();
        assert_eq!(ty.doc_order(), &["a".to_string(), "b".to_string()]);
        let names: Vec<&str> = ty.property_names().collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_doc_order_must_be_a_permutation() {
        let registry = TypeRegistry::new();
        let build = |order: Vec<&str>| {
            SchemaBuilder::new("T")
                .property("a", int(""))
                .property("b", int(""))
                .doc_order(order)
                .build(&registry)
        };
        assert!(build(vec!["b", "a"]).is_ok());
        assert!(matches!(build(vec!["a"]), Err(SchemaDefinitionError::DocOrder { .. })));
        assert!(matches!(build(vec!["a", "b", "c"]), Err(SchemaDefinitionError::DocOrder { .. })));
        assert!(matches!(build(vec!["a", "a"]), Err(SchemaDefinitionError::DocOrder { .. })));
    }

    #[test]
    fn test_invalid_defaults_are_rejected() {
        let registry = TypeRegistry::new();
        let own = SchemaBuilder::new("T")
            .property("a", Property::new("", Integer::new().max(5)).default(10))
            .build(&registry);
        assert!(matches!(own, Err(SchemaDefinitionError::InvalidDefault { .. })));

        let override_unknown = SchemaBuilder::new("T").property("a", int("")).default("b", 1).build(&registry);
        assert!(matches!(override_unknown, Err(SchemaDefinitionError::UnknownDefault { .. })));

        let override_bad = SchemaBuilder::new("T").property("a", int("")).default("a", "x").build(&registry);
        assert!(matches!(override_bad, Err(SchemaDefinitionError::InvalidDefault { .. })));
    }

    #[test]
    fn test_handler_targets_must_be_mutable_properties() {
        let registry = TypeRegistry::new();
        let unknown = SchemaBuilder::new("T")
            .property("a", int(""))
            .observer("b", |_, _| Ok(()))
            .build(&registry);
        assert!(matches!(unknown, Err(SchemaDefinitionError::UnknownHandlerTarget { .. })));

        let immutable = SchemaBuilder::new("T")
            .property("a", int("").default(1).read_only())
            .observer("a", |_, _| Ok(()))
            .build(&registry);
        assert!(matches!(immutable, Err(SchemaDefinitionError::ImmutableHandlerTarget { .. })));

        let all = SchemaBuilder::new("T")
            .property("a", int(""))
            .observer(Names::All, |_, _| Ok(()))
            .validator("a", |_, _| Ok(()))
            .build(&registry)
            .unwrap();
        assert_eq!(modes(&all), vec![ListenerMode::ObserveChange, ListenerMode::Validate]);
    }

    #[test]
    fn test_inheritance_keeps_slots_and_own_declarations_win() {
        let registry = TypeRegistry::new();
        let base = SchemaBuilder::new("Base")
            .property("a", int("base a"))
            .property("b", int("base b"))
            .observer("a", |_, _| Ok(()))
            .build(&registry)
            .unwrap();
        let child = SchemaBuilder::new("Child")
            .extends(&base)
            .property("a", Property::new("child a", Text::new()))
            .property("c", int("c"))
            .build(&registry)
            .unwrap();
        let names: Vec<&str> = child.property_names().collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(child.property("a").unwrap().doc(), "child a");
        assert_eq!(child.listeners().len(), 1);
        assert!(child.is_a(&base));
        assert!(!base.is_a(&child));
    }

    #[test]
    fn test_earlier_base_wins_and_shared_handlers_merge_once() {
        let registry = TypeRegistry::new();
        let root = SchemaBuilder::new("Root")
            .property("x", int("root"))
            .observer("x", |_, _| Ok(()))
            .build(&registry)
            .unwrap();
        let left = SchemaBuilder::new("Left")
            .extends(&root)
            .property("y", int("left"))
            .build(&registry)
            .unwrap();
        let right = SchemaBuilder::new("Right")
            .extends(&root)
            .property("y", int("right"))
            .build(&registry)
            .unwrap();
        let both = SchemaBuilder::new("Both")
            .extends(&left)
            .extends(&right)
            .build(&registry)
            .unwrap();
        assert_eq!(both.property("y").unwrap().doc(), "left");
        assert_eq!(both.listeners().len(), 1);
    }

    #[test]
    fn test_renamed_alias_checks() {
        let registry = TypeRegistry::new();
        let ok = SchemaBuilder::new("T")
            .property("new", int(""))
            .renamed("old", "new")
            .build(&registry)
            .unwrap();
        assert_eq!(ok.renamed_target("old"), Some("new"));
        assert!(ok.accepts("old"));

        let dangling = SchemaBuilder::new("T").property("a", int("")).renamed("old", "missing").build(&registry);
        assert!(matches!(dangling, Err(SchemaDefinitionError::InvalidRename { .. })));
        let shadow = SchemaBuilder::new("T").property("a", int("")).renamed("a", "a").build(&registry);
        assert!(matches!(shadow, Err(SchemaDefinitionError::InvalidRename { .. })));
    }

    #[test]
    fn test_property_docs_expose_documentation_facts() {
        let registry = TypeRegistry::new();
        let ty = SchemaBuilder::new("Doc")
            .property("name", Property::new("The name", Text::new()))
            .property("count", int("How many").optional())
            .property("child", Property::new("Nested", Instance::new("Doc")).optional())
            .build(&registry)
            .unwrap();
        let docs = ty.property_docs();
        let names: Vec<&str> = docs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["child", "count", "name"]);
        assert_eq!(docs[0].nested_type.as_deref(), Some("Doc"));
        assert_eq!(docs[1].classification, Classification::Optional);
        assert_eq!(docs[2].classification, Classification::Required);
        assert_eq!(docs[2].doc, "The name");
        assert_eq!(docs[2].info, "a string");
    }

    #[test]
    fn test_positional_must_name_a_mutable_property() {
        let registry = TypeRegistry::new();
        let bad = SchemaBuilder::new("T").property("a", int("")).positional("b").build(&registry);
        assert!(matches!(bad, Err(SchemaDefinitionError::InvalidKind { .. })));
        let good = SchemaBuilder::new("T").property("a", int("")).positional("a").build(&registry).unwrap();
        assert_eq!(good.positional(), Some("a"));
    }

    #[test]
    fn test_filter_props_splits_declared_names() {
        let registry = TypeRegistry::new();
        let base = SchemaBuilder::new("Base").property("a", int("")).build(&registry).unwrap();
        let ty = SchemaBuilder::new("Child")
            .extends(&base)
            .property("b", int(""))
            .renamed("old_b", "b")
            .build(&registry)
            .unwrap();
        let input = [("a", 1), ("b", 2), ("old_b", 3), ("c", 4)].map(|(k, v)| (k.to_string(), v));
        let (props, others) = ty.filter_props(input);
        assert_eq!(props.keys().collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(others.into_iter().collect::<Vec<_>>(), [("c".to_string(), 4), ("old_b".to_string(), 3)]);
    }
}
