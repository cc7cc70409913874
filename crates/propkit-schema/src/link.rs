//! # Property Links
//!
//! A [`DirectionalLink`] copies a source property into a target property
//! whenever the source is set. [`link`] keeps two or more properties in
//! sync by creating a directional link for every ordered pair.
//!
//! Links are instance listeners on the source record, so they keep the
//! target alive as long as the source lives. [`DirectionalLink::unlink`]
//! disables a link without removing its listener. A link that is already
//! pushing a value ignores the notifications its own write causes, which
//! keeps symmetric links from looping.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use propkit_core::{LinkError, PropertyError};

use crate::handlers::Listener;
use crate::record::Record;
use crate::value::Value;

/// Maps the source value to the value written into the target.
pub type Transform = Rc<dyn Fn(Value) -> Result<Value, PropertyError>>;

/// Options shared by [`DirectionalLink::new`] and [`link`].
#[derive(Clone)]
pub struct LinkOptions {
    update_now: bool,
    change_only: bool,
    transform: Option<Transform>,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            update_now: false,
            change_only: true,
            transform: None,
        }
    }
}

impl LinkOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy the source value into the target when the link is created.
    pub fn update_now(mut self, update_now: bool) -> Self {
        self.update_now = update_now;
        self
    }

    /// Follow only changes of the source (the default) instead of every set.
    pub fn change_only(mut self, change_only: bool) -> Self {
        self.change_only = change_only;
        self
    }

    pub fn transform<F>(mut self, func: F) -> Self
    where
        F: Fn(Value) -> Result<Value, PropertyError> + 'static,
    {
        self.transform = Some(Rc::new(func));
        self
    }
}

impl fmt::Debug for LinkOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkOptions")
            .field("update_now", &self.update_now)
            .field("change_only", &self.change_only)
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

struct Push {
    target: Record,
    property: String,
    transform: Option<Transform>,
    unlinked: Cell<bool>,
    updating: Cell<bool>,
}

impl Push {
    fn run(&self, value: Option<Value>) -> Result<(), PropertyError> {
        if self.unlinked.get() || self.updating.get() {
            return Ok(());
        }
        self.updating.set(true);
        let result = self.write(value);
        self.updating.set(false);
        result
    }

    fn write(&self, value: Option<Value>) -> Result<(), PropertyError> {
        match value {
            Some(value) => {
                let value = match &self.transform {
                    Some(transform) => transform(value)?,
                    None => value,
                };
                self.target.set(&self.property, value)
            }
            None => self.target.unset(&self.property),
        }
    }
}

/// One-way link from a source property to a target property.
pub struct DirectionalLink {
    source: Record,
    property: String,
    push: Rc<Push>,
}

impl DirectionalLink {
    /// Link `source` to `target`, each an instance and a property name.
    ///
    /// Both properties must exist and the source must be observable.
    /// Linking a property to itself is refused.
    pub fn new(source: (&Record, &str), target: (&Record, &str), options: LinkOptions) -> Result<Self, PropertyError> {
        let (source, source_name) = source;
        let (target, target_name) = target;
        let source_prop = source.lookup(source_name)?;
        let target_prop = target.lookup(target_name)?;
        if source.ptr_eq(target) && source_prop.name() == target_prop.name() {
            return Err(LinkError::Duplicate {
                type_name: source.type_name().to_string(),
                property: source_prop.name().to_string(),
            }
            .into());
        }

        let push = Rc::new(Push {
            target: target.clone(),
            property: target_prop.name().to_string(),
            transform: options.transform,
            unlinked: Cell::new(false),
            updating: Cell::new(false),
        });
        if options.update_now {
            push.run(source.get(source_prop.name())?)?;
        }
        let handler = Rc::clone(&push);
        let on_source = move |_: &Record, change: &crate::handlers::Change| handler.run(change.value.clone());
        let listener = if options.change_only {
            Listener::observer(source_prop.name(), on_source)
        } else {
            Listener::set_observer(source_prop.name(), on_source)
        };
        source.observe(listener)?;
        Ok(Self {
            source: source.clone(),
            property: source_prop.name().to_string(),
            push,
        })
    }

    pub fn source(&self) -> (&Record, &str) {
        (&self.source, &self.property)
    }

    pub fn target(&self) -> (&Record, &str) {
        (&self.push.target, &self.push.property)
    }

    /// Stop copying values. The listener stays attached.
    pub fn unlink(&self) {
        self.push.unlinked.set(true);
    }

    /// Resume copying values after [`unlink`](Self::unlink).
    pub fn relink(&self) {
        self.push.unlinked.set(false);
    }

    pub fn is_linked(&self) -> bool {
        !self.push.unlinked.get()
    }
}

impl fmt::Debug for DirectionalLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectionalLink")
            .field("source", &(self.source.owner(), &self.property))
            .field("target", &(self.push.target.owner(), &self.push.property))
            .field("linked", &self.is_linked())
            .finish()
    }
}

/// Symmetric link over several properties.
#[derive(Debug)]
pub struct Link {
    dlinks: Vec<DirectionalLink>,
}

impl Link {
    /// The directional links, one per ordered pair of items.
    pub fn dlinks(&self) -> &[DirectionalLink] {
        &self.dlinks
    }

    pub fn unlink(&self) {
        self.dlinks.iter().for_each(DirectionalLink::unlink);
    }

    pub fn relink(&self) {
        self.dlinks.iter().for_each(DirectionalLink::relink);
    }
}

/// Keep the values of every item in sync.
///
/// Linking `n` items creates `n * (n - 1)` directional links, updated in
/// item order. Transforms are refused; use [`DirectionalLink`] instead.
pub fn link(items: &[(&Record, &str)], options: LinkOptions) -> Result<Link, PropertyError> {
    if items.len() < 2 {
        return Err(LinkError::TooFewItems { count: items.len() }.into());
    }
    if options.transform.is_some() {
        return Err(LinkError::TransformNotAllowed.into());
    }
    let mut dlinks = Vec::with_capacity(items.len() * (items.len() - 1));
    for (i, source) in items.iter().enumerate() {
        for (j, target) in items.iter().enumerate() {
            if i != j {
                dlinks.push(DirectionalLink::new(*source, *target, options.clone())?);
            }
        }
    }
    Ok(Link { dlinks })
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::basic::{Integer, Text};
    use crate::builder::SchemaBuilder;
    use crate::property::Property;
    use crate::registry::TypeRegistry;
    use crate::schema::RecordType;

    fn knob_type(registry: &TypeRegistry) -> Rc<RecordType> {
        SchemaBuilder::new("Knob")
            .property("level", Property::new("", Integer::new()).optional())
            .property("mirror", Property::new("", Integer::new()).optional())
            .property("label", Property::new("", Text::new()).optional())
            .build(registry)
            .unwrap()
    }

    #[test]
    fn test_source_changes_reach_the_target() {
        let registry = TypeRegistry::new();
        let ty = knob_type(&registry);
        let (a, b) = (Record::new(&ty).unwrap(), Record::new(&ty).unwrap());
        a.set("level", 3).unwrap();

        let dlink = DirectionalLink::new((&a, "level"), (&b, "level"), LinkOptions::new()).unwrap();
        assert_eq!(b.get("level").unwrap(), None);
        a.set("level", 4).unwrap();
        assert_eq!(b.get("level").unwrap(), Some(Value::Int(4)));

        b.set("level", 9).unwrap();
        assert_eq!(a.get("level").unwrap(), Some(Value::Int(4)));
        a.unset("level").unwrap();
        assert_eq!(b.get("level").unwrap(), None);
        assert!(dlink.source().0.ptr_eq(&a));
        assert!(dlink.target().0.ptr_eq(&b));
    }

    #[test]
    fn test_update_now_and_transform() {
        let registry = TypeRegistry::new();
        let ty = knob_type(&registry);
        let knob = Record::with(&ty, [("level", 2)]).unwrap();
        let options = LinkOptions::new()
            .update_now(true)
            .transform(|value| Ok(Value::from(format!("level {}", value.as_i64().unwrap_or_default()))));
        DirectionalLink::new((&knob, "level"), (&knob, "label"), options).unwrap();
        assert_eq!(knob.get("label").unwrap(), Some(Value::from("level 2")));
        knob.set("level", 7).unwrap();
        assert_eq!(knob.get("label").unwrap(), Some(Value::from("level 7")));
    }

    #[test]
    fn test_change_only_controls_repeated_sets() {
        let registry = TypeRegistry::new();
        let ty = knob_type(&registry);
        let knob = Record::with(&ty, [("level", 1)]).unwrap();
        DirectionalLink::new((&knob, "level"), (&knob, "mirror"), LinkOptions::new().update_now(true)).unwrap();
        knob.set("mirror", 5).unwrap();
        knob.set("level", 1).unwrap();
        assert_eq!(knob.get("mirror").unwrap(), Some(Value::Int(5)));

        let every_set = Record::with(&ty, [("level", 1)]).unwrap();
        DirectionalLink::new((&every_set, "level"), (&every_set, "mirror"), LinkOptions::new().change_only(false))
            .unwrap();
        every_set.set("mirror", 5).unwrap();
        every_set.set("level", 1).unwrap();
        assert_eq!(every_set.get("mirror").unwrap(), Some(Value::Int(1)));
    }

    #[test]
    fn test_unlink_and_relink() {
        let registry = TypeRegistry::new();
        let ty = knob_type(&registry);
        let knob = Record::new(&ty).unwrap();
        let dlink = DirectionalLink::new((&knob, "level"), (&knob, "mirror"), LinkOptions::new()).unwrap();
        dlink.unlink();
        assert!(!dlink.is_linked());
        knob.set("level", 1).unwrap();
        assert_eq!(knob.get("mirror").unwrap(), None);
        dlink.relink();
        knob.set("level", 2).unwrap();
        assert_eq!(knob.get("mirror").unwrap(), Some(Value::Int(2)));
    }

    #[test]
    fn test_invalid_links_are_refused() {
        let registry = TypeRegistry::new();
        let ty = knob_type(&registry);
        let knob = Record::new(&ty).unwrap();
        let err = DirectionalLink::new((&knob, "level"), (&knob, "level"), LinkOptions::new()).unwrap_err();
        assert!(matches!(err, PropertyError::Link(LinkError::Duplicate { .. })));
        let err = DirectionalLink::new((&knob, "level"), (&knob, "nope"), LinkOptions::new()).unwrap_err();
        assert!(matches!(err, PropertyError::UnknownProperty { .. }));

        let err = link(&[(&knob, "level")], LinkOptions::new()).unwrap_err();
        assert!(matches!(err, PropertyError::Link(LinkError::TooFewItems { count: 1 })));
        let err = link(
            &[(&knob, "level"), (&knob, "mirror")],
            LinkOptions::new().transform(Ok),
        )
        .unwrap_err();
        assert!(matches!(err, PropertyError::Link(LinkError::TransformNotAllowed)));
    }

    #[test]
    fn test_symmetric_link_keeps_every_item_in_sync() {
        let registry = TypeRegistry::new();
        let ty = knob_type(&registry);
        let log = Rc::new(RefCell::new(Vec::new()));
        let (a, b, c) = (Record::new(&ty).unwrap(), Record::new(&ty).unwrap(), Record::new(&ty).unwrap());
        let seen = Rc::clone(&log);
        c.observe(Listener::observer("level", move |_, change| {
            seen.borrow_mut().push(change.value.clone());
            Ok(())
        }))
        .unwrap();

        let synced = link(&[(&a, "level"), (&b, "level"), (&c, "level")], LinkOptions::new()).unwrap();
        assert_eq!(synced.dlinks().len(), 6);
        b.set("level", 8).unwrap();
        for record in [&a, &b, &c] {
            assert_eq!(record.get("level").unwrap(), Some(Value::Int(8)));
        }
        assert_eq!(*log.borrow(), vec![Some(Value::Int(8))]);

        synced.unlink();
        a.set("level", 1).unwrap();
        assert_eq!(b.get("level").unwrap(), Some(Value::Int(8)));
        synced.relink();
        a.set("level", 2).unwrap();
        assert_eq!(c.get("level").unwrap(), Some(Value::Int(2)));
    }
}
