//! # Change Handlers
//!
//! Listeners attached to a record type (or to one instance) and invoked
//! synchronously from the record's set path. Three phases exist:
//!
//! 1. [`ListenerMode::Validate`] runs before the value is stored and may
//!    replace `change.value`.
//! 2. [`ListenerMode::ObserveChange`] runs after storing, only when the new
//!    value differs from the previous one.
//! 3. [`ListenerMode::ObserveSet`] runs after storing, always.
//!
//! Within one phase listeners run in attachment order: class listeners
//! (inherited first), then instance listeners.

use std::fmt;
use std::rc::Rc;

use propkit_core::{FieldError, PropertyError};

use crate::record::Record;
use crate::value::Value;

/// Notification phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerMode {
    /// Before storing; may replace the proposed value.
    Validate,
    /// After storing, when the value changed.
    ObserveChange,
    /// After storing, unconditionally.
    ObserveSet,
}

/// Whether a set notifies listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Notify {
    #[default]
    Loud,
    Silent,
}

/// One notification. `None` means the field is unset.
#[derive(Debug, Clone)]
pub struct Change {
    pub name: String,
    pub previous: Option<Value>,
    pub value: Option<Value>,
    pub mode: ListenerMode,
}

/// The properties a listener watches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Names {
    /// Every property of the type.
    All,
    /// The listed properties.
    Only(Vec<String>),
}

impl Names {
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(names) => names.iter().any(|n| n == name),
        }
    }
}

impl From<&str> for Names {
    fn from(name: &str) -> Self {
        Self::Only(vec![name.to_string()])
    }
}

impl From<String> for Names {
    fn from(name: String) -> Self {
        Self::Only(vec![name])
    }
}

impl<S: Into<String>, const N: usize> From<[S; N]> for Names {
    fn from(names: [S; N]) -> Self {
        Self::Only(names.into_iter().map(Into::into).collect())
    }
}

impl From<Vec<String>> for Names {
    fn from(names: Vec<String>) -> Self {
        Self::Only(names)
    }
}

pub type HandlerFn = Rc<dyn Fn(&Record, &mut Change) -> Result<(), PropertyError>>;

/// Whole-record check run by `validate()`.
pub type ClassValidator = Rc<dyn Fn(&Record) -> Result<(), PropertyError>>;

/// Translates collected failures into a domain error.
pub type ErrorHook = Rc<dyn Fn(&Record, Vec<FieldError>) -> PropertyError>;

/// Runs after keyword construction and after deserialization.
pub type Initializer = Rc<dyn Fn(&Record) -> Result<(), PropertyError>>;

/// A handler bound to a set of names and a phase.
#[derive(Clone)]
pub struct Listener {
    names: Names,
    mode: ListenerMode,
    func: HandlerFn,
}

impl Listener {
    pub fn new<F>(names: impl Into<Names>, mode: ListenerMode, func: F) -> Self
    where
        F: Fn(&Record, &mut Change) -> Result<(), PropertyError> + 'static,
    {
        Self {
            names: names.into(),
            mode,
            func: Rc::new(func),
        }
    }

    /// Listener for value changes.
    pub fn observer<F>(names: impl Into<Names>, func: F) -> Self
    where
        F: Fn(&Record, &Change) -> Result<(), PropertyError> + 'static,
    {
        Self::new(names, ListenerMode::ObserveChange, move |record, change: &mut Change| {
            func(record, change)
        })
    }

    /// Listener for every set, changed or not.
    pub fn set_observer<F>(names: impl Into<Names>, func: F) -> Self
    where
        F: Fn(&Record, &Change) -> Result<(), PropertyError> + 'static,
    {
        Self::new(names, ListenerMode::ObserveSet, move |record, change: &mut Change| {
            func(record, change)
        })
    }

    /// Pre-store listener that may rewrite the value.
    pub fn validator<F>(names: impl Into<Names>, func: F) -> Self
    where
        F: Fn(&Record, &mut Change) -> Result<(), PropertyError> + 'static,
    {
        Self::new(names, ListenerMode::Validate, func)
    }

    pub fn names(&self) -> &Names {
        &self.names
    }

    pub fn mode(&self) -> ListenerMode {
        self.mode
    }

    pub(crate) fn applies(&self, name: &str, mode: ListenerMode) -> bool {
        self.mode == mode && self.names.matches(name)
    }

    pub(crate) fn handler(&self) -> HandlerFn {
        Rc::clone(&self.func)
    }

    /// Whether two listeners share one handler, e.g. both inherited from a
    /// common base.
    pub(crate) fn same_handler(&self, other: &Listener) -> bool {
        Rc::ptr_eq(&self.func, &other.func)
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("names", &self.names)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}
