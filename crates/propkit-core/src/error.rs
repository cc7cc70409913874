//! # Error Types — Structured Validation Failures
//!
//! Defines the error types used throughout propkit. All errors use
//! `thiserror` for derive-based `Display` and `Error` implementations.
//!
//! ## Design
//!
//! - A single property failure is a [`FieldError`]: property name, owning
//!   instance, reason tag and a human-readable message. Union failures keep
//!   the per-candidate failures in `related`.
//! - Whole-object validation collects every failure into one
//!   [`AggregateValidation`]. It is never truncated.
//! - [`SchemaDefinitionError`] is produced only while building a record type.
//! - Serialization failures are not aggregated: they abort immediately.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::Owner;

// ─── Field failures ─────────────────────────────────────────────────

/// Machine-readable tag for a field failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reason {
    /// A required property has no value.
    Missing,
    /// A value was rejected by its validator.
    Invalid,
}

impl Reason {
    /// The tag as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Invalid => "invalid",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One property that failed validation.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("{message}")]
pub struct FieldError {
    /// Name of the failing property.
    pub property: String,
    /// Instance the property belongs to. `None` when a value was checked
    /// outside any instance (schema defaults, union candidates).
    pub owner: Option<Owner>,
    /// Why the property failed.
    pub reason: Reason,
    /// Human-readable explanation.
    pub message: String,
    /// Underlying failures, e.g. one per rejected union candidate or the
    /// failures of a nested record that could not be constructed.
    pub related: Vec<FieldError>,
}

impl FieldError {
    /// A value rejected by its validator.
    pub fn invalid(
        property: impl Into<String>,
        owner: Option<Owner>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            property: property.into(),
            owner,
            reason: Reason::Invalid,
            message: message.into(),
            related: Vec::new(),
        }
    }

    /// A required property with no value.
    pub fn missing(property: impl Into<String>, owner: Option<Owner>) -> Self {
        let property = property.into();
        let message = match &owner {
            Some(owner) => format!(
                "The '{property}' property of a {} instance is required and has not been set.",
                owner.type_name
            ),
            None => format!("The '{property}' property is required and has not been set."),
        };
        Self {
            property,
            owner,
            reason: Reason::Missing,
            message,
            related: Vec::new(),
        }
    }

    /// Attach underlying failures.
    pub fn with_related(mut self, related: Vec<FieldError>) -> Self {
        self.related = related;
        self
    }

    /// Name of the owning record type, if any.
    pub fn type_name(&self) -> Option<&str> {
        self.owner.as_ref().map(|o| o.type_name.as_str())
    }

    /// Whether this is a missing-value failure.
    pub fn is_missing(&self) -> bool {
        self.reason == Reason::Missing
    }
}

/// Every failure found by one whole-object validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateValidation {
    failures: Vec<FieldError>,
}

impl AggregateValidation {
    /// Wrap a list of failures.
    pub fn new(failures: Vec<FieldError>) -> Self {
        Self { failures }
    }

    /// Number of failures.
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Whether there are no failures.
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Access the failures in discovery order.
    pub fn failures(&self) -> &[FieldError] {
        &self.failures
    }

    /// Consume and return the failures.
    pub fn into_failures(self) -> Vec<FieldError> {
        self.failures
    }

    /// Failures recorded against the named property.
    pub fn for_property<'a>(&'a self, property: &'a str) -> impl Iterator<Item = &'a FieldError> {
        self.failures.iter().filter(move |f| f.property == property)
    }
}

impl fmt::Display for AggregateValidation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} validation failure(s)", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "\n  - [{}] {}", failure.reason, failure.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateValidation {}

// ─── Definition errors ──────────────────────────────────────────────

/// A record type could not be built. Raised only at definition time.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaDefinitionError {
    /// Record types need a name for the type registry.
    #[error("record type name must not be empty")]
    EmptyTypeName,

    /// Property names must not start with the private prefix.
    #[error("property '{property}' on {type_name} must not begin with '_'")]
    PrivateName {
        /// The record type being built.
        type_name: String,
        /// Offending property name.
        property: String,
    },

    /// The same name was declared twice on one record type.
    #[error("property '{property}' is declared more than once on {type_name}")]
    DuplicateProperty {
        /// The record type being built.
        type_name: String,
        /// Duplicated property name.
        property: String,
    },

    /// A descriptor already carries a different name.
    #[error("property already named '{from}' cannot be renamed to '{to}'")]
    NameReassigned {
        /// Name assigned first.
        from: String,
        /// Name attempted second.
        to: String,
    },

    /// An explicit documentation order is not a permutation of all names.
    #[error("documentation order for {type_name} is invalid: {reason}")]
    DocOrder {
        /// The record type being built.
        type_name: String,
        /// What is wrong with the order.
        reason: String,
    },

    /// A default value fails its own descriptor's validation.
    #[error("default for '{property}' on {type_name} is invalid: {reason}")]
    InvalidDefault {
        /// The record type being built.
        type_name: String,
        /// Property whose default failed.
        property: String,
        /// Validation message.
        reason: String,
    },

    /// A default override names no declared property.
    #[error("default given for unknown property '{property}' on {type_name}")]
    UnknownDefault {
        /// The record type being built.
        type_name: String,
        /// Unknown name.
        property: String,
    },

    /// An observer or validator is attached to an undeclared name.
    #[error("handler on {type_name} targets unknown property '{property}'")]
    UnknownHandlerTarget {
        /// The record type being built.
        type_name: String,
        /// Unknown name.
        property: String,
    },

    /// Observers and validators may only watch mutable properties.
    #[error("handler on {type_name} targets read-only property '{property}'")]
    ImmutableHandlerTarget {
        /// The record type being built.
        type_name: String,
        /// Read-only property name.
        property: String,
    },

    /// A renamed alias points at nothing or shadows a declared property.
    #[error("renamed property '{old}' -> '{new}' on {type_name} is invalid: {reason}")]
    InvalidRename {
        /// The record type being built.
        type_name: String,
        /// Deprecated name.
        old: String,
        /// Target name.
        new: String,
        /// What is wrong.
        reason: String,
    },

    /// A property kind was configured inconsistently (bad shape, duplicate
    /// choices, min above max, malformed pattern).
    #[error("property '{property}' is misconfigured: {reason}")]
    InvalidKind {
        /// Property being configured.
        property: String,
        /// What is wrong.
        reason: String,
    },

    /// A type with this name is already registered and duplicates are rejected.
    #[error("record type '{type_name}' is already registered")]
    DuplicateType {
        /// Colliding type name.
        type_name: String,
    },

    /// An instance property refers to a type its registry does not hold.
    #[error("record type '{type_name}' is not registered")]
    UnknownType {
        /// Missing type name.
        type_name: String,
    },
}

// ─── Serialization errors ───────────────────────────────────────────

/// Structural failure while rebuilding records from serialized data.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeserializeError {
    /// Record data must be a JSON object.
    #[error("expected a JSON object for {type_name}, found {found}")]
    NotAnObject {
        /// Record type being deserialized.
        type_name: String,
        /// JSON type that was found.
        found: String,
    },

    /// A trusted type tag named no registered type (strict mode).
    #[error("type tag '{class_name}' is not registered")]
    UnknownClass {
        /// The `__class__` value.
        class_name: String,
    },

    /// Keys not recognized by the schema (strict mode).
    #[error("unused keys {keys:?} while deserializing {type_name}")]
    UnusedKeys {
        /// Record type being deserialized.
        type_name: String,
        /// Unconsumed keys.
        keys: Vec<String>,
    },

    /// A property value had the wrong JSON shape.
    #[error("malformed value for '{property}': {reason}")]
    Malformed {
        /// Property being decoded.
        property: String,
        /// What is wrong.
        reason: String,
    },

    /// UID-keyed data did not say which entry is the root.
    #[error("serialized registry has no '__uid__' root entry")]
    MissingRoot,
}

/// Failure in the unique-identifier registry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UidError {
    /// The identifier is already held by another live instance.
    #[error("UID already used: {uid}")]
    AlreadyUsed {
        /// The colliding identifier.
        uid: String,
    },

    /// A referenced identifier exists neither in the data nor in the registry.
    #[error("Invalid UID: {uid}")]
    Invalid {
        /// The dangling identifier.
        uid: String,
    },

    /// The record type does not carry a unique identifier.
    #[error("{type_name} does not carry a unique identifier")]
    NotIdentified {
        /// Record type name.
        type_name: String,
    },
}

/// A property link could not be set up.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinkError {
    /// Source and target name the same property of the same instance.
    #[error("linked items must be unique: '{property}' of {type_name} appears twice")]
    Duplicate {
        /// Record type name.
        type_name: String,
        /// Property linked to itself.
        property: String,
    },

    /// A symmetric link was given fewer than two items.
    #[error("must link at least two items, got {count}")]
    TooFewItems {
        /// Number of items supplied.
        count: usize,
    },

    /// Transforms only make sense in one direction.
    #[error("only directional links may specify a transform")]
    TransformNotAllowed,
}

/// Failure in the singleton registry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SingletonError {
    /// The name is held by an instance of another record type.
    #[error("singleton {name} is {existing}, not {requested}")]
    TypeMismatch {
        /// Identifying name.
        name: String,
        /// Type of the live instance.
        existing: String,
        /// Type that was asked for.
        requested: String,
    },

    /// Serialized data carried neither a singleton id nor a name.
    #[error("singleton data must contain an identifying name")]
    MissingName,
}

// ─── Top-level error ────────────────────────────────────────────────

/// Top-level error type for propkit operations.
#[derive(Error, Debug)]
pub enum PropertyError {
    /// A single property failed its validator.
    #[error(transparent)]
    InvalidValue(FieldError),

    /// A required property has no value.
    #[error(transparent)]
    MissingRequired(FieldError),

    /// Failures collected from construction or a `validate()` call.
    #[error(transparent)]
    Validation(AggregateValidation),

    /// A record type definition was rejected.
    #[error("schema definition error: {0}")]
    SchemaDefinition(#[from] SchemaDefinitionError),

    /// Constructor or bulk update received undeclared names.
    #[error("keyword input {keys:?} is not a known property of {type_name}")]
    UnknownKeyword {
        /// Record type name.
        type_name: String,
        /// Offending keys.
        keys: Vec<String>,
    },

    /// Access to an undeclared property.
    #[error("{type_name} has no property '{property}'")]
    UnknownProperty {
        /// Record type name.
        type_name: String,
        /// Requested name.
        property: String,
    },

    /// Assignment or reset of a read-only property.
    #[error("property '{property}' of {type_name} is read-only")]
    ReadOnly {
        /// Record type name.
        type_name: String,
        /// Read-only property.
        property: String,
    },

    /// A copy-on-write proxy was requested for a property that does not
    /// observe mutations, or whose value is not a container.
    #[error("property '{property}' of {type_name} does not observe mutations")]
    NotObservable {
        /// Record type name.
        type_name: String,
        /// Property name.
        property: String,
    },

    /// Plain serialization met an instance already on the stack.
    #[error("{type_name} instance references itself; serialize through a UID registry to encode cycles")]
    SelfReference {
        /// Record type name.
        type_name: String,
    },

    /// Serialized data could not be decoded.
    #[error("deserialization error: {0}")]
    Deserialization(#[from] DeserializeError),

    /// Unique-identifier registry failure.
    #[error("identity error: {0}")]
    Uid(#[from] UidError),

    /// Property link failure.
    #[error("link error: {0}")]
    Link(#[from] LinkError),

    /// Singleton registry failure.
    #[error("singleton error: {0}")]
    Singleton(#[from] SingletonError),

    /// An error hook translated failures into a domain error.
    #[error("{source}")]
    Hook {
        /// The failures the hook received.
        failures: Vec<FieldError>,
        /// The domain error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl PropertyError {
    /// Build a hook translation that keeps the underlying failures.
    pub fn hook(
        failures: Vec<FieldError>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Hook {
            failures,
            source: source.into(),
        }
    }

    /// Field failures carried by this error, empty for structural errors.
    pub fn failures(&self) -> &[FieldError] {
        match self {
            Self::InvalidValue(f) | Self::MissingRequired(f) => std::slice::from_ref(f),
            Self::Validation(agg) => agg.failures(),
            Self::Hook { failures, .. } => failures,
            _ => &[],
        }
    }

    /// Whether this error is made only of field failures and can be folded
    /// into an aggregate.
    pub fn is_field_failure(&self) -> bool {
        matches!(
            self,
            Self::InvalidValue(_) | Self::MissingRequired(_) | Self::Validation(_) | Self::Hook { .. }
        )
    }

    /// Split field failures from structural errors. Field failures are
    /// returned as `Ok`, everything else is handed back as `Err`.
    pub fn into_failures(self) -> Result<Vec<FieldError>, PropertyError> {
        match self {
            Self::InvalidValue(f) | Self::MissingRequired(f) => Ok(vec![f]),
            Self::Validation(agg) => Ok(agg.into_failures()),
            Self::Hook { failures, .. } => Ok(failures),
            other => Err(other),
        }
    }
}

impl From<FieldError> for PropertyError {
    fn from(failure: FieldError) -> Self {
        match failure.reason {
            Reason::Missing => Self::MissingRequired(failure),
            Reason::Invalid => Self::InvalidValue(failure),
        }
    }
}

impl From<AggregateValidation> for PropertyError {
    fn from(agg: AggregateValidation) -> Self {
        Self::Validation(agg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::InstanceId;

    fn owner() -> Owner {
        Owner::new("SeveralProps", InstanceId::new())
    }

    #[test]
    fn test_missing_message_names_property_and_type() {
        let err = FieldError::missing("a", Some(owner()));
        assert_eq!(err.reason, Reason::Missing);
        assert!(err.is_missing());
        assert!(err.message.contains("'a'"));
        assert!(err.message.contains("SeveralProps"));
        assert_eq!(err.type_name(), Some("SeveralProps"));
    }

    #[test]
    fn test_aggregate_display_lists_every_failure() {
        let agg = AggregateValidation::new(vec![
            FieldError::missing("a", Some(owner())),
            FieldError::invalid("b", Some(owner()), "b is bad"),
        ]);
        assert_eq!(agg.len(), 2);
        let text = agg.to_string();
        assert!(text.starts_with("2 validation failure(s)"));
        assert!(text.contains("[missing]"));
        assert!(text.contains("[invalid] b is bad"));
        assert_eq!(agg.for_property("b").count(), 1);
    }

    #[test]
    fn test_field_error_converts_by_reason() {
        let missing: PropertyError = FieldError::missing("a", None).into();
        assert!(matches!(missing, PropertyError::MissingRequired(_)));
        let invalid: PropertyError = FieldError::invalid("a", None, "nope").into();
        assert!(matches!(invalid, PropertyError::InvalidValue(_)));
        assert_eq!(invalid.failures().len(), 1);
    }

    #[test]
    fn test_hook_keeps_failures() {
        #[derive(Debug, Error)]
        #[error("domain failure")]
        struct Domain;

        let err = PropertyError::hook(vec![FieldError::missing("a", None)], Domain);
        assert_eq!(err.to_string(), "domain failure");
        assert_eq!(err.failures().len(), 1);
        assert!(err.is_field_failure());
        assert_eq!(err.into_failures().map(|f| f.len()).ok(), Some(1));
    }

    #[test]
    fn test_structural_errors_carry_no_failures() {
        let err = PropertyError::SelfReference {
            type_name: "Node".into(),
        };
        assert!(err.failures().is_empty());
        assert!(!err.is_field_failure());
        assert!(err.into_failures().is_err());
    }

    #[test]
    fn test_reason_serializes_lowercase() {
        let json = serde_json::to_string(&Reason::Missing).unwrap();
        assert_eq!(json, "\"missing\"");
    }
}
