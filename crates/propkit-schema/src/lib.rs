//! # propkit-schema — Declarative Record Schemas
//!
//! Record types are assembled once by a [`SchemaBuilder`] from typed
//! [`Property`] descriptors and then instantiated as [`Record`]s whose
//! fields are validated on every write, observed by listeners, checked as
//! a whole by [`Record::validate`] and encoded to JSON.
//!
//! ```text
//! SchemaBuilder ──build──▶ RecordType ──registered in──▶ TypeRegistry
//!                              │
//!                       Record::with(..)
//!                              │
//!          set ─▶ validate ─▶ Validate listeners ─▶ store
//!                                  ─▶ ObserveChange ─▶ ObserveSet
//! ```
//!
//! ## Property Kinds
//!
//! - [`basic`] — booleans, integers, floats, strings, choices, colors,
//!   datetimes and uuids.
//! - [`math`] — shaped numeric arrays and 2D/3D vectors.
//! - [`container`] — lists, sets, tuples and dictionaries.
//! - [`instance`] and [`union`] — nested records and ordered alternatives.
//! - [`uid::Pointer`] — references to identified records.
//! - [`web::Url`] — absolute URL strings.
//!
//! Every kind implements [`PropertyKind`]; file or image fields living
//! outside this crate implement the same trait.
//!
//! ## Serialization
//!
//! [`Record::serialize`] writes nested records inline and refuses cycles.
//! Record types built through a [`UidRegistry`] carry a uid, and
//! [`serialize_graph`] writes any graph of them, cycles included, as a flat
//! table keyed by uid.
//!
//! ## Links and Singletons
//!
//! [`DirectionalLink`] copies one property into another whenever it is
//! set, and [`link()`] keeps several properties in sync. A [`Singletons`]
//! registry hands out one record per identifying name and reuses live
//! instances when decoding.
//!
//! ## Runtime model
//!
//! Records live on one thread (`Rc`/`RefCell`). Errors leave that thread
//! freely because they name records by [`propkit_core::Owner`] only. Type,
//! uid and singleton registries are values handed to building and
//! decoding; nothing is global.

pub mod basic;
pub mod builder;
pub mod container;
pub mod handlers;
pub mod instance;
pub mod kind;
pub mod link;
pub mod math;
pub mod observed;
pub mod property;
pub mod record;
pub mod registry;
pub mod schema;
pub mod serialize;
pub mod singleton;
pub mod uid;
pub mod union;
pub mod validate;
pub mod value;
pub mod web;

// Re-export primary types for ergonomic imports.
pub use basic::{Boolean, Case, Color, DateTime, Float, Integer, StringChoice, Text, UniqueId};
pub use builder::SchemaBuilder;
pub use container::{Collection, Dictionary, Flavor};
pub use handlers::{Change, Listener, ListenerMode, Names, Notify};
pub use instance::Instance;
pub use kind::{FieldContext, PropertyKind};
pub use link::{link, DirectionalLink, Link, LinkOptions, Transform};
pub use math::{Array, Vector};
pub use observed::{ObservableContainer, Observed};
pub use property::{Access, Classification, DefaultValue, Property};
pub use record::Record;
pub use registry::{Registration, TypeRegistry, WeakTypeRegistry};
pub use schema::{PropertyDoc, RecordType};
pub use serialize::{
    deserialize, DeserializeContext, DeserializeOptions, DeserializeWarning, Deserialized, SerializeContext,
    SerializeOptions, CLASS_KEY,
};
pub use singleton::{Singletons, NAME_PROPERTY, SINGLETON_KEY};
pub use uid::{serialize_graph, Pointer, UidRegistry, ROOT_KEY, UID_PROPERTY};
pub use union::Union;
pub use validate::{EqualityGuard, VisitSet};
pub use value::{Value, ValueMap, ValueSet};
pub use web::Url;

pub use propkit_core::{
    AggregateValidation, EngineConfig, FieldError, InstanceId, LinkError, Owner, PropertyError, Reason,
    SchemaDefinitionError, SingletonError,
};
