//! # propkit-core
//!
//! Shared vocabulary for the propkit schema engine. Nothing here knows
//! what a record type is; `propkit-schema` builds on these pieces.
//!
//! ## What lives here
//!
//! - [`error`]: every failure the engine reports. A rejected value is a
//!   [`FieldError`] whose [`Reason`] says why; `validate()` gathers all of
//!   them into one [`AggregateValidation`]. Mistakes in a schema itself are
//!   [`SchemaDefinitionError`]s and surface from building, not from use.
//! - [`identity`]: [`InstanceId`] and [`Owner`]. Errors point at the record
//!   they came from through these ids, so an error can be sent to another
//!   thread while the record stays behind.
//! - [`config`]: [`EngineConfig`], read from `PROPKIT_*` environment
//!   variables with typed defaults.
//! - [`color`]: named colors, the 20-entry palette and hex parsing.
//! - [`array`]: [`NdArray`], the dense numeric storage behind array and
//!   vector properties, with its shape rules and JSON form.
//!
//! The crate has no internal dependencies and no `unsafe`.

pub mod array;
pub mod color;
pub mod config;
pub mod error;
pub mod identity;

// Re-export primary types for ergonomic imports.
pub use array::{float_from_json, float_to_json, ArrayError, DType, Dim, NdArray};
pub use color::{named_color, parse_hex, ColorParseError, NAMED_COLORS, PALETTE_20};
pub use config::{ConfigError, DuplicatePolicy, EngineConfig, DEFAULT_FLOAT_TOLERANCE};
pub use error::{
    AggregateValidation, DeserializeError, FieldError, LinkError, PropertyError, Reason,
    SchemaDefinitionError, SingletonError, UidError,
};
pub use identity::{InstanceId, Owner};
