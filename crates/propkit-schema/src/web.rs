//! # Web Kinds
//!
//! [`Url`] is a text property that only accepts absolute URLs with a
//! scheme and a host. Text rules (stripping, case) apply before parsing;
//! the stored value is the normalized URL, optionally without its query
//! or fragment.

use propkit_core::{FieldError, PropertyError, SchemaDefinitionError};
use serde_json::Value as Json;

use crate::basic::Text;
use crate::kind::{FieldContext, PropertyKind};
use crate::registry::TypeRegistry;
use crate::serialize::{DeserializeContext, SerializeContext};
use crate::value::Value;

/// Absolute URL string.
#[derive(Debug, Clone, Default)]
pub struct Url {
    text: Text,
    remove_parameters: bool,
    remove_fragment: bool,
}

impl Url {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text rules applied before the URL is parsed.
    pub fn text(mut self, text: Text) -> Self {
        self.text = text;
        self
    }

    /// Drop the query string.
    pub fn remove_parameters(mut self, remove: bool) -> Self {
        self.remove_parameters = remove;
        self
    }

    /// Drop the `#fragment`.
    pub fn remove_fragment(mut self, remove: bool) -> Self {
        self.remove_fragment = remove;
        self
    }
}

impl PropertyKind for Url {
    fn label(&self) -> &'static str {
        "URL"
    }

    fn info(&self) -> String {
        let mut info = String::from("a URL string");
        if self.remove_parameters {
            info.push_str(", path or query params removed");
        }
        if self.remove_fragment {
            info.push_str(", fragment removed");
        }
        info
    }

    fn validate(&self, ctx: &FieldContext<'_>, value: Value) -> Result<Value, FieldError> {
        let text = self.text.validate(ctx, value.clone())?;
        let raw = text.as_str().unwrap_or_default();
        let mut parsed = match url::Url::parse(raw) {
            Ok(parsed) if parsed.host_str().is_some_and(|h| !h.is_empty()) => parsed,
            _ => return Err(ctx.invalid(self, &value, "URL needs scheme and netloc.")),
        };
        if self.remove_parameters {
            parsed.set_query(None);
        }
        if self.remove_fragment {
            parsed.set_fragment(None);
        }
        Ok(Value::Str(parsed.into()))
    }

    fn to_json(&self, value: &Value, ctx: &mut SerializeContext) -> Result<Json, PropertyError> {
        self.text.to_json(value, ctx)
    }

    fn from_json(&self, json: &Json, ctx: &mut DeserializeContext<'_>) -> Result<Value, PropertyError> {
        self.text.from_json(json, ctx)
    }

    fn bind(&mut self, property: &str, registry: &TypeRegistry) -> Result<(), SchemaDefinitionError> {
        self.text.bind(property, registry)
    }
}
