//! # Scalar Property Kinds
//!
//! Booleans, numbers, text, enumerated choices, colors, timestamps and
//! UUIDs. Each kind coerces raw input into one canonical [`Value`] variant
//! and rejects everything else with a [`FieldError`] naming the property.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDate, NaiveDateTime};
use propkit_core::{
    float_from_json, float_to_json, named_color, parse_hex, FieldError, PropertyError,
    SchemaDefinitionError, DEFAULT_FLOAT_TOLERANCE, PALETTE_20,
};
use rand::seq::SliceRandom;
use regex::Regex;
use serde_json::Value as Json;
use uuid::Uuid;

use crate::kind::{json_type, FieldContext, PropertyKind};
use crate::property::DefaultValue;
use crate::registry::TypeRegistry;
use crate::serialize::{DeserializeContext, SerializeContext};
use crate::validate::EqualityGuard;
use crate::value::Value;

/// Serialized timestamp layout.
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

const TRUE_WORDS: [&str; 4] = ["TRUE", "YES", "ON", "Y"];
const FALSE_WORDS: [&str; 4] = ["FALSE", "NO", "OFF", "N"];

fn unexpected(ctx: &SerializeContext, expected: &str, value: &Value) -> PropertyError {
    ctx.malformed(format!("expected {expected}, found {}", value.type_name()))
}

fn parse_number(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    raw.parse::<f64>()
        .ok()
        .or_else(|| float_from_json(&Json::String(raw.to_string())))
}

// ─── Boolean ────────────────────────────────────────────────────────

/// `true` or `false`. Assignment only accepts booleans unless `cast` is
/// set; the JSON import path also accepts yes/no words.
#[derive(Debug, Clone, Default)]
pub struct Boolean {
    cast: bool,
}

impl Boolean {
    pub fn new() -> Self {
        Self::default()
    }

    /// Coerce by truthiness instead of rejecting non-booleans.
    pub fn cast(mut self, cast: bool) -> Self {
        self.cast = cast;
        self
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Int(i) => *i != 0,
        Value::Float(x) => *x != 0.0,
        Value::Str(s) => !s.is_empty(),
        Value::List(items) | Value::Tuple(items) => !items.is_empty(),
        Value::Set(set) => !set.is_empty(),
        Value::Map(map) => !map.is_empty(),
        _ => true,
    }
}

impl PropertyKind for Boolean {
    fn label(&self) -> &'static str {
        "Boolean"
    }

    fn info(&self) -> String {
        "a boolean".into()
    }

    fn validate(&self, ctx: &FieldContext<'_>, value: Value) -> Result<Value, FieldError> {
        match value {
            Value::Bool(_) => Ok(value),
            other if self.cast => Ok(Value::Bool(truthy(&other))),
            other => Err(ctx.invalid(self, &other, "")),
        }
    }

    fn to_json(&self, value: &Value, ctx: &mut SerializeContext) -> Result<Json, PropertyError> {
        value
            .as_bool()
            .map(Json::Bool)
            .ok_or_else(|| unexpected(ctx, "a boolean", value))
    }

    fn from_json(&self, json: &Json, ctx: &mut DeserializeContext<'_>) -> Result<Value, PropertyError> {
        match json {
            Json::Bool(b) => Ok(Value::Bool(*b)),
            Json::String(s) => {
                let word = s.trim().to_ascii_uppercase();
                if TRUE_WORDS.contains(&word.as_str()) {
                    Ok(Value::Bool(true))
                } else if FALSE_WORDS.contains(&word.as_str()) {
                    Ok(Value::Bool(false))
                } else {
                    Err(ctx.malformed(format!("'{s}' is not a boolean word")))
                }
            }
            other => Value::from_json(other)
                .ok_or_else(|| ctx.malformed(format!("expected a boolean, found {}", json_type(other)))),
        }
    }
}

// ─── Integer ────────────────────────────────────────────────────────

/// Whole numbers with optional inclusive bounds. Floats within the
/// tolerance of an integer are accepted.
#[derive(Debug, Clone, Default)]
pub struct Integer {
    min: Option<i64>,
    max: Option<i64>,
    cast: bool,
    tolerance: Option<f64>,
}

impl Integer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min(mut self, min: i64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: i64) -> Self {
        self.max = Some(max);
        self
    }

    /// Truncate floats, booleans and numeric strings instead of rejecting.
    pub fn cast(mut self, cast: bool) -> Self {
        self.cast = cast;
        self
    }

    /// Override the registry tolerance for near-integer floats.
    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    fn epsilon(&self) -> f64 {
        self.tolerance.unwrap_or(DEFAULT_FLOAT_TOLERANCE)
    }
}

impl PropertyKind for Integer {
    fn label(&self) -> &'static str {
        "Integer"
    }

    fn info(&self) -> String {
        match (self.min, self.max) {
            (None, None) => "an integer".into(),
            (Some(lo), Some(hi)) => format!("an integer in range [{lo}, {hi}]"),
            (Some(lo), None) => format!("an integer greater than or equal to {lo}"),
            (None, Some(hi)) => format!("an integer less than or equal to {hi}"),
        }
    }

    fn validate(&self, ctx: &FieldContext<'_>, value: Value) -> Result<Value, FieldError> {
        let n = match &value {
            Value::Int(i) => Some(*i),
            Value::Float(x) if x.is_finite() => {
                if self.cast {
                    whole_to_i64(x.trunc())
                } else if (x - x.round()).abs() <= self.epsilon() {
                    whole_to_i64(x.round())
                } else {
                    None
                }
            }
            Value::Bool(b) if self.cast => Some(i64::from(*b)),
            Value::Str(s) if self.cast => parse_number(s)
                .filter(|x| x.is_finite())
                .and_then(|x| whole_to_i64(x.trunc())),
            _ => None,
        };
        let n = n.ok_or_else(|| ctx.invalid(self, &value, ""))?;
        if self.min.is_some_and(|lo| n < lo) || self.max.is_some_and(|hi| n > hi) {
            return Err(ctx.invalid(self, &value, "Not within allowed range."));
        }
        Ok(Value::Int(n))
    }

    fn to_json(&self, value: &Value, ctx: &mut SerializeContext) -> Result<Json, PropertyError> {
        value
            .as_i64()
            .map(Json::from)
            .ok_or_else(|| unexpected(ctx, "an integer", value))
    }

    fn from_json(&self, json: &Json, ctx: &mut DeserializeContext<'_>) -> Result<Value, PropertyError> {
        match json {
            Json::Number(n) => match n.as_i64() {
                Some(i) => Ok(Value::Int(i)),
                None => n
                    .as_f64()
                    .map(Value::Float)
                    .ok_or_else(|| ctx.malformed("integer out of range")),
            },
            Json::String(s) => match s.trim().parse::<i64>() {
                Ok(i) => Ok(Value::Int(i)),
                Err(_) => parse_number(s)
                    .map(Value::Float)
                    .ok_or_else(|| ctx.malformed(format!("'{s}' is not a number"))),
            },
            other => Err(ctx.malformed(format!("expected an integer, found {}", json_type(other)))),
        }
    }

    fn bind(&mut self, property: &str, registry: &TypeRegistry) -> Result<(), SchemaDefinitionError> {
        if let (Some(lo), Some(hi)) = (self.min, self.max) {
            if lo > hi {
                return Err(SchemaDefinitionError::InvalidKind {
                    property: property.to_string(),
                    reason: format!("min {lo} is greater than max {hi}"),
                });
            }
        }
        self.tolerance.get_or_insert(registry.config().float_tolerance);
        Ok(())
    }
}

/// `x` as an `i64`, or `None` outside the representable range. `x` must
/// already be whole.
fn whole_to_i64(x: f64) -> Option<i64> {
    // i64::MAX is not representable; its f64 neighbour is 2^63.
    (x >= i64::MIN as f64 && x < i64::MAX as f64).then_some(x as i64)
}

// ─── Float ──────────────────────────────────────────────────────────

/// Floating point numbers with optional inclusive bounds. Integers are
/// widened. NaN and infinities serialize as strings.
#[derive(Debug, Clone, Default)]
pub struct Float {
    min: Option<f64>,
    max: Option<f64>,
    cast: bool,
    tolerance: Option<f64>,
}

impl Float {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    /// Accept booleans and numeric strings.
    pub fn cast(mut self, cast: bool) -> Self {
        self.cast = cast;
        self
    }

    /// Override the registry tolerance used by equality.
    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = Some(tolerance);
        self
    }
}

impl PropertyKind for Float {
    fn label(&self) -> &'static str {
        "Float"
    }

    fn info(&self) -> String {
        match (self.min, self.max) {
            (None, None) => "a float".into(),
            (Some(lo), Some(hi)) => format!("a float in range [{lo}, {hi}]"),
            (Some(lo), None) => format!("a float greater than or equal to {lo}"),
            (None, Some(hi)) => format!("a float less than or equal to {hi}"),
        }
    }

    fn validate(&self, ctx: &FieldContext<'_>, value: Value) -> Result<Value, FieldError> {
        let x = match &value {
            Value::Float(x) => Some(*x),
            Value::Int(i) => Some(*i as f64),
            Value::Bool(b) if self.cast => Some(if *b { 1.0 } else { 0.0 }),
            Value::Str(s) if self.cast => parse_number(s),
            _ => None,
        };
        let x = x.ok_or_else(|| ctx.invalid(self, &value, ""))?;
        if self.min.is_some_and(|lo| x < lo) || self.max.is_some_and(|hi| x > hi) {
            return Err(ctx.invalid(self, &value, "Not within allowed range."));
        }
        Ok(Value::Float(x))
    }

    fn equal(&self, a: &Value, b: &Value, _guard: &mut EqualityGuard) -> bool {
        match (a, b) {
            (Value::Float(x), Value::Float(y)) => {
                (x.is_nan() && y.is_nan())
                    || x == y
                    || (x - y).abs() <= self.tolerance.unwrap_or(DEFAULT_FLOAT_TOLERANCE)
            }
            _ => a == b,
        }
    }

    fn to_json(&self, value: &Value, ctx: &mut SerializeContext) -> Result<Json, PropertyError> {
        value
            .as_f64()
            .map(float_to_json)
            .ok_or_else(|| unexpected(ctx, "a float", value))
    }

    fn from_json(&self, json: &Json, ctx: &mut DeserializeContext<'_>) -> Result<Value, PropertyError> {
        let parsed = match json {
            Json::String(s) => parse_number(s),
            other => float_from_json(other),
        };
        parsed
            .map(Value::Float)
            .ok_or_else(|| ctx.malformed(format!("expected a float, found {}", json_type(json))))
    }

    fn bind(&mut self, property: &str, registry: &TypeRegistry) -> Result<(), SchemaDefinitionError> {
        if let (Some(lo), Some(hi)) = (self.min, self.max) {
            if lo > hi {
                return Err(SchemaDefinitionError::InvalidKind {
                    property: property.to_string(),
                    reason: format!("min {lo} is greater than max {hi}"),
                });
            }
        }
        self.tolerance.get_or_insert(registry.config().float_tolerance);
        Ok(())
    }
}

// ─── Text ───────────────────────────────────────────────────────────

/// Forced case for text values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Case {
    Upper,
    Lower,
}

#[derive(Debug, Clone)]
enum Strip {
    Whitespace,
    Chars(String),
}

/// Text with optional stripping, case folding and a pattern. Stripping is
/// applied first, then case, then the pattern is searched.
#[derive(Debug, Clone, Default)]
pub struct Text {
    strip: Option<Strip>,
    change_case: Option<Case>,
    pattern: Option<String>,
    regex: Option<Regex>,
}

impl Text {
    pub fn new() -> Self {
        Self::default()
    }

    /// Strip surrounding whitespace.
    pub fn trim(mut self) -> Self {
        self.strip = Some(Strip::Whitespace);
        self
    }

    /// Strip any of `chars` from both ends.
    pub fn strip(mut self, chars: impl Into<String>) -> Self {
        self.strip = Some(Strip::Chars(chars.into()));
        self
    }

    pub fn change_case(mut self, case: Case) -> Self {
        self.change_case = Some(case);
        self
    }

    /// Require a match of `pattern` somewhere in the value.
    pub fn regex(mut self, pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        self.regex = Regex::new(&pattern).ok();
        self.pattern = Some(pattern);
        self
    }
}

impl PropertyKind for Text {
    fn label(&self) -> &'static str {
        "String"
    }

    fn info(&self) -> String {
        match &self.pattern {
            Some(pattern) => format!("a string matching the pattern '{pattern}'"),
            None => "a string".into(),
        }
    }

    fn validate(&self, ctx: &FieldContext<'_>, value: Value) -> Result<Value, FieldError> {
        let Value::Str(raw) = &value else {
            return Err(ctx.invalid(self, &value, ""));
        };
        let stripped = match &self.strip {
            Some(Strip::Whitespace) => raw.trim(),
            Some(Strip::Chars(chars)) => raw.trim_matches(|c| chars.contains(c)),
            None => raw.as_str(),
        };
        let text = match self.change_case {
            Some(Case::Upper) => stripped.to_uppercase(),
            Some(Case::Lower) => stripped.to_lowercase(),
            None => stripped.to_string(),
        };
        if let Some(pattern) = &self.pattern {
            if !self.regex.as_ref().is_some_and(|re| re.is_match(&text)) {
                return Err(ctx.invalid(
                    self,
                    &value,
                    &format!("The value does not match the pattern '{pattern}'."),
                ));
            }
        }
        Ok(Value::Str(text))
    }

    fn to_json(&self, value: &Value, ctx: &mut SerializeContext) -> Result<Json, PropertyError> {
        value
            .as_str()
            .map(|s| Json::String(s.to_string()))
            .ok_or_else(|| unexpected(ctx, "a string", value))
    }

    fn from_json(&self, json: &Json, ctx: &mut DeserializeContext<'_>) -> Result<Value, PropertyError> {
        json.as_str()
            .map(|s| Value::Str(s.to_string()))
            .ok_or_else(|| ctx.malformed(format!("expected a string, found {}", json_type(json))))
    }

    fn bind(&mut self, property: &str, _registry: &TypeRegistry) -> Result<(), SchemaDefinitionError> {
        if let Some(pattern) = &self.pattern {
            if let Err(e) = Regex::new(pattern) {
                return Err(SchemaDefinitionError::InvalidKind {
                    property: property.to_string(),
                    reason: format!("invalid pattern: {e}"),
                });
            }
        }
        Ok(())
    }
}

// ─── StringChoice ───────────────────────────────────────────────────

/// One of a fixed set of canonical strings. Each choice may carry
/// aliases; any alias validates to its canonical key.
#[derive(Debug, Clone)]
pub struct StringChoice {
    choices: Vec<(String, Vec<String>)>,
    case_sensitive: bool,
    descriptions: Option<BTreeMap<String, String>>,
}

impl StringChoice {
    /// Choices without aliases.
    pub fn new<I, S>(choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            choices: choices.into_iter().map(|c| (c.into(), Vec::new())).collect(),
            case_sensitive: false,
            descriptions: None,
        }
    }

    /// Canonical keys with their aliases.
    pub fn with_aliases<I, K, A, S>(choices: I) -> Self
    where
        I: IntoIterator<Item = (K, A)>,
        K: Into<String>,
        A: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            choices: choices
                .into_iter()
                .map(|(k, aliases)| (k.into(), aliases.into_iter().map(Into::into).collect()))
                .collect(),
            case_sensitive: false,
            descriptions: None,
        }
    }

    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// One description per canonical key; checked when the schema is built.
    pub fn descriptions<I, K, V>(mut self, descriptions: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.descriptions = Some(
            descriptions
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Canonical keys in declaration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.choices.iter().map(|(k, _)| k.as_str())
    }

    pub fn description(&self, key: &str) -> Option<&str> {
        self.descriptions.as_ref()?.get(key).map(String::as_str)
    }

    fn matches(&self, a: &str, b: &str) -> bool {
        if self.case_sensitive {
            a == b
        } else {
            a.to_lowercase() == b.to_lowercase()
        }
    }

    fn fold(&self, s: &str) -> String {
        if self.case_sensitive {
            s.to_string()
        } else {
            s.to_lowercase()
        }
    }
}

impl PropertyKind for StringChoice {
    fn label(&self) -> &'static str {
        "StringChoice"
    }

    fn info(&self) -> String {
        let quoted: Vec<String> = self.keys().map(|k| format!("'{k}'")).collect();
        match quoted.as_slice() {
            [] => "nothing".into(),
            [only] => only.clone(),
            [a, b] => format!("either {a} or {b}"),
            many => format!("any of {}", many.join(", ")),
        }
    }

    fn validate(&self, ctx: &FieldContext<'_>, value: Value) -> Result<Value, FieldError> {
        let Value::Str(raw) = &value else {
            return Err(ctx.invalid(self, &value, ""));
        };
        self.choices
            .iter()
            .find(|(key, aliases)| {
                self.matches(key, raw) || aliases.iter().any(|alias| self.matches(alias, raw))
            })
            .map(|(key, _)| Value::Str(key.clone()))
            .ok_or_else(|| ctx.invalid(self, &value, ""))
    }

    fn to_json(&self, value: &Value, ctx: &mut SerializeContext) -> Result<Json, PropertyError> {
        value
            .as_str()
            .map(|s| Json::String(s.to_string()))
            .ok_or_else(|| unexpected(ctx, "a string", value))
    }

    fn from_json(&self, json: &Json, ctx: &mut DeserializeContext<'_>) -> Result<Value, PropertyError> {
        json.as_str()
            .map(|s| Value::Str(s.to_string()))
            .ok_or_else(|| ctx.malformed(format!("expected a string, found {}", json_type(json))))
    }

    fn bind(&mut self, property: &str, _registry: &TypeRegistry) -> Result<(), SchemaDefinitionError> {
        let misconfigured = |reason: String| SchemaDefinitionError::InvalidKind {
            property: property.to_string(),
            reason,
        };
        if self.choices.is_empty() {
            return Err(misconfigured("no choices given".into()));
        }
        let mut seen = BTreeSet::new();
        for (key, aliases) in &self.choices {
            for name in std::iter::once(key).chain(aliases) {
                if !seen.insert(self.fold(name)) {
                    return Err(misconfigured(format!("'{name}' is listed more than once")));
                }
            }
        }
        if let Some(descriptions) = &self.descriptions {
            let described: BTreeSet<&str> = descriptions.keys().map(String::as_str).collect();
            let declared: BTreeSet<&str> = self.keys().collect();
            if described != declared {
                return Err(misconfigured(
                    "descriptions must cover exactly the declared choices".into(),
                ));
            }
        }
        Ok(())
    }
}

// ─── Color ──────────────────────────────────────────────────────────

/// RGB color, normalized to a tuple of three integers in 0..=255.
/// Accepts known names, `"random"`, 3- or 6-digit hex, or a triple.
#[derive(Debug, Clone, Default)]
pub struct Color;

impl Color {
    pub fn new() -> Self {
        Self
    }

    fn rgb(channels: [u8; 3]) -> Value {
        Value::Tuple(channels.iter().map(|c| Value::Int(i64::from(*c))).collect())
    }
}

impl PropertyKind for Color {
    fn label(&self) -> &'static str {
        "Color"
    }

    fn info(&self) -> String {
        "a color".into()
    }

    fn validate(&self, ctx: &FieldContext<'_>, value: Value) -> Result<Value, FieldError> {
        match &value {
            Value::Str(raw) => {
                let raw = raw.trim();
                if raw.eq_ignore_ascii_case("random") {
                    let hex = PALETTE_20
                        .choose(&mut rand::thread_rng())
                        .copied()
                        .unwrap_or(PALETTE_20[0]);
                    return parse_hex(hex)
                        .map(Self::rgb)
                        .map_err(|e| ctx.invalid(self, &value, &e.to_string()));
                }
                if let Some(channels) = named_color(raw) {
                    return Ok(Self::rgb(channels));
                }
                parse_hex(raw)
                    .map(Self::rgb)
                    .map_err(|e| ctx.invalid(self, &value, &e.to_string()))
            }
            Value::List(items) | Value::Tuple(items) => {
                if items.len() != 3 {
                    return Err(ctx.invalid(self, &value, "Color must be length 3"));
                }
                let mut channels = Vec::with_capacity(3);
                for item in items {
                    match item.as_i64() {
                        Some(c) if (0..=255).contains(&c) => channels.push(Value::Int(c)),
                        _ => return Err(ctx.invalid(self, &value, "Color values must be ints 0-255.")),
                    }
                }
                Ok(Value::Tuple(channels))
            }
            _ => Err(ctx.invalid(self, &value, "Color must be a list or tuple of length 3")),
        }
    }

    fn to_json(&self, value: &Value, ctx: &mut SerializeContext) -> Result<Json, PropertyError> {
        let channels = value
            .as_slice()
            .ok_or_else(|| unexpected(ctx, "an RGB tuple", value))?;
        channels
            .iter()
            .map(|c| c.as_i64().map(Json::from))
            .collect::<Option<Vec<_>>>()
            .map(Json::Array)
            .ok_or_else(|| unexpected(ctx, "an RGB tuple", value))
    }

    fn from_json(&self, json: &Json, ctx: &mut DeserializeContext<'_>) -> Result<Value, PropertyError> {
        match json {
            Json::Array(items) => Ok(Value::Tuple(items.iter().filter_map(Value::from_json).collect())),
            Json::String(s) => Ok(Value::Str(s.clone())),
            other => Err(ctx.malformed(format!("expected a color, found {}", json_type(other)))),
        }
    }
}

// ─── DateTime ───────────────────────────────────────────────────────

/// Naive UTC timestamps. Strings may be `YYYY/MM/DD`, `YYYY-MM-DD` or
/// `YYYY-MM-DDTHH:MM:SSZ`.
#[derive(Debug, Clone, Default)]
pub struct DateTime;

impl DateTime {
    pub fn new() -> Self {
        Self
    }

    /// Parse one of the accepted textual forms.
    pub fn parse(raw: &str) -> Option<NaiveDateTime> {
        let raw = raw.trim();
        if raw.len() == 10 {
            NaiveDate::parse_from_str(&raw.replace('/', "-"), "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        } else {
            NaiveDateTime::parse_from_str(raw, DATETIME_FORMAT).ok()
        }
    }
}

impl PropertyKind for DateTime {
    fn label(&self) -> &'static str {
        "DateTime"
    }

    fn info(&self) -> String {
        "a datetime object or a string in the form YYYY/MM/DD or YYYY-MM-DDTHH:MM:SSZ".into()
    }

    fn validate(&self, ctx: &FieldContext<'_>, value: Value) -> Result<Value, FieldError> {
        match &value {
            Value::DateTime(_) => Ok(value),
            Value::Str(raw) => Self::parse(raw)
                .map(Value::DateTime)
                .ok_or_else(|| ctx.invalid(self, &value, "")),
            _ => Err(ctx.invalid(self, &value, "")),
        }
    }

    fn to_json(&self, value: &Value, ctx: &mut SerializeContext) -> Result<Json, PropertyError> {
        match value {
            Value::DateTime(dt) => Ok(Json::String(dt.format(DATETIME_FORMAT).to_string())),
            other => Err(unexpected(ctx, "a datetime", other)),
        }
    }

    fn from_json(&self, json: &Json, ctx: &mut DeserializeContext<'_>) -> Result<Value, PropertyError> {
        let raw = json
            .as_str()
            .ok_or_else(|| ctx.malformed(format!("expected a string, found {}", json_type(json))))?;
        Self::parse(raw)
            .map(Value::DateTime)
            .ok_or_else(|| ctx.malformed(format!("'{raw}' is not a recognized date")))
    }
}

// ─── UniqueId ───────────────────────────────────────────────────────

/// A UUID defaulting to a fresh v4 value. Usually declared read-only so
/// it is fixed at construction.
#[derive(Debug, Clone, Default)]
pub struct UniqueId;

impl UniqueId {
    pub fn new() -> Self {
        Self
    }
}

impl PropertyKind for UniqueId {
    fn label(&self) -> &'static str {
        "Uuid"
    }

    fn info(&self) -> String {
        "a unique ID auto-generated with uuid4".into()
    }

    fn validate(&self, ctx: &FieldContext<'_>, value: Value) -> Result<Value, FieldError> {
        match &value {
            Value::Uuid(_) => Ok(value),
            Value::Str(raw) => Uuid::parse_str(raw.trim())
                .map(Value::Uuid)
                .map_err(|e| ctx.invalid(self, &value, &e.to_string())),
            _ => Err(ctx.invalid(self, &value, "")),
        }
    }

    fn to_json(&self, value: &Value, ctx: &mut SerializeContext) -> Result<Json, PropertyError> {
        match value {
            Value::Uuid(u) => Ok(Json::String(u.hyphenated().to_string())),
            other => Err(unexpected(ctx, "a uuid", other)),
        }
    }

    fn from_json(&self, json: &Json, ctx: &mut DeserializeContext<'_>) -> Result<Value, PropertyError> {
        let raw = json
            .as_str()
            .ok_or_else(|| ctx.malformed(format!("expected a string, found {}", json_type(json))))?;
        Uuid::parse_str(raw)
            .map(Value::Uuid)
            .map_err(|e| ctx.malformed(e.to_string()))
    }

    fn class_default(&self) -> Option<DefaultValue> {
        Some(DefaultValue::generator(|| Value::Uuid(Uuid::new_v4())))
    }
}
