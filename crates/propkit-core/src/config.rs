//! Engine configuration.
//!
//! Controls the behavior of a type registry and the record types built
//! against it. Defaults match the historical behavior of the engine.
//! Override via environment variables or explicit construction in tests.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Epsilon used for integer coercion and float equality.
pub const DEFAULT_FLOAT_TOLERANCE: f64 = 1e-9;

/// What a type registry does when a name is registered twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// The later registration shadows the earlier one and a warning is logged.
    #[default]
    Replace,
    /// The later registration fails.
    Reject,
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replace" => Ok(Self::Replace),
            "reject" => Ok(Self::Reject),
            other => Err(format!("expected 'replace' or 'reject', got '{other}'")),
        }
    }
}

/// Configuration shared by a type registry and its record types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Behavior on duplicate type-name registration.
    pub duplicate_types: DuplicatePolicy,
    /// Tolerance for integer coercion and float comparison.
    pub float_tolerance: f64,
    /// Log a warning for keys a deserialized object did not consume.
    pub warn_unused_keys: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            duplicate_types: DuplicatePolicy::Replace,
            float_tolerance: DEFAULT_FLOAT_TOLERANCE,
            warn_unused_keys: true,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `PROPKIT_DUPLICATE_TYPES` (`replace` or `reject`, default: `replace`)
    /// - `PROPKIT_FLOAT_TOLERANCE` (positive float, default: `1e-9`)
    /// - `PROPKIT_WARN_UNUSED_KEYS` (boolean, default: `true`)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("PROPKIT_DUPLICATE_TYPES") {
            config.duplicate_types =
                raw.parse()
                    .map_err(|reason| ConfigError::Invalid {
                        variable: "PROPKIT_DUPLICATE_TYPES",
                        value: raw.clone(),
                        reason,
                    })?;
        }

        if let Some(raw) = lookup("PROPKIT_FLOAT_TOLERANCE") {
            let tolerance: f64 = raw.trim().parse().map_err(|e| ConfigError::Invalid {
                variable: "PROPKIT_FLOAT_TOLERANCE",
                value: raw.clone(),
                reason: format!("{e}"),
            })?;
            if !tolerance.is_finite() || tolerance < 0.0 {
                return Err(ConfigError::Invalid {
                    variable: "PROPKIT_FLOAT_TOLERANCE",
                    value: raw,
                    reason: "tolerance must be a finite, non-negative number".into(),
                });
            }
            config.float_tolerance = tolerance;
        }

        if let Some(raw) = lookup("PROPKIT_WARN_UNUSED_KEYS") {
            config.warn_unused_keys = parse_flag(&raw).ok_or_else(|| ConfigError::Invalid {
                variable: "PROPKIT_WARN_UNUSED_KEYS",
                value: raw.clone(),
                reason: "expected a boolean".into(),
            })?;
        }

        Ok(config)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// An environment variable held an unusable value.
    #[error("invalid value '{value}' for {variable}: {reason}")]
    Invalid {
        /// Variable name.
        variable: &'static str,
        /// Raw value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.duplicate_types, DuplicatePolicy::Replace);
        assert!(config.warn_unused_keys);
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("PROPKIT_DUPLICATE_TYPES", "Reject"),
            ("PROPKIT_FLOAT_TOLERANCE", "0.001"),
            ("PROPKIT_WARN_UNUSED_KEYS", "off"),
        ]))
        .unwrap();
        assert_eq!(config.duplicate_types, DuplicatePolicy::Reject);
        assert!((config.float_tolerance - 0.001).abs() < f64::EPSILON);
        assert!(!config.warn_unused_keys);
    }

    #[test]
    fn test_malformed_values_are_rejected() {
        let err = EngineConfig::from_lookup(lookup(&[("PROPKIT_DUPLICATE_TYPES", "merge")]))
            .unwrap_err();
        assert!(err.to_string().contains("PROPKIT_DUPLICATE_TYPES"));

        assert!(EngineConfig::from_lookup(lookup(&[("PROPKIT_FLOAT_TOLERANCE", "-1")])).is_err());
        assert!(EngineConfig::from_lookup(lookup(&[("PROPKIT_FLOAT_TOLERANCE", "abc")])).is_err());
        assert!(EngineConfig::from_lookup(lookup(&[("PROPKIT_WARN_UNUSED_KEYS", "maybe")])).is_err());
    }
}
