//! Runtime configuration
//!
//! Every section has sensible defaults, so an empty JSON object is a valid
//! configuration:
//!
//! ```
//! use bindery_core::config::{BinderyConfig, ParseFailure};
//!
//! let config = BinderyConfig::from_json_str(r#"{
//!     "events": { "reaper_interval_ms": 5000 },
//!     "expressions": { "parse_failure": "default_to_zero" }
//! }"#).unwrap();
//!
//! assert_eq!(config.expressions.parse_failure, ParseFailure::DefaultToZero);
//! assert!(config.validator.offload);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// What to do with a numeric or boolean literal that does not parse
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseFailure {
    /// Report a configuration error
    #[default]
    Reject,
    /// Silently use the type's zero value
    DefaultToZero,
}

/// Options for the filter expression builder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpressionOptions {
    pub parse_failure: ParseFailure,
}

impl ExpressionOptions {
    /// Options matching the legacy behaviour (unparseable numbers become zero)
    pub fn lenient() -> Self {
        Self {
            parse_failure: ParseFailure::DefaultToZero,
        }
    }
}

/// Weak event registry settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventManagerConfig {
    /// Period of the background cleanup sweep; `None` disables the reaper
    pub reaper_interval_ms: Option<u64>,
}

impl EventManagerConfig {
    pub fn reaper_interval(&self) -> Option<Duration> {
        self.reaper_interval_ms.map(Duration::from_millis)
    }
}

/// Validator settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Upper bound for one evaluation pass
    pub evaluation_timeout_ms: Option<u64>,
    /// Evaluate predicates on the blocking pool instead of the calling task
    pub offload: bool,
    /// Options used by rule builders that take filter descriptors or literals
    pub expressions: ExpressionOptions,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            evaluation_timeout_ms: None,
            offload: true,
            expressions: ExpressionOptions::default(),
        }
    }
}

impl ValidatorConfig {
    pub fn evaluation_timeout(&self) -> Option<Duration> {
        self.evaluation_timeout_ms.map(Duration::from_millis)
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinderyConfig {
    pub events: EventManagerConfig,
    pub validator: ValidatorConfig,
    pub expressions: ExpressionOptions,
}

impl BinderyConfig {
    /// Parse a configuration from JSON
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize the configuration to pretty JSON
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
