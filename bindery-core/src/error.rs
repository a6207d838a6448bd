//! Error types for bindery
//!
//! Only configuration problems are errors. A rule that evaluates to false is
//! recorded as data on the validator, and a collected listener is skipped.

use thiserror::Error;

/// Result type alias using BinderyError
pub type Result<T> = std::result::Result<T, BinderyError>;

/// Errors raised while building rules, filters or running validation
#[derive(Debug, Error)]
pub enum BinderyError {
    /// A property path segment does not exist on the inspected type
    #[error("Unknown property '{property}' on {type_name}")]
    UnknownProperty {
        type_name: &'static str,
        property: String,
    },

    /// A dotted path walks through a property that is not a nested object
    #[error("Property '{0}' is not a nested object")]
    NotAnObject(String),

    /// A property path is empty or contains an empty segment
    #[error("Empty property path: '{0}'")]
    EmptyPath(String),

    /// A constant cannot be compared against the property's type
    #[error("Type mismatch for '{property}': expected {expected}, got {found}")]
    TypeMismatch {
        property: String,
        expected: String,
        found: String,
    },

    /// The operator is not defined for the property's type
    #[error("Operator {operator} is not supported for '{property}' ({kind})")]
    UnsupportedOperator {
        property: String,
        operator: String,
        kind: String,
    },

    /// A literal could not be converted (e.g. a malformed numeric string)
    #[error("Invalid value for '{property}': {message}")]
    InvalidValue { property: String, message: String },

    /// Validation was cancelled before the evaluation finished
    #[error("Validation cancelled")]
    Cancelled,

    /// Validation did not finish within the configured timeout
    #[error("Validation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// A background evaluation task panicked or was aborted
    #[error("Background task failed: {0}")]
    TaskFailed(String),

    /// Configuration could not be parsed
    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

impl BinderyError {
    /// Create an invalid value error with a message
    pub fn invalid_value(property: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            property: property.into(),
            message: message.into(),
        }
    }

    /// Create from a tokio join error
    pub fn from_join(err: tokio::task::JoinError) -> Self {
        Self::TaskFailed(err.to_string())
    }

    /// Returns true for errors caused by a malformed rule or filter
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnknownProperty { .. }
                | Self::NotAnObject(_)
                | Self::EmptyPath(_)
                | Self::TypeMismatch { .. }
                | Self::UnsupportedOperator { .. }
                | Self::InvalidValue { .. }
                | Self::Config(_)
        )
    }
}
