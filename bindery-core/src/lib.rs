//! Core traits and types for bindery
//!
//! This crate provides the runtime behind model-view-viewmodel style
//! applications: weakly held events, asynchronous rule-based validation and
//! a filter expression builder.
//!
//! # Core Concepts
//!
//! - **Inspect**: per-type accessor table used to read properties by name
//! - **WeakEventManager**: registry routing events from sources to listeners
//!   without keeping either alive
//! - **AsyncValidator**: per-property rules evaluated off the calling task
//! - **ExpressionBuilder**: compiles filter descriptors into predicates
//! - **ValidableObject**: a value wired to all of the above
//!
//! # Basic Example
//!
//! ```ignore
//! use bindery_core::prelude::*;
//!
//! let validator = AsyncValidator::<Customer>::new();
//! validator.property("name")?.is_required().has_max_length(40)?;
//! validator.property("age")?.is_value_in_range(18, 120)?;
//!
//! let customer = Arc::new(ValidableObject::with_validator(
//!     Customer::default(),
//!     validator,
//!     WeakEventManager::shared(),
//! ));
//!
//! customer.set("name", |c| c.name = Some("Ada".into())).await??;
//! assert!(customer.get_errors("name").is_empty());
//! ```
//!
//! # Filters
//!
//! ```ignore
//! let filters = vec![
//!     FilterExpression::new("name", Operator::StartsWith, "P"),
//!     FilterExpression::new("name", Operator::StartsWith, "F").or(),
//! ];
//! if let Some(predicate) = get_expression::<Customer>(&filters)? {
//!     let matches = predicate.filter(&customers);
//! }
//! ```

pub mod config;
pub mod error;
pub mod filter;
pub mod inspect;
pub mod object;
pub mod testing;
pub mod validation;
pub mod value;
pub mod weak;

// Error and config exports
pub use config::{BinderyConfig, EventManagerConfig, ExpressionOptions, ParseFailure, ValidatorConfig};
pub use error::{BinderyError, Result};

// Property model exports
pub use inspect::{Inspect, PropertyDescriptor, PropertyPath};
pub use value::{EnumValue, EnumVariant, PropertyEnum, PropertyType, PropertyValue, Value, ValueKind};

// Filter exports
pub use filter::{
    get_expression, Concat, ExpressionBuilder, FilterExpression, Operator, OperatorSet, Predicate,
};

// Event system exports
pub use weak::{
    spawn_reaper, CleanupReport, ErrorsChangedArgs, ListenerId, Messenger, PropertyChangedArgs,
    SourceKey, Subscription, SubscriptionGuard, WeakAction, WeakEvent, WeakEventManager,
    ERRORS_CHANGED, PROPERTY_CHANGED,
};

// Validation exports
pub use validation::{
    AsyncValidator, MergingAction, RuleAction, RuleBuilder, ValidationReport, ValidationRule,
    Validator,
};

// Object exports
pub use object::{set_property, Observable, ValidableObject};

// Testing exports
pub use testing::{EventRecorder, Notification};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{BinderyConfig, ExpressionOptions, ParseFailure, ValidatorConfig};
    pub use crate::error::{BinderyError, Result};
    pub use crate::filter::{get_expression, Concat, ExpressionBuilder, FilterExpression, Operator, Predicate};
    pub use crate::inspect::{Inspect, PropertyPath};
    pub use crate::object::{set_property, Observable, ValidableObject};
    pub use crate::validation::{AsyncValidator, MergingAction, ValidationReport, Validator};
    pub use crate::value::{PropertyEnum, PropertyValue, Value};
    pub use crate::weak::{
        ErrorsChangedArgs, Messenger, PropertyChangedArgs, Subscription, WeakEventManager,
        ERRORS_CHANGED, PROPERTY_CHANGED,
    };
}
