//! bindery: weak events, async validation and filter predicates
//!
//! The runtime half of a model-view-viewmodel application. Objects raise
//! change notifications through a weak event registry, validate changed
//! properties in the background, and collections are filtered with
//! predicates compiled from plain filter descriptors.
//!
//! # Example
//! ```ignore
//! use bindery::prelude::*;
//!
//! #[derive(Inspect, Clone, Default)]
//! struct Customer {
//!     name: Option<String>,
//!     age: u32,
//!     status: Status,
//! }
//!
//! #[derive(PropertyEnum, Clone, Copy, Default)]
//! enum Status {
//!     #[default]
//!     Draft,
//!     Active,
//! }
//!
//! let validator = AsyncValidator::<Customer>::new();
//! validator.property("name")?.is_required();
//! validator.property("age")?.is_value_in_range(18, 120)?;
//! ```

// Re-export everything from core
pub use bindery_core::*;

// Re-export derive macros
pub use bindery_macros::{Inspect, PropertyEnum};

/// Prelude for convenient imports
pub mod prelude {
    // Traits
    pub use bindery_core::{Inspect, Observable, PropertyEnum, PropertyValue, Validator};

    // Events
    pub use bindery_core::{
        ErrorsChangedArgs, Messenger, PropertyChangedArgs, Subscription, SubscriptionGuard,
        WeakEventManager, ERRORS_CHANGED, PROPERTY_CHANGED,
    };

    // Validation
    pub use bindery_core::{
        AsyncValidator, MergingAction, ValidableObject, ValidationReport, ValidationRule,
    };

    // Filters
    pub use bindery_core::{
        get_expression, Concat, ExpressionBuilder, FilterExpression, Operator, Predicate,
    };

    // Values, config and errors
    pub use bindery_core::{
        set_property, BinderyConfig, BinderyError, PropertyPath, Result, Value,
    };

    // Derive macros
    pub use bindery_macros::{Inspect, PropertyEnum};
}
