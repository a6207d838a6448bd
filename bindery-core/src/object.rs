//! Observable and validable objects
//!
//! [`Observable`] routes property-change notifications through a
//! [`WeakEventManager`] instead of a handler list on the object.
//! [`ValidableObject`] wraps a value, raises `PropertyChanged` for every
//! mutation, validates the changed property in the background and raises
//! `ErrorsChanged` when the property's error set moves.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::error::Result;
use crate::validation::{AsyncValidator, ValidationReport, Validator};
use crate::weak::{
    ErrorsChangedArgs, PropertyChangedArgs, WeakEventManager, ERRORS_CHANGED, PROPERTY_CHANGED,
};

/// Aggregate flags raised after an error-set change
pub const HAS_ERRORS: &str = "has_errors";
pub const IS_VALID: &str = "is_valid";

/// An object that announces property changes through a weak event registry
pub trait Observable: Any + Send + Sync + Sized {
    /// Registry the object raises its events through
    fn events(&self) -> Arc<WeakEventManager> {
        WeakEventManager::shared()
    }

    /// Raise `PropertyChanged` for `property`; returns the number of listeners reached
    fn notify_property_changed(&self, property: &str) -> usize {
        self.events()
            .raise_event(self, PROPERTY_CHANGED, &PropertyChangedArgs::new(property))
    }
}

/// Assign `value` to `field` if it differs. Returns whether it changed.
///
/// ```
/// use bindery_core::object::set_property;
///
/// let mut name = String::from("Ada");
/// assert!(!set_property(&mut name, "Ada".to_string()));
/// assert!(set_property(&mut name, "Grace".to_string()));
/// assert_eq!(name, "Grace");
/// ```
pub fn set_property<V: PartialEq>(field: &mut V, value: V) -> bool {
    if *field == value {
        return false;
    }
    *field = value;
    true
}

/// A value plus the validator and event plumbing around it
///
/// The validator is created on first use unless one is supplied. Keep the
/// object in an `Arc`: listeners subscribe to that `Arc`, and background
/// validation holds a clone of it until it finishes.
pub struct ValidableObject<T, V = AsyncValidator<T>> {
    state: RwLock<Arc<T>>,
    validator: OnceLock<Arc<V>>,
    events: Arc<WeakEventManager>,
}

impl<T: fmt::Debug, V> fmt::Debug for ValidableObject<T, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidableObject")
            .field("state", &*self.state.read())
            .field("validator", &self.validator.get().is_some())
            .finish()
    }
}

impl<T, V> ValidableObject<T, V>
where
    T: Clone + Send + Sync + 'static,
    V: Validator<T> + Default + 'static,
{
    /// Wrap `value`, raising events through the shared registry
    pub fn new(value: T) -> Self {
        Self::with_events(value, WeakEventManager::shared())
    }

    pub fn with_events(value: T, events: Arc<WeakEventManager>) -> Self {
        Self {
            state: RwLock::new(Arc::new(value)),
            validator: OnceLock::new(),
            events,
        }
    }

    /// Wrap `value` with a validator that already carries its rules
    pub fn with_validator(value: T, validator: V, events: Arc<WeakEventManager>) -> Self {
        let object = Self::with_events(value, events);
        let _ = object.validator.set(Arc::new(validator));
        object
    }

    /// The validator, created on first access
    pub fn validator(&self) -> &Arc<V> {
        self.validator.get_or_init(|| Arc::new(V::default()))
    }

    /// Snapshot of the current value
    pub fn value(&self) -> Arc<T> {
        Arc::clone(&*self.state.read())
    }

    /// Mutate the value, announce `property` and validate it in the background.
    ///
    /// `PropertyChanged` is raised before this returns. Await the handle to
    /// wait for validation and its `ErrorsChanged` notifications.
    pub fn set<F>(self: &Arc<Self>, property: &str, mutate: F) -> JoinHandle<Result<ValidationReport>>
    where
        F: FnOnce(&mut T),
    {
        let snapshot = {
            let mut state = self.state.write();
            mutate(Arc::make_mut(&mut *state));
            Arc::clone(&*state)
        };
        self.notify_property_changed(property);

        let this = Arc::clone(self);
        let property = property.to_string();
        tokio::spawn(async move {
            let report = this
                .validator()
                .validate_property(snapshot, &property)
                .await?;
            this.publish(&report);
            Ok(report)
        })
    }

    /// Validate every property with rules against the current value
    pub async fn validate(&self) -> Result<ValidationReport> {
        let report = self.validator().validate(self.value()).await?;
        self.publish(&report);
        Ok(report)
    }

    pub async fn validate_property(&self, property: &str) -> Result<ValidationReport> {
        let report = self
            .validator()
            .validate_property(self.value(), property)
            .await?;
        self.publish(&report);
        Ok(report)
    }

    pub fn get_errors(&self, property: &str) -> Vec<String> {
        self.validator().get_errors(property)
    }

    pub fn has_errors(&self) -> bool {
        self.validator().has_errors()
    }

    pub fn is_valid(&self) -> bool {
        !self.has_errors()
    }

    fn publish(&self, report: &ValidationReport) {
        if !report.is_changed() {
            return;
        }
        for property in &report.changed {
            self.events
                .raise_event(self, ERRORS_CHANGED, &ErrorsChangedArgs::new(property.as_str()));
        }
        self.notify_property_changed(HAS_ERRORS);
        self.notify_property_changed(IS_VALID);
        trace!(changed = ?report.changed, "Error notifications raised");
    }
}

impl<T, V> Observable for ValidableObject<T, V>
where
    T: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn events(&self) -> Arc<WeakEventManager> {
        Arc::clone(&self.events)
    }
}
