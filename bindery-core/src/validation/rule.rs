//! Validation rules and the fluent rule builder

use std::fmt;

use super::validator::AsyncValidator;
use crate::config::ExpressionOptions;
use crate::error::{BinderyError, Result};
use crate::filter::{ExpressionBuilder, FilterExpression, Operator, OperatorSet, Predicate};
use crate::inspect::{Inspect, PropertyPath};
use crate::value::{Value, ValueKind};

/// A compiled predicate and the message reported when it fails
pub struct RuleAction<T> {
    predicate: Predicate<T>,
    message: String,
}

impl<T> Clone for RuleAction<T> {
    fn clone(&self) -> Self {
        Self {
            predicate: self.predicate.clone(),
            message: self.message.clone(),
        }
    }
}

impl<T> fmt::Debug for RuleAction<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleAction")
            .field("message", &self.message)
            .finish()
    }
}

impl<T: 'static> RuleAction<T> {
    pub fn new(predicate: Predicate<T>, message: impl Into<String>) -> Self {
        Self {
            predicate,
            message: message.into(),
        }
    }

    pub fn predicate(&self) -> &Predicate<T> {
        &self.predicate
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn passes(&self, instance: &T) -> bool {
        self.predicate.evaluate(instance)
    }

    /// Same compiled predicate and same message
    pub fn same_as(&self, other: &RuleAction<T>) -> bool {
        self.predicate.ptr_eq(&other.predicate) && self.message == other.message
    }
}

/// Every rule-action registered for one property path of `T`
///
/// Rules compare equal when they target the same property, whatever their
/// actions are.
pub struct ValidationRule<T> {
    path: PropertyPath,
    actions: Vec<RuleAction<T>>,
}

impl<T> Clone for ValidationRule<T> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            actions: self.actions.clone(),
        }
    }
}

impl<T> fmt::Debug for ValidationRule<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationRule")
            .field("property", &self.path.as_str())
            .field("actions", &self.actions)
            .finish()
    }
}

impl<T> PartialEq for ValidationRule<T> {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl<T> Eq for ValidationRule<T> {}

impl<T: Inspect + 'static> ValidationRule<T> {
    /// An empty rule for `property`, resolved against `T`
    pub fn for_property(property: &str) -> Result<Self> {
        Ok(Self::new(PropertyPath::resolve::<T>(property)?))
    }
}

impl<T> ValidationRule<T> {
    pub fn new(path: PropertyPath) -> Self {
        Self {
            path,
            actions: Vec::new(),
        }
    }

    pub fn path(&self) -> &PropertyPath {
        &self.path
    }

    pub fn property(&self) -> &str {
        self.path.as_str()
    }

    pub fn actions(&self) -> &[RuleAction<T>] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl<T: 'static> ValidationRule<T> {
    /// Append an action unless an identical one is already present
    pub fn push(&mut self, action: RuleAction<T>) {
        if !self.actions.iter().any(|a| a.same_as(&action)) {
            self.actions.push(action);
        }
    }

    pub fn with_action(mut self, action: RuleAction<T>) -> Self {
        self.push(action);
        self
    }

    /// Messages of the failing actions, in registration order, without duplicates
    pub fn failing_messages(&self, instance: &T) -> Vec<String> {
        let mut messages: Vec<String> = Vec::new();
        for action in self.actions.iter().filter(|a| !a.passes(instance)) {
            if !messages.iter().any(|m| m == action.message()) {
                messages.push(action.message.clone());
            }
        }
        messages
    }

    /// A new rule holding this rule's actions followed by the other rule's
    /// actions that are not already present
    pub fn union(&self, other: &ValidationRule<T>) -> Self {
        let mut merged = self.clone();
        for action in &other.actions {
            merged.push(action.clone());
        }
        merged
    }

    fn set_message(&mut self, predicate: &Predicate<T>, message: &str) -> bool {
        match self
            .actions
            .iter_mut()
            .rev()
            .find(|a| a.predicate.ptr_eq(predicate))
        {
            Some(action) => {
                action.message = message.to_string();
                true
            }
            None => false,
        }
    }
}

/// Fluent builder attaching rule-actions to one property of a validator
///
/// Obtained from [`AsyncValidator::property`]. Every call compiles its
/// predicate immediately and registers it with the validator.
///
/// ```ignore
/// validator.property("name")?.is_required().has_max_length(40)?;
/// validator
///     .property("age")?
///     .is_value_in_range(18, 120)?
///     .with_message("Age must be between 18 and 120");
/// ```
pub struct RuleBuilder<'a, T> {
    validator: &'a AsyncValidator<T>,
    path: PropertyPath,
    options: ExpressionOptions,
    last: Option<Predicate<T>>,
}

impl<T> fmt::Debug for RuleBuilder<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleBuilder")
            .field("property", &self.path.as_str())
            .finish()
    }
}

impl<'a, T> RuleBuilder<'a, T>
where
    T: Inspect + Send + Sync + 'static,
{
    pub(crate) fn new(
        validator: &'a AsyncValidator<T>,
        path: PropertyPath,
        options: ExpressionOptions,
    ) -> Self {
        Self {
            validator,
            path,
            options,
            last: None,
        }
    }

    pub fn path(&self) -> &PropertyPath {
        &self.path
    }

    fn add(mut self, predicate: Predicate<T>, message: String) -> Self {
        let action = RuleAction::new(predicate.clone(), message);
        self.validator
            .update_rule(&self.path, |rule| rule.clone().with_action(action));
        self.last = Some(predicate);
        self
    }

    fn coerce(&self, value: Value) -> Result<Value> {
        let constant = self
            .path
            .leaf()
            .coerce(self.path.as_str(), &value, self.options.parse_failure)?;
        if constant.is_null() {
            return Err(BinderyError::invalid_value(
                self.path.as_str(),
                "comparison constant must not be null",
            ));
        }
        Ok(constant)
    }

    fn require(&self, operator: Operator) -> Result<()> {
        let kind = self.path.leaf().kind;
        if OperatorSet::for_kind(kind).supports(operator) {
            Ok(())
        } else {
            Err(BinderyError::UnsupportedOperator {
                property: self.path.as_str().to_string(),
                operator: operator.to_string(),
                kind: kind.name().to_string(),
            })
        }
    }

    fn require_text(&self) -> Result<()> {
        match self.path.leaf().kind {
            ValueKind::Text => Ok(()),
            other => Err(BinderyError::TypeMismatch {
                property: self.path.as_str().to_string(),
                expected: ValueKind::Text.name().to_string(),
                found: other.name().to_string(),
            }),
        }
    }

    /// Predicate over the coalesced property value
    fn compare(&self, test: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Predicate<T> {
        let path = self.path.clone();
        Predicate::new(move |item: &T| test(&coalesced(&path, item)))
    }

    /// Fails on null, and on empty or whitespace-only text
    pub fn is_required(self) -> Self {
        let path = self.path.clone();
        let predicate = Predicate::new(move |item: &T| {
            if path.is_object() {
                return path.is_present(item);
            }
            match path.read(item) {
                Value::Null => false,
                Value::Text(s) => !s.trim().is_empty(),
                _ => true,
            }
        });
        let message = format!("{} is required", self.path);
        self.add(predicate, message)
    }

    /// Text length (in characters) of at most `max`; null counts as empty
    pub fn has_max_length(self, max: usize) -> Result<Self> {
        self.require_text()?;
        let predicate = self.compare(move |v| text_len(v) <= max);
        let message = format!("{} must be at most {} characters", self.path, max);
        Ok(self.add(predicate, message))
    }

    /// Text length (in characters) of at least `min`; null counts as empty
    pub fn has_min_length(self, min: usize) -> Result<Self> {
        self.require_text()?;
        let predicate = self.compare(move |v| text_len(v) >= min);
        let message = format!("{} must be at least {} characters", self.path, min);
        Ok(self.add(predicate, message))
    }

    pub fn is_greater_than(self, value: impl Into<Value>) -> Result<Self> {
        self.ordered(Operator::GreaterThan, value.into(), "greater than", |o| {
            o.is_gt()
        })
    }

    pub fn is_greater_than_or_equal(self, value: impl Into<Value>) -> Result<Self> {
        self.ordered(
            Operator::GreaterThanOrEqual,
            value.into(),
            "greater than or equal to",
            |o| o.is_ge(),
        )
    }

    pub fn is_less_than(self, value: impl Into<Value>) -> Result<Self> {
        self.ordered(Operator::LessThan, value.into(), "less than", |o| o.is_lt())
    }

    pub fn is_less_than_or_equal(self, value: impl Into<Value>) -> Result<Self> {
        self.ordered(
            Operator::LessThanOrEqual,
            value.into(),
            "less than or equal to",
            |o| o.is_le(),
        )
    }

    fn ordered(
        self,
        operator: Operator,
        value: Value,
        wording: &str,
        accept: fn(std::cmp::Ordering) -> bool,
    ) -> Result<Self> {
        self.require(operator)?;
        let shown = value.to_string();
        let constant = self.coerce(value)?;
        let predicate = self.compare(move |v| v.compare(&constant).is_some_and(accept));
        let message = format!("{} must be {} {}", self.path, wording, shown);
        Ok(self.add(predicate, message))
    }

    pub fn is_equal_to(self, value: impl Into<Value>) -> Result<Self> {
        let value = value.into();
        self.require(Operator::Equals)?;
        let shown = value.to_string();
        let predicate = self.equality(value)?;
        let message = format!("{} must be equal to {}", self.path, shown);
        Ok(self.add(predicate, message))
    }

    pub fn is_not_equal_to(self, value: impl Into<Value>) -> Result<Self> {
        let value = value.into();
        self.require(Operator::Different)?;
        let shown = value.to_string();
        let predicate = self.equality(value)?.not();
        let message = format!("{} must not be equal to {}", self.path, shown);
        Ok(self.add(predicate, message))
    }

    fn equality(&self, value: Value) -> Result<Predicate<T>> {
        let path = self.path.clone();
        let constant =
            self.path
                .leaf()
                .coerce(self.path.as_str(), &value, self.options.parse_failure)?;
        // Comparing against null checks the raw value; otherwise nulls coalesce
        if constant.is_null() {
            return Ok(Predicate::new(move |item: &T| path.read(item).is_null()));
        }
        Ok(self.compare(move |v| v.loose_eq(&constant)))
    }

    /// Inclusive range check: `low <= value <= high`
    pub fn is_value_in_range(self, low: impl Into<Value>, high: impl Into<Value>) -> Result<Self> {
        let (low, high, shown) = self.bounds(low.into(), high.into())?;
        let predicate = self.compare(move |v| in_range(v, &low, &high));
        let message = format!("{} must be between {}", self.path, shown);
        Ok(self.add(predicate, message))
    }

    /// Fails when `low <= value <= high`
    pub fn is_value_out_range(self, low: impl Into<Value>, high: impl Into<Value>) -> Result<Self> {
        let (low, high, shown) = self.bounds(low.into(), high.into())?;
        let predicate = self.compare(move |v| !in_range(v, &low, &high));
        let message = format!("{} must not be between {}", self.path, shown);
        Ok(self.add(predicate, message))
    }

    fn bounds(&self, low: Value, high: Value) -> Result<(Value, Value, String)> {
        self.require(Operator::GreaterThanOrEqual)?;
        let shown = format!("{} and {}", low, high);
        let low = self.coerce(low)?;
        let high = self.coerce(high)?;
        if low.compare(&high) == Some(std::cmp::Ordering::Greater) {
            return Err(BinderyError::invalid_value(
                self.path.as_str(),
                format!("empty range {}", shown),
            ));
        }
        Ok((low, high, shown))
    }

    /// Custom check over the whole instance
    pub fn must<F>(self, check: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let message = format!("{} is invalid", self.path);
        self.add(Predicate::new(check), message)
    }

    /// Check the instance against filter descriptors; passes when no
    /// descriptor names a property
    pub fn must_match(self, filters: &[FilterExpression]) -> Result<Self> {
        let predicate = ExpressionBuilder::new(self.options)
            .build::<T>(filters)?
            .unwrap_or_else(Predicate::always);
        let message = format!("{} is invalid", self.path);
        Ok(self.add(predicate, message))
    }

    /// Replace the message of the action added last
    pub fn with_message(self, message: impl Into<String>) -> Self {
        if let Some(last) = &self.last {
            let message = message.into();
            self.validator.update_rule(&self.path, |rule| {
                let mut rule = rule.clone();
                rule.set_message(last, &message);
                rule
            });
        }
        self
    }
}

/// Read the property, replacing null with the kind's default
fn coalesced(path: &PropertyPath, item: &dyn Inspect) -> Value {
    match path.read(item) {
        Value::Null => path.leaf().kind.default_value(),
        value => value,
    }
}

fn text_len(value: &Value) -> usize {
    value.as_str().map_or(0, |s| s.chars().count())
}

fn in_range(value: &Value, low: &Value, high: &Value) -> bool {
    value.compare(low).is_some_and(|o| o.is_ge()) && value.compare(high).is_some_and(|o| o.is_le())
}
