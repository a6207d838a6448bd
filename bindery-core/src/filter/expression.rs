//! Declarative filter descriptors and the predicate builder

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::operator::{Concat, Operator, OperatorSet};
use super::predicate::Predicate;
use crate::config::ExpressionOptions;
use crate::error::{BinderyError, Result};
use crate::inspect::{Inspect, PropertyPath};
use crate::value::{Value, ValueKind};

/// One filter: `property <operator> value`, joined to its predecessors by `concat`
///
/// This is the shape saved filter presets are stored in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterExpression {
    pub property: String,
    pub operator: Operator,
    #[serde(default)]
    pub concat: Concat,
    #[serde(default)]
    pub value: Value,
}

impl FilterExpression {
    pub fn new(property: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            property: property.into(),
            operator,
            concat: Concat::And,
            value: value.into(),
        }
    }

    pub fn with_concat(mut self, concat: Concat) -> Self {
        self.concat = concat;
        self
    }

    pub fn or(self) -> Self {
        self.with_concat(Concat::Or)
    }

    pub fn and_not(self) -> Self {
        self.with_concat(Concat::AndNot)
    }

    pub fn or_not(self) -> Self {
        self.with_concat(Concat::OrNot)
    }

    /// Filters with a blank property name are ignored by the builder
    pub fn is_usable(&self) -> bool {
        !self.property.trim().is_empty()
    }
}

/// Builds compiled predicates from filter descriptors
///
/// # Example
///
/// ```ignore
/// let filters = vec![
///     FilterExpression::new("name", Operator::StartsWith, "P"),
///     FilterExpression::new("name", Operator::StartsWith, "F").or(),
/// ];
/// let predicate = ExpressionBuilder::default().build::<Person>(&filters)?;
/// let matches = predicate.map(|p| p.filter(&people)).unwrap_or_default();
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpressionBuilder {
    options: ExpressionOptions,
}

impl ExpressionBuilder {
    pub fn new(options: ExpressionOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ExpressionOptions {
        &self.options
    }

    /// Compile `filters` into one predicate.
    ///
    /// Filters are joined strictly left to right using each filter's own
    /// concat operator; the first filter's concat is ignored. Returns
    /// `Ok(None)` when no filter names a property.
    pub fn build<T: Inspect + 'static>(
        &self,
        filters: &[FilterExpression],
    ) -> Result<Option<Predicate<T>>> {
        let mut result: Option<Predicate<T>> = None;

        for filter in filters.iter().filter(|f| f.is_usable()) {
            let condition = self.condition::<T>(filter)?;
            result = Some(match result {
                None => condition,
                Some(current) => current.combine(filter.concat, condition),
            });
        }

        Ok(result)
    }

    /// Compile a single filter, ignoring its concat operator
    pub fn condition<T: Inspect + 'static>(&self, filter: &FilterExpression) -> Result<Predicate<T>> {
        let path = PropertyPath::resolve::<T>(&filter.property)?;
        compile_condition(path, filter.operator, &filter.value, &self.options)
    }
}

/// Compile filters with the default options
pub fn get_expression<T: Inspect + 'static>(
    filters: &[FilterExpression],
) -> Result<Option<Predicate<T>>> {
    ExpressionBuilder::default().build(filters)
}

/// Compile `path <operator> constant` into a predicate.
///
/// Comparisons use nullable semantics: ordering against a null is false and
/// `null == null`. Substring operators read a null property as the empty
/// string.
fn compile_condition<T: Inspect + 'static>(
    path: PropertyPath,
    operator: Operator,
    constant: &Value,
    options: &ExpressionOptions,
) -> Result<Predicate<T>> {
    let leaf = path.leaf();
    if !OperatorSet::for_kind(leaf.kind).supports(operator) {
        return Err(BinderyError::UnsupportedOperator {
            property: path.as_str().to_string(),
            operator: operator.to_string(),
            kind: leaf.kind.name().to_string(),
        });
    }

    if operator.is_unary() {
        return Ok(match leaf.kind {
            ValueKind::Object(_) => Predicate::new(move |item: &T| !path.is_present(item)),
            _ => Predicate::new(move |item: &T| path.read(item).is_null_or_empty()),
        });
    }

    let constant = leaf.coerce(path.as_str(), constant, options.parse_failure)?;

    let predicate = match operator {
        Operator::Equals => Predicate::new(move |item: &T| path.read(item).loose_eq(&constant)),
        Operator::Different => Predicate::new(move |item: &T| !path.read(item).loose_eq(&constant)),
        Operator::GreaterThan => ordering(path, constant, |o| o == Ordering::Greater),
        Operator::LessThan => ordering(path, constant, |o| o == Ordering::Less),
        Operator::GreaterThanOrEqual => ordering(path, constant, |o| o != Ordering::Less),
        Operator::LessThanOrEqual => ordering(path, constant, |o| o != Ordering::Greater),
        Operator::Contains => substring(path, constant, |s, c| s.contains(c))?,
        Operator::StartsWith => substring(path, constant, |s, c| s.starts_with(c))?,
        Operator::EndsWith => substring(path, constant, |s, c| s.ends_with(c))?,
        Operator::IsNullOrEmpty => unreachable!("unary operators return early"),
    };

    Ok(predicate)
}

fn ordering<T: Inspect + 'static>(
    path: PropertyPath,
    constant: Value,
    accept: fn(Ordering) -> bool,
) -> Predicate<T> {
    Predicate::new(move |item: &T| {
        path.read(item)
            .compare(&constant)
            .map(accept)
            .unwrap_or(false)
    })
}

fn substring<T: Inspect + 'static>(
    path: PropertyPath,
    constant: Value,
    test: fn(&str, &str) -> bool,
) -> Result<Predicate<T>> {
    let needle = match constant {
        Value::Text(s) => s,
        other => {
            return Err(BinderyError::invalid_value(
                path.as_str(),
                format!("substring operators need a text constant, got {}", other.kind_name()),
            ))
        }
    };

    Ok(Predicate::new(move |item: &T| match path.read(item) {
        Value::Text(s) => test(&s, &needle),
        Value::Null => test("", &needle),
        _ => false,
    }))
}
