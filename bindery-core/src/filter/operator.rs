//! Comparison and concatenation operators

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::value::ValueKind;

/// How a filter compares a property against its constant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Equals,
    Different,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
    Contains,
    StartsWith,
    EndsWith,
    IsNullOrEmpty,
}

impl Operator {
    pub fn all() -> &'static [Operator] {
        &[
            Operator::Equals,
            Operator::Different,
            Operator::GreaterThan,
            Operator::LessThan,
            Operator::GreaterThanOrEqual,
            Operator::LessThanOrEqual,
            Operator::Contains,
            Operator::StartsWith,
            Operator::EndsWith,
            Operator::IsNullOrEmpty,
        ]
    }

    pub fn flag(self) -> OperatorSet {
        match self {
            Operator::Equals => OperatorSet::EQUALS,
            Operator::Different => OperatorSet::DIFFERENT,
            Operator::GreaterThan => OperatorSet::GREATER_THAN,
            Operator::LessThan => OperatorSet::LESS_THAN,
            Operator::GreaterThanOrEqual => OperatorSet::GREATER_THAN_OR_EQUAL,
            Operator::LessThanOrEqual => OperatorSet::LESS_THAN_OR_EQUAL,
            Operator::Contains => OperatorSet::CONTAINS,
            Operator::StartsWith => OperatorSet::STARTS_WITH,
            Operator::EndsWith => OperatorSet::ENDS_WITH,
            Operator::IsNullOrEmpty => OperatorSet::IS_NULL_OR_EMPTY,
        }
    }

    /// Whether the operator ignores the filter's constant
    pub fn is_unary(self) -> bool {
        matches!(self, Operator::IsNullOrEmpty)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

bitflags! {
    /// Set of operators, used to check which comparisons a kind supports
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OperatorSet: u16 {
        const EQUALS = 1 << 0;
        const DIFFERENT = 1 << 1;
        const GREATER_THAN = 1 << 2;
        const LESS_THAN = 1 << 3;
        const GREATER_THAN_OR_EQUAL = 1 << 4;
        const LESS_THAN_OR_EQUAL = 1 << 5;
        const CONTAINS = 1 << 6;
        const STARTS_WITH = 1 << 7;
        const ENDS_WITH = 1 << 8;
        const IS_NULL_OR_EMPTY = 1 << 9;

        const EQUALITY = Self::EQUALS.bits() | Self::DIFFERENT.bits() | Self::IS_NULL_OR_EMPTY.bits();
        const ORDERING = Self::GREATER_THAN.bits()
            | Self::LESS_THAN.bits()
            | Self::GREATER_THAN_OR_EQUAL.bits()
            | Self::LESS_THAN_OR_EQUAL.bits();
        const SUBSTRING = Self::CONTAINS.bits() | Self::STARTS_WITH.bits() | Self::ENDS_WITH.bits();
    }
}

impl OperatorSet {
    /// Operators that make sense for a property kind
    pub fn for_kind(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Bool => Self::EQUALITY,
            ValueKind::Int | ValueKind::Float | ValueKind::Enum(_) => {
                Self::EQUALITY | Self::ORDERING
            }
            ValueKind::Text => Self::all(),
            ValueKind::Object(_) => Self::IS_NULL_OR_EMPTY,
        }
    }

    pub fn supports(self, operator: Operator) -> bool {
        self.contains(operator.flag())
    }
}

/// How a filter joins the expression built from the filters before it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Concat {
    #[default]
    And,
    Or,
    AndNot,
    OrNot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_sets_per_kind() {
        let numeric = OperatorSet::for_kind(ValueKind::Int);
        assert!(numeric.supports(Operator::GreaterThan));
        assert!(numeric.supports(Operator::IsNullOrEmpty));
        assert!(!numeric.supports(Operator::Contains));

        let text = OperatorSet::for_kind(ValueKind::Text);
        assert!(Operator::all().iter().all(|op| text.supports(*op)));

        let flag = OperatorSet::for_kind(ValueKind::Bool);
        assert!(flag.supports(Operator::Different));
        assert!(!flag.supports(Operator::LessThan));
    }

    #[test]
    fn test_concat_serde_names() {
        let json = serde_json::to_string(&[Concat::And, Concat::OrNot]).unwrap();
        assert_eq!(json, r#"["And","OrNot"]"#);
    }
}
