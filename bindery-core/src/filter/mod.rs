//! Filter descriptors compiled into predicates
//!
//! A list of [`FilterExpression`]s (property, operator, constant, concat) is
//! turned into one [`Predicate`] that can filter collections or back a
//! validation rule.

mod expression;
mod operator;
mod predicate;

pub use expression::{get_expression, ExpressionBuilder, FilterExpression};
pub use operator::{Concat, Operator, OperatorSet};
pub use predicate::Predicate;
