//! Asynchronous rule-based validation
//!
//! Each property of a validated type carries a [`ValidationRule`]: an ordered
//! list of compiled predicates and the messages they report on failure. An
//! [`AsyncValidator`] evaluates those rules off the calling task and keeps,
//! per property, the messages of the predicates that currently fail.

mod rule;
mod validator;

pub use rule::{RuleAction, RuleBuilder, ValidationRule};
pub use validator::{AsyncValidator, MergingAction, ValidationReport, Validator};
