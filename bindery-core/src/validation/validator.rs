//! Rule sets, error tracking and asynchronous evaluation

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::rule::{RuleBuilder, ValidationRule};
use crate::config::ValidatorConfig;
use crate::error::{BinderyError, Result};
use crate::inspect::{Inspect, PropertyPath};

/// How [`AsyncValidator::merge_rules`] combines an incoming rule set with
/// the existing one
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MergingAction {
    /// Union the rules; properties present on both sides get their actions unioned
    #[default]
    MergeAll,
    /// Drop every existing rule and adopt the incoming set
    ReplaceRules,
    /// Incoming rules replace existing rules for the same property
    ReplacePropertyRules,
    /// Existing rules win; incoming rules only add new properties
    OverridePropertyRules,
    /// Only properties present on both sides are touched; no property is added
    MergeExistingRuleActions,
}

/// Outcome of a validation or merge pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Properties whose set of error messages changed
    pub changed: Vec<String>,
    /// Whether the validator holds any error after the pass
    pub has_errors: bool,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        !self.has_errors
    }

    pub fn is_changed(&self) -> bool {
        !self.changed.is_empty()
    }
}

/// Each evaluated rule with the messages of its failing actions
type Outcome<T> = Vec<(Arc<ValidationRule<T>>, Vec<String>)>;

/// Common surface of validators
#[async_trait]
pub trait Validator<T: Send + Sync + 'static>: Send + Sync {
    /// Evaluate the rules of one property against `instance`
    async fn validate_property(&self, instance: Arc<T>, property: &str) -> Result<ValidationReport>;

    /// Evaluate every property that has at least one rule
    async fn validate(&self, instance: Arc<T>) -> Result<ValidationReport>;

    /// Current messages for `property`; empty when it has none
    fn get_errors(&self, property: &str) -> Vec<String>;

    fn has_errors(&self) -> bool;

    /// Snapshot of every property with errors
    fn errors(&self) -> BTreeMap<String, Vec<String>>;

    fn clear_errors(&self);
}

/// Validator holding per-property rules and the errors they currently report
///
/// One validator belongs to one validated object. Rules are stored behind
/// `Arc` so they can be shared with other validators through
/// [`merge_rules`](Self::merge_rules); shared rules are never modified in
/// place.
///
/// ```ignore
/// let validator = AsyncValidator::<Customer>::new();
/// validator.property("name")?.is_required();
/// validator.property("age")?.is_value_in_range(18, 120)?;
///
/// let report = validator.validate(Arc::new(customer)).await?;
/// if report.has_errors {
///     println!("{:?}", validator.get_errors("name"));
/// }
/// ```
pub struct AsyncValidator<T> {
    rules: RwLock<Vec<Arc<ValidationRule<T>>>>,
    errors: Mutex<BTreeMap<String, Vec<String>>>,
    config: ValidatorConfig,
}

impl<T> Default for AsyncValidator<T> {
    fn default() -> Self {
        Self::with_config(ValidatorConfig::default())
    }
}

impl<T> fmt::Debug for AsyncValidator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncValidator")
            .field("rules", &self.rules.read().len())
            .field("errors", &*self.errors.lock())
            .field("config", &self.config)
            .finish()
    }
}

impl<T> AsyncValidator<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ValidatorConfig) -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
            errors: Mutex::new(BTreeMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    pub fn get_errors(&self, property: &str) -> Vec<String> {
        self.errors
            .lock()
            .get(property.trim())
            .cloned()
            .unwrap_or_default()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.lock().is_empty()
    }

    pub fn errors(&self) -> BTreeMap<String, Vec<String>> {
        self.errors.lock().clone()
    }

    pub fn clear_errors(&self) {
        self.errors.lock().clear();
    }

    /// Snapshot of the rule set
    pub fn rules(&self) -> Vec<Arc<ValidationRule<T>>> {
        self.rules.read().clone()
    }

    pub fn rule(&self, property: &str) -> Option<Arc<ValidationRule<T>>> {
        let property = property.trim();
        self.rules
            .read()
            .iter()
            .find(|r| r.path().as_str() == property)
            .cloned()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.read().len()
    }
}

impl<T: Send + Sync + 'static> AsyncValidator<T> {
    /// Properties that have at least one rule-action
    pub fn properties(&self) -> Vec<String> {
        self.rules
            .read()
            .iter()
            .filter(|r| !r.is_empty())
            .map(|r| r.property().to_string())
            .collect()
    }

    /// Swap in a new version of the rule for `path`, creating it if absent
    pub(crate) fn update_rule<F>(&self, path: &PropertyPath, update: F)
    where
        F: FnOnce(&ValidationRule<T>) -> ValidationRule<T>,
    {
        let mut rules = self.rules.write();
        match rules.iter_mut().find(|r| r.path() == path) {
            Some(rule) => *rule = Arc::new(update(rule)),
            None => rules.push(Arc::new(update(&ValidationRule::new(path.clone())))),
        }
    }

    /// Add (or extend) rules directly
    pub fn add_rule(&self, rule: ValidationRule<T>) {
        self.merge_rules(vec![Arc::new(rule)], MergingAction::MergeAll);
    }

    /// Combine `incoming` with the existing rule set according to `action`.
    ///
    /// Incoming rules for the same property are unioned first, so the rule
    /// set never holds two rules for one property. Returns the properties
    /// whose errors were cleared because their rules were replaced.
    pub fn merge_rules(
        &self,
        incoming: Vec<Arc<ValidationRule<T>>>,
        action: MergingAction,
    ) -> ValidationReport {
        let incoming = incoming.into_iter().fold(Vec::new(), |mut set, rule| {
            union_into(&mut set, rule);
            set
        });

        let mut cleared = Vec::new();
        {
            let mut rules = self.rules.write();
            match action {
                MergingAction::ReplaceRules => {
                    *rules = incoming;
                    let mut errors = self.errors.lock();
                    cleared.extend(std::mem::take(&mut *errors).into_keys());
                }
                MergingAction::MergeAll => {
                    for rule in incoming {
                        union_into(&mut *rules, rule);
                    }
                }
                MergingAction::ReplacePropertyRules => {
                    let mut errors = self.errors.lock();
                    for rule in incoming {
                        if errors.remove(rule.property()).is_some() {
                            cleared.push(rule.property().to_string());
                        }
                        match rules.iter_mut().find(|r| **r == rule) {
                            Some(existing) => *existing = rule,
                            None => rules.push(rule),
                        }
                    }
                }
                MergingAction::OverridePropertyRules => {
                    for rule in incoming {
                        if !rules.iter().any(|r| *r == rule) {
                            rules.push(rule);
                        }
                    }
                }
                MergingAction::MergeExistingRuleActions => {
                    for rule in incoming {
                        if let Some(existing) = rules.iter_mut().find(|r| **r == rule) {
                            *existing = Arc::new(existing.union(&rule));
                        }
                    }
                }
            }
            debug!(?action, rules = rules.len(), "Rules merged");
        }

        ValidationReport {
            changed: cleared,
            has_errors: self.has_errors(),
        }
    }

    /// Merge the rules of another validator, sharing them by reference
    pub fn merge_from(&self, other: &AsyncValidator<T>, action: MergingAction) -> ValidationReport {
        self.merge_rules(other.rules(), action)
    }

    /// Evaluate the rules of one property and update its errors.
    ///
    /// The property's error list becomes exactly the messages of its failing
    /// actions. A property without rules ends up with no errors.
    pub async fn validate_property(&self, instance: Arc<T>, property: &str) -> Result<ValidationReport> {
        let property = property.trim();
        let rules = self.active_rules(|r| r.property() == property);

        let outcome = if rules.is_empty() {
            Vec::new()
        } else {
            self.evaluate(instance, rules).await?
        };
        Ok(self.apply(vec![property.to_string()], outcome))
    }

    /// Evaluate every property that has at least one rule-action
    pub async fn validate(&self, instance: Arc<T>) -> Result<ValidationReport> {
        let rules = self.active_rules(|_| true);
        let mut properties: Vec<String> = Vec::new();
        for rule in &rules {
            if !properties.iter().any(|p| p == rule.property()) {
                properties.push(rule.property().to_string());
            }
        }

        let outcome = self.evaluate(instance, rules).await?;
        Ok(self.apply(properties, outcome))
    }

    /// [`validate`](Self::validate), abandoned with `Cancelled` if `cancel`
    /// fires first. Errors are left untouched on cancellation.
    pub async fn validate_with_cancel(
        &self,
        instance: Arc<T>,
        cancel: CancellationToken,
    ) -> Result<ValidationReport> {
        tokio::select! {
            _ = cancel.cancelled() => Err(BinderyError::Cancelled),
            report = self.validate(instance) => report,
        }
    }

    pub async fn validate_property_with_cancel(
        &self,
        instance: Arc<T>,
        property: &str,
        cancel: CancellationToken,
    ) -> Result<ValidationReport> {
        tokio::select! {
            _ = cancel.cancelled() => Err(BinderyError::Cancelled),
            report = self.validate_property(instance, property) => report,
        }
    }

    /// Non-empty rules matching `filter`, in rule order
    fn active_rules<F>(&self, filter: F) -> Vec<Arc<ValidationRule<T>>>
    where
        F: Fn(&ValidationRule<T>) -> bool,
    {
        self.rules
            .read()
            .iter()
            .filter(|&r| !r.is_empty() && filter(&**r))
            .cloned()
            .collect()
    }

    async fn evaluate(&self, instance: Arc<T>, rules: Vec<Arc<ValidationRule<T>>>) -> Result<Outcome<T>> {
        let offload = self.config.offload;
        let evaluation = async move {
            if offload {
                tokio::task::spawn_blocking(move || run_rules(&rules, &instance))
                    .await
                    .map_err(BinderyError::from_join)
            } else {
                Ok(run_rules(&rules, &instance))
            }
        };

        match self.config.evaluation_timeout() {
            Some(limit) => tokio::time::timeout(limit, evaluation)
                .await
                .map_err(|_| BinderyError::Timeout(limit))?,
            None => evaluation.await,
        }
    }

    /// Record the outcome for `properties`.
    ///
    /// A property whose rules changed while it was being evaluated keeps its
    /// current errors; the outcome was computed against rules that are gone.
    fn apply(&self, properties: Vec<String>, outcome: Outcome<T>) -> ValidationReport {
        let rules = self.rules.read();
        let mut errors = self.errors.lock();
        let mut changed = Vec::new();

        for property in properties {
            let evaluated: Vec<_> = outcome
                .iter()
                .filter(|(rule, _)| rule.property() == property)
                .collect();
            let current: Vec<_> = rules
                .iter()
                .filter(|r| !r.is_empty() && r.property() == property)
                .collect();
            let fresh = evaluated.len() == current.len()
                && evaluated
                    .iter()
                    .zip(&current)
                    .all(|((rule, _), current)| Arc::ptr_eq(rule, *current));
            if !fresh {
                trace!(property = %property, "Outcome of replaced rules discarded");
                continue;
            }

            let mut messages: Vec<String> = Vec::new();
            for message in evaluated.iter().flat_map(|(_, failing)| failing) {
                if !messages.contains(message) {
                    messages.push(message.clone());
                }
            }

            let unchanged = match errors.get(&property) {
                Some(current) => same_messages(current, &messages),
                None => messages.is_empty(),
            };
            if unchanged {
                continue;
            }

            debug!(property = %property, errors = messages.len(), "Errors changed");
            if messages.is_empty() {
                errors.remove(&property);
            } else {
                errors.insert(property.clone(), messages);
            }
            changed.push(property);
        }

        trace!(changed = changed.len(), total = errors.len(), "Validation applied");
        ValidationReport {
            changed,
            has_errors: !errors.is_empty(),
        }
    }
}

impl<T: Inspect + Send + Sync + 'static> AsyncValidator<T> {
    /// Rule builder for `property`, creating an empty rule if needed
    pub fn property(&self, property: &str) -> Result<RuleBuilder<'_, T>> {
        let path = PropertyPath::resolve::<T>(property)?;
        {
            let mut rules = self.rules.write();
            if !rules.iter().any(|r| r.path() == &path) {
                rules.push(Arc::new(ValidationRule::new(path.clone())));
            }
        }
        Ok(RuleBuilder::new(self, path, self.config.expressions))
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> Validator<T> for AsyncValidator<T> {
    async fn validate_property(&self, instance: Arc<T>, property: &str) -> Result<ValidationReport> {
        AsyncValidator::validate_property(self, instance, property).await
    }

    async fn validate(&self, instance: Arc<T>) -> Result<ValidationReport> {
        AsyncValidator::validate(self, instance).await
    }

    fn get_errors(&self, property: &str) -> Vec<String> {
        AsyncValidator::get_errors(self, property)
    }

    fn has_errors(&self) -> bool {
        AsyncValidator::has_errors(self)
    }

    fn errors(&self) -> BTreeMap<String, Vec<String>> {
        AsyncValidator::errors(self)
    }

    fn clear_errors(&self) {
        AsyncValidator::clear_errors(self)
    }
}

fn run_rules<T: 'static>(rules: &[Arc<ValidationRule<T>>], instance: &T) -> Outcome<T> {
    rules
        .iter()
        .map(|rule| (Arc::clone(rule), rule.failing_messages(instance)))
        .collect()
}

/// Add `rule`, unioning it with an existing rule for the same property
fn union_into<T: 'static>(rules: &mut Vec<Arc<ValidationRule<T>>>, rule: Arc<ValidationRule<T>>) {
    match rules.iter_mut().find(|r| **r == rule) {
        Some(existing) => *existing = Arc::new(existing.union(&rule)),
        None => rules.push(rule),
    }
}

fn same_messages(a: &[String], b: &[String]) -> bool {
    a.len() == b.len() && a.iter().all(|m| b.contains(m))
}
