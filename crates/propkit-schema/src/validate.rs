//! # Validation Pass
//!
//! `Record::validate` checks a whole object graph and reports every
//! failure at once. Properties are checked first (required fields present,
//! stored values still accepted by their kind and by `Validate` listeners,
//! nested records recursively), then class validators in attachment order.
//!
//! Recursion is guarded by a [`VisitSet`] of instance ids threaded through
//! the walk: a record already visited in this pass contributes nothing on
//! re-entry, so cyclic graphs terminate.

use std::collections::HashSet;

use propkit_core::{FieldError, InstanceId, PropertyError};

use crate::handlers::{Change, ListenerMode};
use crate::record::Record;

/// Instances already visited by one validation pass.
#[derive(Debug, Default)]
pub struct VisitSet {
    seen: HashSet<InstanceId>,
}

impl VisitSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `id` visited. `false` if it already was.
    pub fn enter(&mut self, id: InstanceId) -> bool {
        self.seen.insert(id)
    }

    pub fn contains(&self, id: InstanceId) -> bool {
        self.seen.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Pairs of instances currently being compared.
#[derive(Debug, Default)]
pub struct EqualityGuard {
    active: HashSet<(InstanceId, InstanceId)>,
}

impl EqualityGuard {
    /// Start comparing `a` with `b`. `false` if that comparison is already
    /// in progress further up the stack.
    pub fn enter(&mut self, a: InstanceId, b: InstanceId) -> bool {
        self.active.insert((a, b))
    }

    pub fn leave(&mut self, a: InstanceId, b: InstanceId) {
        self.active.remove(&(a, b));
    }
}

impl Record {
    /// Check the record and everything reachable from it.
    ///
    /// Returns `Ok(())` or one error carrying every failure, translated by
    /// the type's error hook when it has one.
    pub fn validate(&self) -> Result<(), PropertyError> {
        let failures = self.collect_failures(&mut VisitSet::new())?;
        if failures.is_empty() {
            Ok(())
        } else {
            Err(self.record_type().report(self, failures))
        }
    }

    /// Field failures of this record and the records it reaches. Structural
    /// errors (from listeners or class validators) abort the pass.
    pub fn collect_failures(&self, visits: &mut VisitSet) -> Result<Vec<FieldError>, PropertyError> {
        let mut failures = Vec::new();
        if !visits.enter(self.id()) {
            return Ok(failures);
        }
        let ty = self.record_type().clone();
        for prop in ty.properties().iter().filter(|p| !p.is_dynamic()) {
            let Some(value) = self.stored(prop.name()) else {
                if prop.is_required() {
                    failures.push(FieldError::missing(prop.name(), Some(self.owner())));
                }
                continue;
            };
            if prop.is_mutable() {
                let mut change = Change {
                    name: prop.name().to_string(),
                    previous: Some(value.clone()),
                    value: Some(value.clone()),
                    mode: ListenerMode::Validate,
                };
                if let Err(err) = self.notify(&mut change) {
                    failures.extend(err.into_failures()?);
                    continue;
                }
                if !change.value.as_ref().is_some_and(|new| prop.equal(&value, new)) {
                    failures.push(FieldError::invalid(
                        prop.name(),
                        Some(self.owner()),
                        format!(
                            "The '{}' property of a {} instance was modified by a validator during validation.",
                            prop.name(),
                            self.type_name()
                        ),
                    ));
                    continue;
                }
            }
            prop.assert_valid(Some(self), &value, visits, &mut failures)?;
        }
        for validator in ty.validators() {
            if let Err(err) = validator(self) {
                failures.extend(err.into_failures()?);
            }
        }
        Ok(failures)
    }
}
