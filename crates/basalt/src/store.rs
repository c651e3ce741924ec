//! In-memory policy rule store (the PAP surface).
//!
//! The store is the one piece of mutable shared state in the engine. Reads
//! run in parallel; mutations serialize behind a write lock and are
//! all-or-nothing, so a concurrent reader never observes a partially-applied
//! batch. Matcher expressions are validated eagerly: a rule with unparsable
//! matcher text never enters the store.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::error::{EngineError, Result};
use crate::expr;
use crate::policy::PolicyRule;

/// External persistence adapter for policy snapshots.
///
/// The store treats save and load as opaque pass-through calls; whatever the
/// adapter does (file, database, replication) is its own concern.
pub trait SnapshotStore: Send + Sync {
    /// Persists the full rule set.
    fn save(
        &self,
        rules: &[PolicyRule],
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Loads the full rule set.
    fn load(
        &self,
    ) -> std::result::Result<Vec<PolicyRule>, Box<dyn std::error::Error + Send + Sync>>;
}

/// Ordered collection of policy rules with atomic multi-rule mutation.
#[derive(Debug, Default)]
pub struct PolicyStore {
    rules: RwLock<Vec<PolicyRule>>,
}

impl PolicyStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    // Lock poisoning is recovered rather than propagated: every mutation
    // validates and stages its changes before touching the vector, so a
    // panicking writer cannot leave a half-applied batch behind.
    fn read(&self) -> RwLockReadGuard<'_, Vec<PolicyRule>> {
        self.rules.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<PolicyRule>> {
        self.rules.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a rule. Returns `Ok(false)` if an identical rule already exists
    /// (idempotent add), `Err` if the matcher does not parse.
    pub fn add_rule(&self, rule: &PolicyRule) -> Result<bool> {
        expr::parse(&rule.matcher)?;
        let mut rules = self.write();
        if rules.contains(rule) {
            return Ok(false);
        }
        rules.push(rule.clone());
        debug!(rule = %rule.id, total = rules.len(), "policy rule added");
        Ok(true)
    }

    /// Adds a batch of rules, all-or-nothing.
    ///
    /// Every matcher must parse (`Err` otherwise, nothing added). If any
    /// rule already exists, or the batch duplicates itself, nothing is added
    /// and `Ok(false)` is returned.
    pub fn add_rules(&self, batch: &[PolicyRule]) -> Result<bool> {
        for rule in batch {
            expr::parse(&rule.matcher)?;
        }
        let mut rules = self.write();
        for (i, rule) in batch.iter().enumerate() {
            if rules.contains(rule) || batch[..i].contains(rule) {
                return Ok(false);
            }
        }
        rules.extend_from_slice(batch);
        debug!(added = batch.len(), total = rules.len(), "policy rules added");
        Ok(true)
    }

    /// Removes a rule. Returns `false` if it was not present.
    pub fn remove_rule(&self, rule: &PolicyRule) -> bool {
        let mut rules = self.write();
        let Some(index) = rules.iter().position(|r| r == rule) else {
            return false;
        };
        rules.remove(index);
        debug!(rule = %rule.id, total = rules.len(), "policy rule removed");
        true
    }

    /// Removes a batch of rules, all-or-nothing: if any listed rule is
    /// absent, nothing is removed and `false` is returned.
    pub fn remove_rules(&self, batch: &[PolicyRule]) -> bool {
        let mut rules = self.write();
        let mut indices = Vec::with_capacity(batch.len());
        for rule in batch {
            let Some(index) = rules
                .iter()
                .enumerate()
                .find_map(|(i, r)| (r == rule && !indices.contains(&i)).then_some(i))
            else {
                return false;
            };
            indices.push(index);
        }
        indices.sort_unstable();
        for index in indices.into_iter().rev() {
            rules.remove(index);
        }
        debug!(removed = batch.len(), total = rules.len(), "policy rules removed");
        true
    }

    /// Replaces `old` with `new` in place. Returns `Ok(false)` if `old` is
    /// not present, `Err` if the new matcher does not parse.
    pub fn update_rule(&self, old: &PolicyRule, new: &PolicyRule) -> Result<bool> {
        expr::parse(&new.matcher)?;
        let mut rules = self.write();
        let Some(index) = rules.iter().position(|r| r == old) else {
            return Ok(false);
        };
        rules[index] = new.clone();
        debug!(old = %old.id, new = %new.id, "policy rule updated");
        Ok(true)
    }

    /// Returns all rules in insertion order.
    pub fn rules(&self) -> Vec<PolicyRule> {
        self.read().clone()
    }

    /// Returns the rules matching a caller-supplied predicate.
    pub fn rules_filtered(&self, predicate: impl Fn(&PolicyRule) -> bool) -> Vec<PolicyRule> {
        self.read().iter().filter(|r| predicate(r)).cloned().collect()
    }

    /// Returns the candidate rules for a decision: those scoped to the given
    /// tenant or to the wildcard scope. No other implicit filtering.
    pub fn candidates_for(&self, tenant: &str) -> Vec<PolicyRule> {
        self.rules_filtered(|r| r.applies_to(tenant))
    }

    /// Returns true if an identical rule is stored.
    pub fn has_rule(&self, rule: &PolicyRule) -> bool {
        self.read().contains(rule)
    }

    /// Number of stored rules.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns true if no rules are stored.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Removes all rules.
    pub fn clear(&self) {
        let mut rules = self.write();
        rules.clear();
        debug!("policy store cleared");
    }

    /// Persists the current rule set through the external adapter.
    pub fn save_snapshot(&self, adapter: &dyn SnapshotStore) -> Result<()> {
        let rules = self.rules();
        adapter.save(&rules).map_err(EngineError::Snapshot)
    }

    /// Replaces the rule set with the adapter's snapshot, atomically.
    ///
    /// Every loaded matcher is validated before anything is replaced; a
    /// snapshot containing an unparsable matcher leaves the store untouched.
    pub fn load_snapshot(&self, adapter: &dyn SnapshotStore) -> Result<()> {
        let loaded = adapter.load().map_err(EngineError::Snapshot)?;
        for rule in &loaded {
            expr::parse(&rule.matcher)?;
        }
        let count = loaded.len();
        *self.write() = loaded;
        debug!(total = count, "policy snapshot loaded");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
