//! Policy rule definitions.

use serde::{Deserialize, Serialize};

/// Tenant scope that matches every tenant.
pub const TENANT_WILDCARD: &str = "*";

/// The effect a fired rule contributes to the final decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Effect {
    /// Grant access.
    Allow,
    /// Deny access.
    Deny,
}

impl Default for Effect {
    /// Defaults to `Deny` (safe default: deny unless explicitly allowed).
    fn default() -> Self {
        Self::Deny
    }
}

/// A single stored policy rule.
///
/// A rule fires when its `matcher` expression evaluates to true against an
/// authorization request. The engine combines fired rules with
/// deny-overrides semantics (see [`crate::engine::Authorizer`]), so a Deny
/// rule always wins over any number of Allow rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Stable identifier, used for auditing and trace correlation.
    pub id: String,
    /// Tenant this rule applies to, or [`TENANT_WILDCARD`] for all tenants.
    pub tenant_scope: String,
    /// Matcher expression text (see [`crate::expr`] for the grammar).
    pub matcher: String,
    /// Effect contributed when the matcher fires.
    pub effect: Effect,
}

impl PolicyRule {
    /// Creates a new rule.
    pub fn new(
        id: impl Into<String>,
        tenant_scope: impl Into<String>,
        matcher: impl Into<String>,
        effect: Effect,
    ) -> Self {
        Self {
            id: id.into(),
            tenant_scope: tenant_scope.into(),
            matcher: matcher.into(),
            effect,
        }
    }

    /// Returns true if this rule is a candidate for the given tenant.
    pub fn applies_to(&self, tenant: &str) -> bool {
        self.tenant_scope == TENANT_WILDCARD || self.tenant_scope == tenant
    }
}

// ============================================================================
// Tests
// ============================================================================
