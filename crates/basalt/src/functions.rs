//! Predicate function registry and built-in predicates.
//!
//! Matchers call predicates by name: `has(Subject.roles, "admin")`. The
//! registry maps each name to a native function over [`AttributeValue`]
//! arguments. It is a plain value owned by the engine instance; there is no
//! process-wide registry, and caller-supplied functions may shadow built-ins
//! (last registration wins; no built-in is privileged).

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use ipnet::IpNet;
use regex::Regex;

use crate::attributes::AttributeValue;
use crate::error::{EngineError, Result};

/// A native predicate callable from matcher expressions.
pub type PredicateFn = Arc<dyn Fn(&[AttributeValue]) -> Result<AttributeValue> + Send + Sync>;

/// Maps predicate names to native functions.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, PredicateFn>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("FunctionRegistry")
            .field("functions", &names)
            .finish()
    }
}

impl FunctionRegistry {
    /// Creates an empty registry with no predicates at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a registry preloaded with the built-in predicates:
    /// `has`, `intersects`, `isIpInCidr`, `matches`, `isBusinessHours`,
    /// `hasGlobalRole`, `hasTenantRole`, and `hasOrgRole`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register_fn("has", has);
        registry.register_fn("intersects", intersects);
        registry.register_fn("isIpInCidr", is_ip_in_cidr);
        registry.register_fn("matches", matches_pattern);
        registry.register_fn("isBusinessHours", is_business_hours);
        registry.register_fn("hasGlobalRole", has_global_role);
        registry.register_fn("hasTenantRole", has_tenant_role);
        registry.register_fn("hasOrgRole", has_org_role);
        registry
    }

    /// Registers a predicate under `name`, replacing any existing entry of
    /// the same name.
    pub fn register(&mut self, name: impl Into<String>, function: PredicateFn) {
        self.functions.insert(name.into(), function);
    }

    /// Convenience wrapper around [`register`](Self::register) for plain
    /// closures and fn items.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(&[AttributeValue]) -> Result<AttributeValue> + Send + Sync + 'static,
    {
        self.register(name, Arc::new(function));
    }

    /// Looks up a predicate by name.
    pub fn get(&self, name: &str) -> Option<&PredicateFn> {
        self.functions.get(name)
    }

    /// Returns true if a predicate with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Iterates over the registered predicate names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }
}

// ============================================================================
// Argument helpers
// ============================================================================

fn expect_arity(function: &str, args: &[AttributeValue], want: usize) -> Result<()> {
    if args.len() == want {
        Ok(())
    } else {
        Err(EngineError::InvalidArgument {
            function: function.to_string(),
            message: format!("expected {want} arguments, got {}", args.len()),
        })
    }
}

fn expect_list(value: &AttributeValue) -> Result<&[AttributeValue]> {
    value
        .as_list()
        .ok_or_else(|| EngineError::type_mismatch("list", value))
}

fn expect_string(value: &AttributeValue) -> Result<&str> {
    value
        .as_str()
        .ok_or_else(|| EngineError::type_mismatch("string", value))
}

fn expect_number(value: &AttributeValue) -> Result<f64> {
    value
        .as_number()
        .ok_or_else(|| EngineError::type_mismatch("number", value))
}

// ============================================================================
// Built-in predicates
// ============================================================================

/// `has(list, value)`: true iff `value` structurally equals some element of
/// `list`.
fn has(args: &[AttributeValue]) -> Result<AttributeValue> {
    expect_arity("has", args, 2)?;
    let list = expect_list(&args[0])?;
    Ok(AttributeValue::Bool(list.contains(&args[1])))
}

/// `intersects(a, b)`: true iff the two lists share at least one
/// structurally-equal element.
fn intersects(args: &[AttributeValue]) -> Result<AttributeValue> {
    expect_arity("intersects", args, 2)?;
    let a = expect_list(&args[0])?;
    let b = expect_list(&args[1])?;
    Ok(AttributeValue::Bool(a.iter().any(|x| b.contains(x))))
}

/// `isIpInCidr(ip, cidr)`: true iff `ip` parses and lies inside `cidr`.
///
/// An unparsable `ip` is an attribute-quality problem and resolves to
/// `false`; an unparsable `cidr` is a policy-authoring problem and is an
/// error.
fn is_ip_in_cidr(args: &[AttributeValue]) -> Result<AttributeValue> {
    expect_arity("isIpInCidr", args, 2)?;
    let ip_str = expect_string(&args[0])?;
    let cidr_str = expect_string(&args[1])?;

    let network: IpNet = cidr_str.parse().map_err(|_| EngineError::InvalidArgument {
        function: "isIpInCidr".to_string(),
        message: format!("bad CIDR `{cidr_str}`"),
    })?;
    let Ok(ip) = ip_str.parse::<IpAddr>() else {
        return Ok(AttributeValue::Bool(false));
    };
    Ok(AttributeValue::Bool(network.contains(&ip)))
}

/// `matches(text, pattern)`: true iff the regular expression `pattern`
/// matches `text`. An invalid pattern is an error.
fn matches_pattern(args: &[AttributeValue]) -> Result<AttributeValue> {
    expect_arity("matches", args, 2)?;
    let text = expect_string(&args[0])?;
    let pattern = expect_string(&args[1])?;

    let re = Regex::new(pattern).map_err(|e| EngineError::InvalidArgument {
        function: "matches".to_string(),
        message: format!("bad pattern `{pattern}`: {e}"),
    })?;
    Ok(AttributeValue::Bool(re.is_match(text)))
}

/// `isBusinessHours(current, start, end)`: true iff
/// `start <= current < end` (half-open).
///
/// The caller supplies the hour values; the engine never reads the wall
/// clock, so decisions stay deterministic.
fn is_business_hours(args: &[AttributeValue]) -> Result<AttributeValue> {
    expect_arity("isBusinessHours", args, 3)?;
    let current = expect_number(&args[0])?;
    let start = expect_number(&args[1])?;
    let end = expect_number(&args[2])?;
    Ok(AttributeValue::Bool(start <= current && current < end))
}

/// `hasGlobalRole(subject, role)`: true iff `subject.global_roles` is a list
/// containing the string `role`. An absent or mis-typed `global_roles` field
/// resolves to `false` (lenient miss).
fn has_global_role(args: &[AttributeValue]) -> Result<AttributeValue> {
    expect_arity("hasGlobalRole", args, 2)?;
    let role = expect_string(&args[1])?;

    let found = args[0]
        .as_map()
        .and_then(|subject| subject.get("global_roles"))
        .and_then(AttributeValue::as_list)
        .is_some_and(|roles| roles.iter().any(|r| r.as_str() == Some(role)));
    Ok(AttributeValue::Bool(found))
}

/// `hasTenantRole(subject, tenant_id, role)`: true iff some entry of
/// `subject.tenants` is a map with `id == tenant_id` and `role == role`.
fn has_tenant_role(args: &[AttributeValue]) -> Result<AttributeValue> {
    expect_arity("hasTenantRole", args, 3)?;
    let tenant_id = expect_string(&args[1])?;
    let role = expect_string(&args[2])?;

    let found = tenant_entries(&args[0])
        .is_some_and(|tenants| tenants.iter().any(|t| entry_matches(t, tenant_id, role)));
    Ok(AttributeValue::Bool(found))
}

/// `hasOrgRole(subject, org_id, role)`: true iff some tenant entry's
/// `organizations` list contains a map with matching `id` and `role`.
fn has_org_role(args: &[AttributeValue]) -> Result<AttributeValue> {
    expect_arity("hasOrgRole", args, 3)?;
    let org_id = expect_string(&args[1])?;
    let role = expect_string(&args[2])?;

    let found = tenant_entries(&args[0]).is_some_and(|tenants| {
        tenants.iter().any(|tenant| {
            tenant
                .as_map()
                .and_then(|t| t.get("organizations"))
                .and_then(AttributeValue::as_list)
                .is_some_and(|orgs| orgs.iter().any(|o| entry_matches(o, org_id, role)))
        })
    });
    Ok(AttributeValue::Bool(found))
}

/// Resolves `subject.tenants` as a list, leniently.
fn tenant_entries(subject: &AttributeValue) -> Option<&[AttributeValue]> {
    subject
        .as_map()
        .and_then(|s| s.get("tenants"))
        .and_then(AttributeValue::as_list)
}

/// True iff `entry` is a map with string fields `id == id` and
/// `role == role`.
fn entry_matches(entry: &AttributeValue, id: &str, role: &str) -> bool {
    entry.as_map().is_some_and(|m| {
        m.get("id").and_then(AttributeValue::as_str) == Some(id)
            && m.get("role").and_then(AttributeValue::as_str) == Some(role)
    })
}

// ============================================================================
// Tests
// ============================================================================
