//! Matcher evaluation against a request's bindings.
//!
//! The evaluator compiles matcher text into an AST, caches the compiled form
//! by the literal text, and evaluates it against the four bindings
//! (`Subject`, `Resource`, `Action`, `Env`) plus the function registry.
//! Evaluation is read-only over the request; the only observable side
//! channel is the optional trace collector.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::attributes::AttributeValue;
use crate::engine::AuthorizationRequest;
use crate::error::{EngineError, Result};
use crate::expr::{self, BinOp, Binding, Expr, Literal};
use crate::functions::FunctionRegistry;
use crate::trace::{TraceCollector, TraceScope};

/// Compiles and evaluates matcher expressions.
///
/// Compilation is idempotent and cached by the literal expression text; the
/// cache is purely a performance optimization. Concurrent compilation of the
/// same text may race and duplicate work, which is harmless: both results
/// are equivalent.
pub struct Evaluator {
    registry: FunctionRegistry,
    cache: RwLock<HashMap<String, Arc<Expr>>>,
}

impl std::fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evaluator")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Evaluator {
    /// Creates an evaluator over the given function registry.
    pub fn new(registry: FunctionRegistry) -> Self {
        Self {
            registry,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Compiles matcher text, reusing the cached form when available.
    fn compile(&self, text: &str) -> Result<Arc<Expr>> {
        if let Some(compiled) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(text)
        {
            return Ok(Arc::clone(compiled));
        }
        let compiled = Arc::new(expr::parse(text)?);
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(text.to_string(), Arc::clone(&compiled));
        Ok(compiled)
    }

    /// Evaluates a matcher against a request, requiring a boolean result.
    pub(crate) fn evaluate_matcher(
        &self,
        text: &str,
        request: &AuthorizationRequest,
        trace: &mut Option<&mut TraceCollector>,
    ) -> Result<bool> {
        let compiled = self.compile(text)?;
        let value = self.eval(&compiled, request, trace)?;
        value
            .as_bool()
            .ok_or_else(|| EngineError::type_mismatch("bool (matcher result)", &value))
    }

    fn eval(
        &self,
        expr: &Expr,
        request: &AuthorizationRequest,
        trace: &mut Option<&mut TraceCollector>,
    ) -> Result<AttributeValue> {
        match expr {
            Expr::Literal(lit) => Ok(match lit {
                Literal::Number(n) => AttributeValue::Number(*n),
                Literal::Str(s) => AttributeValue::String(s.clone()),
                Literal::Bool(b) => AttributeValue::Bool(*b),
            }),
            Expr::Path { root, segments } => Ok(resolve_path(request, *root, segments, trace)),
            Expr::Not(inner) => {
                let value = self.eval(inner, request, trace)?;
                let b = value
                    .as_bool()
                    .ok_or_else(|| EngineError::type_mismatch("bool (operand of `!`)", &value))?;
                Ok(AttributeValue::Bool(!b))
            }
            Expr::BinOp { op, left, right } => self.eval_binop(*op, left, right, request, trace),
            Expr::Call { name, args } => self.eval_call(name, args, request, trace),
        }
    }

    fn eval_binop(
        &self,
        op: BinOp,
        left: &Expr,
        right: &Expr,
        request: &AuthorizationRequest,
        trace: &mut Option<&mut TraceCollector>,
    ) -> Result<AttributeValue> {
        // && and || short-circuit: the right operand is not evaluated (and
        // produces no trace events) when the left side decides the result.
        if matches!(op, BinOp::And | BinOp::Or) {
            let lhs = self.eval(left, request, trace)?;
            let l = lhs
                .as_bool()
                .ok_or_else(|| EngineError::type_mismatch("bool (logical operand)", &lhs))?;
            match (op, l) {
                (BinOp::And, false) => return Ok(AttributeValue::Bool(false)),
                (BinOp::Or, true) => return Ok(AttributeValue::Bool(true)),
                _ => {}
            }
            let rhs = self.eval(right, request, trace)?;
            let r = rhs
                .as_bool()
                .ok_or_else(|| EngineError::type_mismatch("bool (logical operand)", &rhs))?;
            return Ok(AttributeValue::Bool(r));
        }

        let lhs = self.eval(left, request, trace)?;
        let rhs = self.eval(right, request, trace)?;
        match op {
            BinOp::Eq => Ok(AttributeValue::Bool(lhs == rhs)),
            BinOp::Ne => Ok(AttributeValue::Bool(lhs != rhs)),
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => compare_ordered(op, &lhs, &rhs),
            BinOp::And | BinOp::Or => unreachable!("handled above"),
        }
    }

    fn eval_call(
        &self,
        name: &str,
        args: &[Expr],
        request: &AuthorizationRequest,
        trace: &mut Option<&mut TraceCollector>,
    ) -> Result<AttributeValue> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg, request, trace)?);
        }

        let function = self
            .registry
            .get(name)
            .ok_or_else(|| EngineError::UnknownFunction(name.to_string()))?;
        let result = function(&values);

        if let Some(collector) = trace.as_deref_mut() {
            // Best-effort boolean: errors and non-boolean results record as
            // false, matching the shape of the trace schema.
            let as_bool = result
                .as_ref()
                .ok()
                .and_then(AttributeValue::as_bool)
                .unwrap_or(false);
            collector.on_predicate(name, &values, as_bool);
        }
        result
    }
}

/// Resolves a binding path against the request.
///
/// Missing keys and traversal through non-map values resolve to `Null`
/// rather than erroring, so heterogeneous attribute shapes across tenants
/// stay tolerable (lenient-miss).
fn resolve_path(
    request: &AuthorizationRequest,
    root: Binding,
    segments: &[String],
    trace: &mut Option<&mut TraceCollector>,
) -> AttributeValue {
    let (map, scope) = match root {
        Binding::Action => {
            // `Action` is a plain string; any nested access on it misses.
            if segments.is_empty() {
                return AttributeValue::String(request.action.clone());
            }
            return AttributeValue::Null;
        }
        Binding::Subject => (&request.subject, TraceScope::Subject),
        Binding::Resource => (&request.resource, TraceScope::Resource),
        Binding::Env => (&request.env, TraceScope::Env),
    };

    if segments.is_empty() {
        // The whole binding, e.g. `hasGlobalRole(Subject, "auditor")`.
        return AttributeValue::Map(map.clone());
    }

    let resolved = lookup(map.get(&segments[0]), &segments[1..]);
    if let Some(collector) = trace.as_deref_mut() {
        collector.on_attribute_read(scope, &segments.join("."), &resolved);
    }
    resolved
}

fn lookup(start: Option<&AttributeValue>, rest: &[String]) -> AttributeValue {
    let Some(mut current) = start else {
        return AttributeValue::Null;
    };
    for segment in rest {
        match current.as_map().and_then(|m| m.get(segment)) {
            Some(next) => current = next,
            None => return AttributeValue::Null,
        }
    }
    current.clone()
}

/// Ordering comparison: number-to-number and string-to-string
/// (lexicographic) compare; anything else is a type mismatch.
fn compare_ordered(op: BinOp, lhs: &AttributeValue, rhs: &AttributeValue) -> Result<AttributeValue> {
    let result = match (lhs, rhs) {
        (AttributeValue::Number(a), AttributeValue::Number(b)) => match op {
            BinOp::Lt => a < b,
            BinOp::Le => a <= b,
            BinOp::Gt => a > b,
            BinOp::Ge => a >= b,
            _ => unreachable!("caller dispatches ordering ops only"),
        },
        (AttributeValue::String(a), AttributeValue::String(b)) => match op {
            BinOp::Lt => a < b,
            BinOp::Le => a <= b,
            BinOp::Gt => a > b,
            BinOp::Ge => a >= b,
            _ => unreachable!("caller dispatches ordering ops only"),
        },
        _ => {
            return Err(EngineError::TypeMismatch {
                expected: "two numbers or two strings".to_string(),
                actual: format!("{} and {}", lhs.type_name(), rhs.type_name()),
            });
        }
    };
    Ok(AttributeValue::Bool(result))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::Attributes;

    fn attrs(pairs: &[(&str, AttributeValue)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    fn request() -> AuthorizationRequest {
        AuthorizationRequest {
            tenant: "t1".to_string(),
            subject: attrs(&[
                ("role", "hr_manager".into()),
                ("tenant", "t1".into()),
                (
                    "roles",
                    AttributeValue::List(vec!["editor".into(), "admin".into()]),
                ),
                (
                    "profile",
                    AttributeValue::Map(attrs(&[("level", 3.into())])),
                ),
            ]),
            resource: attrs(&[("tenant", "t1".into()), ("dept", "eng".into())]),
            action: "approve_level_2".to_string(),
            env: attrs(&[("hour", 10.into()), ("ip", "10.1.2.3".into())]),
        }
    }

    fn eval_bool(matcher: &str) -> Result<bool> {
        let evaluator = Evaluator::new(FunctionRegistry::with_builtins());
        evaluator.evaluate_matcher(matcher, &request(), &mut None)
    }

    #[test]
    fn evaluates_field_comparisons() {
        assert!(eval_bool(r#"Subject.role == "hr_manager""#).unwrap());
        assert!(!eval_bool(r#"Subject.role == "staff""#).unwrap());
        assert!(eval_bool(r#"Subject.tenant == Resource.tenant"#).unwrap());
        assert!(eval_bool(r#"Subject.role != Resource.dept"#).unwrap());
    }

    #[test]
    fn evaluates_action_binding() {
        assert!(eval_bool(r#"Action == "approve_level_2""#).unwrap());
        assert!(!eval_bool(r#"Action == "delete""#).unwrap());
    }

    #[test]
    fn evaluates_numeric_ordering() {
        assert!(eval_bool("Env.hour >= 9 && Env.hour < 17").unwrap());
        assert!(!eval_bool("Env.hour > 10").unwrap());
        assert!(eval_bool("Subject.profile.level >= 3").unwrap());
    }

    #[test]
    fn evaluates_string_ordering() {
        assert!(eval_bool(r#"Resource.dept < "hr""#).unwrap());
        assert!(eval_bool(r#"Resource.dept >= "eng""#).unwrap());
    }

    #[test]
    fn mixed_type_ordering_is_an_error() {
        let err = eval_bool(r#"Env.hour > "nine""#).unwrap_err();
        assert!(matches!(err, EngineError::TypeMismatch { .. }));
    }

    #[test]
    fn missing_attributes_resolve_to_null_not_error() {
        assert!(!eval_bool(r#"Subject.department == "hr""#).unwrap());
        assert!(eval_bool(r#"Subject.department != "hr""#).unwrap());
        // Traversal through a non-map also misses leniently.
        assert!(!eval_bool(r#"Subject.role.nested == "x""#).unwrap());
    }

    #[test]
    fn calls_builtin_predicates() {
        assert!(eval_bool(r#"has(Subject.roles, "admin")"#).unwrap());
        assert!(!eval_bool(r#"has(Subject.roles, "owner")"#).unwrap());
        assert!(eval_bool("isBusinessHours(Env.hour, 9, 17)").unwrap());
        assert!(eval_bool(r#"isIpInCidr(Env.ip, "10.0.0.0/8")"#).unwrap());
    }

    #[test]
    fn unknown_function_is_an_error() {
        let err = eval_bool("nope(Subject.role)").unwrap_err();
        assert!(matches!(err, EngineError::UnknownFunction(name) if name == "nope"));
    }

    #[test]
    fn non_boolean_matcher_result_is_an_error() {
        let err = eval_bool("Subject.role").unwrap_err();
        assert!(matches!(err, EngineError::TypeMismatch { .. }));
    }

    #[test]
    fn logical_operators_require_booleans() {
        let err = eval_bool("Subject.role && true").unwrap_err();
        assert!(matches!(err, EngineError::TypeMismatch { .. }));
    }

    #[test]
    fn and_short_circuits() {
        // The right side would error (has on a string), but the left side
        // already decides the result.
        assert!(!eval_bool(r#"Subject.role == "staff" && has(Subject.role, "x")"#).unwrap());
    }

    #[test]
    fn or_short_circuits() {
        assert!(eval_bool(r#"Subject.role == "hr_manager" || has(Subject.role, "x")"#).unwrap());
    }

    #[test]
    fn not_inverts() {
        assert!(eval_bool(r#"!(Subject.role == "staff")"#).unwrap());
    }

    #[test]
    fn whole_binding_passes_to_predicates() {
        let mut registry = FunctionRegistry::with_builtins();
        registry.register_fn("isHr", |args: &[AttributeValue]| {
            let role = args[0]
                .as_map()
                .and_then(|m| m.get("role"))
                .and_then(AttributeValue::as_str);
            Ok(AttributeValue::Bool(role == Some("hr_manager")))
        });
        let evaluator = Evaluator::new(registry);
        assert!(evaluator
            .evaluate_matcher("isHr(Subject)", &request(), &mut None)
            .unwrap());
    }

    #[test]
    fn compilation_is_cached_and_equivalent() {
        let evaluator = Evaluator::new(FunctionRegistry::with_builtins());
        let matcher = r#"Subject.role == "hr_manager""#;
        let first = evaluator.compile(matcher).unwrap();
        let second = evaluator.compile(matcher).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        // The cached form evaluates identically to a fresh parse.
        let fresh = expr::parse(matcher).unwrap();
        assert_eq!(*first, fresh);
    }

    #[test]
    fn syntax_errors_surface_at_compile_time() {
        let err = eval_bool("Subject.role ==").unwrap_err();
        assert!(matches!(err, EngineError::MatcherSyntax { .. }));
    }

    #[test]
    fn trace_records_predicates_and_attribute_reads() {
        use crate::trace::TraceOptions;

        let evaluator = Evaluator::new(FunctionRegistry::with_builtins());
        let mut collector =
            TraceCollector::new(TraceOptions::default().with_attribute_tracing(true));
        let verdict = evaluator
            .evaluate_matcher(
                r#"has(Subject.roles, "admin") && Env.hour < 17"#,
                &request(),
                &mut Some(&mut collector),
            )
            .unwrap();
        assert!(verdict);

        let trace = collector.finish(std::time::Duration::ZERO, None);
        assert_eq!(trace.predicates.len(), 1);
        assert_eq!(trace.predicates[0].name, "has");
        assert!(trace.predicates[0].result);
        assert_eq!(trace.predicates[0].arguments.len(), 2);

        let paths: Vec<&str> = trace
            .attributes_evaluated
            .iter()
            .map(|a| a.path.as_str())
            .collect();
        assert_eq!(paths, vec!["roles", "hour"]);
    }

    #[test]
    fn tracing_does_not_change_the_verdict() {
        use crate::trace::TraceOptions;

        let evaluator = Evaluator::new(FunctionRegistry::with_builtins());
        let matcher = r#"has(Subject.roles, "admin") && isBusinessHours(Env.hour, 9, 17)"#;
        let plain = evaluator
            .evaluate_matcher(matcher, &request(), &mut None)
            .unwrap();

        let mut collector =
            TraceCollector::new(TraceOptions::default().with_attribute_tracing(true));
        let traced = evaluator
            .evaluate_matcher(matcher, &request(), &mut Some(&mut collector))
            .unwrap();
        assert_eq!(plain, traced);
    }
}
