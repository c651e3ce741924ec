//! The decision engine (PDP).
//!
//! [`Authorizer`] orchestrates a decision: resolve the subject's attributes,
//! assemble the environment, fetch the resource instance(s), and evaluate
//! the tenant's candidate rules against each instance.
//!
//! ## Effect algebra
//!
//! Per resource instance: a rule *fires* when its matcher evaluates true.
//! Any fired `Deny` rule denies immediately (deny-overrides); otherwise at
//! least one fired `Allow` rule allows; otherwise the instance is denied
//! (deny-by-default). Callers write matchers against exactly these
//! semantics, so they are fixed.
//!
//! ## Multi-resource aggregation
//!
//! A resource key may resolve to several attribute maps. Every instance must
//! independently evaluate to ALLOW; the first DENY (or error) is final. Zero
//! instances degenerate to a single evaluation against an empty resource
//! map.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, trace};

use crate::attributes::Attributes;
use crate::error::{EngineError, Result};
use crate::evaluator::Evaluator;
use crate::fetch::{ResourceFetcher, SubjectFetcher};
use crate::functions::FunctionRegistry;
use crate::policy::{Effect, PolicyRule};
use crate::store::PolicyStore;
use crate::trace::{DecisionTrace, TraceCollector, TraceOptions};

/// All bindings for one evaluation: one subject, one resource instance, one
/// action, one environment. Immutable once built; matchers only read it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    /// Tenant the decision runs under.
    pub tenant: String,
    /// Subject attributes, as fetched.
    pub subject: Attributes,
    /// Attributes of the resource instance under evaluation.
    pub resource: Attributes,
    /// The requested action.
    pub action: String,
    /// Environment attributes (caller-supplied plus configured defaults).
    pub env: Attributes,
}

/// The policy decision point.
///
/// Safe to share across threads; decisions may run fully in parallel with
/// each other and with policy-store reads.
pub struct Authorizer {
    store: Arc<PolicyStore>,
    evaluator: Evaluator,
    subjects: Arc<dyn SubjectFetcher>,
    resources: Arc<dyn ResourceFetcher>,
    env_defaults: Attributes,
}

impl std::fmt::Debug for Authorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authorizer")
            .field("store", &self.store)
            .field("evaluator", &self.evaluator)
            .field("env_defaults", &self.env_defaults)
            .finish_non_exhaustive()
    }
}

impl Authorizer {
    /// Creates an authorizer over a policy store, the two attribute
    /// fetchers, and a predicate registry.
    pub fn new(
        store: Arc<PolicyStore>,
        subjects: Arc<dyn SubjectFetcher>,
        resources: Arc<dyn ResourceFetcher>,
        registry: FunctionRegistry,
    ) -> Self {
        Self {
            store,
            evaluator: Evaluator::new(registry),
            subjects,
            resources,
            env_defaults: Attributes::new(),
        }
    }

    /// Configures derived environment attributes merged into every request.
    ///
    /// Defaults never override caller-supplied keys (additive only), and the
    /// engine never reads the wall clock itself, so decisions stay a pure
    /// function of their inputs.
    pub fn with_env_defaults(mut self, defaults: Attributes) -> Self {
        self.env_defaults = defaults;
        self
    }

    /// The policy store this authorizer decides against.
    pub fn store(&self) -> &PolicyStore {
        &self.store
    }

    /// Decides whether `subject_key` may perform `action` on `resource_key`
    /// within `tenant`.
    ///
    /// Returns `Ok(true)` for ALLOW, `Ok(false)` for DENY, and `Err` when
    /// attribute resolution or matcher evaluation failed, which is always a
    /// deny; no error path grants access.
    pub fn check(
        &self,
        tenant: &str,
        subject_key: &str,
        resource_key: &str,
        action: &str,
        env: Option<Attributes>,
    ) -> Result<bool> {
        self.check_inner(tenant, subject_key, resource_key, action, env, &mut None)
    }

    /// Same decision as [`check`](Self::check), instrumented with a trace
    /// collector.
    ///
    /// The trace is returned in every case; on errors it carries the error
    /// message in its `error` field. Tracing never changes the verdict:
    /// `check` and `check_with_trace` agree on identical inputs.
    pub fn check_with_trace(
        &self,
        tenant: &str,
        subject_key: &str,
        resource_key: &str,
        action: &str,
        env: Option<Attributes>,
        options: &TraceOptions,
    ) -> (Result<bool>, DecisionTrace) {
        let start = Instant::now();
        let mut collector = TraceCollector::new(options.clone());
        let verdict = self.check_inner(
            tenant,
            subject_key,
            resource_key,
            action,
            env,
            &mut Some(&mut collector),
        );
        let error = verdict.as_ref().err().map(ToString::to_string);
        let decision_trace = collector.finish(start.elapsed(), error);
        (verdict, decision_trace)
    }

    fn check_inner(
        &self,
        tenant: &str,
        subject_key: &str,
        resource_key: &str,
        action: &str,
        env: Option<Attributes>,
        collector: &mut Option<&mut TraceCollector>,
    ) -> Result<bool> {
        let subject = self
            .subjects
            .subject_attributes(subject_key)
            .map_err(|source| EngineError::Subject { source })?;

        let mut env = env.unwrap_or_default();
        for (key, value) in &self.env_defaults {
            env.entry(key.clone()).or_insert_with(|| value.clone());
        }

        let instances = self
            .resources
            .resource_attributes(resource_key)
            .map_err(|source| EngineError::Resource { source })?;

        // One consistent view of the rule set for the whole decision.
        let candidates = self.store.candidates_for(tenant);

        let allowed = if instances.is_empty() {
            // Degenerate case: check the action against no resource data.
            let request = AuthorizationRequest {
                tenant: tenant.to_string(),
                subject,
                resource: Attributes::new(),
                action: action.to_string(),
                env,
            };
            self.evaluate_instance(&candidates, &request, collector)?
        } else {
            let mut all_allowed = true;
            for resource in instances {
                let request = AuthorizationRequest {
                    tenant: tenant.to_string(),
                    subject: subject.clone(),
                    resource,
                    action: action.to_string(),
                    env: env.clone(),
                };
                if !self.evaluate_instance(&candidates, &request, collector)? {
                    all_allowed = false;
                    break;
                }
            }
            all_allowed
        };

        debug!(
            tenant,
            subject = subject_key,
            resource = resource_key,
            action,
            allowed,
            "access decision"
        );
        Ok(allowed)
    }

    /// Evaluates one resource instance under the effect algebra.
    fn evaluate_instance(
        &self,
        candidates: &[PolicyRule],
        request: &AuthorizationRequest,
        collector: &mut Option<&mut TraceCollector>,
    ) -> Result<bool> {
        let mut allowed = false;
        for rule in candidates {
            let matched = self
                .evaluator
                .evaluate_matcher(&rule.matcher, request, collector)?;
            if let Some(c) = collector.as_deref_mut() {
                c.on_rule_evaluated(&rule.id, matched);
            }
            trace!(rule = %rule.id, matched, "rule evaluated");
            if matched {
                match rule.effect {
                    // Deny-overrides: the first fired Deny is final.
                    Effect::Deny => return Ok(false),
                    Effect::Allow => allowed = true,
                }
            }
        }
        // Deny-by-default when nothing fired.
        Ok(allowed)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::AttributeValue;
    use crate::error::FetchError;
    use crate::policy::TENANT_WILDCARD;

    fn attrs(pairs: &[(&str, AttributeValue)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    struct StaticSubjects;

    impl SubjectFetcher for StaticSubjects {
        fn subject_attributes(
            &self,
            subject_key: &str,
        ) -> std::result::Result<Attributes, FetchError> {
            match subject_key {
                "alice" => Ok(attrs(&[
                    ("role", "hr_manager".into()),
                    ("tenant", "t1".into()),
                ])),
                "bob" => Ok(attrs(&[("role", "staff".into()), ("tenant", "t1".into())])),
                _ => Err(FetchError::SubjectNotFound),
            }
        }
    }

    struct StaticResources;

    impl ResourceFetcher for StaticResources {
        fn resource_attributes(
            &self,
            resource_key: &str,
        ) -> std::result::Result<Vec<Attributes>, FetchError> {
            match resource_key {
                "doc-t1" => Ok(vec![attrs(&[("tenant", "t1".into())])]),
                "doc-t2" => Ok(vec![attrs(&[("tenant", "t2".into())])]),
                "composite" => Ok(vec![
                    attrs(&[("dept", "eng".into())]),
                    attrs(&[("dept", "sales".into())]),
                ]),
                "empty" => Ok(vec![]),
                "broken" => Err(FetchError::Backend("resource backend down".to_string())),
                _ => Err(FetchError::ResourceNotFound),
            }
        }
    }

    fn authorizer(rules: &[PolicyRule]) -> Authorizer {
        let store = Arc::new(PolicyStore::new());
        store.add_rules(rules).expect("test rules must be valid");
        Authorizer::new(
            store,
            Arc::new(StaticSubjects),
            Arc::new(StaticResources),
            FunctionRegistry::with_builtins(),
        )
    }

    fn hr_allow_rule() -> PolicyRule {
        PolicyRule::new(
            "hr-approve",
            TENANT_WILDCARD,
            r#"Subject.role == "hr_manager" && Subject.tenant == "t1" && Resource.tenant == "t1""#,
            Effect::Allow,
        )
    }

    #[test]
    fn allows_when_rule_fires() {
        let engine = authorizer(&[hr_allow_rule()]);
        assert!(engine.check("t1", "alice", "doc-t1", "approve", None).unwrap());
    }

    #[test]
    fn denies_by_default_when_no_rule_fires() {
        let engine = authorizer(&[hr_allow_rule()]);
        // Resource belongs to t2, so the matcher does not fire.
        assert!(!engine.check("t1", "alice", "doc-t2", "approve", None).unwrap());
        // Wrong role.
        assert!(!engine.check("t1", "bob", "doc-t1", "approve", None).unwrap());
    }

    #[test]
    fn denies_on_empty_rule_set_without_error() {
        let engine = authorizer(&[]);
        assert!(!engine.check("t1", "alice", "doc-t1", "approve", None).unwrap());
    }

    #[test]
    fn deny_overrides_allow() {
        let matcher = r#"Subject.role == "hr_manager""#;
        let engine = authorizer(&[
            PolicyRule::new("allow", TENANT_WILDCARD, matcher, Effect::Allow),
            PolicyRule::new("deny", TENANT_WILDCARD, matcher, Effect::Deny),
        ]);
        assert!(!engine.check("t1", "alice", "doc-t1", "approve", None).unwrap());
    }

    #[test]
    fn tenant_scoping_filters_candidates() {
        let engine = authorizer(&[PolicyRule::new(
            "t2-wide-open",
            "t2",
            "true",
            Effect::Allow,
        )]);
        // The only allow rule is scoped to t2; a t1 decision must not see it.
        assert!(!engine.check("t1", "alice", "doc-t1", "read", None).unwrap());
        assert!(engine.check("t2", "alice", "doc-t1", "read", None).unwrap());
    }

    #[test]
    fn unknown_subject_is_a_subject_error() {
        let engine = authorizer(&[hr_allow_rule()]);
        let err = engine.check("t1", "ghost", "doc-t1", "approve", None).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Subject { source: FetchError::SubjectNotFound }
        ));
    }

    #[test]
    fn resource_fetch_failures_propagate() {
        let engine = authorizer(&[hr_allow_rule()]);
        let err = engine.check("t1", "alice", "broken", "approve", None).unwrap_err();
        assert!(matches!(err, EngineError::Resource { .. }));
    }

    #[test]
    fn multi_resource_requires_all_instances_to_allow() {
        let engine = authorizer(&[PolicyRule::new(
            "eng-only",
            TENANT_WILDCARD,
            r#"Resource.dept == "eng""#,
            Effect::Allow,
        )]);
        // "composite" resolves to [eng, sales]; sales denies, so overall DENY.
        assert!(!engine.check("t1", "alice", "composite", "read", None).unwrap());
    }

    #[test]
    fn multi_resource_allows_when_every_instance_allows() {
        let engine = authorizer(&[PolicyRule::new(
            "any-dept",
            TENANT_WILDCARD,
            r#"Resource.dept != "forbidden""#,
            Effect::Allow,
        )]);
        assert!(engine.check("t1", "alice", "composite", "read", None).unwrap());
    }

    #[test]
    fn zero_resource_instances_evaluate_against_empty_map() {
        let engine = authorizer(&[PolicyRule::new(
            "action-only",
            TENANT_WILDCARD,
            r#"Action == "list" && Subject.role == "hr_manager""#,
            Effect::Allow,
        )]);
        assert!(engine.check("t1", "alice", "empty", "list", None).unwrap());
        assert!(!engine.check("t1", "alice", "empty", "delete", None).unwrap());
    }

    #[test]
    fn env_attributes_reach_matchers() {
        let engine = authorizer(&[PolicyRule::new(
            "office-hours",
            TENANT_WILDCARD,
            "isBusinessHours(Env.hour, 9, 17)",
            Effect::Allow,
        )]);
        let day = attrs(&[("hour", 10.into())]);
        let night = attrs(&[("hour", 20.into())]);
        assert!(engine.check("t1", "alice", "doc-t1", "read", Some(day)).unwrap());
        assert!(!engine.check("t1", "alice", "doc-t1", "read", Some(night)).unwrap());
    }

    #[test]
    fn env_defaults_are_additive_only() {
        let engine = authorizer(&[PolicyRule::new(
            "channel-gate",
            TENANT_WILDCARD,
            r#"Env.channel == "internal""#,
            Effect::Allow,
        )])
        .with_env_defaults(attrs(&[("channel", "internal".into())]));

        // Default applies when the caller supplies nothing.
        assert!(engine.check("t1", "alice", "doc-t1", "read", None).unwrap());

        // A caller-supplied key must never be overwritten by a default.
        let external = attrs(&[("channel", "external".into())]);
        assert!(!engine.check("t1", "alice", "doc-t1", "read", Some(external)).unwrap());
    }

    #[test]
    fn evaluation_errors_deny_with_error() {
        let engine = authorizer(&[PolicyRule::new(
            "bad-types",
            TENANT_WILDCARD,
            r#"has(Subject.role, "x")"#,
            Effect::Allow,
        )]);
        let err = engine.check("t1", "alice", "doc-t1", "read", None).unwrap_err();
        assert!(matches!(err, EngineError::TypeMismatch { .. }));
    }

    #[test]
    fn traced_and_untraced_verdicts_agree() {
        let engine = authorizer(&[hr_allow_rule()]);
        for (subject, resource) in [("alice", "doc-t1"), ("alice", "doc-t2"), ("bob", "doc-t1")] {
            let plain = engine.check("t1", subject, resource, "approve", None).unwrap();
            let (traced, _) = engine.check_with_trace(
                "t1",
                subject,
                resource,
                "approve",
                None,
                &TraceOptions::default(),
            );
            assert_eq!(plain, traced.unwrap(), "verdicts diverged for {subject}/{resource}");
        }
    }

    #[test]
    fn trace_records_rule_matches() {
        let engine = authorizer(&[
            hr_allow_rule(),
            PolicyRule::new("never", TENANT_WILDCARD, "false", Effect::Deny),
        ]);
        let (verdict, decision_trace) = engine.check_with_trace(
            "t1",
            "alice",
            "doc-t1",
            "approve",
            None,
            &TraceOptions::default(),
        );
        assert!(verdict.unwrap());
        let matches: Vec<(&str, bool)> = decision_trace
            .matched_policies
            .iter()
            .map(|m| (m.rule_id.as_str(), m.matched))
            .collect();
        assert_eq!(matches, vec![("hr-approve", true), ("never", false)]);
        assert_eq!(decision_trace.engine_version, crate::trace::ENGINE_VERSION);
        assert!(decision_trace.error.is_none());
    }

    #[test]
    fn trace_is_returned_even_on_error() {
        let engine = authorizer(&[hr_allow_rule()]);
        let (verdict, decision_trace) = engine.check_with_trace(
            "t1",
            "ghost",
            "doc-t1",
            "approve",
            None,
            &TraceOptions::default(),
        );
        assert!(verdict.is_err());
        let message = decision_trace.error.expect("trace must carry the error");
        assert!(message.contains("subject"), "message: {message}");
    }
}
