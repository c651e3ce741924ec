//! Decision tracing: configuration, collector, and the resulting trace.
//!
//! Tracing is a pure observer. The collector taps rule evaluations,
//! predicate calls, and attribute reads while a decision runs, under
//! configurable caps and redaction, and can never change the verdict. A
//! tracing fault at worst lands in the trace's `error` field.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::attributes::AttributeValue;

/// Default cap on recorded items per trace category.
pub const DEFAULT_MAX_TRACE_ITEMS: usize = 200;

/// Default maximum length of a redacted value preview, in characters.
pub const DEFAULT_PREVIEW_LIMIT: usize = 64;

/// Marker appended to previews the default redactor truncates.
const TRUNCATION_MARKER: &str = "...";

/// Engine version stamped into traces unless overridden.
pub const ENGINE_VERSION: &str = concat!("basalt/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// Trace data
// ============================================================================

/// Where a traced value came from.
///
/// A closed set: trace consumers can match exhaustively instead of parsing
/// scope strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceScope {
    /// Subject attribute read.
    Subject,
    /// Resource attribute read.
    Resource,
    /// Environment attribute read.
    Env,
    /// Predicate argument (used for redaction context only; attribute-read
    /// records never carry this scope).
    Predicate,
}

impl fmt::Display for TraceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TraceScope::Subject => "subject",
            TraceScope::Resource => "resource",
            TraceScope::Env => "env",
            TraceScope::Predicate => "predicate",
        };
        write!(f, "{name}")
    }
}

/// One rule evaluation: which rule, and whether its matcher fired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleMatch {
    /// Identifier of the evaluated rule.
    pub rule_id: String,
    /// Whether the matcher evaluated to true.
    pub matched: bool,
}

/// One predicate call with redacted, positionally-keyed arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredicateEvaluation {
    /// Predicate name as written in the matcher.
    pub name: String,
    /// Redacted previews of the arguments, in call order.
    pub arguments: Vec<String>,
    /// Boolean result (false when the predicate returned a non-boolean or
    /// failed).
    pub result: bool,
}

/// One attribute read observed during evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeAccess {
    /// Which binding the read went through.
    pub scope: TraceScope,
    /// Dotted path below the binding, e.g. `"owner.id"`.
    pub path: String,
    /// Redacted preview of the resolved value.
    pub value_preview: String,
}

/// Structured record of how one decision was reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTrace {
    /// Every rule evaluation, in order, capped per [`TraceOptions`].
    pub matched_policies: Vec<RuleMatch>,
    /// Predicate calls, capped.
    pub predicates: Vec<PredicateEvaluation>,
    /// Attribute reads, capped. Empty unless attribute tracing is enabled.
    pub attributes_evaluated: Vec<AttributeAccess>,
    /// Wall time the decision took, including fetcher calls.
    pub evaluation_duration: Duration,
    /// Version stamp of the engine that produced this trace.
    pub engine_version: String,
    /// Error message if the decision failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Options
// ============================================================================

/// Redaction callback: `(scope, path, value) -> preview`.
///
/// For predicate arguments the scope is [`TraceScope::Predicate`] and the
/// path is the predicate name.
pub type RedactorFn = Arc<dyn Fn(TraceScope, &str, &AttributeValue) -> String + Send + Sync>;

/// The default redactor: renders the value and truncates the result to
/// [`DEFAULT_PREVIEW_LIMIT`] characters, appending `...` when truncated.
pub fn default_redactor(_scope: TraceScope, _path: &str, value: &AttributeValue) -> String {
    let rendered = value.to_string();
    if rendered.chars().count() > DEFAULT_PREVIEW_LIMIT {
        let truncated: String = rendered.chars().take(DEFAULT_PREVIEW_LIMIT).collect();
        format!("{truncated}{TRUNCATION_MARKER}")
    } else {
        rendered
    }
}

/// Tracing configuration, applied additively over defaults.
///
/// ```
/// use basalt::trace::TraceOptions;
///
/// let options = TraceOptions::default()
///     .with_attribute_tracing(true)
///     .with_max_items(50);
/// ```
#[derive(Clone)]
pub struct TraceOptions {
    predicate_tracing: bool,
    attribute_tracing: bool,
    max_items_per_category: usize,
    redactor: RedactorFn,
    engine_version: String,
}

impl Default for TraceOptions {
    fn default() -> Self {
        Self {
            predicate_tracing: true,
            attribute_tracing: false,
            max_items_per_category: DEFAULT_MAX_TRACE_ITEMS,
            redactor: Arc::new(default_redactor),
            engine_version: ENGINE_VERSION.to_string(),
        }
    }
}

impl fmt::Debug for TraceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceOptions")
            .field("predicate_tracing", &self.predicate_tracing)
            .field("attribute_tracing", &self.attribute_tracing)
            .field("max_items_per_category", &self.max_items_per_category)
            .field("engine_version", &self.engine_version)
            .finish_non_exhaustive()
    }
}

impl TraceOptions {
    /// Enables or disables predicate-call tracing (default: enabled).
    pub fn with_predicate_tracing(mut self, enabled: bool) -> Self {
        self.predicate_tracing = enabled;
        self
    }

    /// Enables or disables attribute-read tracing (default: disabled).
    pub fn with_attribute_tracing(mut self, enabled: bool) -> Self {
        self.attribute_tracing = enabled;
        self
    }

    /// Caps the number of items recorded per category (default: 200).
    /// Zero disables recording entirely.
    pub fn with_max_items(mut self, max: usize) -> Self {
        self.max_items_per_category = max;
        self
    }

    /// Replaces the redactor used for value previews.
    pub fn with_redactor(mut self, redactor: RedactorFn) -> Self {
        self.redactor = redactor;
        self
    }

    /// Overrides the engine version stamped into traces.
    pub fn with_engine_version(mut self, version: impl Into<String>) -> Self {
        self.engine_version = version.into();
        self
    }
}

// ============================================================================
// Collector
// ============================================================================

/// Accumulates trace events for one decision.
///
/// Each category silently stops recording once its cap is reached; the cap
/// bounds trace payload size and is not a failure signal.
pub struct TraceCollector {
    options: TraceOptions,
    matched_policies: Vec<RuleMatch>,
    predicates: Vec<PredicateEvaluation>,
    attributes_evaluated: Vec<AttributeAccess>,
}

impl TraceCollector {
    /// Creates a collector with the given options.
    pub fn new(options: TraceOptions) -> Self {
        Self {
            options,
            matched_policies: Vec::new(),
            predicates: Vec::new(),
            attributes_evaluated: Vec::new(),
        }
    }

    fn capped(&self, len: usize) -> bool {
        len >= self.options.max_items_per_category
    }

    /// Records a rule evaluation. Always on (subject to the cap).
    pub(crate) fn on_rule_evaluated(&mut self, rule_id: &str, matched: bool) {
        if self.capped(self.matched_policies.len()) {
            return;
        }
        self.matched_policies.push(RuleMatch {
            rule_id: rule_id.to_string(),
            matched,
        });
    }

    /// Records a predicate call, if predicate tracing is enabled.
    pub(crate) fn on_predicate(&mut self, name: &str, args: &[AttributeValue], result: bool) {
        if !self.options.predicate_tracing || self.capped(self.predicates.len()) {
            return;
        }
        let arguments = args
            .iter()
            .map(|arg| (self.options.redactor)(TraceScope::Predicate, name, arg))
            .collect();
        self.predicates.push(PredicateEvaluation {
            name: name.to_string(),
            arguments,
            result,
        });
    }

    /// Records an attribute read, if attribute tracing is enabled.
    pub(crate) fn on_attribute_read(
        &mut self,
        scope: TraceScope,
        path: &str,
        value: &AttributeValue,
    ) {
        if !self.options.attribute_tracing || self.capped(self.attributes_evaluated.len()) {
            return;
        }
        self.attributes_evaluated.push(AttributeAccess {
            scope,
            path: path.to_string(),
            value_preview: (self.options.redactor)(scope, path, value),
        });
    }

    /// Consumes the collector into the final trace.
    pub(crate) fn finish(self, duration: Duration, error: Option<String>) -> DecisionTrace {
        DecisionTrace {
            matched_policies: self.matched_policies,
            predicates: self.predicates,
            attributes_evaluated: self.attributes_evaluated,
            evaluation_duration: duration,
            engine_version: self.options.engine_version,
            error,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
