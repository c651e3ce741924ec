//! Error types for the decision engine.
//!
//! The engine never converts an error into a silent ALLOW: every variant
//! surfaced from [`crate::engine::Authorizer::check`] means the request was
//! denied and the caller gets the reason. Absent or oddly-shaped nested
//! attributes are deliberately *not* errors; they evaluate to `false` so that
//! attribute schemas may drift across tenants.

use thiserror::Error;

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised by external attribute fetchers (PIPs).
///
/// `SubjectNotFound` and `ResourceNotFound` are distinguishable so that
/// enforcement points can map them onto their own not-found handling;
/// anything else from a fetcher backend travels through `Backend` verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The subject key does not resolve to any known subject.
    #[error("subject not found")]
    SubjectNotFound,

    /// The resource key does not resolve to any known resource.
    #[error("resource not found")]
    ResourceNotFound,

    /// Opaque failure in the fetcher backend.
    #[error("fetch backend error: {0}")]
    Backend(String),
}

/// Errors surfaced by the decision pipeline.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Subject attribute resolution failed. The decision is DENY.
    #[error("subject attributes error: {source}")]
    Subject {
        #[source]
        source: FetchError,
    },

    /// Resource attribute resolution failed. The decision is DENY.
    #[error("resource attributes error: {source}")]
    Resource {
        #[source]
        source: FetchError,
    },

    /// A matcher expression failed to parse. Surfaced at rule-add time
    /// (matchers are validated eagerly) or when evaluating an expression
    /// that bypassed the store.
    #[error("invalid matcher syntax in `{expression}`: {message}")]
    MatcherSyntax {
        /// The full matcher text that failed to compile.
        expression: String,
        /// What the parser rejected.
        message: String,
    },

    /// An operator or predicate received a value of the wrong shape.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// The shape the operation required.
        expected: String,
        /// The shape it actually received.
        actual: String,
    },

    /// A predicate received a syntactically invalid argument, such as an
    /// unparsable CIDR block or a malformed regular expression.
    #[error("invalid argument to `{function}`: {message}")]
    InvalidArgument {
        /// The predicate that rejected its input.
        function: String,
        /// Why the argument was rejected.
        message: String,
    },

    /// A matcher called a function that is not in the registry.
    #[error("unknown function `{0}`")]
    UnknownFunction(String),

    /// The external snapshot adapter failed during save or load.
    #[error("policy snapshot error: {0}")]
    Snapshot(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl EngineError {
    /// Builds a `TypeMismatch` from an expected shape and the offending value.
    pub(crate) fn type_mismatch(
        expected: impl Into<String>,
        actual: &crate::attributes::AttributeValue,
    ) -> Self {
        EngineError::TypeMismatch {
            expected: expected.into(),
            actual: actual.type_name().to_string(),
        }
    }
}
