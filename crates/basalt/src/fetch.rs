//! Attribute fetcher contracts (PIP collaborators).
//!
//! The engine never stores subject or resource attributes itself; it asks
//! these collaborators at decision time and consumes whatever they return.
//! Fetchers may block or call out to other systems; retries, timeouts, and
//! cancellation are their responsibility, not the engine's.

use crate::attributes::Attributes;
use crate::error::FetchError;

/// Supplies the attributes of a subject (the actor requesting access).
pub trait SubjectFetcher: Send + Sync {
    /// Resolves a subject key to its attributes.
    ///
    /// Must return [`FetchError::SubjectNotFound`] when the subject does not
    /// exist, so enforcement points can distinguish "unknown subject" from
    /// backend failures.
    fn subject_attributes(&self, subject_key: &str) -> Result<Attributes, FetchError>;
}

/// Supplies the attributes of a resource.
///
/// A single resource key may resolve to zero, one, or many attribute maps:
/// a composite or paginated resource yields one map per facet, and the
/// engine requires every facet to be permitted independently. An empty list
/// is a valid, non-error result.
pub trait ResourceFetcher: Send + Sync {
    /// Resolves a resource key to the attribute maps of its instances.
    fn resource_attributes(&self, resource_key: &str) -> Result<Vec<Attributes>, FetchError>;
}
