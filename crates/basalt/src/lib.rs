//! # basalt: Attribute-Based Access Control
//!
//! A decision engine for attribute-based access control: given a subject, a
//! resource, an action, and environment context, it evaluates stored boolean
//! policy expressions and renders ALLOW or DENY, optionally with a
//! structured trace of how the decision was reached.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  check(tenant, subject, resource, action)    │
//! └─────────────────┬────────────────────────────┘
//!                   │
//!                   ▼
//! ┌──────────────────────────────────────────────┐
//! │  Authorizer (PDP)                            │
//! │  ├─ Resolve attributes via fetchers (PIP)    │
//! │  ├─ Candidate rules from PolicyStore (PAP)   │
//! │  ├─ Evaluate matchers per resource instance  │
//! │  └─ Combine effects: deny-overrides          │
//! └─────────────────┬────────────────────────────┘
//!                   │
//!                   ▼
//! ┌──────────────────────────────────────────────┐
//! │  Verdict (ALLOW / DENY)                      │
//! │  + optional DecisionTrace                    │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Decision semantics
//!
//! - **Deny-overrides**: any fired `Deny` rule wins over any `Allow`.
//! - **Deny-by-default**: no fired rule means DENY, not an error.
//! - **Multi-resource AND**: when a resource key resolves to several
//!   attribute maps, every one must be permitted independently.
//! - **Errors deny**: a fetcher or evaluation error is surfaced to the
//!   caller and the request is denied; no error path grants access.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use basalt::{
//!     Attributes, AttributeValue, Authorizer, Effect, FetchError, FunctionRegistry,
//!     PolicyRule, PolicyStore, ResourceFetcher, SubjectFetcher, TENANT_WILDCARD,
//! };
//!
//! struct Directory;
//!
//! impl SubjectFetcher for Directory {
//!     fn subject_attributes(&self, key: &str) -> Result<Attributes, FetchError> {
//!         match key {
//!             "alice" => Ok(Attributes::from([
//!                 ("role".to_string(), AttributeValue::from("hr_manager")),
//!                 ("tenant".to_string(), AttributeValue::from("t1")),
//!             ])),
//!             _ => Err(FetchError::SubjectNotFound),
//!         }
//!     }
//! }
//!
//! struct Documents;
//!
//! impl ResourceFetcher for Documents {
//!     fn resource_attributes(&self, _key: &str) -> Result<Vec<Attributes>, FetchError> {
//!         Ok(vec![Attributes::from([
//!             ("tenant".to_string(), AttributeValue::from("t1")),
//!         ])])
//!     }
//! }
//!
//! let store = Arc::new(PolicyStore::new());
//! store.add_rule(&PolicyRule::new(
//!     "hr-approve",
//!     TENANT_WILDCARD,
//!     r#"Subject.role == "hr_manager" && Subject.tenant == Resource.tenant"#,
//!     Effect::Allow,
//! ))?;
//!
//! let authorizer = Authorizer::new(
//!     store,
//!     Arc::new(Directory),
//!     Arc::new(Documents),
//!     FunctionRegistry::with_builtins(),
//! );
//!
//! assert!(authorizer.check("t1", "alice", "doc-1", "approve", None)?);
//! # Ok::<(), basalt::EngineError>(())
//! ```

pub mod attributes;
pub mod engine;
pub mod error;
mod evaluator;
mod expr;
pub mod fetch;
pub mod functions;
pub mod policy;
pub mod store;
pub mod trace;

pub use attributes::{AttributeValue, Attributes};
pub use engine::{AuthorizationRequest, Authorizer};
pub use error::{EngineError, FetchError, Result};
pub use fetch::{ResourceFetcher, SubjectFetcher};
pub use functions::{FunctionRegistry, PredicateFn};
pub use policy::{Effect, PolicyRule, TENANT_WILDCARD};
pub use store::{PolicyStore, SnapshotStore};
pub use trace::{DecisionTrace, TraceOptions};
