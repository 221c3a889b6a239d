//! # xSHACL Core
//!
//! Data model and pure computation for explainable SHACL validation:
//!
//! - [`violation`]: violation records produced by the validator
//! - [`signature`]: node-independent violation signatures and their hashes
//! - [`justification`]: premise / observation / conclusion trees
//! - [`graph`]: an N-Triples / Turtle graph backing shape and data lookups
//! - [`context`]: domain context retrieval
//! - [`explanation`]: cached explanations and cache entries
//!
//! ## Example
//!
//! ```rust
//! use xshacl_core::{canonicalize, ViolationRecord};
//!
//! let alice = ViolationRecord::new(
//!     "http://example.org/Alice",
//!     "http://example.org/PersonShape",
//!     "http://www.w3.org/ns/shacl#MinCountConstraintComponent",
//! )
//! .with_path("http://example.org/hasName")
//! .with_context("minCount", serde_json::json!(1));
//!
//! let mut bob = alice.clone();
//! bob.focus_node = "http://example.org/Bob".into();
//!
//! assert_eq!(canonicalize(&alice)?.hash(), canonicalize(&bob)?.hash());
//! # Ok::<(), xshacl_core::ExplainError>(())
//! ```

pub mod context;
pub mod error;
pub mod explanation;
pub mod graph;
pub mod justification;
pub mod signature;
pub mod violation;
pub mod vocab;

pub use context::{ContextRetriever, DomainContext, GraphContextRetriever, NoContext};
pub use error::{ExplainError, Result};
pub use explanation::{normalize_language, validate_language, CacheEntry, Explanation, Relation};
pub use graph::{GraphParseError, RdfFormat, Term, Triple, TripleGraph};
pub use justification::{
    DataLookup, JustificationNode, JustificationTreeBuilder, NodeKind, ShapeLookup,
};
pub use signature::{
    canonicalize, ExtractionRule, ExtractionTable, ParamRule, SignatureCanonicalizer,
    SignatureHash, ViolationSignature,
};
pub use violation::{NodeId, Severity, ViolationRecord, ViolationType};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
