//! # xSHACL Storage
//!
//! Persistent mapping `ViolationSignature -> CacheEntry`.
//!
//! Every operation is atomic per signature. `put_explanation` replaces only
//! the explanation for its own language, so concurrent writes for different
//! languages of the same signature never lose each other's updates. The
//! store is append/overwrite only; there is no eviction.
//!
//! Two backends are provided:
//! - [`MemoryStore`]: an in-process arena, for tests and one-shot runs
//! - [`SledStore`]: a durable embedded store that survives restarts

pub mod memory;
pub mod sled_store;
pub mod turtle;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use xshacl_core::{
    CacheEntry, ExplainError, Explanation, Relation, SignatureHash, ViolationSignature,
};

pub use memory::MemoryStore;
pub use sled_store::SledStore;
pub use turtle::export_turtle;

/// Errors raised by store backends
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backend failed (I/O, lock, closed database)
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// An entry could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A stored entry could not be decoded or does not match its key
    #[error("Corrupt entry {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

impl StoreError {
    pub fn corrupt(key: &SignatureHash, reason: impl Into<String>) -> Self {
        StoreError::Corrupt {
            key: key.to_hex(),
            reason: reason.into(),
        }
    }
}

impl From<sled::Error> for StoreError {
    fn from(e: sled::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

impl From<StoreError> for ExplainError {
    fn from(e: StoreError) -> Self {
        ExplainError::store_unavailable(e.to_string())
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Explanation cache store
#[async_trait]
pub trait ExplanationStore: Send + Sync + fmt::Debug {
    /// Backend name, for logs and `stats`
    fn name(&self) -> &str;

    /// Fetch an entry by its signature hash
    async fn get_by_hash(&self, hash: &SignatureHash) -> StoreResult<Option<CacheEntry>>;

    /// Fetch the entry for a signature
    async fn get(&self, signature: &ViolationSignature) -> StoreResult<Option<CacheEntry>> {
        self.get_by_hash(&signature.hash()).await
    }

    /// Create the entry if absent and replace the explanation for `language`
    async fn put_explanation(
        &self,
        signature: &ViolationSignature,
        language: &str,
        explanation: Explanation,
    ) -> StoreResult<()>;

    /// Add a relation, creating the entry if absent.
    ///
    /// Returns `false` if the relation was already recorded.
    async fn add_relation(
        &self,
        signature: &ViolationSignature,
        relation: Relation,
    ) -> StoreResult<bool>;

    /// Existence check without decoding the entry
    async fn exists_by_hash(&self, hash: &SignatureHash) -> StoreResult<bool>;

    async fn exists(&self, signature: &ViolationSignature) -> StoreResult<bool> {
        self.exists_by_hash(&signature.hash()).await
    }

    /// All entries, ordered by hash
    async fn entries(&self) -> StoreResult<Vec<CacheEntry>>;

    /// Number of entries
    async fn len(&self) -> StoreResult<usize> {
        Ok(self.entries().await?.len())
    }
}

#[async_trait]
impl<S: ExplanationStore + ?Sized> ExplanationStore for Arc<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn get_by_hash(&self, hash: &SignatureHash) -> StoreResult<Option<CacheEntry>> {
        (**self).get_by_hash(hash).await
    }

    async fn put_explanation(
        &self,
        signature: &ViolationSignature,
        language: &str,
        explanation: Explanation,
    ) -> StoreResult<()> {
        (**self).put_explanation(signature, language, explanation).await
    }

    async fn add_relation(
        &self,
        signature: &ViolationSignature,
        relation: Relation,
    ) -> StoreResult<bool> {
        (**self).add_relation(signature, relation).await
    }

    async fn exists_by_hash(&self, hash: &SignatureHash) -> StoreResult<bool> {
        (**self).exists_by_hash(hash).await
    }

    async fn entries(&self) -> StoreResult<Vec<CacheEntry>> {
        (**self).entries().await
    }

    async fn len(&self) -> StoreResult<usize> {
        (**self).len().await
    }
}

/// Aggregate counts over a store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct StoreStats {
    pub entries: usize,
    pub explanations: usize,
    pub similar_cases: usize,
    pub domain_rules: usize,
}

impl StoreStats {
    pub fn from_entries(entries: &[CacheEntry]) -> Self {
        entries.iter().fold(Self::default(), |mut stats, entry| {
            stats.entries += 1;
            stats.explanations += entry.explanations.len();
            stats.similar_cases += entry.similar_cases.len();
            stats.domain_rules += entry.domain_rules.len();
            stats
        })
    }
}
