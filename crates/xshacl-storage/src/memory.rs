//! In-memory arena store

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use xshacl_core::{CacheEntry, Explanation, Relation, SignatureHash, ViolationSignature};

use crate::{ExplanationStore, StoreError, StoreResult};

/// Arena of cache entries keyed by signature hash
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<SignatureHash, CacheEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn check_key(entry: &CacheEntry, signature: &ViolationSignature) -> StoreResult<()> {
    if &entry.signature != signature {
        return Err(StoreError::corrupt(
            &entry.hash,
            "stored signature differs from requested signature",
        ));
    }
    Ok(())
}

#[async_trait]
impl ExplanationStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get_by_hash(&self, hash: &SignatureHash) -> StoreResult<Option<CacheEntry>> {
        Ok(self.entries.read().await.get(hash).cloned())
    }

    async fn put_explanation(
        &self,
        signature: &ViolationSignature,
        language: &str,
        explanation: Explanation,
    ) -> StoreResult<()> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .entry(signature.hash())
            .or_insert_with(|| CacheEntry::new(signature.clone()));
        check_key(entry, signature)?;
        entry.upsert_explanation(language, explanation);
        Ok(())
    }

    async fn add_relation(
        &self,
        signature: &ViolationSignature,
        relation: Relation,
    ) -> StoreResult<bool> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .entry(signature.hash())
            .or_insert_with(|| CacheEntry::new(signature.clone()));
        check_key(entry, signature)?;
        Ok(entry.add_relation(relation))
    }

    async fn exists_by_hash(&self, hash: &SignatureHash) -> StoreResult<bool> {
        Ok(self.entries.read().await.contains_key(hash))
    }

    async fn entries(&self) -> StoreResult<Vec<CacheEntry>> {
        let mut entries: Vec<_> = self.entries.read().await.values().cloned().collect();
        entries.sort_by_key(|e| e.hash);
        Ok(entries)
    }

    async fn len(&self) -> StoreResult<usize> {
        Ok(self.entries.read().await.len())
    }
}
