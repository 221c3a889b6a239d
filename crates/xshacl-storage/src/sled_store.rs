//! Durable store on an embedded sled database
//!
//! Entries live in one tree keyed by the 32-byte signature hash with JSON
//! values. Writes go through sled's per-key compare-and-swap loop
//! (`update_and_fetch`), so a read-modify-write of one entry never
//! interleaves with another writer of the same key. sled's API is
//! synchronous; every call runs on tokio's blocking pool.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use xshacl_core::{CacheEntry, Explanation, Relation, SignatureHash, ViolationSignature};

use crate::{ExplanationStore, StoreError, StoreResult};

const ENTRIES_TREE: &str = "cache_entries";

/// sled-backed explanation store
#[derive(Debug, Clone)]
pub struct SledStore {
    db: sled::Db,
    entries: sled::Tree,
    path: Option<PathBuf>,
}

impl SledStore {
    /// Open or create a store at `path`
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let db = sled::open(path)?;
        let entries = db.open_tree(ENTRIES_TREE)?;
        tracing::debug!(path = %path.display(), entries = entries.len(), "Opened sled store");
        Ok(Self {
            db,
            entries,
            path: Some(path.to_path_buf()),
        })
    }

    /// A store that is deleted when dropped
    pub fn temporary() -> StoreResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        let entries = db.open_tree(ENTRIES_TREE)?;
        Ok(Self {
            db,
            entries,
            path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Flush all pending writes to disk
    pub async fn flush(&self) -> StoreResult<()> {
        self.db.flush_async().await?;
        Ok(())
    }

    fn decode(hash: &SignatureHash, bytes: &[u8]) -> StoreResult<CacheEntry> {
        let entry: CacheEntry = serde_json::from_slice(bytes)
            .map_err(|e| StoreError::corrupt(hash, e.to_string()))?;
        if &entry.hash != hash {
            return Err(StoreError::corrupt(hash, "entry hash does not match key"));
        }
        Ok(entry)
    }

    async fn blocking<T, F>(&self, op: F) -> StoreResult<T>
    where
        F: FnOnce(&sled::Tree) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let tree = self.entries.clone();
        tokio::task::spawn_blocking(move || op(&tree))
            .await
            .map_err(|e| StoreError::Backend(format!("store task failed: {}", e)))?
    }

    /// Atomically apply `mutate` to the entry for `signature`.
    ///
    /// The entry is created when absent. `mutate` may run more than once
    /// under contention and returns whether it changed the entry.
    async fn update<F>(&self, signature: &ViolationSignature, mutate: F) -> StoreResult<bool>
    where
        F: FnMut(&mut CacheEntry) -> bool + Send + 'static,
    {
        let signature = signature.clone();
        let changed = self
            .blocking(move |tree| Self::update_entry(tree, &signature, mutate))
            .await?;
        if changed {
            self.flush().await?;
        }
        Ok(changed)
    }

    fn update_entry<F>(
        tree: &sled::Tree,
        signature: &ViolationSignature,
        mut mutate: F,
    ) -> StoreResult<bool>
    where
        F: FnMut(&mut CacheEntry) -> bool,
    {
        let hash = signature.hash();
        let mut outcome: StoreResult<bool> = Ok(false);

        tree.update_and_fetch(hash.as_bytes(), |old| {
            let mut entry = match old {
                Some(bytes) => match Self::decode(&hash, bytes) {
                    Ok(entry) => entry,
                    Err(e) => {
                        outcome = Err(e);
                        return Some(bytes.to_vec());
                    }
                },
                None => CacheEntry::new(signature.clone()),
            };

            if &entry.signature != signature {
                outcome = Err(StoreError::corrupt(
                    &hash,
                    "stored signature differs from requested signature",
                ));
                return old.map(<[u8]>::to_vec);
            }

            let changed = mutate(&mut entry);
            if !changed && old.is_some() {
                outcome = Ok(false);
                return old.map(<[u8]>::to_vec);
            }

            match serde_json::to_vec(&entry) {
                Ok(bytes) => {
                    outcome = Ok(changed);
                    Some(bytes)
                }
                Err(e) => {
                    outcome = Err(StoreError::Serialization(e.to_string()));
                    old.map(<[u8]>::to_vec)
                }
            }
        })?;

        outcome
    }
}

#[async_trait]
impl ExplanationStore for SledStore {
    fn name(&self) -> &str {
        "sled"
    }

    async fn get_by_hash(&self, hash: &SignatureHash) -> StoreResult<Option<CacheEntry>> {
        let hash = *hash;
        self.blocking(move |tree| match tree.get(hash.as_bytes())? {
            Some(bytes) => Self::decode(&hash, &bytes).map(Some),
            None => Ok(None),
        })
        .await
    }

    async fn put_explanation(
        &self,
        signature: &ViolationSignature,
        language: &str,
        explanation: Explanation,
    ) -> StoreResult<()> {
        let key = language.to_string();
        let changed = self
            .update(signature, move |entry| {
                entry.upsert_explanation(&key, explanation.clone())
            })
            .await?;
        tracing::debug!(
            signature = %signature.hash().short(),
            language = %language,
            changed,
            "Stored explanation"
        );
        Ok(())
    }

    async fn add_relation(
        &self,
        signature: &ViolationSignature,
        relation: Relation,
    ) -> StoreResult<bool> {
        self.update(signature, move |entry| entry.add_relation(relation.clone()))
            .await
    }

    async fn exists_by_hash(&self, hash: &SignatureHash) -> StoreResult<bool> {
        let hash = *hash;
        self.blocking(move |tree| Ok(tree.contains_key(hash.as_bytes())?))
            .await
    }

    async fn entries(&self) -> StoreResult<Vec<CacheEntry>> {
        self.blocking(|tree| {
            let mut entries = Vec::with_capacity(tree.len());
            for item in tree.iter() {
                let (key, value) = item?;
                let hash = SignatureHash::from_slice(&key).ok_or_else(|| StoreError::Corrupt {
                    key: format!("{:?}", &*key),
                    reason: "key is not a 32-byte hash".into(),
                })?;
                entries.push(Self::decode(&hash, &value)?);
            }
            Ok(entries)
        })
        .await
    }

    async fn len(&self) -> StoreResult<usize> {
        self.blocking(|tree| Ok(tree.len())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xshacl_core::{canonicalize, ViolationRecord};

    fn signature() -> ViolationSignature {
        let record = ViolationRecord::new(
            "http://example.org/Alice",
            "http://example.org/PersonShape",
            "http://www.w3.org/ns/shacl#PatternConstraintComponent",
        )
        .with_path("http://example.org/email")
        .with_context("pattern", serde_json::json!("^\\S+@\\S+$"));
        canonicalize(&record).unwrap()
    }

    #[tokio::test]
    async fn test_temporary_store_round_trip() {
        let store = SledStore::temporary().unwrap();
        let sig = signature();

        store
            .put_explanation(&sig, "en", Explanation::new("en", "bad email", "m"))
            .await
            .unwrap();
        assert!(store.exists(&sig).await.unwrap());
        assert_eq!(store.len().await.unwrap(), 1);

        let entry = store.get(&sig).await.unwrap().unwrap();
        assert_eq!(entry.signature, sig);
        assert_eq!(entry.explanation("en").unwrap().natural_language_text, "bad email");
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_reported() {
        let store = SledStore::temporary().unwrap();
        let sig = signature();
        store
            .entries
            .insert(sig.hash().as_bytes(), b"not json".to_vec())
            .unwrap();

        let err = store.get(&sig).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));

        let err = store
            .put_explanation(&sig, "en", Explanation::new("en", "x", "m"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
        assert_eq!(
            &*store.entries.get(sig.hash().as_bytes()).unwrap().unwrap(),
            b"not json"
        );
    }

    #[tokio::test]
    async fn test_unchanged_relation_reports_false() {
        let store = SledStore::temporary().unwrap();
        let sig = signature();
        let rule = Relation::DomainRule("emails must contain @".into());
        assert!(store.add_relation(&sig, rule.clone()).await.unwrap());
        assert!(!store.add_relation(&sig, rule).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_keep_every_update() {
        let store = SledStore::temporary().unwrap();
        let sig = signature();

        let mut tasks = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            let sig = sig.clone();
            tasks.push(tokio::spawn(async move {
                let lang = format!("l{}", i);
                store
                    .put_explanation(&sig, &lang, Explanation::new(&lang, "text", "m"))
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let entry = store.get(&sig).await.unwrap().unwrap();
        assert_eq!(entry.explanations.len(), 8);
    }
}
