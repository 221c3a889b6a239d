//! Explanation cache controller
//!
//! Per requested language, independently:
//!
//! 1. the entry read once per request is checked; a stored explanation is a
//!    **hit** and needs no tree
//! 2. on a miss, join the single flight for (signature, language); the leader
//!    re-checks the store, builds the justification tree and context (once per
//!    request, shared across languages), calls the generator under a
//!    concurrency limit with timeout and bounded retry, and writes the result
//!    through to the store
//! 3. followers of the same flight receive the leader's explanation or its
//!    error; relations are recorded by the leader once the flight settles
//!
//! An invalid record or language code fails a whole request, as does an
//! unreadable store unless reads are allowed to degrade to misses. Everything
//! else is reported per language, and a failed write still returns the
//! generated explanation with a warning.

use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use tokio::sync::Semaphore;
use xshacl_core::{
    normalize_language, validate_language, CacheEntry, ContextRetriever, DataLookup,
    DomainContext, ExplainError, Explanation, JustificationNode, JustificationTreeBuilder,
    NoContext, Relation, Result, ShapeLookup, SignatureCanonicalizer, SignatureHash, TripleGraph,
    ViolationRecord, ViolationSignature,
};
use xshacl_storage::{ExplanationStore, StoreError};

use crate::config::{ControllerConfig, StoreReadPolicy};
use crate::flight::{Flighted, SingleFlight};
use crate::generator::{
    ExplanationGenerator, GeneratedExplanation, GenerationRequest, GeneratorError,
};
use crate::metrics::CacheMetrics;

/// Where a returned explanation came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExplanationSource {
    /// Found in the store
    Hit,
    /// Generated by this call
    Generated,
    /// Generated by a concurrent call for the same signature and language
    Coalesced,
}

impl std::fmt::Display for ExplanationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExplanationSource::Hit => write!(f, "hit"),
            ExplanationSource::Generated => write!(f, "generated"),
            ExplanationSource::Coalesced => write!(f, "coalesced"),
        }
    }
}

/// Explanation for one language with provenance
#[derive(Debug, Clone, PartialEq)]
pub struct LanguageExplanation {
    pub explanation: Explanation,
    pub source: ExplanationSource,
    /// Non-fatal problems, such as a failed write-through
    pub warnings: Vec<String>,
}

/// Result of one `explain` call
#[derive(Debug, Clone)]
pub struct ExplainResponse {
    pub signature: ViolationSignature,
    pub signature_hash: SignatureHash,
    /// Keyed by normalized language code
    pub results: BTreeMap<String, Result<LanguageExplanation>>,
    /// Tree used for generation, absent when every language hit
    pub justification: Option<JustificationNode>,
    /// Context used for generation, absent when every language hit
    pub context: Option<DomainContext>,
}

impl ExplainResponse {
    pub fn explanation(&self, language: &str) -> Option<&Explanation> {
        self.results
            .get(&normalize_language(language))
            .and_then(|r| r.as_ref().ok())
            .map(|e| &e.explanation)
    }

    /// Whether every language produced an explanation
    pub fn is_complete(&self) -> bool {
        self.results.values().all(|r| r.is_ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &ExplainError)> {
        self.results
            .iter()
            .filter_map(|(lang, r)| r.as_ref().err().map(|e| (lang.as_str(), e)))
    }
}

/// Shape, data and context collaborators for one dataset
#[derive(Clone)]
pub struct EvidenceSources {
    pub shapes: Arc<dyn ShapeLookup>,
    pub data: Arc<dyn DataLookup>,
    pub context: Arc<dyn ContextRetriever>,
}

impl EvidenceSources {
    pub fn new(
        shapes: Arc<dyn ShapeLookup>,
        data: Arc<dyn DataLookup>,
        context: Arc<dyn ContextRetriever>,
    ) -> Self {
        Self {
            shapes,
            data,
            context,
        }
    }
}

impl Default for EvidenceSources {
    fn default() -> Self {
        let empty = Arc::new(TripleGraph::new());
        Self {
            shapes: empty.clone(),
            data: empty,
            context: Arc::new(NoContext),
        }
    }
}

type FlightKey = (SignatureHash, String);

/// Lookup, single-flight generation and write-back of explanations
#[derive(Clone)]
pub struct ExplanationCacheController {
    store: Arc<dyn ExplanationStore>,
    canonicalizer: Arc<SignatureCanonicalizer>,
    flights: Arc<SingleFlight<FlightKey, Explanation, ExplainError>>,
    generation_permits: Arc<Semaphore>,
    sources: EvidenceSources,
    metrics: Option<CacheMetrics>,
    config: Arc<ControllerConfig>,
}

impl ExplanationCacheController {
    pub fn new(store: Arc<dyn ExplanationStore>, config: ControllerConfig) -> Self {
        let permits = config.max_concurrent_generations.max(1);
        Self {
            store,
            canonicalizer: Arc::new(SignatureCanonicalizer::default()),
            flights: Arc::new(SingleFlight::new()),
            generation_permits: Arc::new(Semaphore::new(permits)),
            sources: EvidenceSources::default(),
            metrics: None,
            config: Arc::new(config),
        }
    }

    pub fn with_sources(mut self, sources: EvidenceSources) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_metrics(mut self, metrics: CacheMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_canonicalizer(mut self, canonicalizer: SignatureCanonicalizer) -> Self {
        self.canonicalizer = Arc::new(canonicalizer);
        self
    }

    /// A controller for another dataset sharing store, flights and limits
    pub fn for_sources(&self, sources: EvidenceSources) -> Self {
        Self {
            sources,
            ..self.clone()
        }
    }

    pub fn store(&self) -> &Arc<dyn ExplanationStore> {
        &self.store
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn canonicalize(&self, record: &ViolationRecord) -> Result<ViolationSignature> {
        self.canonicalizer.canonicalize(record)
    }

    /// Explain one violation in each requested language.
    ///
    /// Fails as a whole for an invalid record or language code, and for a
    /// store read failure under [`StoreReadPolicy::FailFast`].
    pub async fn explain(
        &self,
        record: &ViolationRecord,
        languages: &[String],
        generator: &dyn ExplanationGenerator,
    ) -> Result<ExplainResponse> {
        let signature = self.canonicalizer.canonicalize(record)?;
        let hash = signature.hash();

        let mut requested: Vec<String> = Vec::with_capacity(languages.len());
        for language in languages.iter().filter(|l| !l.trim().is_empty()) {
            let language = validate_language(language)?;
            if !requested.contains(&language) {
                requested.push(language);
            }
        }

        let stored = if requested.is_empty() {
            EntryRead::default()
        } else {
            self.read_entry(&hash).await?
        };

        let evidence = Evidence::new(record, &self.sources);
        let job = Job {
            record,
            signature: &signature,
            hash,
            generator,
            evidence: &evidence,
            stored: &stored,
        };

        let outcomes = join_all(
            requested
                .iter()
                .map(|language| self.explain_language(job, language)),
        )
        .await;

        let results = requested.into_iter().zip(outcomes).collect();
        let (justification, context) = evidence.into_parts();

        Ok(ExplainResponse {
            signature,
            signature_hash: hash,
            results,
            justification,
            context,
        })
    }

    /// Explain many violations concurrently, preserving input order
    pub async fn explain_batch(
        &self,
        records: &[ViolationRecord],
        languages: &[String],
        generator: &dyn ExplanationGenerator,
    ) -> Vec<Result<ExplainResponse>> {
        join_all(
            records
                .iter()
                .map(|record| self.explain(record, languages, generator)),
        )
        .await
    }

    /// Read the entry once for all languages of a request
    async fn read_entry(&self, hash: &SignatureHash) -> Result<EntryRead> {
        match self.store.get_by_hash(hash).await {
            Ok(entry) => Ok(EntryRead {
                entry,
                warning: None,
            }),
            Err(e) => {
                self.with_metrics_do(|m| m.record_store_error("read"));
                match self.config.store_read_policy {
                    StoreReadPolicy::FailFast => {
                        tracing::error!(signature = %hash.short(), error = %e, "Store read failed");
                        Err(e.into())
                    }
                    StoreReadPolicy::TreatAsMiss => {
                        tracing::warn!(
                            signature = %hash.short(),
                            error = %e,
                            "Store read failed, treating as miss"
                        );
                        Ok(EntryRead {
                            entry: None,
                            warning: Some(format!("store read failed, treated as miss: {}", e)),
                        })
                    }
                }
            }
        }
    }

    async fn explain_language(&self, job: Job<'_>, language: &str) -> Result<LanguageExplanation> {
        let mut warnings: Vec<String> = job.stored.warning.iter().cloned().collect();

        if let Some(explanation) = job.stored.explanation(language) {
            tracing::debug!(signature = %job.hash.short(), language = %language, "Cache hit");
            self.with_metrics_do(CacheMetrics::record_hit);
            return Ok(LanguageExplanation {
                explanation: explanation.clone(),
                source: ExplanationSource::Hit,
                warnings,
            });
        }

        let mut notes = LeaderNotes::default();
        let notes_ref = &mut notes;
        let flighted = self
            .flights
            .run((job.hash, language.to_string()), move || {
                self.lead(job, language, notes_ref)
            })
            .await?;

        let (explanation, source) = match flighted {
            Flighted::Leader(explanation) if notes.from_store => {
                self.with_metrics_do(CacheMetrics::record_hit);
                (explanation, ExplanationSource::Hit)
            }
            Flighted::Leader(explanation) => {
                self.with_metrics_do(CacheMetrics::record_miss);
                (explanation, ExplanationSource::Generated)
            }
            Flighted::Follower(explanation) => {
                tracing::debug!(
                    signature = %job.hash.short(),
                    language = %language,
                    "Joined in-flight generation"
                );
                self.with_metrics_do(CacheMetrics::record_coalesced);
                (explanation, ExplanationSource::Coalesced)
            }
        };

        warnings.extend(notes.warnings);
        if source == ExplanationSource::Generated && self.config.record_relations {
            self.record_relations(job, &mut warnings).await;
        }

        Ok(LanguageExplanation {
            explanation,
            source,
            warnings,
        })
    }

    /// Leader path: re-check, generate, write through
    async fn lead(
        &self,
        job: Job<'_>,
        language: &str,
        notes: &mut LeaderNotes,
    ) -> Result<Explanation> {
        // Another caller may have finished between the first read and taking the lead.
        if let Ok(Some(explanation)) = self.lookup(&job.hash, language).await {
            notes.from_store = true;
            return Ok(explanation);
        }

        let (tree, tree_warning) = job.evidence.tree();
        let (context, context_warning) = job.evidence.context();
        notes.warnings.extend(tree_warning.cloned());
        notes.warnings.extend(context_warning.cloned());

        let request = GenerationRequest {
            record: job.record,
            signature: job.signature,
            justification: tree,
            context,
            language,
            model: self.config.model.as_deref(),
        };
        let generated = self.generate_with_retry(request, job.generator).await?;

        let explanation = Explanation::new(language, generated.text, generated.model)
            .with_suggestions(generated.correction_suggestions)
            .with_justification(tree.clone());

        if let Err(e) = self
            .store
            .put_explanation(job.signature, language, explanation.clone())
            .await
        {
            self.with_metrics_do(|m| m.record_store_error("write"));
            tracing::warn!(
                signature = %job.hash.short(),
                language = %language,
                error = %e,
                "Failed to cache generated explanation"
            );
            notes
                .warnings
                .push(format!("explanation was not cached: {}", e));
        }

        Ok(explanation)
    }

    async fn generate_with_retry(
        &self,
        request: GenerationRequest<'_>,
        generator: &dyn ExplanationGenerator,
    ) -> Result<GeneratedExplanation> {
        let language = request.language;
        let timeout = self.config.generation_timeout();
        let mut last_error: Option<GeneratorError> = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let backoff = self.config.backoff_for(attempt);
                tracing::debug!(
                    attempt = attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    language = %language,
                    "Retrying explanation generation"
                );
                tokio::time::sleep(backoff).await;
            }

            let _permit = self.generation_permits.acquire().await.map_err(|_| {
                ExplainError::generation_failed(language, "generation limiter closed")
            })?;

            let timer = self.metrics.as_ref().map(CacheMetrics::start_generation);
            let outcome = match tokio::time::timeout(timeout, generator.generate(request)).await {
                Ok(result) => result.and_then(GeneratedExplanation::validate),
                Err(_) => Err(GeneratorError::Timeout(self.config.generation_timeout_ms)),
            };
            drop(timer);

            match outcome {
                Ok(generated) => {
                    self.with_metrics_do(|m| m.record_generation(true));
                    tracing::info!(
                        signature = %request.signature.hash().short(),
                        language = %language,
                        model = %generated.model,
                        attempt = attempt,
                        "Generated explanation"
                    );
                    return Ok(generated);
                }
                Err(e) => {
                    self.with_metrics_do(|m| m.record_generation(false));
                    tracing::warn!(
                        attempt = attempt,
                        language = %language,
                        error = %e,
                        "Explanation generation failed"
                    );
                    let retryable = e.is_retryable();
                    last_error = Some(e);
                    if !retryable {
                        break;
                    }
                }
            }
        }

        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown generator error".to_string());
        tracing::error!(language = %language, reason = %reason, "Giving up on explanation generation");
        Err(ExplainError::generation_failed(language, reason))
    }

    /// Runs after the flight settles so followers do not wait on it
    async fn record_relations(&self, job: Job<'_>, warnings: &mut Vec<String>) {
        let (context, _) = job.evidence.context();
        let relations = std::iter::once(Relation::SimilarCase(job.record.focus_node.clone()))
            .chain(context.similar_cases.iter().cloned().map(Relation::SimilarCase))
            .chain(context.domain_rules.iter().cloned().map(Relation::DomainRule));

        for relation in relations {
            if let Err(e) = self.store.add_relation(job.signature, relation).await {
                self.with_metrics_do(|m| m.record_store_error("relation"));
                tracing::warn!(signature = %job.hash.short(), error = %e, "Failed to record relation");
                warnings.push(format!("relation was not recorded: {}", e));
                break;
            }
        }
    }

    async fn lookup(
        &self,
        hash: &SignatureHash,
        language: &str,
    ) -> std::result::Result<Option<Explanation>, StoreError> {
        Ok(self
            .store
            .get_by_hash(hash)
            .await?
            .and_then(|entry| entry.explanation(language).cloned()))
    }

    fn with_metrics_do(&self, f: impl FnOnce(&CacheMetrics)) {
        if let Some(metrics) = &self.metrics {
            f(metrics);
        }
    }
}

impl std::fmt::Debug for ExplanationCacheController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExplanationCacheController")
            .field("store", &self.store.name())
            .field("flights", &self.flights)
            .field("config", &self.config)
            .finish()
    }
}

/// Per-request inputs shared by all languages
#[derive(Clone, Copy)]
struct Job<'a> {
    record: &'a ViolationRecord,
    signature: &'a ViolationSignature,
    hash: SignatureHash,
    generator: &'a dyn ExplanationGenerator,
    evidence: &'a Evidence<'a>,
    stored: &'a EntryRead,
}

/// Stored entry seen at the start of a request
#[derive(Default)]
struct EntryRead {
    entry: Option<CacheEntry>,
    warning: Option<String>,
}

impl EntryRead {
    fn explanation(&self, language: &str) -> Option<&Explanation> {
        self.entry.as_ref().and_then(|entry| entry.explanation(language))
    }
}

#[derive(Default)]
struct LeaderNotes {
    from_store: bool,
    warnings: Vec<String>,
}

/// Tree and context built lazily, at most once per request
struct Evidence<'a> {
    record: &'a ViolationRecord,
    sources: &'a EvidenceSources,
    tree: OnceLock<(JustificationNode, Option<String>)>,
    context: OnceLock<(DomainContext, Option<String>)>,
}

impl<'a> Evidence<'a> {
    fn new(record: &'a ViolationRecord, sources: &'a EvidenceSources) -> Self {
        Self {
            record,
            sources,
            tree: OnceLock::new(),
            context: OnceLock::new(),
        }
    }

    fn tree(&self) -> (&JustificationNode, Option<&String>) {
        let (tree, warning) = self.tree.get_or_init(|| {
            let builder =
                JustificationTreeBuilder::new(self.sources.shapes.as_ref(), self.sources.data.as_ref());
            match builder.try_build(self.record) {
                Ok(tree) => (tree, None),
                Err(e) => {
                    tracing::warn!(focus = %self.record.focus_node, error = %e, "Using minimal justification tree");
                    (JustificationTreeBuilder::minimal(self.record), Some(format!("justification degraded: {}", e)))
                }
            }
        });
        (tree, warning.as_ref())
    }

    fn context(&self) -> (&DomainContext, Option<&String>) {
        let (context, warning) = self.context.get_or_init(|| {
            match self.sources.context.retrieve(self.record) {
                Ok(context) => (context, None),
                Err(e) => {
                    tracing::warn!(focus = %self.record.focus_node, error = %e, "Context retrieval failed");
                    (DomainContext::default(), Some(format!("context unavailable: {}", e)))
                }
            }
        });
        (context, warning.as_ref())
    }

    fn into_parts(self) -> (Option<JustificationNode>, Option<DomainContext>) {
        (
            self.tree.into_inner().map(|(tree, _)| tree),
            self.context.into_inner().map(|(context, _)| context),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use xshacl_storage::MemoryStore;

    struct EchoGenerator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ExplanationGenerator for EchoGenerator {
        fn model(&self) -> &str {
            "echo"
        }

        async fn generate(
            &self,
            request: GenerationRequest<'_>,
        ) -> std::result::Result<GeneratedExplanation, GeneratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(GeneratedExplanation {
                text: format!("[{}] {}", request.language, request.justification.statement),
                correction_suggestions: vec![],
                model: request.model.unwrap_or(self.model()).to_string(),
            })
        }
    }

    fn record() -> ViolationRecord {
        ViolationRecord::new(
            "http://example.org/Alice",
            "http://example.org/PersonShape",
            "http://www.w3.org/ns/shacl#MinCountConstraintComponent",
        )
        .with_path("http://example.org/hasName")
        .with_context("minCount", serde_json::json!(1))
    }

    #[tokio::test]
    async fn test_languages_are_normalized_and_deduplicated() {
        let controller =
            ExplanationCacheController::new(Arc::new(MemoryStore::new()), ControllerConfig::default());
        let generator = EchoGenerator { calls: AtomicUsize::new(0) };

        let languages = vec!["EN".to_string(), "en ".to_string(), "".to_string()];
        let response = tokio_test::assert_ok!(controller.explain(&record(), &languages, &generator).await);

        assert_eq!(response.results.len(), 1);
        assert!(response.explanation("en").is_some());
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_model_override_reaches_generator() {
        let config = ControllerConfig::builder().model("gemma:2b").build();
        let controller = ExplanationCacheController::new(Arc::new(MemoryStore::new()), config);
        let generator = EchoGenerator { calls: AtomicUsize::new(0) };

        let response = controller
            .explain(&record(), &["en".to_string()], &generator)
            .await
            .unwrap();
        assert_eq!(response.explanation("en").unwrap().provided_by_model, "gemma:2b");
    }

    #[tokio::test]
    async fn test_invalid_record_fails_whole_request() {
        let controller =
            ExplanationCacheController::new(Arc::new(MemoryStore::new()), ControllerConfig::default());
        let generator = EchoGenerator { calls: AtomicUsize::new(0) };
        let mut bad = record();
        bad.constraint_id.clear();

        let err = tokio_test::assert_err!(
            controller.explain(&bad, &["en".to_string()], &generator).await
        );
        assert!(matches!(err, ExplainError::InvalidViolationRecord(_)));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_malformed_language_fails_whole_request() {
        let store = Arc::new(MemoryStore::new());
        let controller = ExplanationCacheController::new(store.clone(), ControllerConfig::default());
        let generator = EchoGenerator { calls: AtomicUsize::new(0) };

        let languages = vec!["en".to_string(), "pt.br".to_string()];
        let err = tokio_test::assert_err!(controller.explain(&record(), &languages, &generator).await);
        assert_eq!(err, ExplainError::InvalidLanguageCode("pt.br".into()));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.len().await.unwrap(), 0);
    }
}
