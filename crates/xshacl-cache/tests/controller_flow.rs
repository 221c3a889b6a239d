//! End-to-end behavior of the explanation cache controller

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use xshacl_cache::{
    CacheMetricsRegistry, ControllerConfig, EvidenceSources, ExplanationCacheController,
    ExplanationGenerator, ExplanationSource, GeneratedExplanation, GenerationRequest,
    GeneratorError, StoreReadPolicy,
};
use xshacl_core::{
    CacheEntry, ContextRetriever, DomainContext, ExplainError, Explanation, NodeKind, Relation,
    SignatureHash, TripleGraph, ViolationRecord, ViolationSignature,
};
use xshacl_storage::{ExplanationStore, MemoryStore, StoreError, StoreResult};

const SHAPES: &str = r#"
<http://example.org/PersonShape> <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <http://www.w3.org/ns/shacl#NodeShape> .
<http://example.org/PersonShape> <http://www.w3.org/ns/shacl#minCount> "1"^^<http://www.w3.org/2001/XMLSchema#integer> .
<http://example.org/PersonShape> <http://www.w3.org/ns/shacl#path> <http://example.org/hasName> .
"#;

const DATA: &str = r#"
<http://example.org/Alice> <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <http://example.org/Person> .
<http://example.org/Bob> <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <http://example.org/Person> .
"#;

/// Counts calls per language, optionally sleeping or failing
#[derive(Default)]
struct ScriptedGenerator {
    delay: Duration,
    calls: AtomicUsize,
    per_language: Mutex<HashMap<String, usize>>,
    fail_language: Option<(String, GeneratorError)>,
    transient_failures: AtomicUsize,
}

impl ScriptedGenerator {
    fn new() -> Self {
        Self::default()
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    fn failing_for(language: &str, error: GeneratorError) -> Self {
        Self {
            fail_language: Some((language.to_string(), error)),
            ..Self::default()
        }
    }

    fn flaky(failures: usize) -> Self {
        Self {
            transient_failures: AtomicUsize::new(failures),
            ..Self::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn calls_for(&self, language: &str) -> usize {
        self.per_language
            .lock()
            .unwrap()
            .get(language)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl ExplanationGenerator for ScriptedGenerator {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        request: GenerationRequest<'_>,
    ) -> Result<GeneratedExplanation, GeneratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .per_language
            .lock()
            .unwrap()
            .entry(request.language.to_string())
            .or_default() += 1;

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if let Some((language, error)) = &self.fail_language {
            if language == request.language {
                return Err(error.clone());
            }
        }

        let remaining = self.transient_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(GeneratorError::Transport("connection reset".into()));
        }

        Ok(GeneratedExplanation {
            text: format!("[{}] {}", request.language, request.justification.statement),
            correction_suggestions: vec!["Add a value for hasName".into()],
            model: self.model().to_string(),
        })
    }
}

/// Memory store whose reads or writes can be switched off
#[derive(Debug, Default)]
struct FlakyStore {
    inner: MemoryStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    relation_delay: Duration,
}

impl FlakyStore {
    fn check(&self, flag: &AtomicBool) -> StoreResult<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("disk unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ExplanationStore for FlakyStore {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn get_by_hash(&self, hash: &SignatureHash) -> StoreResult<Option<CacheEntry>> {
        self.check(&self.fail_reads)?;
        self.inner.get_by_hash(hash).await
    }

    async fn put_explanation(
        &self,
        signature: &ViolationSignature,
        language: &str,
        explanation: Explanation,
    ) -> StoreResult<()> {
        self.check(&self.fail_writes)?;
        self.inner.put_explanation(signature, language, explanation).await
    }

    async fn add_relation(
        &self,
        signature: &ViolationSignature,
        relation: Relation,
    ) -> StoreResult<bool> {
        self.check(&self.fail_writes)?;
        if !self.relation_delay.is_zero() {
            tokio::time::sleep(self.relation_delay).await;
        }
        self.inner.add_relation(signature, relation).await
    }

    async fn exists_by_hash(&self, hash: &SignatureHash) -> StoreResult<bool> {
        self.check(&self.fail_reads)?;
        self.inner.exists_by_hash(hash).await
    }

    async fn entries(&self) -> StoreResult<Vec<CacheEntry>> {
        self.check(&self.fail_reads)?;
        self.inner.entries().await
    }
}

struct FixedContext;

impl ContextRetriever for FixedContext {
    fn retrieve(&self, _record: &ViolationRecord) -> xshacl_core::Result<DomainContext> {
        Ok(DomainContext {
            similar_cases: vec!["http://example.org/Carol".into()],
            domain_rules: vec!["Rule <http://example.org/NameRule> (names): every person is named".into()],
            ..DomainContext::default()
        })
    }
}

fn record(focus: &str) -> ViolationRecord {
    ViolationRecord::new(
        focus,
        "http://example.org/PersonShape",
        "http://www.w3.org/ns/shacl#MinCountConstraintComponent",
    )
    .with_path("http://example.org/hasName")
    .with_context("minCount", serde_json::json!(1))
    .with_message("Less than 1 values on <http://example.org/Alice>->ex:hasName")
}

fn sources() -> EvidenceSources {
    let shapes = Arc::new(TripleGraph::parse_ntriples(SHAPES).unwrap());
    let data = Arc::new(TripleGraph::parse_ntriples(DATA).unwrap());
    EvidenceSources::new(shapes, data, Arc::new(FixedContext))
}

fn fast_config() -> ControllerConfig {
    ControllerConfig::builder()
        .generation_timeout_ms(2_000)
        .initial_backoff_ms(1)
        .max_backoff_ms(5)
        .build()
}

fn controller_with(store: Arc<dyn ExplanationStore>, config: ControllerConfig) -> ExplanationCacheController {
    ExplanationCacheController::new(store, config).with_sources(sources())
}

fn langs(codes: &[&str]) -> Vec<String> {
    codes.iter().map(|c| c.to_string()).collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_misses_call_generator_once() {
    let controller = Arc::new(controller_with(Arc::new(MemoryStore::new()), fast_config()));
    let generator = Arc::new(ScriptedGenerator::slow(Duration::from_millis(100)));

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let controller = Arc::clone(&controller);
            let generator = Arc::clone(&generator);
            tokio::spawn(async move {
                let focus = format!("http://example.org/Person{}", i);
                controller
                    .explain(&record(&focus), &langs(&["en"]), generator.as_ref())
                    .await
            })
        })
        .collect();

    let mut generated = 0;
    for task in tasks {
        let response = task.await.unwrap().unwrap();
        let result = response.results["en"].as_ref().unwrap();
        if result.source == ExplanationSource::Generated {
            generated += 1;
        }
        assert!(result.explanation.natural_language_text.starts_with("[en]"));
    }

    assert_eq!(generator.calls(), 1);
    assert_eq!(generated, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_misses_share_one_failure() {
    let controller = Arc::new(controller_with(Arc::new(MemoryStore::new()), fast_config()));
    let generator = Arc::new(ScriptedGenerator {
        delay: Duration::from_millis(50),
        fail_language: Some(("en".into(), GeneratorError::MalformedOutput("empty".into()))),
        ..ScriptedGenerator::default()
    });

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let controller = Arc::clone(&controller);
            let generator = Arc::clone(&generator);
            tokio::spawn(async move {
                let focus = format!("http://example.org/Person{}", i);
                controller
                    .explain(&record(&focus), &langs(&["en"]), generator.as_ref())
                    .await
            })
        })
        .collect();

    for task in tasks {
        let response = task.await.unwrap().unwrap();
        assert!(matches!(
            response.results["en"],
            Err(ExplainError::GenerationFailed { .. })
        ));
    }
    assert_eq!(generator.calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_misses_share_retries_of_one_leader() {
    let config = ControllerConfig::builder()
        .max_retries(2)
        .initial_backoff_ms(1)
        .max_backoff_ms(2)
        .build();
    let controller = Arc::new(controller_with(Arc::new(MemoryStore::new()), config));
    let generator = Arc::new(ScriptedGenerator {
        delay: Duration::from_millis(30),
        fail_language: Some(("en".into(), GeneratorError::Transport("reset".into()))),
        ..ScriptedGenerator::default()
    });

    let tasks: Vec<_> = (0..6)
        .map(|i| {
            let controller = Arc::clone(&controller);
            let generator = Arc::clone(&generator);
            tokio::spawn(async move {
                let focus = format!("http://example.org/Person{}", i);
                controller
                    .explain(&record(&focus), &langs(&["en"]), generator.as_ref())
                    .await
            })
        })
        .collect();

    for task in tasks {
        assert!(task.await.unwrap().unwrap().results["en"].is_err());
    }
    assert_eq!(generator.calls(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn followers_do_not_wait_for_relation_writes() {
    let store = Arc::new(FlakyStore {
        relation_delay: Duration::from_millis(300),
        ..FlakyStore::default()
    });
    let controller = Arc::new(controller_with(store.clone(), fast_config()));
    let generator = Arc::new(ScriptedGenerator::slow(Duration::from_millis(100)));

    let tasks: Vec<_> = ["http://example.org/Alice", "http://example.org/Bob"]
        .into_iter()
        .map(|focus| {
            let controller = Arc::clone(&controller);
            let generator = Arc::clone(&generator);
            tokio::spawn(async move {
                let started = Instant::now();
                let response = controller
                    .explain(&record(focus), &langs(&["en"]), generator.as_ref())
                    .await
                    .unwrap();
                (response.results["en"].as_ref().unwrap().source, started.elapsed())
            })
        })
        .collect();

    let mut sources = Vec::new();
    for task in tasks {
        let (source, elapsed) = task.await.unwrap();
        match source {
            // Three relations at 300ms each
            ExplanationSource::Generated => assert!(elapsed >= Duration::from_millis(900)),
            ExplanationSource::Coalesced => assert!(elapsed < Duration::from_millis(600)),
            ExplanationSource::Hit => panic!("nothing was stored before the flight"),
        }
        sources.push(source);
    }
    sources.sort_by_key(|s| s.to_string());
    assert_eq!(sources, vec![ExplanationSource::Coalesced, ExplanationSource::Generated]);
    assert_eq!(generator.calls(), 1);
    assert_eq!(store.inner.entries().await.unwrap()[0].relation_count(), 3);
}

#[tokio::test]
async fn min_count_miss_builds_tree_and_stores_explanation() {
    let store = Arc::new(MemoryStore::new());
    let controller = controller_with(store.clone(), fast_config());
    let generator = ScriptedGenerator::new();

    let alice = record("http://example.org/Alice");
    let response = controller
        .explain(&alice, &langs(&["en"]), &generator)
        .await
        .unwrap();

    let tree = response.justification.as_ref().expect("tree built on miss");
    assert_eq!(tree.kind, NodeKind::Conclusion);
    assert_eq!(tree.children_of(NodeKind::Premise).count(), 1);
    assert_eq!(tree.children_of(NodeKind::Observation).count(), 0);
    assert!(tree.statement.contains("Alice"));

    let result = response.results["en"].as_ref().unwrap();
    assert_eq!(result.source, ExplanationSource::Generated);
    assert!(result.warnings.is_empty());

    let entry = store
        .get(&response.signature)
        .await
        .unwrap()
        .expect("entry written through");
    let stored = entry.explanation("en").unwrap();
    assert_eq!(stored, &result.explanation);
    assert_eq!(stored.justification.as_ref(), Some(tree));
}

#[tokio::test]
async fn other_focus_node_with_same_signature_hits() {
    let controller = controller_with(Arc::new(MemoryStore::new()), fast_config());
    let generator = ScriptedGenerator::new();

    let first = controller
        .explain(&record("http://example.org/Alice"), &langs(&["en"]), &generator)
        .await
        .unwrap();
    let second = controller
        .explain(&record("http://example.org/Bob"), &langs(&["en"]), &generator)
        .await
        .unwrap();

    assert_eq!(first.signature_hash, second.signature_hash);
    assert_eq!(generator.calls(), 1);

    let hit = second.results["en"].as_ref().unwrap();
    assert_eq!(hit.source, ExplanationSource::Hit);
    assert!(second.justification.is_none());
    assert_eq!(
        hit.explanation.natural_language_text,
        first.explanation("en").unwrap().natural_language_text
    );
}

#[tokio::test]
async fn each_language_is_generated_and_stored_separately() {
    let store = Arc::new(MemoryStore::new());
    let controller = controller_with(store.clone(), fast_config());
    let generator = ScriptedGenerator::new();

    let response = controller
        .explain(&record("http://example.org/Alice"), &langs(&["en", "es"]), &generator)
        .await
        .unwrap();

    assert!(response.is_complete());
    assert_eq!(generator.calls_for("en"), 1);
    assert_eq!(generator.calls_for("es"), 1);

    let entry = store.get(&response.signature).await.unwrap().unwrap();
    assert_eq!(entry.languages().collect::<Vec<_>>(), vec!["en", "es"]);

    // A later request for a third language only generates that one.
    let response = controller
        .explain(&record("http://example.org/Bob"), &langs(&["es", "fr"]), &generator)
        .await
        .unwrap();
    assert_eq!(response.results["es"].as_ref().unwrap().source, ExplanationSource::Hit);
    assert_eq!(response.results["fr"].as_ref().unwrap().source, ExplanationSource::Generated);
    assert_eq!(generator.calls(), 3);
}

#[tokio::test]
async fn failure_in_one_language_does_not_hide_others() {
    let store = Arc::new(MemoryStore::new());
    let controller = controller_with(store.clone(), fast_config());
    let generator = ScriptedGenerator::failing_for(
        "es",
        GeneratorError::MalformedOutput("no text".into()),
    );

    let response = controller
        .explain(&record("http://example.org/Alice"), &langs(&["en", "es"]), &generator)
        .await
        .unwrap();

    assert!(response.results["en"].is_ok());
    match &response.results["es"] {
        Err(ExplainError::GenerationFailed { language, .. }) => assert_eq!(language, "es"),
        other => panic!("expected generation failure, got {:?}", other),
    }
    // Malformed output is not retried.
    assert_eq!(generator.calls_for("es"), 1);
    assert_eq!(response.failures().count(), 1);

    let entry = store.get(&response.signature).await.unwrap().unwrap();
    assert!(entry.explanation("es").is_none());
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let controller = controller_with(Arc::new(MemoryStore::new()), fast_config());
    let generator = ScriptedGenerator::flaky(2);

    let response = controller
        .explain(&record("http://example.org/Alice"), &langs(&["en"]), &generator)
        .await
        .unwrap();

    assert!(response.results["en"].is_ok());
    assert_eq!(generator.calls(), 3);
}

#[tokio::test]
async fn retries_are_bounded() {
    let config = ControllerConfig::builder()
        .max_retries(1)
        .initial_backoff_ms(1)
        .build();
    let controller = controller_with(Arc::new(MemoryStore::new()), config);
    let generator = ScriptedGenerator::flaky(10);

    let response = controller
        .explain(&record("http://example.org/Alice"), &langs(&["en"]), &generator)
        .await
        .unwrap();

    assert!(matches!(
        response.results["en"],
        Err(ExplainError::GenerationFailed { .. })
    ));
    assert_eq!(generator.calls(), 2);
}

#[tokio::test]
async fn slow_generator_times_out() {
    let config = ControllerConfig::builder()
        .generation_timeout_ms(20)
        .max_retries(0)
        .build();
    let controller = controller_with(Arc::new(MemoryStore::new()), config);
    let generator = ScriptedGenerator::slow(Duration::from_secs(5));

    let response = controller
        .explain(&record("http://example.org/Alice"), &langs(&["en"]), &generator)
        .await
        .unwrap();

    match &response.results["en"] {
        Err(ExplainError::GenerationFailed { reason, .. }) => assert!(reason.contains("timed out")),
        other => panic!("expected timeout, got {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelled_leader_hands_over_to_waiting_caller() {
    let controller = Arc::new(controller_with(Arc::new(MemoryStore::new()), fast_config()));
    let stuck = Arc::new(ScriptedGenerator::slow(Duration::from_secs(30)));
    let quick = Arc::new(ScriptedGenerator::new());

    let leader = {
        let controller = Arc::clone(&controller);
        let stuck = Arc::clone(&stuck);
        tokio::spawn(async move {
            controller
                .explain(&record("http://example.org/Alice"), &langs(&["en"]), stuck.as_ref())
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let waiter = {
        let controller = Arc::clone(&controller);
        let quick = Arc::clone(&quick);
        tokio::spawn(async move {
            controller
                .explain(&record("http://example.org/Bob"), &langs(&["en"]), quick.as_ref())
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    leader.abort();
    let response = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .expect("waiter promoted after leader cancellation")
        .unwrap()
        .unwrap();

    let result = response.results["en"].as_ref().unwrap();
    assert_eq!(result.source, ExplanationSource::Generated);
    assert_eq!(stuck.calls(), 1);
    assert_eq!(quick.calls(), 1);
}

#[tokio::test]
async fn write_failure_still_returns_explanation() {
    let store = Arc::new(FlakyStore::default());
    store.fail_writes.store(true, Ordering::SeqCst);
    let controller = controller_with(store.clone(), fast_config());
    let generator = ScriptedGenerator::new();

    let response = controller
        .explain(&record("http://example.org/Alice"), &langs(&["en"]), &generator)
        .await
        .unwrap();

    let result = response.results["en"].as_ref().unwrap();
    assert_eq!(result.source, ExplanationSource::Generated);
    assert!(result.warnings.iter().any(|w| w.contains("not cached")));
    assert!(store.inner.get(&response.signature).await.unwrap().is_none());
}

#[tokio::test]
async fn read_failure_fails_fast_by_default() {
    let store = Arc::new(FlakyStore::default());
    store.fail_reads.store(true, Ordering::SeqCst);
    let controller = controller_with(store, fast_config());
    let generator = ScriptedGenerator::new();

    let err = controller
        .explain(&record("http://example.org/Alice"), &langs(&["en", "es"]), &generator)
        .await
        .unwrap_err();

    assert!(matches!(err, ExplainError::StoreUnavailable(_)));
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn read_failure_can_be_treated_as_miss() {
    let store = Arc::new(FlakyStore::default());
    store.fail_reads.store(true, Ordering::SeqCst);
    let config = ControllerConfig::builder()
        .store_read_policy(StoreReadPolicy::TreatAsMiss)
        .build();
    let controller = controller_with(store, config);
    let generator = ScriptedGenerator::new();

    let response = controller
        .explain(&record("http://example.org/Alice"), &langs(&["en"]), &generator)
        .await
        .unwrap();

    let result = response.results["en"].as_ref().unwrap();
    assert_eq!(result.source, ExplanationSource::Generated);
    assert!(result.warnings.iter().any(|w| w.contains("treated as miss")));
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn batch_preserves_input_order() {
    let controller = controller_with(Arc::new(MemoryStore::new()), fast_config());
    let generator = ScriptedGenerator::new();

    let mut invalid = record("http://example.org/Dave");
    invalid.shape_id.clear();
    let datatype = ViolationRecord::new(
        "http://example.org/Carol",
        "http://example.org/PersonShape",
        "http://www.w3.org/ns/shacl#DatatypeConstraintComponent",
    )
    .with_path("http://example.org/age")
    .with_context("datatype", serde_json::json!("http://www.w3.org/2001/XMLSchema#integer"));

    let records = vec![
        record("http://example.org/Alice"),
        invalid,
        datatype,
        record("http://example.org/Bob"),
    ];
    let responses = controller
        .explain_batch(&records, &langs(&["en"]), &generator)
        .await;

    assert_eq!(responses.len(), 4);
    assert!(responses[0].is_ok());
    assert!(matches!(
        responses[1],
        Err(ExplainError::InvalidViolationRecord(_))
    ));
    let carol = responses[2].as_ref().unwrap();
    assert_eq!(
        carol.signature.constraint_id,
        "http://www.w3.org/ns/shacl#DatatypeConstraintComponent"
    );
    let alice = responses[0].as_ref().unwrap();
    let bob = responses[3].as_ref().unwrap();
    assert_eq!(alice.signature_hash, bob.signature_hash);
    assert_eq!(generator.calls(), 2);
}

#[tokio::test]
async fn leader_records_relations() {
    let store = Arc::new(MemoryStore::new());
    let controller = controller_with(store.clone(), fast_config());
    let generator = ScriptedGenerator::new();

    let response = controller
        .explain(&record("http://example.org/Alice"), &langs(&["en"]), &generator)
        .await
        .unwrap();

    let entry = store.get(&response.signature).await.unwrap().unwrap();
    assert!(entry.similar_cases.contains("http://example.org/Alice"));
    assert!(entry.similar_cases.contains("http://example.org/Carol"));
    assert_eq!(entry.domain_rules.len(), 1);
    assert_eq!(response.context.as_ref().unwrap().similar_cases.len(), 1);
}

#[tokio::test]
async fn relations_can_be_disabled() {
    let store = Arc::new(MemoryStore::new());
    let config = ControllerConfig::builder().record_relations(false).build();
    let controller = controller_with(store.clone(), config);
    let generator = ScriptedGenerator::new();

    let response = controller
        .explain(&record("http://example.org/Alice"), &langs(&["en"]), &generator)
        .await
        .unwrap();

    let entry = store.get(&response.signature).await.unwrap().unwrap();
    assert_eq!(entry.relation_count(), 0);
}

#[tokio::test]
async fn metrics_track_hits_and_misses() {
    let registry = CacheMetricsRegistry::new().unwrap();
    let controller = controller_with(Arc::new(MemoryStore::new()), fast_config())
        .with_metrics(registry.cache().clone());
    let generator = ScriptedGenerator::new();

    for focus in ["http://example.org/Alice", "http://example.org/Bob"] {
        controller
            .explain(&record(focus), &langs(&["en"]), &generator)
            .await
            .unwrap();
    }

    let metrics = registry.cache();
    assert_eq!(metrics.lookups("miss"), 1);
    assert_eq!(metrics.lookups("hit"), 1);
    assert_eq!(metrics.generations("success"), 1);
    assert!(registry
        .encode_text()
        .unwrap()
        .contains("xshacl_cache_lookups_total"));
}

#[tokio::test]
async fn controllers_for_different_datasets_share_the_cache() {
    let store = Arc::new(MemoryStore::new());
    let first = controller_with(store.clone(), fast_config());
    let second = first.for_sources(EvidenceSources::default());
    let generator = ScriptedGenerator::new();

    first
        .explain(&record("http://example.org/Alice"), &langs(&["en"]), &generator)
        .await
        .unwrap();
    let response = second
        .explain(&record("http://example.org/Zed"), &langs(&["en"]), &generator)
        .await
        .unwrap();

    assert_eq!(response.results["en"].as_ref().unwrap().source, ExplanationSource::Hit);
    assert_eq!(generator.calls(), 1);
}
