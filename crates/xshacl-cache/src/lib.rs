//! # xSHACL Cache
//!
//! Turns violation records into cached natural-language explanations.
//!
//! ## Features
//!
//! - **Signature-keyed cache**: violations that differ only by focus node
//!   share one stored explanation per language
//! - **Single flight**: concurrent misses for the same signature and language
//!   trigger exactly one generator call
//! - **Bounded generation**: a concurrency limit, per-attempt timeout and
//!   exponential backoff around every generator call
//! - **Per-language isolation**: a failure in one language never hides
//!   results for the others
//! - **Metrics**: Prometheus counters for hits, misses and generator calls
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use xshacl_cache::{ControllerConfig, ExplanationCacheController, ExplanationGenerator};
//! use xshacl_core::ViolationRecord;
//! use xshacl_storage::MemoryStore;
//!
//! # async fn run(generator: &dyn ExplanationGenerator) -> xshacl_core::Result<()> {
//! let controller =
//!     ExplanationCacheController::new(Arc::new(MemoryStore::new()), ControllerConfig::default());
//!
//! let record = ViolationRecord::new(
//!     "http://example.org/Alice",
//!     "http://example.org/PersonShape",
//!     "http://www.w3.org/ns/shacl#MinCountConstraintComponent",
//! )
//! .with_path("http://example.org/hasName");
//!
//! let response = controller
//!     .explain(&record, &["en".to_string(), "es".to_string()], generator)
//!     .await?;
//! for (language, result) in &response.results {
//!     match result {
//!         Ok(found) => println!("[{}] {}", language, found.explanation.natural_language_text),
//!         Err(e) => eprintln!("[{}] {}", language, e),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod controller;
pub mod flight;
pub mod generator;
pub mod metrics;

pub use config::{ControllerConfig, ControllerConfigBuilder, StoreReadPolicy};
pub use controller::{
    EvidenceSources, ExplainResponse, ExplanationCacheController, ExplanationSource,
    LanguageExplanation,
};
pub use flight::{FlightState, Flighted, SingleFlight};
pub use generator::{
    ExplanationGenerator, GeneratedExplanation, GenerationRequest, GeneratorError,
};
pub use metrics::{CacheMetrics, CacheMetricsRegistry, GenerationTimer, MetricsError};
