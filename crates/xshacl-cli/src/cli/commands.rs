//! CLI command definitions for xshacl-explain

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use xshacl_cache::{
    CacheMetricsRegistry, ControllerConfig, EvidenceSources, ExplanationCacheController,
    StoreReadPolicy,
};
use xshacl_core::signature::parse_hash;
use xshacl_core::{canonicalize, validate_language, ExplainError, GraphContextRetriever};
use xshacl_storage::{export_turtle, ExplanationStore, SledStore, StoreStats};

use super::output::{self, ExplainOutput, OutputFormat, SignatureOutput};
use super::ExitCode;
use crate::client::{GeneratorConfig, OpenAiGenerator, DEFAULT_MODEL};
use crate::error::{CliError, Result};
use crate::input;

/// Cached natural-language explanations for SHACL violations
#[derive(Parser, Debug)]
#[command(name = "xshacl-explain")]
#[command(about = "Explain SHACL violations with a signature-keyed explanation cache", long_about = None)]
#[command(version)]
pub struct ExplainCli {
    /// Output verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: ExplainCommands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum ExplainCommands {
    /// Explain violation records, reusing cached explanations
    Explain(ExplainArgs),

    /// Show one cache entry
    Inspect {
        /// Path to the cache store directory
        #[arg(short, long, env = "XSHACL_STORE")]
        store: PathBuf,

        /// Signature hash (64 hex characters)
        signature: String,

        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Count entries, explanations and relations in the cache
    Stats {
        /// Path to the cache store directory
        #[arg(short, long, env = "XSHACL_STORE")]
        store: PathBuf,

        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Export the cache as Turtle
    Export {
        /// Path to the cache store directory
        #[arg(short, long, env = "XSHACL_STORE")]
        store: PathBuf,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the canonical signature of each violation record
    Signature {
        /// Violation records (JSON)
        #[arg(long)]
        violations: PathBuf,

        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
}

#[derive(Args, Debug)]
pub struct ExplainArgs {
    /// Violation records (JSON array, `{"violations": [...]}` or one record)
    #[arg(long)]
    pub violations: PathBuf,

    /// Shapes graph (Turtle, or N-Triples for `.nt` files)
    #[arg(long)]
    pub shapes: Option<PathBuf>,

    /// Data graph (Turtle, or N-Triples for `.nt` files)
    #[arg(long)]
    pub data: Option<PathBuf>,

    /// Path to the cache store directory
    #[arg(short, long, env = "XSHACL_STORE")]
    pub store: PathBuf,

    /// Language codes to explain in (repeatable)
    #[arg(short, long = "lang", default_value = "en")]
    pub languages: Vec<String>,

    /// Model identifier; selects the provider
    #[arg(short, long, env = "XSHACL_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Override the provider's chat-completions base URL
    #[arg(long, env = "XSHACL_BASE_URL")]
    pub base_url: Option<String>,

    /// Maximum simultaneous generator calls
    #[arg(long)]
    pub max_concurrent: Option<usize>,

    /// Per-attempt generator timeout in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Treat store read failures as cache misses instead of failing
    #[arg(long)]
    pub treat_store_errors_as_miss: bool,

    /// Print Prometheus metrics to stderr when done
    #[arg(long)]
    pub metrics: bool,

    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

impl ExplainArgs {
    /// Environment configuration with command-line overrides applied
    pub fn controller_config(&self) -> ControllerConfig {
        let mut config = ControllerConfig::from_env();
        config.model = Some(self.model.clone());
        if let Some(max) = self.max_concurrent {
            config.max_concurrent_generations = max.max(1);
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.generation_timeout_ms = timeout_ms;
        }
        if self.treat_store_errors_as_miss {
            config.store_read_policy = StoreReadPolicy::TreatAsMiss;
        }
        config
    }
}

fn open_store(path: &Path) -> Result<SledStore> {
    SledStore::open(path).map_err(|e| {
        CliError::StoreError(format!(
            "Failed to open store '{}': {}",
            path.display(),
            e
        ))
    })
}

/// Execute the explain command
pub async fn execute_explain(args: ExplainArgs) -> Result<ExitCode> {
    let records = input::load_violations(&args.violations)?;
    if records.is_empty() {
        return Err(CliError::invalid_input("No violation records to explain"));
    }
    for language in &args.languages {
        validate_language(language)?;
    }

    let shapes = Arc::new(input::load_graph(args.shapes.as_deref())?);
    let data = Arc::new(input::load_graph(args.data.as_deref())?);
    let sources = EvidenceSources::new(
        shapes.clone(),
        data.clone(),
        Arc::new(GraphContextRetriever::new(data, shapes)),
    );

    let mut generator_config = GeneratorConfig::for_model(&args.model);
    if let Some(base_url) = &args.base_url {
        generator_config = generator_config.with_base_url(base_url);
    }
    let generator = OpenAiGenerator::new(generator_config)?;

    let store = Arc::new(open_store(&args.store)?);
    let mut controller =
        ExplanationCacheController::new(store, args.controller_config()).with_sources(sources);

    let registry = if args.metrics {
        let registry = CacheMetricsRegistry::new()
            .map_err(|e| CliError::InternalError(e.to_string()))?;
        controller = controller.with_metrics(registry.cache().clone());
        Some(registry)
    } else {
        None
    };

    tracing::info!(
        records = records.len(),
        languages = ?args.languages,
        model = %args.model,
        base_url = %generator.base_url(),
        "Explaining violations"
    );

    let responses = controller
        .explain_batch(&records, &args.languages, &generator)
        .await;

    let has_invalid = responses
        .iter()
        .any(|r| matches!(r, Err(e) if e.is_user_error()));
    let has_store_error = responses
        .iter()
        .any(|r| matches!(r, Err(ExplainError::StoreUnavailable(_))));

    let output = ExplainOutput::from_responses(&records, &responses);
    output.render(args.format)?;

    if let Some(registry) = registry {
        let text = registry
            .encode_text()
            .map_err(|e| CliError::InternalError(e.to_string()))?;
        eprintln!("{}", text);
    }

    if has_store_error && !has_invalid {
        return Ok(ExitCode::StoreError);
    }
    Ok(ExitCode::from_outcome(has_invalid, output.has_failures()))
}

/// Execute the inspect command
pub async fn execute_inspect(store: PathBuf, signature: String, format: OutputFormat) -> Result<ExitCode> {
    let hash = parse_hash(&signature).map_err(CliError::from)?;
    let store = open_store(&store)?;

    match store.get_by_hash(&hash).await? {
        Some(entry) => {
            output::render_entry(&entry, format)?;
            Ok(ExitCode::Success)
        }
        None => Err(CliError::invalid_input(format!(
            "No cache entry for signature {}",
            hash
        ))),
    }
}

/// Execute the stats command
pub async fn execute_stats(store: PathBuf, format: OutputFormat) -> Result<ExitCode> {
    let store = open_store(&store)?;
    let entries = store.entries().await?;
    output::render_stats(store.name(), &StoreStats::from_entries(&entries), format)?;
    Ok(ExitCode::Success)
}

/// Execute the export command
pub async fn execute_export(store: PathBuf, output: Option<PathBuf>) -> Result<ExitCode> {
    let store = open_store(&store)?;
    let entries = store.entries().await?;
    let turtle = export_turtle(&entries);

    match output {
        Some(path) => {
            std::fs::write(&path, turtle).map_err(|e| {
                CliError::file_error(format!("Failed to write '{}': {}", path.display(), e))
            })?;
            tracing::info!(path = %path.display(), entries = entries.len(), "Exported cache");
        }
        None => print!("{}", turtle),
    }
    Ok(ExitCode::Success)
}

/// Execute the signature command
pub fn execute_signature(violations: PathBuf, format: OutputFormat) -> Result<ExitCode> {
    let records = input::load_violations(&violations)?;

    let signatures: Vec<SignatureOutput> = records
        .iter()
        .map(|record| match canonicalize(record) {
            Ok(signature) => SignatureOutput {
                focus_node: record.focus_node.clone(),
                hash: Some(signature.hash().to_hex()),
                canonical_form: Some(signature.canonical_form()),
                error: None,
            },
            Err(e) => SignatureOutput {
                focus_node: record.focus_node.clone(),
                hash: None,
                canonical_form: None,
                error: Some(e.to_string()),
            },
        })
        .collect();

    output::render_signatures(&signatures, format)?;

    let has_invalid = signatures.iter().any(|s| s.error.is_some());
    Ok(ExitCode::from_outcome(has_invalid, false))
}
