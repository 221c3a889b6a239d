//! # xshacl-explain
//!
//! Command-line front end for the explanation cache.
//!
//! ## CLI Usage
//!
//! ```bash
//! # Explain violations in English and Spanish with a local Ollama model
//! xshacl-explain explain --violations violations.json --shapes shapes.nt \
//!     --data data.nt --store .xshacl-cache --lang en --lang es
//!
//! # Use a hosted model (reads OPENAI_API_KEY)
//! xshacl-explain explain --violations violations.json --store .xshacl-cache \
//!     --model gpt-4o-mini --format json
//!
//! # Look at the cache
//! xshacl-explain stats --store .xshacl-cache
//! xshacl-explain inspect --store .xshacl-cache <signature-hex>
//! xshacl-explain export --store .xshacl-cache --output cache.ttl
//!
//! # Show how records are canonicalized
//! xshacl-explain signature --violations violations.json
//! ```

pub mod cli;
pub mod client;
pub mod error;
pub mod input;

pub use cli::{ExitCode, ExplainCli, ExplainCommands, OutputFormat};
pub use client::{GeneratorConfig, OpenAiGenerator, Provider};
pub use error::{CliError, Result};

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise the level follows `-v` / `--quiet`.
pub fn init_tracing(verbose: u8, quiet: bool, json: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Run the CLI and map any error to an exit code
pub async fn run_cli(cli: ExplainCli) -> ExitCode {
    match cli::run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(&e)
        }
    }
}
