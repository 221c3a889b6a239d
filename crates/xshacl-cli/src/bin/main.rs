//! xshacl-explain
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Some explanation could not be produced
//! - 3: Invalid input or arguments
//! - 4: File not found or inaccessible
//! - 5: Cache store error
//! - 10: Internal error

use clap::Parser;
use xshacl_cli::{init_tracing, run_cli, ExplainCli};

#[tokio::main]
async fn main() {
    let cli = ExplainCli::parse();
    init_tracing(cli.verbose, cli.quiet, cli.log_json);

    let exit_code = run_cli(cli).await;
    std::process::exit(exit_code.into());
}
