//! transit-feed entry point.

use std::process::ExitCode;

use clap::Parser;

use dashfeed_cli::cli::TransitCli;
use dashfeed_cli::commands::{run_until_interrupted, transit};
use dashfeed_core::{TracingConfig, init_tracing};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = TransitCli::parse();

    if let Err(e) = init_tracing(TracingConfig::cli(cli.verbose)) {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }

    run_until_interrupted(transit::execute(&cli)).await
}
