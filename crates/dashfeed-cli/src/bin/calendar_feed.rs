//! calendar-feed entry point.

use std::process::ExitCode;

use clap::Parser;
use tracing::warn;

use dashfeed_cli::cli::{CalendarCli, CalendarCommand};
use dashfeed_cli::commands::{calendar, run_until_interrupted};
use dashfeed_cli::config::CalendarSettings;
use dashfeed_cli::error::CliResult;
use dashfeed_core::{TracingConfig, init_tracing};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = CalendarCli::parse();
    let dotenv = dotenvy::dotenv();

    if let Err(e) = init_tracing(TracingConfig::cli(cli.verbose)) {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }
    if let Err(e) = dotenv
        && !e.not_found()
    {
        warn!("ignoring .env file: {}", e);
    }

    run_until_interrupted(run(cli)).await
}

async fn run(cli: CalendarCli) -> CliResult<()> {
    let settings = CalendarSettings::from_env()?;

    match cli.command {
        Some(CalendarCommand::Auth { force }) => calendar::authorize(&settings, force).await,
        None => calendar::execute(&settings).await,
    }
}
