//! Command implementations.

pub mod calendar;
pub mod transit;

use std::future::Future;
use std::process::ExitCode;

use tracing::warn;

use crate::error::CliResult;

/// Exit status after Ctrl-C.
pub const INTERRUPTED_EXIT_CODE: u8 = 130;

/// Runs a command and maps its outcome to an exit code.
///
/// Ctrl-C drops the command where it stands and exits with
/// [`INTERRUPTED_EXIT_CODE`]; files are only ever replaced by rename, so
/// nothing is left half-written.
pub async fn run_until_interrupted<F>(command: F) -> ExitCode
where
    F: Future<Output = CliResult<()>>,
{
    tokio::select! {
        result = command => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("error: {}", e);
                ExitCode::FAILURE
            }
        },
        Ok(()) = tokio::signal::ctrl_c() => {
            warn!("interrupted");
            ExitCode::from(INTERRUPTED_EXIT_CODE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CliError;

    #[tokio::test]
    async fn outcome_maps_to_exit_code() {
        assert_eq!(run_until_interrupted(async { Ok(()) }).await, ExitCode::SUCCESS);
        assert_eq!(
            run_until_interrupted(async { Err(CliError::config("no calendars")) }).await,
            ExitCode::FAILURE
        );
    }
}
