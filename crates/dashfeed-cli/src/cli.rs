//! Command-line interface definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// calendar-feed - today's Google Calendar events as a dashboard feed
///
/// Settings come from the environment; a `.env` file in the working
/// directory is read first.
#[derive(Debug, Parser)]
#[command(name = "calendar-feed")]
#[command(author, version, about, long_about = None)]
pub struct CalendarCli {
    /// Enable debug output
    #[arg(long, short = 'v')]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<CalendarCommand>,
}

#[derive(Debug, Subcommand)]
pub enum CalendarCommand {
    /// Authorize access and store the token file
    Auth {
        /// Re-authorize even if a usable token exists
        #[arg(long)]
        force: bool,
    },
}

/// transit-feed - upcoming VRR departures as a dashboard feed
#[derive(Debug, Parser)]
#[command(name = "transit-feed")]
#[command(author, version, about, long_about = None)]
pub struct TransitCli {
    /// Configuration file (default: vrr_config.json next to the executable)
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Save raw API responses to debug files in the working directory
    #[arg(long)]
    pub debug_api: bool,

    /// Look up stop IDs again even if the configuration has them
    #[arg(long)]
    pub resolve_ids: bool,
}

impl TransitCli {
    /// Default configuration file name.
    pub const DEFAULT_CONFIG_FILE: &'static str = "vrr_config.json";

    /// The configuration path to use.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(|| {
            std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(|dir| dir.join(Self::DEFAULT_CONFIG_FILE)))
                .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_CONFIG_FILE))
        })
    }
}
