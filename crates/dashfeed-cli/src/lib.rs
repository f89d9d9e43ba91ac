//! Command-line generators for the dashboard feeds.
//!
//! Two binaries are built from this crate:
//!
//! - `calendar-feed` writes today's Google Calendar events
//! - `transit-feed` writes upcoming VRR departures

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use cli::{CalendarCli, CalendarCommand, TransitCli};
pub use error::{CliError, CliResult};
