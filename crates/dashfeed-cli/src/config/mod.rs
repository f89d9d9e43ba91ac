//! Configuration for the two generators.
//!
//! The calendar generator is configured through environment variables, the
//! transit generator through a JSON file that also caches resolved stop IDs.

pub mod calendar;
pub mod transit;

pub use calendar::{CalendarSettings, CalendarSource};
pub use transit::{StopConfig, StopRepository, TransitConfig};
