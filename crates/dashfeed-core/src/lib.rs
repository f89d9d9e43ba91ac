//! Core types: feed documents, display rules, JSON output, tracing

pub mod display;
pub mod feed;
pub mod output;
pub mod tracing;

pub use feed::{
    Accessibility, CalendarEntry, CalendarFeed, Departure, FeedItem, StopFeed, TransitFeed,
    FETCH_FAILED_MARKER, sort_entries,
};
pub use output::{OutputError, resolve_output_path, write_json};
pub use self::tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
