//! Output documents consumed by the dashboard widget.
//!
//! The widget renders these documents as-is, so field names and nesting are
//! part of the external contract.

use std::collections::BTreeMap;

use chrono::{DateTime, Local, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Error marker stored on a stop whose departures could not be fetched.
pub const FETCH_FAILED_MARKER: &str = "Failed to fetch data";

/// Default refresh hint written into the transit feed.
pub const DEFAULT_UPDATE_INTERVAL_MINUTES: u32 = 10;

/// Formats a local timestamp the way both feeds write it.
pub fn local_timestamp(now: DateTime<Local>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Secs, false)
}

// ---------------------------------------------------------------------------
// Calendar feed
// ---------------------------------------------------------------------------

/// A calendar event flattened for the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEntry {
    /// Event title.
    pub label: String,
    /// Start time (`HH:MM`) or a sentinel.
    pub value: String,
    /// Display name of the calendar the event came from.
    pub unit: String,
    /// Calendar color.
    pub color: String,
    /// Whether the event spans the whole day.
    pub is_all_day: bool,
    /// Raw start value from the provider (date or RFC 3339 datetime), used
    /// as the sort key.
    pub start_time: String,
}

impl CalendarEntry {
    fn into_item(self) -> FeedItem {
        FeedItem {
            label: self.label,
            value: self.value,
            unit: self.unit,
            color: self.color,
        }
    }
}

/// One row of the calendar widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItem {
    pub label: String,
    pub value: String,
    pub unit: String,
    pub color: String,
}

/// The calendar feed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarFeed {
    pub title: String,
    pub subtitle: String,
    pub items: Vec<FeedItem>,
    pub total: usize,
    pub last_updated: String,
}

impl CalendarFeed {
    /// Builds the feed from entries of all calendars.
    ///
    /// Entries are sorted with [`sort_entries`] before being flattened.
    pub fn assemble(
        mut entries: Vec<CalendarEntry>,
        title: impl Into<String>,
        now: DateTime<Local>,
    ) -> Self {
        sort_entries(&mut entries);
        let items: Vec<FeedItem> = entries.into_iter().map(CalendarEntry::into_item).collect();

        Self {
            title: title.into(),
            subtitle: now.format("%A, %B %d, %Y").to_string(),
            total: items.len(),
            items,
            last_updated: now
                .with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

/// Orders entries with all-day events first, then by start string.
///
/// The sort is stable, so events with equal keys keep their fetch order.
pub fn sort_entries(entries: &mut [CalendarEntry]) {
    entries.sort_by(|a, b| {
        b.is_all_day
            .cmp(&a.is_all_day)
            .then_with(|| a.start_time.cmp(&b.start_time))
    });
}

// ---------------------------------------------------------------------------
// Transit feed
// ---------------------------------------------------------------------------

/// Accessibility hints for a departure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accessibility {
    pub wheelchair: bool,
    pub low_floor: bool,
}

/// A single upcoming departure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Departure {
    pub line: String,
    pub destination: String,
    pub platform: String,
    /// Planned departure, `HH:MM`.
    pub departure_time: String,
    /// Planned departure date, `DD.MM.YYYY`.
    pub departure_date: String,
    /// Real-time departure, `HH:MM`, empty without real-time data.
    pub real_time: String,
    pub real_date: String,
    /// Countdown as sent by the provider.
    pub countdown_minutes: Option<String>,
    pub display_time: String,
    pub delay: i64,
    pub delay_text: String,
    pub vehicle_type: String,
    /// The provider's motType code.
    pub route_type: String,
    pub is_realtime: bool,
    pub cancelled: bool,
    pub operator: String,
    pub accessibility: Accessibility,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_stops: Option<Vec<String>>,
}

/// Departures of one stop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopFeed {
    pub city: String,
    pub name: String,
    pub stop_id: String,
    pub platforms: Vec<String>,
    pub departures: Vec<Departure>,
    pub last_updated: String,
    pub count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StopFeed {
    /// A stop whose departures were fetched.
    pub fn populated(
        city: impl Into<String>,
        name: impl Into<String>,
        stop_id: impl Into<String>,
        platforms: Vec<String>,
        departures: Vec<Departure>,
        now: DateTime<Local>,
    ) -> Self {
        Self {
            city: city.into(),
            name: name.into(),
            stop_id: stop_id.into(),
            platforms,
            count: departures.len(),
            departures,
            last_updated: local_timestamp(now),
            error: None,
        }
    }

    /// A stop whose fetch failed: no departures and the error marker.
    pub fn failed(
        city: impl Into<String>,
        name: impl Into<String>,
        stop_id: impl Into<String>,
        platforms: Vec<String>,
        now: DateTime<Local>,
    ) -> Self {
        Self {
            error: Some(FETCH_FAILED_MARKER.to_string()),
            ..Self::populated(city, name, stop_id, platforms, Vec::new(), now)
        }
    }

    /// Whether this stop carries the error marker.
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// The transit feed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitFeed {
    pub last_updated: String,
    pub update_interval_minutes: u32,
    /// Stops keyed by `"<city> <name>"`.
    pub stops: BTreeMap<String, StopFeed>,
}

impl TransitFeed {
    /// Creates an empty feed stamped with `now`.
    pub fn new(update_interval_minutes: u32, now: DateTime<Local>) -> Self {
        Self {
            last_updated: local_timestamp(now),
            update_interval_minutes,
            stops: BTreeMap::new(),
        }
    }

    /// Adds or replaces a stop.
    pub fn insert(&mut self, display_name: impl Into<String>, stop: StopFeed) {
        self.stops.insert(display_name.into(), stop);
    }

    /// Number of departures across all stops.
    pub fn total_departures(&self) -> usize {
        self.stops.values().map(|s| s.count).sum()
    }
}
