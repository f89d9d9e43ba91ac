//! Display rules shared by the feed generators.
//!
//! These turn provider values into the short strings the dashboard widget
//! shows verbatim. The dashboard is German, so transit sentinels are too.

use chrono::DateTime;

/// Value shown for all-day calendar events.
pub const ALL_DAY_LABEL: &str = "All Day";

/// Value shown when an event start cannot be parsed.
pub const TIME_TBD_LABEL: &str = "Time TBD";

/// Title used for calendar events without a summary.
pub const UNTITLED_EVENT_LABEL: &str = "No Title";

/// Display value for departures leaving now.
pub const DEPARTING_NOW_LABEL: &str = "sofort";

/// Unit appended to short countdowns.
pub const MINUTES_UNIT: &str = "Min";

/// Delay text for punctual departures.
pub const ON_TIME_LABEL: &str = "pünktlich";

/// Fallback color for calendars without a configured one.
pub const DEFAULT_CALENDAR_COLOR: &str = "#a0aec0";

/// Built-in calendar colors, keyed by calendar display name.
const CALENDAR_COLORS: &[(&str, &str)] = &[
    ("My Calendar", "#4299e1"),
    ("Wife's Calendar", "#ed8936"),
    ("Our Calendar", "#38b2ac"),
    ("Family Calendar", "#68d391"),
    ("Work Calendar", "#9f7aea"),
    ("Kids Calendar", "#f56565"),
];

/// EFA motType codes and their vehicle labels.
const VEHICLE_TYPES: &[(&str, &str)] = &[
    ("0", "Zug"),
    ("1", "S-Bahn"),
    ("2", "U-Bahn"),
    ("3", "Straßenbahn"),
    ("4", "Stadtbus"),
    ("5", "Regionalbus"),
    ("6", "Schnellbus"),
    ("7", "Bus"),
    ("8", "Sonstige"),
    ("9", "Fähre"),
    ("10", "AST"),
];

/// Formats the start of a timed calendar event as `HH:MM`.
///
/// The time is rendered in the offset the provider sent, not converted to
/// the local zone. Returns `None` when the value is not RFC 3339.
pub fn event_clock_time(date_time: &str) -> Option<String> {
    DateTime::parse_from_rfc3339(date_time)
        .ok()
        .map(|dt| dt.format("%H:%M").to_string())
}

/// Returns the built-in color for a calendar name, if there is one.
pub fn builtin_calendar_color(calendar_name: &str) -> Option<&'static str> {
    CALENDAR_COLORS
        .iter()
        .find(|(name, _)| *name == calendar_name)
        .map(|(_, color)| *color)
}

/// Environment variable consulted for a calendar's color override.
///
/// `"Wife's Calendar"` becomes `WIFES_CALENDAR_COLOR`.
pub fn calendar_color_key(calendar_name: &str) -> String {
    let mut key: String = calendar_name
        .to_uppercase()
        .replace(' ', "_")
        .replace('\'', "");
    key.push_str("_COLOR");
    key
}

/// Human-facing departure value.
///
/// A countdown wins over the absolute time while it is under an hour.
pub fn countdown_display(countdown: Option<i64>, absolute_time: &str) -> String {
    match countdown {
        Some(minutes) if minutes <= 0 => DEPARTING_NOW_LABEL.to_string(),
        Some(minutes) if minutes < 60 => format!("{minutes} {MINUTES_UNIT}"),
        _ => absolute_time.to_string(),
    }
}

/// Delay text: on-time sentinel for zero, explicit sign otherwise.
pub fn delay_text(delay: i64) -> String {
    match delay {
        0 => ON_TIME_LABEL.to_string(),
        d if d > 0 => format!("+{d}"),
        d => d.to_string(),
    }
}

/// Maps a motType code to a vehicle label, keeping `fallback` for unknown codes.
pub fn vehicle_type(mot_type: &str, fallback: &str) -> String {
    VEHICLE_TYPES
        .iter()
        .find(|(code, _)| *code == mot_type)
        .map(|(_, label)| (*label).to_string())
        .unwrap_or_else(|| fallback.to_string())
}

/// Whether a vehicle label advertises a low-floor vehicle.
pub fn is_low_floor(vehicle_type: &str) -> bool {
    vehicle_type.to_lowercase().contains("niederflur")
}
