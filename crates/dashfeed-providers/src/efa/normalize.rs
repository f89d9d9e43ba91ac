//! Turns departure monitor entries into feed departures.

use chrono::{DateTime, Datelike, Duration, Local};
use dashfeed_core::display::{countdown_display, delay_text, is_low_floor, vehicle_type};
use dashfeed_core::{Accessibility, Departure};

use super::response::{RawDeparture, ServingLine};

/// motType assumed when the provider omits it.
pub const DEFAULT_MOT_TYPE: &str = "5";

/// Vehicle label when neither motType nor line name help.
const DEFAULT_VEHICLE_LABEL: &str = "Bus";

/// Placeholder for a missing line number or destination.
const UNKNOWN: &str = "Unknown";

/// Normalizes one departure.
///
/// `now` anchors departures that only carry a countdown.
pub fn normalize_departure(raw: &RawDeparture, now: DateTime<Local>) -> Departure {
    let line = raw.serving_line.clone().unwrap_or_default();
    let countdown = raw.countdown.as_ref();
    let countdown_minutes = countdown.and_then(|c| c.as_i64());

    let (departure_time, departure_date) = match (&raw.date_time, countdown_minutes) {
        (Some(dt), _) => (dt.clock(), dt.date(now.year())),
        (None, Some(minutes)) => Duration::try_minutes(minutes)
            .and_then(|offset| now.checked_add_signed(offset))
            .map(|at| (at.format("%H:%M").to_string(), at.format("%d.%m.%Y").to_string()))
            .unwrap_or_default(),
        (None, None) => (String::new(), String::new()),
    };

    let (real_time, real_date) = raw
        .real_date_time
        .as_ref()
        .map(|dt| (dt.clock(), dt.date(now.year())))
        .unwrap_or_default();

    let vehicle = vehicle_label(&line);
    let delay = line.delay();

    Departure {
        line: line.number().unwrap_or_else(|| UNKNOWN.to_string()),
        destination: line.direction().unwrap_or_else(|| UNKNOWN.to_string()),
        platform: raw.platform(),
        display_time: countdown_display(countdown_minutes, &departure_time),
        departure_time,
        departure_date,
        real_time,
        real_date,
        countdown_minutes: countdown.map(|c| c.as_text()),
        delay,
        delay_text: delay_text(delay),
        accessibility: Accessibility {
            wheelchair: false,
            low_floor: is_low_floor(&vehicle),
        },
        vehicle_type: vehicle,
        route_type: line.mot_type().unwrap_or_else(|| DEFAULT_MOT_TYPE.to_string()),
        is_realtime: line.is_realtime(),
        cancelled: raw.is_cancelled(),
        operator: raw.operator_name(),
        previous_stops: raw.prev_stop_seq.as_ref().map(|stops| {
            stops
                .iter()
                .map(|s| s.name.clone().unwrap_or_default())
                .collect()
        }),
    }
}

fn vehicle_label(line: &ServingLine) -> String {
    let fallback = line
        .name()
        .unwrap_or_else(|| DEFAULT_VEHICLE_LABEL.to_string());
    let mot_type = line.mot_type().unwrap_or_else(|| DEFAULT_MOT_TYPE.to_string());
    vehicle_type(&mot_type, &fallback)
}

/// Whether a platform passes the allow-list; an empty list allows all.
pub fn platform_allowed(platform: &str, allowed: &[String]) -> bool {
    allowed.is_empty() || allowed.iter().any(|p| p == platform)
}

/// Normalizes departures in response order, keeping at most `cap` that pass
/// the platform allow-list.
pub fn select_departures(
    raw: &[RawDeparture],
    platforms: &[String],
    cap: usize,
    now: DateTime<Local>,
) -> Vec<Departure> {
    raw.iter()
        .map(|departure| normalize_departure(departure, now))
        .filter(|departure| platform_allowed(&departure.platform, platforms))
        .take(cap)
        .collect()
}
