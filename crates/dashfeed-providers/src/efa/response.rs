//! EFA JSON response shapes.
//!
//! The EFA JSON output is a mechanical translation of its XML, so the same
//! field can arrive as an object or a list depending on the number of
//! results, and numbers are usually, but not always, strings. Responses are
//! first read as [`serde_json::Value`] and then classified into explicit
//! shapes; anything unexpected becomes an `Unrecognized`/`Malformed` variant
//! instead of a parse error.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::warn;

/// A scalar that may be sent as a string, a number or a boolean.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FlexValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl FlexValue {
    /// The value as display text.
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Bool(b) => b.to_string(),
        }
    }

    /// The value as an integer, if it is one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Text(s) => s.trim().parse().ok(),
            Self::Integer(i) => Some(*i),
            Self::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Self::Float(_) | Self::Bool(_) => None,
        }
    }

    /// EFA flags are `"1"`/`"0"`, sometimes real booleans.
    pub fn is_set(&self) -> bool {
        match self {
            Self::Text(s) => matches!(s.trim(), "1" | "true"),
            Self::Integer(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Bool(b) => *b,
        }
    }
}

fn text(value: &Option<FlexValue>) -> Option<String> {
    value.as_ref().map(FlexValue::as_text)
}

/// Deserializes a field, mapping a value of the wrong shape to `None`.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Either a single object or a list of them.
fn one_or_many<T: DeserializeOwned + Default>(value: &Value) -> Vec<T> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| serde_json::from_value(item.clone()).unwrap_or_default())
            .collect(),
        other => vec![serde_json::from_value(other.clone()).unwrap_or_default()],
    }
}

// ---------------------------------------------------------------------------
// Stop finder
// ---------------------------------------------------------------------------

/// A stop finder candidate.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StopPoint {
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(default, rename = "ref", deserialize_with = "lenient")]
    pub reference: Option<StopRef>,
}

/// The `ref` block of a candidate.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StopRef {
    #[serde(default)]
    pub id: Option<FlexValue>,
}

impl StopPoint {
    /// The provider stop identifier, if the candidate carries one.
    pub fn stop_id(&self) -> Option<String> {
        self.reference
            .as_ref()
            .and_then(|r| text(&r.id))
            .filter(|id| !id.is_empty())
    }
}

/// The shapes `stopFinder.points` comes in.
#[derive(Debug, Clone, PartialEq)]
pub enum PointsShape {
    /// `{"point": {...}}`
    Single(StopPoint),
    /// `{"point": [...]}` or a bare list.
    Many(Vec<StopPoint>),
    /// Missing, null, or anything else.
    Unrecognized,
}

impl PointsShape {
    /// Classifies a stop finder response body.
    pub fn from_response(body: &Value) -> Self {
        match body.pointer("/stopFinder/points") {
            Some(Value::Object(points)) => match points.get("point") {
                Some(point @ Value::Object(_)) => serde_json::from_value(point.clone())
                    .map(Self::Single)
                    .unwrap_or(Self::Unrecognized),
                Some(list @ Value::Array(_)) => Self::Many(one_or_many(list)),
                _ => Self::Unrecognized,
            },
            Some(list @ Value::Array(_)) => Self::Many(one_or_many(list)),
            _ => Self::Unrecognized,
        }
    }
}

// ---------------------------------------------------------------------------
// Departure monitor
// ---------------------------------------------------------------------------

/// A departure as sent by the departure monitor.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDeparture {
    #[serde(default, deserialize_with = "lenient")]
    pub platform: Option<FlexValue>,
    #[serde(default, deserialize_with = "lenient")]
    pub countdown: Option<FlexValue>,
    #[serde(default, deserialize_with = "lenient")]
    pub date_time: Option<EfaDateTime>,
    #[serde(default, deserialize_with = "lenient")]
    pub real_date_time: Option<EfaDateTime>,
    #[serde(default, deserialize_with = "lenient")]
    pub serving_line: Option<ServingLine>,
    #[serde(default, deserialize_with = "lenient")]
    pub cancelled: Option<FlexValue>,
    #[serde(default, deserialize_with = "lenient")]
    pub operator: Option<Operator>,
    #[serde(default, deserialize_with = "previous_stops")]
    pub prev_stop_seq: Option<Vec<NamedStop>>,
}

fn previous_stops<'de, D>(deserializer: D) -> Result<Option<Vec<NamedStop>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => None,
        other => Some(one_or_many(&other)),
    })
}

impl RawDeparture {
    /// Platform as text, empty if absent.
    pub fn platform(&self) -> String {
        text(&self.platform).unwrap_or_default()
    }

    /// Whether the provider flagged the departure as cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.as_ref().is_some_and(FlexValue::is_set)
    }

    /// Operator name, empty if absent.
    pub fn operator_name(&self) -> String {
        self.operator
            .as_ref()
            .and_then(|o| o.name.clone())
            .unwrap_or_default()
    }
}

/// A date/time split into components.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EfaDateTime {
    #[serde(default)]
    pub year: Option<FlexValue>,
    #[serde(default)]
    pub month: Option<FlexValue>,
    #[serde(default)]
    pub day: Option<FlexValue>,
    #[serde(default)]
    pub hour: Option<FlexValue>,
    #[serde(default)]
    pub minute: Option<FlexValue>,
}

fn component(value: &Option<FlexValue>, default: i64) -> i64 {
    value.as_ref().and_then(FlexValue::as_i64).unwrap_or(default)
}

impl EfaDateTime {
    /// `HH:MM`, missing components read as zero.
    pub fn clock(&self) -> String {
        format!(
            "{:02}:{:02}",
            component(&self.hour, 0),
            component(&self.minute, 0)
        )
    }

    /// `DD.MM.YYYY`, missing day/month read as 1 and a missing year as
    /// `default_year`.
    pub fn date(&self, default_year: i32) -> String {
        format!(
            "{:02}.{:02}.{}",
            component(&self.day, 1),
            component(&self.month, 1),
            component(&self.year, i64::from(default_year))
        )
    }
}

/// The line serving a departure.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServingLine {
    #[serde(default)]
    pub number: Option<FlexValue>,
    #[serde(default)]
    pub direction: Option<FlexValue>,
    #[serde(default)]
    pub name: Option<FlexValue>,
    #[serde(default)]
    pub mot_type: Option<FlexValue>,
    #[serde(default)]
    pub delay: Option<FlexValue>,
    #[serde(default)]
    pub realtime: Option<FlexValue>,
}

impl ServingLine {
    pub fn number(&self) -> Option<String> {
        text(&self.number)
    }

    pub fn direction(&self) -> Option<String> {
        text(&self.direction)
    }

    pub fn name(&self) -> Option<String> {
        text(&self.name).filter(|n| !n.is_empty())
    }

    pub fn mot_type(&self) -> Option<String> {
        text(&self.mot_type)
    }

    /// Delay in minutes; unparseable values read as zero.
    pub fn delay(&self) -> i64 {
        self.delay.as_ref().and_then(FlexValue::as_i64).unwrap_or(0)
    }

    pub fn is_realtime(&self) -> bool {
        self.realtime.as_ref().is_some_and(FlexValue::is_set)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Operator {
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
}

/// An entry of `prevStopSeq`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NamedStop {
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
}

/// The shapes `departureList` comes in.
#[derive(Debug, Clone, PartialEq)]
pub enum DepartureList {
    /// A list, `{"departure": ...}`, `null`, or no list at all.
    Departures(Vec<RawDeparture>),
    /// Any other shape.
    Malformed(&'static str),
}

impl DepartureList {
    /// Classifies a departure monitor response body.
    pub fn from_response(body: &Value) -> Self {
        if !body.is_object() {
            return Self::Malformed("response is not a JSON object");
        }

        match body.get("departureList") {
            None | Some(Value::Null) => Self::Departures(Vec::new()),
            Some(Value::Array(items)) => Self::Departures(parse_departures(items)),
            Some(Value::Object(wrapper)) => match wrapper.get("departure") {
                Some(Value::Array(items)) => Self::Departures(parse_departures(items)),
                Some(single @ Value::Object(_)) => {
                    Self::Departures(parse_departures(std::slice::from_ref(single)))
                }
                _ => Self::Malformed("departureList object without departures"),
            },
            Some(_) => Self::Malformed("departureList has an unexpected type"),
        }
    }
}

fn parse_departures(items: &[Value]) -> Vec<RawDeparture> {
    items
        .iter()
        .filter_map(|item| match serde_json::from_value(item.clone()) {
            Ok(departure) => Some(departure),
            Err(e) => {
                warn!("skipping unreadable departure: {}", e);
                None
            }
        })
        .collect()
}
