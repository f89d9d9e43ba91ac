//! Google Calendar API client.

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, SecondsFormat, TimeZone, Utc};
use dashfeed_core::CalendarEntry;
use dashfeed_core::display::{
    ALL_DAY_LABEL, TIME_TBD_LABEL, UNTITLED_EVENT_LABEL, event_clock_time,
};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{ProviderError, ProviderResult};

use super::config::GoogleConfig;

/// Upper bound on events requested per calendar.
pub const MAX_RESULTS: u32 = 50;

/// Google Calendar API client bound to one access token.
#[derive(Debug)]
pub struct CalendarClient {
    http_client: reqwest::Client,
    api_base: String,
    access_token: String,
}

impl CalendarClient {
    /// Creates a client using the given access token.
    pub fn new(config: &GoogleConfig, access_token: impl Into<String>) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .expect("failed to create HTTP client");

        Self {
            http_client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        }
    }

    /// Swaps in a refreshed access token.
    pub fn set_access_token(&mut self, token: impl Into<String>) {
        self.access_token = token.into();
    }

    /// Lists single (recurrence-expanded) events starting in the window,
    /// ordered by start time.
    pub async fn list_events(
        &self,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> ProviderResult<Vec<ApiEvent>> {
        let url = format!(
            "{}/calendars/{}/events",
            self.api_base,
            urlencoding::encode(calendar_id)
        );

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(&[
                ("timeMin", time_min.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ("timeMax", time_max.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ("maxResults", MAX_RESULTS.to_string()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
            ])
            .send()
            .await
            .map_err(ProviderError::from_request)?;

        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ProviderError::authentication(
                "access token expired or invalid",
            ));
        }

        if status == reqwest::StatusCode::FORBIDDEN {
            return Err(ProviderError::authorization(format!(
                "access denied to calendar {}",
                calendar_id
            )));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::server(format!(
                "API error ({}): {}",
                status, body
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::network(format!("failed to read response: {}", e)))?;

        let list: EventListResponse = serde_json::from_str(&body).map_err(|e| {
            ProviderError::invalid_response(format!("failed to parse response: {}", e))
        })?;

        debug!(calendar = calendar_id, count = list.items.len(), "listed events");
        Ok(list.items)
    }
}

/// Response from the events list endpoint.
#[derive(Debug, Deserialize)]
struct EventListResponse {
    #[serde(default)]
    items: Vec<ApiEvent>,
}

/// An event as returned by the Calendar API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiEvent {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub start: Option<ApiEventTime>,
}

/// Event start or end. All-day events carry `date`, timed ones `dateTime`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEventTime {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub date_time: Option<String>,
}

impl ApiEvent {
    /// Flattens the event into a feed entry for the named calendar.
    pub fn to_entry(&self, calendar_name: &str, color: &str) -> CalendarEntry {
        let label = self
            .summary
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| UNTITLED_EVENT_LABEL.to_string());

        let start = self.start.clone().unwrap_or_default();
        let (value, is_all_day, start_time) = match (start.date, start.date_time) {
            (Some(date), _) => (ALL_DAY_LABEL.to_string(), true, date),
            (None, Some(date_time)) => match event_clock_time(&date_time) {
                Some(clock) => (clock, false, date_time),
                None => {
                    warn!(event = %label, "unparseable start time {:?}", date_time);
                    (TIME_TBD_LABEL.to_string(), false, date_time)
                }
            },
            (None, None) => {
                warn!(event = %label, "event has no start time");
                (TIME_TBD_LABEL.to_string(), false, String::new())
            }
        };

        CalendarEntry {
            label,
            value,
            unit: calendar_name.to_string(),
            color: color.to_string(),
            is_all_day,
            start_time,
        }
    }
}

/// The local calendar day containing `now`, as a UTC range.
pub fn today_window(now: DateTime<Local>) -> (DateTime<Utc>, DateTime<Utc>) {
    let today = now.date_naive();
    let tomorrow = today.succ_opt().unwrap_or(today);
    (local_midnight(today), local_midnight(tomorrow))
}

fn local_midnight(date: NaiveDate) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN);
    // Midnight can fall into a DST gap; the first valid instant after it is used.
    Local
        .from_local_datetime(&naive)
        .earliest()
        .or_else(|| Local.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::google::OAuthCredentials;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(server: &MockServer) -> GoogleConfig {
        GoogleConfig::new(OAuthCredentials::new(
            "test-client.apps.googleusercontent.com",
            "secret",
        ))
        .with_endpoints(
            format!("{}/auth", server.uri()),
            format!("{}/token", server.uri()),
            server.uri(),
        )
    }

    fn event(json: serde_json::Value) -> ApiEvent {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn all_day_event_entry() {
        let entry = event(serde_json::json!({
            "summary": "Müllabfuhr",
            "start": {"date": "2024-03-15"}
        }))
        .to_entry("Family Calendar", "#68d391");

        assert_eq!(entry.value, "All Day");
        assert!(entry.is_all_day);
        assert_eq!(entry.start_time, "2024-03-15");
        assert_eq!(entry.unit, "Family Calendar");
    }

    #[test]
    fn timed_event_keeps_its_offset() {
        let entry = event(serde_json::json!({
            "summary": "Zahnarzt",
            "start": {"dateTime": "2024-03-15T14:30:00+01:00", "timeZone": "Europe/Berlin"}
        }))
        .to_entry("My Calendar", "#4299e1");

        assert_eq!(entry.value, "14:30");
        assert!(!entry.is_all_day);
        assert_eq!(entry.start_time, "2024-03-15T14:30:00+01:00");
    }

    #[test]
    fn untitled_and_unparseable_events() {
        let entry = event(serde_json::json!({
            "start": {"dateTime": "15.03.2024 14:30"}
        }))
        .to_entry("My Calendar", "#4299e1");
        assert_eq!(entry.label, "No Title");
        assert_eq!(entry.value, "Time TBD");

        let entry = event(serde_json::json!({"summary": ""})).to_entry("c", "#000");
        assert_eq!(entry.label, "No Title");
        assert_eq!(entry.value, "Time TBD");
        assert_eq!(entry.start_time, "");
    }

    #[test]
    fn window_spans_one_local_day() {
        let now = Local.with_ymd_and_hms(2024, 3, 15, 9, 30, 0).single().unwrap();
        let (start, end) = today_window(now);

        assert_eq!(start.with_timezone(&Local).date_naive(), now.date_naive());
        assert_eq!(start.with_timezone(&Local).time(), NaiveTime::MIN);
        assert_eq!(end - start, Duration::hours(24));
        assert!(start <= now.with_timezone(&Utc) && now.with_timezone(&Utc) < end);
    }

    #[tokio::test]
    async fn list_events_sends_expected_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendars/family%40group.calendar.google.com/events"))
            .and(header("authorization", "Bearer ya29.token"))
            .and(query_param("maxResults", "50"))
            .and(query_param("singleEvents", "true"))
            .and(query_param("orderBy", "startTime"))
            .and(query_param("timeMin", "2024-03-14T23:00:00Z"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "kind": "calendar#events",
                "items": [
                    {"summary": "Standup", "start": {"dateTime": "2024-03-15T09:00:00+01:00"}},
                    {"summary": "Urlaub", "start": {"date": "2024-03-15"}}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = CalendarClient::new(&test_config(&server), "ya29.token");
        let min = Utc.with_ymd_and_hms(2024, 3, 14, 23, 0, 0).unwrap();
        let events = client
            .list_events("family@group.calendar.google.com", min, min + Duration::days(1))
            .await
            .unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[1].summary.as_deref(), Some("Urlaub"));
    }

    #[tokio::test]
    async fn list_events_maps_status_codes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendars/expired/events"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/calendars/forbidden/events"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/calendars/broken/events"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let client = CalendarClient::new(&test_config(&server), "t");
        let now = Utc::now();
        let later = now + Duration::days(1);

        let err = client.list_events("expired", now, later).await.unwrap_err();
        assert!(err.is_authentication());

        let err = client.list_events("forbidden", now, later).await.unwrap_err();
        assert_eq!(err.code(), crate::ProviderErrorCode::AuthorizationFailed);

        let err = client.list_events("broken", now, later).await.unwrap_err();
        assert_eq!(err.code(), crate::ProviderErrorCode::InvalidResponse);
    }
}
