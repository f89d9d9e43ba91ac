//! End-to-end runs of the calendar pipeline against a mock Google.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local, TimeZone, Utc};
use dashfeed_cli::commands::calendar;
use dashfeed_cli::config::CalendarSettings;
use dashfeed_providers::ProviderResult;
use dashfeed_providers::google::{
    BoxFuture, CredentialFlow, CredentialManager, EnvironmentCapabilities, GoogleConfig,
    OAuthClient, TokenInfo, TokenStorage,
};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Consent flow that hands out a fixed token and records whether the token
/// file existed when it was asked.
struct RecordingFlow {
    token_path: PathBuf,
    token_file_present: Arc<Mutex<Vec<bool>>>,
}

impl CredentialFlow for RecordingFlow {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn is_available(&self, _: &EnvironmentCapabilities) -> bool {
        true
    }

    fn obtain_credential<'a>(
        &'a self,
        _: &'a OAuthClient,
        _: &'a GoogleConfig,
    ) -> BoxFuture<'a, ProviderResult<TokenInfo>> {
        Box::pin(async move {
            self.token_file_present
                .lock()
                .unwrap()
                .push(self.token_path.exists());
            Ok(TokenInfo::new(
                "consented",
                Some("1//consented".to_string()),
                Some(3600),
                vec![],
            ))
        })
    }
}

struct Fixture {
    server: MockServer,
    dir: TempDir,
    consents: Arc<Mutex<Vec<bool>>>,
}

impl Fixture {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("credentials.json"),
            r#"{"installed": {"client_id": "dashboard.apps.googleusercontent.com", "client_secret": "s3cret"}}"#,
        )
        .unwrap();

        Self {
            server: MockServer::start().await,
            dir,
            consents: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn settings(&self, calendars: &[(&str, &str)]) -> CalendarSettings {
        let mut vars = HashMap::from([
            ("GOOGLE_CREDENTIALS_FILE".to_string(), path_text(&self.path("credentials.json"))),
            ("GOOGLE_TOKEN_FILE".to_string(), path_text(&self.path("token.json"))),
            ("OUTPUT_FILE".to_string(), path_text(&self.path("public/calendar-feed.json"))),
        ]);
        for (n, (id, name)) in calendars.iter().enumerate() {
            vars.insert(format!("CALENDAR_{}_ID", n + 1), id.to_string());
            vars.insert(format!("CALENDAR_{}_NAME", n + 1), name.to_string());
        }
        CalendarSettings::from_lookup(|key| vars.get(key).cloned()).unwrap()
    }

    fn manager(&self, settings: &CalendarSettings) -> CredentialManager {
        let config = settings.google_config().unwrap().with_endpoints(
            format!("{}/auth", self.server.uri()),
            format!("{}/token", self.server.uri()),
            self.server.uri(),
        );
        CredentialManager::new(config)
            .unwrap()
            .with_flows(vec![Box::new(RecordingFlow {
                token_path: self.path("token.json"),
                token_file_present: self.consents.clone(),
            })])
    }

    fn write_token(&self, token: TokenInfo) {
        TokenStorage::new(self.path("token.json")).set(token).unwrap();
    }

    fn stored_token(&self) -> Option<TokenInfo> {
        let mut storage = TokenStorage::new(self.path("token.json"));
        storage.load().unwrap();
        storage.get().cloned()
    }

    fn consents(&self) -> Vec<bool> {
        self.consents.lock().unwrap().clone()
    }

    async fn serve_events(&self, calendar_id: &str, bearer: &str, items: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(format!("/calendars/{}/events", calendar_id)))
            .and(header("authorization", format!("Bearer {}", bearer)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": items})))
            .mount(&self.server)
            .await;
    }
}

fn path_text(path: &Path) -> String {
    path.to_str().unwrap().to_string()
}

fn fixed_now() -> DateTime<Local> {
    Local.with_ymd_and_hms(2024, 3, 15, 7, 45, 0).single().unwrap()
}

fn expired_token() -> TokenInfo {
    let mut token = TokenInfo::new("stale", Some("1//refresh".to_string()), Some(3600), vec![]);
    token.expires_at = Some(Utc::now() - chrono::Duration::minutes(10));
    token
}

fn two_events() -> serde_json::Value {
    json!([
        {"summary": "Zahnarzt", "start": {"dateTime": "2024-03-15T14:30:00+01:00"}},
        {"summary": "Geburtstag Oma", "start": {"date": "2024-03-15"}}
    ])
}

#[tokio::test]
async fn all_day_event_comes_first() {
    let fx = Fixture::new().await;
    fx.write_token(TokenInfo::new("fresh", None, Some(3600), vec![]));
    fx.serve_events("primary", "fresh", two_events()).await;

    let settings = fx.settings(&[("primary", "My Calendar")]);
    let feed = calendar::generate(fx.manager(&settings), &settings, fixed_now())
        .await
        .unwrap();

    assert!(fx.consents().is_empty());
    insta::assert_json_snapshot!(feed, {
        ".lastUpdated" => "[timestamp]",
    }, @r###"
    {
      "title": "Heutige Termine",
      "subtitle": "Friday, March 15, 2024",
      "items": [
        {
          "label": "Geburtstag Oma",
          "value": "All Day",
          "unit": "My Calendar",
          "color": "#4299e1"
        },
        {
          "label": "Zahnarzt",
          "value": "14:30",
          "unit": "My Calendar",
          "color": "#4299e1"
        }
      ],
      "total": 2,
      "lastUpdated": "[timestamp]"
    }
    "###);

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(fx.path("public/calendar-feed.json")).unwrap())
            .unwrap();
    assert_eq!(written["total"], 2);
    assert_eq!(written["items"][0]["value"], "All Day");
}

#[tokio::test]
async fn failing_calendar_contributes_nothing() {
    let fx = Fixture::new().await;
    fx.write_token(TokenInfo::new("fresh", None, Some(3600), vec![]));
    fx.serve_events("primary", "fresh", two_events()).await;
    Mock::given(method("GET"))
        .and(path("/calendars/broken/events"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&fx.server)
        .await;

    let settings = fx.settings(&[("broken", "Work Calendar"), ("primary", "My Calendar")]);
    let feed = calendar::generate(fx.manager(&settings), &settings, fixed_now())
        .await
        .unwrap();

    assert_eq!(feed.total, 2);
    assert!(feed.items.iter().all(|item| item.unit == "My Calendar"));
}

#[tokio::test]
async fn expired_token_is_refreshed_without_consent() {
    let fx = Fixture::new().await;
    fx.write_token(expired_token());
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=1%2F%2Frefresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "refreshed",
            "expires_in": 3599
        })))
        .expect(1)
        .mount(&fx.server)
        .await;
    fx.serve_events("primary", "refreshed", two_events()).await;

    let settings = fx.settings(&[("primary", "My Calendar")]);
    let feed = calendar::generate(fx.manager(&settings), &settings, fixed_now())
        .await
        .unwrap();

    assert_eq!(feed.total, 2);
    assert!(fx.consents().is_empty());
    let stored = fx.stored_token().unwrap();
    assert_eq!(stored.access_token, "refreshed");
    assert_eq!(stored.refresh_token.as_deref(), Some("1//refresh"));
}

#[tokio::test]
async fn rejected_refresh_deletes_token_and_reconsents() {
    let fx = Fixture::new().await;
    fx.write_token(expired_token());
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})))
        .expect(1)
        .mount(&fx.server)
        .await;
    fx.serve_events("primary", "consented", two_events()).await;

    let settings = fx.settings(&[("primary", "My Calendar")]);
    let feed = calendar::generate(fx.manager(&settings), &settings, fixed_now())
        .await
        .unwrap();

    assert_eq!(feed.total, 2);
    // Consent ran once, after the token file was gone.
    assert_eq!(fx.consents(), vec![false]);
    assert_eq!(fx.stored_token().unwrap().access_token, "consented");
}

#[tokio::test]
async fn no_calendars_is_fatal() {
    let fx = Fixture::new().await;
    let settings = fx.settings(&[]);

    let result = calendar::generate(fx.manager(&settings), &settings, fixed_now()).await;
    assert!(result.is_err());
    assert!(!fx.path("public/calendar-feed.json").exists());
}
