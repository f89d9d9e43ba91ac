//! Environment-based settings for `calendar-feed`.

use std::path::PathBuf;
use std::time::Duration;

use dashfeed_core::display::{DEFAULT_CALENDAR_COLOR, builtin_calendar_color, calendar_color_key};
use dashfeed_providers::google::{GoogleConfig, OAuthCredentials};
use tracing::debug;

use crate::error::{CliError, CliResult};

/// Default output location, served by the dashboard.
pub const DEFAULT_OUTPUT_FILE: &str = "/opt/dashy/public/calendar-feed.json";

/// Default feed title.
pub const DEFAULT_FEED_TITLE: &str = "Heutige Termine";

/// Default OAuth client secret file.
pub const DEFAULT_CREDENTIALS_FILE: &str = "credentials.json";

/// A calendar to include in the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarSource {
    pub id: String,
    pub name: String,
    pub color: String,
}

/// Settings read from `GOOGLE_*`, `CALENDAR_<n>_*`, `OUTPUT_FILE` and
/// `FEED_TITLE`.
#[derive(Debug, Clone)]
pub struct CalendarSettings {
    pub credentials_file: PathBuf,
    pub token_file: PathBuf,
    pub output_file: PathBuf,
    pub feed_title: String,
    pub http_timeout: Duration,
    pub oauth_port: u16,
    pub calendars: Vec<CalendarSource>,
}

impl CalendarSettings {
    /// Reads settings from the process environment.
    pub fn from_env() -> CliResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> CliResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let http_timeout = match get("GOOGLE_HTTP_TIMEOUT") {
            Some(value) => Duration::from_secs(value.trim().parse().map_err(|_| {
                CliError::config(format!("GOOGLE_HTTP_TIMEOUT is not a number: {}", value))
            })?),
            None => Duration::from_secs(GoogleConfig::DEFAULT_TIMEOUT_SECS),
        };

        let oauth_port = match get("GOOGLE_OAUTH_PORT") {
            Some(value) => value.trim().parse().map_err(|_| {
                CliError::config(format!("GOOGLE_OAUTH_PORT is not a port: {}", value))
            })?,
            None => GoogleConfig::DEFAULT_LOOPBACK_PORT,
        };

        let mut calendars = Vec::new();
        for n in 1.. {
            let (Some(id), Some(name)) = (
                get(&format!("CALENDAR_{}_ID", n)),
                get(&format!("CALENDAR_{}_NAME", n)),
            ) else {
                break;
            };
            let color = get(&calendar_color_key(&name))
                .or_else(|| builtin_calendar_color(&name).map(str::to_string))
                .unwrap_or_else(|| DEFAULT_CALENDAR_COLOR.to_string());
            debug!(calendar = %name, %color, "configured calendar");
            calendars.push(CalendarSource { id, name, color });
        }

        Ok(Self {
            credentials_file: get("GOOGLE_CREDENTIALS_FILE")
                .unwrap_or_else(|| DEFAULT_CREDENTIALS_FILE.to_string())
                .into(),
            token_file: get("GOOGLE_TOKEN_FILE")
                .unwrap_or_else(|| GoogleConfig::DEFAULT_TOKEN_FILE.to_string())
                .into(),
            output_file: get("OUTPUT_FILE")
                .unwrap_or_else(|| DEFAULT_OUTPUT_FILE.to_string())
                .into(),
            feed_title: get("FEED_TITLE").unwrap_or_else(|| DEFAULT_FEED_TITLE.to_string()),
            http_timeout,
            oauth_port,
            calendars,
        })
    }

    /// Fails when no calendar is configured.
    pub fn require_calendars(&self) -> CliResult<&[CalendarSource]> {
        if self.calendars.is_empty() {
            return Err(CliError::config(
                "no calendars configured, set CALENDAR_1_ID and CALENDAR_1_NAME",
            ));
        }
        Ok(&self.calendars)
    }

    /// Builds the Google configuration, reading the credentials file.
    pub fn google_config(&self) -> CliResult<GoogleConfig> {
        if !self.credentials_file.exists() {
            return Err(CliError::config(format!(
                "credentials file not found: {} (download it from the Google Cloud Console)",
                self.credentials_file.display()
            )));
        }
        let credentials = OAuthCredentials::from_file(&self.credentials_file)?;

        Ok(GoogleConfig::new(credentials)
            .with_token_path(&self.token_file)
            .with_timeout(self.http_timeout)
            .with_loopback_port(self.oauth_port))
    }
}
