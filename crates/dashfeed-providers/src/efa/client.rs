//! HTTP client for the EFA stop finder and departure monitor.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use dashfeed_core::{Departure, write_json};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{ProviderError, ProviderResult};

use super::normalize::select_departures;
use super::response::DepartureList;

/// Stop finder endpoint, relative to the base URL.
const STOPFINDER_ENDPOINT: &str = "XML_STOPFINDER_REQUEST";

/// Departure monitor endpoint, relative to the base URL.
const DEPARTURE_MONITOR_ENDPOINT: &str = "XML_DM_REQUEST";

/// EFA client configuration.
#[derive(Debug, Clone)]
pub struct EfaConfig {
    /// Base URL, e.g. `https://efa.vrr.de/vrr`.
    pub base_url: String,

    /// Per-request timeout.
    pub timeout: Duration,

    /// User agent string for API requests.
    pub user_agent: String,

    /// When set, raw responses are dumped into this directory.
    pub debug_dump_dir: Option<PathBuf>,
}

impl EfaConfig {
    /// Default VRR endpoint.
    pub const DEFAULT_BASE_URL: &'static str = "https://efa.vrr.de/vrr";

    /// Default timeout in seconds.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Creates a configuration for the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            user_agent: format!("dashfeed/{}", env!("CARGO_PKG_VERSION")),
            debug_dump_dir: None,
        }
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enables raw response dumps into `dir`.
    pub fn with_debug_dump(mut self, dir: impl Into<PathBuf>) -> Self {
        self.debug_dump_dir = Some(dir.into());
        self
    }
}

impl Default for EfaConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BASE_URL)
    }
}

/// EFA API client.
#[derive(Debug)]
pub struct EfaClient {
    http_client: reqwest::Client,
    config: EfaConfig,
}

impl EfaClient {
    /// Creates a new client.
    pub fn new(config: EfaConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .expect("failed to create HTTP client");

        Self {
            http_client,
            config,
        }
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), name)
    }

    /// Searches stops named `"<city>:<name>"` and returns the raw response.
    pub async fn stop_finder(&self, city: &str, name: &str) -> ProviderResult<Value> {
        let query = [
            ("outputFormat", "JSON".to_string()),
            ("language", "de".to_string()),
            ("stateless", "1".to_string()),
            ("locationServerActive", "1".to_string()),
            ("type_sf", "stop".to_string()),
            ("name_sf", format!("{}:{}", city, name)),
        ];

        let body = self.get_json(STOPFINDER_ENDPOINT, &query).await?;
        self.dump(&format!("sf_{}_{}", city, name), &body);
        Ok(body)
    }

    /// Requests up to `limit` upcoming departures at a stop.
    pub async fn departure_monitor(&self, stop_id: &str, limit: usize) -> ProviderResult<Value> {
        let query = [
            ("outputFormat", "JSON".to_string()),
            ("language", "de".to_string()),
            ("stateless", "1".to_string()),
            ("coordOutputFormat", "WGS84[DD.DDDDD]".to_string()),
            ("type_dm", "stopID".to_string()),
            ("name_dm", stop_id.to_string()),
            ("mode", "direct".to_string()),
            ("dmLineSelectionAll", "1".to_string()),
            ("useAllStops", "1".to_string()),
            ("useRealtime", "1".to_string()),
            ("limit", limit.to_string()),
        ];

        let body = self.get_json(DEPARTURE_MONITOR_ENDPOINT, &query).await?;
        self.dump(&format!("dm_{}", stop_id), &body);
        Ok(body)
    }

    /// Fetches and normalizes departures for a stop.
    ///
    /// Twice `cap` departures are requested so the platform filter has
    /// something left to choose from.
    pub async fn fetch_departures(
        &self,
        stop_id: &str,
        cap: usize,
        platforms: &[String],
        now: DateTime<Local>,
    ) -> ProviderResult<Vec<Departure>> {
        let body = self.departure_monitor(stop_id, cap.saturating_mul(2)).await?;

        match DepartureList::from_response(&body) {
            DepartureList::Departures(raw) => {
                debug!(stop_id, received = raw.len(), "departure monitor answered");
                Ok(select_departures(&raw, platforms, cap, now))
            }
            DepartureList::Malformed(reason) => Err(ProviderError::invalid_response(format!(
                "malformed departure list for stop {}: {}",
                stop_id, reason
            ))
            .with_provider("efa")),
        }
    }

    async fn get_json(&self, endpoint: &str, query: &[(&str, String)]) -> ProviderResult<Value> {
        let response = self
            .http_client
            .get(self.endpoint(endpoint))
            .header(reqwest::header::ACCEPT_CHARSET, "utf-8")
            .query(query)
            .send()
            .await
            .map_err(|e| ProviderError::from_request(e).with_provider("efa"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(
                ProviderError::server(format!("{} returned {}", endpoint, status))
                    .with_provider("efa"),
            );
        }

        let body = response.text().await.map_err(|e| {
            ProviderError::network(format!("failed to read response: {}", e)).with_provider("efa")
        })?;

        serde_json::from_str(&body).map_err(|e| {
            ProviderError::invalid_response(format!("{} returned invalid JSON: {}", endpoint, e))
                .with_provider("efa")
        })
    }

    /// Writes a raw response to the debug directory, if enabled.
    fn dump(&self, label: &str, body: &Value) {
        let Some(dir) = &self.config.debug_dump_dir else {
            return;
        };

        let path = debug_dump_path(dir, label, Utc::now().timestamp());
        match write_json(&path, body) {
            Ok(()) => info!("saved raw API response to {}", path.display()),
            Err(e) => warn!("failed to save raw API response: {}", e),
        }
    }
}

/// `debug_api_<label>_<unix>.json` inside `dir`, with path separators in the
/// label replaced.
fn debug_dump_path(dir: &Path, label: &str, unix: i64) -> PathBuf {
    let label: String = label
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    dir.join(format!("debug_api_{}_{}.json", label, unix))
}
