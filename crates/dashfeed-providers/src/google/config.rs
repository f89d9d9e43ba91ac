//! Google Calendar access configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ProviderError, ProviderResult};

/// Google OAuth authorization endpoint.
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Google OAuth token endpoint.
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Base URL for Google Calendar API v3.
pub const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// OAuth 2.0 client credentials.
///
/// Google requires a registered application, so the operator brings their
/// own client ID and secret from the Cloud Console.
#[derive(Debug, Clone)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Structure of Google's OAuth credentials JSON file.
///
/// Either the Cloud Console layout with an `installed` or `web` section, or
/// `client_id`/`client_secret` at the root.
#[derive(Debug, Deserialize)]
struct CredentialsFile {
    installed: Option<NestedCredentials>,
    web: Option<NestedCredentials>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NestedCredentials {
    client_id: String,
    client_secret: String,
}

impl OAuthCredentials {
    /// Creates new OAuth credentials.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Loads credentials from a Cloud Console JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> ProviderResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProviderError::configuration(format!(
                "failed to read credentials file {}: {}",
                path.display(),
                e
            ))
            .with_source(e)
        })?;
        Self::from_json(&content)
    }

    /// Parses credentials from a Cloud Console JSON string.
    pub fn from_json(json: &str) -> ProviderResult<Self> {
        let file: CredentialsFile = serde_json::from_str(json).map_err(|e| {
            ProviderError::configuration(format!("failed to parse credentials JSON: {}", e))
        })?;

        if let Some(creds) = file.installed.or(file.web) {
            return Ok(Self::new(creds.client_id, creds.client_secret));
        }

        if let (Some(client_id), Some(client_secret)) = (file.client_id, file.client_secret) {
            return Ok(Self::new(client_id, client_secret));
        }

        Err(ProviderError::configuration(
            "credentials file must contain an 'installed'/'web' section or 'client_id'/'client_secret' at root level",
        ))
    }

    /// Checks that the credentials look like a Google OAuth client.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.client_id.is_empty() {
            return Err("client_id is required");
        }
        if !self.client_id.ends_with(".apps.googleusercontent.com") {
            return Err("client_id should end with .apps.googleusercontent.com");
        }
        if self.client_secret.is_empty() {
            return Err("client_secret is required");
        }
        Ok(())
    }
}

/// Configuration for Google Calendar access.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    /// OAuth client credentials.
    pub credentials: OAuthCredentials,

    /// Where the OAuth token is persisted.
    pub token_path: PathBuf,

    /// Per-request timeout.
    pub timeout: Duration,

    /// User agent string for API requests.
    pub user_agent: String,

    /// Inclusive port range for the loopback OAuth listener.
    pub loopback_port_range: (u16, u16),

    /// OAuth scopes to request.
    pub scopes: Vec<String>,

    pub auth_url: String,
    pub token_url: String,
    pub api_base: String,
}

impl GoogleConfig {
    /// Default timeout in seconds.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Default first loopback port.
    pub const DEFAULT_LOOPBACK_PORT: u16 = 8080;

    /// Number of consecutive loopback ports tried.
    pub const LOOPBACK_PORT_COUNT: u16 = 10;

    /// Read-only calendar scope.
    pub const DEFAULT_SCOPE: &'static str = "https://www.googleapis.com/auth/calendar.readonly";

    /// Default token file, relative to the working directory.
    pub const DEFAULT_TOKEN_FILE: &'static str = "token.json";

    /// Creates a configuration with defaults for everything but the credentials.
    pub fn new(credentials: OAuthCredentials) -> Self {
        Self {
            credentials,
            token_path: PathBuf::from(Self::DEFAULT_TOKEN_FILE),
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            user_agent: format!("dashfeed/{}", env!("CARGO_PKG_VERSION")),
            loopback_port_range: Self::port_range_from(Self::DEFAULT_LOOPBACK_PORT),
            scopes: vec![Self::DEFAULT_SCOPE.to_string()],
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            api_base: CALENDAR_API_BASE.to_string(),
        }
    }

    fn port_range_from(first: u16) -> (u16, u16) {
        (
            first,
            first.saturating_add(Self::LOOPBACK_PORT_COUNT - 1),
        )
    }

    /// Sets the token storage path.
    pub fn with_token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_path = path.into();
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the first loopback port; the following ports are tried in order.
    pub fn with_loopback_port(mut self, first: u16) -> Self {
        self.loopback_port_range = Self::port_range_from(first);
        self
    }

    /// Points the OAuth and Calendar endpoints at another host.
    pub fn with_endpoints(
        mut self,
        auth_url: impl Into<String>,
        token_url: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Self {
        self.auth_url = auth_url.into();
        self.token_url = token_url.into();
        self.api_base = api_base.into();
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ProviderResult<()> {
        self.credentials
            .validate()
            .map_err(|e| ProviderError::configuration(format!("invalid credentials: {}", e)))?;

        if self.scopes.is_empty() {
            return Err(ProviderError::configuration(
                "at least one OAuth scope is required",
            ));
        }

        Ok(())
    }
}
