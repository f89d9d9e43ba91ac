//! OAuth token persistence.
//!
//! The token file is rewritten after every consent and refresh, and removed
//! when a refresh is rejected so the next run starts a fresh consent.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ProviderError, ProviderResult};

/// Access tokens are treated as expired this long before Google says so.
const EXPIRY_BUFFER_SECS: i64 = 60;

/// A persisted OAuth credential.
///
/// Also reads Google's "authorized user" layout, where the access token is
/// stored as `token` and the expiry as `expiry`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenInfo {
    /// The access token for API requests.
    #[serde(alias = "token")]
    pub access_token: String,

    /// The refresh token for obtaining new access tokens.
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// When the access token expires.
    #[serde(default, alias = "expiry")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Granted OAuth scopes.
    #[serde(default)]
    pub scopes: Vec<String>,

    /// When the token was last issued or refreshed.
    #[serde(default = "Utc::now")]
    pub last_refresh: DateTime<Utc>,
}

impl TokenInfo {
    /// Creates a token from token endpoint data.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in_secs: Option<i64>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_at: expires_in_secs.map(expiry_from_now),
            scopes,
            last_refresh: Utc::now(),
        }
    }

    /// Returns true if the access token is expired or about to expire.
    ///
    /// Tokens without a recorded expiry are assumed valid; a 401 from the API
    /// still triggers a refresh.
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() >= at)
    }

    /// Returns true if the token can be refreshed without consent.
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Applies a refresh response.
    ///
    /// Google may rotate the refresh token; the old one is kept otherwise.
    pub fn apply_refresh(
        &mut self,
        access_token: impl Into<String>,
        expires_in_secs: Option<i64>,
        refresh_token: Option<String>,
    ) {
        self.access_token = access_token.into();
        self.expires_at = expires_in_secs.map(expiry_from_now);
        if refresh_token.is_some() {
            self.refresh_token = refresh_token;
        }
        self.last_refresh = Utc::now();
    }
}

fn expiry_from_now(secs: i64) -> DateTime<Utc> {
    Utc::now() + Duration::seconds(secs) - Duration::seconds(EXPIRY_BUFFER_SECS)
}

/// File-backed token storage.
#[derive(Debug)]
pub struct TokenStorage {
    path: PathBuf,
    tokens: Option<TokenInfo>,
}

impl TokenStorage {
    /// Creates storage at `path`; nothing is read until [`load`](Self::load).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            tokens: None,
        }
    }

    /// Loads the token file into memory.
    ///
    /// Returns `Ok(true)` if a token was loaded, `Ok(false)` if no file exists.
    pub fn load(&mut self) -> ProviderResult<bool> {
        if !self.path.exists() {
            debug!("no token file at {}", self.path.display());
            return Ok(false);
        }

        let content = fs::read_to_string(&self.path).map_err(|e| {
            ProviderError::configuration(format!("failed to read token file: {}", e))
        })?;

        let tokens: TokenInfo = serde_json::from_str(&content).map_err(|e| {
            ProviderError::configuration(format!("failed to parse token file: {}", e))
        })?;

        debug!("loaded token from {}", self.path.display());
        self.tokens = Some(tokens);
        Ok(true)
    }

    /// Writes the in-memory token to disk.
    pub fn save(&self) -> ProviderResult<()> {
        let tokens = self
            .tokens
            .as_ref()
            .ok_or_else(|| ProviderError::internal("no tokens to save"))?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| {
                ProviderError::configuration(format!("failed to create token directory: {}", e))
            })?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(tokens)
            .map_err(|e| ProviderError::internal(format!("failed to serialize tokens: {}", e)))?;

        fs::write(&temp_path, &content).map_err(|e| {
            ProviderError::configuration(format!("failed to write token file: {}", e))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&temp_path, fs::Permissions::from_mode(0o600));
        }

        fs::rename(&temp_path, &self.path).map_err(|e| {
            ProviderError::configuration(format!("failed to replace token file: {}", e))
        })?;

        debug!("saved token to {}", self.path.display());
        Ok(())
    }

    /// Returns the current token, if any.
    pub fn get(&self) -> Option<&TokenInfo> {
        self.tokens.as_ref()
    }

    /// Replaces the token and persists it.
    pub fn set(&mut self, tokens: TokenInfo) -> ProviderResult<()> {
        self.tokens = Some(tokens);
        self.save()
    }

    /// Applies a refresh response and persists the result.
    pub fn apply_refresh(
        &mut self,
        access_token: impl Into<String>,
        expires_in_secs: Option<i64>,
        refresh_token: Option<String>,
    ) -> ProviderResult<()> {
        let tokens = self
            .tokens
            .as_mut()
            .ok_or_else(|| ProviderError::internal("no tokens to update"))?;
        tokens.apply_refresh(access_token, expires_in_secs, refresh_token);
        self.save()
    }

    /// Forgets the token in memory and deletes the token file.
    pub fn clear(&mut self) -> ProviderResult<()> {
        self.tokens = None;
        if self.path.exists() {
            fs::remove_file(&self.path).map_err(|e| {
                ProviderError::configuration(format!("failed to remove token file: {}", e))
            })?;
            info!("removed token file {}", self.path.display());
        }
        Ok(())
    }

    /// Returns the token file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
