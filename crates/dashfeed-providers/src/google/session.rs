//! Credential lifecycle and the authenticated calendar session.
//!
//! [`CredentialManager::obtain_session`] walks the token state machine:
//!
//! ```text
//! Missing ──consent──────────────────────────────▶ Fresh
//! Expired ──refresh──▶ Fresh
//!    └── rejected / no refresh token ──▶ delete token file ──▶ Missing
//! Fresh ──────────────────────────────────────────▶ session
//! ```
//!
//! Every consent and refresh is written to the token file before use.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::{ProviderError, ProviderResult};

use super::client::{ApiEvent, CalendarClient};
use super::config::GoogleConfig;
use super::flow::{CredentialFlow, EnvironmentCapabilities, default_flows, run_consent};
use super::oauth::OAuthClient;
use super::tokens::{TokenInfo, TokenStorage};

/// Where the stored credential stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    /// No usable token on disk.
    Missing,
    /// Token present and not expired.
    Fresh,
    /// Token present but expired.
    Expired,
}

/// Owns the token file and decides between reuse, refresh and consent.
pub struct CredentialManager {
    config: GoogleConfig,
    oauth: OAuthClient,
    storage: TokenStorage,
    flows: Vec<Box<dyn CredentialFlow>>,
    capabilities: EnvironmentCapabilities,
}

impl CredentialManager {
    /// Creates a manager with the default flow chain and probed capabilities.
    pub fn new(config: GoogleConfig) -> ProviderResult<Self> {
        config.validate()?;
        Ok(Self {
            oauth: OAuthClient::new(&config),
            storage: TokenStorage::new(&config.token_path),
            flows: default_flows(),
            capabilities: EnvironmentCapabilities::probe(),
            config,
        })
    }

    /// Replaces the consent flow chain.
    pub fn with_flows(mut self, flows: Vec<Box<dyn CredentialFlow>>) -> Self {
        self.flows = flows;
        self
    }

    /// Overrides the probed capabilities.
    pub fn with_capabilities(mut self, capabilities: EnvironmentCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// The token file this manager reads and writes.
    pub fn token_path(&self) -> &std::path::Path {
        self.storage.path()
    }

    /// Produces a calendar session with a usable access token.
    pub async fn obtain_session(mut self) -> ProviderResult<CalendarSession> {
        match self.load_state() {
            TokenState::Fresh => info!("using stored token"),
            TokenState::Expired => {
                info!("stored token expired, refreshing");
                if !self.refresh_or_discard().await? {
                    self.consent().await?;
                }
            }
            TokenState::Missing => {
                info!("no stored token, starting consent");
                self.consent().await?;
            }
        }

        let access_token = self
            .storage
            .get()
            .map(|t| t.access_token.clone())
            .ok_or_else(|| ProviderError::internal("token missing after authentication"))?;

        Ok(CalendarSession {
            client: CalendarClient::new(&self.config, access_token),
            manager: self,
            retried_unauthorized: false,
        })
    }

    /// Runs consent unconditionally, or only when no usable token exists.
    ///
    /// Returns the credential that ends up in the token file.
    pub async fn authorize(&mut self, force: bool) -> ProviderResult<TokenInfo> {
        let state = self.load_state();
        if force || state == TokenState::Missing {
            self.consent().await?;
        } else if state == TokenState::Expired && !self.refresh_or_discard().await? {
            self.consent().await?;
        } else {
            info!("token at {} is usable", self.storage.path().display());
        }

        self.storage
            .get()
            .cloned()
            .ok_or_else(|| ProviderError::internal("token missing after authentication"))
    }

    /// Reads the token file and classifies it.
    ///
    /// An unreadable file is deleted so the next step starts from scratch.
    pub fn load_state(&mut self) -> TokenState {
        match self.storage.load() {
            Ok(false) => TokenState::Missing,
            Ok(true) => match self.storage.get() {
                Some(token) if token.is_expired() => TokenState::Expired,
                Some(_) => TokenState::Fresh,
                None => TokenState::Missing,
            },
            Err(e) => {
                warn!("discarding unreadable token file: {}", e);
                if let Err(e) = self.storage.clear() {
                    warn!("{}", e);
                }
                TokenState::Missing
            }
        }
    }

    /// Refreshes the stored token.
    ///
    /// Returns `Ok(false)` after deleting the token file when the token cannot
    /// be refreshed or Google rejects the refresh. Transport failures are
    /// returned as errors and leave the file alone.
    async fn refresh_or_discard(&mut self) -> ProviderResult<bool> {
        let refresh_token = self
            .storage
            .get()
            .filter(|t| t.can_refresh())
            .and_then(|t| t.refresh_token.clone());

        let Some(refresh_token) = refresh_token else {
            warn!("stored token has no refresh token, discarding it");
            self.storage.clear()?;
            return Ok(false);
        };

        match self.oauth.refresh_token(&refresh_token).await {
            Ok(response) => {
                self.storage.apply_refresh(
                    response.access_token,
                    response.expires_in,
                    response.refresh_token,
                )?;
                Ok(true)
            }
            Err(e) if e.is_authentication() => {
                warn!("token refresh rejected, discarding token: {}", e);
                self.storage.clear()?;
                Ok(false)
            }
            Err(e) => Err(e.with_provider("google")),
        }
    }

    async fn consent(&mut self) -> ProviderResult<()> {
        let token = run_consent(&self.flows, &self.capabilities, &self.oauth, &self.config)
            .await
            .map_err(|e| e.with_provider("google"))?;
        self.storage.set(token)?;
        info!("saved new token to {}", self.storage.path().display());
        Ok(())
    }
}

/// An authenticated Calendar API session.
///
/// A 401 from the API triggers one refresh-and-retry per session.
pub struct CalendarSession {
    manager: CredentialManager,
    client: CalendarClient,
    retried_unauthorized: bool,
}

impl CalendarSession {
    /// Lists the events of one calendar in the window.
    pub async fn list_events(
        &mut self,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> ProviderResult<Vec<ApiEvent>> {
        match self.client.list_events(calendar_id, time_min, time_max).await {
            Err(e) if e.is_authentication() && !self.retried_unauthorized => {
                self.retried_unauthorized = true;
                warn!(calendar = calendar_id, "access token rejected, refreshing once");
                if !self.manager.refresh_or_discard().await? {
                    return Err(e.with_provider("google"));
                }
                if let Some(token) = self.manager.storage.get() {
                    self.client.set_access_token(token.access_token.clone());
                }
                self.client
                    .list_events(calendar_id, time_min, time_max)
                    .await
                    .map_err(|e| e.with_provider("google"))
            }
            result => result.map_err(|e| e.with_provider("google")),
        }
    }
}
