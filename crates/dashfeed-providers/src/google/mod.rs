//! Google Calendar access.
//!
//! # Authentication
//!
//! The operator registers an OAuth client in the Google Cloud Console and
//! points the generator at the downloaded credentials file. The first run
//! (or `calendar-feed auth`) performs an authorization code flow with PKCE;
//! the resulting token is persisted and refreshed on later runs.
//!
//! ```ignore
//! use dashfeed_providers::google::{CredentialManager, GoogleConfig, OAuthCredentials};
//!
//! let credentials = OAuthCredentials::from_file("credentials.json")?;
//! let config = GoogleConfig::new(credentials).with_token_path("token.json");
//!
//! let mut session = CredentialManager::new(config)?.obtain_session().await?;
//! let (min, max) = today_window(chrono::Local::now());
//! let events = session.list_events("primary", min, max).await?;
//! ```

mod client;
mod config;
mod flow;
mod oauth;
mod session;
mod tokens;

pub use client::{ApiEvent, ApiEventTime, CalendarClient, MAX_RESULTS, today_window};
pub use config::{GoogleConfig, OAuthCredentials};
pub use flow::{
    BoxFuture, BrowserFlow, ConsoleFlow, CredentialFlow, EnvironmentCapabilities, ManualFlow,
    default_flows, parse_manual_input, run_consent,
};
pub use oauth::{CallbackParams, LoopbackListener, OAuthClient, PkceFlow, TokenResponse};
pub use session::{CalendarSession, CredentialManager, TokenState};
pub use tokens::{TokenInfo, TokenStorage};
