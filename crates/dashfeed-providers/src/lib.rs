//! Data providers for the dashboard feeds.
//!
//! - [`google`] - OAuth credential lifecycle and Google Calendar events
//! - [`efa`] - VRR EFA stop resolution and departures
//! - [`ProviderError`] - Error type shared by both
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐        ┌──────────────────────┐
//! │  Google Calendar API │        │   VRR EFA (JSON)     │
//! └──────────┬───────────┘        └──────────┬───────────┘
//!            │                               │
//!            ▼                               ▼
//! ┌──────────────────────┐        ┌──────────────────────┐
//! │  CredentialManager   │        │  StopResolver        │
//! │  → CalendarSession   │        │  EfaClient           │
//! └──────────┬───────────┘        └──────────┬───────────┘
//!            │ ApiEvent::to_entry            │ select_departures
//!            ▼                               ▼
//!     ┌──────────────┐                ┌──────────────┐
//!     │CalendarEntry │                │  Departure   │
//!     └──────────────┘                └──────────────┘
//! ```

pub mod efa;
pub mod error;
pub mod google;

pub use error::{ProviderError, ProviderErrorCode, ProviderResult};
