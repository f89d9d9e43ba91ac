//! VRR EFA transit access.
//!
//! Stops are configured by city and name; [`StopResolver`] turns those into
//! EFA stop IDs through the stop finder, and [`EfaClient::fetch_departures`]
//! queries the departure monitor and normalizes the result.
//!
//! ```ignore
//! use dashfeed_providers::efa::{EfaClient, EfaConfig, StopKey, StopResolver};
//!
//! let client = EfaClient::new(EfaConfig::default());
//! let resolution = StopResolver::new(&client)
//!     .resolve_through(&mut repository, &StopKey::new("Essen", "Hauptbahnhof"))
//!     .await;
//! if let Some(stop_id) = resolution.stop_id() {
//!     let departures = client.fetch_departures(stop_id, 10, &[], chrono::Local::now()).await?;
//! }
//! ```

mod client;
mod normalize;
mod resolver;
mod response;

pub use client::{EfaClient, EfaConfig};
pub use normalize::{DEFAULT_MOT_TYPE, normalize_departure, platform_allowed, select_departures};
pub use resolver::{Resolution, StopIdStore, StopKey, StopLocator, StopResolver, select_candidate};
pub use response::{
    DepartureList, EfaDateTime, FlexValue, NamedStop, Operator, PointsShape, RawDeparture,
    ServingLine, StopPoint, StopRef,
};
