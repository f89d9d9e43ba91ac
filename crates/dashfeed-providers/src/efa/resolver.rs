//! Stop name to stop ID resolution.
//!
//! Resolved IDs are written back through a [`StopIdStore`], so a stop is
//! searched once and then served from the store until the store forgets it.

use std::fmt;

use tracing::{debug, info, warn};

use super::client::EfaClient;
use super::response::{PointsShape, StopPoint};

/// A stop identified by city and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StopKey {
    pub city: String,
    pub name: String,
}

impl StopKey {
    pub fn new(city: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for StopKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.city, self.name)
    }
}

/// Persistent cache of resolved stop IDs.
pub trait StopIdStore {
    /// The cached ID for a stop, if any.
    fn get(&self, key: &StopKey) -> Option<String>;

    /// Records a resolved ID.
    fn put(&mut self, key: &StopKey, stop_id: &str);
}

/// What to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopLocator<'a> {
    /// An ID known from a previous run.
    Cached(&'a str),
    /// A stop that has to be searched.
    Search { city: &'a str, name: &'a str },
}

/// Outcome of a resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Served from the cache, no request made.
    Cached(String),
    /// Found by the stop finder.
    Found(String),
    /// No usable candidate, or the search failed.
    NotFound,
}

impl Resolution {
    /// The stop ID, if resolved.
    pub fn stop_id(&self) -> Option<&str> {
        match self {
            Self::Cached(id) | Self::Found(id) => Some(id),
            Self::NotFound => None,
        }
    }
}

/// Picks the stop ID from a stop finder answer.
///
/// A single point is taken if it has an ID. Among several, the first whose
/// lower-cased name contains (or starts with) the lower-cased search name
/// wins; otherwise the first point, if it has an ID.
pub fn select_candidate(points: &PointsShape, search_name: &str) -> Option<String> {
    match points {
        PointsShape::Single(point) => point.stop_id(),
        PointsShape::Many(points) => {
            let search_name = search_name.to_lowercase();
            points
                .iter()
                .filter_map(|point| point.stop_id().map(|id| (point, id)))
                .find(|(point, _)| name_matches(point, &search_name))
                .map(|(_, id)| id)
                .or_else(|| points.first().and_then(StopPoint::stop_id))
        }
        PointsShape::Unrecognized => None,
    }
}

fn name_matches(point: &StopPoint, search_name: &str) -> bool {
    let point_name = point.name.as_deref().unwrap_or_default().to_lowercase();
    point_name.contains(search_name) || point_name.starts_with(search_name)
}

/// Resolves stops against the EFA stop finder.
#[derive(Debug)]
pub struct StopResolver<'a> {
    client: &'a EfaClient,
}

impl<'a> StopResolver<'a> {
    pub fn new(client: &'a EfaClient) -> Self {
        Self { client }
    }

    /// Resolves a locator. Cached IDs are returned without a request.
    ///
    /// Search failures are logged and reported as [`Resolution::NotFound`].
    pub async fn resolve(&self, locator: StopLocator<'_>) -> Resolution {
        let (city, name) = match locator {
            StopLocator::Cached(id) => return Resolution::Cached(id.to_string()),
            StopLocator::Search { city, name } => (city, name),
        };

        let label = format!("{}:{}", city, name);
        info!(stop = %label, "searching stop ID");
        let body = match self.client.stop_finder(city, name).await {
            Ok(body) => body,
            Err(e) => {
                warn!(stop = %label, "stop search failed: {}", e);
                return Resolution::NotFound;
            }
        };

        let points = PointsShape::from_response(&body);
        debug!(?points, "stop finder candidates");
        match select_candidate(&points, name) {
            Some(id) => Resolution::Found(id),
            None => {
                warn!(stop = %label, "no stop ID found");
                Resolution::NotFound
            }
        }
    }

    /// Resolves a stop through the store, recording newly found IDs.
    pub async fn resolve_through<S: StopIdStore + ?Sized>(
        &self,
        store: &mut S,
        key: &StopKey,
    ) -> Resolution {
        let cached = store.get(key).filter(|id| !id.is_empty());
        let locator = match cached.as_deref() {
            Some(id) => StopLocator::Cached(id),
            None => StopLocator::Search {
                city: &key.city,
                name: &key.name,
            },
        };

        let resolution = self.resolve(locator).await;
        if let Resolution::Found(id) = &resolution {
            info!(stop = %key, stop_id = %id, "resolved stop ID");
            store.put(key, id);
        }
        resolution
    }
}
