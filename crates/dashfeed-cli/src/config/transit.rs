//! JSON configuration for `transit-feed` and the stop ID repository.
//!
//! The configuration file doubles as the stop ID cache: resolved IDs are
//! written into the matching stop entry and the file is saved once at the
//! end of a run. Keys this program does not know are kept as they are.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dashfeed_core::feed::DEFAULT_UPDATE_INTERVAL_MINUTES;
use dashfeed_core::write_json;
use dashfeed_providers::efa::{EfaConfig, StopIdStore, StopKey};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, info};

use crate::error::{CliError, CliResult};

/// Output location when none is configured.
pub const DEFAULT_OUTPUT_FILE: &str = ".";

/// File name used when the output location is a directory.
pub const DEFAULT_OUTPUT_NAME: &str = "vrr_data.json";

/// Per-stop departure cap when neither the stop nor the file sets one.
pub const DEFAULT_MAX_DEPARTURES: usize = 10;

/// The transit configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_departures_per_stop: Option<usize>,

    /// Per-request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_interval_minutes: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default)]
    pub stops: Vec<StopConfig>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TransitConfig {
    pub fn output_file(&self) -> &str {
        self.output_file.as_deref().unwrap_or(DEFAULT_OUTPUT_FILE)
    }

    pub fn max_departures_per_stop(&self) -> usize {
        self.max_departures_per_stop.unwrap_or(DEFAULT_MAX_DEPARTURES)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.unwrap_or(EfaConfig::DEFAULT_TIMEOUT_SECS))
    }

    pub fn update_interval_minutes(&self) -> u32 {
        self.update_interval_minutes
            .unwrap_or(DEFAULT_UPDATE_INTERVAL_MINUTES)
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(EfaConfig::DEFAULT_BASE_URL)
    }

    /// The EFA client configuration for this file.
    pub fn efa_config(&self) -> EfaConfig {
        EfaConfig::new(self.base_url()).with_timeout(self.timeout())
    }

    /// The configuration written when none exists yet.
    pub fn sample() -> Self {
        Self {
            output_file: Some(DEFAULT_OUTPUT_FILE.to_string()),
            max_departures_per_stop: Some(DEFAULT_MAX_DEPARTURES),
            timeout: Some(EfaConfig::DEFAULT_TIMEOUT_SECS),
            stops: vec![
                StopConfig::sample("Düsseldorf", "Hauptbahnhof", true, 8, Some(vec![])),
                StopConfig::sample(
                    "Essen",
                    "Hauptbahnhof",
                    true,
                    5,
                    Some(vec!["1".to_string(), "2".to_string()]),
                ),
                StopConfig::sample("Düsseldorf", "Bismarckplatz", false, 6, None),
            ],
            ..Self::default()
        }
    }
}

/// One monitored stop.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StopConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_departures: Option<usize>,

    /// Platform allow-list; empty or absent allows all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platforms: Option<Vec<String>>,

    /// Cached provider ID. Numbers are accepted and kept as text.
    #[serde(
        default,
        deserialize_with = "stop_id_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub stop_id: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StopConfig {
    fn sample(
        city: &str,
        name: &str,
        enabled: bool,
        max_departures: usize,
        platforms: Option<Vec<String>>,
    ) -> Self {
        Self {
            name: Some(name.to_string()),
            city: Some(city.to_string()),
            enabled: Some(enabled),
            max_departures: Some(max_departures),
            platforms,
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    pub fn platforms(&self) -> &[String] {
        self.platforms.as_deref().unwrap_or_default()
    }

    /// The repository key, if both city and name are present.
    pub fn key(&self) -> Option<StopKey> {
        let city = self.city.as_deref().filter(|c| !c.is_empty())?;
        let name = self.name.as_deref().filter(|n| !n.is_empty())?;
        Some(StopKey::new(city, name))
    }

    /// `"<city> <name>"`, the key of the stop in the feed.
    pub fn display_name(&self) -> String {
        format!(
            "{} {}",
            self.city.as_deref().unwrap_or("Unknown"),
            self.name.as_deref().unwrap_or("Unknown")
        )
    }
}

fn stop_id_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(id)) if !id.is_empty() => Some(id),
        Some(Value::Number(id)) => Some(id.to_string()),
        _ => None,
    })
}

/// The configuration file seen as a stop ID store.
///
/// `put` updates every entry with the same city and name; [`save`] writes
/// the file only when an ID changed.
///
/// [`save`]: StopRepository::save
#[derive(Debug)]
pub struct StopRepository {
    path: PathBuf,
    config: TransitConfig,
    dirty: bool,
    bypass_cache: bool,
    refreshed: HashSet<StopKey>,
}

impl StopRepository {
    /// Loads the configuration at `path`.
    ///
    /// A missing file is replaced by a sample and reported as a
    /// configuration error so the operator can edit it first.
    pub fn open(path: impl Into<PathBuf>) -> CliResult<Self> {
        let path = path.into();
        info!("using configuration file {}", path.display());

        if !path.exists() {
            error!("configuration file {} not found", path.display());
            write_json(&path, &TransitConfig::sample())?;
            info!("created sample configuration file {}", path.display());
            return Err(CliError::config(format!(
                "edit the sample configuration at {} and run again",
                path.display()
            )));
        }

        let content = fs::read_to_string(&path)?;
        let config = serde_json::from_str(&content).map_err(|e| {
            CliError::config(format!("invalid JSON in {}: {}", path.display(), e))
        })?;
        Ok(Self::new(path, config))
    }

    /// Wraps an already loaded configuration.
    pub fn new(path: impl Into<PathBuf>, config: TransitConfig) -> Self {
        Self {
            path: path.into(),
            config,
            dirty: false,
            bypass_cache: false,
            refreshed: HashSet::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &TransitConfig {
        &self.config
    }

    /// Makes every stop resolve again during this run.
    ///
    /// Stored IDs stay in the file until a new one replaces them.
    pub fn invalidate_all(&mut self) {
        info!("ignoring stored stop IDs for this run");
        self.bypass_cache = true;
        self.refreshed.clear();
    }

    /// Whether an ID changed since loading or the last save.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Writes the file if anything changed. Returns whether it wrote.
    pub fn save(&mut self) -> CliResult<bool> {
        if !self.dirty {
            return Ok(false);
        }
        write_json(&self.path, &self.config)?;
        self.dirty = false;
        debug!("configuration file {} updated", self.path.display());
        Ok(true)
    }
}

impl StopIdStore for StopRepository {
    fn get(&self, key: &StopKey) -> Option<String> {
        if self.bypass_cache && !self.refreshed.contains(key) {
            return None;
        }
        self.config
            .stops
            .iter()
            .find(|stop| stop.key().as_ref() == Some(key))
            .and_then(|stop| stop.stop_id.clone())
    }

    fn put(&mut self, key: &StopKey, stop_id: &str) {
        self.refreshed.insert(key.clone());
        for stop in self
            .config
            .stops
            .iter_mut()
            .filter(|stop| stop.key().as_ref() == Some(key))
        {
            if stop.stop_id.as_deref() != Some(stop_id) {
                stop.stop_id = Some(stop_id.to_string());
                self.dirty = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn repository(config: Value) -> StopRepository {
        StopRepository::new("unused.json", serde_json::from_value(config).unwrap())
    }

    #[test]
    fn defaults_apply_when_absent() {
        let config: TransitConfig = serde_json::from_value(json!({"stops": []})).unwrap();
        assert_eq!(config.output_file(), ".");
        assert_eq!(config.max_departures_per_stop(), 10);
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.update_interval_minutes(), 10);
        assert_eq!(config.base_url(), "https://efa.vrr.de/vrr");
    }

    #[test]
    fn stop_entries() {
        let config: TransitConfig = serde_json::from_value(json!({
            "stops": [
                {"name": "Hauptbahnhof", "city": "Essen", "stop_id": 20009289},
                {"name": "Rathaus", "city": "Bochum", "enabled": false, "platforms": ["1"]},
                {"name": "Markt"}
            ]
        }))
        .unwrap();

        let [essen, bochum, markt] = &config.stops[..] else {
            panic!("expected three stops");
        };
        assert_eq!(essen.stop_id.as_deref(), Some("20009289"));
        assert!(essen.is_enabled());
        assert!(essen.platforms().is_empty());
        assert_eq!(essen.display_name(), "Essen Hauptbahnhof");
        assert!(!bochum.is_enabled());
        assert_eq!(bochum.platforms(), ["1"]);
        assert_eq!(markt.key(), None);
    }

    #[test]
    fn unknown_keys_survive_a_rewrite() {
        let before = json!({
            "output_file": "/srv/dashy/vrr.json",
            "theme": "dark",
            "stops": [
                {"name": "Hauptbahnhof", "city": "Essen", "note": "Gleis 1 bevorzugt"}
            ]
        });
        let mut repo = repository(before);
        repo.put(&StopKey::new("Essen", "Hauptbahnhof"), "20009289");

        let written = serde_json::to_value(repo.config()).unwrap();
        assert_eq!(written["theme"], "dark");
        assert_eq!(written["output_file"], "/srv/dashy/vrr.json");
        assert_eq!(written["stops"][0]["note"], "Gleis 1 bevorzugt");
        assert_eq!(written["stops"][0]["stop_id"], "20009289");
        assert!(written.get("timeout").is_none());
    }

    #[test]
    fn put_marks_dirty_only_on_change() {
        let mut repo = repository(json!({
            "stops": [{"name": "Hauptbahnhof", "city": "Essen", "stop_id": "20009289"}]
        }));
        let key = StopKey::new("Essen", "Hauptbahnhof");

        repo.put(&key, "20009289");
        assert!(!repo.is_dirty());
        repo.put(&key, "20009290");
        assert!(repo.is_dirty());
        assert_eq!(repo.get(&key).as_deref(), Some("20009290"));
    }

    #[test]
    fn put_updates_every_matching_entry() {
        let mut repo = repository(json!({
            "stops": [
                {"name": "Hauptbahnhof", "city": "Essen", "platforms": ["1"]},
                {"name": "Hauptbahnhof", "city": "Essen", "platforms": ["2"]},
                {"name": "Hauptbahnhof", "city": "Düsseldorf"}
            ]
        }));
        repo.put(&StopKey::new("Essen", "Hauptbahnhof"), "20009289");

        let ids: Vec<_> = repo
            .config()
            .stops
            .iter()
            .map(|s| s.stop_id.as_deref())
            .collect();
        assert_eq!(ids, [Some("20009289"), Some("20009289"), None]);
    }

    #[test]
    fn invalidation_hides_ids_until_replaced() {
        let mut repo = repository(json!({
            "stops": [{"name": "Hauptbahnhof", "city": "Essen", "stop_id": "1"}]
        }));
        let key = StopKey::new("Essen", "Hauptbahnhof");

        repo.invalidate_all();
        assert_eq!(repo.get(&key), None);
        // Still on disk until a new ID arrives.
        assert_eq!(repo.config().stops[0].stop_id.as_deref(), Some("1"));

        repo.put(&key, "2");
        assert_eq!(repo.get(&key).as_deref(), Some("2"));
    }

    #[test]
    fn save_writes_only_when_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vrr_config.json");
        let mut repo = StopRepository::new(
            &path,
            serde_json::from_value(json!({"stops": [{"name": "Markt", "city": "Bochum"}]})).unwrap(),
        );

        assert!(!repo.save().unwrap());
        assert!(!path.exists());

        repo.put(&StopKey::new("Bochum", "Markt"), "20000200");
        assert!(repo.save().unwrap());
        assert!(!repo.is_dirty());

        let reopened = StopRepository::open(&path).unwrap();
        assert_eq!(
            reopened.get(&StopKey::new("Bochum", "Markt")).as_deref(),
            Some("20000200")
        );
    }

    #[test]
    fn missing_file_gets_a_sample() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vrr_config.json");

        assert!(matches!(StopRepository::open(&path), Err(CliError::Config(_))));

        let sample = StopRepository::open(&path).unwrap();
        let stops = &sample.config().stops;
        assert_eq!(stops.len(), 3);
        assert_eq!(stops[1].platforms(), ["1", "2"]);
        assert!(!stops[2].is_enabled());
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("Düsseldorf"));
    }

    #[test]
    fn invalid_json_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vrr_config.json");
        fs::write(&path, "{\"stops\": [").unwrap();
        assert!(matches!(StopRepository::open(&path), Err(CliError::Config(_))));
    }
}
