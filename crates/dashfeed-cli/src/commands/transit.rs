//! `transit-feed` command.

use chrono::{DateTime, Local};
use dashfeed_core::{StopFeed, TransitFeed, resolve_output_path, write_json};
use dashfeed_providers::efa::{EfaClient, StopResolver};
use tracing::{error, info, warn};

use crate::cli::TransitCli;
use crate::config::StopRepository;
use crate::config::transit::DEFAULT_OUTPUT_NAME;
use crate::error::CliResult;

const UNKNOWN: &str = "Unknown";

/// Fetches departures for every enabled stop, in configuration order.
///
/// Newly resolved stop IDs go into `repo`; saving it is up to the caller.
/// A stop that cannot be resolved is skipped, a stop whose departures
/// cannot be fetched is reported with the error marker.
pub async fn run(repo: &mut StopRepository, client: &EfaClient, now: DateTime<Local>) -> TransitFeed {
    let config = repo.config();
    let default_cap = config.max_departures_per_stop();
    let stops = config.stops.clone();
    let mut feed = TransitFeed::new(config.update_interval_minutes(), now);
    let resolver = StopResolver::new(client);

    for stop in &stops {
        let display_name = stop.display_name();
        if !stop.is_enabled() {
            info!(stop = %display_name, "skipping disabled stop");
            continue;
        }

        let stop_id = match stop.key() {
            Some(key) => resolver
                .resolve_through(&mut *repo, &key)
                .await
                .stop_id()
                .map(str::to_string),
            None => {
                if stop.stop_id.is_none() {
                    error!(stop = %display_name, "stop entry needs city and name");
                }
                stop.stop_id.clone()
            }
        };
        let Some(stop_id) = stop_id else {
            continue;
        };

        let cap = stop.max_departures.unwrap_or(default_cap);
        let platforms = stop.platforms().to_vec();
        if platforms.is_empty() {
            info!(stop = %display_name, %stop_id, "fetching departures for all platforms");
        } else {
            info!(
                stop = %display_name,
                %stop_id,
                platforms = %platforms.join(", "),
                "fetching departures"
            );
        }

        let city = stop.city.as_deref().unwrap_or(UNKNOWN);
        let name = stop.name.as_deref().unwrap_or(UNKNOWN);
        let stop_feed = match client.fetch_departures(&stop_id, cap, &platforms, now).await {
            Ok(departures) => {
                info!(stop = %display_name, count = departures.len(), "fetched departures");
                StopFeed::populated(city, name, stop_id, platforms, departures, now)
            }
            Err(e) => {
                warn!(stop = %display_name, "failed to fetch departures: {}", e);
                StopFeed::failed(city, name, stop_id, platforms, now)
            }
        };
        feed.insert(display_name, stop_feed);
    }

    feed
}

/// Loads the configuration, fetches and writes the feed.
pub async fn execute(cli: &TransitCli) -> CliResult<()> {
    let mut repo = StopRepository::open(cli.config_path())?;
    if cli.resolve_ids {
        repo.invalidate_all();
    }

    let mut efa_config = repo.config().efa_config();
    if cli.debug_api {
        efa_config = efa_config.with_debug_dump(".");
    }
    let client = EfaClient::new(efa_config);

    generate(&mut repo, &client, Local::now()).await.map(|_| ())
}

/// Runs all stops, saves changed stop IDs and writes the feed.
///
/// A failed configuration save is logged; the feed is still written.
pub async fn generate(
    repo: &mut StopRepository,
    client: &EfaClient,
    now: DateTime<Local>,
) -> CliResult<TransitFeed> {
    info!("starting VRR data fetch");
    let feed = run(repo, client, now).await;

    if let Err(e) = repo.save() {
        error!("failed to save configuration: {}", e);
    }

    let output = resolve_output_path(repo.config().output_file(), DEFAULT_OUTPUT_NAME);
    write_json(&output, &feed)?;
    info!(
        stops = feed.stops.len(),
        departures = feed.total_departures(),
        "data saved to {}",
        output.display()
    );
    Ok(feed)
}
