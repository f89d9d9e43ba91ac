//! `calendar-feed` commands.

use chrono::{DateTime, Local};
use dashfeed_core::{CalendarFeed, write_json};
use dashfeed_providers::google::{CalendarSession, CredentialManager, TokenState, today_window};
use tracing::{error, info};

use crate::config::{CalendarSettings, CalendarSource};
use crate::error::CliResult;

/// Builds today's feed from every configured calendar, in order.
///
/// A calendar that cannot be fetched is logged and contributes no items.
pub async fn collect_feed(
    session: &mut CalendarSession,
    calendars: &[CalendarSource],
    title: &str,
    now: DateTime<Local>,
) -> CalendarFeed {
    let (time_min, time_max) = today_window(now);
    let mut entries = Vec::new();

    for calendar in calendars {
        info!(calendar = %calendar.name, "fetching events");
        match session.list_events(&calendar.id, time_min, time_max).await {
            Ok(events) => {
                info!(calendar = %calendar.name, count = events.len(), "fetched events");
                entries.extend(
                    events
                        .iter()
                        .map(|event| event.to_entry(&calendar.name, &calendar.color)),
                );
            }
            Err(e) => error!(calendar = %calendar.name, "failed to fetch events: {}", e),
        }
    }

    CalendarFeed::assemble(entries, title, now)
}

/// Authenticates, fetches and writes the feed.
pub async fn execute(settings: &CalendarSettings) -> CliResult<()> {
    settings.require_calendars()?;
    let manager = CredentialManager::new(settings.google_config()?)?;
    generate(manager, settings, Local::now()).await.map(|_| ())
}

/// [`execute`] with the credential manager and clock supplied by the caller.
pub async fn generate(
    manager: CredentialManager,
    settings: &CalendarSettings,
    now: DateTime<Local>,
) -> CliResult<CalendarFeed> {
    let calendars = settings.require_calendars()?;
    let mut session = manager.obtain_session().await?;

    let feed = collect_feed(&mut session, calendars, &settings.feed_title, now).await;
    write_json(&settings.output_file, &feed)?;
    info!(
        count = feed.total,
        "saved {} events to {}",
        feed.total,
        settings.output_file.display()
    );
    Ok(feed)
}

/// Runs the consent flow and stores the token.
pub async fn authorize(settings: &CalendarSettings, force: bool) -> CliResult<()> {
    let mut manager = CredentialManager::new(settings.google_config()?)?;

    if !force && manager.load_state() == TokenState::Fresh {
        println!("Already authorized with Google Calendar.");
        println!("Use --force to authorize again.");
        return Ok(());
    }

    println!("Starting Google Calendar authorization...");
    println!();
    println!("A browser window will open if one is available.");
    println!("Otherwise follow the instructions printed below.");
    println!();

    manager.authorize(force).await?;

    info!("Google authorization successful");
    println!();
    println!("Authorization successful!");
    println!("Token saved to {}", manager.token_path().display());
    println!();
    println!("Next steps:");
    println!("  1. Copy the token file to the machine that runs calendar-feed,");
    println!("     at the path GOOGLE_TOKEN_FILE points to there.");
    println!("  2. Run calendar-feed without arguments to write the feed.");

    Ok(())
}
