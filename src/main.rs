//! # Social Parser
//!
//! Collects channel/account metadata and post metrics from YouTube and
//! Instagram by scraping the JSON and markup embedded in their pages, then
//! prints the results as JSON.
//!
//! ## Usage
//!
//! ```sh
//! social_parser -y youtube.txt -i instagram.txt -d 01.05.2024
//! ```
//!
//! ## Architecture
//!
//! 1. **Accounts**: read one account-list file per network
//! 2. **Scraping**: per account, fetch pages and extract the embedded JSON
//!    (YouTube) or header counters (Instagram), newest content first, until
//!    the stop date
//! 3. **Output**: print JSON to stdout or write it under the output directory

use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod config;
mod extract;
mod models;
mod outputs;
mod scrapers;
mod utils;

use api::{HttpFetcher, RetryFetch};
use cli::Cli;
use models::ParseResults;
use outputs::json;
use scrapers::{instagram, youtube, youtube_api::YouTubeApi};
use utils::{ensure_writable_dir, read_account_list, stop_date};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    // stdout carries the results, so logs go to stderr
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("social_parser starting up");

    let args = Cli::parse();
    debug!(?args.youtube, ?args.instagram, ?args.date, "Parsed CLI arguments");

    let config = config::load_config(args.config.as_deref())?;
    let from_date = stop_date(args.date.as_deref());
    info!(%from_date, "Processing social networks");

    if let Some(dir) = &args.output_dir {
        if let Err(e) = ensure_writable_dir(dir).await {
            error!(path = %dir, error = %e, "Output directory is not writable");
            return Err(e);
        }
    }

    let mut results = ParseResults::default();

    // ---- YouTube ----
    if let Some(path) = &args.youtube {
        let accounts = read_account_list(path);
        if accounts.is_empty() {
            info!(path = %path.display(), "No [youtube] accounts found");
        } else {
            let fetcher = RetryFetch::new(
                HttpFetcher::desktop(&config)?,
                config.max_backoff_retries,
                config.base_delay(),
            );
            let api = args.youtube_api_key.as_deref().map(YouTubeApi::new);
            let parsed =
                youtube::yt_parse(&fetcher, &accounts, from_date, config.max_videos, api.as_ref())
                    .await;
            info!(channels = parsed.len(), "YouTube done");
            results.youtube = Some(parsed);
        }
    }

    // ---- Instagram ----
    if let Some(path) = &args.instagram {
        let accounts = read_account_list(path);
        if accounts.is_empty() {
            info!(path = %path.display(), "No [instagram] accounts found");
        } else {
            let fetcher = HttpFetcher::mobile(&config)?;
            let parsed = instagram::ig_parse(&fetcher, &accounts, from_date, &config).await;
            info!(accounts = parsed.len(), "Instagram done");
            results.instagram = Some(parsed);
        }
    }

    // ---- Output ----
    let pretty = !args.compact;
    match &args.output_dir {
        Some(dir) => {
            let path = json::write_results(&results, dir, pretty).await?;
            info!(path = %path.display(), "Results written");
        }
        None => println!("{}", json::render(&results, pretty)?),
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}
