//! HTTP fetching with exponential backoff retry logic.
//!
//! # Architecture
//!
//! - [`FetchAsync`]: core trait, "give me the body behind this URL"
//! - [`HttpFetcher`]: `reqwest` implementation with a fixed user agent
//! - [`RetryFetch`]: decorator that adds retry logic to any `FetchAsync`
//!
//! The scrapers are generic over `FetchAsync`, so tests drive them with
//! canned pages instead of the network.
//!
//! # Retry Strategy
//!
//! - Exponential backoff starting at `base_delay`
//! - Maximum delay capped at 30 seconds
//! - Random jitter (0-250ms) added to every delay

use rand::{Rng, rng};
use reqwest::Client;
use serde_json::Value;
use std::error::Error;
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use crate::config::ParserConfig;

/// Trait for async page retrieval.
pub trait FetchAsync {
    /// Fetch `url` and return the response body as text.
    async fn fetch(&self, url: &str) -> Result<String, Box<dyn Error>>;
}

impl<T: FetchAsync> FetchAsync for &T {
    async fn fetch(&self, url: &str) -> Result<String, Box<dyn Error>> {
        (**self).fetch(url).await
    }
}

/// `reqwest` client that sends a fixed user agent and treats non-2xx as errors.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: StdDuration) -> Result<Self, Box<dyn Error>> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    /// Desktop client for YouTube pages and the Data API.
    pub fn desktop(config: &ParserConfig) -> Result<Self, Box<dyn Error>> {
        Self::new(&config.desktop_user_agent, config.request_timeout())
    }

    /// Mobile client for Instagram pages.
    pub fn mobile(config: &ParserConfig) -> Result<Self, Box<dyn Error>> {
        Self::new(&config.mobile_user_agent, config.request_timeout())
    }
}

impl FetchAsync for HttpFetcher {
    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, url: &str) -> Result<String, Box<dyn Error>> {
        let t0 = Instant::now();
        let resp = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .send()
            .await?
            .error_for_status()?;
        let body = resp.text().await?;
        debug!(
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Fetched page"
        );
        Ok(body)
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`FetchAsync`].
///
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryFetch<T> {
    inner: T,
    /// Retries after the first attempt.
    max_retries: usize,
    base_delay: StdDuration,
    max_delay: StdDuration,
}

impl<T> RetryFetch<T>
where
    T: FetchAsync,
{
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }

    fn delay_for(&self, attempt: usize) -> StdDuration {
        let shift = (attempt.saturating_sub(1)).min(16) as u32;
        self.base_delay
            .saturating_mul(1 << shift)
            .min(self.max_delay)
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> FetchAsync for RetryFetch<T>
where
    T: FetchAsync,
{
    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, url: &str) -> Result<String, Box<dyn Error>> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match self.inner.fetch(url).await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    attempt += 1;
                    let total_dt = total_t0.elapsed();

                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_total = total_dt.as_millis() as u64,
                            error = %e,
                            "fetch() exhausted retries"
                        );
                        return Err(e);
                    }

                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = self.delay_for(attempt) + StdDuration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_total = total_dt.as_millis() as u64,
                        ?delay,
                        error = %e,
                        "fetch() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Fetch `url` through `fetcher`, retrying with exponential backoff.
///
/// Used for one-off requests whose fetcher is not already wrapped in a
/// [`RetryFetch`].
///
/// # Arguments
///
/// * `fetcher` - Any [`FetchAsync`]; it is borrowed, not consumed
/// * `url` - Page to request
/// * `retries` - Attempts after the first one
/// * `base_delay` - Delay before the first retry
///
/// # Returns
///
/// The body of the first successful attempt, or the last error once every
/// attempt failed.
///
/// # Retry Behavior
///
/// - Delay doubles per attempt, capped at 30s
/// - Up to 250ms of random jitter per delay
#[instrument(level = "debug", skip(fetcher))]
pub async fn fetch_with_backoff<F: FetchAsync>(
    fetcher: &F,
    url: &str,
    retries: usize,
    base_delay: StdDuration,
) -> Result<String, Box<dyn Error>> {
    let t0 = Instant::now();
    let res = RetryFetch::new(fetcher, retries, base_delay).fetch(url).await;
    match &res {
        Ok(_) => debug!(elapsed_ms_total = t0.elapsed().as_millis() as u64, "fetch_with_backoff succeeded"),
        Err(e) => {
            error!(elapsed_ms_total = t0.elapsed().as_millis() as u64, error = %e, "fetch_with_backoff failed")
        }
    }
    res
}

/// Fetch `url` and parse the body as JSON.
#[instrument(level = "info", skip(fetcher))]
pub async fn fetch_json<F: FetchAsync>(fetcher: &F, url: &str) -> Result<Value, Box<dyn Error>> {
    let body = fetcher.fetch(url).await?;
    let value: Value = serde_json::from_str(&body)?;
    info!(bytes = body.len(), "Fetched JSON document");
    Ok(value)
}
