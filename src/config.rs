//! Parser settings, optionally loaded from a YAML file.
//!
//! ```yaml
//! retries: 10
//! max_videos: 30
//! max_posts: 12
//! request_timeout_secs: 20
//! ```
//!
//! Every key is optional; missing keys take the defaults below.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};

/// Safari on iPhone 8; Instagram serves its lighter mobile markup to it.
pub const IPHONE_8_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 11_0 like Mac OS X) \
     AppleWebKit/604.1.38 (KHTML, like Gecko) Version/11.0 Mobile/15A372 Safari/604.1";

pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ParserConfig {
    /// Attempts at loading an Instagram account page.
    pub retries: usize,
    /// Upper bound of videos inspected per YouTube channel.
    pub max_videos: usize,
    /// Upper bound of posts inspected per Instagram account.
    pub max_posts: usize,
    pub request_timeout_secs: u64,
    /// Backoff retries for a single HTTP request.
    pub max_backoff_retries: usize,
    pub base_delay_ms: u64,
    pub desktop_user_agent: String,
    pub mobile_user_agent: String,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            retries: 10,
            max_videos: 30,
            max_posts: 12,
            request_timeout_secs: 20,
            max_backoff_retries: 3,
            base_delay_ms: 500,
            desktop_user_agent: DESKTOP_USER_AGENT.to_string(),
            mobile_user_agent: IPHONE_8_USER_AGENT.to_string(),
        }
    }
}

impl ParserConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

/// Load settings from `path`, or the defaults when no path is given.
#[instrument(level = "info")]
pub fn load_config(path: Option<&Path>) -> Result<ParserConfig, Box<dyn Error>> {
    let Some(path) = path else {
        return Ok(ParserConfig::default());
    };
    let raw = std::fs::read_to_string(path)?;
    let config = parse_config(&raw)?;
    info!(?config, "Loaded configuration");
    Ok(config)
}

fn parse_config(raw: &str) -> Result<ParserConfig, serde_yaml::Error> {
    if raw.trim().is_empty() {
        return Ok(ParserConfig::default());
    }
    serde_yaml::from_str(raw)
}
