//! Minimal YouTube Data API v3 client.
//!
//! Every request costs "quota" points. A project gets 10 000 points a day;
//! roughly:
//!
//! | Request | Cost |
//! |---------|------|
//! | list (channels, videos, playlists) | 1 |
//! | write (create, update, delete) | 50 |
//! | search | 100 |
//! | video upload | 1 600 |
//!
//! Google may change these numbers. Both calls below are searches, so the
//! scraper only uses the API as a fallback for channels whose page yields no
//! videos.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::error::Error;
use std::fmt;
use tracing::instrument;
use url::Url;

use crate::api::{FetchAsync, fetch_json};

pub const YT_API_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

/// Upper bound the API accepts for `maxResults`.
const MAX_RESULTS_LIMIT: u32 = 50;

pub struct YouTubeApi {
    api_key: String,
    base_url: String,
}

impl fmt::Debug for YouTubeApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("YouTubeApi")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl YouTubeApi {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: YT_API_BASE_URL.to_string(),
        }
    }

    fn search_url(&self, params: &[(&str, &str)]) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&format!("{}/search", self.base_url))?;
        url.query_pairs_mut()
            .extend_pairs(params)
            .append_pair("key", &self.api_key);
        Ok(url)
    }

    /// Search channels by name, most relevant first.
    #[instrument(level = "info", skip(self, fetcher))]
    pub async fn search_channel_by_name<F: FetchAsync>(
        &self,
        fetcher: &F,
        channel_name: &str,
        max_results: u32,
    ) -> Result<Value, Box<dyn Error>> {
        let max_results = max_results.clamp(1, MAX_RESULTS_LIMIT).to_string();
        let url = self.search_url(&[
            ("q", channel_name),
            ("maxResults", max_results.as_str()),
            ("part", "snippet"),
            ("type", "channel"),
            ("order", "relevance"),
            ("safeSearch", "none"),
        ])?;
        fetch_json(fetcher, url.as_str()).await
    }

    /// Search the videos a channel published between `from_date` and `to_date`, newest first.
    #[instrument(level = "info", skip(self, fetcher))]
    pub async fn get_videos_by_channel_uid<F: FetchAsync>(
        &self,
        fetcher: &F,
        channel_uid: &str,
        from_date: DateTime<Utc>,
        to_date: DateTime<Utc>,
    ) -> Result<Value, Box<dyn Error>> {
        let after = from_date.to_rfc3339_opts(SecondsFormat::Secs, true);
        let before = to_date.to_rfc3339_opts(SecondsFormat::Secs, true);
        let max_results = MAX_RESULTS_LIMIT.to_string();
        let url = self.search_url(&[
            ("channelId", channel_uid),
            ("maxResults", max_results.as_str()),
            ("part", "snippet"),
            ("type", "video"),
            ("order", "date"),
            ("publishedAfter", after.as_str()),
            ("publishedBefore", before.as_str()),
        ])?;
        fetch_json(fetcher, url.as_str()).await
    }

    /// `items[*].id.channelId` of a search response.
    pub fn channel_ids(search: &Value) -> Vec<String> {
        Self::item_ids(search, "channelId")
    }

    /// `items[*].id.videoId` of a search response.
    pub fn video_ids(search: &Value) -> Vec<String> {
        Self::item_ids(search, "videoId")
    }

    fn item_ids(search: &Value, kind: &str) -> Vec<String> {
        search["items"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item["id"][kind].as_str())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}
