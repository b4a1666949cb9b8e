//! Data models for scraped channels, videos and accounts.
//!
//! Field names follow the JSON the tool prints (`snake_case`), not the
//! camelCase of the renderer objects they are read from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Per-call error accumulator: step name to error entry.
pub type Errors = BTreeMap<String, Value>;

/// Channel metadata read from `metadata.channelMetadataRenderer`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ChannelData {
    pub title: String,
    pub external_id: String,
    pub vanity_id: String,
    pub channel_url: String,
}

/// Video IDs found on the first grid tab of a channel's videos page.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct TabVideos {
    /// Newest first, in page order.
    pub latest_vids: Vec<String>,
    /// The raw `continuationItemRenderer`, if the grid has more pages.
    pub cont_data: Option<Value>,
}

/// Result of scraping one channel's videos page.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ChannelVideos {
    pub channel_data: Option<ChannelData>,
    #[serde(flatten)]
    pub tab: TabVideos,
    pub errors: Option<Errors>,
}

/// Statistics of a single video.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct VideoMetrics {
    pub channel_id: Option<String>,
    pub title: Option<String>,
    pub length_sec: Option<u64>,
    pub views: Option<u64>,
    /// `publishDate` as served, either `YYYY-MM-DD` or RFC 3339.
    pub pub_date: Option<String>,
    pub upl_date: Option<String>,
    pub is_family_safe: Option<bool>,
    pub likes: Option<u64>,
    pub comments: Option<u64>,
}

/// Either the metrics of a video or why they could not be collected.
///
/// `Error` is tried first: every metrics field is optional, so an error
/// object would otherwise read back as empty metrics.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum VideoEntry {
    Error { error: String },
    Metrics(VideoMetrics),
}

/// Everything collected for one YouTube account.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ChannelReport {
    pub channel_data: Option<ChannelData>,
    /// Video ID to its metrics or error.
    pub videos: BTreeMap<String, VideoEntry>,
    pub cont_data: Option<Value>,
    pub errors: Option<Errors>,
}

/// Counters from the header of an Instagram profile.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct IgHeaderData {
    pub posts: Option<u64>,
    pub followers: Option<u64>,
    pub following: Option<u64>,
}

impl IgHeaderData {
    pub fn is_empty(&self) -> bool {
        self.posts.is_none() && self.followers.is_none() && self.following.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct IgPost {
    pub code: String,
    pub pub_date: Option<DateTime<Utc>>,
}

/// Everything collected for one Instagram account.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct IgAccountReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<IgHeaderData>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub posts: Vec<IgPost>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IgAccountReport {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Default::default()
        }
    }
}

/// Results of one run, keyed by network and then by account.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ParseResults {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub youtube: Option<BTreeMap<String, ChannelReport>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instagram: Option<BTreeMap<String, IgAccountReport>>,
}
