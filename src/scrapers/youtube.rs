//! YouTube channel and video scraper.
//!
//! Two pages are scraped, both without the Data API:
//!
//! - `https://www.youtube.com/<account>/videos`: the `ytInitialData` blob
//!   carries the channel metadata and the first grid of uploads.
//! - `https://www.youtube.com/watch?v=<id>`: `ytInitialPlayerResponse`
//!   carries title, duration, views and dates; `ytInitialData` carries likes
//!   and comment counts.
//!
//! The renderer objects are undocumented and change without notice, so every
//! walk tolerates missing keys and records what went wrong in an [`Errors`]
//! map instead of failing the whole account.

use chrono::{DateTime, NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::error::Error;
use tracing::{debug, info, instrument, warn};

use crate::api::FetchAsync;
use crate::extract::{YT_INITIAL_DATA, YT_INITIAL_PLAYER_RESPONSE, embedded_json};
use crate::models::{
    ChannelData, ChannelReport, ChannelVideos, Errors, TabVideos, VideoEntry, VideoMetrics,
};
use crate::scrapers::youtube_api::YouTubeApi;
use crate::utils::{parse_count, require_at, value_at};

pub const YT_ROOT_URL: &str = "https://www.youtube.com/";

static COUNT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d[\d,.]*[KMBkmb]?").unwrap());

/// Path of an account as typed in the account list (`@handle`, `channel/UC...`
/// or a full channel URL), with each segment percent-encoded.
pub fn channel_path(account: &str) -> String {
    account
        .trim()
        .trim_start_matches(YT_ROOT_URL)
        .trim_start_matches("https://youtube.com/")
        .trim_matches('/')
        .split('/')
        .map(|segment| match segment.strip_prefix('@') {
            Some(handle) => format!("@{}", urlencoding::encode(handle)),
            None => urlencoding::encode(segment).into_owned(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

pub fn channel_videos_url(account: &str) -> String {
    format!("{}{}/videos", YT_ROOT_URL, channel_path(account))
}

pub fn video_url(video_id: &str) -> String {
    format!("{}watch?v={}", YT_ROOT_URL, urlencoding::encode(video_id))
}

/// Token of the next grid page inside a `continuationItemRenderer`.
pub fn continuation_token(cont_data: &Value) -> Option<&str> {
    value_at(cont_data, &["continuationEndpoint", "continuationCommand", "token"])?.as_str()
}

/// Channel-level scraping: metadata and the latest uploads.
pub struct ChannelParser;

impl ChannelParser {
    /// Read `metadata.channelMetadataRenderer`.
    ///
    /// On a missing key the failure lands in `errors["acc_data"]`.
    pub fn parse_acc_data(json_data: &Value, errors: &mut Errors) -> Option<ChannelData> {
        let read = || -> Result<ChannelData, String> {
            let meta = require_at(json_data, &["metadata", "channelMetadataRenderer"])?;
            let field = |key: &str| -> Result<String, String> {
                require_at(meta, &[key])?
                    .as_str()
                    .map(str::to_string)
                    .ok_or_else(|| format!("`{key}` is not a string"))
            };
            Ok(ChannelData {
                title: field("title")?,
                external_id: field("externalId")?,
                vanity_id: field("vanityChannelUrl")?,
                channel_url: field("channelUrl")?,
            })
        };

        match read() {
            Ok(data) => Some(data),
            Err(e) => {
                errors.insert("acc_data".to_string(), json!({ "error": e }));
                None
            }
        }
    }

    /// Collect video IDs from the first tab that renders a rich grid.
    ///
    /// Tabs that are not selected carry no content and are skipped. When no
    /// tab yields a grid the last walk failure lands in `errors["parse_tabs"]`.
    pub fn parse_tabs(videos_data: &Value, errors: &mut Errors) -> Option<TabVideos> {
        let tabs = match require_at(
            videos_data,
            &["contents", "twoColumnBrowseResultsRenderer", "tabs"],
        )
        .and_then(|tabs| tabs.as_array().ok_or_else(|| "`tabs` is not an array".to_string()))
        {
            Ok(tabs) => tabs,
            Err(e) => {
                errors.insert("parse_tabs".to_string(), json!(e));
                return None;
            }
        };

        let mut last_error = "no tabs".to_string();
        for tab in tabs {
            let grid = match require_at(
                tab,
                &["tabRenderer", "content", "richGridRenderer", "contents"],
            )
            .map(Value::as_array)
            {
                Ok(Some(grid)) => grid,
                Ok(None) => {
                    last_error = "`richGridRenderer.contents` is not an array".to_string();
                    continue;
                }
                Err(e) => {
                    last_error = e;
                    continue;
                }
            };

            let mut tab_videos = TabVideos::default();
            for grid_item in grid {
                if let Some(item) = grid_item.get("richItemRenderer") {
                    match grid_video_id(item) {
                        Some(id) => tab_videos.latest_vids.push(id.to_string()),
                        None => debug!("Grid item without a video id"),
                    }
                } else if let Some(cont) = grid_item.get("continuationItemRenderer") {
                    tab_videos.cont_data = Some(cont.clone());
                }
            }
            return Some(tab_videos);
        }

        errors.insert("parse_tabs".to_string(), json!(last_error));
        None
    }

    /// Fetch a channel's videos page and return its `ytInitialData`.
    #[instrument(level = "info", skip(fetcher))]
    pub async fn get_videos_json<F: FetchAsync>(
        fetcher: &F,
        account: &str,
    ) -> Result<Value, Box<dyn Error>> {
        let html = fetcher.fetch(&channel_videos_url(account)).await?;
        embedded_json(&html, YT_INITIAL_DATA)
    }

    /// Scrape each account's videos page, one account at a time.
    ///
    /// Every account gets an entry. A failed request or extraction leaves
    /// `channel_data` empty and records `errors["request"]`. At most
    /// `max_amount` video IDs are kept per account.
    #[instrument(level = "info", skip_all, fields(accounts = account_list.len()))]
    pub async fn get_new_videos<F: FetchAsync>(
        fetcher: &F,
        account_list: &[String],
        max_amount: usize,
    ) -> BTreeMap<String, ChannelVideos> {
        let results: Vec<(String, ChannelVideos)> = stream::iter(account_list)
            .then(|account| async move {
                let mut errors = Errors::new();
                let videos = match Self::get_videos_json(fetcher, account).await {
                    Ok(vids_json) => {
                        let channel_data = Self::parse_acc_data(&vids_json, &mut errors);
                        let mut tab = Self::parse_tabs(&vids_json, &mut errors).unwrap_or_default();
                        tab.latest_vids.truncate(max_amount);
                        ChannelVideos {
                            channel_data,
                            tab,
                            errors: None,
                        }
                    }
                    Err(e) => {
                        warn!(%account, error = %e, "Channel page request failed");
                        errors.insert("request".to_string(), json!(e.to_string()));
                        ChannelVideos::default()
                    }
                };

                info!(
                    %account,
                    videos = videos.tab.latest_vids.len(),
                    errors = errors.len(),
                    "Parsed channel page"
                );
                let videos = ChannelVideos {
                    errors: (!errors.is_empty()).then_some(errors),
                    ..videos
                };
                (account.clone(), videos)
            })
            .collect()
            .await;

        results.into_iter().collect()
    }
}

/// `videoId` of a rich grid item; long videos, shorts and lockup view models
/// all appear in channel grids.
fn grid_video_id(item: &Value) -> Option<&str> {
    [
        &["content", "videoRenderer", "videoId"][..],
        &["content", "reelItemRenderer", "videoId"][..],
        &["content", "lockupViewModel", "contentId"][..],
    ]
    .iter()
    .find_map(|path| value_at(item, path)?.as_str())
}

/// Per-video scraping from the watch page.
pub struct VideoDataParser;

impl VideoDataParser {
    /// Likes and comments from the watch-next results of `ytInitialData`.
    ///
    /// Each result element is serialized and searched for `likeCount` and
    /// `commentCount`; the first count following the key, before the next
    /// closing brace, is taken. The first element carrying a metric wins.
    pub fn get_likes_and_comments(data: &Value) -> (Option<u64>, Option<u64>) {
        let Some(contents) = value_at(
            data,
            &["contents", "twoColumnWatchNextResults", "results", "results", "contents"],
        )
        .and_then(Value::as_array) else {
            return (None, None);
        };

        let mut likes = None;
        let mut comments = None;
        for el in contents {
            let el_text = el.to_string();
            if likes.is_none() {
                likes = count_after(&el_text, "likeCount");
            }
            if comments.is_none() {
                comments = count_after(&el_text, "commentCount");
            }
            if likes.is_some() && comments.is_some() {
                break;
            }
        }
        (likes, comments)
    }

    /// Build [`VideoMetrics`] from a watch page.
    ///
    /// The player response is required; likes and comments are optional.
    pub fn metrics_from_page(html: &str) -> Result<VideoMetrics, Box<dyn Error>> {
        let player = embedded_json(html, YT_INITIAL_PLAYER_RESPONSE)?;
        let mut metrics = player_metrics(&player)?;

        match embedded_json(html, YT_INITIAL_DATA) {
            Ok(initial_data) => {
                let (likes, comments) = Self::get_likes_and_comments(&initial_data);
                metrics.likes = likes;
                metrics.comments = comments;
            }
            Err(e) => debug!(error = %e, "No ytInitialData on watch page"),
        }
        Ok(metrics)
    }

    /// Collect the statistics of the video `video_uid`.
    #[instrument(level = "info", skip(fetcher))]
    pub async fn get_video_metrics<F: FetchAsync>(
        fetcher: &F,
        video_uid: &str,
    ) -> Result<VideoMetrics, Box<dyn Error>> {
        let html = fetcher.fetch(&video_url(video_uid)).await?;
        let metrics = Self::metrics_from_page(&html)?;
        debug!(views = ?metrics.views, likes = ?metrics.likes, "Collected video metrics");
        Ok(metrics)
    }
}

fn player_metrics(player: &Value) -> Result<VideoMetrics, String> {
    let details = require_at(player, &["videoDetails"])?;
    let micro = value_at(player, &["microformat", "playerMicroformatRenderer"]);

    let text = |v: Option<&Value>| v.and_then(Value::as_str).map(str::to_string);
    let number = |v: Option<&Value>| {
        v.and_then(|v| match v {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        })
    };

    Ok(VideoMetrics {
        channel_id: text(details.get("channelId")),
        title: text(details.get("title")),
        length_sec: number(details.get("lengthSeconds")),
        views: number(details.get("viewCount")),
        pub_date: text(micro.and_then(|m| m.get("publishDate"))),
        upl_date: text(micro.and_then(|m| m.get("uploadDate"))),
        is_family_safe: micro
            .and_then(|m| m.get("isFamilySafe"))
            .and_then(Value::as_bool),
        likes: None,
        comments: None,
    })
}

/// First count after `key` and before the next `}` in `text`.
fn count_after(text: &str, key: &str) -> Option<u64> {
    let start = text.find(key)?;
    let cut = &text[start + key.len()..];
    let cut = &cut[..cut.find('}').map_or(cut.len(), |end| end + 1)];
    COUNT_RE.find(cut).and_then(|m| parse_count(m.as_str()))
}

/// Parse a `publishDate`, which YouTube serves either as a bare date or as a
/// full RFC 3339 timestamp.
pub fn published_at(date: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(date) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(date.get(..10)?, "%Y-%m-%d")
        .ok()?
        .and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
}

/// Collect channel metadata and per-video metrics for every account.
///
/// This is the YouTube entry point. Channel pages are scraped first, then
/// every channel's watch pages, one request at a time.
///
/// # Arguments
///
/// * `fetcher` - Page fetcher, usually a [`RetryFetch`](crate::api::RetryFetch)
/// * `account_list` - Accounts as typed in the account list (`@handle`,
///   `channel/UC...` or a channel URL)
/// * `stop_date` - A channel stops at the first video published before it
/// * `max_videos` - Upper bound of inspected videos per channel
/// * `api` - Data API client for channels whose page yields no videos
///
/// # Returns
///
/// One [`ChannelReport`] per account. Failures never abort the run: they are
/// recorded in the report's `errors` map or as the video's error entry.
///
/// # Data API fallback
///
/// - The channel ID comes from the scraped `externalId`, else from a
///   `channel/UC...` account path
/// - Only `@handle` accounts without either are resolved by a channel search
/// - Videos published between `stop_date` and now are listed, newest first
#[instrument(level = "info", skip_all, fields(accounts = account_list.len(), %stop_date))]
pub async fn yt_parse<F: FetchAsync>(
    fetcher: &F,
    account_list: &[String],
    stop_date: DateTime<Utc>,
    max_videos: usize,
    api: Option<&YouTubeApi>,
) -> BTreeMap<String, ChannelReport> {
    debug!(accounts = ?account_list, "Received YouTube accounts");
    let new_videos = ChannelParser::get_new_videos(fetcher, account_list, max_videos).await;

    let mut parsed = BTreeMap::new();
    for (account, ch_data) in new_videos {
        let mut errors = ch_data.errors.unwrap_or_default();
        let mut video_ids = ch_data.tab.latest_vids;

        if let Some(token) = ch_data.tab.cont_data.as_ref().and_then(continuation_token) {
            debug!(%account, token, "Channel has more videos than the first grid");
        }

        if video_ids.is_empty() {
            if let Some(api) = api {
                let channel_data = ch_data.channel_data.as_ref();
                match api_video_ids(api, fetcher, &account, channel_data, stop_date).await {
                    Ok(ids) => video_ids = ids,
                    Err(e) => {
                        warn!(%account, error = %e, "Data API fallback failed");
                        errors.insert("api".to_string(), json!(e.to_string()));
                    }
                }
            }
        }

        let mut videos = BTreeMap::new();
        for video_id in video_ids.into_iter().take(max_videos) {
            let entry = match VideoDataParser::get_video_metrics(fetcher, &video_id).await {
                Ok(metrics) => {
                    let published = metrics.pub_date.as_deref().and_then(published_at);
                    if published.is_some_and(|p| p < stop_date) {
                        info!(%account, %video_id, "Reached stop date");
                        break;
                    }
                    VideoEntry::Metrics(metrics)
                }
                Err(e) => {
                    warn!(%account, %video_id, error = %e, "Video metrics failed");
                    VideoEntry::Error { error: e.to_string() }
                }
            };
            videos.insert(video_id, entry);
        }

        info!(%account, videos = videos.len(), "Finished channel");
        parsed.insert(
            account,
            ChannelReport {
                channel_data: ch_data.channel_data,
                videos,
                cont_data: ch_data.tab.cont_data,
                errors: (!errors.is_empty()).then_some(errors),
            },
        );
    }
    parsed
}

/// Channel ID known without the Data API: the scraped `externalId`, else the
/// `UC...` segment of a `channel/UC...` account path.
fn known_channel_id(account: &str, channel_data: Option<&ChannelData>) -> Option<String> {
    if let Some(data) = channel_data.filter(|data| !data.external_id.is_empty()) {
        return Some(data.external_id.clone());
    }
    let path = channel_path(account);
    let mut segments = path.split('/');
    match (segments.next(), segments.next()) {
        (Some("channel"), Some(id)) if id.starts_with("UC") => Some(id.to_string()),
        _ => None,
    }
}

async fn api_video_ids<F: FetchAsync>(
    api: &YouTubeApi,
    fetcher: &F,
    account: &str,
    channel_data: Option<&ChannelData>,
    stop_date: DateTime<Utc>,
) -> Result<Vec<String>, Box<dyn Error>> {
    let channel_id = match known_channel_id(account, channel_data) {
        Some(id) => id,
        None => {
            let path = channel_path(account);
            let Some(handle) = path.strip_prefix('@') else {
                return Err(format!("no channel id in `{account}`").into());
            };
            let handle = urlencoding::decode(handle)?;
            let found = api.search_channel_by_name(fetcher, &handle, 1).await?;
            let id = YouTubeApi::channel_ids(&found)
                .into_iter()
                .next()
                .ok_or_else(|| format!("no channel found for `{handle}`"))?;
            debug!(%account, channel_id = %id, "Resolved handle through search");
            id
        }
    };
    let videos = api
        .get_videos_by_channel_uid(fetcher, &channel_id, stop_date, Utc::now())
        .await?;
    Ok(YouTubeApi::video_ids(&videos))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Serves canned pages by URL; anything else is a 404.
    struct Pages(HashMap<String, String>);

    impl FetchAsync for Pages {
        async fn fetch(&self, url: &str) -> Result<String, Box<dyn Error>> {
            self.0
                .get(url)
                .cloned()
                .ok_or_else(|| format!("404 for {url}").into())
        }
    }

    /// Serves the first body whose pattern the URL contains; records every URL.
    struct Routes {
        routes: Vec<(&'static str, String)>,
        urls: RefCell<Vec<String>>,
    }

    impl Routes {
        fn new(routes: Vec<(&'static str, String)>) -> Self {
            Self { routes, urls: RefCell::new(Vec::new()) }
        }

        fn requested(&self, pattern: &str) -> usize {
            self.urls.borrow().iter().filter(|url| url.contains(pattern)).count()
        }
    }

    impl FetchAsync for Routes {
        async fn fetch(&self, url: &str) -> Result<String, Box<dyn Error>> {
            self.urls.borrow_mut().push(url.to_string());
            self.routes
                .iter()
                .find(|(pattern, _)| url.contains(pattern))
                .map(|(_, body)| body.clone())
                .ok_or_else(|| format!("404 for {url}").into())
        }
    }

    fn video_search(ids: &[&str]) -> String {
        let items: Vec<Value> = ids.iter().map(|id| json!({"id": {"videoId": id}})).collect();
        json!({ "items": items }).to_string()
    }

    fn page(scripts: &[(&str, Value)]) -> String {
        let body: String = scripts
            .iter()
            .map(|(marker, value)| format!("<script nonce=\"n\">{marker} = {value};</script>"))
            .collect();
        format!("<html><head></head><body>{body}</body></html>")
    }

    fn channel_json(ids: &[&str]) -> Value {
        let mut grid: Vec<Value> = ids
            .iter()
            .map(|id| json!({"richItemRenderer": {"content": {"videoRenderer": {"videoId": id}}}}))
            .collect();
        grid.push(json!({"continuationItemRenderer": {
            "continuationEndpoint": {"continuationCommand": {"token": "TOKEN"}}
        }}));
        json!({
            "metadata": {"channelMetadataRenderer": {
                "title": "Chan",
                "externalId": "UC123",
                "vanityChannelUrl": "http://www.youtube.com/@chan",
                "channelUrl": "https://www.youtube.com/channel/UC123"
            }},
            "contents": {"twoColumnBrowseResultsRenderer": {"tabs": [
                {"tabRenderer": {"title": "Home"}},
                {"tabRenderer": {"title": "Videos", "content": {"richGridRenderer": {"contents": grid}}}}
            ]}}
        })
    }

    fn watch_page(id: &str, publish: &str) -> String {
        page(&[
            (
                YT_INITIAL_PLAYER_RESPONSE,
                json!({
                    "videoDetails": {
                        "videoId": id, "channelId": "UC123", "title": format!("Video {id}"),
                        "lengthSeconds": "212", "viewCount": "1500"
                    },
                    "microformat": {"playerMicroformatRenderer": {
                        "publishDate": publish, "uploadDate": publish, "isFamilySafe": true
                    }}
                }),
            ),
            (
                YT_INITIAL_DATA,
                json!({"contents": {"twoColumnWatchNextResults": {"results": {"results": {"contents": [
                    {"videoPrimaryInfoRenderer": {"likeCount": "42"}},
                    {"itemSectionRenderer": {"commentsEntryPointHeaderRenderer": {"commentCount": {"simpleText": "1.2K"}}}}
                ]}}}}}),
            ),
        ])
    }

    #[test]
    fn test_urls() {
        assert_eq!(channel_videos_url(" @chan \n"), "https://www.youtube.com/@chan/videos");
        assert_eq!(
            channel_videos_url("https://www.youtube.com/channel/UC123/"),
            "https://www.youtube.com/channel/UC123/videos"
        );
        assert_eq!(channel_path("@café"), "@caf%C3%A9");
        assert_eq!(video_url("abc"), "https://www.youtube.com/watch?v=abc");
    }

    #[test]
    fn test_parse_acc_data() {
        let mut errors = Errors::new();
        let data = ChannelParser::parse_acc_data(&channel_json(&[]), &mut errors).unwrap();
        assert_eq!(data.title, "Chan");
        assert_eq!(data.external_id, "UC123");
        assert_eq!(data.vanity_id, "http://www.youtube.com/@chan");
        assert!(errors.is_empty());
    }

    #[test]
    fn test_parse_acc_data_records_error() {
        let mut errors = Errors::new();
        let data = json!({"metadata": {"channelMetadataRenderer": {"title": "x"}}});
        assert!(ChannelParser::parse_acc_data(&data, &mut errors).is_none());
        assert_eq!(
            errors["acc_data"],
            json!({"error": "missing key `externalId`"})
        );
    }

    #[test]
    fn test_parse_tabs_skips_tabs_without_grid() {
        let mut errors = Errors::new();
        let tab = ChannelParser::parse_tabs(&channel_json(&["a", "b"]), &mut errors).unwrap();
        assert_eq!(tab.latest_vids, vec!["a", "b"]);
        assert_eq!(continuation_token(tab.cont_data.as_ref().unwrap()), Some("TOKEN"));
        assert!(errors.is_empty());
    }

    #[test]
    fn test_parse_tabs_reads_shorts_and_lockups() {
        let data = json!({"contents": {"twoColumnBrowseResultsRenderer": {"tabs": [
            {"tabRenderer": {"content": {"richGridRenderer": {"contents": [
                {"richItemRenderer": {"content": {"reelItemRenderer": {"videoId": "short"}}}},
                {"richItemRenderer": {"content": {"lockupViewModel": {"contentId": "lock"}}}},
                {"richItemRenderer": {"content": {"adSlotRenderer": {}}}}
            ]}}}}
        ]}}});
        let tab = ChannelParser::parse_tabs(&data, &mut Errors::new()).unwrap();
        assert_eq!(tab.latest_vids, vec!["short", "lock"]);
        assert!(tab.cont_data.is_none());
    }

    #[test]
    fn test_parse_tabs_records_error() {
        let mut errors = Errors::new();
        assert!(ChannelParser::parse_tabs(&json!({}), &mut errors).is_none());
        assert_eq!(errors["parse_tabs"], json!("missing key `contents`"));

        let mut errors = Errors::new();
        let no_grid = json!({"contents": {"twoColumnBrowseResultsRenderer": {"tabs": [
            {"tabRenderer": {"title": "Home"}}
        ]}}});
        assert!(ChannelParser::parse_tabs(&no_grid, &mut errors).is_none());
        assert_eq!(errors["parse_tabs"], json!("missing key `tabRenderer.content`"));
    }

    #[test]
    fn test_likes_and_comments_scan_all_elements() {
        let data = json!({"contents": {"twoColumnWatchNextResults": {"results": {"results": {"contents": [
            {"videoPrimaryInfoRenderer": {"title": "no counts here"}},
            {"videoPrimaryInfoRenderer": {"likeCount": "1,024"}},
            {"commentCount": {"simpleText": "57"}}
        ]}}}}});
        assert_eq!(VideoDataParser::get_likes_and_comments(&data), (Some(1024), Some(57)));
        assert_eq!(VideoDataParser::get_likes_and_comments(&json!({})), (None, None));
    }

    #[test]
    fn test_count_after_stops_at_brace() {
        assert_eq!(count_after(r#"{"likeCount":"7"}"#, "likeCount"), Some(7));
        assert_eq!(count_after(r#"{"likeCount":{"a":"x"},"b":"9"}"#, "likeCount"), None);
        assert_eq!(count_after(r#"{"other":1}"#, "likeCount"), None);
    }

    #[test]
    fn test_metrics_from_page() {
        let metrics = VideoDataParser::metrics_from_page(&watch_page("v1", "2024-05-01")).unwrap();
        assert_eq!(metrics.channel_id.as_deref(), Some("UC123"));
        assert_eq!(metrics.title.as_deref(), Some("Video v1"));
        assert_eq!(metrics.length_sec, Some(212));
        assert_eq!(metrics.views, Some(1500));
        assert_eq!(metrics.pub_date.as_deref(), Some("2024-05-01"));
        assert_eq!(metrics.is_family_safe, Some(true));
        assert_eq!(metrics.likes, Some(42));
        assert_eq!(metrics.comments, Some(1200));
    }

    #[test]
    fn test_metrics_require_player_response() {
        let html = page(&[(YT_INITIAL_DATA, json!({}))]);
        assert!(VideoDataParser::metrics_from_page(&html).is_err());
    }

    #[test]
    fn test_published_at_formats() {
        let day = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        assert_eq!(published_at("2024-05-01"), Some(day));
        assert_eq!(
            published_at("2024-05-01T05:00:00-07:00"),
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
        );
        assert_eq!(published_at("yesterday"), None);
    }

    #[tokio::test]
    async fn test_get_new_videos_keeps_failed_accounts() {
        let pages = Pages(HashMap::from([(
            channel_videos_url("@chan"),
            page(&[(YT_INITIAL_DATA, channel_json(&["a", "b", "c"]))]),
        )]));
        let accounts = vec!["@chan".to_string(), "@gone".to_string()];
        let result = ChannelParser::get_new_videos(&pages, &accounts, 2).await;

        assert_eq!(result["@chan"].tab.latest_vids, vec!["a", "b"]);
        assert!(result["@chan"].errors.is_none());
        let gone = &result["@gone"];
        assert!(gone.channel_data.is_none());
        assert!(gone.errors.as_ref().unwrap().contains_key("request"));
    }

    #[tokio::test]
    async fn test_yt_parse_stops_at_stop_date() {
        let pages = Pages(HashMap::from([
            (
                channel_videos_url("@chan"),
                page(&[(YT_INITIAL_DATA, channel_json(&["new", "broken", "old", "older"]))]),
            ),
            (video_url("new"), watch_page("new", "2024-05-10")),
            (video_url("old"), watch_page("old", "2024-04-01")),
            (video_url("older"), watch_page("older", "2024-03-01")),
        ]));
        let stop = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let result = yt_parse(&pages, &["@chan".to_string()], stop, 30, None).await;

        let report = &result["@chan"];
        assert_eq!(report.channel_data.as_ref().unwrap().title, "Chan");
        let ids: Vec<&str> = report.videos.keys().map(String::as_str).collect();
        assert_eq!(ids, vec!["broken", "new"]);
        assert!(matches!(report.videos["new"], VideoEntry::Metrics(_)));
        assert!(matches!(report.videos["broken"], VideoEntry::Error { .. }));
        assert!(report.cont_data.is_some());
    }

    #[test]
    fn test_known_channel_id() {
        let data = ChannelParser::parse_acc_data(&channel_json(&[]), &mut Errors::new());
        assert_eq!(known_channel_id("@chan", data.as_ref()).as_deref(), Some("UC123"));
        assert_eq!(known_channel_id("channel/UCabc", None).as_deref(), Some("UCabc"));
        assert_eq!(
            known_channel_id("https://www.youtube.com/channel/UCabc/", None).as_deref(),
            Some("UCabc")
        );
        assert_eq!(known_channel_id("@chan", None), None);
        assert_eq!(known_channel_id("c/legacy", None), None);
    }

    #[tokio::test]
    async fn test_api_fallback_uses_scraped_channel_id() {
        let routes = Routes::new(vec![
            ("/@chan/videos", page(&[(YT_INITIAL_DATA, channel_json(&[]))])),
            ("channelId=UC123", video_search(&["v1", "v2", "v3"])),
            ("watch?v=v1", watch_page("v1", "2024-05-10")),
            ("watch?v=v2", watch_page("v2", "2024-05-09")),
            ("watch?v=v3", watch_page("v3", "2024-05-08")),
        ]);
        let api = YouTubeApi::new("KEY");
        let stop = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let result = yt_parse(&routes, &["@chan".to_string()], stop, 2, Some(&api)).await;

        let report = &result["@chan"];
        assert!(report.errors.is_none());
        assert_eq!(report.videos.keys().collect::<Vec<_>>(), vec!["v1", "v2"]);
        assert_eq!(routes.requested("type=channel"), 0);
        assert_eq!(routes.requested("type=video"), 1);
        assert_eq!(routes.requested("watch?v=v3"), 0);
    }

    #[tokio::test]
    async fn test_api_fallback_reads_channel_path() {
        let routes = Routes::new(vec![
            ("channelId=UCxyz", video_search(&["v1"])),
            ("watch?v=v1", watch_page("v1", "2024-05-10")),
        ]);
        let api = YouTubeApi::new("KEY");
        let stop = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let result = yt_parse(&routes, &["channel/UCxyz".to_string()], stop, 30, Some(&api)).await;

        let report = &result["channel/UCxyz"];
        assert!(report.errors.as_ref().unwrap().contains_key("request"));
        assert!(!report.errors.as_ref().unwrap().contains_key("api"));
        assert!(matches!(report.videos["v1"], VideoEntry::Metrics(_)));
        assert_eq!(routes.requested("type=channel"), 0);
    }

    #[tokio::test]
    async fn test_api_fallback_searches_handles() {
        let routes = Routes::new(vec![
            (
                "type=channel",
                json!({"items": [{"id": {"channelId": "UC9"}}]}).to_string(),
            ),
            ("channelId=UC9", video_search(&["v1"])),
            ("watch?v=v1", watch_page("v1", "2024-05-10")),
        ]);
        let api = YouTubeApi::new("KEY");
        let stop = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let result = yt_parse(&routes, &["@chan".to_string()], stop, 30, Some(&api)).await;

        assert!(matches!(result["@chan"].videos["v1"], VideoEntry::Metrics(_)));
        assert_eq!(routes.requested("q=chan"), 1);
    }

    #[tokio::test]
    async fn test_api_fallback_failure_is_recorded() {
        let routes = Routes::new(Vec::new());
        let api = YouTubeApi::new("KEY");
        let accounts = vec!["@nobody".to_string(), "c/legacy".to_string()];
        let result = yt_parse(&routes, &accounts, Utc::now(), 30, Some(&api)).await;

        for account in &accounts {
            let report = &result[account];
            assert!(report.videos.is_empty());
            let errors = report.errors.as_ref().unwrap();
            assert!(errors.contains_key("request"));
            assert!(errors.contains_key("api"));
        }
        assert_eq!(routes.requested("type=channel"), 1);
    }
}
