//! Instagram profile scraper.
//!
//! Profiles are requested with a mobile user agent, which gets the lighter
//! markup. A fully rendered profile carries a `<header>` with the post,
//! follower and following counters; when Instagram withholds it (rate
//! limiting, "Page couldn't load", login walls) the page still ships
//! `<meta name="description">` in the form
//!
//! ```text
//! 1,234 Followers, 56 Following, 78 Posts - See Instagram photos and videos from ...
//! ```
//!
//! which is used as a fallback.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use std::error::Error;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use crate::api::{FetchAsync, fetch_with_backoff};
use crate::config::ParserConfig;
use crate::models::{IgAccountReport, IgHeaderData, IgPost};
use crate::utils::{parse_count, truncate_for_log};

pub const IG_ROOT_URL: &str = "https://www.instagram.com/";

static HEADER_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("header").unwrap());
static HEADER_ITEM_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("header ul li").unwrap());
static TITLED_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("[title]").unwrap());
static TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());
static META_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("head meta").unwrap());
static LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static TIME_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("time[datetime]").unwrap());

static NOT_LETTERS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z ]").unwrap());
static POST_HREF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/(?:[\w.]+/)?(?:p|reel)/([\w-]+)/?").unwrap());
static META_COUNTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)([\d.,]+[kmb]?)\s+followers?,\s*([\d.,]+[kmb]?)\s+following,\s*([\d.,]+[kmb]?)\s+posts?",
    )
    .unwrap()
});

/// What was learned from loading an account page.
#[derive(Debug, Clone, Default)]
pub struct IgAccPage {
    pub acc_name: String,
    /// Body of the page that rendered a `<header>`.
    pub html: Option<String>,
    /// `<head><meta>` name/property and content pairs of the first page
    /// that came without a header.
    pub metadata: Vec<(String, String)>,
    pub is_ok: bool,
}

pub fn profile_url(account: &str) -> String {
    format!("{}{}/", IG_ROOT_URL, urlencoding::encode(account.trim().trim_matches('/')))
}

pub fn post_url(code: &str) -> String {
    format!("{}p/{}/", IG_ROOT_URL, urlencoding::encode(code))
}

/// Read posts, followers and following from the profile `<header>`.
///
/// Each `header ul li` reads like `"<number> <label>"`. The exact follower
/// count sits in a `title` attribute and is preferred over the rounded text.
pub fn extract_header_data(html: &str) -> IgHeaderData {
    let document = Html::parse_document(html);
    let mut data = IgHeaderData::default();

    for element in document.select(&HEADER_ITEM_SELECTOR) {
        let text = element.text().collect::<Vec<_>>().join(" ");
        let mut words = text.split_whitespace();
        let (Some(number), Some(label)) = (words.next(), words.last()) else {
            continue;
        };
        let label = label.to_lowercase();

        if label.starts_with("follower") && data.followers.is_none() {
            data.followers = titled_count(element).or_else(|| parse_count(number));
        } else if label.starts_with("post") && data.posts.is_none() {
            data.posts = parse_count(number);
        } else if label == "following" && data.following.is_none() {
            data.following = parse_count(number);
        }
    }
    data
}

fn titled_count(element: ElementRef<'_>) -> Option<u64> {
    element
        .select(&TITLED_SELECTOR)
        .filter_map(|titled| titled.value().attr("title"))
        .find_map(parse_count)
}

/// Fallback counters from the description meta tags.
pub fn header_from_meta(metadata: &[(String, String)]) -> IgHeaderData {
    metadata
        .iter()
        .filter(|(name, _)| name == "description" || name == "og:description")
        .find_map(|(_, content)| META_COUNTS.captures(content))
        .map(|caps| IgHeaderData {
            followers: parse_count(&caps[1]),
            following: parse_count(&caps[2]),
            posts: parse_count(&caps[3]),
        })
        .unwrap_or_default()
}

/// `<head><meta>` tags as (name or property, content) pairs.
pub fn meta_tags(html: &str) -> Vec<(String, String)> {
    let document = Html::parse_document(html);
    document
        .select(&META_SELECTOR)
        .filter_map(|meta| {
            let el = meta.value();
            let name = el.attr("name").or_else(|| el.attr("property"))?;
            Some((name.to_string(), el.attr("content")?.to_string()))
        })
        .collect()
}

/// Whether the page is Instagram's "Page couldn't load" error page.
pub fn is_error_page(html: &str) -> bool {
    let document = Html::parse_document(html);
    document
        .select(&TITLE_SELECTOR)
        .next()
        .map(|title| {
            let text = title.text().collect::<String>();
            NOT_LETTERS
                .replace_all(&text, "")
                .trim_start()
                .starts_with("Page couldnt load")
        })
        .unwrap_or(false)
}

fn has_header(html: &str) -> bool {
    Html::parse_document(html)
        .select(&HEADER_SELECTOR)
        .next()
        .is_some()
}

/// Load an account page, retrying until it renders a `<header>`.
///
/// Meta tags of the first header-less page are kept so the caller can fall
/// back to them once the retries run out.
#[instrument(level = "info", skip(fetcher, retry_delay))]
pub async fn get_account_with_retries<F: FetchAsync>(
    fetcher: &F,
    acc_to_scrape: &str,
    retries: usize,
    retry_delay: Duration,
) -> IgAccPage {
    let url = profile_url(acc_to_scrape);
    let mut page = IgAccPage {
        acc_name: acc_to_scrape.to_string(),
        ..Default::default()
    };

    for attempt in 1..=retries {
        match fetcher.fetch(&url).await {
            Ok(html) if has_header(&html) => {
                debug!(attempt, "Account header loaded");
                page.html = Some(html);
                page.is_ok = true;
                return page;
            }
            Ok(html) => {
                debug!(
                    attempt,
                    error_page = is_error_page(&html),
                    preview = %truncate_for_log(&html, 120),
                    "Account page came without a header"
                );
                if page.metadata.is_empty() {
                    page.metadata = meta_tags(&html);
                }
            }
            Err(e) => warn!(attempt, error = %e, "Account page request failed"),
        }
        if attempt < retries {
            sleep(retry_delay).await;
        }
    }
    page
}

/// Shortcodes of the posts and reels linked from a profile, in page order.
pub fn latest_post_codes(html: &str, max: usize) -> Vec<String> {
    let document = Html::parse_document(html);
    document
        .select(&LINK_SELECTOR)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| POST_HREF.captures(href).map(|caps| caps[1].to_string()))
        .unique()
        .take(max)
        .collect()
}

/// Publication time of a post page: `time[datetime]`, else the
/// `article:published_time` meta tag.
pub fn post_pub_date(html: &str) -> Option<DateTime<Utc>> {
    let document = Html::parse_document(html);
    let from_time = document
        .select(&TIME_SELECTOR)
        .filter_map(|time| time.value().attr("datetime"))
        .find_map(parse_timestamp);
    from_time.or_else(|| {
        meta_tags(html)
            .iter()
            .filter(|(name, _)| name == "article:published_time")
            .find_map(|(_, content)| parse_timestamp(content))
    })
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// Fetch a post and return its publication time, if the page shows one.
#[instrument(level = "debug", skip(fetcher, config))]
pub async fn get_last_post_pub_date<F: FetchAsync>(
    fetcher: &F,
    code: &str,
    config: &ParserConfig,
) -> Result<Option<DateTime<Utc>>, Box<dyn Error>> {
    let html = fetch_with_backoff(
        fetcher,
        &post_url(code),
        config.max_backoff_retries,
        config.base_delay(),
    )
    .await?;
    Ok(post_pub_date(&html))
}

/// Collect header counters and recent posts for every account.
///
/// This is the Instagram entry point; accounts are processed one at a time.
///
/// # Arguments
///
/// * `fetcher` - Page fetcher, usually an [`HttpFetcher`](crate::api::HttpFetcher)
///   with the mobile user agent
/// * `account_list` - Account names, one per profile
/// * `stop_date` - Collection stops at the first post published before it
/// * `config` - Retry counts, delays and `max_posts`
///
/// # Returns
///
/// One [`IgAccountReport`] per account. Posts are in page order. An account
/// whose page never rendered a header, and whose meta tags carry no counters
/// either, gets only an `error`.
#[instrument(level = "info", skip_all, fields(accounts = account_list.len(), %stop_date))]
pub async fn ig_parse<F: FetchAsync>(
    fetcher: &F,
    account_list: &[String],
    stop_date: DateTime<Utc>,
    config: &ParserConfig,
) -> BTreeMap<String, IgAccountReport> {
    let reports: Vec<(String, IgAccountReport)> = stream::iter(account_list)
        .then(|acc_to_scrape| async move {
            info!(account = %acc_to_scrape, "Start processing");
            let report = parse_account(fetcher, acc_to_scrape, stop_date, config).await;
            (acc_to_scrape.clone(), report)
        })
        .collect()
        .await;
    reports.into_iter().collect()
}

async fn parse_account<F: FetchAsync>(
    fetcher: &F,
    acc_to_scrape: &str,
    stop_date: DateTime<Utc>,
    config: &ParserConfig,
) -> IgAccountReport {
    let acc_page =
        get_account_with_retries(fetcher, acc_to_scrape, config.retries, config.base_delay())
            .await;

    let Some(html) = acc_page.html.filter(|_| acc_page.is_ok) else {
        let header = header_from_meta(&acc_page.metadata);
        if header.is_empty() {
            let reason = format!(
                "After {} retries, account page couldn't be loaded",
                config.retries
            );
            info!(account = %acc_page.acc_name, "{reason}");
            return IgAccountReport::failed(reason);
        }
        info!(account = %acc_page.acc_name, "Header missing; counters taken from meta tags");
        return IgAccountReport {
            header: Some(header),
            ..Default::default()
        };
    };

    let mut header = extract_header_data(&html);
    if header.is_empty() {
        header = header_from_meta(&meta_tags(&html));
    }

    let mut posts = Vec::new();
    for code in latest_post_codes(&html, config.max_posts) {
        match get_last_post_pub_date(fetcher, &code, config).await {
            Ok(Some(pub_date)) if pub_date < stop_date => {
                debug!(account = %acc_to_scrape, %code, "Reached stop date");
                break;
            }
            Ok(pub_date) => posts.push(IgPost { code, pub_date }),
            Err(e) => {
                warn!(account = %acc_to_scrape, %code, error = %e, "Post request failed");
                posts.push(IgPost { code, pub_date: None });
            }
        }
    }

    info!(account = %acc_to_scrape, posts = posts.len(), ?header, "Parsed account");
    IgAccountReport {
        header: Some(header),
        posts,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::cell::{Cell, RefCell};
    use std::collections::{HashMap, VecDeque};

    const PROFILE: &str = r#"<html><head><title>Someone (@someone)</title>
        <meta name="description" content="9,999 Followers, 1 Following, 2 Posts - See Instagram photos">
        </head><body><header>
        <ul>
          <li><span>1,204</span> posts</li>
          <li><a href="/someone/followers/"><span title="12,345">12.3K</span> followers</a></li>
          <li><a href="/someone/following/"><span>321</span> following</a></li>
        </ul></header>
        <main>
          <a href="/p/AAA111/">one</a>
          <a href="/someone/reel/BBB-22/">two</a>
          <a href="/p/AAA111/">dup</a>
          <a href="/explore/">explore</a>
          <a href="/p/CCC_33/">three</a>
        </main></body></html>"#;

    const NO_HEADER: &str = r#"<html><head><title>Page couldn't load • Instagram</title>
        <meta property="og:description" content="12.5K Followers, 80 Following, 310 Posts - See Instagram photos">
        </head><body><div>Something went wrong</div></body></html>"#;

    fn post_page(datetime: &str) -> String {
        format!(r#"<html><body><article><time datetime="{datetime}">May 1</time></article></body></html>"#)
    }

    /// Serves canned pages by URL; counts requests.
    struct Pages {
        pages: HashMap<String, String>,
        calls: Cell<usize>,
    }

    impl Pages {
        fn new(pages: impl IntoIterator<Item = (String, String)>) -> Self {
            Self {
                pages: pages.into_iter().collect(),
                calls: Cell::new(0),
            }
        }
    }

    impl FetchAsync for Pages {
        async fn fetch(&self, url: &str) -> Result<String, Box<dyn Error>> {
            self.calls.set(self.calls.get() + 1);
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| format!("404 for {url}").into())
        }
    }

    /// Answers each request with the next body in line.
    struct Sequence(RefCell<VecDeque<String>>);

    impl FetchAsync for Sequence {
        async fn fetch(&self, _url: &str) -> Result<String, Box<dyn Error>> {
            self.0
                .borrow_mut()
                .pop_front()
                .ok_or_else(|| "no more pages".into())
        }
    }

    fn quick_config() -> ParserConfig {
        ParserConfig {
            retries: 3,
            base_delay_ms: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_extract_header_data() {
        let header = extract_header_data(PROFILE);
        assert_eq!(header.posts, Some(1204));
        assert_eq!(header.followers, Some(12345));
        assert_eq!(header.following, Some(321));
    }

    #[test]
    fn test_extract_header_without_title_attribute() {
        let html = r#"<header><ul><li>5 posts</li><li>1.5M followers</li></ul></header>"#;
        let header = extract_header_data(html);
        assert_eq!(header.followers, Some(1_500_000));
        assert_eq!(header.following, None);
    }

    #[test]
    fn test_header_from_meta() {
        let header = header_from_meta(&meta_tags(NO_HEADER));
        assert_eq!(header.followers, Some(12_500));
        assert_eq!(header.following, Some(80));
        assert_eq!(header.posts, Some(310));
        assert!(header_from_meta(&[]).is_empty());
    }

    #[test]
    fn test_is_error_page() {
        assert!(is_error_page(NO_HEADER));
        assert!(!is_error_page(PROFILE));
    }

    #[test]
    fn test_latest_post_codes() {
        assert_eq!(latest_post_codes(PROFILE, 10), vec!["AAA111", "BBB-22", "CCC_33"]);
        assert_eq!(latest_post_codes(PROFILE, 1), vec!["AAA111"]);
    }

    #[test]
    fn test_post_pub_date() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        assert_eq!(post_pub_date(&post_page("2024-05-01T10:00:00.000Z")), Some(expected));

        let meta = r#"<html><head><meta property="article:published_time" content="2024-05-01T12:00:00+02:00"></head></html>"#;
        assert_eq!(post_pub_date(meta), Some(expected));
        assert_eq!(post_pub_date("<html></html>"), None);
    }

    #[test]
    fn test_urls() {
        assert_eq!(profile_url(" someone \n"), "https://www.instagram.com/someone/");
        assert_eq!(post_url("AAA111"), "https://www.instagram.com/p/AAA111/");
    }

    #[tokio::test]
    async fn test_retries_keep_first_metadata() {
        let pages = Pages::new([(profile_url("someone"), NO_HEADER.to_string())]);
        let page = get_account_with_retries(&pages, "someone", 3, Duration::ZERO).await;
        assert!(!page.is_ok);
        assert!(page.html.is_none());
        assert_eq!(pages.calls.get(), 3);
        assert!(page.metadata.iter().any(|(name, _)| name == "og:description"));
    }

    #[tokio::test]
    async fn test_retries_until_header_renders() {
        let bodies = Sequence(RefCell::new(VecDeque::from([
            NO_HEADER.to_string(),
            PROFILE.to_string(),
            PROFILE.to_string(),
        ])));
        let page = get_account_with_retries(&bodies, "someone", 3, Duration::ZERO).await;

        assert!(page.is_ok);
        assert_eq!(bodies.0.borrow().len(), 1);
        assert!(page.metadata.iter().any(|(name, _)| name == "og:description"));
        let header = extract_header_data(page.html.as_deref().unwrap());
        assert_eq!(header.followers, Some(12345));
    }

    #[tokio::test]
    async fn test_ig_parse_collects_posts_until_stop_date() {
        let pages = Pages::new([
            (profile_url("someone"), PROFILE.to_string()),
            (post_url("AAA111"), post_page("2024-05-10T00:00:00Z")),
            (post_url("CCC_33"), post_page("2024-04-01T00:00:00Z")),
        ]);
        let stop = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let reports = ig_parse(&pages, &["someone".to_string()], stop, &quick_config()).await;

        let report = &reports["someone"];
        assert!(report.error.is_none());
        assert_eq!(report.header.as_ref().unwrap().followers, Some(12345));
        let codes: Vec<&str> = report.posts.iter().map(|p| p.code.as_str()).collect();
        assert_eq!(codes, vec!["AAA111", "BBB-22"]);
        assert!(report.posts[1].pub_date.is_none());
    }

    #[tokio::test]
    async fn test_ig_parse_falls_back_to_meta() {
        let pages = Pages::new([(profile_url("walled"), NO_HEADER.to_string())]);
        let reports = ig_parse(&pages, &["walled".to_string()], Utc::now(), &quick_config()).await;
        let report = &reports["walled"];
        assert!(report.error.is_none());
        assert_eq!(report.header.as_ref().unwrap().posts, Some(310));
        assert!(report.posts.is_empty());
    }

    #[tokio::test]
    async fn test_ig_parse_reports_unloadable_account() {
        let pages = Pages::new(Vec::<(String, String)>::new());
        let reports = ig_parse(&pages, &["ghost".to_string()], Utc::now(), &quick_config()).await;
        assert_eq!(
            reports["ghost"].error.as_deref(),
            Some("After 3 retries, account page couldn't be loaded")
        );
        assert_eq!(pages.calls.get(), 3);
    }
}
