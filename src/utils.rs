//! Helpers shared by the scrapers: JSON path walking, count normalization,
//! account-list loading, stop-date parsing and file system checks.

use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone, Utc};
use itertools::Itertools;
use serde_json::Value;
use std::error::Error;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{debug, error, info, instrument};

/// Input format of the `--date` flag.
pub const STOP_DATE_FORMAT: &str = "%d.%m.%Y";

/// Walk `path` through nested objects and arrays of `data`.
///
/// Segments made only of digits index into arrays; everything else is an
/// object key. Returns `None` as soon as a segment is missing.
///
/// # Examples
///
/// ```ignore
/// let v = json!({"a": [{"b": 1}]});
/// assert_eq!(value_at(&v, &["a", "0", "b"]), Some(&json!(1)));
/// ```
pub fn value_at<'a>(data: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(data, |current, key| {
        if !key.is_empty() && key.chars().all(|c| c.is_ascii_digit()) {
            current.as_array()?.get(key.parse::<usize>().ok()?)
        } else {
            current.get(*key)
        }
    })
}

/// Like [`value_at`], but fails with an error naming the first missing key.
pub fn require_at<'a>(data: &'a Value, path: &[&str]) -> Result<&'a Value, String> {
    let mut current = data;
    for (depth, key) in path.iter().enumerate() {
        current = value_at(current, &[key])
            .ok_or_else(|| format!("missing key `{}`", path[..=depth].join(".")))?;
    }
    Ok(current)
}

/// Normalize a human-readable count such as `1,234`, `12.5K` or `3M`.
pub fn parse_count(text: &str) -> Option<u64> {
    let text = text.trim().to_lowercase().replace([',', ' ', '\u{a0}'], "");
    let (number, multiplier) = match text.chars().last()? {
        'k' => (&text[..text.len() - 1], 1_000.0),
        'm' => (&text[..text.len() - 1], 1_000_000.0),
        'b' => (&text[..text.len() - 1], 1_000_000_000.0),
        _ => (text.as_str(), 1.0),
    };
    if multiplier == 1.0 {
        return number.parse().ok();
    }
    number
        .parse::<f64>()
        .ok()
        .map(|n| (n * multiplier).round() as u64)
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to `max` bytes (backed off to a char boundary) with
/// `"…(+N bytes)"` appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Read an account list: one account per line.
///
/// Lines are trimmed; blank lines and `#` comments are skipped and repeated
/// accounts are kept once. An unreadable file is logged and yields an empty
/// list so the caller can skip that network.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub fn read_account_list(path: &Path) -> Vec<String> {
    match stdfs::read_to_string(path) {
        Ok(contents) => parse_account_list(&contents),
        Err(e) => {
            debug!(error = %e, "Could not read account list");
            Vec::new()
        }
    }
}

fn parse_account_list(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .unique()
        .collect()
}

/// Resolve the date in the past at which scraping stops.
///
/// `date_str` is expected as `dd.mm.yyyy` and is taken as local midnight.
/// When it is missing or fails to parse, the stop date is one week before now.
pub fn stop_date(date_str: Option<&str>) -> DateTime<Utc> {
    if let Some(raw) = date_str.filter(|s| !s.trim().is_empty()) {
        match NaiveDate::parse_from_str(raw.trim(), STOP_DATE_FORMAT) {
            Ok(date) => {
                let midnight = date.and_hms_opt(0, 0, 0).unwrap_or_default();
                if let Some(local) = Local.from_local_datetime(&midnight).earliest() {
                    return local.with_timezone(&Utc);
                }
                return Utc.from_utc_datetime(&midnight);
            }
            Err(e) => error!(input = raw, error = %e, "Parsing date failed"),
        }
    }

    let stop = Utc::now() - Duration::days(7);
    info!(%stop, "Stop date set to one week ago");
    stop
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then writes and removes a probe file.
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    let probe_path = format!("{}/..__probe_write__", path.trim_end_matches('/'));
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("Output directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}
