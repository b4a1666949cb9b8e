//! Embedded-JSON extraction from page markup.
//!
//! YouTube ships the state of a page as JavaScript assignments inside inline
//! `<script>` tags, e.g.
//!
//! ```text
//! <script nonce="...">var ytInitialData = {"contents": {...}};</script>
//! ```
//!
//! This module finds the script whose text begins with a given marker and
//! slices the object literal out of it. The slice starts at the first `{`
//! after the marker and ends at the matching `}`; brace counting ignores
//! anything inside JSON string literals.

use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde_json::Value;
use std::error::Error;
use tracing::{debug, instrument};

use crate::utils::truncate_for_log;

/// Marker of the browse/watch-next state blob.
pub const YT_INITIAL_DATA: &str = "var ytInitialData";
/// Marker of the player state blob (video details and microformat).
pub const YT_INITIAL_PLAYER_RESPONSE: &str = "var ytInitialPlayerResponse";

static SCRIPT_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("script").expect("static selector"));

/// Return the text of the first `<script>` whose (left-trimmed) text starts with `marker`.
pub fn find_script_starting_with(html: &str, marker: &str) -> Option<String> {
    let document = Html::parse_document(html);
    document
        .select(&SCRIPT_SELECTOR)
        .map(|script| script.text().collect::<String>())
        .find(|text| text.trim_start().starts_with(marker))
}

/// Slice the first balanced JSON object out of `script_text` and parse it.
pub fn extract_embedded_json(script_text: &str) -> Result<Value, Box<dyn Error>> {
    let start = script_text
        .find('{')
        .ok_or("no JSON object in script text")?;
    let end = find_object_end(&script_text[start..])
        .ok_or("unbalanced braces in embedded JSON")?;
    let literal = &script_text[start..start + end];
    debug!(bytes = literal.len(), preview = %truncate_for_log(literal, 80), "Sliced embedded JSON");
    Ok(serde_json::from_str(literal)?)
}

/// Locate the script starting with `marker` in `html` and parse its JSON blob.
#[instrument(level = "debug", skip(html), fields(html_bytes = html.len()))]
pub fn embedded_json(html: &str, marker: &str) -> Result<Value, Box<dyn Error>> {
    let script = find_script_starting_with(html, marker)
        .ok_or_else(|| format!("no <script> starting with `{marker}`"))?;
    extract_embedded_json(&script)
}

/// Byte offset one past the `}` closing the object that opens at `text[0]`.
fn find_object_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}
