//! Per-network scrapers.
//!
//! | Network | Module | Method | Notes |
//! |---------|--------|--------|-------|
//! | YouTube | [`youtube`] | Embedded JSON | `ytInitialData` / `ytInitialPlayerResponse` |
//! | YouTube | [`youtube_api`] | Data API v3 | Optional fallback; needs an API key |
//! | Instagram | [`instagram`] | HTML scraping | Mobile markup, meta-tag fallback |
//!
//! Each network exposes one entry point taking a [`FetchAsync`](crate::api::FetchAsync),
//! the account list and the stop date:
//! - [`youtube::yt_parse`]
//! - [`instagram::ig_parse`]
//!
//! Accounts are processed one at a time; a failing account is recorded in
//! its report and never aborts the run.

pub mod instagram;
pub mod youtube;
pub mod youtube_api;
