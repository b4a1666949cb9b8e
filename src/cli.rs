//! Command-line interface definitions.
//!
//! Every network takes an account-list file; networks without one are
//! skipped.

use clap::Parser;
use std::path::PathBuf;

/// Parse social network accounts from account-list files.
///
/// # Examples
///
/// ```sh
/// # YouTube channels, stop at videos older than a week
/// social_parser -y youtube.txt
///
/// # Both networks, explicit stop date, write JSON to ./out
/// social_parser -y youtube.txt -i instagram.txt -d 01.05.2024 -o ./out
/// ```
#[derive(Parser, Debug)]
#[command(name = "social_parser", author, version, about)]
pub struct Cli {
    /// List of Instagram accounts, text file, one per line
    #[arg(short, long)]
    pub instagram: Option<PathBuf>,

    /// List of YouTube accounts (`@handle` or `channel/UC...`), text file, one per line
    #[arg(short, long)]
    pub youtube: Option<PathBuf>,

    /// Date in the past at which parsing stops, format dd.mm.yyyy [default: a week ago]
    #[arg(short, long)]
    pub date: Option<String>,

    /// Optional path to a YAML settings file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory for the JSON results file; results go to stdout when omitted
    #[arg(short, long)]
    pub output_dir: Option<String>,

    /// YouTube Data API key, enables the API fallback for channels without scraped videos
    #[arg(long, env = "YOUTUBE_API_KEY", hide_env_values = true)]
    pub youtube_api_key: Option<String>,

    /// Emit compact instead of pretty-printed JSON
    #[arg(long)]
    pub compact: bool,
}
