//! JSON output of a run.
//!
//! Files are organized by date and named after the local time of the run:
//! `{output_dir}/{YYYY-MM-DD}/{HH-MM-SS}.json`.

use chrono::{DateTime, Local};
use std::error::Error;
use std::path::PathBuf;
use tokio::fs;
use tracing::{error, info, instrument};

use crate::models::ParseResults;

/// Serialize results, pretty-printed unless `pretty` is false.
pub fn render(results: &ParseResults, pretty: bool) -> Result<String, serde_json::Error> {
    if pretty {
        serde_json::to_string_pretty(results)
    } else {
        serde_json::to_string(results)
    }
}

/// Path of the results file for a run started at `at`.
pub fn results_path(output_dir: &str, at: DateTime<Local>) -> PathBuf {
    PathBuf::from(output_dir)
        .join(at.format("%Y-%m-%d").to_string())
        .join(format!("{}.json", at.format("%H-%M-%S")))
}

/// Write results to `{output_dir}/{date}/{time}.json` and return the path.
///
/// # Arguments
///
/// * `results` - Everything collected during the run
/// * `output_dir` - Root directory; the dated subdirectory is created on demand
/// * `pretty` - Pretty-print instead of compact JSON
///
/// # Returns
///
/// The path of the written file. Directory creation and write failures are
/// logged and returned.
#[instrument(level = "info", skip(results))]
pub async fn write_results(
    results: &ParseResults,
    output_dir: &str,
    pretty: bool,
) -> Result<PathBuf, Box<dyn Error>> {
    let json = render(results, pretty)?;
    let path = results_path(output_dir, Local::now());

    if let Some(dir) = path.parent() {
        info!(dir = %dir.display(), "Ensuring JSON directory exists");
        if let Err(e) = fs::create_dir_all(dir).await {
            error!(dir = %dir.display(), error = %e, "Failed to create JSON dir");
            return Err(e.into());
        }
    }

    fs::write(&path, json).await?;
    info!(path = %path.display(), "Wrote results");
    Ok(path)
}
