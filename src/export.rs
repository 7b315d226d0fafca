//! Export harvested history as JSON for the analysis backend.
//!
//! Produces `history_<unix-millis>.json` in the export directory:
//!
//! ```json
//! {
//!   "generatedAt": "2024-05-01T10:00:00.000Z",
//!   "installedAt": "2024-04-01T09:00:00.000Z",
//!   "totalCount": 812,
//!   "settings": { "historyDays": 30, "granularityLevel": 2, ... },
//!   "items": [ { "hostname": "docs.rs", ... } ]
//! }
//! ```
//!
//! and then tells the backend the file is ready. The notification is
//! best-effort; a backend that is down does not fail the export.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use history_curator_core::history::filter_blacklisted;
use history_curator_core::models::{format_iso_millis, HistoryRecord};
use history_curator_core::store::StateStore;

use crate::gateway::{AnalysisSettings, Backend};
use crate::harvest::Harvester;
use crate::progress::HarvestProgressReporter;
use crate::settings::{installed_at, Settings};

/// Folder name the backend expects in front of the file name.
pub const EXPORT_FOLDER: &str = "browser_history";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportDocument<'a> {
    generated_at: String,
    installed_at: String,
    total_count: usize,
    settings: &'a AnalysisSettings,
    items: &'a [HistoryRecord],
}

/// Result of a successful export.
#[derive(Debug, Clone)]
pub struct ExportReport {
    pub path: PathBuf,
    /// Name reported to the backend, relative to its download folder.
    pub filename: String,
    pub total_count: usize,
}

/// Harvest, filter, write, and notify.
pub async fn export_history(
    dir: &Path,
    harvester: &Harvester,
    store: &dyn StateStore,
    backend: &dyn Backend,
    cancel: &CancellationToken,
    progress: &dyn HarvestProgressReporter,
) -> Result<ExportReport> {
    let settings = Settings::load(store).await?;
    tracing::info!(history_days = settings.history_days, "exporting history");

    let records = harvester
        .fetch_history_with(settings.history_days, cancel, progress)
        .await?;
    let harvested = records.len();
    let items = filter_blacklisted(records, &settings.site_blacklist);
    tracing::info!(
        harvested,
        kept = items.len(),
        "blacklist applied"
    );

    let analysis_settings = settings.analysis_settings();
    let now = chrono::Utc::now();
    let document = ExportDocument {
        generated_at: format_iso_millis(now),
        installed_at: installed_at(store)
            .await?
            .unwrap_or_else(|| "(unknown)".to_string()),
        total_count: items.len(),
        settings: &analysis_settings,
        items: &items,
    };

    let file_name = format!("history_{}.json", now.timestamp_millis());
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create export directory: {}", dir.display()))?;
    let path = dir.join(&file_name);
    let json = serde_json::to_string_pretty(&document)?;
    std::fs::write(&path, json)
        .with_context(|| format!("Failed to write export file: {}", path.display()))?;
    tracing::info!(path = %path.display(), items = items.len(), "export written");

    let filename = format!("{}/{}", EXPORT_FOLDER, file_name);
    backend.notify_download(&filename, &analysis_settings).await;

    Ok(ExportReport {
        path,
        filename,
        total_count: items.len(),
    })
}
