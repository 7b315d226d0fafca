//! Analysis runner: ask the backend to classify the exported history and
//! keep its answer under `pythonAnalysis`.

use anyhow::Result;

use history_curator_core::store::{keys, put_json, StateStore};

use crate::gateway::{Ack, Backend};
use crate::settings::Settings;

/// Run `/analyze` with the stored settings.
///
/// Transport and decode failures come back as a failed [`Ack`] and leave
/// the stored analysis untouched. Only a failure to read settings or to
/// write the result is an `Err`.
pub async fn run_analysis(store: &dyn StateStore, backend: &dyn Backend) -> Result<Ack> {
    let settings = Settings::load(store).await?.analysis_settings();
    tracing::info!(
        history_days = settings.history_days,
        granularity = settings.granularity_level,
        sampling = settings.sampling_count,
        "requesting analysis"
    );

    let analysis = match backend.analyze(&settings).await {
        Ok(a) => a,
        Err(e) => {
            tracing::warn!(error = %e, "analysis failed");
            return Ok(Ack::err(format!("{:#}", e)));
        }
    };

    let entries = analysis.summary.as_ref().map_or(0, Vec::len);
    put_json(store, keys::PYTHON_ANALYSIS, &analysis).await?;
    tracing::info!(entries, "analysis stored");
    Ok(Ack::ok())
}
