//! RSS recommendations for the personalized new-tab page.
//!
//! Fetching and scoring feeds happens in the backend; this module only
//! decides when to ask, caches the last answer under `lastRssResults`, and
//! forwards the RSS control actions.

use anyhow::Result;
use serde_json::json;

use history_curator_core::store::{keys, put_json, StateStore};

use crate::gateway::{Ack, Backend, RssResults, RssStatus};
use crate::settings::{rss_settings_from, Settings};

/// Recommendations to show, or `None` when the page stays hidden.
///
/// Hidden when the new-tab page is disabled, the backend does not answer
/// the ping, or the results request fails. Only store errors are `Err`.
pub async fn load_recommendations(
    store: &dyn StateStore,
    backend: &dyn Backend,
) -> Result<Option<RssResults>> {
    let settings = Settings::load(store).await?;
    if !settings.newtab_enabled {
        tracing::debug!("new-tab page disabled");
        return Ok(None);
    }

    if !backend.ping().await {
        tracing::warn!("backend not responding, hiding recommendations");
        return Ok(None);
    }

    let results = match backend.rss_results().await {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load RSS results");
            return Ok(None);
        }
    };

    put_json(store, keys::LAST_RSS_RESULTS, &results).await?;
    tracing::info!(labels = results.recommendations.len(), "RSS results cached");
    Ok(Some(results))
}

/// Backend RSS cache status, `None` when it cannot be determined.
pub async fn rss_status(backend: &dyn Backend) -> Option<RssStatus> {
    match backend.rss_status().await {
        Ok(status) => Some(status),
        Err(e) => {
            tracing::warn!(error = %e, "RSS status fetch failed");
            None
        }
    }
}

/// Push the stored RSS settings to the backend. Best-effort.
pub async fn push_settings(store: &dyn StateStore, backend: &dyn Backend) -> Result<()> {
    let settings = Settings::load(store).await?;
    backend.save_rss_settings(&rss_settings_from(&settings)).await;
    Ok(())
}

/// Sync settings, then ask the backend to refetch feeds.
pub async fn update_rss(store: &dyn StateStore, backend: &dyn Backend) -> Result<Ack> {
    push_settings(store, backend).await?;
    let ack = backend.update_rss().await;
    log_ack("update_rss", &ack);
    Ok(ack)
}

pub async fn clear_rss_cache(backend: &dyn Backend) -> Ack {
    let ack = backend.clear_rss_cache().await;
    log_ack("clear_rss_cache", &ack);
    ack
}

/// Toggle the new-tab page. Turning it off also stops the backend's
/// automatic RSS refresh when that is enabled.
pub async fn set_newtab_enabled(
    store: &dyn StateStore,
    backend: &dyn Backend,
    enabled: bool,
) -> Result<()> {
    store.set("newtabEnabled", json!(enabled)).await?;
    tracing::info!(enabled, "new-tab page toggled");

    let settings = Settings::load(store).await?;
    if !enabled && settings.rss_auto_update_enabled {
        backend.stop_auto_update().await;
    }
    Ok(())
}

fn log_ack(action: &str, ack: &Ack) {
    if ack.ok {
        tracing::info!(action, "RSS action succeeded");
    } else {
        tracing::warn!(action, error = ?ack.err, "RSS action failed");
    }
}
