//! Windowed history harvest.
//!
//! Walks backward from now in fixed-size windows, one capped query per
//! window, until a window comes back empty, the total cap is reached, or
//! the requested span is covered. The accumulated visits are deduplicated,
//! sorted newest first, and stored under `historyData`.
//!
//! Windows run strictly one after another with a short pause between them
//! so the browser database is not hammered.
//!
//! # Failure policy
//!
//! A source error or a cancellation aborts the harvest and nothing is
//! persisted. A zero-day target issues no query and persists an empty
//! batch.

use anyhow::{bail, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use history_curator_core::history::{dedupe_and_sort, HarvestLimits, HarvestPlan};
use history_curator_core::models::{HistoryRecord, RawVisit};
use history_curator_core::store::{keys, put_json, StateStore};

use crate::history_source::HistorySource;
use crate::progress::{HarvestProgressEvent, HarvestProgressReporter, NoProgress};

pub struct Harvester {
    source: Box<dyn HistorySource>,
    store: Arc<dyn StateStore>,
    limits: HarvestLimits,
    pause: Duration,
}

impl Harvester {
    pub fn new(
        source: Box<dyn HistorySource>,
        store: Arc<dyn StateStore>,
        limits: HarvestLimits,
        pause: Duration,
    ) -> Self {
        Self {
            source,
            store,
            limits,
            pause,
        }
    }

    /// Harvest `target_days` of history without progress output.
    pub async fn fetch_history(&self, target_days: u32) -> Result<Vec<HistoryRecord>> {
        self.fetch_history_with(target_days, &CancellationToken::new(), &NoProgress)
            .await
    }

    /// Harvest `target_days` of history, observing `cancel` before each
    /// window and during each pause.
    pub async fn fetch_history_with(
        &self,
        target_days: u32,
        cancel: &CancellationToken,
        progress: &dyn HarvestProgressReporter,
    ) -> Result<Vec<HistoryRecord>> {
        let plan = HarvestPlan::new(Utc::now(), target_days, self.limits);
        let mut collected: Vec<RawVisit> = Vec::new();

        if plan.is_empty() {
            tracing::info!("harvest target is 0 days, skipping queries");
        } else {
            for index in 0..plan.max_windows() {
                if cancel.is_cancelled() {
                    bail!("History harvest cancelled");
                }

                let window = plan.window(index);
                let batch = self
                    .source
                    .query(window.start, window.end, self.limits.max_results_per_query)
                    .await?;
                let returned = batch.len();
                collected.extend(batch);

                tracing::debug!(
                    window = index,
                    returned,
                    total = collected.len(),
                    covered_days = window.covered_days,
                    "harvest window queried"
                );
                progress.report(HarvestProgressEvent::Window {
                    index,
                    collected: collected.len() as u64,
                    covered_days: window.covered_days,
                });

                let done = plan.is_done(&window, returned, collected.len());

                if !self.pause.is_zero() {
                    tokio::select! {
                        _ = cancel.cancelled() => bail!("History harvest cancelled"),
                        _ = tokio::time::sleep(self.pause) => {}
                    }
                }

                if done {
                    break;
                }
            }
        }

        collected.truncate(self.limits.max_total);
        let records = dedupe_and_sort(collected);

        put_json(self.store.as_ref(), keys::HISTORY_DATA, &records).await?;

        tracing::info!(records = records.len(), target_days, "history harvested");
        progress.report(HarvestProgressEvent::Done {
            total: records.len() as u64,
        });
        Ok(records)
    }
}
