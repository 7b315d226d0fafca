//! History normalization and the windowed harvest plan.
//!
//! The async walk itself lives in the main crate; this module holds the
//! pure parts: window arithmetic, termination rules, deduplication, and
//! the mapping from [`RawVisit`] to [`HistoryRecord`].

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use url::Url;

use crate::models::{format_iso_millis, HistoryRecord, RawVisit, LOCAL_HOST_SENTINEL, NONE_SENTINEL};

pub const DEFAULT_WINDOW_DAYS: u32 = 15;
pub const DEFAULT_MAX_RESULTS_PER_QUERY: usize = 1000;
pub const DEFAULT_MAX_TOTAL: usize = 5000;

/// Limits that bound one harvest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarvestLimits {
    pub window_days: u32,
    pub max_results_per_query: usize,
    pub max_total: usize,
}

impl Default for HarvestLimits {
    fn default() -> Self {
        Self {
            window_days: DEFAULT_WINDOW_DAYS,
            max_results_per_query: DEFAULT_MAX_RESULTS_PER_QUERY,
            max_total: DEFAULT_MAX_TOTAL,
        }
    }
}

/// One backward-looking query window: `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarvestWindow {
    pub index: u32,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Days covered once this window has been queried.
    pub covered_days: u32,
}

/// Window layout anchored at a fixed "now".
#[derive(Debug, Clone, Copy)]
pub struct HarvestPlan {
    pub now: DateTime<Utc>,
    pub target_days: u32,
    pub limits: HarvestLimits,
}

impl HarvestPlan {
    pub fn new(now: DateTime<Utc>, target_days: u32, limits: HarvestLimits) -> Self {
        Self {
            now,
            target_days,
            limits,
        }
    }

    /// Window `index` covers `[now - (index+1)*w, now - index*w)`.
    pub fn window(&self, index: u32) -> HarvestWindow {
        let step = self.limits.window_days.max(1);
        let covered_before = index.saturating_mul(step);
        let covered_after = covered_before.saturating_add(step);
        HarvestWindow {
            index,
            start: self.now - Duration::days(i64::from(covered_after)),
            end: self.now - Duration::days(i64::from(covered_before)),
            covered_days: covered_after,
        }
    }

    /// A zero-day target issues no query at all.
    pub fn is_empty(&self) -> bool {
        self.target_days == 0
    }

    /// Upper bound on the number of windows a harvest can query.
    pub fn max_windows(&self) -> u32 {
        let step = self.limits.window_days.max(1);
        self.target_days.div_ceil(step) + 1
    }

    /// Whether the walk stops after `window` returned `returned` rows and
    /// the running total is `total`.
    pub fn is_done(&self, window: &HarvestWindow, returned: usize, total: usize) -> bool {
        returned == 0 || total >= self.limits.max_total || window.covered_days >= self.target_days
    }
}

/// Hostname of `raw_url`, or the local sentinel.
pub fn hostname_of(raw_url: &str) -> String {
    Url::parse(raw_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| LOCAL_HOST_SENTINEL.to_string())
}

pub fn normalize(visit: &RawVisit) -> HistoryRecord {
    let title = visit
        .title
        .as_deref()
        .filter(|t| !t.is_empty())
        .unwrap_or(NONE_SENTINEL)
        .to_string();
    let visit_count = match visit.visit_count {
        Some(n) if n >= 1 => u32::try_from(n).unwrap_or(u32::MAX),
        _ => 1,
    };

    HistoryRecord {
        id: visit.id.clone().filter(|id| !id.is_empty()),
        hostname: hostname_of(&visit.url),
        title,
        url: visit.url.clone(),
        last_visit_time: format_iso_millis(visit.last_visit),
        visit_count,
        description: NONE_SENTINEL.to_string(),
        embedding_text: NONE_SENTINEL.to_string(),
    }
}

/// Deduplicate by key (first occurrence kept), sort newest first, and
/// normalize.
pub fn dedupe_and_sort(visits: Vec<RawVisit>) -> Vec<HistoryRecord> {
    let mut seen: HashSet<String> = HashSet::with_capacity(visits.len());
    let mut unique: Vec<RawVisit> = visits
        .into_iter()
        .filter(|v| seen.insert(v.key().to_string()))
        .collect();

    unique.sort_by(|a, b| b.last_visit.cmp(&a.last_visit));
    unique.iter().map(normalize).collect()
}

/// Drop records whose URL contains any non-empty blacklist entry.
pub fn filter_blacklisted(records: Vec<HistoryRecord>, blacklist: &[String]) -> Vec<HistoryRecord> {
    let entries: Vec<&str> = blacklist
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if entries.is_empty() {
        return records;
    }
    records
        .into_iter()
        .filter(|r| !entries.iter().any(|domain| r.url.contains(domain)))
        .collect()
}
