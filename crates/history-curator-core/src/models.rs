//! Core data models shared by the harvester, the tag reconciler, and the
//! persisted session state.
//!
//! Field names on the wire are camelCase (with the one `updated_at`
//! exception on [`SessionSnapshot`]) so that persisted documents stay
//! readable by the analysis backend and by older sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Sentinel written for absent titles and for the enrichment placeholders.
pub const NONE_SENTINEL: &str = "(NONE)";

/// Sentinel hostname for URLs that do not parse or carry no host.
pub const LOCAL_HOST_SENTINEL: &str = "(local)";

/// Raw visit produced by a history source before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawVisit {
    /// Source record id, when the source exposes one.
    pub id: Option<String>,
    pub url: String,
    pub title: Option<String>,
    pub last_visit: DateTime<Utc>,
    pub visit_count: Option<i64>,
}

impl RawVisit {
    /// Deduplication key: the source id, falling back to the URL.
    pub fn key(&self) -> &str {
        match self.id.as_deref() {
            Some(id) if !id.is_empty() => id,
            _ => &self.url,
        }
    }
}

/// One normalized browsing event, as cached under `historyData` and
/// written to history exports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub hostname: String,
    pub title: String,
    pub url: String,
    /// ISO-8601 UTC timestamp with millisecond precision.
    pub last_visit_time: String,
    pub visit_count: u32,
    pub description: String,
    pub embedding_text: String,
}

impl HistoryRecord {
    pub fn key(&self) -> &str {
        match self.id.as_deref() {
            Some(id) if !id.is_empty() => id,
            _ => &self.url,
        }
    }
}

/// A user-visible interest tag.
///
/// `id` is generated once and never changes. Legacy sessions may carry
/// tags without an id or with a null count; both deserialize to their
/// empty/zero forms and are repaired by the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub path: String,
    #[serde(default, deserialize_with = "count_or_zero")]
    pub count: u64,
}

impl Tag {
    pub fn new(id: impl Into<String>, path: impl Into<String>, count: u64) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            count,
        }
    }
}

/// Persisted pair of tag collections, stored under `tagState`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    #[serde(rename = "activeTags", default)]
    pub active_tags: Vec<Tag>,
    #[serde(rename = "deletedTags", default)]
    pub deleted_tags: Vec<Tag>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// One `{path, count}` entry of an analysis summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryEntry {
    pub path: String,
    #[serde(default, deserialize_with = "count_or_zero")]
    pub count: u64,
}

/// The last `/analyze` response, stored under `pythonAnalysis`.
///
/// Unknown fields are kept in `extra` so that the stored document
/// round-trips unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<Vec<SummaryEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_analyzed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl AnalysisSnapshot {
    /// Returns the summary entries when there is at least one.
    pub fn non_empty_summary(&self) -> Option<&[SummaryEntry]> {
        match self.summary.as_deref() {
            Some(entries) if !entries.is_empty() => Some(entries),
            _ => None,
        }
    }
}

/// Accepts a missing, null, negative, or fractional count and yields a
/// non-negative integer.
fn count_or_zero<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<f64> = Option::deserialize(deserializer)?;
    Ok(match value {
        Some(v) if v.is_finite() && v > 0.0 => v.round() as u64,
        _ => 0,
    })
}

/// Format an instant the way history records and snapshots carry it.
pub fn format_iso_millis(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}
