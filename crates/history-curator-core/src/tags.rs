//! Tag store and reconciler.
//!
//! [`TagStore`] owns the two ordered tag collections:
//!
//! - **active**: ranked by count, descending; ties keep their prior
//!   relative order (stable sort).
//! - **deleted**: most recently deleted first.
//!
//! A tag lives in exactly one of the two. The store is loaded either from a
//! backend analysis snapshot (authoritative, replaces everything) or from
//! the locally persisted [`SessionSnapshot`]; whichever source is empty
//! falls through to the other.
//!
//! Mutations only touch memory. Persisting the resulting snapshot and
//! marking the session dirty is the caller's job (see the `curator`
//! module of the main crate).
//!
//! # Drag ranking
//!
//! Interactive re-ranking is a three-step session:
//!
//! ```text
//! begin_drag(id)        capture max = count of rank-1 tag
//! drag_to / ratio  ...  clamp to [0, max], update count, no re-sort
//! end_drag()            stable re-sort
//! cancel_drag()         put back the count from begin_drag
//! ```
//!
//! Move and end calls without an active drag are no-ops.

use uuid::Uuid;

use crate::models::{AnalysisSnapshot, SessionSnapshot, SummaryEntry, Tag};

/// Count given to a custom tag when the active list is empty.
pub const DEFAULT_CUSTOM_COUNT: u64 = 50;

/// Generate a fresh opaque tag id.
pub fn new_tag_id() -> String {
    format!("tag_{}", Uuid::new_v4().simple())
}

/// Which source a load ended up using.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    /// Replaced from a non-empty analysis summary.
    Backend,
    /// Restored from the persisted session.
    LocalSession,
    /// Neither source had data; the store is empty.
    Empty,
}

/// A row of the ranked view.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedTag<'a> {
    pub rank: usize,
    pub tag: &'a Tag,
    /// Bar width relative to the top count, in `[0, 1]`.
    pub ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct DragSession {
    tag_id: String,
    max_count: u64,
    original_count: u64,
}

#[derive(Debug, Default, Clone)]
pub struct TagStore {
    active: Vec<Tag>,
    deleted: Vec<Tag>,
    drag: Option<DragSession>,
}

impl TagStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> &[Tag] {
        &self.active
    }

    pub fn deleted(&self) -> &[Tag] {
        &self.deleted
    }

    pub fn find_active(&self, id: &str) -> Option<&Tag> {
        self.active.iter().find(|t| t.id == id)
    }

    /// Snapshot suitable for persisting under `tagState`.
    pub fn snapshot(&self, updated_at: impl Into<String>) -> SessionSnapshot {
        SessionSnapshot {
            active_tags: self.active.clone(),
            deleted_tags: self.deleted.clone(),
            updated_at: Some(updated_at.into()),
        }
    }

    /// Load from a backend analysis, falling through to `session` when the
    /// analysis is absent or its summary is empty.
    pub fn load_from_backend_snapshot(
        &mut self,
        analysis: Option<&AnalysisSnapshot>,
        session: Option<&SessionSnapshot>,
    ) -> LoadSource {
        match analysis.and_then(AnalysisSnapshot::non_empty_summary) {
            Some(summary) => {
                self.replace_from_summary(summary);
                LoadSource::Backend
            }
            None => match session {
                Some(s) => {
                    self.restore_session(s);
                    LoadSource::LocalSession
                }
                None => LoadSource::Empty,
            },
        }
    }

    /// Restore from the persisted session, falling back to `analysis` when
    /// no session exists.
    pub fn load_from_local_session(
        &mut self,
        session: Option<&SessionSnapshot>,
        analysis: Option<&AnalysisSnapshot>,
    ) -> LoadSource {
        match session {
            Some(s) => {
                self.restore_session(s);
                LoadSource::LocalSession
            }
            None => match analysis.and_then(AnalysisSnapshot::non_empty_summary) {
                Some(summary) => {
                    self.replace_from_summary(summary);
                    LoadSource::Backend
                }
                None => LoadSource::Empty,
            },
        }
    }

    fn replace_from_summary(&mut self, summary: &[SummaryEntry]) {
        self.active = summary
            .iter()
            .map(|entry| Tag::new(new_tag_id(), entry.path.clone(), entry.count))
            .collect();
        self.deleted.clear();
        self.drag = None;
        self.sort_active();
    }

    fn restore_session(&mut self, session: &SessionSnapshot) {
        let repair = |t: &Tag| {
            let id = if t.id.is_empty() {
                new_tag_id()
            } else {
                t.id.clone()
            };
            Tag::new(id, t.path.clone(), t.count)
        };
        self.active = session.active_tags.iter().map(repair).collect();
        self.deleted = session.deleted_tags.iter().map(repair).collect();
        self.drag = None;
        self.sort_active();
    }

    /// Move a tag from active to the front of deleted. Returns whether a
    /// tag moved.
    pub fn delete_tag(&mut self, id: &str) -> bool {
        let Some(idx) = self.active.iter().position(|t| t.id == id) else {
            return false;
        };
        let removed = self.active.remove(idx);
        if self.drag.as_ref().is_some_and(|d| d.tag_id == removed.id) {
            self.drag = None;
        }
        self.deleted.insert(0, removed);
        true
    }

    /// Move a tag from deleted to the front of active and re-rank.
    pub fn restore_tag(&mut self, id: &str) -> bool {
        let Some(idx) = self.deleted.iter().position(|t| t.id == id) else {
            return false;
        };
        let restored = self.deleted.remove(idx);
        self.active.insert(0, restored);
        self.sort_active();
        true
    }

    /// Add a user-defined tag. Blank labels are ignored.
    ///
    /// The new tag takes the current top count (or
    /// [`DEFAULT_CUSTOM_COUNT`]) and is inserted ahead of every existing
    /// tag before the stable sort, so it ranks first among equals.
    pub fn add_custom_tag(&mut self, label: &str) -> Option<&Tag> {
        let path = label.trim();
        if path.is_empty() {
            return None;
        }
        let count = self
            .active
            .first()
            .map(|t| t.count)
            .unwrap_or(DEFAULT_CUSTOM_COUNT);
        let id = new_tag_id();
        self.active.insert(0, Tag::new(id.clone(), path, count));
        self.sort_active();
        self.find_active(&id)
    }

    /// Start dragging `id`. The clamp ceiling is the rank-1 count right now
    /// and stays fixed for the rest of the drag.
    pub fn begin_drag(&mut self, id: &str) -> bool {
        let Some(original_count) = self.find_active(id).map(|t| t.count) else {
            self.drag = None;
            return false;
        };
        let max_count = self.active.iter().map(|t| t.count).max().unwrap_or(0);
        self.drag = Some(DragSession {
            tag_id: id.to_string(),
            max_count,
            original_count,
        });
        true
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Set the dragged tag's count, clamped to `[0, max]`. Returns the
    /// applied count, or `None` when no drag is active.
    pub fn drag_to(&mut self, new_count: i64) -> Option<u64> {
        let drag = self.drag.as_ref()?;
        let clamped = new_count.clamp(0, drag.max_count as i64) as u64;
        let tag_id = drag.tag_id.clone();
        let tag = self.active.iter_mut().find(|t| t.id == tag_id)?;
        tag.count = clamped;
        Some(clamped)
    }

    /// Set the dragged tag's count from a bar-width ratio.
    pub fn drag_to_ratio(&mut self, ratio: f64) -> Option<u64> {
        let max = self.drag.as_ref()?.max_count;
        let ratio = if ratio.is_finite() {
            ratio.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.drag_to((max as f64 * ratio).round() as i64)
    }

    /// Finish the drag and re-rank. Returns whether a drag was active.
    pub fn end_drag(&mut self) -> bool {
        if self.drag.take().is_none() {
            return false;
        }
        self.sort_active();
        true
    }

    /// Abandon a drag. The dragged tag gets its starting count back, so the
    /// collections end up as they were before `begin_drag`.
    pub fn cancel_drag(&mut self) {
        let Some(drag) = self.drag.take() else {
            return;
        };
        if let Some(tag) = self.active.iter_mut().find(|t| t.id == drag.tag_id) {
            tag.count = drag.original_count;
        }
    }

    /// One-shot drag: begin, move to `new_count`, end.
    pub fn reorder_by_drag(&mut self, id: &str, new_count: i64) -> Option<u64> {
        if !self.begin_drag(id) {
            return None;
        }
        let applied = self.drag_to(new_count);
        self.end_drag();
        applied
    }

    /// Ranked rows with bar ratios relative to the top count.
    pub fn ranked(&self) -> Vec<RankedTag<'_>> {
        let max = self.active.iter().map(|t| t.count).max().unwrap_or(0);
        self.active
            .iter()
            .enumerate()
            .map(|(i, tag)| RankedTag {
                rank: i + 1,
                tag,
                ratio: if max > 0 {
                    tag.count as f64 / max as f64
                } else {
                    0.0
                },
            })
            .collect()
    }

    /// Active tags as summary entries, in rank order.
    pub fn summary(&self) -> Vec<SummaryEntry> {
        self.active
            .iter()
            .map(|t| SummaryEntry {
                path: t.path.clone(),
                count: t.count,
            })
            .collect()
    }

    fn sort_active(&mut self) {
        // Vec::sort_by is stable.
        self.active.sort_by(|a, b| b.count.cmp(&a.count));
    }
}
