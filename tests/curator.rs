use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use history_curator::curator::Curator;
use history_curator::gateway::{
    Ack, AnalysisSettings, Backend, CustomAnalysisPayload, RssResults, RssSettingsPayload,
    RssStatus,
};
use history_curator_core::models::{AnalysisSnapshot, SessionSnapshot, Tag};
use history_curator_core::store::memory::InMemoryStore;
use history_curator_core::store::{get_json, get_or, keys, put_json, StateStore};
use history_curator_core::sync_state::SaveState;
use history_curator_core::tags::LoadSource;

/// Records save calls; everything else is unused here.
#[derive(Default)]
struct FakeBackend {
    saves: Mutex<Vec<CustomAnalysisPayload>>,
    save_calls: AtomicUsize,
    fail: AtomicBool,
    delay: Option<Duration>,
}

impl FakeBackend {
    fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    fn calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn ping(&self) -> bool {
        true
    }

    async fn notify_download(&self, _filename: &str, _settings: &AnalysisSettings) {}

    async fn analyze(&self, _settings: &AnalysisSettings) -> Result<AnalysisSnapshot> {
        anyhow::bail!("not used")
    }

    async fn save_custom_analysis(&self, payload: &CustomAnalysisPayload) -> Ack {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.saves.lock().unwrap().push(payload.clone());
        if self.fail.load(Ordering::SeqCst) {
            Ack::err("HTTP 500: boom")
        } else {
            Ack::ok()
        }
    }

    async fn rss_results(&self) -> Result<RssResults> {
        anyhow::bail!("not used")
    }

    async fn rss_status(&self) -> Result<RssStatus> {
        anyhow::bail!("not used")
    }

    async fn save_rss_settings(&self, _payload: &RssSettingsPayload) {}

    async fn update_rss(&self) -> Ack {
        Ack::ok()
    }

    async fn clear_rss_cache(&self) -> Ack {
        Ack::ok()
    }

    async fn stop_auto_update(&self) {}
}

async fn store_with_analysis(entries: &[(&str, u64)]) -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    let summary: Vec<_> = entries
        .iter()
        .map(|(p, c)| json!({"path": p, "count": c}))
        .collect();
    store
        .set(
            keys::PYTHON_ANALYSIS,
            json!({
                "summary": summary,
                "totalCount": 812,
                "settings": {"historyDays": 30, "granularityLevel": 2}
            }),
        )
        .await
        .unwrap();
    store
}

fn path_of(curator: &Curator, index: usize) -> String {
    curator.active()[index].path.clone()
}

fn id_of(curator: &Curator, path: &str) -> String {
    curator.resolve(path).unwrap()
}

#[tokio::test]
async fn open_from_analysis_is_saved() {
    let store = store_with_analysis(&[("News", 10), ("Tech", 40)]).await;
    let curator = Curator::new(store.clone(), Arc::new(FakeBackend::default()));

    assert_eq!(curator.open().await.unwrap(), LoadSource::Backend);
    assert_eq!(curator.state(), SaveState::Saved);
    assert!(curator.deleted().is_empty());
    assert_eq!(path_of(&curator, 0), "Tech");

    let session: SessionSnapshot = get_json(store.as_ref(), keys::TAG_STATE)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.active_tags.len(), 2);
    assert!(session.updated_at.is_some());
    assert!(!get_or(store.as_ref(), keys::TAG_DIRTY, true).await.unwrap());
}

#[tokio::test]
async fn refresh_discards_local_edits() {
    let store = store_with_analysis(&[("A", 100), ("B", 50)]).await;
    let curator = Curator::new(store.clone(), Arc::new(FakeBackend::default()));
    curator.open().await.unwrap();
    curator.delete_tag(&id_of(&curator, "B")).await.unwrap();
    assert_eq!(curator.state(), SaveState::Unsaved);

    curator.refresh().await.unwrap();
    assert_eq!(curator.state(), SaveState::Saved);
    assert_eq!(curator.active().len(), 2);
    assert!(curator.deleted().is_empty());
}

#[tokio::test]
async fn every_mutation_marks_unsaved() {
    let store = store_with_analysis(&[("A", 100), ("B", 50)]).await;
    let backend = Arc::new(FakeBackend::default());

    // delete
    let curator = Curator::new(store.clone(), backend.clone());
    curator.open().await.unwrap();
    curator.delete_tag(&id_of(&curator, "B")).await.unwrap();
    assert_eq!(curator.state(), SaveState::Unsaved);
    curator.delete_tag("missing").await.unwrap();
    assert_eq!(curator.state(), SaveState::Unsaved);

    // restore
    curator.refresh().await.unwrap();
    let b = id_of(&curator, "B");
    curator.delete_tag(&b).await.unwrap();
    curator.save().await.unwrap();
    assert_eq!(curator.state(), SaveState::Saved);
    assert!(curator.restore_tag(&b).await.unwrap());
    assert_eq!(curator.state(), SaveState::Unsaved);

    // add custom
    curator.refresh().await.unwrap();
    curator.add_custom_tag("rust").await.unwrap();
    assert_eq!(curator.state(), SaveState::Unsaved);

    // drag
    curator.refresh().await.unwrap();
    let b = id_of(&curator, "B");
    assert!(curator.begin_drag(&b));
    curator.drag_to_ratio(0.9);
    assert_eq!(curator.state(), SaveState::Saved);
    assert!(curator.end_drag().await.unwrap());
    assert_eq!(curator.state(), SaveState::Unsaved);
    assert!(!curator.end_drag().await.unwrap());
    assert_eq!(curator.state(), SaveState::Unsaved);
}

#[tokio::test]
async fn delete_of_unknown_id_still_counts_as_edit() {
    let store = store_with_analysis(&[("A", 1)]).await;
    let curator = Curator::new(store.clone(), Arc::new(FakeBackend::default()));
    curator.open().await.unwrap();

    assert!(!curator.delete_tag("nope").await.unwrap());
    assert_eq!(curator.active().len(), 1);
    assert_eq!(curator.state(), SaveState::Unsaved);
    assert!(get_or(store.as_ref(), keys::TAG_DIRTY, false).await.unwrap());
}

#[tokio::test]
async fn blank_custom_tag_is_not_an_edit() {
    let store = store_with_analysis(&[("A", 1)]).await;
    let curator = Curator::new(store, Arc::new(FakeBackend::default()));
    curator.open().await.unwrap();

    assert!(curator.add_custom_tag("   ").await.unwrap().is_none());
    assert_eq!(curator.state(), SaveState::Saved);
}

#[tokio::test]
async fn delete_restore_scenario() {
    let store = store_with_analysis(&[("A", 100), ("B", 50)]).await;
    let curator = Curator::new(store, Arc::new(FakeBackend::default()));
    curator.open().await.unwrap();
    let b = id_of(&curator, "B");

    curator.delete_tag(&b).await.unwrap();
    assert_eq!(curator.active().len(), 1);
    assert_eq!(curator.deleted()[0].id, b);

    curator.restore_tag(&b).await.unwrap();
    let active = curator.active();
    assert_eq!(active[0].path, "A");
    assert_eq!(active[1].id, b);
    assert_eq!(active[1].count, 50);
    assert!(curator.deleted().is_empty());
    assert_eq!(curator.state(), SaveState::Unsaved);
}

#[tokio::test]
async fn custom_tag_scenario() {
    let store = store_with_analysis(&[("A", 100)]).await;
    let curator = Curator::new(store, Arc::new(FakeBackend::default()));
    curator.open().await.unwrap();

    let tag = curator.add_custom_tag("  example.com ").await.unwrap().unwrap();
    assert_eq!(tag.path, "example.com");
    assert_eq!(tag.count, 100);
    let active = curator.active();
    assert_eq!(active.len(), 2);
    assert_eq!(active[0].id, tag.id);
    assert_eq!(active[1].path, "A");
}

#[tokio::test]
async fn drag_scenario() {
    let store = store_with_analysis(&[("top", 100), ("X", 80)]).await;
    let curator = Curator::new(store, Arc::new(FakeBackend::default()));
    curator.open().await.unwrap();
    let x = id_of(&curator, "X");

    assert!(curator.begin_drag(&x));
    assert_eq!(curator.drag_to_ratio(0.5), Some(50));
    assert_eq!(curator.drag_to(250), Some(100));
    assert_eq!(curator.drag_to(-3), Some(0));
    curator.end_drag().await.unwrap();
    assert_eq!(curator.active()[1].count, 0);

    assert_eq!(curator.reorder_by_drag(&x, 100).await.unwrap(), Some(100));
    // Ties keep the prior relative order.
    assert_eq!(path_of(&curator, 0), "top");
    assert_eq!(curator.ranked()[1].ratio, 1.0);
}

#[tokio::test]
async fn cancelled_drag_leaves_session_untouched() {
    let store = store_with_analysis(&[("A", 100), ("B", 80)]).await;
    let curator = Curator::new(store.clone(), Arc::new(FakeBackend::default()));
    curator.open().await.unwrap();
    let a = id_of(&curator, "A");

    assert!(curator.begin_drag(&a));
    curator.drag_to(10);
    curator.cancel_drag();

    assert_eq!(curator.state(), SaveState::Saved);
    assert_eq!(path_of(&curator, 0), "A");
    assert_eq!(curator.active()[0].count, 100);
    let session: SessionSnapshot = get_json(store.as_ref(), keys::TAG_STATE)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.active_tags[0].count, 100);

    let custom = curator.add_custom_tag("new").await.unwrap().unwrap();
    assert_eq!(custom.count, 100);
}

#[tokio::test]
async fn save_builds_payload_from_analysis() {
    let store = store_with_analysis(&[("A", 100), ("B", 50), ("C", 5)]).await;
    let backend = Arc::new(FakeBackend::default());
    let curator = Curator::new(store.clone(), backend.clone());
    curator.open().await.unwrap();
    curator.delete_tag(&id_of(&curator, "C")).await.unwrap();

    let ack = curator.save().await.unwrap().unwrap();
    assert!(ack.ok);
    assert_eq!(curator.state(), SaveState::Saved);
    assert!(!get_or(store.as_ref(), keys::TAG_DIRTY, true).await.unwrap());

    let saves = backend.saves.lock().unwrap();
    let payload = &saves[0];
    assert_eq!(payload.total_count, 812);
    assert_eq!(payload.total_analyzed, 2);
    assert_eq!(payload.settings["historyDays"], 30);
    let paths: Vec<&str> = payload.summary.iter().map(|s| s.path.as_str()).collect();
    assert_eq!(paths, vec!["A", "B"]);
}

#[tokio::test]
async fn save_when_saved_is_noop() {
    let store = store_with_analysis(&[("A", 1)]).await;
    let backend = Arc::new(FakeBackend::default());
    let curator = Curator::new(store, backend.clone());
    curator.open().await.unwrap();

    assert!(curator.save().await.unwrap().is_none());
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn failed_save_stays_unsaved() {
    let store = store_with_analysis(&[("A", 1), ("B", 2)]).await;
    let backend = Arc::new(FakeBackend::default());
    backend.fail.store(true, Ordering::SeqCst);
    let curator = Curator::new(store.clone(), backend.clone());
    curator.open().await.unwrap();
    curator.delete_tag(&id_of(&curator, "A")).await.unwrap();

    let ack = curator.save().await.unwrap().unwrap();
    assert!(!ack.ok);
    assert_eq!(ack.err.as_deref(), Some("HTTP 500: boom"));
    assert_eq!(curator.state(), SaveState::Unsaved);
    assert!(get_or(store.as_ref(), keys::TAG_DIRTY, false).await.unwrap());

    backend.fail.store(false, Ordering::SeqCst);
    assert!(curator.save().await.unwrap().unwrap().ok);
    assert_eq!(backend.calls(), 2);
}

#[tokio::test]
async fn save_without_analysis_does_not_call_backend() {
    let store = Arc::new(InMemoryStore::new());
    let session = SessionSnapshot {
        active_tags: vec![Tag::new("t1", "Rust", 7)],
        deleted_tags: vec![],
        updated_at: None,
    };
    put_json(store.as_ref(), keys::TAG_STATE, &session).await.unwrap();

    let backend = Arc::new(FakeBackend::default());
    let curator = Curator::new(store, backend.clone());
    assert_eq!(curator.open().await.unwrap(), LoadSource::LocalSession);
    curator.add_custom_tag("tokio").await.unwrap();

    assert!(curator.save().await.unwrap().is_none());
    assert_eq!(backend.calls(), 0);
    assert_eq!(curator.state(), SaveState::Unsaved);
}

#[tokio::test]
async fn concurrent_saves_issue_one_call() {
    let store = store_with_analysis(&[("A", 3), ("B", 2)]).await;
    let backend = Arc::new(FakeBackend::slow(Duration::from_millis(50)));
    let curator = Curator::new(store, backend.clone());
    curator.open().await.unwrap();
    curator.delete_tag(&id_of(&curator, "B")).await.unwrap();

    let (first, second) = tokio::join!(curator.save(), curator.save());
    let acks: Vec<_> = [first.unwrap(), second.unwrap()]
        .into_iter()
        .flatten()
        .collect();
    assert_eq!(acks.len(), 1);
    assert_eq!(backend.calls(), 1);
    assert_eq!(curator.state(), SaveState::Saved);
}

#[tokio::test]
async fn edit_during_save_leaves_unsaved() {
    let store = store_with_analysis(&[("A", 3), ("B", 2), ("C", 1)]).await;
    let backend = Arc::new(FakeBackend::slow(Duration::from_millis(100)));
    let curator = Curator::new(store, backend.clone());
    curator.open().await.unwrap();
    curator.delete_tag(&id_of(&curator, "C")).await.unwrap();
    let b = id_of(&curator, "B");

    let (saved, _) = tokio::join!(curator.save(), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(curator.state(), SaveState::Saving);
        curator.delete_tag(&b).await.unwrap();
    });

    assert!(saved.unwrap().unwrap().ok);
    assert_eq!(curator.state(), SaveState::Unsaved);
    // The in-flight payload predates the edit.
    assert_eq!(backend.saves.lock().unwrap()[0].summary.len(), 2);
}

#[tokio::test]
async fn resume_carries_unsaved_flag_across_sessions() {
    let store = store_with_analysis(&[("A", 3), ("B", 2)]).await;
    let backend = Arc::new(FakeBackend::default());

    let first = Curator::new(store.clone(), backend.clone());
    first.open().await.unwrap();
    first.delete_tag(&id_of(&first, "A")).await.unwrap();

    let second = Curator::new(store.clone(), backend.clone());
    assert_eq!(second.resume().await.unwrap(), LoadSource::LocalSession);
    assert_eq!(second.state(), SaveState::Unsaved);
    assert_eq!(second.deleted()[0].path, "A");
    assert!(second.save().await.unwrap().unwrap().ok);

    let third = Curator::new(store, backend);
    third.resume().await.unwrap();
    assert_eq!(third.state(), SaveState::Saved);
}

#[tokio::test]
async fn empty_everything_loads_empty() {
    let curator = Curator::new(
        Arc::new(InMemoryStore::new()),
        Arc::new(FakeBackend::default()),
    );
    assert_eq!(curator.open().await.unwrap(), LoadSource::Empty);
    assert!(curator.ranked().is_empty());
    assert_eq!(curator.state(), SaveState::Saved);

    let tag = curator.add_custom_tag("first").await.unwrap().unwrap();
    assert_eq!(tag.count, 50);
    assert_eq!(curator.state(), SaveState::Unsaved);
}
