use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use history_curator::harvest::Harvester;
use history_curator::history_source::HistorySource;
use history_curator::progress::{HarvestProgressEvent, HarvestProgressReporter, NoProgress};
use history_curator_core::history::HarvestLimits;
use history_curator_core::models::{HistoryRecord, RawVisit};
use history_curator_core::store::memory::InMemoryStore;
use history_curator_core::store::{get_json, keys, StateStore};

/// Serves a fixed visit list, honoring the window and the result cap.
struct FakeSource {
    visits: Vec<RawVisit>,
    queries: Arc<AtomicUsize>,
    fail_on_query: Option<usize>,
}

impl FakeSource {
    fn new(visits: Vec<RawVisit>) -> (Self, Arc<AtomicUsize>) {
        let queries = Arc::new(AtomicUsize::new(0));
        (
            Self {
                visits,
                queries: queries.clone(),
                fail_on_query: None,
            },
            queries,
        )
    }
}

#[async_trait]
impl HistorySource for FakeSource {
    async fn query(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        max_results: usize,
    ) -> Result<Vec<RawVisit>> {
        let n = self.queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_on_query == Some(n) {
            anyhow::bail!("database is locked");
        }
        let mut hits: Vec<RawVisit> = self
            .visits
            .iter()
            .filter(|v| v.last_visit >= start && v.last_visit < end)
            .cloned()
            .collect();
        hits.sort_by(|a, b| b.last_visit.cmp(&a.last_visit));
        hits.truncate(max_results);
        Ok(hits)
    }
}

fn visit(id: &str, url: &str, days_ago: i64, minutes: i64) -> RawVisit {
    RawVisit {
        id: Some(id.to_string()),
        url: url.to_string(),
        title: Some(format!("page {}", id)),
        last_visit: Utc::now() - ChronoDuration::days(days_ago) - ChronoDuration::minutes(minutes),
        visit_count: Some(1),
    }
}

fn limits(max_results_per_query: usize, max_total: usize) -> HarvestLimits {
    HarvestLimits {
        window_days: 15,
        max_results_per_query,
        max_total,
    }
}

fn harvester(source: FakeSource, store: Arc<InMemoryStore>, limits: HarvestLimits) -> Harvester {
    Harvester::new(Box::new(source), store, limits, Duration::ZERO)
}

async fn stored(store: &InMemoryStore) -> Option<Vec<HistoryRecord>> {
    get_json(store, keys::HISTORY_DATA).await.unwrap()
}

#[tokio::test]
async fn batch_is_unique_and_newest_first() {
    let (source, _) = FakeSource::new(vec![
        visit("1", "https://a.example/", 1, 0),
        visit("2", "https://b.example/", 20, 0),
        visit("3", "https://c.example/", 3, 0),
        visit("1", "https://a.example/", 1, 0),
    ]);
    let store = Arc::new(InMemoryStore::new());
    let records = harvester(source, store.clone(), HarvestLimits::default())
        .fetch_history(30)
        .await
        .unwrap();

    let ids: Vec<&str> = records.iter().map(|r| r.key()).collect();
    assert_eq!(ids, vec!["1", "3", "2"]);
    for pair in records.windows(2) {
        assert!(pair[0].last_visit_time >= pair[1].last_visit_time);
    }
    assert_eq!(stored(&store).await.unwrap(), records);
}

#[tokio::test]
async fn iterations_are_bounded_by_target_days() {
    // One visit per window, far further back than requested.
    let visits = (0..20)
        .map(|i| visit(&i.to_string(), "https://x.example/", i * 15 + 1, 0))
        .collect();
    let (source, queries) = FakeSource::new(visits);
    let store = Arc::new(InMemoryStore::new());
    let records = harvester(source, store, HarvestLimits::default())
        .fetch_history(31)
        .await
        .unwrap();

    // ceil(31/15) + 1 = 4 is the bound; coverage hits 45 days after 3.
    assert_eq!(queries.load(Ordering::SeqCst), 3);
    assert_eq!(records.len(), 3);
}

#[tokio::test]
async fn stops_on_first_empty_window() {
    let (source, queries) = FakeSource::new(vec![visit("old", "https://x.example/", 100, 0)]);
    let store = Arc::new(InMemoryStore::new());
    let records = harvester(source, store.clone(), HarvestLimits::default())
        .fetch_history(365)
        .await
        .unwrap();

    assert!(records.is_empty());
    assert_eq!(queries.load(Ordering::SeqCst), 1);
    assert_eq!(stored(&store).await.unwrap(), vec![]);
}

#[tokio::test]
async fn total_is_capped() {
    // One visit per day, so every window holds more than the per-query cap.
    let visits = (0..200)
        .map(|i| visit(&format!("v{}", i), "https://x.example/", i, 0))
        .collect();
    let (source, _) = FakeSource::new(visits);
    let store = Arc::new(InMemoryStore::new());
    let records = harvester(source, store, limits(10, 25))
        .fetch_history(365)
        .await
        .unwrap();

    assert_eq!(records.len(), 25);
}

#[tokio::test]
async fn zero_days_issues_no_query() {
    let (source, queries) = FakeSource::new(vec![visit("1", "https://a.example/", 0, 5)]);
    let store = Arc::new(InMemoryStore::new());
    let records = harvester(source, store.clone(), HarvestLimits::default())
        .fetch_history(0)
        .await
        .unwrap();

    assert!(records.is_empty());
    assert_eq!(queries.load(Ordering::SeqCst), 0);
    assert_eq!(stored(&store).await.unwrap(), vec![]);
}

#[tokio::test]
async fn source_error_persists_nothing() {
    let (mut source, _) = FakeSource::new(vec![
        visit("1", "https://a.example/", 1, 0),
        visit("2", "https://b.example/", 16, 0),
    ]);
    source.fail_on_query = Some(1);
    let store = Arc::new(InMemoryStore::new());
    let err = harvester(source, store.clone(), HarvestLimits::default())
        .fetch_history(60)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("locked"));
    assert!(store.get(keys::HISTORY_DATA).await.unwrap().is_none());
}

#[tokio::test]
async fn cancelled_harvest_persists_nothing() {
    let (source, queries) = FakeSource::new(vec![visit("1", "https://a.example/", 1, 0)]);
    let store = Arc::new(InMemoryStore::new());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = harvester(source, store.clone(), HarvestLimits::default())
        .fetch_history_with(30, &cancel, &NoProgress)
        .await;

    assert!(result.is_err());
    assert_eq!(queries.load(Ordering::SeqCst), 0);
    assert!(store.is_empty());
}

#[tokio::test]
async fn cancel_during_pause_stops_walk() {
    let (source, queries) = FakeSource::new(vec![
        visit("1", "https://a.example/", 1, 0),
        visit("2", "https://b.example/", 16, 0),
    ]);
    let store = Arc::new(InMemoryStore::new());
    let harvester = Harvester::new(
        Box::new(source),
        store.clone(),
        HarvestLimits::default(),
        Duration::from_secs(30),
    );
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();

    let (result, _) = tokio::join!(
        harvester.fetch_history_with(60, &cancel, &NoProgress),
        async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        }
    );

    assert!(result.is_err());
    assert_eq!(queries.load(Ordering::SeqCst), 1);
    assert!(store.is_empty());
}

struct Recorder(std::sync::Mutex<Vec<HarvestProgressEvent>>);

impl HarvestProgressReporter for Recorder {
    fn report(&self, event: HarvestProgressEvent) {
        self.0.lock().unwrap().push(event);
    }
}

#[tokio::test]
async fn progress_reports_each_window() {
    let (source, _) = FakeSource::new(vec![
        visit("1", "https://a.example/", 1, 0),
        visit("2", "https://b.example/", 16, 0),
    ]);
    let store = Arc::new(InMemoryStore::new());
    let recorder = Recorder(std::sync::Mutex::new(Vec::new()));
    harvester(source, store, HarvestLimits::default())
        .fetch_history_with(30, &CancellationToken::new(), &recorder)
        .await
        .unwrap();

    let events = recorder.0.lock().unwrap();
    assert_eq!(
        *events,
        vec![
            HarvestProgressEvent::Window {
                index: 0,
                collected: 1,
                covered_days: 15
            },
            HarvestProgressEvent::Window {
                index: 1,
                collected: 2,
                covered_days: 30
            },
            HarvestProgressEvent::Done { total: 2 },
        ]
    );
}
