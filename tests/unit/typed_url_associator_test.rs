//! Unit tests for TypedUrlAssociator association passes.
//!
//! Each test wires the associator to in-memory history and sync databases and
//! checks the state of both stores after one or more passes.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use typed_url_sync::database::Database;
use typed_url_sync::managers::history_manager::{HistoryBackend, HistoryManager, HistoryWriteBatch};
use typed_url_sync::managers::sync_node_store::{SyncNodeStore, SyncStore, SyncWriteBatch};
use typed_url_sync::services::crypto_service::SyncCryptographer;
use typed_url_sync::services::error_handler::RecordingErrorHandler;
use typed_url_sync::services::typed_url_associator::{
    AbortHandle, AssociationOutcome, AssociationPhase, AssociatorInterface, TypedUrlAssociator,
};
use typed_url_sync::services::typed_url_codec::{decode_node, encode_node};
use typed_url_sync::types::errors::{HistoryError, SyncErrorKind, SyncStoreError};
use typed_url_sync::types::history::{PageTransition, UrlId, UrlRow, VisitInfo, VisitRow, VisitSource};
use typed_url_sync::types::settings::AssociationSettings;
use typed_url_sync::types::specifics::{SyncNode, TypedUrlSpecifics, TYPED_URL_TAG};

const DAY: i64 = 86_400;

/// Both stores plus the collaborators an associator needs.
struct Harness {
    history: Arc<HistoryManager>,
    store: Arc<SyncNodeStore>,
    crypto: Arc<SyncCryptographer>,
    errors: Arc<RecordingErrorHandler>,
}

impl Harness {
    fn new() -> Self {
        Self::with_crypto(SyncCryptographer::new(false))
    }

    fn with_crypto(crypto: SyncCryptographer) -> Self {
        let history_db = Database::open_in_memory().expect("history db");
        let sync_db = Database::open_in_memory().expect("sync db");
        Self {
            history: Arc::new(HistoryManager::new(Arc::new(history_db))),
            store: Arc::new(SyncNodeStore::new(Arc::new(sync_db))),
            crypto: Arc::new(crypto),
            errors: Arc::new(RecordingErrorHandler::new()),
        }
    }

    /// Associator over the harness stores, with a clock far from any expiry.
    fn associator(&self) -> TypedUrlAssociator {
        self.associator_with(self.history.clone(), self.store.clone(), AssociationSettings::default())
    }

    fn associator_with(
        &self,
        history: Arc<dyn HistoryBackend>,
        store: Arc<dyn SyncStore>,
        settings: AssociationSettings,
    ) -> TypedUrlAssociator {
        TypedUrlAssociator::new(history, store, self.crypto.clone(), self.errors.clone(), settings)
            .with_clock(|| 1_000)
    }

    /// Adds a local row with `typed_count` and one typed visit per timestamp.
    fn add_local(&self, url: &str, typed_count: i32, times: &[i64]) -> UrlId {
        let mut row = UrlRow::new(url);
        row.title = format!("Local {}", url);
        row.typed_count = typed_count;
        row.visit_count = times.len() as i32;
        row.last_visit = times.iter().copied().max().unwrap_or(0);
        let id = self.history.insert_url(&row).unwrap();
        for t in times {
            self.history
                .insert_visit(&VisitRow::new(id, *t, PageTransition::Typed))
                .unwrap();
        }
        id
    }

    fn add_remote(&self, node_id: &str, url: &str, typed_count: i32, times: &[i64]) {
        self.add_remote_with(node_id, url, typed_count, times, PageTransition::Typed);
    }

    fn add_remote_with(
        &self,
        node_id: &str,
        url: &str,
        typed_count: i32,
        times: &[i64],
        transition: PageTransition,
    ) {
        let specifics = TypedUrlSpecifics {
            url: url.to_string(),
            title: format!("Remote {}", url),
            typed_count,
            hidden: false,
            visits: times.to_vec(),
            visit_transitions: vec![transition.code(); times.len()],
        };
        self.store
            .put_node(&encode_node(node_id, TYPED_URL_TAG, &specifics).unwrap())
            .unwrap();
    }

    /// Every remote record, keyed by URL.
    fn remote_records(&self) -> BTreeMap<String, TypedUrlSpecifics> {
        self.store
            .list_children(TYPED_URL_TAG)
            .unwrap()
            .iter()
            .map(|node| {
                let specifics = decode_node(node).unwrap();
                (specifics.url.clone(), specifics)
            })
            .collect()
    }

    fn local_times(&self, url: &str) -> Vec<i64> {
        let row = self.history.get_url(url).unwrap().expect("local row");
        self.history
            .get_visits_for_url(row.id)
            .unwrap()
            .iter()
            .map(|v| v.visit_time)
            .collect()
    }
}

/// History backend that requests an abort once `after` visit fetches happened.
struct AbortAfterFetches {
    inner: Arc<HistoryManager>,
    after: usize,
    fetches: AtomicUsize,
    handle: OnceLock<AbortHandle>,
}

impl HistoryBackend for AbortAfterFetches {
    fn get_url_by_id(&self, id: UrlId) -> Result<UrlRow, HistoryError> {
        self.inner.get_url_by_id(id)
    }

    fn get_url(&self, url: &str) -> Result<Option<UrlRow>, HistoryError> {
        self.inner.get_url(url)
    }

    fn get_typed_urls(&self) -> Result<Vec<UrlRow>, HistoryError> {
        self.inner.get_typed_urls()
    }

    fn get_most_recent_visits_for_url(&self, id: UrlId, max: usize) -> Result<Vec<VisitRow>, HistoryError> {
        let n = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.after {
            if let Some(handle) = self.handle.get() {
                handle.request_abort();
            }
        }
        self.inner.get_most_recent_visits_for_url(id, max)
    }

    fn apply_batch(&self, batch: &HistoryWriteBatch) -> Result<HashMap<String, UrlId>, HistoryError> {
        self.inner.apply_batch(batch)
    }
}

/// History backend whose visit reads fail for some rows.
struct FlakyHistory {
    inner: Arc<HistoryManager>,
    failing: HashSet<UrlId>,
}

impl HistoryBackend for FlakyHistory {
    fn get_url_by_id(&self, id: UrlId) -> Result<UrlRow, HistoryError> {
        self.inner.get_url_by_id(id)
    }

    fn get_url(&self, url: &str) -> Result<Option<UrlRow>, HistoryError> {
        self.inner.get_url(url)
    }

    fn get_typed_urls(&self) -> Result<Vec<UrlRow>, HistoryError> {
        self.inner.get_typed_urls()
    }

    fn get_most_recent_visits_for_url(&self, id: UrlId, max: usize) -> Result<Vec<VisitRow>, HistoryError> {
        if self.failing.contains(&id) {
            return Err(HistoryError::DatabaseError("database is locked".to_string()));
        }
        self.inner.get_most_recent_visits_for_url(id, max)
    }

    fn apply_batch(&self, batch: &HistoryWriteBatch) -> Result<HashMap<String, UrlId>, HistoryError> {
        self.inner.apply_batch(batch)
    }
}

/// Sync store whose batched writes always fail.
struct ReadOnlyStore {
    inner: Arc<SyncNodeStore>,
}

impl SyncStore for ReadOnlyStore {
    fn list_children(&self, tag: &str) -> Result<Vec<SyncNode>, SyncStoreError> {
        self.inner.list_children(tag)
    }

    fn get_node(&self, id: &str) -> Result<SyncNode, SyncStoreError> {
        self.inner.get_node(id)
    }

    fn put_node(&self, node: &SyncNode) -> Result<(), SyncStoreError> {
        self.inner.put_node(node)
    }

    fn delete_node(&self, id: &str) -> Result<(), SyncStoreError> {
        self.inner.delete_node(id)
    }

    fn apply_batch(&self, _batch: &SyncWriteBatch) -> Result<(), SyncStoreError> {
        Err(SyncStoreError::DatabaseError("disk full".to_string()))
    }

    fn delete_children(&self, tag: &str) -> Result<usize, SyncStoreError> {
        self.inner.delete_children(tag)
    }

    fn load_associations(&self) -> Result<Vec<(UrlId, String)>, SyncStoreError> {
        self.inner.load_associations()
    }

    fn clear_associations(&self) -> Result<usize, SyncStoreError> {
        self.inner.clear_associations()
    }
}

// ─── Scenarios ───

/// A remote-only URL is created locally with all its visits; the remote
/// record is left alone.
#[test]
fn test_remote_only_url_is_created_locally() {
    let h = Harness::new();
    h.add_remote("node-x", "https://x.com", 2, &[100, 200]);
    let before = h.store.get_node("node-x").unwrap();

    let mut associator = h.associator();
    let report = associator.associate_models().unwrap();

    assert_eq!(report.outcome, AssociationOutcome::Success);
    assert_eq!(report.local_urls_created, 1);
    assert_eq!(report.visits_added, 2);
    assert_eq!(report.nodes_updated, 0);
    assert_eq!(report.nodes_created, 0);

    let row = h.history.get_url("https://x.com").unwrap().unwrap();
    assert_eq!(row.typed_count, 2);
    assert_eq!(row.visit_count, 2);
    assert_eq!(row.last_visit, 200);
    assert_eq!(row.title, "Remote https://x.com");
    assert_eq!(h.local_times("https://x.com"), vec![100, 200]);

    assert_eq!(h.store.get_node("node-x").unwrap(), before);
    assert_eq!(associator.associations().node_for(row.id), Some("node-x"));
    assert_eq!(h.store.load_associations().unwrap(), vec![(row.id, "node-x".to_string())]);
    assert_eq!(associator.phase(), AssociationPhase::Done);
}

/// A local-only typed URL is pushed as a new remote record mirroring it.
#[test]
fn test_local_only_url_is_pushed() {
    let h = Harness::new();
    let id = h.add_local("https://y.com", 5, &[10, 20, 30, 40, 50]);

    let mut associator = h.associator();
    let report = associator.associate_models().unwrap();
    assert_eq!(report.nodes_created, 1);

    let records = h.remote_records();
    let record = &records["https://y.com"];
    assert_eq!(record.typed_count, 5);
    assert_eq!(record.title, "Local https://y.com");
    assert_eq!(record.visits, vec![10, 20, 30, 40, 50]);
    assert_eq!(record.visit_transitions, vec![PageTransition::Typed.code(); 5]);

    let node_id = associator.associations().node_for(id).unwrap().to_string();
    assert_eq!(h.store.get_node(&node_id).unwrap().client_tag, "https://y.com");
    assert_eq!(h.store.load_associations().unwrap(), vec![(id, node_id)]);
}

/// A stale remote record is rewritten; the local side is untouched.
#[test]
fn test_stale_remote_record_is_updated() {
    let h = Harness::new();
    let id = h.add_local("https://z.com", 3, &[1, 2, 3]);
    h.add_remote("node-z", "https://z.com", 3, &[1, 2]);
    let row_before = h.history.get_url_by_id(id).unwrap();

    let mut associator = h.associator();
    let report = associator.associate_models().unwrap();

    assert_eq!(report.nodes_updated, 1);
    assert_eq!(report.local_urls_updated, 0);
    assert_eq!(report.visits_added, 0);
    assert_eq!(h.remote_records()["https://z.com"].visits, vec![1, 2, 3]);
    assert_eq!(h.history.get_url_by_id(id).unwrap(), row_before);
    assert_eq!(h.local_times("https://z.com"), vec![1, 2, 3]);
    assert_eq!(associator.associations().node_for(id), Some("node-z"));
}

/// An aborted pass keeps its completed work, and a follow-up pass ends in the
/// same state as one uninterrupted pass.
#[test]
fn test_aborted_pass_resumes_to_same_state() {
    fn seed(h: &Harness) {
        for i in 0..10 {
            h.add_local(&format!("https://site{}.com", i), 1, &[100 + i]);
        }
    }

    let interrupted = Harness::new();
    seed(&interrupted);
    let backend = Arc::new(AbortAfterFetches {
        inner: interrupted.history.clone(),
        after: 2,
        fetches: AtomicUsize::new(0),
        handle: OnceLock::new(),
    });
    let mut associator =
        interrupted.associator_with(backend.clone(), interrupted.store.clone(), AssociationSettings::default());
    backend.handle.set(associator.abort_handle()).unwrap();

    let first = associator.associate_models().unwrap();
    assert_eq!(first.outcome, AssociationOutcome::Aborted);
    assert_eq!(first.nodes_created, 2);
    assert_eq!(first.urls_remaining, 8);
    assert_eq!(associator.phase(), AssociationPhase::Aborted);
    assert_eq!(interrupted.remote_records().len(), 2);
    assert_eq!(interrupted.store.load_associations().unwrap().len(), 2);
    assert!(!associator.abort_handle().is_abort_pending());

    let second = associator.associate_models().unwrap();
    assert_eq!(second.outcome, AssociationOutcome::Success);
    assert_eq!(second.nodes_created, 8);
    assert_eq!(second.nodes_updated, 0);

    let straight = Harness::new();
    seed(&straight);
    let mut reference = straight.associator();
    let report = reference.associate_models().unwrap();
    assert_eq!(report.nodes_created, 10);

    assert_eq!(interrupted.remote_records(), straight.remote_records());
    assert_eq!(
        interrupted.store.load_associations().unwrap().len(),
        straight.store.load_associations().unwrap().len()
    );
    assert_eq!(interrupted.history.list_urls().unwrap(), straight.history.list_urls().unwrap());
}

// ─── Merging ───

#[test]
fn test_remote_with_higher_typed_count_wins_fields() {
    let h = Harness::new();
    let id = h.add_local("https://a.com", 1, &[10]);
    h.add_remote("node-a", "https://a.com", 3, &[10, 20]);

    let mut associator = h.associator();
    let report = associator.associate_models().unwrap();
    assert_eq!(report.local_urls_updated, 1);
    assert_eq!(report.visits_added, 1);
    assert_eq!(report.nodes_updated, 0);

    let row = h.history.get_url_by_id(id).unwrap();
    assert_eq!(row.title, "Remote https://a.com");
    assert_eq!(row.typed_count, 3);
    assert_eq!(row.visit_count, 2);
    assert_eq!(row.last_visit, 20);
    assert_eq!(h.local_times("https://a.com"), vec![10, 20]);
}

#[test]
fn test_both_sides_gain_missing_visits() {
    let h = Harness::new();
    h.add_local("https://b.com", 2, &[10, 30]);
    h.add_remote("node-b", "https://b.com", 2, &[10, 20]);

    let mut associator = h.associator();
    let report = associator.associate_models().unwrap();
    assert_eq!(report.visits_added, 1);
    assert_eq!(report.nodes_updated, 1);

    assert_eq!(h.local_times("https://b.com"), vec![10, 20, 30]);
    assert_eq!(h.remote_records()["https://b.com"].visits, vec![10, 20, 30]);
}

#[test]
fn test_second_pass_changes_nothing() {
    let h = Harness::new();
    h.add_remote("node-x", "https://x.com", 2, &[100, 200]);
    h.add_local("https://y.com", 5, &[10, 20, 30]);
    h.add_local("https://z.com", 1, &[1, 2, 3]);
    h.add_remote("node-z", "https://z.com", 4, &[2, 5]);

    let mut associator = h.associator();
    associator.associate_models().unwrap();
    let records = h.remote_records();
    let urls = h.history.list_urls().unwrap();

    let report = associator.associate_models().unwrap();
    assert_eq!(report.nodes_created, 0);
    assert_eq!(report.nodes_updated, 0);
    assert_eq!(report.nodes_deleted, 0);
    assert_eq!(report.local_urls_created, 0);
    assert_eq!(report.local_urls_updated, 0);
    assert_eq!(report.visits_added, 0);
    assert_eq!(report.urls_merged, 3);
    assert_eq!(h.remote_records(), records);
    assert_eq!(h.history.list_urls().unwrap(), urls);
    assert_eq!(associator.associations().len(), 3);
}

#[test]
fn test_local_visits_missing_remotely_are_never_deleted() {
    let h = Harness::new();
    h.add_local("https://c.com", 1, &[5, 6]);
    h.add_remote("node-c", "https://c.com", 1, &[6]);

    let mut associator = h.associator();
    let report = associator.associate_models().unwrap();
    assert_eq!(report.local_only_visits, 1);
    assert_eq!(h.local_times("https://c.com"), vec![5, 6]);
}

#[test]
fn test_untyped_local_row_is_merged_with_remote() {
    let h = Harness::new();
    let id = h
        .history
        .add_page_visit("https://d.com", "D", 50, PageTransition::Link, VisitSource::Browsed)
        .unwrap();
    h.add_remote("node-d", "https://d.com", 1, &[40]);

    let mut associator = h.associator();
    let report = associator.associate_models().unwrap();
    assert_eq!(report.local_urls_created, 0);
    assert_eq!(report.local_urls_updated, 1);
    assert_eq!(report.nodes_updated, 1);

    let row = h.history.get_url_by_id(id).unwrap();
    assert_eq!(row.typed_count, 1);
    assert_eq!(h.local_times("https://d.com"), vec![40, 50]);
    assert_eq!(h.remote_records()["https://d.com"].visits, vec![40, 50]);
    assert_eq!(associator.associations().node_for(id), Some("node-d"));
}

// ─── Long histories ───

/// Remote visits older than the fetched window are already stored locally and
/// must not be inserted again.
#[test]
fn test_remote_visits_outside_fetch_window_are_not_duplicated() {
    let h = Harness::new();
    let all: Vec<i64> = (1..=1100).collect();
    h.add_local("https://long.com", 5, &all);
    h.add_remote("node-long", "https://long.com", 5, &[1, 2, 3]);

    let mut associator = h.associator();
    let report = associator.associate_models().unwrap();
    assert_eq!(report.visits_added, 0);
    assert_eq!(report.local_urls_updated, 0);
    assert_eq!(report.nodes_updated, 1);
    assert_eq!(h.local_times("https://long.com"), all);
    assert_eq!(
        h.remote_records()["https://long.com"].visits,
        (1001..=1100).collect::<Vec<i64>>()
    );

    let report = associator.associate_models().unwrap();
    assert_eq!(report.visits_added, 0);
    assert_eq!(report.nodes_updated, 0);
    assert_eq!(h.local_times("https://long.com"), all);
}

#[test]
fn test_small_fetch_bound_still_reaches_fixed_point() {
    let h = Harness::new();
    let short: Vec<i64> = (1..=10).collect();
    h.add_local("https://short.com", 1, &short);
    h.add_remote("node-short", "https://short.com", 1, &short);
    let long: Vec<i64> = (1..=150).collect();
    h.add_local("https://long.com", 1, &long);
    h.add_remote("node-long", "https://long.com", 1, &[1, 2, 3, 150]);

    let settings = AssociationSettings {
        max_visits_to_fetch: 5,
        ..AssociationSettings::default()
    };
    let mut associator = h.associator_with(h.history.clone(), h.store.clone(), settings);

    for _ in 0..3 {
        let report = associator.associate_models().unwrap();
        assert_eq!(report.visits_added, 0);
        assert_eq!(h.local_times("https://short.com"), short);
        assert_eq!(h.local_times("https://long.com"), long);
    }
    assert_eq!(
        h.remote_records()["https://long.com"].visits,
        (51..=150).collect::<Vec<i64>>()
    );
    let report = associator.associate_models().unwrap();
    assert_eq!(report.nodes_updated, 0);
}

// ─── Ignore rules ───

#[test]
fn test_ignorable_local_row_takes_remote_visits_but_stays_unassociated() {
    let h = Harness::new();
    let id = h
        .history
        .add_page_visit("https://e.com", "E", 5, PageTransition::Link, VisitSource::Browsed)
        .unwrap();
    h.add_remote_with("node-e", "https://e.com", 0, &[5, 6], PageTransition::Link);

    let mut associator = h.associator();
    let report = associator.associate_models().unwrap();
    assert_eq!(report.urls_ignored, 1);
    assert_eq!(report.visits_added, 1);
    assert_eq!(h.local_times("https://e.com"), vec![5, 6]);
    assert_eq!(associator.associations().node_for(id), None);
    assert!(h.store.load_associations().unwrap().is_empty());
}

#[test]
fn test_url_turning_ignorable_loses_its_association() {
    let h = Harness::new();
    let id = h
        .history
        .add_page_visit("https://e.com", "E", 5, PageTransition::Link, VisitSource::Browsed)
        .unwrap();
    h.add_remote_with("node-e", "https://e.com", 0, &[5], PageTransition::Link);
    h.store
        .apply_batch(&SyncWriteBatch {
            associations: vec![(id, "node-e".to_string())],
            ..SyncWriteBatch::default()
        })
        .unwrap();

    let mut associator = h.associator();
    let report = associator.associate_models().unwrap();
    assert_eq!(report.urls_ignored, 1);
    assert_eq!(associator.associations().node_for(id), None);
    assert!(h.store.load_associations().unwrap().is_empty());
    assert!(h.store.get_node("node-e").is_ok(), "the node itself stays");
}

#[test]
fn test_imported_only_url_is_not_pushed() {
    let h = Harness::new();
    h.history
        .add_page_visit("https://imported.com", "I", 5, PageTransition::Typed, VisitSource::Imported)
        .unwrap();

    let mut associator = h.associator();
    let report = associator.associate_models().unwrap();
    assert_eq!(report.urls_ignored, 1);
    assert_eq!(report.nodes_created, 0);
    assert!(h.remote_records().is_empty());
}

// ─── Expiry ───

#[test]
fn test_fully_expired_remote_record_is_deleted() {
    let h = Harness::new();
    let id = h.add_local("https://old.com", 1, &[100 * DAY]);
    h.add_remote("node-old", "https://old.com", 1, &[100, 200]);
    h.add_remote("node-gone", "https://gone.com", 1, &[100, 200]);
    h.store
        .apply_batch(&SyncWriteBatch {
            associations: vec![(id, "node-old".to_string())],
            ..SyncWriteBatch::default()
        })
        .unwrap();

    let mut associator = h
        .associator_with(h.history.clone(), h.store.clone(), AssociationSettings::default())
        .with_clock(|| 100 * DAY);
    let report = associator.associate_models().unwrap();

    assert_eq!(report.nodes_deleted, 2);
    assert!(h.store.get_node("node-old").is_err());
    assert!(h.store.get_node("node-gone").is_err());
    assert!(h.history.get_url("https://gone.com").unwrap().is_none());
    assert!(h.history.get_url_by_id(id).is_ok(), "local rows are never deleted");
    assert_eq!(associator.associations().node_for(id), None);
    assert!(h.store.load_associations().unwrap().is_empty());
}

#[test]
fn test_partially_expired_remote_record_keeps_fresh_visits() {
    let h = Harness::new();
    h.add_remote("node-p", "https://p.com", 1, &[1_000, 200 * DAY]);

    let mut associator = h
        .associator_with(h.history.clone(), h.store.clone(), AssociationSettings::default())
        .with_clock(|| 200 * DAY);
    let report = associator.associate_models().unwrap();
    assert_eq!(report.local_urls_created, 1);
    assert_eq!(h.local_times("https://p.com"), vec![200 * DAY]);

    let again = associator.associate_models().unwrap();
    assert_eq!(again.nodes_updated, 0);
    assert_eq!(again.nodes_deleted, 0);
    assert_eq!(again.visits_added, 0);
}

// ─── Errors ───

#[test]
fn test_crypto_not_ready_fails_before_any_write() {
    let h = Harness::with_crypto(SyncCryptographer::new(true));
    h.add_local("https://y.com", 1, &[10]);
    h.add_remote("node-x", "https://x.com", 1, &[10]);

    let mut associator = h.associator();
    assert!(!associator.crypto_ready_if_necessary());
    let err = associator.associate_models().unwrap_err();

    assert_eq!(err.kind(), SyncErrorKind::CryptoNotReady);
    assert_eq!(associator.phase(), AssociationPhase::Failed);
    assert_eq!(h.errors.last_error().unwrap().0, SyncErrorKind::CryptoNotReady);
    assert_eq!(h.remote_records().len(), 1);
    assert!(h.history.get_url("https://x.com").unwrap().is_none());

    let salt = h.crypto.generate_salt().unwrap();
    h.crypto.set_passphrase("passphrase", &salt).unwrap();
    assert!(associator.crypto_ready_if_necessary());
    assert!(associator.associate_models().is_ok());
}

#[test]
fn test_read_errors_skip_urls_and_feed_error_percentage() {
    let h = Harness::new();
    let mut failing = HashSet::new();
    for i in 0..10 {
        let id = h.add_local(&format!("https://r{}.com", i), 1, &[10 + i]);
        if i < 3 {
            failing.insert(id);
        }
    }
    let backend = Arc::new(FlakyHistory {
        inner: h.history.clone(),
        failing,
    });

    let mut associator = h.associator_with(backend, h.store.clone(), AssociationSettings::default());
    let report = associator.associate_models().unwrap();

    assert_eq!(report.outcome, AssociationOutcome::Success);
    assert_eq!(report.urls_skipped, 3);
    assert_eq!(report.nodes_created, 7);
    assert_eq!(associator.error_stats().accesses, 10);
    assert_eq!(associator.error_stats().errors, 3);
    assert_eq!(associator.error_percentage(), 30);

    associator.clear_error_stats();
    assert_eq!(associator.error_percentage(), 0);
}

#[test]
fn test_error_stats_cover_one_pass() {
    let h = Harness::new();
    let id = h.add_local("https://r.com", 1, &[10]);
    let backend = Arc::new(FlakyHistory {
        inner: h.history.clone(),
        failing: HashSet::from([id]),
    });
    let mut associator = h.associator_with(backend, h.store.clone(), AssociationSettings::default());
    associator.associate_models().unwrap();
    associator.associate_models().unwrap();
    assert_eq!(associator.error_stats().accesses, 1);
    assert_eq!(associator.error_percentage(), 100);
}

#[test]
fn test_malformed_remote_record_is_skipped() {
    let h = Harness::new();
    h.store
        .put_node(&SyncNode {
            id: "node-bad".to_string(),
            parent_tag: TYPED_URL_TAG.to_string(),
            client_tag: "https://bad.com".to_string(),
            specifics: "not json".to_string(),
        })
        .unwrap();
    h.add_remote("node-ok", "https://ok.com", 1, &[10]);

    let mut associator = h.associator();
    let report = associator.associate_models().unwrap();

    assert_eq!(report.urls_skipped, 1);
    assert_eq!(report.local_urls_created, 1);
    assert_eq!(associator.error_stats().errors, 1);
    assert!(h.history.get_url("https://bad.com").unwrap().is_none());
    assert!(h.store.get_node("node-bad").is_ok(), "malformed nodes are left in place");
}

#[test]
fn test_sync_write_failure_is_fatal_and_recoverable() {
    let h = Harness::new();
    h.add_remote("node-x", "https://x.com", 2, &[100, 200]);

    let store = Arc::new(ReadOnlyStore {
        inner: h.store.clone(),
    });
    let mut associator = h.associator_with(h.history.clone(), store, AssociationSettings::default());
    let err = associator.associate_models().unwrap_err();

    assert_eq!(err.kind(), SyncErrorKind::StoreWriteError);
    assert_eq!(associator.phase(), AssociationPhase::Failed);
    assert_eq!(h.errors.last_error().unwrap().0, SyncErrorKind::StoreWriteError);
    // The local batch was already committed.
    let row = h.history.get_url("https://x.com").unwrap().unwrap();
    assert!(h.store.load_associations().unwrap().is_empty());

    let mut retry = h.associator();
    let report = retry.associate_models().unwrap();
    assert_eq!(report.local_urls_created, 0);
    assert_eq!(report.visits_added, 0);
    assert_eq!(retry.associations().node_for(row.id), Some("node-x"));
}

#[test]
fn test_missing_root_is_fatal_read_error() {
    let h = Harness::new();
    let settings = AssociationSettings {
        typed_url_tag: "no_such_root".to_string(),
        ..AssociationSettings::default()
    };
    let mut associator = h.associator_with(h.history.clone(), h.store.clone(), settings);
    let err = associator.associate_models().unwrap_err();
    assert_eq!(err.kind(), SyncErrorKind::StoreReadError);
    assert_eq!(h.errors.last_error().unwrap().0, SyncErrorKind::StoreReadError);
}

#[test]
fn test_remote_only_urls_cost_one_access_each() {
    let h = Harness::new();
    h.history
        .add_page_visit("https://untyped.com", "U", 50, PageTransition::Link, VisitSource::Browsed)
        .unwrap();
    h.add_remote("node-u", "https://untyped.com", 1, &[40]);
    h.add_remote("node-n", "https://new.com", 1, &[40]);

    let mut associator = h.associator();
    let report = associator.associate_models().unwrap();
    assert_eq!(report.urls_merged, 2);
    assert_eq!(associator.error_stats().accesses, 2);
    assert_eq!(associator.error_stats().errors, 0);
}

// ─── Single incoming records ───

fn incoming(url: &str, typed_count: i32, times: &[i64]) -> TypedUrlSpecifics {
    TypedUrlSpecifics {
        url: url.to_string(),
        title: format!("Remote {}", url),
        typed_count,
        hidden: false,
        visits: times.to_vec(),
        visit_transitions: vec![PageTransition::Typed.code(); times.len()],
    }
}

#[test]
fn test_update_from_sync_db_for_new_url() {
    let h = Harness::new();
    let mut associator = h.associator();

    let update = associator
        .update_from_sync_db(&incoming("https://n.com", 2, &[10, 20]))
        .unwrap();
    assert!(update.batch.updated_urls.is_empty());
    assert!(update.batch.new_visits.is_empty());
    assert!(update.visits_to_remove.is_empty());
    assert_eq!(update.batch.new_urls.len(), 1);

    let new_url = &update.batch.new_urls[0];
    assert_eq!(new_url.row.url, "https://n.com");
    assert_eq!(new_url.row.title, "Remote https://n.com");
    assert_eq!(new_url.row.typed_count, 2);
    assert_eq!(new_url.row.visit_count, 2);
    assert_eq!(new_url.row.last_visit, 20);
    assert_eq!(new_url.visits.len(), 2);
    assert!(h.history.get_url("https://n.com").unwrap().is_none(), "nothing is applied");

    h.history.apply_batch(&update.batch).unwrap();
    assert_eq!(h.local_times("https://n.com"), vec![10, 20]);
    assert_eq!(associator.error_stats().accesses, 1);
}

#[test]
fn test_update_from_sync_db_for_existing_url() {
    let h = Harness::new();
    let id = h.add_local("https://e.com", 1, &[5, 10]);
    let mut associator = h.associator();

    let update = associator
        .update_from_sync_db(&incoming("https://e.com", 3, &[10, 20]))
        .unwrap();
    assert!(update.batch.new_urls.is_empty());
    assert_eq!(update.batch.updated_urls.len(), 1);
    let row = &update.batch.updated_urls[0];
    assert_eq!(row.id, id);
    assert_eq!(row.title, "Remote https://e.com");
    assert_eq!(row.typed_count, 3);
    assert_eq!(row.visit_count, 3);
    assert_eq!(row.last_visit, 20);
    assert_eq!(
        update.batch.new_visits,
        vec![(id, vec![VisitInfo::new(20, PageTransition::Typed)])]
    );
    let removed: Vec<i64> = update.visits_to_remove.iter().map(|v| v.visit_time).collect();
    assert_eq!(removed, vec![5]);

    h.history.apply_batch(&update.batch).unwrap();
    assert_eq!(h.local_times("https://e.com"), vec![5, 10, 20]);
    assert_eq!(h.history.get_url_by_id(id).unwrap().typed_count, 3);
}

#[test]
fn test_update_from_sync_db_matching_record_changes_nothing() {
    let h = Harness::new();
    h.add_local("https://m.com", 2, &[10, 20]);
    let mut associator = h.associator();

    let mut record = incoming("https://m.com", 2, &[10, 20]);
    record.title = "Local https://m.com".to_string();
    let update = associator.update_from_sync_db(&record).unwrap();
    assert!(update.batch.is_empty());
    assert!(update.visits_to_remove.is_empty());
}

// ─── Abort ───

#[test]
fn test_abort_before_pass_stops_after_preflight() {
    let h = Harness::new();
    h.add_local("https://y.com", 1, &[10]);

    let mut associator = h.associator();
    associator.abort_association();
    let report = associator.associate_models().unwrap();
    assert_eq!(report.outcome, AssociationOutcome::Aborted);
    assert_eq!(report.nodes_created, 0);
    assert!(h.remote_records().is_empty());

    let report = associator.associate_models().unwrap();
    assert_eq!(report.outcome, AssociationOutcome::Success);
    assert_eq!(report.nodes_created, 1);
}

#[test]
fn test_abort_from_another_thread() {
    let h = Harness::new();
    let mut associator = h.associator();
    let handle = associator.abort_handle();
    std::thread::spawn(move || handle.request_abort()).join().unwrap();

    let report = associator.associate_models().unwrap();
    assert_eq!(report.outcome, AssociationOutcome::Aborted);
}

// ─── Disassociation and bulk delete ───

#[test]
fn test_disassociate_is_idempotent() {
    let h = Harness::new();
    h.add_local("https://y.com", 1, &[10]);
    let mut associator = h.associator();
    associator.associate_models().unwrap();
    assert_eq!(associator.associations().len(), 1);

    associator.disassociate_models().unwrap();
    assert!(associator.associations().is_empty());
    assert!(h.store.load_associations().unwrap().is_empty());
    assert_eq!(h.remote_records().len(), 1, "nodes survive disassociation");

    associator.disassociate_models().unwrap();
    assert!(associator.associations().is_empty());
}

#[test]
fn test_delete_all_nodes() {
    let h = Harness::new();
    h.add_local("https://y.com", 1, &[10]);
    h.add_local("https://w.com", 1, &[10]);
    let mut associator = h.associator();
    assert!(!associator.sync_model_has_user_created_nodes().unwrap());

    associator.associate_models().unwrap();
    assert!(associator.sync_model_has_user_created_nodes().unwrap());

    assert_eq!(associator.delete_all_nodes().unwrap(), 2);
    assert!(!associator.sync_model_has_user_created_nodes().unwrap());
    assert!(associator.associations().is_empty());
    assert!(h.store.load_associations().unwrap().is_empty());
    assert_eq!(h.history.list_urls().unwrap().len(), 2);
}
