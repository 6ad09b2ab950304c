//! Typed URL model association.
//!
//! [`TypedUrlAssociator`] runs one association pass over every typed URL known
//! to either store:
//!
//! ```text
//! Idle → Preflight → Enumerating → Merging → Flushing → Done
//!                 ↘ Failed                  ↘ Aborted / Failed
//! ```
//!
//! Each URL is fixed up, merged and turned into pending writes; all writes are
//! flushed at the end as one history batch followed by one sync batch. An
//! abort request is checked between URLs and still flushes the work done so
//! far, since merging is idempotent and a later pass finishes the rest.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use uuid::Uuid;

use crate::managers::history_manager::{HistoryBackend, HistoryWriteBatch, NewUrl};
use crate::managers::sync_node_store::{SyncStore, SyncWriteBatch};
use crate::services::crypto_service::CryptoReadiness;
use crate::services::error_handler::DataTypeErrorHandler;
use crate::services::history_fixup::{should_ignore_url, DbAccessStats, HistoryFixup};
use crate::services::typed_url_codec::{
    decode_node, encode_node, update_url_row_from_typed_url_specifics, write_to_typed_url_specifics,
};
use crate::services::typed_url_merge::{
    diff_visits, expiry_threshold, filter_expired_visits, merge_urls, merged_visits,
};
use crate::types::errors::SyncError;
use crate::types::history::{UrlId, UrlRow, VisitInfo, VisitRow, VisitSource};
use crate::types::merge::{MergeChange, MergeResult};
use crate::types::settings::AssociationSettings;
use crate::types::specifics::TypedUrlSpecifics;

/// Operations every data type's associator offers to the sync engine.
pub trait AssociatorInterface {
    /// Runs one association pass.
    fn associate_models(&mut self) -> Result<AssociationReport, SyncError>;
    /// Clears all associations. History and sync nodes are left alone.
    fn disassociate_models(&mut self) -> Result<(), SyncError>;
    /// Asks the current or next pass to stop. Callable from any thread via [`AbortHandle`].
    fn abort_association(&self);
    /// Whether the sync store holds typed URL nodes besides the permanent one.
    fn sync_model_has_user_created_nodes(&self) -> Result<bool, SyncError>;
    fn crypto_ready_if_necessary(&self) -> bool;
}

/// Shared cancellation flag for association passes.
///
/// Cloning is cheap and every clone controls the same flag. A request stays
/// pending until a pass observes it and returns `Aborted`.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    pending: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_abort(&self) {
        self.pending.store(true, Ordering::SeqCst);
    }

    pub fn is_abort_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    fn consume(&self) -> bool {
        self.pending.swap(false, Ordering::SeqCst)
    }
}

/// Where the associator is in its pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationPhase {
    Idle,
    Preflight,
    Enumerating,
    Merging,
    Flushing,
    Done,
    Aborted,
    Failed,
}

/// How a pass that did not fail ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationOutcome {
    Success,
    Aborted,
}

/// Summary of one association pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssociationReport {
    pub outcome: AssociationOutcome,
    /// URLs merged or pushed in either direction.
    pub urls_merged: usize,
    /// URLs skipped because of a read or decode failure.
    pub urls_skipped: usize,
    /// URLs excluded from sync by the ignore rules.
    pub urls_ignored: usize,
    /// URLs left unvisited because the pass was aborted.
    pub urls_remaining: usize,
    pub local_urls_created: usize,
    pub local_urls_updated: usize,
    pub visits_added: usize,
    /// Local visits missing remotely. Reported only; never deleted.
    pub local_only_visits: usize,
    pub nodes_created: usize,
    pub nodes_updated: usize,
    pub nodes_deleted: usize,
}

impl AssociationReport {
    fn new() -> Self {
        Self {
            outcome: AssociationOutcome::Success,
            urls_merged: 0,
            urls_skipped: 0,
            urls_ignored: 0,
            urls_remaining: 0,
            local_urls_created: 0,
            local_urls_updated: 0,
            visits_added: 0,
            local_only_visits: 0,
            nodes_created: 0,
            nodes_updated: 0,
            nodes_deleted: 0,
        }
    }
}

/// Bidirectional URL ⇄ sync node mapping. One row per URL and per node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssociationTable {
    url_to_node: HashMap<UrlId, String>,
    node_to_url: HashMap<String, UrlId>,
}

impl AssociationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `url_id` to `node_id`, dropping any mapping either side had before.
    pub fn associate(&mut self, url_id: UrlId, node_id: &str) {
        if let Some(old_node) = self.url_to_node.remove(&url_id) {
            self.node_to_url.remove(&old_node);
        }
        if let Some(old_url) = self.node_to_url.remove(node_id) {
            self.url_to_node.remove(&old_url);
        }
        self.url_to_node.insert(url_id, node_id.to_string());
        self.node_to_url.insert(node_id.to_string(), url_id);
    }

    pub fn node_for(&self, url_id: UrlId) -> Option<&str> {
        self.url_to_node.get(&url_id).map(String::as_str)
    }

    pub fn url_for(&self, node_id: &str) -> Option<UrlId> {
        self.node_to_url.get(node_id).copied()
    }

    pub fn remove_url(&mut self, url_id: UrlId) {
        if let Some(node_id) = self.url_to_node.remove(&url_id) {
            self.node_to_url.remove(&node_id);
        }
    }

    pub fn remove_node(&mut self, node_id: &str) {
        if let Some(url_id) = self.node_to_url.remove(node_id) {
            self.url_to_node.remove(&url_id);
        }
    }

    pub fn clear(&mut self) {
        self.url_to_node.clear();
        self.node_to_url.clear();
    }

    pub fn len(&self) -> usize {
        self.url_to_node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.url_to_node.is_empty()
    }
}

/// Local changes that bring history in line with one incoming typed URL record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncDbUpdate {
    /// The new or updated row and the visits the history lacks.
    pub batch: HistoryWriteBatch,
    /// Local visits the record does not carry. Reported only; never applied.
    pub visits_to_remove: Vec<VisitRow>,
}

struct RemoteItem {
    node_id: String,
    specifics: TypedUrlSpecifics,
}

#[derive(Default)]
struct WorkItem {
    remote: Option<RemoteItem>,
    local: Option<UrlRow>,
}

/// Writes gathered while merging, flushed together at the end of a pass.
#[derive(Default)]
struct PendingWrites {
    history: HistoryWriteBatch,
    sync: SyncWriteBatch,
    /// Nodes waiting for the ID of a URL row created in this pass.
    nodes_for_new_urls: Vec<(String, String)>,
}

fn now_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Associates the history database with typed URL nodes in the sync store.
pub struct TypedUrlAssociator {
    history: Arc<dyn HistoryBackend>,
    sync_store: Arc<dyn SyncStore>,
    crypto: Arc<dyn CryptoReadiness>,
    error_handler: Arc<dyn DataTypeErrorHandler>,
    settings: AssociationSettings,
    abort: AbortHandle,
    fixup: HistoryFixup,
    associations: AssociationTable,
    phase: AssociationPhase,
    clock: fn() -> i64,
}

impl TypedUrlAssociator {
    pub fn new(
        history: Arc<dyn HistoryBackend>,
        sync_store: Arc<dyn SyncStore>,
        crypto: Arc<dyn CryptoReadiness>,
        error_handler: Arc<dyn DataTypeErrorHandler>,
        settings: AssociationSettings,
    ) -> Self {
        let fixup = HistoryFixup::new(settings.max_visits_to_fetch);
        Self {
            history,
            sync_store,
            crypto,
            error_handler,
            settings,
            abort: AbortHandle::new(),
            fixup,
            associations: AssociationTable::new(),
            phase: AssociationPhase::Idle,
            clock: now_seconds,
        }
    }

    /// Replaces the clock used to expire remote visits (seconds since the epoch).
    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    /// Shares `handle` with this associator, so a request made through it
    /// before or during a pass reaches that pass.
    pub fn with_abort_handle(mut self, handle: AbortHandle) -> Self {
        self.abort = handle;
        self
    }

    /// A handle that can abort passes from another thread.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn phase(&self) -> AssociationPhase {
        self.phase
    }

    pub fn associations(&self) -> &AssociationTable {
        &self.associations
    }

    pub fn error_stats(&self) -> DbAccessStats {
        self.fixup.stats()
    }

    /// Percentage of history reads that failed since the stats were last cleared.
    pub fn error_percentage(&self) -> u32 {
        self.fixup.stats().error_percentage()
    }

    pub fn clear_error_stats(&mut self) {
        self.fixup.clear_stats();
    }

    /// Deletes every typed URL node and its association in one transaction.
    pub fn delete_all_nodes(&mut self) -> Result<usize, SyncError> {
        let deleted = self
            .sync_store
            .delete_children(&self.settings.typed_url_tag)
            .map_err(|e| SyncError::StoreWrite(e.to_string()))?;
        self.associations.clear();
        log::info!("deleted {} typed url nodes", deleted);
        Ok(deleted)
    }

    /// Translates one incoming record into history writes without applying them.
    ///
    /// A URL missing from history becomes a new row carrying every visit of
    /// the record. An existing row takes the record's title, typed count and
    /// hidden flag and gains the visits it lacks; it lands in the batch only
    /// when something changed. Reads count towards the error statistics.
    pub fn update_from_sync_db(&mut self, typed_url: &TypedUrlSpecifics) -> Result<SyncDbUpdate, SyncError> {
        let mut update = SyncDbUpdate::default();

        let existing = match self.history.get_url(&typed_url.url) {
            Ok(existing) => existing,
            Err(e) => {
                let stats = self.fixup.stats_mut();
                stats.record_access();
                stats.record_error();
                return Err(SyncError::StoreRead(e.to_string()));
            }
        };

        let Some(row) = existing else {
            self.fixup.stats_mut().record_access();
            let mut row = UrlRow::new(&typed_url.url);
            update_url_row_from_typed_url_specifics(typed_url, &mut row);
            let visits = diff_visits(&[], typed_url).to_add;
            row.visit_count = i32::try_from(visits.len()).unwrap_or(i32::MAX);
            row.last_visit = visits.iter().map(|v| v.visit_time).max().unwrap_or(0);
            update.batch.new_urls.push(NewUrl { row, visits });
            return Ok(update);
        };

        let (row, visits) = self
            .fixup
            .fixup_and_fetch_visits(self.history.as_ref(), row.id)?;
        let windowed = self.within_fetch_window(typed_url.clone(), &visits);
        let diff = diff_visits(&visits, &windowed);

        let mut new_row = row.clone();
        update_url_row_from_typed_url_specifics(typed_url, &mut new_row);
        if !diff.to_add.is_empty() {
            let added = i32::try_from(diff.to_add.len()).unwrap_or(i32::MAX);
            new_row.visit_count = new_row.visit_count.saturating_add(added);
            if let Some(newest) = diff.to_add.iter().map(|v| v.visit_time).max() {
                new_row.last_visit = new_row.last_visit.max(newest);
            }
            update.batch.new_visits.push((row.id, diff.to_add));
        }
        if new_row != row {
            update.batch.updated_urls.push(new_row);
        }
        update.visits_to_remove = diff.to_remove;
        Ok(update)
    }

    fn set_phase(&mut self, phase: AssociationPhase) {
        log::debug!("typed url association: {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    fn do_associate_models(&mut self) -> Result<AssociationReport, SyncError> {
        let mut report = AssociationReport::new();

        self.set_phase(AssociationPhase::Preflight);
        if !self.crypto.crypto_ready() {
            return Err(SyncError::CryptoNotReady);
        }
        if self.abort.consume() {
            log::info!("typed url association aborted before start");
            report.outcome = AssociationOutcome::Aborted;
            self.set_phase(AssociationPhase::Aborted);
            return Ok(report);
        }

        self.set_phase(AssociationPhase::Enumerating);
        let working = self.enumerate(&mut report)?;

        self.set_phase(AssociationPhase::Merging);
        let total = working.len();
        let mut pending = PendingWrites::default();
        let mut aborted = false;
        for (index, (url, item)) in working.into_iter().enumerate() {
            if self.abort.is_abort_pending() {
                aborted = true;
                report.urls_remaining = total - index;
                log::info!("typed url association aborted with {} urls left", total - index);
                break;
            }
            self.merge_one(&url, item, &mut pending, &mut report);
        }

        self.set_phase(AssociationPhase::Flushing);
        self.flush(pending)?;

        if aborted {
            self.abort.consume();
            report.outcome = AssociationOutcome::Aborted;
            self.set_phase(AssociationPhase::Aborted);
        } else {
            self.set_phase(AssociationPhase::Done);
        }
        log::info!(
            "typed url association finished: {:?}, {} merged, {} skipped, error rate {}%",
            report.outcome,
            report.urls_merged,
            report.urls_skipped,
            self.error_percentage()
        );
        Ok(report)
    }

    /// Builds the working set keyed by URL from both stores.
    fn enumerate(&mut self, report: &mut AssociationReport) -> Result<BTreeMap<String, WorkItem>, SyncError> {
        let persisted = self.sync_store.load_associations()?;
        self.associations.clear();
        for (url_id, node_id) in &persisted {
            self.associations.associate(*url_id, node_id);
        }

        let nodes = self.sync_store.list_children(&self.settings.typed_url_tag)?;
        let mut working: BTreeMap<String, WorkItem> = BTreeMap::new();

        for node in nodes {
            let specifics = match decode_node(&node) {
                Ok(specifics) => specifics,
                Err(e) => {
                    let stats = self.fixup.stats_mut();
                    stats.record_access();
                    stats.record_error();
                    report.urls_skipped += 1;
                    log::warn!("skipping sync node {}: {}", node.id, e);
                    continue;
                }
            };
            let item = working.entry(specifics.url.clone()).or_default();
            if item.remote.is_some() {
                log::warn!("duplicate sync node {} for {}", node.id, specifics.url);
                continue;
            }
            item.remote = Some(RemoteItem {
                node_id: node.id,
                specifics,
            });
        }

        for row in self.history.get_typed_urls()? {
            let key = row.url.clone();
            working.entry(key).or_default().local = Some(row);
        }

        log::debug!("typed url working set: {} urls", working.len());
        Ok(working)
    }

    /// Merges one URL into `pending`. Failures are counted and the URL skipped.
    ///
    /// Every URL costs one history access, whichever way it is read.
    fn merge_one(&mut self, url: &str, item: WorkItem, pending: &mut PendingWrites, report: &mut AssociationReport) {
        match (item.remote, item.local) {
            (Some(remote), Some(row)) => {
                match self.fixup.fixup_url_and_get_visits(self.history.as_ref(), &row) {
                    Ok((row, visits)) => self.merge_both(remote, row, visits, pending, report),
                    Err(_) => report.urls_skipped += 1,
                }
            }
            (Some(remote), None) => {
                // The URL may still exist locally without typed visits.
                match self.history.get_url(url) {
                    Ok(Some(row)) => match self.fixup.fixup_and_fetch_visits(self.history.as_ref(), row.id) {
                        Ok((row, visits)) => self.merge_both(remote, row, visits, pending, report),
                        Err(_) => report.urls_skipped += 1,
                    },
                    Ok(None) => {
                        self.fixup.stats_mut().record_access();
                        self.create_local(remote, pending, report);
                    }
                    Err(e) => {
                        let stats = self.fixup.stats_mut();
                        stats.record_access();
                        stats.record_error();
                        report.urls_skipped += 1;
                        log::warn!("could not look up {}: {}", url, e);
                    }
                }
            }
            (None, Some(row)) => {
                match self.fixup.fixup_url_and_get_visits(self.history.as_ref(), &row) {
                    Ok((row, visits)) => self.create_remote(row, visits, pending, report),
                    Err(_) => report.urls_skipped += 1,
                }
            }
            (None, None) => {}
        }
    }

    /// Drops remote visits older than every fetched local visit once the fetch
    /// hit its bound. Those may be stored locally outside the fetched window.
    fn within_fetch_window(&self, specifics: TypedUrlSpecifics, visits: &[VisitRow]) -> TypedUrlSpecifics {
        match visits.first() {
            Some(oldest) if visits.len() >= self.fixup.max_visits_to_fetch() => {
                filter_expired_visits(&specifics, oldest.visit_time)
            }
            _ => specifics,
        }
    }

    fn merge_both(
        &mut self,
        remote: RemoteItem,
        row: UrlRow,
        visits: Vec<VisitRow>,
        pending: &mut PendingWrites,
        report: &mut AssociationReport,
    ) {
        let threshold = expiry_threshold((self.clock)(), self.settings.visit_expiry_days);
        let filtered = filter_expired_visits(&remote.specifics, threshold);
        if filtered.visits.is_empty() {
            self.delete_remote(&remote.node_id, pending, report);
            return;
        }
        let filtered = self.within_fetch_window(filtered, &visits);
        let visits = unexpired(visits, threshold);

        report.local_only_visits += diff_visits(&visits, &filtered).to_remove.len();
        let outcome = merge_urls(&filtered, &row, &visits);
        log::trace!("merged {}: {:?}", row.url, outcome.result);

        if outcome.result.contains(MergeChange::LocalRowChanged) {
            pending.history.updated_urls.push(outcome.new_url.clone());
            report.local_urls_updated += 1;
        }
        if outcome.result.contains(MergeChange::LocalVisitsAdded) {
            pending
                .history
                .new_visits
                .push((row.id, outcome.new_visits.clone()));
            report.visits_added += outcome.new_visits.len();
        }

        let merged = merged_visits(&visits, &outcome);
        if should_ignore_url(&outcome.new_url, &as_synced_rows(row.id, &merged, &visits)) {
            if self.associations.node_for(row.id).is_some() {
                pending.sync.dissociated.push(row.id);
            }
            report.urls_ignored += 1;
            return;
        }

        if outcome.result.contains(MergeChange::UpdateNode) {
            let specifics = write_to_typed_url_specifics(&outcome.new_url, &merged);
            match encode_node(&remote.node_id, &self.settings.typed_url_tag, &specifics) {
                Ok(node) => {
                    pending.sync.updated.push(node);
                    report.nodes_updated += 1;
                }
                Err(e) => {
                    log::warn!("could not rewrite node for {}: {}", row.url, e);
                    report.urls_skipped += 1;
                    return;
                }
            }
        }

        if self.associations.node_for(row.id) != Some(remote.node_id.as_str()) {
            pending.sync.associations.push((row.id, remote.node_id));
        }
        report.urls_merged += 1;
    }

    fn create_local(&mut self, remote: RemoteItem, pending: &mut PendingWrites, report: &mut AssociationReport) {
        let threshold = expiry_threshold((self.clock)(), self.settings.visit_expiry_days);
        let filtered = filter_expired_visits(&remote.specifics, threshold);
        if filtered.visits.is_empty() {
            self.delete_remote(&remote.node_id, pending, report);
            return;
        }

        let mut row = UrlRow::new(&filtered.url);
        update_url_row_from_typed_url_specifics(&filtered, &mut row);
        let visits = diff_visits(&[], &filtered).to_add;
        row.visit_count = i32::try_from(visits.len()).unwrap_or(i32::MAX);
        row.last_visit = visits.iter().map(|v| v.visit_time).max().unwrap_or(0);

        let result = MergeResult::of(&[MergeChange::LocalRowChanged, MergeChange::LocalVisitsAdded]);
        log::trace!("new local url {}: {:?}", row.url, result);

        report.local_urls_created += 1;
        report.visits_added += visits.len();
        report.urls_merged += 1;

        if should_ignore_url(&row, &as_synced_rows(0, &visits, &[])) {
            report.urls_ignored += 1;
        } else {
            pending
                .nodes_for_new_urls
                .push((row.url.clone(), remote.node_id));
        }
        pending.history.new_urls.push(NewUrl { row, visits });
    }

    fn create_remote(
        &mut self,
        row: UrlRow,
        visits: Vec<VisitRow>,
        pending: &mut PendingWrites,
        report: &mut AssociationReport,
    ) {
        let threshold = expiry_threshold((self.clock)(), self.settings.visit_expiry_days);
        let visits = unexpired(visits, threshold);
        if should_ignore_url(&row, &visits) {
            report.urls_ignored += 1;
            return;
        }

        let infos: Vec<VisitInfo> = visits.iter().map(VisitInfo::from).collect();
        let specifics = write_to_typed_url_specifics(&row, &infos);
        let node_id = Uuid::new_v4().to_string();
        match encode_node(&node_id, &self.settings.typed_url_tag, &specifics) {
            Ok(node) => {
                pending.sync.created.push(node);
                pending.sync.associations.push((row.id, node_id));
                report.nodes_created += 1;
                report.urls_merged += 1;
            }
            Err(e) => {
                log::warn!("could not create node for {}: {}", row.url, e);
                report.urls_skipped += 1;
            }
        }
    }

    fn delete_remote(&mut self, node_id: &str, pending: &mut PendingWrites, report: &mut AssociationReport) {
        log::debug!("sync node {} has no unexpired visits, deleting", node_id);
        pending.sync.deleted.push(node_id.to_string());
        report.nodes_deleted += 1;
    }

    /// Writes the history batch, then the sync batch, and updates the in-memory associations.
    fn flush(&mut self, mut pending: PendingWrites) -> Result<(), SyncError> {
        if !pending.history.is_empty() {
            let created = self
                .history
                .apply_batch(&pending.history)
                .map_err(|e| SyncError::StoreWrite(e.to_string()))?;
            for (url, node_id) in pending.nodes_for_new_urls.drain(..) {
                match created.get(&url) {
                    Some(url_id) => pending.sync.associations.push((*url_id, node_id)),
                    None => log::warn!("no row id for new url {}", url),
                }
            }
        }

        if !pending.sync.is_empty() {
            self.sync_store
                .apply_batch(&pending.sync)
                .map_err(|e| SyncError::StoreWrite(e.to_string()))?;
        }

        for node_id in &pending.sync.deleted {
            self.associations.remove_node(node_id);
        }
        for url_id in &pending.sync.dissociated {
            self.associations.remove_url(*url_id);
        }
        for (url_id, node_id) in &pending.sync.associations {
            self.associations.associate(*url_id, node_id);
        }
        Ok(())
    }
}

/// Drops local visits the remote side would expire on the next pass.
fn unexpired(mut visits: Vec<VisitRow>, threshold: i64) -> Vec<VisitRow> {
    visits.retain(|v| v.visit_time >= threshold);
    visits
}

/// Local visits plus `merged` visits the history lacks, as rows marked synced.
fn as_synced_rows(url_id: UrlId, merged: &[VisitInfo], local: &[VisitRow]) -> Vec<VisitRow> {
    let mut rows = local.to_vec();
    for visit in merged {
        if !local.iter().any(|v| v.visit_time == visit.visit_time) {
            let mut row = VisitRow::new(url_id, visit.visit_time, visit.transition);
            row.source = VisitSource::Synced;
            rows.push(row);
        }
    }
    rows
}

impl AssociatorInterface for TypedUrlAssociator {
    fn associate_models(&mut self) -> Result<AssociationReport, SyncError> {
        self.fixup.clear_stats();
        match self.do_associate_models() {
            Ok(report) => Ok(report),
            Err(e) => {
                self.set_phase(AssociationPhase::Failed);
                self.error_handler.on_unrecoverable_error(&e);
                Err(e)
            }
        }
    }

    fn disassociate_models(&mut self) -> Result<(), SyncError> {
        self.associations.clear();
        let cleared = self
            .sync_store
            .clear_associations()
            .map_err(|e| SyncError::StoreWrite(e.to_string()))?;
        log::debug!("cleared {} typed url associations", cleared);
        Ok(())
    }

    fn abort_association(&self) {
        self.abort.request_abort();
    }

    fn sync_model_has_user_created_nodes(&self) -> Result<bool, SyncError> {
        let nodes = self.sync_store.list_children(&self.settings.typed_url_tag)?;
        Ok(!nodes.is_empty())
    }

    fn crypto_ready_if_necessary(&self) -> bool {
        self.crypto.crypto_ready()
    }
}
