//! Compensates for data-quality problems in the history database before merging.
//!
//! The history store can hold duplicate visits, a `last_visit` that matches
//! none of the stored visits, and more visits than is reasonable to load for
//! one URL. [`HistoryFixup`] repairs all three on the way out of the store and
//! counts how often reads fail.

use crate::managers::history_manager::HistoryBackend;
use crate::services::typed_url_codec::MAX_TYPED_URL_VISITS;
use crate::types::errors::SyncError;
use crate::types::history::{PageTransition, UrlId, UrlRow, VisitRow, VisitSource};

/// Database access counters for one association pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DbAccessStats {
    pub accesses: u64,
    pub errors: u64,
}

impl DbAccessStats {
    /// Percentage of accesses that failed, rounded down. Zero when nothing was read.
    pub fn error_percentage(&self) -> u32 {
        if self.accesses == 0 {
            return 0;
        }
        let pct = self.errors.saturating_mul(100) / self.accesses;
        u32::try_from(pct).unwrap_or(u32::MAX)
    }

    pub fn record_access(&mut self) {
        self.accesses += 1;
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    pub fn clear(&mut self) {
        *self = DbAccessStats::default();
    }
}

/// Smallest fetch bound accepted. A smaller window would hide local visits
/// that a remote record can still carry.
pub const MIN_VISITS_TO_FETCH: usize = MAX_TYPED_URL_VISITS;

/// Fetches visits for URLs and repairs them so they can be merged.
#[derive(Debug, Clone)]
pub struct HistoryFixup {
    max_visits_to_fetch: usize,
    stats: DbAccessStats,
}

impl HistoryFixup {
    /// `max_visits_to_fetch` is raised to [`MIN_VISITS_TO_FETCH`] when lower.
    pub fn new(max_visits_to_fetch: usize) -> Self {
        Self {
            max_visits_to_fetch: max_visits_to_fetch.max(MIN_VISITS_TO_FETCH),
            stats: DbAccessStats::default(),
        }
    }

    pub fn max_visits_to_fetch(&self) -> usize {
        self.max_visits_to_fetch
    }

    pub fn stats(&self) -> DbAccessStats {
        self.stats
    }

    pub fn stats_mut(&mut self) -> &mut DbAccessStats {
        &mut self.stats
    }

    pub fn clear_stats(&mut self) {
        self.stats.clear();
    }

    /// Reads row `url_id` and fixes it up. One access is counted either way.
    pub fn fixup_and_fetch_visits(
        &mut self,
        backend: &dyn HistoryBackend,
        url_id: UrlId,
    ) -> Result<(UrlRow, Vec<VisitRow>), SyncError> {
        self.stats.record_access();
        match backend.get_url_by_id(url_id) {
            Ok(url) => self.fetch_and_repair(backend, url),
            Err(e) => {
                self.stats.record_error();
                log::warn!("could not read url {}: {}", url_id, e);
                Err(SyncError::StoreRead(e.to_string()))
            }
        }
    }

    /// Fetches the visits of `url` and returns a repaired copy of both.
    ///
    /// The returned visits are sorted by time, hold each timestamp once, number
    /// at most `max_visits_to_fetch`, and when non-empty end at the returned
    /// row's `last_visit`.
    pub fn fixup_url_and_get_visits(
        &mut self,
        backend: &dyn HistoryBackend,
        url: &UrlRow,
    ) -> Result<(UrlRow, Vec<VisitRow>), SyncError> {
        self.stats.record_access();
        self.fetch_and_repair(backend, url.clone())
    }

    fn fetch_and_repair(
        &mut self,
        backend: &dyn HistoryBackend,
        mut url: UrlRow,
    ) -> Result<(UrlRow, Vec<VisitRow>), SyncError> {
        let mut visits = match backend.get_most_recent_visits_for_url(url.id, self.max_visits_to_fetch) {
            Ok(visits) => visits,
            Err(e) => {
                self.stats.record_error();
                log::warn!("could not read visits for {}: {}", url.url, e);
                return Err(SyncError::StoreRead(e.to_string()));
            }
        };

        // Stable sort keeps the first-fetched duplicate in front.
        visits.sort_by_key(|v| v.visit_time);
        let before = visits.len();
        visits.dedup_by_key(|v| v.visit_time);
        if visits.len() != before {
            log::debug!("dropped {} duplicate visits for {}", before - visits.len(), url.url);
        }

        let newest = visits.last().map(|v| v.visit_time);
        match newest {
            Some(newest) if newest > url.last_visit => {
                url.last_visit = newest;
            }
            Some(newest) if newest < url.last_visit => {
                visits.push(synthesize_visit(&url));
            }
            None if url.last_visit > 0 => {
                visits.push(synthesize_visit(&url));
            }
            _ => {}
        }

        if visits.len() > self.max_visits_to_fetch {
            let excess = visits.len() - self.max_visits_to_fetch;
            visits.drain(..excess);
        }

        Ok((url, visits))
    }
}

fn synthesize_visit(url: &UrlRow) -> VisitRow {
    let transition = if url.typed_count > 0 {
        PageTransition::Typed
    } else {
        PageTransition::Link
    };
    VisitRow::new(url.id, url.last_visit, transition)
}

/// Whether `url` should stay out of sync entirely.
///
/// Ignored URLs are neither pushed nor associated, but they are never deleted
/// from history either.
pub fn should_ignore_url(url: &UrlRow, visits: &[VisitRow]) -> bool {
    if url.url.is_empty() || visits.is_empty() {
        return true;
    }
    let has_typed_visit = visits.iter().any(|v| v.transition == PageTransition::Typed);
    if url.typed_count == 0 && !has_typed_visit {
        return true;
    }
    // Imported-only URLs were never visited in this browser.
    visits.iter().all(|v| v.source == VisitSource::Imported)
}
