//! Pure merge logic for typed URLs.
//!
//! None of these functions hold state or touch a store, so they can be called
//! without an associator and in parallel across URLs. The remote record is the
//! canonical list of visits; the typed count decides which side's title and
//! hidden flag win.

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::services::typed_url_codec::{
    specifics_visits, update_url_row_from_typed_url_specifics, MAX_TYPED_URL_VISITS,
};
use crate::types::history::{UrlRow, VisitInfo, VisitRow};
use crate::types::merge::{MergeChange, MergeResult};
use crate::types::specifics::TypedUrlSpecifics;

const SECONDS_PER_DAY: i64 = 86_400;

/// Visits that would bring the local history in line with a remote record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisitDiff {
    /// Remote visits whose timestamp the local history lacks.
    pub to_add: Vec<VisitInfo>,
    /// Local visits whose timestamp the remote record lacks. Never applied:
    /// each client ages out its own visits.
    pub to_remove: Vec<VisitRow>,
}

/// Result of [`merge_urls`].
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub result: MergeResult,
    /// The local row after merging; only meaningful with `LocalRowChanged`.
    pub new_url: UrlRow,
    /// Visits to add locally; non-empty exactly when `LocalVisitsAdded` is set.
    pub new_visits: Vec<VisitInfo>,
}

/// Oldest visit time still retained when it is `now` and visits expire after `expiry_days`.
pub fn expiry_threshold(now: i64, expiry_days: u32) -> i64 {
    now.saturating_sub(i64::from(expiry_days) * SECONDS_PER_DAY)
}

/// Drops every visit older than `threshold`. Other fields pass through.
///
/// An empty visit list in the result means the record should be deleted
/// remotely.
pub fn filter_expired_visits(specifics: &TypedUrlSpecifics, threshold: i64) -> TypedUrlSpecifics {
    let mut filtered = TypedUrlSpecifics {
        visits: Vec::with_capacity(specifics.visits.len()),
        visit_transitions: Vec::with_capacity(specifics.visit_transitions.len()),
        ..specifics.clone()
    };
    for (time, transition) in specifics.visits.iter().zip(&specifics.visit_transitions) {
        if *time >= threshold {
            filtered.visits.push(*time);
            filtered.visit_transitions.push(*transition);
        }
    }
    filtered
}

/// Diffs `old_visits` against the visits in `new_url`, treating `new_url` as canonical.
///
/// No timestamp appears in both lists, and `to_add` holds each timestamp once.
pub fn diff_visits(old_visits: &[VisitRow], new_url: &TypedUrlSpecifics) -> VisitDiff {
    let old_times: HashSet<i64> = old_visits.iter().map(|v| v.visit_time).collect();
    let new_times: HashSet<i64> = new_url.visits.iter().copied().collect();

    let mut seen = HashSet::new();
    let to_add = specifics_visits(new_url)
        .into_iter()
        .filter(|v| !old_times.contains(&v.visit_time) && seen.insert(v.visit_time))
        .collect();

    let to_remove = old_visits
        .iter()
        .filter(|v| !new_times.contains(&v.visit_time))
        .cloned()
        .collect();

    VisitDiff { to_add, to_remove }
}

/// Merges the remote record `typed_url` with the local row `url` and its `visits`.
///
/// Given identical inputs the outcome is identical. Applying the outcome (and
/// rewriting the remote record from it when `UpdateNode` is set) and merging
/// again yields an empty result.
pub fn merge_urls(typed_url: &TypedUrlSpecifics, url: &UrlRow, visits: &[VisitRow]) -> MergeOutcome {
    let mut result = MergeResult::NONE;
    let mut new_url = url.clone();

    match url.typed_count.cmp(&typed_url.typed_count) {
        Ordering::Greater => result.insert(MergeChange::UpdateNode),
        Ordering::Less => {
            update_url_row_from_typed_url_specifics(typed_url, &mut new_url);
            result.insert(MergeChange::LocalRowChanged);
        }
        Ordering::Equal => {}
    }

    let diff = diff_visits(visits, typed_url);
    if !diff.to_add.is_empty() {
        let added = i32::try_from(diff.to_add.len()).unwrap_or(i32::MAX);
        new_url.visit_count = new_url.visit_count.saturating_add(added);
        if let Some(newest) = diff.to_add.iter().map(|v| v.visit_time).max() {
            new_url.last_visit = new_url.last_visit.max(newest);
        }
        result.insert(MergeChange::LocalVisitsAdded);
        result.insert(MergeChange::LocalRowChanged);
    }

    // Only the visits a rewritten record could carry count as history the
    // remote side is missing.
    let remote_times: HashSet<i64> = typed_url.visits.iter().copied().collect();
    let mut merged_times: Vec<i64> = visits
        .iter()
        .map(|v| v.visit_time)
        .chain(diff.to_add.iter().map(|v| v.visit_time))
        .collect();
    merged_times.sort_unstable_by(|a, b| b.cmp(a));
    merged_times.dedup();
    if merged_times
        .iter()
        .take(MAX_TYPED_URL_VISITS)
        .any(|t| !remote_times.contains(t))
    {
        result.insert(MergeChange::UpdateNode);
    }

    MergeOutcome {
        result,
        new_url,
        new_visits: diff.to_add,
    }
}

/// Local visits after applying `outcome`, as the list a rewritten remote record is built from.
pub fn merged_visits(visits: &[VisitRow], outcome: &MergeOutcome) -> Vec<VisitInfo> {
    let mut merged: Vec<VisitInfo> = visits.iter().map(VisitInfo::from).collect();
    merged.extend(outcome.new_visits.iter().copied());
    merged.sort_by_key(|v| v.visit_time);
    merged
}
