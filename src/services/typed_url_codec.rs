//! Translation between history rows and the typed URL wire record.
//!
//! Everything here is stateless. Decoding is a partial update: only the
//! fields the wire record carries are copied onto a local row.

use crate::types::errors::SyncError;
use crate::types::history::{PageTransition, UrlRow, VisitInfo, VisitRow};
use crate::types::specifics::{SyncNode, TypedUrlSpecifics};

/// Most visits a single wire record retains. Older visits are dropped.
pub const MAX_TYPED_URL_VISITS: usize = 100;

impl From<&VisitRow> for VisitInfo {
    fn from(visit: &VisitRow) -> Self {
        VisitInfo::new(visit.visit_time, visit.transition)
    }
}

/// Builds the wire record for `url` from its visits, keeping the most recent
/// [`MAX_TYPED_URL_VISITS`] in ascending order.
pub fn write_to_typed_url_specifics(url: &UrlRow, visits: &[VisitInfo]) -> TypedUrlSpecifics {
    let mut sorted: Vec<VisitInfo> = visits.to_vec();
    sorted.sort_by_key(|v| v.visit_time);
    let skip = sorted.len().saturating_sub(MAX_TYPED_URL_VISITS);

    let mut specifics = TypedUrlSpecifics {
        url: url.url.clone(),
        title: url.title.clone(),
        typed_count: url.typed_count,
        hidden: url.hidden,
        visits: Vec::with_capacity(sorted.len() - skip),
        visit_transitions: Vec::with_capacity(sorted.len() - skip),
    };
    for visit in &sorted[skip..] {
        specifics.visits.push(visit.visit_time);
        specifics.visit_transitions.push(visit.transition.code());
    }
    specifics
}

/// Copies title, typed count and hidden flag from `specifics` onto `url_row`.
/// Visit count, last visit and the row ID are left alone.
pub fn update_url_row_from_typed_url_specifics(specifics: &TypedUrlSpecifics, url_row: &mut UrlRow) {
    url_row.title = specifics.title.clone();
    url_row.typed_count = specifics.typed_count;
    url_row.hidden = specifics.hidden;
}

/// Visits of a well-formed record as `VisitInfo`s, in record order.
///
/// Unknown transition codes fall back to `Link`; [`validate_specifics`]
/// rejects them before a record reaches the merge.
pub fn specifics_visits(specifics: &TypedUrlSpecifics) -> Vec<VisitInfo> {
    specifics
        .visits
        .iter()
        .zip(&specifics.visit_transitions)
        .map(|(time, code)| {
            VisitInfo::new(
                *time,
                PageTransition::from_code(*code).unwrap_or(PageTransition::Link),
            )
        })
        .collect()
}

pub fn validate_specifics(specifics: &TypedUrlSpecifics) -> Result<(), SyncError> {
    if specifics.url.is_empty() {
        return Err(SyncError::MalformedRemoteRecord("missing url".to_string()));
    }
    if specifics.visits.len() != specifics.visit_transitions.len() {
        return Err(SyncError::MalformedRemoteRecord(format!(
            "{}: {} visits but {} transitions",
            specifics.url,
            specifics.visits.len(),
            specifics.visit_transitions.len()
        )));
    }
    if let Some(code) = specifics
        .visit_transitions
        .iter()
        .find(|code| PageTransition::from_code(**code).is_none())
    {
        return Err(SyncError::MalformedRemoteRecord(format!(
            "{}: unknown transition {}",
            specifics.url, code
        )));
    }
    Ok(())
}

/// Parses and validates the record stored in `node`.
pub fn decode_node(node: &SyncNode) -> Result<TypedUrlSpecifics, SyncError> {
    let specifics: TypedUrlSpecifics = serde_json::from_str(&node.specifics)
        .map_err(|e| SyncError::MalformedRemoteRecord(format!("node {}: {}", node.id, e)))?;
    validate_specifics(&specifics)?;
    if !node.client_tag.is_empty() && node.client_tag != specifics.url {
        return Err(SyncError::MalformedRemoteRecord(format!(
            "node {}: tag {} does not match url {}",
            node.id, node.client_tag, specifics.url
        )));
    }
    Ok(specifics)
}

/// Serializes `specifics` into a node under `parent_tag`.
pub fn encode_node(id: &str, parent_tag: &str, specifics: &TypedUrlSpecifics) -> Result<SyncNode, SyncError> {
    let payload = serde_json::to_string(specifics)
        .map_err(|e| SyncError::StoreWrite(format!("serialize {}: {}", specifics.url, e)))?;
    Ok(SyncNode {
        id: id.to_string(),
        parent_tag: parent_tag.to_string(),
        client_tag: specifics.url.clone(),
        specifics: payload,
    })
}
