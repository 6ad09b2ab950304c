//! History Manager: the local URL store.
//!
//! Implements `HistoryBackend`: reading URL rows and their visits, listing
//! typed URLs, and applying batched writes produced by association, backed by
//! SQLite via `rusqlite`.

use std::collections::HashMap;
use std::sync::Arc;

use rusqlite::{params, OptionalExtension};

use crate::database::connection::Database;
use crate::types::errors::HistoryError;
use crate::types::history::{PageTransition, UrlId, UrlRow, VisitInfo, VisitRow, VisitSource};

/// A URL row to create together with its first visits.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUrl {
    pub row: UrlRow,
    pub visits: Vec<VisitInfo>,
}

/// Local writes accumulated during one association pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryWriteBatch {
    pub new_urls: Vec<NewUrl>,
    pub updated_urls: Vec<UrlRow>,
    pub new_visits: Vec<(UrlId, Vec<VisitInfo>)>,
}

impl HistoryWriteBatch {
    pub fn is_empty(&self) -> bool {
        self.new_urls.is_empty() && self.updated_urls.is_empty() && self.new_visits.is_empty()
    }
}

/// Read and write access to the local history store.
pub trait HistoryBackend {
    fn get_url_by_id(&self, id: UrlId) -> Result<UrlRow, HistoryError>;
    fn get_url(&self, url: &str) -> Result<Option<UrlRow>, HistoryError>;
    /// Rows with `typed_count > 0`, the candidates for association.
    fn get_typed_urls(&self) -> Result<Vec<UrlRow>, HistoryError>;
    /// Up to `max` visits of one URL, most recent first.
    fn get_most_recent_visits_for_url(
        &self,
        id: UrlId,
        max: usize,
    ) -> Result<Vec<VisitRow>, HistoryError>;
    /// Applies `batch` atomically and returns the IDs assigned to new rows, keyed by URL.
    fn apply_batch(&self, batch: &HistoryWriteBatch) -> Result<HashMap<String, UrlId>, HistoryError>;
}

/// History store backed by a SQLite database.
pub struct HistoryManager {
    db: Arc<Database>,
}

impl HistoryManager {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Records one visit, creating the URL row on first sight. Returns the row ID.
    ///
    /// `visit_count`, `typed_count` and `last_visit` are kept consistent with the
    /// recorded visit.
    pub fn add_page_visit(
        &self,
        url: &str,
        title: &str,
        visit_time: i64,
        transition: PageTransition,
        source: VisitSource,
    ) -> Result<UrlId, HistoryError> {
        let typed = i32::from(transition == PageTransition::Typed);
        let tx = self
            .db
            .connection()
            .unchecked_transaction()
            .map_err(|e| HistoryError::DatabaseError(e.to_string()))?;

        let id = match self.get_url(url)? {
            Some(existing) => {
                tx.execute(
                    "UPDATE urls SET title = ?1, last_visit = MAX(last_visit, ?2), \
                     visit_count = visit_count + 1, typed_count = typed_count + ?3 WHERE id = ?4",
                    params![title, visit_time, typed, existing.id],
                )
                .map_err(|e| HistoryError::DatabaseError(e.to_string()))?;
                existing.id
            }
            None => {
                tx.execute(
                    "INSERT INTO urls (url, title, last_visit, visit_count, typed_count, hidden) \
                     VALUES (?1, ?2, ?3, 1, ?4, 0)",
                    params![url, title, visit_time, typed],
                )
                .map_err(|e| HistoryError::DatabaseError(e.to_string()))?;
                tx.last_insert_rowid()
            }
        };

        tx.execute(
            "INSERT INTO visits (url_id, visit_time, transition, source) VALUES (?1, ?2, ?3, ?4)",
            params![id, visit_time, transition.code(), source.code()],
        )
        .map_err(|e| HistoryError::DatabaseError(e.to_string()))?;

        tx.commit()
            .map_err(|e| HistoryError::DatabaseError(e.to_string()))?;
        Ok(id)
    }

    /// Stores `row` verbatim without any visits. Returns the row ID.
    ///
    /// Used for rows whose visits are added separately or are missing altogether.
    pub fn insert_url(&self, row: &UrlRow) -> Result<UrlId, HistoryError> {
        let conn = self.db.connection();
        conn.execute(
            "INSERT INTO urls (url, title, last_visit, visit_count, typed_count, hidden) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![row.url, row.title, row.last_visit, row.visit_count, row.typed_count, row.hidden],
        )
        .map_err(|e| HistoryError::DatabaseError(e.to_string()))?;
        Ok(conn.last_insert_rowid())
    }

    /// Inserts one raw visit row, without touching the URL row.
    pub fn insert_visit(&self, visit: &VisitRow) -> Result<i64, HistoryError> {
        let conn = self.db.connection();
        conn.execute(
            "INSERT INTO visits (url_id, visit_time, transition, source) VALUES (?1, ?2, ?3, ?4)",
            params![visit.url_id, visit.visit_time, visit.transition.code(), visit.source.code()],
        )
        .map_err(|e| HistoryError::DatabaseError(e.to_string()))?;
        Ok(conn.last_insert_rowid())
    }

    /// Every stored visit of a URL, oldest first.
    pub fn get_visits_for_url(&self, id: UrlId) -> Result<Vec<VisitRow>, HistoryError> {
        let mut stmt = self
            .db
            .connection()
            .prepare(
                "SELECT id, url_id, visit_time, transition, source FROM visits \
                 WHERE url_id = ?1 ORDER BY visit_time ASC, id ASC",
            )
            .map_err(|e| HistoryError::DatabaseError(e.to_string()))?;

        let rows = stmt
            .query_map(params![id], Self::row_to_visit)
            .map_err(|e| HistoryError::DatabaseError(e.to_string()))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row.map_err(|e| HistoryError::DatabaseError(e.to_string()))?);
        }
        Ok(results)
    }

    /// Every URL row, ordered by URL.
    pub fn list_urls(&self) -> Result<Vec<UrlRow>, HistoryError> {
        let mut stmt = self
            .db
            .connection()
            .prepare(
                "SELECT id, url, title, last_visit, visit_count, typed_count, hidden \
                 FROM urls ORDER BY url ASC",
            )
            .map_err(|e| HistoryError::DatabaseError(e.to_string()))?;

        let rows = stmt
            .query_map([], Self::row_to_url)
            .map_err(|e| HistoryError::DatabaseError(e.to_string()))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row.map_err(|e| HistoryError::DatabaseError(e.to_string()))?);
        }
        Ok(results)
    }

    fn row_to_url(row: &rusqlite::Row) -> rusqlite::Result<UrlRow> {
        Ok(UrlRow {
            id: row.get(0)?,
            url: row.get(1)?,
            title: row.get(2)?,
            last_visit: row.get(3)?,
            visit_count: row.get(4)?,
            typed_count: row.get(5)?,
            hidden: row.get(6)?,
        })
    }

    fn row_to_visit(row: &rusqlite::Row) -> rusqlite::Result<VisitRow> {
        let code: u32 = row.get(3)?;
        Ok(VisitRow {
            id: row.get(0)?,
            url_id: row.get(1)?,
            visit_time: row.get(2)?,
            transition: PageTransition::from_code(code).unwrap_or(PageTransition::Link),
            source: VisitSource::from_code(row.get(4)?),
        })
    }
}

impl HistoryBackend for HistoryManager {
    fn get_url_by_id(&self, id: UrlId) -> Result<UrlRow, HistoryError> {
        self.db
            .connection()
            .query_row(
                "SELECT id, url, title, last_visit, visit_count, typed_count, hidden \
                 FROM urls WHERE id = ?1",
                params![id],
                Self::row_to_url,
            )
            .optional()
            .map_err(|e| HistoryError::DatabaseError(e.to_string()))?
            .ok_or_else(|| HistoryError::NotFound(id.to_string()))
    }

    fn get_url(&self, url: &str) -> Result<Option<UrlRow>, HistoryError> {
        self.db
            .connection()
            .query_row(
                "SELECT id, url, title, last_visit, visit_count, typed_count, hidden \
                 FROM urls WHERE url = ?1",
                params![url],
                Self::row_to_url,
            )
            .optional()
            .map_err(|e| HistoryError::DatabaseError(e.to_string()))
    }

    fn get_typed_urls(&self) -> Result<Vec<UrlRow>, HistoryError> {
        let mut stmt = self
            .db
            .connection()
            .prepare(
                "SELECT id, url, title, last_visit, visit_count, typed_count, hidden \
                 FROM urls WHERE typed_count > 0 ORDER BY url ASC",
            )
            .map_err(|e| HistoryError::DatabaseError(e.to_string()))?;

        let rows = stmt
            .query_map([], Self::row_to_url)
            .map_err(|e| HistoryError::DatabaseError(e.to_string()))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row.map_err(|e| HistoryError::DatabaseError(e.to_string()))?);
        }
        Ok(results)
    }

    fn get_most_recent_visits_for_url(
        &self,
        id: UrlId,
        max: usize,
    ) -> Result<Vec<VisitRow>, HistoryError> {
        let limit = i64::try_from(max).unwrap_or(i64::MAX);
        let mut stmt = self
            .db
            .connection()
            .prepare(
                "SELECT id, url_id, visit_time, transition, source FROM visits \
                 WHERE url_id = ?1 ORDER BY visit_time DESC, id ASC LIMIT ?2",
            )
            .map_err(|e| HistoryError::DatabaseError(e.to_string()))?;

        let rows = stmt
            .query_map(params![id, limit], Self::row_to_visit)
            .map_err(|e| HistoryError::DatabaseError(e.to_string()))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row.map_err(|e| HistoryError::DatabaseError(e.to_string()))?);
        }
        Ok(results)
    }

    fn apply_batch(&self, batch: &HistoryWriteBatch) -> Result<HashMap<String, UrlId>, HistoryError> {
        let tx = self
            .db
            .connection()
            .unchecked_transaction()
            .map_err(|e| HistoryError::DatabaseError(e.to_string()))?;

        let mut created = HashMap::new();
        let mut visit_rows: Vec<(UrlId, &VisitInfo)> = Vec::new();

        for new_url in &batch.new_urls {
            let row = &new_url.row;
            tx.execute(
                "INSERT INTO urls (url, title, last_visit, visit_count, typed_count, hidden) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![row.url, row.title, row.last_visit, row.visit_count, row.typed_count, row.hidden],
            )
            .map_err(|e| HistoryError::DatabaseError(e.to_string()))?;
            let id = tx.last_insert_rowid();
            created.insert(row.url.clone(), id);
            visit_rows.extend(new_url.visits.iter().map(|v| (id, v)));
        }

        for row in &batch.updated_urls {
            let affected = tx
                .execute(
                    "UPDATE urls SET title = ?1, last_visit = ?2, visit_count = ?3, \
                     typed_count = ?4, hidden = ?5 WHERE id = ?6",
                    params![row.title, row.last_visit, row.visit_count, row.typed_count, row.hidden, row.id],
                )
                .map_err(|e| HistoryError::DatabaseError(e.to_string()))?;
            if affected == 0 {
                return Err(HistoryError::NotFound(row.id.to_string()));
            }
        }

        for (url_id, visits) in &batch.new_visits {
            visit_rows.extend(visits.iter().map(|v| (*url_id, v)));
        }

        {
            // A visit whose timestamp is already stored for the URL is skipped.
            let mut stmt = tx
                .prepare(
                    "INSERT INTO visits (url_id, visit_time, transition, source) \
                     SELECT ?1, ?2, ?3, ?4 WHERE NOT EXISTS \
                     (SELECT 1 FROM visits WHERE url_id = ?1 AND visit_time = ?2)",
                )
                .map_err(|e| HistoryError::DatabaseError(e.to_string()))?;
            for (url_id, visit) in visit_rows {
                stmt.execute(params![
                    url_id,
                    visit.visit_time,
                    visit.transition.code(),
                    VisitSource::Synced.code()
                ])
                .map_err(|e| HistoryError::DatabaseError(e.to_string()))?;
            }
        }

        tx.commit()
            .map_err(|e| HistoryError::DatabaseError(e.to_string()))?;

        log::debug!(
            "history batch applied: {} new, {} updated, {} visit groups",
            batch.new_urls.len(),
            batch.updated_urls.len(),
            batch.new_visits.len()
        );
        Ok(created)
    }
}
