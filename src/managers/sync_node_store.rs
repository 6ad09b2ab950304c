//! Sync Node Store: the remote side of typed URL association.
//!
//! Implements `SyncStore` over SQLite: nodes hang off tagged permanent
//! nodes, a batch of node writes is applied inside one transaction, and the
//! URL ⇄ node association table lives next to the nodes it points at.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, OptionalExtension};

use crate::database::connection::Database;
use crate::types::errors::SyncStoreError;
use crate::types::history::UrlId;
use crate::types::specifics::SyncNode;

/// Remote writes accumulated during one association pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncWriteBatch {
    pub created: Vec<SyncNode>,
    pub updated: Vec<SyncNode>,
    pub deleted: Vec<String>,
    /// `(url_id, node_id)` rows to persist once the nodes exist.
    pub associations: Vec<(UrlId, String)>,
    /// URLs whose association is dropped. Their nodes stay.
    pub dissociated: Vec<UrlId>,
}

impl SyncWriteBatch {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
            && self.updated.is_empty()
            && self.deleted.is_empty()
            && self.associations.is_empty()
            && self.dissociated.is_empty()
    }
}

/// Access to the sync store and its association table.
pub trait SyncStore {
    /// Children of the permanent node `tag`, ordered by client tag.
    fn list_children(&self, tag: &str) -> Result<Vec<SyncNode>, SyncStoreError>;
    fn get_node(&self, id: &str) -> Result<SyncNode, SyncStoreError>;
    /// Creates or overwrites a single node.
    fn put_node(&self, node: &SyncNode) -> Result<(), SyncStoreError>;
    fn delete_node(&self, id: &str) -> Result<(), SyncStoreError>;
    /// Applies every write in `batch` inside one transaction.
    fn apply_batch(&self, batch: &SyncWriteBatch) -> Result<(), SyncStoreError>;
    /// Deletes all children of `tag` and their associations in one transaction.
    fn delete_children(&self, tag: &str) -> Result<usize, SyncStoreError>;
    fn load_associations(&self) -> Result<Vec<(UrlId, String)>, SyncStoreError>;
    fn clear_associations(&self) -> Result<usize, SyncStoreError>;
}

/// Sync store backed by a SQLite database.
pub struct SyncNodeStore {
    db: Arc<Database>,
}

impl SyncNodeStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64
    }

    fn require_root(&self, tag: &str) -> Result<(), SyncStoreError> {
        let exists: bool = self
            .db
            .connection()
            .query_row(
                "SELECT COUNT(*) > 0 FROM sync_permanent_nodes WHERE tag = ?1",
                params![tag],
                |row| row.get(0),
            )
            .map_err(|e| SyncStoreError::DatabaseError(e.to_string()))?;
        if exists {
            Ok(())
        } else {
            Err(SyncStoreError::MissingRoot(tag.to_string()))
        }
    }

    fn row_to_node(row: &rusqlite::Row) -> rusqlite::Result<SyncNode> {
        Ok(SyncNode {
            id: row.get(0)?,
            parent_tag: row.get(1)?,
            client_tag: row.get(2)?,
            specifics: row.get(3)?,
        })
    }

    fn map_write_error(e: rusqlite::Error) -> SyncStoreError {
        match e {
            rusqlite::Error::SqliteFailure(err, msg)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                SyncStoreError::Conflict(msg.unwrap_or_else(|| err.to_string()))
            }
            other => SyncStoreError::DatabaseError(other.to_string()),
        }
    }
}

impl SyncStore for SyncNodeStore {
    fn list_children(&self, tag: &str) -> Result<Vec<SyncNode>, SyncStoreError> {
        self.require_root(tag)?;
        let mut stmt = self
            .db
            .connection()
            .prepare(
                "SELECT id, parent_tag, client_tag, specifics FROM sync_nodes \
                 WHERE parent_tag = ?1 ORDER BY client_tag ASC",
            )
            .map_err(|e| SyncStoreError::DatabaseError(e.to_string()))?;

        let rows = stmt
            .query_map(params![tag], Self::row_to_node)
            .map_err(|e| SyncStoreError::DatabaseError(e.to_string()))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row.map_err(|e| SyncStoreError::DatabaseError(e.to_string()))?);
        }
        Ok(results)
    }

    fn get_node(&self, id: &str) -> Result<SyncNode, SyncStoreError> {
        self.db
            .connection()
            .query_row(
                "SELECT id, parent_tag, client_tag, specifics FROM sync_nodes WHERE id = ?1",
                params![id],
                Self::row_to_node,
            )
            .optional()
            .map_err(|e| SyncStoreError::DatabaseError(e.to_string()))?
            .ok_or_else(|| SyncStoreError::NotFound(id.to_string()))
    }

    fn put_node(&self, node: &SyncNode) -> Result<(), SyncStoreError> {
        self.require_root(&node.parent_tag)?;
        self.db
            .connection()
            .execute(
                "INSERT INTO sync_nodes (id, parent_tag, client_tag, specifics, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5) \
                 ON CONFLICT(id) DO UPDATE SET specifics = excluded.specifics, \
                 updated_at = excluded.updated_at",
                params![node.id, node.parent_tag, node.client_tag, node.specifics, Self::now()],
            )
            .map_err(Self::map_write_error)?;
        Ok(())
    }

    fn delete_node(&self, id: &str) -> Result<(), SyncStoreError> {
        let affected = self
            .db
            .connection()
            .execute("DELETE FROM sync_nodes WHERE id = ?1", params![id])
            .map_err(|e| SyncStoreError::DatabaseError(e.to_string()))?;
        if affected == 0 {
            return Err(SyncStoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn apply_batch(&self, batch: &SyncWriteBatch) -> Result<(), SyncStoreError> {
        let now = Self::now();
        let tx = self
            .db
            .connection()
            .unchecked_transaction()
            .map_err(|e| SyncStoreError::DatabaseError(e.to_string()))?;

        for node in &batch.created {
            tx.execute(
                "INSERT INTO sync_nodes (id, parent_tag, client_tag, specifics, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![node.id, node.parent_tag, node.client_tag, node.specifics, now],
            )
            .map_err(Self::map_write_error)?;
        }

        for node in &batch.updated {
            let affected = tx
                .execute(
                    "UPDATE sync_nodes SET specifics = ?1, updated_at = ?2 WHERE id = ?3",
                    params![node.specifics, now, node.id],
                )
                .map_err(Self::map_write_error)?;
            if affected == 0 {
                return Err(SyncStoreError::NotFound(node.id.clone()));
            }
        }

        for id in &batch.deleted {
            // Associations go with the node via ON DELETE CASCADE.
            let affected = tx
                .execute("DELETE FROM sync_nodes WHERE id = ?1", params![id])
                .map_err(|e| SyncStoreError::DatabaseError(e.to_string()))?;
            if affected == 0 {
                log::warn!("sync node {} already gone", id);
            }
        }

        for url_id in &batch.dissociated {
            tx.execute(
                "DELETE FROM typed_url_associations WHERE url_id = ?1",
                params![url_id],
            )
            .map_err(|e| SyncStoreError::DatabaseError(e.to_string()))?;
        }

        for (url_id, node_id) in &batch.associations {
            tx.execute(
                "INSERT OR REPLACE INTO typed_url_associations (url_id, node_id) VALUES (?1, ?2)",
                params![url_id, node_id],
            )
            .map_err(Self::map_write_error)?;
        }

        tx.commit()
            .map_err(|e| SyncStoreError::DatabaseError(e.to_string()))?;

        log::debug!(
            "sync batch applied: {} created, {} updated, {} deleted, {} associations, {} dissociated",
            batch.created.len(),
            batch.updated.len(),
            batch.deleted.len(),
            batch.associations.len(),
            batch.dissociated.len()
        );
        Ok(())
    }

    fn delete_children(&self, tag: &str) -> Result<usize, SyncStoreError> {
        self.require_root(tag)?;
        let tx = self
            .db
            .connection()
            .unchecked_transaction()
            .map_err(|e| SyncStoreError::DatabaseError(e.to_string()))?;
        tx.execute(
            "DELETE FROM typed_url_associations WHERE node_id IN \
             (SELECT id FROM sync_nodes WHERE parent_tag = ?1)",
            params![tag],
        )
        .map_err(|e| SyncStoreError::DatabaseError(e.to_string()))?;
        let deleted = tx
            .execute("DELETE FROM sync_nodes WHERE parent_tag = ?1", params![tag])
            .map_err(|e| SyncStoreError::DatabaseError(e.to_string()))?;
        tx.commit()
            .map_err(|e| SyncStoreError::DatabaseError(e.to_string()))?;
        Ok(deleted)
    }

    fn load_associations(&self) -> Result<Vec<(UrlId, String)>, SyncStoreError> {
        let mut stmt = self
            .db
            .connection()
            .prepare("SELECT url_id, node_id FROM typed_url_associations ORDER BY url_id ASC")
            .map_err(|e| SyncStoreError::DatabaseError(e.to_string()))?;

        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(|e| SyncStoreError::DatabaseError(e.to_string()))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row.map_err(|e| SyncStoreError::DatabaseError(e.to_string()))?);
        }
        Ok(results)
    }

    fn clear_associations(&self) -> Result<usize, SyncStoreError> {
        self.db
            .connection()
            .execute("DELETE FROM typed_url_associations", [])
            .map_err(|e| SyncStoreError::DatabaseError(e.to_string()))
    }
}
