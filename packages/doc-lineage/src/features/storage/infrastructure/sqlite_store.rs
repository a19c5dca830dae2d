//! SQLite Lineage Store
//!
//! File-based persistent storage using SQLite. Four tables mirror the four
//! record kinds; events, relationships and stages carry foreign keys to
//! `document_entities.id`.
//!
//! One connection behind a mutex: writes are serialized and a read view
//! holding the mutex sees no interleaved writes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{LineageError, Result};
use crate::features::storage::domain::{
    DocumentEntity, DocumentFilter, DocumentLineageEvent, DocumentPatch, DocumentProcessingStage,
    DocumentRelationship, GraphSource, LineageStore, Metadata, RelationshipType, StageUpdate,
    StoreStats,
};

const DOCUMENT_COLUMNS: &str = "id, document_type, document_name, description, file_size, \
     file_hash, parcel_id, uploaded_by, created_at, status";

const EVENT_COLUMNS: &str =
    "id, document_id, event_type, performed_by, details, confidence, event_timestamp";

const RELATIONSHIP_COLUMNS: &str = "id, source_document_id, target_document_id, \
     relationship_type, notes, metadata, created_at";

const STAGE_COLUMNS: &str = "id, document_id, stage_name, status, progress, processor_name, \
     processor_version, started_at, completed_at, result";

/// SQLite-based LineageStore implementation
#[derive(Clone)]
pub struct SqliteLineageStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLineageStore {
    /// Open (or create) a SQLite store at the given path
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())?;
        info!("Opened lineage database at {}", db_path.as_ref().display());
        Self::with_connection(conn)
    }

    /// Create an in-memory SQLite store (for testing)
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS document_entities (
                id TEXT PRIMARY KEY,
                document_type TEXT NOT NULL,
                document_name TEXT NOT NULL,
                description TEXT,
                file_size INTEGER,
                file_hash TEXT,
                parcel_id TEXT,
                uploaded_by TEXT,
                created_at INTEGER NOT NULL,
                status TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_documents_created
             ON document_entities(created_at)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS document_lineage_events (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                performed_by TEXT NOT NULL,
                details TEXT NOT NULL,
                confidence REAL,
                event_timestamp INTEGER NOT NULL,
                FOREIGN KEY (document_id) REFERENCES document_entities(id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_events_document
             ON document_lineage_events(document_id, event_timestamp)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS document_relationships (
                id TEXT PRIMARY KEY,
                source_document_id TEXT NOT NULL,
                target_document_id TEXT NOT NULL,
                relationship_type TEXT NOT NULL,
                notes TEXT,
                metadata TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                UNIQUE (source_document_id, target_document_id, relationship_type),
                FOREIGN KEY (source_document_id) REFERENCES document_entities(id),
                FOREIGN KEY (target_document_id) REFERENCES document_entities(id)
            )",
            [],
        )?;

        // Adjacency lookups in both directions
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_relationships_source
             ON document_relationships(source_document_id)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_relationships_target
             ON document_relationships(target_document_id)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS document_processing_stages (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                stage_name TEXT NOT NULL,
                status TEXT NOT NULL,
                progress INTEGER NOT NULL,
                processor_name TEXT,
                processor_version TEXT,
                started_at INTEGER NOT NULL,
                completed_at INTEGER,
                result TEXT,
                FOREIGN KEY (document_id) REFERENCES document_entities(id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_stages_document
             ON document_processing_stages(document_id, started_at)",
            [],
        )?;

        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Column Conversions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn conversion_error(
    idx: usize,
    ty: Type,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(err))
}

fn closed_set<T: FromStr<Err = LineageError>>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, Type::Text, e))
}

fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let micros: i64 = row.get(idx)?;
    DateTime::from_timestamp_micros(micros).ok_or_else(|| {
        conversion_error(
            idx,
            Type::Integer,
            LineageError::serialization(format!("Timestamp out of range: {}", micros)),
        )
    })
}

fn optional_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let micros: Option<i64> = row.get(idx)?;
    micros
        .map(|_| timestamp(row, idx))
        .transpose()
}

fn metadata(row: &Row<'_>, idx: usize) -> rusqlite::Result<Metadata> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, Type::Text, e))
}

fn optional_metadata(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Metadata>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| serde_json::from_str(&s).map_err(|e| conversion_error(idx, Type::Text, e)))
        .transpose()
}

fn row_to_document(row: &Row<'_>) -> rusqlite::Result<DocumentEntity> {
    Ok(DocumentEntity {
        id: row.get(0)?,
        document_type: closed_set(row, 1)?,
        document_name: row.get(2)?,
        description: row.get(3)?,
        file_size: row.get::<_, Option<i64>>(4)?.map(|n| n as u64),
        file_hash: row.get(5)?,
        parcel_id: row.get(6)?,
        uploaded_by: row.get(7)?,
        created_at: timestamp(row, 8)?,
        status: closed_set(row, 9)?,
    })
}

fn row_to_event(row: &Row<'_>) -> rusqlite::Result<DocumentLineageEvent> {
    Ok(DocumentLineageEvent {
        id: row.get(0)?,
        document_id: row.get(1)?,
        event_type: closed_set(row, 2)?,
        performed_by: row.get(3)?,
        details: metadata(row, 4)?,
        confidence: row.get(5)?,
        event_timestamp: timestamp(row, 6)?,
    })
}

fn row_to_relationship(row: &Row<'_>) -> rusqlite::Result<DocumentRelationship> {
    Ok(DocumentRelationship {
        id: row.get(0)?,
        source_document_id: row.get(1)?,
        target_document_id: row.get(2)?,
        relationship_type: closed_set(row, 3)?,
        notes: row.get(4)?,
        metadata: metadata(row, 5)?,
        created_at: timestamp(row, 6)?,
    })
}

fn row_to_stage(row: &Row<'_>) -> rusqlite::Result<DocumentProcessingStage> {
    Ok(DocumentProcessingStage {
        id: row.get(0)?,
        document_id: row.get(1)?,
        stage_name: closed_set(row, 2)?,
        status: closed_set(row, 3)?,
        progress: row.get(4)?,
        processor_name: row.get(5)?,
        processor_version: row.get(6)?,
        started_at: timestamp(row, 7)?,
        completed_at: optional_timestamp(row, 8)?,
        result: optional_metadata(row, 9)?,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Queries (shared by the trait impl and the read view)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn document_exists(conn: &Connection, document_id: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM document_entities WHERE id = ?1",
            params![document_id],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn require_document(conn: &Connection, field: &str, document_id: &str) -> Result<()> {
    if document_exists(conn, document_id)? {
        Ok(())
    } else {
        Err(LineageError::invalid_reference(field, document_id))
    }
}

fn fetch_document(conn: &Connection, document_id: &str) -> Result<Option<DocumentEntity>> {
    let sql = format!("SELECT {} FROM document_entities WHERE id = ?1", DOCUMENT_COLUMNS);
    Ok(conn
        .query_row(&sql, params![document_id], row_to_document)
        .optional()?)
}

fn fetch_event(conn: &Connection, event_id: &str) -> Result<Option<DocumentLineageEvent>> {
    let sql = format!(
        "SELECT {} FROM document_lineage_events WHERE id = ?1",
        EVENT_COLUMNS
    );
    Ok(conn.query_row(&sql, params![event_id], row_to_event).optional()?)
}

fn fetch_events(conn: &Connection, document_id: &str) -> Result<Vec<DocumentLineageEvent>> {
    let sql = format!(
        "SELECT {} FROM document_lineage_events WHERE document_id = ?1
         ORDER BY event_timestamp ASC, rowid ASC",
        EVENT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let events = stmt
        .query_map(params![document_id], row_to_event)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(events)
}

fn fetch_relationship(
    conn: &Connection,
    relationship_id: &str,
) -> Result<Option<DocumentRelationship>> {
    let sql = format!(
        "SELECT {} FROM document_relationships WHERE id = ?1",
        RELATIONSHIP_COLUMNS
    );
    Ok(conn
        .query_row(&sql, params![relationship_id], row_to_relationship)
        .optional()?)
}

/// Relationships matching `predicate` (which binds `?1` to `document_id`)
fn fetch_relationships(
    conn: &Connection,
    predicate: &str,
    document_id: &str,
) -> Result<Vec<DocumentRelationship>> {
    let sql = format!(
        "SELECT {} FROM document_relationships WHERE {}
         ORDER BY created_at ASC, rowid ASC",
        RELATIONSHIP_COLUMNS, predicate
    );
    let mut stmt = conn.prepare(&sql)?;
    let rels = stmt
        .query_map(params![document_id], row_to_relationship)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rels)
}

fn fetch_stage(conn: &Connection, stage_id: &str) -> Result<Option<DocumentProcessingStage>> {
    let sql = format!(
        "SELECT {} FROM document_processing_stages WHERE id = ?1",
        STAGE_COLUMNS
    );
    Ok(conn.query_row(&sql, params![stage_id], row_to_stage).optional()?)
}

fn fetch_stages(conn: &Connection, document_id: &str) -> Result<Vec<DocumentProcessingStage>> {
    let sql = format!(
        "SELECT {} FROM document_processing_stages WHERE document_id = ?1
         ORDER BY started_at ASC, rowid ASC",
        STAGE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let stages = stmt
        .query_map(params![document_id], row_to_stage)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(stages)
}

fn write_event(conn: &Connection, event: &DocumentLineageEvent) -> Result<()> {
    conn.execute(
        "INSERT INTO document_lineage_events
         (id, document_id, event_type, performed_by, details, confidence, event_timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            &event.id,
            &event.document_id,
            event.event_type.as_str(),
            &event.performed_by,
            serde_json::to_string(&event.details)?,
            event.confidence,
            event.event_timestamp.timestamp_micros(),
        ],
    )?;
    Ok(())
}

fn count(conn: &Connection, table: &str) -> Result<usize> {
    let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
        row.get(0)
    })?;
    Ok(n as usize)
}

#[async_trait]
impl LineageStore for SqliteLineageStore {
    async fn insert_document(&self, doc: &DocumentEntity) -> Result<()> {
        let conn = self.conn.lock();
        if document_exists(&conn, &doc.id)? {
            return Err(LineageError::duplicate(format!(
                "Document already exists: {}",
                doc.id
            )));
        }
        conn.execute(
            "INSERT INTO document_entities
             (id, document_type, document_name, description, file_size, file_hash,
              parcel_id, uploaded_by, created_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                &doc.id,
                doc.document_type.as_str(),
                &doc.document_name,
                &doc.description,
                doc.file_size.map(|n| n as i64),
                &doc.file_hash,
                &doc.parcel_id,
                &doc.uploaded_by,
                doc.created_at.timestamp_micros(),
                doc.status.as_str(),
            ],
        )?;
        Ok(())
    }

    async fn get_document(&self, document_id: &str) -> Result<Option<DocumentEntity>> {
        let conn = self.conn.lock();
        fetch_document(&conn, document_id)
    }

    async fn update_document(
        &self,
        document_id: &str,
        patch: &DocumentPatch,
    ) -> Result<DocumentEntity> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let mut doc = fetch_document(&tx, document_id)?
            .ok_or_else(|| LineageError::not_found("Document", document_id))?;
        doc.apply_patch(patch)?;

        tx.execute(
            "UPDATE document_entities
             SET document_type = ?2, document_name = ?3, description = ?4, file_size = ?5,
                 file_hash = ?6, parcel_id = ?7, status = ?8
             WHERE id = ?1",
            params![
                &doc.id,
                doc.document_type.as_str(),
                &doc.document_name,
                &doc.description,
                doc.file_size.map(|n| n as i64),
                &doc.file_hash,
                &doc.parcel_id,
                doc.status.as_str(),
            ],
        )?;
        tx.commit()?;
        Ok(doc)
    }

    async fn list_documents(&self, filter: &DocumentFilter) -> Result<Vec<DocumentEntity>> {
        let conn = self.conn.lock();

        let mut clauses = Vec::new();
        let mut values: Vec<String> = Vec::new();
        if let Some(document_type) = filter.document_type {
            values.push(document_type.as_str().to_string());
            clauses.push(format!("document_type = ?{}", values.len()));
        }
        if let Some(parcel_id) = &filter.parcel_id {
            values.push(parcel_id.clone());
            clauses.push(format!("parcel_id = ?{}", values.len()));
        }
        if let Some(status) = filter.status {
            values.push(status.as_str().to_string());
            clauses.push(format!("status = ?{}", values.len()));
        }

        let mut sql = format!("SELECT {} FROM document_entities", DOCUMENT_COLUMNS);
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at DESC, rowid DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let mut stmt = conn.prepare(&sql)?;
        let docs = stmt
            .query_map(params_from_iter(values.iter()), row_to_document)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(docs)
    }

    async fn insert_event(&self, event: &DocumentLineageEvent) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        require_document(&tx, "documentId", &event.document_id)?;
        write_event(&tx, event)?;
        tx.commit()?;
        Ok(())
    }

    async fn get_event(&self, event_id: &str) -> Result<Option<DocumentLineageEvent>> {
        let conn = self.conn.lock();
        fetch_event(&conn, event_id)
    }

    async fn get_events_for_document(
        &self,
        document_id: &str,
    ) -> Result<Vec<DocumentLineageEvent>> {
        let conn = self.conn.lock();
        fetch_events(&conn, document_id)
    }

    async fn insert_relationship(&self, rel: &DocumentRelationship) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        require_document(&tx, "sourceDocumentId", &rel.source_document_id)?;
        require_document(&tx, "targetDocumentId", &rel.target_document_id)?;

        let existing = tx
            .query_row(
                "SELECT id FROM document_relationships
                 WHERE source_document_id = ?1 AND target_document_id = ?2
                   AND relationship_type = ?3",
                params![
                    &rel.source_document_id,
                    &rel.target_document_id,
                    rel.relationship_type.as_str()
                ],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        if let Some(existing_id) = existing {
            return Err(LineageError::duplicate(format!(
                "Relationship {} -> {} ({}) already exists as {}",
                rel.source_document_id, rel.target_document_id, rel.relationship_type, existing_id
            )));
        }

        tx.execute(
            "INSERT INTO document_relationships
             (id, source_document_id, target_document_id, relationship_type, notes, metadata,
              created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                &rel.id,
                &rel.source_document_id,
                &rel.target_document_id,
                rel.relationship_type.as_str(),
                &rel.notes,
                serde_json::to_string(&rel.metadata)?,
                rel.created_at.timestamp_micros(),
            ],
        )?;
        tx.commit()?;
        debug!("Inserted relationship {}", rel.id);
        Ok(())
    }

    async fn get_relationship(
        &self,
        relationship_id: &str,
    ) -> Result<Option<DocumentRelationship>> {
        let conn = self.conn.lock();
        fetch_relationship(&conn, relationship_id)
    }

    async fn get_relationships_for_document(
        &self,
        document_id: &str,
        relationship_type: Option<RelationshipType>,
    ) -> Result<Vec<DocumentRelationship>> {
        let conn = self.conn.lock();
        let mut rels = fetch_relationships(
            &conn,
            "source_document_id = ?1 OR target_document_id = ?1",
            document_id,
        )?;
        if let Some(kind) = relationship_type {
            rels.retain(|r| r.relationship_type == kind);
        }
        Ok(rels)
    }

    async fn insert_processing_stage(
        &self,
        stage: &DocumentProcessingStage,
        audit_event: Option<&DocumentLineageEvent>,
    ) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        require_document(&tx, "documentId", &stage.document_id)?;

        tx.execute(
            "INSERT INTO document_processing_stages
             (id, document_id, stage_name, status, progress, processor_name, processor_version,
              started_at, completed_at, result)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                &stage.id,
                &stage.document_id,
                stage.stage_name.as_str(),
                stage.status.as_str(),
                stage.progress,
                &stage.processor_name,
                &stage.processor_version,
                stage.started_at.timestamp_micros(),
                stage.completed_at.map(|t| t.timestamp_micros()),
                stage
                    .result
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
            ],
        )?;

        if let Some(event) = audit_event {
            require_document(&tx, "documentId", &event.document_id)?;
            write_event(&tx, event)?;
        }

        // Dropping `tx` on any error above rolls back both inserts
        tx.commit()?;
        Ok(())
    }

    async fn get_processing_stage(
        &self,
        stage_id: &str,
    ) -> Result<Option<DocumentProcessingStage>> {
        let conn = self.conn.lock();
        fetch_stage(&conn, stage_id)
    }

    async fn get_processing_stages_for_document(
        &self,
        document_id: &str,
    ) -> Result<Vec<DocumentProcessingStage>> {
        let conn = self.conn.lock();
        fetch_stages(&conn, document_id)
    }

    async fn update_processing_stage(
        &self,
        stage_id: &str,
        update: &StageUpdate,
        now: DateTime<Utc>,
    ) -> Result<DocumentProcessingStage> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let mut stage = fetch_stage(&tx, stage_id)?
            .ok_or_else(|| LineageError::not_found("Processing stage", stage_id))?;
        stage.apply_update(update, now)?;

        tx.execute(
            "UPDATE document_processing_stages
             SET status = ?2, progress = ?3, completed_at = ?4, result = ?5
             WHERE id = ?1",
            params![
                &stage.id,
                stage.status.as_str(),
                stage.progress,
                stage.completed_at.map(|t| t.timestamp_micros()),
                stage
                    .result
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
            ],
        )?;
        tx.commit()?;
        Ok(stage)
    }

    fn read_view(&self) -> Result<Box<dyn GraphSource + '_>> {
        Ok(Box::new(SqliteView {
            conn: self.conn.lock(),
        }))
    }

    async fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn.lock();
        Ok(StoreStats {
            documents: count(&conn, "document_entities")?,
            events: count(&conn, "document_lineage_events")?,
            relationships: count(&conn, "document_relationships")?,
            processing_stages: count(&conn, "document_processing_stages")?,
        })
    }
}

/// Read view holding the connection mutex
struct SqliteView<'a> {
    conn: MutexGuard<'a, Connection>,
}

impl GraphSource for SqliteView<'_> {
    fn document(&self, document_id: &str) -> Result<Option<DocumentEntity>> {
        fetch_document(&self.conn, document_id)
    }

    fn events_for(&self, document_id: &str) -> Result<Vec<DocumentLineageEvent>> {
        fetch_events(&self.conn, document_id)
    }

    fn stages_for(&self, document_id: &str) -> Result<Vec<DocumentProcessingStage>> {
        fetch_stages(&self.conn, document_id)
    }

    fn relationships_from(&self, document_id: &str) -> Result<Vec<DocumentRelationship>> {
        fetch_relationships(&self.conn, "source_document_id = ?1", document_id)
    }

    fn relationships_to(&self, document_id: &str) -> Result<Vec<DocumentRelationship>> {
        fetch_relationships(&self.conn, "target_document_id = ?1", document_id)
    }
}
