//! Storage Ports (Trait Interfaces)
//!
//! Port/Adapter pattern for backend flexibility:
//! - Testing / ephemeral: InMemory
//! - Persistent: SQLite
//!
//! Every mutating call is one atomic unit: the backend performs its
//! reference checks and the write inside the same critical section.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::models::{
    DocumentEntity, DocumentFilter, DocumentLineageEvent, DocumentPatch,
    DocumentProcessingStage, DocumentRelationship, RelationshipType, StageUpdate,
};
use crate::error::Result;

/// Lineage Store Port (Primary Interface)
///
/// All storage backends must implement this trait
#[async_trait]
pub trait LineageStore: Send + Sync {
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Documents
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Insert a new document
    async fn insert_document(&self, doc: &DocumentEntity) -> Result<()>;

    /// Get document by ID
    async fn get_document(&self, document_id: &str) -> Result<Option<DocumentEntity>>;

    /// Merge a patch into a stored document
    ///
    /// Errors with `NotFound` for an unknown ID; the patch is applied with
    /// `DocumentEntity::apply_patch` while the record is locked.
    async fn update_document(
        &self,
        document_id: &str,
        patch: &DocumentPatch,
    ) -> Result<DocumentEntity>;

    /// List documents, newest first
    async fn list_documents(&self, filter: &DocumentFilter) -> Result<Vec<DocumentEntity>>;

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Events
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Append an event; `InvalidReference` if its document is unknown
    async fn insert_event(&self, event: &DocumentLineageEvent) -> Result<()>;

    async fn get_event(&self, event_id: &str) -> Result<Option<DocumentLineageEvent>>;

    /// Events for a document, oldest first (ties in insertion order)
    async fn get_events_for_document(&self, document_id: &str)
        -> Result<Vec<DocumentLineageEvent>>;

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Relationships
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Insert a directed edge
    ///
    /// `InvalidReference` if either endpoint is unknown, `Duplicate` if the
    /// (source, target, type) triple already exists.
    async fn insert_relationship(&self, rel: &DocumentRelationship) -> Result<()>;

    async fn get_relationship(&self, relationship_id: &str)
        -> Result<Option<DocumentRelationship>>;

    /// Relationships where the document is source or target, by `created_at`
    async fn get_relationships_for_document(
        &self,
        document_id: &str,
        relationship_type: Option<RelationshipType>,
    ) -> Result<Vec<DocumentRelationship>>;

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Processing Stages
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Insert a stage, plus its audit event when given, as one unit
    async fn insert_processing_stage(
        &self,
        stage: &DocumentProcessingStage,
        audit_event: Option<&DocumentLineageEvent>,
    ) -> Result<()>;

    async fn get_processing_stage(&self, stage_id: &str)
        -> Result<Option<DocumentProcessingStage>>;

    /// Stages for a document, by `started_at`
    async fn get_processing_stages_for_document(
        &self,
        document_id: &str,
    ) -> Result<Vec<DocumentProcessingStage>>;

    /// Apply a status update while the stage is locked
    async fn update_processing_stage(
        &self,
        stage_id: &str,
        update: &StageUpdate,
        now: DateTime<Utc>,
    ) -> Result<DocumentProcessingStage>;

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Snapshot Reads
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Consistent read view for graph traversal
    ///
    /// Writers are blocked until the returned view is dropped.
    fn read_view(&self) -> Result<Box<dyn GraphSource + '_>>;

    /// Record counts
    async fn stats(&self) -> Result<StoreStats>;
}

/// Synchronous read access used by graph traversal
///
/// Neighbor lookups are served from the relationship index, never by
/// scanning every relationship.
pub trait GraphSource {
    fn document(&self, document_id: &str) -> Result<Option<DocumentEntity>>;

    fn events_for(&self, document_id: &str) -> Result<Vec<DocumentLineageEvent>>;

    fn stages_for(&self, document_id: &str) -> Result<Vec<DocumentProcessingStage>>;

    /// Relationships with `document_id` as source
    fn relationships_from(&self, document_id: &str) -> Result<Vec<DocumentRelationship>>;

    /// Relationships with `document_id` as target
    fn relationships_to(&self, document_id: &str) -> Result<Vec<DocumentRelationship>>;
}

/// Storage Statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub documents: usize,
    pub events: usize,
    pub relationships: usize,
    pub processing_stages: usize,
}
