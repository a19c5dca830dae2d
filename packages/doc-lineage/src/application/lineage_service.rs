//! Lineage Service
//!
//! Composes a store, the metadata schemas and the graph limits into the
//! operations an HTTP layer exposes. The store is injected; nothing here is
//! global.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{LineageConfig, Validatable};
use crate::error::{ErrorKind, LineageError, Result};
use crate::features::lineage::{
    CombinedGraph, GraphAggregator, GraphBuilder, LineageGraph, MissingRootPolicy,
    TraversalBudget, TraversalDirection,
};
use crate::features::storage::{
    open_store, record_timestamp, DocumentEntity, DocumentFilter, DocumentLineageEvent,
    DocumentPatch, DocumentProcessingStage, DocumentRelationship, LineageStore, NewDocument,
    NewLineageEvent, NewProcessingStage, NewRelationship, RelationshipType, SchemaRegistry,
    StageStatus, StageUpdate, StoreStats,
};

/// Lineage Service
pub struct LineageService {
    store: Arc<dyn LineageStore>,
    config: LineageConfig,
    schemas: SchemaRegistry,
}

impl LineageService {
    /// Service over an existing store
    pub fn new(store: Arc<dyn LineageStore>, config: LineageConfig) -> Result<Self> {
        config.validate()?;
        let schemas = config.schema_registry()?;
        Ok(Self {
            store,
            config,
            schemas,
        })
    }

    /// Open the configured backend and wrap it
    pub fn from_config(config: LineageConfig) -> Result<Self> {
        config.validate()?;
        let store = open_store(&config.storage)?;
        Self::new(store, config)
    }

    /// In-memory service with default limits
    pub fn in_memory() -> Result<Self> {
        Self::from_config(LineageConfig::in_memory())
    }

    pub fn config(&self) -> &LineageConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn LineageStore> {
        &self.store
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Documents
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub async fn create_document(&self, data: NewDocument) -> Result<DocumentEntity> {
        let doc = DocumentEntity::from_new(data, record_timestamp())?;
        self.store.insert_document(&doc).await?;
        info!(
            "Created document {} ({}, {})",
            doc.id, doc.document_type, doc.document_name
        );
        Ok(doc)
    }

    /// Absence is `Ok(None)`
    pub async fn get_document_by_id(&self, document_id: &str) -> Result<Option<DocumentEntity>> {
        self.store.get_document(document_id).await
    }

    pub async fn update_document(
        &self,
        document_id: &str,
        patch: DocumentPatch,
    ) -> Result<DocumentEntity> {
        let result = self.store.update_document(document_id, &patch).await;
        if let Err(err) = &result {
            if err.is(ErrorKind::InvalidTransition) {
                warn!("Rejected status change for document {}: {}", document_id, err);
            }
        }
        result
    }

    /// Newest first
    pub async fn list_documents(&self, filter: DocumentFilter) -> Result<Vec<DocumentEntity>> {
        self.store.list_documents(&filter).await
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Events
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub async fn create_event(&self, data: NewLineageEvent) -> Result<DocumentLineageEvent> {
        self.schemas.validate_event(data.event_type, &data.details)?;
        let event = DocumentLineageEvent::from_new(data, record_timestamp())?;
        self.store.insert_event(&event).await?;
        info!(
            "Recorded {} event {} on document {}",
            event.event_type, event.id, event.document_id
        );
        Ok(event)
    }

    pub async fn get_event(&self, event_id: &str) -> Result<Option<DocumentLineageEvent>> {
        self.store.get_event(event_id).await
    }

    /// Oldest first
    pub async fn get_events_for_document(
        &self,
        document_id: &str,
    ) -> Result<Vec<DocumentLineageEvent>> {
        self.store.get_events_for_document(document_id).await
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Relationships
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub async fn create_relationship(&self, data: NewRelationship) -> Result<DocumentRelationship> {
        self.schemas
            .validate_relationship(data.relationship_type, &data.metadata)?;
        let rel = DocumentRelationship::from_new(data, record_timestamp())?;
        self.store.insert_relationship(&rel).await?;
        info!(
            "Created relationship {}: {} -[{}]-> {}",
            rel.id, rel.source_document_id, rel.relationship_type, rel.target_document_id
        );
        Ok(rel)
    }

    pub async fn get_relationship(
        &self,
        relationship_id: &str,
    ) -> Result<Option<DocumentRelationship>> {
        self.store.get_relationship(relationship_id).await
    }

    pub async fn get_relationships_for_document(
        &self,
        document_id: &str,
        relationship_type: Option<RelationshipType>,
    ) -> Result<Vec<DocumentRelationship>> {
        self.store
            .get_relationships_for_document(document_id, relationship_type)
            .await
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Processing Stages
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// New stage in `pending`; with `performed_by` set, its audit event is
    /// written in the same unit
    pub async fn create_processing_stage(
        &self,
        data: NewProcessingStage,
    ) -> Result<DocumentProcessingStage> {
        let stage = DocumentProcessingStage::from_new(&data, record_timestamp())?;
        let audit_event = data.audit_event(&stage)?;
        self.store
            .insert_processing_stage(&stage, audit_event.as_ref())
            .await?;
        info!(
            "Started {} stage {} on document {}",
            stage.stage_name, stage.id, stage.document_id
        );
        Ok(stage)
    }

    pub async fn get_processing_stage(
        &self,
        stage_id: &str,
    ) -> Result<Option<DocumentProcessingStage>> {
        self.store.get_processing_stage(stage_id).await
    }

    pub async fn get_processing_stages_for_document(
        &self,
        document_id: &str,
    ) -> Result<Vec<DocumentProcessingStage>> {
        self.store
            .get_processing_stages_for_document(document_id)
            .await
    }

    pub async fn update_processing_stage_status(
        &self,
        stage_id: &str,
        status: StageStatus,
        progress: Option<u8>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<DocumentProcessingStage> {
        let update = StageUpdate {
            status,
            progress,
            completed_at,
            result: None,
        };
        self.update_processing_stage(stage_id, update).await
    }

    /// Full update, including the stage result
    pub async fn update_processing_stage(
        &self,
        stage_id: &str,
        update: StageUpdate,
    ) -> Result<DocumentProcessingStage> {
        match self
            .store
            .update_processing_stage(stage_id, &update, record_timestamp())
            .await
        {
            Ok(stage) => {
                debug!(
                    "Stage {} is {} at {}%",
                    stage.id, stage.status, stage.progress
                );
                Ok(stage)
            }
            Err(err) => {
                if err.is(ErrorKind::InvalidTransition) {
                    warn!("Rejected update for stage {}: {}", stage_id, err);
                }
                Err(err)
            }
        }
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        self.store.stats().await
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Graphs
    //
    // Synchronous: each call holds one read view for its whole traversal,
    // so writers wait until it returns.
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Graph from one root, with the configured budget
    pub fn build_graph(
        &self,
        root_id: &str,
        depth: Option<usize>,
        direction: TraversalDirection,
    ) -> Result<LineageGraph> {
        let budget = TraversalBudget::from_config(&self.config.graph);
        self.build_graph_with(root_id, depth, direction, &budget)
    }

    /// Graph from one root under a caller-supplied budget
    pub fn build_graph_with(
        &self,
        root_id: &str,
        depth: Option<usize>,
        direction: TraversalDirection,
        budget: &TraversalBudget,
    ) -> Result<LineageGraph> {
        let depth = self.resolve_depth(depth)?;
        let view = self.store.read_view()?;
        GraphBuilder::new(view.as_ref(), budget).build(root_id, depth, direction)
    }

    /// Documents reachable along outgoing relationships
    pub fn get_lineage(&self, document_id: &str, depth: Option<usize>) -> Result<LineageGraph> {
        self.build_graph(document_id, depth, TraversalDirection::Outgoing)
    }

    /// Documents reachable along incoming relationships
    pub fn get_provenance(&self, document_id: &str, depth: Option<usize>) -> Result<LineageGraph> {
        self.build_graph(document_id, depth, TraversalDirection::Incoming)
    }

    /// Union of the shallow graphs of several roots
    pub fn build_combined_graph(&self, document_ids: &[String]) -> Result<CombinedGraph> {
        let budget = TraversalBudget::from_config(&self.config.graph);
        self.build_combined_graph_with(document_ids, &budget)
    }

    pub fn build_combined_graph_with(
        &self,
        document_ids: &[String],
        budget: &TraversalBudget,
    ) -> Result<CombinedGraph> {
        let policy = if self.config.graph.strict_combined_roots {
            MissingRootPolicy::Fail
        } else {
            MissingRootPolicy::Skip
        };
        let view = self.store.read_view()?;
        GraphAggregator::new(view.as_ref(), budget, self.config.graph.combined_depth, policy)
            .build(document_ids)
    }

    fn resolve_depth(&self, depth: Option<usize>) -> Result<usize> {
        let depth = depth.unwrap_or(self.config.graph.default_depth);
        if depth > self.config.graph.max_depth {
            return Err(LineageError::validation(format!(
                "depth {} exceeds the maximum of {}",
                depth, self.config.graph.max_depth
            )));
        }
        Ok(depth)
    }
}
