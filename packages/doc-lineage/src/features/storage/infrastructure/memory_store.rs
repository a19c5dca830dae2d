//! In-Memory Lineage Store
//!
//! HashMap-based backend. The whole state sits behind one `RwLock`, so every
//! write is serialized and a read view sees a single consistent snapshot.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{RwLock, RwLockReadGuard};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::relationship_index::RelationshipIndex;
use crate::error::{LineageError, Result};
use crate::features::storage::domain::{
    DocumentEntity, DocumentFilter, DocumentLineageEvent, DocumentPatch, DocumentProcessingStage,
    DocumentRelationship, GraphSource, LineageStore, RelationshipType, StageUpdate, StoreStats,
};

#[derive(Debug, Default)]
struct MemoryState {
    documents: HashMap<String, DocumentEntity>,
    /// Insertion order, used to break `created_at` ties
    document_order: Vec<String>,

    events: HashMap<String, DocumentLineageEvent>,
    events_by_document: HashMap<String, Vec<String>>,

    relationships: HashMap<String, DocumentRelationship>,
    /// Insertion sequence per relationship id, used to break `created_at` ties
    relationship_seq: HashMap<String, u64>,
    relationship_index: RelationshipIndex,

    stages: HashMap<String, DocumentProcessingStage>,
    stages_by_document: HashMap<String, Vec<String>>,
}

impl MemoryState {
    fn require_document(&self, field: &str, document_id: &str) -> Result<()> {
        if self.documents.contains_key(document_id) {
            Ok(())
        } else {
            Err(LineageError::invalid_reference(field, document_id))
        }
    }

    fn push_event(&mut self, event: &DocumentLineageEvent) {
        self.events_by_document
            .entry(event.document_id.clone())
            .or_default()
            .push(event.id.clone());
        self.events.insert(event.id.clone(), event.clone());
    }

    fn events_for(&self, document_id: &str) -> Vec<DocumentLineageEvent> {
        let mut events: Vec<DocumentLineageEvent> = self
            .events_by_document
            .get(document_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.events.get(id).cloned())
            .collect();
        // Stable sort: equal timestamps keep insertion order
        events.sort_by_key(|e| e.event_timestamp);
        events
    }

    fn stages_for(&self, document_id: &str) -> Vec<DocumentProcessingStage> {
        let mut stages: Vec<DocumentProcessingStage> = self
            .stages_by_document
            .get(document_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.stages.get(id).cloned())
            .collect();
        stages.sort_by_key(|s| s.started_at);
        stages
    }

    fn resolve(&self, ids: &[String]) -> Vec<DocumentRelationship> {
        let mut rels: Vec<DocumentRelationship> = ids
            .iter()
            .filter_map(|id| self.relationships.get(id).cloned())
            .collect();
        self.sort_relationships(&mut rels);
        rels
    }

    fn sort_relationships(&self, rels: &mut [DocumentRelationship]) {
        rels.sort_by_key(|r| {
            (
                r.created_at,
                self.relationship_seq.get(&r.id).copied().unwrap_or(u64::MAX),
            )
        });
    }
}

/// In-memory `LineageStore`
#[derive(Clone, Default)]
pub struct InMemoryLineageStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryLineageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LineageStore for InMemoryLineageStore {
    async fn insert_document(&self, doc: &DocumentEntity) -> Result<()> {
        let mut state = self.state.write();
        if state.documents.contains_key(&doc.id) {
            return Err(LineageError::duplicate(format!(
                "Document already exists: {}",
                doc.id
            )));
        }
        state.document_order.push(doc.id.clone());
        state.documents.insert(doc.id.clone(), doc.clone());
        Ok(())
    }

    async fn get_document(&self, document_id: &str) -> Result<Option<DocumentEntity>> {
        Ok(self.state.read().documents.get(document_id).cloned())
    }

    async fn update_document(
        &self,
        document_id: &str,
        patch: &DocumentPatch,
    ) -> Result<DocumentEntity> {
        let mut state = self.state.write();
        let doc = state
            .documents
            .get_mut(document_id)
            .ok_or_else(|| LineageError::not_found("Document", document_id))?;
        doc.apply_patch(patch)?;
        Ok(doc.clone())
    }

    async fn list_documents(&self, filter: &DocumentFilter) -> Result<Vec<DocumentEntity>> {
        let state = self.state.read();
        // Reverse insertion order, then a stable sort by created_at descending
        let mut docs: Vec<DocumentEntity> = state
            .document_order
            .iter()
            .rev()
            .filter_map(|id| state.documents.get(id))
            .filter(|doc| filter.matches(doc))
            .cloned()
            .collect();
        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            docs.truncate(limit);
        }
        Ok(docs)
    }

    async fn insert_event(&self, event: &DocumentLineageEvent) -> Result<()> {
        let mut state = self.state.write();
        state.require_document("documentId", &event.document_id)?;
        state.push_event(event);
        Ok(())
    }

    async fn get_event(&self, event_id: &str) -> Result<Option<DocumentLineageEvent>> {
        Ok(self.state.read().events.get(event_id).cloned())
    }

    async fn get_events_for_document(
        &self,
        document_id: &str,
    ) -> Result<Vec<DocumentLineageEvent>> {
        Ok(self.state.read().events_for(document_id))
    }

    async fn insert_relationship(&self, rel: &DocumentRelationship) -> Result<()> {
        let mut state = self.state.write();
        state.require_document("sourceDocumentId", &rel.source_document_id)?;
        state.require_document("targetDocumentId", &rel.target_document_id)?;

        let duplicate = state
            .relationship_index
            .outgoing(&rel.source_document_id)
            .iter()
            .filter_map(|id| state.relationships.get(id))
            .any(|existing| existing.same_triple(rel));
        if duplicate {
            return Err(LineageError::duplicate(format!(
                "Relationship {} -> {} ({}) already exists",
                rel.source_document_id, rel.target_document_id, rel.relationship_type
            )));
        }

        let seq = state.relationship_seq.len() as u64;
        state.relationship_seq.insert(rel.id.clone(), seq);
        state.relationship_index.insert(rel);
        state.relationships.insert(rel.id.clone(), rel.clone());
        debug!(
            "Indexed relationship {} ({} edges)",
            rel.id,
            state.relationship_index.edge_count()
        );
        Ok(())
    }

    async fn get_relationship(
        &self,
        relationship_id: &str,
    ) -> Result<Option<DocumentRelationship>> {
        Ok(self.state.read().relationships.get(relationship_id).cloned())
    }

    async fn get_relationships_for_document(
        &self,
        document_id: &str,
        relationship_type: Option<RelationshipType>,
    ) -> Result<Vec<DocumentRelationship>> {
        let state = self.state.read();
        let mut rels = state.resolve(state.relationship_index.outgoing(document_id));
        rels.extend(state.resolve(state.relationship_index.incoming(document_id)));
        if let Some(kind) = relationship_type {
            rels.retain(|r| r.relationship_type == kind);
        }
        state.sort_relationships(&mut rels);
        Ok(rels)
    }

    async fn insert_processing_stage(
        &self,
        stage: &DocumentProcessingStage,
        audit_event: Option<&DocumentLineageEvent>,
    ) -> Result<()> {
        let mut state = self.state.write();
        state.require_document("documentId", &stage.document_id)?;
        if let Some(event) = audit_event {
            state.require_document("documentId", &event.document_id)?;
        }

        state
            .stages_by_document
            .entry(stage.document_id.clone())
            .or_default()
            .push(stage.id.clone());
        state.stages.insert(stage.id.clone(), stage.clone());
        if let Some(event) = audit_event {
            state.push_event(event);
        }
        Ok(())
    }

    async fn get_processing_stage(
        &self,
        stage_id: &str,
    ) -> Result<Option<DocumentProcessingStage>> {
        Ok(self.state.read().stages.get(stage_id).cloned())
    }

    async fn get_processing_stages_for_document(
        &self,
        document_id: &str,
    ) -> Result<Vec<DocumentProcessingStage>> {
        Ok(self.state.read().stages_for(document_id))
    }

    async fn update_processing_stage(
        &self,
        stage_id: &str,
        update: &StageUpdate,
        now: DateTime<Utc>,
    ) -> Result<DocumentProcessingStage> {
        let mut state = self.state.write();
        let stage = state
            .stages
            .get_mut(stage_id)
            .ok_or_else(|| LineageError::not_found("Processing stage", stage_id))?;
        stage.apply_update(update, now)?;
        Ok(stage.clone())
    }

    fn read_view(&self) -> Result<Box<dyn GraphSource + '_>> {
        Ok(Box::new(MemoryView {
            state: self.state.read(),
        }))
    }

    async fn stats(&self) -> Result<StoreStats> {
        let state = self.state.read();
        Ok(StoreStats {
            documents: state.documents.len(),
            events: state.events.len(),
            relationships: state.relationships.len(),
            processing_stages: state.stages.len(),
        })
    }
}

/// Read view holding the store's read lock
struct MemoryView<'a> {
    state: RwLockReadGuard<'a, MemoryState>,
}

impl GraphSource for MemoryView<'_> {
    fn document(&self, document_id: &str) -> Result<Option<DocumentEntity>> {
        Ok(self.state.documents.get(document_id).cloned())
    }

    fn events_for(&self, document_id: &str) -> Result<Vec<DocumentLineageEvent>> {
        Ok(self.state.events_for(document_id))
    }

    fn stages_for(&self, document_id: &str) -> Result<Vec<DocumentProcessingStage>> {
        Ok(self.state.stages_for(document_id))
    }

    fn relationships_from(&self, document_id: &str) -> Result<Vec<DocumentRelationship>> {
        Ok(self
            .state
            .resolve(self.state.relationship_index.outgoing(document_id)))
    }

    fn relationships_to(&self, document_id: &str) -> Result<Vec<DocumentRelationship>> {
        Ok(self
            .state
            .resolve(self.state.relationship_index.incoming(document_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::features::storage::domain::{
        DocumentType, EventType, NewDocument, NewLineageEvent, NewRelationship,
    };
    use chrono::Duration;

    async fn doc(store: &InMemoryLineageStore, name: &str) -> DocumentEntity {
        let doc =
            DocumentEntity::from_new(NewDocument::new(DocumentType::Deed, name), Utc::now())
                .unwrap();
        store.insert_document(&doc).await.unwrap();
        doc
    }

    #[tokio::test]
    async fn test_events_sorted_ascending() {
        let store = InMemoryLineageStore::new();
        let d = doc(&store, "deed").await;
        let t0 = Utc::now();

        for (offset, kind) in [(5, EventType::Edit), (1, EventType::Upload), (3, EventType::View)] {
            let event = DocumentLineageEvent::from_new(
                NewLineageEvent::new(d.id.clone(), kind, "clerk")
                    .at(t0 + Duration::seconds(offset)),
                t0,
            )
            .unwrap();
            store.insert_event(&event).await.unwrap();
        }

        let kinds: Vec<EventType> = store
            .get_events_for_document(&d.id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.event_type)
            .collect();
        assert_eq!(kinds, vec![EventType::Upload, EventType::View, EventType::Edit]);
    }

    #[tokio::test]
    async fn test_event_for_unknown_document() {
        let store = InMemoryLineageStore::new();
        let event = DocumentLineageEvent::from_new(
            NewLineageEvent::new("ghost", EventType::View, "clerk"),
            Utc::now(),
        )
        .unwrap();

        let err = store.insert_event(&event).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidReference);
        assert_eq!(store.stats().await.unwrap().events, 0);
    }

    #[tokio::test]
    async fn test_relationship_index_updated_on_insert() {
        let store = InMemoryLineageStore::new();
        let a = doc(&store, "a").await;
        let b = doc(&store, "b").await;
        let rel = DocumentRelationship::from_new(
            NewRelationship::new(a.id.clone(), b.id.clone(), RelationshipType::Supersedes),
            Utc::now(),
        )
        .unwrap();
        store.insert_relationship(&rel).await.unwrap();

        let view = store.read_view().unwrap();
        assert_eq!(view.relationships_from(&a.id).unwrap(), vec![rel.clone()]);
        assert_eq!(view.relationships_to(&b.id).unwrap(), vec![rel.clone()]);
        assert!(view.relationships_to(&a.id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_relationships_with_equal_timestamps_keep_insertion_order() {
        let store = InMemoryLineageStore::new();
        let hub = doc(&store, "hub").await;
        let a = doc(&store, "a").await;
        let b = doc(&store, "b").await;
        let c = doc(&store, "c").await;
        let now = Utc::now();

        // Mix outgoing and incoming edges around `hub`, all at one instant
        let mut inserted = Vec::new();
        for (source, target) in [(&c, &hub), (&hub, &a), (&b, &hub), (&hub, &c)] {
            let rel = DocumentRelationship::from_new(
                NewRelationship::new(source.id.clone(), target.id.clone(), RelationshipType::RefersTo),
                now,
            )
            .unwrap();
            store.insert_relationship(&rel).await.unwrap();
            inserted.push(rel.id);
        }

        let listed: Vec<String> = store
            .get_relationships_for_document(&hub.id, None)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(listed, inserted);

        let view = store.read_view().unwrap();
        let incoming: Vec<String> = view
            .relationships_to(&hub.id)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(incoming, vec![inserted[0].clone(), inserted[2].clone()]);
    }

    #[tokio::test]
    async fn test_duplicate_triple_rejected() {
        let store = InMemoryLineageStore::new();
        let a = doc(&store, "a").await;
        let b = doc(&store, "b").await;
        let new = NewRelationship::new(a.id.clone(), b.id.clone(), RelationshipType::RefersTo);

        let first = DocumentRelationship::from_new(new.clone(), Utc::now()).unwrap();
        store.insert_relationship(&first).await.unwrap();
        let second = DocumentRelationship::from_new(new, Utc::now()).unwrap();
        let err = store.insert_relationship(&second).await.unwrap_err();

        assert_eq!(err.kind, ErrorKind::Duplicate);
        assert_eq!(store.stats().await.unwrap().relationships, 1);
    }

    #[tokio::test]
    async fn test_list_documents_newest_first_with_ties() {
        let store = InMemoryLineageStore::new();
        let now = Utc::now();
        let mut ids = Vec::new();
        for name in ["first", "second", "third"] {
            let doc =
                DocumentEntity::from_new(NewDocument::new(DocumentType::Permit, name), now)
                    .unwrap();
            store.insert_document(&doc).await.unwrap();
            ids.push(doc.id);
        }

        let listed: Vec<String> = store
            .list_documents(&DocumentFilter::default())
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        ids.reverse();
        assert_eq!(listed, ids);
    }
}
