// Infrastructure: RelationshipIndex - O(1) neighbor lookups by document
//
// Maintained synchronously by the in-memory store on every relationship
// insert, under the same write guard as the relationship table itself.

use std::collections::HashMap;

use crate::features::storage::domain::DocumentRelationship;

/// Adjacency index over relationships
///
/// Provides O(1) access to:
/// - Outgoing relationship IDs by source document
/// - Incoming relationship IDs by target document
///
/// Lists keep insertion order, which is also `created_at` order.
#[derive(Debug, Default, Clone)]
pub struct RelationshipIndex {
    /// Forward: source_id -> Vec<relationship_id>
    outgoing: HashMap<String, Vec<String>>,

    /// Backward: target_id -> Vec<relationship_id>
    incoming: HashMap<String, Vec<String>>,

    edge_count: usize,
}

impl RelationshipIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a newly inserted relationship
    pub fn insert(&mut self, rel: &DocumentRelationship) {
        self.outgoing
            .entry(rel.source_document_id.clone())
            .or_default()
            .push(rel.id.clone());
        self.incoming
            .entry(rel.target_document_id.clone())
            .or_default()
            .push(rel.id.clone());
        self.edge_count += 1;
    }

    /// Relationship IDs with `document_id` as source (O(1))
    pub fn outgoing(&self, document_id: &str) -> &[String] {
        self.outgoing
            .get(document_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Relationship IDs with `document_id` as target (O(1))
    pub fn incoming(&self, document_id: &str) -> &[String] {
        self.incoming
            .get(document_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }
}
