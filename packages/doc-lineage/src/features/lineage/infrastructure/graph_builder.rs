// Infrastructure: GraphBuilder - depth-bounded DFS from one root document
//
// Runs entirely against one GraphSource view, so the graph reflects a single
// store state. Neighbor lookups go through the relationship index.

use chrono::Utc;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, info};

use crate::error::{LineageError, Result};
use crate::features::lineage::domain::{
    GraphEdge, GraphMetadata, GraphNode, GraphParts, LineageGraph, TraversalBudget,
    TraversalDirection,
};
use crate::features::storage::domain::{DocumentEntity, GraphSource};

/// Graph Builder - single-root traversal
///
/// Implements:
/// - Depth limiting (depth 0 emits only the root and its own events/stages)
/// - Direction filter (outgoing, incoming, both)
/// - Cycle safety via a visited set
/// - Budget checks (deadline, cancellation, node limit)
pub struct GraphBuilder<'a> {
    source: &'a dyn GraphSource,
    budget: &'a TraversalBudget,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(source: &'a dyn GraphSource, budget: &'a TraversalBudget) -> Self {
        Self { source, budget }
    }

    /// Build the graph reachable from `root_id`
    ///
    /// Fails `NotFound` if the root does not exist.
    pub fn build(
        &self,
        root_id: &str,
        depth: usize,
        direction: TraversalDirection,
    ) -> Result<LineageGraph> {
        let start = Instant::now();
        let mut parts = GraphParts::new();
        self.collect(root_id, depth, direction, &mut parts)?;

        let (nodes, edges) = parts.into_parts();
        info!(
            "Built {} graph for {} (depth {}): {} nodes, {} edges in {}ms",
            direction,
            root_id,
            depth,
            nodes.len(),
            edges.len(),
            start.elapsed().as_millis()
        );

        Ok(LineageGraph {
            nodes,
            edges,
            metadata: GraphMetadata {
                root_document_id: root_id.to_string(),
                depth,
                direction,
                generated_at: Utc::now(),
            },
        })
    }

    /// Traverse from `root_id` into `parts`
    ///
    /// Each call keeps its own visited set; `parts` may already hold nodes
    /// from other roots, which are deduplicated by id.
    pub fn collect(
        &self,
        root_id: &str,
        depth: usize,
        direction: TraversalDirection,
        parts: &mut GraphParts,
    ) -> Result<()> {
        let root = self
            .source
            .document(root_id)?
            .ok_or_else(|| LineageError::not_found("Document", root_id))?;

        let mut visited = HashSet::new();
        self.visit(root, depth, direction, &mut visited, parts)?;

        // Emissions after the last visit may overshoot the node limit
        self.budget.check(parts.node_count())
    }

    fn visit(
        &self,
        doc: DocumentEntity,
        remaining: usize,
        direction: TraversalDirection,
        visited: &mut HashSet<String>,
        parts: &mut GraphParts,
    ) -> Result<()> {
        if !visited.insert(doc.id.clone()) {
            return Ok(());
        }
        self.budget.check(parts.node_count())?;

        let document_id = doc.id.clone();
        parts.push_node(GraphNode::document(doc));

        for event in self.source.events_for(&document_id)? {
            parts.push_edge(GraphEdge::has_event(&event));
            parts.push_node(GraphNode::event(event));
        }
        for stage in self.source.stages_for(&document_id)? {
            parts.push_edge(GraphEdge::has_processing(&stage));
            parts.push_node(GraphNode::stage(stage));
        }

        if remaining == 0 {
            return Ok(());
        }

        let mut relationships = Vec::new();
        if direction.follows_outgoing() {
            relationships.extend(self.source.relationships_from(&document_id)?);
        }
        if direction.follows_incoming() {
            relationships.extend(self.source.relationships_to(&document_id)?);
        }

        for rel in relationships {
            let neighbor_id = rel.other_end(&document_id).to_string();
            if !visited.contains(&neighbor_id) {
                match self.source.document(&neighbor_id)? {
                    Some(neighbor) => {
                        self.visit(neighbor, remaining - 1, direction, visited, parts)?
                    }
                    None => {
                        debug!(
                            "Relationship {} points at missing document {}",
                            rel.id, neighbor_id
                        );
                        continue;
                    }
                }
            }
            if parts.contains_node(&GraphNode::document_node_id(&neighbor_id)) {
                parts.push_edge(GraphEdge::relationship(rel));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::features::lineage::domain::GraphView;
    use crate::features::storage::domain::{
        DocumentLineageEvent, DocumentRelationship, DocumentType, EventType, LineageStore,
        NewDocument, NewLineageEvent, NewRelationship, RelationshipType,
    };
    use crate::features::storage::infrastructure::InMemoryLineageStore;
    use tokio_util::sync::CancellationToken;

    async fn doc(store: &InMemoryLineageStore, name: &str) -> String {
        let doc =
            DocumentEntity::from_new(NewDocument::new(DocumentType::Deed, name), Utc::now())
                .unwrap();
        store.insert_document(&doc).await.unwrap();
        doc.id
    }

    async fn link(store: &InMemoryLineageStore, source: &str, target: &str) -> String {
        let rel = DocumentRelationship::from_new(
            NewRelationship::new(source, target, RelationshipType::DerivedFrom),
            Utc::now(),
        )
        .unwrap();
        store.insert_relationship(&rel).await.unwrap();
        rel.id
    }

    #[tokio::test]
    async fn test_missing_root_is_not_found() {
        let store = InMemoryLineageStore::new();
        let view = store.read_view().unwrap();
        let budget = TraversalBudget::unlimited();

        let err = GraphBuilder::new(view.as_ref(), &budget)
            .build("ghost", 2, TraversalDirection::Both)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_depth_zero_emits_root_records_only() {
        let store = InMemoryLineageStore::new();
        let a = doc(&store, "a").await;
        let b = doc(&store, "b").await;
        link(&store, &a, &b).await;
        let event = DocumentLineageEvent::from_new(
            NewLineageEvent::new(a.clone(), EventType::Upload, "clerk"),
            Utc::now(),
        )
        .unwrap();
        store.insert_event(&event).await.unwrap();

        let view = store.read_view().unwrap();
        let budget = TraversalBudget::unlimited();
        let graph = GraphBuilder::new(view.as_ref(), &budget)
            .build(&a, 0, TraversalDirection::Both)
            .unwrap();

        assert_eq!(graph.nodes.len(), 2);
        assert!(graph.relationship_edges().is_empty());
        assert!(!graph.has_document(&b));
        // has_event is the root's own edge
        assert_eq!(graph.edges.len(), 1);
    }

    #[tokio::test]
    async fn test_cycle_terminates() {
        let store = InMemoryLineageStore::new();
        let a = doc(&store, "a").await;
        let b = doc(&store, "b").await;
        link(&store, &a, &b).await;
        link(&store, &b, &a).await;

        let view = store.read_view().unwrap();
        let budget = TraversalBudget::unlimited();
        let graph = GraphBuilder::new(view.as_ref(), &budget)
            .build(&a, 10, TraversalDirection::Outgoing)
            .unwrap();

        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.relationship_edges().len(), 2);
    }

    #[tokio::test]
    async fn test_edge_emitted_for_already_visited_neighbor() {
        // a -> b, a -> c, b -> c: c is reached through b first
        let store = InMemoryLineageStore::new();
        let a = doc(&store, "a").await;
        let b = doc(&store, "b").await;
        let c = doc(&store, "c").await;
        link(&store, &a, &b).await;
        link(&store, &a, &c).await;
        let bc = link(&store, &b, &c).await;

        let view = store.read_view().unwrap();
        let budget = TraversalBudget::unlimited();
        let graph = GraphBuilder::new(view.as_ref(), &budget)
            .build(&a, 2, TraversalDirection::Outgoing)
            .unwrap();

        assert_eq!(graph.document_ids().len(), 3);
        assert_eq!(graph.relationship_edges().len(), 3);
        assert!(graph.edge_ids().contains(format!("relationship:{}", bc).as_str()));
    }

    #[tokio::test]
    async fn test_depth_limits_expansion() {
        let store = InMemoryLineageStore::new();
        let a = doc(&store, "a").await;
        let b = doc(&store, "b").await;
        let c = doc(&store, "c").await;
        link(&store, &a, &b).await;
        link(&store, &b, &c).await;

        let view = store.read_view().unwrap();
        let budget = TraversalBudget::unlimited();
        let builder = GraphBuilder::new(view.as_ref(), &budget);

        let shallow = builder.build(&a, 1, TraversalDirection::Outgoing).unwrap();
        assert!(shallow.has_document(&b));
        assert!(!shallow.has_document(&c));

        let deep = builder.build(&a, 2, TraversalDirection::Outgoing).unwrap();
        assert!(deep.has_document(&c));
    }

    #[tokio::test]
    async fn test_budget_exhaustion_returns_error() {
        let store = InMemoryLineageStore::new();
        let a = doc(&store, "a").await;
        let b = doc(&store, "b").await;
        let c = doc(&store, "c").await;
        link(&store, &a, &b).await;
        link(&store, &a, &c).await;

        let view = store.read_view().unwrap();
        let limited = TraversalBudget::unlimited().with_max_nodes(2);
        let err = GraphBuilder::new(view.as_ref(), &limited)
            .build(&a, 1, TraversalDirection::Outgoing)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::DeadlineExceeded);

        let token = CancellationToken::new();
        token.cancel();
        let cancelled = TraversalBudget::unlimited().with_cancellation(token);
        let err = GraphBuilder::new(view.as_ref(), &cancelled)
            .build(&a, 1, TraversalDirection::Outgoing)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Cancelled);
    }
}
