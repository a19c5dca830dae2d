//! Graph output types
//!
//! Nodes and edges are addressed by deterministic string ids derived from
//! record ids, so the same store state always yields the same id sets and
//! merging two graphs is a union by id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::error::{LineageError, Result};
use crate::features::storage::domain::{
    DocumentEntity, DocumentLineageEvent, DocumentProcessingStage, DocumentRelationship,
    RelationshipType,
};

/// Which relationships a traversal follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraversalDirection {
    /// Relationships where the document is the source (lineage)
    Outgoing,
    /// Relationships where the document is the target (provenance)
    Incoming,
    Both,
}

impl TraversalDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TraversalDirection::Outgoing => "outgoing",
            TraversalDirection::Incoming => "incoming",
            TraversalDirection::Both => "both",
        }
    }

    pub fn follows_outgoing(&self) -> bool {
        matches!(self, TraversalDirection::Outgoing | TraversalDirection::Both)
    }

    pub fn follows_incoming(&self) -> bool {
        matches!(self, TraversalDirection::Incoming | TraversalDirection::Both)
    }
}

impl fmt::Display for TraversalDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TraversalDirection {
    type Err = LineageError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "outgoing" | "lineage" => Ok(TraversalDirection::Outgoing),
            "incoming" | "provenance" => Ok(TraversalDirection::Incoming),
            "both" => Ok(TraversalDirection::Both),
            _ => Err(LineageError::validation(format!(
                "Invalid traversal direction: {}",
                s
            ))),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Nodes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Record carried by a node, tagged by node type
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum NodeData {
    Document(DocumentEntity),
    Event(DocumentLineageEvent),
    ProcessingStage(DocumentProcessingStage),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    pub id: String,
    #[serde(flatten)]
    pub data: NodeData,
}

impl GraphNode {
    pub fn document_node_id(document_id: &str) -> String {
        format!("document:{}", document_id)
    }

    pub fn event_node_id(event_id: &str) -> String {
        format!("event:{}", event_id)
    }

    pub fn stage_node_id(stage_id: &str) -> String {
        format!("stage:{}", stage_id)
    }

    pub fn document(doc: DocumentEntity) -> Self {
        Self {
            id: Self::document_node_id(&doc.id),
            data: NodeData::Document(doc),
        }
    }

    pub fn event(event: DocumentLineageEvent) -> Self {
        Self {
            id: Self::event_node_id(&event.id),
            data: NodeData::Event(event),
        }
    }

    pub fn stage(stage: DocumentProcessingStage) -> Self {
        Self {
            id: Self::stage_node_id(&stage.id),
            data: NodeData::ProcessingStage(stage),
        }
    }

    pub fn as_document(&self) -> Option<&DocumentEntity> {
        match &self.data {
            NodeData::Document(doc) => Some(doc),
            _ => None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Edges
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Edge type: a relationship type, `has_event` or `has_processing`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    Relationship(RelationshipType),
    HasEvent,
    HasProcessing,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Relationship(kind) => kind.as_str(),
            EdgeKind::HasEvent => "has_event",
            EdgeKind::HasProcessing => "has_processing",
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for EdgeKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Directed edge between two node ids
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub kind: EdgeKind,
    /// Present on relationship edges
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationship: Option<DocumentRelationship>,
}

impl GraphEdge {
    /// Edge for a stored relationship, always oriented source -> target
    pub fn relationship(rel: DocumentRelationship) -> Self {
        Self {
            id: format!("relationship:{}", rel.id),
            source: GraphNode::document_node_id(&rel.source_document_id),
            target: GraphNode::document_node_id(&rel.target_document_id),
            kind: EdgeKind::Relationship(rel.relationship_type),
            relationship: Some(rel),
        }
    }

    pub fn has_event(event: &DocumentLineageEvent) -> Self {
        Self {
            id: format!("has_event:{}", event.id),
            source: GraphNode::document_node_id(&event.document_id),
            target: GraphNode::event_node_id(&event.id),
            kind: EdgeKind::HasEvent,
            relationship: None,
        }
    }

    pub fn has_processing(stage: &DocumentProcessingStage) -> Self {
        Self {
            id: format!("has_processing:{}", stage.id),
            source: GraphNode::document_node_id(&stage.document_id),
            target: GraphNode::stage_node_id(&stage.id),
            kind: EdgeKind::HasProcessing,
            relationship: None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Graphs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Nodes and edges in first-seen order, deduplicated by id
#[derive(Debug, Clone, Default)]
pub struct GraphParts {
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
    node_ids: HashSet<String>,
    edge_ids: HashSet<String>,
}

impl GraphParts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if a node with this id is already present
    pub fn push_node(&mut self, node: GraphNode) -> bool {
        if !self.node_ids.insert(node.id.clone()) {
            return false;
        }
        self.nodes.push(node);
        true
    }

    pub fn push_edge(&mut self, edge: GraphEdge) -> bool {
        if !self.edge_ids.insert(edge.id.clone()) {
            return false;
        }
        self.edges.push(edge);
        true
    }

    pub fn contains_node(&self, node_id: &str) -> bool {
        self.node_ids.contains(node_id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn into_parts(self) -> (Vec<GraphNode>, Vec<GraphEdge>) {
        (self.nodes, self.edges)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphMetadata {
    pub root_document_id: String,
    pub depth: usize,
    pub direction: TraversalDirection,
    pub generated_at: DateTime<Utc>,
}

/// Graph reached from one root document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineageGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub metadata: GraphMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedGraphMetadata {
    pub root_document_ids: Vec<String>,
    /// Requested roots that do not exist
    pub skipped_document_ids: Vec<String>,
    pub depth: usize,
    pub generated_at: DateTime<Utc>,
}

/// Union of the graphs reached from several roots
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CombinedGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub metadata: CombinedGraphMetadata,
}

/// Id-set views shared by both graph shapes
pub trait GraphView {
    fn graph_nodes(&self) -> &[GraphNode];
    fn graph_edges(&self) -> &[GraphEdge];

    fn node_ids(&self) -> BTreeSet<&str> {
        self.graph_nodes().iter().map(|n| n.id.as_str()).collect()
    }

    fn edge_ids(&self) -> BTreeSet<&str> {
        self.graph_edges().iter().map(|e| e.id.as_str()).collect()
    }

    /// Ids of the document records among the nodes
    fn document_ids(&self) -> BTreeSet<&str> {
        self.graph_nodes()
            .iter()
            .filter_map(GraphNode::as_document)
            .map(|d| d.id.as_str())
            .collect()
    }

    fn has_document(&self, document_id: &str) -> bool {
        let node_id = GraphNode::document_node_id(document_id);
        self.graph_nodes().iter().any(|n| n.id == node_id)
    }

    /// Relationship edges only
    fn relationship_edges(&self) -> Vec<&GraphEdge> {
        self.graph_edges()
            .iter()
            .filter(|e| matches!(e.kind, EdgeKind::Relationship(_)))
            .collect()
    }
}

impl GraphView for LineageGraph {
    fn graph_nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    fn graph_edges(&self) -> &[GraphEdge] {
        &self.edges
    }
}

impl GraphView for CombinedGraph {
    fn graph_nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    fn graph_edges(&self) -> &[GraphEdge] {
        &self.edges
    }
}
