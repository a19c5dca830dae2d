//! Lineage Domain Layer
//!
//! Graph output types and traversal limits

pub mod budget;
pub mod graph;

pub use budget::TraversalBudget;
pub use graph::{
    CombinedGraph, CombinedGraphMetadata, EdgeKind, GraphEdge, GraphMetadata, GraphNode,
    GraphParts, GraphView, LineageGraph, NodeData, TraversalDirection,
};
