//! Lineage Infrastructure Layer
//!
//! Traversal over a `GraphSource` read view

pub mod aggregator;
pub mod graph_builder;

pub use aggregator::{GraphAggregator, MissingRootPolicy};
pub use graph_builder::GraphBuilder;
