//! Lineage Graphs
//!
//! Single-root traversal (`GraphBuilder`) and multi-root union
//! (`GraphAggregator`), both reading one consistent store view.

pub mod domain;
pub mod infrastructure;

pub use domain::*;
pub use infrastructure::{GraphAggregator, GraphBuilder, MissingRootPolicy};
