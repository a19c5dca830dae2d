//! Document Lineage - provenance tracking for recorded property documents
//!
//! Models documents, the events applied to them, typed directed
//! relationships between them and their processing stages, then answers
//! graph queries over that data:
//!
//! - **Lineage**: documents reachable along outgoing relationships
//! - **Provenance**: documents reachable along incoming relationships
//! - **Combined graphs**: the union of shallow graphs around several roots
//!
//! ## Layout
//!
//! ```text
//! application/        LineageService (composed entry point)
//! features/storage/   records, LineageStore port, InMemory + SQLite backends
//! features/lineage/   GraphBuilder, GraphAggregator, graph output types
//! config/             LineageConfig (YAML v1)
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use doc_lineage::{LineageService, NewDocument, NewRelationship};
//! use doc_lineage::features::storage::{DocumentType, RelationshipType};
//!
//! let service = LineageService::in_memory()?;
//! let deed = service.create_document(NewDocument::new(DocumentType::Deed, "deed.pdf")).await?;
//! let survey = service.create_document(NewDocument::new(DocumentType::Survey, "survey.pdf")).await?;
//! service
//!     .create_relationship(NewRelationship::new(&survey.id, &deed.id, RelationshipType::DerivedFrom))
//!     .await?;
//!
//! let provenance = service.get_provenance(&deed.id, Some(2))?;
//! ```

pub mod application;
pub mod config;
pub mod error;
pub mod features;

pub use application::LineageService;
pub use config::LineageConfig;
pub use error::{ErrorKind, LineageError, Result};

pub use features::lineage::{
    CombinedGraph, GraphEdge, GraphNode, GraphView, LineageGraph, TraversalBudget,
    TraversalDirection,
};
pub use features::storage::{
    DocumentEntity, DocumentFilter, DocumentLineageEvent, DocumentPatch, DocumentProcessingStage,
    DocumentRelationship, LineageStore, NewDocument, NewLineageEvent, NewProcessingStage,
    NewRelationship, StageUpdate,
};
