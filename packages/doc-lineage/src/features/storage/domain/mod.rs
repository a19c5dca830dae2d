//! Storage Domain Layer
//!
//! Record models and the Port/Adapter boundary for storage backends

pub mod metadata;
pub mod models;
pub mod ports;

pub use metadata::{
    FieldSpec, Metadata, MetadataSchema, MetadataValue, ScalarKind, SchemaRegistry,
};
pub use models::{
    compute_file_hash, new_record_id, record_timestamp, DocumentEntity, DocumentFilter, DocumentId,
    DocumentLineageEvent, DocumentPatch, DocumentProcessingStage, DocumentRelationship,
    DocumentStatus, DocumentType, EventType, NewDocument, NewLineageEvent, NewProcessingStage,
    NewRelationship, RelationshipType, StageName, StageStatus, StageUpdate,
};
pub use ports::{GraphSource, LineageStore, StoreStats};
