//! Shared fixtures for integration tests
#![allow(dead_code)]

use doc_lineage::features::storage::{DocumentType, RelationshipType};
use doc_lineage::{
    DocumentEntity, DocumentRelationship, LineageConfig, LineageService, NewDocument,
    NewRelationship,
};

/// One service per backend, labelled for assertion messages
pub fn services() -> Vec<(&'static str, LineageService)> {
    services_with(LineageConfig::default())
}

/// Same as `services`, with custom graph/schema settings
pub fn services_with(base: LineageConfig) -> Vec<(&'static str, LineageService)> {
    let memory = LineageConfig {
        storage: LineageConfig::in_memory().storage,
        ..base.clone()
    };
    let sqlite = LineageConfig {
        storage: LineageConfig::sqlite(":memory:").storage,
        ..base
    };
    vec![
        ("memory", LineageService::from_config(memory).unwrap()),
        ("sqlite", LineageService::from_config(sqlite).unwrap()),
    ]
}

pub async fn document(
    service: &LineageService,
    document_type: DocumentType,
    name: &str,
) -> DocumentEntity {
    service
        .create_document(
            NewDocument::new(document_type, name)
                .parcel("PARCEL-001")
                .uploaded_by("recorder")
                .with_contents(name.as_bytes()),
        )
        .await
        .unwrap()
}

pub async fn relate(
    service: &LineageService,
    source: &DocumentEntity,
    target: &DocumentEntity,
    relationship_type: RelationshipType,
) -> DocumentRelationship {
    service
        .create_relationship(NewRelationship::new(
            source.id.clone(),
            target.id.clone(),
            relationship_type,
        ))
        .await
        .unwrap()
}
