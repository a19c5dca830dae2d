//! Graph traversal properties, checked against both backends

mod common;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;
use std::sync::Arc;

use common::{document, relate, services};
use doc_lineage::features::lineage::EdgeKind;
use doc_lineage::features::storage::{
    DocumentStatus, DocumentType, EventType, Metadata, RelationshipType, StageName, StageStatus,
};
use doc_lineage::{
    DocumentFilter, DocumentPatch, ErrorKind, GraphView, LineageService, NewLineageEvent,
    NewProcessingStage, NewRelationship, StageUpdate, TraversalDirection,
};

#[tokio::test]
async fn test_derived_from_scenario() {
    for (backend, service) in services() {
        let d1 = document(&service, DocumentType::Deed, "deed.pdf").await;
        let d2 = document(&service, DocumentType::Survey, "survey.pdf").await;
        let rel = relate(&service, &d2, &d1, RelationshipType::DerivedFrom).await;

        let provenance = service
            .build_graph(&d1.id, Some(2), TraversalDirection::Incoming)
            .unwrap();
        assert_eq!(
            provenance.document_ids(),
            BTreeSet::from([d1.id.as_str(), d2.id.as_str()]),
            "{backend}"
        );
        let edges = provenance.relationship_edges();
        assert_eq!(edges.len(), 1, "{backend}");
        assert_eq!(
            edges[0].kind,
            EdgeKind::Relationship(RelationshipType::DerivedFrom)
        );

        let lineage = service
            .build_graph(&d2.id, Some(2), TraversalDirection::Outgoing)
            .unwrap();
        let from_other_side = lineage.relationship_edges();
        assert_eq!(from_other_side.len(), 1, "{backend}");
        assert_eq!(from_other_side[0], edges[0], "{backend}");
        assert_eq!(from_other_side[0].id, format!("relationship:{}", rel.id));
        assert_eq!(from_other_side[0].source, format!("document:{}", d2.id));
        assert_eq!(from_other_side[0].target, format!("document:{}", d1.id));
    }
}

#[tokio::test]
async fn test_build_graph_is_idempotent() {
    for (backend, service) in services() {
        let docs = [
            document(&service, DocumentType::Plat, "plat").await,
            document(&service, DocumentType::Survey, "survey").await,
            document(&service, DocumentType::Easement, "easement").await,
            document(&service, DocumentType::Deed, "deed").await,
        ];
        relate(&service, &docs[1], &docs[0], RelationshipType::DerivedFrom).await;
        relate(&service, &docs[2], &docs[0], RelationshipType::RefersTo).await;
        relate(&service, &docs[3], &docs[2], RelationshipType::Supplements).await;
        service
            .create_event(NewLineageEvent::new(
                docs[0].id.clone(),
                EventType::Upload,
                "recorder",
            ))
            .await
            .unwrap();

        let first = service
            .build_graph(&docs[0].id, Some(3), TraversalDirection::Both)
            .unwrap();
        let second = service
            .build_graph(&docs[0].id, Some(3), TraversalDirection::Both)
            .unwrap();

        assert_eq!(first.node_ids(), second.node_ids(), "{backend}");
        assert_eq!(first.edge_ids(), second.edge_ids(), "{backend}");
        assert_eq!(first.document_ids().len(), 4, "{backend}");
    }
}

#[tokio::test]
async fn test_directional_duality() {
    for (backend, service) in services() {
        let a = document(&service, DocumentType::TitleReport, "title").await;
        let b = document(&service, DocumentType::Deed, "deed").await;
        relate(&service, &a, &b, RelationshipType::DerivedFrom).await;

        for depth in 1..=3 {
            let outgoing = service
                .build_graph(&a.id, Some(depth), TraversalDirection::Outgoing)
                .unwrap();
            let incoming = service
                .build_graph(&b.id, Some(depth), TraversalDirection::Incoming)
                .unwrap();
            assert!(outgoing.has_document(&b.id), "{backend} depth {depth}");
            assert!(incoming.has_document(&a.id), "{backend} depth {depth}");
        }

        // Wrong direction finds nothing
        let wrong_way = service
            .build_graph(&a.id, Some(3), TraversalDirection::Incoming)
            .unwrap();
        assert!(!wrong_way.has_document(&b.id), "{backend}");
    }
}

#[tokio::test]
async fn test_cycle_safety() {
    for (backend, service) in services() {
        let a = document(&service, DocumentType::Deed, "a").await;
        let b = document(&service, DocumentType::Deed, "b").await;
        relate(&service, &a, &b, RelationshipType::Supersedes).await;
        relate(&service, &b, &a, RelationshipType::Supersedes).await;

        for direction in [
            TraversalDirection::Outgoing,
            TraversalDirection::Incoming,
            TraversalDirection::Both,
        ] {
            let graph = service.build_graph(&a.id, Some(16), direction).unwrap();
            let document_nodes: Vec<&str> = graph
                .nodes
                .iter()
                .filter_map(|n| n.as_document())
                .map(|d| d.id.as_str())
                .collect();
            assert_eq!(document_nodes.len(), 2, "{backend} {direction}");
            assert_eq!(graph.relationship_edges().len(), 2, "{backend} {direction}");
        }
    }
}

#[tokio::test]
async fn test_depth_zero_has_no_edges_beyond_root() {
    for (backend, service) in services() {
        let root = document(&service, DocumentType::Permit, "permit").await;
        let other = document(&service, DocumentType::Permit, "renewal").await;
        relate(&service, &other, &root, RelationshipType::Successor).await;
        let stage = service
            .create_processing_stage(NewProcessingStage::new(root.id.clone(), StageName::Ocr))
            .await
            .unwrap();

        let graph = service
            .build_graph(&root.id, Some(0), TraversalDirection::Both)
            .unwrap();

        assert!(graph.relationship_edges().is_empty(), "{backend}");
        assert_eq!(
            graph.node_ids(),
            BTreeSet::from([
                format!("document:{}", root.id).as_str(),
                format!("stage:{}", stage.id).as_str(),
            ]),
            "{backend}"
        );
        assert_eq!(
            graph.edge_ids(),
            BTreeSet::from([format!("has_processing:{}", stage.id).as_str()]),
            "{backend}"
        );
    }
}

#[tokio::test]
async fn test_missing_root_fails_fast() {
    for (backend, service) in services() {
        let err = service
            .build_graph("no-such-document", Some(2), TraversalDirection::Both)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound, "{backend}");
    }
}

#[tokio::test]
async fn test_combined_graph_is_union_of_shallow_graphs() {
    for (backend, service) in services() {
        let a = document(&service, DocumentType::Deed, "a").await;
        let b = document(&service, DocumentType::Survey, "b").await;
        let c = document(&service, DocumentType::Plat, "c").await;
        let d = document(&service, DocumentType::Easement, "d").await;
        relate(&service, &b, &a, RelationshipType::DerivedFrom).await;
        relate(&service, &c, &b, RelationshipType::PartOf).await;
        relate(&service, &d, &c, RelationshipType::RefersTo).await;

        let ga = service
            .build_graph(&a.id, Some(1), TraversalDirection::Both)
            .unwrap();
        let gd = service
            .build_graph(&d.id, Some(1), TraversalDirection::Both)
            .unwrap();
        let expected_nodes: BTreeSet<&str> =
            ga.node_ids().union(&gd.node_ids()).copied().collect();
        let expected_edges: BTreeSet<&str> =
            ga.edge_ids().union(&gd.edge_ids()).copied().collect();

        let combined = service
            .build_combined_graph(&[a.id.clone(), d.id.clone(), a.id.clone()])
            .unwrap();

        assert_eq!(combined.node_ids(), expected_nodes, "{backend}");
        assert_eq!(combined.edge_ids(), expected_edges, "{backend}");
        assert_eq!(combined.nodes.len(), expected_nodes.len(), "{backend}");
        assert_eq!(combined.metadata.depth, 1);
        assert_eq!(combined.metadata.root_document_ids, vec![a.id, d.id]);
    }
}

#[tokio::test]
async fn test_combined_graph_skips_missing_roots() {
    for (backend, service) in services() {
        let a = document(&service, DocumentType::Deed, "a").await;
        let combined = service
            .build_combined_graph(&["ghost".to_string(), a.id.clone()])
            .unwrap();

        assert!(combined.has_document(&a.id), "{backend}");
        assert_eq!(
            combined.metadata.skipped_document_ids,
            vec!["ghost".to_string()],
            "{backend}"
        );
    }
}

#[tokio::test]
async fn test_events_returned_oldest_first() {
    for (backend, service) in services() {
        let doc = document(&service, DocumentType::Deed, "deed").await;
        let t0 = Utc::now() - Duration::hours(1);
        for (minutes, event_type) in [
            (30, EventType::View),
            (0, EventType::Upload),
            (45, EventType::Annotation),
            (30, EventType::Download),
        ] {
            service
                .create_event(
                    NewLineageEvent::new(doc.id.clone(), event_type, "clerk")
                        .at(t0 + Duration::minutes(minutes)),
                )
                .await
                .unwrap();
        }

        let order: Vec<EventType> = service
            .get_events_for_document(&doc.id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.event_type)
            .collect();
        assert_eq!(
            order,
            vec![
                EventType::Upload,
                EventType::View,
                EventType::Download,
                EventType::Annotation
            ],
            "{backend}"
        );
    }
}

#[tokio::test]
async fn test_relationship_references_checked() {
    for (backend, service) in services() {
        let a = document(&service, DocumentType::Deed, "a").await;

        let err = service
            .create_relationship(NewRelationship::new(
                a.id.clone(),
                "ghost",
                RelationshipType::RefersTo,
            ))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidReference, "{backend}");

        let err = service
            .create_relationship(NewRelationship::new(
                a.id.clone(),
                a.id.clone(),
                RelationshipType::RefersTo,
            ))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation, "{backend}");
        assert_eq!(service.stats().await.unwrap().relationships, 0, "{backend}");
    }
}

#[tokio::test]
async fn test_duplicate_relationship_rejected() {
    for (backend, service) in services() {
        let a = document(&service, DocumentType::Deed, "a").await;
        let b = document(&service, DocumentType::Deed, "b").await;
        relate(&service, &a, &b, RelationshipType::Supersedes).await;

        let err = service
            .create_relationship(NewRelationship::new(
                a.id.clone(),
                b.id.clone(),
                RelationshipType::Supersedes,
            ))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Duplicate, "{backend}");

        // Same endpoints, different type is a distinct edge
        relate(&service, &a, &b, RelationshipType::Predecessor).await;
        let rels = service
            .get_relationships_for_document(&b.id, Some(RelationshipType::Predecessor))
            .await
            .unwrap();
        assert_eq!(rels.len(), 1, "{backend}");
        assert_eq!(
            service
                .get_relationships_for_document(&b.id, None)
                .await
                .unwrap()
                .len(),
            2,
            "{backend}"
        );
    }
}

#[tokio::test]
async fn test_document_status_moves_forward_only() {
    for (backend, service) in services() {
        let doc = document(&service, DocumentType::Covenant, "covenant").await;

        let archived = service
            .update_document(&doc.id, DocumentPatch::status(DocumentStatus::Archived))
            .await
            .unwrap();
        assert_eq!(archived.status, DocumentStatus::Archived);
        assert_eq!(archived.created_at, doc.created_at, "{backend}");

        let err = service
            .update_document(&doc.id, DocumentPatch::status(DocumentStatus::Active))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidTransition, "{backend}");

        let active = service
            .list_documents(DocumentFilter {
                status: Some(DocumentStatus::Active),
                ..DocumentFilter::default()
            })
            .await
            .unwrap();
        assert!(active.is_empty(), "{backend}");
    }
}

#[tokio::test]
async fn test_list_documents_filters_and_limit() {
    for (backend, service) in services() {
        document(&service, DocumentType::Deed, "deed-1").await;
        document(&service, DocumentType::Survey, "survey").await;
        let latest = document(&service, DocumentType::Deed, "deed-2").await;

        let deeds = service
            .list_documents(DocumentFilter {
                document_type: Some(DocumentType::Deed),
                limit: Some(1),
                ..DocumentFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(deeds.len(), 1, "{backend}");
        assert_eq!(deeds[0].id, latest.id, "{backend}");

        let by_parcel = service
            .list_documents(DocumentFilter {
                parcel_id: Some("PARCEL-001".to_string()),
                ..DocumentFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(by_parcel.len(), 3, "{backend}");
    }
}

#[tokio::test]
async fn test_stage_completion_scenario() {
    for (backend, service) in services() {
        let doc = document(&service, DocumentType::Survey, "survey").await;
        let stage = service
            .create_processing_stage(
                NewProcessingStage::new(doc.id.clone(), StageName::EntityExtraction)
                    .processor("extractor", "1.4.0"),
            )
            .await
            .unwrap();
        assert_eq!(stage.status, StageStatus::Pending);
        assert_eq!(stage.progress, 0);

        let done = service
            .update_processing_stage_status(&stage.id, StageStatus::Completed, Some(100), None)
            .await
            .unwrap();
        assert!(done.completed_at.is_some(), "{backend}");

        let err = service
            .update_processing_stage_status(&stage.id, StageStatus::Running, None, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidTransition, "{backend}");

        let stored = service.get_processing_stage(&stage.id).await.unwrap();
        assert_eq!(stored, Some(done), "{backend}");
    }
}

#[tokio::test]
async fn test_unknown_stage_is_not_found() {
    for (backend, service) in services() {
        let err = service
            .update_processing_stage_status("nope", StageStatus::Running, None, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound, "{backend}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_graphs_never_see_half_written_state() {
    let service = Arc::new(LineageService::in_memory().unwrap());
    let hub = document(&service, DocumentType::Plat, "hub").await;

    let writer = {
        let service = Arc::clone(&service);
        let hub = hub.clone();
        tokio::spawn(async move {
            for i in 0..50 {
                let spoke = document(&service, DocumentType::Survey, &format!("spoke-{i}")).await;
                relate(&service, &spoke, &hub, RelationshipType::PartOf).await;
            }
        })
    };

    let reader = {
        let service = Arc::clone(&service);
        let hub_id = hub.id.clone();
        tokio::task::spawn_blocking(move || {
            for _ in 0..50 {
                let graph = service
                    .build_graph(&hub_id, Some(1), TraversalDirection::Incoming)
                    .unwrap();
                // Every edge endpoint is a node of the same graph
                let nodes = graph.node_ids();
                for edge in &graph.edges {
                    assert!(nodes.contains(edge.source.as_str()));
                    assert!(nodes.contains(edge.target.as_str()));
                }
            }
        })
    };

    writer.await.unwrap();
    reader.await.unwrap();

    let final_graph = service
        .build_graph(&hub.id, Some(1), TraversalDirection::Incoming)
        .unwrap();
    assert_eq!(final_graph.document_ids().len(), 51);
}

#[tokio::test]
async fn test_supplied_times_read_back_unchanged() {
    let at = DateTime::from_timestamp(1_700_000_000, 123_456_789).unwrap();

    for (backend, service) in services() {
        let doc = document(&service, DocumentType::Deed, "deed.pdf").await;

        let event = service
            .create_event(NewLineageEvent::new(doc.id.clone(), EventType::Upload, "clerk").at(at))
            .await
            .unwrap();
        assert_eq!(event.event_timestamp, at.trunc_subsecs(6), "{backend}");
        let stored = service.get_event(&event.id).await.unwrap().unwrap();
        assert_eq!(stored, event, "{backend}");

        let stage = service
            .create_processing_stage(NewProcessingStage::new(doc.id.clone(), StageName::Ocr))
            .await
            .unwrap();
        let finished = Utc::now() + Duration::nanoseconds(1_000_000_007);
        let done = service
            .update_processing_stage_status(
                &stage.id,
                StageStatus::Completed,
                None,
                Some(finished),
            )
            .await
            .unwrap();
        assert_eq!(done.completed_at, Some(finished.trunc_subsecs(6)), "{backend}");
        let stored = service.get_processing_stage(&stage.id).await.unwrap().unwrap();
        assert_eq!(stored, done, "{backend}");
    }
}

#[tokio::test]
async fn test_non_finite_numbers_rejected() {
    for (backend, service) in services() {
        let a = document(&service, DocumentType::Deed, "a").await;
        let b = document(&service, DocumentType::Deed, "b").await;

        let err = service
            .create_event(
                NewLineageEvent::new(a.id.clone(), EventType::Classification, "classifier")
                    .detail("score", f64::INFINITY),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation, "{backend}");

        let err = service
            .create_relationship(
                NewRelationship::new(a.id.clone(), b.id.clone(), RelationshipType::RefersTo)
                    .meta("weight", f64::NAN),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation, "{backend}");

        let stage = service
            .create_processing_stage(NewProcessingStage::new(a.id.clone(), StageName::Ocr))
            .await
            .unwrap();
        let mut result = Metadata::new();
        result.insert("pages".into(), f64::NEG_INFINITY.into());
        let err = service
            .update_processing_stage(
                &stage.id,
                StageUpdate::new(StageStatus::Completed).result(result),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation, "{backend}");

        let stored = service.get_processing_stage(&stage.id).await.unwrap().unwrap();
        assert_eq!(stored.status, StageStatus::Pending, "{backend}");
        assert!(stored.result.is_none(), "{backend}");
        assert!(
            service.get_events_for_document(&a.id).await.unwrap().is_empty(),
            "{backend}"
        );
        assert_eq!(service.stats().await.unwrap().relationships, 0, "{backend}");
    }
}
