//! Lineage Domain Models
//!
//! Four record kinds:
//! - `DocumentEntity`: created once, never hard-deleted (status only moves forward)
//! - `DocumentLineageEvent`: append-only
//! - `DocumentRelationship`: append-only directed edge between two documents
//! - `DocumentProcessingStage`: the only mutable record, monotonic toward a terminal state

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::metadata::{check_finite, Metadata, MetadataValue};
use crate::error::{LineageError, Result};

/// Document ID (opaque, stable)
pub type DocumentId = String;

/// Generate a fresh record ID
pub fn new_record_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current time truncated to microseconds, the precision both backends keep
pub fn record_timestamp() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Lowercase hex SHA-256 of document contents
pub fn compute_file_hash(contents: &[u8]) -> String {
    format!("{:x}", Sha256::digest(contents))
}

/// Declares a closed-set enum with its wire names.
///
/// Generates `ALL`, `as_str`, `Display` and `FromStr` (unknown names are a
/// validation error).
macro_rules! closed_set {
    (
        $(#[$meta:meta])*
        $name:ident, $label:literal, { $($variant:ident => $wire:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $wire)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = LineageError;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($wire => Ok($name::$variant),)+
                    _ => Err(LineageError::validation(format!(
                        "Invalid {}: {}",
                        $label, s
                    ))),
                }
            }
        }
    };
}

closed_set!(
    /// Kind of recorded document
    DocumentType, "document type", {
        Deed => "DEED",
        Plat => "PLAT",
        Survey => "SURVEY",
        Easement => "EASEMENT",
        TaxRecord => "TAX_RECORD",
        LegalDescription => "LEGAL_DESCRIPTION",
        Permit => "PERMIT",
        Covenant => "COVENANT",
        Assessment => "ASSESSMENT",
        TitleReport => "TITLE_REPORT",
        CourtOrder => "COURT_ORDER",
        Correspondence => "CORRESPONDENCE",
    }
);

closed_set!(
    /// Document lifecycle status
    DocumentStatus, "document status", {
        Active => "active",
        Archived => "archived",
        Deleted => "deleted",
    }
);

closed_set!(
    /// Action applied to a document
    EventType, "event type", {
        Upload => "UPLOAD",
        Download => "DOWNLOAD",
        View => "VIEW",
        Edit => "EDIT",
        Annotation => "ANNOTATION",
        Classification => "CLASSIFICATION",
        Verification => "VERIFICATION",
        Sharing => "SHARING",
        Deletion => "DELETION",
        Archival => "ARCHIVAL",
        Export => "EXPORT",
        Link => "LINK",
    }
);

closed_set!(
    /// Typed directed relationship between two documents
    RelationshipType, "relationship type", {
        DerivedFrom => "DERIVED_FROM",
        Supersedes => "SUPERSEDES",
        RefersTo => "REFERS_TO",
        Supplements => "SUPPLEMENTS",
        Contradicts => "CONTRADICTS",
        Validates => "VALIDATES",
        PartOf => "PART_OF",
        Contains => "CONTAINS",
        Predecessor => "PREDECESSOR",
        Successor => "SUCCESSOR",
    }
);

closed_set!(
    /// Processing pipeline stage
    StageName, "stage name", {
        Ocr => "OCR",
        Classification => "CLASSIFICATION",
        EntityExtraction => "ENTITY_EXTRACTION",
        Geocoding => "GEOCODING",
        Validation => "VALIDATION",
        Conversion => "CONVERSION",
        Indexing => "INDEXING",
        QualityCheck => "QUALITY_CHECK",
        Anonymization => "ANONYMIZATION",
        Summarization => "SUMMARIZATION",
    }
);

closed_set!(
    /// Processing stage status
    StageStatus, "stage status", {
        Pending => "pending",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
    }
);

impl DocumentStatus {
    fn rank(&self) -> u8 {
        match self {
            DocumentStatus::Active => 0,
            DocumentStatus::Archived => 1,
            DocumentStatus::Deleted => 2,
        }
    }

    /// Status only moves forward: active -> archived -> deleted
    pub fn can_transition_to(&self, next: DocumentStatus) -> bool {
        next.rank() >= self.rank()
    }
}

impl StageName {
    /// Event type recorded when a stage is started on behalf of a user
    pub fn audit_event_type(&self) -> EventType {
        match self {
            StageName::Classification => EventType::Classification,
            StageName::Validation | StageName::QualityCheck => EventType::Verification,
            StageName::Conversion => EventType::Export,
            _ => EventType::Annotation,
        }
    }
}

impl StageStatus {
    fn rank(&self) -> u8 {
        match self {
            StageStatus::Pending => 0,
            StageStatus::Running => 1,
            StageStatus::Completed | StageStatus::Failed => 2,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StageStatus::Completed | StageStatus::Failed)
    }

    /// pending -> running -> {completed, failed}; nothing leaves a terminal state
    pub fn can_transition_to(&self, next: StageStatus) -> bool {
        !self.is_terminal() && next.rank() >= self.rank()
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(LineageError::validation(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn validate_file_hash(hash: &str) -> Result<()> {
    let is_sha256 = hash.len() == 64
        && hash
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
    if !is_sha256 {
        return Err(LineageError::validation(format!(
            "fileHash must be a lowercase hex SHA-256 digest: {}",
            hash
        )));
    }
    Ok(())
}

fn validate_confidence(confidence: Option<f64>) -> Result<()> {
    match confidence {
        Some(c) if !c.is_finite() || !(0.0..=1.0).contains(&c) => Err(
            LineageError::validation(format!("confidence must be within 0.0..=1.0, got {}", c)),
        ),
        _ => Ok(()),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Documents
// ═══════════════════════════════════════════════════════════════════════════

/// Document Entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentEntity {
    pub id: DocumentId,
    pub document_type: DocumentType,
    pub document_name: String,
    pub description: Option<String>,
    pub file_size: Option<u64>,
    /// Lowercase hex SHA-256 of the file contents
    pub file_hash: Option<String>,
    /// Weak reference to a parcel; never dereferenced here
    pub parcel_id: Option<String>,
    pub uploaded_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub status: DocumentStatus,
}

impl DocumentEntity {
    /// Build a new active document with a generated ID
    pub fn from_new(data: NewDocument, now: DateTime<Utc>) -> Result<Self> {
        data.validate()?;
        Ok(Self {
            id: new_record_id(),
            document_type: data.document_type,
            document_name: data.document_name,
            description: data.description,
            file_size: data.file_size,
            file_hash: data.file_hash,
            parcel_id: data.parcel_id,
            uploaded_by: data.uploaded_by,
            created_at: now,
            status: DocumentStatus::Active,
        })
    }

    /// Merge a patch into this document
    ///
    /// `id` and `created_at` are never touched. Nothing is applied if any
    /// field is rejected.
    pub fn apply_patch(&mut self, patch: &DocumentPatch) -> Result<()> {
        if let Some(name) = &patch.document_name {
            require_non_empty("documentName", name)?;
        }
        if let Some(hash) = &patch.file_hash {
            validate_file_hash(hash)?;
        }
        if let Some(status) = patch.status {
            if !self.status.can_transition_to(status) {
                return Err(LineageError::invalid_transition(self.status, status));
            }
        }

        if let Some(document_type) = patch.document_type {
            self.document_type = document_type;
        }
        if let Some(name) = &patch.document_name {
            self.document_name = name.clone();
        }
        if let Some(description) = &patch.description {
            self.description = Some(description.clone());
        }
        if let Some(file_size) = patch.file_size {
            self.file_size = Some(file_size);
        }
        if let Some(hash) = &patch.file_hash {
            self.file_hash = Some(hash.clone());
        }
        if let Some(parcel_id) = &patch.parcel_id {
            self.parcel_id = Some(parcel_id.clone());
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        Ok(())
    }
}

/// Input for creating a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDocument {
    pub document_type: DocumentType,
    pub document_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub file_hash: Option<String>,
    #[serde(default)]
    pub parcel_id: Option<String>,
    #[serde(default)]
    pub uploaded_by: Option<String>,
}

impl NewDocument {
    pub fn new(document_type: DocumentType, document_name: impl Into<String>) -> Self {
        Self {
            document_type,
            document_name: document_name.into(),
            description: None,
            file_size: None,
            file_hash: None,
            parcel_id: None,
            uploaded_by: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn parcel(mut self, parcel_id: impl Into<String>) -> Self {
        self.parcel_id = Some(parcel_id.into());
        self
    }

    pub fn uploaded_by(mut self, user: impl Into<String>) -> Self {
        self.uploaded_by = Some(user.into());
        self
    }

    /// Fill size and SHA-256 hash from the uploaded bytes
    pub fn with_contents(mut self, contents: &[u8]) -> Self {
        self.file_size = Some(contents.len() as u64);
        self.file_hash = Some(compute_file_hash(contents));
        self
    }

    pub fn validate(&self) -> Result<()> {
        require_non_empty("documentName", &self.document_name)?;
        if let Some(hash) = &self.file_hash {
            validate_file_hash(hash)?;
        }
        Ok(())
    }
}

/// Partial update for a document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocumentPatch {
    pub document_type: Option<DocumentType>,
    pub document_name: Option<String>,
    pub description: Option<String>,
    pub file_size: Option<u64>,
    pub file_hash: Option<String>,
    pub parcel_id: Option<String>,
    pub status: Option<DocumentStatus>,
}

impl DocumentPatch {
    pub fn status(status: DocumentStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

/// Query filter for `list_documents`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocumentFilter {
    pub document_type: Option<DocumentType>,
    pub parcel_id: Option<String>,
    pub status: Option<DocumentStatus>,
    pub limit: Option<usize>,
}

impl DocumentFilter {
    pub fn matches(&self, doc: &DocumentEntity) -> bool {
        self.document_type.map_or(true, |t| doc.document_type == t)
            && self
                .parcel_id
                .as_deref()
                .map_or(true, |p| doc.parcel_id.as_deref() == Some(p))
            && self.status.map_or(true, |s| doc.status == s)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Events
// ═══════════════════════════════════════════════════════════════════════════

/// Lineage event (append-only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentLineageEvent {
    pub id: String,
    pub document_id: DocumentId,
    pub event_type: EventType,
    pub performed_by: String,
    pub details: Metadata,
    /// 0.0-1.0
    pub confidence: Option<f64>,
    pub event_timestamp: DateTime<Utc>,
}

impl DocumentLineageEvent {
    pub fn from_new(data: NewLineageEvent, now: DateTime<Utc>) -> Result<Self> {
        data.validate()?;
        Ok(Self {
            id: new_record_id(),
            document_id: data.document_id,
            event_type: data.event_type,
            performed_by: data.performed_by,
            details: data.details,
            confidence: data.confidence,
            event_timestamp: data
                .event_timestamp
                .map(|t| t.trunc_subsecs(6))
                .unwrap_or(now),
        })
    }
}

/// Input for creating an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLineageEvent {
    pub document_id: DocumentId,
    pub event_type: EventType,
    pub performed_by: String,
    #[serde(default)]
    pub details: Metadata,
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Defaults to the creation time
    #[serde(default)]
    pub event_timestamp: Option<DateTime<Utc>>,
}

impl NewLineageEvent {
    pub fn new(
        document_id: impl Into<String>,
        event_type: EventType,
        performed_by: impl Into<String>,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            event_type,
            performed_by: performed_by.into(),
            details: Metadata::new(),
            confidence: None,
            event_timestamp: None,
        }
    }

    pub fn detail(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.event_timestamp = Some(timestamp);
        self
    }

    pub fn validate(&self) -> Result<()> {
        require_non_empty("documentId", &self.document_id)?;
        require_non_empty("performedBy", &self.performed_by)?;
        check_finite("details", &self.details)?;
        validate_confidence(self.confidence)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Relationships
// ═══════════════════════════════════════════════════════════════════════════

/// Directed relationship `source -> target` (append-only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRelationship {
    pub id: String,
    pub source_document_id: DocumentId,
    pub target_document_id: DocumentId,
    pub relationship_type: RelationshipType,
    pub notes: Option<String>,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

impl DocumentRelationship {
    pub fn from_new(data: NewRelationship, now: DateTime<Utc>) -> Result<Self> {
        data.validate()?;
        Ok(Self {
            id: new_record_id(),
            source_document_id: data.source_document_id,
            target_document_id: data.target_document_id,
            relationship_type: data.relationship_type,
            notes: data.notes,
            metadata: data.metadata,
            created_at: now,
        })
    }

    /// The document on the other end from `document_id`
    pub fn other_end(&self, document_id: &str) -> &str {
        if self.source_document_id == document_id {
            &self.target_document_id
        } else {
            &self.source_document_id
        }
    }

    pub fn same_triple(&self, other: &DocumentRelationship) -> bool {
        self.source_document_id == other.source_document_id
            && self.target_document_id == other.target_document_id
            && self.relationship_type == other.relationship_type
    }
}

/// Input for creating a relationship
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRelationship {
    pub source_document_id: DocumentId,
    pub target_document_id: DocumentId,
    pub relationship_type: RelationshipType,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl NewRelationship {
    pub fn new(
        source_document_id: impl Into<String>,
        target_document_id: impl Into<String>,
        relationship_type: RelationshipType,
    ) -> Self {
        Self {
            source_document_id: source_document_id.into(),
            target_document_id: target_document_id.into(),
            relationship_type,
            notes: None,
            metadata: Metadata::new(),
        }
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        require_non_empty("sourceDocumentId", &self.source_document_id)?;
        require_non_empty("targetDocumentId", &self.target_document_id)?;
        if self.source_document_id == self.target_document_id {
            return Err(LineageError::validation(format!(
                "A document cannot be related to itself: {}",
                self.source_document_id
            )));
        }
        check_finite("metadata", &self.metadata)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Processing Stages
// ═══════════════════════════════════════════════════════════════════════════

/// Processing stage (mutable: status/progress/result/completed_at only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentProcessingStage {
    pub id: String,
    pub document_id: DocumentId,
    pub stage_name: StageName,
    pub status: StageStatus,
    /// 0-100, never decreases
    pub progress: u8,
    pub processor_name: Option<String>,
    pub processor_version: Option<String>,
    pub started_at: DateTime<Utc>,
    /// Set iff status is terminal
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<Metadata>,
}

impl DocumentProcessingStage {
    pub fn from_new(data: &NewProcessingStage, now: DateTime<Utc>) -> Result<Self> {
        data.validate()?;
        Ok(Self {
            id: new_record_id(),
            document_id: data.document_id.clone(),
            stage_name: data.stage_name,
            status: StageStatus::Pending,
            progress: 0,
            processor_name: data.processor_name.clone(),
            processor_version: data.processor_version.clone(),
            started_at: now,
            completed_at: None,
            result: None,
        })
    }

    /// Apply a status update
    ///
    /// Rejects leaving a terminal state, moving backward and decreasing
    /// progress. Entering a terminal state stamps `completed_at` with `now`
    /// unless one is supplied; supplied times keep microsecond precision.
    pub fn apply_update(&mut self, update: &StageUpdate, now: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(update.status) {
            return Err(LineageError::invalid_transition(self.status, update.status));
        }
        if let Some(progress) = update.progress {
            if progress > 100 {
                return Err(LineageError::validation(format!(
                    "progress must be within 0..=100, got {}",
                    progress
                )));
            }
            if progress < self.progress {
                return Err(LineageError::new(
                    crate::error::ErrorKind::InvalidTransition,
                    format!("progress cannot decrease: {} -> {}", self.progress, progress),
                ));
            }
        }
        if update.completed_at.is_some() && !update.status.is_terminal() {
            return Err(LineageError::validation(format!(
                "completedAt can only be set for a terminal status, got {}",
                update.status
            )));
        }
        if let Some(result) = &update.result {
            check_finite("result", result)?;
        }

        self.status = update.status;
        match update.progress {
            Some(progress) => self.progress = progress,
            None if update.status == StageStatus::Completed => self.progress = 100,
            None => {}
        }
        if update.status.is_terminal() {
            self.completed_at = Some(
                update
                    .completed_at
                    .map(|t| t.trunc_subsecs(6))
                    .unwrap_or(now),
            );
        }
        if let Some(result) = &update.result {
            self.result = Some(result.clone());
        }
        Ok(())
    }
}

/// Input for creating a processing stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProcessingStage {
    pub document_id: DocumentId,
    pub stage_name: StageName,
    #[serde(default)]
    pub processor_name: Option<String>,
    #[serde(default)]
    pub processor_version: Option<String>,
    /// When set, an audit event is written together with the stage
    #[serde(default)]
    pub performed_by: Option<String>,
}

impl NewProcessingStage {
    pub fn new(document_id: impl Into<String>, stage_name: StageName) -> Self {
        Self {
            document_id: document_id.into(),
            stage_name,
            processor_name: None,
            processor_version: None,
            performed_by: None,
        }
    }

    pub fn processor(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.processor_name = Some(name.into());
        self.processor_version = Some(version.into());
        self
    }

    pub fn performed_by(mut self, user: impl Into<String>) -> Self {
        self.performed_by = Some(user.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        require_non_empty("documentId", &self.document_id)?;
        if let Some(user) = &self.performed_by {
            require_non_empty("performedBy", user)?;
        }
        Ok(())
    }

    /// Audit event recorded alongside the stage, if requested
    pub fn audit_event(
        &self,
        stage: &DocumentProcessingStage,
    ) -> Result<Option<DocumentLineageEvent>> {
        let Some(user) = &self.performed_by else {
            return Ok(None);
        };
        let mut event = NewLineageEvent::new(
            stage.document_id.clone(),
            self.stage_name.audit_event_type(),
            user.clone(),
        )
        .detail("stageId", stage.id.clone())
        .detail("stageName", stage.stage_name.as_str());
        if let Some(processor) = &stage.processor_name {
            event = event.detail("processorName", processor.clone());
        }
        DocumentLineageEvent::from_new(event, stage.started_at).map(Some)
    }
}

/// Status update for a processing stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageUpdate {
    pub status: StageStatus,
    #[serde(default)]
    pub progress: Option<u8>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub result: Option<Metadata>,
}

impl StageUpdate {
    pub fn new(status: StageStatus) -> Self {
        Self {
            status,
            progress: None,
            completed_at: None,
            result: None,
        }
    }

    pub fn progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = Some(at);
        self
    }

    pub fn result(mut self, result: Metadata) -> Self {
        self.result = Some(result);
        self
    }
}
