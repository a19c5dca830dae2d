//! Lineage service configuration
//!
//! ```yaml
//! version: 1
//! storage:
//!   backend: sqlite
//!   sqlite_path: /var/lib/records/lineage.db
//! graph:
//!   default_depth: 2
//!   max_nodes: 5000
//! schemas:
//!   events:
//!     CLASSIFICATION:
//!       label: { kind: string, required: true }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::error::{ConfigError, ConfigResult};
use super::validation::{check_range, Validatable};
use crate::features::storage::domain::{
    EventType, MetadataSchema, RelationshipType, SchemaRegistry,
};

/// Supported schema versions
const SUPPORTED_VERSIONS: &[u32] = &[1];

/// Hard ceiling for traversal depth (recursion is bounded by it)
pub const DEPTH_CEILING: usize = 64;

/// YAML Schema v1
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFileV1 {
    #[serde(default)]
    version: Option<u32>,

    #[serde(default)]
    storage: StorageConfig,

    #[serde(default)]
    graph: GraphConfig,

    #[serde(default)]
    logging: LoggingConfig,

    #[serde(default)]
    schemas: SchemaConfig,
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineageConfig {
    pub storage: StorageConfig,
    pub graph: GraphConfig,
    pub logging: LoggingConfig,
    pub schemas: SchemaConfig,
}

impl LineageConfig {
    /// Load and validate a YAML file
    pub fn from_yaml(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parse and validate YAML text
    pub fn from_yaml_str(content: &str) -> ConfigResult<Self> {
        let file: ConfigFileV1 = serde_yaml::from_str(content)?;

        let version = file.version.ok_or(ConfigError::MissingVersion)?;
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(ConfigError::UnsupportedVersion {
                found: version,
                supported: SUPPORTED_VERSIONS.to_vec(),
            });
        }

        let config = Self {
            storage: file.storage,
            graph: file.graph,
            logging: file.logging,
            schemas: file.schemas,
        };
        config.validate()?;
        Ok(config)
    }

    /// Export as YAML (always schema v1)
    pub fn to_yaml(&self) -> ConfigResult<String> {
        let file = ConfigFileV1 {
            version: Some(1),
            storage: self.storage.clone(),
            graph: self.graph.clone(),
            logging: self.logging.clone(),
            schemas: self.schemas.clone(),
        };
        Ok(serde_yaml::to_string(&file)?)
    }

    /// In-memory backend, default graph limits
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// SQLite backend at `path`
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageConfig {
                backend: StoreBackend::Sqlite,
                sqlite_path: Some(path.into()),
            },
            ..Self::default()
        }
    }

    pub fn graph(mut self, f: impl FnOnce(GraphConfig) -> GraphConfig) -> Self {
        self.graph = f(self.graph);
        self
    }

    /// Build the metadata schema registry
    pub fn schema_registry(&self) -> ConfigResult<SchemaRegistry> {
        self.schemas.registry()
    }
}

impl Validatable for LineageConfig {
    fn validate(&self) -> ConfigResult<()> {
        self.storage.validate()?;
        self.graph.validate()?;
        self.logging.validate()?;
        self.schemas.validate()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Storage
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Storage backend selector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct StorageConfig {
    pub backend: StoreBackend,

    /// Database file; `:memory:` opens a private in-memory database
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sqlite_path: Option<PathBuf>,
}

impl Validatable for StorageConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.backend == StoreBackend::Sqlite && self.sqlite_path.is_none() {
            return Err(ConfigError::Validation(format!(
                "{}: storage.sqlite_path is required when storage.backend is sqlite",
                self.config_name()
            )));
        }
        Ok(())
    }

    fn config_name(&self) -> &'static str {
        "StorageConfig"
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Graph
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Traversal limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct GraphConfig {
    /// Depth used when a request does not give one
    pub default_depth: usize,

    /// Fixed depth of combined (multi-root) graphs
    pub combined_depth: usize,

    /// Deepest traversal a request may ask for
    pub max_depth: usize,

    /// Node limit per graph
    pub max_nodes: usize,

    /// Wall-clock budget per graph build, 0 disables
    pub timeout_ms: u64,

    /// Fail combined graphs on a missing root instead of skipping it
    pub strict_combined_roots: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            default_depth: 2,
            combined_depth: 1,
            max_depth: 16,
            max_nodes: 10_000,
            timeout_ms: 5_000,
            strict_combined_roots: false,
        }
    }
}

impl GraphConfig {
    pub fn default_depth(mut self, depth: usize) -> Self {
        self.default_depth = depth;
        self
    }

    pub fn combined_depth(mut self, depth: usize) -> Self {
        self.combined_depth = depth;
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn max_nodes(mut self, nodes: usize) -> Self {
        self.max_nodes = nodes;
        self
    }

    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    pub fn strict_combined_roots(mut self, strict: bool) -> Self {
        self.strict_combined_roots = strict;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

impl Validatable for GraphConfig {
    fn validate(&self) -> ConfigResult<()> {
        check_range(
            "graph.max_depth",
            self.max_depth as u64,
            1,
            DEPTH_CEILING as u64,
            "Deep traversals should be split into several requests.",
        )?;
        check_range(
            "graph.default_depth",
            self.default_depth as u64,
            0,
            self.max_depth as u64,
            "default_depth cannot exceed max_depth.",
        )?;
        check_range(
            "graph.combined_depth",
            self.combined_depth as u64,
            0,
            self.max_depth as u64,
            "combined_depth cannot exceed max_depth.",
        )?;
        if self.max_nodes == 0 {
            return Err(ConfigError::range_with_hint(
                "graph.max_nodes",
                0,
                1,
                usize::MAX,
                "A graph always holds at least its root.",
            ));
        }
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Logging
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LoggingConfig {
    /// Fallback filter when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Validatable for LoggingConfig {
    fn validate(&self) -> ConfigResult<()> {
        if !LOG_LEVELS.contains(&self.level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::Validation(format!(
                "{}: logging.level must be one of {}, got '{}'",
                self.config_name(),
                LOG_LEVELS.join(", "),
                self.level
            )));
        }
        Ok(())
    }

    fn config_name(&self) -> &'static str {
        "LoggingConfig"
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Metadata Schemas
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Metadata schemas keyed by event / relationship wire name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SchemaConfig {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub events: BTreeMap<String, MetadataSchema>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub relationships: BTreeMap<String, MetadataSchema>,
}

impl SchemaConfig {
    pub fn registry(&self) -> ConfigResult<SchemaRegistry> {
        let mut registry = SchemaRegistry::new();
        for (name, schema) in &self.events {
            let event_type: EventType = name.parse().map_err(|_| {
                ConfigError::Validation(format!("schemas.events: unknown event type '{}'", name))
            })?;
            registry.register_event(event_type, schema.clone());
        }
        for (name, schema) in &self.relationships {
            let relationship_type: RelationshipType = name.parse().map_err(|_| {
                ConfigError::Validation(format!(
                    "schemas.relationships: unknown relationship type '{}'",
                    name
                ))
            })?;
            registry.register_relationship(relationship_type, schema.clone());
        }
        Ok(registry)
    }
}

impl Validatable for SchemaConfig {
    fn validate(&self) -> ConfigResult<()> {
        self.registry().map(|_| ())
    }
}
