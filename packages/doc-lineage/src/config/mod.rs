//! Configuration
//!
//! `LineageConfig` is built in code (`LineageConfig::in_memory()`,
//! `LineageConfig::sqlite(path)`) or loaded from a versioned YAML file.
//!
//! ```rust,ignore
//! use doc_lineage::config::LineageConfig;
//!
//! let config = LineageConfig::from_yaml("lineage.yaml")?;
//! let config = LineageConfig::in_memory().graph(|g| g.max_nodes(500));
//! ```

pub mod error;
pub mod lineage_config;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use lineage_config::{
    GraphConfig, LineageConfig, LoggingConfig, SchemaConfig, StorageConfig, StoreBackend,
    DEPTH_CEILING,
};
pub use validation::Validatable;
