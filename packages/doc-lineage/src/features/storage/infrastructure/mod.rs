//! Storage Infrastructure Layer
//!
//! Two backends for the `LineageStore` port, picked by `StorageConfig`

pub mod memory_store;
pub mod relationship_index;
pub use memory_store::InMemoryLineageStore;
pub use relationship_index::RelationshipIndex;

#[cfg(feature = "sqlite")]
pub mod sqlite_store;
#[cfg(feature = "sqlite")]
pub use sqlite_store::SqliteLineageStore;

use std::sync::Arc;
use tracing::info;

use crate::config::{StorageConfig, StoreBackend};
use crate::error::{ErrorKind, LineageError, Result};
use crate::features::storage::domain::LineageStore;

/// Open the backend named by `config`
pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn LineageStore>> {
    match config.backend {
        StoreBackend::Memory => {
            info!("Using in-memory lineage store");
            Ok(Arc::new(InMemoryLineageStore::new()))
        }
        StoreBackend::Sqlite => open_sqlite(config),
    }
}

#[cfg(feature = "sqlite")]
fn open_sqlite(config: &StorageConfig) -> Result<Arc<dyn LineageStore>> {
    let path = config.sqlite_path.as_ref().ok_or_else(|| {
        LineageError::new(
            ErrorKind::Config,
            "storage.sqlite_path is required when storage.backend is sqlite",
        )
    })?;
    let store = if path.as_os_str() == ":memory:" {
        SqliteLineageStore::in_memory()?
    } else {
        SqliteLineageStore::open(path)?
    };
    Ok(Arc::new(store))
}

#[cfg(not(feature = "sqlite"))]
fn open_sqlite(_config: &StorageConfig) -> Result<Arc<dyn LineageStore>> {
    Err(LineageError::new(
        ErrorKind::Config,
        "storage.backend is sqlite but the crate was built without the `sqlite` feature",
    ))
}
