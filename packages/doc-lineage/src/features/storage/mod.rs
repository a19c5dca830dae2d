//! Storage
//!
//! # Hexagonal Architecture
//! ```text
//! application/ (LineageService)
//!           ↓
//! domain/ (records, ports)
//!           ↓
//! infrastructure/ (InMemory, SQLite)
//! ```

pub mod domain;
pub mod infrastructure;

pub use domain::*;
pub use infrastructure::{open_store, InMemoryLineageStore, RelationshipIndex};

#[cfg(feature = "sqlite")]
pub use infrastructure::SqliteLineageStore;
