//! Application Layer

pub mod lineage_service;

pub use lineage_service::LineageService;
