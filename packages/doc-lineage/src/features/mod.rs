pub mod lineage;
pub mod storage;
