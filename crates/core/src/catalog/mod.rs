//! Catalog search vocabulary and value types shared by the catalog store and the
//! retrieval pipeline.

pub mod filters;
pub mod money;
pub mod vocabulary;
