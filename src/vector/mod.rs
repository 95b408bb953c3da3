//! C3 — Vector Store Adapter.

pub mod store;

pub use store::{INDEX_TYPE, METRIC_TYPE, MilvusVectorStore, NLIST, NPROBE, VectorHit, VectorStoreAdapter};
