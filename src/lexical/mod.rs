//! C2 — Lexical Store Adapter.

pub mod query;
pub mod store;

pub use query::build_query;
pub use store::{BulkResult, EsLexicalStore, LexicalHit, LexicalStoreAdapter};
