//! Candidate-profile hybrid search service: fuses a lexical filter index
//! and a semantic ANN index over candidate documents, kept consistent with
//! an upstream source-of-truth through event-driven updates and periodic
//! zero-downtime full rebuilds.
//!
//! Module-to-component mapping (see `DESIGN.md` for the full grounding
//! ledger):
//!
//! | Component | Module |
//! |---|---|
//! | C1 Embedding Gate | [`embedding`] |
//! | C2 Lexical Store Adapter | [`lexical`] |
//! | C3 Vector Store Adapter | [`vector`] |
//! | C4 Candidate Source Client | [`source`] |
//! | C5 Document Projector | [`candidate`] |
//! | C6 Indexer | [`indexer`] |
//! | C7 Hybrid Search Engine | [`search`] |
//! | C8 Ingest Consumer | [`consumer`] |

pub mod app;
pub mod candidate;
pub mod config;
pub mod consumer;
pub mod embedding;
pub mod error;
pub mod http;
pub mod indexer;
pub mod lexical;
pub mod search;
pub mod source;
pub mod telemetry;
pub mod vector;

pub use app::Application;
pub use error::{Result, SearchServiceError};
