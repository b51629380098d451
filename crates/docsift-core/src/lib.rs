//! # docsift core
//!
//! Runtime-agnostic engine for docsift: term extraction with CJK n-grams,
//! token-bounded segmentation, a two-tier (document and chunk) BM25 index,
//! and hierarchical search with optional pseudo-relevance feedback.
//!
//! This crate contains no async runtime and no filesystem I/O. Storage goes
//! through the [`store::IndexStore`] trait; [`store::memory::InMemoryStore`]
//! is the bundled backend.
//!
//! | Module | Role |
//! |--------|------|
//! | [`terms`] | Term Extractor |
//! | [`chunk`] | Segmenter |
//! | [`bm25`] | BM25 Scorer |
//! | [`query`] | Query Processor |
//! | [`index`] | Derivation of postings and statistics |
//! | [`store`] | Index Store |
//! | [`search`] | Hierarchical Search Orchestrator |
//! | [`engine`] | Ingest and maintenance facade |

pub mod bm25;
pub mod chunk;
pub mod engine;
pub mod error;
pub mod index;
pub mod models;
pub mod query;
pub mod search;
pub mod store;
pub mod terms;

pub use error::{Error, Result};
