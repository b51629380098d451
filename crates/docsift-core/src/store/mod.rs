//! Storage abstraction for docsift.
//!
//! The [`IndexStore`] trait defines every storage operation the ingest
//! pipeline and the search orchestrator need, so backends are pluggable.
//! [`memory::InMemoryStore`] is the reference implementation.
//!
//! Implementations must be `Send + Sync` to work with async runtimes, and
//! must re-derive [`IndexStatistics`] before any mutating call returns.

pub mod memory;

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bm25::Bm25Params;
use crate::error::Result;
use crate::index::IndexedDocument;
use crate::models::{Chunk, Document, IndexStatistics, Posting, Term};

/// Current [`IndexSnapshot`] format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Full, self-contained copy of an index.
///
/// Collections are sorted (documents by id, chunks by document then index,
/// terms by term, postings by term then chunk) so equal indexes produce
/// equal snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub documents: Vec<Document>,
    pub chunks: Vec<Chunk>,
    pub terms: Vec<Term>,
    pub postings: Vec<Posting>,
    pub statistics: IndexStatistics,
}

/// What [`IndexStore::vacuum`] removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VacuumReport {
    pub orphan_chunks: u64,
    pub orphan_postings: u64,
    pub unused_terms: u64,
}

impl VacuumReport {
    pub fn is_clean(&self) -> bool {
        self.orphan_chunks == 0 && self.orphan_postings == 0 && self.unused_terms == 0
    }
}

/// Abstract storage backend for docsift.
///
/// All operations are async (via `async-trait`). In-memory implementations
/// return immediately-ready futures.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`add_document`](IndexStore::add_document) | Insert or overwrite a document record |
/// | [`update_document`](IndexStore::update_document) | Overwrite an existing document record |
/// | [`delete_document`](IndexStore::delete_document) | Remove a document with its chunks, postings, and orphaned terms |
/// | [`commit_document`](IndexStore::commit_document) | Atomically replace a document and all its index records |
/// | [`postings_for_terms`](IndexStore::postings_for_terms) | Posting lists for the query terms |
/// | [`reindex_all`](IndexStore::reindex_all) | Rebuild terms and postings from the live chunks |
/// | [`backup`](IndexStore::backup) / [`restore`](IndexStore::restore) | Snapshot round-trip |
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Insert a document record, overwriting one with the same id.
    async fn add_document(&self, doc: &Document) -> Result<()>;

    /// Overwrite an existing document record. `NotFound` if absent.
    async fn update_document(&self, doc: &Document) -> Result<()>;

    /// Remove a document and cascade to its chunks, postings, and any term
    /// left without postings. `NotFound` if absent.
    async fn delete_document(&self, id: &str) -> Result<()>;

    async fn get_document(&self, id: &str) -> Result<Option<Document>>;

    /// All documents, oldest upload first.
    async fn list_documents(&self) -> Result<Vec<Document>>;

    /// Insert chunks, replacing any with the same id.
    async fn add_chunks(&self, chunks: &[Chunk]) -> Result<()>;

    /// A document's chunks ordered by `chunk_index`.
    async fn get_chunks_by_document(&self, document_id: &str) -> Result<Vec<Chunk>>;

    async fn get_chunk(&self, id: &str) -> Result<Option<Chunk>>;

    /// Chunks for the given ids. Unknown ids are skipped.
    async fn get_chunks(&self, ids: &[String]) -> Result<Vec<Chunk>>;

    /// Register vocabulary entries. Existing entries are left unchanged.
    async fn add_terms(&self, terms: &[String]) -> Result<()>;

    /// Insert postings, replacing any for the same (term, chunk), and update
    /// the statistics of the affected terms.
    async fn add_postings(&self, postings: &[Posting]) -> Result<()>;

    /// Drop this document's contribution from term statistics, removing
    /// terms that no longer occur anywhere. Term statistics are derived from
    /// postings, so the document's postings are removed as well. Idempotent.
    async fn delete_terms_for_document(&self, document_id: &str) -> Result<()>;

    /// Remove every posting of this document. Idempotent.
    async fn delete_postings_for_document(&self, document_id: &str) -> Result<()>;

    /// Replace a document and everything derived from it in one step.
    /// Readers observe either the old state or the new one.
    async fn commit_document(&self, indexed: IndexedDocument) -> Result<()>;

    /// Vocabulary entries for the given terms. Unknown terms are absent.
    async fn lookup_terms(&self, terms: &[String]) -> Result<HashMap<String, Term>>;

    /// Posting lists for the given terms.
    async fn postings_for_terms(&self, terms: &[String]) -> Result<HashMap<String, Vec<Posting>>>;

    /// Posting lists restricted to the given documents.
    async fn postings_for_terms_in_documents(
        &self,
        terms: &[String],
        document_ids: &HashSet<String>,
    ) -> Result<HashMap<String, Vec<Posting>>>;

    /// Document id -> term -> occurrences in the whole document, for the
    /// documents containing any of `terms`. Text shared by adjacent chunks
    /// counts once.
    async fn document_term_frequencies(
        &self,
        terms: &[String],
    ) -> Result<HashMap<String, HashMap<String, u32>>>;

    async fn get_statistics(&self) -> Result<IndexStatistics>;

    /// Overwrite the stored statistics. The next mutation re-derives them.
    async fn set_statistics(&self, stats: IndexStatistics) -> Result<()>;

    /// Discard all terms and postings and rebuild them from the live chunks,
    /// recording field weights from `params`. Chunks of missing documents
    /// are dropped.
    async fn reindex_all(&self, params: &Bm25Params) -> Result<IndexStatistics>;

    /// Drop orphaned chunks and postings and terms without postings.
    async fn vacuum(&self) -> Result<VacuumReport>;

    /// Check referential integrity. `InconsistentIndex` on the first defect.
    async fn verify(&self) -> Result<()>;

    async fn backup(&self) -> Result<IndexSnapshot>;

    /// Replace the whole index with `snapshot`. The current index is kept
    /// if the snapshot is inconsistent or of an unknown version.
    async fn restore(&self, snapshot: IndexSnapshot) -> Result<()>;
}
