//! Core data models used throughout docsift.
//!
//! These types represent the documents, chunks, vocabulary terms, and
//! postings that flow through the ingestion and retrieval pipeline. All of
//! them serialize with `serde` so a full index can be snapshotted.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Processing lifecycle of an ingested document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Processing,
    Completed,
    Error,
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Per-document term statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentTermStats {
    /// Term occurrences in the document text, overlap between chunks counted once.
    pub total_terms: u64,
    /// Distinct terms in the document.
    pub unique_terms: u64,
    /// `total_terms / chunk_count`.
    pub avg_terms_per_chunk: f64,
}

/// A business document known to the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    /// Display name, usually the source file name.
    pub name: String,
    pub media_type: String,
    pub size_bytes: u64,
    pub title: Option<String>,
    pub language: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub modified_at: DateTime<Utc>,
    pub status: DocumentStatus,
    /// Failure detail when `status == Error`.
    pub error: Option<String>,
    /// Sum of `token_count` over this document's chunks.
    pub total_tokens: u64,
    pub chunk_count: u64,
    pub term_stats: DocumentTermStats,
    /// SHA-256 of the extracted text, used to detect unchanged re-ingests.
    pub content_hash: String,
}

impl Document {
    /// A fresh document in the `processing` state.
    pub fn new(id: String, name: &str, media_type: &str, size_bytes: u64) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.to_string(),
            media_type: media_type.to_string(),
            size_bytes,
            title: None,
            language: None,
            uploaded_at: now,
            processed_at: None,
            modified_at: now,
            status: DocumentStatus::Processing,
            error: None,
            total_tokens: 0,
            chunk_count: 0,
            term_stats: DocumentTermStats::default(),
            content_hash: String::new(),
        }
    }

    /// Whether the document was fully indexed.
    pub fn is_completed(&self) -> bool {
        self.status == DocumentStatus::Completed
    }
}

/// A token-bounded slice of a document's text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    /// Position within the document, contiguous from 0.
    pub chunk_index: usize,
    /// Exactly `source[start_offset..end_offset]`.
    pub text: String,
    pub token_count: u64,
    /// Byte offset of the first byte in the source text.
    pub start_offset: usize,
    /// Byte offset one past the last byte in the source text.
    pub end_offset: usize,
    pub is_title: bool,
    pub is_table_header: bool,
    pub section_title: Option<String>,
    pub page_number: Option<u32>,
    /// Term frequencies computed from the trimmed chunk text.
    pub term_frequencies: BTreeMap<String, u32>,
    /// SHA-256 of `text`.
    pub hash: String,
    /// Heuristic quality score in `[0, 1]`.
    pub quality: f64,
}

/// Corpus-wide statistics for one vocabulary term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub term: String,
    /// Documents containing the term.
    pub document_frequency: u64,
    /// Chunks containing the term.
    pub chunk_frequency: u64,
    /// Total occurrences across all chunks.
    pub total_frequency: u64,
    /// `total_frequency / chunk_frequency`.
    pub avg_frequency: f64,
    /// Largest per-chunk frequency.
    pub max_frequency: u32,
}

impl Term {
    pub(crate) fn empty(term: &str) -> Self {
        Self {
            term: term.to_string(),
            document_frequency: 0,
            chunk_frequency: 0,
            total_frequency: 0,
            avg_frequency: 0.0,
            max_frequency: 0,
        }
    }
}

/// Multipliers recorded on a posting for the structural role of its chunk.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldWeights {
    pub title: f64,
    pub content: f64,
    pub table_header: f64,
}

impl FieldWeights {
    /// The weight applied when scoring: the strongest applicable field.
    pub fn effective(&self) -> f64 {
        self.content.max(self.title).max(self.table_header)
    }
}

/// One (term, document, chunk) occurrence record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub term: String,
    pub document_id: String,
    pub chunk_id: String,
    pub term_frequency: u32,
    pub field_weights: FieldWeights,
    /// Positions in the chunk's term stream. Reserved for phrase matching.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub positions: Option<Vec<u32>>,
}

/// Corpus-wide aggregates, re-derived after every structural mutation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexStatistics {
    pub total_documents: u64,
    pub total_chunks: u64,
    /// Sum of all term occurrences in the corpus.
    pub total_terms: u64,
    pub unique_terms: u64,
    /// Average `Document::total_tokens`.
    pub avg_document_length: f64,
    /// Average `Chunk::token_count`.
    pub avg_chunk_length: f64,
}
