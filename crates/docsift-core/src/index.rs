//! Derivation of index records from segmented documents.
//!
//! Everything a store persists for a document (postings, vocabulary, the
//! document's aggregate counts) and every corpus statistic is derived here,
//! so that ingest, `reindex_all`, and any store backend compute them the
//! same way.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::bm25::Bm25Params;
use crate::models::{Chunk, Document, DocumentStatus, IndexStatistics, Posting, Term};
use crate::terms::{term_positions, term_stream, term_frequencies};

/// A document with everything needed to commit it atomically.
#[derive(Debug, Clone)]
pub struct IndexedDocument {
    pub document: Document,
    pub chunks: Vec<Chunk>,
    /// Distinct vocabulary terms introduced by the chunks.
    pub terms: Vec<String>,
    pub postings: Vec<Posting>,
}

/// Fill in the document's aggregates and build its postings.
pub fn index_document(mut document: Document, chunks: Vec<Chunk>, params: &Bm25Params) -> IndexedDocument {
    apply_document_totals(&mut document, &chunks);
    let postings = build_postings(&chunks, params);
    let terms: BTreeSet<&str> = postings.iter().map(|p| p.term.as_str()).collect();
    let terms = terms.into_iter().map(str::to_string).collect();
    IndexedDocument {
        document,
        chunks,
        terms,
        postings,
    }
}

/// Set token, chunk, and term totals on `document` from its chunks.
///
/// Term totals count the overlap between adjacent chunks once; token totals
/// are the plain sum of chunk token counts.
pub fn apply_document_totals(document: &mut Document, chunks: &[Chunk]) {
    document.total_tokens = chunks.iter().map(|c| c.token_count).sum();
    document.chunk_count = chunks.len() as u64;
    let frequencies = document_term_frequencies(chunks);
    let total_terms: u64 = frequencies.values().map(|&tf| tf as u64).sum();
    document.term_stats.total_terms = total_terms;
    document.term_stats.unique_terms = frequencies.len() as u64;
    document.term_stats.avg_terms_per_chunk = if chunks.is_empty() {
        0.0
    } else {
        total_terms as f64 / chunks.len() as f64
    };
}

/// The document text covered by `chunks` (ordered by index), with each
/// overlap region kept once. Gaps between chunks become a line break.
fn covered_text(chunks: &[Chunk]) -> String {
    let mut text = String::new();
    let mut covered_to = 0usize;
    for chunk in chunks {
        if chunk.start_offset >= covered_to {
            if chunk.start_offset > covered_to && !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&chunk.text);
        } else if let Some(rest) = chunk.text.get(covered_to - chunk.start_offset..) {
            text.push_str(rest);
        }
        covered_to = covered_to.max(chunk.end_offset);
    }
    text
}

/// Term frequencies over the whole document. Unlike summing chunk
/// frequencies, terms in an overlap region are counted once.
pub fn document_term_frequencies(chunks: &[Chunk]) -> BTreeMap<String, u32> {
    term_frequencies(&term_stream(&covered_text(chunks)))
}

/// Recompute a chunk's term frequencies from its text.
pub fn refresh_chunk_terms(chunk: &mut Chunk) {
    let stream = term_stream(chunk.text.trim());
    chunk.term_frequencies = term_frequencies(&stream);
}

/// One posting per (term, chunk), with field weights and positions.
pub fn build_postings(chunks: &[Chunk], params: &Bm25Params) -> Vec<Posting> {
    let mut postings = Vec::new();
    for chunk in chunks {
        let weights = params.field_weights_for(chunk);
        let stream = term_stream(chunk.text.trim());
        let positions = term_positions(&stream);
        for (term, &tf) in &chunk.term_frequencies {
            postings.push(Posting {
                term: term.clone(),
                document_id: chunk.document_id.clone(),
                chunk_id: chunk.id.clone(),
                term_frequency: tf,
                field_weights: weights,
                positions: positions.get(term).cloned(),
            });
        }
    }
    postings
}

/// Term statistics derived from the term's postings. `None` when empty.
pub fn term_from_postings(term: &str, postings: &[Posting]) -> Option<Term> {
    if postings.is_empty() {
        return None;
    }
    let documents: HashSet<&str> = postings.iter().map(|p| p.document_id.as_str()).collect();
    let total: u64 = postings.iter().map(|p| p.term_frequency as u64).sum();
    let max = postings.iter().map(|p| p.term_frequency).max().unwrap_or(0);
    Some(Term {
        term: term.to_string(),
        document_frequency: documents.len() as u64,
        chunk_frequency: postings.len() as u64,
        total_frequency: total,
        avg_frequency: total as f64 / postings.len() as f64,
        max_frequency: max,
    })
}

/// Corpus statistics. Only completed documents count toward the corpus.
pub fn compute_statistics<'a>(
    documents: impl Iterator<Item = &'a Document>,
    chunks: impl Iterator<Item = &'a Chunk>,
    terms: impl Iterator<Item = &'a Term>,
) -> IndexStatistics {
    let (doc_count, doc_tokens) = documents
        .filter(|d| d.status == DocumentStatus::Completed)
        .fold((0u64, 0u64), |(n, t), d| (n + 1, t + d.total_tokens));
    let (chunk_count, chunk_tokens) =
        chunks.fold((0u64, 0u64), |(n, t), c| (n + 1, t + c.token_count));
    let (unique, total_terms) = terms
        .filter(|t| t.chunk_frequency > 0)
        .fold((0u64, 0u64), |(n, t), term| (n + 1, t + term.total_frequency));

    IndexStatistics {
        total_documents: doc_count,
        total_chunks: chunk_count,
        total_terms,
        unique_terms: unique,
        avg_document_length: if doc_count == 0 {
            0.0
        } else {
            doc_tokens as f64 / doc_count as f64
        },
        avg_chunk_length: if chunk_count == 0 {
            0.0
        } else {
            chunk_tokens as f64 / chunk_count as f64
        },
    }
}
