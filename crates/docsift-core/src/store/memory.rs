//! In-memory [`IndexStore`] implementation.
//!
//! All tables live in one [`IndexState`] behind a single `std::sync::RwLock`,
//! so every mutation (including a whole-document commit) is atomic with
//! respect to readers. Term statistics are re-derived from the affected
//! posting lists after each change, and corpus statistics after every
//! mutation.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::bm25::Bm25Params;
use crate::error::{Error, Result};
use crate::index::{
    apply_document_totals, build_postings, compute_statistics, document_term_frequencies,
    refresh_chunk_terms, term_from_postings, IndexedDocument,
};
use crate::models::{Chunk, Document, IndexStatistics, Posting, Term};

use super::{IndexSnapshot, IndexStore, VacuumReport, SNAPSHOT_VERSION};

#[derive(Default)]
struct IndexState {
    documents: HashMap<String, Document>,
    chunks: HashMap<String, Chunk>,
    /// Chunk ids per document, ordered by `chunk_index`.
    chunks_by_doc: HashMap<String, Vec<String>>,
    terms: HashMap<String, Term>,
    /// Posting lists keyed by term.
    postings: HashMap<String, Vec<Posting>>,
    /// Terms with at least one posting in the document.
    doc_terms: HashMap<String, BTreeSet<String>>,
    /// Whole-document term frequencies, derived from the document's chunks.
    doc_frequencies: HashMap<String, BTreeMap<String, u32>>,
    stats: IndexStatistics,
}

impl IndexState {
    fn refresh_stats(&mut self) {
        self.stats = compute_statistics(
            self.documents.values(),
            self.chunks.values(),
            self.terms.values(),
        );
    }

    /// Re-derive the given terms from their posting lists, dropping terms
    /// that no longer have any.
    fn refresh_terms<I: IntoIterator<Item = String>>(&mut self, terms: I) {
        for term in terms {
            match self.postings.get(&term).and_then(|list| term_from_postings(&term, list)) {
                Some(stats) => {
                    self.terms.insert(term, stats);
                }
                None => {
                    self.postings.remove(&term);
                    self.terms.remove(&term);
                }
            }
        }
    }

    fn insert_chunk(&mut self, chunk: Chunk) {
        let id = chunk.id.clone();
        let document_id = chunk.document_id.clone();
        self.chunks.insert(id.clone(), chunk);
        let chunks = &self.chunks;
        let ids = self.chunks_by_doc.entry(document_id).or_default();
        if !ids.contains(&id) {
            ids.push(id);
        }
        ids.sort_by_key(|id| chunks.get(id).map(|c| c.chunk_index));
    }

    /// Returns the affected terms.
    fn insert_postings(&mut self, postings: &[Posting]) -> BTreeSet<String> {
        let mut affected = BTreeSet::new();
        for posting in postings {
            let list = self.postings.entry(posting.term.clone()).or_default();
            match list.iter_mut().find(|p| p.chunk_id == posting.chunk_id) {
                Some(existing) => *existing = posting.clone(),
                None => list.push(posting.clone()),
            }
            self.doc_terms
                .entry(posting.document_id.clone())
                .or_default()
                .insert(posting.term.clone());
            affected.insert(posting.term.clone());
        }
        affected
    }

    /// Returns the affected terms.
    fn remove_postings_for(&mut self, document_id: &str) -> BTreeSet<String> {
        let affected = self.doc_terms.remove(document_id).unwrap_or_default();
        for term in &affected {
            if let Some(list) = self.postings.get_mut(term) {
                list.retain(|p| p.document_id != document_id);
            }
        }
        affected
    }

    fn remove_chunks_for(&mut self, document_id: &str) {
        for id in self.chunks_by_doc.remove(document_id).unwrap_or_default() {
            self.chunks.remove(&id);
        }
        self.doc_frequencies.remove(document_id);
    }

    fn refresh_document_frequencies(&mut self, document_id: &str) {
        let chunks = self.chunks_of(document_id);
        if chunks.is_empty() {
            self.doc_frequencies.remove(document_id);
        } else {
            self.doc_frequencies
                .insert(document_id.to_string(), document_term_frequencies(&chunks));
        }
    }

    fn cascade_remove(&mut self, document_id: &str) {
        let affected = self.remove_postings_for(document_id);
        self.refresh_terms(affected);
        self.remove_chunks_for(document_id);
        self.documents.remove(document_id);
    }

    fn chunks_of(&self, document_id: &str) -> Vec<Chunk> {
        self.chunks_by_doc
            .get(document_id)
            .map(|ids| ids.iter().filter_map(|id| self.chunks.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    fn verify(&self) -> Result<()> {
        for chunk in self.chunks.values() {
            if !self.documents.contains_key(&chunk.document_id) {
                return Err(Error::InconsistentIndex(format!(
                    "chunk {} references missing document {}",
                    chunk.id, chunk.document_id
                )));
            }
        }
        for doc in self.documents.values() {
            let chunks = self.chunks_of(&doc.id);
            if chunks.len() as u64 != doc.chunk_count {
                return Err(Error::InconsistentIndex(format!(
                    "document {} records {} chunks but has {}",
                    doc.id,
                    doc.chunk_count,
                    chunks.len()
                )));
            }
            if chunks.iter().enumerate().any(|(i, c)| c.chunk_index != i) {
                return Err(Error::InconsistentIndex(format!(
                    "document {} has non-contiguous chunk indices",
                    doc.id
                )));
            }
            let tokens: u64 = chunks.iter().map(|c| c.token_count).sum();
            if tokens != doc.total_tokens {
                return Err(Error::InconsistentIndex(format!(
                    "document {} records {} tokens but its chunks hold {}",
                    doc.id, doc.total_tokens, tokens
                )));
            }
        }
        for (term, list) in &self.postings {
            let Some(stats) = self.terms.get(term) else {
                return Err(Error::InconsistentIndex(format!(
                    "postings for unknown term {term}"
                )));
            };
            if stats.chunk_frequency != list.len() as u64 {
                return Err(Error::InconsistentIndex(format!(
                    "term {term} has stale statistics"
                )));
            }
            for p in list {
                match self.chunks.get(&p.chunk_id) {
                    Some(c) if c.document_id == p.document_id => {}
                    _ => {
                        return Err(Error::InconsistentIndex(format!(
                            "posting for {term} references missing chunk {}",
                            p.chunk_id
                        )))
                    }
                }
            }
        }
        Ok(())
    }

    fn from_snapshot(snapshot: IndexSnapshot) -> Self {
        let mut state = IndexState::default();
        for doc in snapshot.documents {
            state.documents.insert(doc.id.clone(), doc);
        }
        let mut chunks = snapshot.chunks;
        chunks.sort_by(|a, b| {
            (a.document_id.as_str(), a.chunk_index).cmp(&(b.document_id.as_str(), b.chunk_index))
        });
        for chunk in chunks {
            state
                .chunks_by_doc
                .entry(chunk.document_id.clone())
                .or_default()
                .push(chunk.id.clone());
            state.chunks.insert(chunk.id.clone(), chunk);
        }
        let doc_ids: Vec<String> = state.chunks_by_doc.keys().cloned().collect();
        for doc_id in &doc_ids {
            state.refresh_document_frequencies(doc_id);
        }
        for term in snapshot.terms {
            state.terms.insert(term.term.clone(), term);
        }
        state.insert_postings(&snapshot.postings);
        state.refresh_stats();
        state
    }
}

/// In-memory index store.
pub struct InMemoryStore {
    state: RwLock<IndexState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(IndexState::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, IndexState>> {
        self.state
            .read()
            .map_err(|_| Error::InconsistentIndex("index lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, IndexState>> {
        self.state
            .write()
            .map_err(|_| Error::InconsistentIndex("index lock poisoned".into()))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn select_postings(
    state: &IndexState,
    terms: &[String],
    keep: impl Fn(&Posting) -> bool,
) -> HashMap<String, Vec<Posting>> {
    let mut out = HashMap::new();
    for term in terms {
        if out.contains_key(term) {
            continue;
        }
        if let Some(list) = state.postings.get(term) {
            let selected: Vec<Posting> = list.iter().filter(|&p| keep(p)).cloned().collect();
            if !selected.is_empty() {
                out.insert(term.clone(), selected);
            }
        }
    }
    out
}

#[async_trait]
impl IndexStore for InMemoryStore {
    async fn add_document(&self, doc: &Document) -> Result<()> {
        let mut state = self.write()?;
        state.documents.insert(doc.id.clone(), doc.clone());
        state.refresh_stats();
        Ok(())
    }

    async fn update_document(&self, doc: &Document) -> Result<()> {
        let mut state = self.write()?;
        match state.documents.get_mut(&doc.id) {
            Some(existing) => *existing = doc.clone(),
            None => return Err(Error::document_not_found(&doc.id)),
        }
        state.refresh_stats();
        Ok(())
    }

    async fn delete_document(&self, id: &str) -> Result<()> {
        let mut state = self.write()?;
        if !state.documents.contains_key(id) {
            return Err(Error::document_not_found(id));
        }
        state.cascade_remove(id);
        state.refresh_stats();
        debug!(document_id = id, "deleted document");
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.read()?.documents.get(id).cloned())
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        let state = self.read()?;
        let mut docs: Vec<Document> = state.documents.values().cloned().collect();
        docs.sort_by(|a, b| a.uploaded_at.cmp(&b.uploaded_at).then_with(|| a.id.cmp(&b.id)));
        Ok(docs)
    }

    async fn add_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        let mut state = self.write()?;
        let mut documents = BTreeSet::new();
        for chunk in chunks {
            documents.insert(chunk.document_id.clone());
            state.insert_chunk(chunk.clone());
        }
        for document_id in &documents {
            state.refresh_document_frequencies(document_id);
        }
        state.refresh_stats();
        Ok(())
    }

    async fn get_chunks_by_document(&self, document_id: &str) -> Result<Vec<Chunk>> {
        Ok(self.read()?.chunks_of(document_id))
    }

    async fn get_chunk(&self, id: &str) -> Result<Option<Chunk>> {
        Ok(self.read()?.chunks.get(id).cloned())
    }

    async fn get_chunks(&self, ids: &[String]) -> Result<Vec<Chunk>> {
        let state = self.read()?;
        Ok(ids.iter().filter_map(|id| state.chunks.get(id).cloned()).collect())
    }

    async fn add_terms(&self, terms: &[String]) -> Result<()> {
        let mut state = self.write()?;
        for term in terms {
            state
                .terms
                .entry(term.clone())
                .or_insert_with(|| Term::empty(term));
        }
        state.refresh_stats();
        Ok(())
    }

    async fn add_postings(&self, postings: &[Posting]) -> Result<()> {
        let mut state = self.write()?;
        let affected = state.insert_postings(postings);
        state.refresh_terms(affected);
        state.refresh_stats();
        Ok(())
    }

    async fn delete_terms_for_document(&self, document_id: &str) -> Result<()> {
        // term statistics are derived from postings, so the document's
        // postings go with its contribution
        let mut state = self.write()?;
        let affected = state.remove_postings_for(document_id);
        state.refresh_terms(affected);
        state.refresh_stats();
        Ok(())
    }

    async fn delete_postings_for_document(&self, document_id: &str) -> Result<()> {
        let mut state = self.write()?;
        let affected = state.remove_postings_for(document_id);
        state.refresh_terms(affected);
        state.refresh_stats();
        Ok(())
    }

    async fn commit_document(&self, indexed: IndexedDocument) -> Result<()> {
        let IndexedDocument {
            document,
            chunks,
            terms,
            postings,
        } = indexed;
        let mut state = self.write()?;
        if state.documents.contains_key(&document.id) {
            state.cascade_remove(&document.id);
        }
        let document_id = document.id.clone();
        state.documents.insert(document.id.clone(), document);
        let chunk_count = chunks.len();
        for chunk in chunks {
            state.insert_chunk(chunk);
        }
        state.refresh_document_frequencies(&document_id);
        let mut affected = state.insert_postings(&postings);
        affected.extend(terms);
        state.refresh_terms(affected);
        state.refresh_stats();
        debug!(
            document_id = %document_id,
            chunks = chunk_count,
            postings = postings.len(),
            "committed document"
        );
        Ok(())
    }

    async fn lookup_terms(&self, terms: &[String]) -> Result<HashMap<String, Term>> {
        let state = self.read()?;
        Ok(terms
            .iter()
            .filter_map(|t| state.terms.get(t).map(|stats| (t.clone(), stats.clone())))
            .collect())
    }

    async fn postings_for_terms(&self, terms: &[String]) -> Result<HashMap<String, Vec<Posting>>> {
        let state = self.read()?;
        Ok(select_postings(&state, terms, |_| true))
    }

    async fn postings_for_terms_in_documents(
        &self,
        terms: &[String],
        document_ids: &HashSet<String>,
    ) -> Result<HashMap<String, Vec<Posting>>> {
        let state = self.read()?;
        Ok(select_postings(&state, terms, |p| {
            document_ids.contains(&p.document_id)
        }))
    }

    async fn document_term_frequencies(
        &self,
        terms: &[String],
    ) -> Result<HashMap<String, HashMap<String, u32>>> {
        let state = self.read()?;
        let mut out: HashMap<String, HashMap<String, u32>> = HashMap::new();
        for term in terms {
            for posting in state.postings.get(term).into_iter().flatten() {
                let Some(&tf) = state
                    .doc_frequencies
                    .get(&posting.document_id)
                    .and_then(|freqs| freqs.get(term))
                else {
                    continue;
                };
                out.entry(posting.document_id.clone())
                    .or_default()
                    .insert(term.clone(), tf);
            }
        }
        Ok(out)
    }

    async fn get_statistics(&self) -> Result<IndexStatistics> {
        Ok(self.read()?.stats.clone())
    }

    async fn set_statistics(&self, stats: IndexStatistics) -> Result<()> {
        self.write()?.stats = stats;
        Ok(())
    }

    async fn reindex_all(&self, params: &Bm25Params) -> Result<IndexStatistics> {
        let mut state = self.write()?;

        let before = state.chunks.len();
        let live: HashSet<String> = state.documents.keys().cloned().collect();
        state.chunks.retain(|_, c| live.contains(&c.document_id));
        state.chunks_by_doc.retain(|doc_id, _| live.contains(doc_id));
        let dropped = before - state.chunks.len();

        for chunk in state.chunks.values_mut() {
            refresh_chunk_terms(chunk);
        }

        state.terms.clear();
        state.postings.clear();
        state.doc_terms.clear();
        state.doc_frequencies.clear();

        let mut doc_ids: Vec<String> = live.into_iter().collect();
        doc_ids.sort();
        let mut affected = BTreeSet::new();
        for doc_id in &doc_ids {
            let chunks = state.chunks_of(doc_id);
            if let Some(doc) = state.documents.get_mut(doc_id) {
                apply_document_totals(doc, &chunks);
            }
            let postings = build_postings(&chunks, params);
            affected.extend(state.insert_postings(&postings));
            if !chunks.is_empty() {
                state
                    .doc_frequencies
                    .insert(doc_id.clone(), document_term_frequencies(&chunks));
            }
        }
        state.refresh_terms(affected);
        state.refresh_stats();

        debug!(
            documents = doc_ids.len(),
            dropped_chunks = dropped,
            terms = state.terms.len(),
            "rebuilt index"
        );
        Ok(state.stats.clone())
    }

    async fn vacuum(&self) -> Result<VacuumReport> {
        let mut state = self.write()?;
        let mut report = VacuumReport::default();

        let orphan_ids: Vec<String> = state
            .chunks
            .values()
            .filter(|c| !state.documents.contains_key(&c.document_id))
            .map(|c| c.id.clone())
            .collect();
        report.orphan_chunks = orphan_ids.len() as u64;
        for id in &orphan_ids {
            state.chunks.remove(id);
        }
        let IndexState {
            documents,
            chunks,
            chunks_by_doc,
            postings,
            doc_terms,
            doc_frequencies,
            ..
        } = &mut *state;
        chunks_by_doc.retain(|doc_id, _| documents.contains_key(doc_id));
        doc_terms.retain(|doc_id, _| documents.contains_key(doc_id));
        doc_frequencies.retain(|doc_id, _| documents.contains_key(doc_id));

        let mut affected = BTreeSet::new();
        for (term, list) in postings.iter_mut() {
            let len = list.len();
            list.retain(|p| {
                chunks
                    .get(&p.chunk_id)
                    .is_some_and(|c| c.document_id == p.document_id)
            });
            if list.len() != len {
                report.orphan_postings += (len - list.len()) as u64;
                affected.insert(term.clone());
            }
            list.shrink_to_fit();
        }

        let unused: Vec<String> = state
            .terms
            .keys()
            .filter(|t| state.postings.get(*t).map_or(true, Vec::is_empty))
            .cloned()
            .collect();
        report.unused_terms = unused.len() as u64;
        affected.extend(unused);
        state.refresh_terms(affected);
        state.postings.retain(|_, list| !list.is_empty());
        state.refresh_stats();

        debug!(
            orphan_chunks = report.orphan_chunks,
            orphan_postings = report.orphan_postings,
            unused_terms = report.unused_terms,
            "vacuumed index"
        );
        Ok(report)
    }

    async fn verify(&self) -> Result<()> {
        self.read()?.verify()
    }

    async fn backup(&self) -> Result<IndexSnapshot> {
        let state = self.read()?;

        let mut documents: Vec<Document> = state.documents.values().cloned().collect();
        documents.sort_by(|a, b| a.id.cmp(&b.id));
        let mut chunks: Vec<Chunk> = state.chunks.values().cloned().collect();
        chunks.sort_by(|a, b| {
            (a.document_id.as_str(), a.chunk_index).cmp(&(b.document_id.as_str(), b.chunk_index))
        });
        let mut terms: Vec<Term> = state.terms.values().cloned().collect();
        terms.sort_by(|a, b| a.term.cmp(&b.term));
        let mut postings: Vec<Posting> = state.postings.values().flatten().cloned().collect();
        postings.sort_by(|a, b| (&a.term, &a.chunk_id).cmp(&(&b.term, &b.chunk_id)));

        Ok(IndexSnapshot {
            version: SNAPSHOT_VERSION,
            created_at: Utc::now(),
            documents,
            chunks,
            terms,
            postings,
            statistics: state.stats.clone(),
        })
    }

    async fn restore(&self, snapshot: IndexSnapshot) -> Result<()> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(Error::InconsistentIndex(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }
        let restored = IndexState::from_snapshot(snapshot);
        restored.verify()?;
        let mut state = self.write()?;
        *state = restored;
        debug!(
            documents = state.documents.len(),
            chunks = state.chunks.len(),
            "restored index"
        );
        Ok(())
    }
}
