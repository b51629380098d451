//! Two-stage BM25 retrieval.
//!
//! The orchestrator works entirely through the [`IndexStore`] trait. It has
//! no persistence or configuration dependencies beyond the option structs.
//!
//! # Hierarchical mode
//!
//! 1. Process the query into original and synonym terms.
//! 2. **Coarse stage**: score every document with document-level BM25
//!    (field weight 1.0, length = document tokens). Keep the best `top_k`;
//!    documents with no matching term or a zero score are dropped. No
//!    candidates means an empty result.
//! 3. **Fine stage**: score the chunks of the candidate documents with
//!    chunk-level BM25, using the field weight recorded on each posting.
//! 4. **PRF** (optional): mine expansion terms from the top fine-stage hits
//!    and re-run the fine stage with them.
//! 5. Drop hits under `min_score` and truncate to `top_n`.
//!
//! # Flat mode
//!
//! Skips the coarse stage and scores every chunk in the index.
//!
//! # Ordering
//!
//! Score descending. Ties break on document id ascending, then chunk index
//! ascending, so equal inputs always produce equal rankings.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::bm25::{self, Bm25Params, TermStats};
use crate::error::{Error, Result};
use crate::models::{Chunk, Document, IndexStatistics, Posting, Term};
use crate::query::QueryProcessor;
use crate::store::IndexStore;

/// Fine-stage hits mined for feedback terms.
const PRF_TOP_RESULTS: usize = 3;
/// Feedback terms added to the query.
const PRF_EXPANSION_TERMS: usize = 5;

/// Per-query retrieval options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    /// Documents kept by the coarse stage.
    pub top_k: usize,
    /// Chunks returned.
    pub top_n: usize,
    pub use_hierarchical_search: bool,
    pub use_prf: bool,
    pub explain: bool,
    /// Hits scoring below this are dropped.
    pub min_score: f64,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_k: 10,
            top_n: 5,
            use_hierarchical_search: true,
            use_prf: false,
            explain: false,
            min_score: 0.01,
        }
    }
}

impl SearchOptions {
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(Error::InvalidOptions("top_k must be > 0".into()));
        }
        if self.top_n == 0 {
            return Err(Error::InvalidOptions("top_n must be > 0".into()));
        }
        if !self.min_score.is_finite() {
            return Err(Error::InvalidOptions("min_score must be finite".into()));
        }
        Ok(())
    }
}

/// Cooperative cancellation flag shared between a caller and a search.
///
/// Scoring loops check it between documents and between chunks.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Hierarchical,
    Flat,
}

/// Where a scored term came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TermOrigin {
    Query,
    Synonym,
    Feedback,
}

/// One term's share of a chunk score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermContribution {
    pub term: String,
    pub origin: TermOrigin,
    pub tf: u32,
    /// Chunks containing the term.
    pub df: u64,
    pub idf: f64,
    pub field_weight: f64,
    pub contribution: f64,
}

/// Scoring breakdown for a hit (populated when `explain` is set).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreExplanation {
    pub mode: SearchMode,
    /// Documents that reached the fine stage.
    pub candidate_documents: usize,
    /// Coarse-stage score of the hit's document (hierarchical only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_score: Option<f64>,
    pub terms: Vec<TermContribution>,
    /// Terms added by pseudo-relevance feedback.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub prf_terms: Vec<String>,
}

/// A ranked chunk with its document.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub document: Document,
    pub chunk: Chunk,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<ScoreExplanation>,
}

/// Collaborators a search runs against.
pub struct SearchContext<'a, S: IndexStore + ?Sized> {
    pub store: &'a S,
    pub processor: &'a QueryProcessor,
    pub params: &'a Bm25Params,
}

/// A single search invocation.
#[derive(Debug, Clone, Copy)]
pub struct SearchRequest<'a> {
    pub query: &'a str,
    pub options: &'a SearchOptions,
    pub cancel: Option<&'a CancelToken>,
}

impl<'a> SearchRequest<'a> {
    pub fn new(query: &'a str, options: &'a SearchOptions) -> Self {
        Self {
            query,
            options,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, cancel: &'a CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn check(&self) -> Result<()> {
        self.cancel.map_or(Ok(()), CancelToken::check)
    }
}

#[derive(Debug, Clone)]
struct QueryTerm {
    term: String,
    origin: TermOrigin,
}

#[derive(Debug, Clone)]
struct ScoredChunk {
    chunk: Chunk,
    score: f64,
    contributions: Vec<TermContribution>,
}

#[derive(Clone, Copy)]
enum Scope<'a> {
    All,
    Documents(&'a HashSet<String>),
}

/// Run a search in the mode selected by `use_hierarchical_search`.
pub async fn search<S: IndexStore + ?Sized>(
    ctx: &SearchContext<'_, S>,
    req: &SearchRequest<'_>,
) -> Result<Vec<SearchHit>> {
    if req.options.use_hierarchical_search {
        search_hierarchical(ctx, req).await
    } else {
        search_flat(ctx, req).await
    }
}

/// Documents first, then chunks within the best documents.
#[instrument(skip_all, fields(query = req.query))]
pub async fn search_hierarchical<S: IndexStore + ?Sized>(
    ctx: &SearchContext<'_, S>,
    req: &SearchRequest<'_>,
) -> Result<Vec<SearchHit>> {
    req.options.validate()?;
    let Some((terms, stats)) = prepare(ctx, req).await? else {
        return Ok(Vec::new());
    };

    let documents = coarse_stage(ctx, req, &terms, &stats).await?;
    if documents.is_empty() {
        debug!("no candidate documents");
        return Ok(Vec::new());
    }
    let candidates: HashSet<String> = documents.keys().cloned().collect();
    debug!(candidates = candidates.len(), "coarse stage done");

    finish(
        ctx,
        req,
        terms,
        &stats,
        Scope::Documents(&candidates),
        SearchMode::Hierarchical,
        Some(&documents),
    )
    .await
}

/// Every chunk in the index, no document pre-filter.
#[instrument(skip_all, fields(query = req.query))]
pub async fn search_flat<S: IndexStore + ?Sized>(
    ctx: &SearchContext<'_, S>,
    req: &SearchRequest<'_>,
) -> Result<Vec<SearchHit>> {
    req.options.validate()?;
    let Some((terms, stats)) = prepare(ctx, req).await? else {
        return Ok(Vec::new());
    };
    finish(ctx, req, terms, &stats, Scope::All, SearchMode::Flat, None).await
}

/// Query terms and corpus statistics, or `None` when nothing can match.
async fn prepare<S: IndexStore + ?Sized>(
    ctx: &SearchContext<'_, S>,
    req: &SearchRequest<'_>,
) -> Result<Option<(Vec<QueryTerm>, IndexStatistics)>> {
    let processed = ctx.processor.process(req.query);
    if processed.is_empty() {
        return Ok(None);
    }
    let mut terms: Vec<QueryTerm> = processed
        .terms
        .into_iter()
        .map(|term| QueryTerm {
            term,
            origin: TermOrigin::Query,
        })
        .collect();
    terms.extend(processed.expanded_terms.into_iter().map(|term| QueryTerm {
        term,
        origin: TermOrigin::Synonym,
    }));

    let stats = ctx.store.get_statistics().await?;
    if stats.total_chunks == 0 {
        return Ok(None);
    }
    Ok(Some((terms, stats)))
}

fn term_names(terms: &[QueryTerm]) -> Vec<String> {
    terms.iter().map(|t| t.term.clone()).collect()
}

/// Document id -> coarse score for the best `top_k` documents.
async fn coarse_stage<S: IndexStore + ?Sized>(
    ctx: &SearchContext<'_, S>,
    req: &SearchRequest<'_>,
    terms: &[QueryTerm],
    stats: &IndexStatistics,
) -> Result<HashMap<String, f64>> {
    let names = term_names(terms);
    let vocab = ctx.store.lookup_terms(&names).await?;
    let doc_tf = ctx.store.document_term_frequencies(&names).await?;

    let mut documents = ctx.store.list_documents().await?;
    documents.retain(Document::is_completed);
    documents.sort_by(|a, b| a.id.cmp(&b.id));

    let mut scored: Vec<(String, f64)> = Vec::new();
    for doc in &documents {
        req.check()?;
        let Some(tfs) = doc_tf.get(&doc.id) else {
            continue;
        };
        let mut score = 0.0;
        for qt in terms {
            let (Some(&tf), Some(term)) = (tfs.get(qt.term.as_str()), vocab.get(&qt.term)) else {
                continue;
            };
            score += bm25::score(
                &TermStats {
                    tf: tf as f64,
                    length: doc.total_tokens as f64,
                    avg_length: stats.avg_document_length,
                    df: term.document_frequency as f64,
                    n: stats.total_documents as f64,
                    weight: 1.0,
                },
                ctx.params,
            );
        }
        if score != 0.0 {
            scored.push((doc.id.clone(), score));
        }
    }

    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    scored.truncate(req.options.top_k);
    Ok(scored.into_iter().collect())
}

/// Score chunks in `scope` against `terms`, best first.
async fn fine_stage<S: IndexStore + ?Sized>(
    ctx: &SearchContext<'_, S>,
    req: &SearchRequest<'_>,
    terms: &[QueryTerm],
    stats: &IndexStatistics,
    scope: Scope<'_>,
) -> Result<Vec<ScoredChunk>> {
    let names = term_names(terms);
    let vocab: HashMap<String, Term> = ctx.store.lookup_terms(&names).await?;
    let postings = match scope {
        Scope::All => ctx.store.postings_for_terms(&names).await?,
        Scope::Documents(ids) => {
            ctx.store
                .postings_for_terms_in_documents(&names, ids)
                .await?
        }
    };

    let mut by_chunk: BTreeMap<&str, HashMap<&str, &Posting>> = BTreeMap::new();
    for (term, list) in &postings {
        for p in list {
            by_chunk
                .entry(p.chunk_id.as_str())
                .or_default()
                .insert(term.as_str(), p);
        }
    }
    let chunk_ids: Vec<String> = by_chunk.keys().map(|id| id.to_string()).collect();
    let chunks = ctx.store.get_chunks(&chunk_ids).await?;

    let mut scored = Vec::new();
    for chunk in chunks {
        req.check()?;
        let Some(matched) = by_chunk.get(chunk.id.as_str()) else {
            continue;
        };
        let mut score = 0.0;
        let mut contributions = Vec::new();
        for qt in terms {
            let (Some(posting), Some(term)) = (matched.get(qt.term.as_str()), vocab.get(&qt.term))
            else {
                continue;
            };
            let ts = TermStats {
                tf: posting.term_frequency as f64,
                length: chunk.token_count as f64,
                avg_length: stats.avg_chunk_length,
                df: term.chunk_frequency as f64,
                n: stats.total_chunks as f64,
                weight: posting.field_weights.effective(),
            };
            let contribution = bm25::score(&ts, ctx.params);
            score += contribution;
            contributions.push(TermContribution {
                term: qt.term.clone(),
                origin: qt.origin,
                tf: posting.term_frequency,
                df: term.chunk_frequency,
                idf: bm25::idf(ts.df, ts.n),
                field_weight: ts.weight,
                contribution,
            });
        }
        if contributions.is_empty() || score == 0.0 {
            continue;
        }
        scored.push(ScoredChunk {
            chunk,
            score,
            contributions,
        });
    }

    scored.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.chunk.document_id.cmp(&b.chunk.document_id))
            .then_with(|| a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
    });
    Ok(scored)
}

/// Expansion terms mined from the best hits: each term is weighted by its
/// frequency times the score of the chunk it came from.
fn feedback_terms(ranked: &[ScoredChunk], query: &[QueryTerm]) -> Vec<String> {
    let existing: HashSet<&str> = query.iter().map(|t| t.term.as_str()).collect();
    let mut weights: HashMap<&str, f64> = HashMap::new();
    for hit in ranked.iter().take(PRF_TOP_RESULTS) {
        for (term, &tf) in &hit.chunk.term_frequencies {
            if existing.contains(term.as_str()) {
                continue;
            }
            *weights.entry(term.as_str()).or_insert(0.0) += tf as f64 * hit.score;
        }
    }
    let mut weighted: Vec<(&str, f64)> = weights.into_iter().filter(|(_, w)| *w > 0.0).collect();
    weighted.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    weighted
        .into_iter()
        .take(PRF_EXPANSION_TERMS)
        .map(|(t, _)| t.to_string())
        .collect()
}

async fn finish<S: IndexStore + ?Sized>(
    ctx: &SearchContext<'_, S>,
    req: &SearchRequest<'_>,
    mut terms: Vec<QueryTerm>,
    stats: &IndexStatistics,
    scope: Scope<'_>,
    mode: SearchMode,
    document_scores: Option<&HashMap<String, f64>>,
) -> Result<Vec<SearchHit>> {
    let mut ranked = fine_stage(ctx, req, &terms, stats, scope).await?;

    let mut prf_terms = Vec::new();
    if req.options.use_prf && !ranked.is_empty() {
        prf_terms = feedback_terms(&ranked, &terms);
        if !prf_terms.is_empty() {
            debug!(terms = ?prf_terms, "expanding query with feedback terms");
            terms.extend(prf_terms.iter().map(|term| QueryTerm {
                term: term.clone(),
                origin: TermOrigin::Feedback,
            }));
            ranked = fine_stage(ctx, req, &terms, stats, scope).await?;
        }
    }

    let candidate_documents = match scope {
        Scope::Documents(ids) => ids.len(),
        Scope::All => ranked
            .iter()
            .map(|c| c.chunk.document_id.as_str())
            .collect::<HashSet<_>>()
            .len(),
    };

    ranked.retain(|c| c.score >= req.options.min_score);
    ranked.truncate(req.options.top_n);

    let mut documents: HashMap<String, Document> = HashMap::new();
    let mut hits = Vec::with_capacity(ranked.len());
    for scored in ranked {
        let document_id = scored.chunk.document_id.clone();
        if !documents.contains_key(&document_id) {
            match ctx.store.get_document(&document_id).await? {
                Some(doc) => {
                    documents.insert(document_id.clone(), doc);
                }
                None => {
                    warn!(document_id = %document_id, "chunk without document, skipping hit");
                    continue;
                }
            }
        }
        let Some(document) = documents.get(&document_id).cloned() else {
            continue;
        };
        let explanation = req.options.explain.then(|| ScoreExplanation {
            mode,
            candidate_documents,
            document_score: document_scores.and_then(|s| s.get(&document_id).copied()),
            terms: scored.contributions,
            prf_terms: prf_terms.clone(),
        });
        hits.push(SearchHit {
            document,
            chunk: scored.chunk,
            score: scored.score,
            explanation,
        });
    }

    debug!(hits = hits.len(), mode = ?mode, "search done");
    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{segment, ChunkingConfig};
    use crate::index::index_document;
    use crate::models::DocumentStatus;
    use crate::store::memory::InMemoryStore;

    async fn corpus(docs: &[(&str, &str)]) -> InMemoryStore {
        let store = InMemoryStore::new();
        for (id, text) in docs {
            let mut doc = Document::new(id.to_string(), &format!("{id}.txt"), "text/plain", 0);
            doc.status = DocumentStatus::Completed;
            let chunks = segment(id, text, &ChunkingConfig::default());
            store
                .commit_document(index_document(doc, chunks, &Bm25Params::default()))
                .await
                .unwrap();
        }
        store
    }

    async fn run(store: &InMemoryStore, query: &str, options: &SearchOptions) -> Result<Vec<SearchHit>> {
        let processor = QueryProcessor::default();
        let params = Bm25Params::default();
        let ctx = SearchContext {
            store,
            processor: &processor,
            params: &params,
        };
        search(&ctx, &SearchRequest::new(query, options)).await
    }

    fn fleet() -> Vec<(&'static str, &'static str)> {
        vec![
            ("a", "The quarterly budget review covers marketing spend."),
            ("b", "Travel expenses need receipts for reimbursement."),
            ("c", "Office supplies are ordered every month."),
            ("d", "Security training is mandatory for new hires."),
        ]
    }

    #[tokio::test]
    async fn test_hierarchical_finds_matching_document() {
        let store = corpus(&fleet()).await;
        let hits = run(&store, "budget review", &SearchOptions::default()).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document.id, "a");
        assert!(hits[0].explanation.is_none());
    }

    #[tokio::test]
    async fn test_flat_mode_matches() {
        let store = corpus(&fleet()).await;
        let options = SearchOptions {
            use_hierarchical_search: false,
            ..Default::default()
        };
        let hits = run(&store, "receipts", &options).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document.id, "b");
    }

    #[tokio::test]
    async fn test_no_match_is_empty() {
        let store = corpus(&fleet()).await;
        let hits = run(&store, "zeppelin", &SearchOptions::default()).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_empty_index_is_empty() {
        let store = InMemoryStore::new();
        let hits = run(&store, "budget", &SearchOptions::default()).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_options() {
        let store = corpus(&fleet()).await;
        let options = SearchOptions {
            top_n: 0,
            ..Default::default()
        };
        let err = run(&store, "budget", &options).await.unwrap_err();
        assert!(matches!(err, Error::InvalidOptions(_)));
    }

    #[tokio::test]
    async fn test_explain_populated() {
        let store = corpus(&fleet()).await;
        let options = SearchOptions {
            explain: true,
            ..Default::default()
        };
        let hits = run(&store, "marketing", &options).await.unwrap();
        let explanation = hits[0].explanation.as_ref().unwrap();
        assert_eq!(explanation.mode, SearchMode::Hierarchical);
        assert_eq!(explanation.candidate_documents, 1);
        assert!(explanation.document_score.is_some());
        let term = &explanation.terms[0];
        assert_eq!(term.term, "marketing");
        assert_eq!(term.origin, TermOrigin::Query);
        assert_eq!(term.tf, 1);
        assert!((term.contribution - hits[0].score).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_table_header_chunks_weighted() {
        let mut docs = fleet();
        docs.push((
            "wide",
            "employee name | claim amount | submission date | approving manager | cost center | settlement currency",
        ));
        docs.push(("header", "name | amount | date"));
        let store = corpus(&docs).await;
        let options = SearchOptions {
            explain: true,
            use_hierarchical_search: false,
            ..Default::default()
        };
        let hits = run(&store, "amount", &options).await.unwrap();
        assert_eq!(hits.len(), 2);

        let weight_of = |id: &str| {
            let hit = hits.iter().find(|h| h.document.id == id).unwrap();
            hit.explanation.as_ref().unwrap().terms[0].field_weight
        };
        assert_eq!(weight_of("wide"), 1.5);
        assert_eq!(weight_of("header"), 2.0);
        assert_eq!(hits[0].document.id, "header");
    }

    #[tokio::test]
    async fn test_synonyms_are_scored() {
        let store = corpus(&[
            ("a", "Signed agreement with the vendor."),
            ("b", "Lunch menu for Friday."),
            ("c", "Parking rules for visitors."),
        ])
        .await;
        let options = SearchOptions {
            explain: true,
            ..Default::default()
        };
        let hits = run(&store, "contract", &options).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document.id, "a");
        let origin = hits[0].explanation.as_ref().unwrap().terms[0].origin;
        assert_eq!(origin, TermOrigin::Synonym);
    }

    #[tokio::test]
    async fn test_ties_break_by_document_id() {
        let store = corpus(&[
            ("b", "Invoice approval steps."),
            ("a", "Invoice approval steps."),
            ("c", "Unrelated cafeteria notes."),
            ("d", "Unrelated parking notes."),
            ("e", "Holiday calendar."),
            ("f", "Printer manual."),
        ])
        .await;
        let hits = run(&store, "approval", &SearchOptions::default()).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.document.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(hits[0].score, hits[1].score);
    }

    #[tokio::test]
    async fn test_top_k_limits_candidates() {
        let store = corpus(&[
            ("a", "audit audit audit checklist"),
            ("b", "audit schedule"),
            ("c", "canteen"),
            ("d", "parking"),
            ("e", "holidays"),
        ])
        .await;
        let options = SearchOptions {
            top_k: 1,
            ..Default::default()
        };
        let hits = run(&store, "audit", &options).await.unwrap();
        assert!(hits.iter().all(|h| h.document.id == "a"));
    }

    #[tokio::test]
    async fn test_cancelled_search() {
        let store = corpus(&fleet()).await;
        let processor = QueryProcessor::default();
        let params = Bm25Params::default();
        let ctx = SearchContext {
            store: &store,
            processor: &processor,
            params: &params,
        };
        let token = CancelToken::new();
        token.cancel();
        let options = SearchOptions::default();
        let req = SearchRequest::new("budget", &options).with_cancel(&token);
        let err = search(&ctx, &req).await.unwrap_err();
        assert_eq!(err, Error::Cancelled);
    }

    #[test]
    fn test_feedback_terms_weighted_by_score() {
        let chunk = |id: &str, tf: &[(&str, u32)]| Chunk {
            id: id.to_string(),
            document_id: "d".into(),
            chunk_index: 0,
            text: String::new(),
            token_count: 1,
            start_offset: 0,
            end_offset: 0,
            is_title: false,
            is_table_header: false,
            section_title: None,
            page_number: None,
            term_frequencies: tf.iter().map(|(t, f)| (t.to_string(), *f)).collect(),
            hash: String::new(),
            quality: 0.0,
        };
        let ranked = vec![
            ScoredChunk {
                chunk: chunk("1", &[("budget", 1), ("forecast", 1), ("cost", 3)]),
                score: 2.0,
                contributions: vec![],
            },
            ScoredChunk {
                chunk: chunk("2", &[("budget", 1), ("forecast", 5)]),
                score: 1.0,
                contributions: vec![],
            },
        ];
        let query = vec![QueryTerm {
            term: "budget".into(),
            origin: TermOrigin::Query,
        }];
        let terms = feedback_terms(&ranked, &query);
        assert_eq!(terms, vec!["forecast".to_string(), "cost".to_string()]);
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let opts: SearchOptions = serde_json::from_str(r#"{"top_n": 3, "use_prf": true}"#).unwrap();
        assert_eq!(opts.top_n, 3);
        assert!(opts.use_prf);
        assert_eq!(opts.top_k, 10);
        assert!(opts.use_hierarchical_search);
        assert_eq!(opts.min_score, 0.01);
    }

    #[tokio::test]
    async fn test_explanation_serializes_lowercase() {
        let store = corpus(&fleet()).await;
        let options = SearchOptions {
            explain: true,
            ..Default::default()
        };
        let hits = run(&store, "budget", &options).await.unwrap();
        let json = serde_json::to_value(&hits[0]).unwrap();
        assert_eq!(json["explanation"]["mode"], "hierarchical");
        assert_eq!(json["explanation"]["terms"][0]["origin"], "query");
    }
}
