//! The engine facade: ingestion, retrieval, and index maintenance.
//!
//! [`Engine`] owns a handle to an [`IndexStore`] plus the chunking and
//! scoring configuration, and exposes every operation collaborators need.
//! The caller constructs the store and decides its lifetime; there is no
//! process-wide index.
//!
//! # Ingest
//!
//! ```text
//! bytes ─▶ TextExtractor ─▶ segment ─▶ index_document ─▶ commit_document
//! ```
//!
//! Extraction and segmentation failures do not surface as errors. They are
//! recorded on the returned [`Document`] (`status = error`) so a batch keeps
//! going. Only store failures are returned as `Err`.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use docsift_core::engine::{Engine, EngineConfig};
//! use docsift_core::search::SearchOptions;
//! use docsift_core::store::memory::InMemoryStore;
//!
//! async fn demo() -> docsift_core::Result<()> {
//!     let engine = Engine::new(Arc::new(InMemoryStore::new()), EngineConfig::default())?;
//!     engine.ingest(b"Travel policy.", "travel.txt", "text/plain").await?;
//!     let hits = engine.search("travel", &SearchOptions::default()).await?;
//!     println!("{} hits", hits.len());
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::bm25::Bm25Params;
use crate::chunk::{estimate_tokens, segment, ChunkingConfig};
use crate::error::{Error, Result};
use crate::index::{index_document, IndexedDocument};
use crate::models::{Chunk, Document, DocumentStatus, IndexStatistics};
use crate::query::{QueryProcessor, SynonymMap};
use crate::search::{self, CancelToken, SearchContext, SearchHit, SearchOptions, SearchRequest};
use crate::store::{IndexSnapshot, IndexStore, VacuumReport};
use crate::terms::is_cjk;

/// Converts raw bytes into plain text for a given media type.
pub trait TextExtractor: Send + Sync {
    /// Returns `UnsupportedInput` when the media type has no extraction path.
    fn extract(&self, bytes: &[u8], file_name: &str, media_type: &str) -> Result<String>;
}

/// UTF-8 text for `text/*` and `application/json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, bytes: &[u8], _file_name: &str, media_type: &str) -> Result<String> {
        let essence = media_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if !(essence.starts_with("text/") || essence == "application/json") {
            return Err(Error::UnsupportedInput(format!(
                "no text extraction for {media_type}"
            )));
        }
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Chunking and scoring configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub chunking: ChunkingConfig,
    pub bm25: Bm25Params,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        self.bm25.validate()
    }
}

/// One input to [`Engine::ingest_batch`].
#[derive(Debug, Clone)]
pub struct IngestItem {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub media_type: String,
}

pub struct Engine<S: IndexStore> {
    store: Arc<S>,
    config: EngineConfig,
    processor: QueryProcessor,
    extractor: Arc<dyn TextExtractor>,
}

impl<S: IndexStore> Engine<S> {
    /// Fails with `InvalidConfiguration` when `config` is out of range.
    pub fn new(store: Arc<S>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            config,
            processor: QueryProcessor::default(),
            extractor: Arc::new(PlainTextExtractor),
        })
    }

    pub fn with_extractor<E: TextExtractor + 'static>(mut self, extractor: E) -> Self {
        self.extractor = Arc::new(extractor);
        self
    }

    pub fn with_synonyms(mut self, synonyms: SynonymMap) -> Self {
        self.processor = QueryProcessor::new(synonyms);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Extract, segment, and index one file.
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn ingest(&self, bytes: &[u8], file_name: &str, media_type: &str) -> Result<Document> {
        match self.extractor.extract(bytes, file_name, media_type) {
            Ok(text) => {
                self.index_text(&text, file_name, media_type, bytes.len() as u64)
                    .await
            }
            Err(e) => {
                warn!(file_name, error = %e, "extraction failed");
                let existing = self.find_by_name(file_name).await?;
                let mut doc =
                    replacement(existing.as_ref(), file_name, media_type, bytes.len() as u64);
                self.fail(&mut doc, e.to_string()).await?;
                Ok(doc)
            }
        }
    }

    /// Index already-extracted text.
    #[instrument(skip(self, text), fields(len = text.len()))]
    pub async fn ingest_text(&self, text: &str, file_name: &str, media_type: &str) -> Result<Document> {
        self.index_text(text, file_name, media_type, text.len() as u64)
            .await
    }

    /// Ingest each item in its own commit, so readers are never blocked for
    /// the whole batch.
    pub async fn ingest_batch(&self, items: &[IngestItem]) -> Result<Vec<Document>> {
        let mut docs = Vec::with_capacity(items.len());
        for item in items {
            docs.push(
                self.ingest(&item.bytes, &item.file_name, &item.media_type)
                    .await?,
            );
        }
        Ok(docs)
    }

    async fn index_text(
        &self,
        text: &str,
        file_name: &str,
        media_type: &str,
        size_bytes: u64,
    ) -> Result<Document> {
        let content_hash = format!("{:x}", Sha256::digest(text.as_bytes()));

        let existing = self.find_by_name(file_name).await?;
        if let Some(doc) = &existing {
            if doc.is_completed() && doc.content_hash == content_hash {
                info!(document_id = %doc.id, "unchanged, skipping");
                return Ok(doc.clone());
            }
        }

        let mut doc = replacement(existing.as_ref(), file_name, media_type, size_bytes);
        doc.content_hash = content_hash;
        doc.language = detect_language(text);

        let chunks = segment(&doc.id, text, &self.config.chunking);
        if chunks.is_empty() {
            self.fail(&mut doc, "no extractable text".to_string()).await?;
            return Ok(doc);
        }
        doc.title = chunks
            .iter()
            .find_map(|c| c.section_title.clone())
            .or_else(|| first_line(text));
        doc.status = DocumentStatus::Completed;
        doc.processed_at = Some(Utc::now());

        let indexed = index_document(doc, chunks, &self.config.bm25);
        let doc = indexed.document.clone();
        self.store.commit_document(indexed).await?;
        info!(
            document_id = %doc.id,
            chunks = doc.chunk_count,
            tokens = doc.total_tokens,
            "indexed document"
        );
        Ok(doc)
    }

    async fn find_by_name(&self, file_name: &str) -> Result<Option<Document>> {
        Ok(self
            .store
            .list_documents()
            .await?
            .into_iter()
            .find(|d| d.name == file_name))
    }

    async fn fail(&self, doc: &mut Document, message: String) -> Result<()> {
        doc.status = DocumentStatus::Error;
        doc.error = Some(message);
        doc.processed_at = Some(Utc::now());
        self.store
            .commit_document(IndexedDocument {
                document: doc.clone(),
                chunks: Vec::new(),
                terms: Vec::new(),
                postings: Vec::new(),
            })
            .await
    }

    fn context(&self) -> SearchContext<'_, S> {
        SearchContext {
            store: self.store.as_ref(),
            processor: &self.processor,
            params: &self.config.bm25,
        }
    }

    pub async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchHit>> {
        search::search(&self.context(), &SearchRequest::new(query, options)).await
    }

    pub async fn search_with_cancel(
        &self,
        query: &str,
        options: &SearchOptions,
        cancel: &CancelToken,
    ) -> Result<Vec<SearchHit>> {
        let req = SearchRequest::new(query, options).with_cancel(cancel);
        search::search(&self.context(), &req).await
    }

    pub async fn search_hierarchical(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>> {
        search::search_hierarchical(&self.context(), &SearchRequest::new(query, options)).await
    }

    pub async fn search_flat(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchHit>> {
        search::search_flat(&self.context(), &SearchRequest::new(query, options)).await
    }

    /// Ranked chunk texts, each prefixed with its document name, concatenated
    /// until the next one would push the token estimate past `max_tokens`.
    pub async fn relevant_context(&self, query: &str, max_tokens: u64) -> Result<String> {
        let hits = self.search(query, &SearchOptions::default()).await?;
        Ok(assemble_context(&hits, max_tokens))
    }

    #[instrument(skip(self))]
    pub async fn delete_document(&self, id: &str) -> Result<()> {
        self.store.delete_document(id).await?;
        info!(document_id = id, "deleted document");
        Ok(())
    }

    pub async fn list_documents(&self) -> Result<Vec<Document>> {
        self.store.list_documents().await
    }

    /// `NotFound` if `id` is unknown.
    pub async fn get_document(&self, id: &str) -> Result<Document> {
        self.store
            .get_document(id)
            .await?
            .ok_or_else(|| Error::document_not_found(id))
    }

    /// `NotFound` if `id` is unknown.
    pub async fn document_chunks(&self, id: &str) -> Result<Vec<Chunk>> {
        self.get_document(id).await?;
        self.store.get_chunks_by_document(id).await
    }

    #[instrument(skip(self))]
    pub async fn reindex_all(&self) -> Result<IndexStatistics> {
        let stats = self.store.reindex_all(&self.config.bm25).await?;
        info!(
            documents = stats.total_documents,
            chunks = stats.total_chunks,
            "reindexed"
        );
        Ok(stats)
    }

    pub async fn vacuum(&self) -> Result<VacuumReport> {
        self.store.vacuum().await
    }

    pub async fn verify(&self) -> Result<()> {
        self.store.verify().await
    }

    pub async fn backup(&self) -> Result<IndexSnapshot> {
        self.store.backup().await
    }

    pub async fn restore(&self, snapshot: IndexSnapshot) -> Result<()> {
        self.store.restore(snapshot).await
    }

    pub async fn statistics(&self) -> Result<IndexStatistics> {
        self.store.get_statistics().await
    }
}

/// A fresh record for `file_name`. A document already stored under that
/// name keeps its id and upload time.
fn replacement(
    existing: Option<&Document>,
    file_name: &str,
    media_type: &str,
    size_bytes: u64,
) -> Document {
    let id = existing.map_or_else(|| Uuid::new_v4().to_string(), |d| d.id.clone());
    let mut doc = Document::new(id, file_name, media_type, size_bytes);
    if let Some(prev) = existing {
        doc.uploaded_at = prev.uploaded_at;
    }
    doc
}

/// Greedy context assembly over ranked hits.
pub fn assemble_context(hits: &[SearchHit], max_tokens: u64) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut used = 0u64;
    for hit in hits {
        let block = format!("[{}]\n{}", hit.document.name, hit.chunk.text.trim());
        let tokens = estimate_tokens(&block);
        if used + tokens > max_tokens {
            break;
        }
        used += tokens;
        parts.push(block);
    }
    parts.join("\n\n")
}

/// `"zh"` when CJK ideographs outnumber ASCII letters, `"en"` when letters
/// dominate, `None` for text with neither.
fn detect_language(text: &str) -> Option<String> {
    let (cjk, latin) = text.chars().fold((0usize, 0usize), |(c, l), ch| {
        if is_cjk(ch) {
            (c + 1, l)
        } else if ch.is_ascii_alphabetic() {
            (c, l + 1)
        } else {
            (c, l)
        }
    });
    match (cjk, latin) {
        (0, 0) => None,
        // a CJK character carries roughly a word's worth of meaning
        (c, l) if c * 4 >= l => Some("zh".to_string()),
        _ => Some("en".to_string()),
    }
}

fn first_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(|l| l.chars().take(100).collect())
}
