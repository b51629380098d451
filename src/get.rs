//! Document inspection: `sift get`, `sift list`, and `sift delete`.

use anyhow::Result;
use serde::Serialize;

use docsift_core::models::{Chunk, Document};

use crate::config::Config;
use crate::snapshot::{open_engine, save_engine};

/// A document with its chunks in index order.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentResponse {
    #[serde(flatten)]
    pub document: Document,
    pub chunks: Vec<Chunk>,
}

pub async fn get_document(config: &Config, id: &str) -> Result<DocumentResponse> {
    let engine = open_engine(config).await?;
    let document = engine.get_document(id).await?;
    let chunks = engine.document_chunks(id).await?;
    Ok(DocumentResponse { document, chunks })
}

pub async fn run_get(config: &Config, id: &str, json: bool) -> Result<()> {
    let resp = get_document(config, id).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&resp)?);
        return Ok(());
    }
    let doc = &resp.document;

    println!("--- Document ---");
    println!("id:           {}", doc.id);
    println!("name:         {}", doc.name);
    println!(
        "title:        {}",
        doc.title.as_deref().unwrap_or("(untitled)")
    );
    println!("media_type:   {}", doc.media_type);
    println!("size:         {}", format_bytes(doc.size_bytes));
    println!("status:       {}", doc.status);
    if let Some(ref err) = doc.error {
        println!("error:        {}", err);
    }
    if let Some(ref lang) = doc.language {
        println!("language:     {}", lang);
    }
    println!("uploaded_at:  {}", doc.uploaded_at.format("%Y-%m-%dT%H:%M:%SZ"));
    if let Some(ts) = doc.processed_at {
        println!("processed_at: {}", ts.format("%Y-%m-%dT%H:%M:%SZ"));
    }
    println!("tokens:       {}", doc.total_tokens);
    println!(
        "terms:        {} total, {} unique",
        doc.term_stats.total_terms, doc.term_stats.unique_terms
    );
    println!();

    println!("--- Chunks ({}) ---", resp.chunks.len());
    for chunk in &resp.chunks {
        let mut flags = Vec::new();
        if chunk.is_title {
            flags.push("title");
        }
        if chunk.is_table_header {
            flags.push("table-header");
        }
        println!(
            "[chunk {}] {} tokens, bytes {}..{}{}",
            chunk.chunk_index,
            chunk.token_count,
            chunk.start_offset,
            chunk.end_offset,
            if flags.is_empty() {
                String::new()
            } else {
                format!(" ({})", flags.join(", "))
            }
        );
        println!("{}", chunk.text);
        println!();
    }
    Ok(())
}

pub async fn run_list(config: &Config, json: bool) -> Result<()> {
    let engine = open_engine(config).await?;
    let docs = engine.list_documents().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&docs)?);
        return Ok(());
    }
    if docs.is_empty() {
        println!("No documents.");
        return Ok(());
    }
    println!(
        "{:<36}  {:<10} {:>6} {:>8}  {}",
        "ID", "STATUS", "CHUNKS", "TOKENS", "NAME"
    );
    for doc in &docs {
        println!(
            "{:<36}  {:<10} {:>6} {:>8}  {}",
            doc.id, doc.status, doc.chunk_count, doc.total_tokens, doc.name
        );
    }
    Ok(())
}

pub async fn run_delete(config: &Config, id: &str) -> Result<()> {
    let engine = open_engine(config).await?;
    engine.delete_document(id).await?;
    save_engine(&engine, config).await?;
    println!("deleted {}", id);
    Ok(())
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
