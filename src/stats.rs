//! Index statistics overview for `sift stats`.
//!
//! Summarizes what is indexed: corpus counts, average lengths, and a
//! per-status document breakdown, so users can confirm an ingest landed.

use anyhow::Result;
use serde::Serialize;

use docsift_core::models::{DocumentStatus, IndexStatistics};

use crate::config::Config;
use crate::get::format_bytes;
use crate::snapshot::open_engine;

#[derive(Debug, Serialize)]
pub struct StatsReport {
    #[serde(flatten)]
    pub statistics: IndexStatistics,
    pub completed_documents: u64,
    pub failed_documents: u64,
    pub snapshot_bytes: u64,
}

pub async fn collect_stats(config: &Config) -> Result<StatsReport> {
    let engine = open_engine(config).await?;
    let statistics = engine.statistics().await?;
    let docs = engine.list_documents().await?;
    let count = |status: DocumentStatus| docs.iter().filter(|d| d.status == status).count() as u64;
    let snapshot_bytes = std::fs::metadata(&config.store.snapshot_path)
        .map(|m| m.len())
        .unwrap_or(0);
    Ok(StatsReport {
        statistics,
        completed_documents: count(DocumentStatus::Completed),
        failed_documents: count(DocumentStatus::Error),
        snapshot_bytes,
    })
}

pub async fn run_stats(config: &Config, json: bool) -> Result<()> {
    let report = collect_stats(config).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    let s = &report.statistics;

    println!("docsift index");
    println!("=============");
    println!();
    println!("  Snapshot:    {}", config.store.snapshot_path.display());
    println!("  Size:        {}", format_bytes(report.snapshot_bytes));
    println!();
    println!(
        "  Documents:   {} indexed, {} failed",
        report.completed_documents, report.failed_documents
    );
    println!("  Chunks:      {}", s.total_chunks);
    println!("  Terms:       {} total, {} unique", s.total_terms, s.unique_terms);
    println!("  Avg doc:     {:.1} tokens", s.avg_document_length);
    println!("  Avg chunk:   {:.1} tokens", s.avg_chunk_length);
    println!();
    Ok(())
}
