//! Index maintenance: `sift reindex`, `sift vacuum`, `sift backup`, and
//! `sift restore`.

use anyhow::{bail, Context, Result};
use std::path::Path;
use tracing::info;

use docsift_core::store::SNAPSHOT_VERSION;

use crate::config::Config;
use crate::snapshot::{open_engine, read_snapshot, save_engine, write_snapshot};

pub async fn run_reindex(config: &Config) -> Result<()> {
    let engine = open_engine(config).await?;
    let stats = engine.reindex_all().await?;
    engine.verify().await.context("index inconsistent after reindex")?;
    save_engine(&engine, config).await?;
    println!(
        "reindexed {} documents, {} chunks, {} unique terms",
        stats.total_documents, stats.total_chunks, stats.unique_terms
    );
    Ok(())
}

pub async fn run_vacuum(config: &Config) -> Result<()> {
    let engine = open_engine(config).await?;
    let report = engine.vacuum().await?;
    if report.is_clean() {
        println!("index is clean");
        return Ok(());
    }
    save_engine(&engine, config).await?;
    println!(
        "removed {} orphan chunks, {} orphan postings, {} unused terms",
        report.orphan_chunks, report.orphan_postings, report.unused_terms
    );
    Ok(())
}

pub async fn run_backup(config: &Config, out: &Path) -> Result<()> {
    let engine = open_engine(config).await?;
    let snapshot = engine.backup().await?;
    write_snapshot(out, &snapshot)?;
    info!(path = %out.display(), "backup written");
    println!(
        "backup: {} documents, {} chunks -> {}",
        snapshot.documents.len(),
        snapshot.chunks.len(),
        out.display()
    );
    Ok(())
}

/// Replace the current index with the snapshot at `input`. The current
/// index is left untouched if the snapshot is rejected.
pub async fn run_restore(config: &Config, input: &Path) -> Result<()> {
    let snapshot = read_snapshot(input)?;
    if snapshot.version != SNAPSHOT_VERSION {
        bail!(
            "unsupported snapshot version {} (expected {})",
            snapshot.version,
            SNAPSHOT_VERSION
        );
    }
    let documents = snapshot.documents.len();
    let engine = open_engine(config).await?;
    engine.restore(snapshot).await?;
    save_engine(&engine, config).await?;
    println!("restored {} documents from {}", documents, input.display());
    Ok(())
}
