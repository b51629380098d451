//! JSON snapshot persistence for the in-memory index.
//!
//! The CLI is one process per command, so the index lives in a snapshot file
//! between invocations: [`open_engine`] restores it, [`save_engine`] writes it
//! back after a mutating command. Writes go to a sibling temp file first and
//! are renamed into place.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use docsift_core::engine::Engine;
use docsift_core::store::memory::InMemoryStore;
use docsift_core::store::{IndexSnapshot, IndexStore};

use crate::config::Config;
use crate::extract::FileExtractor;

pub fn read_snapshot(path: &Path) -> Result<IndexSnapshot> {
    let content = std::fs::read(path)
        .with_context(|| format!("Failed to read snapshot: {}", path.display()))?;
    serde_json::from_slice(&content)
        .with_context(|| format!("Failed to parse snapshot: {}", path.display()))
}

pub fn write_snapshot(path: &Path, snapshot: &IndexSnapshot) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }
    let tmp = path.with_extension("json.tmp");
    let body = serde_json::to_vec_pretty(snapshot)?;
    std::fs::write(&tmp, body).with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace snapshot: {}", path.display()))?;
    Ok(())
}

/// Build an engine over an in-memory store, restored from the configured
/// snapshot when one exists.
pub async fn open_engine(config: &Config) -> Result<Engine<InMemoryStore>> {
    let store = Arc::new(InMemoryStore::new());
    let path = &config.store.snapshot_path;
    if path.exists() {
        let snapshot = read_snapshot(path)?;
        store
            .restore(snapshot)
            .await
            .with_context(|| format!("Snapshot is not a consistent index: {}", path.display()))?;
        debug!(path = %path.display(), "restored snapshot");
    }
    let engine = Engine::new(store, config.engine_config())?.with_extractor(FileExtractor);
    Ok(engine)
}

pub async fn save_engine(engine: &Engine<InMemoryStore>, config: &Config) -> Result<()> {
    let snapshot = engine.backup().await?;
    write_snapshot(&config.store.snapshot_path, &snapshot)?;
    debug!(path = %config.store.snapshot_path.display(), "saved snapshot");
    Ok(())
}
