//! File discovery and ingestion for `sift ingest`.
//!
//! Each argument is either a file, ingested as-is, or a directory walked with
//! the configured include/exclude globs. Discovered files are sorted so runs
//! are deterministic, then fed to the engine one at a time. A file that fails
//! extraction still produces a document with `status = error`; only store
//! failures abort the run.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use docsift_core::engine::Engine;
use docsift_core::models::{Document, DocumentStatus};
use docsift_core::store::IndexStore;

use crate::config::IngestConfig;
use crate::extract::media_type_for;
use crate::progress::{IngestEvent, ProgressMode};

/// A file selected for ingestion. `name` is the document name: the path
/// relative to the walked directory, or the file name for explicit files.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
}

#[derive(Debug, Default, Serialize)]
pub struct IngestSummary {
    pub completed: u64,
    pub failed: u64,
    /// Files over `max_file_bytes`.
    pub skipped: u64,
    pub documents: Vec<Document>,
}

pub fn discover(
    paths: &[PathBuf],
    config: &IngestConfig,
    progress: ProgressMode,
) -> Result<(Vec<DiscoveredFile>, u64)> {
    let include_set = build_globset(&config.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut files = Vec::new();
    let mut seen = HashSet::new();
    let mut skipped = 0u64;

    for root in paths {
        if !root.exists() {
            bail!("Path does not exist: {}", root.display());
        }
        progress.report(IngestEvent::Discovering {
            path: &root.display().to_string(),
        });

        if root.is_file() {
            let name = root
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| root.display().to_string());
            if seen.insert(identity(root)) {
                match admit(root, name, config.max_file_bytes)? {
                    Some(file) => files.push(file),
                    None => skipped += 1,
                }
            }
            continue;
        }

        let walker = WalkDir::new(root).follow_links(config.follow_symlinks);
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            let rel_str = relative.to_string_lossy().replace('\\', "/");

            if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
                continue;
            }
            if !seen.insert(identity(path)) {
                continue;
            }
            match admit(path, rel_str, config.max_file_bytes)? {
                Some(file) => files.push(file),
                None => skipped += 1,
            }
        }
    }

    files.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.path.cmp(&b.path)));
    Ok((files, skipped))
}

/// The same file reached through different arguments maps to one key.
fn identity(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn admit(path: &Path, name: String, max_bytes: u64) -> Result<Option<DiscoveredFile>> {
    let size = std::fs::metadata(path)
        .with_context(|| format!("Failed to stat {}", path.display()))?
        .len();
    if size > max_bytes {
        warn!(path = %path.display(), size, max_bytes, "file too large, skipping");
        return Ok(None);
    }
    Ok(Some(DiscoveredFile {
        path: path.to_path_buf(),
        name,
        size,
    }))
}

pub async fn ingest_paths<S: IndexStore>(
    engine: &Engine<S>,
    paths: &[PathBuf],
    config: &IngestConfig,
    progress: ProgressMode,
) -> Result<IngestSummary> {
    let (files, skipped) = discover(paths, config, progress)?;
    let total = files.len() as u64;
    let mut summary = IngestSummary {
        skipped,
        ..Default::default()
    };

    for (i, file) in files.iter().enumerate() {
        let bytes = std::fs::read(&file.path)
            .with_context(|| format!("Failed to read {}", file.path.display()))?;
        let media_type = media_type_for(&file.path);
        debug!(name = %file.name, media_type, size = file.size, "ingesting");

        let doc = engine.ingest(&bytes, &file.name, media_type).await?;
        match doc.status {
            DocumentStatus::Completed => summary.completed += 1,
            _ => summary.failed += 1,
        }
        summary.documents.push(doc);

        progress.report(IngestEvent::Ingesting {
            file: &file.name,
            n: i as u64 + 1,
            total,
        });
    }
    Ok(summary)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
