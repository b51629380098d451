//! TOML configuration for the `sift` binary.
//!
//! Every section and field is optional; omitted values fall back to the
//! engine defaults. Validation runs on load and reports the first bad field.
//!
//! ```toml
//! [store]
//! snapshot_path = "./data/index.json"
//!
//! [chunking]
//! min_tokens = 400
//! max_tokens = 800
//! overlap_ratio = 0.15
//!
//! [bm25]
//! k1 = 1.2
//! b = 0.75
//!
//! [search]
//! top_k = 10
//! top_n = 5
//!
//! [ingest]
//! include_globs = ["**/*.md", "**/*.txt"]
//! exclude_globs = ["drafts/**"]
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use docsift_core::bm25::Bm25Params;
use docsift_core::chunk::ChunkingConfig;
use docsift_core::engine::EngineConfig;
use docsift_core::search::SearchOptions;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub chunking: ChunkingConfig,
    pub bm25: Bm25Params,
    pub search: SearchOptions,
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON snapshot the index is loaded from and saved to.
    pub snapshot_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("./data/index.json"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IngestConfig {
    pub include_globs: Vec<String>,
    pub exclude_globs: Vec<String>,
    pub follow_symlinks: bool,
    /// Files larger than this are skipped.
    pub max_file_bytes: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
            max_file_bytes: 20 * 1024 * 1024,
        }
    }
}

fn default_include_globs() -> Vec<String> {
    [
        "**/*.md", "**/*.markdown", "**/*.txt", "**/*.csv", "**/*.json", "**/*.pdf",
        "**/*.docx", "**/*.xlsx",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Config {
    /// Defaults only, used when no config file exists.
    pub fn minimal() -> Self {
        Self::default()
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            chunking: self.chunking.clone(),
            bm25: self.bm25.clone(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        self.bm25.validate()?;
        self.search.validate()?;
        if self.ingest.include_globs.is_empty() {
            bail!("ingest.include_globs must not be empty");
        }
        if self.ingest.max_file_bytes == 0 {
            bail!("ingest.max_file_bytes must be > 0");
        }
        if self.store.snapshot_path.as_os_str().is_empty() {
            bail!("store.snapshot_path must be set");
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

/// Load `path` if it exists, otherwise fall back to [`Config::minimal`].
pub fn load_or_minimal(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::minimal())
    }
}
