//! # docsift
//!
//! Local retrieval over business documents. Files are extracted to text,
//! segmented into token-bounded chunks, and indexed in a two-tier BM25 index
//! (documents, then chunks) with CJK-aware term extraction.
//!
//! The engine lives in [`docsift_core`]; this crate adds the `sift` CLI,
//! file discovery, multi-format extraction, and snapshot persistence.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ ingest      │──▶│ extract      │──▶│ docsift-core │
//! │ walk+globs  │   │ csv/pdf/docx │   │ chunk + BM25 │
//! └─────────────┘   └──────────────┘   └──────┬───────┘
//!                                             │
//!                          ┌──────────────────┤
//!                          ▼                  ▼
//!                    ┌──────────┐      ┌────────────┐
//!                    │   CLI    │      │  snapshot  │
//!                    │  (sift)  │      │   (JSON)   │
//!                    └──────────┘      └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! sift ingest ./docs
//! sift search "reimbursement process"
//! sift search "报销流程" --prf --explain
//! sift context "travel policy" --budget 1500
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`extract`] | Multi-format text extraction |
//! | [`ingest`] | File discovery and ingestion |
//! | [`progress`] | Ingest progress on stderr |
//! | [`snapshot`] | JSON index persistence |
//! | [`search`] | `search` and `context` commands |
//! | [`get`] | `get`, `list`, and `delete` commands |
//! | [`stats`] | `stats` command |
//! | [`maintenance`] | `reindex`, `vacuum`, `backup`, and `restore` commands |

pub mod config;
pub mod extract;
pub mod get;
pub mod ingest;
pub mod maintenance;
pub mod progress;
pub mod search;
pub mod snapshot;
pub mod stats;
