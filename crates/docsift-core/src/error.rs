//! Error types for docsift-core.
//!
//! Every fallible engine operation returns [`Result`]. Ingest failures are
//! not surfaced through this type: they are recorded on the
//! [`Document`](crate::models::Document) itself so a batch can keep going.

use thiserror::Error;

/// Errors reported by the engine, the store, and the search orchestrator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// An id passed to update/delete/get-by-id does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Entity kind (`"document"`, `"chunk"`).
        kind: &'static str,
        id: String,
    },
    /// No text-extraction path exists for the given media type.
    #[error("unsupported input: {0}")]
    UnsupportedInput(String),
    /// Chunking bounds or BM25 parameters outside sane ranges.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// A posting or chunk references something that no longer exists.
    /// `reindex_all` is the repair path.
    #[error("inconsistent index: {0}")]
    InconsistentIndex(String),
    /// Malformed search options supplied by the caller.
    #[error("invalid search options: {0}")]
    InvalidOptions(String),
    /// The caller cancelled a running search.
    #[error("search cancelled")]
    Cancelled,
}

impl Error {
    pub(crate) fn document_not_found(id: &str) -> Self {
        Error::NotFound {
            kind: "document",
            id: id.to_string(),
        }
    }
}

/// Result alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = Error::document_not_found("abc");
        assert_eq!(err.to_string(), "document not found: abc");
    }

    #[test]
    fn test_invalid_configuration_display() {
        let err = Error::InvalidConfiguration("min_tokens > max_tokens".into());
        assert!(err.to_string().contains("min_tokens > max_tokens"));
    }
}
