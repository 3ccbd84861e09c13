//! Error types for the index crate.

use std::path::PathBuf;

/// Result type for import and index operations.
pub type IndexResult<T> = Result<T, IndexError>;

/// Errors that can occur while importing a release or using the index.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// I/O error with path context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A release archive could not be opened or read.
    #[error("archive error in {archive}: {message}")]
    Archive { archive: String, message: String },

    /// A release file row could not be parsed.
    #[error("malformed row in {file} at line {line}: {message}")]
    MalformedRow {
        file: String,
        line: usize,
        message: String,
    },

    /// The version identifier is not a valid edition version URI.
    #[error("invalid version URI '{0}': expected http://snomed.info/sct/{{moduleId}}/version/{{YYYYMMDD}}")]
    InvalidVersionUri(String),

    /// No import has been committed to this index yet.
    #[error("index not yet loaded")]
    NotLoaded,

    /// Invalid file format during load.
    #[error("invalid file format: {message}")]
    InvalidFormat { message: String },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// The full-text engine failed to open, write or search the index.
    #[error("index engine error: {0}")]
    Search(#[from] tantivy::TantivyError),

    /// Hierarchy edges were added after the ancestor closure was frozen.
    #[error("ancestor closure is frozen; cannot add edge {child} -> {parent}")]
    ClosureFrozen { child: u64, parent: u64 },
}

impl IndexError {
    /// Creates an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an archive error.
    pub fn archive(archive: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Archive {
            archive: archive.into(),
            message: message.to_string(),
        }
    }
}
