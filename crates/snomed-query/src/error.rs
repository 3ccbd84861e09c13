//! Error types for query compilation and expansion.

use snomed_ecl::EclError;
use snomed_index::IndexError;
use thiserror::Error;

/// Errors returned by the query layer.
#[derive(Error, Debug)]
pub enum QueryError {
    /// The expression could not be parsed.
    #[error(transparent)]
    Parse(#[from] EclError),

    /// The expression parsed but uses a construct this engine does not evaluate.
    #[error("ECL feature not supported: {feature}")]
    UnsupportedFeature {
        /// Name of the construct, e.g. "concept filter".
        feature: String,
    },

    /// Index access failed.
    #[error(transparent)]
    Index(IndexError),

    /// No release has been imported yet.
    #[error("terminology index not yet loaded")]
    NotLoaded,

    /// A request parameter is missing or inconsistent.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

impl From<IndexError> for QueryError {
    fn from(error: IndexError) -> Self {
        match error {
            IndexError::NotLoaded => QueryError::NotLoaded,
            other => QueryError::Index(other),
        }
    }
}

impl QueryError {
    /// Creates an unsupported-feature error.
    pub fn unsupported(feature: impl Into<String>) -> Self {
        Self::UnsupportedFeature {
            feature: feature.into(),
        }
    }

    /// Returns true for input validation errors, which are never worth retrying.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            QueryError::Parse(_)
                | QueryError::UnsupportedFeature { .. }
                | QueryError::InvalidParameter(_)
                | QueryError::Index(IndexError::InvalidVersionUri(_))
        )
    }
}

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;
