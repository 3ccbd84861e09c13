//! Error types for ECL parsing.

use thiserror::Error;

/// Errors that can occur during ECL parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EclError {
    /// Parse error at a specific position in the input.
    #[error("parse error at position {position}: {message}")]
    ParseError {
        /// Byte offset in the input where parsing stopped.
        position: usize,
        /// Description of the error.
        message: String,
    },

    /// ECL expression ended before a construct was closed.
    #[error("ECL is incomplete: {0}")]
    Incomplete(String),

    /// Empty input provided.
    #[error("empty ECL expression")]
    EmptyExpression,

    /// A concept identifier does not fit in an SCTID.
    #[error("invalid concept ID: {0}")]
    InvalidConceptId(String),
}

/// Result type for ECL operations.
pub type EclResult<T> = std::result::Result<T, EclError>;
