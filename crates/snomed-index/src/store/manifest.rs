//! Commit manifest, carried as the payload of each index commit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{IndexError, IndexResult};

/// Current manifest format version.
pub const MANIFEST_VERSION: u32 = 2;

/// The committed state of an index directory.
///
/// An index whose last commit carries no manifest has never completed a
/// write session and is not loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    /// Format version of the manifest and the index schema.
    pub format_version: u32,
    /// Incremented on every commit.
    pub generation: u64,
    /// Timestamp of the commit.
    pub committed_at: DateTime<Utc>,
    /// Version of the writing library.
    pub writer_version: String,
}

impl IndexManifest {
    /// Creates an empty manifest.
    pub fn new() -> Self {
        Self {
            format_version: MANIFEST_VERSION,
            generation: 0,
            committed_at: Utc::now(),
            writer_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// The manifest following this one.
    pub fn next(&self) -> Self {
        Self {
            generation: self.generation + 1,
            ..Self::new()
        }
    }

    /// Parses a commit payload.
    pub fn from_payload(payload: &str) -> IndexResult<Self> {
        let manifest: Self = serde_json::from_str(payload)
            .map_err(|e| IndexError::Deserialization(e.to_string()))?;
        if manifest.format_version != MANIFEST_VERSION {
            return Err(IndexError::invalid_format(format!(
                "unsupported manifest version: {} (expected {})",
                manifest.format_version, MANIFEST_VERSION
            )));
        }
        Ok(manifest)
    }

    /// Serializes the manifest as a commit payload.
    pub fn to_payload(&self) -> IndexResult<String> {
        serde_json::to_string(self).map_err(|e| IndexError::Serialization(e.to_string()))
    }
}

impl Default for IndexManifest {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for IndexManifest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Index Manifest")?;
        writeln!(f, "  Generation:  {}", self.generation)?;
        writeln!(f, "  Committed:   {}", self.committed_at)?;
        writeln!(f, "  Writer:      {}", self.writer_version)?;
        Ok(())
    }
}
