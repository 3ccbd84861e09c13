//! Index documents.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A stored, searchable record.
///
/// `indexed` fields are stored and get postings; `stored` fields are only
/// returned with the document. Every value is a string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Unique key; a write replaces any committed document with the same key.
    pub key: u64,
    /// Ranking key, ascending.
    pub sort_key: u64,
    /// Searchable fields.
    pub indexed: BTreeMap<String, Vec<String>>,
    /// Retrieval-only fields.
    pub stored: BTreeMap<String, Vec<String>>,
}

impl Document {
    /// Creates an empty document.
    pub fn new(key: u64) -> Self {
        Self {
            key,
            ..Self::default()
        }
    }

    /// Appends a searchable value.
    pub fn index(&mut self, field: &str, value: impl Into<String>) -> &mut Self {
        self.indexed
            .entry(field.to_string())
            .or_default()
            .push(value.into());
        self
    }

    /// Appends several searchable values; an empty iterator adds nothing.
    pub fn index_all<I, V>(&mut self, field: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        for value in values {
            self.index(field, value);
        }
        self
    }

    /// Appends a retrieval-only value.
    pub fn store(&mut self, field: &str, value: impl Into<String>) -> &mut Self {
        self.stored
            .entry(field.to_string())
            .or_default()
            .push(value.into());
        self
    }

    /// All values of a field, searchable or stored.
    pub fn values(&self, field: &str) -> &[String] {
        self.indexed
            .get(field)
            .or_else(|| self.stored.get(field))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The first value of a field.
    pub fn first(&self, field: &str) -> Option<&str> {
        self.values(field).first().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_cover_both_maps() {
        let mut doc = Document::new(9);
        doc.index("parents", "7").index("parents", "8").store("relationships", "0:1=2");
        assert_eq!(doc.values("parents"), ["7", "8"]);
        assert_eq!(doc.first("relationships"), Some("0:1=2"));
        assert!(doc.values("missing").is_empty());
    }

    #[test]
    fn test_index_all_empty_adds_no_field() {
        let mut doc = Document::new(1);
        doc.index_all("members", Vec::<String>::new());
        assert!(!doc.indexed.contains_key("members"));
    }
}
