//! Boolean index queries.
//!
//! [`Query`] is the store's own query tree; it is lowered onto tantivy
//! queries against the index schema when a snapshot is searched.

use tantivy::query::{
    AllQuery, BooleanQuery, EmptyQuery, FuzzyTermQuery, Occur, Query as TantivyQuery, RegexQuery,
    TermQuery, TermSetQuery,
};
use tantivy::schema::IndexRecordOption;
use tantivy::Term;

use super::schema::IndexSchema;
use crate::error::IndexResult;

/// A query over index fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Every document.
    All,
    /// No document.
    None,
    /// Exact value in a field.
    Term { field: String, value: String },
    /// Any of several exact values in a field.
    Terms { field: String, values: Vec<String> },
    /// Field has at least one value.
    Exists { field: String },
    /// Some value in the field starts with `prefix`.
    Prefix { field: String, prefix: String },
    /// Some value in the field is within `max_edits` Levenshtein edits (at most 2).
    Fuzzy {
        field: String,
        value: String,
        max_edits: u8,
    },
    /// All of `must`, at least one of `should` (when non-empty), none of `must_not`.
    Bool {
        must: Vec<Query>,
        should: Vec<Query>,
        must_not: Vec<Query>,
    },
}

impl Query {
    /// Exact term query.
    pub fn term(field: &str, value: impl ToString) -> Self {
        Query::Term {
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    /// Multi-term query. An empty value list matches nothing.
    pub fn terms<I, V>(field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        Query::Terms {
            field: field.to_string(),
            values: values.into_iter().map(|v| v.to_string()).collect(),
        }
    }

    /// Field existence query.
    pub fn exists(field: &str) -> Self {
        Query::Exists {
            field: field.to_string(),
        }
    }

    /// Prefix query.
    pub fn prefix(field: &str, prefix: impl Into<String>) -> Self {
        Query::Prefix {
            field: field.to_string(),
            prefix: prefix.into(),
        }
    }

    /// Fuzzy query.
    pub fn fuzzy(field: &str, value: impl Into<String>, max_edits: u8) -> Self {
        Query::Fuzzy {
            field: field.to_string(),
            value: value.into(),
            max_edits: max_edits.min(2),
        }
    }

    /// Conjunction.
    pub fn and(queries: Vec<Query>) -> Self {
        Query::Bool {
            must: queries,
            should: Vec::new(),
            must_not: Vec::new(),
        }
    }

    /// Disjunction.
    pub fn or(queries: Vec<Query>) -> Self {
        Query::Bool {
            must: Vec::new(),
            should: queries,
            must_not: Vec::new(),
        }
    }

    /// `include` without anything matching `exclude`.
    pub fn and_not(include: Query, exclude: Query) -> Self {
        Query::Bool {
            must: vec![include],
            should: Vec::new(),
            must_not: vec![exclude],
        }
    }
}

impl Query {
    /// Lowers the query onto the index schema.
    pub(crate) fn lower(&self, schema: &IndexSchema) -> IndexResult<Box<dyn TantivyQuery>> {
        let text = |field: &str, value: &str| -> IndexResult<Term> {
            Ok(Term::from_field_text(schema.text_field(field)?, value))
        };
        let lowered: Box<dyn TantivyQuery> = match self {
            Query::All => Box::new(AllQuery),
            Query::None => Box::new(EmptyQuery),
            Query::Term { field, value } => Box::new(TermQuery::new(
                text(field, value)?,
                IndexRecordOption::Basic,
            )),
            Query::Terms { values, .. } if values.is_empty() => Box::new(EmptyQuery),
            Query::Terms { field, values } => Box::new(TermSetQuery::new(
                values
                    .iter()
                    .map(|v| text(field, v))
                    .collect::<IndexResult<Vec<_>>>()?,
            )),
            Query::Exists { field } => {
                schema.text_field(field)?;
                Box::new(TermQuery::new(
                    Term::from_field_text(schema.present, field),
                    IndexRecordOption::Basic,
                ))
            }
            Query::Prefix { field, prefix } => Box::new(RegexQuery::from_pattern(
                &format!("{}.*", regex::escape(prefix)),
                schema.text_field(field)?,
            )?),
            Query::Fuzzy {
                field,
                value,
                max_edits,
            } => Box::new(FuzzyTermQuery::new(text(field, value)?, *max_edits, false)),
            Query::Bool {
                must,
                should,
                must_not,
            } => {
                let mut clauses: Vec<(Occur, Box<dyn TantivyQuery>)> = Vec::new();
                for query in must {
                    clauses.push((Occur::Must, query.lower(schema)?));
                }
                if !should.is_empty() {
                    let any = should
                        .iter()
                        .map(|q| Ok((Occur::Should, q.lower(schema)?)))
                        .collect::<IndexResult<Vec<_>>>()?;
                    clauses.push((Occur::Must, Box::new(BooleanQuery::new(any))));
                }
                // a clause list of only exclusions matches nothing in tantivy
                if clauses.is_empty() {
                    clauses.push((Occur::Must, Box::new(AllQuery)));
                }
                for query in must_not {
                    clauses.push((Occur::MustNot, query.lower(schema)?));
                }
                Box::new(BooleanQuery::new(clauses))
            }
        };
        Ok(lowered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        assert_eq!(
            Query::terms("ancestors", [1u64, 2]),
            Query::Terms {
                field: "ancestors".into(),
                values: vec!["1".into(), "2".into()]
            }
        );
        assert!(matches!(
            Query::and_not(Query::All, Query::None),
            Query::Bool { ref must, ref must_not, .. } if must.len() == 1 && must_not.len() == 1
        ));
    }

    #[test]
    fn test_fuzzy_edits_are_capped() {
        assert!(matches!(
            Query::fuzzy("term", "infarktion", 5),
            Query::Fuzzy { max_edits: 2, .. }
        ));
    }

    #[test]
    fn test_lowering_resolves_fields() {
        let schema = IndexSchema::new().unwrap();
        assert!(Query::and(vec![Query::term("parents", 7), Query::exists("members")])
            .lower(&schema)
            .is_ok());
        assert!(Query::prefix("term", "heart(").lower(&schema).is_ok());
        assert!(Query::term("colour", "red").lower(&schema).is_err());
        assert!(Query::exists("colour").lower(&schema).is_err());
    }
}
