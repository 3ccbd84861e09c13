//! Value set expansion.
//!
//! A compose spec selects concepts by explicit codes or ECL. An optional
//! free-text filter narrows the selection by description tokens. Results
//! are ranked (active first, shorter terms first, more exact token hits
//! first) and paged.

use std::cmp::Reverse;
use std::sync::OnceLock;

use regex::Regex;
use roaring::RoaringTreemap;
use serde::{Deserialize, Serialize};
use snomed_index::codec::fields;
use snomed_index::{Concept, Query, SctId, Snapshot, TermFolder};
use tracing::debug;

use crate::cache::SetCache;
use crate::compiler::{concepts_only, EclCompiler};
use crate::config::TerminologyConfig;
use crate::error::{QueryError, QueryResult};
use crate::terms::load_concept;

/// One include or exclude criterion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComposeCriterion {
    /// Explicit concept ids.
    Codes(Vec<SctId>),
    /// An ECL expression.
    Ecl(String),
}

/// Include and exclude criteria of a value set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposeSpec {
    /// Concepts matching every include are selected.
    pub include: Vec<ComposeCriterion>,
    /// Concepts matching any exclude are removed.
    pub exclude: Vec<ComposeCriterion>,
}

impl ComposeSpec {
    /// Creates an empty compose spec.
    pub fn new() -> Self {
        Self::default()
    }

    /// Includes concepts matching an ECL expression.
    pub fn include_ecl(mut self, ecl: impl Into<String>) -> Self {
        self.include.push(ComposeCriterion::Ecl(ecl.into()));
        self
    }

    /// Includes explicit codes.
    pub fn include_codes(mut self, codes: impl IntoIterator<Item = SctId>) -> Self {
        self.include
            .push(ComposeCriterion::Codes(codes.into_iter().collect()));
        self
    }

    /// Excludes concepts matching an ECL expression.
    pub fn exclude_ecl(mut self, ecl: impl Into<String>) -> Self {
        self.exclude.push(ComposeCriterion::Ecl(ecl.into()));
        self
    }

    /// Excludes explicit codes.
    pub fn exclude_codes(mut self, codes: impl IntoIterator<Item = SctId>) -> Self {
        self.exclude
            .push(ComposeCriterion::Codes(codes.into_iter().collect()));
        self
    }
}

/// An expansion request.
///
/// # Example
///
/// ```rust
/// use snomed_query::{ComposeSpec, ExpandRequest};
///
/// let request = ExpandRequest::new(ComposeSpec::new().include_ecl("<< 404684003"))
///     .with_filter("heart att")
///     .with_dialects(["en-GB"])
///     .with_page(0, Some(20));
/// assert_eq!(request.count, Some(20));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpandRequest {
    /// What to expand.
    pub compose: ComposeSpec,
    /// Free-text filter. A trailing `~` makes matching fuzzy.
    pub filter: Option<String>,
    /// Dialect tags for display terms; the first also picks the folding language.
    pub dialects: Vec<String>,
    /// Keep every description on returned concepts.
    pub include_designations: bool,
    /// Number of ranked results to skip.
    pub offset: usize,
    /// Page size; the configured default when absent.
    pub count: Option<usize>,
}

impl ExpandRequest {
    /// Creates a request for the first default-sized page.
    pub fn new(compose: ComposeSpec) -> Self {
        Self {
            compose,
            ..Self::default()
        }
    }

    /// Sets the text filter.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Sets the dialect tags.
    pub fn with_dialects<I, S>(mut self, dialects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dialects = dialects.into_iter().map(Into::into).collect();
        self
    }

    /// Keeps descriptions on returned concepts.
    pub fn with_designations(mut self, include: bool) -> Self {
        self.include_designations = include;
        self
    }

    /// Sets offset and page size.
    pub fn with_page(mut self, offset: usize, count: Option<usize>) -> Self {
        self.offset = offset;
        self.count = count;
        self
    }
}

/// A concept in an expansion page.
#[derive(Debug, Clone)]
pub struct ExpandedConcept {
    /// The concept; descriptions are empty unless designations were requested.
    pub concept: Concept,
    /// Display term for the requested dialects.
    pub display: Option<String>,
}

/// One page of an expansion.
#[derive(Debug, Clone)]
pub struct Expansion {
    /// Number of matching concepts across all pages.
    pub total: u64,
    /// Offset of the first concept in this page.
    pub offset: usize,
    /// The page, in rank order.
    pub concepts: Vec<ExpandedConcept>,
}

impl Expansion {
    /// Ids of the concepts in this page.
    pub fn ids(&self) -> Vec<SctId> {
        self.concepts.iter().map(|c| c.concept.id).collect()
    }
}

/// Expands compose specs against one snapshot.
pub struct ExpansionEngine<'a> {
    snapshot: &'a Snapshot,
    config: &'a TerminologyConfig,
    cache: Option<&'a SetCache>,
}

impl<'a> ExpansionEngine<'a> {
    /// Creates an engine.
    pub fn new(snapshot: &'a Snapshot, config: &'a TerminologyConfig) -> Self {
        Self {
            snapshot,
            config,
            cache: None,
        }
    }

    /// Shares a compiled-set cache with ECL criteria.
    pub fn with_cache(mut self, cache: &'a SetCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Runs an expansion.
    pub fn expand(&self, request: &ExpandRequest) -> QueryResult<Expansion> {
        if request.compose.include.is_empty() {
            return Err(QueryError::InvalidParameter(
                "compose must include at least one criterion".to_string(),
            ));
        }
        let count = match request.count {
            Some(count) if count > self.config.max_page_size => {
                return Err(QueryError::InvalidParameter(format!(
                    "count {} exceeds the maximum page size {}",
                    count, self.config.max_page_size
                )))
            }
            Some(count) => count,
            None => self.config.default_page_size,
        };

        let includes = self.criteria(&request.compose.include)?;
        let mut query = Query::and(includes);
        if !request.compose.exclude.is_empty() {
            query = Query::and_not(query, Query::or(self.criteria(&request.compose.exclude)?));
        }

        let folder = self.config.folder();
        let language = self.config.display_language(&request.dialects);
        let filter = request.filter.as_deref().map(str::trim).unwrap_or("");
        let tokens = query_tokens(&folder, filter, language);
        if let Some(text) = text_query(&folder, filter, language) {
            query = Query::and(vec![query, text]);
        }

        let query = concepts_only(query);
        let hits = self.snapshot.sort_keys(&query)?;
        let total = hits.len() as u64;
        let inactive = self.narrowed(&query, Query::term(fields::ACTIVE, "false"))?;
        let exact = tokens
            .iter()
            .map(|token| self.narrowed(&query, Query::term(fields::TERM, token)))
            .collect::<QueryResult<Vec<_>>>()?;

        let mut ranked: Vec<(bool, u64, Reverse<usize>, SctId)> = hits
            .into_iter()
            .map(|(id, sort_key)| {
                let score = exact.iter().filter(|matched| matched.contains(id)).count();
                (inactive.contains(id), sort_key, Reverse(score), id)
            })
            .collect();
        ranked.sort_unstable();

        let dialects = self.config.resolve_dialects(&request.dialects);
        let mut concepts = Vec::new();
        for &(_, _, _, id) in ranked.iter().skip(request.offset).take(count) {
            let Some(mut concept) = load_concept(self.snapshot, id)? else {
                continue;
            };
            let display = concept.display_term(&dialects).map(str::to_string);
            if !request.include_designations {
                concept.descriptions.clear();
            }
            concepts.push(ExpandedConcept { concept, display });
        }

        debug!(
            total,
            offset = request.offset,
            returned = concepts.len(),
            "expanded value set"
        );
        Ok(Expansion {
            total,
            offset: request.offset,
            concepts,
        })
    }

    /// Hits of `query` that also match `narrower`.
    fn narrowed(&self, query: &Query, narrower: Query) -> QueryResult<RoaringTreemap> {
        Ok(self.snapshot.search(&Query::and(vec![query.clone(), narrower]))?)
    }

    fn criteria(&self, criteria: &[ComposeCriterion]) -> QueryResult<Vec<Query>> {
        let compiler = match self.cache {
            Some(cache) => EclCompiler::new(self.snapshot).with_cache(cache),
            None => EclCompiler::new(self.snapshot),
        };
        criteria
            .iter()
            .map(|criterion| match criterion {
                ComposeCriterion::Codes(codes) => Ok(Query::terms(fields::ID, codes)),
                ComposeCriterion::Ecl(ecl) => Ok(compiler.compile_text(ecl)?.query),
            })
            .collect()
    }
}

fn numeric_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\d{6,18}$").unwrap_or_else(|e| unreachable!("id pattern is valid: {e}"))
    })
}

/// Folded search tokens of a filter, without the fuzzy marker.
fn query_tokens(folder: &TermFolder, filter: &str, language: &str) -> Vec<String> {
    if numeric_id_pattern().is_match(filter) {
        return Vec::new();
    }
    folder.tokens(filter.trim_end_matches('~'), language)
}

/// Lowers a text filter. Every token must match.
///
/// A filter shaped like a concept id matches that id. A trailing `~` makes
/// each token fuzzy, allowing one edit, or two for tokens longer than five
/// characters. Otherwise tokens match as prefixes. Returns `None` when the
/// filter holds no tokens.
pub fn text_query(folder: &TermFolder, filter: &str, language: &str) -> Option<Query> {
    let filter = filter.trim();
    if numeric_id_pattern().is_match(filter) {
        return Some(Query::term(fields::ID, filter));
    }
    let fuzzy = filter.ends_with('~');
    let tokens = query_tokens(folder, filter, language);
    if tokens.is_empty() {
        return None;
    }
    let clauses = tokens
        .into_iter()
        .map(|token| {
            if fuzzy {
                let edits = if token.chars().count() > 5 { 2 } else { 1 };
                Query::fuzzy(fields::TERM, token, edits)
            } else {
                Query::prefix(fields::TERM, token)
            }
        })
        .collect();
    Some(Query::and(clauses))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn swedish() -> TermFolder {
        TermFolder::new().with_language("sv", "åäö")
    }

    mod text_filters {
        use super::*;

        #[test]
        fn test_numeric_filter_is_an_id_match() {
            assert_eq!(
                text_query(&TermFolder::new(), " 22298006 ", "en"),
                Some(Query::term(fields::ID, "22298006"))
            );
            // Too short to be an id; treated as text.
            assert_eq!(
                text_query(&TermFolder::new(), "12345", "en"),
                Some(Query::and(vec![Query::prefix(fields::TERM, "12345")]))
            );
        }

        #[test]
        fn test_prefix_per_token() {
            assert_eq!(
                text_query(&TermFolder::new(), "Heart Att", "en"),
                Some(Query::and(vec![
                    Query::prefix(fields::TERM, "heart"),
                    Query::prefix(fields::TERM, "att"),
                ]))
            );
        }

        #[test]
        fn test_fuzzy_edits_scale_with_length() {
            assert_eq!(
                text_query(&TermFolder::new(), "hert infarktion~", "en"),
                Some(Query::and(vec![
                    Query::fuzzy(fields::TERM, "hert", 1),
                    Query::fuzzy(fields::TERM, "infarktion", 2),
                ]))
            );
        }

        #[test]
        fn test_folding_follows_display_language() {
            assert_eq!(
                text_query(&swedish(), "Mellanöra", "sv-SE"),
                Some(Query::and(vec![Query::prefix(fields::TERM, "mellanöra")]))
            );
            assert_eq!(
                text_query(&swedish(), "Mellanöra", "en"),
                Some(Query::and(vec![Query::prefix(fields::TERM, "mellanora")]))
            );
        }

        #[test]
        fn test_blank_filter_is_ignored() {
            assert!(text_query(&TermFolder::new(), "   ", "en").is_none());
            assert!(text_query(&TermFolder::new(), "~", "en").is_none());
        }
    }

    mod requests {
        use super::*;

        #[test]
        fn test_compose_builder() {
            let compose = ComposeSpec::new()
                .include_ecl("<< 404684003")
                .include_codes([22298006])
                .exclude_codes([1755008]);
            assert_eq!(compose.include.len(), 2);
            assert!(matches!(compose.exclude[0], ComposeCriterion::Codes(ref c) if c == &[1755008]));
        }

        #[test]
        fn test_request_from_json() {
            let request: ExpandRequest = serde_json::from_str(
                r#"{"compose": {"include": [{"ecl": "< 404684003"}, {"codes": [22298006]}]},
                    "filter": "find", "count": 5}"#,
            )
            .unwrap();
            assert_eq!(request.compose.include[0], ComposeCriterion::Ecl("< 404684003".into()));
            assert_eq!(request.filter.as_deref(), Some("find"));
            assert_eq!(request.offset, 0);
            assert!(!request.include_designations);
        }
    }
}
