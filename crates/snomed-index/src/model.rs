//! Terminology data model: concepts, descriptions, relationships and mappings.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{IndexError, IndexResult};
use crate::well_known;
use crate::SctId;

// =============================================================================
// Definition status
// =============================================================================

/// Whether a concept is primitive or fully defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DefinitionStatus {
    /// Only necessary conditions are modelled.
    Primitive,
    /// Necessary and sufficient conditions are modelled.
    FullyDefined,
}

impl DefinitionStatus {
    /// Maps a definition status concept id. Unknown ids are treated as primitive.
    pub fn from_id(id: SctId) -> Self {
        if id == well_known::FULLY_DEFINED {
            DefinitionStatus::FullyDefined
        } else {
            DefinitionStatus::Primitive
        }
    }

    /// Short code used in index documents.
    pub fn code(&self) -> &'static str {
        match self {
            DefinitionStatus::Primitive => "primitive",
            DefinitionStatus::FullyDefined => "defined",
        }
    }

    /// Inverse of [`DefinitionStatus::code`].
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "primitive" => Some(DefinitionStatus::Primitive),
            "defined" => Some(DefinitionStatus::FullyDefined),
            _ => None,
        }
    }
}

// =============================================================================
// Description
// =============================================================================

/// A label attached to a concept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Description {
    /// Description id.
    pub id: SctId,
    /// Language code, e.g. `en` or `sv`.
    pub language: String,
    /// The term text.
    pub term: String,
    /// True for the fully specified name.
    pub is_fsn: bool,
    /// Language reference sets in which this is the preferred term.
    pub preferred_in: BTreeSet<SctId>,
    /// Language reference sets in which this term is only acceptable.
    pub acceptable_in: BTreeSet<SctId>,
}

impl Description {
    /// Creates a description with no acceptability yet.
    pub fn new(id: SctId, language: impl Into<String>, term: impl Into<String>, is_fsn: bool) -> Self {
        Self {
            id,
            language: language.into(),
            term: term.into(),
            is_fsn,
            preferred_in: BTreeSet::new(),
            acceptable_in: BTreeSet::new(),
        }
    }
}

// =============================================================================
// Relationship
// =============================================================================

/// The value side of a relationship: a target concept or a concrete literal.
///
/// Targets order before literals.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RelationshipValue {
    /// Target concept id.
    Target(SctId),
    /// Concrete literal as written in the release, e.g. `#500` or `"text"`.
    Literal(String),
}

impl RelationshipValue {
    /// Returns the target id, if this value is a concept.
    pub fn target(&self) -> Option<SctId> {
        match self {
            RelationshipValue::Target(id) => Some(*id),
            RelationshipValue::Literal(_) => None,
        }
    }
}

impl std::fmt::Display for RelationshipValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelationshipValue::Target(id) => write!(f, "{}", id),
            RelationshipValue::Literal(literal) => f.write_str(literal),
        }
    }
}

/// A defining attribute of a concept.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relationship {
    /// Role group; 0 means ungrouped.
    pub group: u32,
    /// Attribute type id.
    pub type_id: SctId,
    /// Target concept or literal.
    pub value: RelationshipValue,
}

impl Relationship {
    /// Relationship pointing at a concept.
    pub fn target(group: u32, type_id: SctId, target: SctId) -> Self {
        Self {
            group,
            type_id,
            value: RelationshipValue::Target(target),
        }
    }

    /// Relationship holding a concrete literal.
    pub fn literal(group: u32, type_id: SctId, literal: impl Into<String>) -> Self {
        Self {
            group,
            type_id,
            value: RelationshipValue::Literal(literal.into()),
        }
    }
}

impl Ord for Relationship {
    fn cmp(&self, other: &Self) -> Ordering {
        self.type_id
            .cmp(&other.type_id)
            .then_with(|| self.value.cmp(&other.value))
            .then_with(|| self.group.cmp(&other.group))
    }
}

impl PartialOrd for Relationship {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// =============================================================================
// Mapping
// =============================================================================

/// A cross-map from a concept to a code in another system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    /// The map reference set.
    pub refset_id: SctId,
    /// Target code.
    pub target: String,
    /// Optional correlation concept.
    pub correlation: Option<SctId>,
    /// Human-readable map advice.
    pub advice: Option<String>,
    /// True when this is the reverse edge of an association.
    pub is_inverse: bool,
}

impl Mapping {
    /// Serializes the mapping to a single tab-delimited string.
    pub fn to_delimited(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}",
            self.refset_id,
            self.target,
            self.correlation.map(|c| c.to_string()).unwrap_or_default(),
            self.advice.as_deref().unwrap_or(""),
            if self.is_inverse { "1" } else { "0" }
        )
    }

    /// Parses a string produced by [`Mapping::to_delimited`].
    pub fn from_delimited(value: &str) -> IndexResult<Self> {
        let fields: Vec<&str> = value.split('\t').collect();
        let [refset_id, target, correlation, advice, inverse] = fields[..] else {
            return Err(IndexError::invalid_format(format!(
                "mapping has {} fields, expected 5",
                fields.len()
            )));
        };
        let refset_id = refset_id
            .parse()
            .map_err(|_| IndexError::invalid_format(format!("bad mapping refset '{}'", refset_id)))?;
        let correlation = if correlation.is_empty() {
            None
        } else {
            Some(correlation.parse().map_err(|_| {
                IndexError::invalid_format(format!("bad mapping correlation '{}'", correlation))
            })?)
        };
        Ok(Self {
            refset_id,
            target: target.to_string(),
            correlation,
            advice: (!advice.is_empty()).then(|| advice.to_string()),
            is_inverse: inverse == "1",
        })
    }
}

// =============================================================================
// Concept
// =============================================================================

/// A coded concept with its labels, hierarchy and attributes.
///
/// Equality is by id alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Concept {
    /// Concept id.
    pub id: SctId,
    /// Active flag.
    pub active: bool,
    /// Effective date as `YYYYMMDD`.
    pub effective_time: u32,
    /// Owning module.
    pub module_id: SctId,
    /// Primitive or fully defined.
    pub definition_status: DefinitionStatus,
    /// Labels, in release order.
    pub descriptions: Vec<Description>,
    /// Direct parents.
    pub parents: BTreeSet<SctId>,
    /// Transitive closure over parents.
    pub ancestors: BTreeSet<SctId>,
    /// Direct children.
    pub children: BTreeSet<SctId>,
    /// Reference sets this concept belongs to.
    pub memberships: BTreeSet<SctId>,
    /// Non-hierarchical defining attributes.
    pub relationships: Vec<Relationship>,
    /// Cross-maps.
    pub mappings: Vec<Mapping>,
}

impl PartialEq for Concept {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Concept {}

impl std::hash::Hash for Concept {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Concept {
    /// Creates a concept with no edges or labels.
    pub fn new(
        id: SctId,
        active: bool,
        effective_time: u32,
        module_id: SctId,
        definition_status: DefinitionStatus,
    ) -> Self {
        Self {
            id,
            active,
            effective_time,
            module_id,
            definition_status,
            descriptions: Vec::new(),
            parents: BTreeSet::new(),
            ancestors: BTreeSet::new(),
            children: BTreeSet::new(),
            memberships: BTreeSet::new(),
            relationships: Vec::new(),
            mappings: Vec::new(),
        }
    }

    /// The first fully specified name.
    pub fn fsn(&self) -> Option<&Description> {
        self.descriptions.iter().find(|d| d.is_fsn)
    }

    /// The preferred synonym in the first dialect that has one.
    pub fn preferred_term(&self, dialects: &[SctId]) -> Option<&Description> {
        dialects.iter().find_map(|dialect| {
            self.descriptions
                .iter()
                .find(|d| !d.is_fsn && d.preferred_in.contains(dialect))
        })
    }

    /// Display term: preferred term in the requested dialects, else the FSN.
    pub fn display_term(&self, dialects: &[SctId]) -> Option<&str> {
        self.preferred_term(dialects)
            .or_else(|| self.fsn())
            .or_else(|| self.descriptions.first())
            .map(|d| d.term.as_str())
    }

    /// Relationships in deterministic order.
    pub fn sorted_relationships(&self) -> Vec<&Relationship> {
        let mut sorted: Vec<&Relationship> = self.relationships.iter().collect();
        sorted.sort();
        sorted
    }
}

// =============================================================================
// Code system metadata
// =============================================================================

/// Edition and version of the loaded release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeSystemMetadata {
    /// Edition module id.
    pub module_id: SctId,
    /// Version date as `YYYYMMDD`.
    pub version_date: String,
}

fn version_uri_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^http://snomed\.info/sct/(\d{6,18})/version/(\d{8})$")
            .unwrap_or_else(|e| unreachable!("version URI pattern is valid: {e}"))
    })
}

impl CodeSystemMetadata {
    /// Parses `http://snomed.info/sct/{moduleId}/version/{YYYYMMDD}`.
    ///
    /// The date must be a real calendar date.
    pub fn from_version_uri(uri: &str) -> IndexResult<Self> {
        let invalid = || IndexError::InvalidVersionUri(uri.to_string());
        let captures = version_uri_pattern().captures(uri.trim()).ok_or_else(invalid)?;
        let module_id = captures[1].parse::<SctId>().map_err(|_| invalid())?;
        let version_date = captures[2].to_string();
        NaiveDate::parse_from_str(&version_date, "%Y%m%d").map_err(|_| invalid())?;
        Ok(Self {
            module_id,
            version_date,
        })
    }

    /// The version URI this metadata was parsed from.
    pub fn version_uri(&self) -> String {
        format!(
            "http://snomed.info/sct/{}/version/{}",
            self.module_id, self.version_date
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn english(id: SctId, term: &str, fsn: bool, preferred: &[SctId]) -> Description {
        let mut d = Description::new(id, "en", term, fsn);
        d.preferred_in.extend(preferred.iter().copied());
        d
    }

    mod relationships {
        use super::*;

        #[test]
        fn test_ordering_type_then_target_then_literal() {
            let mut rels = vec![
                Relationship::literal(0, 2, "#5"),
                Relationship::target(1, 2, 30),
                Relationship::target(0, 1, 99),
                Relationship::target(0, 2, 10),
            ];
            rels.sort();
            assert_eq!(rels[0], Relationship::target(0, 1, 99));
            assert_eq!(rels[1], Relationship::target(0, 2, 10));
            assert_eq!(rels[2], Relationship::target(1, 2, 30));
            assert_eq!(rels[3], Relationship::literal(0, 2, "#5"));
        }
    }

    mod mappings {
        use super::*;

        #[test]
        fn test_delimited_roundtrip_with_optional_fields() {
            let mapping = Mapping {
                refset_id: 447562003,
                target: "J45.9".into(),
                correlation: Some(447561005),
                advice: Some("ALWAYS J45.9".into()),
                is_inverse: false,
            };
            assert_eq!(Mapping::from_delimited(&mapping.to_delimited()).unwrap(), mapping);

            let bare = Mapping {
                refset_id: 900000000000527005,
                target: "22298006".into(),
                correlation: None,
                advice: None,
                is_inverse: true,
            };
            let encoded = bare.to_delimited();
            assert_eq!(encoded, "900000000000527005\t22298006\t\t\t1");
            assert_eq!(Mapping::from_delimited(&encoded).unwrap(), bare);
        }

        #[test]
        fn test_rejects_wrong_field_count() {
            assert!(Mapping::from_delimited("1\t2").is_err());
        }
    }

    mod concepts {
        use super::*;

        #[test]
        fn test_equality_by_id() {
            let a = Concept::new(9, true, 20240101, 1, DefinitionStatus::Primitive);
            let mut b = Concept::new(9, false, 20200101, 2, DefinitionStatus::FullyDefined);
            b.parents.insert(7);
            assert_eq!(a, b);
        }

        #[test]
        fn test_display_term_prefers_dialect_then_fsn() {
            let mut concept = Concept::new(22298006, true, 0, 0, DefinitionStatus::FullyDefined);
            concept.descriptions = vec![
                english(1, "Myocardial infarction (disorder)", true, &[well_known::GB_ENGLISH]),
                english(2, "Heart attack", false, &[well_known::US_ENGLISH]),
                english(3, "Myocardial infarction", false, &[well_known::GB_ENGLISH]),
            ];
            assert_eq!(concept.display_term(&[well_known::GB_ENGLISH]), Some("Myocardial infarction"));
            assert_eq!(
                concept.display_term(&[999, well_known::US_ENGLISH]),
                Some("Heart attack")
            );
            assert_eq!(
                concept.display_term(&[999]),
                Some("Myocardial infarction (disorder)")
            );
        }
    }

    mod version_uri {
        use super::*;

        #[test]
        fn test_parse_valid() {
            let meta = CodeSystemMetadata::from_version_uri(
                "http://snomed.info/sct/900000000000207008/version/20240101",
            )
            .unwrap();
            assert_eq!(meta.module_id, 900000000000207008);
            assert_eq!(meta.version_date, "20240101");
            assert_eq!(
                meta.version_uri(),
                "http://snomed.info/sct/900000000000207008/version/20240101"
            );
        }

        #[test]
        fn test_reject_malformed() {
            for uri in [
                "",
                "http://snomed.info/sct/900000000000207008",
                "http://snomed.info/sct/abc/version/20240101",
                "http://snomed.info/sct/900000000000207008/version/2024-01-01",
                "http://snomed.info/sct/900000000000207008/version/20241301",
            ] {
                assert!(
                    matches!(
                        CodeSystemMetadata::from_version_uri(uri),
                        Err(IndexError::InvalidVersionUri(_))
                    ),
                    "{uri}"
                );
            }
        }
    }
}
