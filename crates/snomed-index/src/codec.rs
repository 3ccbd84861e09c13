//! Concept <-> index document codec.
//!
//! Scalars and id sets are indexed as plain strings. Relationships,
//! descriptions and mappings are stored in compact delimited forms:
//!
//! ```text
//! relationships  0:363698007=39057004,116676008=79654002|1:1142135004='#500
//! description    <id> TAB <F|S> TAB <lang> TAB <term> TAB <preferred,...> TAB <acceptable,...>
//! ```
//!
//! Concrete values carry a leading `'` so they never read back as targets.
//! Every concept target is also indexed as `<typeId>=<targetId>` under
//! [`fields::ATTRIBUTES`] so refinements can be answered from postings.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{IndexError, IndexResult};
use crate::fold::TermFolder;
use crate::model::{
    CodeSystemMetadata, Concept, DefinitionStatus, Description, Mapping, Relationship,
    RelationshipValue,
};
use crate::store::Document;
use crate::SctId;

pub use crate::store::fields;

/// Document type of concept documents.
pub const CONCEPT: &str = "concept";

/// Document type of the code system document.
pub const CODE_SYSTEM: &str = "codesystem";

/// Key of the single code system document; never a valid SCTID.
pub const CODE_SYSTEM_KEY: u64 = u64::MAX;

/// Value indexed under [`fields::ATTRIBUTES`] for one concept target.
pub fn attribute_value(type_id: SctId, target: SctId) -> String {
    format!("{}={}", type_id, target)
}

/// Concept targets of one attribute type, read from a stored document.
pub fn attribute_targets(doc: &Document, type_id: SctId) -> Vec<SctId> {
    let prefix = format!("{}=", type_id);
    doc.values(fields::ATTRIBUTES)
        .iter()
        .filter_map(|value| value.strip_prefix(prefix.as_str())?.parse().ok())
        .collect()
}

// =============================================================================
// Concepts
// =============================================================================

/// Encodes a concept as an index document, folding terms per description
/// language and ranking by the preferred term in `dialects`.
pub fn encode_concept(concept: &Concept, folder: &TermFolder, dialects: &[SctId]) -> Document {
    let mut doc = Document::new(concept.id);
    doc.sort_key = sort_key(concept, dialects);
    doc.index(fields::TYPE, CONCEPT)
        .index(fields::ID, concept.id.to_string())
        .index(fields::ACTIVE, concept.active.to_string())
        .index(fields::EFFECTIVE_TIME, concept.effective_time.to_string())
        .index(fields::MODULE, concept.module_id.to_string())
        .index(fields::DEFINITION_STATUS, concept.definition_status.code())
        .index_all(fields::PARENTS, concept.parents.iter().map(u64::to_string))
        .index_all(fields::ANCESTORS, concept.ancestors.iter().map(u64::to_string))
        .index_all(fields::CHILDREN, concept.children.iter().map(u64::to_string))
        .index_all(fields::MEMBERS, concept.memberships.iter().map(u64::to_string));

    let mut attributes: BTreeMap<SctId, BTreeSet<SctId>> = BTreeMap::new();
    for relationship in &concept.relationships {
        if let RelationshipValue::Target(target) = relationship.value {
            attributes
                .entry(relationship.type_id)
                .or_default()
                .insert(target);
        }
    }
    doc.index_all(fields::ATTRIBUTE_TYPES, attributes.keys().map(u64::to_string));
    for (type_id, targets) in &attributes {
        doc.index_all(
            fields::ATTRIBUTES,
            targets.iter().map(|&target| attribute_value(*type_id, target)),
        );
    }

    let tokens: BTreeSet<String> = concept
        .descriptions
        .iter()
        .flat_map(|d| folder.tokens(&d.term, &d.language))
        .collect();
    doc.index_all(fields::TERM, tokens);

    if !concept.relationships.is_empty() {
        doc.store(fields::RELATIONSHIPS, encode_relationships(&concept.relationships));
    }
    for description in &concept.descriptions {
        doc.store(fields::DESCRIPTIONS, encode_description(description));
    }
    for mapping in &concept.mappings {
        doc.store(fields::MAPPINGS, mapping.to_delimited());
    }
    doc
}

/// Rebuilds a concept from its document.
pub fn decode_concept(doc: &Document) -> IndexResult<Concept> {
    if doc.first(fields::TYPE) != Some(CONCEPT) {
        return Err(IndexError::invalid_format(format!(
            "document {} is not a concept",
            doc.key
        )));
    }
    let definition_status = doc
        .first(fields::DEFINITION_STATUS)
        .and_then(DefinitionStatus::from_code)
        .ok_or_else(|| missing(doc.key, fields::DEFINITION_STATUS))?;

    let mut concept = Concept::new(
        doc.key,
        doc.first(fields::ACTIVE) == Some("true"),
        parse_field(doc, fields::EFFECTIVE_TIME)?,
        parse_field(doc, fields::MODULE)?,
        definition_status,
    );
    concept.parents = parse_ids(doc, fields::PARENTS)?;
    concept.ancestors = parse_ids(doc, fields::ANCESTORS)?;
    concept.children = parse_ids(doc, fields::CHILDREN)?;
    concept.memberships = parse_ids(doc, fields::MEMBERS)?;
    if let Some(blob) = doc.first(fields::RELATIONSHIPS) {
        concept.relationships = decode_relationships(blob)?;
    }
    concept.descriptions = doc
        .values(fields::DESCRIPTIONS)
        .iter()
        .map(|entry| decode_description(entry))
        .collect::<IndexResult<_>>()?;
    concept.mappings = doc
        .values(fields::MAPPINGS)
        .iter()
        .map(|entry| Mapping::from_delimited(entry))
        .collect::<IndexResult<_>>()?;
    Ok(concept)
}

/// Ranking key: length of the preferred term in `dialects`, then FSN
/// length, shorter first. Without a preferred term the FSN length counts twice.
pub fn sort_key(concept: &Concept, dialects: &[SctId]) -> u64 {
    let fsn_len = concept
        .fsn()
        .map(|d| d.term.chars().count())
        .unwrap_or(0)
        .min(9_999) as u64;
    let preferred_len = concept
        .preferred_term(dialects)
        .map(|d| d.term.chars().count() as u64)
        .unwrap_or(fsn_len);
    preferred_len * 10_000 + fsn_len
}

fn missing(key: u64, field: &str) -> IndexError {
    IndexError::invalid_format(format!("document {} has no valid '{}'", key, field))
}

fn parse_field<T: std::str::FromStr>(doc: &Document, field: &str) -> IndexResult<T> {
    doc.first(field)
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| missing(doc.key, field))
}

fn parse_ids(doc: &Document, field: &str) -> IndexResult<BTreeSet<SctId>> {
    doc.values(field)
        .iter()
        .map(|v| v.parse().map_err(|_| missing(doc.key, field)))
        .collect()
}

// =============================================================================
// Relationships
// =============================================================================

/// Encodes relationships grouped by role group, in deterministic order.
pub fn encode_relationships(relationships: &[Relationship]) -> String {
    let mut groups: BTreeMap<u32, Vec<&Relationship>> = BTreeMap::new();
    for relationship in relationships {
        groups.entry(relationship.group).or_default().push(relationship);
    }

    let mut encoded = String::new();
    for (i, (group, mut members)) in groups.into_iter().enumerate() {
        members.sort();
        if i > 0 {
            encoded.push('|');
        }
        encoded.push_str(&group.to_string());
        encoded.push(':');
        for (j, relationship) in members.iter().enumerate() {
            if j > 0 {
                encoded.push(',');
            }
            encoded.push_str(&relationship.type_id.to_string());
            encoded.push('=');
            match &relationship.value {
                RelationshipValue::Target(target) => encoded.push_str(&target.to_string()),
                RelationshipValue::Literal(literal) => {
                    encoded.push(LITERAL_MARKER);
                    escape_into(literal, &mut encoded);
                }
            }
        }
    }
    encoded
}

/// Decodes a blob produced by [`encode_relationships`].
pub fn decode_relationships(blob: &str) -> IndexResult<Vec<Relationship>> {
    let malformed = |part: &str| {
        IndexError::invalid_format(format!("malformed relationship entry '{}'", part))
    };

    let mut relationships = Vec::new();
    if blob.is_empty() {
        return Ok(relationships);
    }
    for group_part in split_unescaped(blob, '|') {
        let (group, pairs) = group_part.split_once(':').ok_or_else(|| malformed(group_part))?;
        let group: u32 = group.parse().map_err(|_| malformed(group_part))?;
        for pair in split_unescaped(pairs, ',') {
            let (type_id, value) = pair.split_once('=').ok_or_else(|| malformed(pair))?;
            let type_id: SctId = type_id.parse().map_err(|_| malformed(pair))?;
            let value = match value.strip_prefix(LITERAL_MARKER) {
                Some(literal) => RelationshipValue::Literal(unescape(literal)),
                None => RelationshipValue::Target(value.parse().map_err(|_| malformed(pair))?),
            };
            relationships.push(Relationship {
                group,
                type_id,
                value,
            });
        }
    }
    Ok(relationships)
}

/// Leads every concrete value in the blob.
const LITERAL_MARKER: char = '\'';

const RESERVED: [char; 5] = ['\\', '|', ',', '=', ':'];

fn escape_into(value: &str, out: &mut String) {
    for c in value.chars() {
        if RESERVED.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Splits on `separator` where it is not preceded by an escape.
fn split_unescaped(value: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in value.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == separator {
            parts.push(&value[start..i]);
            start = i + c.len_utf8();
        }
    }
    parts.push(&value[start..]);
    parts
}

// =============================================================================
// Descriptions
// =============================================================================

/// Encodes one description as a tab-delimited entry.
pub fn encode_description(description: &Description) -> String {
    format!(
        "{}\t{}\t{}\t{}\t{}\t{}",
        description.id,
        if description.is_fsn { "F" } else { "S" },
        description.language,
        description.term,
        join_ids(&description.preferred_in),
        join_ids(&description.acceptable_in),
    )
}

/// Decodes an entry produced by [`encode_description`].
pub fn decode_description(entry: &str) -> IndexResult<Description> {
    let malformed = || IndexError::invalid_format(format!("malformed description entry '{}'", entry));
    let parts: Vec<&str> = entry.split('\t').collect();
    let [id, kind, language, term, preferred, acceptable] = parts[..] else {
        return Err(malformed());
    };
    let mut description = Description::new(
        id.parse().map_err(|_| malformed())?,
        language,
        term,
        kind == "F",
    );
    description.preferred_in = split_ids(preferred).ok_or_else(malformed)?;
    description.acceptable_in = split_ids(acceptable).ok_or_else(malformed)?;
    Ok(description)
}

fn join_ids(ids: &BTreeSet<SctId>) -> String {
    ids.iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn split_ids(value: &str) -> Option<BTreeSet<SctId>> {
    if value.is_empty() {
        return Some(BTreeSet::new());
    }
    value.split(',').map(|id| id.parse().ok()).collect()
}

// =============================================================================
// Code system
// =============================================================================

/// Encodes the code system metadata document.
pub fn encode_code_system(metadata: &CodeSystemMetadata) -> Document {
    let mut doc = Document::new(CODE_SYSTEM_KEY);
    doc.index(fields::TYPE, CODE_SYSTEM)
        .index(fields::MODULE, metadata.module_id.to_string())
        .index(fields::VERSION_DATE, metadata.version_date.as_str());
    doc
}

/// Decodes the code system metadata document.
pub fn decode_code_system(doc: &Document) -> IndexResult<CodeSystemMetadata> {
    if doc.first(fields::TYPE) != Some(CODE_SYSTEM) {
        return Err(IndexError::invalid_format("not a code system document"));
    }
    Ok(CodeSystemMetadata {
        module_id: parse_field(doc, fields::MODULE)?,
        version_date: doc
            .first(fields::VERSION_DATE)
            .ok_or_else(|| missing(doc.key, fields::VERSION_DATE))?
            .to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::well_known;

    fn sample_concept() -> Concept {
        let mut concept = Concept::new(
            22298006,
            true,
            20020131,
            900000000000207008,
            DefinitionStatus::FullyDefined,
        );
        concept.parents.insert(414545008);
        concept.ancestors.extend([414545008, 404684003, 138875005]);
        concept.children.insert(1755008);
        concept.memberships.insert(447562003);
        concept.relationships = vec![
            Relationship::target(1, 363698007, 74281007),
            Relationship::target(1, 116676008, 55641003),
            Relationship::target(0, 263502005, 424124008),
            Relationship::literal(2, 1142135004, "#500"),
            Relationship::literal(2, 1142139005, "\"a,b|c=d\\e\""),
        ];
        let mut fsn = Description::new(1, "en", "Myocardial infarction (disorder)", true);
        fsn.preferred_in.insert(well_known::US_ENGLISH);
        let mut pt = Description::new(2, "en", "Myocardial infarction", false);
        pt.preferred_in.insert(well_known::US_ENGLISH);
        pt.acceptable_in.insert(well_known::GB_ENGLISH);
        let mut swedish = Description::new(3, "sv", "Hjärtinfarkt", false);
        swedish.preferred_in.insert(46011000052107);
        concept.descriptions = vec![fsn, pt, swedish];
        concept.mappings.push(Mapping {
            refset_id: 447562003,
            target: "I21.9".into(),
            correlation: Some(447561005),
            advice: Some("group 1, priority 1, rule TRUE, advice ALWAYS I21.9".into()),
            is_inverse: false,
        });
        concept
    }

    fn multiset(relationships: &[Relationship]) -> Vec<Relationship> {
        let mut sorted = relationships.to_vec();
        sorted.sort_by(|a, b| a.group.cmp(&b.group).then(a.cmp(b)));
        sorted
    }

    mod relationships {
        use super::*;

        #[test]
        fn test_blob_format() {
            let blob = encode_relationships(&[
                Relationship::target(1, 363698007, 74281007),
                Relationship::target(0, 263502005, 424124008),
                Relationship::target(1, 116676008, 55641003),
            ]);
            assert_eq!(
                blob,
                "0:263502005=424124008|1:116676008=55641003,363698007=74281007"
            );
        }

        #[test]
        fn test_literal_format() {
            let blob = encode_relationships(&[
                Relationship::literal(0, 1142135004, "500"),
                Relationship::literal(0, 1142139005, "\"a,b\""),
            ]);
            assert_eq!(blob, "0:1142135004='500,1142139005='\"a\\,b\"");
        }

        #[test]
        fn test_roundtrip_preserves_multiset() {
            let mut concept = sample_concept();
            concept.relationships.extend([
                Relationship::literal(0, 1142135004, "500"),
                Relationship::literal(3, 1142135004, "5mg"),
                Relationship::literal(3, 1142139005, "'quoted'"),
            ]);
            let decoded = decode_relationships(&encode_relationships(&concept.relationships)).unwrap();
            assert_eq!(multiset(&decoded), multiset(&concept.relationships));
        }

        #[test]
        fn test_numeric_literal_stays_literal() {
            let decoded =
                decode_relationships(&encode_relationships(&[Relationship::literal(0, 1142135004, "500")]))
                    .unwrap();
            assert_eq!(decoded[0].value, RelationshipValue::Literal("500".into()));
        }

        #[test]
        fn test_duplicate_pairs_survive() {
            let rels = vec![
                Relationship::target(0, 1, 2),
                Relationship::target(0, 1, 2),
            ];
            assert_eq!(decode_relationships(&encode_relationships(&rels)).unwrap().len(), 2);
        }

        #[test]
        fn test_empty_and_malformed() {
            assert!(decode_relationships("").unwrap().is_empty());
            assert!(decode_relationships("x:1=2").is_err());
            assert!(decode_relationships("0:1").is_err());
            // unmarked values must be concept ids
            assert!(decode_relationships("0:1=5mg").is_err());
        }
    }

    mod concepts {
        use super::*;

        #[test]
        fn test_concept_roundtrip() {
            let concept = sample_concept();
            let doc = encode_concept(&concept, &TermFolder::new(), &[well_known::US_ENGLISH]);
            let decoded = decode_concept(&doc).unwrap();

            assert_eq!(decoded.id, concept.id);
            assert_eq!(decoded.active, concept.active);
            assert_eq!(decoded.effective_time, concept.effective_time);
            assert_eq!(decoded.module_id, concept.module_id);
            assert_eq!(decoded.definition_status, concept.definition_status);
            assert_eq!(decoded.parents, concept.parents);
            assert_eq!(decoded.ancestors, concept.ancestors);
            assert_eq!(decoded.children, concept.children);
            assert_eq!(decoded.memberships, concept.memberships);
            assert_eq!(decoded.descriptions, concept.descriptions);
            assert_eq!(decoded.mappings, concept.mappings);
            assert_eq!(multiset(&decoded.relationships), multiset(&concept.relationships));
        }

        #[test]
        fn test_attribute_fields_hold_targets_only() {
            let doc = encode_concept(&sample_concept(), &TermFolder::new(), &[]);
            assert_eq!(attribute_targets(&doc, 363698007), vec![74281007]);
            assert!(attribute_targets(&doc, 1142135004).is_empty());
            assert_eq!(doc.values(fields::ATTRIBUTE_TYPES), ["116676008", "263502005", "363698007"]);
            assert!(doc
                .values(fields::ATTRIBUTES)
                .contains(&attribute_value(116676008, 55641003)));
        }

        #[test]
        fn test_terms_fold_by_description_language() {
            let folder = TermFolder::new().with_language("sv", "åäö");
            let doc = encode_concept(&sample_concept(), &folder, &[]);
            let terms = doc.values(fields::TERM);
            assert!(terms.contains(&"hjärtinfarkt".to_string()));
            assert!(terms.contains(&"myocardial".to_string()));
            assert!(!terms.contains(&"hjartinfarkt".to_string()));
        }

        #[test]
        fn test_sort_key() {
            let concept = sample_concept();
            // "Myocardial infarction" = 21, FSN = 32
            assert_eq!(sort_key(&concept, &[well_known::US_ENGLISH]), 21 * 10_000 + 32);
            // no preferred term in GB English: the FSN stands in
            assert_eq!(sort_key(&concept, &[well_known::GB_ENGLISH]), 32 * 10_000 + 32);
            let bare = Concept::new(1, true, 0, 0, DefinitionStatus::Primitive);
            assert_eq!(sort_key(&bare, &[well_known::US_ENGLISH]), 0);
        }

        #[test]
        fn test_sort_key_follows_dialect_order() {
            let mut concept = Concept::new(1, true, 0, 0, DefinitionStatus::Primitive);
            let mut fsn = Description::new(10, "en", "Tumor of kidney (disorder)", true);
            fsn.preferred_in.insert(well_known::US_ENGLISH);
            // GB preferred term comes first in release order
            let mut gb = Description::new(11, "en", "Renal tumour", false);
            gb.preferred_in.insert(well_known::GB_ENGLISH);
            let mut us = Description::new(12, "en", "Tumor of kidney", false);
            us.preferred_in.insert(well_known::US_ENGLISH);
            concept.descriptions = vec![fsn, gb, us];

            let us_first = [well_known::US_ENGLISH, well_known::GB_ENGLISH];
            assert_eq!(sort_key(&concept, &us_first), 15 * 10_000 + 26);
            let gb_first = [well_known::GB_ENGLISH, well_known::US_ENGLISH];
            assert_eq!(sort_key(&concept, &gb_first), 12 * 10_000 + 26);
            assert_eq!(
                encode_concept(&concept, &TermFolder::new(), &us_first).sort_key,
                15 * 10_000 + 26
            );
        }

        #[test]
        fn test_rejects_non_concept() {
            let doc = encode_code_system(&CodeSystemMetadata {
                module_id: 900000000000207008,
                version_date: "20240101".into(),
            });
            assert!(decode_concept(&doc).is_err());
            assert_eq!(decode_code_system(&doc).unwrap().version_date, "20240101");
        }
    }

    mod descriptions {
        use super::*;

        #[test]
        fn test_entry_format() {
            let mut d = Description::new(2, "en", "Heart attack", false);
            d.acceptable_in.extend([well_known::US_ENGLISH, well_known::GB_ENGLISH]);
            assert_eq!(
                encode_description(&d),
                "2\tS\ten\tHeart attack\t\t900000000000509007,999001261000000100"
            );
        }

        #[test]
        fn test_malformed_entry() {
            assert!(decode_description("1\tF\ten").is_err());
            assert!(decode_description("1\tF\ten\tx\tabc\t").is_err());
        }
    }
}
