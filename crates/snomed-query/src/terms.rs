//! Display term lookup.

use std::collections::BTreeMap;

use snomed_index::codec::{self, fields};
use snomed_index::{Concept, SctId, Snapshot};

use crate::error::QueryResult;

/// Loads a concept document, ignoring keys that hold other document types.
pub(crate) fn load_concept(snapshot: &Snapshot, id: SctId) -> QueryResult<Option<Concept>> {
    match snapshot.document(id)? {
        Some(doc) if doc.first(fields::TYPE) == Some(codec::CONCEPT) => {
            Ok(Some(codec::decode_concept(&doc)?))
        }
        _ => Ok(None),
    }
}

/// Resolves display terms for a batch of concepts.
///
/// Each term is the preferred synonym in the first dialect that has one,
/// else the fully specified name. Unknown ids and concepts without
/// descriptions are left out of the map.
pub fn display_terms<I>(
    snapshot: &Snapshot,
    ids: I,
    dialects: &[SctId],
) -> QueryResult<BTreeMap<SctId, String>>
where
    I: IntoIterator<Item = SctId>,
{
    let mut terms = BTreeMap::new();
    for id in ids {
        if terms.contains_key(&id) {
            continue;
        }
        if let Some(concept) = load_concept(snapshot, id)? {
            if let Some(term) = concept.display_term(dialects) {
                terms.insert(id, term.to_string());
            }
        }
    }
    Ok(terms)
}
