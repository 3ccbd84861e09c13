//! Normal form rendering.
//!
//! Fully defined concepts render as `=== ` followed by their parents,
//! primitive concepts as `<<< ` followed by their own id. Defining
//! relationships follow after ` : `, ungrouped pairs first and each role
//! group in braces:
//!
//! ```text
//! === 414545008 : 363698007 = 80891009, { 116676008 = 55641003 }
//! ```

use std::collections::{BTreeMap, BTreeSet};

use snomed_index::{Concept, DefinitionStatus, Relationship, RelationshipValue, SctId};

/// Renders a concept's normal form.
///
/// With `terms`, every code that has an entry renders as `code|term|`.
pub fn render(concept: &Concept, terms: Option<&BTreeMap<SctId, String>>) -> String {
    let code = |id: SctId| match terms.and_then(|t| t.get(&id)) {
        Some(term) => format!("{}|{}|", id, term),
        None => id.to_string(),
    };

    let focus: Vec<String> = match concept.definition_status {
        DefinitionStatus::FullyDefined => concept.parents.iter().map(|&id| code(id)).collect(),
        DefinitionStatus::Primitive => vec![code(concept.id)],
    };
    let operator = match concept.definition_status {
        DefinitionStatus::FullyDefined => "===",
        DefinitionStatus::Primitive => "<<<",
    };
    let mut rendered = format!("{} {}", operator, focus.join(", "));

    let mut groups: BTreeMap<u32, Vec<&Relationship>> = BTreeMap::new();
    for relationship in concept.sorted_relationships() {
        groups.entry(relationship.group).or_default().push(relationship);
    }
    if groups.is_empty() {
        return rendered;
    }

    let rendered_groups: Vec<String> = groups
        .iter()
        .map(|(&group, relationships)| {
            let pairs: Vec<String> = relationships
                .iter()
                .map(|r| {
                    let value = match &r.value {
                        RelationshipValue::Target(target) => code(*target),
                        RelationshipValue::Literal(literal) => literal.clone(),
                    };
                    format!("{} = {}", code(r.type_id), value)
                })
                .collect();
            if group == 0 {
                pairs.join(", ")
            } else {
                format!("{{ {} }}", pairs.join(", "))
            }
        })
        .collect();
    rendered.push_str(" : ");
    rendered.push_str(&rendered_groups.join(", "));
    rendered
}

/// Every code a normal form mentions, for a single batched term lookup.
pub fn referenced_ids(concept: &Concept) -> BTreeSet<SctId> {
    let mut ids = BTreeSet::new();
    match concept.definition_status {
        DefinitionStatus::FullyDefined => ids.extend(concept.parents.iter().copied()),
        DefinitionStatus::Primitive => {
            ids.insert(concept.id);
        }
    }
    for relationship in &concept.relationships {
        ids.insert(relationship.type_id);
        if let Some(target) = relationship.value.target() {
            ids.insert(target);
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    const FINDING_SITE: SctId = 363698007;
    const MORPHOLOGY: SctId = 116676008;

    fn myocardial_infarction() -> Concept {
        let mut concept = Concept::new(22298006, true, 20020131, 1, DefinitionStatus::FullyDefined);
        concept.parents.extend([414545008, 251061000]);
        concept
            .relationships
            .push(Relationship::target(1, MORPHOLOGY, 55641003));
        concept
            .relationships
            .push(Relationship::target(1, FINDING_SITE, 74281007));
        concept
            .relationships
            .push(Relationship::target(0, 263502005, 424124008));
        concept
    }

    #[test]
    fn test_primitive_without_relationships() {
        let concept = Concept::new(138875005, true, 20020131, 1, DefinitionStatus::Primitive);
        assert_eq!(render(&concept, None), "<<< 138875005");
    }

    #[test]
    fn test_fully_defined_with_groups() {
        assert_eq!(
            render(&myocardial_infarction(), None),
            "=== 251061000, 414545008 : 263502005 = 424124008, \
             { 116676008 = 55641003, 363698007 = 74281007 }"
        );
    }

    #[test]
    fn test_literals_render_verbatim() {
        let mut concept = Concept::new(322236009, true, 20020131, 1, DefinitionStatus::Primitive);
        concept
            .relationships
            .push(Relationship::literal(1, 1142135004, "#500"));
        assert_eq!(render(&concept, None), "<<< 322236009 : { 1142135004 = #500 }");
    }

    #[test]
    fn test_verbose_terms() {
        let concept = myocardial_infarction();
        let ids = referenced_ids(&concept);
        assert_eq!(ids.len(), 8);
        assert!(!ids.contains(&22298006));

        let terms = BTreeMap::from([
            (414545008, "Ischemic heart disease".to_string()),
            (FINDING_SITE, "Finding site".to_string()),
        ]);
        let rendered = render(&concept, Some(&terms));
        assert!(rendered.starts_with("=== 251061000, 414545008|Ischemic heart disease| : "));
        assert!(rendered.contains("363698007|Finding site| = 74281007"));
    }
}
