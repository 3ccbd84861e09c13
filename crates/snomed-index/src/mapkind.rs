//! Classification of reference sets into map kinds.
//!
//! A refset is a map when its concept descends from one of the map-type
//! roots. The root-to-descendant table is built once from the populated
//! graph; lookups for refsets outside it land in a negative cache.

use hashbrown::{HashMap, HashSet};
use tracing::debug;

use crate::graph::ConceptGraph;
use crate::model::Mapping;
use crate::rf2::{RefsetColumns, RefsetRow};
use crate::well_known;
use crate::SctId;

/// How rows of a reference set are turned into mappings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapKind {
    /// One target code per row, no advice.
    Simple,
    /// Concept-to-concept association; also yields a reverse edge.
    Association,
    /// Rule-based map with group, priority and advice.
    Complex,
    /// Not a map; rows only record membership.
    NotAMap,
}

/// Resolves refset ids to map kinds and builds mappings from refset rows.
#[derive(Debug, Default)]
pub struct MapKindResolver {
    kinds: HashMap<SctId, MapKind>,
    negative: HashSet<SctId>,
    category_labels: HashMap<SctId, String>,
}

impl MapKindResolver {
    /// Builds the descendant table from the populated graph.
    pub fn new(graph: &ConceptGraph) -> Self {
        // Later roots win, so complex and extended maps override a simple-map ancestor.
        let roots = [
            (well_known::SIMPLE_MAP_ROOT, MapKind::Simple),
            (well_known::ASSOCIATION_ROOT, MapKind::Association),
            (well_known::COMPLEX_MAP_ROOT, MapKind::Complex),
            (well_known::EXTENDED_MAP_ROOT, MapKind::Complex),
        ];
        let mut kinds = HashMap::new();
        for (root, kind) in roots {
            for refset in graph.descendants(root) {
                kinds.insert(refset, kind);
            }
        }
        debug!(map_refsets = kinds.len(), "map refset table built");
        Self {
            kinds,
            ..Self::default()
        }
    }

    /// Sets the display labels used for map categories.
    pub fn set_category_labels(&mut self, labels: HashMap<SctId, String>) {
        self.category_labels = labels;
    }

    /// Classifies a refset id.
    pub fn classify(&mut self, refset_id: SctId) -> MapKind {
        if let Some(&kind) = self.kinds.get(&refset_id) {
            return kind;
        }
        if self.negative.insert(refset_id) {
            debug!(refset_id, "refset is not a map");
        }
        MapKind::NotAMap
    }

    /// Label for a map category, falling back to the raw id.
    pub fn category_label(&self, category_id: SctId) -> String {
        self.category_labels
            .get(&category_id)
            .cloned()
            .unwrap_or_else(|| category_id.to_string())
    }

    /// Mappings produced by one active refset row, keyed by the concept
    /// that owns them. Rows whose columns do not fit the refset's map kind
    /// produce nothing.
    pub fn mappings(&mut self, row: &RefsetRow) -> Vec<(SctId, Mapping)> {
        let source = row.referenced_component_id;
        match (self.classify(row.refset_id), &row.columns) {
            (MapKind::Simple, RefsetColumns::SimpleMap { map_target }) => vec![(
                source,
                Mapping {
                    refset_id: row.refset_id,
                    target: map_target.clone(),
                    correlation: None,
                    advice: None,
                    is_inverse: false,
                },
            )],
            (
                MapKind::Association,
                RefsetColumns::Association {
                    target_component_id,
                },
            ) => vec![
                (
                    source,
                    Mapping {
                        refset_id: row.refset_id,
                        target: target_component_id.to_string(),
                        correlation: None,
                        advice: None,
                        is_inverse: false,
                    },
                ),
                (
                    *target_component_id,
                    Mapping {
                        refset_id: row.refset_id,
                        target: source.to_string(),
                        correlation: None,
                        advice: None,
                        is_inverse: true,
                    },
                ),
            ],
            (
                MapKind::Complex,
                RefsetColumns::ComplexMap {
                    map_group,
                    map_priority,
                    map_rule,
                    map_advice,
                    map_target,
                    correlation_id,
                    map_category_id,
                },
            ) => {
                let mut advice = format!(
                    "group {}, priority {}, rule {}, advice {}",
                    map_group, map_priority, map_rule, map_advice
                );
                if let Some(category) = map_category_id {
                    advice.push_str(", category ");
                    advice.push_str(&self.category_label(*category));
                }
                vec![(
                    source,
                    Mapping {
                        refset_id: row.refset_id,
                        target: map_target.clone(),
                        correlation: *correlation_id,
                        advice: Some(advice),
                        is_inverse: false,
                    },
                )]
            }
            _ => Vec::new(),
        }
    }
}
