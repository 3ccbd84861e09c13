//! In-memory concept graph built during import.
//!
//! Concepts live in an arena (`Vec<Concept>`) and are addressed by position;
//! an id-to-position map resolves SCTIDs. The ancestor closure is computed
//! lazily per concept, memoized, and frozen before indexing.

use std::collections::BTreeSet;

use hashbrown::{HashMap, HashSet};
use tracing::debug;

use crate::error::{IndexError, IndexResult};
use crate::model::{Concept, Relationship};
use crate::SctId;

/// Arena-backed concept graph.
#[derive(Debug, Default)]
pub struct ConceptGraph {
    concepts: Vec<Concept>,
    positions: HashMap<SctId, usize>,
    /// Positions whose `ancestors` set is complete.
    closed: Vec<bool>,
    frozen: bool,
}

impl ConceptGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of concepts.
    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    /// Returns true if the graph holds no concepts.
    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }

    /// Inserts a concept, replacing any previous concept with the same id.
    ///
    /// Edges already recorded on the previous concept are kept.
    pub fn insert(&mut self, mut concept: Concept) {
        match self.positions.get(&concept.id) {
            Some(&pos) => {
                let existing = &mut self.concepts[pos];
                concept.parents = std::mem::take(&mut existing.parents);
                concept.children = std::mem::take(&mut existing.children);
                concept.ancestors = std::mem::take(&mut existing.ancestors);
                concept.memberships = std::mem::take(&mut existing.memberships);
                concept.relationships = std::mem::take(&mut existing.relationships);
                concept.mappings = std::mem::take(&mut existing.mappings);
                *existing = concept;
            }
            None => {
                self.positions.insert(concept.id, self.concepts.len());
                self.concepts.push(concept);
                self.closed.push(false);
            }
        }
    }

    /// Returns true if the concept is known.
    pub fn contains(&self, id: SctId) -> bool {
        self.positions.contains_key(&id)
    }

    /// Looks up a concept by id.
    pub fn get(&self, id: SctId) -> Option<&Concept> {
        self.positions.get(&id).map(|&pos| &self.concepts[pos])
    }

    /// Mutable lookup by id.
    pub fn get_mut(&mut self, id: SctId) -> Option<&mut Concept> {
        match self.positions.get(&id) {
            Some(&pos) => Some(&mut self.concepts[pos]),
            None => None,
        }
    }

    /// Iterates concepts in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Concept> {
        self.concepts.iter()
    }

    /// All concept ids in insertion order.
    pub fn ids(&self) -> Vec<SctId> {
        self.concepts.iter().map(|c| c.id).collect()
    }

    /// Records an is-a edge in both directions.
    ///
    /// Returns `false` when either end is unknown; such edges are skipped.
    pub fn add_is_a(&mut self, child: SctId, parent: SctId) -> IndexResult<bool> {
        if self.frozen {
            return Err(IndexError::ClosureFrozen { child, parent });
        }
        let (Some(&child_pos), Some(&parent_pos)) =
            (self.positions.get(&child), self.positions.get(&parent))
        else {
            return Ok(false);
        };
        self.concepts[child_pos].parents.insert(parent);
        self.concepts[parent_pos].children.insert(child);
        Ok(true)
    }

    /// Appends a non-hierarchical relationship to its source concept.
    pub fn add_relationship(&mut self, source: SctId, relationship: Relationship) -> bool {
        match self.get_mut(source) {
            Some(concept) => {
                concept.relationships.push(relationship);
                true
            }
            None => false,
        }
    }

    /// Records reference set membership.
    pub fn add_membership(&mut self, concept_id: SctId, refset_id: SctId) -> bool {
        match self.get_mut(concept_id) {
            Some(concept) => {
                concept.memberships.insert(refset_id);
                true
            }
            None => false,
        }
    }

    /// Returns the ancestor closure of a concept, computing it on first use.
    pub fn ancestors(&mut self, id: SctId) -> Option<&BTreeSet<SctId>> {
        let pos = *self.positions.get(&id)?;
        self.close(pos);
        Some(&self.concepts[pos].ancestors)
    }

    /// Returns true if `ancestor` is a proper ancestor of `id`.
    pub fn is_descendant_of(&mut self, id: SctId, ancestor: SctId) -> bool {
        self.ancestors(id)
            .map(|set| set.contains(&ancestor))
            .unwrap_or(false)
    }

    /// All proper descendants of a concept, by walking child edges.
    pub fn descendants(&self, id: SctId) -> BTreeSet<SctId> {
        let mut result = BTreeSet::new();
        let mut stack: Vec<SctId> = match self.get(id) {
            Some(concept) => concept.children.iter().copied().collect(),
            None => return result,
        };
        while let Some(current) = stack.pop() {
            if result.insert(current) {
                if let Some(concept) = self.get(current) {
                    stack.extend(concept.children.iter().copied());
                }
            }
        }
        result
    }

    /// Computes every remaining closure and rejects further hierarchy edits.
    pub fn freeze(&mut self) {
        if self.frozen {
            return;
        }
        for pos in 0..self.concepts.len() {
            self.close(pos);
        }
        self.frozen = true;
        debug!(concepts = self.concepts.len(), "ancestor closure frozen");
    }

    /// Returns true once [`ConceptGraph::freeze`] has run.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Iterative post-order walk so deep hierarchies cannot overflow the stack.
    fn close(&mut self, start: usize) {
        if self.closed[start] {
            return;
        }
        let mut in_progress: HashSet<usize> = HashSet::new();
        let mut stack: Vec<(usize, bool)> = vec![(start, false)];

        while let Some((pos, expanded)) = stack.pop() {
            if self.closed[pos] {
                continue;
            }
            let parent_positions: Vec<usize> = self.concepts[pos]
                .parents
                .iter()
                .filter_map(|p| self.positions.get(p).copied())
                .collect();

            if !expanded {
                in_progress.insert(pos);
                stack.push((pos, true));
                for parent in parent_positions {
                    // A parent still in progress means a cycle; its partial set is used.
                    if !self.closed[parent] && !in_progress.contains(&parent) {
                        stack.push((parent, false));
                    }
                }
                continue;
            }

            let mut closure = BTreeSet::new();
            for parent in parent_positions {
                let parent_concept = &self.concepts[parent];
                closure.insert(parent_concept.id);
                closure.extend(parent_concept.ancestors.iter().copied());
            }
            closure.remove(&self.concepts[pos].id);
            self.concepts[pos].ancestors = closure;
            self.closed[pos] = true;
            in_progress.remove(&pos);
        }
    }

    /// Consumes the graph, yielding its concepts.
    pub fn into_concepts(self) -> Vec<Concept> {
        self.concepts
    }
}
