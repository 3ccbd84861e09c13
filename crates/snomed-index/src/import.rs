//! Two-pass release importer.
//!
//! Pass 1 builds the concept skeleton, hierarchy, relationships, memberships
//! and mappings. Pass 2 loads descriptions and their language acceptability
//! in batches of concept ids, writing each batch to the store before the next
//! one is read. The whole import commits at once: a failure at any point
//! leaves the previously committed index unchanged.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::codec;
use crate::error::IndexResult;
use crate::fold::TermFolder;
use crate::graph::ConceptGraph;
use crate::mapkind::MapKindResolver;
use crate::model::{CodeSystemMetadata, Concept, DefinitionStatus, Description, Relationship};
use crate::release::ReleaseArchive;
use crate::rf2::{
    classify, ConceptRow, DescriptionRow, FileKind, Record, RefsetColumns, RefsetRow,
    RelationshipRow, RowReader,
};
use crate::store::{Document, IndexStore, DEFAULT_WRITER_MEMORY};
use crate::well_known;
use crate::SctId;

/// Default number of concepts whose descriptions are loaded per batch.
pub const DEFAULT_BATCH_SIZE: usize = 50_000;

/// Import settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportOptions {
    /// Concepts per description batch.
    pub batch_size: usize,
    /// Folding table applied to description terms at index time.
    pub folder: TermFolder,
    /// Language reference sets, in order, whose preferred term ranks a concept.
    pub dialects: Vec<SctId>,
    /// Bytes the index writer buffers before spilling a segment to disk.
    pub writer_memory: usize,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            folder: TermFolder::new(),
            dialects: vec![well_known::US_ENGLISH, well_known::GB_ENGLISH],
            writer_memory: DEFAULT_WRITER_MEMORY,
        }
    }
}

impl ImportOptions {
    /// Sets the batch size; zero is treated as one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Sets the folding table.
    pub fn with_folder(mut self, folder: TermFolder) -> Self {
        self.folder = folder;
        self
    }

    /// Sets the ranking dialects; an empty list keeps the current ones.
    pub fn with_dialects(mut self, dialects: Vec<SctId>) -> Self {
        if !dialects.is_empty() {
            self.dialects = dialects;
        }
        self
    }

    /// Sets the index writer's memory budget.
    pub fn with_writer_memory(mut self, bytes: usize) -> Self {
        self.writer_memory = bytes;
        self
    }
}

/// Counts reported by a finished import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub concepts: usize,
    pub is_a_edges: usize,
    pub relationships: usize,
    pub memberships: usize,
    pub mappings: usize,
    pub descriptions: usize,
    pub batches: usize,
    /// Store generation published by the import.
    pub generation: u64,
    #[serde(skip)]
    pub elapsed: Duration,
}

/// A release file selected for import.
struct ReleaseFile {
    archive: usize,
    entry: String,
    kind: FileKind,
}

/// Imports one or more release archives as the sole contents of `store`.
///
/// The version URI is validated before any archive is read, and every
/// archive is listed and read through pass 1 before the store is touched.
pub fn import(
    store: &IndexStore,
    mut archives: Vec<Box<dyn ReleaseArchive>>,
    version_uri: &str,
    options: &ImportOptions,
) -> IndexResult<ImportSummary> {
    let metadata = CodeSystemMetadata::from_version_uri(version_uri)?;
    let started = Instant::now();
    info!(
        version = %metadata.version_uri(),
        archives = archives.len(),
        "import started"
    );

    let files = plan(&mut archives)?;
    let mut summary = ImportSummary::default();
    let mut graph = ConceptGraph::new();

    load_concepts(&mut archives, &files, &mut graph)?;
    summary.concepts = graph.len();
    load_relationships(&mut archives, &files, &mut graph, &mut summary)?;

    let mut resolver = MapKindResolver::new(&graph);
    let categories = graph.descendants(well_known::MAP_CATEGORY_VALUE);
    resolver.set_category_labels(category_labels(&mut archives, &files, &categories)?);
    load_refsets(&mut archives, &files, &mut graph, &mut resolver, &mut summary)?;

    graph.freeze();
    info!(
        concepts = summary.concepts,
        is_a_edges = summary.is_a_edges,
        relationships = summary.relationships,
        memberships = summary.memberships,
        mappings = summary.mappings,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "pass 1 complete"
    );

    let mut writer = store.writer_with_memory(true, options.writer_memory)?;
    let ids = graph.ids();
    let batch_size = options.batch_size.max(1);
    for batch in ids.chunks(batch_size) {
        let mut descriptions = load_descriptions(&mut archives, &files, batch)?;
        for &id in batch {
            if let Some(concept) = graph.get_mut(id) {
                concept.descriptions = descriptions.remove(&id).unwrap_or_default();
                summary.descriptions += concept.descriptions.len();
            }
        }
        for document in encode_batch(&graph, batch, options) {
            writer.add(document)?;
        }
        for &id in batch {
            if let Some(concept) = graph.get_mut(id) {
                concept.descriptions = Vec::new();
            }
        }
        summary.batches += 1;
        info!(
            batch = summary.batches,
            concepts = batch.len(),
            descriptions = summary.descriptions,
            "description batch written"
        );
    }

    writer.add(codec::encode_code_system(&metadata))?;
    let snapshot = writer.commit()?;
    summary.generation = snapshot.generation();
    summary.elapsed = started.elapsed();
    info!(
        concepts = summary.concepts,
        descriptions = summary.descriptions,
        generation = summary.generation,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "import complete"
    );
    Ok(summary)
}

/// Encodes one batch of concepts, on all cores with the `parallel` feature.
fn encode_batch(graph: &ConceptGraph, batch: &[SctId], options: &ImportOptions) -> Vec<Document> {
    let concepts: Vec<&Concept> = batch.iter().filter_map(|&id| graph.get(id)).collect();
    let encode = |concept: &&Concept| codec::encode_concept(concept, &options.folder, &options.dialects);

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        concepts.par_iter().map(encode).collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        concepts.iter().map(encode).collect()
    }
}

/// Lists every archive and keeps the files the importer reads.
fn plan(archives: &mut [Box<dyn ReleaseArchive>]) -> IndexResult<Vec<ReleaseFile>> {
    let mut files = Vec::new();
    for (index, archive) in archives.iter_mut().enumerate() {
        for entry in archive.entries()? {
            if let Some(kind) = classify(&entry) {
                debug!(archive = archive.name(), entry = %entry, ?kind, "release file selected");
                files.push(ReleaseFile {
                    archive: index,
                    entry,
                    kind,
                });
            }
        }
    }
    Ok(files)
}

/// Streams every record of every file of `kind` into `each`.
fn scan<T: Record>(
    archives: &mut [Box<dyn ReleaseArchive>],
    files: &[ReleaseFile],
    kinds: &[FileKind],
    mut each: impl FnMut(T) -> IndexResult<()>,
) -> IndexResult<()> {
    for file in files.iter().filter(|f| kinds.contains(&f.kind)) {
        let reader = archives[file.archive].open(&file.entry)?;
        for record in RowReader::new(file.entry.as_str(), reader)?.records::<T>()? {
            each(record?)?;
        }
    }
    Ok(())
}

fn load_concepts(
    archives: &mut [Box<dyn ReleaseArchive>],
    files: &[ReleaseFile],
    graph: &mut ConceptGraph,
) -> IndexResult<()> {
    scan(archives, files, &[FileKind::Concept], |row: ConceptRow| {
        graph.insert(Concept::new(
            row.id,
            row.active,
            row.effective_time,
            row.module_id,
            DefinitionStatus::from_id(row.definition_status_id),
        ));
        Ok(())
    })
}

fn load_relationships(
    archives: &mut [Box<dyn ReleaseArchive>],
    files: &[ReleaseFile],
    graph: &mut ConceptGraph,
    summary: &mut ImportSummary,
) -> IndexResult<()> {
    scan(
        archives,
        files,
        &[FileKind::Relationship, FileKind::ConcreteRelationship],
        |row: RelationshipRow| {
            if !row.active {
                return Ok(());
            }
            if row.type_id == well_known::IS_A {
                if row.characteristic_type_id == well_known::INFERRED_RELATIONSHIP {
                    if let Some(parent) = row.value.target() {
                        if graph.add_is_a(row.source_id, parent)? {
                            summary.is_a_edges += 1;
                        }
                    }
                }
            } else if graph.add_relationship(
                row.source_id,
                Relationship {
                    group: row.group,
                    type_id: row.type_id,
                    value: row.value,
                },
            ) {
                summary.relationships += 1;
            }
            Ok(())
        },
    )
}

/// Display labels for map category concepts: first synonym, else the FSN.
fn category_labels(
    archives: &mut [Box<dyn ReleaseArchive>],
    files: &[ReleaseFile],
    categories: &std::collections::BTreeSet<SctId>,
) -> IndexResult<HashMap<SctId, String>> {
    let mut synonyms: HashMap<SctId, String> = HashMap::new();
    let mut fsns: HashMap<SctId, String> = HashMap::new();
    if categories.is_empty() {
        return Ok(synonyms);
    }
    scan(archives, files, &[FileKind::Description], |row: DescriptionRow| {
        if row.active && categories.contains(&row.concept_id) {
            let labels = if row.type_id == well_known::FULLY_SPECIFIED_NAME {
                &mut fsns
            } else {
                &mut synonyms
            };
            labels.entry(row.concept_id).or_insert(row.term);
        }
        Ok(())
    })?;
    for (id, fsn) in fsns {
        synonyms.entry(id).or_insert(fsn);
    }
    Ok(synonyms)
}

fn load_refsets(
    archives: &mut [Box<dyn ReleaseArchive>],
    files: &[ReleaseFile],
    graph: &mut ConceptGraph,
    resolver: &mut MapKindResolver,
    summary: &mut ImportSummary,
) -> IndexResult<()> {
    let mut refsets: HashSet<SctId> = HashSet::new();
    scan(archives, files, &[FileKind::Refset], |row: RefsetRow| {
        if !row.active || matches!(row.columns, RefsetColumns::Language { .. }) {
            return Ok(());
        }
        refsets.insert(row.refset_id);
        if graph.add_membership(row.referenced_component_id, row.refset_id) {
            summary.memberships += 1;
        }
        for (owner, mapping) in resolver.mappings(&row) {
            if let Some(concept) = graph.get_mut(owner) {
                concept.mappings.push(mapping);
                summary.mappings += 1;
            }
        }
        Ok(())
    })?;
    debug!(refsets = refsets.len(), "reference sets loaded");
    Ok(())
}

/// Active descriptions of one batch with their acceptability, in release order.
fn load_descriptions(
    archives: &mut [Box<dyn ReleaseArchive>],
    files: &[ReleaseFile],
    batch: &[SctId],
) -> IndexResult<BTreeMap<SctId, Vec<Description>>> {
    let wanted: HashSet<SctId> = batch.iter().copied().collect();
    let mut descriptions: BTreeMap<SctId, Vec<Description>> = BTreeMap::new();
    // description id -> (concept id, index in that concept's list)
    let mut located: HashMap<SctId, (SctId, usize)> = HashMap::new();

    scan(archives, files, &[FileKind::Description], |row: DescriptionRow| {
        if row.active && wanted.contains(&row.concept_id) {
            let list = descriptions.entry(row.concept_id).or_default();
            located.insert(row.id, (row.concept_id, list.len()));
            list.push(Description::new(
                row.id,
                row.language,
                row.term,
                row.type_id == well_known::FULLY_SPECIFIED_NAME,
            ));
        }
        Ok(())
    })?;

    scan(archives, files, &[FileKind::Refset], |row: RefsetRow| {
        let RefsetColumns::Language { acceptability_id } = row.columns else {
            return Ok(());
        };
        if !row.active {
            return Ok(());
        }
        let Some(&(concept_id, index)) = located.get(&row.referenced_component_id) else {
            return Ok(());
        };
        if let Some(description) = descriptions
            .get_mut(&concept_id)
            .and_then(|list| list.get_mut(index))
        {
            if acceptability_id == well_known::PREFERRED {
                description.preferred_in.insert(row.refset_id);
            } else if acceptability_id == well_known::ACCEPTABLE {
                description.acceptable_in.insert(row.refset_id);
            }
        }
        Ok(())
    })?;

    Ok(descriptions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_builder() {
        let options = ImportOptions::default();
        assert_eq!(options.batch_size, DEFAULT_BATCH_SIZE);

        assert_eq!(options.dialects, vec![well_known::US_ENGLISH, well_known::GB_ENGLISH]);

        let options = ImportOptions::default()
            .with_batch_size(0)
            .with_folder(TermFolder::new().with_language("sv", "åäö"))
            .with_dialects(vec![well_known::GB_ENGLISH])
            .with_writer_memory(20_000_000);
        assert_eq!(options.batch_size, 1);
        assert_eq!(options.folder.exemptions("sv"), "åäö");
        assert_eq!(options.dialects, vec![well_known::GB_ENGLISH]);
        assert_eq!(options.writer_memory, 20_000_000);
        assert_eq!(options.with_dialects(Vec::new()).dialects, vec![well_known::GB_ENGLISH]);
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: ImportOptions =
            serde_json::from_str(r#"{"folder": {"sv": "åäö"}}"#).unwrap();
        assert_eq!(options.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(options.folder.tokens("Mellanöra", "sv"), vec!["mellanöra"]);
        assert_eq!(options.writer_memory, DEFAULT_WRITER_MEMORY);
    }
}
