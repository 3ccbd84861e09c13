//! The terminology service facade.

use std::collections::BTreeMap;
use std::path::Path;

use roaring::RoaringTreemap;
use snomed_index::codec::{self, fields};
use snomed_index::{
    CodeSystemMetadata, Concept, ImportSummary, IndexStore, ReleaseArchive, SctId, Snapshot,
};
use tracing::info;

use crate::cache::SetCache;
use crate::compiler::{CompiledQuery, EclCompiler};
use crate::config::TerminologyConfig;
use crate::error::QueryResult;
use crate::expansion::{ExpandRequest, Expansion, ExpansionEngine};
use crate::normal_form;
use crate::terms::{display_terms, load_concept};

/// Imports releases into one index directory and answers queries over it.
///
/// Every read runs against the snapshot published by the last successful
/// import, so reads never observe a half-written release.
///
/// # Example
///
/// ```no_run
/// use snomed_query::{ComposeSpec, ExpandRequest, TerminologyConfig, TerminologyService};
/// use snomed_index::ZipRelease;
///
/// let service = TerminologyService::open("/var/lib/snomed", TerminologyConfig::default())?;
/// service.import(
///     vec![Box::new(ZipRelease::from_path("SnomedCT_InternationalRF2.zip")?)],
///     "http://snomed.info/sct/900000000000207008/version/20240101",
/// )?;
///
/// let page = service.expand(
///     &ExpandRequest::new(ComposeSpec::new().include_ecl("<< 404684003")).with_filter("heart"),
/// )?;
/// for entry in &page.concepts {
///     println!("{} {:?}", entry.concept.id, entry.display);
/// }
/// # Ok::<(), snomed_query::QueryError>(())
/// ```
pub struct TerminologyService {
    store: IndexStore,
    config: TerminologyConfig,
    cache: Option<SetCache>,
}

impl TerminologyService {
    /// Opens (or creates) an index directory.
    pub fn open<P: AsRef<Path>>(dir: P, config: TerminologyConfig) -> QueryResult<Self> {
        let store = IndexStore::open(dir)?;
        let cache = config.cache.as_ref().map(SetCache::new);
        Ok(Self {
            store,
            config,
            cache,
        })
    }

    /// The service configuration.
    pub fn config(&self) -> &TerminologyConfig {
        &self.config
    }

    /// Returns true once an import has committed.
    pub fn is_loaded(&self) -> bool {
        self.store.is_loaded()
    }

    /// Replaces the index with the given release.
    ///
    /// On failure the previously loaded release stays in place.
    pub fn import(
        &self,
        archives: Vec<Box<dyn ReleaseArchive>>,
        version_uri: &str,
    ) -> QueryResult<ImportSummary> {
        let summary =
            snomed_index::import(&self.store, archives, version_uri, &self.config.import_options())?;
        if let Some(cache) = &self.cache {
            cache.retain_generation(summary.generation);
        }
        info!(
            version_uri,
            concepts = summary.concepts,
            generation = summary.generation,
            "release loaded"
        );
        Ok(summary)
    }

    /// Edition and version of the loaded release, absent before the first import.
    pub fn code_system_metadata(&self) -> QueryResult<Option<CodeSystemMetadata>> {
        if !self.store.is_loaded() {
            return Ok(None);
        }
        let snapshot = self.store.snapshot()?;
        match snapshot.document(codec::CODE_SYSTEM_KEY)? {
            Some(doc) if doc.first(fields::TYPE) == Some(codec::CODE_SYSTEM) => {
                Ok(Some(codec::decode_code_system(&doc)?))
            }
            _ => Ok(None),
        }
    }

    /// Looks up one concept.
    pub fn concept(&self, id: SctId) -> QueryResult<Option<Concept>> {
        let snapshot = self.store.snapshot()?;
        load_concept(&snapshot, id)
    }

    /// Display terms for a batch of concepts in the requested dialects.
    pub fn terms(&self, ids: &[SctId], dialects: &[String]) -> QueryResult<BTreeMap<SctId, String>> {
        let snapshot = self.store.snapshot()?;
        display_terms(&snapshot, ids.iter().copied(), &self.config.resolve_dialects(dialects))
    }

    /// Parses and compiles an ECL expression.
    pub fn compile_expression(&self, text: &str) -> QueryResult<CompiledQuery> {
        let snapshot = self.store.snapshot()?;
        self.compiler(&snapshot).compile_text(text)
    }

    /// Compiles and evaluates an ECL expression, returning matching concept ids.
    pub fn evaluate(&self, text: &str) -> QueryResult<RoaringTreemap> {
        let snapshot = self.store.snapshot()?;
        let compiled = self.compiler(&snapshot).compile_text(text)?;
        compiled.execute(&snapshot)
    }

    /// Expands a compose spec into one ranked page.
    pub fn expand(&self, request: &ExpandRequest) -> QueryResult<Expansion> {
        let snapshot = self.store.snapshot()?;
        let engine = ExpansionEngine::new(&snapshot, &self.config);
        match &self.cache {
            Some(cache) => engine.with_cache(cache).expand(request),
            None => engine.expand(request),
        }
    }

    /// Renders a concept's normal form. Verbose output labels every code
    /// with its display term in the default dialects.
    pub fn render_normal_form(&self, concept: &Concept, verbose: bool) -> QueryResult<String> {
        if !verbose {
            return Ok(normal_form::render(concept, None));
        }
        let snapshot = self.store.snapshot()?;
        let terms = display_terms(
            &snapshot,
            normal_form::referenced_ids(concept),
            &self.config.resolve_dialects(&[]),
        )?;
        Ok(normal_form::render(concept, Some(&terms)))
    }

    fn compiler<'a>(&'a self, snapshot: &'a Snapshot) -> EclCompiler<'a> {
        let compiler = EclCompiler::new(snapshot);
        match &self.cache {
            Some(cache) => compiler.with_cache(cache),
            None => compiler,
        }
    }

    /// Drops every cached id set.
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }
}

impl std::fmt::Debug for TerminologyService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminologyService")
            .field("path", &self.store.path())
            .field("loaded", &self.store.is_loaded())
            .field("cache", &self.cache)
            .finish()
    }
}
