//! Persistent tantivy index with a single writer and swappable readers.
//!
//! Documents live in a tantivy index directory; stored fields are served
//! from its on-disk doc store, so nothing is loaded into memory on open.
//! Each commit carries an [`IndexManifest`] as its payload. Readers hold an
//! [`Arc<Snapshot>`] that is swapped atomically after each commit, so
//! in-flight queries keep the searcher they started on.
//!
//! # Example
//!
//! ```no_run
//! use snomed_index::store::{Document, IndexStore, Query};
//!
//! let store = IndexStore::open("/var/lib/terminology")?;
//! let mut writer = store.writer(true)?;
//! let mut doc = Document::new(404684003);
//! doc.index("type", "concept");
//! writer.add(doc)?;
//! writer.commit()?;
//!
//! let hits = store.snapshot()?.search(&Query::term("type", "concept"))?;
//! assert_eq!(hits.len(), 1);
//! # Ok::<(), snomed_index::IndexError>(())
//! ```

mod collector;
mod document;
mod manifest;
mod query;
mod schema;

pub use document::Document;
pub use manifest::IndexManifest;
pub use query::Query;
pub use schema::{build_schema, fields, IndexSchema};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};
use roaring::RoaringTreemap;
use tantivy::collector::{Count, DocSetCollector};
use tantivy::directory::MmapDirectory;
use tantivy::merge_policy::NoMergePolicy;
use tantivy::query::{BooleanQuery, Occur, Query as TantivyQuery, TermQuery};
use tantivy::schema::IndexRecordOption;
use tantivy::{Index, IndexReader, ReloadPolicy, Searcher, TantivyDocument, TantivyError, Term};
use tracing::{debug, info, warn};

use crate::error::{IndexError, IndexResult};
use collector::{KeyCollector, SortKeyCollector};

/// Default indexing memory of a write session.
pub const DEFAULT_WRITER_MEMORY: usize = 50_000_000;

/// Smallest indexing memory tantivy accepts for one indexing thread.
pub const MIN_WRITER_MEMORY: usize = 15_000_000;

// =============================================================================
// Snapshot
// =============================================================================

/// An immutable, committed view of the index.
pub struct Snapshot {
    manifest: IndexManifest,
    searcher: Searcher,
    schema: Arc<IndexSchema>,
}

impl Snapshot {
    /// Commit generation; changes on every commit.
    pub fn generation(&self) -> u64 {
        self.manifest.generation
    }

    /// The manifest this snapshot was published with.
    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    /// Keys of the documents matching a query.
    pub fn search(&self, query: &Query) -> IndexResult<RoaringTreemap> {
        let lowered = query.lower(&self.schema)?;
        Ok(self.searcher.search(lowered.as_ref(), &KeyCollector)?)
    }

    /// `(key, sort_key)` of the documents matching a query, in no particular order.
    pub fn sort_keys(&self, query: &Query) -> IndexResult<Vec<(u64, u64)>> {
        let lowered = query.lower(&self.schema)?;
        Ok(self.searcher.search(lowered.as_ref(), &SortKeyCollector)?)
    }

    /// Number of matching documents.
    pub fn count(&self, query: &Query) -> IndexResult<u64> {
        let lowered = query.lower(&self.schema)?;
        Ok(self.searcher.search(lowered.as_ref(), &Count)? as u64)
    }

    /// Reads the live document for a key from the doc store.
    pub fn document(&self, key: u64) -> IndexResult<Option<Document>> {
        let addresses = self.searcher.search(&self.key_query(key), &DocSetCollector)?;
        let Some(address) = addresses.into_iter().next() else {
            return Ok(None);
        };
        let stored: TantivyDocument = self.searcher.doc(address)?;
        self.schema.from_tantivy(&stored).map(Some)
    }

    /// True if the live document for `key` holds `field = value`.
    pub fn has_term(&self, key: u64, field: &str, value: &str) -> IndexResult<bool> {
        let both = BooleanQuery::new(vec![
            (Occur::Must, Box::new(self.key_query(key)) as Box<dyn TantivyQuery>),
            (Occur::Must, Query::term(field, value).lower(&self.schema)?),
        ]);
        Ok(self.searcher.search(&both, &Count)? > 0)
    }

    /// Number of live documents.
    pub fn len(&self) -> u64 {
        self.searcher.num_docs()
    }

    /// Returns true if no document is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn key_query(&self, key: u64) -> TermQuery {
        TermQuery::new(
            Term::from_field_u64(self.schema.key, key),
            IndexRecordOption::Basic,
        )
    }
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("generation", &self.manifest.generation)
            .field("documents", &self.len())
            .field("segments", &self.searcher.segment_readers().len())
            .finish()
    }
}

// =============================================================================
// Store
// =============================================================================

/// A directory-backed index.
pub struct IndexStore {
    dir: PathBuf,
    index: Index,
    reader: IndexReader,
    schema: Arc<IndexSchema>,
    current: RwLock<Option<Arc<Snapshot>>>,
    write_lock: Mutex<()>,
}

impl IndexStore {
    /// Opens (or creates) an index directory, loading any committed snapshot.
    ///
    /// A directory written with a different schema is rejected.
    pub fn open<P: AsRef<Path>>(dir: P) -> IndexResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| IndexError::io(&dir, e))?;

        let schema = Arc::new(IndexSchema::new()?);
        let directory = MmapDirectory::open(&dir).map_err(TantivyError::from)?;
        let index = Index::open_or_create(directory, schema.schema.clone())?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        let current = match index.load_metas()?.payload {
            Some(payload) => {
                let manifest = IndexManifest::from_payload(&payload)?;
                let searcher = reader.searcher();
                info!(
                    path = %dir.display(),
                    generation = manifest.generation,
                    documents = searcher.num_docs(),
                    "opened index"
                );
                Some(Arc::new(Snapshot {
                    manifest,
                    searcher,
                    schema: schema.clone(),
                }))
            }
            None => {
                debug!(path = %dir.display(), "index directory has no commit; not loaded");
                None
            }
        };

        Ok(Self {
            dir,
            index,
            reader,
            schema,
            current: RwLock::new(current),
            write_lock: Mutex::new(()),
        })
    }

    /// The index directory.
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// True once a commit has been published.
    pub fn is_loaded(&self) -> bool {
        self.current.read().is_some()
    }

    /// The current snapshot, or [`IndexError::NotLoaded`].
    pub fn snapshot(&self) -> IndexResult<Arc<Snapshot>> {
        self.current.read().clone().ok_or(IndexError::NotLoaded)
    }

    /// Starts a write session with the default indexing memory.
    pub fn writer(&self, recreate: bool) -> IndexResult<IndexWriter<'_>> {
        self.writer_with_memory(recreate, DEFAULT_WRITER_MEMORY)
    }

    /// Starts a write session, blocking while another writer is active.
    ///
    /// With `recreate`, the committed result contains only documents added in
    /// this session; otherwise they replace same-key documents of the current
    /// snapshot. Buffered documents are flushed to disk whenever
    /// `memory_budget` bytes are in use.
    pub fn writer_with_memory(
        &self,
        recreate: bool,
        memory_budget: usize,
    ) -> IndexResult<IndexWriter<'_>> {
        let guard = self.write_lock.lock();
        let manifest = self
            .current
            .read()
            .as_ref()
            .map(|snapshot| snapshot.manifest.clone())
            .unwrap_or_default();

        let mut inner: tantivy::IndexWriter = self
            .index
            .writer_with_num_threads(1, memory_budget.max(MIN_WRITER_MEMORY))?;
        // merges would rewrite the metas behind the committed manifest
        inner.set_merge_policy(Box::new(NoMergePolicy));
        if recreate {
            inner.delete_all_documents()?;
        }
        debug!(recreate, generation = manifest.generation, "write session started");

        Ok(IndexWriter {
            store: self,
            _guard: guard,
            inner,
            manifest,
            added: 0,
            committed: false,
        })
    }

    fn publish(&self, snapshot: Arc<Snapshot>) {
        *self.current.write() = Some(snapshot);
    }
}

impl std::fmt::Debug for IndexStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexStore")
            .field("dir", &self.dir)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

// =============================================================================
// Writer
// =============================================================================

/// Exclusive write session. Dropping it without [`IndexWriter::commit`]
/// rolls back everything it wrote and leaves the published snapshot untouched.
pub struct IndexWriter<'a> {
    store: &'a IndexStore,
    _guard: MutexGuard<'a, ()>,
    inner: tantivy::IndexWriter,
    manifest: IndexManifest,
    added: u64,
    committed: bool,
}

impl IndexWriter<'_> {
    /// Adds a document, replacing any document with the same key.
    pub fn add(&mut self, document: Document) -> IndexResult<()> {
        let converted = self.store.schema.to_tantivy(&document)?;
        self.inner
            .delete_term(Term::from_field_u64(self.store.schema.key, document.key));
        self.inner.add_document(converted)?;
        self.added += 1;
        Ok(())
    }

    /// Documents added in this session.
    pub fn added(&self) -> u64 {
        self.added
    }

    /// Commits with the next manifest as payload and swaps readers to it.
    pub fn commit(mut self) -> IndexResult<Arc<Snapshot>> {
        let manifest = self.manifest.next();
        let payload = manifest.to_payload()?;
        let mut prepared = self.inner.prepare_commit()?;
        prepared.set_payload(&payload);
        prepared.commit()?;
        self.committed = true;

        self.store.reader.reload()?;
        let snapshot = Arc::new(Snapshot {
            manifest,
            searcher: self.store.reader.searcher(),
            schema: self.store.schema.clone(),
        });
        self.store.publish(snapshot.clone());
        info!(
            generation = snapshot.generation(),
            documents = snapshot.len(),
            added = self.added,
            "index committed"
        );
        Ok(snapshot)
    }
}

impl Drop for IndexWriter<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match self.inner.rollback() {
            Ok(_) if self.added > 0 => {
                warn!(documents = self.added, "write session aborted; staged documents discarded")
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "could not roll back aborted write session"),
        }
    }
}
