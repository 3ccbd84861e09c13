//! # snomed-index
//!
//! Imports SNOMED CT RF2 releases into a persistent, searchable index.
//!
//! The crate covers the write side of the terminology server:
//!
//! - [`model`]: concepts, descriptions, relationships and mappings
//! - [`graph`]: arena-backed concept graph with a frozen ancestor closure
//! - [`rf2`] and [`release`]: row parsing and release archive access
//! - [`mapkind`]: classification of map reference sets
//! - [`import`]: the two-pass importer
//! - [`codec`]: concept <-> index document encoding
//! - [`store`]: tantivy-backed index with atomic snapshot swap
//!
//! ## Quick Start
//!
//! ```no_run
//! use snomed_index::{import, DirectoryRelease, ImportOptions, IndexStore};
//!
//! let store = IndexStore::open("/var/lib/snomed")?;
//! let release = DirectoryRelease::new("SnomedCT_InternationalRF2_PRODUCTION_20240101T120000Z");
//! let summary = import(
//!     &store,
//!     vec![Box::new(release)],
//!     "http://snomed.info/sct/900000000000207008/version/20240101",
//!     &ImportOptions::default(),
//! )?;
//! println!("{} concepts indexed", summary.concepts);
//! # Ok::<(), snomed_index::IndexError>(())
//! ```

pub mod codec;
pub mod error;
pub mod fold;
pub mod graph;
pub mod import;
pub mod mapkind;
pub mod model;
pub mod release;
pub mod rf2;
pub mod store;
pub mod well_known;

pub use error::{IndexError, IndexResult};
pub use fold::TermFolder;
pub use graph::ConceptGraph;
pub use import::{import, ImportOptions, ImportSummary};
pub use mapkind::{MapKind, MapKindResolver};
pub use model::{
    CodeSystemMetadata, Concept, DefinitionStatus, Description, Mapping, Relationship,
    RelationshipValue,
};
pub use release::{DirectoryRelease, ReleaseArchive, ZipRelease};
pub use snomed_ecl::SctId;
pub use store::{IndexStore, Query, Snapshot};
