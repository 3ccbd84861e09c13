//! # snomed-query
//!
//! The read side of the SNOMED CT terminology server.
//!
//! This crate compiles ECL into queries over a [`snomed_index`] store,
//! expands value sets with text filtering and ranking, renders normal forms,
//! and wraps all of it in [`TerminologyService`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use snomed_index::DirectoryRelease;
//! use snomed_query::{TerminologyConfig, TerminologyService};
//!
//! let service = TerminologyService::open("/var/lib/snomed", TerminologyConfig::default())?;
//! service.import(
//!     vec![Box::new(DirectoryRelease::new("SnomedCT_InternationalRF2"))],
//!     "http://snomed.info/sct/900000000000207008/version/20240101",
//! )?;
//!
//! let diabetes = service.evaluate("<< 73211009 |Diabetes mellitus|")?;
//! println!("{} diabetes concepts", diabetes.len());
//! # Ok::<(), snomed_query::QueryError>(())
//! ```
//!
//! ## With Configuration
//!
//! ```rust
//! use snomed_query::{CacheConfig, TerminologyConfig};
//! use std::time::Duration;
//!
//! let config = TerminologyConfig::builder()
//!     .with_dialect("sv", [46011000052107])
//!     .with_default_dialects(["en-GB"])
//!     .with_cache(CacheConfig {
//!         max_entries: 10_000,
//!         ttl: Duration::from_secs(300),
//!     })
//!     .build();
//! ```
//!
//! ## Supported ECL Features
//!
//! | Operator | Example | Supported |
//! |----------|---------|-----------|
//! | Self | `73211009` | Yes |
//! | Descendant / child (or self) | `< 73211009`, `<<! 73211009` | Yes |
//! | Ancestor / parent (or self) | `> 73211009`, `>>! 73211009` | Yes |
//! | Member of | `^ 700043003` | Yes |
//! | AND / OR / MINUS | `A AND B` | Yes |
//! | Refinement | `< 404684003 : 363698007 = << 39057004` | Yes, groups flattened |
//! | Dot notation | `< 404684003 . 363698007` | Yes |
//! | Top / bottom of set | `!!> << 404684003` | Yes |
//! | Cardinality other than `[1..1]` | `[0..1] 363698007 = *` | No |
//! | Reverse attributes | `R 363698007 = 80891009` | No |
//! | Concrete values | `1142135004 >= #250` | No |
//! | Filters, history supplements | `{{ C active = 1 }}` | No |
//!
//! Unsupported constructs fail with [`QueryError::UnsupportedFeature`] naming
//! the construct.
//!
//! ## Feature Flags
//!
//! - `parallel` - encodes import batches on all cores using rayon

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod cache;
mod compiler;
mod config;
mod error;
mod expansion;
pub mod normal_form;
mod service;
mod terms;

// Public re-exports
pub use cache::{normalize_cache_key, CacheStats, SetCache};
pub use compiler::{CompiledQuery, EclCompiler};
pub use config::{CacheConfig, TerminologyConfig, TerminologyConfigBuilder};
pub use error::{QueryError, QueryResult};
pub use expansion::{
    text_query, ComposeCriterion, ComposeSpec, ExpandRequest, ExpandedConcept, Expansion,
    ExpansionEngine,
};
pub use service::TerminologyService;
pub use terms::display_terms;

// Re-export commonly used types from dependencies for convenience
pub use snomed_ecl::EclExpression;
pub use snomed_index::{CodeSystemMetadata, Concept, SctId};
