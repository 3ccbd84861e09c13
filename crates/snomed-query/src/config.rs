//! Configuration types for the terminology service.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use snomed_index::import::DEFAULT_BATCH_SIZE;
use snomed_index::{well_known, ImportOptions, SctId, TermFolder};

/// Configuration for the terminology service.
///
/// Loadable from JSON; missing fields take their defaults.
///
/// # Example
///
/// ```rust
/// use snomed_query::{CacheConfig, TerminologyConfig};
///
/// let config = TerminologyConfig::builder()
///     .with_dialect("en-NZ", [271000210107])
///     .with_not_folded("fi", "åäö")
///     .with_page_sizes(50, 1_000)
///     .with_cache(CacheConfig::default())
///     .build();
/// assert_eq!(config.resolve_dialects(&["en-NZ".into()]), vec![271000210107]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminologyConfig {
    /// Language tag to language reference sets, e.g. `en-GB`.
    pub dialects: BTreeMap<String, Vec<SctId>>,
    /// Dialect tags used when a request names none.
    pub default_dialects: Vec<String>,
    /// Per language code, characters kept out of ASCII folding.
    pub not_folded: BTreeMap<String, String>,
    /// Concepts per description batch during import.
    pub description_batch_size: usize,
    /// Page size when a request gives no count.
    pub default_page_size: usize,
    /// Largest page a request may ask for.
    pub max_page_size: usize,
    /// Compiled-set cache (None = caching disabled).
    pub cache: Option<CacheConfig>,
}

impl Default for TerminologyConfig {
    fn default() -> Self {
        let dialects = BTreeMap::from([
            ("en".to_string(), vec![well_known::US_ENGLISH, well_known::GB_ENGLISH]),
            ("en-GB".to_string(), vec![well_known::GB_ENGLISH]),
            ("en-US".to_string(), vec![well_known::US_ENGLISH]),
        ]);
        let not_folded = BTreeMap::from([
            ("sv".to_string(), "åäö".to_string()),
            ("da".to_string(), "æøå".to_string()),
            ("no".to_string(), "æøå".to_string()),
        ]);
        Self {
            dialects,
            default_dialects: vec!["en".to_string()],
            not_folded,
            description_batch_size: DEFAULT_BATCH_SIZE,
            default_page_size: 100,
            max_page_size: 10_000,
            cache: None,
        }
    }
}

impl TerminologyConfig {
    /// Creates a new builder starting from the defaults.
    pub fn builder() -> TerminologyConfigBuilder {
        TerminologyConfigBuilder {
            config: TerminologyConfig::default(),
        }
    }

    /// Resolves dialect tags to language refset ids, in order, without
    /// duplicates.
    ///
    /// A tag is looked up as an alias (case-insensitively), then as a raw
    /// refset id, then by its primary language subtag. Unknown tags are
    /// skipped. An empty list resolves the default dialects.
    pub fn resolve_dialects(&self, tags: &[String]) -> Vec<SctId> {
        let tags = if tags.is_empty() {
            &self.default_dialects
        } else {
            tags
        };
        let mut resolved = Vec::new();
        for tag in tags {
            let tag = tag.trim();
            let ids = self
                .alias(tag)
                .map(<[SctId]>::to_vec)
                .or_else(|| tag.parse::<SctId>().ok().map(|id| vec![id]))
                .or_else(|| {
                    let primary = tag.split(['-', '_']).next()?;
                    self.alias(primary).map(<[SctId]>::to_vec)
                })
                .unwrap_or_default();
            for id in ids {
                if !resolved.contains(&id) {
                    resolved.push(id);
                }
            }
        }
        resolved
    }

    /// Language used to fold query text: the first requested tag, else the
    /// first default tag.
    pub fn display_language<'a>(&'a self, tags: &'a [String]) -> &'a str {
        tags.first()
            .or_else(|| self.default_dialects.first())
            .map(String::as_str)
            .unwrap_or("en")
    }

    /// Term folder built from the `not_folded` table.
    pub fn folder(&self) -> TermFolder {
        TermFolder::from_table(self.not_folded.iter().map(|(k, v)| (k.clone(), v.clone())))
    }

    /// Import options matching this configuration.
    pub fn import_options(&self) -> ImportOptions {
        ImportOptions::default()
            .with_batch_size(self.description_batch_size)
            .with_folder(self.folder())
            .with_dialects(self.resolve_dialects(&[]))
    }

    fn alias(&self, tag: &str) -> Option<&[SctId]> {
        self.dialects
            .iter()
            .find(|(alias, _)| alias.eq_ignore_ascii_case(tag))
            .map(|(_, ids)| ids.as_slice())
    }
}

/// Builder for [`TerminologyConfig`].
#[derive(Debug, Clone)]
pub struct TerminologyConfigBuilder {
    config: TerminologyConfig,
}

impl TerminologyConfigBuilder {
    /// Adds or replaces a dialect alias.
    pub fn with_dialect(
        mut self,
        tag: impl Into<String>,
        refsets: impl IntoIterator<Item = SctId>,
    ) -> Self {
        self.config
            .dialects
            .insert(tag.into(), refsets.into_iter().collect());
        self
    }

    /// Sets the dialects used when a request names none.
    pub fn with_default_dialects<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.default_dialects = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Keeps `chars` out of ASCII folding for `language`.
    pub fn with_not_folded(mut self, language: impl Into<String>, chars: impl Into<String>) -> Self {
        self.config.not_folded.insert(language.into(), chars.into());
        self
    }

    /// Sets the description batch size used by imports.
    pub fn with_description_batch_size(mut self, batch_size: usize) -> Self {
        self.config.description_batch_size = batch_size.max(1);
        self
    }

    /// Sets the default and maximum page sizes.
    pub fn with_page_sizes(mut self, default: usize, max: usize) -> Self {
        self.config.max_page_size = max.max(1);
        self.config.default_page_size = default.clamp(1, self.config.max_page_size);
        self
    }

    /// Enables caching with the given configuration.
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.config.cache = Some(cache);
        self
    }

    /// Builds the TerminologyConfig.
    pub fn build(self) -> TerminologyConfig {
        self.config
    }
}

/// Configuration for the compiled-set cache.
///
/// # Example
///
/// ```rust
/// use snomed_query::CacheConfig;
/// use std::time::Duration;
///
/// let cache = CacheConfig {
///     max_entries: 1_000,
///     ttl: Duration::from_secs(600),
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached id sets.
    pub max_entries: usize,
    /// Time-to-live for cached entries, in seconds when serialized.
    #[serde(with = "duration_secs", rename = "ttl_secs")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            ttl: Duration::from_secs(300),
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
