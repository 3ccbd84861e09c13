//! Well-known SNOMED CT concept IDs used by the importer and index.
//!
//! ```
//! use snomed_index::well_known;
//!
//! assert_eq!(well_known::IS_A, 116680003);
//! ```

use crate::SctId;

// =============================================================================
// Relationships
// =============================================================================

/// IS_A relationship type - 116680003.
pub const IS_A: SctId = 116680003;

/// Inferred relationship characteristic type - 900000000000011006.
pub const INFERRED_RELATIONSHIP: SctId = 900000000000011006;

/// Concept model attribute - 410662002.
///
/// Root of the attribute hierarchy; `*` as a refinement attribute means any
/// of its descendants.
pub const CONCEPT_MODEL_ATTRIBUTE: SctId = 410662002;

// =============================================================================
// Definition status
// =============================================================================

/// Primitive definition status - 900000000000074008.
pub const PRIMITIVE: SctId = 900000000000074008;

/// Fully defined (sufficiently defined) status - 900000000000073002.
pub const FULLY_DEFINED: SctId = 900000000000073002;

// =============================================================================
// Descriptions
// =============================================================================

/// Fully specified name description type - 900000000000003001.
pub const FULLY_SPECIFIED_NAME: SctId = 900000000000003001;

/// Synonym description type - 900000000000013009.
pub const SYNONYM: SctId = 900000000000013009;

/// Preferred acceptability - 900000000000548007.
pub const PREFERRED: SctId = 900000000000548007;

/// Acceptable acceptability - 900000000000549004.
pub const ACCEPTABLE: SctId = 900000000000549004;

/// GB English language reference set - 999001261000000100.
pub const GB_ENGLISH: SctId = 999001261000000100;

/// US English language reference set - 900000000000509007.
pub const US_ENGLISH: SctId = 900000000000509007;

// =============================================================================
// Map reference set roots
// =============================================================================

/// Simple map type reference set - 900000000000496009.
pub const SIMPLE_MAP_ROOT: SctId = 900000000000496009;

/// Association type reference set - 900000000000521006.
pub const ASSOCIATION_ROOT: SctId = 900000000000521006;

/// Complex map type reference set - 447250001.
pub const COMPLEX_MAP_ROOT: SctId = 447250001;

/// Extended map type reference set - 609331003.
///
/// Carries a category column on top of the complex map columns.
pub const EXTENDED_MAP_ROOT: SctId = 609331003;

/// Map category value - 447634004.
///
/// Descendants label the category column of extended maps.
pub const MAP_CATEGORY_VALUE: SctId = 447634004;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_roots_are_distinct() {
        let roots = [
            SIMPLE_MAP_ROOT,
            ASSOCIATION_ROOT,
            COMPLEX_MAP_ROOT,
            EXTENDED_MAP_ROOT,
        ];
        for (i, a) in roots.iter().enumerate() {
            for b in &roots[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
