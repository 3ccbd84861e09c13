//! # snomed-ecl
//!
//! A Rust library for parsing SNOMED CT Expression Constraint Language (ECL).
//!
//! The parser produces an [`EclExpression`] tree covering the brief syntax:
//! hierarchy operators, reference set membership, compound constraints,
//! attribute refinements and groups, dot notation, top/bottom of set and
//! filter blocks. Consumers decide which constructs they can evaluate.
//!
//! ## Usage
//!
//! ```rust
//! use snomed_ecl::{parse, EclExpression, FilterKind};
//!
//! let expr = parse("<< 404684003 |Clinical finding| : 363698007 = << 80891009").unwrap();
//! assert!(matches!(expr, EclExpression::Refined { .. }));
//!
//! // Filters parse so that evaluators can reject them by kind.
//! match parse("< 404684003 {{ C definitionStatus = primitive }}").unwrap() {
//!     EclExpression::Filtered { filters, .. } => assert_eq!(filters[0].kind, FilterKind::Concept),
//!     other => panic!("unexpected {other}"),
//! }
//! ```
//!
//! ## Syntax
//!
//! | Construct | Example |
//! |-----------|---------|
//! | Self, any | `404684003`, `*` |
//! | Descendants (or self), children (or self) | `<`, `<<`, `<!`, `<<!` |
//! | Ancestors (or self), parents (or self) | `>`, `>>`, `>!`, `>>!` |
//! | Member of | `^ 700043003`, `^ (< 446609009)` |
//! | Compound | `A AND B`, `A, B`, `A OR B`, `A MINUS B` |
//! | Refinement | `< A : [1..1] B = << C, { D = E }` |
//! | Reverse and concrete attributes | `R B = C`, `B >= #250` |
//! | Dot notation | `< A . B` |
//! | Top / bottom of set | `!!> << A`, `!!< << A` |
//! | Filters | `{{ C ... }}`, `{{ D ... }}`, `{{ M ... }}`, `{{ +HISTORY }}` |

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod ast;
mod error;
mod parser;

pub use ast::{
    AttributeConstraint, AttributeGroup, AttributeValue, Cardinality, ComparisonOperator,
    ConcreteValue, EclExpression, EclFilter, FilterKind, Refinement,
};
pub use error::{EclError, EclResult};
pub use parser::parse;

/// SNOMED CT Identifier type (64-bit unsigned integer).
pub type SctId = u64;
