//! Abstract Syntax Tree types for ECL expressions.

use crate::SctId;

// =============================================================================
// Refinement Types
// =============================================================================

/// Comparison operators used in attribute refinements.
///
/// Expression values only accept `=` and `!=`; the ordering operators are
/// only meaningful against concrete values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ComparisonOperator {
    /// Equal: `=`
    Equal,
    /// Not equal: `!=`
    NotEqual,
    /// Less than: `<`
    LessThan,
    /// Less than or equal: `<=`
    LessThanOrEqual,
    /// Greater than: `>`
    GreaterThan,
    /// Greater than or equal: `>=`
    GreaterThanOrEqual,
}

impl std::fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComparisonOperator::Equal => write!(f, "="),
            ComparisonOperator::NotEqual => write!(f, "!="),
            ComparisonOperator::LessThan => write!(f, "<"),
            ComparisonOperator::LessThanOrEqual => write!(f, "<="),
            ComparisonOperator::GreaterThan => write!(f, ">"),
            ComparisonOperator::GreaterThanOrEqual => write!(f, ">="),
        }
    }
}

/// Cardinality constraint for attributes and groups: `[min..max]`
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Cardinality {
    /// Minimum occurrences.
    pub min: usize,
    /// Maximum occurrences (None = unbounded `*`).
    pub max: Option<usize>,
}

impl Cardinality {
    /// Creates a cardinality constraint.
    pub fn new(min: usize, max: Option<usize>) -> Self {
        Self { min, max }
    }

    /// Cardinality of exactly one: `[1..1]`
    pub fn one() -> Self {
        Self { min: 1, max: Some(1) }
    }

    /// Returns true for `[1..1]`.
    pub fn is_exactly_one(&self) -> bool {
        self.min == 1 && self.max == Some(1)
    }
}

impl std::fmt::Display for Cardinality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.max {
            Some(max) => write!(f, "[{}..{}]", self.min, max),
            None => write!(f, "[{}..*]", self.min),
        }
    }
}

/// Concrete literal values: `#250`, `#3.14`, `#"text"`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConcreteValue {
    /// Integer value: `#250`
    Integer(i64),
    /// Decimal value: `#3.14`
    Decimal(f64),
    /// String value: `#"text"`
    String(String),
}

impl std::fmt::Display for ConcreteValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConcreteValue::Integer(n) => write!(f, "#{}", n),
            ConcreteValue::Decimal(n) => write!(f, "#{}", n),
            ConcreteValue::String(s) => write!(f, "#\"{}\"", s),
        }
    }
}

/// Right-hand side of an attribute comparison.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AttributeValue {
    /// A nested expression constraint, e.g. `<< 39057004`.
    Expression(Box<EclExpression>),
    /// A concrete literal, e.g. `#500`.
    Concrete(ConcreteValue),
}

impl std::fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttributeValue::Expression(expr) => write!(f, "{}", expr),
            AttributeValue::Concrete(value) => write!(f, "{}", value),
        }
    }
}

/// A single attribute comparison within a refinement.
///
/// Example: `363698007 |Finding site| = << 39057004 |Pulmonary structure|`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AttributeConstraint {
    /// Optional cardinality constraint.
    pub cardinality: Option<Cardinality>,
    /// Reverse flag (`R`): match concepts that are the *target* of the attribute.
    pub reverse: bool,
    /// The attribute type (a sub-expression, usually a single concept).
    pub attribute_type: Box<EclExpression>,
    /// Comparison operator.
    pub operator: ComparisonOperator,
    /// The attribute value.
    pub value: AttributeValue,
}

impl std::fmt::Display for AttributeConstraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref card) = self.cardinality {
            write!(f, "{} ", card)?;
        }
        if self.reverse {
            write!(f, "R ")?;
        }
        write!(f, "{} {} {}", self.attribute_type, self.operator, self.value)
    }
}

/// An attribute group: `[card] { refinement }`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AttributeGroup {
    /// Optional cardinality for the group itself.
    pub cardinality: Option<Cardinality>,
    /// The refinement that must hold inside the group.
    pub refinement: Box<Refinement>,
}

impl std::fmt::Display for AttributeGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref card) = self.cardinality {
            write!(f, "{} ", card)?;
        }
        write!(f, "{{ {} }}", self.refinement)
    }
}

/// Refinement clause following `:` in a refined expression.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Refinement {
    /// A single attribute comparison.
    Attribute(AttributeConstraint),
    /// An attribute group.
    Group(AttributeGroup),
    /// All refinements must hold (`AND` or `,`).
    Conjunction(Vec<Refinement>),
    /// At least one refinement must hold (`OR`).
    Disjunction(Vec<Refinement>),
    /// Parenthesised refinement.
    Nested(Box<Refinement>),
}

impl std::fmt::Display for Refinement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Refinement::Attribute(attribute) => write!(f, "{}", attribute),
            Refinement::Group(group) => write!(f, "{}", group),
            Refinement::Conjunction(items) => write_joined(f, items, ", "),
            Refinement::Disjunction(items) => write_joined(f, items, " OR "),
            Refinement::Nested(inner) => write!(f, "({})", inner),
        }
    }
}

fn write_joined(
    f: &mut std::fmt::Formatter<'_>,
    items: &[Refinement],
    separator: &str,
) -> std::fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(separator)?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

// =============================================================================
// Filters
// =============================================================================

/// The kind of a `{{ ... }}` filter block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FilterKind {
    /// Concept filter: `{{ C definitionStatus = primitive }}`
    Concept,
    /// Description filter: `{{ D term = "heart" }}` or `{{ term = "heart" }}`
    Description,
    /// Member filter: `{{ M mapTarget = "J45.9" }}`
    Member,
    /// History supplement: `{{ +HISTORY-MIN }}`
    History,
}

impl FilterKind {
    /// Human-readable name of the filter kind.
    pub fn name(&self) -> &'static str {
        match self {
            FilterKind::Concept => "concept filter",
            FilterKind::Description => "description filter",
            FilterKind::Member => "member filter",
            FilterKind::History => "history supplement",
        }
    }
}

/// A filter block attached to a sub-expression.
///
/// Filter bodies are kept as raw text; the kind is enough for downstream
/// consumers to accept or reject the block.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EclFilter {
    /// The filter kind, derived from its prefix.
    pub kind: FilterKind,
    /// The filter body with the kind prefix removed.
    pub body: String,
}

impl std::fmt::Display for EclFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            FilterKind::Concept => write!(f, "{{{{ C {} }}}}", self.body),
            FilterKind::Description => write!(f, "{{{{ D {} }}}}", self.body),
            FilterKind::Member => write!(f, "{{{{ M {} }}}}", self.body),
            FilterKind::History => write!(f, "{{{{ +HISTORY{} }}}}", self.body),
        }
    }
}

// =============================================================================
// Expression
// =============================================================================

/// Abstract Syntax Tree for ECL expressions.
///
/// # Examples
///
/// ```rust
/// use snomed_ecl::{parse, EclExpression};
///
/// let expr = parse("404684003").unwrap();
/// assert!(matches!(expr, EclExpression::ConceptReference { .. }));
///
/// let expr = parse("<< 404684003").unwrap();
/// assert!(matches!(expr, EclExpression::DescendantOrSelfOf(_)));
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EclExpression {
    /// A single concept reference: `404684003 |Clinical finding|`
    ConceptReference {
        /// The SNOMED CT concept ID.
        concept_id: SctId,
        /// Optional term in pipe notation.
        term: Option<String>,
    },

    /// Wildcard matching any concept: `*`
    Any,

    /// `< x`
    DescendantOf(Box<EclExpression>),
    /// `<< x`
    DescendantOrSelfOf(Box<EclExpression>),
    /// `<! x`
    ChildOf(Box<EclExpression>),
    /// `<<! x`
    ChildOrSelfOf(Box<EclExpression>),
    /// `> x`
    AncestorOf(Box<EclExpression>),
    /// `>> x`
    AncestorOrSelfOf(Box<EclExpression>),
    /// `>! x`
    ParentOf(Box<EclExpression>),
    /// `>>! x`
    ParentOrSelfOf(Box<EclExpression>),
    /// Reference set membership: `^ 700043003` or `^ (< 900000000000496009)`
    MemberOf(Box<EclExpression>),

    /// `a AND b` (also `a , b`)
    And(Box<EclExpression>, Box<EclExpression>),
    /// `a OR b`
    Or(Box<EclExpression>, Box<EclExpression>),
    /// `a MINUS b`
    Minus(Box<EclExpression>, Box<EclExpression>),

    /// Parenthesised expression.
    Nested(Box<EclExpression>),

    /// Refined expression: `< 19829001 : 116676008 = << 79654002`
    Refined {
        /// The focus expression.
        focus: Box<EclExpression>,
        /// The refinement clause.
        refinement: Refinement,
    },

    /// Dot notation: `< 125605004 . 363698007`
    DotNotation {
        /// The source expression.
        source: Box<EclExpression>,
        /// The attribute type to navigate.
        attribute_type: Box<EclExpression>,
    },

    /// Top of set: `!!> x`
    TopOfSet(Box<EclExpression>),
    /// Bottom of set: `!!< x`
    BottomOfSet(Box<EclExpression>),

    /// Sub-expression followed by one or more filter blocks.
    Filtered {
        /// The filtered expression.
        expression: Box<EclExpression>,
        /// The filter blocks, in source order.
        filters: Vec<EclFilter>,
    },
}

impl EclExpression {
    /// Creates a concept reference expression.
    pub fn concept(id: SctId) -> Self {
        EclExpression::ConceptReference {
            concept_id: id,
            term: None,
        }
    }

    /// Creates a concept reference expression with a term.
    pub fn concept_with_term(id: SctId, term: impl Into<String>) -> Self {
        EclExpression::ConceptReference {
            concept_id: id,
            term: Some(term.into()),
        }
    }

    /// Creates a descendant-of expression.
    pub fn descendant_of(inner: EclExpression) -> Self {
        EclExpression::DescendantOf(Box::new(inner))
    }

    /// Creates a descendant-or-self-of expression.
    pub fn descendant_or_self_of(inner: EclExpression) -> Self {
        EclExpression::DescendantOrSelfOf(Box::new(inner))
    }

    /// Creates an ancestor-of expression.
    pub fn ancestor_of(inner: EclExpression) -> Self {
        EclExpression::AncestorOf(Box::new(inner))
    }

    /// Creates a member-of expression over a single reference set.
    pub fn member_of(refset_id: SctId) -> Self {
        EclExpression::MemberOf(Box::new(EclExpression::concept(refset_id)))
    }

    /// Creates an AND expression.
    pub fn and(left: EclExpression, right: EclExpression) -> Self {
        EclExpression::And(Box::new(left), Box::new(right))
    }

    /// Creates an OR expression.
    pub fn or(left: EclExpression, right: EclExpression) -> Self {
        EclExpression::Or(Box::new(left), Box::new(right))
    }

    /// Creates a MINUS expression.
    pub fn minus(left: EclExpression, right: EclExpression) -> Self {
        EclExpression::Minus(Box::new(left), Box::new(right))
    }

    /// Returns the concept ID if this is a (possibly parenthesised) concept reference.
    pub fn as_concept_id(&self) -> Option<SctId> {
        match self.unwrap_nested() {
            EclExpression::ConceptReference { concept_id, .. } => Some(*concept_id),
            _ => None,
        }
    }

    /// Returns true for a (possibly parenthesised) wildcard.
    pub fn is_any(&self) -> bool {
        matches!(self.unwrap_nested(), EclExpression::Any)
    }

    /// Unwraps parentheses to get the inner expression.
    pub fn unwrap_nested(&self) -> &EclExpression {
        match self {
            EclExpression::Nested(inner) => inner.unwrap_nested(),
            other => other,
        }
    }
}

impl std::fmt::Display for EclExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EclExpression::ConceptReference { concept_id, term } => match term {
                Some(t) => write!(f, "{} |{}|", concept_id, t),
                None => write!(f, "{}", concept_id),
            },
            EclExpression::Any => write!(f, "*"),
            EclExpression::DescendantOf(inner) => write!(f, "< {}", inner),
            EclExpression::DescendantOrSelfOf(inner) => write!(f, "<< {}", inner),
            EclExpression::ChildOf(inner) => write!(f, "<! {}", inner),
            EclExpression::ChildOrSelfOf(inner) => write!(f, "<<! {}", inner),
            EclExpression::AncestorOf(inner) => write!(f, "> {}", inner),
            EclExpression::AncestorOrSelfOf(inner) => write!(f, ">> {}", inner),
            EclExpression::ParentOf(inner) => write!(f, ">! {}", inner),
            EclExpression::ParentOrSelfOf(inner) => write!(f, ">>! {}", inner),
            EclExpression::MemberOf(inner) => write!(f, "^ {}", inner),
            EclExpression::And(left, right) => write!(f, "{} AND {}", left, right),
            EclExpression::Or(left, right) => write!(f, "{} OR {}", left, right),
            EclExpression::Minus(left, right) => write!(f, "{} MINUS {}", left, right),
            EclExpression::Nested(inner) => write!(f, "({})", inner),
            EclExpression::Refined { focus, refinement } => {
                write!(f, "{} : {}", focus, refinement)
            }
            EclExpression::DotNotation {
                source,
                attribute_type,
            } => write!(f, "{} . {}", source, attribute_type),
            EclExpression::TopOfSet(inner) => write!(f, "!!> {}", inner),
            EclExpression::BottomOfSet(inner) => write!(f, "!!< {}", inner),
            EclExpression::Filtered {
                expression,
                filters,
            } => {
                write!(f, "{}", expression)?;
                for filter in filters {
                    write!(f, " {}", filter)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concept_display() {
        assert_eq!(EclExpression::concept(404684003).to_string(), "404684003");
        assert_eq!(
            EclExpression::concept_with_term(404684003, "Clinical finding").to_string(),
            "404684003 |Clinical finding|"
        );
    }

    #[test]
    fn test_hierarchy_display() {
        let expr = EclExpression::descendant_or_self_of(EclExpression::concept(73211009));
        assert_eq!(expr.to_string(), "<< 73211009");
        let expr = EclExpression::ancestor_of(EclExpression::concept(40541001));
        assert_eq!(expr.to_string(), "> 40541001");
    }

    #[test]
    fn test_member_of_display() {
        assert_eq!(EclExpression::member_of(700043003).to_string(), "^ 700043003");
    }

    #[test]
    fn test_compound_display() {
        let expr = EclExpression::minus(
            EclExpression::or(EclExpression::concept(1), EclExpression::concept(2)),
            EclExpression::concept(3),
        );
        assert_eq!(expr.to_string(), "1 OR 2 MINUS 3");
    }

    #[test]
    fn test_refinement_display() {
        let refinement = Refinement::Conjunction(vec![
            Refinement::Attribute(AttributeConstraint {
                cardinality: Some(Cardinality::one()),
                reverse: false,
                attribute_type: Box::new(EclExpression::concept(363698007)),
                operator: ComparisonOperator::Equal,
                value: AttributeValue::Expression(Box::new(
                    EclExpression::descendant_or_self_of(EclExpression::concept(39057004)),
                )),
            }),
            Refinement::Group(AttributeGroup {
                cardinality: None,
                refinement: Box::new(Refinement::Attribute(AttributeConstraint {
                    cardinality: None,
                    reverse: false,
                    attribute_type: Box::new(EclExpression::concept(1142135004)),
                    operator: ComparisonOperator::GreaterThan,
                    value: AttributeValue::Concrete(ConcreteValue::Integer(250)),
                })),
            }),
        ]);
        let expr = EclExpression::Refined {
            focus: Box::new(EclExpression::descendant_of(EclExpression::concept(404684003))),
            refinement,
        };
        assert_eq!(
            expr.to_string(),
            "< 404684003 : [1..1] 363698007 = << 39057004, { 1142135004 > #250 }"
        );
    }

    #[test]
    fn test_filter_display() {
        let filter = EclFilter {
            kind: FilterKind::Concept,
            body: "definitionStatus = primitive".into(),
        };
        assert_eq!(filter.to_string(), "{{ C definitionStatus = primitive }}");
        assert_eq!(FilterKind::Member.name(), "member filter");
    }

    #[test]
    fn test_cardinality() {
        assert!(Cardinality::one().is_exactly_one());
        assert!(!Cardinality::new(1, None).is_exactly_one());
        assert_eq!(Cardinality::new(0, None).to_string(), "[0..*]");
    }

    #[test]
    fn test_as_concept_id_through_parentheses() {
        let expr = EclExpression::Nested(Box::new(EclExpression::concept(9)));
        assert_eq!(expr.as_concept_id(), Some(9));
        assert!(EclExpression::Nested(Box::new(EclExpression::Any)).is_any());
        assert_eq!(EclExpression::descendant_of(EclExpression::concept(9)).as_concept_id(), None);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_round_trip() {
        let expr = EclExpression::and(
            EclExpression::descendant_of(EclExpression::concept_with_term(404684003, "Clinical finding")),
            EclExpression::member_of(723264001),
        );
        let json = serde_json::to_string(&expr).unwrap();
        let back: EclExpression = serde_json::from_str(&json).unwrap();
        assert_eq!(back, expr);
    }
}
