//! ECL to index query compiler.
//!
//! One recursive match lowers the AST to a boolean [`Query`]. Hierarchy
//! operators pointing down the hierarchy become lookups on the `ancestors` or
//! `parents` fields. Operators pointing up read the referenced concept's
//! stored ids. Sub-expressions that cannot be answered structurally (attribute
//! types, refinement values, non-concept operands) are resolved to id sets
//! first, optionally through a [`SetCache`].
//!
//! Refinements ignore role groups: `{ a = x, b = y }` matches when both
//! attributes hold anywhere on the concept.

use std::fmt;
use std::sync::Arc;

use roaring::RoaringTreemap;
use snomed_ecl::{
    AttributeConstraint, AttributeGroup, AttributeValue, ComparisonOperator, EclExpression,
    Refinement,
};
use snomed_index::codec::{self, fields};
use snomed_index::{well_known, Query, SctId, Snapshot};
use tracing::debug;

use crate::cache::SetCache;
use crate::error::{QueryError, QueryResult};

/// A parsed and lowered expression, bound to the index generation it was
/// compiled against.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    /// The parsed expression.
    pub expression: EclExpression,
    /// The lowered index query, without the concept-type restriction.
    pub query: Query,
    /// Generation of the snapshot used for lookups during compilation.
    pub generation: u64,
}

impl CompiledQuery {
    /// Evaluates the query against concept documents.
    pub fn execute(&self, snapshot: &Snapshot) -> QueryResult<RoaringTreemap> {
        Ok(snapshot.search(&concepts_only(self.query.clone()))?)
    }
}

impl fmt::Display for CompiledQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expression)
    }
}

/// Restricts a query to concept documents.
pub(crate) fn concepts_only(query: Query) -> Query {
    Query::and(vec![Query::term(fields::TYPE, codec::CONCEPT), query])
}

/// Compiles ECL against one index snapshot.
pub struct EclCompiler<'a> {
    snapshot: &'a Snapshot,
    cache: Option<&'a SetCache>,
}

impl<'a> EclCompiler<'a> {
    /// Creates a compiler without caching.
    pub fn new(snapshot: &'a Snapshot) -> Self {
        Self {
            snapshot,
            cache: None,
        }
    }

    /// Caches resolved sub-expression sets.
    pub fn with_cache(mut self, cache: &'a SetCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Parses and compiles expression text.
    pub fn compile_text(&self, text: &str) -> QueryResult<CompiledQuery> {
        let expression = snomed_ecl::parse(text)?;
        let query = self.compile(&expression)?;
        Ok(CompiledQuery {
            expression,
            query,
            generation: self.snapshot.generation(),
        })
    }

    /// Lowers an expression to an index query.
    pub fn compile(&self, expression: &EclExpression) -> QueryResult<Query> {
        match expression {
            EclExpression::Any => Ok(Query::All),
            EclExpression::ConceptReference { concept_id, .. } => {
                Ok(Query::term(fields::ID, concept_id))
            }

            EclExpression::DescendantOf(inner) => self.below(inner, fields::ANCESTORS, false),
            EclExpression::DescendantOrSelfOf(inner) => self.below(inner, fields::ANCESTORS, true),
            EclExpression::ChildOf(inner) => self.below(inner, fields::PARENTS, false),
            EclExpression::ChildOrSelfOf(inner) => self.below(inner, fields::PARENTS, true),

            EclExpression::AncestorOf(inner) => self.above(inner, fields::ANCESTORS, false),
            EclExpression::AncestorOrSelfOf(inner) => self.above(inner, fields::ANCESTORS, true),
            EclExpression::ParentOf(inner) => self.above(inner, fields::PARENTS, false),
            EclExpression::ParentOrSelfOf(inner) => self.above(inner, fields::PARENTS, true),

            EclExpression::MemberOf(inner) => {
                if inner.is_any() {
                    Ok(Query::exists(fields::MEMBERS))
                } else {
                    Ok(Query::terms(fields::MEMBERS, self.operand_ids(inner)?.iter()))
                }
            }

            EclExpression::And(left, right) => {
                Ok(Query::and(vec![self.compile(left)?, self.compile(right)?]))
            }
            EclExpression::Or(left, right) => {
                Ok(Query::or(vec![self.compile(left)?, self.compile(right)?]))
            }
            EclExpression::Minus(left, right) => {
                Ok(Query::and_not(self.compile(left)?, self.compile(right)?))
            }
            EclExpression::Nested(inner) => self.compile(inner),

            EclExpression::Refined { focus, refinement } => {
                let mut must = vec![self.compile(focus)?];
                let mut must_not = Vec::new();
                self.refinement_clauses(refinement, &mut must, &mut must_not)?;
                Ok(Query::Bool {
                    must,
                    should: Vec::new(),
                    must_not,
                })
            }

            EclExpression::DotNotation {
                source,
                attribute_type,
            } => {
                let sources = self.resolve(source)?;
                let types = self.attribute_types(attribute_type)?;
                let mut targets = RoaringTreemap::new();
                for id in sources.iter() {
                    if let Some(doc) = self.snapshot.document(id)? {
                        for type_id in types.iter() {
                            targets.extend(codec::attribute_targets(&doc, type_id));
                        }
                    }
                }
                Ok(Query::terms(fields::ID, targets.iter()))
            }

            EclExpression::TopOfSet(inner) => {
                let set = self.resolve(inner)?;
                let mut top = Vec::new();
                for id in set.iter() {
                    let ancestors = self.stored_ids(id, fields::ANCESTORS)?;
                    if !ancestors.iter().any(|&ancestor| set.contains(ancestor)) {
                        top.push(id);
                    }
                }
                Ok(Query::terms(fields::ID, top))
            }

            EclExpression::BottomOfSet(inner) => {
                let set = self.resolve(inner)?;
                let mut above = RoaringTreemap::new();
                for id in set.iter() {
                    above.extend(self.stored_ids(id, fields::ANCESTORS)?);
                }
                Ok(Query::terms(fields::ID, (set.as_ref() - &above).iter()))
            }

            EclExpression::Filtered { filters, .. } => {
                let feature = filters.first().map(|f| f.kind.name()).unwrap_or("filter");
                Err(self.unsupported(feature))
            }
        }
    }

    /// Compiles and executes a sub-expression, yielding concept ids.
    pub fn resolve(&self, expression: &EclExpression) -> QueryResult<Arc<RoaringTreemap>> {
        let generation = self.snapshot.generation();
        let key = expression.to_string();
        if let Some(hit) = self.cache.and_then(|cache| cache.get(generation, &key)) {
            return Ok(hit);
        }
        let query = self.compile(expression)?;
        let ids = Arc::new(self.snapshot.search(&concepts_only(query))?);
        if let Some(cache) = self.cache {
            cache.set(generation, &key, ids.clone());
        }
        Ok(ids)
    }

    // -------------------------------------------------------------------------
    // Hierarchy
    // -------------------------------------------------------------------------

    /// Descendant and child forms: concepts whose `field` holds an operand id.
    fn below(&self, inner: &EclExpression, field: &str, or_self: bool) -> QueryResult<Query> {
        if inner.is_any() {
            return Ok(if or_self { Query::All } else { Query::exists(field) });
        }
        let ids = self.operand_ids(inner)?;
        let below = Query::terms(field, ids.iter());
        Ok(if or_self {
            Query::or(vec![below, Query::terms(fields::ID, ids.iter())])
        } else {
            below
        })
    }

    /// Ancestor and parent forms: ids stored in `field` of each operand.
    /// Operands that are not indexed contribute nothing.
    fn above(&self, inner: &EclExpression, field: &str, or_self: bool) -> QueryResult<Query> {
        if inner.is_any() {
            return Ok(if or_self { Query::All } else { Query::exists(fields::CHILDREN) });
        }
        let ids = self.operand_ids(inner)?;
        let mut targets = RoaringTreemap::new();
        for id in ids.iter() {
            targets.extend(self.stored_ids(id, field)?);
        }
        if or_self {
            targets |= ids.as_ref();
        }
        if targets.is_empty() {
            return Ok(Query::None);
        }
        Ok(Query::terms(fields::ID, targets.iter()))
    }

    /// A single concept operand is used as is; anything else is resolved.
    fn operand_ids(&self, inner: &EclExpression) -> QueryResult<Arc<RoaringTreemap>> {
        match inner.as_concept_id() {
            Some(id) => Ok(Arc::new(std::iter::once(id).collect())),
            None => self.resolve(inner),
        }
    }

    fn stored_ids(&self, id: SctId, field: &str) -> QueryResult<Vec<SctId>> {
        Ok(match self.snapshot.document(id)? {
            Some(doc) => parse_ids(doc.values(field)).collect(),
            None => Vec::new(),
        })
    }

    // -------------------------------------------------------------------------
    // Refinements
    // -------------------------------------------------------------------------

    /// Collects required and excluded attribute queries. `!=` moves a
    /// constraint to the excluded side.
    fn refinement_clauses(
        &self,
        refinement: &Refinement,
        must: &mut Vec<Query>,
        must_not: &mut Vec<Query>,
    ) -> QueryResult<()> {
        match refinement {
            Refinement::Attribute(constraint) => {
                let query = self.attribute(constraint)?;
                if constraint.operator == ComparisonOperator::NotEqual {
                    must_not.push(query);
                } else {
                    must.push(query);
                }
            }
            Refinement::Group(group) => {
                self.check_group(group)?;
                self.refinement_clauses(&group.refinement, must, must_not)?;
            }
            Refinement::Conjunction(items) => {
                for item in items {
                    self.refinement_clauses(item, must, must_not)?;
                }
            }
            Refinement::Disjunction(items) => {
                let alternatives = items
                    .iter()
                    .map(|item| self.refinement_query(item))
                    .collect::<QueryResult<Vec<_>>>()?;
                must.push(Query::or(alternatives));
            }
            Refinement::Nested(inner) => self.refinement_clauses(inner, must, must_not)?,
        }
        Ok(())
    }

    fn refinement_query(&self, refinement: &Refinement) -> QueryResult<Query> {
        let mut must = Vec::new();
        let mut must_not = Vec::new();
        self.refinement_clauses(refinement, &mut must, &mut must_not)?;
        Ok(Query::Bool {
            must,
            should: Vec::new(),
            must_not,
        })
    }

    fn check_group(&self, group: &AttributeGroup) -> QueryResult<()> {
        match group.cardinality {
            Some(_) => Err(self.unsupported("attribute group cardinality")),
            None => Ok(()),
        }
    }

    /// Query matching concepts that hold the attribute, ignoring `!=`.
    fn attribute(&self, constraint: &AttributeConstraint) -> QueryResult<Query> {
        if let Some(cardinality) = &constraint.cardinality {
            if !cardinality.is_exactly_one() {
                return Err(self.unsupported(format!("attribute cardinality {}", cardinality)));
            }
        }
        if constraint.reverse {
            return Err(self.unsupported("reverse attribute"));
        }
        if !matches!(
            constraint.operator,
            ComparisonOperator::Equal | ComparisonOperator::NotEqual
        ) {
            return Err(self.unsupported(format!("comparison operator {}", constraint.operator)));
        }
        let value = match &constraint.value {
            AttributeValue::Expression(value) => value,
            AttributeValue::Concrete(_) => return Err(self.unsupported("concrete value")),
        };

        let types = self.attribute_types(&constraint.attribute_type)?;
        if types.is_empty() {
            return Ok(Query::None);
        }
        if value.is_any() {
            return Ok(Query::terms(fields::ATTRIBUTE_TYPES, types.iter()));
        }
        let values = self.operand_ids(value)?;
        Ok(Query::terms(
            fields::ATTRIBUTES,
            types
                .iter()
                .flat_map(|t| values.iter().map(move |v| codec::attribute_value(t, v))),
        ))
    }

    /// `*` stands for every concept model attribute.
    fn attribute_types(&self, attribute_type: &EclExpression) -> QueryResult<Arc<RoaringTreemap>> {
        if attribute_type.is_any() {
            return self.resolve(&EclExpression::descendant_of(EclExpression::concept(
                well_known::CONCEPT_MODEL_ATTRIBUTE,
            )));
        }
        self.operand_ids(attribute_type)
    }

    fn unsupported(&self, feature: impl Into<String>) -> QueryError {
        let feature = feature.into();
        debug!(feature = %feature, "rejected unsupported ECL feature");
        QueryError::unsupported(feature)
    }
}

fn parse_ids(values: &[String]) -> impl Iterator<Item = SctId> + '_ {
    values.iter().filter_map(|v| v.parse().ok())
}
