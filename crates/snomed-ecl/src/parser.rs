//! ECL parser implementation using nom.
//!
//! This module implements a parser for the brief syntax of SNOMED CT Expression
//! Constraint Language (ECL), following the
//! [official specification](https://confluence.ihtsdotools.org/display/DOCECL).

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_until, take_while},
    character::complete::{char, digit1, multispace0, multispace1},
    combinator::{all_consuming, map, opt, recognize, value},
    error::{Error as NomError, ErrorKind},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

use crate::ast::{
    AttributeConstraint, AttributeGroup, AttributeValue, Cardinality, ComparisonOperator,
    ConcreteValue, EclExpression, EclFilter, FilterKind, Refinement,
};
use crate::error::{EclError, EclResult};
use crate::SctId;

/// Parse an ECL expression string.
///
/// # Arguments
/// * `input` - The ECL expression string to parse
///
/// # Returns
/// The parsed ECL expression AST or an error
///
/// # Examples
///
/// ```rust
/// use snomed_ecl::parse;
///
/// // Simple concept reference
/// let expr = parse("404684003").unwrap();
///
/// // With term
/// let expr = parse("404684003 |Clinical finding|").unwrap();
///
/// // Descendants
/// let expr = parse("<< 404684003").unwrap();
///
/// // Compound expression
/// let expr = parse("< 19829001 AND < 301867009").unwrap();
///
/// // Refinement
/// let expr = parse("< 404684003 : 363698007 = << 39057004").unwrap();
/// ```
pub fn parse(input: &str) -> EclResult<EclExpression> {
    let input = input.trim();
    if input.is_empty() {
        return Err(EclError::EmptyExpression);
    }

    match all_consuming(expression_constraint)(input) {
        Ok((_, expr)) => Ok(expr),
        Err(nom::Err::Failure(e)) if e.code == ErrorKind::TooLarge => {
            let digits: String = e.input.chars().take_while(char::is_ascii_digit).collect();
            Err(EclError::InvalidConceptId(digits))
        }
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            if e.input.is_empty() {
                return Err(EclError::Incomplete(truncate(input, 40).to_string()));
            }
            let position = input.len() - e.input.len();
            Err(EclError::ParseError {
                position,
                message: format!("unexpected input at: '{}'", truncate(e.input, 20)),
            })
        }
        Err(nom::Err::Incomplete(_)) => Err(EclError::Incomplete("expression".to_string())),
    }
}

fn truncate(s: &str, max_len: usize) -> &str {
    match s.char_indices().nth(max_len) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ============================================================================
// Top-level expression constraint
// ============================================================================

fn expression_constraint(input: &str) -> IResult<&str, EclExpression> {
    delimited(ws, compound_or_simple_expression, ws)(input)
}

fn compound_or_simple_expression(input: &str) -> IResult<&str, EclExpression> {
    // A refinement binds tighter than the compound operators.
    let (input, first) = refined_expression(input)?;
    compound_tail(input, first)
}

fn compound_tail(input: &str, left: EclExpression) -> IResult<&str, EclExpression> {
    // Word operators need whitespace before them, a comma does not.
    let result = alt((
        preceded(mws, word_compound_operator),
        preceded(ws, comma_operator),
    ))(input);

    match result {
        Ok((remaining, op)) => {
            let (remaining, right) = preceded(ws, sub_expression_constraint)(remaining)?;
            let combined = match op {
                CompoundOp::And => EclExpression::And(Box::new(left), Box::new(right)),
                CompoundOp::Or => EclExpression::Or(Box::new(left), Box::new(right)),
                CompoundOp::Minus => EclExpression::Minus(Box::new(left), Box::new(right)),
            };
            // Left associative
            compound_tail(remaining, combined)
        }
        Err(_) => Ok((input, left)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompoundOp {
    And,
    Or,
    Minus,
}

fn word_compound_operator(input: &str) -> IResult<&str, CompoundOp> {
    terminated(
        alt((
            value(CompoundOp::And, tag_no_case("AND")),
            value(CompoundOp::Or, tag_no_case("OR")),
            value(CompoundOp::Minus, tag_no_case("MINUS")),
        )),
        word_boundary,
    )(input)
}

fn comma_operator(input: &str) -> IResult<&str, CompoundOp> {
    value(CompoundOp::And, tag(","))(input)
}

/// Succeeds without consuming when the next character cannot continue a keyword.
fn word_boundary(input: &str) -> IResult<&str, ()> {
    match input.chars().next() {
        Some(c) if c.is_alphanumeric() || c == '_' => {
            Err(nom::Err::Error(NomError::new(input, ErrorKind::Tag)))
        }
        _ => Ok((input, ())),
    }
}

// ============================================================================
// Sub-expression constraint
// ============================================================================

/// Parse a base sub-expression (without dot notation or filters).
fn base_sub_expression(input: &str) -> IResult<&str, EclExpression> {
    alt((
        // Longer prefixes first
        top_of_set,
        bottom_of_set,
        nested_expression,
        constraint_expression,
        member_of_expression,
        focus_concept,
    ))(input)
}

fn nested_expression(input: &str) -> IResult<&str, EclExpression> {
    map(
        delimited(
            pair(char('('), ws),
            compound_or_simple_expression,
            pair(ws, char(')')),
        ),
        |inner| EclExpression::Nested(Box::new(inner)),
    )(input)
}

fn sub_expression_constraint(input: &str) -> IResult<&str, EclExpression> {
    let (input, expr) = base_sub_expression(input)?;
    let (input, expr) = dot_notation_tail(input, expr)?;
    filtered_expression_tail(input, expr)
}

fn constraint_expression(input: &str) -> IResult<&str, EclExpression> {
    let (input, op) = constraint_operator(input)?;
    let (input, _) = ws(input)?;
    // Dot notation applies to the whole constrained expression, not the inner one.
    let (input, inner) = base_sub_expression(input)?;
    Ok((input, op.apply(inner)))
}

#[derive(Debug, Clone, Copy)]
#[allow(clippy::enum_variant_names)]
enum ConstraintOp {
    DescendantOf,
    DescendantOrSelfOf,
    ChildOf,
    ChildOrSelfOf,
    AncestorOf,
    AncestorOrSelfOf,
    ParentOf,
    ParentOrSelfOf,
}

impl ConstraintOp {
    fn apply(self, inner: EclExpression) -> EclExpression {
        let inner = Box::new(inner);
        match self {
            ConstraintOp::DescendantOf => EclExpression::DescendantOf(inner),
            ConstraintOp::DescendantOrSelfOf => EclExpression::DescendantOrSelfOf(inner),
            ConstraintOp::ChildOf => EclExpression::ChildOf(inner),
            ConstraintOp::ChildOrSelfOf => EclExpression::ChildOrSelfOf(inner),
            ConstraintOp::AncestorOf => EclExpression::AncestorOf(inner),
            ConstraintOp::AncestorOrSelfOf => EclExpression::AncestorOrSelfOf(inner),
            ConstraintOp::ParentOf => EclExpression::ParentOf(inner),
            ConstraintOp::ParentOrSelfOf => EclExpression::ParentOrSelfOf(inner),
        }
    }
}

fn constraint_operator(input: &str) -> IResult<&str, ConstraintOp> {
    alt((
        // Order matters - longer matches first
        value(ConstraintOp::ChildOrSelfOf, tag("<<!")),
        value(ConstraintOp::DescendantOrSelfOf, tag("<<")),
        value(ConstraintOp::ChildOf, tag("<!")),
        value(ConstraintOp::DescendantOf, tag("<")),
        value(ConstraintOp::ParentOrSelfOf, tag(">>!")),
        value(ConstraintOp::AncestorOrSelfOf, tag(">>")),
        value(ConstraintOp::ParentOf, tag(">!")),
        value(ConstraintOp::AncestorOf, tag(">")),
    ))(input)
}

fn member_of_expression(input: &str) -> IResult<&str, EclExpression> {
    let (input, _) = char('^')(input)?;
    let (input, _) = ws(input)?;
    let (input, inner) = alt((nested_expression, focus_concept))(input)?;
    Ok((input, EclExpression::MemberOf(Box::new(inner))))
}

// ============================================================================
// Focus concept
// ============================================================================

fn focus_concept(input: &str) -> IResult<&str, EclExpression> {
    alt((wildcard, concept_reference))(input)
}

fn wildcard(input: &str) -> IResult<&str, EclExpression> {
    value(EclExpression::Any, char('*'))(input)
}

fn concept_reference(input: &str) -> IResult<&str, EclExpression> {
    let (input, id) = sct_id(input)?;
    let (input, term) = opt(preceded(ws, term_in_pipes))(input)?;

    Ok((
        input,
        EclExpression::ConceptReference {
            concept_id: id,
            term,
        },
    ))
}

fn sct_id(input: &str) -> IResult<&str, SctId> {
    let (rest, digits) = digit1(input)?;
    match digits.parse::<SctId>() {
        Ok(id) => Ok((rest, id)),
        // Points at the digits so the caller can report them.
        Err(_) => Err(nom::Err::Failure(NomError::new(input, ErrorKind::TooLarge))),
    }
}

fn term_in_pipes(input: &str) -> IResult<&str, String> {
    let (input, _) = char('|')(input)?;
    let (input, term) = take_while(|c| c != '|')(input)?;
    let (input, _) = char('|')(input)?;

    Ok((input, term.trim().to_string()))
}

// ============================================================================
// Whitespace handling
// ============================================================================

/// Optional whitespace
fn ws(input: &str) -> IResult<&str, &str> {
    multispace0(input)
}

/// Mandatory whitespace
fn mws(input: &str) -> IResult<&str, &str> {
    multispace1(input)
}

// =============================================================================
// Refinement Parsing
// =============================================================================

/// Parse a refined expression: `focusExpression : refinement`
fn refined_expression(input: &str) -> IResult<&str, EclExpression> {
    let (remaining, focus) = sub_expression_constraint(input)?;

    // Only consume whitespace when a refinement actually follows.
    if remaining.trim_start().starts_with(':') {
        let (rest, _) = ws(remaining)?;
        let (rest, _) = char(':')(rest)?;
        let (rest, _) = ws(rest)?;
        let (rest, refinement) = refinement(rest)?;
        Ok((
            rest,
            EclExpression::Refined {
                focus: Box::new(focus),
                refinement,
            },
        ))
    } else {
        Ok((remaining, focus))
    }
}

/// Parse a refinement: items joined by `,`, `AND` or `OR`.
///
/// A separator is only consumed when another refinement item follows it, so
/// `< 1 : 2 = 3 AND < 4` leaves `AND < 4` to the compound operators.
/// Mixed conjunction and disjunction without parentheses binds AND tighter.
fn refinement(input: &str) -> IResult<&str, Refinement> {
    let (mut remaining, first) = refinement_item(input)?;
    let mut disjuncts: Vec<Vec<Refinement>> = vec![vec![first]];

    loop {
        let separator = alt((
            preceded(ws, comma_operator),
            preceded(mws, word_compound_operator),
        ))(remaining);

        let Ok((after_op, op)) = separator else { break };
        if op == CompoundOp::Minus {
            break;
        }
        let Ok((rest, item)) = preceded(ws, refinement_item)(after_op) else {
            break;
        };

        match op {
            CompoundOp::Or => disjuncts.push(vec![item]),
            _ => {
                if let Some(last) = disjuncts.last_mut() {
                    last.push(item);
                }
            }
        }
        remaining = rest;
    }

    let mut alternatives: Vec<Refinement> = disjuncts
        .into_iter()
        .map(|mut items| {
            if items.len() == 1 {
                items.remove(0)
            } else {
                Refinement::Conjunction(items)
            }
        })
        .collect();

    let refinement = if alternatives.len() == 1 {
        alternatives.remove(0)
    } else {
        Refinement::Disjunction(alternatives)
    };
    Ok((remaining, refinement))
}

fn refinement_item(input: &str) -> IResult<&str, Refinement> {
    alt((
        map(attribute_group, Refinement::Group),
        map(
            delimited(pair(char('('), ws), refinement, pair(ws, char(')'))),
            |inner| Refinement::Nested(Box::new(inner)),
        ),
        map(attribute_constraint, Refinement::Attribute),
    ))(input)
}

/// Parse a cardinality constraint: `[min..max]` or `[min..*]`
fn cardinality(input: &str) -> IResult<&str, Cardinality> {
    let (input, _) = char('[')(input)?;
    let (input, _) = ws(input)?;
    let (input, min) = count(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = tag("..")(input)?;
    let (input, _) = ws(input)?;
    let (input, max) = alt((map(char('*'), |_| None), map(count, Some)))(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = char(']')(input)?;
    Ok((input, Cardinality::new(min, max)))
}

fn count(input: &str) -> IResult<&str, usize> {
    let (rest, digits) = digit1(input)?;
    match digits.parse::<usize>() {
        Ok(n) => Ok((rest, n)),
        Err(_) => Err(nom::Err::Error(NomError::new(input, ErrorKind::Digit))),
    }
}

/// Parse an attribute group: `[cardinality] { refinement }`
fn attribute_group(input: &str) -> IResult<&str, AttributeGroup> {
    let (input, cardinality) = opt(terminated(cardinality, ws))(input)?;
    let (input, _) = char('{')(input)?;
    // `{{` opens a filter block, never a group.
    if input.starts_with('{') {
        return Err(nom::Err::Error(NomError::new(input, ErrorKind::Char)));
    }
    let (input, _) = ws(input)?;
    let (input, inner) = refinement(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = char('}')(input)?;

    Ok((
        input,
        AttributeGroup {
            cardinality,
            refinement: Box::new(inner),
        },
    ))
}

/// Parse a single attribute constraint.
/// Format: `[cardinality] [R] attributeType operator value`
fn attribute_constraint(input: &str) -> IResult<&str, AttributeConstraint> {
    let (input, cardinality) = opt(terminated(cardinality, ws))(input)?;
    let (input, reverse) = opt(terminated(tag("R"), mws))(input)?;

    let (input, attribute_type) = attribute_name(input)?;
    let (input, _) = ws(input)?;
    let (input, operator) = comparison_operator(input)?;
    let (input, _) = ws(input)?;

    let (input, value) = if input.starts_with('#') {
        map(concrete_value, AttributeValue::Concrete)(input)?
    } else {
        // Expression values only support equality.
        if !matches!(
            operator,
            ComparisonOperator::Equal | ComparisonOperator::NotEqual
        ) {
            return Err(nom::Err::Error(NomError::new(input, ErrorKind::Verify)));
        }
        map(sub_expression_constraint, |expr| {
            AttributeValue::Expression(Box::new(expr))
        })(input)?
    };

    Ok((
        input,
        AttributeConstraint {
            cardinality,
            reverse: reverse.is_some(),
            attribute_type: Box::new(attribute_type),
            operator,
            value,
        },
    ))
}

/// Attribute names are a focus concept, optionally under a hierarchy operator.
fn attribute_name(input: &str) -> IResult<&str, EclExpression> {
    alt((
        map(
            pair(terminated(constraint_operator, ws), focus_concept),
            |(op, inner)| op.apply(inner),
        ),
        focus_concept,
    ))(input)
}

/// Parse a comparison operator.
fn comparison_operator(input: &str) -> IResult<&str, ComparisonOperator> {
    alt((
        value(ComparisonOperator::LessThanOrEqual, tag("<=")),
        value(ComparisonOperator::GreaterThanOrEqual, tag(">=")),
        value(ComparisonOperator::NotEqual, tag("!=")),
        value(ComparisonOperator::LessThan, char('<')),
        value(ComparisonOperator::GreaterThan, char('>')),
        value(ComparisonOperator::Equal, char('=')),
    ))(input)
}

// =============================================================================
// Concrete Value Parsing
// =============================================================================

/// Parse a concrete value: `#123`, `#3.14`, or `#"string"`
fn concrete_value(input: &str) -> IResult<&str, ConcreteValue> {
    let (input, _) = char('#')(input)?;

    if input.starts_with('"') {
        return map(delimited(char('"'), take_until("\""), char('"')), |s: &str| {
            ConcreteValue::String(s.to_string())
        })(input);
    }

    let (rest, number) = recognize(tuple((
        opt(alt((char('-'), char('+')))),
        digit1,
        opt(pair(char('.'), digit1)),
    )))(input)?;

    let value = if number.contains('.') {
        number.parse().map(ConcreteValue::Decimal).ok()
    } else {
        number.parse().map(ConcreteValue::Integer).ok()
    };
    match value {
        Some(value) => Ok((rest, value)),
        None => Err(nom::Err::Error(NomError::new(input, ErrorKind::Digit))),
    }
}

// =============================================================================
// Dot Notation Parsing
// =============================================================================

/// Parse dot notation: `expression . attributeType`
fn dot_notation_tail(input: &str, left: EclExpression) -> IResult<&str, EclExpression> {
    if input.trim_start().starts_with('.') {
        let (rest, _) = ws(input)?;
        let (rest, _) = char('.')(rest)?;
        let (rest, _) = ws(rest)?;
        let (rest, attribute_type) = attribute_name(rest)?;

        let expr = EclExpression::DotNotation {
            source: Box::new(left),
            attribute_type: Box::new(attribute_type),
        };
        dot_notation_tail(rest, expr)
    } else {
        Ok((input, left))
    }
}

// =============================================================================
// Filter Parsing
// =============================================================================

/// Parse a filter block: `{{ ... }}`
///
/// The body is kept verbatim; only the kind prefix is interpreted.
fn filter_block(input: &str) -> IResult<&str, EclFilter> {
    let (input, _) = tag("{{")(input)?;
    let (input, _) = ws(input)?;
    let (input, body) = take_until("}}")(input)?;
    let (input, _) = tag("}}")(input)?;

    let body = body.trim();
    let (kind, body) = if let Ok((rest, _)) = history_prefix(body) {
        (FilterKind::History, rest.trim())
    } else if let Ok((rest, kind)) = kind_prefix(body) {
        (kind, rest.trim())
    } else {
        // Unprefixed filters (term, language, dialect, type) are description filters.
        (FilterKind::Description, body)
    };

    Ok((
        input,
        EclFilter {
            kind,
            body: body.to_string(),
        },
    ))
}

fn history_prefix(input: &str) -> IResult<&str, &str> {
    preceded(char('+'), tag_no_case("HISTORY"))(input)
}

fn kind_prefix(input: &str) -> IResult<&str, FilterKind> {
    terminated(
        alt((
            value(FilterKind::Concept, tag_no_case("C")),
            value(FilterKind::Description, tag_no_case("D")),
            value(FilterKind::Member, tag_no_case("M")),
        )),
        mws,
    )(input)
}

/// Parse filtered expression tail.
fn filtered_expression_tail(input: &str, expr: EclExpression) -> IResult<&str, EclExpression> {
    if !input.trim_start().starts_with("{{") {
        return Ok((input, expr));
    }

    let mut filters = Vec::new();
    let mut remaining = input;
    while remaining.trim_start().starts_with("{{") {
        let (rest, _) = ws(remaining)?;
        let (rest, filter) = filter_block(rest)?;
        filters.push(filter);
        remaining = rest;
    }

    Ok((
        remaining,
        EclExpression::Filtered {
            expression: Box::new(expr),
            filters,
        },
    ))
}

// =============================================================================
// Top/Bottom of Set Operators
// =============================================================================

/// Parse top of set operator: `!!>`
fn top_of_set(input: &str) -> IResult<&str, EclExpression> {
    let (input, _) = tag("!!>")(input)?;
    let (input, _) = ws(input)?;
    let (input, inner) = sub_expression_constraint(input)?;
    Ok((input, EclExpression::TopOfSet(Box::new(inner))))
}

/// Parse bottom of set operator: `!!<`
fn bottom_of_set(input: &str) -> IResult<&str, EclExpression> {
    let (input, _) = tag("!!<")(input)?;
    let (input, _) = ws(input)?;
    let (input, inner) = sub_expression_constraint(input)?;
    Ok((input, EclExpression::BottomOfSet(Box::new(inner))))
}

// ============================================================================
// Tests
// ============================================================================
