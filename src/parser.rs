//! Query language parser
//!
//! Compiles query strings into a validated [`Query`] using a pest grammar.

use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;
use thiserror::Error;

use crate::pattern::{Condition, Element, Operator, PatternError, Query};
use crate::token::Annotation;

#[derive(Parser)]
#[grammar = "query.pest"]
struct QueryParser;

/// Error type for query compilation failures
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Query error: query cannot be empty")]
    EmptyInput,

    #[error("Query error: {0}")]
    Syntax(#[from] pest::error::Error<Rule>),

    #[error("Query error: unknown annotation '{0}' (expected word, lemma, pos or morph)")]
    UnknownAnnotation(String),

    #[error("Query error: invalid gap bound '{0}'")]
    InvalidGap(String),

    #[error("Query error: {0}")]
    Pattern(#[from] PatternError),

    #[error("Query error: malformed query, expected {0}")]
    Malformed(&'static str),
}

/// Compile a query string into a Query
pub fn compile(input: &str) -> Result<Query, QueryError> {
    if input.trim().is_empty() {
        return Err(QueryError::EmptyInput);
    }

    let mut pairs = QueryParser::parse(Rule::query, input)?;
    let query_pair = next_pair(&mut pairs, "query")?;

    let mut elements = Vec::new();
    for pair in query_pair.into_inner() {
        match pair.as_rule() {
            Rule::sequence => elements = parse_sequence(pair)?,
            Rule::EOI => {} // End of input
            _ => return Err(QueryError::Malformed("sequence")),
        }
    }

    let query = Query::new(elements)?.with_source(input);
    tracing::debug!(query = input, elements = query.elements().len(), "compiled query");
    Ok(query)
}

fn next_pair<'i>(
    pairs: &mut impl Iterator<Item = Pair<'i, Rule>>,
    expected: &'static str,
) -> Result<Pair<'i, Rule>, QueryError> {
    pairs.next().ok_or(QueryError::Malformed(expected))
}

/// Parse a sequence of units and the gaps between them
fn parse_sequence(pair: Pair<Rule>) -> Result<Vec<Element>, QueryError> {
    pair.into_inner()
        .map(|inner| match inner.as_rule() {
            Rule::unit => parse_unit(inner),
            Rule::gap => parse_gap(inner),
            _ => Err(QueryError::Malformed("unit or gap")),
        })
        .collect()
}

/// Parse a unit: a token spec or group, optionally followed by `?`
fn parse_unit(pair: Pair<Rule>) -> Result<Element, QueryError> {
    let mut inner = pair.into_inner();
    let atom = next_pair(&mut inner, "token or group")?;

    let element = match atom.as_rule() {
        Rule::token_spec => parse_token_spec(atom)?,
        Rule::group => parse_group(atom)?,
        _ => return Err(QueryError::Malformed("token or group")),
    };

    match inner.next() {
        Some(mark) if mark.as_rule() == Rule::optional_mark => {
            Ok(Element::Optional(Box::new(element)))
        }
        Some(_) => Err(QueryError::Malformed("optional mark")),
        None => Ok(element),
    }
}

/// Parse a bracketed token: [a='x' & b='y' | c='z']
fn parse_token_spec(pair: Pair<Rule>) -> Result<Element, QueryError> {
    let mut alternatives = pair
        .into_inner()
        .map(parse_disjunct)
        .collect::<Result<Vec<_>, _>>()?;

    match alternatives.len() {
        0 => Err(QueryError::Malformed("condition")),
        1 => alternatives.pop().ok_or(QueryError::Malformed("condition")),
        _ => Ok(Element::Alternation(
            alternatives.into_iter().map(|element| vec![element]).collect(),
        )),
    }
}

/// Parse conditions joined by `&`
fn parse_disjunct(pair: Pair<Rule>) -> Result<Element, QueryError> {
    let mut conditions = pair
        .into_inner()
        .map(parse_condition)
        .collect::<Result<Vec<_>, _>>()?;

    match conditions.len() {
        0 => Err(QueryError::Malformed("condition")),
        1 => conditions
            .pop()
            .map(Element::Condition)
            .ok_or(QueryError::Malformed("condition")),
        _ => Ok(Element::Conjunction(conditions)),
    }
}

/// Parse a single condition: annotation='pattern' or annotation!='pattern'
fn parse_condition(pair: Pair<Rule>) -> Result<Condition, QueryError> {
    let mut inner = pair.into_inner();

    let name = next_pair(&mut inner, "annotation")?.as_str();
    let annotation = name
        .parse::<Annotation>()
        .map_err(|_| QueryError::UnknownAnnotation(name.to_string()))?;

    let operator = match next_pair(&mut inner, "operator")?.as_str() {
        "=" => Operator::Eq,
        "!=" => Operator::NotEq,
        _ => return Err(QueryError::Malformed("operator")),
    };

    let value = next_pair(&mut inner, "value")?;
    let body = next_pair(&mut value.into_inner(), "quoted value")?;
    let pattern = match body.as_rule() {
        Rule::single_inner => unescape_quote(body.as_str(), '\''),
        Rule::double_inner => unescape_quote(body.as_str(), '"'),
        _ => return Err(QueryError::Malformed("quoted value")),
    };

    Ok(Condition::new(annotation, operator, &pattern)?)
}

/// Drop the backslash in front of an escaped quote; other escapes belong to
/// the regex and are kept
fn unescape_quote(raw: &str, quote: char) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.peek() {
                Some(&next) if next == quote => {
                    out.push(next);
                    chars.next();
                }
                Some(&next) => {
                    out.push(c);
                    out.push(next);
                    chars.next();
                }
                None => out.push(c),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Parse a parenthesised group of alternative sequences
///
/// A group with a single one-element branch is just that element.
fn parse_group(pair: Pair<Rule>) -> Result<Element, QueryError> {
    let mut branches = pair
        .into_inner()
        .map(parse_sequence)
        .collect::<Result<Vec<_>, _>>()?;

    if branches.len() == 1
        && branches[0].len() == 1
        && let Some(element) = branches.pop().and_then(|mut branch| branch.pop())
    {
        return Ok(element);
    }

    Ok(Element::Alternation(branches))
}

/// Parse a gap: []{min,max}, []{,max} or []{min,}
fn parse_gap(pair: Pair<Rule>) -> Result<Element, QueryError> {
    let mut min = 0;
    let mut max = None;

    for bound in pair.into_inner() {
        let text = bound.as_str();
        let value = text
            .parse::<usize>()
            .map_err(|_| QueryError::InvalidGap(text.to_string()))?;
        match bound.as_rule() {
            Rule::gap_min => min = value,
            Rule::gap_max => max = Some(value),
            _ => return Err(QueryError::Malformed("gap bound")),
        }
    }

    Ok(Element::Gap { min, max })
}
