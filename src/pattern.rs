//! Query AST and condition evaluation
//!
//! A compiled query is a sequence of elements over annotated tokens.
//! Patterns are compiled once when a condition is built; matching never
//! re-validates them.

use regex::Regex;
use std::fmt::{self, Debug, Display};
use thiserror::Error;

use crate::token::{Annotation, TokenRef};

/// Error raised while building a query
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: Box<regex::Error>,
    },

    #[error("query has no elements")]
    EmptyQuery,

    #[error("conjunction has no conditions")]
    EmptyConjunction,

    #[error("alternation has no branches")]
    EmptyAlternation,

    #[error("alternation branch has no elements")]
    EmptyBranch,

    #[error("gap must sit between two elements")]
    MisplacedGap,

    #[error("gaps cannot be adjacent")]
    AdjacentGaps,

    #[error("gap minimum {min} exceeds maximum {max}")]
    GapBounds { min: usize, max: usize },

    #[error("a gap cannot be optional")]
    OptionalGap,
}

/// Annotation the evaluated token does not carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("token has no '{0}' annotation")]
pub struct MissingAnnotation(pub Annotation);

/// Comparison operator of a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    NotEq,
}

impl Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Eq => f.write_str("="),
            Operator::NotEq => f.write_str("!="),
        }
    }
}

/// Value side of a condition: either a plain string or an anchored regex
#[derive(Clone)]
pub enum ValuePattern {
    Literal(String),
    Regex(String, Regex), // Source pattern + compiled, anchored regex
}

impl ValuePattern {
    /// Compile a pattern that must match a whole annotation value
    ///
    /// Patterns without regex metacharacters are kept as literals.
    pub fn compile(pattern: &str) -> Result<Self, PatternError> {
        if regex::escape(pattern) == pattern {
            return Ok(ValuePattern::Literal(pattern.to_string()));
        }

        let anchored = format!("^(?:{pattern})$");
        match Regex::new(&anchored) {
            Ok(regex) => Ok(ValuePattern::Regex(pattern.to_string(), regex)),
            Err(e) => Err(PatternError::InvalidPattern {
                pattern: pattern.to_string(),
                source: Box::new(e),
            }),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ValuePattern::Literal(s) => s,
            ValuePattern::Regex(s, _) => s,
        }
    }

    #[inline]
    pub fn is_match(&self, value: &str) -> bool {
        match self {
            ValuePattern::Literal(s) => s == value,
            ValuePattern::Regex(_, regex) => regex.is_match(value),
        }
    }
}

// Manual Debug implementation
impl Debug for ValuePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValuePattern::Literal(s) => f.debug_tuple("Literal").field(s).finish(),
            ValuePattern::Regex(pattern, _) => f.debug_tuple("Regex").field(pattern).finish(),
        }
    }
}

// Manual PartialEq implementation (compare pattern strings, not compiled regex)
impl PartialEq for ValuePattern {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ValuePattern::Literal(a), ValuePattern::Literal(b)) => a == b,
            (ValuePattern::Regex(a, _), ValuePattern::Regex(b, _)) => a == b,
            _ => false,
        }
    }
}

/// A predicate over one annotation of one token
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub annotation: Annotation,
    pub operator: Operator,
    pub value: ValuePattern,
}

impl Condition {
    pub fn new(
        annotation: Annotation,
        operator: Operator,
        pattern: &str,
    ) -> Result<Self, PatternError> {
        Ok(Self {
            annotation,
            operator,
            value: ValuePattern::compile(pattern)?,
        })
    }

    /// `annotation='pattern'`
    pub fn eq(annotation: Annotation, pattern: &str) -> Result<Self, PatternError> {
        Self::new(annotation, Operator::Eq, pattern)
    }

    /// `annotation!='pattern'`
    pub fn not_eq(annotation: Annotation, pattern: &str) -> Result<Self, PatternError> {
        Self::new(annotation, Operator::NotEq, pattern)
    }

    pub fn pattern(&self) -> &str {
        self.value.as_str()
    }

    /// Decide whether a token satisfies this condition
    #[inline]
    pub fn evaluate(&self, token: TokenRef<'_>) -> Result<bool, MissingAnnotation> {
        let value = token
            .get(self.annotation)
            .ok_or(MissingAnnotation(self.annotation))?;
        let matched = self.value.is_match(value);
        Ok(match self.operator {
            Operator::Eq => matched,
            Operator::NotEq => !matched,
        })
    }
}

/// Evaluate conditions that must all hold for the same token
///
/// Stops at the first condition that fails or cannot be evaluated.
#[inline]
pub fn evaluate_all(
    conditions: &[Condition],
    token: TokenRef<'_>,
) -> Result<bool, MissingAnnotation> {
    for condition in conditions {
        if !condition.evaluate(token)? {
            return Ok(false);
        }
    }
    Ok(true)
}

impl Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}'", self.annotation, self.operator)?;
        for c in self.pattern().chars() {
            if c == '\'' {
                f.write_str("\\'")?;
            } else {
                write!(f, "{c}")?;
            }
        }
        f.write_str("'")
    }
}

/// One element of a query sequence
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    /// A single token satisfying one condition
    Condition(Condition),
    /// A single token satisfying every condition
    Conjunction(Vec<Condition>),
    /// The first branch (in order) that lets the rest of the query match
    Alternation(Vec<Vec<Element>>),
    /// Zero or one occurrence of the inner element
    Optional(Box<Element>),
    /// Between `min` and `max` unconstrained tokens; `None` means unbounded
    Gap { min: usize, max: Option<usize> },
}

impl Element {
    /// Smallest number of tokens this element can consume
    pub fn min_len(&self) -> usize {
        match self {
            Element::Condition(_) | Element::Conjunction(_) => 1,
            Element::Alternation(branches) => branches
                .iter()
                .map(|branch| sequence_min_len(branch))
                .min()
                .unwrap_or(0),
            Element::Optional(_) => 0,
            Element::Gap { min, .. } => *min,
        }
    }

    fn validate(&self) -> Result<(), PatternError> {
        match self {
            Element::Condition(_) => Ok(()),
            Element::Conjunction(conditions) => {
                if conditions.is_empty() {
                    Err(PatternError::EmptyConjunction)
                } else {
                    Ok(())
                }
            }
            Element::Alternation(branches) => {
                if branches.is_empty() {
                    return Err(PatternError::EmptyAlternation);
                }
                for branch in branches {
                    if branch.is_empty() {
                        return Err(PatternError::EmptyBranch);
                    }
                    validate_sequence(branch)?;
                }
                Ok(())
            }
            Element::Optional(inner) => match inner.as_ref() {
                Element::Gap { .. } => Err(PatternError::OptionalGap),
                other => other.validate(),
            },
            Element::Gap { min, max } => match max {
                Some(max) if min > max => Err(PatternError::GapBounds {
                    min: *min,
                    max: *max,
                }),
                _ => Ok(()),
            },
        }
    }
}

/// Saturates so that huge gap minimums still give a lower bound
fn sequence_min_len(elements: &[Element]) -> usize {
    elements
        .iter()
        .map(Element::min_len)
        .fold(0, usize::saturating_add)
}

/// Check the structural invariants of a non-empty element sequence
fn validate_sequence(elements: &[Element]) -> Result<(), PatternError> {
    let last = elements.len().saturating_sub(1);
    let mut previous_was_gap = false;

    for (idx, element) in elements.iter().enumerate() {
        let is_gap = matches!(element, Element::Gap { .. });
        if is_gap {
            if idx == 0 || idx == last {
                return Err(PatternError::MisplacedGap);
            }
            if previous_was_gap {
                return Err(PatternError::AdjacentGaps);
            }
        }
        element.validate()?;
        previous_was_gap = is_gap;
    }

    Ok(())
}

impl Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Condition(condition) => write!(f, "[{condition}]"),
            Element::Conjunction(conditions) => {
                f.write_str("[")?;
                for (idx, condition) in conditions.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(" & ")?;
                    }
                    write!(f, "{condition}")?;
                }
                f.write_str("]")
            }
            Element::Alternation(branches) => {
                f.write_str("(")?;
                for (idx, branch) in branches.iter().enumerate() {
                    if idx > 0 {
                        f.write_str("|")?;
                    }
                    for element in branch {
                        write!(f, "{element}")?;
                    }
                }
                f.write_str(")")
            }
            Element::Optional(inner) => write!(f, "{inner}?"),
            Element::Gap { min, max: Some(max) } => write!(f, "[]{{{min},{max}}}"),
            Element::Gap { min, max: None } => write!(f, "[]{{{min},}}"),
        }
    }
}

/// A compiled query: an immutable, validated sequence of elements
///
/// Queries hold no matching state and can be shared across threads.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    elements: Vec<Element>,
    source: Option<String>,
}

impl Query {
    /// Build a query, checking every structural invariant
    pub fn new(elements: Vec<Element>) -> Result<Self, PatternError> {
        if elements.is_empty() {
            return Err(PatternError::EmptyQuery);
        }
        validate_sequence(&elements)?;
        Ok(Self {
            elements,
            source: None,
        })
    }

    /// Attach the query text this query was compiled from
    pub fn with_source(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Smallest span length any match of this query can have
    pub fn min_len(&self) -> usize {
        sequence_min_len(&self.elements)
    }
}

impl Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for element in &self.elements {
            write!(f, "{element}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Corpus;

    fn cond(annotation: Annotation, pattern: &str) -> Condition {
        Condition::eq(annotation, pattern).unwrap()
    }

    fn noun_corpus() -> Corpus {
        Corpus::from_records([vec![
            ("word", "dogs"),
            ("lemma", "dog"),
            ("pos", "NOUN"),
            ("morph", "Number=Plur"),
        ]])
    }

    #[test]
    fn test_literal_and_regex_values() {
        assert_eq!(
            ValuePattern::compile("NOUN").unwrap(),
            ValuePattern::Literal("NOUN".to_string())
        );
        assert!(matches!(
            ValuePattern::compile("N.*").unwrap(),
            ValuePattern::Regex(ref p, _) if p == "N.*"
        ));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = Condition::eq(Annotation::Lemma, "(unclosed").unwrap_err();
        assert!(matches!(
            err,
            PatternError::InvalidPattern { ref pattern, .. } if pattern == "(unclosed"
        ));
    }

    #[test]
    fn test_evaluate_eq_and_not_eq() {
        let corpus = noun_corpus();
        let token = corpus.get(0).unwrap();

        assert_eq!(cond(Annotation::Pos, "NOUN").evaluate(token), Ok(true));
        assert_eq!(cond(Annotation::Pos, "VERB").evaluate(token), Ok(false));
        let not_verb = Condition::not_eq(Annotation::Pos, "VERB").unwrap();
        assert_eq!(not_verb.evaluate(token), Ok(true));
        let not_noun = Condition::not_eq(Annotation::Pos, "NOUN").unwrap();
        assert_eq!(not_noun.evaluate(token), Ok(false));
    }

    #[test]
    fn test_evaluate_is_anchored() {
        let corpus = noun_corpus();
        let token = corpus.get(0).unwrap();

        // Partial matches do not count
        assert_eq!(cond(Annotation::Lemma, "do").evaluate(token), Ok(false));
        assert_eq!(cond(Annotation::Lemma, "o.").evaluate(token), Ok(false));
        assert_eq!(cond(Annotation::Lemma, "d.g").evaluate(token), Ok(true));
        assert_eq!(cond(Annotation::Morph, ".*Plur").evaluate(token), Ok(true));
        // Alternation inside the pattern stays anchored on both sides
        assert_eq!(cond(Annotation::Lemma, "cat|do").evaluate(token), Ok(false));
        assert_eq!(cond(Annotation::Lemma, "cat|dog").evaluate(token), Ok(true));
    }

    #[test]
    fn test_evaluate_missing_annotation() {
        let corpus = Corpus::from_records([vec![("pos", "NOUN")]]);
        let token = corpus.get(0).unwrap();

        assert_eq!(
            cond(Annotation::Lemma, "dog").evaluate(token),
            Err(MissingAnnotation(Annotation::Lemma))
        );
    }

    #[test]
    fn test_evaluate_all_short_circuits() {
        let corpus = Corpus::from_records([vec![("pos", "NOUN")]]);
        let token = corpus.get(0).unwrap();

        // The missing lemma is never consulted because pos fails first
        let conditions = vec![cond(Annotation::Pos, "VERB"), cond(Annotation::Lemma, "x")];
        assert_eq!(evaluate_all(&conditions, token), Ok(false));

        let conditions = vec![cond(Annotation::Pos, "NOUN"), cond(Annotation::Lemma, "x")];
        assert_eq!(
            evaluate_all(&conditions, token),
            Err(MissingAnnotation(Annotation::Lemma))
        );
    }

    #[test]
    fn test_query_validation() {
        let a = || Element::Condition(cond(Annotation::Pos, "A"));
        let gap = |min, max| Element::Gap { min, max };

        assert!(matches!(Query::new(vec![]), Err(PatternError::EmptyQuery)));
        assert!(matches!(
            Query::new(vec![gap(0, Some(1)), a()]),
            Err(PatternError::MisplacedGap)
        ));
        assert!(matches!(
            Query::new(vec![a(), gap(0, Some(1))]),
            Err(PatternError::MisplacedGap)
        ));
        assert!(matches!(
            Query::new(vec![a(), gap(0, Some(1)), gap(0, Some(1)), a()]),
            Err(PatternError::AdjacentGaps)
        ));
        assert!(matches!(
            Query::new(vec![a(), gap(3, Some(1)), a()]),
            Err(PatternError::GapBounds { min: 3, max: 1 })
        ));
        assert!(matches!(
            Query::new(vec![Element::Conjunction(vec![])]),
            Err(PatternError::EmptyConjunction)
        ));
        assert!(matches!(
            Query::new(vec![Element::Alternation(vec![])]),
            Err(PatternError::EmptyAlternation)
        ));
        assert!(matches!(
            Query::new(vec![Element::Alternation(vec![vec![a()], vec![]])]),
            Err(PatternError::EmptyBranch)
        ));
        assert!(matches!(
            Query::new(vec![a(), Element::Optional(Box::new(gap(0, Some(1)))), a()]),
            Err(PatternError::OptionalGap)
        ));
        // Gaps inside a branch follow the same placement rules
        assert!(matches!(
            Query::new(vec![Element::Alternation(vec![vec![a(), gap(0, None)]])]),
            Err(PatternError::MisplacedGap)
        ));

        assert!(Query::new(vec![a(), gap(0, None), a()]).is_ok());
    }

    #[test]
    fn test_min_len() {
        let a = || Element::Condition(cond(Annotation::Pos, "A"));
        let query = Query::new(vec![
            a(),
            Element::Gap { min: 2, max: Some(4) },
            Element::Optional(Box::new(a())),
            Element::Alternation(vec![vec![a(), a()], vec![a()]]),
        ])
        .unwrap();

        assert_eq!(query.min_len(), 1 + 2 + 0 + 1);
    }

    #[test]
    fn test_min_len_saturates() {
        let a = || Element::Condition(cond(Annotation::Pos, "A"));
        let query = Query::new(vec![
            a(),
            Element::Gap {
                min: usize::MAX,
                max: None,
            },
            a(),
        ])
        .unwrap();

        assert_eq!(query.min_len(), usize::MAX);
    }

    #[test]
    fn test_display_round_trips_syntax() {
        let query = Query::new(vec![
            Element::Conjunction(vec![
                cond(Annotation::Lemma, "it's"),
                Condition::not_eq(Annotation::Pos, "NOUN").unwrap(),
            ]),
            Element::Gap { min: 0, max: None },
            Element::Optional(Box::new(Element::Alternation(vec![
                vec![Element::Condition(cond(Annotation::Word, "a"))],
                vec![
                    Element::Condition(cond(Annotation::Word, "b")),
                    Element::Condition(cond(Annotation::Word, "c")),
                ],
            ]))),
        ])
        .unwrap();

        assert_eq!(
            query.to_string(),
            r"[lemma='it\'s' & pos!='NOUN'][]{0,}([word='a']|[word='b'][word='c'])?"
        );
    }

    #[test]
    fn test_query_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Query>();
    }
}
