//! Backtracking sequence matcher
//!
//! Aligns a query's elements against the corpus starting at a fixed
//! position. Every choice point is tried in declared order (alternation
//! branches left to right, optional presence before absence, gap widths
//! ascending) and the first choice that lets the whole remaining pattern
//! match wins.
//!
//! The remaining pattern is threaded through the recursion as a chain of
//! borrowed slices, so a choice made inside an alternation branch or an
//! optional element is revisited when the elements after it fail.

use std::convert::Infallible;
use std::marker::PhantomData;

use crate::pattern::{Element, MissingAnnotation, evaluate_all};
use crate::searcher::SearchError;
use crate::token::{Annotation, Corpus, Position, TokenRef};

/// How a condition on an annotation the token lacks is resolved
pub trait AnnotationPolicy {
    type Error;

    fn missing(position: Position, annotation: Annotation) -> Result<bool, Self::Error>;
}

/// Missing annotations count as "condition not satisfied"
#[derive(Debug, Clone, Copy, Default)]
pub struct Lenient;

impl AnnotationPolicy for Lenient {
    type Error = Infallible;

    #[inline]
    fn missing(position: Position, annotation: Annotation) -> Result<bool, Infallible> {
        tracing::trace!(position, %annotation, "annotation missing, condition not satisfied");
        Ok(false)
    }
}

/// Missing annotations abort the search
#[derive(Debug, Clone, Copy, Default)]
pub struct Strict;

impl AnnotationPolicy for Strict {
    type Error = SearchError;

    fn missing(position: Position, annotation: Annotation) -> Result<bool, SearchError> {
        Err(SearchError::UnknownAnnotation {
            position,
            annotation,
        })
    }
}

/// Elements still to match once the current slice is consumed
struct Rest<'q, 'r> {
    elements: &'q [Element],
    next: Option<&'r Rest<'q, 'r>>,
}

/// Sequence matcher over one corpus
///
/// Holds no state between calls; each `match_at` keeps its search state on
/// the stack.
pub struct Matcher<'c, P> {
    corpus: &'c Corpus,
    _policy: PhantomData<P>,
}

impl<'c, P: AnnotationPolicy> Matcher<'c, P> {
    pub fn new(corpus: &'c Corpus) -> Self {
        Self {
            corpus,
            _policy: PhantomData,
        }
    }

    /// Try to consume `elements` in order beginning at `start`
    ///
    /// Returns the end of the span chosen by the first successful path, or
    /// `None` if no path matches.
    pub fn match_at(
        &self,
        elements: &[Element],
        start: Position,
    ) -> Result<Option<Position>, P::Error> {
        self.match_seq(elements, start, None)
    }

    fn match_seq(
        &self,
        elements: &[Element],
        start: Position,
        rest: Option<&Rest<'_, '_>>,
    ) -> Result<Option<Position>, P::Error> {
        let Some((head, tail)) = elements.split_first() else {
            // Current slice consumed: continue with whatever follows it
            return match rest {
                Some(rest) => self.match_seq(rest.elements, start, rest.next),
                None => Ok(Some(start)),
            };
        };

        match head {
            Element::Condition(condition) => {
                if self.check_token(start, |token| condition.evaluate(token))? {
                    self.match_seq(tail, start + 1, rest)
                } else {
                    Ok(None)
                }
            }

            Element::Conjunction(conditions) => {
                if self.check_token(start, |token| evaluate_all(conditions, token))? {
                    self.match_seq(tail, start + 1, rest)
                } else {
                    Ok(None)
                }
            }

            Element::Alternation(branches) => {
                let after = Rest {
                    elements: tail,
                    next: rest,
                };
                for branch in branches {
                    if let Some(end) = self.match_seq(branch, start, Some(&after))? {
                        return Ok(Some(end));
                    }
                }
                Ok(None)
            }

            Element::Optional(inner) => {
                let after = Rest {
                    elements: tail,
                    next: rest,
                };
                // Present first, then absent
                if let Some(end) =
                    self.match_seq(std::slice::from_ref(inner.as_ref()), start, Some(&after))?
                {
                    return Ok(Some(end));
                }
                self.match_seq(tail, start, rest)
            }

            Element::Gap { min, max } => {
                let available = self.corpus.len().saturating_sub(start);
                let widest = max.map_or(available, |max| max.min(available));
                // Shortest gap first
                for width in *min..=widest {
                    if let Some(end) = self.match_seq(tail, start + width, rest)? {
                        return Ok(Some(end));
                    }
                }
                Ok(None)
            }
        }
    }

    /// Run a token test at `position`; false past the end of the corpus
    #[inline]
    fn check_token<F>(&self, position: Position, test: F) -> Result<bool, P::Error>
    where
        F: FnOnce(TokenRef<'c>) -> Result<bool, MissingAnnotation>,
    {
        let Some(token) = self.corpus.get(position) else {
            return Ok(false);
        };
        match test(token) {
            Ok(satisfied) => Ok(satisfied),
            Err(MissingAnnotation(annotation)) => P::missing(position, annotation),
        }
    }
}
