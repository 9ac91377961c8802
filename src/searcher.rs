//! End-to-end corpus search
//!
//! The scan driver runs the sequence matcher at successive start positions:
//! 1. Compile a query string into a Query (or take a compiled one)
//! 2. Skip start positions too close to the end for any match
//! 3. Run the matcher at each remaining position
//! 4. Report the first match, or every non-overlapping match

use serde::Serialize;
use std::fmt;
use std::ops::Range;
use thiserror::Error;

use crate::matcher::{AnnotationPolicy, Lenient, Matcher, Strict};
use crate::parser::{QueryError, compile};
use crate::pattern::Query;
use crate::token::{Annotation, Corpus, Position};

/// Error during a strict search
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchError {
    #[error("Search error: token {position} has no '{annotation}' annotation")]
    UnknownAnnotation {
        position: Position,
        annotation: Annotation,
    },
}

/// A half-open span `[start, end)` of corpus positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Match {
    pub start: Position,
    pub end: Position,
}

impl Match {
    pub fn new(start: Position, end: Position) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    /// Number of tokens covered by the span
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn range(&self) -> Range<Position> {
        self.start..self.end
    }
}

impl fmt::Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}:{}]", self.start, self.end)
    }
}

impl From<Match> for (Position, Position) {
    fn from(m: Match) -> Self {
        (m.start, m.end)
    }
}

/// Matching options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchOptions {
    /// Fail on conditions over annotations a token lacks instead of
    /// treating them as unsatisfied
    pub strict: bool,
}

/// A compiled query bound to a set of matching options
#[derive(Debug, Clone, Copy)]
pub struct Searcher<'q> {
    query: &'q Query,
    options: MatchOptions,
}

impl<'q> Searcher<'q> {
    pub fn new(query: &'q Query) -> Self {
        Self {
            query,
            options: MatchOptions::default(),
        }
    }

    pub fn with_options(mut self, options: MatchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn query(&self) -> &'q Query {
        self.query
    }

    /// First match in scan order
    pub fn try_find_first(&self, corpus: &Corpus) -> Result<Option<Match>, SearchError> {
        if self.options.strict {
            scan_first::<Strict>(self.query, corpus)
        } else {
            let Ok(found) = scan_first::<Lenient>(self.query, corpus);
            Ok(found)
        }
    }

    /// All non-overlapping matches in scan order
    pub fn try_find_all(&self, corpus: &Corpus) -> Result<Vec<Match>, SearchError> {
        if self.options.strict {
            scan_all::<Strict>(self.query, corpus)
        } else {
            let Ok(found) = scan_all::<Lenient>(self.query, corpus);
            Ok(found)
        }
    }

    pub fn is_match(&self, corpus: &Corpus) -> Result<bool, SearchError> {
        Ok(self.try_find_first(corpus)?.is_some())
    }

    pub fn count(&self, corpus: &Corpus) -> Result<usize, SearchError> {
        Ok(self.try_find_all(corpus)?.len())
    }
}

/// Find the first match of a query in a corpus
pub fn find_first(query: &Query, corpus: &Corpus) -> Option<Match> {
    let Ok(found) = scan_first::<Lenient>(query, corpus);
    found
}

/// Find all non-overlapping matches of a query in a corpus
pub fn find_all(query: &Query, corpus: &Corpus) -> Vec<Match> {
    let Ok(found) = scan_all::<Lenient>(query, corpus);
    found
}

/// Check whether a query matches anywhere in a corpus
pub fn is_match(query: &Query, corpus: &Corpus) -> bool {
    find_first(query, corpus).is_some()
}

/// Compile a query string and find all of its matches
pub fn search_query(query: &str, corpus: &Corpus) -> Result<Vec<Match>, QueryError> {
    let query = compile(query)?;
    Ok(find_all(&query, corpus))
}

/// Last start position that leaves room for the query's shortest match
fn last_start(query: &Query, corpus: &Corpus) -> Option<Position> {
    if corpus.is_empty() {
        tracing::warn!("empty corpus provided");
        return None;
    }
    corpus.len().checked_sub(query.min_len())
}

fn scan_first<P: AnnotationPolicy>(
    query: &Query,
    corpus: &Corpus,
) -> Result<Option<Match>, P::Error> {
    let Some(last) = last_start(query, corpus) else {
        return Ok(None);
    };
    let matcher = Matcher::<P>::new(corpus);

    for start in 0..=last {
        if let Some(end) = matcher.match_at(query.elements(), start)? {
            tracing::debug!(query = %query, start, end, "first match");
            return Ok(Some(Match::new(start, end)));
        }
    }

    tracing::debug!(query = %query, tokens = corpus.len(), "no match");
    Ok(None)
}

fn scan_all<P: AnnotationPolicy>(query: &Query, corpus: &Corpus) -> Result<Vec<Match>, P::Error> {
    let mut matches = Vec::new();
    let Some(last) = last_start(query, corpus) else {
        return Ok(matches);
    };
    let matcher = Matcher::<P>::new(corpus);

    let mut start = 0;
    while start <= last {
        match matcher.match_at(query.elements(), start)? {
            Some(end) => {
                matches.push(Match::new(start, end));
                // Resume after the match; a zero-width match still advances
                start = end.max(start + 1);
            }
            None => start += 1,
        }
    }

    tracing::debug!(
        query = %query,
        tokens = corpus.len(),
        matches = matches.len(),
        "scan complete"
    );
    Ok(matches)
}
