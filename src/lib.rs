//! cqlsearch: Corpus Query Language engine
//!
//! Finds token spans in annotated corpora that match CQL-style queries,
//! such as `[lemma='rey' & pos='NOUN']` or `[pos='DET'][]{0,2}[pos='NOUN']`.
//! Core implementation in Rust with optional Python bindings.

pub mod conllu; // CoNLL-U corpus reading
pub mod json; // JSON corpus reading
pub mod loader; // Corpus files, format detection, gzip
pub mod matcher; // Backtracking sequence matcher
pub mod parser; // Query language parser
pub mod pattern; // Query AST and condition evaluation
pub mod searcher; // End-to-end search (parser + matcher)
pub mod token; // Tokens, annotations and the interned corpus

// Python bindings
#[cfg(feature = "pyo3")]
pub mod python;

// Re-exports for convenience
pub use loader::{CorpusFormat, LoadError, load_corpus};
pub use parser::{QueryError, compile};
pub use pattern::{Condition, Element, Operator, PatternError, Query};
pub use searcher::{
    Match, MatchOptions, SearchError, Searcher, find_all, find_first, is_match, search_query,
};
pub use token::{Annotation, Corpus, CorpusBuilder, Position, TokenRef};
