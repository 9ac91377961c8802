//! Python bindings for cqlsearch
//!
//! This module provides PyO3-based Python bindings for the Rust core.

use pyo3::exceptions::{PyIOError, PyIndexError, PyKeyError, PyValueError};
use pyo3::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

use crate::loader::{CorpusFormat, LoadError, load_corpus};
use crate::parser::{QueryError, compile};
use crate::pattern::Query as RustQuery;
use crate::searcher::{MatchOptions, SearchError, Searcher};
use crate::token::{Annotation, Corpus as RustCorpus};
use crate::{conllu, json};

/// Convert LoadError to Python exception
impl From<LoadError> for PyErr {
    fn from(err: LoadError) -> PyErr {
        match err {
            LoadError::Io { .. } => PyIOError::new_err(err.to_string()),
            _ => PyValueError::new_err(err.to_string()),
        }
    }
}

impl From<QueryError> for PyErr {
    fn from(err: QueryError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}

impl From<SearchError> for PyErr {
    fn from(err: SearchError) -> PyErr {
        PyKeyError::new_err(err.to_string())
    }
}

/// An annotated token sequence.
///
/// Build one from a list of dicts, JSON text, CoNLL-U text, or a file, and
/// reuse it across queries.
#[pyclass(name = "Corpus", frozen)]
#[derive(Clone)]
pub struct PyCorpus {
    inner: Arc<RustCorpus>,
}

fn corpus_from_records(records: &[HashMap<String, String>]) -> RustCorpus {
    RustCorpus::from_records(
        records
            .iter()
            .map(|record| record.iter().map(|(k, v)| (k.as_str(), v.as_str()))),
    )
}

#[pymethods]
impl PyCorpus {
    /// Create a Corpus from a list of dicts mapping annotation names to values.
    #[new]
    fn new(records: Vec<HashMap<String, String>>) -> Self {
        PyCorpus {
            inner: Arc::new(corpus_from_records(&records)),
        }
    }

    /// Create a Corpus from JSON text (a list of objects).
    #[classmethod]
    fn from_json(_cls: &Bound<'_, pyo3::types::PyType>, text: &str) -> PyResult<Self> {
        let corpus = json::from_str(text).map_err(LoadError::from)?;
        Ok(PyCorpus {
            inner: Arc::new(corpus),
        })
    }

    /// Create a Corpus from CoNLL-U text.
    ///
    /// Sentences are concatenated into one token sequence.
    #[classmethod]
    fn from_conllu(_cls: &Bound<'_, pyo3::types::PyType>, text: &str) -> PyResult<Self> {
        let corpus = conllu::read_corpus(text.as_bytes()).map_err(LoadError::from)?;
        Ok(PyCorpus {
            inner: Arc::new(corpus),
        })
    }

    /// Load a Corpus from a file.
    ///
    /// Args:
    ///     path: Path to a .json, .conllu or .conll file (optionally .gz)
    ///     format: "auto" (default), "json" or "conllu"
    ///
    /// Raises:
    ///     IOError: If the file cannot be opened
    ///     ValueError: If the file cannot be parsed
    #[classmethod]
    #[pyo3(signature = (path, format="auto"))]
    fn from_file(_cls: &Bound<'_, pyo3::types::PyType>, path: &str, format: &str) -> PyResult<Self> {
        let format: CorpusFormat = format.parse().map_err(PyValueError::new_err)?;
        Ok(PyCorpus {
            inner: Arc::new(load_corpus(path, format)?),
        })
    }

    fn __len__(&self) -> usize {
        self.inner.len()
    }

    fn __getitem__(&self, position: usize) -> PyResult<HashMap<&'static str, String>> {
        let token = self.inner.get(position).ok_or_else(|| {
            PyIndexError::new_err(format!("token index out of range: {}", position))
        })?;
        Ok(Annotation::ALL
            .iter()
            .filter_map(|&ann| token.get(ann).map(|value| (ann.as_str(), value.to_string())))
            .collect())
    }

    fn __repr__(&self) -> String {
        let n = self.inner.len();
        if n == 0 {
            return "<Corpus (empty)>".to_string();
        }

        let words: Vec<&str> = self
            .inner
            .iter()
            .take(3)
            .map(|token| token.get(Annotation::Word).unwrap_or("_"))
            .collect();

        if n > 3 {
            format!("<Corpus len={} words='{} ...'>", n, words.join(" "))
        } else {
            format!("<Corpus len={} words='{}'>", n, words.join(" "))
        }
    }
}

/// Accept either a Corpus or a plain list of dicts
fn corpus_arg(obj: &Bound<'_, PyAny>) -> PyResult<Arc<RustCorpus>> {
    if let Ok(corpus) = obj.extract::<PyRef<'_, PyCorpus>>() {
        return Ok(Arc::clone(&corpus.inner));
    }
    let records: Vec<HashMap<String, String>> = obj.extract()?;
    Ok(Arc::new(corpus_from_records(&records)))
}

/// A compiled corpus query.
///
/// Queries are reusable and should be compiled once then used across
/// multiple corpora.
///
/// Example:
///     >>> q = Query("[pos='DET'][]{0,2}[pos='NOUN']")
///     >>> q.find_all([{"pos": "DET"}, {"pos": "ADJ"}, {"pos": "NOUN"}])
///     [(0, 3)]
#[pyclass(name = "Query", frozen)]
#[derive(Clone)]
pub struct PyQuery {
    inner: RustQuery,
}

impl PyQuery {
    fn searcher(&self, strict: bool) -> Searcher<'_> {
        Searcher::new(&self.inner).with_options(MatchOptions { strict })
    }
}

#[pymethods]
impl PyQuery {
    #[new]
    fn new(text: &str) -> PyResult<Self> {
        Ok(PyQuery {
            inner: compile(text)?,
        })
    }

    /// All non-overlapping matches as (start, end) spans.
    ///
    /// Raises:
    ///     KeyError: In strict mode, if a token lacks a queried annotation
    #[pyo3(signature = (corpus, strict=false))]
    fn find_all(&self, corpus: &Bound<'_, PyAny>, strict: bool) -> PyResult<Vec<(usize, usize)>> {
        let corpus = corpus_arg(corpus)?;
        let matches = self.searcher(strict).try_find_all(&corpus)?;
        Ok(matches.into_iter().map(Into::into).collect())
    }

    /// The first match as a (start, end) span, or None.
    #[pyo3(signature = (corpus, strict=false))]
    fn find_first(
        &self,
        corpus: &Bound<'_, PyAny>,
        strict: bool,
    ) -> PyResult<Option<(usize, usize)>> {
        let corpus = corpus_arg(corpus)?;
        Ok(self.searcher(strict).try_find_first(&corpus)?.map(Into::into))
    }

    #[pyo3(signature = (corpus, strict=false))]
    fn is_match(&self, corpus: &Bound<'_, PyAny>, strict: bool) -> PyResult<bool> {
        let corpus = corpus_arg(corpus)?;
        Ok(self.searcher(strict).is_match(&corpus)?)
    }

    fn __str__(&self) -> String {
        self.inner.to_string()
    }

    fn __repr__(&self) -> String {
        format!("Query({:?})", self.inner.source().unwrap_or_default())
    }
}

/// Find all matches of a query string in a corpus.
///
/// Args:
///     corpus: Corpus or list of dicts
///     query: Query text, e.g. "[lemma='rey' & pos='NOUN']"
///
/// Returns:
///     List of (start, end) spans
#[pyfunction(name = "findall")]
#[pyo3(signature = (corpus, query, strict=false))]
fn py_findall(
    corpus: &Bound<'_, PyAny>,
    query: &str,
    strict: bool,
) -> PyResult<Vec<(usize, usize)>> {
    PyQuery::new(query)?.find_all(corpus, strict)
}

/// Check whether a query string matches anywhere in a corpus.
#[pyfunction(name = "match")]
#[pyo3(signature = (corpus, query, strict=false))]
fn py_match(corpus: &Bound<'_, PyAny>, query: &str, strict: bool) -> PyResult<bool> {
    PyQuery::new(query)?.is_match(corpus, strict)
}

#[pyfunction]
fn __version__() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[pymodule]
fn cqlsearch(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyCorpus>()?;
    m.add_class::<PyQuery>()?;

    m.add_function(wrap_pyfunction!(py_findall, m)?)?;
    m.add_function(wrap_pyfunction!(py_match, m)?)?;
    m.add_function(wrap_pyfunction!(__version__, m)?)?;

    Ok(())
}
