//! Annotated tokens and corpora
//!
//! A corpus is a flat, fully materialized sequence of tokens. Every token
//! carries up to four annotations (word, lemma, pos, morph). Annotation
//! values are interned once per corpus, so repeated tags and lemmas share
//! storage.

use lasso::{Rodeo, RodeoReader, Spur};
use rustc_hash::FxBuildHasher;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Index of a token within a corpus
pub type Position = usize;

/// The fixed set of annotations a token may carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Annotation {
    Word,
    Lemma,
    Pos,
    Morph,
}

impl Annotation {
    pub const ALL: [Annotation; 4] = [
        Annotation::Word,
        Annotation::Lemma,
        Annotation::Pos,
        Annotation::Morph,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub fn as_str(self) -> &'static str {
        match self {
            Annotation::Word => "word",
            Annotation::Lemma => "lemma",
            Annotation::Pos => "pos",
            Annotation::Morph => "morph",
        }
    }

    #[inline(always)]
    fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An annotation name outside the supported set
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown annotation: {0}")]
pub struct UnknownAnnotation(pub String);

impl FromStr for Annotation {
    type Err = UnknownAnnotation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "word" => Ok(Annotation::Word),
            "lemma" => Ok(Annotation::Lemma),
            "pos" => Ok(Annotation::Pos),
            "morph" => Ok(Annotation::Morph),
            _ => Err(UnknownAnnotation(s.to_string())),
        }
    }
}

/// A single annotated token
///
/// Values are symbols in the owning corpus' string pool; an empty slot
/// means the token does not carry that annotation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Token {
    values: [Option<Spur>; Annotation::COUNT],
}

/// Borrowed view of a token that can resolve its annotation values
#[derive(Clone, Copy)]
pub struct TokenRef<'a> {
    token: &'a Token,
    pool: &'a RodeoReader<Spur, FxBuildHasher>,
}

impl<'a> TokenRef<'a> {
    /// Get the value of an annotation, if the token carries it
    #[inline]
    pub fn get(&self, annotation: Annotation) -> Option<&'a str> {
        let pool = self.pool;
        self.token.values[annotation.slot()].map(|sym| pool.resolve(&sym))
    }

    pub fn has(&self, annotation: Annotation) -> bool {
        self.token.values[annotation.slot()].is_some()
    }
}

impl fmt::Debug for TokenRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for annotation in Annotation::ALL {
            if let Some(value) = self.get(annotation) {
                map.entry(&annotation.as_str(), &value);
            }
        }
        map.finish()
    }
}

/// An ordered, immutable sequence of annotated tokens
pub struct Corpus {
    tokens: Vec<Token>,
    pool: RodeoReader<Spur, FxBuildHasher>,
}

impl Corpus {
    /// Build a corpus from records of (annotation name, value) pairs
    ///
    /// Keys that are not annotation names are ignored.
    pub fn from_records<'a, R, I>(records: R) -> Self
    where
        R: IntoIterator<Item = I>,
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut builder = CorpusBuilder::new();
        for record in records {
            builder.push_record(record);
        }
        builder.finish()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Get a token by position
    #[inline]
    pub fn get(&self, position: Position) -> Option<TokenRef<'_>> {
        self.tokens.get(position).map(|token| TokenRef {
            token,
            pool: &self.pool,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = TokenRef<'_>> + '_ {
        self.tokens.iter().map(|token| TokenRef {
            token,
            pool: &self.pool,
        })
    }

    /// Number of distinct annotation values in the string pool
    pub fn vocabulary_size(&self) -> usize {
        self.pool.len()
    }
}

impl fmt::Debug for Corpus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl Default for Corpus {
    fn default() -> Self {
        CorpusBuilder::new().finish()
    }
}

/// Incremental corpus construction
pub struct CorpusBuilder {
    tokens: Vec<Token>,
    pool: Rodeo<Spur, FxBuildHasher>,
    ignored_keys: usize,
}

impl CorpusBuilder {
    pub fn new() -> Self {
        Self {
            tokens: Vec::new(),
            pool: Rodeo::with_hasher(FxBuildHasher),
            ignored_keys: 0,
        }
    }

    /// Append a token from typed annotation values
    ///
    /// A later value for the same annotation replaces an earlier one.
    pub fn push<'a, I>(&mut self, values: I) -> Position
    where
        I: IntoIterator<Item = (Annotation, &'a str)>,
    {
        let mut token = Token::default();
        for (annotation, value) in values {
            token.values[annotation.slot()] = Some(self.pool.get_or_intern(value));
        }
        self.tokens.push(token);
        self.tokens.len() - 1
    }

    /// Append a token from untyped (key, value) pairs
    ///
    /// Keys that do not name an annotation are skipped and counted.
    pub fn push_record<'a, I>(&mut self, record: I) -> Position
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut token = Token::default();
        for (key, value) in record {
            match key.parse::<Annotation>() {
                Ok(annotation) => {
                    token.values[annotation.slot()] = Some(self.pool.get_or_intern(value));
                }
                Err(_) => self.ignored_keys += 1,
            }
        }
        self.tokens.push(token);
        self.tokens.len() - 1
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Number of record keys skipped because they named no annotation
    pub fn ignored_keys(&self) -> usize {
        self.ignored_keys
    }

    /// Freeze the builder into a read-only corpus
    pub fn finish(self) -> Corpus {
        if self.ignored_keys > 0 {
            tracing::warn!(
                ignored = self.ignored_keys,
                "skipped record keys that are not annotations"
            );
        }
        Corpus {
            tokens: self.tokens,
            pool: self.pool.into_reader(),
        }
    }
}

impl Default for CorpusBuilder {
    fn default() -> Self {
        Self::new()
    }
}
