//! CoNLL-U corpus reading
//!
//! Reads CoNLL-U sentences and flattens them into a single token corpus:
//! FORM becomes `word`, LEMMA `lemma`, UPOS `pos` and FEATS `morph`.
//! Multiword token ranges and empty nodes are skipped.
//!
//! CoNLL-U format: https://universaldependencies.org/format.html

use bstr::ByteSlice;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

use crate::token::{Annotation, Corpus, CorpusBuilder};

const FIELD_COUNT: usize = 10;

/// Error during CoNLL-U parsing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Parse error at line {line_num}: {message}")]
pub struct ParseError {
    pub line_num: usize,
    pub message: String,
}

impl ParseError {
    fn new(line_num: usize, message: impl Into<String>) -> Self {
        Self {
            line_num,
            message: message.into(),
        }
    }
}

/// ID column of a token line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenId {
    Single(usize),
    /// Multiword token, e.g. `1-2`
    Range,
    /// Empty node, e.g. `3.1`
    Empty,
}

/// One syntactic word with the columns the corpus keeps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    pub id: usize,
    pub form: String,
    pub lemma: String,
    pub upos: String,
    pub feats: String,
}

impl Word {
    /// Annotation values in corpus terms
    pub fn annotations(&self) -> [(Annotation, &str); 4] {
        [
            (Annotation::Word, self.form.as_str()),
            (Annotation::Lemma, self.lemma.as_str()),
            (Annotation::Pos, self.upos.as_str()),
            (Annotation::Morph, self.feats.as_str()),
        ]
    }
}

/// CoNLL-U reader that iterates over sentences
pub struct CoNLLUReader<R: BufRead> {
    reader: R,
    line_num: usize,
    buf: Vec<u8>,
}

impl CoNLLUReader<BufReader<File>> {
    /// Create a reader from a file path
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<'a> CoNLLUReader<&'a [u8]> {
    /// Create a reader over in-memory text
    pub fn from_string(text: &'a str) -> Self {
        Self::new(text.as_bytes())
    }
}

impl<R: BufRead> CoNLLUReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_num: 0,
            buf: Vec::with_capacity(256),
        }
    }
}

impl<R: BufRead> Iterator for CoNLLUReader<R> {
    type Item = Result<Vec<Word>, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut words = Vec::new();
        // A sentence made only of comments or skipped nodes still ends at a
        // blank line
        let mut seen_lines = false;

        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => {
                    // EOF
                    return if seen_lines { Some(Ok(words)) } else { None };
                }
                Ok(_) => self.line_num += 1,
                Err(e) => {
                    return Some(Err(ParseError::new(
                        self.line_num + 1,
                        format!("IO error: {}", e),
                    )));
                }
            }

            let line = self.buf.trim_end_with(|c| c == '\n' || c == '\r');

            if line.trim().is_empty() {
                // Blank line = sentence boundary
                if seen_lines {
                    return Some(Ok(words));
                }
                continue;
            }
            seen_lines = true;

            if line.starts_with(b"#") {
                continue;
            }

            match parse_line(line, self.line_num) {
                Ok(Some(word)) => words.push(word),
                Ok(None) => {}
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Split a token line into its ten tab-separated columns
fn split_fields(line: &[u8], line_num: usize) -> Result<[&[u8]; FIELD_COUNT], ParseError> {
    let mut fields = [&line[..0]; FIELD_COUNT];
    let mut start = 0;
    let mut count = 0;

    for tab in memchr::memchr_iter(b'\t', line) {
        if count == FIELD_COUNT - 1 {
            count = FIELD_COUNT;
            break;
        }
        fields[count] = &line[start..tab];
        start = tab + 1;
        count += 1;
    }

    if count != FIELD_COUNT - 1 {
        let found = memchr::memchr_iter(b'\t', line).count() + 1;
        return Err(ParseError::new(
            line_num,
            format!("Expected {} fields, found {}", FIELD_COUNT, found),
        ));
    }
    fields[FIELD_COUNT - 1] = &line[start..];
    Ok(fields)
}

fn parse_id(field: &[u8], line_num: usize) -> Result<TokenId, ParseError> {
    if memchr::memchr(b'-', field).is_some() {
        return Ok(TokenId::Range);
    }
    if memchr::memchr(b'.', field).is_some() {
        return Ok(TokenId::Empty);
    }
    if !field.is_empty()
        && field.iter().all(u8::is_ascii_digit)
        && let Some(id) = atoi::atoi::<usize>(field)
    {
        return Ok(TokenId::Single(id));
    }
    Err(ParseError::new(
        line_num,
        format!("Invalid token ID: {}", field.as_bstr()),
    ))
}

fn field_str(field: &[u8], line_num: usize) -> Result<&str, ParseError> {
    field
        .to_str()
        .map_err(|e| ParseError::new(line_num, format!("Invalid UTF-8: {}", e)))
}

/// Parse a single token line
///
/// Returns `None` for multiword tokens and empty nodes.
fn parse_line(line: &[u8], line_num: usize) -> Result<Option<Word>, ParseError> {
    let fields = split_fields(line, line_num)?;

    let id = match parse_id(fields[0], line_num)? {
        TokenId::Single(id) => id,
        TokenId::Range | TokenId::Empty => return Ok(None),
    };

    let form = field_str(fields[1], line_num)?;
    let lemma = match field_str(fields[2], line_num)? {
        // Default to form if lemma not specified
        "_" => form,
        lemma => lemma,
    };
    let upos = field_str(fields[3], line_num)?;
    let feats = match field_str(fields[5], line_num)? {
        "_" => "",
        feats => feats,
    };

    Ok(Some(Word {
        id,
        form: form.to_string(),
        lemma: lemma.to_string(),
        upos: upos.to_string(),
        feats: feats.to_string(),
    }))
}

/// Read every sentence into one flat corpus
pub fn read_corpus<R: BufRead>(reader: R) -> Result<Corpus, ParseError> {
    let mut builder = CorpusBuilder::new();
    let mut sentences = 0usize;

    for sentence in CoNLLUReader::new(reader) {
        for word in sentence? {
            builder.push(word.annotations());
        }
        sentences += 1;
    }

    tracing::debug!(sentences, tokens = builder.len(), "read CoNLL-U corpus");
    Ok(builder.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_SENTENCES: &str = "# sent_id = 1
# text = The dog runs.
1\tThe\tthe\tDET\tDT\tDefinite=Def|PronType=Art\t2\tdet\t_\t_
2\tdog\tdog\tNOUN\tNN\tNumber=Sing\t3\tnsubj\t_\t_
3\truns\trun\tVERB\tVBZ\t_\t0\troot\t_\t_

# text = Cats sleep.
1\tCats\tcat\tNOUN\tNNS\tNumber=Plur\t2\tnsubj\t_\t_
2\tsleep\t_\tVERB\tVBP\t_\t0\troot\t_\t_
";

    #[test]
    fn test_sentences() {
        let sentences: Vec<_> = CoNLLUReader::from_string(TWO_SENTENCES)
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(sentences.len(), 2);
        assert_eq!(sentences[0].len(), 3);
        assert_eq!(sentences[1].len(), 2);

        let the = &sentences[0][0];
        assert_eq!(the.id, 1);
        assert_eq!(the.form, "The");
        assert_eq!(the.lemma, "the");
        assert_eq!(the.upos, "DET");
        assert_eq!(the.feats, "Definite=Def|PronType=Art");
    }

    #[test]
    fn test_underscore_fallbacks() {
        let sentences: Vec<_> = CoNLLUReader::from_string(TWO_SENTENCES)
            .collect::<Result<_, _>>()
            .unwrap();

        // Lemma falls back to the form, FEATS to the empty string
        let sleep = &sentences[1][1];
        assert_eq!(sleep.lemma, "sleep");
        assert_eq!(sleep.feats, "");
        assert_eq!(sentences[0][2].feats, "");
    }

    #[test]
    fn test_read_corpus_flattens_sentences() {
        let corpus = read_corpus(TWO_SENTENCES.as_bytes()).unwrap();

        assert_eq!(corpus.len(), 5);
        let cats = corpus.get(3).unwrap();
        assert_eq!(cats.get(Annotation::Word), Some("Cats"));
        assert_eq!(cats.get(Annotation::Lemma), Some("cat"));
        assert_eq!(cats.get(Annotation::Pos), Some("NOUN"));
        assert_eq!(cats.get(Annotation::Morph), Some("Number=Plur"));
    }

    #[test]
    fn test_skips_ranges_and_empty_nodes() {
        let text = "1-2\tdel\t_\t_\t_\t_\t_\t_\t_\t_
1\tde\tde\tADP\t_\t_\t3\tcase\t_\t_
2\tel\tel\tDET\t_\t_\t3\tdet\t_\t_
2.1\tnull\t_\t_\t_\t_\t_\t_\t_\t_
3\trey\trey\tNOUN\t_\t_\t0\troot\t_\t_
";
        let corpus = read_corpus(text.as_bytes()).unwrap();

        let words: Vec<_> = corpus
            .iter()
            .filter_map(|token| token.get(Annotation::Word))
            .collect();
        assert_eq!(words, vec!["de", "el", "rey"]);
    }

    #[test]
    fn test_crlf_and_missing_trailing_blank_line() {
        let text = "1\tyes\tyes\tINTJ\t_\t_\t0\troot\t_\t_\r\n\r\n1\tno\tno\tINTJ\t_\t_\t0\troot\t_\t_";
        let sentences: Vec<_> = CoNLLUReader::from_string(text)
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(sentences.len(), 2);
        assert_eq!(sentences[0][0].form, "yes");
        assert_eq!(sentences[1][0].form, "no");
    }

    #[test]
    fn test_empty_misc_column() {
        let text = "1\tdog\tdog\tNOUN\t_\t_\t0\troot\t_\t\n";
        let corpus = read_corpus(text.as_bytes()).unwrap();
        assert_eq!(corpus.len(), 1);
    }

    #[test]
    fn test_wrong_field_count() {
        let text = "# comment\n1\tdog\tdog\tNOUN\n";
        let err = read_corpus(text.as_bytes()).unwrap_err();

        assert_eq!(err.line_num, 2);
        assert_eq!(err.message, "Expected 10 fields, found 4");
        assert_eq!(
            err.to_string(),
            "Parse error at line 2: Expected 10 fields, found 4"
        );
    }

    #[test]
    fn test_too_many_fields() {
        let text = "1\tdog\tdog\tNOUN\t_\t_\t0\troot\t_\t_\textra\n";
        let err = read_corpus(text.as_bytes()).unwrap_err();
        assert_eq!(err.message, "Expected 10 fields, found 11");
    }

    #[test]
    fn test_invalid_id() {
        let text = "x\tdog\tdog\tNOUN\t_\t_\t0\troot\t_\t_\n";
        let err = read_corpus(text.as_bytes()).unwrap_err();
        assert_eq!(err.message, "Invalid token ID: x");
    }

    #[test]
    fn test_empty_input() {
        assert!(CoNLLUReader::from_string("").next().is_none());
        assert!(read_corpus("\n\n".as_bytes()).unwrap().is_empty());
    }
}
