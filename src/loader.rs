//! Corpus loading from files
//!
//! Picks a reader by format (or by file extension), and reads gzip
//! compressed files transparently.

use flate2::read::MultiGzDecoder;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::conllu::{self, ParseError};
use crate::json;
use crate::token::Corpus;

/// Error while loading a corpus file
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to open file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in corpus file: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Conllu(#[from] ParseError),

    #[error("Cannot infer corpus format from {}", .0.display())]
    UnknownFormat(PathBuf),
}

/// On-disk corpus format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum CorpusFormat {
    /// Infer from the file extension
    #[default]
    Auto,
    Json,
    Conllu,
}

impl CorpusFormat {
    /// Resolve `Auto` against a path
    pub fn resolve(self, path: &Path) -> Result<CorpusFormat, LoadError> {
        if self != CorpusFormat::Auto {
            return Ok(self);
        }

        let inner = if is_gzip(path) {
            path.file_stem().map(Path::new)
        } else {
            Some(path)
        };

        match inner
            .and_then(Path::extension)
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("json") => Ok(CorpusFormat::Json),
            Some("conllu" | "conll") => Ok(CorpusFormat::Conllu),
            _ => Err(LoadError::UnknownFormat(path.to_path_buf())),
        }
    }
}

impl fmt::Display for CorpusFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CorpusFormat::Auto => "auto",
            CorpusFormat::Json => "json",
            CorpusFormat::Conllu => "conllu",
        })
    }
}

impl FromStr for CorpusFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(CorpusFormat::Auto),
            "json" => Ok(CorpusFormat::Json),
            "conllu" | "conll" => Ok(CorpusFormat::Conllu),
            _ => Err(format!("unknown corpus format: {}", s)),
        }
    }
}

fn is_gzip(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
}

/// Open a file, decompressing gzip by extension
fn open(path: &Path) -> Result<Box<dyn BufRead>, LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    if is_gzip(path) {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Load a corpus file
pub fn load_corpus(path: impl AsRef<Path>, format: CorpusFormat) -> Result<Corpus, LoadError> {
    let path = path.as_ref();
    let format = format.resolve(path)?;
    let reader = open(path)?;

    // `resolve` never yields Auto
    let corpus = if format == CorpusFormat::Conllu {
        conllu::read_corpus(reader)?
    } else {
        json::from_reader(reader)?
    };

    tracing::info!(
        path = %path.display(),
        %format,
        tokens = corpus.len(),
        "loaded corpus"
    );
    Ok(corpus)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Annotation;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::fs;
    use std::io::Write;
    use tempfile::{TempDir, tempdir};

    const JSON_CORPUS: &str = r#"[{"word": "the", "pos": "DET"}, {"word": "dog", "pos": "NOUN"}]"#;
    const CONLLU_CORPUS: &str = "1\tthe\tthe\tDET\t_\t_\t2\tdet\t_\t_\n2\tdog\tdog\tNOUN\t_\t_\t0\troot\t_\t_\n";

    /// Helper to create a test file with given content
    fn create_test_file(dir: &TempDir, filename: &str, content: &[u8]) -> PathBuf {
        let path = dir.path().join(filename);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content).unwrap();
        path
    }

    fn gzip(content: &str) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(content.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_resolve_by_extension() {
        let auto = CorpusFormat::Auto;
        assert_eq!(auto.resolve(Path::new("a.json")).unwrap(), CorpusFormat::Json);
        assert_eq!(auto.resolve(Path::new("a.conllu")).unwrap(), CorpusFormat::Conllu);
        assert_eq!(auto.resolve(Path::new("a.CONLL")).unwrap(), CorpusFormat::Conllu);
        assert_eq!(auto.resolve(Path::new("a.conllu.gz")).unwrap(), CorpusFormat::Conllu);
        assert_eq!(auto.resolve(Path::new("a.json.gz")).unwrap(), CorpusFormat::Json);
        assert!(matches!(
            auto.resolve(Path::new("a.txt")),
            Err(LoadError::UnknownFormat(_))
        ));
        assert!(auto.resolve(Path::new("corpus")).is_err());

        // Explicit formats ignore the extension
        assert_eq!(
            CorpusFormat::Json.resolve(Path::new("a.txt")).unwrap(),
            CorpusFormat::Json
        );
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("json".parse::<CorpusFormat>(), Ok(CorpusFormat::Json));
        assert_eq!("conll".parse::<CorpusFormat>(), Ok(CorpusFormat::Conllu));
        assert!("xml".parse::<CorpusFormat>().is_err());
    }

    #[test]
    fn test_load_json_and_conllu() {
        let dir = tempdir().unwrap();
        let json_path = create_test_file(&dir, "c.json", JSON_CORPUS.as_bytes());
        let conllu_path = create_test_file(&dir, "c.conllu", CONLLU_CORPUS.as_bytes());

        for path in [json_path, conllu_path] {
            let corpus = load_corpus(&path, CorpusFormat::Auto).unwrap();
            assert_eq!(corpus.len(), 2);
            assert_eq!(corpus.get(1).unwrap().get(Annotation::Pos), Some("NOUN"));
        }
    }

    #[test]
    fn test_load_gzip() {
        let dir = tempdir().unwrap();
        let path = create_test_file(&dir, "c.conllu.gz", &gzip(CONLLU_CORPUS));

        let corpus = load_corpus(&path, CorpusFormat::Auto).unwrap();
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.get(0).unwrap().get(Annotation::Word), Some("the"));
    }

    #[test]
    fn test_load_errors() {
        let dir = tempdir().unwrap();

        let missing = dir.path().join("missing.json");
        assert!(matches!(
            load_corpus(&missing, CorpusFormat::Auto),
            Err(LoadError::Io { .. })
        ));

        let bad_json = create_test_file(&dir, "bad.json", b"[{");
        let err = load_corpus(&bad_json, CorpusFormat::Auto).unwrap_err();
        assert!(matches!(err, LoadError::Json(_)));
        assert!(err.to_string().starts_with("Invalid JSON in corpus file"));

        let bad_conllu = create_test_file(&dir, "bad.conllu", b"1\tdog\n");
        assert!(matches!(
            load_corpus(&bad_conllu, CorpusFormat::Auto),
            Err(LoadError::Conllu(_))
        ));
    }
}
