use clap::{Parser, ValueEnum};
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use cqlsearch::{
    Annotation, Corpus, CorpusFormat, LoadError, Match, MatchOptions, QueryError, SearchError,
    Searcher, compile, load_corpus,
};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Print every non-overlapping match
    #[default]
    Findall,
    /// Print the first match only
    First,
    /// Report whether the query matches anywhere
    Match,
}

#[derive(Parser)]
#[command(name = "cqlsearch", version)]
#[command(about = "Corpus Query Language - query annotated text corpora")]
struct Args {
    /// CQL query to execute, e.g. "[pos='DET'][]{0,2}[pos='NOUN']"
    query: String,

    /// Path to the corpus file (.json, .conllu, optionally .gz)
    corpus: PathBuf,

    /// Query mode
    #[arg(short, long, value_enum, default_value_t = Mode::Findall)]
    mode: Mode,

    /// Corpus file format
    #[arg(short, long, value_enum, default_value_t = CorpusFormat::Auto)]
    format: CorpusFormat,

    /// Fail when a token lacks a queried annotation
    #[arg(long)]
    strict: bool,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),

    #[error("failed to serialise output: {0}")]
    Json(#[from] serde_json::Error),
}

/// Install the stderr subscriber; RUST_LOG overrides the flag-derived level
fn init_logging(args: &Args) {
    let level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(args.debug)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .init();
}

/// Space-separated word forms covered by a match
fn match_words(corpus: &Corpus, m: Match) -> String {
    m.range()
        .filter_map(|pos| corpus.get(pos))
        .map(|token| token.get(Annotation::Word).unwrap_or("_"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn write_match(out: &mut impl Write, corpus: &Corpus, m: Match, verbose: bool) -> io::Result<()> {
    if verbose {
        writeln!(out, "  {} {}", m, match_words(corpus, m))
    } else {
        writeln!(out, "  {}", m)
    }
}

/// Run the query; returns whether anything matched
fn run(args: &Args) -> Result<bool, CliError> {
    let query = compile(&args.query)?;
    let corpus = load_corpus(&args.corpus, args.format)?;

    let searcher = Searcher::new(&query).with_options(MatchOptions {
        strict: args.strict,
    });
    let mut out = io::stdout().lock();

    match args.mode {
        Mode::Findall => {
            let matches = searcher.try_find_all(&corpus)?;
            if args.json {
                serde_json::to_writer(&mut out, &matches)?;
                writeln!(out)?;
            } else {
                writeln!(out, "Found {} matches:", matches.len())?;
                for &m in &matches {
                    write_match(&mut out, &corpus, m, args.verbose)?;
                }
            }
            Ok(true)
        }
        Mode::First => {
            let found = searcher.try_find_first(&corpus)?;
            if args.json {
                serde_json::to_writer(&mut out, &found)?;
                writeln!(out)?;
            } else if let Some(m) = found {
                writeln!(out, "First match:")?;
                write_match(&mut out, &corpus, m, args.verbose)?;
            } else {
                writeln!(out, "No match")?;
            }
            Ok(found.is_some())
        }
        Mode::Match => {
            let matched = searcher.is_match(&corpus)?;
            if args.json {
                serde_json::to_writer(&mut out, &matched)?;
                writeln!(out)?;
            } else {
                writeln!(out, "Match: {}", matched)?;
            }
            Ok(matched)
        }
    }
}

/// Report a failed run on one stderr line
fn report_error(err: &CliError, out: &mut impl Write) {
    // Nothing left to report to if stderr itself is gone
    let _ = writeln!(out, "Error: {}", err);
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args);

    match run(&args) {
        // Only the boolean modes signal "no match" through the exit status
        Ok(matched) if matched || args.mode == Mode::Findall => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            report_error(&e, &mut io::stderr().lock());
            ExitCode::FAILURE
        }
    }
}
