//! JSON corpus reading
//!
//! A JSON corpus is a list of objects, one per token, mapping annotation
//! names to string values:
//!
//! ```json
//! [{"word": "Da", "lemma": "dar", "pos": "VERB", "morph": "Mood=Imp"}]
//! ```
//!
//! Keys that are not annotation names are ignored. Non-string values are
//! rejected.

use rustc_hash::FxHashMap;
use std::io::Read;

use crate::token::{Corpus, CorpusBuilder};

type Record = FxHashMap<String, String>;

fn build(records: Vec<Record>) -> Corpus {
    let mut builder = CorpusBuilder::new();
    for record in &records {
        builder.push_record(record.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }
    tracing::debug!(tokens = builder.len(), "read JSON corpus");
    builder.finish()
}

/// Parse a corpus from JSON text
pub fn from_str(text: &str) -> Result<Corpus, serde_json::Error> {
    Ok(build(serde_json::from_str(text)?))
}

/// Parse a corpus from a JSON byte stream
pub fn from_reader<R: Read>(reader: R) -> Result<Corpus, serde_json::Error> {
    Ok(build(serde_json::from_reader(reader)?))
}
